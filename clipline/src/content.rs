//! Content records flowing through the engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::{Error, Result};

/// Maximum accepted title length in characters.
pub const MAX_TITLE_CHARS: usize = 1024;

/// Maximum accepted body size in bytes.
pub const MAX_BODY_BYTES: usize = 5 * 1024 * 1024;

/// Processing flags set by pipeline stages.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingFlags {
    #[serde(default)]
    pub enriched: bool,
    #[serde(default)]
    pub indexed: bool,
    #[serde(default)]
    pub processed: bool,
}

/// Fields derived by the enrichment stage.
///
/// Captured before enrichment runs so the stage can be compensated.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DerivedFields {
    pub summary: Option<String>,
    pub tags: Vec<String>,
    pub categories: Vec<String>,
    pub flags: ProcessingFlags,
}

/// A captured content record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentRecord {
    /// Identifier of the record in the content repository.
    pub id: String,
    pub title: String,
    pub body: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default)]
    pub flags: ProcessingFlags,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processed_at: Option<DateTime<Utc>>,
}

impl ContentRecord {
    /// Create a new record with no derived fields.
    pub fn new(id: impl Into<String>, title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            body: body.into(),
            url: None,
            summary: None,
            tags: Vec::new(),
            categories: Vec::new(),
            flags: ProcessingFlags::default(),
            processed_at: None,
        }
    }

    /// Set the source URL.
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Snapshot the fields the enrichment stage may overwrite.
    pub fn derived_fields(&self) -> DerivedFields {
        DerivedFields {
            summary: self.summary.clone(),
            tags: self.tags.clone(),
            categories: self.categories.clone(),
            flags: self.flags.clone(),
        }
    }

    /// Restore previously captured derived fields.
    pub fn restore_derived(&mut self, derived: DerivedFields) {
        self.summary = derived.summary;
        self.tags = derived.tags;
        self.categories = derived.categories;
        self.flags = derived.flags;
    }

    /// Apply a well-formed enrichment result.
    pub fn apply_enrichment(&mut self, result: EnrichmentResult) {
        self.summary = Some(result.summary);
        self.tags = dedup_preserve_order(result.tags);
        self.categories = dedup_preserve_order(result.categories);
        self.flags.enriched = true;
    }

    /// Check required fields.
    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(Error::validation("content id is required"));
        }
        if self.body.trim().is_empty() {
            return Err(Error::validation("content body is empty"));
        }
        if self.body.len() > MAX_BODY_BYTES {
            return Err(Error::validation(format!(
                "content body exceeds {} bytes",
                MAX_BODY_BYTES
            )));
        }
        if self.title.chars().count() > MAX_TITLE_CHARS {
            return Err(Error::validation(format!(
                "title exceeds {} characters",
                MAX_TITLE_CHARS
            )));
        }
        if let Some(url) = &self.url {
            validate_url(url)?;
        }
        Ok(())
    }
}

fn validate_url(raw: &str) -> Result<()> {
    let url = Url::parse(raw)
        .map_err(|e| Error::validation(format!("malformed url {}: {}", raw, e)))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(Error::validation(format!(
            "unsupported url scheme: {}",
            url.scheme()
        )));
    }
    if url.host_str().is_none_or(str::is_empty) {
        return Err(Error::validation(format!("url has no host: {}", raw)));
    }
    Ok(())
}

/// Output of the enrichment service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrichmentResult {
    pub summary: String,
    pub tags: Vec<String>,
    pub categories: Vec<String>,
}

impl EnrichmentResult {
    /// Reject results a stage must not apply.
    pub fn validate(&self) -> Result<()> {
        if self.summary.trim().is_empty() {
            return Err(Error::collaborator(
                "enrichment",
                "malformed result: empty summary",
            ));
        }
        if self.tags.iter().any(|t| t.trim().is_empty()) {
            return Err(Error::collaborator("enrichment", "malformed result: blank tag"));
        }
        if self.categories.iter().any(|c| c.trim().is_empty()) {
            return Err(Error::collaborator(
                "enrichment",
                "malformed result: blank category",
            ));
        }
        Ok(())
    }
}

fn dedup_preserve_order(values: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    values
        .into_iter()
        .map(|v| v.trim().to_string())
        .filter(|v| seen.insert(v.to_lowercase()))
        .collect()
}
