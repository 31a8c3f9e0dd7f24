mod common;

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use clipline::queue::{QueueProcessor, QueueStatus};
use clipline::{
    Error, EventBus, MemoryStateStore, Priority, ProcessingQueue, QueueEntry, QueueEventKind,
    Result,
};
use common::{eventually, fast_queue, record};

const WAIT: Duration = Duration::from_secs(10);

/// Records the order and time attempts start; fails content ids starting with `fail`.
#[derive(Default)]
struct Recorder {
    delay_ms: u64,
    started: Mutex<Vec<(String, Instant)>>,
    running: AtomicUsize,
    peak: AtomicUsize,
}

impl Recorder {
    fn with_delay(delay_ms: u64) -> Arc<Self> {
        Arc::new(Self {
            delay_ms,
            ..Default::default()
        })
    }

    fn order(&self) -> Vec<String> {
        self.started.lock().iter().map(|(id, _)| id.clone()).collect()
    }

    fn started_at(&self, content_id: &str) -> Option<Instant> {
        self.started
            .lock()
            .iter()
            .find(|(id, _)| id == content_id)
            .map(|(_, at)| *at)
    }
}

#[async_trait]
impl QueueProcessor for Recorder {
    async fn process(&self, entry: &QueueEntry) -> Result<()> {
        self.started
            .lock()
            .push((entry.content.id.clone(), Instant::now()));
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
        self.running.fetch_sub(1, Ordering::SeqCst);

        if entry.content.id.starts_with("fail") {
            return Err(Error::collaborator("processor", "always fails"));
        }
        Ok(())
    }
}

fn build(
    config: clipline::config::QueueConfig,
    processor: Arc<Recorder>,
) -> (Arc<ProcessingQueue>, EventBus) {
    let events = EventBus::new();
    let queue = ProcessingQueue::new(
        config,
        processor,
        Arc::new(MemoryStateStore::new()),
        events.clone(),
    );
    (queue, events)
}

fn assert_accounted(queue: &ProcessingQueue) {
    let status: QueueStatus = queue.get_status();
    assert_eq!(
        status.resident() as u64,
        queue.statistics().expected_resident(),
        "collections out of balance: {:?}",
        status
    );
}

#[tokio::test]
async fn admission_follows_priority_when_saturated() {
    let processor = Recorder::with_delay(50);
    let (queue, _) = build(fast_queue(1), processor.clone());

    queue.enqueue(record("blocker"), Priority::Normal).await.unwrap();
    queue.enqueue(record("low"), Priority::Low).await.unwrap();
    queue.enqueue(record("high"), Priority::High).await.unwrap();
    queue.enqueue(record("normal"), Priority::Normal).await.unwrap();

    let pending: Vec<String> = queue
        .get_pending_items()
        .into_iter()
        .map(|e| e.content.id)
        .collect();
    assert_eq!(pending, vec!["high", "normal", "low"]);

    assert!(eventually(WAIT, || queue.is_idle()).await);
    assert_eq!(processor.order(), vec!["blocker", "high", "normal", "low"]);
}

#[tokio::test]
async fn always_failing_entry_is_dead_lettered_after_three_attempts() {
    let processor = Recorder::with_delay(1);
    let (queue, events) = build(fast_queue(2), processor.clone());
    let mut rx = events.subscribe_queue();

    let id = queue.enqueue(record("fail-1"), Priority::High).await.unwrap();
    assert!(eventually(WAIT, || queue.is_idle()).await);

    let dead = queue.get_dead_letter_queue();
    assert_eq!(dead.len(), 1);
    assert_eq!(dead[0].id, id);
    assert_eq!(dead[0].attempts, 3);
    assert_eq!(dead[0].processing_history.len(), 3);
    assert!(dead[0].failure_reason.as_deref().unwrap().contains("always fails"));
    assert_eq!(queue.get_position(&id), None);
    assert!(queue.get_pending_items().is_empty());
    assert_eq!(processor.order().len(), 3);

    let mut retries = 0;
    let mut dead_lettered = false;
    while let Ok(event) = rx.try_recv() {
        match event.kind {
            QueueEventKind::RetryScheduled { .. } => retries += 1,
            QueueEventKind::DeadLettered { attempts, .. } => {
                assert_eq!(attempts, 3);
                dead_lettered = true;
            }
            _ => {}
        }
    }
    assert_eq!(retries, 2);
    assert!(dead_lettered);

    let stats = queue.get_statistics();
    assert_eq!(stats.total_dead_lettered, 1);
    assert_eq!(stats.error_rate, 1.0);

    // never reprocessed on its own
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(processor.order().len(), 3);
}

#[tokio::test]
async fn burst_limit_holds_third_entry_at_front() {
    let processor = Recorder::with_delay(20);
    let mut config = fast_queue(3);
    config.rate_limit.enabled = true;
    config.rate_limit.burst_limit = 2;
    config.rate_limit.burst_window_ms = 200;
    config.rate_limit.retry_delay_ms = 50;
    let (queue, events) = build(config, processor.clone());
    let mut rx = events.subscribe_queue();

    queue.enqueue(record("a"), Priority::Normal).await.unwrap();
    queue.enqueue(record("b"), Priority::Normal).await.unwrap();
    let third = queue.enqueue(record("c"), Priority::Normal).await.unwrap();

    assert_eq!(queue.get_status().in_flight, 2);
    assert_eq!(queue.get_position(&third), Some(1));

    assert!(eventually(WAIT, || queue.is_idle()).await);
    assert_eq!(processor.order(), vec!["a", "b", "c"]);

    let first = processor.started_at("a").unwrap();
    let last = processor.started_at("c").unwrap();
    assert!(last.duration_since(first) >= Duration::from_millis(150));

    let mut rate_limited = false;
    while let Ok(event) = rx.try_recv() {
        if matches!(event.kind, QueueEventKind::RateLimited { .. }) {
            assert_eq!(event.entry_id, third);
            rate_limited = true;
        }
    }
    assert!(rate_limited);
}

#[tokio::test]
async fn in_flight_count_respects_cap_and_collections_balance() {
    let processor = Recorder::with_delay(15);
    let mut config = fast_queue(2);
    config.dead_letter.max_retry_attempts = 2;
    let (queue, _) = build(config, processor.clone());

    for i in 0..8 {
        let id = if i % 3 == 0 {
            format!("fail-{}", i)
        } else {
            format!("ok-{}", i)
        };
        queue.enqueue(record(&id), Priority::Normal).await.unwrap();
        assert_accounted(&queue);
    }

    let removed = queue.get_pending_items().last().map(|e| e.id.clone());
    if let Some(id) = removed {
        queue.remove(&id).await;
    }

    while !queue.is_idle() {
        assert!(queue.get_status().in_flight <= 2);
        assert_accounted(&queue);
        tokio::time::sleep(Duration::from_millis(3)).await;
    }

    assert!(processor.peak.load(Ordering::SeqCst) <= 2);
    assert_accounted(&queue);
    let status = queue.get_status();
    assert_eq!(status.completed + status.dead_letter, 7);
    assert_eq!(status.dead_letter, 3);
}

#[tokio::test]
async fn capacity_error_is_returned_to_caller() {
    let processor = Recorder::with_delay(1);
    let mut config = fast_queue(1);
    config.max_queue_size = 2;
    let (queue, _) = build(config, processor);
    queue.pause();

    queue.enqueue(record("a"), Priority::Low).await.unwrap();
    queue.enqueue(record("b"), Priority::Low).await.unwrap();
    let err = queue
        .enqueue(record("c"), Priority::High)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Capacity { max: 2 }));
    assert_eq!(queue.get_status().pending, 2);
}

#[tokio::test]
async fn completion_estimates_follow_pending_order() {
    let processor = Recorder::with_delay(1);
    let (queue, _) = build(fast_queue(2), processor);
    queue.pause();

    let low = queue.enqueue(record("low"), Priority::Low).await.unwrap();
    let high = queue.enqueue(record("high"), Priority::High).await.unwrap();

    let estimates = queue.get_completion_estimates();
    assert_eq!(estimates.len(), 2);
    assert_eq!(estimates[0].entry_id, high);
    assert_eq!(estimates[1].entry_id, low);
    assert!(estimates[0].estimated_completion_ms <= estimates[1].estimated_completion_ms);
}
