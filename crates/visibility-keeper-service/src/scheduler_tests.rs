//! Tests for the fixed-rate scheduler.
//!
//! Uses paused tokio time so periods elapse deterministically.

use super::*;
use async_trait::async_trait;
use std::sync::atomic::{AtomicU32, Ordering};
use visibility_runtime::{
    BatchExtensionOutcome, MessageId, QueueClient, QueueError, QueueUrl, ReceiptHandle,
    ReceiveRequest, ReceivedMessage, VisibilityExtension,
};

/// Minimal client that counts receive calls and can fail the first N of them
struct CountingClient {
    receive_calls: AtomicU32,
    failing_receives: AtomicU32,
}

impl CountingClient {
    fn new(failing_receives: u32) -> Self {
        Self {
            receive_calls: AtomicU32::new(0),
            failing_receives: AtomicU32::new(failing_receives),
        }
    }

    fn receive_count(&self) -> u32 {
        self.receive_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl QueueClient for CountingClient {
    async fn receive_messages(
        &self,
        _request: &ReceiveRequest,
    ) -> Result<Vec<ReceivedMessage>, QueueError> {
        self.receive_calls.fetch_add(1, Ordering::SeqCst);

        let remaining = self.failing_receives.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failing_receives.store(remaining - 1, Ordering::SeqCst);
            return Err(QueueError::ConnectionFailed {
                message: "injected".to_string(),
            });
        }

        Ok(Vec::new())
    }

    async fn change_visibility_batch(
        &self,
        _queue_url: &QueueUrl,
        entries: Vec<VisibilityExtension>,
    ) -> Result<BatchExtensionOutcome, QueueError> {
        Ok(BatchExtensionOutcome {
            succeeded: entries.iter().map(|e| e.id).collect(),
            failed: vec![],
        })
    }

    async fn change_visibility(
        &self,
        _queue_url: &QueueUrl,
        _receipt_handle: &ReceiptHandle,
        _timeout_seconds: u32,
    ) -> Result<(), QueueError> {
        Ok(())
    }

    async fn send_message(
        &self,
        _queue_url: &QueueUrl,
        _body: &str,
    ) -> Result<MessageId, QueueError> {
        Ok(MessageId::new())
    }
}

fn test_scheduler(
    client: Arc<CountingClient>,
    period: Duration,
) -> (Scheduler, watch::Sender<bool>) {
    let queue_url =
        QueueUrl::new("https://sqs.eu-west-1.amazonaws.com/123456789012/dlq".to_string()).unwrap();
    let keeper = Arc::new(VisibilityKeeper::new(client, queue_url, 10, 300).unwrap());
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    (Scheduler::new(keeper, period, shutdown_rx), shutdown_tx)
}

#[tokio::test(start_paused = true)]
async fn test_first_cycle_runs_immediately() {
    let client = Arc::new(CountingClient::new(0));
    let (scheduler, shutdown_tx) = test_scheduler(client.clone(), Duration::from_secs(60));

    let handle = tokio::spawn(scheduler.run());
    tokio::time::sleep(Duration::from_millis(1)).await;

    assert_eq!(client.receive_count(), 1);

    shutdown_tx.send(true).unwrap();
    handle.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_cycles_fire_once_per_period() {
    let client = Arc::new(CountingClient::new(0));
    let (scheduler, shutdown_tx) = test_scheduler(client.clone(), Duration::from_secs(60));

    let handle = tokio::spawn(scheduler.run());
    tokio::time::sleep(Duration::from_secs(125)).await;

    // Immediate first cycle plus one per elapsed period
    assert_eq!(client.receive_count(), 3);

    shutdown_tx.send(true).unwrap();
    handle.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_next_tick_fires_after_receive_error() {
    let client = Arc::new(CountingClient::new(1));
    let (scheduler, shutdown_tx) = test_scheduler(client.clone(), Duration::from_secs(60));

    let handle = tokio::spawn(scheduler.run());
    tokio::time::sleep(Duration::from_secs(65)).await;

    // The failed first cycle did not stop the schedule
    assert_eq!(client.receive_count(), 2);

    shutdown_tx.send(true).unwrap();
    handle.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_stops_the_loop() {
    let client = Arc::new(CountingClient::new(0));
    let (scheduler, shutdown_tx) = test_scheduler(client.clone(), Duration::from_secs(60));

    let handle = tokio::spawn(scheduler.run());
    tokio::time::sleep(Duration::from_millis(1)).await;

    shutdown_tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("scheduler should stop promptly after shutdown")
        .unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_dropped_shutdown_sender_stops_the_loop() {
    let client = Arc::new(CountingClient::new(0));
    let (scheduler, shutdown_tx) = test_scheduler(client.clone(), Duration::from_secs(60));

    let handle = tokio::spawn(scheduler.run());
    tokio::time::sleep(Duration::from_millis(1)).await;

    drop(shutdown_tx);
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("scheduler should stop when the sender is dropped")
        .unwrap();
}
