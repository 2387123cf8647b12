//! Shared helpers for integration tests.

use std::sync::Arc;
use visibility_keeper_service::keeper::VisibilityKeeper;
use visibility_runtime::{InMemoryConfig, InMemoryQueueClient, QueueClient, QueueUrl};

#[allow(dead_code)]
pub const VISIBILITY_TIMEOUT_SECS: u32 = 300;

pub fn test_queue_url() -> QueueUrl {
    QueueUrl::new("https://sqs.eu-west-1.amazonaws.com/123456789012/dlq".to_string()).unwrap()
}

/// An in-memory queue plus a keeper polling it with the default batch size
#[allow(dead_code)]
pub fn keeper_setup() -> (Arc<InMemoryQueueClient>, VisibilityKeeper, QueueUrl) {
    let client = Arc::new(InMemoryQueueClient::new(InMemoryConfig::default()));
    let queue_url = test_queue_url();
    let keeper = VisibilityKeeper::new(
        client.clone(),
        queue_url.clone(),
        10,
        VISIBILITY_TIMEOUT_SECS,
    )
    .unwrap();

    (client, keeper, queue_url)
}

/// Seed the queue with `count` messages
#[allow(dead_code)]
pub async fn seed_messages(client: &InMemoryQueueClient, queue_url: &QueueUrl, count: usize) {
    for i in 0..count {
        client
            .send_message(queue_url, &format!("seeded message {}", i))
            .await
            .unwrap();
    }
}
