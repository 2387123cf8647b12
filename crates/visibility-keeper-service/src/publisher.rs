//! Test-message publisher endpoint.
//!
//! `POST /api/messages` fans a fixed burst of UUID-bodied messages into the
//! queue through the shared client. Send failures are logged and counted in
//! the response; they never affect the keeper.

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{error, info};
use visibility_runtime::{QueueClient, QueueUrl};

#[cfg(test)]
#[path = "publisher_tests.rs"]
mod tests;

/// Shared state for the publisher routes
#[derive(Clone)]
pub struct PublisherState {
    pub client: Arc<dyn QueueClient>,
    pub queue_url: QueueUrl,
    pub burst_size: u32,
}

/// Build the publisher router
pub fn router(state: PublisherState) -> Router {
    Router::new()
        .route("/api/messages", post(publish_burst))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}

/// Publish `burst_size` messages with random UUID bodies
async fn publish_burst(State(state): State<PublisherState>) -> (StatusCode, Json<Value>) {
    let mut published = 0u32;
    let mut failed = 0u32;

    for _ in 0..state.burst_size {
        let body = format!("message from queue publisher {}", uuid::Uuid::new_v4());
        match state.client.send_message(&state.queue_url, &body).await {
            Ok(_) => published += 1,
            Err(error) => {
                failed += 1;
                error!(
                    queue_url = %state.queue_url,
                    error = %error,
                    "Failed to publish test message"
                );
            }
        }
    }

    info!(
        queue_url = %state.queue_url,
        published = published,
        failed = failed,
        "Published test message burst"
    );

    (
        StatusCode::ACCEPTED,
        Json(json!({
            "published": published,
            "failed": failed,
        })),
    )
}
