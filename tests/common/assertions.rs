//! Custom test assertions and mock mounts for integration tests

use std::time::Duration;
use tokio::sync::broadcast;
use vsync_client::{Event, SubscriptionTier};
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use super::TEST_API_KEY;

/// Mount a profile row for `user_id` with the given tier
pub async fn mount_profile(server: &MockServer, user_id: &str, tier: &str) {
    Mock::given(method("GET"))
        .and(path("/rest/v1/profiles"))
        .and(query_param("id", format!("eq.{}", user_id)))
        .and(header("apikey", TEST_API_KEY))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!([{ "subscription_tier": tier }])),
        )
        .mount(server)
        .await;
}

/// Mount the conversion endpoint with a fixed response
pub async fn mount_conversion(server: &MockServer, template: ResponseTemplate) {
    Mock::given(method("POST"))
        .and(path("/convert"))
        .respond_with(template)
        .mount(server)
        .await;
}

/// Wait for a `TierUpdated` event and return its tier
///
/// # Returns
/// `None` on timeout or when the channel closes
pub async fn wait_for_tier(
    events: &mut broadcast::Receiver<Event>,
    timeout: Duration,
) -> Option<SubscriptionTier> {
    tokio::time::timeout(timeout, async {
        loop {
            match events.recv().await {
                Ok(Event::TierUpdated { tier, .. }) => return Some(SubscriptionTier::from(tier)),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    })
    .await
    .ok()
    .flatten()
}

/// Collect every event already buffered on `events`
pub fn drain_events(events: &mut broadcast::Receiver<Event>) -> Vec<Event> {
    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }
    seen
}
