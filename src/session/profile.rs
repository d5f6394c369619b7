//! Subscription tier lookup.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

use super::SubscriptionTier;
use crate::config::ProfileStoreConfig;
use crate::error::{Error, Result};
use crate::types::UserId;

/// Source of a user's subscription tier
///
/// # Examples
///
/// ```no_run
/// use async_trait::async_trait;
/// use vsync_client::session::{ProfileStore, SubscriptionTier};
/// use vsync_client::{Result, UserId};
///
/// struct Everyone;
///
/// #[async_trait]
/// impl ProfileStore for Everyone {
///     async fn fetch_tier(&self, _user_id: &UserId) -> Result<Option<SubscriptionTier>> {
///         Ok(Some(SubscriptionTier::Pro))
///     }
/// }
/// ```
#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// Fetch the stored tier, `Ok(None)` when the user has no profile row
    async fn fetch_tier(&self, user_id: &UserId) -> Result<Option<SubscriptionTier>>;
}

#[derive(Debug, Deserialize)]
struct ProfileRow {
    subscription_tier: Option<String>,
}

/// Profile store backed by a PostgREST `profiles` table
///
/// Issues `GET {base}/profiles?select=subscription_tier&id=eq.{user_id}`.
pub struct PostgrestProfileStore {
    http_client: reqwest::Client,
    profiles_url: url::Url,
    api_key: String,
}

impl PostgrestProfileStore {
    /// Create a store from its connection settings
    ///
    /// # Errors
    /// Returns error if the base URL is invalid or the HTTP client cannot be created
    pub fn new(config: &ProfileStoreConfig, timeout: Option<Duration>) -> Result<Self> {
        let profiles_url = url::Url::parse(&format!(
            "{}/profiles",
            config.base_url.trim_end_matches('/')
        ))?;

        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let http_client = builder
            .build()
            .map_err(|e| Error::Other(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            profiles_url,
            api_key: config.api_key.clone(),
        })
    }
}

#[async_trait]
impl ProfileStore for PostgrestProfileStore {
    async fn fetch_tier(&self, user_id: &UserId) -> Result<Option<SubscriptionTier>> {
        let response = self
            .http_client
            .get(self.profiles_url.clone())
            .query(&[
                ("select", "subscription_tier".to_string()),
                ("id", format!("eq.{}", user_id)),
            ])
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Error::ProfileStore(format!(
                "profile lookup returned status {}",
                response.status()
            )));
        }

        let rows: Vec<ProfileRow> = response.json().await?;
        Ok(rows
            .into_iter()
            .next()
            .and_then(|row| row.subscription_tier)
            .filter(|tier| !tier.trim().is_empty())
            .map(SubscriptionTier::from))
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn store_for(server: &MockServer) -> PostgrestProfileStore {
        PostgrestProfileStore::new(
            &ProfileStoreConfig {
                base_url: format!("{}/rest/v1", server.uri()),
                api_key: "anon-key".into(),
            },
            None,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn fetches_tier_from_first_row() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/profiles"))
            .and(query_param("select", "subscription_tier"))
            .and(query_param("id", "eq.user-1"))
            .and(header("apikey", "anon-key"))
            .and(header("authorization", "Bearer anon-key"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!([{ "subscription_tier": "pro12" }])),
            )
            .expect(1)
            .mount(&server)
            .await;

        let tier = store_for(&server)
            .await
            .fetch_tier(&UserId::from("user-1"))
            .await
            .unwrap();

        assert_eq!(tier, Some(SubscriptionTier::Pro12));
    }

    #[tokio::test]
    async fn missing_row_is_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/profiles"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
            .mount(&server)
            .await;

        let tier = store_for(&server)
            .await
            .fetch_tier(&UserId::from("ghost"))
            .await
            .unwrap();

        assert_eq!(tier, None);
    }

    #[tokio::test]
    async fn null_tier_is_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!([{ "subscription_tier": null }])),
            )
            .mount(&server)
            .await;

        let tier = store_for(&server)
            .await
            .fetch_tier(&UserId::from("user-1"))
            .await
            .unwrap();

        assert_eq!(tier, None);
    }

    #[tokio::test]
    async fn error_status_is_profile_store_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(401).set_body_string("JWT expired"))
            .mount(&server)
            .await;

        let result = store_for(&server)
            .await
            .fetch_tier(&UserId::from("user-1"))
            .await;

        assert!(matches!(result, Err(Error::ProfileStore(_))));
    }

    #[test]
    fn invalid_base_url_is_rejected() {
        let result = PostgrestProfileStore::new(
            &ProfileStoreConfig {
                base_url: "::nope::".into(),
                api_key: "k".into(),
            },
            None,
        );
        assert!(matches!(result, Err(Error::InvalidUrl(_))));
    }
}
