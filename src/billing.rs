//! Subscription checkout and billing portal.
//!
//! Both endpoints answer with `{ "url": ... }`; the caller redirects the user there.

use crate::config::Config;
use crate::error::{Error, Result};
use crate::http::build_http_client;
use crate::types::{Identity, UserId};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// A purchasable subscription plan
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct Plan {
    /// Tier id stored on the profile after purchase
    pub id: &'static str,
    /// Display name
    pub name: &'static str,
    /// Display price
    pub price: &'static str,
    /// Billing period suffix
    pub period: &'static str,
    /// Payment-provider price id
    pub price_id: &'static str,
    /// Feature bullet points
    pub features: &'static [&'static str],
    /// Highlighted in the plan picker
    pub recommended: bool,
}

/// Plans offered in the upgrade picker
pub const PLANS: &[Plan] = &[
    Plan {
        id: "basic",
        name: "Basic",
        price: "$7",
        period: "/mo",
        price_id: "price_1SX5yF5XXtc792l625r3suMc",
        features: &["50 Page Limit", "Formats: CSV, QBO"],
        recommended: false,
    },
    Plan {
        id: "pro",
        name: "Pro",
        price: "$9",
        period: "/mo",
        price_id: "price_1SX60r5XXtc792l6LWXSzfyt",
        features: &[
            "Unlimited Pages",
            "All Formats (IIF, Excel)",
            "Receipts & Invoices",
        ],
        recommended: true,
    },
    Plan {
        id: "pro3",
        name: "Pro 3",
        price: "$19",
        period: "/qtr",
        price_id: "price_1SX62W5XXtc792l6xAGss9r6",
        features: &["Same as Pro", "Save ~30%"],
        recommended: false,
    },
    Plan {
        id: "pro12",
        name: "Pro 12",
        price: "$57",
        period: "/yr",
        price_id: "price_1SX65J5XXtc792l6WxKOlHOp",
        features: &["Same as Pro", "Best Value"],
        recommended: false,
    },
    Plan {
        id: "team3",
        name: "Team 3",
        price: "$29",
        period: "/qtr",
        price_id: "price_1SYBSZ5XXtc792l6k80TTAPp",
        features: &["6 Simultaneous Logins", "Team Dashboard"],
        recommended: false,
    },
    Plan {
        id: "team12",
        name: "Team 12",
        price: "$67",
        period: "/yr",
        price_id: "price_1SYBTk5XXtc792l6axcP1rXh",
        features: &["50 Simultaneous Logins", "Enterprise Priority"],
        recommended: false,
    },
];

/// Look up a plan by tier id
pub fn plan(id: &str) -> Option<&'static Plan> {
    PLANS.iter().find(|p| p.id == id)
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CheckoutRequest<'a> {
    user_id: &'a str,
    price_id: &'a str,
    tier: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PortalRequest<'a> {
    user_id: &'a str,
    email: &'a str,
}

#[derive(Deserialize)]
struct RedirectResponse {
    url: Option<String>,
}

/// Client for the checkout-session and billing-portal endpoints
#[derive(Clone, Debug)]
pub struct BillingClient {
    http_client: reqwest::Client,
    checkout_url: url::Url,
    portal_url: url::Url,
}

impl BillingClient {
    /// Create a client for the configured endpoints
    pub fn new(config: &Config) -> Result<Self> {
        Self::with_http_client(build_http_client(config)?, config)
    }

    /// Create a client reusing an existing HTTP client
    pub fn with_http_client(http_client: reqwest::Client, config: &Config) -> Result<Self> {
        Ok(Self {
            http_client,
            checkout_url: config.checkout_url()?,
            portal_url: config.portal_url()?,
        })
    }

    /// Start a checkout for `plan` and return the payment page URL
    pub async fn create_checkout_session(&self, user_id: &UserId, plan: &Plan) -> Result<url::Url> {
        debug!(user_id = %user_id, plan = plan.id, "creating checkout session");
        let body = CheckoutRequest {
            user_id: user_id.as_str(),
            price_id: plan.price_id,
            tier: plan.id,
        };
        self.redirect(self.checkout_url.clone(), &body).await
    }

    /// Open the billing portal for `identity` and return its URL
    pub async fn create_portal_session(&self, identity: &Identity) -> Result<url::Url> {
        debug!(user_id = %identity.user_id, "creating billing portal session");
        let body = PortalRequest {
            user_id: identity.user_id.as_str(),
            email: &identity.email,
        };
        self.redirect(self.portal_url.clone(), &body).await
    }

    async fn redirect<T: Serialize + ?Sized>(&self, endpoint: url::Url, body: &T) -> Result<url::Url> {
        let response = self.http_client.post(endpoint).json(body).send().await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            warn!(status = %status, "billing request rejected");
            return Err(Error::Billing(format!(
                "billing service returned status {}: {}",
                status, text
            )));
        }

        let redirect: RedirectResponse = response.json().await?;
        let url = redirect
            .url
            .filter(|u| !u.trim().is_empty())
            .ok_or_else(|| Error::Billing("response did not include a redirect url".to_string()))?;
        url::Url::parse(&url)
            .map_err(|e| Error::Billing(format!("invalid redirect url '{}': {}", url, e)))
    }
}
