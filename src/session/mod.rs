//! Authenticated session state.
//!
//! A [`SessionContext`] is either unauthenticated or holds exactly one [`Session`].
//! Signing in captures the identity and starts the tier at [`SubscriptionTier::Free`];
//! the real tier is filled in later by a single, non-retried [`ProfileStore`] lookup.
//! The tier only shapes which formats are *suggested*; nothing here is a security
//! boundary.

mod profile;


pub use profile::{PostgrestProfileStore, ProfileStore};

use crate::types::{Event, Identity, TargetFormat};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{RwLock, broadcast};
use tracing::{debug, info, warn};

/// Subscription plan of the signed-in user
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum SubscriptionTier {
    /// Baseline tier, also used until the profile lookup resolves
    #[default]
    Free,
    /// Basic monthly plan
    Basic,
    /// Pro monthly plan
    Pro,
    /// Pro quarterly plan
    Pro3,
    /// Pro yearly plan
    Pro12,
    /// Team quarterly plan
    Team3,
    /// Team yearly plan
    Team12,
    /// Lifetime grant (stored as `free66`)
    Lifetime,
    /// A tier id this client does not know
    Other(String),
}

const BASIC_FORMATS: &[TargetFormat] = &[TargetFormat::Csv, TargetFormat::Qbo];

impl SubscriptionTier {
    /// Tier id as stored in the profile
    pub fn as_str(&self) -> &str {
        match self {
            SubscriptionTier::Free => "free",
            SubscriptionTier::Basic => "basic",
            SubscriptionTier::Pro => "pro",
            SubscriptionTier::Pro3 => "pro3",
            SubscriptionTier::Pro12 => "pro12",
            SubscriptionTier::Team3 => "team3",
            SubscriptionTier::Team12 => "team12",
            SubscriptionTier::Lifetime => "free66",
            SubscriptionTier::Other(id) => id,
        }
    }

    /// Display label for the tier badge
    pub fn label(&self) -> &str {
        match self {
            SubscriptionTier::Free => "Free",
            SubscriptionTier::Basic => "Basic",
            SubscriptionTier::Pro => "Pro",
            SubscriptionTier::Pro3 => "Pro 3",
            SubscriptionTier::Pro12 => "Pro 12",
            SubscriptionTier::Team3 => "Team 3",
            SubscriptionTier::Team12 => "Team 12",
            SubscriptionTier::Lifetime => "Lifetime",
            SubscriptionTier::Other(id) => id,
        }
    }

    /// Formats to offer first for this tier
    ///
    /// A UX hint only. The service decides what a tier may convert to.
    pub fn suggested_formats(&self) -> &'static [TargetFormat] {
        match self {
            SubscriptionTier::Free | SubscriptionTier::Basic => BASIC_FORMATS,
            _ => &TargetFormat::ALL,
        }
    }

    /// Whether `format` is among the suggested formats
    pub fn suggests(&self, format: TargetFormat) -> bool {
        self.suggested_formats().contains(&format)
    }
}

impl From<String> for SubscriptionTier {
    fn from(id: String) -> Self {
        match id.trim() {
            "free" => SubscriptionTier::Free,
            "basic" => SubscriptionTier::Basic,
            "pro" => SubscriptionTier::Pro,
            "pro3" => SubscriptionTier::Pro3,
            "pro12" => SubscriptionTier::Pro12,
            "team3" => SubscriptionTier::Team3,
            "team12" => SubscriptionTier::Team12,
            "free66" => SubscriptionTier::Lifetime,
            _ => SubscriptionTier::Other(id),
        }
    }
}

impl From<&str> for SubscriptionTier {
    fn from(id: &str) -> Self {
        SubscriptionTier::from(id.to_string())
    }
}

impl From<SubscriptionTier> for String {
    fn from(tier: SubscriptionTier) -> Self {
        tier.as_str().to_string()
    }
}

impl std::fmt::Display for SubscriptionTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of the authenticated session
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Session {
    /// Signed-in identity
    pub identity: Identity,
    /// Current subscription tier
    pub tier: SubscriptionTier,
}

#[derive(Debug, Default)]
struct SessionState {
    session: Option<Session>,
    // Bumped on every sign-in and logout so late tier lookups can be discarded.
    generation: u64,
}

/// Owner of the session for one running client (cloneable - state is Arc-wrapped)
#[derive(Clone)]
pub struct SessionContext {
    state: Arc<RwLock<SessionState>>,
    event_tx: broadcast::Sender<Event>,
}

impl Default for SessionContext {
    fn default() -> Self {
        let (event_tx, _rx) = broadcast::channel(64);
        Self::new(event_tx)
    }
}

impl SessionContext {
    /// Create an unauthenticated context publishing on `event_tx`
    pub fn new(event_tx: broadcast::Sender<Event>) -> Self {
        Self {
            state: Arc::new(RwLock::new(SessionState::default())),
            event_tx,
        }
    }

    /// Enter the authenticated state with the baseline tier
    ///
    /// Replaces any existing session.
    pub async fn sign_in(&self, identity: Identity) -> Session {
        let session = Session {
            identity,
            tier: SubscriptionTier::default(),
        };

        let mut state = self.state.write().await;
        state.generation += 1;
        state.session = Some(session.clone());
        drop(state);

        info!(user_id = %session.identity.user_id, "session started");
        self.event_tx
            .send(Event::SessionStarted {
                user_id: session.identity.user_id.clone(),
            })
            .ok();
        session
    }

    /// Current session, if authenticated
    pub async fn session(&self) -> Option<Session> {
        self.state.read().await.session.clone()
    }

    /// Current identity, if authenticated
    pub async fn identity(&self) -> Option<Identity> {
        self.state
            .read()
            .await
            .session
            .as_ref()
            .map(|s| s.identity.clone())
    }

    /// Current tier; the baseline tier when unauthenticated
    pub async fn tier(&self) -> SubscriptionTier {
        self.state
            .read()
            .await
            .session
            .as_ref()
            .map(|s| s.tier.clone())
            .unwrap_or_default()
    }

    /// Whether a session is active
    pub async fn is_authenticated(&self) -> bool {
        self.state.read().await.session.is_some()
    }

    /// Look up the subscription tier once and apply it to the current session
    ///
    /// Failures and missing profiles leave the tier unchanged. A result that arrives
    /// after logout or a new sign-in is discarded. Returns the applied tier.
    pub async fn refresh_tier(&self, store: &dyn ProfileStore) -> Option<SubscriptionTier> {
        let (user_id, generation) = {
            let state = self.state.read().await;
            let session = state.session.as_ref()?;
            (session.identity.user_id.clone(), state.generation)
        };

        let tier = match store.fetch_tier(&user_id).await {
            Ok(Some(tier)) => tier,
            Ok(None) => {
                debug!(user_id = %user_id, "no profile found, keeping default tier");
                return None;
            }
            Err(e) => {
                warn!(user_id = %user_id, error = %e, "tier lookup failed, keeping default tier");
                return None;
            }
        };

        let mut state = self.state.write().await;
        if state.generation != generation {
            debug!(user_id = %user_id, "session changed during tier lookup, discarding result");
            return None;
        }
        let session = state.session.as_mut()?;
        session.tier = tier.clone();
        drop(state);

        info!(user_id = %user_id, tier = %tier, "subscription tier resolved");
        self.event_tx
            .send(Event::TierUpdated {
                user_id,
                tier: tier.as_str().to_string(),
            })
            .ok();
        Some(tier)
    }

    /// Run [`refresh_tier`](Self::refresh_tier) in the background
    pub fn spawn_tier_refresh(
        &self,
        store: Arc<dyn ProfileStore>,
    ) -> tokio::task::JoinHandle<Option<SubscriptionTier>> {
        let ctx = self.clone();
        tokio::spawn(async move { ctx.refresh_tier(store.as_ref()).await })
    }

    /// Return to the unauthenticated state, dropping all session-derived state
    pub async fn logout(&self) {
        let mut state = self.state.write().await;
        state.generation += 1;
        let ended = state.session.take();
        drop(state);

        if let Some(session) = ended {
            info!(user_id = %session.identity.user_id, "session ended");
            self.event_tx.send(Event::SessionEnded).ok();
        }
    }
}
