//! Top-level client tying the session to its conversion workflow.

use crate::billing::BillingClient;
use crate::config::Config;
use crate::download::DownloadEmitter;
use crate::error::{Error, Result};
use crate::http::{ConversionClient, build_http_client};
use crate::session::{PostgrestProfileStore, ProfileStore, Session, SessionContext};
use crate::types::{Event, Identity};
use crate::workflow::{ConversionWorkflow, SubmitStep};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::info;

/// Capacity of the event channel; slow subscribers observe `Lagged`
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Client instance for one user (cloneable - all fields are Arc-wrapped)
#[derive(Clone)]
pub struct VsyncClient {
    config: Arc<Config>,
    session: SessionContext,
    workflow: ConversionWorkflow,
    billing: BillingClient,
    profile_store: Option<Arc<dyn ProfileStore>>,
    event_tx: broadcast::Sender<Event>,
}

impl VsyncClient {
    /// Build a client from validated config
    ///
    /// The profile store is created from `config.profile_store` when present.
    pub fn new(config: Config) -> Result<Self> {
        let store = match &config.profile_store {
            Some(store_config) => Some(Arc::new(PostgrestProfileStore::new(
                store_config,
                config.request_timeout,
            )?) as Arc<dyn ProfileStore>),
            None => None,
        };
        Self::with_profile_store(config, store)
    }

    /// Build a client with an explicit profile store
    pub fn with_profile_store(
        config: Config,
        profile_store: Option<Arc<dyn ProfileStore>>,
    ) -> Result<Self> {
        config.validate()?;

        let http_client = build_http_client(&config)?;
        let (event_tx, _rx) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        let workflow = ConversionWorkflow::new(
            ConversionClient::with_http_client(http_client.clone(), config.convert_url()?),
            DownloadEmitter::from_config(&config.download),
            event_tx.clone(),
        );
        let billing = BillingClient::with_http_client(http_client, &config)?;

        Ok(Self {
            config: Arc::new(config),
            session: SessionContext::new(event_tx.clone()),
            workflow,
            billing,
            profile_store,
            event_tx,
        })
    }

    /// Subscribe to session and workflow events
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Active configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Session context
    pub fn session(&self) -> &SessionContext {
        &self.session
    }

    /// Conversion workflow
    pub fn workflow(&self) -> &ConversionWorkflow {
        &self.workflow
    }

    /// Billing endpoints
    pub fn billing(&self) -> &BillingClient {
        &self.billing
    }

    /// Start a session and look up its tier in the background
    ///
    /// The returned session carries the baseline tier; the resolved tier is visible
    /// through [`SessionContext::tier`] and a `TierUpdated` event.
    pub async fn sign_in(&self, identity: Identity) -> Session {
        let session = self.session.sign_in(identity).await;
        if let Some(store) = &self.profile_store {
            self.session.spawn_tier_refresh(store.clone());
        }
        session
    }

    /// Submit the pending file on behalf of the current session
    pub async fn submit(&self) -> Result<SubmitStep> {
        let session = self.session.session().await.ok_or(Error::NotAuthenticated)?;
        self.workflow.submit(&session).await
    }

    /// End the session and discard all workflow state derived from it
    pub async fn logout(&self) {
        self.session.logout().await;
        self.workflow.reset().await;
        info!("local session state cleared");
    }
}
