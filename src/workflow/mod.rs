//! Conversion-session workflow.
//!
//! The workflow owns the selected file, the target format and the result of the last
//! attempt. Its states are:
//!
//! ```text
//! Idle ──select──▶ FileSelected ──submit──▶ Submitting ──▶ Resolved
//!                      ▲                        │
//!                      │ decline                ▼ fraud warning
//!                      └────────────── AwaitingConfirmation ──confirm──▶ Resolved
//! ```
//!
//! State lives behind a mutex that is never held across a network await, so a
//! concurrent `submit` observes `Submitting` and is rejected instead of queued.
//!
//! - [`submission`] - request issue, trust-signal gating and outcome resolution

mod submission;

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

pub use submission::SubmitStep;

use crate::config::Config;
use crate::download::DownloadEmitter;
use crate::error::{CallerError, Error, Result};
use crate::http::ConversionClient;
use crate::interpreter::Reconciliation;
use crate::types::{ConversionOutcome, Event, PendingFile, TargetFormat, mime_type_for};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::{Mutex, broadcast};
use tracing::debug;

/// Observable workflow state
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WorkflowState {
    /// No file selected
    Idle,
    /// File and format chosen; submission enabled
    FileSelected,
    /// Request or response body in flight; controls locked
    Submitting,
    /// Response carries a fraud warning awaiting confirm or decline
    AwaitingConfirmation,
    /// Last attempt finished with an outcome
    Resolved,
}

/// A response held unread while the user decides on its fraud warning
pub(crate) struct PausedResponse {
    pub(crate) response: reqwest::Response,
    pub(crate) warning: String,
    pub(crate) file_name: String,
    pub(crate) format: TargetFormat,
}

pub(crate) enum Phase {
    Idle,
    FileSelected,
    Submitting,
    AwaitingConfirmation(Box<PausedResponse>),
    Resolved,
}

impl Phase {
    fn state(&self) -> WorkflowState {
        match self {
            Phase::Idle => WorkflowState::Idle,
            Phase::FileSelected => WorkflowState::FileSelected,
            Phase::Submitting => WorkflowState::Submitting,
            Phase::AwaitingConfirmation(_) => WorkflowState::AwaitingConfirmation,
            Phase::Resolved => WorkflowState::Resolved,
        }
    }

    fn is_locked(&self) -> bool {
        matches!(self, Phase::Submitting | Phase::AwaitingConfirmation(_))
    }
}

pub(crate) struct WorkflowInner {
    pub(crate) phase: Phase,
    pub(crate) pending: Option<PendingFile>,
    pub(crate) format: TargetFormat,
    pub(crate) outcome: Option<ConversionOutcome>,
    pub(crate) reconciliation: Option<Reconciliation>,
    // Bumped per submission and on reset; late results from an older attempt are dropped.
    pub(crate) attempt: u64,
    // A request is on the wire, possibly for an attempt orphaned by `reset`.
    pub(crate) in_flight: bool,
}

impl WorkflowInner {
    fn settled_phase(&self) -> Phase {
        if self.pending.is_some() {
            Phase::FileSelected
        } else {
            Phase::Idle
        }
    }
}

/// One user's conversion workflow (cloneable - state is Arc-wrapped)
#[derive(Clone)]
pub struct ConversionWorkflow {
    pub(crate) inner: Arc<Mutex<WorkflowInner>>,
    pub(crate) client: ConversionClient,
    pub(crate) emitter: DownloadEmitter,
    pub(crate) event_tx: broadcast::Sender<Event>,
}

impl ConversionWorkflow {
    /// Create an idle workflow
    pub fn new(
        client: ConversionClient,
        emitter: DownloadEmitter,
        event_tx: broadcast::Sender<Event>,
    ) -> Self {
        Self {
            inner: Arc::new(Mutex::new(WorkflowInner {
                phase: Phase::Idle,
                pending: None,
                format: TargetFormat::default(),
                outcome: None,
                reconciliation: None,
                attempt: 0,
                in_flight: false,
            })),
            client,
            emitter,
            event_tx,
        }
    }

    /// Create an idle workflow from config
    pub fn from_config(config: &Config, event_tx: broadcast::Sender<Event>) -> Result<Self> {
        Ok(Self::new(
            ConversionClient::new(config)?,
            DownloadEmitter::from_config(&config.download),
            event_tx,
        ))
    }

    /// Select the statement to convert, replacing any pending file
    ///
    /// Clears the previous outcome and reconciliation verdict.
    pub async fn select_file(&self, file: PendingFile) -> Result<()> {
        let mut inner = self.inner.lock().await;
        if inner.phase.is_locked() {
            return Err(CallerError::ControlsLocked.into());
        }

        let event = Event::FileSelected {
            name: file.display_name.clone(),
            size_bytes: file.len() as u64,
        };
        debug!(name = %file.display_name, size = file.len(), "file selected");
        inner.pending = Some(file);
        inner.outcome = None;
        inner.reconciliation = None;
        inner.phase = Phase::FileSelected;
        drop(inner);

        self.event_tx.send(event).ok();
        Ok(())
    }

    /// Read a statement from disk and select it
    pub async fn select_file_from_path(&self, path: &Path) -> Result<()> {
        let display_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| Error::InvalidPath {
                path: path.to_path_buf(),
                reason: "path has no file name".to_string(),
            })?;

        let bytes = tokio::fs::read(path).await.map_err(|e| {
            Error::Io(std::io::Error::new(
                e.kind(),
                format!("Failed to read statement '{}': {}", path.display(), e),
            ))
        })?;

        let mime_type = mime_type_for(&display_name);
        self.select_file(PendingFile::new(display_name, bytes, mime_type))
            .await
    }

    /// Change the target format
    ///
    /// Keeps the pending file and clears the previous outcome.
    pub async fn set_format(&self, format: TargetFormat) -> Result<()> {
        let mut inner = self.inner.lock().await;
        if inner.phase.is_locked() {
            return Err(CallerError::ControlsLocked.into());
        }

        inner.format = format;
        inner.outcome = None;
        inner.reconciliation = None;
        inner.phase = inner.settled_phase();
        drop(inner);

        debug!(format = %format, "format changed");
        self.event_tx.send(Event::FormatChanged { format }).ok();
        Ok(())
    }

    /// Drop the pending file, any paused response and the last outcome
    ///
    /// The target format is kept. A request still in flight resolves into nothing, and
    /// `submit` keeps rejecting with `SubmissionInFlight` until it has finished.
    pub async fn reset(&self) {
        let mut inner = self.inner.lock().await;
        inner.attempt += 1;
        inner.phase = Phase::Idle;
        inner.pending = None;
        inner.outcome = None;
        inner.reconciliation = None;
    }

    /// Current state
    pub async fn state(&self) -> WorkflowState {
        self.inner.lock().await.phase.state()
    }

    /// The selected file, if any
    pub async fn pending_file(&self) -> Option<PendingFile> {
        self.inner.lock().await.pending.clone()
    }

    /// Current target format
    pub async fn format(&self) -> TargetFormat {
        self.inner.lock().await.format
    }

    /// Outcome of the last attempt
    pub async fn last_outcome(&self) -> Option<ConversionOutcome> {
        self.inner.lock().await.outcome.clone()
    }

    /// Reconciliation verdict of the last attempt
    pub async fn reconciliation(&self) -> Option<Reconciliation> {
        self.inner.lock().await.reconciliation.clone()
    }

    /// Fraud warning awaiting a decision
    pub async fn pending_warning(&self) -> Option<String> {
        match &self.inner.lock().await.phase {
            Phase::AwaitingConfirmation(paused) => Some(paused.warning.clone()),
            _ => None,
        }
    }

    /// Whether a submission would be accepted right now
    pub async fn can_submit(&self) -> bool {
        let inner = self.inner.lock().await;
        !inner.phase.is_locked() && !inner.in_flight && inner.pending.is_some()
    }
}
