//! Request issue, trust-signal gating and outcome resolution.

use crate::error::{CallerError, Result};
use crate::http::ConversionRequest;
use crate::interpreter;
use crate::session::Session;
use crate::types::{ConversionOutcome, Event, TargetFormat};
use tracing::{debug, error, info, warn};

use super::{ConversionWorkflow, PausedResponse, Phase};

/// Message shown when the service rejects a file without saying why
const DEFAULT_REJECTION: &str = "Conversion failed.";

/// Result of [`ConversionWorkflow::submit`]
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SubmitStep {
    /// The attempt finished
    Resolved(ConversionOutcome),
    /// The response carries a fraud warning; call `confirm` or `decline`
    ConfirmationRequired {
        /// Warning text from the service, verbatim
        warning: String,
    },
}

impl ConversionWorkflow {
    /// Submit the pending file for conversion
    ///
    /// Rejected before any I/O when no file is selected, while a request is in flight
    /// or while a fraud warning awaits a decision. Transport failures and server
    /// rejections are outcomes, not errors. Nothing is retried.
    pub async fn submit(&self, session: &Session) -> Result<SubmitStep> {
        let (request, attempt) = {
            let mut inner = self.inner.lock().await;
            match inner.phase {
                Phase::Submitting => return Err(CallerError::SubmissionInFlight.into()),
                Phase::AwaitingConfirmation(_) => {
                    return Err(CallerError::ConfirmationPending.into());
                }
                Phase::Idle | Phase::FileSelected | Phase::Resolved => {}
            }
            if inner.in_flight {
                return Err(CallerError::SubmissionInFlight.into());
            }
            let request =
                ConversionRequest::new(inner.pending.as_ref(), inner.format, &session.identity)?;

            inner.attempt += 1;
            inner.in_flight = true;
            inner.phase = Phase::Submitting;
            inner.outcome = None;
            inner.reconciliation = None;
            (request, inner.attempt)
        };

        let file_name = request.file().display_name.clone();
        let format = request.format();
        info!(
            user_id = %session.identity.user_id,
            file = %file_name,
            format = %format,
            "submitting conversion"
        );
        self.event_tx
            .send(Event::Submitting {
                name: file_name.clone(),
                format,
            })
            .ok();

        let response = match self.client.send(request).await {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "conversion request failed before a response");
                let outcome = ConversionOutcome::NetworkFailed(network_message(&e));
                self.resolve(attempt, outcome.clone()).await;
                return Ok(SubmitStep::Resolved(outcome));
            }
        };

        // The warning gates everything else, including the reconciliation header.
        if let Some(warning) = interpreter::fraud_warning(response.headers()) {
            let mut inner = self.inner.lock().await;
            inner.in_flight = false;
            if inner.attempt != attempt {
                // Reset while in flight: nobody is left to acknowledge the warning.
                return Ok(SubmitStep::Resolved(ConversionOutcome::SecurityDeclined));
            }
            debug!(warning = %warning, "fraud warning received, awaiting confirmation");
            inner.phase = Phase::AwaitingConfirmation(Box::new(PausedResponse {
                response,
                warning: warning.clone(),
                file_name,
                format,
            }));
            drop(inner);

            info!("conversion paused on fraud warning");
            self.event_tx
                .send(Event::ConfirmationRequired {
                    warning: warning.clone(),
                })
                .ok();
            return Ok(SubmitStep::ConfirmationRequired { warning });
        }

        let outcome = self.finish(attempt, response, &file_name, format).await;
        Ok(SubmitStep::Resolved(outcome))
    }

    /// Acknowledge the fraud warning and continue with the paused response
    pub async fn confirm(&self) -> Result<ConversionOutcome> {
        let (paused, attempt) = self.take_paused().await?;
        info!("fraud warning acknowledged, continuing conversion");
        let PausedResponse {
            response,
            file_name,
            format,
            ..
        } = *paused;
        Ok(self.finish(attempt, response, &file_name, format).await)
    }

    /// Decline the fraud warning, abandoning the attempt without reading the body
    ///
    /// The pending file and format are kept so the user can retry or pick another file.
    pub async fn decline(&self) -> Result<ConversionOutcome> {
        let mut inner = self.inner.lock().await;
        let paused = match std::mem::replace(&mut inner.phase, Phase::FileSelected) {
            Phase::AwaitingConfirmation(paused) => paused,
            other => {
                inner.phase = other;
                return Err(CallerError::NoConfirmationPending.into());
            }
        };
        inner.phase = inner.settled_phase();
        inner.outcome = Some(ConversionOutcome::SecurityDeclined);
        drop(inner);
        // Dropping the response closes it unread.
        drop(paused);

        info!("fraud warning declined, conversion abandoned");
        self.event_tx.send(Event::SecurityDeclined).ok();
        Ok(ConversionOutcome::SecurityDeclined)
    }

    async fn take_paused(&self) -> Result<(Box<PausedResponse>, u64)> {
        let mut inner = self.inner.lock().await;
        match std::mem::replace(&mut inner.phase, Phase::Submitting) {
            Phase::AwaitingConfirmation(paused) => {
                inner.in_flight = true;
                Ok((paused, inner.attempt))
            }
            other => {
                inner.phase = other;
                Err(CallerError::NoConfirmationPending.into())
            }
        }
    }

    /// Steps after the fraud gate: reconciliation, status check, body, save.
    async fn finish(
        &self,
        attempt: u64,
        response: reqwest::Response,
        file_name: &str,
        format: TargetFormat,
    ) -> ConversionOutcome {
        if let Some(reconciliation) = interpreter::reconciliation(response.headers()) {
            debug!(reconciliation = ?reconciliation, "reconciliation verdict received");
            let mut inner = self.inner.lock().await;
            if inner.attempt == attempt {
                inner.reconciliation = Some(reconciliation.clone());
                drop(inner);
                self.event_tx
                    .send(Event::ReconciliationReported { reconciliation })
                    .ok();
            }
        }

        let status = response.status();
        if !status.is_success() {
            let outcome = match response.text().await {
                Ok(text) if text.is_empty() => {
                    ConversionOutcome::ServerRejected(DEFAULT_REJECTION.to_string())
                }
                Ok(text) => ConversionOutcome::ServerRejected(text),
                Err(e) => ConversionOutcome::NetworkFailed(network_message(&e)),
            };
            warn!(status = %status, "conversion rejected by service");
            self.resolve(attempt, outcome.clone()).await;
            return outcome;
        }

        let bytes = match response.bytes().await {
            Ok(bytes) => bytes.to_vec(),
            Err(e) => {
                warn!(error = %e, "failed to read converted file");
                let outcome = ConversionOutcome::NetworkFailed(network_message(&e));
                self.resolve(attempt, outcome.clone()).await;
                return outcome;
            }
        };

        let filename = interpreter::save_filename(file_name, format);
        let stale = {
            let mut inner = self.inner.lock().await;
            let stale = inner.attempt != attempt;
            if stale {
                inner.in_flight = false;
            }
            stale
        };
        if stale {
            debug!(filename = %filename, "workflow was reset during the attempt, not saving");
            return ConversionOutcome::Success {
                bytes,
                filename,
                saved_to: None,
            };
        }
        let saved_to = match self.emitter.emit(&bytes, &filename).await {
            Ok(path) => Some(path),
            Err(e) => {
                error!(filename = %filename, error = %e, "failed to save converted file");
                None
            }
        };

        info!(filename = %filename, size = bytes.len(), "conversion succeeded");
        let outcome = ConversionOutcome::Success {
            bytes,
            filename,
            saved_to,
        };
        self.resolve(attempt, outcome.clone()).await;
        outcome
    }

    /// Record the outcome of `attempt` unless the workflow moved on
    async fn resolve(&self, attempt: u64, outcome: ConversionOutcome) {
        let mut inner = self.inner.lock().await;
        inner.in_flight = false;
        if inner.attempt != attempt {
            debug!("workflow was reset during the attempt, discarding outcome");
            return;
        }
        if outcome.is_success() {
            inner.pending = None;
        }
        inner.phase = Phase::Resolved;
        inner.outcome = Some(outcome.clone());
        drop(inner);

        let event = match outcome {
            ConversionOutcome::Success {
                filename, saved_to, ..
            } => Event::ConversionSucceeded { filename, saved_to },
            ConversionOutcome::ServerRejected(message) => Event::ConversionRejected { message },
            ConversionOutcome::NetworkFailed(message) => {
                Event::ConversionNetworkFailed { message }
            }
            ConversionOutcome::SecurityDeclined => Event::SecurityDeclined,
        };
        self.event_tx.send(event).ok();
    }
}

fn network_message(e: &reqwest::Error) -> String {
    if e.is_timeout() {
        "The conversion service did not respond in time.".to_string()
    } else if e.is_connect() {
        format!("Could not reach the conversion service: {}", e)
    } else {
        format!("Network error: {}", e)
    }
}
