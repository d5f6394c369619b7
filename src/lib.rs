//! # vsync-client
//!
//! Client library for the Vsync statement conversion service.
//!
//! A signed-in user selects a bank statement (PDF, image, Word or Excel), picks one
//! of nine accounting formats and submits it. The service may attach two trust
//! signals to its answer: a fraud warning that must be acknowledged before the
//! converted file is delivered, and a reconciliation verdict that is shown alongside
//! whatever the outcome was.
//!
//! ## Design
//!
//! - **Explicit session** - [`SessionContext`] is created on sign-in and torn down on
//!   logout; the workflow receives the session as an argument
//! - **Resumable confirmation** - a fraud warning pauses the workflow in
//!   [`WorkflowState::AwaitingConfirmation`] until `confirm()` or `decline()`
//! - **Outcomes, not errors** - rejections and transport failures are
//!   [`ConversionOutcome`] values; errors are reserved for misuse and local I/O
//! - **Event-driven** - consumers subscribe to [`Event`]s, no polling required
//!
//! ## Quick Start
//!
//! ```no_run
//! use vsync_client::{Config, Identity, SubmitStep, TargetFormat, VsyncClient};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = VsyncClient::new(Config::default())?;
//!     client
//!         .sign_in(Identity::new("user-1", "alice@example.com"))
//!         .await;
//!
//!     let workflow = client.workflow();
//!     workflow
//!         .select_file_from_path(std::path::Path::new("jan.pdf"))
//!         .await?;
//!     workflow.set_format(TargetFormat::Qbo).await?;
//!
//!     let outcome = match client.submit().await? {
//!         SubmitStep::Resolved(outcome) => outcome,
//!         SubmitStep::ConfirmationRequired { warning } => {
//!             eprintln!("SECURITY WARNING: {warning}");
//!             workflow.decline().await?
//!         }
//!     };
//!     println!("{outcome:?}");
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Subscription checkout and billing portal
pub mod billing;
/// Top-level client
pub mod client;
/// Configuration types
pub mod config;
/// Saving converted files
pub mod download;
/// Error types
pub mod error;
/// Conversion endpoint transport
pub mod http;
/// Trust-signal and filename decoding
pub mod interpreter;
/// Authenticated session state
pub mod session;
/// Core types and events
pub mod types;
/// Conversion workflow state machine
pub mod workflow;

// Re-export commonly used types
pub use billing::{BillingClient, PLANS, Plan};
pub use client::VsyncClient;
pub use config::{Config, DownloadConfig, FileCollisionAction, ProfileStoreConfig};
pub use download::DownloadEmitter;
pub use error::{CallerError, Error, Result};
pub use http::{ConversionClient, ConversionRequest};
pub use interpreter::{Reconciliation, TrustSignals};
pub use session::{
    PostgrestProfileStore, ProfileStore, Session, SessionContext, SubscriptionTier,
};
pub use types::{ConversionOutcome, Event, Identity, PendingFile, TargetFormat, UserId};
pub use workflow::{ConversionWorkflow, SubmitStep, WorkflowState};
