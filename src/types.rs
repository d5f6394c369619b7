//! Core types for vsync-client

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::Error;
use crate::interpreter::Reconciliation;

/// Identity-provider user identifier
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

impl UserId {
    /// Create a new UserId
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the raw identifier
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Authenticated identity as issued by the identity provider
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Provider-assigned user id, sent as `userId` on every request
    pub user_id: UserId,
    /// Account email address
    pub email: String,
}

impl Identity {
    /// Create an identity from its parts
    pub fn new(user_id: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            user_id: UserId::new(user_id),
            email: email.into(),
        }
    }
}

/// Target conversion format
///
/// The set is closed: the remote service accepts exactly these nine tokens.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TargetFormat {
    /// Comma-separated values
    #[default]
    #[serde(rename = "CSV")]
    Csv,
    /// QuickBooks Online web connect
    #[serde(rename = "QBO")]
    Qbo,
    /// QuickBooks Desktop interchange
    #[serde(rename = "IIF")]
    Iif,
    /// Excel workbook
    Excel,
    /// Raw JSON data
    #[serde(rename = "JSON")]
    Json,
    /// Open Financial Exchange
    #[serde(rename = "OFX")]
    Ofx,
    /// Quicken web connect
    #[serde(rename = "QFX")]
    Qfx,
    /// BAI2 cash management
    #[serde(rename = "BAI2")]
    Bai2,
    /// SWIFT MT940 statement
    #[serde(rename = "MT940")]
    Mt940,
}

impl TargetFormat {
    /// All formats in picker order
    pub const ALL: [TargetFormat; 9] = [
        TargetFormat::Csv,
        TargetFormat::Qbo,
        TargetFormat::Iif,
        TargetFormat::Excel,
        TargetFormat::Json,
        TargetFormat::Ofx,
        TargetFormat::Qfx,
        TargetFormat::Bai2,
        TargetFormat::Mt940,
    ];

    /// Wire token sent in the `format` field
    pub fn token(&self) -> &'static str {
        match self {
            TargetFormat::Csv => "CSV",
            TargetFormat::Qbo => "QBO",
            TargetFormat::Iif => "IIF",
            TargetFormat::Excel => "Excel",
            TargetFormat::Json => "JSON",
            TargetFormat::Ofx => "OFX",
            TargetFormat::Qfx => "QFX",
            TargetFormat::Bai2 => "BAI2",
            TargetFormat::Mt940 => "MT940",
        }
    }

    /// Human-readable label naming the consuming software
    pub fn label(&self) -> &'static str {
        match self {
            TargetFormat::Csv => "CSV (Excel/Xero)",
            TargetFormat::Qbo => "QBO (QuickBooks Online)",
            TargetFormat::Iif => "IIF (QuickBooks Desktop)",
            TargetFormat::Excel => "Excel (.xlsx)",
            TargetFormat::Json => "JSON (Raw Data)",
            TargetFormat::Ofx => "OFX (Money/Standard)",
            TargetFormat::Qfx => "QFX (Quicken)",
            TargetFormat::Bai2 => "BAI2 (Cash Management)",
            TargetFormat::Mt940 => "MT940 (SWIFT)",
        }
    }

    /// File extension of the converted artifact
    pub fn extension(&self) -> &'static str {
        crate::interpreter::extension_for(*self)
    }
}

impl std::fmt::Display for TargetFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.token())
    }
}

impl std::str::FromStr for TargetFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TargetFormat::ALL
            .into_iter()
            .find(|format| format.token().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| Error::InvalidFormat(s.to_string()))
    }
}

/// The statement file chosen for conversion
#[derive(Clone, PartialEq, Eq)]
pub struct PendingFile {
    /// Name shown to the user and sent as the multipart filename
    pub display_name: String,
    /// Raw file contents
    pub bytes: Vec<u8>,
    /// MIME type of the statement
    pub mime_type: String,
}

impl PendingFile {
    /// Create a pending file
    pub fn new(
        display_name: impl Into<String>,
        bytes: impl Into<Vec<u8>>,
        mime_type: impl Into<String>,
    ) -> Self {
        Self {
            display_name: display_name.into(),
            bytes: bytes.into(),
            mime_type: mime_type.into(),
        }
    }

    /// Size of the file in bytes
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Whether the file has no content
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

// Statement bytes are kept out of debug output.
impl std::fmt::Debug for PendingFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingFile")
            .field("display_name", &self.display_name)
            .field("len", &self.bytes.len())
            .field("mime_type", &self.mime_type)
            .finish()
    }
}

/// Guess the MIME type of a statement from its file extension
///
/// Covers the inputs the conversion service accepts (PDF, images, Word and Excel);
/// anything else is sent as `application/octet-stream`.
pub fn mime_type_for(file_name: &str) -> &'static str {
    let extension = std::path::Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());

    match extension.as_deref() {
        Some("pdf") => "application/pdf",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("docx") => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        Some("xlsx") => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        Some("xls") => "application/vnd.ms-excel",
        _ => "application/octet-stream",
    }
}

/// Terminal result of one conversion attempt
#[derive(Clone, PartialEq, Eq)]
pub enum ConversionOutcome {
    /// The service returned a converted artifact
    Success {
        /// Converted artifact
        bytes: Vec<u8>,
        /// Save filename derived from the original file and format
        filename: String,
        /// Where the artifact was written, if saving succeeded
        saved_to: Option<PathBuf>,
    },
    /// The user declined a fraud warning; no file was produced
    SecurityDeclined,
    /// The service rejected the file; carries the server's message verbatim
    ServerRejected(String),
    /// No response was obtained from the service
    NetworkFailed(String),
}

impl ConversionOutcome {
    /// Whether the attempt produced a file
    pub fn is_success(&self) -> bool {
        matches!(self, ConversionOutcome::Success { .. })
    }

    /// Message to show for failed attempts
    pub fn error_message(&self) -> Option<&str> {
        match self {
            ConversionOutcome::ServerRejected(message)
            | ConversionOutcome::NetworkFailed(message) => Some(message),
            _ => None,
        }
    }
}

impl std::fmt::Debug for ConversionOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConversionOutcome::Success {
                bytes,
                filename,
                saved_to,
            } => f
                .debug_struct("Success")
                .field("len", &bytes.len())
                .field("filename", filename)
                .field("saved_to", saved_to)
                .finish(),
            ConversionOutcome::SecurityDeclined => f.write_str("SecurityDeclined"),
            ConversionOutcome::ServerRejected(m) => {
                f.debug_tuple("ServerRejected").field(m).finish()
            }
            ConversionOutcome::NetworkFailed(m) => f.debug_tuple("NetworkFailed").field(m).finish(),
        }
    }
}

/// Event emitted by the session and conversion workflow
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A user signed in
    SessionStarted {
        /// Signed-in user
        user_id: UserId,
    },

    /// The subscription tier was resolved from the profile store
    TierUpdated {
        /// Signed-in user
        user_id: UserId,
        /// Tier id as stored in the profile
        tier: String,
    },

    /// The session was torn down
    SessionEnded,

    /// A statement file was selected
    FileSelected {
        /// Display name of the file
        name: String,
        /// Size in bytes
        size_bytes: u64,
    },

    /// Target format changed
    FormatChanged {
        /// New format
        format: TargetFormat,
    },

    /// A conversion request was issued
    Submitting {
        /// Display name of the file
        name: String,
        /// Requested format
        format: TargetFormat,
    },

    /// The response carried a fraud warning and awaits a decision
    ConfirmationRequired {
        /// Warning text from the service
        warning: String,
    },

    /// The user declined the fraud warning
    SecurityDeclined,

    /// The response carried a reconciliation verdict
    ReconciliationReported {
        /// Verdict as decoded from the header
        reconciliation: Reconciliation,
    },

    /// A converted file was produced
    ConversionSucceeded {
        /// Save filename
        filename: String,
        /// Where the file was written, if saving succeeded
        #[serde(skip_serializing_if = "Option::is_none")]
        saved_to: Option<PathBuf>,
    },

    /// The service rejected the conversion
    ConversionRejected {
        /// Server message
        message: String,
    },

    /// The request failed before a response was obtained
    ConversionNetworkFailed {
        /// Transport error message
        message: String,
    },
}
