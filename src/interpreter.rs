//! Decoding of conversion responses: trust-signal headers and save filenames.
//!
//! Everything here is pure. The workflow decides *when* each signal is read (the
//! fraud warning strictly before the body, reconciliation only once the warning has
//! been acknowledged); this module only decides *what* a header means.

use reqwest::header::HeaderMap;
use serde::{Deserialize, Serialize};

use crate::types::TargetFormat;

/// Header carrying a free-text tampering warning
pub const FRAUD_WARNING_HEADER: &str = "x-fraud-warning";

/// Header carrying the bookkeeping reconciliation verdict
pub const RECONCILIATION_HEADER: &str = "x-reconciliation-status";

const BALANCED: &str = "BALANCED";
const IMBALANCE_PREFIX: &str = "IMBALANCE: ";

/// Prefix prepended to every saved artifact
pub const SAVE_PREFIX: &str = "Vsync-";

/// Reconciliation verdict reported by the service
///
/// The imbalance amount is kept as the exact text the service sent. Its precision,
/// currency and sign convention are not part of the contract.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "value", rename_all = "snake_case")]
pub enum Reconciliation {
    /// Computed and expected balances agree
    Balanced,
    /// Balances differ by the given amount
    Imbalance(String),
    /// A verdict this client does not understand, shown verbatim
    Unrecognized(String),
}

impl Reconciliation {
    /// Decode a raw header value
    ///
    /// Returns `None` for an empty value. Never fails on unexpected content.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }
        if raw == BALANCED {
            return Some(Reconciliation::Balanced);
        }
        match raw.strip_prefix(IMBALANCE_PREFIX) {
            Some(amount) => Some(Reconciliation::Imbalance(amount.to_string())),
            None => Some(Reconciliation::Unrecognized(raw.to_string())),
        }
    }

    /// Whether the statement balanced
    pub fn is_balanced(&self) -> bool {
        matches!(self, Reconciliation::Balanced)
    }

    /// The delta to display, if any
    pub fn value(&self) -> Option<&str> {
        match self {
            Reconciliation::Balanced => None,
            Reconciliation::Imbalance(value) | Reconciliation::Unrecognized(value) => Some(value),
        }
    }

    /// Short status line
    pub fn headline(&self) -> &'static str {
        match self {
            Reconciliation::Balanced => "Reconciliation Successful",
            Reconciliation::Imbalance(_) | Reconciliation::Unrecognized(_) => {
                "Discrepancy Detected"
            }
        }
    }

    /// Secondary line describing the discrepancy
    pub fn detail(&self) -> Option<String> {
        match self {
            Reconciliation::Balanced => None,
            Reconciliation::Imbalance(value) => {
                Some(format!("Calculated balance differs by: {value}"))
            }
            Reconciliation::Unrecognized(value) => Some(value.clone()),
        }
    }
}

/// Out-of-band signals decoded from one response
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TrustSignals {
    /// Tampering warning that must be acknowledged before the body is read
    pub fraud_warning: Option<String>,
    /// Informational reconciliation verdict
    pub reconciliation: Option<Reconciliation>,
}

impl TrustSignals {
    /// Decode both signals from response headers
    pub fn from_headers(headers: &HeaderMap) -> Self {
        Self {
            fraud_warning: fraud_warning(headers),
            reconciliation: reconciliation(headers),
        }
    }
}

/// Read the fraud warning, if the service sent a non-empty one
pub fn fraud_warning(headers: &HeaderMap) -> Option<String> {
    header_text(headers, FRAUD_WARNING_HEADER).filter(|text| !text.trim().is_empty())
}

/// Read the reconciliation verdict, if present
pub fn reconciliation(headers: &HeaderMap) -> Option<Reconciliation> {
    header_text(headers, RECONCILIATION_HEADER).and_then(|raw| Reconciliation::parse(&raw))
}

// Header values may carry non-ASCII text; decode lossily instead of dropping them.
fn header_text(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .map(|value| String::from_utf8_lossy(value.as_bytes()).into_owned())
}

/// File extension for a target format
pub fn extension_for(format: TargetFormat) -> &'static str {
    match format {
        TargetFormat::Csv => "csv",
        TargetFormat::Qbo => "qbo",
        TargetFormat::Iif => "iif",
        TargetFormat::Excel => "xlsx",
        TargetFormat::Json => "json",
        TargetFormat::Ofx => "ofx",
        TargetFormat::Qfx => "qfx",
        TargetFormat::Bai2 => "bai2",
        TargetFormat::Mt940 => "sta",
    }
}

/// Derive the save filename for a converted artifact
///
/// The base name is everything before the first `.` of the original file name, so
/// `jan.2024.pdf` converted to QBO is saved as `Vsync-jan.qbo`.
pub fn save_filename(original_name: &str, format: TargetFormat) -> String {
    let file_name = original_name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(original_name);
    let base = file_name.split('.').next().unwrap_or(file_name);
    format!("{SAVE_PREFIX}{base}.{}", extension_for(format))
}
