//! Configuration types for vsync-client

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::{path::Path, path::PathBuf, time::Duration};

/// Where and how converted files are saved
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DownloadConfig {
    /// Directory converted artifacts are written to (default: "./downloads")
    #[serde(default = "default_download_dir")]
    pub download_dir: PathBuf,

    /// File collision handling
    #[serde(default)]
    pub file_collision: FileCollisionAction,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            download_dir: default_download_dir(),
            file_collision: FileCollisionAction::default(),
        }
    }
}

/// Connection settings for the REST profile store
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProfileStoreConfig {
    /// REST endpoint root, e.g. `https://<project>.supabase.co/rest/v1`
    pub base_url: String,

    /// Public API key sent as `apikey` and bearer token
    pub api_key: String,
}

/// Main configuration for VsyncClient
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    /// Root URL of the conversion backend
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    /// Path of the conversion endpoint (default: "/convert")
    #[serde(default = "default_convert_path")]
    pub convert_path: String,

    /// Path of the checkout-session endpoint (default: "/create-checkout-session")
    #[serde(default = "default_checkout_path")]
    pub checkout_path: String,

    /// Path of the billing-portal endpoint (default: "/create-portal-session")
    #[serde(default = "default_portal_path")]
    pub portal_path: String,

    /// Saving of converted artifacts
    #[serde(default)]
    pub download: DownloadConfig,

    /// Overall request timeout (None = transport default, no client-side limit)
    #[serde(default, with = "optional_duration_secs")]
    pub request_timeout: Option<Duration>,

    /// User-Agent header sent with every request
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Profile store used to resolve the subscription tier (None = tier stays at default)
    #[serde(default)]
    pub profile_store: Option<ProfileStoreConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            convert_path: default_convert_path(),
            checkout_path: default_checkout_path(),
            portal_path: default_portal_path(),
            download: DownloadConfig::default(),
            request_timeout: None,
            user_agent: default_user_agent(),
            profile_store: None,
        }
    }
}

impl Config {
    /// Parse a configuration from JSON, filling unspecified fields with defaults
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Config = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a JSON configuration file
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Io(std::io::Error::new(
                e.kind(),
                format!("Failed to read config file '{}': {}", path.display(), e),
            ))
        })?;
        Self::from_json_str(&content)
    }

    /// Check that URLs parse and required settings are present
    pub fn validate(&self) -> Result<()> {
        let base = url::Url::parse(&self.api_base_url)
            .map_err(|e| Error::config("api_base_url", e.to_string()))?;
        if base.cannot_be_a_base() {
            return Err(Error::config(
                "api_base_url",
                "URL cannot be used as a base",
            ));
        }

        for (key, path) in [
            ("convert_path", &self.convert_path),
            ("checkout_path", &self.checkout_path),
            ("portal_path", &self.portal_path),
        ] {
            if path.trim().is_empty() {
                return Err(Error::config(key, "endpoint path must not be empty"));
            }
        }

        if self.download.download_dir.as_os_str().is_empty() {
            return Err(Error::config(
                "download_dir",
                "download directory must not be empty",
            ));
        }

        if let Some(timeout) = self.request_timeout
            && timeout.is_zero()
        {
            return Err(Error::config(
                "request_timeout",
                "timeout must be greater than zero",
            ));
        }

        if let Some(store) = &self.profile_store {
            url::Url::parse(&store.base_url)
                .map_err(|e| Error::config("profile_store.base_url", e.to_string()))?;
        }

        Ok(())
    }

    /// Full URL of the conversion endpoint
    pub fn convert_url(&self) -> Result<url::Url> {
        endpoint(&self.api_base_url, &self.convert_path)
    }

    /// Full URL of the checkout-session endpoint
    pub fn checkout_url(&self) -> Result<url::Url> {
        endpoint(&self.api_base_url, &self.checkout_path)
    }

    /// Full URL of the billing-portal endpoint
    pub fn portal_url(&self) -> Result<url::Url> {
        endpoint(&self.api_base_url, &self.portal_path)
    }
}

// Joins without `Url::join` so a base with a path prefix keeps it.
fn endpoint(base: &str, path: &str) -> Result<url::Url> {
    let joined = format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    );
    Ok(url::Url::parse(&joined)?)
}

/// File collision handling strategy
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileCollisionAction {
    /// Append (1), (2), etc. to filename (default)
    #[default]
    Rename,
    /// Overwrite existing file
    Overwrite,
    /// Refuse to save, keep existing
    Skip,
}

mod optional_duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => s.serialize_some(&d.as_secs_f64()),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        let secs = Option::<f64>::deserialize(d)?;
        match secs {
            Some(secs) if secs.is_finite() && secs >= 0.0 => Ok(Some(Duration::from_secs_f64(secs))),
            Some(secs) => Err(serde::de::Error::custom(format!(
                "invalid timeout: {secs}"
            ))),
            None => Ok(None),
        }
    }
}

fn default_api_base_url() -> String {
    "https://vsync-converter-backend.onrender.com".to_string()
}

fn default_convert_path() -> String {
    "/convert".to_string()
}

fn default_checkout_path() -> String {
    "/create-checkout-session".to_string()
}

fn default_portal_path() -> String {
    "/create-portal-session".to_string()
}

fn default_download_dir() -> PathBuf {
    PathBuf::from("downloads")
}

fn default_user_agent() -> String {
    format!("vsync-client/{}", env!("CARGO_PKG_VERSION"))
}
