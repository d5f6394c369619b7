//! Transport for the conversion endpoint.

use crate::config::Config;
use crate::error::{CallerError, Error, Result};
use crate::types::{Identity, PendingFile, TargetFormat};
use reqwest::multipart::{Form, Part};
use tracing::debug;

/// Multipart field carrying the statement file
pub const STATEMENT_FIELD: &str = "statement";
/// Multipart field carrying the format token
pub const FORMAT_FIELD: &str = "format";
/// Multipart field carrying the user id
pub const USER_ID_FIELD: &str = "userId";

/// Build the shared HTTP client from config
///
/// No timeout is applied unless `request_timeout` is configured.
pub fn build_http_client(config: &Config) -> Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder().user_agent(config.user_agent.clone());
    if let Some(timeout) = config.request_timeout {
        builder = builder.timeout(timeout);
    }
    builder
        .build()
        .map_err(|e| Error::Other(format!("Failed to create HTTP client: {}", e)))
}

/// One conversion request, only constructible with a selected file
#[derive(Clone, Debug)]
pub struct ConversionRequest {
    file: PendingFile,
    format: TargetFormat,
    identity: Identity,
}

impl ConversionRequest {
    /// Build a request, rejecting a missing file before any I/O
    pub fn new(
        file: Option<&PendingFile>,
        format: TargetFormat,
        identity: &Identity,
    ) -> Result<Self> {
        let file = file.ok_or(Error::Caller(CallerError::NoFileSelected))?;
        Ok(Self {
            file: file.clone(),
            format,
            identity: identity.clone(),
        })
    }

    /// The statement being converted
    pub fn file(&self) -> &PendingFile {
        &self.file
    }

    /// Requested target format
    pub fn format(&self) -> TargetFormat {
        self.format
    }

    /// Identity the request is made for
    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    fn into_form(self) -> reqwest::Result<Form> {
        let statement = Part::bytes(self.file.bytes)
            .file_name(self.file.display_name)
            .mime_str(&self.file.mime_type)?;
        Ok(Form::new()
            .part(STATEMENT_FIELD, statement)
            .text(FORMAT_FIELD, self.format.token())
            .text(USER_ID_FIELD, self.identity.user_id.0))
    }
}

/// Client for the conversion endpoint
#[derive(Clone, Debug)]
pub struct ConversionClient {
    http_client: reqwest::Client,
    convert_url: url::Url,
}

impl ConversionClient {
    /// Create a client for the configured endpoint
    pub fn new(config: &Config) -> Result<Self> {
        Ok(Self {
            http_client: build_http_client(config)?,
            convert_url: config.convert_url()?,
        })
    }

    /// Create a client reusing an existing HTTP client
    pub fn with_http_client(http_client: reqwest::Client, convert_url: url::Url) -> Self {
        Self {
            http_client,
            convert_url,
        }
    }

    /// Endpoint requests are posted to
    pub fn convert_url(&self) -> &url::Url {
        &self.convert_url
    }

    /// POST the request and return the response with its body unread
    ///
    /// Any status is returned as `Ok`; only transport failures are errors.
    pub async fn send(&self, request: ConversionRequest) -> reqwest::Result<reqwest::Response> {
        debug!(
            url = %self.convert_url,
            format = %request.format,
            size = request.file.len(),
            "posting conversion request"
        );
        let form = request.into_form()?;
        self.http_client
            .post(self.convert_url.clone())
            .multipart(form)
            .send()
            .await
    }
}
