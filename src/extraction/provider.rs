//! HTTP adapter over the external field-extraction provider.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("Cannot reach extraction provider at {0}")]
    Connection(String),

    #[error("Provider request timed out after {0}s")]
    Timeout(u64),

    #[error("Provider authentication failed: {0}")]
    Auth(String),

    #[error("Provider returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("Failed to parse provider response: {0}")]
    ResponseParsing(String),
}

/// A raw field candidate as the provider reports it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderField {
    pub name: String,
    pub value: serde_json::Value,
    pub confidence: f32,
    pub field_type: Option<String>,
}

/// Provider output for one document analysis call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderAnalysis {
    pub raw_text: String,
    pub fields: Vec<ProviderField>,
    pub document_confidence: Option<f32>,
    pub job_id: Option<String>,
}

pub trait ExtractionProvider: Send + Sync {
    fn analyze_document(
        &self,
        bytes: &[u8],
        profile: &str,
    ) -> Result<ProviderAnalysis, ProviderError>;
}

/// Request body for the provider's analyze endpoint.
#[derive(Serialize)]
struct AnalyzeRequest<'a> {
    profile: &'a str,
    content: String,
}

/// HTTP extraction provider client.
pub struct HttpExtractionProvider {
    base_url: String,
    api_key: Option<String>,
    client: reqwest::blocking::Client,
    timeout_secs: u64,
}

impl HttpExtractionProvider {
    pub fn new(base_url: &str, api_key: Option<String>, timeout_secs: u64) -> Self {
        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            client,
            timeout_secs,
        }
    }
}

impl ExtractionProvider for HttpExtractionProvider {
    fn analyze_document(
        &self,
        bytes: &[u8],
        profile: &str,
    ) -> Result<ProviderAnalysis, ProviderError> {
        use base64::Engine;

        let url = format!("{}/v1/analyze", self.base_url);
        let body = AnalyzeRequest {
            profile,
            content: base64::engine::general_purpose::STANDARD.encode(bytes),
        };

        let mut request = self.client.post(&url).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().map_err(|e| {
            if e.is_connect() {
                ProviderError::Connection(self.base_url.clone())
            } else if e.is_timeout() {
                ProviderError::Timeout(self.timeout_secs)
            } else {
                ProviderError::Http {
                    status: 0,
                    body: e.to_string(),
                }
            }
        })?;

        let status = response.status();
        if status.as_u16() == 401 || status.as_u16() == 403 {
            let body = response.text().unwrap_or_default();
            return Err(ProviderError::Auth(body));
        }
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(ProviderError::Http {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json::<ProviderAnalysis>()
            .map_err(|e| ProviderError::ResponseParsing(e.to_string()))
    }
}
