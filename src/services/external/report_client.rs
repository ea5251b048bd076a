use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;

use crate::{
    config::Settings,
    error::{ApiError, SubmissionError},
    models::{ReportCode, ReportPayload, ReportReceipt},
    services::report_service::ReportApi,
};

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

/// Posts finished reports to the intake API.
pub struct HttpReportClient {
    client: Client,
    endpoint: String,
    api_key: Option<(String, String)>,
}

impl HttpReportClient {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("violation-reporter/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
            api_key: None,
        })
    }

    pub fn from_settings(settings: &Settings) -> Result<Self, ApiError> {
        let client = Self::new(settings.report_endpoint(), settings.http_timeout())?;
        Ok(match settings.api_keys.first() {
            Some(key) => client.with_api_key(settings.api_key_header.clone(), key.clone()),
            None => client,
        })
    }

    pub fn with_api_key(mut self, header: impl Into<String>, key: impl Into<String>) -> Self {
        self.api_key = Some((header.into(), key.into()));
        self
    }
}

#[async_trait]
impl ReportApi for HttpReportClient {
    async fn submit(&self, payload: &ReportPayload) -> Result<ReportCode, SubmissionError> {
        let mut request = self.client.post(&self.endpoint).json(payload);
        if let Some((header, key)) = &self.api_key {
            request = request.header(header.as_str(), key.as_str());
        }

        let response = request
            .send()
            .await
            .map_err(|e| SubmissionError::Server(format!("network error: {}", e)))?;

        let status = response.status();
        if status.is_success() {
            let receipt: ReportReceipt = response
                .json()
                .await
                .map_err(|e| SubmissionError::Server(format!("invalid response: {}", e)))?;
            return Ok(receipt.code);
        }

        let text = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorEnvelope>(&text)
            .map(|envelope| envelope.error.message)
            .unwrap_or_else(|_| if text.trim().is_empty() { status.to_string() } else { text });

        tracing::warn!(status = status.as_u16(), error = %message, "report submission rejected");
        Err(match status {
            StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
                SubmissionError::Validation(message)
            }
            _ => SubmissionError::Server(message),
        })
    }
}
