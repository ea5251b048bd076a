use async_trait::async_trait;
use reqwest::{multipart, Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;

use crate::{
    config::Settings,
    error::{ApiError, UploadError},
    models::{extension_for, EvidenceItem},
    services::upload_coordinator::EvidenceUploader,
};

#[derive(Debug, Deserialize)]
struct UploadResponse {
    url: String,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

/// Uploads evidence to the intake API as `multipart/form-data`, one request per item.
pub struct HttpEvidenceUploader {
    client: Client,
    endpoint: String,
    api_key: Option<(String, String)>,
}

impl HttpEvidenceUploader {
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
        let uploader = Self::new(settings.upload_endpoint(), settings.http_timeout())?;
        Ok(match settings.api_keys.first() {
            Some(key) => uploader.with_api_key(settings.api_key_header.clone(), key.clone()),
            None => uploader,
        })
    }

    pub fn with_api_key(mut self, header: impl Into<String>, key: impl Into<String>) -> Self {
        self.api_key = Some((header.into(), key.into()));
        self
    }

    fn file_part(item: &EvidenceItem) -> Result<multipart::Part, UploadError> {
        let extension = extension_for(&item.mime_type);
        multipart::Part::bytes(item.payload.to_vec())
            .file_name(format!("{}.{}", item.id, extension))
            .mime_str(&item.mime_type)
            .map_err(|e| UploadError::Rejected {
                status: 0,
                message: format!("invalid content type '{}': {}", item.mime_type, e),
            })
    }
}

/// Pull `error.message` out of an intake API error body, falling back to the raw text.
async fn error_message(response: reqwest::Response) -> String {
    let status = response.status();
    let text = response.text().await.unwrap_or_default();
    match serde_json::from_str::<ErrorEnvelope>(&text) {
        Ok(envelope) => envelope.error.message,
        Err(_) if text.trim().is_empty() => status.to_string(),
        Err(_) => text,
    }
}

#[async_trait]
impl EvidenceUploader for HttpEvidenceUploader {
    async fn upload(&self, item: &EvidenceItem) -> Result<String, UploadError> {
        let form = multipart::Form::new().part("file", Self::file_part(item)?);

        let mut request = self.client.post(&self.endpoint).multipart(form);
        if let Some((header, key)) = &self.api_key {
            request = request.header(header.as_str(), key.as_str());
        }

        let response = request
            .send()
            .await
            .map_err(|e| UploadError::Network(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            let body: UploadResponse = response
                .json()
                .await
                .map_err(|e| UploadError::InvalidResponse(e.to_string()))?;
            if body.url.trim().is_empty() {
                return Err(UploadError::InvalidResponse("empty url".to_string()));
            }
            tracing::debug!(item_id = %item.id, url = %body.url, "evidence uploaded");
            return Ok(body.url);
        }

        let message = error_message(response).await;
        tracing::warn!(item_id = %item.id, status = status.as_u16(), error = %message, "upload rejected");
        Err(match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => UploadError::Unauthorized,
            s if s.is_server_error() => UploadError::Storage(message),
            s => UploadError::Rejected {
                status: s.as_u16(),
                message,
            },
        })
    }
}
