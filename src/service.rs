//! # Processing Service Module
//!
//! Confine verso il servizio remoto di conversione.
//!
//! ## Componenti:
//! - `ProcessingService`: trait async usato dalla pipeline; i test iniettano
//!   un'implementazione scriptata
//! - `HttpProcessingService`: implementazione reale con `reqwest` (multipart)
//!
//! ## Endpoint:
//! - `POST /api/{image,video}/{convert,compress}`: file + parametri
//! - `GET /api/health`: stato del servizio
//! - `GET /api/{image,video}/formats`: formati supportati
//!
//! Gli errori di trasporto (connessione rifiutata, timeout) diventano
//! `ConvertError::Processing` con il messaggio del trasporto.

use crate::config::ClientConfig;
use crate::error::ConvertError;
use crate::media::{MediaFile, MediaKind, OperationRequest};
use crate::response::{error_detail, ServiceResponse};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info, instrument};

/// The remote processing endpoint, as seen by a pipeline
#[async_trait]
pub trait ProcessingService: Send + Sync {
    /// Submit `file` with the request parameters and return the completed exchange
    async fn process(
        &self,
        request: &OperationRequest,
        file: &MediaFile,
    ) -> Result<ServiceResponse, ConvertError>;
}

/// Body of `GET /api/health`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    pub service: String,
}

#[derive(Debug, Deserialize)]
struct FormatList {
    formats: Vec<String>,
}

/// reqwest-backed client for the conversion service
#[derive(Debug, Clone)]
pub struct HttpProcessingService {
    base_url: String,
    client: Client,
}

impl HttpProcessingService {
    pub fn new(config: &ClientConfig) -> Result<Self, ConvertError> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .connect_timeout(config.connect_timeout())
            .build()
            .map_err(|e| ConvertError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            base_url: config.base_url().to_string(),
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, route: &str) -> String {
        format!("{}{}", self.base_url, route)
    }

    /// Build the multipart body: `file` first, then every request parameter
    fn form(request: &OperationRequest, file: &MediaFile) -> Result<Form, ConvertError> {
        let part = Part::bytes(file.data().to_vec())
            .file_name(file.name().to_string())
            .mime_str(file.mime())
            .map_err(|e| ConvertError::Processing(format!("Invalid MIME type {}: {}", file.mime(), e)))?;

        let form = request
            .parameters
            .iter()
            .fold(Form::new().part("file", part), |form, (key, value)| {
                form.text(key.clone(), value.clone())
            });
        Ok(form)
    }

    /// Check that the service is up
    #[instrument(skip(self), fields(base_url = %self.base_url))]
    pub async fn health(&self) -> Result<HealthStatus, ConvertError> {
        let response = self.client.get(self.url("/api/health")).send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.bytes().await?;
            debug!("Health check returned {}", status);
            return Err(ConvertError::Processing(error_detail(&body)));
        }
        Ok(response.json::<HealthStatus>().await?)
    }

    /// Formats the service can produce for `kind`
    #[instrument(skip(self), fields(base_url = %self.base_url))]
    pub async fn supported_formats(&self, kind: MediaKind) -> Result<Vec<String>, ConvertError> {
        let route = format!("/api/{}/formats", kind);
        let response = self.client.get(self.url(&route)).send().await?;
        if !response.status().is_success() {
            let body = response.bytes().await?;
            return Err(ConvertError::Processing(error_detail(&body)));
        }
        Ok(response.json::<FormatList>().await?.formats)
    }
}

#[async_trait]
impl ProcessingService for HttpProcessingService {
    #[instrument(skip(self, request, file), fields(route = request.route(), file = file.name()))]
    async fn process(
        &self,
        request: &OperationRequest,
        file: &MediaFile,
    ) -> Result<ServiceResponse, ConvertError> {
        let url = self.url(request.route());
        info!("📤 Uploading {} ({} bytes) to {}", file.name(), file.size(), url);

        let form = Self::form(request, file)?;
        let response = self.client.post(&url).multipart(form).send().await?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await?;
        debug!("📥 {} answered {} with {} bytes", url, status, body.len());

        Ok(ServiceResponse::new(status, headers, body.to_vec()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::OperationMode;
    use crate::request::{FormValues, RequestBuilder};

    #[test]
    fn test_url_joins_route() {
        let config = ClientConfig {
            server_url: "http://localhost:8000/".to_string(),
            ..Default::default()
        };
        let service = HttpProcessingService::new(&config).unwrap();
        assert_eq!(service.base_url(), "http://localhost:8000");
        assert_eq!(service.url("/api/image/convert"), "http://localhost:8000/api/image/convert");
    }

    #[test]
    fn test_bad_mime_fails_as_processing() {
        let request = RequestBuilder::build(
            MediaKind::Image,
            OperationMode::Convert,
            &FormValues::convert("png", 90),
        );
        let file = MediaFile::new("a.png", "not a mime", vec![1u8]);
        let err = HttpProcessingService::form(&request, &file).unwrap_err();
        assert!(matches!(err, ConvertError::Processing(_)));
        assert!(err.to_string().starts_with("Invalid MIME type not a mime"));
    }

    #[tokio::test]
    async fn test_unreachable_service_is_processing_error() {
        let config = ClientConfig {
            server_url: "http://127.0.0.1:9".to_string(),
            connect_timeout_secs: 2,
            request_timeout_secs: 5,
            ..Default::default()
        };
        let service = HttpProcessingService::new(&config).unwrap();
        let request = RequestBuilder::build(
            MediaKind::Image,
            OperationMode::Compress,
            &FormValues::compress("jpg", 100),
        );
        let file = MediaFile::new("a.jpg", "image/jpeg", vec![0xFFu8, 0xD8]);

        let err = service.process(&request, &file).await.unwrap_err();
        assert!(matches!(err, ConvertError::Processing(_)));
        assert!(!err.to_string().is_empty());
    }
}
