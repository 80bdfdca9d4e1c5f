//! # Media Converter
//!
//! Punto d'ingresso del client: una pipeline immagini e una pipeline video,
//! indipendenti, che condividono lo stesso servizio remoto.
//!
//! ## Responsabilità:
//! - Costruisce servizio HTTP, probe e pipeline da una `ClientConfig`
//! - Instrada un file verso la pipeline giusta in base al MIME dichiarato
//! - Espone health check e formati supportati dal servizio
//!
//! ## Esempio:
//! ```rust,no_run
//! use media_converter::{ClientConfig, FormValues, MediaConverter, MediaFile, NoopObserver, OperationMode};
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! # async fn run() -> Result<(), media_converter::ConvertError> {
//! let converter = MediaConverter::new(&ClientConfig::default(), Arc::new(NoopObserver))?;
//! let file = MediaFile::from_path(Path::new("photo.png")).await?;
//! converter.image().select(file).await?;
//! converter.image().submit(OperationMode::Convert, &FormValues::convert("webp", 85)).await?;
//! converter.image().save_result(Path::new(".")).await?;
//! # Ok(())
//! # }
//! ```

use crate::config::ClientConfig;
use crate::error::ConvertError;
use crate::media::{MediaFile, MediaKind, MediaMetadata};
use crate::pipeline::{ImagePipeline, PipelineObserver, VideoPipeline};
use crate::probe::MetadataProbe;
use crate::service::{HealthStatus, HttpProcessingService, ProcessingService};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};

/// Output formats advertised by the service
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SupportedFormats {
    pub image: Vec<String>,
    pub video: Vec<String>,
}

pub struct MediaConverter {
    http: HttpProcessingService,
    image: ImagePipeline,
    video: VideoPipeline,
}

impl MediaConverter {
    /// Build both pipelines against the service configured in `config`
    pub fn new(config: &ClientConfig, observer: Arc<dyn PipelineObserver>) -> Result<Self, ConvertError> {
        config
            .validate()
            .map_err(|e| ConvertError::Config(format!("{:#}", e)))?;

        let http = HttpProcessingService::new(config)?;
        let service: Arc<dyn ProcessingService> = Arc::new(http.clone());
        info!("🚀 Media converter ready, service at {}", http.base_url());

        Ok(Self::with_service(
            http,
            service,
            MetadataProbe::from_config(config),
            observer,
        ))
    }

    /// Assemble a converter whose pipelines talk to `service`
    pub fn with_service(
        http: HttpProcessingService,
        service: Arc<dyn ProcessingService>,
        probe: MetadataProbe,
        observer: Arc<dyn PipelineObserver>,
    ) -> Self {
        Self {
            http,
            image: ImagePipeline::new(probe.clone(), Arc::clone(&service), Arc::clone(&observer)),
            video: VideoPipeline::new(probe, service, observer),
        }
    }

    pub fn image(&self) -> &ImagePipeline {
        &self.image
    }

    pub fn video(&self) -> &VideoPipeline {
        &self.video
    }

    /// Hand `file` to the pipeline matching its declared MIME type
    pub async fn select(&self, file: MediaFile) -> Result<(MediaKind, MediaMetadata), ConvertError> {
        match file.kind() {
            Some(MediaKind::Image) => Ok((MediaKind::Image, self.image.select(file).await?)),
            Some(MediaKind::Video) => Ok((MediaKind::Video, self.video.select(file).await?)),
            None => {
                debug!("No pipeline accepts {} ({})", file.name(), file.mime());
                Err(ConvertError::Validation(format!(
                    "Unsupported file type: {}",
                    file.mime()
                )))
            }
        }
    }

    pub async fn reset_all(&self) {
        futures::join!(self.image.reset(), self.video.reset());
    }

    pub async fn health(&self) -> Result<HealthStatus, ConvertError> {
        self.http.health().await
    }

    pub async fn supported_formats(&self) -> Result<SupportedFormats, ConvertError> {
        let (image, video) = futures::future::try_join(
            self.http.supported_formats(MediaKind::Image),
            self.http.supported_formats(MediaKind::Video),
        )
        .await?;
        Ok(SupportedFormats { image, video })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::OperationRequest;
    use crate::pipeline::NoopObserver;
    use crate::response::ServiceResponse;
    use crate::session::Phase;
    use async_trait::async_trait;
    use std::time::Duration;

    struct Unreachable;

    #[async_trait]
    impl ProcessingService for Unreachable {
        async fn process(&self, _: &OperationRequest, _: &MediaFile) -> Result<ServiceResponse, ConvertError> {
            Err(ConvertError::Processing("unreachable".to_string()))
        }
    }

    fn converter() -> MediaConverter {
        let config = ClientConfig {
            server_url: "http://127.0.0.1:9".to_string(),
            ..Default::default()
        };
        MediaConverter::with_service(
            HttpProcessingService::new(&config).unwrap(),
            Arc::new(Unreachable),
            MetadataProbe::new("definitely-not-ffprobe-7f3a", Duration::from_secs(2)),
            Arc::new(NoopObserver),
        )
    }

    #[tokio::test]
    async fn test_select_routes_by_declared_kind() {
        let converter = converter();

        let (kind, metadata) = converter
            .select(MediaFile::new("clip.webm", "video/webm", vec![0u8; 8]))
            .await
            .unwrap();
        assert_eq!(kind, MediaKind::Video);
        assert_eq!(metadata.format, "WEBM");
        assert_eq!(converter.video().phase().await, Phase::Selected);
        assert_eq!(converter.image().phase().await, Phase::Idle);
    }

    #[tokio::test]
    async fn test_unknown_kind_is_rejected() {
        let converter = converter();
        let err = converter
            .select(MediaFile::new("song.mp3", "audio/mpeg", vec![0u8; 8]))
            .await
            .unwrap_err();
        assert!(matches!(err, ConvertError::Validation(_)));
        assert_eq!(converter.image().phase().await, Phase::Idle);
        assert_eq!(converter.video().phase().await, Phase::Idle);
    }

    #[tokio::test]
    async fn test_reset_all_returns_both_to_idle() {
        let converter = converter();
        converter
            .select(MediaFile::new("a.png", "image/png", vec![0u8; 8]))
            .await
            .unwrap();
        converter
            .select(MediaFile::new("b.mp4", "video/mp4", vec![0u8; 8]))
            .await
            .unwrap();

        converter.reset_all().await;
        assert_eq!(converter.image().phase().await, Phase::Idle);
        assert_eq!(converter.video().phase().await, Phase::Idle);
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = ClientConfig {
            server_url: String::new(),
            ..Default::default()
        };
        let err = MediaConverter::new(&config, Arc::new(NoopObserver)).err().unwrap();
        assert!(matches!(err, ConvertError::Config(_)));
    }
}
