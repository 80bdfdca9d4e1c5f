//! # Metadata Probe Module
//!
//! Estrae attributi descrittivi da un blob media senza trasformarlo.
//!
//! ## Responsabilità:
//! - Formato: sottotipo MIME dichiarato, in maiuscolo
//! - Dimensione: lunghezza in byte del blob
//! - Immagini: decodifica con `image` su un worker blocking, registra width/height
//! - Video: scrive il blob in un file temporaneo e interroga `ffprobe`
//!   (solo metadata del container, nessuna decodifica completa)
//!
//! ## Degradazione:
//! Il probe non fallisce mai. Decodifica fallita, `ffprobe` assente, timeout o
//! JSON illeggibile producono metadata senza dimensioni/durata.
//!
//! ## Risorse transitorie:
//! Il file temporaneo del probe video è un `ProbeHandle`: viene rilasciato
//! quando esce dallo scope, sia sul percorso di successo che su quello di
//! errore. Ogni chiamata crea il proprio handle, quindi più probe possono
//! essere in volo contemporaneamente.

use crate::config::ClientConfig;
use crate::media::{MediaFile, MediaKind, MediaMetadata};
use image::GenericImageView;
use std::io::{Cursor, Write};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::NamedTempFile;
use tokio::process::Command;
use tracing::{debug, warn};

/// Dimensions and duration read from a video container
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct VideoProbe {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub duration_seconds: Option<f64>,
}

/// Reads metadata from media blobs
#[derive(Debug, Clone)]
pub struct MetadataProbe {
    ffprobe_command: String,
    timeout: Duration,
}

impl MetadataProbe {
    pub fn new(ffprobe_command: impl Into<String>, timeout: Duration) -> Self {
        Self {
            ffprobe_command: ffprobe_command.into(),
            timeout,
        }
    }

    pub fn from_config(config: &ClientConfig) -> Self {
        Self::new(config.ffprobe_command.clone(), config.probe_timeout())
    }

    /// Probe `file` as media of the given kind
    pub async fn probe(&self, kind: MediaKind, file: &MediaFile) -> MediaMetadata {
        let mut metadata = MediaMetadata::basic(kind, file.format_label(), file.size());

        match kind {
            MediaKind::Image => {
                if let Some((width, height)) = self.probe_image(file).await {
                    metadata.width = Some(width);
                    metadata.height = Some(height);
                }
            }
            MediaKind::Video => {
                let video = self.probe_video(file).await;
                metadata.width = video.width;
                metadata.height = video.height;
                metadata.duration_seconds = video.duration_seconds;
            }
        }

        debug!(
            "Probed {} ({}): {:?}x{:?}, duration {:?}",
            file.name(),
            metadata.format,
            metadata.width,
            metadata.height,
            metadata.duration_seconds
        );
        metadata
    }

    async fn probe_image(&self, file: &MediaFile) -> Option<(u32, u32)> {
        let data = Arc::clone(file.data());
        match tokio::task::spawn_blocking(move || decode_dimensions(&data)).await {
            Ok(Ok(dimensions)) => Some(dimensions),
            Ok(Err(e)) => {
                debug!("Image decode failed for {}: {}", file.name(), e);
                None
            }
            Err(e) => {
                warn!("Image decode task failed for {}: {}", file.name(), e);
                None
            }
        }
    }

    async fn probe_video(&self, file: &MediaFile) -> VideoProbe {
        let handle = match ProbeHandle::create(file).await {
            Ok(handle) => handle,
            Err(e) => {
                warn!("Could not stage {} for probing: {}", file.name(), e);
                return VideoProbe::default();
            }
        };

        let output = tokio::time::timeout(
            self.timeout,
            Command::new(&self.ffprobe_command)
                .args(["-v", "quiet", "-print_format", "json", "-show_format", "-show_streams"])
                .arg(handle.path())
                .kill_on_drop(true)
                .output(),
        )
        .await;

        // `handle` is dropped at the end of this scope on every branch below
        match output {
            Ok(Ok(output)) if output.status.success() => {
                parse_ffprobe_output(&String::from_utf8_lossy(&output.stdout)).unwrap_or_else(|| {
                    debug!("ffprobe output for {} was not usable", file.name());
                    VideoProbe::default()
                })
            }
            Ok(Ok(output)) => {
                debug!(
                    "ffprobe rejected {}: {}",
                    file.name(),
                    String::from_utf8_lossy(&output.stderr)
                );
                VideoProbe::default()
            }
            Ok(Err(e)) => {
                warn!("Failed to execute {}: {}", self.ffprobe_command, e);
                VideoProbe::default()
            }
            Err(_) => {
                warn!("ffprobe timed out after {:?} on {}", self.timeout, file.name());
                VideoProbe::default()
            }
        }
    }
}

impl Default for MetadataProbe {
    fn default() -> Self {
        Self::from_config(&ClientConfig::default())
    }
}

fn decode_dimensions(data: &[u8]) -> image::ImageResult<(u32, u32)> {
    let decoded = image::io::Reader::new(Cursor::new(data))
        .with_guessed_format()?
        .decode()?;
    Ok(decoded.dimensions())
}

/// Parse `ffprobe -print_format json -show_format -show_streams` output
pub fn parse_ffprobe_output(json: &str) -> Option<VideoProbe> {
    let info: serde_json::Value = serde_json::from_str(json).ok()?;

    let empty_vec = vec![];
    let streams = info["streams"].as_array().unwrap_or(&empty_vec);
    let video_stream = streams.iter().find(|s| s["codec_type"] == "video");

    let width = video_stream
        .and_then(|s| s["width"].as_u64())
        .and_then(|w| u32::try_from(w).ok())
        .filter(|w| *w > 0);
    let height = video_stream
        .and_then(|s| s["height"].as_u64())
        .and_then(|h| u32::try_from(h).ok())
        .filter(|h| *h > 0);

    let duration_seconds = parse_duration(&info["format"]["duration"])
        .or_else(|| video_stream.and_then(|s| parse_duration(&s["duration"])));

    Some(VideoProbe {
        width,
        height,
        duration_seconds,
    })
}

fn parse_duration(value: &serde_json::Value) -> Option<f64> {
    let seconds = match value {
        serde_json::Value::String(s) => s.parse::<f64>().ok()?,
        serde_json::Value::Number(n) => n.as_f64()?,
        _ => return None,
    };
    (seconds.is_finite() && seconds > 0.0).then_some(seconds)
}

/// Temporary on-disk copy of a blob, removed when dropped
struct ProbeHandle {
    file: NamedTempFile,
}

impl ProbeHandle {
    async fn create(file: &MediaFile) -> std::io::Result<Self> {
        let data = Arc::clone(file.data());
        let suffix = Path::new(file.name())
            .extension()
            .map(|ext| format!(".{}", ext.to_string_lossy()))
            .unwrap_or_default();

        tokio::task::spawn_blocking(move || -> std::io::Result<Self> {
            let mut temp = tempfile::Builder::new()
                .prefix("media-probe-")
                .suffix(&suffix)
                .tempfile()?;
            temp.write_all(&data)?;
            temp.flush()?;
            Ok(Self { file: temp })
        })
        .await
        .map_err(std::io::Error::other)?
    }

    fn path(&self) -> &Path {
        self.file.path()
    }
}

impl Drop for ProbeHandle {
    fn drop(&mut self) {
        debug!("Released probe handle {}", self.file.path().display());
    }
}
