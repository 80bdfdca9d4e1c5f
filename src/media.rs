//! # Media Data Model
//!
//! Tipi condivisi da tutte le componenti della pipeline.
//!
//! ## Strutture dati:
//! - `MediaKind`: Immagine o video, determina validazione e route
//! - `MediaFile`: Blob binario + MIME dichiarato + nome visualizzato
//! - `MediaMetadata`: Attributi descrittivi estratti dal probe
//! - `OperationMode`: Conversione di formato o compressione a dimensione target
//! - `OperationRequest`: Richiesta costruita per una singola submission
//! - `ProcessedResult`: Payload restituito dal servizio + nome file suggerito
//!
//! Tutti i payload sono `Arc<[u8]>`: la sessione li possiede, ma il probe e il
//! servizio remoto ne ricevono cloni economici senza copiare i byte.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

/// The two media pipelines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Video => "video",
        }
    }

    /// MIME type prefix accepted by this pipeline (`image/` or `video/`)
    pub fn mime_prefix(&self) -> &'static str {
        match self {
            Self::Image => "image/",
            Self::Video => "video/",
        }
    }

    /// Name used when the service does not suggest one
    pub fn default_filename(&self) -> &'static str {
        match self {
            Self::Image => "converted-image",
            Self::Video => "converted-video",
        }
    }

    /// Shown next to the progress indicator while processing
    pub fn processing_message(&self) -> &'static str {
        match self {
            Self::Image => "Converting your image...",
            Self::Video => "Processing your video... This may take a while.",
        }
    }

    /// Classify a MIME type, `None` for anything that is neither image nor video
    pub fn from_mime(mime: &str) -> Option<Self> {
        if mime.starts_with(Self::Image.mime_prefix()) {
            Some(Self::Image)
        } else if mime.starts_with(Self::Video.mime_prefix()) {
            Some(Self::Video)
        } else {
            None
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Opaque media blob with its declared MIME type
#[derive(Debug, Clone)]
pub struct MediaFile {
    name: String,
    mime: String,
    data: Arc<[u8]>,
}

impl MediaFile {
    pub fn new(name: impl Into<String>, mime: impl Into<String>, data: impl Into<Arc<[u8]>>) -> Self {
        Self {
            name: name.into(),
            mime: mime.into(),
            data: data.into(),
        }
    }

    /// Read a file from disk, declaring its MIME type from the extension
    pub async fn from_path(path: &Path) -> std::io::Result<Self> {
        let data = tokio::fs::read(path).await?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let mime = path
            .extension()
            .and_then(|ext| ext.to_str())
            .and_then(mime_for_extension)
            .unwrap_or("application/octet-stream");

        Ok(Self::new(name, mime, data))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mime(&self) -> &str {
        &self.mime
    }

    pub fn data(&self) -> &Arc<[u8]> {
        &self.data
    }

    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }

    /// Declared kind, derived from the MIME prefix
    pub fn kind(&self) -> Option<MediaKind> {
        MediaKind::from_mime(&self.mime)
    }

    /// Format label: the MIME subtype, upper-cased (`image/png` -> `PNG`)
    pub fn format_label(&self) -> String {
        let subtype = self
            .mime
            .split_once('/')
            .map(|(_, sub)| sub)
            .unwrap_or(&self.mime);
        subtype.to_uppercase()
    }
}

/// Map a file extension to the MIME type a browser would declare for it
pub fn mime_for_extension(ext: &str) -> Option<&'static str> {
    let mime = match ext.to_lowercase().as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "webp" => "image/webp",
        "avif" => "image/avif",
        "gif" => "image/gif",
        "bmp" => "image/bmp",
        "tif" | "tiff" => "image/tiff",
        "mp4" => "video/mp4",
        "webm" => "video/webm",
        "avi" => "video/x-msvideo",
        "mkv" => "video/x-matroska",
        "mov" => "video/quicktime",
        "flv" => "video/x-flv",
        _ => return None,
    };
    Some(mime)
}

/// Descriptive attributes of a media blob.
///
/// Dimensions and duration are optional: a probe that cannot determine them
/// leaves them empty, which is a valid outcome rather than an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaMetadata {
    pub kind: MediaKind,
    pub format: String,
    pub size_bytes: u64,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub duration_seconds: Option<f64>,
}

impl MediaMetadata {
    /// Metadata carrying only what is known without decoding
    pub fn basic(kind: MediaKind, format: impl Into<String>, size_bytes: u64) -> Self {
        Self {
            kind,
            format: format.into(),
            size_bytes,
            width: None,
            height: None,
            duration_seconds: None,
        }
    }

    /// Width and height, only when both are known
    pub fn dimensions(&self) -> Option<(u32, u32)> {
        match (self.width, self.height) {
            (Some(w), Some(h)) => Some((w, h)),
            _ => None,
        }
    }

    /// Replace the format label, upper-cased
    pub fn with_format(mut self, format: &str) -> Self {
        self.format = format.to_uppercase();
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationMode {
    Convert,
    Compress,
}

impl OperationMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Convert => "convert",
            Self::Compress => "compress",
        }
    }
}

impl fmt::Display for OperationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single outbound transformation request. Built fresh per submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationRequest {
    pub kind: MediaKind,
    pub mode: OperationMode,
    pub target_format: String,
    pub parameters: BTreeMap<String, String>,
}

impl OperationRequest {
    /// Service route for this `(kind, mode)` combination
    pub fn route(&self) -> &'static str {
        route_for(self.kind, self.mode)
    }
}

/// Fixed route table, one route per `(kind, mode)`
pub fn route_for(kind: MediaKind, mode: OperationMode) -> &'static str {
    match (kind, mode) {
        (MediaKind::Image, OperationMode::Convert) => "/api/image/convert",
        (MediaKind::Image, OperationMode::Compress) => "/api/image/compress",
        (MediaKind::Video, OperationMode::Convert) => "/api/video/convert",
        (MediaKind::Video, OperationMode::Compress) => "/api/video/compress",
    }
}

/// Output of a successful submission
#[derive(Debug, Clone)]
pub struct ProcessedResult {
    pub payload: Arc<[u8]>,
    pub suggested_filename: String,
    /// `content-type` of the response, when the service sent one
    pub content_type: Option<String>,
}

impl ProcessedResult {
    pub fn size(&self) -> u64 {
        self.payload.len() as u64
    }

    /// View the payload as a media file so it can be probed like the original
    pub fn as_media_file(&self, kind: MediaKind, target_format: &str) -> MediaFile {
        let mime = self
            .content_type
            .as_deref()
            .map(|ct| ct.split(';').next().unwrap_or(ct).trim().to_string())
            .filter(|ct| !ct.is_empty())
            .unwrap_or_else(|| format!("{}/{}", kind, target_format.to_lowercase()));
        MediaFile::new(self.suggested_filename.clone(), mime, Arc::clone(&self.payload))
    }
}
