//! # Request Builder Module
//!
//! Costruisce la `OperationRequest` per una submission a partire dai valori
//! del form già validati dall'adapter di presentazione.
//!
//! ## Parametri per modalità:
//!
//! | kind  | mode     | campi                                              |
//! |-------|----------|----------------------------------------------------|
//! | image | convert  | `target_format`, `quality`                         |
//! | image | compress | `format`, `target_size_kb`                         |
//! | video | convert  | `target_format`, `quality`, `codec` (opzionale)    |
//! | video | compress | `format`, `target_size_mb`, `codec` (opzionale)    |
//!
//! Il codec è incluso solo se scelto esplicitamente: assente significa
//! "decide il servizio". Un codec vuoto equivale ad assente.
//!
//! ## Esempio:
//! ```rust
//! use media_converter::{FormValues, MediaKind, OperationMode, RequestBuilder};
//!
//! let form = FormValues::convert("webp", 80);
//! let request = RequestBuilder::build(MediaKind::Image, OperationMode::Convert, &form);
//! assert_eq!(request.route(), "/api/image/convert");
//! assert_eq!(request.parameters["quality"], "80");
//! ```

use crate::media::{MediaKind, OperationMode, OperationRequest};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Values collected from the operation form
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormValues {
    /// Output format / container (`webp`, `mp4`, ...)
    pub target_format: String,
    /// Fidelity for conversions, 0-100
    pub quality: u8,
    /// Size bound for compression: KB for images, MB for videos
    pub target_size: u32,
    /// Explicit video codec override
    pub codec: Option<String>,
}

impl FormValues {
    pub fn convert(target_format: impl Into<String>, quality: u8) -> Self {
        Self {
            target_format: target_format.into(),
            quality,
            target_size: 0,
            codec: None,
        }
    }

    pub fn compress(format: impl Into<String>, target_size: u32) -> Self {
        Self {
            target_format: format.into(),
            quality: 0,
            target_size,
            codec: None,
        }
    }

    pub fn with_codec(mut self, codec: impl Into<String>) -> Self {
        self.codec = Some(codec.into());
        self
    }
}

/// Builds outbound requests. Pure: equal inputs give equal requests.
pub struct RequestBuilder;

impl RequestBuilder {
    pub fn build(kind: MediaKind, mode: OperationMode, form: &FormValues) -> OperationRequest {
        let mut parameters = BTreeMap::new();

        match mode {
            OperationMode::Convert => {
                parameters.insert("target_format".to_string(), form.target_format.clone());
                parameters.insert("quality".to_string(), form.quality.to_string());
            }
            OperationMode::Compress => {
                parameters.insert("format".to_string(), form.target_format.clone());
                parameters.insert(
                    Self::target_size_field(kind).to_string(),
                    form.target_size.to_string(),
                );
            }
        }

        if kind == MediaKind::Video {
            if let Some(codec) = form.codec.as_deref().filter(|c| !c.is_empty()) {
                parameters.insert("codec".to_string(), codec.to_string());
            }
        }

        OperationRequest {
            kind,
            mode,
            target_format: form.target_format.clone(),
            parameters,
        }
    }

    /// Name of the size-bound field for compression
    pub fn target_size_field(kind: MediaKind) -> &'static str {
        match kind {
            MediaKind::Image => "target_size_kb",
            MediaKind::Video => "target_size_mb",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(request: &OperationRequest) -> Vec<&str> {
        request.parameters.keys().map(String::as_str).collect()
    }

    #[test]
    fn test_image_convert() {
        let request = RequestBuilder::build(
            MediaKind::Image,
            OperationMode::Convert,
            &FormValues::convert("webp", 80),
        );
        assert_eq!(request.route(), "/api/image/convert");
        assert_eq!(keys(&request), vec!["quality", "target_format"]);
        assert_eq!(request.parameters["target_format"], "webp");
        assert_eq!(request.parameters["quality"], "80");
        assert_eq!(request.target_format, "webp");
    }

    #[test]
    fn test_image_ignores_codec() {
        let form = FormValues::compress("jpg", 100).with_codec("libx264");
        let request = RequestBuilder::build(MediaKind::Image, OperationMode::Compress, &form);
        assert_eq!(request.route(), "/api/image/compress");
        assert_eq!(keys(&request), vec!["format", "target_size_kb"]);
        assert_eq!(request.parameters["target_size_kb"], "100");
    }

    #[test]
    fn test_video_codec_only_when_chosen() {
        let form = FormValues::convert("webm", 60);
        let request = RequestBuilder::build(MediaKind::Video, OperationMode::Convert, &form);
        assert!(!request.parameters.contains_key("codec"));

        let request = RequestBuilder::build(
            MediaKind::Video,
            OperationMode::Convert,
            &form.clone().with_codec(""),
        );
        assert!(!request.parameters.contains_key("codec"));

        let request = RequestBuilder::build(
            MediaKind::Video,
            OperationMode::Convert,
            &form.with_codec("libvpx-vp9"),
        );
        assert_eq!(request.parameters["codec"], "libvpx-vp9");
    }

    #[test]
    fn test_video_compress() {
        let form = FormValues::compress("mp4", 25).with_codec("libx265");
        let request = RequestBuilder::build(MediaKind::Video, OperationMode::Compress, &form);
        assert_eq!(request.route(), "/api/video/compress");
        assert_eq!(keys(&request), vec!["codec", "format", "target_size_mb"]);
        assert_eq!(request.parameters["target_size_mb"], "25");
        assert_eq!(request.parameters["format"], "mp4");
    }

    #[test]
    fn test_build_is_pure() {
        let form = FormValues::compress("webm", 8).with_codec("libvpx");
        let first = RequestBuilder::build(MediaKind::Video, OperationMode::Compress, &form);
        let second = RequestBuilder::build(MediaKind::Video, OperationMode::Compress, &form);
        assert_eq!(first, second);
    }
}
