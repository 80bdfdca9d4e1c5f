//! # Comparison Engine Module
//!
//! Calcola le metriche derivate prima/dopo per una sessione completata.
//!
//! ## Metriche:
//! - **size delta**: `(original - processed) / original * 100`, arrotondato a
//!   un decimale
//! - **polarità**: delta positivo = riduzione (`-X%`), delta zero o negativo =
//!   crescita (`+|X|%`). Zero viene mostrato come `+0.0%`.
//! - **dimensioni / durata**: incluse per ciascun lato solo se presenti
//!
//! ## Originale da 0 byte:
//! La divisione non è definita: il delta viene soppresso (`size_delta = None`)
//! e il resto della vista resta valido.
//!
//! ## Formattazione:
//! - `format_size`: `0 Bytes`, `1.5 KB`, `2 MB` (base 1024, max due decimali)
//! - `format_duration`: `m:ss` oppure `h:mm:ss`

use crate::media::{MediaKind, MediaMetadata};
use serde::Serialize;
use tracing::warn;

/// Direction of the size change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SizeChange {
    /// The processed file is smaller
    Reduction,
    /// The processed file is the same size or larger
    Growth,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SizeDelta {
    /// Signed percentage, positive when the file shrank
    pub percent: f64,
    pub change: SizeChange,
}

impl SizeDelta {
    /// `-60.0%` for a reduction, `+50.0%` for growth
    pub fn label(&self) -> String {
        match self.change {
            SizeChange::Reduction => format!("-{:.1}%", self.percent),
            SizeChange::Growth => format!("+{:.1}%", self.percent.abs()),
        }
    }
}

/// One column of the comparison table
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SideView {
    pub format: String,
    pub size_bytes: u64,
    pub dimensions: Option<(u32, u32)>,
    pub duration_seconds: Option<f64>,
}

impl SideView {
    fn from_metadata(metadata: &MediaMetadata) -> Self {
        Self {
            format: metadata.format.clone(),
            size_bytes: metadata.size_bytes,
            dimensions: metadata.dimensions(),
            duration_seconds: metadata.duration_seconds,
        }
    }

    pub fn size_label(&self) -> String {
        format_size(self.size_bytes)
    }

    pub fn dimensions_label(&self) -> Option<String> {
        self.dimensions.map(|(w, h)| format!("{} × {}", w, h))
    }

    pub fn duration_label(&self) -> Option<String> {
        self.duration_seconds.map(format_duration)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComparisonView {
    pub kind: MediaKind,
    pub original: SideView,
    pub processed: SideView,
    /// `None` when the original is empty and the ratio is undefined
    pub size_delta: Option<SizeDelta>,
}

pub struct ComparisonEngine;

impl ComparisonEngine {
    pub fn compare(original: &MediaMetadata, processed: &MediaMetadata) -> ComparisonView {
        ComparisonView {
            kind: original.kind,
            original: SideView::from_metadata(original),
            processed: SideView::from_metadata(processed),
            size_delta: Self::size_delta(original.size_bytes, processed.size_bytes),
        }
    }

    pub fn size_delta(original_size: u64, processed_size: u64) -> Option<SizeDelta> {
        if original_size == 0 {
            warn!("Original file is empty, size delta suppressed");
            return None;
        }

        let raw = (original_size as f64 - processed_size as f64) / original_size as f64 * 100.0;
        let percent = (raw * 10.0).round() / 10.0;
        let change = if percent > 0.0 {
            SizeChange::Reduction
        } else {
            SizeChange::Growth
        };

        Some(SizeDelta { percent, change })
    }
}

/// Human-readable size, 1024-based, up to two decimals
pub fn format_size(bytes: u64) -> String {
    const UNITS: &[&str] = &["Bytes", "KB", "MB", "GB"];
    if bytes == 0 {
        return "0 Bytes".to_string();
    }

    let mut size = bytes as f64;
    let mut unit_index = 0;
    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    let rounded = format!("{:.2}", size);
    let trimmed = rounded.trim_end_matches('0').trim_end_matches('.');
    format!("{} {}", trimmed, UNITS[unit_index])
}

/// `m:ss`, or `h:mm:ss` from one hour up
pub fn format_duration(seconds: f64) -> String {
    let total = seconds.max(0.0).floor() as u64;
    let hrs = total / 3600;
    let mins = (total % 3600) / 60;
    let secs = total % 60;

    if hrs > 0 {
        format!("{}:{:02}:{:02}", hrs, mins, secs)
    } else {
        format!("{}:{:02}", mins, secs)
    }
}
