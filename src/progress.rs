//! # Progress Reporting Module
//!
//! Adapter di presentazione da terminale: implementa `PipelineObserver` e
//! mostra uno spinner `indicatif` mentre la pipeline è in `Processing`.
//!
//! ## Visual feedback:
//! ```text
//! ⠋ [00:00:12] Converting your image...
//! ✅ photo.webp ready: 1.2 MB (WEBP, 1920 × 1080)
//! ```

use crate::comparison::{format_duration, format_size};
use crate::media::{MediaKind, MediaMetadata};
use crate::pipeline::PipelineObserver;
use crate::session::Phase;
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Mutex;
use std::time::Duration;

/// Spinner-driven observer for the command line
#[derive(Default)]
pub struct ProgressReporter {
    spinner: Mutex<Option<ProgressBar>>,
}

impl ProgressReporter {
    pub fn new() -> Self {
        Self::default()
    }

    fn start(&self, kind: MediaKind) {
        let bar = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed_precise}] {msg}") {
            bar.set_style(style);
        }
        bar.set_message(kind.processing_message());
        bar.enable_steady_tick(Duration::from_millis(100));

        if let Some(previous) = self.replace(Some(bar)) {
            previous.finish_and_clear();
        }
    }

    fn stop(&self) {
        if let Some(bar) = self.replace(None) {
            bar.finish_and_clear();
        }
    }

    fn replace(&self, bar: Option<ProgressBar>) -> Option<ProgressBar> {
        match self.spinner.lock() {
            Ok(mut slot) => std::mem::replace(&mut *slot, bar),
            Err(poisoned) => std::mem::replace(&mut *poisoned.into_inner(), bar),
        }
    }
}

/// One-line summary of a processed file
pub fn describe(metadata: &MediaMetadata) -> String {
    let mut details = vec![metadata.format.clone()];
    if let Some((width, height)) = metadata.dimensions() {
        details.push(format!("{} × {}", width, height));
    }
    if let Some(duration) = metadata.duration_seconds {
        details.push(format_duration(duration));
    }
    format!("{} ({})", format_size(metadata.size_bytes), details.join(", "))
}

impl PipelineObserver for ProgressReporter {
    fn phase_changed(&self, kind: MediaKind, phase: Phase) {
        match phase {
            Phase::Processing => self.start(kind),
            _ => self.stop(),
        }
    }

    fn error_reported(&self, _kind: MediaKind, _message: &str) {
        // The caller surfaces the error itself
        self.stop();
    }

    fn result_ready(&self, _kind: MediaKind, processed: &MediaMetadata, suggested_filename: &str) {
        println!("✅ {} ready: {}", suggested_filename, describe(processed));
    }
}

impl Drop for ProgressReporter {
    fn drop(&mut self) {
        self.stop();
    }
}
