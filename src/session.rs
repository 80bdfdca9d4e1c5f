//! # Session State
//!
//! Stato completo di una pipeline tra selezione e reset.
//!
//! ## Fasi:
//! ```text
//! Idle ──select──▶ Selected ──submit──▶ Processing ──ok──▶ Result
//!   ▲                 ▲                     │                │
//!   │                 └──────── errore ─────┘                │
//!   └──────────────────────── reset ◀────────────────────────┘
//! ```
//!
//! ## Invarianti:
//! - `processed` e `result` sono presenti insieme o assenti insieme
//!   (un solo campo `outcome`)
//! - Una sola sessione viva per pipeline, nessuna storia conservata

use crate::comparison::{ComparisonEngine, ComparisonView};
use crate::media::{MediaFile, MediaMetadata, OperationRequest, ProcessedResult};
use crate::preview::{ComparisonPreviews, PreviewHandle};
use serde::Serialize;
use std::fmt;

/// Discrete state of a pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Idle,
    Selected,
    Processing,
    Result,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Selected => "selected",
            Self::Processing => "processing",
            Self::Result => "result",
        }
    }

    /// Whether the process control should be enabled
    pub fn can_submit(&self) -> bool {
        matches!(self, Self::Selected)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Processed metadata and payload of a completed submission
#[derive(Debug)]
pub struct SessionOutcome {
    pub processed: MediaMetadata,
    pub result: ProcessedResult,
    /// Display handle for the processed payload
    pub preview: Option<PreviewHandle>,
}

/// Everything a pipeline knows about the file currently selected
#[derive(Debug)]
pub struct PipelineSession {
    pub file: MediaFile,
    pub original: MediaMetadata,
    /// Pending or last submitted request
    pub request: Option<OperationRequest>,
    pub outcome: Option<SessionOutcome>,
    /// Previews owned by the open comparison overlay
    pub comparison: Option<ComparisonPreviews>,
}

impl PipelineSession {
    pub fn new(file: MediaFile, original: MediaMetadata) -> Self {
        Self {
            file,
            original,
            request: None,
            outcome: None,
            comparison: None,
        }
    }

    pub fn processed(&self) -> Option<&MediaMetadata> {
        self.outcome.as_ref().map(|o| &o.processed)
    }

    pub fn result(&self) -> Option<&ProcessedResult> {
        self.outcome.as_ref().map(|o| &o.result)
    }

    pub fn compare(&self) -> Option<ComparisonView> {
        self.processed()
            .map(|processed| ComparisonEngine::compare(&self.original, processed))
    }
}

/// Read-only copy of a pipeline's state for rendering
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub phase: Phase,
    pub file_name: Option<String>,
    pub original: Option<MediaMetadata>,
    pub processed: Option<MediaMetadata>,
    pub suggested_filename: Option<String>,
    pub last_error: Option<String>,
}
