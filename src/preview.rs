//! # Preview Handles
//!
//! Riferimenti transitori usati dall'adapter di presentazione per mostrare un
//! payload (l'equivalente di un object URL). Ogni handle è una copia su disco
//! del payload, posseduta esclusivamente da chi l'ha creata.
//!
//! Il rilascio avviene esattamente una volta, nel `Drop`: sostituzione, reset
//! della sessione o chiusura della vista comparativa consumano l'handle, quindi
//! non sono possibili né doppio rilascio né leak.

use crate::media::MediaFile;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempPath;
use tracing::debug;

/// Temporary file exposing a payload to a renderer
#[derive(Debug)]
pub struct PreviewHandle {
    path: TempPath,
}

impl PreviewHandle {
    /// Copy `file` into a fresh temp file named after it
    pub async fn create(file: &MediaFile) -> std::io::Result<Self> {
        let data: Arc<[u8]> = Arc::clone(file.data());
        let suffix = Path::new(file.name())
            .extension()
            .map(|ext| format!(".{}", ext.to_string_lossy()))
            .unwrap_or_default();

        let path = tokio::task::spawn_blocking(move || -> std::io::Result<TempPath> {
            let mut temp = tempfile::Builder::new()
                .prefix("media-preview-")
                .suffix(&suffix)
                .tempfile()?;
            temp.write_all(&data)?;
            temp.flush()?;
            Ok(temp.into_temp_path())
        })
        .await
        .map_err(std::io::Error::other)??;

        debug!("Created preview {}", path.display());
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn to_path_buf(&self) -> PathBuf {
        self.path.to_path_buf()
    }
}

impl Drop for PreviewHandle {
    fn drop(&mut self) {
        debug!("Released preview {}", self.path.display());
    }
}

/// Side-by-side previews for the comparison overlay
#[derive(Debug)]
pub struct ComparisonPreviews {
    pub original: PreviewHandle,
    pub processed: PreviewHandle,
}
