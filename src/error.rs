//! # Error Types Module
//!
//! Questo modulo definisce tutti i tipi di errore custom del client.
//!
//! ## Responsabilità:
//! - Definisce `ConvertError` enum per categorizzare gli errori di una pipeline
//! - Fornisce messaggi pronti per essere mostrati all'utente
//! - Integra con `thiserror` per automatic error conversion
//!
//! ## Categorie di errori:
//! - `Validation`: File selezionato di tipo sbagliato per la pipeline
//! - `Processing`: Il servizio remoto ha rifiutato la richiesta o il trasporto è fallito
//! - `Busy`: Operazione rifiutata mentre una richiesta è in volo
//! - `InvalidPhase`: Comando non valido nella fase corrente
//! - `Superseded`: Un reset o una nuova selezione ha reso obsoleta l'operazione
//! - `Io`: Errori di I/O (salvataggio risultato, preview)
//! - `Config`: Configurazione non valida
//!
//! `Validation` e `Processing` mostrano il messaggio senza prefissi, così
//! l'adapter di presentazione può usare `to_string()` direttamente.
//!
//! ## Esempio:
//! ```rust
//! use media_converter::ConvertError;
//!
//! let err = ConvertError::Processing("size target too small".to_string());
//! assert_eq!(err.to_string(), "size target too small");
//! ```

use crate::session::Phase;

/// Custom error types for the conversion client
#[derive(thiserror::Error, Debug)]
pub enum ConvertError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Processing(String),

    #[error("A file is already being processed")]
    Busy,

    #[error("Operation requires phase {expected}, pipeline is {actual}")]
    InvalidPhase { expected: Phase, actual: Phase },

    #[error("Superseded by a newer selection or reset")]
    Superseded,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<reqwest::Error> for ConvertError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Processing(format!("Request timed out: {}", err))
        } else if err.is_connect() {
            Self::Processing(format!("Could not reach processing service: {}", err))
        } else {
            Self::Processing(err.to_string())
        }
    }
}

impl ConvertError {
    /// Message suitable for display next to the pipeline controls
    pub fn user_message(&self) -> String {
        self.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_are_verbatim() {
        assert_eq!(
            ConvertError::Validation("Please select a valid image file".to_string()).to_string(),
            "Please select a valid image file"
        );
        assert_eq!(
            ConvertError::Processing("Processing failed".to_string()).user_message(),
            "Processing failed"
        );
    }

    #[test]
    fn test_invalid_phase_message() {
        let err = ConvertError::InvalidPhase {
            expected: Phase::Result,
            actual: Phase::Idle,
        };
        assert_eq!(err.to_string(), "Operation requires phase result, pipeline is idle");
    }
}
