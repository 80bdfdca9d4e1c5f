//! # Response Interpreter Module
//!
//! Trasforma uno scambio HTTP completato in `ProcessedResult` o in un
//! `ConvertError::Processing` con un messaggio da mostrare.
//!
//! ## Percorso di successo (2xx):
//! - Il body è il payload binario
//! - Il nome file viene da `content-disposition` (`filename=`, con o senza
//!   virgolette, oppure `filename*=charset''nome`)
//! - Senza header si usa il default per tipo (`converted-image` / `converted-video`)
//!
//! ## Percorso di errore (non 2xx):
//! - Il body è JSON con un campo `detail`
//! - `detail` stringa → messaggio verbatim
//! - `detail` lista di errori di validazione → messaggi `msg` uniti con `"; "`
//! - Qualsiasi altra cosa → `"Processing failed"`

use crate::error::ConvertError;
use crate::media::{MediaKind, ProcessedResult};
use regex::Regex;
use reqwest::header::{HeaderMap, CONTENT_DISPOSITION, CONTENT_TYPE};
use reqwest::StatusCode;
use std::sync::{Arc, OnceLock};
use tracing::debug;

/// Fallback shown when the service gives no usable detail
pub const GENERIC_FAILURE: &str = "Processing failed";

/// A completed HTTP exchange with the processing service
#[derive(Debug, Clone)]
pub struct ServiceResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl ServiceResponse {
    pub fn new(status: StatusCode, headers: HeaderMap, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers,
            body: body.into(),
        }
    }
}

pub struct ResponseInterpreter;

impl ResponseInterpreter {
    /// Interpret a completed exchange for a pipeline of the given kind
    pub fn interpret(kind: MediaKind, response: ServiceResponse) -> Result<ProcessedResult, ConvertError> {
        if !response.status.is_success() {
            let message = error_detail(&response.body);
            debug!("Service returned {}: {}", response.status, message);
            return Err(ConvertError::Processing(message));
        }

        let suggested_filename = header_str(&response.headers, CONTENT_DISPOSITION.as_str())
            .and_then(extract_filename)
            .unwrap_or_else(|| kind.default_filename().to_string());
        let content_type = header_str(&response.headers, CONTENT_TYPE.as_str()).map(str::to_string);

        Ok(ProcessedResult {
            payload: Arc::from(response.body),
            suggested_filename,
            content_type,
        })
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

fn filename_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r#"filename(\*)?[^;=\n]*=(?:"([^"]*)"|'([^']*)'|([^;\n]*))"#).ok())
        .as_ref()
}

/// Pull the `filename=` token out of a `content-disposition` value
pub fn extract_filename(content_disposition: &str) -> Option<String> {
    let captures = filename_pattern()?.captures(content_disposition)?;
    let raw = captures
        .get(2)
        .or_else(|| captures.get(3))
        .or_else(|| captures.get(4))?
        .as_str();

    // RFC 5987 form: filename*=charset'lang'name
    let raw = match captures.get(1) {
        Some(_) => raw.splitn(3, '\'').nth(2).unwrap_or(raw),
        None => raw,
    };
    let name = raw.trim().trim_matches(|c: char| c == '"' || c == '\'').trim();

    (!name.is_empty()).then(|| name.to_string())
}

/// Human-readable message from a structured error body
pub fn error_detail(body: &[u8]) -> String {
    let Ok(value) = serde_json::from_slice::<serde_json::Value>(body) else {
        return GENERIC_FAILURE.to_string();
    };

    match &value["detail"] {
        serde_json::Value::String(detail) if !detail.is_empty() => detail.clone(),
        serde_json::Value::Array(items) => {
            let messages: Vec<&str> = items.iter().filter_map(|item| item["msg"].as_str()).collect();
            if messages.is_empty() {
                GENERIC_FAILURE.to_string()
            } else {
                messages.join("; ")
            }
        }
        _ => GENERIC_FAILURE.to_string(),
    }
}
