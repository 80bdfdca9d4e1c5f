//! # Configuration Management Module
//!
//! Questo modulo gestisce tutta la configurazione del client.
//!
//! ## Responsabilità:
//! - Definisce la struct `ClientConfig` con endpoint, timeout e valori di default del form
//! - Fornisce validazione robusta dei parametri
//! - Supporta caricamento/salvataggio configurazione da/verso file JSON
//! - Fornisce valori di default sensati per tutti i parametri
//!
//! ## Parametri di configurazione:
//! - `server_url`: Origine del servizio di conversione (default: `http://127.0.0.1:8000`)
//! - `request_timeout_secs`: Timeout della richiesta di processing (default: 3600)
//! - `connect_timeout_secs`: Timeout di connessione (default: 10)
//! - `ffprobe_command`: Comando usato per il probe dei video (default: `ffprobe`)
//! - `probe_timeout_secs`: Timeout del probe video (default: 30)
//! - `defaults`: Valori iniziali di quality e target size
//!
//! ## Esempio:
//! ```rust
//! use media_converter::ClientConfig;
//!
//! let config = ClientConfig {
//!     server_url: "http://media.local:8000".to_string(),
//!     ..Default::default()
//! };
//! config.validate().unwrap();
//! ```

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Initial form values offered to the user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FormDefaults {
    /// Conversion quality (1-100)
    pub quality: u8,
    /// Image compression target in KB
    pub image_target_kb: u32,
    /// Video compression target in MB
    pub video_target_mb: u32,
}

impl Default for FormDefaults {
    fn default() -> Self {
        Self {
            quality: 85,
            image_target_kb: 500,
            video_target_mb: 10,
        }
    }
}

/// Configuration for the conversion client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Base URL of the processing service
    pub server_url: String,
    /// Whole-request timeout for a processing call
    pub request_timeout_secs: u64,
    /// TCP connect timeout
    pub connect_timeout_secs: u64,
    /// ffprobe executable used for video metadata
    pub ffprobe_command: String,
    /// Upper bound for a single video probe
    pub probe_timeout_secs: u64,
    pub defaults: FormDefaults,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: "http://127.0.0.1:8000".to_string(),
            request_timeout_secs: 3600,
            connect_timeout_secs: 10,
            ffprobe_command: if cfg!(windows) { "ffprobe.exe" } else { "ffprobe" }.to_string(),
            probe_timeout_secs: 30,
            defaults: FormDefaults::default(),
        }
    }
}

impl ClientConfig {
    /// Validate configuration parameters
    pub fn validate(&self) -> Result<()> {
        if !(self.server_url.starts_with("http://") || self.server_url.starts_with("https://")) {
            return Err(anyhow::anyhow!(
                "Server URL must start with http:// or https://: {}",
                self.server_url
            ));
        }

        if self.request_timeout_secs == 0 || self.connect_timeout_secs == 0 {
            return Err(anyhow::anyhow!("Timeouts must be greater than 0"));
        }

        if self.probe_timeout_secs == 0 {
            return Err(anyhow::anyhow!("Probe timeout must be greater than 0"));
        }

        if self.ffprobe_command.trim().is_empty() {
            return Err(anyhow::anyhow!("ffprobe command must not be empty"));
        }

        if self.defaults.quality == 0 || self.defaults.quality > 100 {
            return Err(anyhow::anyhow!("Quality must be between 1 and 100"));
        }

        if self.defaults.image_target_kb == 0 || self.defaults.video_target_mb == 0 {
            return Err(anyhow::anyhow!("Target sizes must be greater than 0"));
        }

        Ok(())
    }

    /// Service origin without a trailing slash
    pub fn base_url(&self) -> &str {
        self.server_url.trim_end_matches('/')
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    /// Default config file location (`<config dir>/media-converter/config.json`)
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("media-converter").join("config.json"))
    }

    /// Load configuration from file
    pub async fn from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = tokio::fs::read_to_string(path).await?;
        let config: ClientConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub async fn save_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let content = serde_json::to_string_pretty(self)?;
        tokio::fs::write(path, content).await?;
        Ok(())
    }
}
