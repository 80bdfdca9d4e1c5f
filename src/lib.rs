//! # Media Converter Library
//!
//! Client per un servizio self-hosted di conversione e compressione di
//! immagini e video. Il lavoro pesante lo fa il servizio; qui vivono le
//! pipeline che selezionano il file, costruiscono la richiesta, interpretano
//! la risposta e confrontano originale e risultato.
//!
//! ## Architettura dei moduli:
//! - `media`: Tipi di dominio (file, metadata, richieste, risultati)
//! - `probe`: Lettura metadata tecnici (dimensioni, durata via ffprobe)
//! - `request`: Traduzione dei valori del form in una richiesta
//! - `service`: Confine verso il servizio remoto (trait + client HTTP)
//! - `response`: Interpretazione delle risposte del servizio
//! - `session` / `pipeline`: Macchina a stati per tipo di media
//! - `comparison`: Metriche prima/dopo e formattazione
//! - `preview`: Handle temporanei per mostrare i payload
//! - `progress`: Adapter da terminale con spinner
//! - `converter`: Façade con entrambe le pipeline
//! - `config` / `error`: Configurazione e tipi di errore
//!
//! ## Utilizzo:
//! ```rust,no_run
//! use media_converter::{ClientConfig, MediaConverter, NoopObserver};
//! use std::sync::Arc;
//!
//! # async fn run() -> anyhow::Result<()> {
//! let converter = MediaConverter::new(&ClientConfig::default(), Arc::new(NoopObserver))?;
//! println!("{:?}", converter.health().await?);
//! # Ok(())
//! # }
//! ```

pub mod comparison;
pub mod config;
pub mod converter;
pub mod error;
pub mod media;
pub mod pipeline;
pub mod preview;
pub mod probe;
pub mod progress;
pub mod request;
pub mod response;
pub mod service;
pub mod session;

pub use comparison::{format_duration, format_size, ComparisonEngine, ComparisonView, SizeDelta};
pub use config::ClientConfig;
pub use converter::{MediaConverter, SupportedFormats};
pub use error::ConvertError;
pub use media::{MediaFile, MediaKind, MediaMetadata, OperationMode, OperationRequest, ProcessedResult};
pub use pipeline::{ImagePipeline, NoopObserver, PipelineObserver, PipelineState, SubmitOutcome, VideoPipeline};
pub use probe::MetadataProbe;
pub use progress::ProgressReporter;
pub use request::{FormValues, RequestBuilder};
pub use response::ResponseInterpreter;
pub use service::{HttpProcessingService, ProcessingService};
pub use session::Phase;
