//! # Media Converter - Main Entry Point
//!
//! Adapter da terminale per il client di conversione.
//!
//! ## Responsabilità:
//! - Parsing degli argomenti della command line con `clap`
//! - Inizializzazione del sistema di logging con `tracing`
//! - Caricamento della configurazione (file + override da CLI)
//! - Guida una pipeline: select → submit → salvataggio → confronto
//!
//! ## Esempio di utilizzo:
//! ```bash
//! media-converter image convert photo.png --to webp --quality 80 --compare
//! media-converter video compress clip.mov --format mp4 --target 10 --codec libx265
//! media-converter formats
//! ```

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use media_converter::config::FormDefaults;
use media_converter::pipeline::KindPolicy;
use media_converter::progress::describe;
use media_converter::{
    ClientConfig, ComparisonView, FormValues, MediaConverter, MediaFile, MediaKind, OperationMode,
    PipelineState, ProgressReporter, SubmitOutcome,
};

#[derive(Parser)]
#[command(name = "media-converter")]
#[command(about = "Convert and compress images and videos through a media conversion service")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Service origin, overrides the config file
    #[arg(long, global = true)]
    server: Option<String>,

    /// Config file (defaults to the user config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Process an image
    Image {
        #[command(subcommand)]
        operation: Operation,
    },
    /// Process a video
    Video {
        #[command(subcommand)]
        operation: Operation,
    },
    /// Check that the service is reachable
    Health,
    /// List the output formats the service supports
    Formats,
}

#[derive(Subcommand)]
enum Operation {
    /// Change format at a given quality
    Convert {
        file: PathBuf,

        /// Target format (webp, png, mp4, ...)
        #[arg(long)]
        to: String,

        /// Quality (1-100)
        #[arg(short, long)]
        quality: Option<u8>,

        #[command(flatten)]
        common: CommonArgs,
    },
    /// Shrink towards a target size
    Compress {
        file: PathBuf,

        /// Output format
        #[arg(long)]
        format: String,

        /// Target size: KB for images, MB for videos
        #[arg(short, long)]
        target: Option<u32>,

        #[command(flatten)]
        common: CommonArgs,
    },
}

#[derive(Args)]
struct CommonArgs {
    /// Video codec (libx264, libx265, libvpx-vp9, ...)
    #[arg(long)]
    codec: Option<String>,

    /// Directory for the processed file
    #[arg(short, long, default_value = ".")]
    output: PathBuf,

    /// Print a before/after comparison
    #[arg(long)]
    compare: bool,
}

impl Operation {
    fn split(self, kind: MediaKind, defaults: &FormDefaults) -> (PathBuf, OperationMode, FormValues, CommonArgs) {
        let (file, mode, form, common) = match self {
            Self::Convert { file, to, quality, common } => {
                let form = FormValues::convert(to, quality.unwrap_or(defaults.quality));
                (file, OperationMode::Convert, form, common)
            }
            Self::Compress { file, format, target, common } => {
                let default_target = match kind {
                    MediaKind::Image => defaults.image_target_kb,
                    MediaKind::Video => defaults.video_target_mb,
                };
                let form = FormValues::compress(format, target.unwrap_or(default_target));
                (file, OperationMode::Compress, form, common)
            }
        };

        let form = match &common.codec {
            Some(codec) => form.with_codec(codec.clone()),
            None => form,
        };
        (file, mode, form, common)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if cli.verbose { "debug" } else { "info" }));
    let subscriber = tracing_subscriber::fmt().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let mut config = match cli.config.clone().or_else(ClientConfig::default_path) {
        Some(path) => ClientConfig::from_file(&path)
            .await
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => ClientConfig::default(),
    };
    if let Some(server) = cli.server {
        config.server_url = server;
    }

    let converter = MediaConverter::new(&config, Arc::new(ProgressReporter::new()))?;

    match cli.command {
        Command::Image { operation } => {
            let (file, mode, form, common) = operation.split(MediaKind::Image, &config.defaults);
            run(converter.image(), &file, mode, &form, &common).await
        }
        Command::Video { operation } => {
            let (file, mode, form, common) = operation.split(MediaKind::Video, &config.defaults);
            run(converter.video(), &file, mode, &form, &common).await
        }
        Command::Health => {
            let health = converter.health().await?;
            println!("{}: {}", health.service, health.status);
            Ok(())
        }
        Command::Formats => {
            let formats = converter.supported_formats().await?;
            println!("image: {}", formats.image.join(", "));
            println!("video: {}", formats.video.join(", "));
            Ok(())
        }
    }
}

async fn run<K: KindPolicy>(
    pipeline: &PipelineState<K>,
    path: &Path,
    mode: OperationMode,
    form: &FormValues,
    common: &CommonArgs,
) -> Result<()> {
    let file = MediaFile::from_path(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;

    let original = pipeline.select(file).await?;
    info!("📁 {}: {}", path.display(), describe(&original));

    match pipeline.submit(mode, form).await? {
        SubmitOutcome::Completed => {}
        outcome => anyhow::bail!("Submission did not complete: {:?}", outcome),
    }

    let saved = pipeline.save_result(&common.output).await?;
    println!("💾 {}", saved.display());

    if common.compare {
        print_comparison(&pipeline.compare().await?);
    }

    pipeline.reset().await;
    Ok(())
}

fn print_comparison(view: &ComparisonView) {
    let row = |label: &str, original: String, processed: String| {
        println!("{:<12} {:>18} {:>18}", label, original, processed);
    };
    let or_dash = |value: Option<String>| value.unwrap_or_else(|| "-".to_string());

    row("", "Original".to_string(), "Processed".to_string());
    row("Format", view.original.format.clone(), view.processed.format.clone());
    row("Size", view.original.size_label(), view.processed.size_label());
    row(
        "Dimensions",
        or_dash(view.original.dimensions_label()),
        or_dash(view.processed.dimensions_label()),
    );
    if view.kind == MediaKind::Video {
        row(
            "Duration",
            or_dash(view.original.duration_label()),
            or_dash(view.processed.duration_label()),
        );
    }

    let change = view
        .size_delta
        .map(|delta| delta.label())
        .unwrap_or_else(|| "n/a".to_string());
    println!("{:<12} {:>18}", "Change", change);
}
