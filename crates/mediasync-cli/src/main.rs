//! Mediasync CLI: mirrors a local upload tree to object storage.
//!
//! Configured through MEDIASYNC_* environment variables (or a .env file).
//! Without MEDIASYNC_PROVIDER every command is inert: nothing is uploaded and
//! text transforms pass their input through unchanged.

use anyhow::Context;
use clap::{Parser, Subcommand};
use mediasync_cli::{init_tracing, read_input, reference_time_arg};
use mediasync_services::{
    AttachmentMetadata, FileSetEvent, MediaEvent, StaticHost, SyncConfig, SyncError,
    SyncService, UrlRewriter,
};
use serde::Serialize;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "mediasync", about = "Mirror uploaded media to S3 or Google Cloud Storage")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload a primary file and its derived variants
    Sync {
        /// Path to the primary file, under the upload root
        primary: PathBuf,
        /// File names of derived variants stored next to the primary
        #[arg(long = "derived", value_name = "FILE_NAME")]
        derived: Vec<String>,
        /// Publish time used for the year/month folder (defaults to now)
        #[arg(long)]
        reference_time: Option<String>,
    },
    /// Upload a primary file and the variants listed in its attachment metadata JSON
    SyncMetadata {
        /// Path to the primary file, under the upload root
        primary: PathBuf,
        /// Attachment metadata JSON file
        metadata: PathBuf,
        #[arg(long)]
        reference_time: Option<String>,
    },
    /// Delete the remote copy of a local file
    Delete {
        /// Path to the local file, under the upload root
        path: PathBuf,
    },
    /// Print the remote keys a local file maps to
    Key {
        path: PathBuf,
        #[arg(long)]
        reference_time: Option<String>,
    },
    /// Rewrite image URLs in an HTML document to the CDN host
    RewriteHtml {
        /// Input file (stdin when omitted)
        file: Option<PathBuf>,
    },
    /// Rewrite upload URLs in every string of a JSON document
    RewriteJson {
        /// Input file (stdin when omitted)
        file: Option<PathBuf>,
    },
}

fn print_json(value: &impl Serialize) -> anyhow::Result<()> {
    let out = serde_json::to_string_pretty(value).context("Serialize output")?;
    println!("{}", out);
    Ok(())
}

/// Load configuration; configuration problems leave the component inert.
fn load_config() -> Option<SyncConfig> {
    match SyncConfig::from_env() {
        Ok(Some(config)) => {
            tracing::debug!(
                provider = %config.provider,
                bucket = %config.bucket,
                prefix = %config.prefix,
                "Configuration loaded"
            );
            Some(config)
        }
        Ok(None) => {
            tracing::info!("MEDIASYNC_PROVIDER not set, media sync is disabled");
            None
        }
        Err(e) => {
            let err = SyncError::Config(format!("{:#}", e));
            tracing::warn!(error = %err, code = err.error_code(), "Media sync is disabled");
            None
        }
    }
}

fn rewriter(config: Option<&SyncConfig>) -> Option<UrlRewriter> {
    let config = config?;
    let host = StaticHost::from_config(config);
    UrlRewriter::from_host(config, &host)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    let config = load_config();

    match cli.command {
        Commands::Sync {
            primary,
            derived,
            reference_time,
        } => {
            let reference_time = reference_time_arg(reference_time.as_deref())?;
            let Some(config) = config else {
                return Ok(());
            };
            let mut event = FileSetEvent::new(primary).with_derived(derived);
            event.reference_time = reference_time;

            let service = SyncService::from_config(config);
            let outcome = service.dispatch(MediaEvent::FileSetReady(event)).await;
            print_json(&outcome)?;
        }
        Commands::SyncMetadata {
            primary,
            metadata,
            reference_time,
        } => {
            let reference_time = reference_time_arg(reference_time.as_deref())?;
            let raw = read_input(Some(&metadata))?;
            let metadata: AttachmentMetadata = serde_json::from_str(&raw)
                .with_context(|| format!("Invalid attachment metadata in {}", metadata.display()))?;
            let Some(config) = config else {
                print_json(&metadata)?;
                return Ok(());
            };

            let service = SyncService::from_config(config);
            let event = FileSetEvent::from_metadata(primary, &metadata, reference_time);
            let report = service.sync_file_set(&event).await;
            print_json(&report)?;
        }
        Commands::Delete { path } => {
            let Some(config) = config else {
                return Ok(());
            };
            let service = SyncService::from_config(config);
            let outcome = service.dispatch(MediaEvent::FileDeleted(path)).await;
            print_json(&outcome)?;
        }
        Commands::Key {
            path,
            reference_time,
        } => {
            let reference_time =
                reference_time_arg(reference_time.as_deref())?.unwrap_or_else(chrono::Utc::now);
            let Some(config) = config else {
                return Ok(());
            };
            let mapper = SyncService::from_config(config).key_mapper();
            print_json(&serde_json::json!({
                "upload_key": mapper.map_key(&path, reference_time),
                "existing_key": mapper.key_for_local_path(&path),
            }))?;
        }
        Commands::RewriteHtml { file } => {
            let html = read_input(file.as_deref())?;
            match rewriter(config.as_ref()) {
                Some(rewriter) => print!("{}", rewriter.rewrite_html(&html)),
                None => print!("{}", html),
            }
        }
        Commands::RewriteJson { file } => {
            let raw = read_input(file.as_deref())?;
            let mut value: serde_json::Value =
                serde_json::from_str(&raw).context("Input is not valid JSON")?;
            if let Some(rewriter) = rewriter(config.as_ref()) {
                let changed = rewriter.rewrite_value(&mut value);
                tracing::debug!(changed, "Rewrote JSON strings");
            }
            print_json(&value)?;
        }
    }

    Ok(())
}
