use anyhow::Context;
use chrono::{DateTime, Utc};
use mediasync_services::parse_reference_time;
use std::io::Read;
use std::path::Path;

/// Read a whole text input from `path`, or from stdin when no path is given.
pub fn read_input(path: Option<&Path>) -> anyhow::Result<String> {
    match path {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display())),
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("Failed to read stdin")?;
            Ok(buf)
        }
    }
}

/// Parse an optional `--reference-time` argument.
///
/// Zero dates are treated as absent so the current time is used, as hosts do.
pub fn reference_time_arg(value: Option<&str>) -> anyhow::Result<Option<DateTime<Utc>>> {
    match value {
        None => Ok(None),
        Some(v) if v.trim().is_empty() || v.trim_start().starts_with("0000") => Ok(None),
        Some(v) => parse_reference_time(v)
            .map(Some)
            .with_context(|| format!("Invalid reference time: {}", v)),
    }
}

/// Initialize tracing for the CLI. Logs go to stderr so stdout carries only results.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("mediasync=info")),
        )
        .with_writer(std::io::stderr)
        .init();
}
