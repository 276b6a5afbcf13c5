//! Utilities for logging.

use std::str::FromStr;

use tracing::Level;
use tracing::subscriber::SetGlobalDefaultError;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    HumanReadable,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "human" | "human_readable" | "text" => Ok(LogFormat::HumanReadable),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format: {other}")),
        }
    }
}

/// Build the filter for the global subscriber.
///
/// `RUST_LOG` overrides `default_level`. Transport internals are capped at
/// `info` unless requested explicitly.
pub fn env_filter(default_level: Level) -> EnvFilter {
    let mut filter = EnvFilter::builder()
        .with_default_directive(default_level.into())
        .from_env_lossy();
    for directive in ["klickhouse=info", "tokio=info"] {
        if let Ok(directive) = directive.parse() {
            filter = filter.add_directive(directive);
        }
    }
    filter
}

/// Try to configure the global subscriber. Errors if one is already set.
pub fn try_configure_global_logger<W>(
    default_level: Level,
    format: LogFormat,
    writer: W,
) -> Result<(), SetGlobalDefaultError>
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let builder = FmtSubscriber::builder()
        .with_env_filter(env_filter(default_level))
        .with_writer(writer);
    match format {
        LogFormat::HumanReadable => tracing::subscriber::set_global_default(builder.finish()),
        LogFormat::Json => tracing::subscriber::set_global_default(builder.json().finish()),
    }
}

/// Configure the global subscriber, ignoring an already configured one.
pub fn configure_global_logger<W>(default_level: Level, format: LogFormat, writer: W)
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let _ = try_configure_global_logger(default_level, format, writer);
}
