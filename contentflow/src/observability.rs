//! Structured logging setup for orchestrator processes.

use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// Human-readable single-line output.
    #[default]
    Text,
    /// One JSON object per event, for log shippers.
    Json,
}

/// Installs the global tracing subscriber.
///
/// The filter honours `RUST_LOG`, falling back to the given default
/// directive (e.g. `"contentflow=info"`). Returns an error if a global
/// subscriber is already set.
pub fn init_tracing(
    default_directive: &str,
    format: LogFormat,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_directive))?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);
    match format {
        LogFormat::Text => builder.try_init()?,
        LogFormat::Json => builder.json().try_init()?,
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_format_serializes_snake_case() {
        let json = serde_json::to_value(LogFormat::Json).unwrap();
        assert_eq!(json, "json");
        assert_eq!(LogFormat::default(), LogFormat::Text);
    }
}
