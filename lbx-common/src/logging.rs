//! Tracing subscriber setup shared by LBX binaries

use serde::{Deserialize, Serialize};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// `[logging]` table of the config file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset (e.g. "info", "lbx_fusion=debug")
    pub level: String,
    /// Emit ANSI colours
    pub ansi: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            ansi: true,
        }
    }
}

impl LoggingConfig {
    /// Filter used when the environment does not provide one
    pub fn env_filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(&self.level))
            .unwrap_or_else(|_| EnvFilter::new("info"))
    }
}

/// Install the global tracing subscriber
///
/// Logs go to stderr so stdout stays clean for JSON output.
/// Returns an error if a global subscriber was already installed.
pub fn init_tracing(config: &LoggingConfig) -> crate::Result<()> {
    tracing_subscriber::registry()
        .with(config.env_filter())
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(config.ansi),
        )
        .try_init()
        .map_err(|e| crate::Error::Internal(format!("Tracing init failed: {}", e)))
}
