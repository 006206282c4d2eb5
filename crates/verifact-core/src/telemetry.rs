use once_cell::sync::OnceCell;
use tracing_subscriber::{EnvFilter, fmt};

use crate::VerifactError;
use crate::config::LoggingConfig;

static INSTALLED: OnceCell<()> = OnceCell::new();

/// Console subscriber settings for the binaries.
#[derive(Debug, Clone)]
pub struct TelemetryOptions {
    /// Filter used when `RUST_LOG` is unset, e.g. `info` or `verifact_core=debug`.
    pub default_filter: String,
    pub with_ansi: bool,
    pub with_target: bool,
}

impl Default for TelemetryOptions {
    fn default() -> Self {
        Self {
            default_filter: "info".to_string(),
            with_ansi: true,
            with_target: false,
        }
    }
}

impl TelemetryOptions {
    pub fn from_logging(logging: &LoggingConfig) -> Self {
        Self {
            default_filter: logging.level.clone(),
            ..Self::default()
        }
    }

    fn filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(&self.default_filter))
            .unwrap_or_else(|_| EnvFilter::new("info"))
    }
}

/// Install the global fmt subscriber once; later calls return `Ok(false)`.
pub fn init_telemetry(options: TelemetryOptions) -> Result<bool, VerifactError> {
    if INSTALLED.get().is_some() {
        return Ok(false);
    }

    fmt::Subscriber::builder()
        .with_env_filter(options.filter())
        .with_ansi(options.with_ansi)
        .with_target(options.with_target)
        .try_init()
        .map_err(|err| {
            VerifactError::InvalidConfiguration(format!("telemetry init failed: {err}"))
        })?;

    let _ = INSTALLED.set(());
    Ok(true)
}
