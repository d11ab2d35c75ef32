use crate::config::TelemetryConfig;
use std::fmt;
use tracing_subscriber::filter::ParseError;
use tracing_subscriber::EnvFilter;

#[derive(Debug)]
pub enum TelemetryError {
    InvalidLevel { value: String, source: ParseError },
    Install(Box<dyn std::error::Error + Send + Sync>),
}

impl fmt::Display for TelemetryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TelemetryError::InvalidLevel { value, .. } => {
                write!(f, "BILLING_LOG_LEVEL '{value}' is not a valid filter directive")
            }
            TelemetryError::Install(err) => write!(f, "failed to install subscriber: {err}"),
        }
    }
}

impl std::error::Error for TelemetryError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TelemetryError::InvalidLevel { source, .. } => Some(source),
            TelemetryError::Install(err) => Some(&**err),
        }
    }
}

/// Directives applied when `RUST_LOG` is absent: the configured level drives
/// the engine's sync and override events while the HTTP stack stays at warn.
fn default_directives(level: &str) -> String {
    format!("{level},tower=warn,hyper=warn")
}

fn env_filter(config: &TelemetryConfig) -> Result<EnvFilter, TelemetryError> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }

    EnvFilter::try_new(default_directives(&config.log_level)).map_err(|source| {
        TelemetryError::InvalidLevel {
            value: config.log_level.clone(),
            source,
        }
    })
}

/// Install the global subscriber for an embedding host. `RUST_LOG` wins over
/// the configured level; entitlement writes land as single-line events so the
/// host can grep a student or policy id through a sync pass.
pub fn init(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter(config)?)
        .with_target(false)
        .compact()
        .with_ansi(false)
        .try_init()
        .map_err(TelemetryError::Install)
}
