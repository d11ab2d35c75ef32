use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};

/// Distinguishes runtime behavior for different stages of the billing service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Top-level configuration for a host embedding the billing engine.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub billing: BillingConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("BILLING_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("BILLING_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("BILLING_PORT")
            .unwrap_or_else(|_| "4100".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = env::var("BILLING_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let currency_code = parse_currency_code(
            &env::var("BILLING_CURRENCY").unwrap_or_else(|_| "IDR".to_string()),
        )?;

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            billing: BillingConfig { currency_code },
        })
    }
}

/// Display settings for monetary amounts. The engine computes and reports
/// plain numbers; the host labels them with this currency.
#[derive(Debug, Clone)]
pub struct BillingConfig {
    /// ISO 4217 alphabetic code, normalized to uppercase.
    pub currency_code: String,
}

fn parse_currency_code(raw: &str) -> Result<String, ConfigError> {
    let code = raw.trim().to_ascii_uppercase();
    if code.len() == 3 && code.bytes().all(|b| b.is_ascii_uppercase()) {
        Ok(code)
    } else {
        Err(ConfigError::InvalidCurrency { value: raw.to_string() })
    }
}

/// Settings controlling the HTTP binding of the embedding host.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Tracing controls handed to [`crate::telemetry::init`].
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidCurrency { value: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "BILLING_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "BILLING_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidCurrency { value } => {
                write!(f, "BILLING_CURRENCY '{value}' is not a three-letter currency code")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidPort | ConfigError::InvalidCurrency { .. } => None,
            ConfigError::InvalidHost { source } => Some(source),
        }
    }
}
