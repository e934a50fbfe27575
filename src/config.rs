use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::env;
use std::time::Duration;
use tracing::{info, warn};

use crate::{log_system_event, log_validation};

/// Complete application configuration loaded from environment variables
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub storage: StorageConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub simulation: SimulationConfig,
    pub payments: PaymentConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// `memory` or a `sqlite:` URL
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
    /// Public origin used for payment redirects
    pub public_base_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub file_enabled: bool,
    pub console_enabled: bool,
    pub log_directory: String,
}

/// Latencies of the mocked external services, in milliseconds
#[derive(Debug, Clone, Deserialize)]
pub struct SimulationConfig {
    pub upload_delay_ms: u64,
    pub generation_delay_ms: u64,
    pub payment_delay_ms: u64,
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
pub enum PaymentProviderType {
    Mock,
    IntaSend,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaymentConfig {
    pub provider: PaymentProviderType,
    pub public_key: String,
    pub is_test: bool,
    pub base_url: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        log_system_event!(config, "Loading application configuration from environment variables");

        let config = Config {
            storage: StorageConfig::from_env()?,
            server: ServerConfig::from_env()?,
            logging: LoggingConfig::from_env()?,
            simulation: SimulationConfig::from_env()?,
            payments: PaymentConfig::from_env()?,
        };

        log_system_event!(config, "Configuration loaded successfully");
        config.log_configuration_summary();

        Ok(config)
    }

    /// Log a summary of loaded configuration (without sensitive data)
    fn log_configuration_summary(&self) {
        info!(
            storage_url = %self.storage.url,
            server_address = %format!("{}:{}", self.server.host, self.server.port),
            payment_provider = ?self.payments.provider,
            payment_key_masked = %mask_sensitive_data(&self.payments.public_key),
            log_level = %self.logging.level,
            "Configuration summary"
        );
    }

    pub fn validate(&self) -> Result<()> {
        if self.storage.url != "memory" && !self.storage.url.starts_with("sqlite:") {
            return Err(anyhow!("STORAGE_URL must be 'memory' or start with 'sqlite:'"));
        }

        if self.server.port == 0 {
            return Err(anyhow!("Server port must be greater than 0"));
        }

        if self.payments.provider == PaymentProviderType::IntaSend
            && (self.payments.public_key.is_empty() || self.payments.public_key.contains("your_public_key"))
        {
            warn!("IntaSend public key appears to be placeholder or empty - checkout will fail");
        }

        if !["trace", "debug", "info", "warn", "error"]
            .iter()
            .any(|level| self.logging.level.to_lowercase().starts_with(level))
        {
            warn!("Unusual log level '{}', the env filter may fall back to defaults", self.logging.level);
        }

        log_validation!(success, "configuration", "Configuration validation completed successfully");
        Ok(())
    }
}

impl StorageConfig {
    fn from_env() -> Result<Self> {
        let url = env::var("STORAGE_URL").unwrap_or_else(|_| "sqlite:study_aid.db?mode=rwc".to_string());
        Ok(StorageConfig { url })
    }
}

impl ServerConfig {
    fn from_env() -> Result<Self> {
        let port_str = env::var("PORT").unwrap_or_else(|_| "3000".to_string());

        let port = port_str.parse::<u16>().map_err(|_| {
            anyhow!("Invalid PORT value: '{}'. Must be a number between 1-65535", port_str)
        })?;

        let host = env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let public_base_url = env::var("PUBLIC_BASE_URL")
            .unwrap_or_else(|_| format!("http://localhost:{}", port))
            .trim_end_matches('/')
            .to_string();

        Ok(ServerConfig {
            port,
            host,
            public_base_url,
        })
    }
}

impl LoggingConfig {
    /// Read on its own so logging can be installed before the rest of the
    /// configuration is loaded.
    pub fn from_env() -> Result<Self> {
        let level = env::var("RUST_LOG").unwrap_or_else(|_| "info,study_aid=debug".to_string());

        let file_enabled = parse_bool_env("LOG_FILE_ENABLED", true);
        let console_enabled = parse_bool_env("LOG_CONSOLE_ENABLED", true);

        let log_directory = env::var("LOG_DIRECTORY").unwrap_or_else(|_| "logs".to_string());

        Ok(LoggingConfig {
            level,
            file_enabled,
            console_enabled,
            log_directory,
        })
    }
}

impl SimulationConfig {
    fn from_env() -> Result<Self> {
        Ok(SimulationConfig {
            upload_delay_ms: parse_u64_env("UPLOAD_DELAY_MS", 2000)?,
            generation_delay_ms: parse_u64_env("GENERATION_DELAY_MS", 3000)?,
            payment_delay_ms: parse_u64_env("PAYMENT_DELAY_MS", 3000)?,
        })
    }

    pub fn upload_delay(&self) -> Duration {
        Duration::from_millis(self.upload_delay_ms)
    }

    pub fn generation_delay(&self) -> Duration {
        Duration::from_millis(self.generation_delay_ms)
    }

    pub fn payment_delay(&self) -> Duration {
        Duration::from_millis(self.payment_delay_ms)
    }
}

impl PaymentConfig {
    fn from_env() -> Result<Self> {
        let provider_str = env::var("PAYMENT_PROVIDER").unwrap_or_else(|_| "mock".to_string());
        let provider = parse_payment_provider(&provider_str);

        let public_key = env::var("INTASEND_PUBLIC_KEY").unwrap_or_default();
        let is_test = parse_bool_env("INTASEND_TEST_MODE", true);
        let base_url = env::var("INTASEND_BASE_URL").ok();

        Ok(PaymentConfig {
            provider,
            public_key,
            is_test,
            base_url,
        })
    }
}

pub fn parse_payment_provider(value: &str) -> PaymentProviderType {
    match value.to_lowercase().as_str() {
        "intasend" => PaymentProviderType::IntaSend,
        "mock" => PaymentProviderType::Mock,
        _ => {
            info!("Unknown payment provider '{}', defaulting to mock", value);
            PaymentProviderType::Mock
        }
    }
}

fn parse_bool_env(name: &str, default: bool) -> bool {
    env::var(name)
        .ok()
        .and_then(|v| v.parse::<bool>().ok())
        .unwrap_or(default)
}

fn parse_u64_env(name: &str, default: u64) -> Result<u64> {
    match env::var(name) {
        Ok(value) => value
            .parse::<u64>()
            .map_err(|_| anyhow!("Invalid {} value: '{}'. Must be a non-negative integer", name, value)),
        Err(_) => Ok(default),
    }
}

/// Mask sensitive data in configuration for safe logging
fn mask_sensitive_data(data: &str) -> String {
    let len = data.chars().count();
    if len <= 8 {
        "*".repeat(len)
    } else {
        let head: String = data.chars().take(4).collect();
        let tail: String = data.chars().skip(len - 4).collect();
        format!("{}***{}", head, tail)
    }
}
