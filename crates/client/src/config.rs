//! Client configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `CART_API_URL` - Base URL of the host serving `/cart` (e.g., `http://127.0.0.1:3000`)
//!
//! ## Optional
//! - `CART_STATE_DIR` - Directory for the persisted cart snapshot (default: `.cart-state`)
//! - `CART_SYNC_DEBOUNCE_MS` - Quiet window before a coalesced push (default: 400)
//! - `CART_REQUEST_TIMEOUT_SECS` - Per-request timeout (default: 10)

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;
use url::Url;

const DEFAULT_DEBOUNCE_MS: u64 = 400;
const MAX_DEBOUNCE_MS: u64 = 10_000;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

/// Cart client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the cart endpoint host
    pub api_url: Url,
    /// Directory holding the persisted snapshot
    pub state_dir: PathBuf,
    /// Debounce window for coalescing pushes
    pub debounce: Duration,
    /// Per-request timeout
    pub request_timeout: Duration,
}

impl ClientConfig {
    /// Configuration with defaults for everything but the API URL.
    #[must_use]
    pub fn new(api_url: Url) -> Self {
        Self {
            api_url,
            state_dir: PathBuf::from(".cart-state"),
            debounce: Duration::from_millis(DEFAULT_DEBOUNCE_MS),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
        }
    }

    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let api_url = Url::parse(&get_required_env("CART_API_URL")?)
            .map_err(|e| ConfigError::InvalidEnvVar("CART_API_URL".to_string(), e.to_string()))?;
        let state_dir = PathBuf::from(get_env_or_default("CART_STATE_DIR", ".cart-state"));
        let debounce_ms = parse_debounce_ms(&get_env_or_default(
            "CART_SYNC_DEBOUNCE_MS",
            &DEFAULT_DEBOUNCE_MS.to_string(),
        ))?;
        let timeout_secs = get_env_or_default(
            "CART_REQUEST_TIMEOUT_SECS",
            &DEFAULT_REQUEST_TIMEOUT_SECS.to_string(),
        )
        .parse::<u64>()
        .map_err(|e| {
            ConfigError::InvalidEnvVar("CART_REQUEST_TIMEOUT_SECS".to_string(), e.to_string())
        })?;

        Ok(Self {
            api_url,
            state_dir,
            debounce: Duration::from_millis(debounce_ms),
            request_timeout: Duration::from_secs(timeout_secs),
        })
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Parse and bound the debounce window.
fn parse_debounce_ms(raw: &str) -> Result<u64, ConfigError> {
    let invalid = |msg: String| ConfigError::InvalidEnvVar("CART_SYNC_DEBOUNCE_MS".to_string(), msg);
    let value = raw.parse::<u64>().map_err(|e| invalid(e.to_string()))?;
    if value == 0 || value > MAX_DEBOUNCE_MS {
        return Err(invalid(format!("must be between 1 and {MAX_DEBOUNCE_MS}")));
    }
    Ok(value)
}

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_debounce_ms_bounds() {
        assert_eq!(parse_debounce_ms("400").unwrap(), 400);
        assert!(parse_debounce_ms("0").is_err());
        assert!(parse_debounce_ms("10001").is_err());
        assert!(parse_debounce_ms("fast").is_err());
    }

    #[test]
    fn test_new_uses_defaults() {
        let config = ClientConfig::new(Url::parse("http://localhost:3000").unwrap());
        assert_eq!(config.debounce, Duration::from_millis(400));
        assert_eq!(config.request_timeout, Duration::from_secs(10));
        assert_eq!(config.state_dir, PathBuf::from(".cart-state"));
    }
}
