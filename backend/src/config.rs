//! Configuration management for the fuel-station stock server
//!
//! Supports hierarchical configuration loading:
//! 1. Default values in code
//! 2. Configuration files (development.toml, production.toml)
//! 3. Environment variable overrides with FSS_ prefix

use config::{ConfigError, Environment, File};
use rust_decimal::Decimal;
use serde::Deserialize;

/// Main application configuration
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Current environment (development, production)
    pub environment: String,

    /// Server configuration
    pub server: ServerConfig,

    /// Database configuration
    pub database: DatabaseConfig,

    /// JWT authentication configuration
    pub jwt: JwtConfig,

    /// Stock ledger policy
    pub stock: StockConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    /// Server port
    pub port: u16,

    /// Server host
    pub host: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,

    /// Maximum number of connections in the pool
    pub max_connections: u32,

    /// Minimum number of connections in the pool
    pub min_connections: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct JwtConfig {
    /// Secret key used to verify JWT tokens
    pub secret: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StockConfig {
    /// Delivery variance tolerance in basis points of the ordered quantity
    pub variance_tolerance_bp: i64,

    /// Days on each side of a delivery searched for its purchase-order line
    pub variance_window_days: i64,

    /// Record audit events for ledger mutations
    pub audit_enabled: bool,
}

impl StockConfig {
    /// Tolerance as a fraction (500 bp = 0.05)
    pub fn variance_tolerance(&self) -> Decimal {
        Decimal::new(self.variance_tolerance_bp, 4)
    }
}

impl Config {
    /// Load configuration from files and environment variables
    pub fn load() -> Result<Self, ConfigError> {
        let environment = std::env::var("FSS_ENVIRONMENT").unwrap_or_else(|_| "development".into());

        let config = config::Config::builder()
            // Start with default values
            .set_default("environment", environment.clone())?
            .set_default("server.port", 3000)?
            .set_default("server.host", "0.0.0.0")?
            .set_default("database.max_connections", 10)?
            .set_default("database.min_connections", 2)?
            .set_default("stock.variance_tolerance_bp", 500)?
            .set_default("stock.variance_window_days", 3)?
            .set_default("stock.audit_enabled", true)?
            // Load environment-specific config file
            .add_source(File::with_name(&format!("config/{}", environment)).required(false))
            // Override with environment variables (FSS_ prefix)
            .add_source(
                Environment::with_prefix("FSS")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 3000,
            host: "0.0.0.0".to_string(),
        }
    }
}

impl Default for StockConfig {
    fn default() -> Self {
        Self {
            variance_tolerance_bp: 500,
            variance_window_days: shared::DEFAULT_WINDOW_DAYS,
            audit_enabled: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_tolerance_is_five_percent() {
        let stock = StockConfig::default();
        assert_eq!(stock.variance_tolerance(), shared::default_tolerance());
        assert_eq!(stock.variance_window_days, 3);
    }
}
