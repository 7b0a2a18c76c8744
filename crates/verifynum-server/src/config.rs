//! Configuration from environment variables (optionally via `.env`).

use std::env;
use std::str::FromStr;
use std::time::Duration;

use bigdecimal::BigDecimal;

use crate::provider::polar::{PRODUCTION_API_URL, SANDBOX_API_URL};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid {name}: {value}")]
    Invalid { name: &'static str, value: String },

    #[error("{0} must be set in production")]
    RequiredInProduction(&'static str),

    #[error("MIN_CUSTOM_AMOUNT ({min}) must be positive and not above MAX_CUSTOM_AMOUNT ({max})")]
    AmountBounds { min: BigDecimal, max: BigDecimal },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub environment: Environment,
    pub server: ServerConfig,
    /// `None` selects the in-memory store.
    pub database: Option<DatabaseConfig>,
    pub polar: PolarConfig,
    pub checkout: CheckoutLimits,
    /// Enables `POST /admin/credit` when set.
    pub admin_token: Option<String>,
    pub store_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone)]
pub struct PolarConfig {
    /// `None` means development checkout mode.
    pub access_token: Option<String>,
    pub webhook_secret: Option<String>,
    pub product_id: Option<String>,
    pub price_id: Option<String>,
    pub api_url: String,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct CheckoutLimits {
    pub public_app_url: String,
    pub min_custom_amount: BigDecimal,
    pub max_custom_amount: BigDecimal,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds the configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let environment = match var("APP_ENV").as_deref() {
            None | Some("development") | Some("dev") => Environment::Development,
            Some("production") | Some("prod") => Environment::Production,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    name: "APP_ENV",
                    value: other.to_string(),
                })
            }
        };

        let database = var("DATABASE_URL")
            .map(|url| {
                Ok::<_, ConfigError>(DatabaseConfig {
                    url,
                    max_connections: parse_or(&var, "DB_MAX_CONNECTIONS", 10)?,
                })
            })
            .transpose()?;

        let default_api_url = match environment {
            Environment::Development => SANDBOX_API_URL,
            Environment::Production => PRODUCTION_API_URL,
        };

        let config = Self {
            environment,
            server: ServerConfig {
                host: var("SERVER_HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
                port: parse_or(&var, "SERVER_PORT", 8080)?,
            },
            database,
            polar: PolarConfig {
                access_token: var("POLAR_ACCESS_TOKEN"),
                webhook_secret: var("POLAR_WEBHOOK_SECRET"),
                product_id: var("POLAR_PRODUCT_ID"),
                price_id: var("POLAR_PRICE_ID"),
                api_url: var("POLAR_API_URL").unwrap_or_else(|| default_api_url.to_string()),
                timeout: Duration::from_secs(parse_or(&var, "PROVIDER_TIMEOUT_SECS", 10)?),
            },
            checkout: CheckoutLimits {
                public_app_url: var("PUBLIC_APP_URL")
                    .unwrap_or_else(|| "http://localhost:3001".to_string()),
                min_custom_amount: parse_decimal_or(&var, "MIN_CUSTOM_AMOUNT", "1.00")?,
                max_custom_amount: parse_decimal_or(&var, "MAX_CUSTOM_AMOUNT", "10000.00")?,
            },
            admin_token: var("ADMIN_API_TOKEN"),
            store_timeout: Duration::from_secs(parse_or(&var, "STORE_TIMEOUT_SECS", 5)?),
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let limits = &self.checkout;
        if limits.min_custom_amount <= BigDecimal::from(0)
            || limits.min_custom_amount > limits.max_custom_amount
        {
            return Err(ConfigError::AmountBounds {
                min: limits.min_custom_amount.clone(),
                max: limits.max_custom_amount.clone(),
            });
        }

        if self.environment == Environment::Production {
            if self.database.is_none() {
                return Err(ConfigError::RequiredInProduction("DATABASE_URL"));
            }
            if self.polar.access_token.is_none() {
                return Err(ConfigError::RequiredInProduction("POLAR_ACCESS_TOKEN"));
            }
            if self.polar.webhook_secret.is_none() {
                return Err(ConfigError::RequiredInProduction("POLAR_WEBHOOK_SECRET"));
            }
        }
        Ok(())
    }

    pub fn is_production(&self) -> bool {
        self.environment == Environment::Production
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

fn parse_or<T, F>(var: &F, name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match var(name) {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value }),
    }
}

fn parse_decimal_or<F>(
    var: &F,
    name: &'static str,
    default: &str,
) -> Result<BigDecimal, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let value = var(name).unwrap_or_else(|| default.to_string());
    BigDecimal::from_str(value.trim()).map_err(|_| ConfigError::Invalid { name, value })
}
