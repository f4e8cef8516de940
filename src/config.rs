//! Service configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! All optional:
//! - `DATABASE_URL` - `PostgreSQL` connection string; the in-memory store is used when unset
//! - `DATABASE_MAX_CONNECTIONS` - Pool size (default: 10)
//! - `HOST` - Bind address (default: 0.0.0.0)
//! - `PORT` - Listen port (default: 8083)
//! - `FREE_SHIPPING_THRESHOLD` - Items price above which shipping is free (default: 100)
//! - `FLAT_SHIPPING_FEE` - Shipping fee otherwise (default: 10)
//! - `TAX_RATE` - Fraction of the items price (default: 0.08)
//! - `PAYMENT_SUCCESS_RATE` - Probability a simulated payment succeeds (default: 0.9)
//! - `ORDER_STATUS_POLICY` - `any` or `forward` (default: any)

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::str::FromStr;

use rust_decimal::Decimal;
use thiserror::Error;

use crate::domain::{Money, PricingPolicy, StatusPolicy};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub host: IpAddr,
    pub port: u16,
    pub pricing: PricingPolicy,
    /// In `[0, 1]`.
    pub payment_success_rate: f64,
    pub status_policy: StatusPolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: None,
            database_max_connections: 10,
            host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 8083,
            pricing: PricingPolicy::default(),
            payment_success_rate: 0.9,
            status_policy: StatusPolicy::default(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable is set but cannot be parsed.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a configuration from any key lookup; unset keys take defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let payment_success_rate = parse_or(&get, "PAYMENT_SUCCESS_RATE", defaults.payment_success_rate)?;
        if !(0.0..=1.0).contains(&payment_success_rate) {
            return Err(invalid("PAYMENT_SUCCESS_RATE", "must be between 0 and 1"));
        }

        let database_max_connections: u32 =
            parse_or(&get, "DATABASE_MAX_CONNECTIONS", defaults.database_max_connections)?;
        if database_max_connections == 0 {
            return Err(invalid("DATABASE_MAX_CONNECTIONS", "must be at least 1"));
        }

        let tax_rate: Decimal = parse_or(&get, "TAX_RATE", defaults.pricing.tax_rate)?;
        let free_shipping_threshold: Decimal =
            parse_or(&get, "FREE_SHIPPING_THRESHOLD", defaults.pricing.free_shipping_threshold.amount())?;
        let flat_shipping_fee: Decimal = parse_or(&get, "FLAT_SHIPPING_FEE", defaults.pricing.flat_shipping_fee.amount())?;
        for (key, value) in [
            ("TAX_RATE", tax_rate),
            ("FREE_SHIPPING_THRESHOLD", free_shipping_threshold),
            ("FLAT_SHIPPING_FEE", flat_shipping_fee),
        ] {
            if value.is_sign_negative() && !value.is_zero() {
                return Err(invalid(key, "must not be negative"));
            }
        }

        Ok(Self {
            database_url: get("DATABASE_URL"),
            database_max_connections,
            host: parse_or(&get, "HOST", defaults.host)?,
            port: parse_or(&get, "PORT", defaults.port)?,
            pricing: PricingPolicy {
                free_shipping_threshold: Money::new(free_shipping_threshold),
                flat_shipping_fee: Money::new(flat_shipping_fee),
                tax_rate,
            },
            payment_success_rate,
            status_policy: parse_or(&get, "ORDER_STATUS_POLICY", defaults.status_policy)?,
        })
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

fn parse_or<T>(get: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match get(key) {
        Some(raw) => raw.parse::<T>().map_err(|e| invalid(key, &e.to_string())),
        None => Ok(default),
    }
}

fn invalid(key: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidEnvVar(key.to_string(), reason.to_string())
}
