use anyhow::{anyhow, Context, Result};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::payments::reconcile::EngineConfig;
use crate::workers::sweep::SweepConfig;

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub gateway: GatewayConfig,
    pub host: HostApiConfig,
    pub callbacks: CallbackConfig,
    pub sweep: SweepConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub environment: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    /// Credential caching is disabled when unset
    pub url: Option<String>,
    pub credentials_ttl_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    pub api_url: String,
    pub timeout_secs: u64,
    pub name: String,
    pub surcharge_percent: Decimal,
    pub max_delivery_attempts: i32,
    /// Seconds a delivery claim blocks other reconcilers
    pub delivery_lease_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HostApiConfig {
    pub api_url: String,
    /// Landing page for return redirects without a more specific target
    pub site_url: String,
    pub api_token: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CallbackConfig {
    /// Externally reachable base URL of this service
    pub public_base_url: String,
    pub signing_secret: String,
}

fn parse_or<T: FromStr>(name: &str, default: &str) -> Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    env::var(name)
        .unwrap_or_else(|_| default.to_string())
        .parse()
        .with_context(|| format!("{} must be a valid number", name))
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let server = ServerConfig {
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env::var("PORT")
                .context("PORT not set")?
                .parse()
                .context("PORT must be a valid number")?,
            environment: env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),
        };

        let database = DatabaseConfig {
            url: env::var("DATABASE_URL").context("DATABASE_URL not set")?,
            max_connections: parse_or("DATABASE_MAX_CONNECTIONS", "20")?,
        };

        let redis = RedisConfig {
            url: env::var("REDIS_URL").ok().filter(|u| !u.trim().is_empty()),
            credentials_ttl_secs: parse_or("CREDENTIALS_CACHE_TTL_SECS", "300")?,
        };

        let gateway = GatewayConfig {
            api_url: env::var("PAYNL_API_URL")
                .unwrap_or_else(|_| "https://connect.pay.nl".to_string()),
            timeout_secs: parse_or("PAYNL_TIMEOUT_SECS", "10")?,
            name: env::var("GATEWAY_NAME").unwrap_or_else(|_| "paynl".to_string()),
            surcharge_percent: parse_or("GATEWAY_SURCHARGE_PERCENT", "0")?,
            max_delivery_attempts: parse_or("MAX_DELIVERY_ATTEMPTS", "5")?,
            delivery_lease_secs: parse_or("DELIVERY_LEASE_SECS", "300")?,
        };

        let host_api_url = env::var("HOST_API_URL").context("HOST_API_URL not set")?;
        let host = HostApiConfig {
            site_url: env::var("HOST_SITE_URL").unwrap_or_else(|_| host_api_url.clone()),
            api_url: host_api_url,
            api_token: env::var("HOST_API_TOKEN").context("HOST_API_TOKEN not set")?,
            timeout_secs: parse_or("HOST_TIMEOUT_SECS", "10")?,
        };

        let callbacks = CallbackConfig {
            public_base_url: env::var("PUBLIC_BASE_URL").context("PUBLIC_BASE_URL not set")?,
            signing_secret: env::var("CALLBACK_SIGNING_SECRET")
                .context("CALLBACK_SIGNING_SECRET not set")?,
        };

        let config = Config {
            server,
            database,
            redis,
            gateway,
            host,
            callbacks,
            sweep: SweepConfig::from_env(),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.server.port < 1024 {
            return Err(anyhow!(
                "Port must be at least 1024, got {}",
                self.server.port
            ));
        }

        let valid_environments = ["development", "staging", "production"];
        if !valid_environments.contains(&self.server.environment.as_str()) {
            return Err(anyhow!(
                "Environment must be one of: {:?}, got {}",
                valid_environments,
                self.server.environment
            ));
        }

        if self.database.url.trim().is_empty() {
            return Err(anyhow!("DATABASE_URL cannot be empty"));
        }

        if self.database.max_connections == 0 {
            return Err(anyhow!("DATABASE_MAX_CONNECTIONS must be greater than 0"));
        }

        if self.gateway.api_url.trim().is_empty() {
            return Err(anyhow!("PAYNL_API_URL cannot be empty"));
        }

        if self.gateway.surcharge_percent < Decimal::ZERO {
            return Err(anyhow!("GATEWAY_SURCHARGE_PERCENT cannot be negative"));
        }

        if self.gateway.max_delivery_attempts <= 0 {
            return Err(anyhow!("MAX_DELIVERY_ATTEMPTS must be greater than 0"));
        }

        if self.host.api_url.trim().is_empty() {
            return Err(anyhow!("HOST_API_URL cannot be empty"));
        }

        // A claimed delivery makes up to three host calls: payable lookup,
        // payment record and item delivery.
        let claimed_secs = self.host.timeout_secs.saturating_mul(3);
        if self.gateway.delivery_lease_secs <= claimed_secs {
            return Err(anyhow!(
                "DELIVERY_LEASE_SECS must exceed three times HOST_TIMEOUT_SECS ({}s)",
                claimed_secs
            ));
        }

        if self.host.api_token.trim().is_empty() {
            return Err(anyhow!("HOST_API_TOKEN cannot be empty"));
        }

        let base = self.callbacks.public_base_url.trim();
        if !(base.starts_with("https://") || base.starts_with("http://")) {
            return Err(anyhow!(
                "PUBLIC_BASE_URL must be an http(s) URL, got {}",
                self.callbacks.public_base_url
            ));
        }

        if self.server.environment == "production" && !base.starts_with("https://") {
            return Err(anyhow!("PUBLIC_BASE_URL must use https in production"));
        }

        if self.callbacks.signing_secret.len() < 16 {
            return Err(anyhow!(
                "CALLBACK_SIGNING_SECRET must be at least 16 characters"
            ));
        }

        self.sweep.validate().map_err(|e| anyhow!(e))?;

        Ok(())
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            gateway_name: self.gateway.name.clone(),
            surcharge_percent: self.gateway.surcharge_percent,
            remote_timeout: Duration::from_secs(self.gateway.timeout_secs),
            max_delivery_attempts: self.gateway.max_delivery_attempts,
            delivery_lease: Duration::from_secs(self.gateway.delivery_lease_secs),
        }
    }
}
