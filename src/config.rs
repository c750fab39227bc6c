use std::env;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use zeroize::Zeroizing;

use crate::models::session::SessionPolicy;

/// The application's configuration.
#[derive(Clone)]
pub struct Config {
    /// The URL of the PostgreSQL database.
    pub database_url: String,
    /// The URL of the Redis server.
    pub redis_url: String,
    /// The address the HTTP server binds to.
    pub bind_addr: SocketAddr,
    /// The origin allowed by CORS (the single-page front end).
    pub allowed_origin: String,
    /// Maximum number of pooled Postgres connections.
    pub db_pool_size: usize,
    /// Session window and warning lead.
    pub session_policy: SessionPolicy,
    /// How often expired session records are purged.
    pub sweep_interval: Duration,
    /// News search settings.
    pub news: NewsConfig,
    /// Identity provider settings.
    pub identity: IdentityConfig,
}

/// Where bearer tokens are verified.
#[derive(Clone)]
pub struct IdentityConfig {
    /// The provider's OpenID Connect userinfo endpoint.
    pub userinfo_url: String,
    pub timeout: Duration,
}

/// Settings for the external news search API.
#[derive(Clone)]
pub struct NewsConfig {
    pub api_url: String,
    pub api_key: Zeroizing<String>,
    pub language: String,
    pub page_size: u32,
    /// How many recent trades feed the keyword set.
    pub trade_limit: i64,
    pub timeout: Duration,
    pub max_concurrent_searches: usize,
    pub rate_limit_per_minute: u32,
}

impl Config {
    /// Creates a new `Config` from environment variables.
    ///
    /// # Returns
    ///
    /// A `Result` containing the `Config`.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds a `Config` from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let duration = Duration::from_secs(parse_or(&lookup, "SESSION_DURATION_SECS", 600u64)?);
        let warning_lead =
            Duration::from_secs(parse_or(&lookup, "SESSION_WARNING_LEAD_SECS", 120u64)?);

        if warning_lead >= duration {
            anyhow::bail!("SESSION_WARNING_LEAD_SECS must be smaller than SESSION_DURATION_SECS");
        }

        let api_key = lookup("NEWS_API_KEY").context("NEWS_API_KEY must be set")?;
        if api_key.trim().is_empty() {
            anyhow::bail!("NEWS_API_KEY cannot be empty");
        }

        let max_concurrent_searches = parse_or(&lookup, "NEWS_MAX_CONCURRENT_SEARCHES", 8usize)?;
        if max_concurrent_searches == 0 {
            anyhow::bail!("NEWS_MAX_CONCURRENT_SEARCHES must be at least 1");
        }

        Ok(Self {
            database_url: lookup("DATABASE_URL").context("DATABASE_URL must be set")?,
            redis_url: lookup("REDIS_URL")
                .unwrap_or_else(|| "redis://127.0.0.1:6379".to_string()),
            bind_addr: parse_or(&lookup, "BIND_ADDR", SocketAddr::from(([127, 0, 0, 1], 3000)))?,
            allowed_origin: lookup("ALLOWED_ORIGIN")
                .unwrap_or_else(|| "http://localhost:3000".to_string()),
            db_pool_size: parse_or(&lookup, "DB_POOL_SIZE", 16usize)?,
            session_policy: SessionPolicy {
                duration,
                warning_lead,
            },
            sweep_interval: Duration::from_secs(parse_or(
                &lookup,
                "SESSION_SWEEP_INTERVAL_SECS",
                300u64,
            )?),
            news: NewsConfig {
                api_url: lookup("NEWS_API_URL")
                    .unwrap_or_else(|| "https://gnews.io/api/v4".to_string()),
                api_key: Zeroizing::new(api_key),
                language: lookup("NEWS_LANGUAGE").unwrap_or_else(|| "en".to_string()),
                page_size: parse_or(&lookup, "NEWS_PAGE_SIZE", 10u32)?,
                trade_limit: parse_or(&lookup, "NEWS_TRADE_LIMIT", 10i64)?,
                timeout: Duration::from_secs(parse_or(&lookup, "NEWS_TIMEOUT_SECS", 10u64)?),
                max_concurrent_searches,
                rate_limit_per_minute: parse_or(&lookup, "NEWS_RATE_LIMIT_PER_MINUTE", 30u32)?,
            },
            identity: IdentityConfig {
                userinfo_url: lookup("IDENTITY_USERINFO_URL")
                    .context("IDENTITY_USERINFO_URL must be set")?,
                timeout: Duration::from_secs(parse_or(&lookup, "IDENTITY_TIMEOUT_SECS", 5u64)?),
            },
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("Invalid {}", key)),
        None => Ok(default),
    }
}
