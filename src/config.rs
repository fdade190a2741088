use std::env;
use std::net::SocketAddr;
use anyhow::{Context, Result};
use zeroize::Zeroizing;

/// Which key-value backend holds the session records.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StoreBackend {
    /// A Redis server reached through `REDIS_URL`.
    Redis,
    /// The in-process store, for local runs without Redis.
    Memory,
}

/// A single admin bearer token and the identity it resolves to.
#[derive(Clone)]
pub struct AdminCredential {
    /// The admin identifier recorded in audit entries.
    pub admin_id: String,
    /// The bearer token presented in the `Authorization` header.
    pub token: Zeroizing<String>,
}

/// The application's configuration.
#[derive(Clone)]
pub struct Config {
    /// The URL of the Redis server.
    pub redis_url: String,
    /// The session store backend.
    pub store_backend: StoreBackend,
    /// The URL of the PostgreSQL database holding `admin_actions`, if any.
    pub database_url: Option<String>,
    /// The address the HTTP server binds to.
    pub bind_addr: SocketAddr,
    /// The admin credentials accepted by the admin gate.
    pub admin_tokens: Vec<AdminCredential>,
    /// The origin allowed by CORS (the admin dashboard).
    pub cors_origin: String,
    /// Sustained admin requests per second per client IP.
    pub rate_per_second: u64,
    /// Burst size for the admin rate limiter.
    pub rate_burst: u32,
}

impl Config {
    /// Creates a new `Config` from environment variables.
    pub fn from_env() -> Result<Self> {
        let store_backend = match env::var("STORE_BACKEND")
            .unwrap_or_else(|_| "redis".to_string())
            .to_ascii_lowercase()
            .as_str()
        {
            "redis" => StoreBackend::Redis,
            "memory" => StoreBackend::Memory,
            other => anyhow::bail!("STORE_BACKEND must be 'redis' or 'memory', got '{}'", other),
        };

        let admin_tokens = Zeroizing::new(
            env::var("ADMIN_TOKENS")
                .context("ADMIN_TOKENS must be set (format: admin_id:token,admin_id:token)")?,
        );

        Ok(Self {
            redis_url: env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string()),
            store_backend,
            database_url: env::var("DATABASE_URL").ok().filter(|url| !url.trim().is_empty()),
            bind_addr: env::var("BIND_ADDR")
                .unwrap_or_else(|_| "127.0.0.1:3001".to_string())
                .parse()
                .context("Invalid BIND_ADDR")?,
            admin_tokens: parse_admin_tokens(&admin_tokens)?,
            cors_origin: env::var("CORS_ORIGIN")
                .unwrap_or_else(|_| "http://localhost:3000".to_string()),
            rate_per_second: env::var("ADMIN_RATE_PER_SECOND")
                .unwrap_or_else(|_| "50".to_string())
                .parse()
                .context("Invalid ADMIN_RATE_PER_SECOND")?,
            rate_burst: env::var("ADMIN_RATE_BURST")
                .unwrap_or_else(|_| "100".to_string())
                .parse()
                .context("Invalid ADMIN_RATE_BURST")?,
        })
    }
}

/// Parses `admin_id:token` pairs separated by commas.
pub fn parse_admin_tokens(raw: &str) -> Result<Vec<AdminCredential>> {
    let mut credentials = Vec::new();

    for pair in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let (admin_id, token) = pair
            .split_once(':')
            .context("ADMIN_TOKENS entries must look like admin_id:token")?;

        if admin_id.trim().is_empty() || token.trim().is_empty() {
            anyhow::bail!("ADMIN_TOKENS entries need both an admin id and a token");
        }

        credentials.push(AdminCredential {
            admin_id: admin_id.trim().to_string(),
            token: Zeroizing::new(token.trim().to_string()),
        });
    }

    if credentials.is_empty() {
        anyhow::bail!("ADMIN_TOKENS must contain at least one admin_id:token pair");
    }

    Ok(credentials)
}
