use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;

/// Runtime settings, read from `AGORA_*` environment variables.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub db_path: PathBuf,
    pub host: String,
    pub port: u16,
    pub session_ttl: Duration,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as `from_env` against an arbitrary source; unset keys take defaults.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let db_path = lookup("AGORA_DB_PATH").unwrap_or_else(|| "agora.db".into());
        let host = lookup("AGORA_HOST").unwrap_or_else(|| "0.0.0.0".into());
        let port: u16 = lookup("AGORA_PORT")
            .unwrap_or_else(|| "3000".into())
            .parse()
            .context("AGORA_PORT must be a port number")?;
        let ttl_secs: u64 = lookup("AGORA_SESSION_TTL_SECS")
            .unwrap_or_else(|| "86400".into())
            .parse()
            .context("AGORA_SESSION_TTL_SECS must be a whole number of seconds")?;
        if ttl_secs == 0 {
            anyhow::bail!("AGORA_SESSION_TTL_SECS must be positive");
        }

        Ok(Self {
            db_path: PathBuf::from(db_path),
            host,
            port,
            session_ttl: Duration::from_secs(ttl_secs),
        })
    }

    pub fn addr(&self) -> anyhow::Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("invalid listen address {}:{}", self.host, self.port))
    }
}
