use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, bail, Context};

pub const DEFAULT_MAIL_API_URL: &str = "https://api.brevo.com/v3/smtp/email";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Storage {
    Postgres { url: String, max_connections: u32 },
    Memory,
}

#[derive(Debug, Clone)]
pub struct MailConfig {
    pub api_url: String,
    pub api_key: String,
    pub sender: String,
    pub sender_name: Option<String>,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub bind: SocketAddr,
    pub storage: Storage,
    /// `None` disables delivery; mails are only logged.
    pub mail: Option<MailConfig>,
    pub activation_ttl: Duration,
    pub reminder_interval: Duration,
    pub reminder_window: Duration,
}

fn normalize(raw: &str) -> String {
    let trimmed = raw.trim();
    if let Some(inner) = trimmed.strip_prefix('"').and_then(|s| s.strip_suffix('"')) {
        return inner.trim().to_string();
    }
    if let Some(inner) = trimmed.strip_prefix('\'').and_then(|s| s.strip_suffix('\'')) {
        return inner.trim().to_string();
    }
    trimmed.to_string()
}

impl Config {
    pub fn from_env() -> anyhow::Result<Config> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from an arbitrary key lookup. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Config>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| normalize(&v)).filter(|v| !v.is_empty());
        let parse = |key: &str, default: &str| -> anyhow::Result<u64> {
            let raw = get(key).unwrap_or_else(|| default.to_string());
            u64::from_str(&raw).with_context(|| format!("{} must be a whole number, got `{}`", key, raw))
        };

        let bind = get("TASKER_BIND").unwrap_or_else(|| "127.0.0.1:8080".to_string());
        let bind = SocketAddr::from_str(&bind)
            .with_context(|| format!("TASKER_BIND is not a socket address: `{}`", bind))?;

        let storage = match get("TASKER_STORAGE").as_deref().unwrap_or("postgres") {
            "postgres" => Storage::Postgres {
                url: get("DATABASE_URL")
                    .ok_or_else(|| anyhow!("DATABASE_URL is required for postgres storage"))?,
                max_connections: u32::try_from(parse("TASKER_DB_MAX_CONNECTIONS", "5")?)
                    .context("TASKER_DB_MAX_CONNECTIONS does not fit a connection count")?,
            },
            "memory" => Storage::Memory,
            other => bail!("TASKER_STORAGE must be `postgres` or `memory`, got `{}`", other),
        };

        let mail_timeout = Duration::from_secs(parse("MAIL_TIMEOUT_SECS", "10")?);
        let mail = get("MAIL_API_KEY").map(|api_key| MailConfig {
            api_url: get("MAIL_API_URL").unwrap_or_else(|| DEFAULT_MAIL_API_URL.to_string()),
            api_key,
            sender: get("MAIL_SENDER").unwrap_or_else(|| "tasker@localhost".to_string()),
            sender_name: Some(get("MAIL_SENDER_NAME").unwrap_or_else(|| "Tasker".to_string())),
            timeout: mail_timeout,
        });

        Ok(Config {
            bind,
            storage,
            mail,
            activation_ttl: Duration::from_secs(parse("ACTIVATION_TTL_SECS", "30")?),
            reminder_interval: Duration::from_secs(parse("REMINDER_INTERVAL_SECS", "3600")?),
            reminder_window: Duration::from_secs(parse("REMINDER_WINDOW_SECS", "86400")?),
        })
    }
}
