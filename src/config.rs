use anyhow::{bail, Context};
use std::str::FromStr;
use std::time::Duration;

use crate::notifications::ConnectionSettings;

// ============================================================================
// Configuration - environment variables (a .env file is loaded first)
// ============================================================================
//
// HTTP_BIND                0.0.0.0:8080
// SERVICE_ROLE             all | orders | notifications
// KAFKA_BROKERS            unset: in-process event bus
// CONSUMER_GROUP           notification-service-group
// DATABASE_URL             unset: in-memory order store
// SSE_KEEPALIVE_SECS       15
// SSE_IDLE_TIMEOUT_SECS    unset: connections never expire
// SSE_WRITE_TIMEOUT_MS     2000
// SSE_BUFFER_FRAMES        64
// DISPATCH_STATUS_CHANGES  false
//
// ============================================================================

const DEFAULT_BIND: &str = "0.0.0.0:8080";
const DEFAULT_CONSUMER_GROUP: &str = "notification-service-group";
const DEFAULT_KEEPALIVE_SECS: u64 = 15;
const DEFAULT_WRITE_TIMEOUT_MS: u64 = 2000;
const DEFAULT_BUFFER_FRAMES: usize = 64;

/// Which halves of the pipeline run in this process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceRole {
    /// Order endpoints and publication
    Orders,
    /// Consumer, registry and push endpoint
    Notifications,
    All,
}

impl ServiceRole {
    pub fn runs_orders(&self) -> bool {
        matches!(self, ServiceRole::Orders | ServiceRole::All)
    }

    pub fn runs_notifications(&self) -> bool {
        matches!(self, ServiceRole::Notifications | ServiceRole::All)
    }
}

impl FromStr for ServiceRole {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "orders" => Ok(ServiceRole::Orders),
            "notifications" => Ok(ServiceRole::Notifications),
            "all" => Ok(ServiceRole::All),
            other => bail!("unknown SERVICE_ROLE '{other}' (expected orders, notifications or all)"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub http_bind: String,
    pub role: ServiceRole,
    pub kafka_brokers: Option<String>,
    pub consumer_group: String,
    pub database_url: Option<String>,
    pub connection: ConnectionSettings,
    pub dispatch_status_changes: bool,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_env_with(|key| std::env::var(key).ok())
    }

    /// Same as `from_env` with a custom lookup
    pub fn from_env_with<F>(get_env: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| get_env(key).filter(|v| !v.trim().is_empty());

        let role = match get("SERVICE_ROLE") {
            Some(value) => value.parse()?,
            None => ServiceRole::All,
        };

        let keepalive = parse_or(&get, "SSE_KEEPALIVE_SECS", DEFAULT_KEEPALIVE_SECS)?;
        if keepalive == 0 {
            bail!("SSE_KEEPALIVE_SECS must be positive");
        }
        let idle_timeout = get("SSE_IDLE_TIMEOUT_SECS")
            .map(|v| parse::<u64>("SSE_IDLE_TIMEOUT_SECS", &v))
            .transpose()?
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs);
        let write_timeout = parse_or(&get, "SSE_WRITE_TIMEOUT_MS", DEFAULT_WRITE_TIMEOUT_MS)?;
        let buffer = parse_or(&get, "SSE_BUFFER_FRAMES", DEFAULT_BUFFER_FRAMES)?;

        Ok(Self {
            http_bind: get("HTTP_BIND").unwrap_or_else(|| DEFAULT_BIND.to_string()),
            role,
            kafka_brokers: get("KAFKA_BROKERS"),
            consumer_group: get("CONSUMER_GROUP")
                .unwrap_or_else(|| DEFAULT_CONSUMER_GROUP.to_string()),
            database_url: get("DATABASE_URL"),
            connection: ConnectionSettings {
                keepalive: Duration::from_secs(keepalive),
                idle_timeout,
                write_timeout: Duration::from_millis(write_timeout.max(1)),
                buffer: buffer.max(1),
            },
            dispatch_status_changes: parse_or(&get, "DISPATCH_STATUS_CHANGES", false)?,
        })
    }
}

fn parse<T>(key: &str, value: &str) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value
        .trim()
        .parse()
        .with_context(|| format!("invalid value '{value}' for {key}"))
}

fn parse_or<T, F>(get: &F, key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
    F: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(value) => parse(key, &value),
        None => Ok(default),
    }
}
