/// Configuration management for the nodeflow engine
///
/// Handles server binding, the SQLite location, engine strategies, and the outbound
/// provider endpoints. Every value can be overridden with a `NODEFLOW_*` variable.

use serde::{Deserialize, Serialize};
use std::{fmt::Display, str::FromStr, time::Duration};

use crate::{
    runtime::{context::OutputKeying, engine::TraversalStrategy},
    services::{
        llm::{GEMINI_BASE_URL, OPENAI_BASE_URL},
        mail::DEFAULT_MAIL_ENDPOINT,
    },
};

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub engine: EngineConfig,
    pub providers: ProviderConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server bind address (e.g., "0.0.0.0")
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// sqlx connection string; the file is created when missing
    pub url: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    pub output_keying: OutputKeying,
    pub traversal: TraversalStrategy,
}

/// Outbound endpoints used by node handlers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub openai_base_url: String,
    pub gemini_base_url: String,
    pub mail_endpoint: String,
    pub http_timeout_secs: u64,
}

impl ProviderConfig {
    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}

impl Default for Config {
    /// Default configuration with ENV_VAR support for k8s/container deployment
    fn default() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }
}

impl Config {
    /// Build from an arbitrary variable source
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let text = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        Self {
            server: ServerConfig {
                host: text("NODEFLOW_HOST", "0.0.0.0"),
                port: parsed(&lookup, "NODEFLOW_PORT", 3004),
            },
            database: DatabaseConfig {
                url: text("NODEFLOW_DATABASE_URL", "sqlite://data/nodeflow.db"),
            },
            engine: EngineConfig {
                output_keying: parsed(&lookup, "NODEFLOW_OUTPUT_KEYING", OutputKeying::default()),
                traversal: parsed(&lookup, "NODEFLOW_TRAVERSAL", TraversalStrategy::default()),
            },
            providers: ProviderConfig {
                openai_base_url: text("NODEFLOW_OPENAI_BASE_URL", OPENAI_BASE_URL),
                gemini_base_url: text("NODEFLOW_GEMINI_BASE_URL", GEMINI_BASE_URL),
                mail_endpoint: text("NODEFLOW_MAIL_ENDPOINT", DEFAULT_MAIL_ENDPOINT),
                http_timeout_secs: parsed(&lookup, "NODEFLOW_HTTP_TIMEOUT_SECS", 30),
            },
        }
    }
}

fn parsed<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T
where
    T: FromStr,
    T::Err: Display,
{
    match lookup(key) {
        Some(raw) => raw.parse().unwrap_or_else(|e| {
            tracing::warn!("⚠️ Ignoring {}={:?}: {}", key, raw, e);
            default
        }),
        None => default,
    }
}
