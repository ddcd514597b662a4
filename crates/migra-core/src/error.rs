//! Error types for Migra Core
//!
//! Covers the failures that stop a session before or during the turn loop:
//! - Configuration (unsupported provider, unreadable config file)
//! - Secret resolution at startup
//! - Reasoning-oracle failures and reply-budget timeouts
//!
//! Tool failures are not represented here; they travel as error envelopes
//! inside the transcript.

use migra_gateway::SecretError;
use std::path::PathBuf;

/// Main Migra error type
#[derive(Debug, thiserror::Error)]
pub enum MigraError {
    /// Configuration rejected at startup
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Required secret could not be resolved
    #[error("secret error: {0}")]
    Secret(#[from] SecretError),

    /// The reasoning oracle failed while producing an agent's reply
    #[error("oracle failed for {agent}: {source}")]
    Oracle {
        agent: String,
        #[source]
        source: OracleError,
    },

    /// The reasoning oracle did not answer within the per-agent budget
    #[error("{agent} did not reply within {secs}s")]
    ReplyTimeout { agent: String, secs: u64 },

    /// A coordinator needs at least one agent
    #[error("agent roster is empty")]
    EmptyRoster,
}

impl MigraError {
    #[inline]
    pub fn oracle(agent: impl Into<String>, source: OracleError) -> Self {
        Self::Oracle {
            agent: agent.into(),
            source,
        }
    }

    /// True when the failure happened before any agent could run
    #[inline]
    #[must_use]
    pub fn is_startup_failure(&self) -> bool {
        matches!(self, Self::Config(_) | Self::Secret(_) | Self::EmptyRoster)
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Unsupported LLM provider: {0}")]
    UnsupportedProvider(String),

    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

/// Reasoning-oracle transport and decoding errors
#[derive(Debug, thiserror::Error)]
pub enum OracleError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("provider returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("cannot decode completion: {0}")]
    Decode(String),

    #[error("completion contained no choices")]
    EmptyResponse,

    /// Scripted or stub oracles ran out of replies
    #[error("oracle exhausted: {0}")]
    Exhausted(String),
}

/// Result alias for core operations
pub type MigraResult<T> = Result<T, MigraError>;
