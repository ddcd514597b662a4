//! Error types for the tool gateway
//!
//! None of these cross the gateway boundary. Every variant is folded into an
//! `error` envelope by [`ToolEnvelope::from_error`](crate::ToolEnvelope::from_error)
//! before a caller sees it.

/// Internal gateway failure
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// External program could not be started
    #[error("failed to start `{program}`: {source}")]
    Spawn {
        /// Program name
        program: String,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// I/O failure while talking to a child process or a temp file
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// External program exceeded the configured command timeout
    #[error("`{program}` timed out after {secs}s")]
    Timeout {
        /// Program name
        program: String,
        /// Configured timeout
        secs: u64,
    },

    /// Arguments did not match the operation's input shape
    #[error("invalid arguments for {operation}: {reason}")]
    InvalidArguments {
        /// Operation name
        operation: String,
        /// Deserialisation failure
        reason: String,
    },

    /// Operation name is not in the registry
    #[error("unknown operation: {0}")]
    UnknownOperation(String),

    /// Caller holds no grant for the operation
    #[error("{caller} is not authorized to invoke {operation}")]
    Unauthorized {
        /// Agent name
        caller: String,
        /// Operation name
        operation: String,
    },

    /// Connection was already released
    #[error("gateway connection closed")]
    ConnectionClosed,

    /// Legacy database credentials were not loaded
    #[error("Legacy DB credentials not configured.")]
    CredentialsMissing,

    /// Command output could not be interpreted
    #[error("unexpected output from {context}: {reason}")]
    UnexpectedOutput {
        /// What was being parsed
        context: String,
        /// Parse failure
        reason: String,
    },

    /// Secret lookup failed
    #[error(transparent)]
    Secret(#[from] SecretError),

    /// Legacy database connection or query failed
    #[error("legacy database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl GatewayError {
    /// Build an argument error
    #[inline]
    pub fn invalid_arguments(operation: impl Into<String>, reason: impl ToString) -> Self {
        Self::InvalidArguments {
            operation: operation.into(),
            reason: reason.to_string(),
        }
    }

    /// Whether the failure came from an external process rather than the caller
    #[inline]
    #[must_use]
    pub fn is_process_failure(&self) -> bool {
        matches!(self, Self::Spawn { .. } | Self::Timeout { .. } | Self::Io(_))
    }
}

/// Secret retrieval failure
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SecretError {
    /// Secret does not exist or is not readable
    #[error("secret `{0}` not found")]
    NotFound(String),

    /// Backend refused or failed the lookup
    #[error("secret backend error for `{id}`: {reason}")]
    Backend {
        /// Secret id
        id: String,
        /// Backend failure description
        reason: String,
    },
}
