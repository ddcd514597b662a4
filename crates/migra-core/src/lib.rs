//! Migra Core - multi-agent migration orchestration
//!
//! Coordinates a fixed roster of agents over a shared transcript:
//! - Builds the roster in dependency order and seeds the task
//! - Sequences agent turns round-robin
//! - Dispatches tool requests through the gateway and replays the results
//! - Ends the conversation on marker phrases or the turn bound
//!
//! # Example
//!
//! ```rust,ignore
//! use migra_core::{CoordinatorSettings, EncryptionStrategy, SessionDriver, SessionParams};
//!
//! # async fn example(gateway: std::sync::Arc<migra_gateway::ToolGateway>,
//! #                  oracle: std::sync::Arc<dyn migra_core::ReasoningOracle>) -> migra_core::MigraResult<()> {
//! let driver = SessionDriver::new(oracle, CoordinatorSettings::default());
//! let params = SessionParams { volume_gb: 80, encryption: EncryptionStrategy::GcpRecommended };
//! let outcome = driver.run(gateway, params).await?;
//! println!("{} after {} turns", outcome.state, outcome.turns);
//! # Ok(())
//! # }
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod agent;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod llm;
pub mod oracle;
pub mod roles;
pub mod session;
pub mod strategy;
pub mod transcript;
pub mod types;

pub use agent::Agent;
pub use config::{LlmConfig, MigraConfig, SessionConfig};
pub use coordinator::{
    detect_termination, is_anomaly_interrupt, ConversationOutcome, ConversationState, Coordinator,
    CoordinatorSettings, ANOMALY_PREFIX, FAILURE_MARKER, SUCCESS_MARKER,
};
pub use error::{ConfigError, MigraError, MigraResult, OracleError};
pub use llm::{ChatCompletionsOracle, ProviderSpec, Vendor};
pub use oracle::{OracleReply, OracleRequest, ReasoningOracle};
pub use roles::{Role, ROSTER};
pub use session::{EncryptionStrategy, SessionDriver, SessionParams, SEED_SPEAKER};
pub use strategy::MigrationStrategy;
pub use transcript::{PairingViolation, Transcript};
pub use types::{Message, MessageId, ToolCall, ToolResultPayload};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
