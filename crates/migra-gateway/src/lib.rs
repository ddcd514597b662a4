//! Migra Gateway - execution boundary for migration agents
//!
//! Exposes a fixed registry of named operations:
//! - Resources: read-only queries against the legacy database (bound SQL over
//!   `sqlx`) and GCP
//! - Tools: state-mutating actions (Terraform, gcloud, mydumper/myloader, scripts)
//! - Prompts: static recommendation documents
//!
//! Every invocation returns a [`ToolEnvelope`]; nothing unstructured crosses
//! this boundary.
//!
//! # Example
//!
//! ```rust,ignore
//! use migra_gateway::{CapabilityGrants, GatewayClient, GatewayConfig, LocalConnection, SystemRunner, ToolGateway};
//!
//! # async fn example() {
//! let runner = std::sync::Arc::new(SystemRunner::new());
//! let secrets = migra_gateway::secrets::from_backend(&Default::default(), "acme", runner.clone());
//! let gateway = ToolGateway::start(GatewayConfig::default(), runner, secrets).await;
//! let grants = CapabilityGrants::builder()
//!     .grant("Environment_Setup_Agent", ["provision_infra"])
//!     .build();
//! let conn = LocalConnection::connect(std::sync::Arc::new(gateway), grants);
//! let envelope = conn.invoke_as("Environment_Setup_Agent", "provision_infra", serde_json::Value::Null).await;
//! println!("{}", envelope.to_json());
//! conn.close().await;
//! # }
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod config;
pub mod envelope;
pub mod error;
pub mod gateway;
pub mod grants;
pub mod handlers;
pub mod registry;
pub mod runner;
pub mod secrets;
pub mod source_db;

pub use config::{GatewayConfig, LegacyDbSecrets, SecretBackend};
pub use envelope::{EnvelopeStatus, ToolEnvelope, NO_RETURNCODE};
pub use error::{GatewayError, SecretError};
pub use gateway::{GatewayClient, LocalConnection, ToolGateway};
pub use grants::{CapabilityGrants, CapabilityGrantsBuilder};
pub use handlers::{LegacyDbCredentials, MigrationHandlers};
pub use registry::{OperationKind, OperationSpec, Registry};
pub use runner::{CommandRunner, CommandSpec, ProcessOutput, SystemRunner};
pub use secrets::{EnvSecrets, GcpSecretManager, SecretSource, StaticSecrets};
pub use source_db::{MySqlSource, SourceDatabase, TextRow};
