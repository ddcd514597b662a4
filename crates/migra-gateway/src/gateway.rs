//! Tool gateway and per-session connection
//!
//! [`ToolGateway`] owns the registry and handlers for the lifetime of the
//! process. A session talks to it through a [`GatewayClient`]; the in-process
//! [`LocalConnection`] enforces capability grants and refuses calls once
//! closed.
//!
//! # Critical Invariant
//!
//! `invoke` always returns an envelope. Unknown operations, bad arguments,
//! handler errors and handler panics all become `{status: error, ...}`.

use crate::config::GatewayConfig;
use crate::envelope::ToolEnvelope;
use crate::error::GatewayError;
use crate::grants::CapabilityGrants;
use crate::handlers::{LegacyDbCredentials, MigrationHandlers};
use crate::registry::{self, OperationSpec, Registry};
use crate::runner::CommandRunner;
use crate::secrets::SecretSource;
use crate::source_db::SourceDatabase;
use futures::FutureExt;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Registry plus handlers
#[derive(Debug)]
pub struct ToolGateway {
    registry: Registry,
    handlers: MigrationHandlers,
}

impl ToolGateway {
    /// Build a gateway, loading legacy DB credentials from `secrets`.
    ///
    /// Missing credentials do not prevent startup; the database-backed
    /// operations report them as missing instead.
    pub async fn start(
        config: GatewayConfig,
        runner: Arc<dyn CommandRunner>,
        secrets: Arc<dyn SecretSource>,
    ) -> Self {
        let legacy = match LegacyDbCredentials::load(secrets.as_ref(), &config).await {
            Ok(creds) => Some(creds),
            Err(e) => {
                tracing::warn!(error = %e, "legacy_db_secrets_unavailable");
                None
            }
        };
        Self::with_credentials(config, runner, secrets, legacy)
    }

    /// Build a gateway with explicit credentials
    #[must_use]
    pub fn with_credentials(
        config: GatewayConfig,
        runner: Arc<dyn CommandRunner>,
        secrets: Arc<dyn SecretSource>,
        legacy: Option<LegacyDbCredentials>,
    ) -> Self {
        Self {
            registry: Registry::standard(),
            handlers: MigrationHandlers::new(Arc::new(config), runner, secrets, legacy),
        }
    }

    /// Serve the source-database resources from `source_db`
    #[must_use]
    pub fn with_source_database(mut self, source_db: Arc<dyn SourceDatabase>) -> Self {
        self.handlers = self.handlers.with_source_database(source_db);
        self
    }

    #[inline]
    #[must_use]
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Invoke `operation` with JSON `arguments`
    pub async fn invoke(&self, operation: &str, arguments: Value) -> ToolEnvelope {
        let Some(spec) = self.registry.get(operation) else {
            return ToolEnvelope::from_error(&GatewayError::UnknownOperation(operation.to_string()));
        };

        let dispatch = AssertUnwindSafe(self.dispatch(spec.name, arguments)).catch_unwind();
        let envelope = match dispatch.await {
            Ok(result) => ToolEnvelope::from_result(result),
            Err(panic) => {
                let detail = panic
                    .downcast_ref::<&str>()
                    .map(ToString::to_string)
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                tracing::error!(operation, %detail, "handler_panicked");
                ToolEnvelope::error_message(format!("internal error in {operation}: {detail}"))
            }
        };

        let mutates = spec.kind.mutates_state();
        if let Some(summary) = envelope.failure_summary() {
            tracing::warn!(operation, mutates, %summary, "operation_failed");
        } else {
            tracing::info!(operation, mutates, "operation_succeeded");
        }
        envelope
    }

    async fn dispatch(&self, operation: &'static str, arguments: Value) -> Result<ToolEnvelope, GatewayError> {
        let h = &self.handlers;
        match operation {
            registry::GET_SOURCE_DB_SIZE => {
                parse_args::<registry::NoArgs>(operation, arguments)?;
                h.get_source_db_size().await
            }
            registry::GET_SOURCE_SCHEMA => h.get_source_schema(parse_args(operation, arguments)?).await,
            registry::GET_GCP_PROJECT_STATE => {
                parse_args::<registry::NoArgs>(operation, arguments)?;
                h.get_gcp_project_state().await
            }
            registry::PROVISION_INFRA => {
                parse_args::<registry::NoArgs>(operation, arguments)?;
                h.provision_infra().await
            }
            registry::DESTROY_INFRA => {
                parse_args::<registry::NoArgs>(operation, arguments)?;
                h.destroy_infra().await
            }
            registry::RUN_GCS_IMPORT => h.run_gcs_import(parse_args(operation, arguments)?).await,
            registry::RUN_DMS_JOB => h.run_dms_job(parse_args(operation, arguments)?).await,
            registry::RUN_MYDUMPER => h.run_mydumper(parse_args(operation, arguments)?).await,
            registry::RUN_MYLOADER => h.run_myloader(parse_args(operation, arguments)?).await,
            registry::RUN_VALIDATION_SCRIPT => {
                h.run_validation_script(parse_args(operation, arguments)?).await
            }
            registry::GET_GCP_ENCRYPTION_RECOMMENDATION => {
                parse_args::<registry::NoArgs>(operation, arguments)?;
                Ok(h.get_gcp_encryption_recommendation())
            }
            other => Err(GatewayError::UnknownOperation(other.to_string())),
        }
    }
}

/// Missing or `null` arguments are treated as an empty object
fn parse_args<T: DeserializeOwned>(operation: &str, arguments: Value) -> Result<T, GatewayError> {
    let arguments = match arguments {
        Value::Null => Value::Object(serde_json::Map::new()),
        other => other,
    };
    serde_json::from_value(arguments).map_err(|e| GatewayError::invalid_arguments(operation, e))
}

/// A session's handle to the gateway
#[async_trait::async_trait]
pub trait GatewayClient: Send + Sync {
    /// Declared operations
    fn operations(&self) -> Vec<OperationSpec>;

    /// Invoke `operation` on behalf of `caller`; rejected unless granted
    async fn invoke_as(&self, caller: &str, operation: &str, arguments: Value) -> ToolEnvelope;

    /// Release the connection; later invocations are refused
    async fn close(&self);

    fn is_closed(&self) -> bool;
}

/// In-process connection carrying the session's capability grants
#[derive(Debug)]
pub struct LocalConnection {
    gateway: Arc<ToolGateway>,
    grants: CapabilityGrants,
    closed: AtomicBool,
}

impl LocalConnection {
    #[must_use]
    pub fn connect(gateway: Arc<ToolGateway>, grants: CapabilityGrants) -> Self {
        tracing::debug!(agents = grants.agents().count(), "gateway_connected");
        Self {
            gateway,
            grants,
            closed: AtomicBool::new(false),
        }
    }

    #[inline]
    #[must_use]
    pub fn grants(&self) -> &CapabilityGrants {
        &self.grants
    }
}

#[async_trait::async_trait]
impl GatewayClient for LocalConnection {
    fn operations(&self) -> Vec<OperationSpec> {
        self.gateway.registry().iter().cloned().collect()
    }

    async fn invoke_as(&self, caller: &str, operation: &str, arguments: Value) -> ToolEnvelope {
        if self.is_closed() {
            return ToolEnvelope::from_error(&GatewayError::ConnectionClosed);
        }
        if !self.grants.is_authorized(caller, operation) {
            tracing::warn!(caller, operation, "unauthorized_invocation_rejected");
            return ToolEnvelope::from_error(&GatewayError::Unauthorized {
                caller: caller.to_string(),
                operation: operation.to_string(),
            });
        }
        self.gateway.invoke(operation, arguments).await
    }

    async fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            tracing::info!("gateway_connection_closed");
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::{CommandSpec, ProcessOutput};
    use crate::secrets::StaticSecrets;
    use serde_json::json;

    struct PanickingRunner;

    #[async_trait::async_trait]
    impl CommandRunner for PanickingRunner {
        async fn run(&self, _command: &CommandSpec) -> Result<ProcessOutput, GatewayError> {
            panic!("runner exploded");
        }
    }

    struct EchoRunner;

    #[async_trait::async_trait]
    impl CommandRunner for EchoRunner {
        async fn run(&self, command: &CommandSpec) -> Result<ProcessOutput, GatewayError> {
            Ok(ProcessOutput {
                stdout: command.display_redacted(),
                stderr: String::new(),
                returncode: 0,
            })
        }
    }

    fn gateway(runner: Arc<dyn CommandRunner>) -> Arc<ToolGateway> {
        Arc::new(ToolGateway::with_credentials(
            GatewayConfig::default().with_project("acme"),
            runner,
            Arc::new(StaticSecrets::new()),
            None,
        ))
    }

    #[tokio::test]
    async fn panics_become_error_envelopes() {
        let gw = gateway(Arc::new(PanickingRunner));
        let env = gw.invoke(registry::PROVISION_INFRA, Value::Null).await;
        assert!(env.is_error());
        assert!(env.message.unwrap().contains("runner exploded"));
    }

    #[tokio::test]
    async fn unknown_operation_is_error_envelope() {
        let gw = gateway(Arc::new(EchoRunner));
        let env = gw.invoke("drop_everything", json!({})).await;
        assert!(env.is_error());
        assert_eq!(env.message.as_deref(), Some("unknown operation: drop_everything"));
    }

    #[tokio::test]
    async fn bad_arguments_are_error_envelope() {
        let gw = gateway(Arc::new(EchoRunner));
        let env = gw.invoke(registry::RUN_DMS_JOB, json!({"job": 1})).await;
        assert!(env.is_error());
        assert!(env.message.unwrap().starts_with("invalid arguments for run_dms_job"));
    }

    #[tokio::test]
    async fn dms_job_uses_region_and_project() {
        let gw = gateway(Arc::new(EchoRunner));
        let env = gw.invoke(registry::RUN_DMS_JOB, json!({"job_id": "job-7"})).await;
        assert!(env.is_success());
        assert_eq!(
            env.stdout.as_deref(),
            Some("gcloud database-migration jobs start job-7 --region=us-central1 --project=acme")
        );
    }

    #[tokio::test]
    async fn missing_credentials_block_database_operations() {
        let gw = gateway(Arc::new(EchoRunner));
        for op in [registry::GET_SOURCE_DB_SIZE, registry::GET_SOURCE_SCHEMA] {
            let env = gw.invoke(op, Value::Null).await;
            assert_eq!(env.message.as_deref(), Some("Legacy DB credentials not configured."));
        }
        let env = gw
            .invoke(registry::RUN_MYDUMPER, json!({"output_dir": "/tmp/dump"}))
            .await;
        assert!(env.is_error());
    }

    #[tokio::test]
    async fn connection_enforces_grants() {
        let grants = CapabilityGrants::builder()
            .grant("Environment_Setup_Agent", [registry::PROVISION_INFRA])
            .build();
        let conn = LocalConnection::connect(gateway(Arc::new(EchoRunner)), grants);

        let allowed = conn
            .invoke_as("Environment_Setup_Agent", registry::PROVISION_INFRA, Value::Null)
            .await;
        assert!(allowed.is_success());

        let denied = conn
            .invoke_as("Data_Validation_Agent", registry::PROVISION_INFRA, Value::Null)
            .await;
        assert!(denied.is_error());
        assert_eq!(
            denied.message.as_deref(),
            Some("Data_Validation_Agent is not authorized to invoke provision_infra")
        );
    }

    #[tokio::test]
    async fn closed_connection_refuses_calls() {
        let grants = CapabilityGrants::builder()
            .grant("Environment_Setup_Agent", [registry::PROVISION_INFRA])
            .build();
        let conn = LocalConnection::connect(gateway(Arc::new(EchoRunner)), grants);
        conn.close().await;
        assert!(conn.is_closed());
        let env = conn
            .invoke_as("Environment_Setup_Agent", registry::PROVISION_INFRA, Value::Null)
            .await;
        assert_eq!(env.message.as_deref(), Some("gateway connection closed"));
    }
}
