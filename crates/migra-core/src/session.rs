//! Session Driver
//!
//! Builds the roster in dependency order, seeds the transcript with the task
//! parameters, drives the coordinator to a terminal state and closes the
//! gateway connection on every exit path.

use crate::agent::Agent;
use crate::coordinator::{
    ConversationOutcome, Coordinator, CoordinatorSettings, FAILURE_MARKER, SUCCESS_MARKER,
};
use crate::error::{ConfigError, MigraResult};
use crate::oracle::ReasoningOracle;
use crate::roles::{grant_roster, Role, ROSTER};
use crate::strategy::MigrationStrategy;
use crate::types::Message;
use futures::FutureExt;
use migra_gateway::registry::GET_GCP_ENCRYPTION_RECOMMENDATION;
use migra_gateway::{CapabilityGrants, GatewayClient, LocalConnection, ToolGateway};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt::Write as _;
use std::panic::AssertUnwindSafe;
use std::str::FromStr;
use std::sync::Arc;

/// Speaker of the opening task message
pub const SEED_SPEAKER: &str = "User_Proxy";

/// Encryption strategy chosen by the operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EncryptionStrategy {
    Legacy,
    GcpRecommended,
}

impl EncryptionStrategy {
    /// CLI spellings
    pub const VARIANTS: [&'static str; 2] = ["legacy", "gcp-recommended"];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Legacy => "legacy",
            Self::GcpRecommended => "gcp-recommended",
        }
    }
}

impl FromStr for EncryptionStrategy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "legacy" => Ok(Self::Legacy),
            "gcp-recommended" => Ok(Self::GcpRecommended),
            other => Err(ConfigError::InvalidValue {
                field: "encryption",
                reason: format!("expected one of {:?}, got {other:?}", Self::VARIANTS),
            }),
        }
    }
}

impl std::fmt::Display for EncryptionStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Task parameters from the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionParams {
    pub volume_gb: u32,
    pub encryption: EncryptionStrategy,
}

impl SessionParams {
    #[must_use]
    pub fn recommended_strategy(&self) -> MigrationStrategy {
        MigrationStrategy::classify(f64::from(self.volume_gb))
    }
}

/// Grants for the whole roster plus the seed speaker's prompt lookup
#[must_use]
pub fn session_grants() -> CapabilityGrants {
    grant_roster(CapabilityGrants::builder())
        .grant(SEED_SPEAKER, [GET_GCP_ENCRYPTION_RECOMMENDATION])
        .build()
}

/// Opening task message
#[must_use]
pub fn build_seed(params: &SessionParams, encryption_doc: Option<&Value>) -> String {
    let volume = params.volume_gb;
    let strategy = params.recommended_strategy();

    let mut seed = String::new();
    let _ = writeln!(seed, "Start the legacy MySQL database migration to Cloud SQL.");
    let _ = writeln!(seed, "The estimated database volume is {volume} GB.");
    let _ = writeln!(seed, "The user has selected the '{}' encryption strategy.", params.encryption);
    let _ = writeln!(
        seed,
        "For {volume} GB the required migration strategy is {strategy} ({}).",
        strategy.operations().join(" then ")
    );
    let _ = writeln!(seed);
    let _ = writeln!(seed, "Follow this sequence of operations:");
    let _ = writeln!(seed, "1. The {} must provision the infrastructure.", Role::Infrastructure);
    let _ = writeln!(seed, "2. The {} must analyze and convert the source schema.", Role::Schema);
    let _ = writeln!(
        seed,
        "3. The {} must select the correct strategy based on the volume ({volume} GB) and migrate the data.",
        Role::Migration
    );
    let _ = writeln!(seed, "4. The {} must verify the integrity of the migrated data.", Role::Validation);
    let _ = writeln!(
        seed,
        "5. The {} must provide a final report after the migration is complete.",
        Role::Optimization
    );
    let _ = writeln!(seed, "6. The {} must monitor the entire process for errors.", Role::Anomaly);
    let _ = write!(
        seed,
        "7. If all steps are successful, the final message must include the phrase '{SUCCESS_MARKER}'. \
         If any step fails critically, end with '{FAILURE_MARKER}'."
    );

    if let Some(doc) = encryption_doc {
        let rendered = serde_json::to_string_pretty(doc).unwrap_or_else(|_| doc.to_string());
        let _ = write!(seed, "\n\nGCP encryption recommendation:\n{rendered}");
    }
    seed
}

/// Top-level control loop for one migration
pub struct SessionDriver {
    oracle: Arc<dyn ReasoningOracle>,
    settings: CoordinatorSettings,
}

impl std::fmt::Debug for SessionDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionDriver")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl SessionDriver {
    #[must_use]
    pub fn new(oracle: Arc<dyn ReasoningOracle>, settings: CoordinatorSettings) -> Self {
        Self { oracle, settings }
    }

    /// Open a connection to `gateway` with the session grants and run
    pub async fn run(&self, gateway: Arc<ToolGateway>, params: SessionParams) -> MigraResult<ConversationOutcome> {
        let client: Arc<dyn GatewayClient> = Arc::new(LocalConnection::connect(gateway, session_grants()));
        self.run_with_client(client, params).await
    }

    /// Run over an existing connection; `client` is closed before returning,
    /// including on error or panic.
    pub async fn run_with_client(
        &self,
        client: Arc<dyn GatewayClient>,
        params: SessionParams,
    ) -> MigraResult<ConversationOutcome> {
        let result = AssertUnwindSafe(self.drive(Arc::clone(&client), params))
            .catch_unwind()
            .await;
        client.close().await;
        match result {
            Ok(outcome) => outcome,
            Err(panic) => std::panic::resume_unwind(panic),
        }
    }

    async fn drive(&self, client: Arc<dyn GatewayClient>, params: SessionParams) -> MigraResult<ConversationOutcome> {
        let strategy = params.recommended_strategy();
        tracing::info!(
            volume_gb = params.volume_gb,
            encryption = %params.encryption,
            %strategy,
            "session_started"
        );

        let encryption_doc = match params.encryption {
            EncryptionStrategy::GcpRecommended => {
                let envelope = client
                    .invoke_as(SEED_SPEAKER, GET_GCP_ENCRYPTION_RECOMMENDATION, Value::Null)
                    .await;
                if let Some(summary) = envelope.failure_summary() {
                    tracing::warn!(%summary, "encryption_recommendation_unavailable");
                }
                envelope.data
            }
            EncryptionStrategy::Legacy => None,
        };

        let operations = client.operations();
        let roster = ROSTER
            .into_iter()
            .map(|role| Agent::for_role(role, &operations, Arc::clone(&self.oracle)))
            .collect();

        let mut coordinator = Coordinator::new(roster, client, self.settings)?;
        coordinator.seed(Message::text(SEED_SPEAKER, build_seed(&params, encryption_doc.as_ref())));
        let outcome = coordinator.run().await?;

        tracing::info!(
            state = %outcome.state,
            turns = outcome.turns,
            anomalies = outcome.anomalies,
            messages = outcome.transcript.len(),
            "session_finished"
        );
        Ok(outcome)
    }
}
