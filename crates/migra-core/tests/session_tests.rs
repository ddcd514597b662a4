//! End-to-end sessions driven by the rule-based playbook oracle.
//!
//! The gateway runs real handlers over a fake command runner, so these tests
//! check which external programs a whole migration would touch:
//! - Volume decides the transfer strategy and nothing else is invoked
//! - Transfer steps run one at a time and stop at the first failure
//! - Schema conversion removes MyISAM engines and DEFINER clauses
//! - A row-count mismatch ends the session as FAILED
//! - Tool failures are reported by the anomaly observer
//! - The gateway connection is closed on every exit path

use async_trait::async_trait;
use migra_core::session::{build_seed, session_grants};
use migra_core::{
    ConversationState, CoordinatorSettings, EncryptionStrategy, MigraError, OracleError,
    OracleReply, OracleRequest, ReasoningOracle, Role, SessionDriver, SessionParams, SEED_SPEAKER,
};
use migra_gateway::{GatewayClient, LocalConnection, ToolGateway};
use migra_test_utils::fixtures::MISMATCHED_COUNTS;
use migra_test_utils::{fake_gateway, init_tracing, ok, standard_runner, FakeRunner, PlaybookOracle};
use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::Duration;

fn settings() -> CoordinatorSettings {
    CoordinatorSettings {
        max_turns: 40,
        reply_budget: Duration::from_secs(30),
    }
}

fn params(volume_gb: u32, encryption: EncryptionStrategy) -> SessionParams {
    SessionParams {
        volume_gb,
        encryption,
    }
}

async fn run_playbook(runner: Arc<FakeRunner>, params: SessionParams) -> migra_core::ConversationOutcome {
    init_tracing();
    let driver = SessionDriver::new(Arc::new(PlaybookOracle::default()), settings());
    driver.run(fake_gateway(runner), params).await.unwrap()
}

fn connection(gateway: Arc<ToolGateway>) -> Arc<LocalConnection> {
    Arc::new(LocalConnection::connect(gateway, session_grants()))
}

#[tokio::test]
async fn small_database_uses_storage_import_only() {
    let runner = Arc::new(standard_runner());
    let outcome = run_playbook(Arc::clone(&runner), params(80, EncryptionStrategy::GcpRecommended)).await;

    assert_eq!(outcome.state, ConversationState::Complete);
    assert_eq!(runner.count("mydumper", "--outputdir="), 1);
    assert_eq!(runner.count("gcloud", "import"), 1);
    assert_eq!(runner.count("myloader", ""), 0);
    assert_eq!(runner.count("gcloud", "database-migration"), 0);
    assert!(outcome.transcript.verify_tool_pairing().is_ok());

    let mydumper = runner.programs().iter().position(|p| p == "mydumper").unwrap();
    let import = runner.calls().iter().position(|c| c.mentions("import")).unwrap();
    assert!(mydumper < import);

    let last = outcome.transcript.last().unwrap();
    assert_eq!(last.speaker, Role::Optimization.agent_name());
    assert!(last.content.ends_with("MIGRATION COMPLETE"));
}

#[tokio::test]
async fn mid_sized_database_uses_managed_migration() {
    let runner = Arc::new(standard_runner());
    let outcome = run_playbook(Arc::clone(&runner), params(250, EncryptionStrategy::Legacy)).await;

    assert_eq!(outcome.state, ConversationState::Complete);
    assert_eq!(runner.count("gcloud", "database-migration"), 1);
    assert_eq!(runner.count("mydumper", ""), 0);
    assert_eq!(runner.count("myloader", ""), 0);
}

#[tokio::test]
async fn large_database_dumps_and_loads() {
    let runner = Arc::new(standard_runner());
    let outcome = run_playbook(Arc::clone(&runner), params(900, EncryptionStrategy::Legacy)).await;

    assert_eq!(outcome.state, ConversationState::Complete);
    assert_eq!(runner.programs().iter().filter(|p| *p == "mydumper").count(), 1);
    assert_eq!(runner.count("myloader", "--host=10.20.0.5"), 1);
    assert_eq!(runner.count("gcloud", "import"), 0);

    let mydumper = runner.programs().iter().position(|p| p == "mydumper").unwrap();
    let myloader = runner.programs().iter().position(|p| p == "myloader").unwrap();
    assert!(mydumper < myloader);
}

#[tokio::test]
async fn schema_conversion_report_is_cloud_sql_ready() {
    let runner = Arc::new(standard_runner());
    let outcome = run_playbook(runner, params(80, EncryptionStrategy::Legacy)).await;

    let report = outcome
        .transcript
        .replies_from(Role::Schema.agent_name())
        .find(|m| m.content.contains("```sql"))
        .unwrap();
    assert!(report.content.contains("ENGINE=InnoDB"));
    assert!(!report.content.contains("MyISAM DEFAULT"));
    assert_eq!(
        report.content.matches("DEFINER=").count(),
        report.content.matches("DEFINER=CURRENT_USER").count()
    );
    assert!(report.content.contains("VIEW `big_spenders`"));
    assert!(report.content.contains("Table 'users': Changed engine from MyISAM to InnoDB."));
    assert!(report.content.contains("Table 'order_totals': Removed DEFINER clause."));
    assert!(report.content.contains("Table 'big_spenders': Removed DEFINER clause."));
}

#[tokio::test]
async fn row_count_mismatch_fails_the_session() {
    let runner = Arc::new(standard_runner().on("python3", ok(MISMATCHED_COUNTS)));
    let outcome = run_playbook(runner, params(80, EncryptionStrategy::Legacy)).await;

    assert_eq!(outcome.state, ConversationState::Failed);
    let last = outcome.transcript.last().unwrap();
    assert_eq!(last.speaker, Role::Validation.agent_name());
    assert!(last.content.contains("VALIDATION FAILURE"));
    assert!(last
        .content
        .contains("Table 'orders': Source row count is 1052, Target row count is 1050."));
    assert!(outcome
        .transcript
        .replies_from(Role::Optimization.agent_name())
        .all(|m| !m.content.contains("Optimization report")));
}

#[tokio::test]
async fn missing_dump_tool_is_flagged_then_fails() {
    let runner = Arc::new(standard_runner().missing("mydumper"));
    let outcome = run_playbook(Arc::clone(&runner), params(80, EncryptionStrategy::Legacy)).await;

    assert_eq!(outcome.state, ConversationState::Failed);
    assert_eq!(outcome.anomalies, 1);
    let flagged = outcome
        .transcript
        .replies_from(Role::Anomaly.agent_name())
        .find(|m| m.content.starts_with("ANOMALY DETECTED:"))
        .unwrap();
    assert!(flagged.content.contains("run_mydumper"));
    assert_eq!(runner.count("gcloud", "import"), 0);
    assert_eq!(
        outcome.transcript.last().unwrap().speaker,
        Role::Migration.agent_name()
    );
}

#[tokio::test]
async fn encryption_document_is_only_fetched_when_recommended() {
    let runner = Arc::new(standard_runner());
    let outcome = run_playbook(Arc::clone(&runner), params(80, EncryptionStrategy::GcpRecommended)).await;
    let seed = &outcome.transcript.messages()[0];
    assert_eq!(seed.speaker, SEED_SPEAKER);
    assert!(seed.content.contains("GCP encryption recommendation:"));
    assert!(seed.content.contains("enforce SSL/TLS"));

    let outcome = run_playbook(runner, params(80, EncryptionStrategy::Legacy)).await;
    assert!(!outcome.transcript.messages()[0]
        .content
        .contains("GCP encryption recommendation:"));
}

#[tokio::test]
async fn seed_matches_session_parameters() {
    let runner = Arc::new(standard_runner());
    let p = params(80, EncryptionStrategy::Legacy);
    let outcome = run_playbook(runner, p).await;
    assert_eq!(outcome.transcript.messages()[0].content, build_seed(&p, None));
}

#[tokio::test]
async fn connection_is_closed_after_success() {
    init_tracing();
    let client = connection(fake_gateway(Arc::new(standard_runner())));
    let driver = SessionDriver::new(Arc::new(PlaybookOracle::default()), settings());

    let outcome = driver
        .run_with_client(client.clone(), params(80, EncryptionStrategy::Legacy))
        .await
        .unwrap();
    assert_eq!(outcome.state, ConversationState::Complete);
    assert!(client.is_closed());
}

#[tokio::test]
async fn connection_is_closed_after_turn_limit() {
    init_tracing();
    let client = connection(fake_gateway(Arc::new(standard_runner())));
    let driver = SessionDriver::new(
        Arc::new(PlaybookOracle::default()),
        CoordinatorSettings {
            max_turns: 4,
            reply_budget: Duration::from_secs(30),
        },
    );

    let outcome = driver
        .run_with_client(client.clone(), params(80, EncryptionStrategy::Legacy))
        .await
        .unwrap();
    assert_eq!(outcome.state, ConversationState::AbortedTurnLimit);
    assert_eq!(outcome.turns, 4);
    assert!(client.is_closed());
}

struct Unreachable;

#[async_trait]
impl ReasoningOracle for Unreachable {
    async fn complete(&self, _request: OracleRequest<'_>) -> Result<OracleReply, OracleError> {
        Err(OracleError::Status {
            status: 503,
            body: "upstream unavailable".to_string(),
        })
    }
}

#[tokio::test]
async fn connection_is_closed_after_oracle_error() {
    let client = connection(fake_gateway(Arc::new(standard_runner())));
    let driver = SessionDriver::new(Arc::new(Unreachable), settings());

    let err = driver
        .run_with_client(client.clone(), params(80, EncryptionStrategy::Legacy))
        .await
        .unwrap_err();
    assert!(matches!(err, MigraError::Oracle { ref agent, .. } if agent == "Environment_Setup_Agent"));
    assert!(client.is_closed());
}

struct Panicking;

#[async_trait]
impl ReasoningOracle for Panicking {
    async fn complete(&self, _request: OracleRequest<'_>) -> Result<OracleReply, OracleError> {
        panic!("oracle exploded");
    }
}

#[tokio::test]
async fn connection_is_closed_when_an_agent_panics() {
    let client = connection(fake_gateway(Arc::new(standard_runner())));
    let driver = Arc::new(SessionDriver::new(Arc::new(Panicking), settings()));

    let task = {
        let client = client.clone();
        let driver = Arc::clone(&driver);
        tokio::spawn(async move {
            driver
                .run_with_client(client, params(80, EncryptionStrategy::Legacy))
                .await
        })
    };
    let joined = task.await;
    assert!(joined.unwrap_err().is_panic());
    assert!(client.is_closed());
}

#[tokio::test]
async fn closed_connection_refuses_further_calls() {
    let client = connection(fake_gateway(Arc::new(FakeRunner::new())));
    client.close().await;
    let envelope = client
        .invoke_as(SEED_SPEAKER, "get_gcp_encryption_recommendation", serde_json::Value::Null)
        .await;
    assert!(envelope.is_error());
}
