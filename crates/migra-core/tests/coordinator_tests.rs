//! Conversation coordinator behaviour against a fake gateway.
//!
//! Covered here:
//! - Marker phrases end the conversation, with the failure marker winning
//! - The turn bound yields ABORTED_TURN_LIMIT after exactly `max_turns` turns
//! - Every tool request is followed by its result before the next turn
//! - Unauthorized requests come back as error envelopes without running anything
//! - Anomaly reports are counted but do not end the conversation
//! - Seed text and tool output are never scanned for markers

use async_trait::async_trait;
use migra_core::roles::grant_roster;
use migra_core::{
    Agent, ConversationState, Coordinator, CoordinatorSettings, Message, MigraError, OracleError,
    OracleReply, OracleRequest, ReasoningOracle, Role, ToolCall, SEED_SPEAKER,
};
use migra_gateway::registry::{PROVISION_INFRA, RUN_VALIDATION_SCRIPT};
use migra_gateway::{CapabilityGrants, GatewayClient, LocalConnection};
use migra_test_utils::{fake_gateway, init_tracing, ok, standard_runner, FakeRunner, ScriptedOracle};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

fn settings(max_turns: u32) -> CoordinatorSettings {
    CoordinatorSettings {
        max_turns,
        reply_budget: Duration::from_secs(30),
    }
}

fn connect(runner: Arc<FakeRunner>) -> Arc<LocalConnection> {
    Arc::new(LocalConnection::connect(
        fake_gateway(runner),
        grant_roster(CapabilityGrants::builder()).build(),
    ))
}

fn agents(oracle: Arc<dyn ReasoningOracle>, client: &dyn GatewayClient, roles: &[Role]) -> Vec<Agent> {
    let available = client.operations();
    roles
        .iter()
        .map(|role| Agent::for_role(*role, &available, Arc::clone(&oracle)))
        .collect()
}

fn coordinator(oracle: ScriptedOracle, roles: &[Role], max_turns: u32) -> (Coordinator, Arc<FakeRunner>) {
    init_tracing();
    let runner = Arc::new(standard_runner());
    let client = connect(Arc::clone(&runner));
    let roster = agents(Arc::new(oracle), client.as_ref(), roles);
    let mut coordinator = Coordinator::new(roster, client, settings(max_turns)).unwrap();
    coordinator.seed(Message::text(SEED_SPEAKER, "Start the migration."));
    (coordinator, runner)
}

#[tokio::test]
async fn success_marker_completes_conversation() {
    let oracle = ScriptedOracle::new()
        .say(Role::Infrastructure.agent_name(), "Provisioning now.")
        .say(Role::Optimization.agent_name(), "Report attached. Migration Complete.");
    let (coordinator, _) = coordinator(oracle, &[Role::Infrastructure, Role::Optimization], 10);

    let outcome = coordinator.run().await.unwrap();
    assert_eq!(outcome.state, ConversationState::Complete);
    assert_eq!(outcome.turns, 2);
    assert_eq!(outcome.state.exit_code(), 0);
}

#[tokio::test]
async fn failure_marker_wins_when_both_appear() {
    let oracle = ScriptedOracle::new().say(
        Role::Validation.agent_name(),
        "Counts differ. TASK FAILED, so this is not MIGRATION COMPLETE.",
    );
    let (coordinator, _) = coordinator(oracle, &[Role::Validation], 10);

    let outcome = coordinator.run().await.unwrap();
    assert_eq!(outcome.state, ConversationState::Failed);
    assert_eq!(outcome.turns, 1);
    assert_eq!(outcome.state.exit_code(), 1);
}

#[tokio::test]
async fn turn_bound_aborts_after_exactly_max_turns() {
    let (coordinator, _) = coordinator(ScriptedOracle::new(), &[Role::Infrastructure, Role::Schema], 5);

    let outcome = coordinator.run().await.unwrap();
    assert_eq!(outcome.state, ConversationState::AbortedTurnLimit);
    assert_eq!(outcome.turns, 5);
    // seed plus one reply per turn, no tool calls
    assert_eq!(outcome.transcript.len(), 6);
    assert_eq!(outcome.state.exit_code(), 2);
}

#[tokio::test]
async fn speakers_rotate_in_roster_order() {
    let roles = [Role::Infrastructure, Role::Schema, Role::Migration];
    let (mut coordinator, _) = coordinator(ScriptedOracle::new(), &roles, 10);

    let mut spoken = Vec::new();
    for _ in 0..4 {
        spoken.push(coordinator.next_speaker().to_string());
        coordinator.step().await.unwrap();
    }
    assert_eq!(
        spoken,
        vec![
            "Environment_Setup_Agent",
            "Schema_Conversion_Agent",
            "Data_Migration_Agent",
            "Environment_Setup_Agent",
        ]
    );
}

#[tokio::test]
async fn tool_results_follow_their_requests() {
    let call = ToolCall::new(PROVISION_INFRA, json!({})).with_id("call_provision");
    let oracle = ScriptedOracle::new().reply(
        Role::Infrastructure.agent_name(),
        OracleReply::text("Provisioning.").with_call(call),
    );
    let (mut coordinator, runner) = coordinator(oracle, &[Role::Infrastructure, Role::Schema], 10);

    coordinator.step().await.unwrap();
    let transcript = coordinator.transcript();
    assert_eq!(transcript.len(), 3);

    let result = transcript.messages()[2].tool_result.as_ref().unwrap();
    assert_eq!(result.call_id, "call_provision");
    assert_eq!(result.operation, PROVISION_INFRA);
    assert!(result.envelope.is_success());
    assert!(transcript.verify_tool_pairing().is_ok());
    assert_eq!(runner.count("terraform", "init"), 1);
    assert_eq!(runner.count("terraform", "apply"), 1);
}

#[tokio::test]
async fn unauthorized_requests_are_rejected_without_side_effects() {
    let oracle = ScriptedOracle::new().reply(
        Role::Anomaly.agent_name(),
        OracleReply::text("Let me fix the infrastructure myself.")
            .with_call(ToolCall::new(PROVISION_INFRA, json!({}))),
    );
    let (mut coordinator, runner) = coordinator(oracle, &[Role::Anomaly], 10);

    assert_eq!(coordinator.step().await.unwrap(), ConversationState::Running);
    let result = coordinator.transcript().last().unwrap().tool_result.clone().unwrap();
    assert!(result.envelope.is_error());
    assert_eq!(
        result.envelope.message.as_deref(),
        Some("Anomaly_Detection_Agent is not authorized to invoke provision_infra")
    );
    assert!(runner.calls().is_empty());
}

#[tokio::test]
async fn anomaly_report_is_counted_but_not_terminal() {
    let oracle = ScriptedOracle::new()
        .say(Role::Anomaly.agent_name(), "  anomaly detected: terraform apply exited with 1")
        .say(Role::Anomaly.agent_name(), "No anomalies observed.");
    let (mut coordinator, _) = coordinator(oracle, &[Role::Anomaly], 3);

    assert_eq!(coordinator.step().await.unwrap(), ConversationState::Running);
    assert_eq!(coordinator.anomalies(), 1);

    let outcome = coordinator.run().await.unwrap();
    assert_eq!(outcome.anomalies, 1);
    assert_eq!(outcome.state, ConversationState::AbortedTurnLimit);
}

#[tokio::test]
async fn markers_in_seed_are_ignored() {
    init_tracing();
    let runner = Arc::new(standard_runner());
    let client = connect(runner);
    let roster = agents(Arc::new(ScriptedOracle::new()), client.as_ref(), &[Role::Schema]);
    let mut coordinator = Coordinator::new(roster, client, settings(3)).unwrap();
    coordinator.seed(Message::text(
        SEED_SPEAKER,
        "End with 'MIGRATION COMPLETE' on success or 'TASK FAILED' on failure.",
    ));

    assert_eq!(coordinator.step().await.unwrap(), ConversationState::Running);
}

#[tokio::test]
async fn markers_in_tool_output_are_ignored() {
    init_tracing();
    let runner = Arc::new(standard_runner().on("python3", ok("TASK FAILED\n")));
    let client = connect(Arc::clone(&runner));
    let oracle = ScriptedOracle::new().reply(
        Role::Validation.agent_name(),
        OracleReply::text("Running counts.").with_call(ToolCall::new(
            RUN_VALIDATION_SCRIPT,
            json!({"script_content": "print('TASK FAILED')", "language": "python"}),
        )),
    );
    let roster = agents(Arc::new(oracle), client.as_ref(), &[Role::Validation]);
    let mut coordinator = Coordinator::new(roster, client, settings(3)).unwrap();
    coordinator.seed(Message::text(SEED_SPEAKER, "Validate."));

    assert_eq!(coordinator.step().await.unwrap(), ConversationState::Running);
    let result = coordinator.transcript().last().unwrap().tool_result.clone().unwrap();
    assert_eq!(result.envelope.stdout.as_deref(), Some("TASK FAILED\n"));
    assert_eq!(runner.count("python3", "migra_validation_"), 1);
}

#[tokio::test]
async fn terminal_state_is_sticky() {
    let oracle = ScriptedOracle::new().say(Role::Optimization.agent_name(), "MIGRATION COMPLETE");
    let (mut coordinator, _) = coordinator(oracle, &[Role::Optimization], 10);

    assert_eq!(coordinator.step().await.unwrap(), ConversationState::Complete);
    assert_eq!(coordinator.step().await.unwrap(), ConversationState::Complete);
    assert_eq!(coordinator.turns(), 1);
}

#[tokio::test]
async fn empty_roster_is_rejected() {
    let client = connect(Arc::new(FakeRunner::new()));
    let err = Coordinator::new(Vec::new(), client, CoordinatorSettings::default()).unwrap_err();
    assert!(matches!(err, MigraError::EmptyRoster));
}

struct Stalled;

#[async_trait]
impl ReasoningOracle for Stalled {
    async fn complete(&self, _request: OracleRequest<'_>) -> Result<OracleReply, OracleError> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(OracleReply::default())
    }
}

#[tokio::test(start_paused = true)]
async fn stalled_oracle_hits_reply_budget() {
    let client = connect(Arc::new(FakeRunner::new()));
    let roster = agents(Arc::new(Stalled), client.as_ref(), &[Role::Schema]);
    let mut coordinator = Coordinator::new(
        roster,
        client,
        CoordinatorSettings {
            max_turns: 3,
            reply_budget: Duration::from_secs(5),
        },
    )
    .unwrap();

    let err = coordinator.step().await.unwrap_err();
    assert!(matches!(err, MigraError::ReplyTimeout { ref agent, secs: 5 } if agent == "Schema_Conversion_Agent"));
}

#[tokio::test]
async fn exhausted_strict_script_surfaces_oracle_error() {
    let (mut coordinator, _) = coordinator(ScriptedOracle::new().strict(), &[Role::Schema], 3);
    let err = coordinator.step().await.unwrap_err();
    assert!(matches!(err, MigraError::Oracle { .. }));
}
