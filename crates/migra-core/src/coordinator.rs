//! Conversation Coordinator
//!
//! Drives agents round-robin over a shared transcript until a marker phrase
//! ends the conversation or the turn bound is reached.
//!
//! # State machine
//!
//! ```text
//!            ┌──────── success marker ───────► COMPLETE
//! RUNNING ───┼──────── failure marker ───────► FAILED
//!            └──── max turns, no marker ─────► ABORTED_TURN_LIMIT
//! ```
//!
//! A turn is: the next agent replies, every tool call in the reply is
//! dispatched in order, and each result is appended right after the reply.
//! Only then is the reply text scanned for markers.
//!
//! # Anomaly interrupts
//!
//! A reply starting with `ANOMALY DETECTED:` is counted and logged but does
//! not change state. It is advisory: later agents read it and are expected
//! to report failure themselves.
//!
//! # Known ambiguity
//!
//! Markers are plain substrings. A reply that mentions the success phrase in
//! passing ends the conversation as `COMPLETE`.

use crate::agent::Agent;
use crate::error::{MigraError, MigraResult};
use crate::transcript::Transcript;
use crate::types::Message;
use migra_gateway::GatewayClient;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Success marker phrase
pub const SUCCESS_MARKER: &str = "MIGRATION COMPLETE";

/// Failure marker phrase
pub const FAILURE_MARKER: &str = "TASK FAILED";

/// Prefix of an anomaly interrupt
pub const ANOMALY_PREFIX: &str = "ANOMALY DETECTED:";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConversationState {
    Running,
    Complete,
    Failed,
    AbortedTurnLimit,
}

impl ConversationState {
    #[inline]
    #[must_use]
    pub fn is_terminal(self) -> bool {
        self != Self::Running
    }

    #[inline]
    #[must_use]
    pub fn is_success(self) -> bool {
        self == Self::Complete
    }

    /// Process exit code for a terminal state
    #[must_use]
    pub fn exit_code(self) -> i32 {
        match self {
            Self::Complete => 0,
            Self::Failed | Self::Running => 1,
            Self::AbortedTurnLimit => 2,
        }
    }
}

impl std::fmt::Display for ConversationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Running => "RUNNING",
            Self::Complete => "COMPLETE",
            Self::Failed => "FAILED",
            Self::AbortedTurnLimit => "ABORTED_TURN_LIMIT",
        })
    }
}

/// State implied by one reply's text. The failure marker takes precedence.
#[must_use]
pub fn detect_termination(content: &str) -> ConversationState {
    let upper = content.to_uppercase();
    if upper.contains(FAILURE_MARKER) {
        ConversationState::Failed
    } else if upper.contains(SUCCESS_MARKER) {
        ConversationState::Complete
    } else {
        ConversationState::Running
    }
}

#[must_use]
pub fn is_anomaly_interrupt(content: &str) -> bool {
    content
        .trim_start()
        .get(..ANOMALY_PREFIX.len())
        .is_some_and(|head| head.eq_ignore_ascii_case(ANOMALY_PREFIX))
}

/// Coordinator limits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoordinatorSettings {
    pub max_turns: u32,
    /// Per-agent reply budget
    pub reply_budget: Duration,
}

impl Default for CoordinatorSettings {
    fn default() -> Self {
        Self {
            max_turns: 15,
            reply_budget: Duration::from_secs(600),
        }
    }
}

/// Final result of a conversation
#[derive(Debug, Clone, Serialize)]
pub struct ConversationOutcome {
    pub state: ConversationState,
    pub turns: u32,
    pub anomalies: u32,
    pub transcript: Transcript,
}

pub struct Coordinator {
    roster: Vec<Agent>,
    gateway: Arc<dyn GatewayClient>,
    settings: CoordinatorSettings,
    transcript: Transcript,
    state: ConversationState,
    turns: u32,
    next: usize,
    anomalies: u32,
}

impl std::fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coordinator")
            .field("roster", &self.roster)
            .field("settings", &self.settings)
            .field("state", &self.state)
            .field("turns", &self.turns)
            .field("anomalies", &self.anomalies)
            .finish_non_exhaustive()
    }
}

impl Coordinator {
    /// Create a coordinator; the roster order is the turn order
    pub fn new(
        roster: Vec<Agent>,
        gateway: Arc<dyn GatewayClient>,
        settings: CoordinatorSettings,
    ) -> MigraResult<Self> {
        if roster.is_empty() {
            return Err(MigraError::EmptyRoster);
        }
        Ok(Self {
            roster,
            gateway,
            settings,
            transcript: Transcript::new(),
            state: ConversationState::Running,
            turns: 0,
            next: 0,
            anomalies: 0,
        })
    }

    /// Append the opening message. Seed text is never scanned for markers.
    pub fn seed(&mut self, message: Message) {
        tracing::info!(speaker = %message.speaker, "conversation_seeded");
        self.transcript.push(message);
    }

    #[inline]
    #[must_use]
    pub fn state(&self) -> ConversationState {
        self.state
    }

    #[inline]
    #[must_use]
    pub fn turns(&self) -> u32 {
        self.turns
    }

    #[inline]
    #[must_use]
    pub fn anomalies(&self) -> u32 {
        self.anomalies
    }

    #[inline]
    #[must_use]
    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    /// Name of the agent that speaks next
    #[must_use]
    pub fn next_speaker(&self) -> &str {
        self.roster[self.next].name()
    }

    /// Run one turn, or settle into `ABORTED_TURN_LIMIT` if the bound is reached
    pub async fn step(&mut self) -> MigraResult<ConversationState> {
        if self.state.is_terminal() {
            return Ok(self.state);
        }
        if self.turns >= self.settings.max_turns {
            tracing::error!(
                turns = self.turns,
                max_turns = self.settings.max_turns,
                "conversation_aborted_turn_limit"
            );
            self.state = ConversationState::AbortedTurnLimit;
            return Ok(self.state);
        }

        let agent = &self.roster[self.next];
        self.next = (self.next + 1) % self.roster.len();
        self.turns += 1;
        let turn = self.turns;

        let reply = agent
            .take_turn(&self.transcript, self.settings.reply_budget)
            .await?;
        tracing::info!(
            turn,
            agent = agent.name(),
            tool_calls = reply.tool_calls.len(),
            "agent_replied"
        );

        let calls = reply.tool_calls.clone();
        let verdict = detect_termination(&reply.content);
        let anomaly = is_anomaly_interrupt(&reply.content);
        self.transcript.push(reply);

        for call in &calls {
            let envelope = self
                .gateway
                .invoke_as(agent.name(), &call.operation, call.arguments.clone())
                .await;
            if let Some(summary) = envelope.failure_summary() {
                tracing::warn!(
                    turn,
                    agent = agent.name(),
                    operation = %call.operation,
                    %summary,
                    "tool_invocation_failed"
                );
            }
            self.transcript
                .push(Message::tool_result(agent.name(), call, envelope));
        }

        if anomaly {
            self.anomalies += 1;
            tracing::warn!(turn, agent = agent.name(), "anomaly_interrupt");
        }

        self.state = verdict;
        match verdict {
            ConversationState::Complete => {
                tracing::info!(turn, agent = agent.name(), "conversation_complete");
            }
            ConversationState::Failed => {
                tracing::info!(turn, agent = agent.name(), "conversation_failed");
            }
            _ => {}
        }
        Ok(self.state)
    }

    /// Drive to a terminal state
    pub async fn run(mut self) -> MigraResult<ConversationOutcome> {
        while !self.step().await?.is_terminal() {}
        Ok(self.into_outcome())
    }

    #[must_use]
    pub fn into_outcome(self) -> ConversationOutcome {
        ConversationOutcome {
            state: self.state,
            turns: self.turns,
            anomalies: self.anomalies,
            transcript: self.transcript,
        }
    }
}
