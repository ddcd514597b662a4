//! Reasoning oracle abstraction
//!
//! The oracle produces an agent's next reply from its directive, the full
//! transcript and the operations it may request. Agents and the coordinator
//! only see this trait, so sessions run against deterministic stubs in tests.

use crate::error::OracleError;
use crate::transcript::Transcript;
use crate::types::ToolCall;
use async_trait::async_trait;
use migra_gateway::OperationSpec;

/// Everything the oracle may look at for one turn
#[derive(Debug, Clone, Copy)]
pub struct OracleRequest<'a> {
    pub agent: &'a str,
    pub directive: &'a str,
    pub transcript: &'a Transcript,
    /// Operations the agent is authorized to request
    pub operations: &'a [OperationSpec],
}

/// The oracle's answer: reply text plus requested invocations
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OracleReply {
    pub content: String,
    pub tool_calls: Vec<ToolCall>,
}

impl OracleReply {
    #[must_use]
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            tool_calls: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_call(mut self, call: ToolCall) -> Self {
        self.tool_calls.push(call);
        self
    }
}

/// Produce the next message for an agent
#[async_trait]
pub trait ReasoningOracle: Send + Sync {
    async fn complete(&self, request: OracleRequest<'_>) -> Result<OracleReply, OracleError>;
}
