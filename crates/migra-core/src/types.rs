//! Core types for Migra
//!
//! Defines the entities that flow through a session:
//! - Message identifiers
//! - Tool-invocation requests emitted by agents
//! - Tool results replayed into the transcript
//! - Transcript messages

use chrono::{DateTime, Utc};
use migra_gateway::ToolEnvelope;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use ulid::Ulid;

/// Unique message identifier (ULID for sortability)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MessageId(pub Ulid);

impl MessageId {
    /// Generate new message ID
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A request from an agent to invoke one gateway operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Correlates the request with its result message
    pub id: String,
    pub operation: String,
    #[serde(default)]
    pub arguments: Value,
}

impl ToolCall {
    /// Create a call with a fresh id
    #[must_use]
    pub fn new(operation: impl Into<String>, arguments: Value) -> Self {
        Self {
            id: format!("call_{}", Ulid::new()),
            operation: operation.into(),
            arguments,
        }
    }

    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }
}

/// Result of a gateway invocation, attached to a transcript message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResultPayload {
    pub call_id: String,
    pub operation: String,
    pub envelope: ToolEnvelope,
}

/// One immutable transcript entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub speaker: String,
    pub content: String,
    /// Invocations requested by this message
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    /// Present only on tool-result messages
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_result: Option<ToolResultPayload>,
    pub created_at: DateTime<Utc>,
}

impl Message {
    fn build(
        speaker: impl Into<String>,
        content: impl Into<String>,
        tool_calls: Vec<ToolCall>,
        tool_result: Option<ToolResultPayload>,
    ) -> Self {
        Self {
            id: MessageId::new(),
            speaker: speaker.into(),
            content: content.into(),
            tool_calls,
            tool_result,
            created_at: Utc::now(),
        }
    }

    /// Plain text message
    #[must_use]
    pub fn text(speaker: impl Into<String>, content: impl Into<String>) -> Self {
        Self::build(speaker, content, Vec::new(), None)
    }

    /// Agent reply, possibly requesting tool invocations
    #[must_use]
    pub fn reply(speaker: impl Into<String>, content: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self::build(speaker, content, tool_calls, None)
    }

    /// Result of `call`, spoken by the agent that requested it.
    ///
    /// The content is the envelope's JSON so that agents reading the
    /// transcript see exactly what the gateway returned.
    #[must_use]
    pub fn tool_result(speaker: impl Into<String>, call: &ToolCall, envelope: ToolEnvelope) -> Self {
        let content = envelope.to_json().to_string();
        Self::build(
            speaker,
            content,
            Vec::new(),
            Some(ToolResultPayload {
                call_id: call.id.clone(),
                operation: call.operation.clone(),
                envelope,
            }),
        )
    }

    #[inline]
    #[must_use]
    pub fn is_tool_result(&self) -> bool {
        self.tool_result.is_some()
    }

    #[inline]
    #[must_use]
    pub fn requests_tools(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}
