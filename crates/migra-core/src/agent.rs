//! Agent: one conversational participant
//!
//! An agent holds only immutable data: its name, directive, authorized
//! operations and an oracle handle. Each turn is computed from the
//! transcript alone, so any turn can be replayed.

use crate::error::{MigraError, MigraResult};
use crate::oracle::{OracleRequest, ReasoningOracle};
use crate::roles::Role;
use crate::transcript::Transcript;
use crate::types::Message;
use migra_gateway::OperationSpec;
use std::sync::Arc;
use std::time::Duration;

pub struct Agent {
    name: String,
    directive: String,
    operations: Vec<OperationSpec>,
    oracle: Arc<dyn ReasoningOracle>,
}

impl std::fmt::Debug for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent")
            .field("name", &self.name)
            .field(
                "operations",
                &self.operations.iter().map(|op| op.name).collect::<Vec<_>>(),
            )
            .finish_non_exhaustive()
    }
}

impl Agent {
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        directive: impl Into<String>,
        operations: Vec<OperationSpec>,
        oracle: Arc<dyn ReasoningOracle>,
    ) -> Self {
        Self {
            name: name.into(),
            directive: directive.into(),
            operations,
            oracle,
        }
    }

    /// Agent for `role`, advertising the role's operations found in `available`
    #[must_use]
    pub fn for_role(role: Role, available: &[OperationSpec], oracle: Arc<dyn ReasoningOracle>) -> Self {
        let allowed = role.authorized_operations();
        let operations = available
            .iter()
            .filter(|op| allowed.contains(&op.name))
            .cloned()
            .collect();
        Self::new(role.agent_name(), role.directive(), operations, oracle)
    }

    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    #[must_use]
    pub fn directive(&self) -> &str {
        &self.directive
    }

    #[inline]
    #[must_use]
    pub fn operations(&self) -> &[OperationSpec] {
        &self.operations
    }

    /// Produce this agent's message for the current transcript.
    ///
    /// Tool calls in the reply are only requests; the coordinator dispatches
    /// them and the gateway decides whether they are authorized.
    pub async fn take_turn(&self, transcript: &Transcript, budget: Duration) -> MigraResult<Message> {
        let request = OracleRequest {
            agent: &self.name,
            directive: &self.directive,
            transcript,
            operations: &self.operations,
        };

        let reply = tokio::time::timeout(budget, self.oracle.complete(request))
            .await
            .map_err(|_| MigraError::ReplyTimeout {
                agent: self.name.clone(),
                secs: budget.as_secs(),
            })?
            .map_err(|e| MigraError::oracle(&self.name, e))?;

        Ok(Message::reply(&self.name, reply.content, reply.tool_calls))
    }
}
