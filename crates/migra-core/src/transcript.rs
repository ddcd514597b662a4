//! Append-only conversation transcript
//!
//! The transcript is the only shared state in a session. Messages are
//! appended in turn order and never modified.

use crate::types::Message;
use serde::Serialize;

/// Ordered, append-only message log
#[derive(Debug, Clone, Default, Serialize)]
pub struct Transcript {
    messages: Vec<Message>,
}

/// A tool request whose results do not immediately follow it
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("message {index} ({speaker}) expected result for {call_id}, found {found}")]
pub struct PairingViolation {
    pub index: usize,
    pub speaker: String,
    pub call_id: String,
    pub found: String,
}

impl Transcript {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    #[inline]
    #[must_use]
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = &Message> {
        self.messages.iter()
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    #[inline]
    #[must_use]
    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Messages spoken by `speaker`, tool results excluded
    pub fn replies_from<'a>(&'a self, speaker: &'a str) -> impl Iterator<Item = &'a Message> + 'a {
        self.messages
            .iter()
            .filter(move |m| m.speaker == speaker && !m.is_tool_result())
    }

    /// Check that every tool request is immediately followed by one result
    /// per call, in request order.
    pub fn verify_tool_pairing(&self) -> Result<(), PairingViolation> {
        let mut i = 0;
        while i < self.messages.len() {
            let request = &self.messages[i];
            for (offset, call) in request.tool_calls.iter().enumerate() {
                let next = self.messages.get(i + 1 + offset);
                let matched = next
                    .and_then(|m| m.tool_result.as_ref())
                    .is_some_and(|r| r.call_id == call.id);
                if !matched {
                    return Err(PairingViolation {
                        index: i,
                        speaker: request.speaker.clone(),
                        call_id: call.id.clone(),
                        found: next.map_or_else(
                            || "end of transcript".to_string(),
                            |m| format!("message from {}", m.speaker),
                        ),
                    });
                }
            }
            i += 1 + request.tool_calls.len();
        }
        Ok(())
    }
}

impl<'a> IntoIterator for &'a Transcript {
    type Item = &'a Message;
    type IntoIter = std::slice::Iter<'a, Message>;

    fn into_iter(self) -> Self::IntoIter {
        self.messages.iter()
    }
}
