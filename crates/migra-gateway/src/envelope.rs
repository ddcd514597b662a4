//! Structured result envelope returned by every gateway invocation

use crate::error::GatewayError;
use crate::runner::ProcessOutput;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Return code recorded when a process never produced one (spawn failure, timeout)
pub const NO_RETURNCODE: i32 = -1;

/// Envelope status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvelopeStatus {
    /// Operation succeeded
    Success,
    /// Operation failed; the caller must report it
    Error,
}

/// `{status, stdout?, stderr?, returncode?, data?, message?}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolEnvelope {
    pub status: EnvelopeStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stdout: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stderr: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub returncode: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ToolEnvelope {
    fn empty(status: EnvelopeStatus) -> Self {
        Self {
            status,
            stdout: None,
            stderr: None,
            returncode: None,
            data: None,
            message: None,
        }
    }

    /// Successful query result
    #[must_use]
    pub fn success_data(data: Value) -> Self {
        Self {
            data: Some(data),
            ..Self::empty(EnvelopeStatus::Success)
        }
    }

    /// Failure described by a message only
    #[must_use]
    pub fn error_message(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Self::empty(EnvelopeStatus::Error)
        }
    }

    /// Process-execution envelope; any non-zero exit is an error
    #[must_use]
    pub fn from_process(output: ProcessOutput) -> Self {
        let status = if output.returncode == 0 {
            EnvelopeStatus::Success
        } else {
            EnvelopeStatus::Error
        };
        Self {
            stdout: Some(output.stdout),
            stderr: Some(output.stderr),
            returncode: Some(output.returncode),
            ..Self::empty(status)
        }
    }

    /// Fold an internal failure into an envelope.
    ///
    /// Process-level failures keep the execution-envelope shape with a
    /// `returncode` of [`NO_RETURNCODE`]; everything else becomes a message.
    #[must_use]
    pub fn from_error(error: &GatewayError) -> Self {
        if error.is_process_failure() {
            Self {
                stdout: Some(String::new()),
                stderr: Some(error.to_string()),
                returncode: Some(NO_RETURNCODE),
                message: Some(error.to_string()),
                ..Self::empty(EnvelopeStatus::Error)
            }
        } else {
            Self::error_message(error.to_string())
        }
    }

    /// Collapse a handler result into an envelope
    #[must_use]
    pub fn from_result(result: Result<ToolEnvelope, GatewayError>) -> Self {
        match result {
            Ok(envelope) => envelope,
            Err(err) => Self::from_error(&err),
        }
    }

    #[inline]
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == EnvelopeStatus::Success
    }

    #[inline]
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.status == EnvelopeStatus::Error
    }

    /// Short human-readable failure description, if this is an error
    #[must_use]
    pub fn failure_summary(&self) -> Option<String> {
        if self.is_success() {
            return None;
        }
        let detail = self
            .message
            .clone()
            .or_else(|| self.stderr.clone().filter(|s| !s.trim().is_empty()))
            .unwrap_or_else(|| "no error output".to_string());
        Some(match self.returncode {
            Some(code) => format!("returncode {code}: {}", detail.trim()),
            None => detail.trim().to_string(),
        })
    }

    /// JSON rendering used when the envelope is replayed into a transcript
    #[must_use]
    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn zero_exit_is_success() {
        let env = ToolEnvelope::from_process(ProcessOutput {
            stdout: "ok".to_string(),
            stderr: String::new(),
            returncode: 0,
        });
        assert!(env.is_success());
        assert_eq!(env.returncode, Some(0));
        assert_eq!(env.failure_summary(), None);
    }

    #[test]
    fn non_zero_exit_is_error_with_all_fields() {
        let env = ToolEnvelope::from_process(ProcessOutput {
            stdout: String::new(),
            stderr: "Error: quota exceeded".to_string(),
            returncode: 1,
        });
        assert!(env.is_error());
        assert_eq!(
            env.to_json(),
            json!({"status": "error", "stdout": "", "stderr": "Error: quota exceeded", "returncode": 1})
        );
        assert_eq!(
            env.failure_summary().as_deref(),
            Some("returncode 1: Error: quota exceeded")
        );
    }

    #[test]
    fn spawn_failure_keeps_process_shape() {
        let err = GatewayError::Spawn {
            program: "terraform".to_string(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "not found"),
        };
        let env = ToolEnvelope::from_error(&err);
        assert!(env.is_error());
        assert_eq!(env.returncode, Some(NO_RETURNCODE));
        assert!(env.stderr.unwrap_or_default().contains("terraform"));
    }

    #[test]
    fn message_errors_omit_process_fields() {
        let env = ToolEnvelope::from_error(&GatewayError::CredentialsMissing);
        assert_eq!(
            env.to_json(),
            json!({"status": "error", "message": "Legacy DB credentials not configured."})
        );
    }

    #[test]
    fn envelope_round_trips_through_json() {
        let env = ToolEnvelope::success_data(json!({"database_name": "shop", "size_in_gb": 12.5}));
        let back: ToolEnvelope = serde_json::from_value(env.to_json()).unwrap();
        assert_eq!(back, env);
    }
}
