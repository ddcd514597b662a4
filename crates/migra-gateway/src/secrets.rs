//! Secret retrieval
//!
//! Secrets are resolved by id through a [`SecretSource`]. Values never enter
//! the transcript; only handlers and the session bootstrap see them.

use crate::config::SecretBackend;
use crate::error::SecretError;
use crate::runner::{CommandRunner, CommandSpec};
use std::collections::HashMap;
use std::sync::Arc;

/// Resolves secret ids to plaintext values
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait SecretSource: Send + Sync {
    /// Latest version of secret `id`
    async fn get(&self, id: &str) -> Result<String, SecretError>;
}

/// Build the source selected by configuration
#[must_use]
pub fn from_backend(
    backend: &SecretBackend,
    project_id: &str,
    runner: Arc<dyn CommandRunner>,
) -> Arc<dyn SecretSource> {
    match backend {
        SecretBackend::Gcp => Arc::new(GcpSecretManager::new(project_id, runner)),
        SecretBackend::Env { prefix } => Arc::new(EnvSecrets::new(prefix.clone())),
    }
}

/// GCP Secret Manager, read through `gcloud secrets versions access`
pub struct GcpSecretManager {
    project_id: String,
    runner: Arc<dyn CommandRunner>,
}

impl GcpSecretManager {
    #[must_use]
    pub fn new(project_id: impl Into<String>, runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            project_id: project_id.into(),
            runner,
        }
    }
}

impl std::fmt::Debug for GcpSecretManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GcpSecretManager")
            .field("project_id", &self.project_id)
            .finish_non_exhaustive()
    }
}

#[async_trait::async_trait]
impl SecretSource for GcpSecretManager {
    async fn get(&self, id: &str) -> Result<String, SecretError> {
        let command = CommandSpec::new("gcloud").args([
            "secrets".to_string(),
            "versions".to_string(),
            "access".to_string(),
            "latest".to_string(),
            format!("--secret={id}"),
            format!("--project={}", self.project_id),
        ]);
        let output = self
            .runner
            .run(&command)
            .await
            .map_err(|e| SecretError::Backend {
                id: id.to_string(),
                reason: e.to_string(),
            })?;

        if !output.succeeded() {
            if output.stderr.contains("NOT_FOUND") {
                return Err(SecretError::NotFound(id.to_string()));
            }
            return Err(SecretError::Backend {
                id: id.to_string(),
                reason: output.stderr.trim().to_string(),
            });
        }
        // gcloud prints the payload verbatim; strip the trailing newline only.
        Ok(output.stdout.trim_end_matches(['\r', '\n']).to_string())
    }
}

/// Environment variables: secret `legacy-db-host` with prefix `MIGRA_SECRET_`
/// is read from `MIGRA_SECRET_LEGACY_DB_HOST`
#[derive(Debug, Clone)]
pub struct EnvSecrets {
    prefix: String,
}

impl EnvSecrets {
    #[must_use]
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Variable name consulted for `id`
    #[must_use]
    pub fn var_name(&self, id: &str) -> String {
        let suffix: String = id
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() {
                    c.to_ascii_uppercase()
                } else {
                    '_'
                }
            })
            .collect();
        format!("{}{suffix}", self.prefix)
    }
}

#[async_trait::async_trait]
impl SecretSource for EnvSecrets {
    async fn get(&self, id: &str) -> Result<String, SecretError> {
        std::env::var(self.var_name(id)).map_err(|_| SecretError::NotFound(id.to_string()))
    }
}

/// Fixed in-memory secrets
#[derive(Default, Clone)]
pub struct StaticSecrets {
    values: HashMap<String, String>,
}

impl StaticSecrets {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, id: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(id.into(), value.into());
        self
    }
}

impl std::fmt::Debug for StaticSecrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticSecrets")
            .field("ids", &self.values.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[async_trait::async_trait]
impl SecretSource for StaticSecrets {
    async fn get(&self, id: &str) -> Result<String, SecretError> {
        self.values
            .get(id)
            .cloned()
            .ok_or_else(|| SecretError::NotFound(id.to_string()))
    }
}
