//! Gateway configuration
//!
//! One explicit value handed to the gateway at construction. Defaults mirror
//! a single-region deployment with Terraform templates in `./terraform`.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// GCP, Cloud SQL and legacy-database settings used by the operation handlers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub gcp_project_id: String,
    pub gcp_region: String,
    pub gcp_zone: String,

    pub cloud_sql_instance_name: String,
    pub cloud_sql_db_version: String,
    pub cloud_sql_tier: String,
    /// Secret holding the Cloud SQL root password
    pub cloud_sql_root_password_secret: String,
    pub cloud_sql_backup_start_time: String,

    pub gcs_bucket_name_suffix: String,

    /// Directory holding the Terraform templates
    pub terraform_dir: PathBuf,

    /// Secret names for the legacy MySQL connection
    pub legacy_db: LegacyDbSecrets,

    /// Interpreter used by `run_validation_script`
    pub python_bin: String,

    /// Per-command wall-clock limit; unset means commands may run indefinitely
    pub command_timeout_secs: Option<u64>,

    pub secrets: SecretBackend,
}

impl GatewayConfig {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_project(mut self, project_id: impl Into<String>) -> Self {
        self.gcp_project_id = project_id.into();
        self
    }

    #[must_use]
    pub fn with_terraform_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.terraform_dir = dir.into();
        self
    }

    #[must_use]
    pub fn with_python_bin(mut self, bin: impl Into<String>) -> Self {
        self.python_bin = bin.into();
        self
    }

    #[inline]
    #[must_use]
    pub fn command_timeout(&self) -> Option<Duration> {
        self.command_timeout_secs.map(Duration::from_secs)
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            gcp_project_id: "your-gcp-project-id".to_string(),
            gcp_region: "us-central1".to_string(),
            gcp_zone: "us-central1-a".to_string(),
            cloud_sql_instance_name: "migrated-mysql-instance".to_string(),
            cloud_sql_db_version: "MYSQL_8_0".to_string(),
            cloud_sql_tier: "db-n2-standard-2".to_string(),
            cloud_sql_root_password_secret: "cloud-sql-root-password".to_string(),
            cloud_sql_backup_start_time: "04:00".to_string(),
            gcs_bucket_name_suffix: "-migration-bucket".to_string(),
            terraform_dir: PathBuf::from("terraform"),
            legacy_db: LegacyDbSecrets::default(),
            python_bin: "python3".to_string(),
            command_timeout_secs: None,
            secrets: SecretBackend::default(),
        }
    }
}

/// Names of the secrets holding the legacy connection parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LegacyDbSecrets {
    pub host: String,
    pub user: String,
    pub password: String,
    pub name: String,
}

impl Default for LegacyDbSecrets {
    fn default() -> Self {
        Self {
            host: "legacy-db-host".to_string(),
            user: "legacy-db-user".to_string(),
            password: "legacy-db-password".to_string(),
            name: "legacy-db-name".to_string(),
        }
    }
}

/// Where secrets are read from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "snake_case")]
pub enum SecretBackend {
    /// GCP Secret Manager, accessed through `gcloud`
    Gcp,
    /// Environment variables named `<prefix><SECRET_ID>` (upper snake case)
    Env { prefix: String },
}

impl Default for SecretBackend {
    fn default() -> Self {
        Self::Gcp
    }
}
