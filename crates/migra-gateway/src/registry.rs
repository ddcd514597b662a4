//! Operation registry
//!
//! Fixed map from operation name to kind, description and input schema.
//! Built once; nothing can be registered after construction.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

pub const GET_SOURCE_DB_SIZE: &str = "get_source_db_size";
pub const GET_SOURCE_SCHEMA: &str = "get_source_schema";
pub const GET_GCP_PROJECT_STATE: &str = "get_gcp_project_state";
pub const PROVISION_INFRA: &str = "provision_infra";
pub const DESTROY_INFRA: &str = "destroy_infra";
pub const RUN_GCS_IMPORT: &str = "run_gcs_import";
pub const RUN_DMS_JOB: &str = "run_dms_job";
pub const RUN_MYDUMPER: &str = "run_mydumper";
pub const RUN_MYLOADER: &str = "run_myloader";
pub const RUN_VALIDATION_SCRIPT: &str = "run_validation_script";
pub const GET_GCP_ENCRYPTION_RECOMMENDATION: &str = "get_gcp_encryption_recommendation";

/// Operation kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    /// Read-only, idempotent query
    Resource,
    /// State-mutating action
    Tool,
    /// Static prompt template
    Prompt,
}

impl OperationKind {
    #[inline]
    #[must_use]
    pub fn mutates_state(self) -> bool {
        matches!(self, Self::Tool)
    }
}

/// Declared shape of one operation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OperationSpec {
    pub name: &'static str,
    pub kind: OperationKind,
    pub description: &'static str,
    /// JSON Schema of the argument object
    pub input_schema: Value,
}

/// Arguments of operations that take none
#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct NoArgs {}

#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct SourceSchemaArgs {
    /// Tables to describe; all tables when omitted
    #[serde(default)]
    pub tables: Option<Vec<String>>,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct GcsImportArgs {
    /// `gs://` URI of the SQL dump
    pub bucket_uri: String,
    /// Target database name
    pub database: String,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct DmsJobArgs {
    /// Database Migration Service job id
    pub job_id: String,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct DumpArgs {
    /// Directory the dump is written to
    pub output_dir: String,
    #[serde(default = "default_threads")]
    pub threads: u32,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct LoadArgs {
    /// Directory holding a mydumper dump
    pub input_dir: String,
    #[serde(default = "default_threads")]
    pub threads: u32,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct ValidationScriptArgs {
    /// Full script source
    pub script_content: String,
    /// `python` or `sql`
    pub language: String,
}

fn default_threads() -> u32 {
    4
}

fn schema_of<T: JsonSchema>() -> Value {
    serde_json::to_value(schemars::schema_for!(T)).unwrap_or(Value::Null)
}

/// Immutable operation registry
#[derive(Debug, Clone)]
pub struct Registry {
    operations: BTreeMap<&'static str, OperationSpec>,
}

impl Registry {
    /// The migration operation set
    #[must_use]
    pub fn standard() -> Self {
        use OperationKind::{Prompt, Resource, Tool};

        let specs = [
            (GET_SOURCE_DB_SIZE, Resource, "Estimate the legacy database size in GB.", schema_of::<NoArgs>()),
            (GET_SOURCE_SCHEMA, Resource, "Fetch CREATE TABLE statements from the legacy database.", schema_of::<SourceSchemaArgs>()),
            (GET_GCP_PROJECT_STATE, Resource, "Describe the target Cloud SQL instance.", schema_of::<NoArgs>()),
            (PROVISION_INFRA, Tool, "Provision GCP infrastructure with Terraform.", schema_of::<NoArgs>()),
            (DESTROY_INFRA, Tool, "Destroy GCP infrastructure with Terraform.", schema_of::<NoArgs>()),
            (RUN_GCS_IMPORT, Tool, "Import a SQL dump from Cloud Storage into Cloud SQL.", schema_of::<GcsImportArgs>()),
            (RUN_DMS_JOB, Tool, "Start a Database Migration Service job.", schema_of::<DmsJobArgs>()),
            (RUN_MYDUMPER, Tool, "Dump the legacy database with mydumper.", schema_of::<DumpArgs>()),
            (RUN_MYLOADER, Tool, "Load a mydumper dump into Cloud SQL with myloader.", schema_of::<LoadArgs>()),
            (RUN_VALIDATION_SCRIPT, Tool, "Run a data validation script.", schema_of::<ValidationScriptArgs>()),
            (GET_GCP_ENCRYPTION_RECOMMENDATION, Prompt, "GCP recommended encryption standards for Cloud SQL.", schema_of::<NoArgs>()),
        ];

        let operations = specs
            .into_iter()
            .map(|(name, kind, description, input_schema)| {
                (
                    name,
                    OperationSpec {
                        name,
                        kind,
                        description,
                        input_schema,
                    },
                )
            })
            .collect();

        Self { operations }
    }

    #[inline]
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&OperationSpec> {
        self.operations.get(name)
    }

    #[inline]
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.operations.contains_key(name)
    }

    /// All operations in name order
    pub fn iter(&self) -> impl Iterator<Item = &OperationSpec> {
        self.operations.values()
    }

    /// Operations of one kind
    pub fn of_kind(&self, kind: OperationKind) -> impl Iterator<Item = &OperationSpec> {
        self.operations.values().filter(move |spec| spec.kind == kind)
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::standard()
    }
}
