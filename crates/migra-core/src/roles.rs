//! Agent roles
//!
//! Six fixed roles, each with a name, a standing directive and the gateway
//! operations it is granted. [`ROSTER`] lists them in dependency order.

use migra_gateway::registry::{
    DESTROY_INFRA, GET_GCP_PROJECT_STATE, GET_SOURCE_DB_SIZE, GET_SOURCE_SCHEMA, PROVISION_INFRA,
    RUN_DMS_JOB, RUN_GCS_IMPORT, RUN_MYDUMPER, RUN_MYLOADER, RUN_VALIDATION_SCRIPT,
};
use migra_gateway::CapabilityGrantsBuilder;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Infrastructure,
    Schema,
    Migration,
    Validation,
    Anomaly,
    Optimization,
}

/// Turn order: infra, schema, migration, validation, anomaly observer, optimization
pub const ROSTER: [Role; 6] = [
    Role::Infrastructure,
    Role::Schema,
    Role::Migration,
    Role::Validation,
    Role::Anomaly,
    Role::Optimization,
];

impl Role {
    #[must_use]
    pub fn agent_name(self) -> &'static str {
        match self {
            Self::Infrastructure => "Environment_Setup_Agent",
            Self::Schema => "Schema_Conversion_Agent",
            Self::Migration => "Data_Migration_Agent",
            Self::Validation => "Data_Validation_Agent",
            Self::Anomaly => "Anomaly_Detection_Agent",
            Self::Optimization => "Performance_Optimization_Agent",
        }
    }

    #[must_use]
    pub fn from_agent_name(name: &str) -> Option<Self> {
        ROSTER.into_iter().find(|role| role.agent_name() == name)
    }

    /// Operations this role may invoke; observers get none
    #[must_use]
    pub fn authorized_operations(self) -> &'static [&'static str] {
        match self {
            Self::Infrastructure => &[PROVISION_INFRA, DESTROY_INFRA, GET_GCP_PROJECT_STATE],
            Self::Schema => &[GET_SOURCE_SCHEMA],
            Self::Migration => &[
                GET_SOURCE_DB_SIZE,
                RUN_GCS_IMPORT,
                RUN_DMS_JOB,
                RUN_MYDUMPER,
                RUN_MYLOADER,
            ],
            Self::Validation => &[RUN_VALIDATION_SCRIPT],
            Self::Anomaly | Self::Optimization => &[],
        }
    }

    #[must_use]
    pub fn is_observer(self) -> bool {
        self.authorized_operations().is_empty()
    }

    /// Standing instruction given to the oracle on every turn
    #[must_use]
    pub fn directive(self) -> &'static str {
        match self {
            Self::Infrastructure => INFRASTRUCTURE_DIRECTIVE,
            Self::Schema => SCHEMA_DIRECTIVE,
            Self::Migration => MIGRATION_DIRECTIVE,
            Self::Validation => VALIDATION_DIRECTIVE,
            Self::Anomaly => ANOMALY_DIRECTIVE,
            Self::Optimization => OPTIMIZATION_DIRECTIVE,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.agent_name())
    }
}

/// Add every roster role's operations to `builder`
#[must_use]
pub fn grant_roster(builder: CapabilityGrantsBuilder) -> CapabilityGrantsBuilder {
    ROSTER.into_iter().fold(builder, |builder, role| {
        builder.grant(role.agent_name(), role.authorized_operations().iter().copied())
    })
}

const INFRASTRUCTURE_DIRECTIVE: &str = "\
You are the Google Cloud infrastructure engineer for this migration and you own the Terraform-managed environment.
- Create the infrastructure with `provision_infra`.
- Tear it down after the migration with `destroy_infra`.
- Inspect the Cloud SQL instance with `get_gcp_project_state`.
Read every tool result. A non-zero returncode or an error status is a failure and must be reported as one, quoting stderr.";

const SCHEMA_DIRECTIVE: &str = "\
You are the database architect converting the legacy MySQL schema for Cloud SQL.
1. Fetch every CREATE TABLE statement with `get_source_schema`.
2. Change `ENGINE=MyISAM` to `ENGINE=InnoDB`.
3. Remove `DEFINER=` clauses or replace them with `DEFINER=CURRENT_USER`.
4. Keep character set and collation consistent with Cloud SQL defaults (utf8mb4, utf8mb4_unicode_ci).
Present the corrected DDL script and a markdown change report listing each table and each modification.";

const MIGRATION_DIRECTIVE: &str = "\
You are the data migration strategist. Move the data from the legacy server to Cloud SQL.
1. Check the database size with `get_source_db_size`.
2. Pick the strategy from the volume in GB: under 100 use GCS Import; 100 to 500 inclusive use DMS; over 500 use Mydumper/Myloader.
3. GCS Import: `run_mydumper` into a temporary directory, then `run_gcs_import` with the bucket URI.
   DMS: `run_dms_job` with the job id.
   Mydumper/Myloader: `run_mydumper`, then `run_myloader` on the same directory.
Report the chosen strategy and the outcome of every tool call. If a step fails, quote its stderr.";

const VALIDATION_DIRECTIVE: &str = "\
You are the data integrity auditor. Act once the Data_Migration_Agent reports the transfer as complete.
Write Python validation scripts and run them with `run_validation_script`:
- row counts for every table on source and target
- checksums for at least three critical tables, or all tables if there are fewer
Finish with a markdown report stating 'VALIDATION SUCCESS' or 'VALIDATION FAILURE'. On failure list every table with its discrepancy, for example: Table 'orders': Source row count is 1052, Target row count is 1050.";

const ANOMALY_DIRECTIVE: &str = "\
You monitor the whole conversation, including every tool result. Look for error statuses, non-zero returncodes, content in stderr, repeated failures and warnings.
When you find one, reply with a message starting with 'ANOMALY DETECTED:' naming the agent and tool involved. Otherwise reply briefly that nothing abnormal was observed.";

const OPTIMIZATION_DIRECTIVE: &str = "\
You are the GCP cost and performance specialist. Stay silent until validation has succeeded.
Then review the whole conversation and write a markdown report with recommendations on cost (instance tier, committed use discounts), performance (for example dump thread counts) and alternative strategies for similar migrations.
End the report with 'MIGRATION COMPLETE'.";

#[cfg(test)]
mod tests {
    use super::*;
    use migra_gateway::{CapabilityGrants, Registry};

    #[test]
    fn roster_is_in_dependency_order() {
        let names: Vec<_> = ROSTER.iter().map(|r| r.agent_name()).collect();
        assert_eq!(
            names,
            vec![
                "Environment_Setup_Agent",
                "Schema_Conversion_Agent",
                "Data_Migration_Agent",
                "Data_Validation_Agent",
                "Anomaly_Detection_Agent",
                "Performance_Optimization_Agent",
            ]
        );
    }

    #[test]
    fn every_authorized_operation_exists() {
        let registry = Registry::standard();
        for role in ROSTER {
            for op in role.authorized_operations() {
                assert!(registry.contains(op), "{role} grants unknown {op}");
            }
        }
    }

    #[test]
    fn observers_have_no_operations() {
        assert!(Role::Anomaly.is_observer());
        assert!(Role::Optimization.is_observer());
        assert!(!Role::Validation.is_observer());
    }

    #[test]
    fn grants_follow_roles() {
        let grants = grant_roster(CapabilityGrants::builder()).build();
        assert!(grants.is_authorized("Data_Migration_Agent", RUN_MYLOADER));
        assert!(!grants.is_authorized("Data_Migration_Agent", PROVISION_INFRA));
        assert!(!grants.is_authorized("Schema_Conversion_Agent", RUN_VALIDATION_SCRIPT));
        assert!(grants.operations_for("Anomaly_Detection_Agent").is_empty());
        assert_eq!(grants.agents().count(), 6);
    }

    #[test]
    fn names_round_trip() {
        for role in ROSTER {
            assert_eq!(Role::from_agent_name(role.agent_name()), Some(role));
        }
        assert_eq!(Role::from_agent_name("User_Proxy"), None);
    }
}
