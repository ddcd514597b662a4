//! Migration strategy classifier
//!
//! Deterministic three-way threshold on the estimated volume in GB:
//! - `V < 100`          storage import (dump, then import from GCS)
//! - `100 <= V <= 500`  managed migration (DMS)
//! - `V > 500`          dump/load (mydumper/myloader)

use migra_gateway::registry::{RUN_DMS_JOB, RUN_GCS_IMPORT, RUN_MYDUMPER, RUN_MYLOADER};
use serde::{Deserialize, Serialize};

/// Lowest volume handled by the managed migration service
pub const MANAGED_MIGRATION_MIN_GB: f64 = 100.0;

/// Highest volume handled by the managed migration service
pub const MANAGED_MIGRATION_MAX_GB: f64 = 500.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationStrategy {
    StorageImport,
    ManagedMigration,
    DumpLoad,
}

impl MigrationStrategy {
    #[must_use]
    pub fn classify(volume_gb: f64) -> Self {
        if volume_gb < MANAGED_MIGRATION_MIN_GB {
            Self::StorageImport
        } else if volume_gb <= MANAGED_MIGRATION_MAX_GB {
            Self::ManagedMigration
        } else {
            Self::DumpLoad
        }
    }

    /// Gateway operations the strategy runs, in order
    #[must_use]
    pub fn operations(self) -> &'static [&'static str] {
        match self {
            Self::StorageImport => &[RUN_MYDUMPER, RUN_GCS_IMPORT],
            Self::ManagedMigration => &[RUN_DMS_JOB],
            Self::DumpLoad => &[RUN_MYDUMPER, RUN_MYLOADER],
        }
    }

    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::StorageImport => "GCS Import",
            Self::ManagedMigration => "Database Migration Service (DMS)",
            Self::DumpLoad => "Mydumper/Myloader",
        }
    }
}

impl std::fmt::Display for MigrationStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}
