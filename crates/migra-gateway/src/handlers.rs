//! Operation handlers
//!
//! Each handler builds one or more external commands from the gateway
//! configuration and its typed arguments, runs them, and returns an
//! envelope. The two source-database resources query the legacy server
//! through a [`SourceDatabase`] instead. Handlers may return `Err`; the
//! gateway folds that into an `error` envelope.

use crate::config::GatewayConfig;
use crate::envelope::ToolEnvelope;
use crate::error::GatewayError;
use crate::registry::{DmsJobArgs, DumpArgs, GcsImportArgs, LoadArgs, SourceSchemaArgs, ValidationScriptArgs};
use crate::runner::{CommandRunner, CommandSpec};
use crate::secrets::SecretSource;
use crate::source_db::{MySqlSource, SourceDatabase, LIST_TABLES_SQL, SOURCE_SIZE_SQL};
use serde_json::{json, Map, Value};
use std::io::Write;
use std::sync::Arc;

/// Connection parameters for the legacy MySQL server
#[derive(Clone, PartialEq, Eq)]
pub struct LegacyDbCredentials {
    pub host: String,
    pub user: String,
    pub password: String,
    pub database: String,
}

impl std::fmt::Debug for LegacyDbCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LegacyDbCredentials")
            .field("host", &self.host)
            .field("user", &self.user)
            .field("database", &self.database)
            .finish_non_exhaustive()
    }
}

impl LegacyDbCredentials {
    /// Resolve all four connection secrets
    pub async fn load(
        secrets: &dyn SecretSource,
        config: &GatewayConfig,
    ) -> Result<Self, GatewayError> {
        let names = &config.legacy_db;
        Ok(Self {
            host: secrets.get(&names.host).await?,
            user: secrets.get(&names.user).await?,
            password: secrets.get(&names.password).await?,
            database: secrets.get(&names.name).await?,
        })
    }
}

/// Implementations of every registry operation
pub struct MigrationHandlers {
    config: Arc<GatewayConfig>,
    runner: Arc<dyn CommandRunner>,
    secrets: Arc<dyn SecretSource>,
    legacy: Option<LegacyDbCredentials>,
    source_db: Option<Arc<dyn SourceDatabase>>,
}

impl std::fmt::Debug for MigrationHandlers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MigrationHandlers")
            .field("project", &self.config.gcp_project_id)
            .field("legacy", &self.legacy)
            .finish_non_exhaustive()
    }
}

impl MigrationHandlers {
    /// Create handlers; `legacy` is `None` when the legacy secrets could not be read
    #[must_use]
    pub fn new(
        config: Arc<GatewayConfig>,
        runner: Arc<dyn CommandRunner>,
        secrets: Arc<dyn SecretSource>,
        legacy: Option<LegacyDbCredentials>,
    ) -> Self {
        let source_db = legacy
            .as_ref()
            .map(|creds| Arc::new(MySqlSource::new(creds)) as Arc<dyn SourceDatabase>);
        Self {
            config,
            runner,
            secrets,
            legacy,
            source_db,
        }
    }

    /// Replace the MySQL connection used by the source-database resources
    #[must_use]
    pub fn with_source_database(mut self, source_db: Arc<dyn SourceDatabase>) -> Self {
        self.source_db = Some(source_db);
        self
    }

    fn legacy(&self) -> Result<&LegacyDbCredentials, GatewayError> {
        self.legacy.as_ref().ok_or(GatewayError::CredentialsMissing)
    }

    fn source_db(&self) -> Result<&dyn SourceDatabase, GatewayError> {
        self.legacy()?;
        self.source_db.as_deref().ok_or(GatewayError::CredentialsMissing)
    }

    async fn run(&self, command: CommandSpec) -> Result<ToolEnvelope, GatewayError> {
        let output = self.runner.run(&command).await?;
        Ok(ToolEnvelope::from_process(output))
    }

    // --- Resources ---

    pub async fn get_source_db_size(&self) -> Result<ToolEnvelope, GatewayError> {
        let database = &self.legacy()?.database;
        let rows = self
            .source_db()?
            .query(SOURCE_SIZE_SQL, std::slice::from_ref(database))
            .await?;
        let Some(row) = rows.into_iter().next() else {
            return Ok(ToolEnvelope::success_data(Value::Null));
        };
        let mut columns = row.into_iter();
        let database_name = columns.next().flatten().unwrap_or_default();
        // SUM is NULL when the schema holds only views
        let size_in_gb = match columns.next().flatten() {
            None => 0.0,
            Some(text) => text.trim().parse::<f64>().map_err(|e| GatewayError::UnexpectedOutput {
                context: crate::registry::GET_SOURCE_DB_SIZE.to_string(),
                reason: format!("cannot parse size {text:?}: {e}"),
            })?,
        };
        Ok(ToolEnvelope::success_data(json!({
            "database_name": database_name,
            "size_in_gb": size_in_gb,
        })))
    }

    pub async fn get_source_schema(&self, args: SourceSchemaArgs) -> Result<ToolEnvelope, GatewayError> {
        let db = self.source_db()?;
        let tables = match args.tables.filter(|t| !t.is_empty()) {
            Some(tables) => tables,
            None => db
                .query(LIST_TABLES_SQL, &[])
                .await?
                .into_iter()
                .filter_map(|row| row.into_iter().next().flatten())
                .collect(),
        };

        let mut schemas = Map::new();
        for table in tables {
            // identifiers cannot be bound; a backtick is the only way out of the quoting
            if table.contains('`') {
                return Err(GatewayError::invalid_arguments(
                    crate::registry::GET_SOURCE_SCHEMA,
                    format!("illegal table name {table:?}"),
                ));
            }
            let rows = db.query(&format!("SHOW CREATE TABLE `{table}`"), &[]).await?;
            let ddl = rows
                .into_iter()
                .next()
                .and_then(|row| row.into_iter().nth(1).flatten())
                .ok_or_else(|| GatewayError::UnexpectedOutput {
                    context: format!("SHOW CREATE TABLE {table}"),
                    reason: "no DDL returned".to_string(),
                })?;
            schemas.insert(table, Value::String(ddl));
        }
        Ok(ToolEnvelope::success_data(Value::Object(schemas)))
    }

    pub async fn get_gcp_project_state(&self) -> Result<ToolEnvelope, GatewayError> {
        self.run(self.describe_instance("--format=json")).await
    }

    // --- Tools ---

    /// `terraform init` then `terraform apply`; stops at the first failing step
    pub async fn provision_infra(&self) -> Result<ToolEnvelope, GatewayError> {
        let c = &self.config;
        let init = self.terraform("init");
        let apply = self.terraform("apply").arg("-auto-approve").args([
            format!("-var=gcp_project_id={}", c.gcp_project_id),
            format!("-var=gcp_region={}", c.gcp_region),
            format!("-var=gcp_zone={}", c.gcp_zone),
            format!("-var=cloud_sql_instance_name={}", c.cloud_sql_instance_name),
            format!("-var=cloud_sql_db_version={}", c.cloud_sql_db_version),
            format!("-var=cloud_sql_tier={}", c.cloud_sql_tier),
            format!("-var=cloud_sql_root_password_secret={}", c.cloud_sql_root_password_secret),
            format!("-var=cloud_sql_backup_start_time={}", c.cloud_sql_backup_start_time),
            format!("-var=gcs_bucket_name_suffix={}", c.gcs_bucket_name_suffix),
        ]);
        self.run_sequence(vec![init, apply]).await
    }

    pub async fn destroy_infra(&self) -> Result<ToolEnvelope, GatewayError> {
        let c = &self.config;
        let destroy = self.terraform("destroy").arg("-auto-approve").args([
            format!("-var=gcp_project_id={}", c.gcp_project_id),
            format!("-var=gcp_region={}", c.gcp_region),
        ]);
        self.run(destroy).await
    }

    pub async fn run_gcs_import(&self, args: GcsImportArgs) -> Result<ToolEnvelope, GatewayError> {
        let c = &self.config;
        let command = CommandSpec::new("gcloud").args([
            "sql".to_string(),
            "import".to_string(),
            "sql".to_string(),
            c.cloud_sql_instance_name.clone(),
            args.bucket_uri,
            format!("--database={}", args.database),
            format!("--project={}", c.gcp_project_id),
            "--quiet".to_string(),
        ]);
        self.run(command).await
    }

    pub async fn run_dms_job(&self, args: DmsJobArgs) -> Result<ToolEnvelope, GatewayError> {
        let c = &self.config;
        let command = CommandSpec::new("gcloud").args([
            "database-migration".to_string(),
            "jobs".to_string(),
            "start".to_string(),
            args.job_id,
            format!("--region={}", c.gcp_region),
            format!("--project={}", c.gcp_project_id),
        ]);
        self.run(command).await
    }

    pub async fn run_mydumper(&self, args: DumpArgs) -> Result<ToolEnvelope, GatewayError> {
        let creds = self.legacy()?;
        let command = CommandSpec::new("mydumper").args([
            format!("--host={}", creds.host),
            format!("--user={}", creds.user),
            format!("--password={}", creds.password),
            format!("--database={}", creds.database),
            format!("--outputdir={}", args.output_dir),
            format!("--threads={}", args.threads),
            "--compress".to_string(),
            "--long-query-guard=60".to_string(),
        ]);
        self.run(command).await
    }

    /// Resolves the root password and instance IP, then loads the dump
    pub async fn run_myloader(&self, args: LoadArgs) -> Result<ToolEnvelope, GatewayError> {
        let database = self.legacy()?.database.clone();
        let root_password = self
            .secrets
            .get(&self.config.cloud_sql_root_password_secret)
            .await?;

        let describe = self
            .run(self.describe_instance("--format=json(ipAddresses)"))
            .await?;
        if describe.is_error() {
            return Ok(describe);
        }
        let ip = parse_instance_ip(describe.stdout.as_deref().unwrap_or_default())?;

        let command = CommandSpec::new("myloader").args([
            format!("--host={ip}"),
            "--user=root".to_string(),
            format!("--password={root_password}"),
            format!("--database={database}"),
            format!("--directory={}", args.input_dir),
            format!("--threads={}", args.threads),
            "--compress-protocol".to_string(),
            "--verbose=3".to_string(),
        ]);
        self.run(command).await
    }

    /// Python scripts run from a temp file that is removed when this returns
    pub async fn run_validation_script(&self, args: ValidationScriptArgs) -> Result<ToolEnvelope, GatewayError> {
        match args.language.to_ascii_lowercase().as_str() {
            "python" => {
                let mut script = tempfile::Builder::new()
                    .prefix("migra_validation_")
                    .suffix(".py")
                    .tempfile()?;
                script.write_all(args.script_content.as_bytes())?;
                script.flush()?;

                let command = CommandSpec::new(self.config.python_bin.clone())
                    .arg(script.path().to_string_lossy().into_owned());
                let result = self.run(command).await;
                drop(script);
                result
            }
            "sql" => Ok(ToolEnvelope::error_message(
                "SQL validation scripts are not supported: they need connections to both the source \
                 and target databases. Use a python script instead.",
            )),
            other => Ok(ToolEnvelope::error_message(format!("Unsupported language: {other}"))),
        }
    }

    // --- Prompts ---

    #[must_use]
    pub fn get_gcp_encryption_recommendation(&self) -> ToolEnvelope {
        ToolEnvelope::success_data(json!({
            "title": "GCP Recommended Encryption Standards for Cloud SQL",
            "data_at_rest": "GCP encrypts customer data stored at rest by default, without any action required from you. \
                Cloud SQL uses the AES-256 encryption algorithm. For additional control, you can use \
                Customer-Managed Encryption Keys (CMEK).",
            "data_in_transit": "For connections to a Cloud SQL instance, you can enforce SSL/TLS encryption. \
                It is best practice to configure all application clients to use SSL/TLS.",
            "recommendation": "Go with the GCP default encryption at rest and enforce SSL/TLS for all client \
                connections for data in transit.",
        }))
    }

    // --- Helpers ---

    fn terraform(&self, subcommand: &str) -> CommandSpec {
        CommandSpec::new("terraform").args([
            format!("-chdir={}", self.config.terraform_dir.display()),
            subcommand.to_string(),
        ])
    }

    fn describe_instance(&self, format: &str) -> CommandSpec {
        CommandSpec::new("gcloud").args([
            "sql".to_string(),
            "instances".to_string(),
            "describe".to_string(),
            self.config.cloud_sql_instance_name.clone(),
            format!("--project={}", self.config.gcp_project_id),
            format.to_string(),
        ])
    }

    async fn run_sequence(&self, commands: Vec<CommandSpec>) -> Result<ToolEnvelope, GatewayError> {
        let mut stdout = String::new();
        let mut stderr = String::new();
        for command in commands {
            let output = self.runner.run(&command).await?;
            if !output.succeeded() {
                tracing::warn!(
                    program = %command.program,
                    returncode = output.returncode,
                    "command_sequence_step_failed"
                );
                return Ok(ToolEnvelope::from_process(output));
            }
            stdout.push_str(&output.stdout);
            stderr.push_str(&output.stderr);
        }
        Ok(ToolEnvelope::from_process(crate::runner::ProcessOutput {
            stdout,
            stderr,
            returncode: 0,
        }))
    }
}

/// First `ipAddress` in `gcloud sql instances describe` JSON output
fn parse_instance_ip(stdout: &str) -> Result<String, GatewayError> {
    let unexpected = |reason: String| GatewayError::UnexpectedOutput {
        context: "gcloud sql instances describe".to_string(),
        reason,
    };
    let value: Value = serde_json::from_str(stdout).map_err(|e| unexpected(e.to_string()))?;
    let addresses = &value["ipAddresses"];
    let ip = match addresses {
        Value::Array(list) => list.iter().find_map(|a| a["ipAddress"].as_str()),
        Value::Object(_) => addresses["ipAddress"].as_str(),
        _ => None,
    };
    ip.map(str::to_string)
        .ok_or_else(|| unexpected("no ipAddresses[].ipAddress".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::SystemRunner;
    use crate::secrets::StaticSecrets;
    use crate::source_db::MockSourceDatabase;

    fn handlers(legacy: Option<LegacyDbCredentials>, db: MockSourceDatabase) -> MigrationHandlers {
        MigrationHandlers::new(
            Arc::new(GatewayConfig::default()),
            Arc::new(SystemRunner::new()),
            Arc::new(StaticSecrets::new()),
            legacy,
        )
        .with_source_database(Arc::new(db))
    }

    fn shop() -> LegacyDbCredentials {
        LegacyDbCredentials {
            host: "db".to_string(),
            user: "app".to_string(),
            password: "s3cret".to_string(),
            database: "shop".to_string(),
        }
    }

    #[tokio::test]
    async fn size_is_read_from_bound_query() {
        let mut db = MockSourceDatabase::new();
        db.expect_query()
            .withf(|sql, params| sql == SOURCE_SIZE_SQL && params == ["shop".to_string()])
            .times(1)
            .returning(|_, _| Ok(vec![vec![Some("shop".to_string()), Some("0.125000".to_string())]]));

        let envelope = handlers(Some(shop()), db).get_source_db_size().await.unwrap();
        assert_eq!(
            envelope.data,
            Some(json!({"database_name": "shop", "size_in_gb": 0.125}))
        );
    }

    #[tokio::test]
    async fn size_of_view_only_schema_is_zero() {
        let mut db = MockSourceDatabase::new();
        db.expect_query()
            .returning(|_, _| Ok(vec![vec![Some("shop".to_string()), None]]));

        let envelope = handlers(Some(shop()), db).get_source_db_size().await.unwrap();
        assert_eq!(envelope.data.unwrap()["size_in_gb"], json!(0.0));
    }

    #[tokio::test]
    async fn unknown_schema_has_null_size() {
        let mut db = MockSourceDatabase::new();
        db.expect_query().returning(|_, _| Ok(Vec::new()));

        let envelope = handlers(Some(shop()), db).get_source_db_size().await.unwrap();
        assert!(envelope.is_success());
        assert_eq!(envelope.data, Some(Value::Null));
    }

    #[tokio::test]
    async fn source_queries_need_credentials() {
        let mut db = MockSourceDatabase::new();
        db.expect_query().never();
        let h = handlers(None, db);

        assert!(matches!(h.get_source_db_size().await, Err(GatewayError::CredentialsMissing)));
        assert!(matches!(
            h.get_source_schema(SourceSchemaArgs::default()).await,
            Err(GatewayError::CredentialsMissing)
        ));
    }

    #[tokio::test]
    async fn listed_tables_are_described_in_order() {
        let mut db = MockSourceDatabase::new();
        let mut seq = mockall::Sequence::new();
        db.expect_query()
            .withf(|sql, params| sql == LIST_TABLES_SQL && params.is_empty())
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(vec![vec![Some("users".to_string())]]));
        db.expect_query()
            .withf(|sql, _| sql == "SHOW CREATE TABLE `users`")
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| {
                Ok(vec![vec![
                    Some("users".to_string()),
                    Some("CREATE TABLE `users` (\n  `id` int\n)".to_string()),
                ]])
            });

        let envelope = handlers(Some(shop()), db)
            .get_source_schema(SourceSchemaArgs::default())
            .await
            .unwrap();
        assert_eq!(
            envelope.data,
            Some(json!({"users": "CREATE TABLE `users` (\n  `id` int\n)"}))
        );
    }

    #[test]
    fn instance_ip_from_list() {
        let ip = parse_instance_ip(r#"{"ipAddresses":[{"ipAddress":"10.1.2.3","type":"PRIVATE"}]}"#).unwrap();
        assert_eq!(ip, "10.1.2.3");
    }

    #[test]
    fn instance_ip_from_object() {
        let ip = parse_instance_ip(r#"{"ipAddresses":{"ipAddress":"34.1.1.1"}}"#).unwrap();
        assert_eq!(ip, "34.1.1.1");
    }

    #[test]
    fn instance_ip_missing_is_error() {
        assert!(parse_instance_ip(r#"{"name":"x"}"#).is_err());
        assert!(parse_instance_ip("not json").is_err());
    }

    #[test]
    fn credentials_debug_hides_password() {
        let creds = LegacyDbCredentials {
            host: "db".to_string(),
            user: "app".to_string(),
            password: "s3cret".to_string(),
            database: "shop".to_string(),
        };
        assert!(!format!("{creds:?}").contains("s3cret"));
    }
}
