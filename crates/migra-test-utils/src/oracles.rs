//! Deterministic reasoning oracles
//!
//! - [`ScriptedOracle`]: per-agent queues of canned replies
//! - [`PlaybookOracle`]: rule-driven stand-in for every roster role that
//!   decides each reply from the transcript alone

use async_trait::async_trait;
use migra_core::strategy::MigrationStrategy;
use migra_core::{
    Message, OracleError, OracleReply, OracleRequest, ReasoningOracle, Role, ToolCall, Transcript,
    SEED_SPEAKER,
};
use migra_gateway::registry::{
    GET_SOURCE_SCHEMA, PROVISION_INFRA, RUN_DMS_JOB, RUN_GCS_IMPORT, RUN_MYDUMPER, RUN_MYLOADER,
    RUN_VALIDATION_SCRIPT,
};
use migra_gateway::ToolEnvelope;
use parking_lot::Mutex;
use regex::Regex;
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};

/// What an oracle was asked
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedRequest {
    pub agent: String,
    pub transcript_len: usize,
    pub operations: Vec<String>,
}

impl RecordedRequest {
    fn from_request(request: &OracleRequest<'_>) -> Self {
        Self {
            agent: request.agent.to_string(),
            transcript_len: request.transcript.len(),
            operations: request.operations.iter().map(|op| op.name.to_string()).collect(),
        }
    }
}

/// Replies queued per agent; an agent with an empty queue gets `fallback`
#[derive(Debug)]
pub struct ScriptedOracle {
    queues: Mutex<HashMap<String, VecDeque<OracleReply>>>,
    fallback: Option<String>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl Default for ScriptedOracle {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedOracle {
    pub fn new() -> Self {
        Self {
            queues: Mutex::new(HashMap::new()),
            fallback: Some("Nothing to add.".to_string()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Fail with [`OracleError::Exhausted`] once an agent's queue is empty
    pub fn strict(mut self) -> Self {
        self.fallback = None;
        self
    }

    pub fn reply(self, agent: &str, reply: OracleReply) -> Self {
        self.queues
            .lock()
            .entry(agent.to_string())
            .or_default()
            .push_back(reply);
        self
    }

    pub fn say(self, agent: &str, text: &str) -> Self {
        self.reply(agent, OracleReply::text(text))
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl ReasoningOracle for ScriptedOracle {
    async fn complete(&self, request: OracleRequest<'_>) -> Result<OracleReply, OracleError> {
        self.requests.lock().push(RecordedRequest::from_request(&request));
        let next = self
            .queues
            .lock()
            .get_mut(request.agent)
            .and_then(VecDeque::pop_front);
        match (next, &self.fallback) {
            (Some(reply), _) => Ok(reply),
            (None, Some(text)) => Ok(OracleReply::text(text.clone())),
            (None, None) => Err(OracleError::Exhausted(request.agent.to_string())),
        }
    }
}

/// Parameters the playbook uses when it builds tool arguments
#[derive(Debug, Clone)]
pub struct PlaybookSettings {
    pub bucket_uri: String,
    pub database: String,
    pub dms_job_id: String,
    pub dump_dir: String,
}

impl Default for PlaybookSettings {
    fn default() -> Self {
        Self {
            bucket_uri: "gs://your-gcp-project-id-migration-bucket/dump".to_string(),
            database: "legacy".to_string(),
            dms_job_id: "legacy-to-cloudsql".to_string(),
            dump_dir: "/tmp/mydumper_output".to_string(),
        }
    }
}

/// Row-count script run by the validation role
pub const ROW_COUNT_SCRIPT: &str = r#"import os
import pymysql

def counts(host, user, password, db):
    conn = pymysql.connect(host=host, user=user, password=password, database=db)
    with conn.cursor() as cur:
        cur.execute("SHOW TABLES")
        tables = [row[0] for row in cur.fetchall()]
        result = {}
        for table in tables:
            cur.execute(f"SELECT COUNT(*) FROM `{table}`")
            result[table] = cur.fetchone()[0]
    return result

source = counts(os.environ["SRC_HOST"], os.environ["SRC_USER"], os.environ["SRC_PASSWORD"], os.environ["SRC_DB"])
target = counts(os.environ["DST_HOST"], os.environ["DST_USER"], os.environ["DST_PASSWORD"], os.environ["DST_DB"])
for table in sorted(source):
    print(table, source[table], target.get(table, 0))
"#;

/// Rule-driven oracle covering all six roles.
///
/// Every decision is derived from the transcript, so replaying a transcript
/// reproduces the same replies.
#[derive(Debug)]
pub struct PlaybookOracle {
    settings: PlaybookSettings,
    volume: Regex,
    myisam: Regex,
    definer: Regex,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl Default for PlaybookOracle {
    fn default() -> Self {
        Self::new(PlaybookSettings::default())
    }
}

impl PlaybookOracle {
    pub fn new(settings: PlaybookSettings) -> Self {
        Self {
            settings,
            volume: Regex::new(r"(?i)volume is (\d+(?:\.\d+)?) GB").expect("volume regex"),
            myisam: Regex::new(r"(?i)ENGINE\s*=\s*MyISAM").expect("engine regex"),
            definer: Regex::new(r"(?i)\s*DEFINER\s*=\s*(?:`[^`]*`|'[^']*'|[^\s@]+)@(?:`[^`]*`|'[^']*'|\S+)")
                .expect("definer regex"),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().clone()
    }

    /// Rewrite one CREATE statement for Cloud SQL; returns the DDL and the changes made
    pub fn convert_ddl(&self, table: &str, ddl: &str) -> (String, Vec<String>) {
        let mut changes = Vec::new();
        let mut out = ddl.to_string();
        if self.myisam.is_match(&out) {
            out = self.myisam.replace_all(&out, "ENGINE=InnoDB").into_owned();
            changes.push(format!("Table '{table}': Changed engine from MyISAM to InnoDB."));
        }
        if self.definer.is_match(&out) {
            out = self.definer.replace_all(&out, "").into_owned();
            changes.push(format!("Table '{table}': Removed DEFINER clause."));
        }
        (out, changes)
    }

    fn seed_volume(&self, transcript: &Transcript) -> Option<f64> {
        let seed = transcript.iter().find(|m| m.speaker == SEED_SPEAKER)?;
        self.volume
            .captures(&seed.content)
            .and_then(|c| c[1].parse().ok())
    }

    fn infrastructure(&self, agent: &str, transcript: &Transcript) -> OracleReply {
        match own_results(transcript, agent, PROVISION_INFRA).last() {
            None => OracleReply::text("Provisioning the Cloud SQL environment with Terraform.")
                .with_call(ToolCall::new(PROVISION_INFRA, json!({}))),
            Some(env) if env.is_error() => OracleReply::text(format!(
                "Infrastructure provisioning failed ({}). TASK FAILED",
                summary(env)
            )),
            Some(_) if has_reply_containing(transcript, agent, "provisioned") => {
                OracleReply::text("Infrastructure is ready; nothing further to do.")
            }
            Some(_) => OracleReply::text("Infrastructure provisioned successfully. Cloud SQL instance is up."),
        }
    }

    fn schema(&self, agent: &str, transcript: &Transcript) -> OracleReply {
        let Some(env) = own_results(transcript, agent, GET_SOURCE_SCHEMA).last().copied() else {
            return OracleReply::text("Fetching the source schema.")
                .with_call(ToolCall::new(GET_SOURCE_SCHEMA, json!({})));
        };
        if env.is_error() {
            return OracleReply::text(format!("Schema retrieval failed ({}). TASK FAILED", summary(env)));
        }
        if has_reply_containing(transcript, agent, "Converted DDL") {
            return OracleReply::text("Schema conversion already delivered.");
        }

        let tables = env.data.as_ref().and_then(Value::as_object).cloned().unwrap_or_default();
        let mut script = String::new();
        let mut report = Vec::new();
        for (table, ddl) in &tables {
            let (converted, changes) = self.convert_ddl(table, ddl.as_str().unwrap_or_default());
            script.push_str(&converted);
            script.push_str(";\n\n");
            report.extend(changes);
        }
        if report.is_empty() {
            report.push("No changes were required.".to_string());
        }
        OracleReply::text(format!(
            "Converted DDL:\n```sql\n{}```\n\n## Change report\n{}",
            script,
            report.iter().map(|line| format!("- {line}")).collect::<Vec<_>>().join("\n")
        ))
    }

    /// One strategy step per reply; the next step only follows a successful one
    fn migration(&self, agent: &str, transcript: &Transcript) -> OracleReply {
        let Some(volume) = self.seed_volume(transcript) else {
            return OracleReply::text("No volume was given; cannot choose a strategy. TASK FAILED");
        };
        let strategy = MigrationStrategy::classify(volume);

        let mut previous = None;
        for op in strategy.operations() {
            match own_results(transcript, agent, op).last() {
                Some(env) if env.is_error() => {
                    return OracleReply::text(format!(
                        "{strategy} strategy failed at {op} ({}). TASK FAILED",
                        summary(env)
                    ));
                }
                Some(_) => previous = Some(*op),
                None => {
                    let text = match previous {
                        None => format!("Volume is {volume} GB; using the {strategy} strategy."),
                        Some(done) => format!("{done} succeeded; continuing with {op}."),
                    };
                    return OracleReply::text(text).with_call(ToolCall::new(*op, self.arguments_for(op)));
                }
            }
        }
        if has_reply_containing(transcript, agent, "transfer complete") {
            return OracleReply::text("Data is in Cloud SQL; waiting for validation.");
        }
        OracleReply::text(format!("Data transfer complete using the {strategy} strategy."))
    }

    fn arguments_for(&self, operation: &str) -> Value {
        let s = &self.settings;
        match operation {
            RUN_MYDUMPER => json!({"output_dir": s.dump_dir, "threads": 4}),
            RUN_MYLOADER => json!({"input_dir": s.dump_dir, "threads": 4}),
            RUN_GCS_IMPORT => json!({"bucket_uri": s.bucket_uri, "database": s.database}),
            RUN_DMS_JOB => json!({"job_id": s.dms_job_id}),
            _ => json!({}),
        }
    }

    fn validation(&self, agent: &str, transcript: &Transcript) -> OracleReply {
        let migrated = has_reply_containing(transcript, Role::Migration.agent_name(), "transfer complete");
        if !migrated {
            return OracleReply::text("Waiting for the data transfer to finish.");
        }
        let Some(env) = own_results(transcript, agent, RUN_VALIDATION_SCRIPT).last().copied() else {
            return OracleReply::text("Running row-count validation.").with_call(ToolCall::new(
                RUN_VALIDATION_SCRIPT,
                json!({"script_content": ROW_COUNT_SCRIPT, "language": "python"}),
            ));
        };
        if env.is_error() {
            return OracleReply::text(format!("Validation script failed ({}). TASK FAILED", summary(env)));
        }

        let mismatches: Vec<String> = env
            .stdout
            .as_deref()
            .unwrap_or_default()
            .lines()
            .filter_map(parse_count_line)
            .filter(|(_, source, target)| source != target)
            .map(|(table, source, target)| {
                format!("Table '{table}': Source row count is {source}, Target row count is {target}.")
            })
            .collect();

        if mismatches.is_empty() {
            OracleReply::text("## Validation report\n\nVALIDATION SUCCESS\n\nAll row counts match.")
        } else {
            OracleReply::text(format!(
                "## Validation report\n\nVALIDATION FAILURE\n\n{}\n\nTASK FAILED",
                mismatches.iter().map(|m| format!("- {m}")).collect::<Vec<_>>().join("\n")
            ))
        }
    }

    fn anomaly(&self, agent: &str, transcript: &Transcript) -> OracleReply {
        let since = transcript
            .messages()
            .iter()
            .rposition(|m| m.speaker == agent)
            .map_or(0, |i| i + 1);
        let failure = transcript.messages()[since..].iter().find_map(|m| {
            let result = m.tool_result.as_ref()?;
            result
                .envelope
                .is_error()
                .then(|| format!("ANOMALY DETECTED: {} {} returned an error ({}).", m.speaker, result.operation, summary(&result.envelope)))
        });
        OracleReply::text(failure.unwrap_or_else(|| "No anomalies observed.".to_string()))
    }

    fn optimization(&self, transcript: &Transcript) -> OracleReply {
        if !has_reply_containing(transcript, Role::Validation.agent_name(), "VALIDATION SUCCESS") {
            return OracleReply::text("Waiting for validation to succeed.");
        }
        OracleReply::text(
            "## Optimization report\n\n\
             - Cost: for non-production use a smaller tier such as db-g1-small; for production consider a 3-year committed use discount.\n\
             - Performance: raise mydumper/myloader thread counts if the source has spare CPU.\n\
             - Strategy: DMS is an option when minimal downtime is required.\n\n\
             MIGRATION COMPLETE",
        )
    }
}

#[async_trait]
impl ReasoningOracle for PlaybookOracle {
    async fn complete(&self, request: OracleRequest<'_>) -> Result<OracleReply, OracleError> {
        self.requests.lock().push(RecordedRequest::from_request(&request));
        let (agent, transcript) = (request.agent, request.transcript);
        let reply = match Role::from_agent_name(agent) {
            Some(Role::Infrastructure) => self.infrastructure(agent, transcript),
            Some(Role::Schema) => self.schema(agent, transcript),
            Some(Role::Migration) => self.migration(agent, transcript),
            Some(Role::Validation) => self.validation(agent, transcript),
            Some(Role::Anomaly) => self.anomaly(agent, transcript),
            Some(Role::Optimization) => self.optimization(transcript),
            None => OracleReply::default(),
        };
        Ok(reply)
    }
}

/// Envelopes returned to `agent` for `operation`, oldest first
pub fn own_results<'a>(transcript: &'a Transcript, agent: &str, operation: &str) -> Vec<&'a ToolEnvelope> {
    transcript
        .iter()
        .filter(|m| m.speaker == agent)
        .filter_map(|m| m.tool_result.as_ref())
        .filter(|r| r.operation == operation)
        .map(|r| &r.envelope)
        .collect()
}

fn has_reply_containing(transcript: &Transcript, agent: &str, needle: &str) -> bool {
    transcript
        .replies_from(agent)
        .any(|m: &Message| m.content.contains(needle))
}

fn summary(envelope: &ToolEnvelope) -> String {
    envelope.failure_summary().unwrap_or_else(|| "ok".to_string())
}

fn parse_count_line(line: &str) -> Option<(String, u64, u64)> {
    let mut parts = line.split_whitespace();
    let table = parts.next()?.to_string();
    let source = parts.next()?.parse().ok()?;
    let target = parts.next()?.parse().ok()?;
    Some((table, source, target))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ddl_conversion_fixes_engine_and_definer() {
        let oracle = PlaybookOracle::default();
        let (ddl, changes) = oracle.convert_ddl(
            "orders",
            "CREATE DEFINER=`admin`@`%` TABLE `orders` (\n  `id` int\n) ENGINE=MyISAM",
        );
        assert_eq!(ddl, "CREATE TABLE `orders` (\n  `id` int\n) ENGINE=InnoDB");
        assert_eq!(changes.len(), 2);
    }

    #[test]
    fn unquoted_definer_is_removed() {
        let oracle = PlaybookOracle::default();
        let (ddl, changes) = oracle.convert_ddl(
            "v",
            "CREATE ALGORITHM=UNDEFINED DEFINER=someuser@host SQL SECURITY DEFINER VIEW `v` AS select 1",
        );
        assert_eq!(ddl, "CREATE ALGORITHM=UNDEFINED SQL SECURITY DEFINER VIEW `v` AS select 1");
        assert_eq!(changes, vec!["Table 'v': Removed DEFINER clause.".to_string()]);
    }

    #[test]
    fn current_user_definer_is_kept() {
        let oracle = PlaybookOracle::default();
        let ddl = "CREATE DEFINER=CURRENT_USER VIEW `v` AS select 1";
        assert_eq!(oracle.convert_ddl("v", ddl), (ddl.to_string(), Vec::new()));
    }

    #[test]
    fn ddl_without_issues_is_unchanged() {
        let oracle = PlaybookOracle::default();
        let ddl = "CREATE TABLE `t` (`id` int) ENGINE=InnoDB";
        assert_eq!(oracle.convert_ddl("t", ddl), (ddl.to_string(), Vec::new()));
    }

    #[test]
    fn count_lines_parse() {
        assert_eq!(parse_count_line("orders 1052 1050"), Some(("orders".to_string(), 1052, 1050)));
        assert_eq!(parse_count_line("garbage"), None);
    }
}
