//! Fake legacy database
//!
//! Answers queries from a rule list (substring of the SQL text) and records
//! every statement with its bound parameters. Unmatched queries return no rows.

use async_trait::async_trait;
use migra_gateway::{GatewayError, SourceDatabase, TextRow};
use parking_lot::Mutex;

/// A query as the gateway issued it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedQuery {
    pub sql: String,
    pub params: Vec<String>,
}

#[derive(Debug, Clone)]
struct Rule {
    needle: String,
    rows: Vec<TextRow>,
}

#[derive(Debug, Default)]
pub struct FakeSourceDb {
    rules: Vec<Rule>,
    queries: Mutex<Vec<RecordedQuery>>,
}

/// Row of non-null text columns
pub fn row(columns: &[&str]) -> TextRow {
    columns.iter().map(|c| Some((*c).to_string())).collect()
}

impl FakeSourceDb {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer queries containing `needle` with `rows`
    pub fn on(mut self, needle: &str, rows: Vec<TextRow>) -> Self {
        // Later rules take precedence so fixtures can be overridden.
        self.rules.insert(
            0,
            Rule {
                needle: needle.to_string(),
                rows,
            },
        );
        self
    }

    pub fn queries(&self) -> Vec<RecordedQuery> {
        self.queries.lock().clone()
    }
}

#[async_trait]
impl SourceDatabase for FakeSourceDb {
    async fn query(&self, sql: &str, params: &[String]) -> Result<Vec<TextRow>, GatewayError> {
        self.queries.lock().push(RecordedQuery {
            sql: sql.to_string(),
            params: params.to_vec(),
        });
        Ok(self
            .rules
            .iter()
            .find(|rule| sql.contains(&rule.needle))
            .map(|rule| rule.rows.clone())
            .unwrap_or_default())
    }
}
