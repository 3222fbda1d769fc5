// Query Execution Engine
// Status transitions, truncation, schema/field extraction and error classification
// shared by every backend

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tracing::Instrument;
use uuid::Uuid;

use crate::bolt::BoltValue;
use crate::db::drivers::postgres::PgValue;
use crate::db::record::{Fields, Record};
use crate::db::traits::{DatabaseError, RecordNormalizer};
use crate::db::types::{ConnectionConfig, QueryParams, QueryStatus};

/// Receives every status transition of one query, in order.
pub type StatusHook = Arc<dyn Fn(QueryStatus) + Send + Sync>;

/// One query execution request
#[derive(Clone, Default)]
pub struct QueryRequest {
    pub params: QueryParams,
    pub config: ConnectionConfig,
    /// Compute field names from the first row
    pub with_fields: bool,
    pub on_status: Option<StatusHook>,
}

impl std::fmt::Debug for QueryRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryRequest")
            .field("params", &self.params)
            .field("config", &self.config)
            .field("with_fields", &self.with_fields)
            .field("on_status", &self.on_status.is_some())
            .finish()
    }
}

impl QueryRequest {
    pub fn new(params: QueryParams) -> Self {
        Self {
            params,
            ..Self::default()
        }
    }

    pub fn with_config(mut self, config: ConnectionConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_fields(mut self) -> Self {
        self.with_fields = true;
        self
    }

    pub fn on_status(mut self, hook: impl Fn(QueryStatus) + Send + Sync + 'static) -> Self {
        self.on_status = Some(Arc::new(hook));
        self
    }

    fn report(&self, status: QueryStatus) {
        if let Some(hook) = &self.on_status {
            hook(status);
        }
    }
}

/// A backend-native value, as delivered when records are not normalized.
#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    Bolt(BoltValue),
    Postgres(PgValue),
}

impl From<BoltValue> for RawValue {
    fn from(value: BoltValue) -> Self {
        RawValue::Bolt(value)
    }
}

impl From<PgValue> for RawValue {
    fn from(value: PgValue) -> Self {
        RawValue::Postgres(value)
    }
}

/// An unnormalized result row.
#[derive(Debug, Clone, PartialEq)]
pub struct RawRow {
    pub fields: Arc<[String]>,
    pub values: Vec<RawValue>,
}

impl RawRow {
    pub fn get(&self, key: &str) -> Option<&RawValue> {
        self.fields
            .iter()
            .position(|f| f == key)
            .and_then(|i| self.values.get(i))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ResultRows {
    Records(Vec<Record>),
    Raw(Vec<RawRow>),
}

impl ResultRows {
    pub fn len(&self) -> usize {
        match self {
            ResultRows::Records(rows) => rows.len(),
            ResultRows::Raw(rows) => rows.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn records(&self) -> Option<&[Record]> {
        match self {
            ResultRows::Records(rows) => Some(rows),
            ResultRows::Raw(_) => None,
        }
    }
}

/// Column metadata for relational results
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldInfo {
    pub name: String,
    pub type_oid: u32,
    /// Generic type name, e.g. `number` or `string`
    pub data_type: String,
    /// Server type name, e.g. `int4`
    pub native_type: String,
}

/// Structural description of one result
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ResultSchema {
    /// `[label, property, ...]` per label or relationship type seen in the rows
    Graph(Vec<Vec<String>>),
    Relational(Vec<FieldInfo>),
}

/// What a backend hands the engine after a successful execute.
#[derive(Debug, Clone, PartialEq)]
pub struct RawResult<V> {
    pub fields: Arc<[String]>,
    pub rows: Vec<Vec<V>>,
    /// Empty for backends that do not describe their columns
    pub columns: Vec<FieldInfo>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct QuerySuccess {
    pub status: QueryStatus,
    pub records: ResultRows,
    pub fields: Option<Fields>,
    pub schema: Option<ResultSchema>,
}

#[derive(Debug)]
pub struct QueryFailure {
    pub status: QueryStatus,
    pub error: DatabaseError,
}

#[derive(Debug)]
pub enum QueryOutcome {
    /// Blank query text; nothing was executed
    NoQuery,
    Success(QuerySuccess),
    Failure(QueryFailure),
}

impl QueryOutcome {
    pub fn status(&self) -> QueryStatus {
        match self {
            QueryOutcome::NoQuery => QueryStatus::NoQuery,
            QueryOutcome::Success(success) => success.status,
            QueryOutcome::Failure(failure) => failure.status,
        }
    }

    pub fn records(&self) -> Option<&[Record]> {
        match self {
            QueryOutcome::Success(success) => success.records.records(),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&DatabaseError> {
        match self {
            QueryOutcome::Failure(failure) => Some(&failure.error),
            _ => None,
        }
    }

    pub fn into_success(self) -> Option<QuerySuccess> {
        match self {
            QueryOutcome::Success(success) => Some(success),
            _ => None,
        }
    }
}

/// Drive one query through the status state machine.
///
/// `execution` is only polled when the query text is not blank.
pub async fn drive<N, F>(normalizer: &N, request: &QueryRequest, execution: F) -> QueryOutcome
where
    N: RecordNormalizer,
    N::Native: Into<RawValue>,
    F: Future<Output = Result<RawResult<N::Native>, DatabaseError>>,
{
    if request.params.is_blank() {
        request.report(QueryStatus::NoQuery);
        return QueryOutcome::NoQuery;
    }

    let query_id = Uuid::new_v4();
    let span = tracing::debug_span!("query", query_id = %query_id);
    async move {
        request.report(QueryStatus::Running);
        tracing::debug!(access_mode = ?request.config.access_mode, "Query started");
        let start = Instant::now();

        let result = match execution.await {
            Ok(result) => result,
            Err(error) => {
                let status = if error.is_timeout() {
                    QueryStatus::TimedOut
                } else {
                    QueryStatus::Error
                };
                tracing::debug!(status = %status, error = %error, elapsed_ms = start.elapsed().as_millis() as u64, "Query failed");
                request.report(status);
                return QueryOutcome::Failure(QueryFailure { status, error });
            }
        };

        let RawResult {
            fields,
            mut rows,
            columns,
        } = result;
        let row_limit = request.config.row_limit;
        let status = if rows.is_empty() {
            QueryStatus::NoData
        } else if rows.len() > row_limit {
            rows.truncate(row_limit);
            QueryStatus::CompleteTruncated
        } else {
            QueryStatus::Complete
        };

        let raw = RawResult {
            fields,
            rows,
            columns,
        };
        let schema = Some(normalizer.result_schema(&raw));

        let result_fields = request.with_fields.then(|| match raw.rows.first() {
            Some(first) => normalizer
                .to_record(&raw.fields, first)
                .get_fields(request.config.use_node_props_as_fields),
            None => Fields::Keys(Vec::new()),
        });

        let RawResult { fields, rows, .. } = raw;
        let records = if request.config.parse_to_record {
            ResultRows::Records(rows.iter().map(|row| normalizer.to_record(&fields, row)).collect())
        } else {
            ResultRows::Raw(
                rows.into_iter()
                    .map(|values| RawRow {
                        fields: Arc::clone(&fields),
                        values: values.into_iter().map(Into::into).collect(),
                    })
                    .collect(),
            )
        };

        tracing::debug!(
            status = %status,
            rows = records.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Query finished"
        );
        request.report(status);
        QueryOutcome::Success(QuerySuccess {
            status,
            records,
            fields: result_fields,
            schema,
        })
    }
    .instrument(span)
    .await
}
