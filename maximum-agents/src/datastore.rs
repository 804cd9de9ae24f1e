//! Storage collaborator interface.
//!
//! A [`DataStore`] is a CRUD and SQL surface keyed by database identifier and
//! table name. Every operation may carry an [`AccessControl`]; policy
//! violations are rejected before anything runs. [`SqlQueryTool`] exposes
//! one database to the execution engine as a tool.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::{Error, Result, ToolError};
use crate::schema::schema_value;
use crate::tool::{Tool, ToolResult};

/// One table row, column name to value.
pub type Row = Map<String, Value>;

/// Statement keywords rejected under read-only access.
pub const WRITE_KEYWORDS: [&str; 6] = ["INSERT", "UPDATE", "DELETE", "DROP", "CREATE", "ALTER"];

/// One column of a table schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnInfo {
    /// Column name.
    pub column_name: String,
    /// Backend-specific type name.
    pub data_type: String,
}

/// Access policy applied to storage operations.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccessControl {
    /// Reject every mutating statement and write.
    pub read_only: bool,
    /// Tables that may not be touched at all.
    pub denied_tables: Vec<String>,
    /// Maximum number of rows a query returns.
    pub row_limit: Option<usize>,
}

impl AccessControl {
    /// A read-only policy.
    #[must_use]
    pub fn read_only() -> Self {
        Self {
            read_only: true,
            ..Self::default()
        }
    }

    /// Deny the given tables.
    #[must_use]
    pub fn with_denied_tables<I, S>(mut self, tables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.denied_tables = tables.into_iter().map(Into::into).collect();
        self
    }

    /// Cap query results.
    #[must_use]
    pub const fn with_row_limit(mut self, limit: usize) -> Self {
        self.row_limit = Some(limit);
        self
    }

    /// Check a SQL statement against the policy.
    ///
    /// Keywords and table names are matched as case-insensitive substrings.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AccessDenied`] for a mutating statement under
    /// read-only access, or a statement mentioning a denied table.
    pub fn check_query(&self, sql: &str) -> Result<()> {
        let upper = sql.to_uppercase();
        if self.read_only && WRITE_KEYWORDS.iter().any(|kw| upper.contains(kw)) {
            return Err(Error::access_denied(
                "Write operations not allowed with read-only access control",
            ));
        }
        match self
            .denied_tables
            .iter()
            .find(|table| upper.contains(&table.to_uppercase()))
        {
            Some(table) => Err(Error::access_denied(format!("Access denied to table: {table}"))),
            None => Ok(()),
        }
    }

    /// Check a write to `table` against the policy.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AccessDenied`] under read-only access or for a denied
    /// table.
    pub fn check_write(&self, table: &str) -> Result<()> {
        if self.read_only {
            return Err(Error::access_denied(
                "Write operations not allowed with read-only access control",
            ));
        }
        if self.denied_tables.iter().any(|t| t.eq_ignore_ascii_case(table)) {
            return Err(Error::access_denied(format!("Access denied to table: {table}")));
        }
        Ok(())
    }

    /// Truncate query results to the row limit.
    #[must_use]
    pub fn limit_rows(&self, mut rows: Vec<Row>) -> Vec<Row> {
        if let Some(limit) = self.row_limit {
            rows.truncate(limit);
        }
        rows
    }
}

/// CRUD and SQL surface over named databases.
///
/// Implementations must apply the given [`AccessControl`] before touching
/// storage, so a rejected call has no effect.
#[async_trait]
pub trait DataStore: Send + Sync {
    /// Run a SQL statement, returning its rows.
    async fn sql_engine(
        &self,
        database_id: &str,
        sql_query: &str,
        params: Option<Row>,
        access: Option<&AccessControl>,
    ) -> Result<Vec<Row>>;

    /// Check whether a table exists.
    async fn table_exists(&self, database_id: &str, table_name: &str) -> Result<bool>;

    /// Columns of a table, in declaration order.
    async fn get_table_schema(&self, database_id: &str, table_name: &str)
    -> Result<Vec<ColumnInfo>>;

    /// Tables of a database.
    async fn list_tables(&self, database_id: &str) -> Result<Vec<String>>;

    /// Insert one row into an existing table.
    async fn add_row(
        &self,
        database_id: &str,
        table_name: &str,
        row: Row,
        access: Option<&AccessControl>,
    ) -> Result<()>;

    /// Update the row whose `id` column equals `row_id`.
    ///
    /// Returns `false` if no such row exists.
    async fn update_row_by_id(
        &self,
        database_id: &str,
        table_name: &str,
        row_id: &str,
        update: Row,
        access: Option<&AccessControl>,
    ) -> Result<bool>;

    /// Replace a table's contents. Empty data is rejected.
    async fn overwrite_table(
        &self,
        database_id: &str,
        table_name: &str,
        data: Vec<Row>,
        access: Option<&AccessControl>,
    ) -> Result<()>;

    /// Append rows to an existing table. Empty data is a no-op.
    async fn append_data(
        &self,
        database_id: &str,
        table_name: &str,
        data: Vec<Row>,
        access: Option<&AccessControl>,
    ) -> Result<()>;
}

/// Arguments of [`SqlQueryTool`].
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct SqlQueryArgs {
    /// The SQL statement to run.
    pub sql_query: String,
    /// Optional positional parameters, by name.
    #[serde(default)]
    pub params: Option<Row>,
}

/// Exposes SQL queries over one database as a tool.
pub struct SqlQueryTool {
    store: Arc<dyn DataStore>,
    database_id: String,
    access: AccessControl,
}

impl fmt::Debug for SqlQueryTool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqlQueryTool")
            .field("database_id", &self.database_id)
            .field("access", &self.access)
            .finish_non_exhaustive()
    }
}

impl SqlQueryTool {
    /// Create the tool for `database_id` under `access`.
    #[must_use]
    pub fn new(
        store: Arc<dyn DataStore>,
        database_id: impl Into<String>,
        access: AccessControl,
    ) -> Self {
        Self {
            store,
            database_id: database_id.into(),
            access,
        }
    }

    /// The access policy.
    #[must_use]
    pub const fn access(&self) -> &AccessControl {
        &self.access
    }
}

#[async_trait]
impl Tool for SqlQueryTool {
    type Args = SqlQueryArgs;
    type Output = Vec<Row>;

    fn name(&self) -> &str {
        "sql_engine"
    }

    fn description(&self) -> String {
        format!(
            "Run a SQL query against database '{}' and return the rows.",
            self.database_id
        )
    }

    fn parameters_schema(&self) -> Value {
        schema_value::<SqlQueryArgs>()
    }

    async fn call(&self, args: SqlQueryArgs) -> ToolResult<Vec<Row>> {
        self.access.check_query(&args.sql_query).map_err(to_tool_error)?;
        debug!(database = %self.database_id, "Running SQL query");

        let rows = self
            .store
            .sql_engine(&self.database_id, &args.sql_query, args.params, Some(&self.access))
            .await
            .map_err(to_tool_error)?;
        Ok(self.access.limit_rows(rows))
    }
}

fn to_tool_error(err: Error) -> ToolError {
    match err {
        Error::AccessDenied(msg) => ToolError::forbidden(msg),
        other => ToolError::execution(other.to_string()),
    }
}
