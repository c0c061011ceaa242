/// Query Execution Module
///
/// Runs a SQL statement and materializes every row eagerly, together with
/// the column names, into a `QueryResult`. Values are decoded from the text
/// protocol using the column types reported when the statement is prepared.

use postgres::types::Type;
use postgres::{Client, SimpleQueryMessage};
use serde::Serialize;
use std::fmt;
use tracing::debug;

use super::connection::{release, try_connect, ConnectFailure, Credentials};
use crate::core::{HospdbError, Result};

/// A single decoded column value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    /// Arbitrary-precision NUMERIC kept in its exact textual form
    Numeric(String),
    Text(String),
}

impl Value {
    /// Decodes a text-protocol value of the given column type.
    ///
    /// Values that do not parse as their declared type are kept as text.
    pub fn decode(raw: Option<&str>, ty: &Type) -> Value {
        let Some(text) = raw else {
            return Value::Null;
        };

        if *ty == Type::BOOL {
            match text {
                "t" => Value::Bool(true),
                "f" => Value::Bool(false),
                _ => Value::Text(text.to_string()),
            }
        } else if *ty == Type::INT2 || *ty == Type::INT4 || *ty == Type::INT8 || *ty == Type::OID {
            text.parse()
                .map(Value::Int)
                .unwrap_or_else(|_| Value::Text(text.to_string()))
        } else if *ty == Type::FLOAT4 || *ty == Type::FLOAT8 {
            text.parse()
                .map(Value::Float)
                .unwrap_or_else(|_| Value::Text(text.to_string()))
        } else if *ty == Type::NUMERIC {
            Value::Numeric(text.to_string())
        } else {
            Value::Text(text.to_string())
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Numeric(s) | Value::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", x),
            Value::Numeric(s) | Value::Text(s) => write!(f, "{}", s),
        }
    }
}

/// Where the column names of a `QueryResult` come from.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ColumnSpec {
    /// Use the names reported by the query's result descriptor
    #[default]
    FromQuery,
    /// Use the caller's names; must match the query's width
    Explicit(Vec<String>),
    /// No names: columns are labelled by position (`0`, `1`, ...)
    Positional,
}

impl ColumnSpec {
    pub fn explicit<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ColumnSpec::Explicit(names.into_iter().map(Into::into).collect())
    }

    /// Produces the final column names for a result `from_query` wide.
    pub fn resolve(self, from_query: Vec<String>) -> Result<Vec<String>> {
        match self {
            ColumnSpec::FromQuery => Ok(from_query),
            ColumnSpec::Explicit(names) => {
                if names.len() != from_query.len() {
                    return Err(HospdbError::Query(format!(
                        "{} column names supplied for a result with {} columns",
                        names.len(),
                        from_query.len()
                    )));
                }
                Ok(names)
            }
            ColumnSpec::Positional => Ok((0..from_query.len()).map(|i| i.to_string()).collect()),
        }
    }
}

/// Rows and column names of a query. Every row is exactly as wide as `columns`.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct QueryResult {
    /// Column names from the query result
    pub columns: Vec<String>,
    /// Rows of decoded values
    pub rows: Vec<Vec<Value>>,
    /// Number of rows returned
    pub row_count: usize,
}

impl QueryResult {
    /// Creates a new QueryResult, rejecting rows that do not match the column count.
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Result<Self> {
        if let Some((index, row)) = rows.iter().enumerate().find(|(_, r)| r.len() != columns.len()) {
            return Err(HospdbError::Query(format!(
                "row {} has {} values but the result has {} columns",
                index,
                row.len(),
                columns.len()
            )));
        }
        let row_count = rows.len();
        Ok(QueryResult {
            columns,
            rows,
            row_count,
        })
    }

    /// A result with no rows and no columns.
    pub fn empty() -> Self {
        QueryResult::default()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Value at `row` in the column called `name`.
    pub fn get(&self, row: usize, name: &str) -> Option<&Value> {
        let index = self.column_index(name)?;
        self.rows.get(row).map(|r| &r[index])
    }

    /// All values of one column, in row order.
    pub fn column(&self, name: &str) -> Option<Vec<&Value>> {
        let index = self.column_index(name)?;
        Some(self.rows.iter().map(|r| &r[index]).collect())
    }

    /// Rows as JSON objects keyed by column name.
    pub fn to_records(&self) -> Vec<serde_json::Map<String, serde_json::Value>> {
        self.rows
            .iter()
            .map(|row| {
                self.columns
                    .iter()
                    .zip(row)
                    .map(|(name, value)| {
                        let json = serde_json::to_value(value).unwrap_or(serde_json::Value::Null);
                        (name.clone(), json)
                    })
                    .collect()
            })
            .collect()
    }
}

/// Outcome of `query`: either rows, or the reason no query was attempted.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryOutcome {
    Rows(QueryResult),
    ConnectionFailed(ConnectFailure),
}

impl QueryOutcome {
    pub fn rows(&self) -> Option<&QueryResult> {
        match self {
            QueryOutcome::Rows(result) => Some(result),
            QueryOutcome::ConnectionFailed(_) => None,
        }
    }

    pub fn is_connection_failure(&self) -> bool {
        matches!(self, QueryOutcome::ConnectionFailed(_))
    }

    /// The rows, or an empty result when the connection failed.
    ///
    /// Callers using this cannot tell "no rows matched" from "could not connect".
    pub fn into_result_or_empty(self) -> QueryResult {
        match self {
            QueryOutcome::Rows(result) => result,
            QueryOutcome::ConnectionFailed(_) => QueryResult::empty(),
        }
    }

    /// The rows, or the connection failure as an error.
    pub fn into_result(self) -> Result<QueryResult> {
        match self {
            QueryOutcome::Rows(result) => Ok(result),
            QueryOutcome::ConnectionFailed(failure) => Err(HospdbError::Connection(failure)),
        }
    }
}

/// Query execution over a borrowed client
pub struct QueryExecutor<'a> {
    client: &'a mut Client,
}

impl<'a> QueryExecutor<'a> {
    pub fn new(client: &'a mut Client) -> Self {
        QueryExecutor { client }
    }

    /// Executes a single SQL statement and fetches all of its rows.
    ///
    /// Takes two round trips: one to prepare the statement for its column
    /// names and types, one to run it over the simple query protocol.
    ///
    /// # Errors
    ///
    /// `HospdbError::Database` for SQL faults (including multi-statement
    /// strings, which cannot be prepared), `HospdbError::Query` if an
    /// explicit column list does not match the result width.
    pub fn execute(&mut self, sql: &str, columns: ColumnSpec) -> Result<QueryResult> {
        let statement = self.client.prepare(sql)?;
        let types: Vec<Type> = statement.columns().iter().map(|c| c.type_().clone()).collect();
        let names: Vec<String> = statement.columns().iter().map(|c| c.name().to_string()).collect();
        // Checked before the statement runs so a rejected call changes nothing.
        let names = columns.resolve(names)?;

        let mut rows = Vec::new();
        for message in self.client.simple_query(sql)? {
            if let SimpleQueryMessage::Row(row) = message {
                if row.len() != types.len() {
                    return Err(HospdbError::Query(format!(
                        "server returned {} values for a {}-column statement",
                        row.len(),
                        types.len()
                    )));
                }
                let mut values = Vec::with_capacity(types.len());
                for (i, ty) in types.iter().enumerate() {
                    values.push(Value::decode(row.try_get(i)?, ty));
                }
                rows.push(values);
            }
        }

        debug!(rows = rows.len(), columns = names.len(), "query fetched");
        QueryResult::new(names, rows)
    }
}

/// Convenience function to run a query on an already-open client
pub fn execute_query_on_client(client: &mut Client, sql: &str) -> Result<QueryResult> {
    QueryExecutor::new(client).execute(sql, ColumnSpec::FromQuery)
}

/// Opens a connection to `database`, runs `sql`, and closes the connection.
///
/// `database` overrides `credentials.database`. A failed connection is
/// reported as `QueryOutcome::ConnectionFailed`; SQL faults propagate as
/// errors. The connection is released on every path.
///
/// Besides the connection handshake this costs two round trips (prepare,
/// then execute), and `sql` must be a single statement.
pub fn query(database: &str, credentials: &Credentials, sql: &str, columns: ColumnSpec) -> Result<QueryOutcome> {
    let mut session = match try_connect(&credentials.with_database(database)) {
        Ok(session) => session,
        Err(failure) => return Ok(QueryOutcome::ConnectionFailed(failure)),
    };

    let result = QueryExecutor::new(session.client()).execute(sql, columns)?;
    release(session);
    Ok(QueryOutcome::Rows(result))
}

/// Represents different SQL statement types for dispatch
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StatementType {
    Select,
    /// Common table expression; may or may not return rows
    With,
    Insert,
    Update,
    Delete,
    Create,
    Drop,
    Alter,
    Truncate,
    /// BEGIN/COMMIT/ROLLBACK transaction commands
    Transaction,
    Other,
}

impl StatementType {
    /// Determines the statement type from its leading keyword
    pub fn from_sql(sql: &str) -> Self {
        let keyword = sql
            .trim_start()
            .split(|c: char| c.is_whitespace() || c == '(' || c == ';')
            .next()
            .unwrap_or("")
            .to_uppercase();

        match keyword.as_str() {
            "SELECT" | "VALUES" | "TABLE" | "SHOW" | "EXPLAIN" => StatementType::Select,
            "WITH" => StatementType::With,
            "INSERT" => StatementType::Insert,
            "UPDATE" => StatementType::Update,
            "DELETE" => StatementType::Delete,
            "CREATE" => StatementType::Create,
            "DROP" => StatementType::Drop,
            "ALTER" => StatementType::Alter,
            "TRUNCATE" => StatementType::Truncate,
            "BEGIN" | "START" | "COMMIT" | "END" | "ROLLBACK" => StatementType::Transaction,
            _ => StatementType::Other,
        }
    }

    /// Whether the statement is expected to produce a result set.
    pub fn returns_rows(&self) -> bool {
        matches!(self, StatementType::Select | StatementType::With)
    }
}
