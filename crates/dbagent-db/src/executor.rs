//! Statement execution against SQLite.

use std::borrow::Cow;

use async_trait::async_trait;
use dbagent_types::{AgentError, ExecutionResult, OperationKind, Result, Row};
use dbagent_workflow::QueryExecutor;
use serde_json::Value;
use sqlx::sqlite::{SqliteConnection, SqlitePool, SqliteRow};
use sqlx::{Column, ConnectOptions, Executor, Row as _, Statement, TypeInfo, ValueRef};

use crate::db_error;

/// [`QueryExecutor`] over a SQLite pool.
///
/// Read kinds only accept a single `SELECT` or `WITH` statement and run it on
/// a fresh connection with `query_only` set, so a `WITH ... DELETE` is refused
/// by SQLite itself. Write kinds return the affected-row count.
pub struct SqliteExecutor {
    pool: SqlitePool,
}

impl SqliteExecutor {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl QueryExecutor for SqliteExecutor {
    async fn execute(&self, query: &str, kind: OperationKind) -> Result<ExecutionResult> {
        if kind == OperationKind::Unknown {
            return Err(refused("operation kind is UNKNOWN"));
        }
        check_single_statement(query)?;

        if kind.is_read() {
            let keyword = leading_keyword(query)?;
            if !matches!(keyword.as_str(), "SELECT" | "WITH") {
                return Err(refused(&format!(
                    "{kind} expects a SELECT statement, got {keyword}"
                )));
            }
            let mut conn = self.read_only_connection().await?;
            let statement = (&mut conn).prepare(query).await.map_err(read_error)?;
            let column_names: Vec<String> = statement
                .columns()
                .iter()
                .map(|c| c.name().to_string())
                .collect();
            let rows = statement
                .query()
                .fetch_all(&mut conn)
                .await
                .map_err(read_error)?;
            let rows = rows.iter().map(to_json_row).collect();
            tracing::debug!(kind = %kind, "Read statement executed");
            return Ok(ExecutionResult::read(kind, column_names, rows));
        }

        let done = sqlx::query(query)
            .execute(&self.pool)
            .await
            .map_err(db_error)?;
        tracing::debug!(kind = %kind, affected = done.rows_affected(), "Write statement executed");
        Ok(ExecutionResult::write(kind, done.rows_affected()))
    }
}

impl SqliteExecutor {
    /// A connection outside the pool that SQLite keeps from writing. Dropping
    /// it closes it, so the pool never sees the pragma.
    async fn read_only_connection(&self) -> Result<SqliteConnection> {
        let options = (*self.pool.connect_options())
            .clone()
            .pragma("query_only", Cow::Borrowed("ON"));
        options.connect().await.map_err(db_error)
    }
}

fn read_error(e: sqlx::Error) -> AgentError {
    match &e {
        sqlx::Error::Database(_) if e.to_string().contains("readonly") => {
            refused("read statement attempted to modify data")
        }
        _ => db_error(e),
    }
}

fn refused(message: &str) -> AgentError {
    AgentError::CapabilityError {
        collaborator: "executor".into(),
        message: format!("refused statement: {message}"),
    }
}

/// First SQL keyword, upper-cased, after leading whitespace and comments.
fn leading_keyword(query: &str) -> Result<String> {
    let re = regex::Regex::new(r"^(?:\s+|--[^\n]*(?:\n|$)|/\*(?s:.*?)\*/)*([A-Za-z]+)")
        .map_err(|e| AgentError::Other(e.to_string()))?;
    re.captures(query)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_ascii_uppercase())
        .ok_or_else(|| refused("no SQL keyword found"))
}

/// Reject input that holds more than one statement. Semicolons inside
/// quoted strings, identifiers and comments do not count; one trailing
/// semicolon, optionally followed by comments, is fine.
fn check_single_statement(query: &str) -> Result<()> {
    let mut chars = query.chars().peekable();
    let mut quote: Option<char> = None;
    let mut seen_terminator = false;
    while let Some(ch) = chars.next() {
        if let Some(q) = quote {
            if ch == q {
                quote = None;
            }
            continue;
        }
        match ch {
            '-' if chars.peek() == Some(&'-') => {
                for c in chars.by_ref() {
                    if c == '\n' {
                        break;
                    }
                }
            }
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                let mut prev = '\0';
                for c in chars.by_ref() {
                    if prev == '*' && c == '/' {
                        break;
                    }
                    prev = c;
                }
            }
            c if c.is_whitespace() => {}
            _ if seen_terminator => return Err(refused("multiple statements")),
            '\'' | '"' | '`' => quote = Some(ch),
            ';' => seen_terminator = true,
            _ => {}
        }
    }
    Ok(())
}

fn to_json_row(row: &SqliteRow) -> Row {
    let mut out = Row::new();
    for (index, column) in row.columns().iter().enumerate() {
        out.insert(column.name().to_string(), cell_value(row, index));
    }
    out
}

/// Decode by the storage class of the value itself, since expression
/// columns carry no declared type.
fn cell_value(row: &SqliteRow, index: usize) -> Value {
    let type_name = match row.try_get_raw(index) {
        Ok(raw) if raw.is_null() => return Value::Null,
        Ok(raw) => raw.type_info().name().to_ascii_uppercase(),
        Err(_) => return Value::Null,
    };
    match type_name.as_str() {
        "INTEGER" | "INT" | "INT8" | "BIGINT" | "BOOLEAN" => row
            .try_get_unchecked::<i64, _>(index)
            .map(Value::from)
            .unwrap_or(Value::Null),
        "REAL" | "FLOAT" | "DOUBLE" | "NUMERIC" => row
            .try_get_unchecked::<f64, _>(index)
            .map(Value::from)
            .unwrap_or(Value::Null),
        "BLOB" => row
            .try_get_unchecked::<Vec<u8>, _>(index)
            .map(|bytes| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
            .unwrap_or(Value::Null),
        _ => row
            .try_get_unchecked::<String, _>(index)
            .map(Value::String)
            .unwrap_or(Value::Null),
    }
}
