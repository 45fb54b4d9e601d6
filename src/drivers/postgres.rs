use std::error::Error as StdError;
use std::fmt::Write as _;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::BytesMut;
use serde_json::{Map, Value};
use tokio::sync::OnceCell;
use tokio_postgres::types::{to_sql_checked, Format, IsNull, ToSql, Type};
use tokio_postgres::{Client, Config, NoTls, Row, SimpleQueryMessage, SimpleQueryRow};

use super::pg_cell::JsonCell;
use crate::error::{ProbeError, Result};
use crate::traits::{Connector, DatabaseDriver};
use crate::types::{FieldDescription, QueryOutput, SqlValue};

/// Driver label reported in every response.
pub const DRIVER_NAME: &str = "tokio-postgres@0.7";

/// Builds [`PostgresDriver`] handles.
#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresConnector;

impl Connector for PostgresConnector {
    fn driver_name(&self) -> &str {
        DRIVER_NAME
    }

    fn connect(&self, connection_string: &str) -> Result<Arc<dyn DatabaseDriver>> {
        Ok(Arc::new(PostgresDriver::new(connection_string)?))
    }
}

/// PostgreSQL driver implementation using tokio-postgres.
/// The connection is opened on the first query and reused afterwards.
pub struct PostgresDriver {
    config: Config,
    client: OnceCell<Client>,
}

impl PostgresDriver {
    /// Parse a connection string (URL or key/value form). No I/O happens here.
    pub fn new(connection_string: &str) -> Result<Self> {
        let config = connection_string
            .parse::<Config>()
            .map_err(|e| ProbeError::InvalidConnectionString(Box::new(e)))?;

        if config.get_hosts().is_empty() {
            return Err(ProbeError::InvalidConnectionString(
                "connection string does not name a host".into(),
            ));
        }

        Ok(Self {
            config,
            client: OnceCell::new(),
        })
    }

    async fn client(&self) -> Result<&Client> {
        self.client
            .get_or_try_init(|| async {
                let (client, connection) = self
                    .config
                    .connect(NoTls)
                    .await
                    .map_err(|e| ProbeError::ConnectionFailed(Box::new(e)))?;

                // Spawn the connection handler
                tokio::spawn(async move {
                    if let Err(e) = connection.await {
                        tracing::error!(error = %e, "postgres connection error");
                    }
                });

                Ok::<_, ProbeError>(client)
            })
            .await
    }
}

#[async_trait]
impl DatabaseDriver for PostgresDriver {
    /// A missing parameter list goes through the simple query protocol, which
    /// accepts several `;`-separated statements and returns text values. A
    /// present list, even an empty one, is prepared and bound.
    async fn query(&self, sql: &str, params: Option<&[SqlValue]>) -> Result<QueryOutput> {
        let client = self.client().await?;
        match params {
            None => simple_query(client, sql).await,
            Some(params) => extended_query(client, sql, params).await,
        }
    }
}

async fn extended_query(client: &Client, sql: &str, params: &[SqlValue]) -> Result<QueryOutput> {
    let params: Vec<TextParam> = params.iter().map(TextParam::from).collect();
    let param_refs: Vec<&(dyn ToSql + Sync)> = params
        .iter()
        .map(|p| p as &(dyn ToSql + Sync))
        .collect();

    let statement = client.prepare(sql).await.map_err(query_failed)?;
    let command = command_tag(sql);
    let fields: Vec<FieldDescription> = statement
        .columns()
        .iter()
        .map(|c| FieldDescription::new(c.name(), c.type_().oid(), c.type_().name()))
        .collect();

    if fields.is_empty() {
        let affected = client
            .execute(&statement, &param_refs)
            .await
            .map_err(query_failed)?;
        return Ok(QueryOutput::new(command, fields, Vec::new(), Some(affected)));
    }

    let rows = client
        .query(&statement, &param_refs)
        .await
        .map_err(query_failed)?;
    let rows = rows.iter().map(row_to_json).collect::<Result<Vec<_>>>()?;
    let row_count = u64::try_from(rows.len()).ok();

    Ok(QueryOutput::new(command, fields, rows, row_count))
}

/// Runs `sql` unprepared and reports the result of its last statement.
/// Values arrive as the server's text output, so fields are typed `unknown`.
async fn simple_query(client: &Client, sql: &str) -> Result<QueryOutput> {
    let messages = client.simple_query(sql).await.map_err(query_failed)?;
    let statements = split_statements(sql);

    let mut results = Vec::new();
    let mut fields = Vec::new();
    let mut rows = Vec::new();
    for message in messages {
        match message {
            SimpleQueryMessage::Row(row) => {
                if fields.is_empty() {
                    fields = row.columns().iter().map(|c| untyped_field(c.name())).collect();
                }
                rows.push(simple_row_to_json(&row)?);
            }
            SimpleQueryMessage::CommandComplete(count) => {
                let command = statements
                    .get(results.len())
                    .map_or_else(|| command_tag(sql), |statement| command_tag(statement));
                results.push(QueryOutput::new(
                    command,
                    std::mem::take(&mut fields),
                    std::mem::take(&mut rows),
                    Some(count),
                ));
            }
            _ => {}
        }
    }

    Ok(results
        .pop()
        .unwrap_or_else(|| QueryOutput::empty(command_tag(sql))))
}

fn untyped_field(name: &str) -> FieldDescription {
    FieldDescription::new(name, Type::UNKNOWN.oid(), Type::UNKNOWN.name())
}

fn simple_row_to_json(row: &SimpleQueryRow) -> Result<Map<String, Value>> {
    row.columns()
        .iter()
        .enumerate()
        .map(|(i, col)| {
            let text = row.try_get(i).map_err(query_failed)?;
            let value = text.map_or(Value::Null, |t| Value::String(t.to_string()));
            Ok((col.name().to_string(), value))
        })
        .collect()
}

fn query_failed(e: tokio_postgres::Error) -> ProbeError {
    ProbeError::QueryFailed(Box::new(e))
}

/// Command tag of a single statement, upper-cased (`select 1` -> `SELECT`).
/// For `WITH ...` it is the verb of the main statement after the CTE list.
pub fn command_tag(sql: &str) -> String {
    let words = top_level_words(sql);
    let Some(first) = words.first() else {
        return String::new();
    };
    if first != "WITH" {
        return first.clone();
    }
    words
        .iter()
        .skip(1)
        .find(|w| matches!(w.as_str(), "SELECT" | "INSERT" | "UPDATE" | "DELETE" | "MERGE"))
        .unwrap_or(first)
        .clone()
}

/// Upper-cased words of the first statement that sit outside parentheses and
/// quotes.
fn top_level_words(sql: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut word = String::new();
    let mut depth = 0_usize;
    let mut quote: Option<char> = None;

    for c in sql.chars() {
        if let Some(q) = quote {
            if c == q {
                quote = None;
            }
            continue;
        }
        if depth == 0 && (c.is_alphanumeric() || c == '_') {
            word.push(c.to_ascii_uppercase());
            continue;
        }
        if !word.is_empty() {
            words.push(std::mem::take(&mut word));
        }
        match c {
            '\'' | '"' => quote = Some(c),
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            ';' if depth == 0 => break,
            _ => {}
        }
    }
    if !word.is_empty() {
        words.push(word);
    }
    words
}

/// Splits a query string at `;` outside quotes, dropping empty statements.
fn split_statements(sql: &str) -> Vec<&str> {
    let mut statements = Vec::new();
    let mut start = 0;
    let mut quote: Option<char> = None;

    for (i, c) in sql.char_indices() {
        match (quote, c) {
            (Some(q), _) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '\'' | '"') => quote = Some(c),
            (None, ';') => {
                statements.push(&sql[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    statements.push(&sql[start..]);
    statements
        .into_iter()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}

/// A parameter sent in text format, leaving type inference to the server.
#[derive(Debug)]
struct TextParam(Option<String>);

impl From<&SqlValue> for TextParam {
    fn from(value: &SqlValue) -> Self {
        Self(encode_text(value))
    }
}

impl ToSql for TextParam {
    fn to_sql(
        &self,
        _ty: &Type,
        out: &mut BytesMut,
    ) -> std::result::Result<IsNull, Box<dyn StdError + Sync + Send>> {
        match &self.0 {
            Some(text) => {
                out.extend_from_slice(text.as_bytes());
                Ok(IsNull::No)
            }
            None => Ok(IsNull::Yes),
        }
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }

    fn encode_format(&self, _ty: &Type) -> Format {
        Format::Text
    }

    to_sql_checked!();
}

/// Text representation of a parameter; `None` is SQL NULL.
fn encode_text(value: &SqlValue) -> Option<String> {
    match value {
        SqlValue::Null => None,
        SqlValue::Bool(b) => Some(b.to_string()),
        SqlValue::Int64(i) => Some(i.to_string()),
        SqlValue::Float64(f) => Some(f.to_string()),
        SqlValue::Text(s) => Some(s.clone()),
        SqlValue::Json(Value::Array(items)) => Some(array_literal(items)),
        SqlValue::Json(other) => Some(other.to_string()),
    }
}

/// Renders a JSON array as a Postgres array literal, e.g. `{1,"a b",NULL}`.
fn array_literal(items: &[Value]) -> String {
    let mut out = String::from("{");
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        match item {
            Value::Null => out.push_str("NULL"),
            Value::Array(nested) => out.push_str(&array_literal(nested)),
            Value::String(s) => push_quoted(&mut out, s),
            Value::Object(_) => push_quoted(&mut out, &item.to_string()),
            Value::Bool(_) | Value::Number(_) => {
                let _ = write!(out, "{item}");
            }
        }
    }
    out.push('}');
    out
}

fn push_quoted(out: &mut String, s: &str) {
    out.push('"');
    for c in s.chars() {
        if c == '"' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
}

fn row_to_json(row: &Row) -> Result<Map<String, Value>> {
    row.columns()
        .iter()
        .enumerate()
        .map(|(i, col)| {
            let cell = row.try_get::<_, Option<JsonCell>>(i).map_err(query_failed)?;
            Ok((col.name().to_string(), JsonCell::into_value(cell)))
        })
        .collect()
}
