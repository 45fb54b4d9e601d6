use serde::{Deserialize, Serialize};

use super::SqlValue;

/// One query of a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuerySpec {
    pub query: String,
    /// `None` when the caller sent `null` or left the field out, which is not
    /// the same thing as an empty list.
    #[serde(default)]
    pub params: Option<Vec<SqlValue>>,
}

impl QuerySpec {
    pub fn new(query: impl Into<String>, params: Vec<SqlValue>) -> Self {
        Self {
            query: query.into(),
            params: Some(params),
        }
    }

    /// A query sent without any parameter list.
    pub fn without_params(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            params: None,
        }
    }
}

/// The input of one probe invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchRequest {
    pub connstr: String,
    #[serde(default)]
    pub queries: Vec<QuerySpec>,
}

impl BatchRequest {
    pub fn new(connstr: impl Into<String>, queries: Vec<QuerySpec>) -> Self {
        Self {
            connstr: connstr.into(),
            queries,
        }
    }
}
