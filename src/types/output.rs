use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Column metadata reported alongside a query result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldDescription {
    pub name: String,
    #[serde(rename = "dataTypeID")]
    pub data_type_id: u32,
    pub data_type_name: String,
}

impl FieldDescription {
    pub fn new(name: impl Into<String>, data_type_id: u32, data_type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type_id,
            data_type_name: data_type_name.into(),
        }
    }
}

/// Driver-agnostic result of a single query.
/// Rows are JSON objects keyed by column name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryOutput {
    pub rows: Vec<Map<String, Value>>,
    /// Rows returned, or rows affected for statements without a result set
    pub row_count: Option<u64>,
    /// Command tag, e.g. `SELECT` or `INSERT`
    pub command: String,
    pub fields: Vec<FieldDescription>,
}

impl QueryOutput {
    pub fn new(
        command: impl Into<String>,
        fields: Vec<FieldDescription>,
        rows: Vec<Map<String, Value>>,
        row_count: Option<u64>,
    ) -> Self {
        Self {
            rows,
            row_count,
            command: command.into(),
            fields,
        }
    }

    pub fn empty(command: impl Into<String>) -> Self {
        Self {
            rows: Vec::new(),
            row_count: None,
            command: command.into(),
            fields: Vec::new(),
        }
    }

    /// Returns the number of rows in this result.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Returns true if this result contains no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> QueryOutput {
        let mut row = Map::new();
        row.insert("id".to_string(), json!(1));
        QueryOutput::new(
            "SELECT",
            vec![FieldDescription::new("id", 23, "int4")],
            vec![row],
            Some(1),
        )
    }

    #[test]
    fn test_serialized_shape() {
        let value = serde_json::to_value(sample()).unwrap();
        assert_eq!(
            value,
            json!({
                "rows": [{"id": 1}],
                "rowCount": 1,
                "command": "SELECT",
                "fields": [{"name": "id", "dataTypeID": 23, "dataTypeName": "int4"}],
            })
        );
    }

    #[test]
    fn test_reparsed_output_keeps_row_count_and_command() {
        let output = sample();
        let text = serde_json::to_string(&output).unwrap();
        let parsed: QueryOutput = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed.row_count, output.row_count);
        assert_eq!(parsed.command, output.command);
        assert_eq!(parsed.len(), 1);
    }

    #[test]
    fn test_empty() {
        let output = QueryOutput::empty("CREATE");
        assert!(output.is_empty());
        assert_eq!(output.row_count, None);
        assert_eq!(serde_json::to_value(&output).unwrap()["rowCount"], json!(null));
    }
}
