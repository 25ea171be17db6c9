use crate::error::SandboxError;
use crate::normalize::RowSet;
use serde_json::Value;

/// Render a RowSet as TOON: a `types` list followed by `rows` keyed by
/// column name.
pub fn to_toon(result: &RowSet) -> Result<String, SandboxError> {
    let types = Value::Array(
        result
            .columns
            .iter()
            .map(|c| Value::String(c.type_name.clone()))
            .collect(),
    );

    // toon_format cannot infer a header from an empty array, so the rows
    // header of a zero-row result is written by hand.
    if result.rows.is_empty() && !result.columns.is_empty() {
        let mut root = serde_json::Map::new();
        root.insert("types".to_string(), types);
        let head = encode(&Value::Object(root))?;
        let col_names = result
            .columns
            .iter()
            .map(|c| c.name.as_str())
            .collect::<Vec<_>>()
            .join(",");
        return Ok(format!("{}\nrows[0]{{{}}}:\n", head.trim_end(), col_names));
    }

    let mut root = serde_json::Map::new();
    root.insert("types".to_string(), types);
    root.insert("rows".to_string(), Value::Array(result.keyed_rows()));
    encode(&Value::Object(root))
}

/// Render a RowSet as pretty JSON with positional rows.
pub fn to_json(result: &RowSet) -> Result<String, SandboxError> {
    serde_json::to_string_pretty(result).map_err(|e| SandboxError::Format {
        message: e.to_string(),
    })
}

fn encode(value: &Value) -> Result<String, SandboxError> {
    toon_format::encode_default(value).map_err(|e| SandboxError::Format {
        message: e.to_string(),
    })
}
