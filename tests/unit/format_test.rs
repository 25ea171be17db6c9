use sqlsandbox::backend::{CellValue, ColumnMeta, RawResult};
use sqlsandbox::format::{to_json, to_toon};
use sqlsandbox::normalize::{RowSet, normalize};

fn column(name: &str, type_name: &str, type_id: u32) -> ColumnMeta {
    ColumnMeta {
        name: name.to_string(),
        type_id,
        type_name: type_name.to_string(),
    }
}

fn rowset(columns: Vec<ColumnMeta>, rows: Vec<Vec<CellValue>>) -> RowSet {
    normalize(
        RawResult {
            columns,
            rows,
            elapsed_ms: 0,
        },
        4,
        1000,
    )
}

/// Helper: encode to TOON and decode back to serde_json::Value (no type coercion)
fn round_trip(result: &RowSet) -> serde_json::Value {
    let toon = to_toon(result).unwrap();
    toon_format::decode_no_coerce(&toon).unwrap()
}

#[test]
fn test_text_columns_round_trip() {
    let result = rowset(
        vec![column("name", "TEXT", 25), column("email", "VARCHAR", 1043)],
        vec![
            vec![
                CellValue::Text("Alice".to_string()),
                CellValue::Text("alice@co.com".to_string()),
            ],
            vec![
                CellValue::Text("Bob".to_string()),
                CellValue::Text("bob@co.com".to_string()),
            ],
        ],
    );

    let decoded = round_trip(&result);
    let obj = decoded.as_object().expect("output should be a root object");

    let types = obj.get("types").expect("should have 'types' key")
        .as_array().expect("types should be an array");
    assert_eq!(types.len(), 2);
    assert_eq!(types[0], "TEXT");
    assert_eq!(types[1], "VARCHAR");

    let rows = obj.get("rows").expect("should have 'rows' key")
        .as_array().expect("rows should be an array");
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["name"], "Alice");
    assert_eq!(rows[1]["email"], "bob@co.com");
}

#[test]
fn test_zero_row_result() {
    let result = rowset(
        vec![column("id", "INT4", 23), column("name", "TEXT", 25)],
        vec![],
    );

    let toon = to_toon(&result).unwrap();
    assert!(toon.contains("rows[0]{id,name}:"), "missing header in {toon}");

    let decoded = round_trip(&result);
    let obj = decoded.as_object().expect("output should be a root object");
    let types = obj.get("types").expect("should have 'types' key")
        .as_array().expect("types should be an array");
    assert_eq!(types.len(), 2);
    assert_eq!(types[0], "INT4");

    let rows = obj.get("rows").expect("should have 'rows' key")
        .as_array().expect("rows should be an array");
    assert!(rows.is_empty(), "rows should be empty for zero-row result");
}

#[test]
fn test_null_cell_value() {
    let result = rowset(vec![column("val", "INT4", 23)], vec![vec![CellValue::Null]]);

    let decoded = round_trip(&result);
    let rows = decoded["rows"].as_array().expect("rows should be an array");
    assert_eq!(rows.len(), 1);
    assert!(rows[0]["val"].is_null(), "NULL cell should decode as null");
}

#[test]
fn test_scalar_cells_render() {
    let result = rowset(
        vec![
            column("n", "INT8", 20),
            column("ok", "BOOL", 16),
            column("ratio", "FLOAT8", 701),
        ],
        vec![vec![
            CellValue::Integer(42),
            CellValue::Boolean(true),
            CellValue::Float(0.5),
        ]],
    );

    let toon = to_toon(&result).unwrap();
    assert!(toon.contains("42"), "integer missing in {toon}");
    assert!(toon.contains("true"), "boolean missing in {toon}");
    assert!(toon.contains("0.5"), "float missing in {toon}");
}

#[test]
fn test_json_output_is_positional() {
    let result = rowset(
        vec![column("id", "INT4", 23), column("id", "TEXT", 25)],
        vec![vec![CellValue::Integer(1), CellValue::Text("x".to_string())]],
    );

    let json: serde_json::Value = serde_json::from_str(&to_json(&result).unwrap()).unwrap();
    assert_eq!(json["rows"], serde_json::json!([[1, "x"]]));
    assert_eq!(json["row_count"], 1);
    assert_eq!(json["truncated"], false);
    assert_eq!(json["execution_time_ms"], 4);
    assert_eq!(json["columns"][1]["engine_type_id"], 25);
}
