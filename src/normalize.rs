use crate::backend::{CellValue, RawResult};
use serde::Serialize;

/// Column metadata as exposed to callers.
///
/// Names are not unique in general; rows are positional.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnDescriptor {
    pub name: String,
    pub engine_type_id: u32,
    pub type_name: String,
}

/// A bounded, typed result set.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RowSet {
    pub columns: Vec<ColumnDescriptor>,
    pub rows: Vec<Vec<CellValue>>,
    pub row_count: usize,
    pub truncated: bool,
    pub execution_time_ms: u64,
}

impl RowSet {
    /// Rows as objects keyed by column name. A repeated name keeps the
    /// rightmost value.
    pub fn keyed_rows(&self) -> Vec<serde_json::Value> {
        self.rows
            .iter()
            .map(|row| {
                let mut map = serde_json::Map::new();
                for (i, col) in self.columns.iter().enumerate() {
                    let value = row.get(i).unwrap_or(&CellValue::Null);
                    map.insert(col.name.clone(), value.to_json());
                }
                serde_json::Value::Object(map)
            })
            .collect()
    }

    /// Cut the set down to `max_rows`, keeping the truncation rule of
    /// [`normalize`].
    pub fn capped(mut self, max_rows: usize) -> Self {
        self.truncated = self.truncated || self.rows.len() >= max_rows;
        self.rows.truncate(max_rows);
        self.row_count = self.rows.len();
        self
    }
}

/// Shape an engine result into a [`RowSet`].
///
/// Rows past `max_rows` are dropped. Reaching the cap counts as truncated
/// even when nothing was cut, since the engine stopped looking there.
pub fn normalize(raw: RawResult, elapsed_ms: u64, max_rows: usize) -> RowSet {
    let truncated = raw.rows.len() >= max_rows;
    let mut rows = raw.rows;
    rows.truncate(max_rows);

    let columns = raw
        .columns
        .into_iter()
        .map(|c| ColumnDescriptor {
            name: c.name,
            engine_type_id: c.type_id,
            type_name: c.type_name,
        })
        .collect();

    RowSet {
        columns,
        row_count: rows.len(),
        rows,
        truncated,
        execution_time_ms: elapsed_ms,
    }
}
