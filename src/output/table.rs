//! Tabular view of extracted records

use crate::storage::StorageResult;
use crate::target::Record;
use serde_json::Value;
use std::io::Write;

/// Records arranged in rows and columns
///
/// Columns are the union of all record keys in first-seen order; a record
/// without a column has a null cell.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl Table {
    pub fn from_records(records: &[Record]) -> Self {
        let mut columns: Vec<String> = Vec::new();

        for record in records {
            for key in record.keys() {
                if !columns.contains(key) {
                    columns.push(key.clone());
                }
            }
        }

        let rows = records
            .iter()
            .map(|record| {
                columns
                    .iter()
                    .map(|column| record.get(column).cloned().unwrap_or(Value::Null))
                    .collect()
            })
            .collect();

        Self { columns, rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Returns the cells of a column, if it exists
    pub fn column(&self, name: &str) -> Option<Vec<&Value>> {
        let index = self.columns.iter().position(|c| c == name)?;
        Some(self.rows.iter().map(|row| &row[index]).collect())
    }

    /// Writes the table as CSV with a header row
    ///
    /// Strings are written as-is, nulls as empty cells, and anything else
    /// as its JSON text.
    pub fn write_csv<W: Write>(&self, writer: W) -> StorageResult<()> {
        let mut csv = csv::Writer::from_writer(writer);
        csv.write_record(&self.columns)?;

        for row in &self.rows {
            csv.write_record(row.iter().map(cell_text))?;
        }

        csv.flush()?;
        Ok(())
    }
}

fn cell_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
