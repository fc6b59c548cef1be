use ndarray::Array2;

use crate::app::ports::JsonRecord;
use crate::error::{PipelineError, Result};

/// In-memory tabular file: a header row plus string cells.
///
/// Missing values are empty strings until the normalizer replaces them with
/// the `NULL` sentinel. The first column arrives unnamed (empty header cell)
/// and carries the row identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Frame {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        Self { columns, rows }
    }

    /// Parses CSV bytes. Fails on empty input, unbalanced quoting or ragged
    /// rows; the validator routes such files to the bad partition.
    pub fn from_csv_bytes(bytes: &[u8]) -> Result<Frame> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(bytes);
        let mut records = reader.records();
        let columns: Vec<String> = match records.next() {
            Some(header) => header
                .map_err(|e| PipelineError::Tabular(format!("unreadable header row: {}", e)))?
                .iter()
                .map(|cell| cell.to_string())
                .collect(),
            None => return Err(PipelineError::Tabular("file holds no data".to_string())),
        };
        let mut rows = Vec::new();
        for record in records {
            let record = record.map_err(|e| PipelineError::Tabular(format!("unreadable row: {}", e)))?;
            let row: Vec<String> = record.iter().map(|cell| cell.to_string()).collect();
            if row.len() != columns.len() {
                return Err(PipelineError::Tabular(format!(
                    "ragged row: {} cells, header declares {}",
                    row.len(),
                    columns.len()
                )));
            }
            rows.push(row);
        }
        Ok(Frame { columns, rows })
    }

    pub fn to_csv_bytes(&self) -> Result<Vec<u8>> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer
            .write_record(&self.columns)
            .map_err(|e| PipelineError::Tabular(e.to_string()))?;
        for row in &self.rows {
            writer
                .write_record(row)
                .map_err(|e| PipelineError::Tabular(e.to_string()))?;
        }
        writer
            .into_inner()
            .map_err(|e| PipelineError::Tabular(e.to_string()))
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn column(&self, name: &str) -> Option<Vec<&str>> {
        let idx = self.column_index(name)?;
        Some(self.rows.iter().map(|row| row[idx].as_str()).collect())
    }

    /// True when every cell of the column is missing (empty string).
    pub fn column_is_all_missing(&self, idx: usize) -> bool {
        !self.rows.is_empty() && self.rows.iter().all(|row| row[idx].is_empty())
    }

    /// Rows as JSON records keyed by column name, numbers parsed where the
    /// cell holds one. Preserves column order.
    pub fn to_records(&self) -> Vec<JsonRecord> {
        self.rows
            .iter()
            .map(|row| {
                let mut record = JsonRecord::new();
                for (column, cell) in self.columns.iter().zip(row) {
                    record.insert(column.clone(), cell_to_json(cell));
                }
                record
            })
            .collect()
    }

    /// Rebuilds a frame from scanned records; column order follows the first
    /// record.
    pub fn from_records(records: &[JsonRecord]) -> Result<Frame> {
        let first = records
            .first()
            .ok_or_else(|| PipelineError::Tabular("no records to build a frame from".to_string()))?;
        let columns: Vec<String> = first.keys().cloned().collect();
        let mut rows = Vec::with_capacity(records.len());
        for record in records {
            let row = columns
                .iter()
                .map(|column| record.get(column).map(json_to_cell).unwrap_or_default())
                .collect();
            rows.push(row);
        }
        Ok(Frame { columns, rows })
    }

    /// Extracts the numeric feature matrix, skipping the named columns.
    /// Cells that do not parse as numbers (the `NULL` sentinel included)
    /// become NaN for the imputer to fill.
    pub fn numeric_matrix(&self, exclude: &[&str]) -> Result<(Vec<String>, Array2<f64>)> {
        let keep: Vec<usize> = (0..self.columns.len())
            .filter(|&i| !exclude.contains(&self.columns[i].as_str()))
            .collect();
        let names = keep.iter().map(|&i| self.columns[i].clone()).collect();
        let mut x = Array2::from_elem((self.rows.len(), keep.len()), f64::NAN);
        for (r, row) in self.rows.iter().enumerate() {
            for (c, &i) in keep.iter().enumerate() {
                if let Ok(value) = row[i].parse::<f64>() {
                    x[[r, c]] = value;
                }
            }
        }
        Ok((names, x))
    }
}

fn cell_to_json(cell: &str) -> serde_json::Value {
    if let Ok(value) = cell.parse::<i64>() {
        return serde_json::Value::from(value);
    }
    if let Ok(value) = cell.parse::<f64>() {
        if value.is_finite() {
            return serde_json::Value::from(value);
        }
    }
    serde_json::Value::from(cell)
}

fn json_to_cell(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}
