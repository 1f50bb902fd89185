//! Tabular result returned by the storage collaborator

use serde::{Deserialize, Serialize};

/// One result cell, kept in its native shape so quality checks can read numbers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Cell {
    Null,
    Int(i64),
    UInt(u64),
    Float(f64),
    Text(String),
}

impl Cell {
    pub fn is_null(&self) -> bool {
        matches!(self, Cell::Null)
    }

    /// Numeric view of the cell. Text is parsed when it holds a number.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Cell::Null => None,
            Cell::Int(v) => Some(*v as f64),
            Cell::UInt(v) => Some(*v as f64),
            Cell::Float(v) => Some(*v),
            Cell::Text(s) => s.trim().parse::<f64>().ok(),
        }
    }
}

impl From<&str> for Cell {
    fn from(value: &str) -> Self {
        Cell::Text(value.to_string())
    }
}

impl From<f64> for Cell {
    fn from(value: f64) -> Self {
        Cell::Float(value)
    }
}

impl From<i64> for Cell {
    fn from(value: i64) -> Self {
        Cell::Int(value)
    }
}

impl<T: Into<Cell>> From<Option<T>> for Cell {
    fn from(value: Option<T>) -> Self {
        value.map_or(Cell::Null, Into::into)
    }
}

/// Named columns plus ordered rows
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
}

impl ResultSet {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Cell>>) -> Self {
        Self { columns, rows }
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.eq_ignore_ascii_case(name))
    }

    /// Cells of one column, rows shorter than the header count as null
    pub fn column_cells(&self, index: usize) -> impl Iterator<Item = &Cell> + '_ {
        static NULL: Cell = Cell::Null;
        self.rows.iter().map(move |row| row.get(index).unwrap_or(&NULL))
    }

    /// Fraction of null cells in a column, 0.0 for an empty result
    pub fn missing_rate(&self, index: usize) -> f64 {
        if self.rows.is_empty() {
            return 0.0;
        }
        let missing = self.column_cells(index).filter(|c| c.is_null()).count();
        missing as f64 / self.rows.len() as f64
    }

    /// Non-null numeric values of a column
    pub fn numeric_values(&self, index: usize) -> Vec<f64> {
        self.column_cells(index).filter_map(Cell::as_f64).collect()
    }
}
