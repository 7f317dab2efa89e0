// Named tabular sections: the shape shared by the workbook and the exporters.

use std::fmt;

/// A single cell value.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Empty,
    Int(i64),
    Real(f64),
    Text(String),
}

impl Cell {
    /// The cell as text, or `None` for an empty cell. Numbers are rendered
    /// with `Display`, so `Real(3.0)` becomes `"3"`.
    pub fn as_text(&self) -> Option<String> {
        match self {
            Cell::Empty => None,
            other => Some(other.to_string()),
        }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Empty => Ok(()),
            Cell::Int(n) => write!(f, "{n}"),
            Cell::Real(x) => write!(f, "{x}"),
            Cell::Text(s) => f.write_str(s),
        }
    }
}

impl From<Option<u32>> for Cell {
    fn from(value: Option<u32>) -> Self {
        value.map_or(Cell::Empty, |v| Cell::Int(i64::from(v)))
    }
}

impl From<u32> for Cell {
    fn from(value: u32) -> Self {
        Cell::Int(i64::from(value))
    }
}

impl From<&str> for Cell {
    fn from(value: &str) -> Self {
        Cell::Text(value.to_string())
    }
}

/// Declared type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Integer,
    Real,
    Text,
}

impl ColumnKind {
    pub fn sql_type(self) -> &'static str {
        match self {
            ColumnKind::Integer => "INTEGER",
            ColumnKind::Real => "REAL",
            ColumnKind::Text => "TEXT",
        }
    }

    /// Map a declared SQLite column type back to a kind using SQLite's own
    /// affinity rules (INT anywhere → integer, REAL/FLOA/DOUB → real).
    pub fn from_sql_type(declared: &str) -> Self {
        let upper = declared.to_ascii_uppercase();
        if upper.contains("INT") {
            ColumnKind::Integer
        } else if upper.contains("REAL") || upper.contains("FLOA") || upper.contains("DOUB") {
            ColumnKind::Real
        } else {
            ColumnKind::Text
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub name: String,
    pub kind: ColumnKind,
}

/// A row type that can be laid out as a section.
pub trait TabularRow {
    const COLUMNS: &'static [(&'static str, ColumnKind)];

    /// One cell per entry of `COLUMNS`, in the same order.
    fn cells(&self) -> Vec<Cell>;
}

/// A named table: header plus rows in display order.
#[derive(Debug, Clone, PartialEq)]
pub struct Section {
    pub name: String,
    pub columns: Vec<Column>,
    pub rows: Vec<Vec<Cell>>,
}

impl Section {
    pub fn from_rows<T: TabularRow>(name: impl Into<String>, rows: &[T]) -> Self {
        Section {
            name: name.into(),
            columns: T::COLUMNS
                .iter()
                .map(|&(name, kind)| Column {
                    name: name.to_string(),
                    kind,
                })
                .collect(),
            rows: rows.iter().map(TabularRow::cells).collect(),
        }
    }

    /// Position of the column called `name` (exact match).
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }
}
