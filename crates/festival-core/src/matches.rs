// Match table: the rows organizers edit, CSV and xlsx import, and score
// validation.
//
// Both loaders accept the English column names used by the workbook as well
// as the headers of the festival's original match sheet (Time1,
// Resultado_Time1, Goleiro_Time1, ...). A malformed row fails the whole load.

use calamine::{open_workbook, Data, Range, Reader, Xlsx, XlsxError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::io::Read;
use std::path::Path;

use crate::section::{Cell, ColumnKind, TabularRow};

// ---------------------------------------------------------------------------
// Column names
// ---------------------------------------------------------------------------

pub const TEAM_A: &str = "team_a";
pub const TEAM_B: &str = "team_b";
pub const SCORE_A: &str = "score_a";
pub const SCORE_B: &str = "score_b";
pub const KEEPER_A: &str = "keeper_a";
pub const KEEPER_B: &str = "keeper_b";

/// Largest accepted score. Keeps per-team goal totals far from `u32::MAX`.
pub const MAX_SCORE: u32 = 999;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum MatchError {
    #[error("failed to read file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("failed to read sheet `{sheet}` of {path}: {source}")]
    Xlsx {
        path: String,
        sheet: String,
        source: XlsxError,
    },

    #[error("CSV error at row {row}: {source}")]
    Csv { row: usize, source: csv::Error },

    #[error("row {row}: `{column}` is empty")]
    MissingValue { row: usize, column: &'static str },

    #[error("row {row}: `{column}` has invalid score {value:?} (expected a whole number from 0 to {})", MAX_SCORE)]
    InvalidScore {
        row: usize,
        column: &'static str,
        value: String,
    },

    #[error("match {row} does not exist (table has {len} matches)")]
    RowOutOfRange { row: usize, len: usize },
}

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// One scheduled match. Scores are `None` until the result is entered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatchRow {
    pub team_a: String,
    pub team_b: String,
    pub score_a: Option<u32>,
    pub score_b: Option<u32>,
    pub keeper_a: String,
    pub keeper_b: String,
}

impl MatchRow {
    pub fn is_complete(&self) -> bool {
        self.score_a.is_some() && self.score_b.is_some()
    }

    /// Both scores, when the match has been played.
    pub fn completed(&self) -> Option<CompletedMatch<'_>> {
        match (self.score_a, self.score_b) {
            (Some(score_a), Some(score_b)) => Some(CompletedMatch {
                team_a: &self.team_a,
                team_b: &self.team_b,
                score_a,
                score_b,
                keeper_a: &self.keeper_a,
                keeper_b: &self.keeper_b,
            }),
            _ => None,
        }
    }
}

impl TabularRow for MatchRow {
    const COLUMNS: &'static [(&'static str, ColumnKind)] = &[
        (TEAM_A, ColumnKind::Text),
        (TEAM_B, ColumnKind::Text),
        (SCORE_A, ColumnKind::Integer),
        (SCORE_B, ColumnKind::Integer),
        (KEEPER_A, ColumnKind::Text),
        (KEEPER_B, ColumnKind::Text),
    ];

    fn cells(&self) -> Vec<Cell> {
        vec![
            self.team_a.as_str().into(),
            self.team_b.as_str().into(),
            self.score_a.into(),
            self.score_b.into(),
            self.keeper_a.as_str().into(),
            self.keeper_b.as_str().into(),
        ]
    }
}

/// A match with both scores present, borrowed from its `MatchRow`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompletedMatch<'a> {
    pub team_a: &'a str,
    pub team_b: &'a str,
    pub score_a: u32,
    pub score_b: u32,
    pub keeper_a: &'a str,
    pub keeper_b: &'a str,
}

/// Result of the completeness filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completeness<'a> {
    pub complete: Vec<CompletedMatch<'a>>,
    /// Matches still waiting for at least one score.
    pub pending: usize,
}

/// The full match table. Row identity is positional; rows are numbered from 1
/// in every public API.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatchTable {
    rows: Vec<MatchRow>,
}

impl MatchTable {
    /// Build a table, checking that every team and keeper name is present and
    /// trimming surrounding whitespace.
    pub fn from_rows(rows: Vec<MatchRow>) -> Result<Self, MatchError> {
        let rows = rows
            .into_iter()
            .enumerate()
            .map(|(i, row)| {
                RawMatchRow {
                    team_a: Some(row.team_a),
                    team_b: Some(row.team_b),
                    score_a: row.score_a.map(|s| s.to_string()),
                    score_b: row.score_b.map(|s| s.to_string()),
                    keeper_a: Some(row.keeper_a),
                    keeper_b: Some(row.keeper_b),
                }
                .into_match_row(i + 1)
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(MatchTable { rows })
    }

    pub fn rows(&self) -> &[MatchRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Look up a match by 1-based row number.
    pub fn get(&self, row: usize) -> Option<&MatchRow> {
        row.checked_sub(1).and_then(|i| self.rows.get(i))
    }

    /// Enter the result of match `row` (1-based). Only the score columns are
    /// editable; team and keeper names never change after import.
    pub fn set_score(&mut self, row: usize, score_a: u32, score_b: u32) -> Result<(), MatchError> {
        for (column, score) in [(SCORE_A, score_a), (SCORE_B, score_b)] {
            if score > MAX_SCORE {
                return Err(MatchError::InvalidScore {
                    row,
                    column,
                    value: score.to_string(),
                });
            }
        }
        let m = self.row_mut(row)?;
        m.score_a = Some(score_a);
        m.score_b = Some(score_b);
        Ok(())
    }

    /// Remove the result of match `row` (1-based), returning it to pending.
    pub fn clear_score(&mut self, row: usize) -> Result<(), MatchError> {
        let m = self.row_mut(row)?;
        m.score_a = None;
        m.score_b = None;
        Ok(())
    }

    fn row_mut(&mut self, row: usize) -> Result<&mut MatchRow, MatchError> {
        let len = self.rows.len();
        row.checked_sub(1)
            .and_then(|i| self.rows.get_mut(i))
            .ok_or(MatchError::RowOutOfRange { row, len })
    }

    /// Split the table into completed matches and a count of pending ones.
    /// Pending matches are an expected state during data entry, not an error.
    pub fn completeness(&self) -> Completeness<'_> {
        let complete: Vec<CompletedMatch<'_>> =
            self.rows.iter().filter_map(MatchRow::completed).collect();
        let pending = self.rows.len() - complete.len();
        Completeness { complete, pending }
    }

    /// Matches without a full result, with their 1-based row numbers.
    pub fn pending_rows(&self) -> impl Iterator<Item = (usize, &MatchRow)> {
        self.rows
            .iter()
            .enumerate()
            .filter(|(_, m)| !m.is_complete())
            .map(|(i, m)| (i + 1, m))
    }

    /// Every distinct team name in the table, whether or not it has played.
    pub fn team_names(&self) -> BTreeSet<&str> {
        self.rows
            .iter()
            .flat_map(|m| [m.team_a.as_str(), m.team_b.as_str()])
            .collect()
    }

    /// Every distinct goalkeeper name in the table, whether or not they have
    /// played.
    pub fn keeper_names(&self) -> BTreeSet<&str> {
        self.rows
            .iter()
            .flat_map(|m| [m.keeper_a.as_str(), m.keeper_b.as_str()])
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Raw rows and score parsing
// ---------------------------------------------------------------------------

/// Accepted header names per column, in `RawMatchRow` field order.
const HEADERS: [(&str, &str); 6] = [
    (TEAM_A, "Time1"),
    (TEAM_B, "Time2"),
    (SCORE_A, "Resultado_Time1"),
    (SCORE_B, "Resultado_Time2"),
    (KEEPER_A, "Goleiro_Time1"),
    (KEEPER_B, "Goleiro_Time2"),
];

/// Untyped match row as it arrives from a CSV file or a workbook section.
/// Every field is optional so that a blank cell becomes a validation error
/// with a row number instead of an opaque deserialization failure.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct RawMatchRow {
    #[serde(default, alias = "Time1")]
    pub team_a: Option<String>,
    #[serde(default, alias = "Time2")]
    pub team_b: Option<String>,
    #[serde(default, alias = "Resultado_Time1")]
    pub score_a: Option<String>,
    #[serde(default, alias = "Resultado_Time2")]
    pub score_b: Option<String>,
    #[serde(default, alias = "Goleiro_Time1")]
    pub keeper_a: Option<String>,
    #[serde(default, alias = "Goleiro_Time2")]
    pub keeper_b: Option<String>,
}

impl RawMatchRow {
    pub(crate) fn into_match_row(self, row: usize) -> Result<MatchRow, MatchError> {
        Ok(MatchRow {
            team_a: required(row, TEAM_A, self.team_a)?,
            team_b: required(row, TEAM_B, self.team_b)?,
            score_a: parse_score(row, SCORE_A, self.score_a.as_deref())?,
            score_b: parse_score(row, SCORE_B, self.score_b.as_deref())?,
            keeper_a: required(row, KEEPER_A, self.keeper_a)?,
            keeper_b: required(row, KEEPER_B, self.keeper_b)?,
        })
    }
}

fn required(row: usize, column: &'static str, value: Option<String>) -> Result<String, MatchError> {
    match value.as_deref().map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v.to_string()),
        _ => Err(MatchError::MissingValue { row, column }),
    }
}

/// Parse a score cell.
///
/// Blank cells and `NaN` (how spreadsheets export an empty numeric cell) mean
/// "not played yet". Whole numbers up to `MAX_SCORE` are accepted with or
/// without a trailing `.0`, since a score column containing blanks is exported
/// as floats. Anything else is rejected rather than coerced.
pub fn parse_score(
    row: usize,
    column: &'static str,
    raw: Option<&str>,
) -> Result<Option<u32>, MatchError> {
    let Some(text) = raw.map(str::trim) else {
        return Ok(None);
    };
    if text.is_empty() || text.eq_ignore_ascii_case("nan") {
        return Ok(None);
    }

    let invalid = || MatchError::InvalidScore {
        row,
        column,
        value: text.to_string(),
    };
    if let Ok(n) = text.parse::<u32>() {
        return if n <= MAX_SCORE { Ok(Some(n)) } else { Err(invalid()) };
    }

    let value: f64 = text.parse().map_err(|_| invalid())?;
    if value.is_finite() && value >= 0.0 && value.fract() == 0.0 && value <= f64::from(MAX_SCORE) {
        Ok(Some(value as u32))
    } else {
        Err(invalid())
    }
}

// ---------------------------------------------------------------------------
// CSV loading
// ---------------------------------------------------------------------------

fn load_matches_from_reader<R: Read>(rdr: R) -> Result<MatchTable, MatchError> {
    let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::Headers).from_reader(rdr);
    let mut rows = Vec::new();
    for (i, result) in reader.deserialize::<RawMatchRow>().enumerate() {
        let row = i + 1;
        let raw = result.map_err(|source| MatchError::Csv { row, source })?;
        rows.push(raw.into_match_row(row)?);
    }
    Ok(MatchTable { rows })
}

/// Load a match table from a CSV export of the match sheet.
pub fn load_matches_csv(path: &Path) -> Result<MatchTable, MatchError> {
    let file = std::fs::File::open(path).map_err(|e| MatchError::Io {
        path: path.display().to_string(),
        source: e,
    })?;
    load_matches_from_reader(file)
}

// ---------------------------------------------------------------------------
// XLSX loading
// ---------------------------------------------------------------------------

/// Cell contents as text, `None` when empty. Numeric cells print without a
/// trailing `.0`, so a `3.0` score reads as `3`.
fn cell_text(cell: &Data) -> Option<String> {
    match cell {
        Data::Empty => None,
        Data::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn load_matches_from_range(range: &Range<Data>) -> Result<MatchTable, MatchError> {
    let mut lines = range.rows();
    let Some(header) = lines.next() else {
        return Ok(MatchTable::default());
    };
    let header: Vec<String> = header
        .iter()
        .map(|c| cell_text(c).unwrap_or_default().trim().to_string())
        .collect();
    let idx = HEADERS.map(|(name, alias)| header.iter().position(|h| h == name || h == alias));

    let mut rows = Vec::new();
    for (i, cells) in lines
        .filter(|cells| cells.iter().any(|c| !matches!(c, Data::Empty)))
        .enumerate()
    {
        let text = |n: usize| idx[n].and_then(|c| cells.get(c)).and_then(cell_text);
        let raw = RawMatchRow {
            team_a: text(0),
            team_b: text(1),
            score_a: text(2),
            score_b: text(3),
            keeper_a: text(4),
            keeper_b: text(5),
        };
        rows.push(raw.into_match_row(i + 1)?);
    }
    Ok(MatchTable { rows })
}

/// Load a match table from the worksheet `sheet` of an xlsx file. Blank
/// lines are skipped; every other row goes through the same validation as a
/// CSV import.
pub fn load_matches_xlsx(path: &Path, sheet: &str) -> Result<MatchTable, MatchError> {
    let xlsx_error = |source: XlsxError| MatchError::Xlsx {
        path: path.display().to_string(),
        sheet: sheet.to_string(),
        source,
    };
    let mut workbook: Xlsx<_> = open_workbook(path).map_err(xlsx_error)?;
    let range = workbook.worksheet_range(sheet).map_err(xlsx_error)?;
    load_matches_from_range(&range)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
