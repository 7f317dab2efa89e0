// SQLite workbook: the persisted document holding named sections.
//
// Every section is a table named after it. Writes replace whole sections
// inside one transaction, so either every section of a write lands or none
// does. Tables that are not part of a write are left alone.

use std::path::Path;

use anyhow::{bail, Context, Result};
use rusqlite::types::{ToSqlOutput, Value, ValueRef};
use rusqlite::{params, params_from_iter, Connection, ToSql, Transaction};
use tracing::debug;

use crate::matches::{MatchTable, RawMatchRow, KEEPER_A, KEEPER_B, SCORE_A, SCORE_B, TEAM_A, TEAM_B};
use crate::section::{Cell, Column, ColumnKind, Section};

/// Key/value table for workbook metadata. Never a section name.
pub const META_TABLE: &str = "festival_meta";

impl ToSql for Cell {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Cell::Empty => ToSqlOutput::Owned(Value::Null),
            Cell::Int(n) => ToSqlOutput::Owned(Value::Integer(*n)),
            Cell::Real(x) => ToSqlOutput::Owned(Value::Real(*x)),
            Cell::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
        })
    }
}

impl From<Value> for Cell {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Cell::Empty,
            Value::Integer(n) => Cell::Int(n),
            Value::Real(x) => Cell::Real(x),
            Value::Text(s) => Cell::Text(s),
            Value::Blob(b) => Cell::Text(String::from_utf8_lossy(&b).into_owned()),
        }
    }
}

/// Quote an identifier for interpolation into SQL.
fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// SQLite-backed document of named sections plus a metadata table.
pub struct Workbook {
    conn: Connection,
}

impl Workbook {
    /// Open (or create) a workbook at `path`, creating missing parent
    /// directories.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create directory {}", parent.display()))?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open workbook at {}", path.display()))?;
        Self::init(conn)
    }

    /// Ephemeral workbook for tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("failed to open in-memory workbook")?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA busy_timeout = 5000;",
        )
        .context("failed to set workbook pragmas")?;

        conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {} (
                key   TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );",
            quote_ident(META_TABLE)
        ))
        .context("failed to create workbook metadata table")?;

        Ok(Self { conn })
    }

    // ------------------------------------------------------------------
    // Sections
    // ------------------------------------------------------------------

    /// Replace each of `sections` in a single transaction. On any error the
    /// transaction rolls back and the workbook is unchanged.
    pub fn write_sections(&mut self, sections: &[Section]) -> Result<()> {
        self.commit(sections, None)
    }

    /// Like `write_sections`, additionally storing `value` under the metadata
    /// `key` in the same transaction.
    pub fn write_sections_with_state(
        &mut self,
        sections: &[Section],
        key: &str,
        value: &serde_json::Value,
    ) -> Result<()> {
        self.commit(sections, Some((key, value)))
    }

    fn commit(&mut self, sections: &[Section], state: Option<(&str, &serde_json::Value)>) -> Result<()> {
        for section in sections {
            check_section(section)?;
        }

        // Dropping an uncommitted Transaction rolls it back.
        let tx = self.conn.transaction().context("failed to begin section write")?;
        for section in sections {
            replace_section(&tx, section)
                .with_context(|| format!("failed to write section `{}`", section.name))?;
        }
        if let Some((key, value)) = state {
            put_state(&tx, key, value)?;
        }
        tx.commit().context("failed to commit section write")?;
        Ok(())
    }

    /// Returns `true` if a section called `name` exists.
    pub fn has_section(&self, name: &str) -> Result<bool> {
        let exists: bool = self
            .conn
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1 COLLATE NOCASE)",
                params![name],
                |row| row.get(0),
            )
            .context("failed to look up section")?;
        Ok(exists)
    }

    /// Names of all sections, sorted.
    pub fn section_names(&self) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT name FROM sqlite_master
                 WHERE type = 'table' AND name NOT LIKE 'sqlite\\_%' ESCAPE '\\' AND name <> ?1
                 ORDER BY name",
            )
            .context("failed to prepare section list query")?;
        let names = stmt
            .query_map(params![META_TABLE], |row| row.get(0))
            .context("failed to list sections")?
            .collect::<std::result::Result<Vec<String>, _>>()
            .context("failed to read section names")?;
        Ok(names)
    }

    /// Read a section back in stored row order. Returns `None` if it does not
    /// exist.
    pub fn read_section(&self, name: &str) -> Result<Option<Section>> {
        if !self.has_section(name)? {
            return Ok(None);
        }

        let mut stmt = self
            .conn
            .prepare("SELECT name, type FROM pragma_table_info(?1) ORDER BY cid")
            .context("failed to prepare column query")?;
        let columns = stmt
            .query_map(params![name], |row| {
                let name: String = row.get(0)?;
                let declared: String = row.get(1)?;
                Ok(Column {
                    name,
                    kind: ColumnKind::from_sql_type(&declared),
                })
            })
            .context("failed to query section columns")?
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("failed to read section columns")?;

        let mut stmt = self
            .conn
            .prepare(&format!("SELECT * FROM {} ORDER BY rowid", quote_ident(name)))
            .with_context(|| format!("failed to prepare read of section `{name}`"))?;
        let width = columns.len();
        let rows = stmt
            .query_map([], |row| {
                (0..width)
                    .map(|i| row.get::<_, Value>(i).map(Cell::from))
                    .collect::<rusqlite::Result<Vec<Cell>>>()
            })
            .with_context(|| format!("failed to query section `{name}`"))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .with_context(|| format!("failed to read rows of section `{name}`"))?;

        Ok(Some(Section {
            name: name.to_string(),
            columns,
            rows,
        }))
    }

    /// Rebuild the match table from the section called `name`, applying the
    /// same validation as a CSV import.
    pub fn load_matches(&self, name: &str) -> Result<MatchTable> {
        let Some(section) = self.read_section(name)? else {
            bail!("workbook has no `{name}` section; import a match table first");
        };

        let index = |column: &str| -> Result<usize> {
            section
                .column_index(column)
                .with_context(|| format!("section `{name}` has no `{column}` column"))
        };
        let idx = [
            index(TEAM_A)?,
            index(TEAM_B)?,
            index(SCORE_A)?,
            index(SCORE_B)?,
            index(KEEPER_A)?,
            index(KEEPER_B)?,
        ];

        let mut rows = Vec::with_capacity(section.rows.len());
        for (i, cells) in section.rows.iter().enumerate() {
            let text = |n: usize| cells[idx[n]].as_text();
            let raw = RawMatchRow {
                team_a: text(0),
                team_b: text(1),
                score_a: text(2),
                score_b: text(3),
                keeper_a: text(4),
                keeper_b: text(5),
            };
            rows.push(
                raw.into_match_row(i + 1)
                    .with_context(|| format!("invalid match in section `{name}`"))?,
            );
        }
        MatchTable::from_rows(rows).with_context(|| format!("invalid match table in section `{name}`"))
    }

    // ------------------------------------------------------------------
    // Metadata
    // ------------------------------------------------------------------

    /// Load a previously saved JSON value by `key`. Returns `None` if the key
    /// does not exist.
    pub fn load_state(&self, key: &str) -> Result<Option<serde_json::Value>> {
        let mut stmt = self
            .conn
            .prepare(&format!(
                "SELECT value FROM {} WHERE key = ?1",
                quote_ident(META_TABLE)
            ))
            .context("failed to prepare load_state query")?;

        let mut rows = stmt
            .query_map(params![key], |row| row.get::<_, String>(0))
            .context("failed to query workbook state")?;

        match rows.next() {
            Some(row_result) => {
                let json_str = row_result.context("failed to read state row")?;
                let value: serde_json::Value =
                    serde_json::from_str(&json_str).context("failed to deserialize state value")?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }
}

fn check_section(section: &Section) -> Result<()> {
    let name = section.name.as_str();
    if name.trim().is_empty() {
        bail!("section name must not be empty");
    }
    if name.eq_ignore_ascii_case(META_TABLE) || name.to_ascii_lowercase().starts_with("sqlite_") {
        bail!("`{name}` is a reserved name and cannot be used for a section");
    }
    if section.columns.is_empty() {
        bail!("section `{name}` has no columns");
    }
    let width = section.columns.len();
    if let Some((i, row)) = section.rows.iter().enumerate().find(|(_, r)| r.len() != width) {
        bail!(
            "section `{name}` row {} has {} cells, expected {width}",
            i + 1,
            row.len()
        );
    }
    Ok(())
}

fn replace_section(tx: &Transaction<'_>, section: &Section) -> Result<()> {
    let table = quote_ident(&section.name);
    let columns = section
        .columns
        .iter()
        .map(|c| format!("{} {}", quote_ident(&c.name), c.kind.sql_type()))
        .collect::<Vec<_>>()
        .join(", ");

    tx.execute_batch(&format!("DROP TABLE IF EXISTS {table}; CREATE TABLE {table} ({columns});"))
        .context("failed to recreate section table")?;

    let placeholders = (1..=section.columns.len())
        .map(|i| format!("?{i}"))
        .collect::<Vec<_>>()
        .join(", ");
    let mut stmt = tx
        .prepare(&format!("INSERT INTO {table} VALUES ({placeholders})"))
        .context("failed to prepare section insert")?;
    for row in &section.rows {
        stmt.execute(params_from_iter(row.iter()))
            .context("failed to insert section row")?;
    }

    debug!("wrote section `{}` ({} rows)", section.name, section.rows.len());
    Ok(())
}

fn put_state(conn: &Connection, key: &str, value: &serde_json::Value) -> Result<()> {
    let json_str = serde_json::to_string(value).context("failed to serialize state value")?;
    conn.execute(
        &format!(
            "INSERT OR REPLACE INTO {} (key, value) VALUES (?1, ?2)",
            quote_ident(META_TABLE)
        ),
        params![key, json_str],
    )
    .context("failed to save state")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matches::MatchRow;
    use crate::section::TabularRow;

    fn sample_matches() -> Vec<MatchRow> {
        vec![
            MatchRow {
                team_a: "Lions".into(),
                team_b: "Tigers".into(),
                score_a: Some(3),
                score_b: Some(1),
                keeper_a: "Ana".into(),
                keeper_b: "Bia".into(),
            },
            MatchRow {
                team_a: "Bears".into(),
                team_b: "Lions".into(),
                score_a: None,
                score_b: None,
                keeper_a: "Caio".into(),
                keeper_b: "Ana".into(),
            },
        ]
    }

    fn notes_section(name: &str, text: &str) -> Section {
        Section {
            name: name.into(),
            columns: vec![Column {
                name: "note".into(),
                kind: ColumnKind::Text,
            }],
            rows: vec![vec![Cell::Text(text.into())]],
        }
    }

    #[test]
    fn open_creates_meta_table() {
        let wb = Workbook::open_in_memory().unwrap();
        assert!(wb.has_section(META_TABLE).unwrap());
        assert!(wb.section_names().unwrap().is_empty());
    }

    #[test]
    fn write_then_read_section() {
        let mut wb = Workbook::open_in_memory().unwrap();
        let section = Section::from_rows("Sheet1", &sample_matches());
        wb.write_sections(std::slice::from_ref(&section)).unwrap();

        let back = wb.read_section("Sheet1").unwrap().expect("section should exist");
        assert_eq!(back, section);
        assert_eq!(back.columns.len(), MatchRow::COLUMNS.len());
        assert_eq!(back.rows[1][2], Cell::Empty);
    }

    #[test]
    fn read_missing_section_is_none() {
        let wb = Workbook::open_in_memory().unwrap();
        assert!(wb.read_section("Nope").unwrap().is_none());
    }

    #[test]
    fn rewrite_replaces_section_and_keeps_others() {
        let mut wb = Workbook::open_in_memory().unwrap();
        wb.write_sections(&[notes_section("Notes", "keep me"), notes_section("Report", "v1")])
            .unwrap();
        wb.write_sections(&[notes_section("Report", "v2")]).unwrap();

        let notes = wb.read_section("Notes").unwrap().unwrap();
        assert_eq!(notes.rows, vec![vec![Cell::Text("keep me".into())]]);
        let report = wb.read_section("Report").unwrap().unwrap();
        assert_eq!(report.rows, vec![vec![Cell::Text("v2".into())]]);
        assert_eq!(wb.section_names().unwrap(), vec!["Notes", "Report"]);
    }

    #[test]
    fn failed_write_leaves_workbook_unchanged() {
        let mut wb = Workbook::open_in_memory().unwrap();
        wb.write_sections(&[notes_section("Report", "v1")]).unwrap();

        // The duplicate column makes the second CREATE fail after `Extra` was
        // already written inside the transaction.
        let mut broken = notes_section("Report", "v2");
        broken.columns.push(Column {
            name: "note".into(),
            kind: ColumnKind::Text,
        });
        broken.rows = vec![vec![Cell::Text("a".into()), Cell::Text("b".into())]];
        let result = wb.write_sections(&[notes_section("Extra", "x"), broken]);
        assert!(result.is_err());

        let report = wb.read_section("Report").unwrap().unwrap();
        assert_eq!(report.rows, vec![vec![Cell::Text("v1".into())]]);
        assert!(!wb.has_section("Extra").unwrap());
    }

    #[test]
    fn rejects_ragged_rows_and_reserved_names() {
        let mut wb = Workbook::open_in_memory().unwrap();

        let mut ragged = notes_section("Report", "v1");
        ragged.rows.push(vec![]);
        assert!(wb.write_sections(&[ragged]).is_err());

        assert!(wb.write_sections(&[notes_section(META_TABLE, "x")]).is_err());
        assert!(wb.write_sections(&[notes_section("sqlite_master2", "x")]).is_err());
        assert!(!wb.has_section("Report").unwrap());
    }

    #[test]
    fn load_matches_round_trips_scores() {
        let mut wb = Workbook::open_in_memory().unwrap();
        wb.write_sections(&[Section::from_rows("Sheet1", &sample_matches())])
            .unwrap();

        let table = wb.load_matches("Sheet1").unwrap();
        assert_eq!(table.rows(), sample_matches().as_slice());
    }

    #[test]
    fn load_matches_without_section_asks_for_import() {
        let wb = Workbook::open_in_memory().unwrap();
        let err = wb.load_matches("Sheet1").unwrap_err();
        assert!(err.to_string().contains("import a match table first"));
    }

    #[test]
    fn load_matches_rejects_hand_edited_text_score() {
        let mut wb = Workbook::open_in_memory().unwrap();
        wb.write_sections(&[Section::from_rows("Sheet1", &sample_matches())])
            .unwrap();
        // SQLite stores text in an INTEGER column when it does not look numeric.
        wb.conn
            .execute("UPDATE \"Sheet1\" SET score_a = 'three' WHERE rowid = 1", [])
            .unwrap();

        let err = wb.load_matches("Sheet1").unwrap_err();
        let message = format!("{err:#}");
        assert!(message.contains("invalid score"), "unexpected error: {message}");
    }

    #[test]
    fn state_round_trip_and_overwrite() {
        let mut wb = Workbook::open_in_memory().unwrap();
        assert!(wb.load_state("last_update").unwrap().is_none());

        wb.write_sections_with_state(&[], "last_update", &serde_json::json!({"pending": 2}))
            .unwrap();
        wb.write_sections_with_state(&[], "last_update", &serde_json::json!({"pending": 0}))
            .unwrap();

        let value = wb.load_state("last_update").unwrap().unwrap();
        assert_eq!(value["pending"], 0);
    }

    #[test]
    fn sections_and_state_commit_together() {
        let mut wb = Workbook::open_in_memory().unwrap();
        wb.write_sections_with_state(
            &[notes_section("Report", "v1")],
            "last_update",
            &serde_json::json!({"sections": 1}),
        )
        .unwrap();

        assert!(wb.has_section("Report").unwrap());
        assert_eq!(wb.load_state("last_update").unwrap().unwrap()["sections"], 1);
    }

    #[test]
    fn file_backed_workbook_persists_across_opens() {
        let dir = std::env::temp_dir().join("festival_workbook_persist");
        let _ = std::fs::remove_dir_all(&dir);
        let path = dir.join("nested").join("festival.db");

        {
            let mut wb = Workbook::open(&path).unwrap();
            wb.write_sections(&[notes_section("Notes", "hello")]).unwrap();
        }
        let wb = Workbook::open(&path).unwrap();
        let notes = wb.read_section("Notes").unwrap().unwrap();
        assert_eq!(notes.rows, vec![vec![Cell::Text("hello".into())]]);

        let _ = std::fs::remove_dir_all(&dir);
    }
}
