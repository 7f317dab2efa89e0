// Plain-text table rendering for terminal output.

use std::fmt::Write;

use festival_core::matches::MatchRow;
use festival_core::report::Report;
use festival_core::section::{Cell, ColumnKind, Section};

/// Render a section as a left/right aligned text table with its name as title.
pub fn section(section: &Section) -> String {
    let header: Vec<String> = section.column_names().map(str::to_string).collect();
    let body: Vec<Vec<String>> = section
        .rows
        .iter()
        .map(|row| row.iter().map(render_cell).collect())
        .collect();

    let mut widths: Vec<usize> = header.iter().map(|h| h.chars().count()).collect();
    for row in &body {
        for (w, cell) in widths.iter_mut().zip(row) {
            *w = (*w).max(cell.chars().count());
        }
    }
    let numeric: Vec<bool> = section
        .columns
        .iter()
        .map(|c| c.kind != ColumnKind::Text)
        .collect();

    let mut out = String::new();
    let _ = writeln!(out, "{}", section.name);
    push_line(&mut out, &header, &widths, &numeric);
    let rule: Vec<String> = widths.iter().map(|&w| "-".repeat(w)).collect();
    push_line(&mut out, &rule, &widths, &numeric);
    for row in &body {
        push_line(&mut out, row, &widths, &numeric);
    }
    out
}

fn render_cell(cell: &Cell) -> String {
    match cell {
        Cell::Real(x) => format!("{x:.2}"),
        other => other.to_string(),
    }
}

fn push_line(out: &mut String, cells: &[String], widths: &[usize], numeric: &[bool]) {
    let parts: Vec<String> = cells
        .iter()
        .zip(widths)
        .zip(numeric)
        .map(|((cell, &w), &right)| {
            if right {
                format!("{cell:>w$}")
            } else {
                format!("{cell:<w$}")
            }
        })
        .collect();
    let _ = writeln!(out, "{}", parts.join("  ").trim_end());
}

pub fn standings(report: &Report) -> String {
    section(&Section::from_rows("Standings", &report.standings))
}

pub fn keepers(report: &Report) -> String {
    section(&Section::from_rows("Goalkeepers", &report.keepers))
}

/// One match on a line, e.g. `#3  Lions 2 x 1 Tigers` or `#4  Bears - x - Wolves`.
pub fn match_line(row: usize, m: &MatchRow) -> String {
    let score = |s: Option<u32>| s.map_or_else(|| "-".to_string(), |v| v.to_string());
    format!(
        "#{row}  {} {} x {} {}",
        m.team_a,
        score(m.score_a),
        score(m.score_b),
        m.team_b
    )
}
