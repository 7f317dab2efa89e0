// Goalkeeper ranking: fewest goals conceded per match played.

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

use crate::matches::CompletedMatch;
use crate::section::{Cell, ColumnKind, TabularRow};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KeeperRow {
    pub keeper: String,
    pub played: u32,
    pub goals_conceded: u32,
    /// Goals conceded per match, rounded to 2 decimals. 0 for a keeper with
    /// no completed matches.
    pub average: f64,
}

impl KeeperRow {
    fn empty(keeper: &str) -> Self {
        KeeperRow {
            keeper: keeper.to_string(),
            played: 0,
            goals_conceded: 0,
            average: 0.0,
        }
    }
}

impl TabularRow for KeeperRow {
    const COLUMNS: &'static [(&'static str, ColumnKind)] = &[
        ("keeper", ColumnKind::Text),
        ("played", ColumnKind::Integer),
        ("goals_conceded", ColumnKind::Integer),
        ("average", ColumnKind::Real),
    ];

    fn cells(&self) -> Vec<Cell> {
        vec![
            self.keeper.as_str().into(),
            self.played.into(),
            self.goals_conceded.into(),
            Cell::Real(self.average),
        ]
    }
}

/// Round to 2 decimal places, halves to even (0.125 → 0.12).
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round_ties_even() / 100.0
}

/// Per-match conceded records: keeper A concedes B's score and vice versa.
fn conceded<'a>(m: &CompletedMatch<'a>) -> [(&'a str, u32); 2] {
    [(m.keeper_a, m.score_b), (m.keeper_b, m.score_a)]
}

/// Build the goalkeeper ranking.
///
/// `keepers` is every goalkeeper name in the raw match table; each gets
/// exactly one row. Rows are ordered by average ascending. Equal averages put
/// the keeper with more matches first, so a keeper who has not played yet
/// never outranks a clean sheet.
pub fn compute_keeper_ranking(
    complete: &[CompletedMatch<'_>],
    keepers: &BTreeSet<&str>,
) -> Vec<KeeperRow> {
    let mut table: BTreeMap<&str, KeeperRow> = keepers
        .iter()
        .map(|&keeper| (keeper, KeeperRow::empty(keeper)))
        .collect();

    for m in complete {
        for (keeper, goals) in conceded(m) {
            let row = table
                .entry(keeper)
                .or_insert_with(|| KeeperRow::empty(keeper));
            row.played += 1;
            row.goals_conceded += goals;
        }
    }

    let mut rows: Vec<KeeperRow> = table
        .into_values()
        .map(|mut row| {
            if row.played > 0 {
                row.average = round2(f64::from(row.goals_conceded) / f64::from(row.played));
            }
            row
        })
        .collect();

    rows.sort_by(|a, b| {
        a.average
            .partial_cmp(&b.average)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| b.played.cmp(&a.played))
    });
    rows
}
