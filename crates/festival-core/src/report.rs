// One recompute-and-write cycle: match table in, three sections out.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::SectionNames;
use crate::keepers::{compute_keeper_ranking, KeeperRow};
use crate::matches::MatchTable;
use crate::section::Section;
use crate::standings::{compute_standings, StandingsRow};
use crate::workbook::Workbook;

/// Metadata key under which the last cycle's summary is stored.
pub const LAST_UPDATE_KEY: &str = "last_update";

/// Derived tables for one snapshot of the match table.
#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    pub standings: Vec<StandingsRow>,
    pub keepers: Vec<KeeperRow>,
    /// Matches excluded because a score is missing.
    pub pending: usize,
}

impl Report {
    /// Recompute everything from scratch. Pure: the same table always gives
    /// the same report.
    pub fn build(table: &MatchTable) -> Self {
        let split = table.completeness();
        Report {
            standings: compute_standings(&split.complete, &table.team_names()),
            keepers: compute_keeper_ranking(&split.complete, &table.keeper_names()),
            pending: split.pending,
        }
    }

    /// The match table and both derived tables as named sections, in that
    /// order.
    pub fn sections(&self, table: &MatchTable, names: &SectionNames) -> Vec<Section> {
        vec![
            Section::from_rows(names.matches.as_str(), table.rows()),
            Section::from_rows(names.standings.as_str(), &self.standings),
            Section::from_rows(names.keepers.as_str(), &self.keepers),
        ]
    }
}

/// What the last completed cycle wrote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateSummary {
    pub updated_at: DateTime<Utc>,
    pub matches: usize,
    pub pending: usize,
    pub teams: usize,
    pub keepers: usize,
}

/// Outcome of a successful cycle.
#[derive(Debug, Clone)]
pub struct CycleOutcome {
    pub report: Report,
    pub summary: UpdateSummary,
}

/// Recompute the derived tables for `table` and write all three sections
/// plus the update summary to `workbook` in one transaction.
///
/// The table is taken by value: the caller hands over a snapshot and keeps
/// editing its own copy if it wants to.
pub fn run_cycle(workbook: &mut Workbook, table: MatchTable, names: &SectionNames) -> Result<CycleOutcome> {
    let report = Report::build(&table);
    if report.pending > 0 {
        warn!("{} matches excluded from the tables until their results are entered", report.pending);
    }

    let summary = UpdateSummary {
        updated_at: Utc::now(),
        matches: table.len(),
        pending: report.pending,
        teams: report.standings.len(),
        keepers: report.keepers.len(),
    };
    let summary_json = serde_json::to_value(&summary).context("failed to serialize update summary")?;

    workbook
        .write_sections_with_state(&report.sections(&table, names), LAST_UPDATE_KEY, &summary_json)
        .context("failed to save the workbook")?;

    info!(
        "updated {} matches ({} pending): {} teams, {} goalkeepers",
        summary.matches, summary.pending, summary.teams, summary.keepers
    );
    Ok(CycleOutcome { report, summary })
}

/// Summary of the last completed cycle, if any.
pub fn last_update(workbook: &Workbook) -> Result<Option<UpdateSummary>> {
    workbook
        .load_state(LAST_UPDATE_KEY)?
        .map(|value| serde_json::from_value(value).context("failed to decode last update summary"))
        .transpose()
}
