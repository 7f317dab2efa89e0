// Team standings: fold completed matches into one row per team.
//
// Each match contributes two team-perspective records (for/against swapped).
// Teams that appear in the match table but have not completed a match still
// get an all-zero row.

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

use crate::matches::CompletedMatch;
use crate::section::{Cell, ColumnKind, TabularRow};

pub const POINTS_FOR_WIN: u32 = 3;
pub const POINTS_FOR_DRAW: u32 = 1;

// ---------------------------------------------------------------------------
// Team-perspective records
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Win,
    Draw,
    Loss,
}

impl Outcome {
    pub fn from_goals(goals_for: u32, goals_against: u32) -> Self {
        match goals_for.cmp(&goals_against) {
            std::cmp::Ordering::Greater => Outcome::Win,
            std::cmp::Ordering::Equal => Outcome::Draw,
            std::cmp::Ordering::Less => Outcome::Loss,
        }
    }

    pub fn points(self) -> u32 {
        match self {
            Outcome::Win => POINTS_FOR_WIN,
            Outcome::Draw => POINTS_FOR_DRAW,
            Outcome::Loss => 0,
        }
    }
}

/// One side of a completed match, seen from that team.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TeamPerspective<'a> {
    pub team: &'a str,
    pub goals_for: u32,
    pub goals_against: u32,
}

impl TeamPerspective<'_> {
    pub fn outcome(&self) -> Outcome {
        Outcome::from_goals(self.goals_for, self.goals_against)
    }
}

/// Both team-perspective records of a completed match.
pub fn perspectives<'a>(m: &CompletedMatch<'a>) -> [TeamPerspective<'a>; 2] {
    [
        TeamPerspective {
            team: m.team_a,
            goals_for: m.score_a,
            goals_against: m.score_b,
        },
        TeamPerspective {
            team: m.team_b,
            goals_for: m.score_b,
            goals_against: m.score_a,
        },
    ]
}

// ---------------------------------------------------------------------------
// Standings rows
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StandingsRow {
    /// Rank in the table, starting at 1.
    pub position: usize,
    pub team: String,
    pub played: u32,
    pub points: u32,
    pub wins: u32,
    pub draws: u32,
    pub losses: u32,
    pub goals_for: u32,
    pub goals_against: u32,
    pub goal_diff: i64,
}

impl StandingsRow {
    fn empty(team: &str) -> Self {
        StandingsRow {
            position: 0,
            team: team.to_string(),
            played: 0,
            points: 0,
            wins: 0,
            draws: 0,
            losses: 0,
            goals_for: 0,
            goals_against: 0,
            goal_diff: 0,
        }
    }

    fn record(&mut self, p: &TeamPerspective<'_>) {
        let outcome = p.outcome();
        self.played += 1;
        self.points += outcome.points();
        match outcome {
            Outcome::Win => self.wins += 1,
            Outcome::Draw => self.draws += 1,
            Outcome::Loss => self.losses += 1,
        }
        self.goals_for += p.goals_for;
        self.goals_against += p.goals_against;
        self.goal_diff = i64::from(self.goals_for) - i64::from(self.goals_against);
    }
}

impl TabularRow for StandingsRow {
    const COLUMNS: &'static [(&'static str, ColumnKind)] = &[
        ("position", ColumnKind::Integer),
        ("team", ColumnKind::Text),
        ("played", ColumnKind::Integer),
        ("points", ColumnKind::Integer),
        ("wins", ColumnKind::Integer),
        ("draws", ColumnKind::Integer),
        ("losses", ColumnKind::Integer),
        ("goals_for", ColumnKind::Integer),
        ("goals_against", ColumnKind::Integer),
        ("goal_diff", ColumnKind::Integer),
    ];

    fn cells(&self) -> Vec<Cell> {
        vec![
            Cell::Int(self.position as i64),
            self.team.as_str().into(),
            self.played.into(),
            self.points.into(),
            self.wins.into(),
            self.draws.into(),
            self.losses.into(),
            self.goals_for.into(),
            self.goals_against.into(),
            Cell::Int(self.goal_diff),
        ]
    }
}

/// Build the standings table.
///
/// `teams` is every team name in the raw match table; each gets exactly one
/// row. Rows are ordered by points, then goal difference, then goals scored,
/// all descending. Exact ties keep alphabetical order.
pub fn compute_standings(
    complete: &[CompletedMatch<'_>],
    teams: &BTreeSet<&str>,
) -> Vec<StandingsRow> {
    let mut table: BTreeMap<&str, StandingsRow> = teams
        .iter()
        .map(|&team| (team, StandingsRow::empty(team)))
        .collect();

    for m in complete {
        for p in perspectives(m) {
            table
                .entry(p.team)
                .or_insert_with(|| StandingsRow::empty(p.team))
                .record(&p);
        }
    }

    let mut rows: Vec<StandingsRow> = table.into_values().collect();
    rows.sort_by(|a, b| {
        b.points
            .cmp(&a.points)
            .then_with(|| b.goal_diff.cmp(&a.goal_diff))
            .then_with(|| b.goals_for.cmp(&a.goals_for))
    });
    for (i, row) in rows.iter_mut().enumerate() {
        row.position = i + 1;
    }
    rows
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
