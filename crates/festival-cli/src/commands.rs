// Subcommand handlers. Each one opens the workbook named by the config,
// does its work, and prints the user-facing result on stdout.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use festival_core::config::Config;
use festival_core::export::{export_csv_dir, export_xlsx};
use festival_core::matches::{load_matches_csv, load_matches_xlsx, MatchError, MatchTable};
use festival_core::report::{self, run_cycle, CycleOutcome, Report};
use festival_core::workbook::Workbook;

use crate::render;

fn open_workbook(config: &Config) -> Result<Workbook> {
    Workbook::open(&config.workbook_path)
}

fn load_table(config: &Config, workbook: &Workbook) -> Result<MatchTable> {
    workbook.load_matches(&config.sections.matches)
}

/// Run a cycle and report the outcome. Nothing is printed unless the write
/// has committed.
fn save(config: &Config, workbook: &mut Workbook, table: MatchTable) -> Result<CycleOutcome> {
    let outcome = run_cycle(workbook, table, &config.sections)?;
    print_signals(&outcome);
    Ok(outcome)
}

fn print_signals(outcome: &CycleOutcome) {
    if outcome.report.pending > 0 {
        println!(
            "{} of {} matches still missing results",
            outcome.report.pending, outcome.summary.matches
        );
    }
    println!(
        "Saved {} matches, {} teams, {} goalkeepers",
        outcome.summary.matches, outcome.summary.teams, outcome.summary.keepers
    );
}

fn is_xlsx(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("xlsx") || e.eq_ignore_ascii_case("xlsm"))
}

pub fn import(config: &Config, file: &Path) -> Result<()> {
    let table = if is_xlsx(file) {
        load_matches_xlsx(file, &config.sections.matches)
    } else {
        load_matches_csv(file)
    }
    .with_context(|| format!("failed to import {}", file.display()))?;
    if table.is_empty() {
        bail!("{} contains no matches", file.display());
    }
    let mut workbook = open_workbook(config)?;
    let outcome = save(config, &mut workbook, table)?;
    print!("{}", render::standings(&outcome.report));
    Ok(())
}

/// Apply `apply` to the stored match table and run a cycle. Returns the
/// edited match line once the write has committed.
fn edit_match(
    config: &Config,
    row: usize,
    apply: impl FnOnce(&mut MatchTable) -> Result<(), MatchError>,
) -> Result<String> {
    let mut workbook = open_workbook(config)?;
    let mut table = load_table(config, &workbook)?;
    apply(&mut table)?;
    let line = table
        .get(row)
        .map(|m| render::match_line(row, m))
        .with_context(|| format!("match {row} does not exist"))?;
    save(config, &mut workbook, table)?;
    Ok(line)
}

pub fn set_score(config: &Config, row: usize, score_a: u32, score_b: u32) -> Result<()> {
    let line = edit_match(config, row, |table| table.set_score(row, score_a, score_b))?;
    println!("{line}");
    Ok(())
}

pub fn clear_score(config: &Config, row: usize) -> Result<()> {
    let line = edit_match(config, row, |table| table.clear_score(row))?;
    println!("{line}");
    Ok(())
}

pub fn update(config: &Config) -> Result<()> {
    let mut workbook = open_workbook(config)?;
    let table = load_table(config, &workbook)?;
    let outcome = save(config, &mut workbook, table)?;
    print!("{}", render::standings(&outcome.report));
    println!();
    print!("{}", render::keepers(&outcome.report));
    Ok(())
}

pub fn show(config: &Config) -> Result<()> {
    let workbook = open_workbook(config)?;
    println!("{}", config.tournament.name);
    match report::last_update(&workbook)? {
        Some(summary) => println!(
            "Last updated {} ({} of {} matches pending)",
            summary.updated_at.format("%Y-%m-%d %H:%M UTC"),
            summary.pending,
            summary.matches
        ),
        None => println!("No update has been saved yet"),
    }

    for name in [&config.sections.standings, &config.sections.keepers] {
        println!();
        match workbook.read_section(name)? {
            Some(section) => print!("{}", render::section(&section)),
            None => println!("{name}: not computed yet (run `festival update`)"),
        }
    }
    Ok(())
}

pub fn pending(config: &Config) -> Result<()> {
    let workbook = open_workbook(config)?;
    let table = load_table(config, &workbook)?;
    let mut count = 0;
    for (row, m) in table.pending_rows() {
        println!("{}", render::match_line(row, m));
        count += 1;
    }
    println!("{count} of {} matches still missing results", table.len());
    Ok(())
}

pub fn export(config: &Config, xlsx: Option<PathBuf>, csv_dir: Option<PathBuf>) -> Result<()> {
    let xlsx = xlsx.or_else(|| {
        if csv_dir.is_some() {
            None
        } else {
            config.xlsx_path.clone()
        }
    });
    if xlsx.is_none() && csv_dir.is_none() {
        bail!("no export target: pass --xlsx or --csv-dir, or set export.xlsx_path in the config");
    }

    let workbook = open_workbook(config)?;
    let table = load_table(config, &workbook)?;
    let report = Report::build(&table);
    let sections = report.sections(&table, &config.sections);

    if let Some(path) = xlsx {
        export_xlsx(&path, &sections)?;
        println!("Wrote {}", path.display());
    }
    if let Some(dir) = csv_dir {
        for path in export_csv_dir(&dir, &sections)? {
            println!("Wrote {}", path.display());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use festival_core::config::{SectionNames, TournamentConfig};
    use festival_core::matches::MatchRow;

    fn scratch_config(name: &str) -> Config {
        let dir = std::env::temp_dir().join(name);
        let _ = std::fs::remove_dir_all(&dir);
        let config = Config {
            tournament: TournamentConfig {
                name: "Test Cup".into(),
            },
            workbook_path: dir.join("festival.db"),
            sections: SectionNames::default(),
            xlsx_path: None,
        };

        let table = MatchTable::from_rows(vec![MatchRow {
            team_a: "Lions".into(),
            team_b: "Tigers".into(),
            score_a: None,
            score_b: None,
            keeper_a: "Ana".into(),
            keeper_b: "Bia".into(),
        }])
        .unwrap();
        let mut workbook = open_workbook(&config).unwrap();
        run_cycle(&mut workbook, table, &config.sections).unwrap();
        config
    }

    #[test]
    fn edit_returns_the_line_after_saving() {
        let config = scratch_config("festival_cli_edit_saves");

        let line = edit_match(&config, 1, |t| t.set_score(1, 2, 0)).unwrap();
        assert_eq!(line, "#1  Lions 2 x 0 Tigers");

        let stored = load_table(&config, &open_workbook(&config).unwrap()).unwrap();
        assert_eq!(stored.get(1).unwrap().score_a, Some(2));
    }

    #[test]
    fn failed_save_yields_no_line_and_keeps_the_stored_table() {
        let mut config = scratch_config("festival_cli_edit_fails");
        // A reserved section name makes the write fail before anything commits.
        config.sections.keepers = festival_core::workbook::META_TABLE.into();

        assert!(edit_match(&config, 1, |t| t.set_score(1, 2, 0)).is_err());

        let stored = load_table(&config, &open_workbook(&config).unwrap()).unwrap();
        assert_eq!(stored.get(1).unwrap().score_a, None);
    }

    #[test]
    fn import_picks_the_loader_from_the_extension() {
        assert!(is_xlsx(Path::new("tabela.xlsx")));
        assert!(is_xlsx(Path::new("TABELA.XLSX")));
        assert!(!is_xlsx(Path::new("matches.csv")));
        assert!(!is_xlsx(Path::new("matches")));
    }
}
