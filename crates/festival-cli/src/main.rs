// Festival standings command-line entry point.
//
// Every editing command runs one full cycle: load the match table, apply the
// edit, recompute standings and the goalkeeper ranking, and write all three
// sections back to the workbook in a single transaction.

mod commands;
mod render;

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use festival_core::config;
use festival_core::matches::MAX_SCORE;
use tracing::info;

#[derive(Parser)]
#[command(name = "festival")]
#[command(about = "Record match results and rebuild tournament standings and goalkeeper rankings")]
struct Cli {
    /// Directory containing config/ and defaults/
    #[arg(long, default_value = ".")]
    base_dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replace the match table with the rows of a spreadsheet or CSV file and
    /// rebuild the tables
    Import {
        /// Match sheet: an .xlsx file (read from the matches sheet) or a CSV export
        file: PathBuf,
    },
    /// Enter the result of a match (rows are numbered from 1)
    SetScore {
        row: usize,
        #[arg(value_parser = clap::value_parser!(u32).range(..=i64::from(MAX_SCORE)))]
        score_a: u32,
        #[arg(value_parser = clap::value_parser!(u32).range(..=i64::from(MAX_SCORE)))]
        score_b: u32,
    },
    /// Remove the result of a match
    ClearScore { row: usize },
    /// Rebuild standings and the goalkeeper ranking from the stored matches
    Update,
    /// Print the stored standings and goalkeeper ranking
    Show,
    /// List matches that are still missing results
    Pending,
    /// Export the match table and both rankings
    Export {
        /// Spreadsheet target (defaults to export.xlsx_path from the config)
        #[arg(long)]
        xlsx: Option<PathBuf>,
        /// Directory for one CSV file per section
        #[arg(long)]
        csv_dir: Option<PathBuf>,
    },
}

fn main() -> anyhow::Result<()> {
    init_tracing()?;
    let cli = Cli::parse();

    let config = config::load_config(&cli.base_dir).context("failed to load configuration")?;
    info!(
        "Config loaded: {}, workbook at {}",
        config.tournament.name,
        config.workbook_path.display()
    );

    match cli.command {
        Commands::Import { file } => commands::import(&config, &file),
        Commands::SetScore {
            row,
            score_a,
            score_b,
        } => commands::set_score(&config, row, score_a, score_b),
        Commands::ClearScore { row } => commands::clear_score(&config, row),
        Commands::Update => commands::update(&config),
        Commands::Show => commands::show(&config),
        Commands::Pending => commands::pending(&config),
        Commands::Export { xlsx, csv_dir } => commands::export(&config, xlsx, csv_dir),
    }
}

/// Log to stderr so tables printed on stdout stay clean.
fn init_tracing() -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("festival_core=info,festival_cli=info,warn")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set tracing subscriber")?;

    Ok(())
}
