// Configuration loading and parsing (festival.toml).

use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::workbook::META_TABLE;

/// File name of the single configuration file inside `config/`.
pub const CONFIG_FILE: &str = "festival.toml";

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("validation error for field `{field}`: {message}")]
    ValidationError { field: String, message: String },

    #[error("failed to initialize config from defaults: {message}")]
    DefaultsCopyError { message: String },
}

// ---------------------------------------------------------------------------
// Top-level assembled Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Config {
    pub tournament: TournamentConfig,
    /// Location of the workbook document, already resolved against the base
    /// directory the config was loaded from.
    pub workbook_path: PathBuf,
    pub sections: SectionNames,
    /// Default spreadsheet export target, resolved like `workbook_path`.
    pub xlsx_path: Option<PathBuf>,
}

// ---------------------------------------------------------------------------
// festival.toml structs
// ---------------------------------------------------------------------------

/// Raw deserialization target for the entire festival.toml file.
#[derive(Debug, Clone, Deserialize)]
struct FestivalFile {
    tournament: TournamentConfig,
    workbook: WorkbookSection,
    #[serde(default)]
    sections: SectionNames,
    #[serde(default)]
    export: ExportSection,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TournamentConfig {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
struct WorkbookSection {
    path: String,
}

/// Names of the three sections written into the workbook. The defaults match
/// the sheet names organizers already use in their spreadsheets.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SectionNames {
    pub matches: String,
    pub standings: String,
    pub keepers: String,
}

impl Default for SectionNames {
    fn default() -> Self {
        SectionNames {
            matches: "Sheet1".into(),
            standings: "Classificacao".into(),
            keepers: "RankingGoleiros".into(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
struct ExportSection {
    #[serde(default)]
    xlsx_path: Option<String>,
}

// ---------------------------------------------------------------------------
// Loading logic
// ---------------------------------------------------------------------------

/// Load and validate configuration from `config/festival.toml` relative to
/// `base_dir`. Relative paths inside the file are resolved against `base_dir`.
///
/// This does not copy defaults; prefer `load_config()` for normal startup.
pub fn load_config_from(base_dir: &Path) -> Result<Config, ConfigError> {
    let path = base_dir.join("config").join(CONFIG_FILE);
    let text = read_file(&path)?;
    let file: FestivalFile = toml::from_str(&text).map_err(|e| ConfigError::ParseError {
        path: path.clone(),
        source: e,
    })?;

    validate(&file)?;

    let config = Config {
        tournament: file.tournament,
        workbook_path: base_dir.join(file.workbook.path.trim()),
        sections: file.sections,
        xlsx_path: file.export.xlsx_path.map(|p| base_dir.join(p.trim())),
    };

    Ok(config)
}

/// Copy `defaults/festival.toml` to `config/festival.toml` when the latter is
/// missing. Returns the path written, or `None` if a config already existed.
/// An existing config is never overwritten.
pub fn ensure_config_file(base_dir: &Path) -> Result<Option<PathBuf>, ConfigError> {
    let target = base_dir.join("config").join(CONFIG_FILE);
    if target.exists() {
        return Ok(None);
    }

    let source = base_dir.join("defaults").join(CONFIG_FILE);
    let copy_error = |message: String| ConfigError::DefaultsCopyError { message };
    let content = std::fs::read(&source).map_err(|e| {
        copy_error(format!(
            "no config/{CONFIG_FILE} in {} and no default to copy from {}: {e}; \
             run from the project root or pass --base-dir",
            base_dir.display(),
            source.display()
        ))
    })?;

    if let Some(dir) = target.parent() {
        std::fs::create_dir_all(dir)
            .map_err(|e| copy_error(format!("failed to create {}: {e}", dir.display())))?;
    }
    let mut dest = match std::fs::OpenOptions::new().write(true).create_new(true).open(&target) {
        Ok(dest) => dest,
        // Created by a concurrent run between the check above and here.
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => return Ok(None),
        Err(e) => return Err(copy_error(format!("failed to create {}: {e}", target.display()))),
    };
    std::io::Write::write_all(&mut dest, &content)
        .map_err(|e| copy_error(format!("failed to write {}: {e}", target.display())))?;

    Ok(Some(target))
}

/// Copies the default config into `base_dir/config` if needed and loads it.
pub fn load_config(base_dir: &Path) -> Result<Config, ConfigError> {
    ensure_config_file(base_dir)?;
    load_config_from(base_dir)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn read_file(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound {
        path: path.to_path_buf(),
    })
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn validate(config: &FestivalFile) -> Result<(), ConfigError> {
    if config.tournament.name.trim().is_empty() {
        return Err(ConfigError::ValidationError {
            field: "tournament.name".into(),
            message: "must not be empty".into(),
        });
    }

    if config.workbook.path.trim().is_empty() {
        return Err(ConfigError::ValidationError {
            field: "workbook.path".into(),
            message: "must not be empty".into(),
        });
    }

    let s = &config.sections;
    let section_fields: &[(&str, &str)] = &[
        ("sections.matches", &s.matches),
        ("sections.standings", &s.standings),
        ("sections.keepers", &s.keepers),
    ];
    for (field, name) in section_fields {
        if name.trim().is_empty() {
            return Err(ConfigError::ValidationError {
                field: field.to_string(),
                message: "must not be empty".into(),
            });
        }
        if name.eq_ignore_ascii_case(META_TABLE) {
            return Err(ConfigError::ValidationError {
                field: field.to_string(),
                message: format!("`{META_TABLE}` is reserved for workbook metadata"),
            });
        }
        if name.to_ascii_lowercase().starts_with("sqlite_") {
            return Err(ConfigError::ValidationError {
                field: field.to_string(),
                message: format!("`{name}` uses the reserved `sqlite_` prefix"),
            });
        }
    }

    // SQLite table names are case-insensitive, so "sheet1" and "Sheet1"
    // would be the same section.
    for (i, (field_a, a)) in section_fields.iter().enumerate() {
        for (field_b, b) in &section_fields[i + 1..] {
            if a.eq_ignore_ascii_case(b) {
                return Err(ConfigError::ValidationError {
                    field: field_b.to_string(),
                    message: format!("duplicates {field_a} (`{a}`)"),
                });
            }
        }
    }

    if let Some(xlsx) = &config.export.xlsx_path {
        if xlsx.trim().is_empty() {
            return Err(ConfigError::ValidationError {
                field: "export.xlsx_path".into(),
                message: "must not be empty when set".into(),
            });
        }
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const DEFAULT_FESTIVAL_TOML: &str = include_str!("../../../defaults/festival.toml");

    /// Fresh scratch directory with an empty `config/` inside.
    fn scratch(name: &str) -> PathBuf {
        let tmp = std::env::temp_dir().join(name);
        let _ = fs::remove_dir_all(&tmp);
        fs::create_dir_all(tmp.join("config")).unwrap();
        tmp
    }

    fn write_config(base: &Path, text: &str) {
        fs::write(base.join("config").join(CONFIG_FILE), text).unwrap();
    }

    fn expect_validation_field(err: ConfigError, expected: &str) {
        match &err {
            ConfigError::ValidationError { field, .. } => assert_eq!(field, expected),
            other => panic!("expected ValidationError, got: {other}"),
        }
    }

    #[test]
    fn load_shipped_defaults() {
        let tmp = scratch("festival_config_defaults");
        write_config(&tmp, DEFAULT_FESTIVAL_TOML);

        let config = load_config_from(&tmp).expect("shipped defaults should load");
        assert_eq!(config.tournament.name, "Festival 2025");
        assert_eq!(config.workbook_path, tmp.join("data/festival.db"));
        assert_eq!(config.sections, SectionNames::default());
        assert_eq!(
            config.xlsx_path,
            Some(tmp.join("tabela_festival_atualizada.xlsx"))
        );

        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn sections_and_export_are_optional() {
        let tmp = scratch("festival_config_minimal");
        write_config(
            &tmp,
            r#"
[tournament]
name = "Copa"

[workbook]
path = "copa.db"
"#,
        );

        let config = load_config_from(&tmp).unwrap();
        assert_eq!(config.sections.matches, "Sheet1");
        assert_eq!(config.sections.standings, "Classificacao");
        assert_eq!(config.sections.keepers, "RankingGoleiros");
        assert!(config.xlsx_path.is_none());

        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn partial_sections_keep_remaining_defaults() {
        let tmp = scratch("festival_config_partial_sections");
        write_config(
            &tmp,
            r#"
[tournament]
name = "Copa"

[workbook]
path = "copa.db"

[sections]
standings = "Table"
"#,
        );

        let config = load_config_from(&tmp).unwrap();
        assert_eq!(config.sections.matches, "Sheet1");
        assert_eq!(config.sections.standings, "Table");
        assert_eq!(config.sections.keepers, "RankingGoleiros");

        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn absolute_workbook_path_is_kept() {
        let tmp = scratch("festival_config_abs_path");
        let abs = std::env::temp_dir().join("elsewhere.db");
        write_config(
            &tmp,
            &format!(
                "[tournament]\nname = \"Copa\"\n\n[workbook]\npath = {:?}\n",
                abs.display().to_string()
            ),
        );

        let config = load_config_from(&tmp).unwrap();
        assert_eq!(config.workbook_path, abs);

        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn rejects_empty_tournament_name() {
        let tmp = scratch("festival_config_empty_name");
        write_config(
            &tmp,
            "[tournament]\nname = \"  \"\n\n[workbook]\npath = \"f.db\"\n",
        );

        expect_validation_field(load_config_from(&tmp).unwrap_err(), "tournament.name");
        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn rejects_empty_workbook_path() {
        let tmp = scratch("festival_config_empty_path");
        write_config(&tmp, "[tournament]\nname = \"Copa\"\n\n[workbook]\npath = \"\"\n");

        expect_validation_field(load_config_from(&tmp).unwrap_err(), "workbook.path");
        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn rejects_duplicate_section_names_case_insensitively() {
        let tmp = scratch("festival_config_dup_sections");
        write_config(
            &tmp,
            r#"
[tournament]
name = "Copa"

[workbook]
path = "copa.db"

[sections]
matches = "Games"
standings = "games"
"#,
        );

        expect_validation_field(load_config_from(&tmp).unwrap_err(), "sections.standings");
        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn rejects_reserved_section_names() {
        let tmp = scratch("festival_config_reserved");
        write_config(
            &tmp,
            "[tournament]\nname = \"Copa\"\n\n[workbook]\npath = \"c.db\"\n\n[sections]\nkeepers = \"festival_meta\"\n",
        );
        expect_validation_field(load_config_from(&tmp).unwrap_err(), "sections.keepers");

        write_config(
            &tmp,
            "[tournament]\nname = \"Copa\"\n\n[workbook]\npath = \"c.db\"\n\n[sections]\nmatches = \"sqlite_stuff\"\n",
        );
        expect_validation_field(load_config_from(&tmp).unwrap_err(), "sections.matches");

        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn file_not_found_for_missing_config() {
        let tmp = scratch("festival_config_missing");

        match load_config_from(&tmp).unwrap_err() {
            ConfigError::FileNotFound { path } => assert!(path.ends_with(CONFIG_FILE)),
            other => panic!("expected FileNotFound, got: {other}"),
        }

        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn parse_error_for_invalid_toml() {
        let tmp = scratch("festival_config_invalid_toml");
        write_config(&tmp, "this is not valid [[[ toml");

        match load_config_from(&tmp).unwrap_err() {
            ConfigError::ParseError { path, .. } => assert!(path.ends_with(CONFIG_FILE)),
            other => panic!("expected ParseError, got: {other}"),
        }

        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn ensure_config_file_copies_the_default() {
        let tmp = std::env::temp_dir().join("festival_config_ensure_copies");
        let _ = fs::remove_dir_all(&tmp);
        fs::create_dir_all(tmp.join("defaults")).unwrap();
        fs::write(tmp.join("defaults").join(CONFIG_FILE), DEFAULT_FESTIVAL_TOML).unwrap();

        assert!(!tmp.join("config").exists());

        let copied = ensure_config_file(&tmp).expect("should succeed");
        assert_eq!(copied, Some(tmp.join("config").join(CONFIG_FILE)));
        assert_eq!(
            fs::read_to_string(tmp.join("config").join(CONFIG_FILE)).unwrap(),
            DEFAULT_FESTIVAL_TOML
        );

        // And the copied file is immediately loadable.
        load_config(&tmp).expect("copied defaults should load");

        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn ensure_config_file_keeps_existing_config() {
        let tmp = scratch("festival_config_ensure_skips");
        fs::create_dir_all(tmp.join("defaults")).unwrap();
        fs::write(tmp.join("defaults").join(CONFIG_FILE), DEFAULT_FESTIVAL_TOML).unwrap();
        write_config(&tmp, "# custom\n");

        assert_eq!(ensure_config_file(&tmp).expect("should succeed"), None);

        let content = fs::read_to_string(tmp.join("config").join(CONFIG_FILE)).unwrap();
        assert_eq!(content, "# custom\n");

        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn ensure_config_file_without_default_or_config_fails() {
        let tmp = std::env::temp_dir().join("festival_config_both_missing");
        let _ = fs::remove_dir_all(&tmp);
        fs::create_dir_all(&tmp).unwrap();

        match ensure_config_file(&tmp).unwrap_err() {
            ConfigError::DefaultsCopyError { message } => {
                assert!(message.contains("no default to copy"));
            }
            other => panic!("expected DefaultsCopyError, got: {other}"),
        }
        assert!(!tmp.join("config").exists());

        let _ = fs::remove_dir_all(&tmp);
    }
}
