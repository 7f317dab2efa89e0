// Spreadsheet and CSV export of workbook sections.
//
// Both exporters write to a temporary sibling first and rename it over the
// target, so a failed export never leaves a half-written file behind.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use rust_xlsxwriter::Workbook as XlsxWorkbook;
use tracing::info;

use crate::section::{Cell, Section};

/// `<dir>/.<file>.tmp` next to `target`.
fn temp_sibling(target: &Path) -> Result<PathBuf> {
    let Some(file_name) = target.file_name().and_then(|n| n.to_str()) else {
        bail!("export target {} has no file name", target.display());
    };
    Ok(target.with_file_name(format!(".{file_name}.tmp")))
}

/// Move `tmp` over `target`, removing `tmp` if the move fails.
fn promote(tmp: &Path, target: &Path) -> Result<()> {
    std::fs::rename(tmp, target).map_err(|e| {
        let _ = std::fs::remove_file(tmp);
        anyhow::Error::new(e).context(format!("failed to replace {}", target.display()))
    })
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.display()))?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// XLSX
// ---------------------------------------------------------------------------

/// Write `sections` as worksheets of a new spreadsheet at `path`, one sheet
/// per section in order. An existing file at `path` is replaced.
pub fn export_xlsx(path: &Path, sections: &[Section]) -> Result<()> {
    if sections.is_empty() {
        bail!("nothing to export");
    }
    ensure_parent(path)?;
    let tmp = temp_sibling(path)?;

    let mut workbook = XlsxWorkbook::new();
    for section in sections {
        let sheet = workbook.add_worksheet();
        sheet
            .set_name(&section.name)
            .with_context(|| format!("invalid sheet name `{}`", section.name))?;

        for (col, name) in section.column_names().enumerate() {
            sheet
                .write_string(0, col as u16, name)
                .with_context(|| format!("failed to write header of `{}`", section.name))?;
        }
        for (r, row) in section.rows.iter().enumerate() {
            let xl_row = (r + 1) as u32;
            for (col, cell) in row.iter().enumerate() {
                let col = col as u16;
                match cell {
                    Cell::Empty => {}
                    Cell::Int(n) => {
                        sheet.write_number(xl_row, col, *n as f64)?;
                    }
                    Cell::Real(x) => {
                        sheet.write_number(xl_row, col, *x)?;
                    }
                    Cell::Text(s) => {
                        sheet.write_string(xl_row, col, s)?;
                    }
                }
            }
        }
    }

    if let Err(e) = workbook.save(&tmp) {
        let _ = std::fs::remove_file(&tmp);
        return Err(anyhow::Error::new(e).context(format!("failed to write {}", path.display())));
    }
    promote(&tmp, path)?;

    info!("exported {} sections to {}", sections.len(), path.display());
    Ok(())
}

// ---------------------------------------------------------------------------
// CSV
// ---------------------------------------------------------------------------

fn write_csv(path: &Path, section: &Section) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("failed to create {}", path.display()))?;
    writer.write_record(section.column_names())?;
    for row in &section.rows {
        writer.write_record(row.iter().map(|c| c.to_string()))?;
    }
    writer.flush()?;
    Ok(())
}

/// Write each section to `<dir>/<section>.csv`. Returns the written paths.
pub fn export_csv_dir(dir: &Path, sections: &[Section]) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("failed to create directory {}", dir.display()))?;

    let mut written = Vec::with_capacity(sections.len());
    for section in sections {
        if section.name.contains(['/', '\\']) || section.name.starts_with('.') {
            bail!("section name `{}` cannot be used as a file name", section.name);
        }
        let target = dir.join(format!("{}.csv", section.name));
        let tmp = temp_sibling(&target)?;
        if let Err(e) = write_csv(&tmp, section) {
            let _ = std::fs::remove_file(&tmp);
            return Err(e.context(format!("failed to export section `{}`", section.name)));
        }
        promote(&tmp, &target)?;
        written.push(target);
    }

    info!("exported {} sections to {}", sections.len(), dir.display());
    Ok(written)
}
