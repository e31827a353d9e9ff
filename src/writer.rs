use rust_xlsxwriter::{Format, Workbook};
use std::collections::HashSet;
use std::path::Path;
use tempfile::Builder;
use tracing::{debug, trace};

use crate::domain::{ReportConfig, ReportError};
use crate::report::ReportSheet;

// Hard limit of the xlsx format, whatever the configuration asks for.
pub const XLSX_SHEET_NAME_LIMIT: usize = 31;
const FORBIDDEN_SHEET_CHARS: [char; 7] = ['[', ']', ':', '*', '?', '/', '\\'];

/// Turns group keys into sheet names xlsx accepts: forbidden characters
/// replaced, cut to the configured length, unique ignoring case.
pub struct SheetNamer {
    max_len: usize,
    used: HashSet<String>,
}

impl SheetNamer {
    pub fn new(max_len: usize) -> Self {
        Self {
            max_len: max_len.clamp(1, XLSX_SHEET_NAME_LIMIT),
            // Excel reserves this one.
            used: HashSet::from(["history".to_string()]),
        }
    }

    /// Fails only when the configured length leaves no room for a unique
    /// numbered name.
    pub fn assign(&mut self, key: &str) -> Result<String, ReportError> {
        let cleaned: String = key
            .chars()
            .map(|c| {
                if FORBIDDEN_SHEET_CHARS.contains(&c) || c.is_control() {
                    '_'
                } else {
                    c
                }
            })
            .collect();
        let cleaned = cleaned.trim_matches('\'');
        let base = if cleaned.is_empty() { "Sheet" } else { cleaned };

        let mut name = fit(base, self.max_len);
        let mut n = 1;
        while name.is_empty() || self.used.contains(&name.to_lowercase()) {
            n += 1;
            let digits = n.to_string();
            if digits.len() > self.max_len {
                return Err(ReportError::SheetNamesExhausted(self.max_len));
            }
            // Short limits drop the " (n)" decoration and keep only the number.
            let suffix = if digits.len() + 3 <= self.max_len {
                format!(" ({digits})")
            } else {
                digits
            };
            let keep = self.max_len - suffix.chars().count();
            name = format!("{}{suffix}", fit(base, keep));
        }
        if name != key {
            trace!("Group {key:?} written as sheet {name:?}");
        }
        self.used.insert(name.to_lowercase());
        Ok(name)
    }
}

fn fit(name: &str, max_len: usize) -> String {
    let cut: String = name.chars().take(max_len).collect();
    cut.trim_end_matches('\'').to_string()
}

// Text that is exactly how a number renders goes back out as a number cell.
fn numeric_text(text: &str) -> Option<f64> {
    text.parse::<f64>()
        .ok()
        .filter(|n| n.is_finite() && n.to_string() == text)
}

/// Writes every sheet into one workbook at `path`.
///
/// The workbook is serialised into a hidden temporary file next to `path`
/// and renamed over it once complete. If anything fails the temporary file
/// is removed when it goes out of scope, so `path` only ever holds a
/// finished workbook.
pub fn write_workbook(
    path: &Path,
    sheets: &[ReportSheet],
    config: &ReportConfig,
) -> Result<(), ReportError> {
    let mut workbook = Workbook::new();
    let header = Format::new().set_bold();

    for sheet in sheets {
        let worksheet = workbook.add_worksheet();
        worksheet.set_name(&sheet.name)?;
        worksheet.write_string_with_format(0, 0, &config.count_column, &header)?;
        worksheet.write_string_with_format(0, 1, &config.count_header, &header)?;
        for (idx, (message, count)) in sheet.counts.entries().iter().enumerate() {
            let row = idx as u32 + 1;
            match numeric_text(message) {
                Some(number) => worksheet.write_number(row, 0, number)?,
                None => worksheet.write_string(row, 0, message)?,
            };
            worksheet.write_number(row, 1, *count as f64)?;
        }
        worksheet.autofit();
        debug!(
            "Sheet {} with {} distinct values",
            sheet.name,
            sheet.counts.len()
        );
    }

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut tmp = Builder::new()
        .prefix(".relatorio-")
        .suffix(".tmp")
        .tempfile_in(dir)?;
    trace!("Serialising workbook to {}", tmp.path().display());
    workbook.save_to_writer(tmp.as_file_mut())?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}
