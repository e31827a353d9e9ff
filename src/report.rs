use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, instrument};

use crate::domain::{ReportConfig, ReportError};
use crate::table::RowTable;
use crate::writer::{SheetNamer, write_workbook};

/// Row indices sharing one group value.
#[derive(Debug, PartialEq)]
pub struct Partition {
    pub key: String,
    pub rows: Vec<usize>,
}

/// Distinct values with their occurrence counts, most frequent first.
/// Equal counts keep the order in which the values were first seen.
#[derive(Debug, PartialEq)]
pub struct FrequencyTable {
    entries: Vec<(String, usize)>,
}

impl FrequencyTable {
    /// Counts `values` over the given row indices. Empty cells count as "".
    pub fn count(values: &[Option<String>], rows: &[usize]) -> Self {
        let mut position: HashMap<&str, usize> = HashMap::new();
        let mut entries: Vec<(String, usize)> = Vec::new();
        for &ridx in rows {
            let value = values[ridx].as_deref().unwrap_or("");
            match position.get(value) {
                Some(&idx) => entries[idx].1 += 1,
                None => {
                    position.insert(value, entries.len());
                    entries.push((value.to_string(), 1));
                }
            }
        }
        // Stable sort, so ties stay in first-seen order.
        entries.sort_by(|a, b| b.1.cmp(&a.1));
        Self { entries }
    }

    pub fn entries(&self) -> &[(String, usize)] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn total(&self) -> usize {
        self.entries.iter().map(|(_, count)| count).sum()
    }
}

/// Groups row indices by key, in ascending key order. Every row lands in
/// exactly one partition; rows without a key go to `blank_key`.
pub fn partition_rows(keys: &[Option<String>], blank_key: &str) -> Vec<Partition> {
    let mut groups: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
    for (idx, key) in keys.iter().enumerate() {
        let key = key.as_deref().unwrap_or(blank_key);
        groups.entry(key).or_default().push(idx);
    }
    groups
        .into_iter()
        .map(|(key, rows)| Partition {
            key: key.to_string(),
            rows,
        })
        .collect()
}

pub struct ReportSheet {
    pub name: String,
    pub key: String,
    pub counts: FrequencyTable,
}

#[derive(Debug, PartialEq)]
pub struct SheetSummary {
    pub name: String,
    pub group: String,
    pub rows: usize,
    pub distinct_messages: usize,
}

#[derive(Debug)]
pub struct ReportSummary {
    pub output: PathBuf,
    pub input_rows: usize,
    pub sheets: Vec<SheetSummary>,
}

/// Loads `input`, counts the count column per group and writes one sheet per
/// group to `output`.
///
/// Nothing is written unless both required columns exist and the table has
/// at least one row. Every failure is returned; `output` is either a
/// complete workbook or absent.
#[instrument(skip_all, fields(input = %input.display()))]
pub fn build_report(
    input: &Path,
    output: &Path,
    config: &ReportConfig,
) -> Result<ReportSummary, ReportError> {
    let start_time = Instant::now();
    let table = RowTable::load(input.to_path_buf())?;
    if let Err(e) = table.require_columns(&config.required_columns()) {
        debug!("Available columns: {:?}", table.column_names());
        return Err(e);
    }
    if table.height() == 0 {
        return Err(ReportError::EmptyTable);
    }

    let groups = table.string_column(&config.group_column)?;
    let messages = table.string_column(&config.count_column)?;
    let partitions = partition_rows(&groups, &config.blank_group_name);
    debug!(
        "Split {} rows of {} into {} groups",
        table.height(),
        table.path().display(),
        partitions.len()
    );

    let mut namer = SheetNamer::new(config.sheet_name_max_len);
    let sheets = partitions
        .iter()
        .map(|partition| {
            Ok(ReportSheet {
                name: namer.assign(&partition.key)?,
                key: partition.key.clone(),
                counts: FrequencyTable::count(&messages, &partition.rows),
            })
        })
        .collect::<Result<Vec<ReportSheet>, ReportError>>()?;

    write_workbook(output, &sheets, config)?;
    info!(
        "Wrote {} sheets to {} in {}ms",
        sheets.len(),
        output.display(),
        start_time.elapsed().as_millis()
    );

    Ok(ReportSummary {
        output: output.to_path_buf(),
        input_rows: table.height(),
        sheets: sheets
            .into_iter()
            .map(|sheet| SheetSummary {
                rows: sheet.counts.total(),
                distinct_messages: sheet.counts.len(),
                name: sheet.name,
                group: sheet.key,
            })
            .collect(),
    })
}
