use calamine::{Data, Reader, open_workbook_auto};
use chrono::NaiveTime;
use polars::prelude::*;
use std::collections::HashSet;
use std::fs;
use std::io::{Error, ErrorKind};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, trace};

use crate::domain::ReportError;

#[derive(Debug)]
enum FileType {
    CSV,
    SPREADSHEET,
}

/// The input file loaded as a frame of string columns. Never modified after
/// loading; everything derived from it works on row indices.
#[derive(Debug)]
pub struct RowTable {
    path: PathBuf,
    frame: DataFrame,
}

impl RowTable {
    pub fn load(path: PathBuf) -> Result<Self, ReportError> {
        let metadata = fs::metadata(&path)?;
        if !metadata.is_file() {
            return Err(Error::new(ErrorKind::InvalidInput, "not a file").into());
        }

        let start_time = Instant::now();
        let frame = match RowTable::detect_file_type(&path)? {
            FileType::CSV => RowTable::load_csv(&path)?.collect()?,
            FileType::SPREADSHEET => RowTable::load_spreadsheet(&path)?,
        };
        info!(
            "Loaded {} rows x {} columns from {} in {}ms",
            frame.height(),
            frame.width(),
            path.display(),
            start_time.elapsed().as_millis()
        );
        debug!("Columns: {:?}", frame.get_column_names());

        Ok(RowTable { path, frame })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn height(&self) -> usize {
        self.frame.height()
    }

    pub fn column_names(&self) -> Vec<String> {
        self.frame
            .get_column_names()
            .into_iter()
            .map(|name| name.to_string())
            .collect()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.frame.get_column_index(name).is_some()
    }

    /// Fails with the first name in `names` that is not a column.
    pub fn require_columns(&self, names: &[&str]) -> Result<(), ReportError> {
        match names.iter().find(|name| !self.has_column(name)) {
            Some(missing) => Err(ReportError::MissingColumn(missing.to_string())),
            None => Ok(()),
        }
    }

    /// Values of one column rendered as text, one entry per row. Empty cells
    /// are `None`.
    pub fn string_column(&self, name: &str) -> Result<Vec<Option<String>>, ReportError> {
        let col = self.frame.column(name)?.cast(&DataType::String)?;
        let series = col.str()?;
        Ok(series
            .into_iter()
            .map(|value| value.map(str::to_string))
            .collect())
    }

    fn detect_file_type(path: &Path) -> Result<FileType, ReportError> {
        match path
            .extension()
            .and_then(|s| s.to_str())
            .map(|s| s.to_uppercase())
            .as_deref()
        {
            Some("CSV") => Ok(FileType::CSV),
            Some("XLSX") | Some("XLSM") | Some("XLSB") | Some("XLS") | Some("ODS") => {
                Ok(FileType::SPREADSHEET)
            }
            _ => Err(ReportError::UnknownFileType(path.to_path_buf())),
        }
    }

    // No type inference: every cell keeps the exact text of the file.
    fn load_csv(path: &Path) -> Result<LazyFrame, PolarsError> {
        LazyCsvReader::new(PlPath::Local(path.into()))
            .with_has_header(true)
            .with_infer_schema_length(Some(0))
            .finish()
    }

    // First worksheet only. Its first used row is the header.
    fn load_spreadsheet(path: &Path) -> Result<DataFrame, ReportError> {
        let mut workbook = open_workbook_auto(path)?;
        let range = workbook
            .worksheet_range_at(0)
            .ok_or(ReportError::NoWorksheet)??;

        let mut rows = range.rows();
        let Some(header) = rows.next() else {
            debug!("{} has an empty first worksheet", path.display());
            return Ok(DataFrame::empty());
        };
        let names = header_names(header.iter().map(cell_value));

        let mut values: Vec<Vec<Option<String>>> =
            vec![Vec::with_capacity(range.height().saturating_sub(1)); names.len()];
        for row in rows {
            for (column, cell) in values.iter_mut().zip(row) {
                column.push(cell_value(cell));
            }
        }

        let columns = names
            .into_iter()
            .zip(values)
            .map(|(name, data)| Column::new(name.into(), data))
            .collect::<Vec<Column>>();
        Ok(DataFrame::new(columns)?)
    }
}

fn cell_value(cell: &Data) -> Option<String> {
    match cell {
        Data::Empty => None,
        Data::String(s) if s.is_empty() => None,
        Data::String(s) => Some(s.clone()),
        Data::DateTime(dt) if !dt.is_duration() => match dt.as_datetime() {
            Some(at) if at.time() == NaiveTime::MIN => Some(at.format("%Y-%m-%d").to_string()),
            Some(at) => Some(at.format("%Y-%m-%d %H:%M:%S").to_string()),
            None => Some(cell.to_string()),
        },
        other => Some(other.to_string()),
    }
}

// Empty headers become "Unnamed: <idx>" and repeated ones get ".1", ".2", ...
fn header_names(raw: impl Iterator<Item = Option<String>>) -> Vec<String> {
    let mut used: HashSet<String> = HashSet::new();
    raw.enumerate()
        .map(|(idx, name)| {
            let base = name.unwrap_or_else(|| format!("Unnamed: {idx}"));
            let mut candidate = base.clone();
            let mut n = 0;
            while used.contains(&candidate) {
                n += 1;
                candidate = format!("{base}.{n}");
            }
            if n > 0 {
                trace!("Renamed duplicate column {base} to {candidate}");
            }
            used.insert(candidate.clone());
            candidate
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::write_xlsx;
    use rust_xlsxwriter::{ExcelDateTime, Format, Workbook};
    use tempfile::tempdir;

    #[test]
    fn loads_first_sheet_with_header() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("in.xlsx");
        write_xlsx(
            &path,
            &[
                &["application_name", "message"],
                &["A", "x"],
                &["B", ""],
            ],
        );

        let table = RowTable::load(path.clone()).unwrap();
        assert_eq!(table.path(), path.as_path());
        assert_eq!(table.height(), 2);
        assert_eq!(table.column_names(), vec!["application_name", "message"]);
        assert_eq!(
            table.string_column("application_name").unwrap(),
            vec![Some("A".to_string()), Some("B".to_string())]
        );
        assert_eq!(
            table.string_column("message").unwrap(),
            vec![Some("x".to_string()), None]
        );
    }

    #[test]
    fn numbers_render_without_fraction() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("numbers.xlsx");
        let mut workbook = Workbook::new();
        let sheet = workbook.add_worksheet();
        sheet.write_string(0, 0, "code").unwrap();
        sheet.write_number(1, 0, 404).unwrap();
        sheet.write_number(2, 0, 2.5).unwrap();
        workbook.save(&path).unwrap();

        let table = RowTable::load(path).unwrap();
        assert_eq!(
            table.string_column("code").unwrap(),
            vec![Some("404".to_string()), Some("2.5".to_string())]
        );
    }

    #[test]
    fn dates_render_as_calendar_text() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("dates.xlsx");
        let date = Format::new().set_num_format("yyyy-mm-dd");
        let stamp = Format::new().set_num_format("yyyy-mm-dd hh:mm:ss");
        let mut workbook = Workbook::new();
        let sheet = workbook.add_worksheet();
        sheet.write_string(0, 0, "message").unwrap();
        sheet
            .write_datetime_with_format(1, 0, &ExcelDateTime::from_ymd(2024, 5, 17).unwrap(), &date)
            .unwrap();
        let noon = ExcelDateTime::from_ymd(2024, 5, 17)
            .unwrap()
            .and_hms(12, 0, 0)
            .unwrap();
        sheet.write_datetime_with_format(2, 0, &noon, &stamp).unwrap();
        sheet.write_number(3, 0, 404).unwrap();
        workbook.save(&path).unwrap();

        let table = RowTable::load(path).unwrap();
        assert_eq!(
            table.string_column("message").unwrap(),
            vec![
                Some("2024-05-17".to_string()),
                Some("2024-05-17 12:00:00".to_string()),
                Some("404".to_string()),
            ]
        );
    }

    #[test]
    fn blank_and_repeated_headers_are_renamed() {
        let names = header_names(
            [Some("a"), None, Some("a"), Some(" "), Some("a")]
                .into_iter()
                .map(|n| n.map(str::to_string)),
        );
        assert_eq!(names, vec!["a", "Unnamed: 1", "a.1", " ", "a.2"]);
    }

    #[test]
    fn require_columns_reports_first_missing() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("in.xlsx");
        write_xlsx(&path, &[&["application_name", "level"], &["A", "info"]]);

        let table = RowTable::load(path).unwrap();
        assert!(table.require_columns(&["application_name"]).is_ok());
        match table.require_columns(&["application_name", "message"]) {
            Err(ReportError::MissingColumn(name)) => assert_eq!(name, "message"),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn column_names_are_case_sensitive() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("in.xlsx");
        write_xlsx(&path, &[&["Application_Name", "message"], &["A", "x"]]);

        let table = RowTable::load(path).unwrap();
        assert!(!table.has_column("application_name"));
        assert!(table.has_column("message"));
    }

    #[test]
    fn empty_worksheet_loads_without_rows() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("empty.xlsx");
        let mut workbook = Workbook::new();
        workbook.add_worksheet();
        workbook.save(&path).unwrap();

        let table = RowTable::load(path).unwrap();
        assert_eq!(table.height(), 0);
        assert!(!table.has_column("application_name"));
    }

    #[test]
    fn loads_csv() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("in.csv");
        fs::write(&path, "application_name,message\nA,x\nA,y\n").unwrap();

        let table = RowTable::load(path).unwrap();
        assert_eq!(table.height(), 2);
        assert_eq!(
            table.string_column("message").unwrap(),
            vec![Some("x".to_string()), Some("y".to_string())]
        );
    }

    #[test]
    fn csv_cells_keep_their_text() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("codes.csv");
        fs::write(&path, "code,note\n2.0,a\n404,\n007,b\n").unwrap();

        let table = RowTable::load(path).unwrap();
        assert_eq!(
            table.string_column("code").unwrap(),
            vec![
                Some("2.0".to_string()),
                Some("404".to_string()),
                Some("007".to_string()),
            ]
        );
    }

    #[test]
    fn unknown_extension_is_rejected() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("notes.txt");
        fs::write(&path, "hello").unwrap();

        assert!(matches!(
            RowTable::load(path),
            Err(ReportError::UnknownFileType(_))
        ));
    }

    #[test]
    fn corrupt_workbook_is_a_load_failure() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("broken.xlsx");
        fs::write(&path, "definitely not a zip archive").unwrap();

        assert!(matches!(
            RowTable::load(path),
            Err(ReportError::Spreadsheet(_))
        ));
    }
}
