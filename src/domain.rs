use std::fmt;
use std::io::Error;
use std::path::PathBuf;

use calamine::Error as CalamineError;
use chrono::NaiveDateTime;
use derive_setters::Setters;
use polars::error::PolarsError;
use rust_xlsxwriter::XlsxError;

// Everything that can stop a report from being written.
#[derive(Debug)]
pub enum ReportError {
    IoError(Error),
    PolarsError(PolarsError),
    Spreadsheet(CalamineError),
    Xlsx(XlsxError),
    UnknownFileType(PathBuf),
    NoWorksheet,
    MissingColumn(String),
    EmptyTable,
    SheetNamesExhausted(usize),
}

impl fmt::Display for ReportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReportError::IoError(e) => write!(f, "I/O error: {e}"),
            ReportError::PolarsError(e) => write!(f, "could not build table: {e}"),
            ReportError::Spreadsheet(e) => write!(f, "could not read spreadsheet: {e}"),
            ReportError::Xlsx(e) => write!(f, "could not write workbook: {e}"),
            ReportError::UnknownFileType(path) => {
                write!(f, "unsupported file type: {}", path.display())
            }
            ReportError::NoWorksheet => write!(f, "the workbook has no worksheets"),
            ReportError::MissingColumn(name) => {
                write!(f, "the column '{name}' was not found in the file")
            }
            ReportError::EmptyTable => write!(f, "the file has no data rows"),
            ReportError::SheetNamesExhausted(max_len) => write!(
                f,
                "too many groups to give each a unique sheet name of {max_len} characters"
            ),
        }
    }
}

impl std::error::Error for ReportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ReportError::IoError(e) => Some(e),
            ReportError::PolarsError(e) => Some(e),
            ReportError::Spreadsheet(e) => Some(e),
            ReportError::Xlsx(e) => Some(e),
            _ => None,
        }
    }
}

impl From<Error> for ReportError {
    fn from(err: Error) -> Self {
        ReportError::IoError(err)
    }
}

impl From<PolarsError> for ReportError {
    fn from(err: PolarsError) -> Self {
        ReportError::PolarsError(err)
    }
}

impl From<CalamineError> for ReportError {
    fn from(err: CalamineError) -> Self {
        ReportError::Spreadsheet(err)
    }
}

impl From<XlsxError> for ReportError {
    fn from(err: XlsxError) -> Self {
        ReportError::Xlsx(err)
    }
}

/// Names and limits the report pipeline works with.
///
/// `Default` is the behaviour of the binary; nothing is read from the
/// command line or the environment.
#[derive(Debug, Clone, Setters)]
#[setters(into)]
pub struct ReportConfig {
    /// Only files whose name ends with this are input candidates.
    pub input_suffix: String,
    /// Rows are split into one sheet per distinct value of this column.
    pub group_column: String,
    /// Values of this column are counted within each group.
    pub count_column: String,
    /// Header of the count column in every output sheet.
    pub count_header: String,
    pub output_prefix: String,
    /// chrono format string embedded between prefix and extension.
    pub timestamp_format: String,
    pub output_extension: String,
    /// Sheet names are cut to this many characters (xlsx allows 31).
    pub sheet_name_max_len: usize,
    /// Group key used for rows whose group value is empty.
    pub blank_group_name: String,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            input_suffix: ".xlsx".to_string(),
            group_column: "application_name".to_string(),
            count_column: "message".to_string(),
            count_header: "Contagem".to_string(),
            output_prefix: "relatorio_processado_".to_string(),
            timestamp_format: "%Y%m%d_%H%M%S".to_string(),
            output_extension: ".xlsx".to_string(),
            sheet_name_max_len: 31,
            blank_group_name: "(blank)".to_string(),
        }
    }
}

impl ReportConfig {
    /// Columns that must be present, in the order they are checked.
    pub fn required_columns(&self) -> [&str; 2] {
        [self.group_column.as_str(), self.count_column.as_str()]
    }

    pub fn output_file_name(&self, at: NaiveDateTime) -> String {
        format!(
            "{}{}{}",
            self.output_prefix,
            at.format(&self.timestamp_format),
            self.output_extension
        )
    }
}
