// Test helpers: build xlsx inputs and read generated workbooks back.
use calamine::{Reader, open_workbook_auto};
use rust_xlsxwriter::Workbook;
use std::path::Path;

/// Writes `rows` as strings into the first sheet. Empty strings stay blank.
pub fn write_xlsx(path: &Path, rows: &[&[&str]]) {
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    for (r, row) in rows.iter().enumerate() {
        for (c, value) in row.iter().enumerate() {
            if !value.is_empty() {
                sheet.write_string(r as u32, c as u16, *value).unwrap();
            }
        }
    }
    workbook.save(path).unwrap();
}

/// Every sheet of the workbook at `path`, in order, as rows of rendered cells.
pub fn read_sheets(path: &Path) -> Vec<(String, Vec<Vec<String>>)> {
    let mut workbook = open_workbook_auto(path).unwrap();
    workbook
        .sheet_names()
        .into_iter()
        .map(|name| {
            let range = workbook.worksheet_range(&name).unwrap();
            let rows = range
                .rows()
                .map(|row| row.iter().map(|cell| cell.to_string()).collect())
                .collect();
            (name, rows)
        })
        .collect()
}

/// Converts borrowed rows into the owned form `read_sheets` returns.
pub fn rows(rows: &[&[&str]]) -> Vec<Vec<String>> {
    rows.iter()
        .map(|row| row.iter().map(|v| v.to_string()).collect())
        .collect()
}
