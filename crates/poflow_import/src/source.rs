//! Readers that turn an uploaded spreadsheet into raw rows keyed by column.

use calamine::{Data, Reader, Sheets, open_workbook_auto, open_workbook_auto_from_rs};
use poflow_model::Column;
use std::collections::HashMap;
use std::io::Cursor;
use std::path::Path;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("failed to read file: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed csv: {0}")]
    Csv(#[from] csv::Error),
    #[error("failed to read workbook: {0}")]
    Workbook(String),
    #[error("unsupported file type '{0}'")]
    UnsupportedFormat(String),
    #[error("file has no header row")]
    MissingHeader,
    #[error("none of the expected columns were found in the header")]
    NoKnownColumns,
}

/// A cell as it came out of the file, before any cleanup.
#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    Empty,
    Text(String),
    Number(f64),
    /// Spreadsheet date cell, as its serial number.
    DateSerial(f64),
}

impl RawValue {
    pub fn is_blank(&self) -> bool {
        match self {
            RawValue::Empty => true,
            RawValue::Text(s) => s.trim().is_empty(),
            RawValue::Number(n) | RawValue::DateSerial(n) => n.is_nan(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RawRow {
    /// Line in the source file; the header is line 1.
    pub line: usize,
    pub cells: HashMap<Column, RawValue>,
}

impl RawRow {
    pub fn new(line: usize) -> Self {
        Self {
            line,
            cells: HashMap::new(),
        }
    }

    pub fn with(mut self, column: Column, value: RawValue) -> Self {
        self.cells.insert(column, value);
        self
    }

    pub fn text(self, column: Column, value: &str) -> Self {
        self.with(column, RawValue::Text(value.to_string()))
    }

    pub fn get(&self, column: Column) -> &RawValue {
        self.cells.get(&column).unwrap_or(&RawValue::Empty)
    }
}

#[derive(Debug, Clone, Default)]
pub struct RawBatch {
    pub rows: Vec<RawRow>,
    pub columns: Vec<Column>,
    /// Header cells that matched no known column.
    pub ignored_headers: Vec<String>,
}

/// Maps header positions to columns; the first occurrence of a column wins.
fn map_header<'a>(headers: impl Iterator<Item = &'a str>) -> (Vec<Option<Column>>, Vec<Column>, Vec<String>) {
    let mut positions = Vec::new();
    let mut columns = Vec::new();
    let mut ignored = Vec::new();
    for header in headers {
        match Column::from_header(header) {
            Some(column) if !columns.contains(&column) => {
                columns.push(column);
                positions.push(Some(column));
            }
            Some(_) => positions.push(None),
            None => {
                if !header.trim().is_empty() {
                    ignored.push(header.trim().to_string());
                }
                positions.push(None);
            }
        }
    }
    (positions, columns, ignored)
}

pub fn read_path(path: &Path) -> Result<RawBatch, SourceError> {
    let ext = extension(&path.to_string_lossy());
    match ext.as_str() {
        "csv" | "txt" | "tsv" => read_csv_bytes(&std::fs::read(path)?),
        "xlsx" | "xlsm" | "xlsb" | "xls" | "ods" => {
            let workbook = open_workbook_auto(path).map_err(|e| SourceError::Workbook(e.to_string()))?;
            read_workbook(workbook)
        }
        other => Err(SourceError::UnsupportedFormat(other.to_string())),
    }
}

/// Same dispatch as [`read_path`], for an upload held in memory.
pub fn read_bytes(file_name: &str, bytes: &[u8]) -> Result<RawBatch, SourceError> {
    let ext = extension(file_name);
    match ext.as_str() {
        "csv" | "txt" | "tsv" | "" => read_csv_bytes(bytes),
        "xlsx" | "xlsm" | "xlsb" | "xls" | "ods" => {
            let workbook = open_workbook_auto_from_rs(Cursor::new(bytes.to_vec()))
                .map_err(|e| SourceError::Workbook(e.to_string()))?;
            read_workbook(workbook)
        }
        other => Err(SourceError::UnsupportedFormat(other.to_string())),
    }
}

fn extension(name: &str) -> String {
    Path::new(name)
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default()
}

/// Decodes as UTF-8, falling back to Windows-1252 for spreadsheet exports.
pub fn decode_text(bytes: &[u8]) -> String {
    match String::from_utf8(bytes.to_vec()) {
        Ok(s) => s,
        Err(e) => {
            let bytes = e.into_bytes();
            let (decoded, _, _) = encoding_rs::WINDOWS_1252.decode(&bytes);
            decoded.into_owned()
        }
    }
}

/// Picks the delimiter that yields the most consistent field count over the
/// first lines. Ties go to the wider split.
pub fn sniff_delimiter(content: &str) -> u8 {
    let candidates: &[u8] = &[b'\t', b';', b',', b'|'];
    let sample: Vec<&str> = content.lines().filter(|l| !l.trim().is_empty()).take(10).collect();

    let mut best = b',';
    let mut best_score = 0usize;
    for &delim in candidates {
        let counts: Vec<usize> = sample
            .iter()
            .map(|line| {
                csv::ReaderBuilder::new()
                    .delimiter(delim)
                    .has_headers(false)
                    .flexible(true)
                    .from_reader(line.as_bytes())
                    .records()
                    .next()
                    .and_then(|r| r.ok())
                    .map(|r| r.len())
                    .unwrap_or(1)
            })
            .collect();

        let Some(&target) = counts.first() else { continue };
        if target <= 1 {
            continue;
        }
        let score = counts.iter().filter(|&&c| c == target).count() * target;
        if score > best_score {
            best_score = score;
            best = delim;
        }
    }
    best
}

pub fn read_csv_bytes(bytes: &[u8]) -> Result<RawBatch, SourceError> {
    read_csv_str(&decode_text(bytes))
}

pub fn read_csv_str(content: &str) -> Result<RawBatch, SourceError> {
    let content = content.trim_start_matches('\u{feff}');
    let delimiter = sniff_delimiter(content);
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .flexible(true)
        .from_reader(content.as_bytes());

    let mut records = reader.records();
    let header = match records.next() {
        Some(record) => record?,
        None => return Err(SourceError::MissingHeader),
    };
    let header_line = header.position().map(|p| p.line() as usize).unwrap_or(1);
    let (positions, columns, ignored_headers) = map_header(header.iter());
    if columns.is_empty() {
        return Err(SourceError::NoKnownColumns);
    }

    let mut rows = Vec::new();
    for (index, record) in records.enumerate() {
        let record = record?;
        let line = record
            .position()
            .map(|p| p.line() as usize)
            .unwrap_or(header_line + index + 1);
        let mut row = RawRow::new(line);
        for (pos, field) in record.iter().enumerate() {
            if let Some(Some(column)) = positions.get(pos) {
                let value = if field.is_empty() {
                    RawValue::Empty
                } else {
                    RawValue::Text(field.to_string())
                };
                row.cells.insert(*column, value);
            }
        }
        if row.cells.values().all(RawValue::is_blank) {
            continue;
        }
        rows.push(row);
    }

    debug!(rows = rows.len(), delimiter = %(delimiter as char), "csv source read");
    Ok(RawBatch {
        rows,
        columns,
        ignored_headers,
    })
}

fn cell_value(cell: &Data) -> RawValue {
    match cell {
        Data::Empty => RawValue::Empty,
        Data::String(s) => RawValue::Text(s.clone()),
        Data::Float(n) => RawValue::Number(*n),
        Data::Int(n) => RawValue::Number(*n as f64),
        Data::Bool(b) => RawValue::Text(if *b { "TRUE" } else { "FALSE" }.to_string()),
        Data::DateTime(dt) => RawValue::DateSerial(dt.as_f64()),
        Data::DateTimeIso(s) | Data::DurationIso(s) => RawValue::Text(s.clone()),
        Data::Error(_) => RawValue::Empty,
    }
}

/// Reads the first worksheet. Header is the first row of the used range.
fn read_workbook<RS>(mut workbook: Sheets<RS>) -> Result<RawBatch, SourceError>
where
    RS: std::io::Read + std::io::Seek,
{
    let sheet_names = workbook.sheet_names();
    let Some(first) = sheet_names.first() else {
        return Err(SourceError::Workbook("workbook contains no sheets".to_string()));
    };
    let range = workbook
        .worksheet_range(first)
        .map_err(|e| SourceError::Workbook(format!("failed to read sheet '{}': {}", first, e)))?;

    let first_row = range.start().map(|(r, _)| r as usize).unwrap_or(0);
    let mut iter = range.rows();
    let header_cells = iter.next().ok_or(SourceError::MissingHeader)?;
    let header_text: Vec<String> = header_cells
        .iter()
        .map(|c| match c {
            Data::String(s) => s.clone(),
            other => other.to_string(),
        })
        .collect();
    let (positions, columns, ignored_headers) = map_header(header_text.iter().map(String::as_str));
    if columns.is_empty() {
        return Err(SourceError::NoKnownColumns);
    }

    let mut rows = Vec::new();
    for (index, cells) in iter.enumerate() {
        // Sheet rows are 1-based; the header sits on first_row + 1.
        let mut row = RawRow::new(first_row + index + 2);
        for (pos, cell) in cells.iter().enumerate() {
            if let Some(Some(column)) = positions.get(pos) {
                row.cells.insert(*column, cell_value(cell));
            }
        }
        if row.cells.values().all(RawValue::is_blank) {
            continue;
        }
        rows.push(row);
    }

    debug!(rows = rows.len(), sheet = %first, "workbook source read");
    Ok(RawBatch {
        rows,
        columns,
        ignored_headers,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sniffs_semicolon_and_tab() {
        assert_eq!(sniff_delimiter("a;b;c\n1;2;3\n"), b';');
        assert_eq!(sniff_delimiter("a\tb\n1\t2\n"), b'\t');
        assert_eq!(sniff_delimiter("a,b\n1,2\n"), b',');
    }

    #[test]
    fn decodes_windows_1252() {
        let bytes = b"descricao\nAlgod\xe3o\n";
        assert_eq!(decode_text(bytes), "descricao\nAlgodão\n");
    }

    #[test]
    fn csv_lines_follow_the_file() {
        let batch = read_csv_str("nr_oc;descricao;extra\nOC-1;Luva\n\nOC-2;Bota\n").unwrap();
        assert_eq!(batch.columns, vec![Column::PurchaseOrderNumber, Column::Description]);
        assert_eq!(batch.ignored_headers, vec!["extra".to_string()]);
        assert_eq!(batch.rows.len(), 2);
        assert_eq!(batch.rows[0].line, 2);
        assert_eq!(batch.rows[1].line, 4);
        assert_eq!(batch.rows[1].get(Column::Description), &RawValue::Text("Bota".to_string()));
        assert_eq!(batch.rows[1].get(Column::Status), &RawValue::Empty);
    }

    #[test]
    fn header_without_known_columns_is_rejected() {
        assert!(matches!(read_csv_str("foo,bar\n1,2\n"), Err(SourceError::NoKnownColumns)));
        assert!(matches!(read_csv_str(""), Err(SourceError::MissingHeader)));
    }

    #[test]
    fn unknown_extension_is_rejected() {
        assert!(matches!(
            read_bytes("pedidos.pdf", b"%PDF"),
            Err(SourceError::UnsupportedFormat(ext)) if ext == "pdf"
        ));
    }
}
