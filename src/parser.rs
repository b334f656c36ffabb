//! Tabular parsing of uploaded result files into header-keyed rows.

use std::{fmt, str::FromStr};

use encoding_rs::Encoding;
use log::debug;

use crate::{
    error::{IngestError, IngestResult},
    io_utils,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputFormat {
    /// Delimited text with a header row; delimiter sniffed unless overridden.
    Csv,
    /// Delimited text whose delimiter is always a tab.
    Tsv,
}

impl InputFormat {
    fn forced_delimiter(self) -> Option<u8> {
        match self {
            InputFormat::Csv => None,
            InputFormat::Tsv => Some(io_utils::DEFAULT_TSV_DELIMITER),
        }
    }
}

impl FromStr for InputFormat {
    type Err = IngestError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "csv" | "text/csv" => Ok(InputFormat::Csv),
            "tsv" | "text/tab-separated-values" => Ok(InputFormat::Tsv),
            other => Err(IngestError::UnsupportedFormat(other.to_string())),
        }
    }
}

impl fmt::Display for InputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InputFormat::Csv => write!(f, "csv"),
            InputFormat::Tsv => write!(f, "tsv"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ParseOptions {
    pub delimiter: Option<u8>,
    pub encoding: Option<&'static Encoding>,
}

/// One data record keyed by the header names exactly as they appear in the file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRow {
    pub line: u64,
    cells: Vec<(String, String)>,
}

impl RawRow {
    pub fn new(line: u64, cells: Vec<(String, String)>) -> Self {
        Self { line, cells }
    }

    /// Cells in header order.
    pub fn cells(&self) -> impl Iterator<Item = (&str, &str)> {
        self.cells.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> + Clone {
        self.cells.iter().map(|(k, _)| k.as_str())
    }

    /// Case-insensitive lookup; the first column with that name wins.
    pub fn get(&self, column: &str) -> Option<&str> {
        self.cells
            .iter()
            .find(|(name, _)| name.to_lowercase() == column.to_lowercase())
            .map(|(_, value)| value.as_str())
    }
}

/// Parsed header plus data rows.
#[derive(Debug, Clone)]
pub struct ParsedTable {
    pub headers: Vec<String>,
    pub delimiter: u8,
    pub rows: Vec<RawRow>,
}

pub fn parse_rows(
    bytes: &[u8],
    format: InputFormat,
    options: &ParseOptions,
) -> IngestResult<Vec<RawRow>> {
    parse_table(bytes, format, options).map(|table| table.rows)
}

pub fn parse_table(
    bytes: &[u8],
    format: InputFormat,
    options: &ParseOptions,
) -> IngestResult<ParsedTable> {
    let text = io_utils::decode_input(bytes, options.encoding)?;
    if text.trim().is_empty() {
        return Err(IngestError::malformed("input contains no header row", None));
    }
    let delimiter = options
        .delimiter
        .or(format.forced_delimiter())
        .unwrap_or_else(|| io_utils::sniff_delimiter(&text));
    if let Some(line) = io_utils::find_unterminated_quote(&text, delimiter) {
        return Err(IngestError::malformed(
            "quoted field is never closed",
            Some(line),
        ));
    }

    let mut reader = io_utils::open_csv_reader(&text, delimiter);
    let headers = reader
        .headers()
        .map_err(|err| csv_error("reading header row", &err))?
        .iter()
        .map(|h| h.to_string())
        .collect::<Vec<_>>();
    if headers.iter().all(|h| h.is_empty()) {
        return Err(IngestError::malformed(
            "header row has no column names",
            Some(1),
        ));
    }
    debug!(
        "Parsing {format} input with delimiter '{}' and {} column(s)",
        crate::printable_delimiter(delimiter),
        headers.len()
    );

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|err| csv_error("reading record", &err))?;
        if record.iter().all(|cell| cell.is_empty()) {
            continue;
        }
        let line = record.position().map(|p| p.line()).unwrap_or_default();
        let cells = headers
            .iter()
            .enumerate()
            .map(|(idx, name)| (name.clone(), record.get(idx).unwrap_or("").to_string()))
            .collect();
        rows.push(RawRow::new(line, cells));
    }
    debug!("Parsed {} data row(s)", rows.len());
    Ok(ParsedTable {
        headers,
        delimiter,
        rows,
    })
}

fn csv_error(action: &str, err: &csv::Error) -> IngestError {
    let line = err.position().map(|p| p.line());
    IngestError::malformed(format!("{action}: {err}"), line)
}
