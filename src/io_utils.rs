//! Byte decoding, delimiter detection and reader construction for uploads.
//!
//! Result files arrive as raw bytes from whatever spreadsheet the organizer
//! used. This module turns them into text the `csv` reader can consume:
//!
//! - **Encoding**: an explicit `encoding_rs` label is honoured strictly;
//!   otherwise UTF-8 is tried first with a Windows-1252 fallback.
//! - **Delimiter**: explicit override, or sniffed from the header line.
//! - **Quoting**: unterminated quoted fields are detected up front, since the
//!   `csv` reader silently runs them to end of input.

use anyhow::{Result, anyhow};
use encoding_rs::{Encoding, UTF_8, WINDOWS_1252};

use crate::error::{IngestError, IngestResult};

pub const DEFAULT_CSV_DELIMITER: u8 = b',';
pub const DEFAULT_TSV_DELIMITER: u8 = b'\t';

/// Candidates considered when sniffing, in tie-break order.
const SNIFF_CANDIDATES: &[u8] = b",;\t|";

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

pub fn resolve_encoding(label: Option<&str>) -> Result<Option<&'static Encoding>> {
    match label {
        Some(value) => Encoding::for_label(value.trim().as_bytes())
            .map(Some)
            .ok_or_else(|| anyhow!("Unknown encoding '{value}'")),
        None => Ok(None),
    }
}

pub fn decode_input(bytes: &[u8], encoding: Option<&'static Encoding>) -> IngestResult<String> {
    match encoding {
        Some(encoding) => {
            let (text, had_errors) = encoding.decode_with_bom_removal(bytes);
            if had_errors {
                Err(IngestError::malformed(
                    format!("input is not valid {}", encoding.name()),
                    None,
                ))
            } else {
                Ok(text.into_owned())
            }
        }
        None => {
            let bytes = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
            match std::str::from_utf8(bytes) {
                Ok(text) => Ok(text.to_owned()),
                Err(_) => {
                    log::debug!(
                        "Input is not valid {}; decoding as {}",
                        UTF_8.name(),
                        WINDOWS_1252.name()
                    );
                    let (text, _) = WINDOWS_1252.decode_without_bom_handling(bytes);
                    Ok(text.into_owned())
                }
            }
        }
    }
}

/// Picks the candidate delimiter occurring most often (outside quotes) on the
/// first non-blank line. Falls back to a comma.
pub fn sniff_delimiter(text: &str) -> u8 {
    let Some(header) = text.lines().find(|line| !line.trim().is_empty()) else {
        return DEFAULT_CSV_DELIMITER;
    };
    let mut counts = [0usize; SNIFF_CANDIDATES.len()];
    let mut in_quotes = false;
    for byte in header.bytes() {
        if byte == b'"' {
            in_quotes = !in_quotes;
            continue;
        }
        if in_quotes {
            continue;
        }
        if let Some(idx) = SNIFF_CANDIDATES.iter().position(|c| *c == byte) {
            counts[idx] += 1;
        }
    }
    let mut best = (DEFAULT_CSV_DELIMITER, 0usize);
    for (idx, count) in counts.iter().enumerate() {
        if *count > best.1 {
            best = (SNIFF_CANDIDATES[idx], *count);
        }
    }
    best.0
}

/// Returns the 1-based line on which a quoted field opens without ever being
/// closed, mirroring the `csv` crate's rule that quotes only open a field at
/// its first character.
pub fn find_unterminated_quote(text: &str, delimiter: u8) -> Option<u64> {
    let bytes = text.as_bytes();
    let mut line = 1u64;
    let mut field_start = true;
    let mut open_line: Option<u64> = None;
    let mut idx = 0;
    while idx < bytes.len() {
        let byte = bytes[idx];
        if open_line.is_some() {
            if byte == b'"' {
                if bytes.get(idx + 1) == Some(&b'"') {
                    idx += 1;
                } else {
                    open_line = None;
                }
            }
        } else if field_start && byte == b'"' {
            open_line = Some(line);
        }
        if byte == b'\n' {
            line += 1;
        }
        field_start = open_line.is_none() && (byte == delimiter || byte == b'\n' || byte == b'\r');
        idx += 1;
    }
    open_line
}

pub fn open_csv_reader(text: &str, delimiter: u8) -> csv::Reader<&[u8]> {
    let mut builder = csv::ReaderBuilder::new();
    builder
        .has_headers(true)
        .delimiter(delimiter)
        .double_quote(true)
        .flexible(true)
        .trim(csv::Trim::All);
    builder.from_reader(text.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_strips_utf8_bom() {
        let bytes = b"\xEF\xBB\xBFPos,Atleta\n1,Ana\n";
        let text = decode_input(bytes, None).expect("decode");
        assert!(text.starts_with("Pos,"));
    }

    #[test]
    fn decode_falls_back_to_windows_1252() {
        // "Posição" exported by a legacy spreadsheet
        let bytes = b"Posi\xe7\xe3o;Atleta\n";
        let text = decode_input(bytes, None).expect("decode");
        assert!(text.starts_with("Posição;"));
    }

    #[test]
    fn explicit_encoding_is_strict() {
        let bytes = b"Posi\xe7\xe3o;Atleta\n";
        let err = decode_input(bytes, Some(UTF_8)).expect_err("invalid utf-8");
        assert!(matches!(err, IngestError::MalformedInput { .. }));
    }

    #[test]
    fn resolve_encoding_rejects_unknown_labels() {
        assert!(resolve_encoding(Some("latin1")).unwrap().is_some());
        assert!(resolve_encoding(None).unwrap().is_none());
        assert!(resolve_encoding(Some("klingon")).is_err());
    }

    #[test]
    fn sniff_prefers_most_frequent_unquoted_candidate() {
        assert_eq!(sniff_delimiter("Pos;Atleta;Clube\n1;Ana;X\n"), b';');
        assert_eq!(sniff_delimiter("Pos\tAtleta\tClube\n"), b'\t');
        assert_eq!(sniff_delimiter("\n\nPos,Atleta,\"A;B;C\"\n"), b',');
        assert_eq!(sniff_delimiter("Atleta\n"), b',');
    }

    #[test]
    fn unterminated_quote_reports_opening_line() {
        assert_eq!(find_unterminated_quote("a,b\n1,\"ok\"\n", b','), None);
        assert_eq!(
            find_unterminated_quote("a,b\n1,\"multi\nline\"\n", b','),
            None
        );
        assert_eq!(find_unterminated_quote("a,b\n1,\"say \"\"hi\"\"\"\n", b','), None);
        assert_eq!(find_unterminated_quote("a,b\n1,2\n3,\"open\n4,5\n", b','), Some(3));
        // quotes inside an unquoted field are literal
        assert_eq!(find_unterminated_quote("a,b\n1,5\"\n", b','), None);
    }
}
