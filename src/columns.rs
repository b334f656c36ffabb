//! Header heuristics that map free-form organizer columns onto result fields.
//!
//! Each [`ResultField`] owns an ordered synonym list. A column matches a
//! field when its lower-cased name *contains* one of the synonyms; the first
//! such column in header order wins. The tables live here, and only here, so
//! the matching order can be audited and tested without parsing a file.

use std::{fmt, sync::OnceLock};

use regex::Regex;

use crate::parser::RawRow;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResultField {
    Position,
    AthleteName,
    ClubName,
    Result,
    Category,
}

impl ResultField {
    pub const ALL: [ResultField; 5] = [
        ResultField::Position,
        ResultField::AthleteName,
        ResultField::ClubName,
        ResultField::Result,
        ResultField::Category,
    ];

    pub fn synonyms(self) -> &'static [&'static str] {
        match self {
            ResultField::Position => &["posição", "posicao", "pos", "colocação", "colocacao"],
            ResultField::AthleteName => &["atleta", "nome", "competidor", "name"],
            ResultField::ClubName => &["clube", "equipe", "team", "club"],
            ResultField::Result => &["resultado", "tempo", "time", "result"],
            ResultField::Category => &["categoria", "category", "class"],
        }
    }

    pub fn matches_column(self, column: &str) -> bool {
        let lowered = column.to_lowercase();
        self.synonyms().iter().any(|s| lowered.contains(s))
    }
}

impl fmt::Display for ResultField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResultField::Position => "position",
            ResultField::AthleteName => "athleteName",
            ResultField::ClubName => "clubName",
            ResultField::Result => "result",
            ResultField::Category => "category",
        };
        f.write_str(name)
    }
}

/// A row reduced to the fields the pipeline understands.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CanonicalRow {
    pub position: Option<u32>,
    pub athlete_name: Option<String>,
    pub club_name: Option<String>,
    pub result: Option<String>,
    pub category: Option<String>,
    pub source_line: u64,
}

/// Header index chosen for each field, if any column matched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnMapping {
    columns: Vec<(ResultField, String)>,
}

impl ColumnMapping {
    pub fn from_headers<'a>(headers: impl IntoIterator<Item = &'a str> + Clone) -> Self {
        let columns = ResultField::ALL
            .iter()
            .filter_map(|field| {
                headers
                    .clone()
                    .into_iter()
                    .find(|header| field.matches_column(header))
                    .map(|header| (*field, header.to_string()))
            })
            .collect();
        Self { columns }
    }

    pub fn column_for(&self, field: ResultField) -> Option<&str> {
        self.columns
            .iter()
            .find(|(f, _)| *f == field)
            .map(|(_, column)| column.as_str())
    }

    pub fn missing_fields(&self) -> Vec<ResultField> {
        ResultField::ALL
            .into_iter()
            .filter(|field| self.column_for(*field).is_none())
            .collect()
    }

    pub fn normalize(&self, row: &RawRow) -> CanonicalRow {
        let text = |field| {
            self.column_for(field)
                .and_then(|column| row.get(column))
                .filter(|value| !value.is_empty())
                .map(str::to_string)
        };
        CanonicalRow {
            position: self
                .column_for(ResultField::Position)
                .and_then(|column| row.get(column))
                .and_then(parse_position),
            athlete_name: text(ResultField::AthleteName),
            club_name: text(ResultField::ClubName),
            result: text(ResultField::Result),
            category: text(ResultField::Category),
            source_line: row.line,
        }
    }
}

/// Normalizes every row against the mapping derived from its own columns.
pub fn normalize_rows(rows: &[RawRow]) -> (ColumnMapping, Vec<CanonicalRow>) {
    let mapping = rows
        .first()
        .map(|row| ColumnMapping::from_headers(row.columns()))
        .unwrap_or_default();
    let normalized = rows.iter().map(|row| mapping.normalize(row)).collect();
    (mapping, normalized)
}

/// Leading integer of a position cell: "1", "1º", "01." all yield 1.
/// Non-numeric cells and zero count as no position.
pub fn parse_position(value: &str) -> Option<u32> {
    static LEADING_DIGITS: OnceLock<Regex> = OnceLock::new();
    let pattern =
        LEADING_DIGITS.get_or_init(|| Regex::new(r"^\s*\+?(\d+)").expect("valid position pattern"));
    pattern
        .captures(value)
        .and_then(|caps| caps.get(1))
        .and_then(|digits| digits.as_str().parse::<u32>().ok())
        .filter(|position| *position > 0)
}
