use std::collections::HashMap;

use crate::columns::CanonicalRow;

/// Display label for rows whose category cell is missing or blank.
pub const UNCATEGORIZED_LABEL: &str = "Sem Categoria";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryGroup {
    pub label: String,
    /// Set only for the group of unlabeled rows. A file label that happens to
    /// read "Sem Categoria" is an ordinary group.
    pub uncategorized: bool,
    pub rows: Vec<CanonicalRow>,
}

impl CategoryGroup {
    pub fn new(label: impl Into<String>, rows: Vec<CanonicalRow>) -> Self {
        Self {
            label: label.into(),
            uncategorized: false,
            rows,
        }
    }

    pub fn uncategorized(rows: Vec<CanonicalRow>) -> Self {
        Self {
            label: UNCATEGORIZED_LABEL.to_string(),
            uncategorized: true,
            rows,
        }
    }

    pub fn is_uncategorized(&self) -> bool {
        self.uncategorized
    }
}

/// Partitions rows by their exact trimmed category label.
///
/// Labels are compared byte for byte: "Sub-23" and "Sub-23 Masculino", or
/// "Elite" and "ELITE", always land in different groups. Groups come back in
/// order of first appearance; rows inside each group are sorted by position
/// with position-less rows last, keeping file order among equals.
pub fn group_by_category(rows: Vec<CanonicalRow>) -> Vec<CategoryGroup> {
    let mut groups: Vec<CategoryGroup> = Vec::new();
    // None keys the unlabeled group
    let mut slots: HashMap<Option<String>, usize> = HashMap::new();
    for row in rows {
        let label = row
            .category
            .as_deref()
            .map(str::trim)
            .filter(|label| !label.is_empty())
            .map(str::to_string);
        let slot = *slots.entry(label.clone()).or_insert_with(|| {
            groups.push(match label {
                Some(label) => CategoryGroup::new(label, Vec::new()),
                None => CategoryGroup::uncategorized(Vec::new()),
            });
            groups.len() - 1
        });
        groups[slot].rows.push(row);
    }
    for group in &mut groups {
        // sort_by_key is stable
        group
            .rows
            .sort_by_key(|row| (row.position.is_none(), row.position));
    }
    groups
}
