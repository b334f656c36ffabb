//! Resolution of organizer category labels against the event catalog.
//!
//! Resolution order is fixed: exact normalized match, then containment in
//! either direction, then give up. Containment candidates are tried in key
//! insertion order, which follows the catalog's fetch order (for each entry,
//! its full name before its gender-stripped name). When several catalog keys
//! could contain or be contained by a label, the first in that order wins.
//! No scoring is attempted.

use std::collections::HashMap;

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::grouping::CategoryGroup;

/// Gender words dropped to build secondary catalog keys.
const GENDER_SUFFIXES: &[&str] = &["masculino", "feminino"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogCategory {
    pub id: String,
    pub name: String,
}

impl CatalogCategory {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchKind {
    Exact,
    Containment,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryMatch {
    pub category_id: String,
    pub key: String,
    pub kind: MatchKind,
}

pub fn normalize_label(value: &str) -> String {
    value.trim().to_lowercase()
}

/// Drops a trailing gender word from a normalized name, along with the
/// separator before it, so "elite masculino", "elite-masculino" and
/// "sub-23 / feminino" become "elite", "elite" and "sub-23". Gender words
/// elsewhere in the name are left alone.
pub fn strip_gender(normalized: &str) -> String {
    let is_separator = |c: char| c.is_whitespace() || matches!(c, '-' | '/' | ',');
    for suffix in GENDER_SUFFIXES {
        if let Some(rest) = normalized.strip_suffix(*suffix) {
            if rest.is_empty() || rest.ends_with(is_separator) {
                return rest.trim_end_matches(is_separator).to_string();
            }
        }
    }
    normalized.to_string()
}

#[derive(Debug, Clone)]
struct IndexKey {
    key: String,
    category_id: String,
    full_name: bool,
}

/// Lookup structure over one event's catalog.
///
/// A key first claimed by a gender-stripped name is taken over by a catalog
/// entry whose full name is that key ("Sub-23" beats the stripped form of
/// "Sub-23 Feminino"); the key keeps its original position.
#[derive(Debug, Clone, Default)]
pub struct CategoryIndex {
    keys: Vec<IndexKey>,
    exact: HashMap<String, usize>,
}

impl CategoryIndex {
    pub fn from_catalog(catalog: &[CatalogCategory]) -> Self {
        let mut index = Self::default();
        for category in catalog {
            let normalized = normalize_label(&category.name);
            let stripped = strip_gender(&normalized);
            index.insert(normalized, &category.id, true);
            index.insert(stripped, &category.id, false);
        }
        index
    }

    fn insert(&mut self, key: String, id: &str, full_name: bool) {
        if key.is_empty() {
            return;
        }
        match self.exact.get(&key).copied() {
            Some(slot) => {
                let existing = &mut self.keys[slot];
                if full_name && !existing.full_name {
                    existing.category_id = id.to_string();
                    existing.full_name = true;
                }
            }
            None => {
                self.exact.insert(key.clone(), self.keys.len());
                self.keys.push(IndexKey {
                    key,
                    category_id: id.to_string(),
                    full_name,
                });
            }
        }
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Keys in the order containment matching tries them.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.keys.iter().map(|entry| entry.key.as_str())
    }

    pub fn resolve(&self, label: &str) -> Option<CategoryMatch> {
        let normalized = normalize_label(label);
        if normalized.is_empty() {
            return None;
        }
        if let Some(slot) = self.exact.get(&normalized) {
            return Some(self.keys[*slot].to_match(MatchKind::Exact));
        }
        self.keys
            .iter()
            .find(|entry| {
                normalized.contains(entry.key.as_str()) || entry.key.contains(normalized.as_str())
            })
            .map(|entry| entry.to_match(MatchKind::Containment))
    }
}

impl IndexKey {
    fn to_match(&self, kind: MatchKind) -> CategoryMatch {
        CategoryMatch {
            category_id: self.category_id.clone(),
            key: self.key.clone(),
            kind,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedCategory {
    pub group: CategoryGroup,
    pub category_id: String,
    pub kind: MatchKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnresolvedCategory {
    pub label: String,
    pub row_count: usize,
}

#[derive(Debug, Clone, Default)]
pub struct Resolution {
    pub resolved: Vec<ResolvedCategory>,
    pub unresolved: Vec<UnresolvedCategory>,
}

/// Binds each group to a catalog id. Groups whose label matches nothing are
/// dropped and reported in `unresolved`, as is the group of unlabeled rows,
/// which is never matched against the catalog.
pub fn resolve_groups(groups: Vec<CategoryGroup>, index: &CategoryIndex) -> Resolution {
    let mut resolution = Resolution::default();
    for group in groups {
        let hit = if group.is_uncategorized() {
            None
        } else {
            index.resolve(&group.label)
        };
        match hit {
            Some(hit) => {
                debug!(
                    "Category '{}' resolved to {} via {:?} match on '{}'",
                    group.label, hit.category_id, hit.kind, hit.key
                );
                resolution.resolved.push(ResolvedCategory {
                    group,
                    category_id: hit.category_id,
                    kind: hit.kind,
                });
            }
            None => {
                warn!(
                    "Category '{}' matches nothing in the event catalog; dropping {} row(s)",
                    group.label,
                    group.rows.len()
                );
                resolution.unresolved.push(UnresolvedCategory {
                    label: group.label,
                    row_count: group.rows.len(),
                });
            }
        }
    }
    resolution
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grouping::UNCATEGORIZED_LABEL;

    fn catalog(names: &[(&str, &str)]) -> Vec<CatalogCategory> {
        names
            .iter()
            .map(|(id, name)| CatalogCategory::new(*id, *name))
            .collect()
    }

    #[test]
    fn strip_gender_removes_trailing_word_and_separator() {
        assert_eq!(strip_gender("elite masculino"), "elite");
        assert_eq!(strip_gender("sub-23 - feminino"), "sub-23");
        assert_eq!(strip_gender("elite-masculino"), "elite");
        assert_eq!(strip_gender("sub-23/feminino"), "sub-23");
        assert_eq!(strip_gender("master (feminino)"), "master (feminino)");
        assert_eq!(strip_gender("masculino"), "");
    }

    #[test]
    fn strip_gender_keeps_leading_and_embedded_words() {
        assert_eq!(strip_gender("masculino elite"), "masculino elite");
        assert_eq!(strip_gender("elite masculino a"), "elite masculino a");
        assert_eq!(strip_gender("elitemasculino"), "elitemasculino");
    }

    #[test]
    fn index_contains_full_and_stripped_keys_in_order() {
        let index = CategoryIndex::from_catalog(&catalog(&[
            ("c1", "Elite Masculino"),
            ("c2", " Elite Feminino "),
            ("c3", "Sub-23"),
        ]));
        let keys = index.keys().collect::<Vec<_>>();
        assert_eq!(
            keys,
            vec!["elite masculino", "elite", "elite feminino", "sub-23"]
        );
        // first entry keeps the shared stripped key
        assert_eq!(index.resolve("ELITE").unwrap().category_id, "c1");
    }

    #[test]
    fn full_name_takes_over_a_stripped_key() {
        let index = CategoryIndex::from_catalog(&catalog(&[
            ("f", "Sub-23 Feminino"),
            ("open", "Sub-23"),
        ]));
        assert_eq!(
            index.keys().collect::<Vec<_>>(),
            vec!["sub-23 feminino", "sub-23"]
        );
        assert_eq!(index.resolve("Sub-23").unwrap().category_id, "open");
        let hit = index.resolve("SUB-23 MASCULINO").unwrap();
        assert_eq!(hit.category_id, "open");
        assert_eq!(hit.kind, MatchKind::Containment);
    }

    #[test]
    fn exact_match_beats_containment() {
        let index = CategoryIndex::from_catalog(&catalog(&[
            ("c1", "Sub-23"),
            ("c2", "Sub-23 Masculino"),
        ]));
        let hit = index.resolve("sub-23 masculino").unwrap();
        assert_eq!(hit.category_id, "c2");
        assert_eq!(hit.kind, MatchKind::Exact);
    }

    #[test]
    fn containment_falls_back_in_catalog_order() {
        let index = CategoryIndex::from_catalog(&catalog(&[("c1", "Sub-23")]));
        let hit = index.resolve("SUB-23 MASCULINO").unwrap();
        assert_eq!(hit.category_id, "c1");
        assert_eq!(hit.kind, MatchKind::Containment);

        // label contained in a catalog key also counts
        let index = CategoryIndex::from_catalog(&catalog(&[("c9", "Veteranos 40+ Livre")]));
        assert_eq!(index.resolve("40+").unwrap().category_id, "c9");
    }

    #[test]
    fn unmatched_and_blank_labels_do_not_resolve() {
        let index = CategoryIndex::from_catalog(&catalog(&[("c1", "Elite Masculino")]));
        assert!(index.resolve("Categoria Inexistente").is_none());
        assert!(index.resolve("   ").is_none());
        assert!(CategoryIndex::from_catalog(&[]).resolve("Elite").is_none());
    }

    #[test]
    fn resolve_groups_splits_hits_and_misses() {
        let index = CategoryIndex::from_catalog(&catalog(&[("c1", "Elite Masculino")]));
        let groups = vec![
            CategoryGroup::new("Elite Masculino", vec![Default::default()]),
            CategoryGroup::new(
                "Categoria Inexistente",
                vec![Default::default(), Default::default()],
            ),
        ];
        let resolution = resolve_groups(groups, &index);
        assert_eq!(resolution.resolved.len(), 1);
        assert_eq!(resolution.resolved[0].category_id, "c1");
        assert_eq!(
            resolution.unresolved,
            vec![UnresolvedCategory {
                label: "Categoria Inexistente".into(),
                row_count: 2
            }]
        );
    }

    #[test]
    fn unlabeled_rows_never_resolve() {
        let index = CategoryIndex::from_catalog(&catalog(&[("cat-a", "A"), ("c2", "Categoria")]));
        let groups = vec![
            CategoryGroup::uncategorized(vec![Default::default()]),
            CategoryGroup::new(UNCATEGORIZED_LABEL, vec![Default::default()]),
        ];
        let resolution = resolve_groups(groups, &index);
        assert_eq!(resolution.unresolved.len(), 1);
        assert_eq!(resolution.unresolved[0].label, UNCATEGORIZED_LABEL);
        // a file label spelled like the sentinel still goes through matching
        assert_eq!(resolution.resolved.len(), 1);
        assert!(!resolution.resolved[0].group.is_uncategorized());
    }
}
