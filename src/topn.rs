use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{columns::CanonicalRow, resolve::ResolvedCategory};

pub const DEFAULT_TOP_LIMIT: usize = 5;

/// One stored podium row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessedResult {
    pub id: Uuid,
    pub event_id: String,
    pub category_id: String,
    /// Label exactly as it appeared in the uploaded file.
    pub category_name: String,
    pub position: u32,
    pub athlete_name: String,
    pub club_name: String,
    pub result: String,
    pub user_id: Option<String>,
    pub club_id: Option<String>,
}

impl ProcessedResult {
    /// Fields that survive a re-run unchanged (everything but the id).
    pub fn content_key(&self) -> (String, u32, String, String, String) {
        (
            self.category_id.clone(),
            self.position,
            self.athlete_name.clone(),
            self.club_name.clone(),
            self.result.clone(),
        )
    }
}

/// Resolved rows bound for one catalog category, in podium order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryPodium<'a> {
    pub category_id: &'a str,
    /// Each row paired with the file label it came from.
    pub rows: Vec<(&'a str, &'a CanonicalRow)>,
}

/// Merges resolved groups that share a catalog id.
///
/// Categories come back in order of first appearance. Within a category the
/// rows of all contributing labels are re-sorted by position, missing
/// positions last, keeping group order among equals.
pub fn merge_by_category(resolved: &[ResolvedCategory]) -> Vec<CategoryPodium<'_>> {
    let mut podiums: Vec<CategoryPodium<'_>> = Vec::new();
    let mut slots: HashMap<&str, usize> = HashMap::new();
    for category in resolved {
        let slot = *slots
            .entry(category.category_id.as_str())
            .or_insert_with(|| {
                podiums.push(CategoryPodium {
                    category_id: &category.category_id,
                    rows: Vec::new(),
                });
                podiums.len() - 1
            });
        let label = category.group.label.as_str();
        podiums[slot]
            .rows
            .extend(category.group.rows.iter().map(|row| (label, row)));
    }
    for podium in &mut podiums {
        podium
            .rows
            .sort_by_key(|(_, row)| (row.position.is_none(), row.position));
    }
    podiums
}

/// Keeps the first `limit` rows of every catalog category.
///
/// Rows without a source position get their 1-based rank inside the kept
/// slice. Each row keeps the file label it was read under.
pub fn extract_top(
    resolved: &[ResolvedCategory],
    event_id: &str,
    limit: usize,
) -> Vec<ProcessedResult> {
    merge_by_category(resolved)
        .into_iter()
        .flat_map(|podium| {
            let category_id = podium.category_id;
            podium
                .rows
                .into_iter()
                .take(limit)
                .enumerate()
                .map(move |(rank, (label, row))| ProcessedResult {
                    id: Uuid::new_v4(),
                    event_id: event_id.to_string(),
                    category_id: category_id.to_string(),
                    category_name: label.to_string(),
                    position: row.position.unwrap_or(rank as u32 + 1),
                    athlete_name: row.athlete_name.clone().unwrap_or_default(),
                    club_name: row.club_name.clone().unwrap_or_default(),
                    result: row.result.clone().unwrap_or_default(),
                    user_id: None,
                    club_id: None,
                })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::{grouping::CategoryGroup, resolve::MatchKind};

    fn resolved(label: &str, id: &str, positions: &[Option<u32>]) -> ResolvedCategory {
        ResolvedCategory {
            group: CategoryGroup::new(
                label,
                positions
                    .iter()
                    .enumerate()
                    .map(|(idx, position)| CanonicalRow {
                        position: *position,
                        athlete_name: Some(format!("{label} {idx}")),
                        ..CanonicalRow::default()
                    })
                    .collect(),
            ),
            category_id: id.to_string(),
            kind: MatchKind::Exact,
        }
    }

    #[test]
    fn truncates_each_group_to_limit() {
        let groups = vec![
            resolved("Elite Masculino", "c1", &[Some(1), Some(2), Some(3), Some(4)]),
            resolved("Sub-23", "c2", &[Some(1)]),
        ];
        let top = extract_top(&groups, "ev-1", 2);
        assert_eq!(top.len(), 3);
        assert_eq!(top.iter().filter(|r| r.category_id == "c1").count(), 2);
        assert!(top.iter().all(|r| r.event_id == "ev-1"));
        assert_eq!(top[0].category_name, "Elite Masculino");
    }

    #[test]
    fn labels_sharing_a_category_share_one_limit() {
        let groups = vec![
            resolved("Sub-23 Masculino", "c1", &[Some(1), Some(2), Some(3)]),
            resolved("Elite", "c2", &[Some(1)]),
            resolved("Sub-23 Feminino", "c1", &[Some(1), Some(2), None]),
        ];
        let top = extract_top(&groups, "ev", 3);
        let sub23 = top
            .iter()
            .filter(|r| r.category_id == "c1")
            .map(|r| (r.position, r.category_name.as_str()))
            .collect::<Vec<_>>();
        assert_eq!(
            sub23,
            vec![
                (1, "Sub-23 Masculino"),
                (1, "Sub-23 Feminino"),
                (2, "Sub-23 Masculino"),
            ]
        );
        // categories keep first-appearance order
        assert_eq!(top[0].category_id, "c1");
        assert_eq!(top[3].category_id, "c2");
    }

    #[test]
    fn merged_missing_positions_sort_last() {
        let groups = vec![
            resolved("Sub-23", "c1", &[None]),
            resolved("SUB-23", "c1", &[Some(4)]),
        ];
        let podium = merge_by_category(&groups);
        assert_eq!(podium.len(), 1);
        let labels = podium[0].rows.iter().map(|(label, _)| *label).collect::<Vec<_>>();
        assert_eq!(labels, vec!["SUB-23", "Sub-23"]);
        let positions = extract_top(&groups, "ev", 5)
            .iter()
            .map(|r| r.position)
            .collect::<Vec<_>>();
        assert_eq!(positions, vec![4, 2]);
    }

    #[test]
    fn missing_positions_become_rank() {
        let groups = vec![resolved("Elite", "c1", &[Some(1), None, None])];
        let positions = extract_top(&groups, "ev", DEFAULT_TOP_LIMIT)
            .iter()
            .map(|r| r.position)
            .collect::<Vec<_>>();
        assert_eq!(positions, vec![1, 2, 3]);
    }

    #[test]
    fn absent_text_defaults_to_empty_and_ids_are_unique() {
        let groups = vec![resolved("Elite", "c1", &[None, None])];
        let top = extract_top(&groups, "ev", 5);
        assert_eq!(top[0].club_name, "");
        assert_eq!(top[0].result, "");
        assert!(top[0].user_id.is_none());
        let ids = top.iter().map(|r| r.id).collect::<HashSet<_>>();
        assert_eq!(ids.len(), 2);
    }

    #[test]
    fn zero_limit_keeps_nothing() {
        let groups = vec![resolved("Elite", "c1", &[Some(1)])];
        assert!(extract_top(&groups, "ev", 0).is_empty());
    }
}
