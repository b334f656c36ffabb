//! Datastore collaborator boundary and the in-memory implementation.
//!
//! The pipeline never talks to a database directly. It receives a
//! [`Datastore`] and uses four read operations plus a per-event
//! [`ResultTransaction`] for the delete-then-insert replacement. A
//! transaction that is dropped without [`ResultTransaction::commit`] leaves
//! the stored results exactly as they were.

use std::{
    collections::{BTreeMap, HashSet},
    sync::{Condvar, Mutex, MutexGuard},
};

use chrono::{DateTime, Utc};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::{
    error::{StoreError, StoreResult},
    resolve::CatalogCategory,
    topn::ProcessedResult,
};

pub trait Datastore: Send + Sync {
    /// Catalog for one event, in the store's natural order.
    fn categories_for_event(&self, event_id: &str) -> StoreResult<Vec<CatalogCategory>>;

    /// First person whose name contains `fragment`, ignoring case.
    fn find_person_by_name_contains(&self, fragment: &str) -> StoreResult<Option<String>>;

    /// First club whose name contains `fragment`, ignoring case.
    fn find_club_by_name_contains(&self, fragment: &str) -> StoreResult<Option<String>>;

    fn top_results_for_event(&self, event_id: &str) -> StoreResult<Vec<ProcessedResult>>;

    /// Opens the exclusive write transaction for one event's results.
    fn begin_results<'a>(&'a self, event_id: &str)
    -> StoreResult<Box<dyn ResultTransaction + 'a>>;
}

pub trait ResultTransaction {
    fn event_id(&self) -> &str;

    /// Removes every stored result of the event; returns how many went.
    fn delete_top_results(&mut self) -> StoreResult<usize>;

    fn insert_top_result(&mut self, result: &ProcessedResult) -> StoreResult<()>;

    /// Makes the staged changes visible; returns the event's stored row count.
    fn commit(self: Box<Self>) -> StoreResult<usize>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedRecord {
    pub id: String,
    pub name: String,
}

impl NamedRecord {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// Whole persisted state; also the on-disk shape of the JSON store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreDocument {
    #[serde(default)]
    pub categories: BTreeMap<String, Vec<CatalogCategory>>,
    #[serde(default)]
    pub people: Vec<NamedRecord>,
    #[serde(default)]
    pub clubs: Vec<NamedRecord>,
    #[serde(default)]
    pub results: Vec<ProcessedResult>,
    #[serde(default)]
    pub replaced_at: BTreeMap<String, DateTime<Utc>>,
}

impl StoreDocument {
    pub fn catalog(&self, event_id: &str) -> Vec<CatalogCategory> {
        self.categories.get(event_id).cloned().unwrap_or_default()
    }

    pub fn results_for(&self, event_id: &str) -> Vec<ProcessedResult> {
        self.results
            .iter()
            .filter(|r| r.event_id == event_id)
            .cloned()
            .collect()
    }

    fn apply(&mut self, staging: &Staging) -> usize {
        if staging.deleted {
            self.results.retain(|r| r.event_id != staging.event_id);
        }
        self.results.extend(staging.rows.iter().cloned());
        self.replaced_at.insert(staging.event_id.clone(), Utc::now());
        self.results
            .iter()
            .filter(|r| r.event_id == staging.event_id)
            .count()
    }
}

pub(crate) fn find_by_name_contains(records: &[NamedRecord], fragment: &str) -> Option<String> {
    let needle = fragment.trim().to_lowercase();
    if needle.is_empty() {
        return None;
    }
    records
        .iter()
        .find(|record| record.name.to_lowercase().contains(&needle))
        .map(|record| record.id.clone())
}

/// Pending replacement for one event, validated against a document snapshot.
#[derive(Debug, Clone)]
pub(crate) struct Staging {
    event_id: String,
    deleted: bool,
    rows: Vec<ProcessedResult>,
}

impl Staging {
    pub(crate) fn new(event_id: &str) -> Self {
        Self {
            event_id: event_id.to_string(),
            deleted: false,
            rows: Vec::new(),
        }
    }

    pub(crate) fn event_id(&self) -> &str {
        &self.event_id
    }

    pub(crate) fn delete(&mut self, document: &StoreDocument) -> usize {
        let existing = if self.deleted {
            0
        } else {
            document
                .results
                .iter()
                .filter(|r| r.event_id == self.event_id)
                .count()
        };
        let removed = existing + self.rows.len();
        self.deleted = true;
        self.rows.clear();
        removed
    }

    pub(crate) fn insert(
        &mut self,
        document: &StoreDocument,
        result: &ProcessedResult,
    ) -> StoreResult<()> {
        if result.event_id != self.event_id {
            return Err(StoreError::Constraint(format!(
                "result {} belongs to event '{}', transaction is for '{}'",
                result.id, result.event_id, self.event_id
            )));
        }
        let known_category = document
            .categories
            .get(&self.event_id)
            .is_some_and(|catalog| catalog.iter().any(|c| c.id == result.category_id));
        if !known_category {
            return Err(StoreError::Constraint(format!(
                "category '{}' does not exist for event '{}'",
                result.category_id, self.event_id
            )));
        }
        let duplicate = self.rows.iter().any(|r| r.id == result.id)
            || document
                .results
                .iter()
                .filter(|r| !(self.deleted && r.event_id == self.event_id))
                .any(|r| r.id == result.id);
        if duplicate {
            return Err(StoreError::Constraint(format!(
                "result id {} already exists",
                result.id
            )));
        }
        self.rows.push(result.clone());
        Ok(())
    }

    pub(crate) fn apply_to(&self, document: &mut StoreDocument) -> usize {
        document.apply(self)
    }
}

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> StoreResult<MutexGuard<'_, T>> {
    mutex
        .lock()
        .map_err(|_| StoreError::Unavailable("store lock poisoned".to_string()))
}

/// Set of events with an open writer; `acquire` blocks until the event is free.
#[derive(Debug, Default)]
pub(crate) struct WriterSlots {
    busy: Mutex<HashSet<String>>,
    released: Condvar,
}

impl WriterSlots {
    pub(crate) fn acquire(&self, event_id: &str) -> StoreResult<()> {
        let mut busy = lock(&self.busy)?;
        while busy.contains(event_id) {
            busy = self
                .released
                .wait(busy)
                .map_err(|_| StoreError::Unavailable("store lock poisoned".to_string()))?;
        }
        busy.insert(event_id.to_string());
        Ok(())
    }

    pub(crate) fn release(&self, event_id: &str) {
        if let Ok(mut busy) = self.busy.lock() {
            busy.remove(event_id);
        }
        self.released.notify_all();
    }
}

/// Thread-safe store held entirely in memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    document: Mutex<StoreDocument>,
    writers: WriterSlots,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_document(document: StoreDocument) -> Self {
        Self {
            document: Mutex::new(document),
            writers: WriterSlots::default(),
        }
    }

    pub fn with_category(self, event_id: &str, id: &str, name: &str) -> Self {
        if let Ok(mut document) = self.document.lock() {
            document
                .categories
                .entry(event_id.to_string())
                .or_default()
                .push(CatalogCategory::new(id, name));
        }
        self
    }

    pub fn with_person(self, id: &str, name: &str) -> Self {
        if let Ok(mut document) = self.document.lock() {
            document.people.push(NamedRecord::new(id, name));
        }
        self
    }

    pub fn with_club(self, id: &str, name: &str) -> Self {
        if let Ok(mut document) = self.document.lock() {
            document.clubs.push(NamedRecord::new(id, name));
        }
        self
    }

    /// Drops a catalog entry, as an administrator editing the event would.
    pub fn remove_category(&self, event_id: &str, category_id: &str) -> StoreResult<()> {
        let mut document = lock(&self.document)?;
        if let Some(catalog) = document.categories.get_mut(event_id) {
            catalog.retain(|c| c.id != category_id);
        }
        Ok(())
    }

    pub fn snapshot(&self) -> StoreResult<StoreDocument> {
        Ok(lock(&self.document)?.clone())
    }
}

impl Datastore for MemoryStore {
    fn categories_for_event(&self, event_id: &str) -> StoreResult<Vec<CatalogCategory>> {
        Ok(lock(&self.document)?.catalog(event_id))
    }

    fn find_person_by_name_contains(&self, fragment: &str) -> StoreResult<Option<String>> {
        Ok(find_by_name_contains(&lock(&self.document)?.people, fragment))
    }

    fn find_club_by_name_contains(&self, fragment: &str) -> StoreResult<Option<String>> {
        Ok(find_by_name_contains(&lock(&self.document)?.clubs, fragment))
    }

    fn top_results_for_event(&self, event_id: &str) -> StoreResult<Vec<ProcessedResult>> {
        Ok(lock(&self.document)?.results_for(event_id))
    }

    fn begin_results<'a>(
        &'a self,
        event_id: &str,
    ) -> StoreResult<Box<dyn ResultTransaction + 'a>> {
        self.writers.acquire(event_id)?;
        debug!("Opened results transaction for event '{event_id}'");
        Ok(Box::new(MemoryTransaction {
            store: self,
            staging: Staging::new(event_id),
        }))
    }
}

struct MemoryTransaction<'a> {
    store: &'a MemoryStore,
    staging: Staging,
}

impl ResultTransaction for MemoryTransaction<'_> {
    fn event_id(&self) -> &str {
        self.staging.event_id()
    }

    fn delete_top_results(&mut self) -> StoreResult<usize> {
        let document = lock(&self.store.document)?;
        Ok(self.staging.delete(&document))
    }

    fn insert_top_result(&mut self, result: &ProcessedResult) -> StoreResult<()> {
        let document = lock(&self.store.document)?;
        self.staging.insert(&document, result)
    }

    fn commit(self: Box<Self>) -> StoreResult<usize> {
        let mut document = lock(&self.store.document)?;
        Ok(self.staging.apply_to(&mut document))
    }
}

impl Drop for MemoryTransaction<'_> {
    fn drop(&mut self) {
        self.store.writers.release(self.staging.event_id());
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, thread};

    use uuid::Uuid;

    use super::*;

    fn result(event: &str, category: &str, position: u32) -> ProcessedResult {
        ProcessedResult {
            id: Uuid::new_v4(),
            event_id: event.to_string(),
            category_id: category.to_string(),
            category_name: category.to_uppercase(),
            position,
            athlete_name: format!("Atleta {position}"),
            club_name: String::new(),
            result: String::new(),
            user_id: None,
            club_id: None,
        }
    }

    fn store() -> MemoryStore {
        MemoryStore::new()
            .with_category("ev", "c1", "Elite")
            .with_category("other", "o1", "Elite")
            .with_person("p1", "Ana Souza")
            .with_person("p2", "Ana Paula")
            .with_club("k1", "Clube Atlético Paulista")
    }

    #[test]
    fn name_search_is_case_insensitive_substring_in_order() {
        let store = store();
        assert_eq!(
            store.find_person_by_name_contains("ANA").unwrap(),
            Some("p1".to_string())
        );
        assert_eq!(
            store.find_club_by_name_contains("atlético").unwrap(),
            Some("k1".to_string())
        );
        assert_eq!(store.find_person_by_name_contains("Bia").unwrap(), None);
        assert_eq!(store.find_person_by_name_contains("  ").unwrap(), None);
    }

    #[test]
    fn uncommitted_transaction_changes_nothing() {
        let store = store();
        {
            let mut tx = store.begin_results("ev").unwrap();
            tx.insert_top_result(&result("ev", "c1", 1)).unwrap();
            tx.commit().unwrap();
        }
        {
            let mut tx = store.begin_results("ev").unwrap();
            assert_eq!(tx.delete_top_results().unwrap(), 1);
            tx.insert_top_result(&result("ev", "c1", 2)).unwrap();
        }
        let stored = store.top_results_for_event("ev").unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].position, 1);
    }

    #[test]
    fn replacement_only_touches_its_event() {
        let store = store();
        for event in ["ev", "other"] {
            let category = if event == "ev" { "c1" } else { "o1" };
            let mut tx = store.begin_results(event).unwrap();
            tx.insert_top_result(&result(event, category, 1)).unwrap();
            tx.commit().unwrap();
        }
        let mut tx = store.begin_results("ev").unwrap();
        tx.delete_top_results().unwrap();
        tx.insert_top_result(&result("ev", "c1", 7)).unwrap();
        assert_eq!(tx.commit().unwrap(), 1);
        assert_eq!(store.top_results_for_event("other").unwrap().len(), 1);
        assert_eq!(store.top_results_for_event("ev").unwrap()[0].position, 7);
        assert!(store.snapshot().unwrap().replaced_at.contains_key("ev"));
    }

    #[test]
    fn inserts_enforce_constraints() {
        let store = store();
        let mut tx = store.begin_results("ev").unwrap();
        assert!(matches!(
            tx.insert_top_result(&result("ev", "missing", 1)),
            Err(StoreError::Constraint(_))
        ));
        assert!(matches!(
            tx.insert_top_result(&result("other", "o1", 1)),
            Err(StoreError::Constraint(_))
        ));
        let row = result("ev", "c1", 1);
        tx.insert_top_result(&row).unwrap();
        assert!(matches!(
            tx.insert_top_result(&row),
            Err(StoreError::Constraint(_))
        ));
    }

    #[test]
    fn writers_for_one_event_are_serialized() {
        let store = Arc::new(store());
        let handles = (0..4u32)
            .map(|n| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    let mut tx = store.begin_results("ev").unwrap();
                    tx.delete_top_results().unwrap();
                    for position in 1..=3 {
                        tx.insert_top_result(&result("ev", "c1", position + n * 10))
                            .unwrap();
                        thread::yield_now();
                    }
                    tx.commit().unwrap();
                })
            })
            .collect::<Vec<_>>();
        for handle in handles {
            handle.join().expect("writer thread");
        }
        let stored = store.top_results_for_event("ev").unwrap();
        assert_eq!(stored.len(), 3);
        let run = stored[0].position / 10;
        assert!(stored.iter().all(|r| r.position / 10 == run));
    }
}
