use std::collections::HashSet;

use log::{info, warn};
use serde::Serialize;

use crate::{
    error::{IngestError, IngestResult},
    store::Datastore,
    topn::ProcessedResult,
};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WriteOutcome {
    pub persisted: Vec<ProcessedResult>,
    pub replaced: usize,
    pub dropped_stale_category: usize,
    pub failed_inserts: usize,
}

/// Replaces the stored results of `event_id` with `rows`.
///
/// Rows whose category left the catalog since resolution are dropped first.
/// If none survive, nothing is touched. Otherwise the delete and the inserts
/// share one transaction: individual insert failures are skipped, and if all
/// of them fail the transaction is abandoned so the previous results stay.
pub fn write_results(
    store: &dyn Datastore,
    event_id: &str,
    rows: Vec<ProcessedResult>,
) -> IngestResult<WriteOutcome> {
    let catalog = store
        .categories_for_event(event_id)?
        .into_iter()
        .map(|c| c.id)
        .collect::<HashSet<_>>();
    let total = rows.len();
    let (valid, stale): (Vec<_>, Vec<_>) = rows
        .into_iter()
        .partition(|row| catalog.contains(&row.category_id));
    for row in &stale {
        warn!(
            "Dropping {} (position {}, '{}'): category {} is no longer in the catalog of event '{}'",
            row.athlete_name, row.position, row.category_name, row.category_id, event_id
        );
    }
    if valid.is_empty() {
        return Err(IngestError::NoValidResults {
            event_id: event_id.to_string(),
            reason: if total == 0 {
                "no rows matched a catalog category".to_string()
            } else {
                format!("all {total} row(s) reference categories missing from the catalog")
            },
        });
    }

    let mut tx = store.begin_results(event_id)?;
    let replaced = tx.delete_top_results()?;
    let mut persisted = Vec::with_capacity(valid.len());
    let mut failed_inserts = 0usize;
    for row in valid {
        match tx.insert_top_result(&row) {
            Ok(()) => persisted.push(row),
            Err(err) => {
                warn!(
                    "Insert failed for {} (position {}, '{}'): {err}",
                    row.athlete_name, row.position, row.category_name
                );
                failed_inserts += 1;
            }
        }
    }
    if persisted.is_empty() {
        // dropping the transaction rolls back the delete
        return Err(IngestError::PersistFailed {
            event_id: event_id.to_string(),
            attempted: failed_inserts,
        });
    }
    tx.commit()?;
    info!(
        "Stored {} result(s) for event '{event_id}' (replaced {replaced}, {} failed insert(s))",
        persisted.len(),
        failed_inserts
    );
    Ok(WriteOutcome {
        persisted,
        replaced,
        dropped_stale_category: stale.len(),
        failed_inserts,
    })
}
