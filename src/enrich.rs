//! Best-effort linking of result rows to known people and clubs.

use log::{debug, warn};
use serde::Serialize;

use crate::{
    error::{StoreError, StoreResult},
    store::Datastore,
    topn::ProcessedResult,
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrichmentStats {
    pub people_linked: usize,
    pub clubs_linked: usize,
    pub lookup_failures: usize,
}

#[derive(Debug, Clone, Copy)]
enum Lookup {
    Person,
    Club,
}

/// Fills `user_id` and `club_id` where a name search finds a record.
///
/// A failed lookup counts as "no match". Only an unavailable datastore is
/// returned as an error, since every later step needs it too.
pub fn enrich_results(
    results: &mut [ProcessedResult],
    store: &dyn Datastore,
) -> StoreResult<EnrichmentStats> {
    let mut stats = EnrichmentStats::default();
    for result in results.iter_mut() {
        result.user_id = lookup(store, Lookup::Person, &result.athlete_name, &mut stats)?;
        result.club_id = lookup(store, Lookup::Club, &result.club_name, &mut stats)?;
        stats.people_linked += usize::from(result.user_id.is_some());
        stats.clubs_linked += usize::from(result.club_id.is_some());
    }
    debug!(
        "Linked {} athlete(s) and {} club(s) across {} result(s)",
        stats.people_linked,
        stats.clubs_linked,
        results.len()
    );
    Ok(stats)
}

fn lookup(
    store: &dyn Datastore,
    kind: Lookup,
    name: &str,
    stats: &mut EnrichmentStats,
) -> StoreResult<Option<String>> {
    let fragment = name.trim();
    if fragment.is_empty() {
        return Ok(None);
    }
    let found = match kind {
        Lookup::Person => store.find_person_by_name_contains(fragment),
        Lookup::Club => store.find_club_by_name_contains(fragment),
    };
    match found {
        Ok(id) => Ok(id),
        Err(err @ StoreError::Unavailable(_)) => Err(err),
        Err(err) => {
            warn!("{kind:?} lookup for '{fragment}' failed, leaving it unlinked: {err}");
            stats.lookup_failures += 1;
            Ok(None)
        }
    }
}
