//! Conflict checking
//!
//! Answers one question: would this window/resource assignment double-book
//! a room or a staff member on that date, across every session kind?
//! Candidates come from the (resource, date) index, so a check touches the
//! bookings of the affected resources only, never the whole table.

use std::collections::HashSet;
use tracing::debug;

use rosterstore::{Filter, IndexValue, Store, StoreError};

use crate::domain::{Resources, Session, TimeWindow};

/// Find the first persisted session that clashes with the given assignment.
/// `exclude` skips the session being moved so it cannot conflict with
/// itself.
pub fn find_conflict(
    store: &Store,
    window: &TimeWindow,
    resources: &Resources,
    exclude: Option<&str>,
) -> Result<Option<Session>, StoreError> {
    debug!(%window, ?exclude, "conflict::find_conflict: called");
    let date = IndexValue::String(window.date.format("%Y-%m-%d").to_string());
    let mut seen: HashSet<String> = HashSet::new();
    for resource in resources.resource_ids() {
        let candidates: Vec<Session> = store.list(&[
            Filter::eq("resource", IndexValue::String(resource)),
            Filter::eq("date", date.clone()),
        ])?;
        for candidate in candidates {
            if exclude == Some(candidate.id.as_str()) {
                continue;
            }
            if !seen.insert(candidate.id.clone()) {
                continue;
            }
            // the index matches ids across both namespaces; shares_any is
            // the authoritative room-vs-room / staff-vs-staff test
            if candidate.resources.shares_any(resources) && candidate.window.overlaps(window) {
                debug!(conflict_id = %candidate.id, "conflict::find_conflict: clash found");
                return Ok(Some(candidate));
            }
        }
    }
    Ok(None)
}

/// Boolean form of [`find_conflict`]
pub fn has_conflict(
    store: &Store,
    window: &TimeWindow,
    resources: &Resources,
    exclude: Option<&str>,
) -> Result<bool, StoreError> {
    Ok(find_conflict(store, window, resources, exclude)?.is_some())
}
