//! Recent-activity list maintenance
//!
//! Both the store and the session call `push_recent` so the persisted and
//! in-memory lists can never disagree on ordering.

use crate::types::RECENT_LIMIT;

/// Move `id` to the front of `list`, dropping any older copy, and cap the
/// list at `RECENT_LIMIT` entries.
pub fn push_recent(list: &mut Vec<String>, id: &str) {
    list.retain(|existing| existing != id);
    list.insert(0, id.to_string());
    list.truncate(RECENT_LIMIT);
}
