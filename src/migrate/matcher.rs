//! Assigning orphaned encrypted blobs to profile ids
//!
//! Older layouts stored each profile's blob under a key that merely embeds the
//! profile id (`traeky:profile:<id>:data`, `<id>`, ...). A blob belongs to a
//! profile when its key contains the id. This is a heuristic: when several
//! keys embed the same id the ranking below decides, without any guarantee
//! that the choice is the one the old layout intended.

use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet};

/// Best key for one profile id
///
/// Candidates must contain the id. Keys ending in the id rank first, then
/// shorter keys, then lexicographic order.
pub fn best_match<'a, I>(profile_id: &str, keys: I) -> Option<&'a str>
where
    I: IntoIterator<Item = &'a str>,
{
    if profile_id.is_empty() {
        return None;
    }
    keys.into_iter()
        .filter(|key| key.contains(profile_id))
        .min_by_key(|key| (Reverse(key.ends_with(profile_id)), key.len(), *key))
}

/// Match every profile id to at most one key, never reusing a key
///
/// Ids are served in the order given.
pub fn assign_orphans<'a>(profile_ids: &[&str], keys: &[&'a str]) -> BTreeMap<String, &'a str> {
    let mut taken = BTreeSet::new();
    let mut assigned = BTreeMap::new();

    for id in profile_ids {
        let free = keys.iter().copied().filter(|k| !taken.contains(k));
        if let Some(key) = best_match(id, free) {
            taken.insert(key);
            assigned.insert(id.to_string(), key);
        }
    }
    assigned
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_suffix_match_preferred() {
        let keys = ["traeky:profile:abc:data-old", "traeky:blob:abc"];
        assert_eq!(best_match("abc", keys), Some("traeky:blob:abc"));
    }

    #[test]
    fn test_shortest_then_lexicographic() {
        let keys = ["x-abc-long", "y-abc-", "a-abc-"];
        assert_eq!(best_match("abc", keys), Some("a-abc-"));
    }

    #[test]
    fn test_no_candidate() {
        assert_eq!(best_match("abc", ["nothing", "here"]), None);
        assert_eq!(best_match("", ["anything"]), None);
    }

    #[test]
    fn test_keys_not_reused() {
        let keys = ["blob:p1", "blob:p1:copy"];
        let assigned = assign_orphans(&["p1", "p1:copy"], &keys);
        assert_eq!(assigned["p1"], "blob:p1");
        assert_eq!(assigned["p1:copy"], "blob:p1:copy");

        let assigned = assign_orphans(&["p1", "p1"], &["blob:p1"]);
        assert_eq!(assigned.len(), 1);
    }
}
