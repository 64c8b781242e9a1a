//! Content-addressed table of active sources and the reconfiguration diff.

use std::collections::{HashMap, HashSet};

use crate::identity::SourceId;

// ─── Diff ────────────────────────────────────────────────────────────

/// Result of diffing the active identity set against a new declaration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceDiff {
    /// Active but no longer declared: tear down.
    pub stale: Vec<SourceId>,
    /// Declared but not yet active: stand up.
    pub fresh: Vec<SourceId>,
}

impl SourceDiff {
    pub fn is_empty(&self) -> bool {
        self.stale.is_empty() && self.fresh.is_empty()
    }
}

/// Diff `current` against `updated` in `O(|current| + |updated|)`.
///
/// IDs present on both sides appear in neither output. Output order is
/// unspecified; duplicates in either input are collapsed.
pub fn diff<'a, 'b, C, U>(current: C, updated: U) -> SourceDiff
where
    C: IntoIterator<Item = &'a SourceId>,
    U: IntoIterator<Item = &'b SourceId>,
{
    let current: HashSet<&SourceId> = current.into_iter().collect();
    let updated: HashSet<&SourceId> = updated.into_iter().collect();

    SourceDiff {
        stale: current
            .iter()
            .filter(|id| !updated.contains(*id))
            .map(|id| (*id).clone())
            .collect(),
        fresh: updated
            .iter()
            .filter(|id| !current.contains(*id))
            .map(|id| (*id).clone())
            .collect(),
    }
}

// ─── Registry ────────────────────────────────────────────────────────

/// Table of active sources keyed by identity.
///
/// Generic over the entry so the async layer can store its cancellation
/// handles and connections here without this crate knowing about them.
#[derive(Debug)]
pub struct SourceRegistry<E> {
    entries: HashMap<SourceId, E>,
}

impl<E> SourceRegistry<E> {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Diff the registered identities against `updated`.
    pub fn diff<'a, U>(&self, updated: U) -> SourceDiff
    where
        U: IntoIterator<Item = &'a SourceId>,
    {
        diff(self.entries.keys(), updated)
    }

    /// Register an entry. Returns the previous entry under the same ID.
    pub fn insert(&mut self, id: SourceId, entry: E) -> Option<E> {
        self.entries.insert(id, entry)
    }

    pub fn remove(&mut self, id: &SourceId) -> Option<E> {
        self.entries.remove(id)
    }

    pub fn get(&self, id: &SourceId) -> Option<&E> {
        self.entries.get(id)
    }

    pub fn contains(&self, id: &SourceId) -> bool {
        self.entries.contains_key(id)
    }

    /// Remove and return every entry.
    pub fn drain(&mut self) -> Vec<(SourceId, E)> {
        self.entries.drain().collect()
    }

    /// Registered IDs, sorted.
    pub fn ids(&self) -> Vec<&SourceId> {
        let mut ids: Vec<&SourceId> = self.entries.keys().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<E> Default for SourceRegistry<E> {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn ids(keys: &[&str]) -> Vec<SourceId> {
        keys.iter().map(|k| SourceId::derive(k, "cfg")).collect()
    }

    fn sorted(mut v: Vec<SourceId>) -> Vec<SourceId> {
        v.sort();
        v
    }

    // ── 1. empty_updated_tears_down_everything ──────────────────────

    #[test]
    fn empty_updated_tears_down_everything() {
        let current = ids(&["a", "b"]);
        let d = diff(&current, &[]);
        assert_eq!(sorted(d.stale), sorted(current));
        assert!(d.fresh.is_empty());
    }

    // ── 2. empty_current_starts_everything ──────────────────────────

    #[test]
    fn empty_current_starts_everything() {
        let updated = ids(&["a", "b"]);
        let d = diff(&[], &updated);
        assert!(d.stale.is_empty());
        assert_eq!(sorted(d.fresh), sorted(updated));
    }

    // ── 3. overlap_is_left_untouched ────────────────────────────────

    #[test]
    fn overlap_is_left_untouched() {
        let current = ids(&["a", "b"]);
        let updated = ids(&["b", "c"]);
        let d = diff(&current, &updated);
        assert_eq!(d.stale, ids(&["a"]));
        assert_eq!(d.fresh, ids(&["c"]));
    }

    // ── 4. registry_diff_uses_registered_ids ────────────────────────

    #[test]
    fn registry_diff_uses_registered_ids() {
        let mut reg: SourceRegistry<&'static str> = SourceRegistry::new();
        let a = SourceId::derive("a", "x");
        reg.insert(a.clone(), "entry-a");

        let b = SourceId::derive("b", "y");
        let d = reg.diff([&a, &b]);
        assert!(d.stale.is_empty());
        assert_eq!(d.fresh, vec![b]);
        assert!(reg.diff([&a]).is_empty());
    }

    // ── 5. registry_insert_remove_drain ─────────────────────────────

    #[test]
    fn registry_insert_remove_drain() {
        let mut reg: SourceRegistry<u32> = SourceRegistry::default();
        assert!(reg.is_empty());
        let a = SourceId::derive("a", "x");
        let b = SourceId::derive("b", "y");
        assert_eq!(reg.insert(a.clone(), 1), None);
        assert_eq!(reg.insert(b.clone(), 2), None);
        assert_eq!(reg.len(), 2);
        assert!(reg.contains(&a));
        assert_eq!(reg.get(&b), Some(&2));

        assert_eq!(reg.remove(&a), Some(1));
        assert!(!reg.contains(&a));

        let drained = reg.drain();
        assert_eq!(drained, vec![(b, 2)]);
        assert!(reg.is_empty());
    }

    // ── 6. registry_diff_accepts_shorter_lived_ids ──────────────────

    #[test]
    fn registry_diff_accepts_shorter_lived_ids() {
        let mut reg: SourceRegistry<u32> = SourceRegistry::new();
        reg.insert(SourceId::derive("a", "x"), 1);

        let d = {
            let declared: HashMap<SourceId, ()> =
                [(SourceId::derive("b", "y"), ())].into_iter().collect();
            reg.diff(declared.keys())
        };
        assert_eq!(d.stale, vec![SourceId::derive("a", "x")]);
        assert_eq!(d.fresh, vec![SourceId::derive("b", "y")]);
    }

    // ── 7. properties ───────────────────────────────────────────────

    fn id_set() -> impl Strategy<Value = Vec<SourceId>> {
        proptest::collection::vec("[a-e]{1,2}", 0..12)
            .prop_map(|keys| keys.iter().map(|k| SourceId::derive(k, "")).collect())
    }

    proptest! {
        #[test]
        fn diff_is_complete_and_disjoint(current in id_set(), updated in id_set()) {
            let c: HashSet<SourceId> = current.iter().cloned().collect();
            let u: HashSet<SourceId> = updated.iter().cloned().collect();
            let both: HashSet<SourceId> = c.intersection(&u).cloned().collect();

            let d = diff(&current, &updated);
            let stale: HashSet<SourceId> = d.stale.iter().cloned().collect();
            let fresh: HashSet<SourceId> = d.fresh.iter().cloned().collect();

            prop_assert_eq!(stale.len(), d.stale.len());
            prop_assert_eq!(fresh.len(), d.fresh.len());
            prop_assert_eq!(stale.union(&both).cloned().collect::<HashSet<_>>(), c);
            prop_assert_eq!(fresh.union(&both).cloned().collect::<HashSet<_>>(), u);
            prop_assert!(stale.is_disjoint(&fresh));
        }

        #[test]
        fn diff_of_self_is_empty(current in id_set()) {
            prop_assert!(diff(&current, &current).is_empty());
        }
    }
}
