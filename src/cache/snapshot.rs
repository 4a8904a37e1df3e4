//! Immutable point-in-time views over a path index.

use std::collections::HashMap;

use time::OffsetDateTime;
use tracing::warn;

use crate::domain::paths;

use super::index::TreeCacheEntry;

/// All entries of one kind, as loaded at `built_at`.
///
/// A snapshot is never mutated after construction; caches replace it
/// wholesale, so a reader holding an `Arc` to it always sees a complete view.
#[derive(Debug)]
pub struct TreeCacheSnapshot<T> {
    entries: Vec<TreeCacheEntry<T>>,
    by_path: HashMap<String, usize>,
    generation: u64,
    built_at: OffsetDateTime,
}

impl<T> TreeCacheSnapshot<T> {
    /// Build a snapshot from raw index entries.
    ///
    /// Paths are unique within a snapshot; when the index reports the same
    /// path twice the later entry wins.
    pub fn build(kind: &str, entries: Vec<TreeCacheEntry<T>>, generation: u64) -> Self {
        let mut unique: Vec<TreeCacheEntry<T>> = Vec::with_capacity(entries.len());
        let mut by_path = HashMap::with_capacity(entries.len());

        for entry in entries {
            let key = paths::lookup_key(&entry.path);
            match by_path.get(&key) {
                Some(&position) => {
                    warn!(
                        cache_kind = kind,
                        path = %entry.path,
                        "Duplicate path in index, keeping the later entry"
                    );
                    unique[position] = entry;
                }
                None => {
                    by_path.insert(key, unique.len());
                    unique.push(entry);
                }
            }
        }

        Self {
            entries: unique,
            by_path,
            generation,
            built_at: OffsetDateTime::now_utc(),
        }
    }

    /// Exact (case-insensitive) path lookup.
    pub fn get(&self, path: &str) -> Option<&TreeCacheEntry<T>> {
        self.by_path
            .get(&paths::lookup_key(path))
            .map(|&position| &self.entries[position])
    }

    pub fn entries(&self) -> &[TreeCacheEntry<T>] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Cache generation this snapshot was built for.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn built_at(&self) -> OffsetDateTime {
        self.built_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::nodes::NodeId;

    fn entry(path: &str, payload: u32) -> TreeCacheEntry<u32> {
        TreeCacheEntry {
            path: path.to_string(),
            id: NodeId::new(),
            payload,
        }
    }

    #[test]
    fn lookup_is_exact_and_case_insensitive() {
        let snapshot = TreeCacheSnapshot::build(
            "test",
            vec![entry("/Root/Site/Settings/a.settings", 1)],
            0,
        );

        assert_eq!(
            snapshot
                .get("/root/site/settings/A.settings")
                .map(|e| e.payload),
            Some(1)
        );
        assert!(snapshot.get("/Root/Site/Settings").is_none());
        assert!(snapshot.get("/Root/Site/Settings/a.settings/x").is_none());
    }

    #[test]
    fn duplicate_paths_keep_the_later_entry() {
        let snapshot = TreeCacheSnapshot::build(
            "test",
            vec![entry("/Root/A", 1), entry("/Root/B", 2), entry("/root/a", 3)],
            4,
        );

        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot.get("/Root/A").map(|e| e.payload), Some(3));
        assert_eq!(snapshot.generation(), 4);
    }

    #[test]
    fn empty_index_builds_empty_snapshot() {
        let snapshot: TreeCacheSnapshot<u32> = TreeCacheSnapshot::build("test", Vec::new(), 0);
        assert!(snapshot.is_empty());
        assert!(snapshot.entries().is_empty());
    }
}
