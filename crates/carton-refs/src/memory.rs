//! In-memory reference store for testing and ephemeral use.

use std::collections::HashMap;
use std::sync::RwLock;

use carton_types::Locator;

use crate::error::{RefError, RefResult};
use crate::names::validate_ref_name;
use crate::traits::RefStore;
use crate::types::Ref;

/// An in-memory implementation of [`RefStore`].
///
/// All data lives in a `HashMap` behind a `RwLock`; the compare-and-swap
/// runs under the write lock, so within one process the atomicity contract
/// holds exactly. Data is lost when the store is dropped.
#[derive(Debug, Default)]
pub struct InMemoryRefStore {
    refs: RwLock<HashMap<String, Ref>>,
}

impl InMemoryRefStore {
    /// Create a new empty ref store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl RefStore for InMemoryRefStore {
    fn read(&self, name: &str) -> RefResult<Option<Ref>> {
        let refs = self.refs.read().expect("lock poisoned");
        Ok(refs.get(name).cloned())
    }

    fn compare_and_swap(
        &self,
        name: &str,
        locator: Locator,
        expected_generation: Option<u64>,
    ) -> RefResult<u64> {
        validate_ref_name(name)?;
        let mut refs = self.refs.write().expect("lock poisoned");
        let current = refs.get(name).map(|r| r.generation);
        if current != expected_generation {
            return Err(RefError::Conflict {
                name: name.to_string(),
                expected: expected_generation,
                actual: current,
            });
        }
        let generation = current.unwrap_or(0) + 1;
        refs.insert(
            name.to_string(),
            Ref {
                name: name.to_string(),
                locator,
                generation,
            },
        );
        Ok(generation)
    }

    fn delete(&self, name: &str) -> RefResult<bool> {
        let mut refs = self.refs.write().expect("lock poisoned");
        Ok(refs.remove(name).is_some())
    }

    fn list(&self, prefix: &str) -> RefResult<Vec<Ref>> {
        let refs = self.refs.read().expect("lock poisoned");
        let mut result: Vec<Ref> = refs
            .values()
            .filter(|r| r.name.starts_with(prefix))
            .cloned()
            .collect();
        result.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use carton_types::BundleId;

    fn loc(byte: u8) -> Locator {
        Locator::new(BundleId::from_hash([byte; 32]), 0)
    }

    #[test]
    fn create_and_read() {
        let store = InMemoryRefStore::new();
        let generation = store.compare_and_swap("main", loc(1), None).unwrap();
        assert_eq!(generation, 1);

        let r = store.read("main").unwrap().unwrap();
        assert_eq!(r.locator, loc(1));
        assert_eq!(r.generation, 1);
    }

    #[test]
    fn read_missing_returns_none() {
        let store = InMemoryRefStore::new();
        assert!(store.read("ghost").unwrap().is_none());
    }

    #[test]
    fn create_over_existing_conflicts() {
        let store = InMemoryRefStore::new();
        store.compare_and_swap("main", loc(1), None).unwrap();
        let err = store.compare_and_swap("main", loc(2), None).unwrap_err();
        assert!(matches!(
            err,
            RefError::Conflict {
                expected: None,
                actual: Some(1),
                ..
            }
        ));
    }

    #[test]
    fn update_with_current_generation() {
        let store = InMemoryRefStore::new();
        store.compare_and_swap("main", loc(1), None).unwrap();
        let generation = store.compare_and_swap("main", loc(2), Some(1)).unwrap();
        assert_eq!(generation, 2);
        assert_eq!(store.read("main").unwrap().unwrap().locator, loc(2));
    }

    #[test]
    fn stale_generation_conflicts_with_observed_value() {
        let store = InMemoryRefStore::new();
        store.compare_and_swap("main", loc(1), None).unwrap();
        store.compare_and_swap("main", loc(2), Some(1)).unwrap();

        let err = store.compare_and_swap("main", loc(3), Some(1)).unwrap_err();
        match err {
            RefError::Conflict {
                expected, actual, ..
            } => {
                assert_eq!(expected, Some(1));
                assert_eq!(actual, Some(2));
            }
            other => panic!("expected Conflict, got {other}"),
        }
    }

    #[test]
    fn update_of_missing_ref_conflicts() {
        let store = InMemoryRefStore::new();
        let err = store.compare_and_swap("ghost", loc(1), Some(3)).unwrap_err();
        assert!(matches!(
            err,
            RefError::Conflict {
                actual: None,
                ..
            }
        ));
    }

    #[test]
    fn delete_and_recreate_resets_generation() {
        let store = InMemoryRefStore::new();
        store.compare_and_swap("main", loc(1), None).unwrap();
        assert!(store.delete("main").unwrap());
        assert!(!store.delete("main").unwrap());

        let generation = store.compare_and_swap("main", loc(2), None).unwrap();
        assert_eq!(generation, 1);
    }

    #[test]
    fn invalid_name_is_rejected() {
        let store = InMemoryRefStore::new();
        assert!(matches!(
            store.compare_and_swap("bad..name", loc(1), None),
            Err(RefError::InvalidName { .. })
        ));
    }

    #[test]
    fn list_filters_by_prefix_and_sorts() {
        let store = InMemoryRefStore::new();
        store.compare_and_swap("builds/b", loc(1), None).unwrap();
        store.compare_and_swap("builds/a", loc(2), None).unwrap();
        store.compare_and_swap("main", loc(3), None).unwrap();

        let builds = store.list("builds/").unwrap();
        assert_eq!(builds.len(), 2);
        assert_eq!(builds[0].name, "builds/a");
        assert_eq!(builds[1].name, "builds/b");

        assert_eq!(store.list("").unwrap().len(), 3);
    }

    #[test]
    fn racing_writers_produce_one_winner() {
        use std::sync::Arc;
        use std::thread;

        let store = Arc::new(InMemoryRefStore::new());
        store.compare_and_swap("main", loc(0), None).unwrap();

        let handles: Vec<_> = (1..=8u8)
            .map(|i| {
                let store = Arc::clone(&store);
                thread::spawn(move || store.compare_and_swap("main", loc(i), Some(1)))
            })
            .collect();

        let mut wins = 0;
        let mut conflicts = 0;
        for h in handles {
            match h.join().expect("thread should not panic") {
                Ok(generation) => {
                    assert_eq!(generation, 2);
                    wins += 1;
                }
                Err(RefError::Conflict { actual, .. }) => {
                    assert_eq!(actual, Some(2));
                    conflicts += 1;
                }
                Err(other) => panic!("unexpected error: {other}"),
            }
        }
        assert_eq!(wins, 1);
        assert_eq!(conflicts, 7);
    }
}
