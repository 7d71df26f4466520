//! In-memory page progress map
//!
//! The store is shared between the progress updater (single logical writer)
//! and any number of status readers. Reads always hand out an independent copy.

use crate::state::PageState;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock};

/// Progress of one listing page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageProgress {
    pub page: u32,
    #[serde(default)]
    pub error: String,
    #[serde(default)]
    pub total: u32,
    pub state: PageState,
}

impl PageProgress {
    pub fn pending(page: u32) -> Self {
        Self {
            page,
            error: String::new(),
            total: 0,
            state: PageState::Pending,
        }
    }

    pub fn processing(page: u32, total: u32) -> Self {
        Self {
            page,
            error: String::new(),
            total,
            state: PageState::Processing,
        }
    }

    pub fn finished(page: u32, total: u32, error: Option<String>) -> Self {
        Self {
            page,
            error: error.unwrap_or_default(),
            total,
            state: PageState::Finished,
        }
    }

    pub fn has_error(&self) -> bool {
        !self.error.is_empty()
    }
}

/// A complete copy of every page's progress, keyed by page number
pub type ProgressSnapshot = BTreeMap<u32, PageProgress>;

/// Thread-safe page progress map
#[derive(Debug, Default)]
pub struct ProgressStore {
    pages: RwLock<ProgressSnapshot>,
}

impl ProgressStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the progress of a page
    ///
    /// Updates that would move a page backwards (for example a late
    /// `Processing` event arriving after `Finished`) are ignored.
    ///
    /// # Returns
    ///
    /// `true` if the stored value changed
    pub fn set(&self, progress: PageProgress) -> bool {
        let mut pages = self.pages.write().unwrap_or_else(PoisonError::into_inner);

        if let Some(current) = pages.get(&progress.page) {
            if !current.state.can_advance_to(progress.state) {
                tracing::debug!(
                    page = progress.page,
                    from = %current.state,
                    to = %progress.state,
                    "Ignoring page state regression"
                );
                return false;
            }
        }

        pages.insert(progress.page, progress);
        true
    }

    /// Forces every page in `from..=to` back to `Pending`
    ///
    /// Used when a new job is seeded; unlike [`ProgressStore::set`] this
    /// deliberately resets pages finished by an earlier run.
    pub fn seed_pending(&self, from: u32, to: u32) {
        let mut pages = self.pages.write().unwrap_or_else(PoisonError::into_inner);
        for page in from..=to {
            pages.insert(page, PageProgress::pending(page));
        }
    }

    pub fn get(&self, page: u32) -> Option<PageProgress> {
        self.pages
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&page)
            .cloned()
    }

    /// Returns an independent copy of the whole map
    pub fn get_all(&self) -> ProgressSnapshot {
        self.pages
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replaces the whole map with a loaded snapshot
    pub fn load(&self, snapshot: ProgressSnapshot) {
        *self.pages.write().unwrap_or_else(PoisonError::into_inner) = snapshot;
    }

    pub fn len(&self) -> usize {
        self.pages.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_set_and_get() {
        let store = ProgressStore::new();
        assert!(store.set(PageProgress::pending(4)));

        let page = store.get(4).unwrap();
        assert_eq!(page.state, PageState::Pending);
        assert_eq!(page.total, 0);
        assert!(store.get(5).is_none());
    }

    #[test]
    fn test_state_never_regresses() {
        let store = ProgressStore::new();
        store.set(PageProgress::pending(1));
        store.set(PageProgress::finished(1, 200, None));

        assert!(!store.set(PageProgress::processing(1, 50)));
        let page = store.get(1).unwrap();
        assert_eq!(page.state, PageState::Finished);
        assert_eq!(page.total, 200);
    }

    #[test]
    fn test_processing_updates_are_repeatable() {
        let store = ProgressStore::new();
        store.set(PageProgress::processing(2, 50));
        assert!(store.set(PageProgress::processing(2, 100)));
        assert_eq!(store.get(2).unwrap().total, 100);
    }

    #[test]
    fn test_finished_may_carry_error() {
        let store = ProgressStore::new();
        store.set(PageProgress::finished(
            9,
            0,
            Some("connection reset".to_string()),
        ));

        let page = store.get(9).unwrap();
        assert_eq!(page.state, PageState::Finished);
        assert!(page.has_error());
    }

    #[test]
    fn test_get_all_is_independent_copy() {
        let store = ProgressStore::new();
        store.set(PageProgress::pending(1));

        let snapshot = store.get_all();
        store.set(PageProgress::finished(1, 10, None));
        store.set(PageProgress::pending(2));

        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[&1].state, PageState::Pending);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_seed_pending_resets_finished_pages() {
        let store = ProgressStore::new();
        store.set(PageProgress::finished(3, 25, None));
        store.seed_pending(2, 4);

        assert_eq!(store.len(), 3);
        assert_eq!(store.get(3).unwrap().state, PageState::Pending);
    }

    #[test]
    fn test_load_replaces_contents() {
        let store = ProgressStore::new();
        store.set(PageProgress::pending(1));

        let mut snapshot = ProgressSnapshot::new();
        snapshot.insert(7, PageProgress::finished(7, 3, None));
        store.load(snapshot);

        assert_eq!(store.len(), 1);
        assert!(store.get(1).is_none());
        assert_eq!(store.get(7).unwrap().total, 3);
    }

    #[test]
    fn test_concurrent_writers_and_readers() {
        let store = Arc::new(ProgressStore::new());
        let mut handles = Vec::new();

        for worker in 0..4u32 {
            let store = store.clone();
            handles.push(std::thread::spawn(move || {
                for page in (worker * 25)..((worker + 1) * 25) {
                    store.set(PageProgress::finished(page, page, None));
                    let _ = store.get_all();
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(store.len(), 100);
    }
}
