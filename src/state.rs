use std::sync::atomic::{AtomicUsize, Ordering};

/// Counters shared by every worker of one crawl run.
#[derive(Debug)]
pub struct CrawlState {
    admitted: AtomicUsize,
    quota: usize,
    year_cursor: AtomicUsize,
}

impl CrawlState {
    pub fn new(quota: usize) -> Self {
        Self {
            admitted: AtomicUsize::new(0),
            quota,
            year_cursor: AtomicUsize::new(0),
        }
    }

    pub fn quota(&self) -> usize {
        self.quota
    }

    pub fn admitted(&self) -> usize {
        self.admitted.load(Ordering::Acquire)
    }

    pub fn quota_reached(&self) -> bool {
        self.admitted() >= self.quota
    }

    /// Takes one slot under the quota. Compare and increment happen as one atomic step,
    /// so concurrent callers can never push `admitted` past `quota`.
    pub fn try_admit(&self) -> bool {
        self.admitted
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < self.quota).then_some(n + 1)
            })
            .is_ok()
    }

    /// Gives back a slot whose record never reached the store.
    /// Admissions that were persisted are never returned, so `admitted` only drops by such reservations.
    pub fn release(&self) {
        let _ = self
            .admitted
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
    }

    /// Index of the next seed to dispatch.
    pub fn year_cursor(&self) -> usize {
        self.year_cursor.load(Ordering::Relaxed)
    }

    pub fn advance_year_cursor(&self) -> usize {
        self.year_cursor.fetch_add(1, Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn admits_up_to_quota() {
        let state = CrawlState::new(2);
        assert!(state.try_admit());
        assert!(state.try_admit());
        assert!(!state.try_admit());
        assert_eq!(state.admitted(), 2);
        assert!(state.quota_reached());
    }

    #[test]
    fn release_frees_a_slot() {
        let state = CrawlState::new(1);
        assert!(state.try_admit());
        state.release();
        assert_eq!(state.admitted(), 0);
        assert!(state.try_admit());

        let empty = CrawlState::new(1);
        empty.release();
        assert_eq!(empty.admitted(), 0);
    }

    #[test]
    fn concurrent_admission_never_exceeds_quota() {
        let state = Arc::new(CrawlState::new(100));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let state = state.clone();
                std::thread::spawn(move || (0..50).filter(|_| state.try_admit()).count())
            })
            .collect();

        let granted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(granted, 100);
        assert_eq!(state.admitted(), 100);
    }

    #[test]
    fn year_cursor_counts_dispatched_seeds() {
        let state = CrawlState::new(1);
        assert_eq!(state.advance_year_cursor(), 0);
        assert_eq!(state.advance_year_cursor(), 1);
        assert_eq!(state.year_cursor(), 2);
    }
}
