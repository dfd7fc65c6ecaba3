use std::cell::Cell;

/// How deep the current executor call is nested inside other executor calls.
///
/// Owned by one [`Backend`](super::Backend), so it is never shared across
/// threads. Depth only changes through [`NestingGuard`].
#[derive(Debug, Default)]
pub struct NestingTracker {
    depth: Cell<usize>,
}

impl NestingTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current depth; 0 means top level.
    pub fn depth(&self) -> usize {
        self.depth.get()
    }

    pub fn is_top_level(&self) -> bool {
        self.depth.get() == 0
    }

    /// Increment the depth until the returned guard is dropped.
    pub fn enter(&self) -> NestingGuard<'_> {
        self.depth.set(self.depth.get() + 1);
        NestingGuard { tracker: self }
    }
}

/// Restores the depth on drop, including during unwinding.
#[must_use = "the depth is restored as soon as the guard is dropped"]
#[derive(Debug)]
pub struct NestingGuard<'a> {
    tracker: &'a NestingTracker,
}

impl NestingGuard<'_> {
    /// Leave the nested level now.
    pub fn leave(self) {}
}

impl Drop for NestingGuard<'_> {
    fn drop(&mut self) {
        let depth = &self.tracker.depth;
        depth.set(depth.get().saturating_sub(1));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::panic::{AssertUnwindSafe, catch_unwind};

    #[test]
    fn guard_pairs_enter_and_leave() {
        let tracker = NestingTracker::new();
        assert!(tracker.is_top_level());

        let outer = tracker.enter();
        {
            let _inner = tracker.enter();
            assert_eq!(tracker.depth(), 2);
        }
        assert_eq!(tracker.depth(), 1);
        outer.leave();
        assert_eq!(tracker.depth(), 0);
    }

    #[test]
    fn guard_releases_on_panic() {
        let tracker = NestingTracker::new();
        let result = catch_unwind(AssertUnwindSafe(|| {
            let _guard = tracker.enter();
            panic!("executor aborted");
        }));

        assert!(result.is_err());
        assert_eq!(tracker.depth(), 0);
    }
}
