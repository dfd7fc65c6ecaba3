use super::nesting::NestingTracker;
use super::{ExecFlags, NoopExecutor, QueryDesc, ScanDirection, StandardExecutor};
use crate::error::WatchResult;
use std::fmt;
use std::sync::Arc;

/// A link in the executor hook chain.
///
/// Every method receives a [`Next`] cursor to the rest of the chain and must
/// delegate through it exactly once. The default implementations just
/// delegate.
pub trait ExecutorHook: Send + Sync {
    /// Called before the statement starts. Returns `Ok(false)` when the plan
    /// turned out to be invalid.
    fn executor_start(
        &self,
        query: &mut QueryDesc,
        eflags: ExecFlags,
        next: Next<'_>,
    ) -> WatchResult<bool> {
        next.start(query, eflags)
    }

    fn executor_run(
        &self,
        query: &mut QueryDesc,
        direction: ScanDirection,
        count: u64,
        next: Next<'_>,
    ) -> WatchResult<()> {
        next.run(query, direction, count)
    }

    fn executor_finish(&self, query: &mut QueryDesc, next: Next<'_>) -> WatchResult<()> {
        next.finish(query)
    }

    fn executor_end(&self, query: &mut QueryDesc, next: Next<'_>) -> WatchResult<()> {
        next.end(query)
    }
}

/// Ordered executor hooks in front of the engine's standard executor.
///
/// The most recently installed hook runs first and delegates to the one
/// installed before it.
pub struct HookChain {
    hooks: Vec<Arc<dyn ExecutorHook>>,
    standard: Arc<dyn StandardExecutor>,
}

impl HookChain {
    /// Create a chain with no hooks in front of `standard`.
    pub fn new<S: StandardExecutor + 'static>(standard: S) -> Self {
        Self::with_standard_arc(Arc::new(standard))
    }

    /// Create a chain in front of an Arc-wrapped standard executor.
    pub fn with_standard_arc(standard: Arc<dyn StandardExecutor>) -> Self {
        Self {
            hooks: Vec::new(),
            standard,
        }
    }

    /// Install a hook in front of every hook installed so far.
    pub fn install<H: ExecutorHook + 'static>(&mut self, hook: H) -> &mut Self {
        self.install_arc(Arc::new(hook))
    }

    /// Install an Arc-wrapped hook in front of every hook installed so far.
    pub fn install_arc(&mut self, hook: Arc<dyn ExecutorHook>) -> &mut Self {
        self.hooks.insert(0, hook);
        self
    }

    /// Number of installed hooks.
    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }
}

impl Default for HookChain {
    fn default() -> Self {
        Self::new(NoopExecutor)
    }
}

impl fmt::Debug for HookChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookChain")
            .field("hooks", &self.hooks.len())
            .finish_non_exhaustive()
    }
}

/// Cursor to the remainder of a [`HookChain`].
#[derive(Clone, Copy)]
pub struct Next<'a> {
    backend: &'a Backend,
    hooks: &'a [Arc<dyn ExecutorHook>],
    standard: &'a dyn StandardExecutor,
}

impl<'a> Next<'a> {
    /// The worker the statement is running on.
    pub fn backend(&self) -> &'a Backend {
        self.backend
    }

    pub fn start(self, query: &mut QueryDesc, eflags: ExecFlags) -> WatchResult<bool> {
        match self.hooks.split_first() {
            Some((hook, rest)) => hook.executor_start(query, eflags, self.skip(rest)),
            None => self.standard.executor_start(self.backend, query, eflags),
        }
    }

    pub fn run(
        self,
        query: &mut QueryDesc,
        direction: ScanDirection,
        count: u64,
    ) -> WatchResult<()> {
        match self.hooks.split_first() {
            Some((hook, rest)) => hook.executor_run(query, direction, count, self.skip(rest)),
            None => self
                .standard
                .executor_run(self.backend, query, direction, count),
        }
    }

    pub fn finish(self, query: &mut QueryDesc) -> WatchResult<()> {
        match self.hooks.split_first() {
            Some((hook, rest)) => hook.executor_finish(query, self.skip(rest)),
            None => self.standard.executor_finish(self.backend, query),
        }
    }

    pub fn end(self, query: &mut QueryDesc) -> WatchResult<()> {
        match self.hooks.split_first() {
            Some((hook, rest)) => hook.executor_end(query, self.skip(rest)),
            None => self.standard.executor_end(self.backend, query),
        }
    }

    fn skip(self, rest: &'a [Arc<dyn ExecutorHook>]) -> Self {
        Self { hooks: rest, ..self }
    }
}

impl fmt::Debug for Next<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Next")
            .field("remaining_hooks", &self.hooks.len())
            .finish_non_exhaustive()
    }
}

/// Per-worker execution context.
///
/// Statements on one worker run one at a time (nested statements run inside
/// their parent's stages), so the nesting depth lives here rather than in
/// global state. Create one `Backend` per worker thread.
pub struct Backend {
    chain: Arc<HookChain>,
    nesting: NestingTracker,
}

impl Backend {
    pub fn new(chain: Arc<HookChain>) -> Self {
        Self {
            chain,
            nesting: NestingTracker::new(),
        }
    }

    pub fn nesting(&self) -> &NestingTracker {
        &self.nesting
    }

    pub fn chain(&self) -> &Arc<HookChain> {
        &self.chain
    }

    pub fn executor_start(&self, query: &mut QueryDesc, eflags: ExecFlags) -> WatchResult<bool> {
        self.head().start(query, eflags)
    }

    pub fn executor_run(
        &self,
        query: &mut QueryDesc,
        direction: ScanDirection,
        count: u64,
    ) -> WatchResult<()> {
        self.head().run(query, direction, count)
    }

    pub fn executor_finish(&self, query: &mut QueryDesc) -> WatchResult<()> {
        self.head().finish(query)
    }

    pub fn executor_end(&self, query: &mut QueryDesc) -> WatchResult<()> {
        self.head().end(query)
    }

    /// Run all four stages in order. Returns `Ok(false)` if the plan was
    /// rejected at start; the remaining stages are skipped in that case.
    ///
    /// On error the remaining stages are skipped as well and the caller drops
    /// the `QueryDesc`.
    pub fn execute(&self, query: &mut QueryDesc) -> WatchResult<bool> {
        if !self.executor_start(query, ExecFlags::empty())? {
            return Ok(false);
        }
        self.executor_run(query, ScanDirection::Forward, 0)?;
        self.executor_finish(query)?;
        self.executor_end(query)?;
        Ok(true)
    }

    fn head(&self) -> Next<'_> {
        Next {
            backend: self,
            hooks: &self.chain.hooks,
            standard: self.chain.standard.as_ref(),
        }
    }
}

impl fmt::Debug for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Backend")
            .field("chain", &self.chain)
            .field("nesting", &self.nesting.depth())
            .finish()
    }
}
