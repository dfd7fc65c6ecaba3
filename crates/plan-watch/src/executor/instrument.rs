use bitflags::bitflags;
use std::ops::AddAssign;
use std::time::{Duration, Instant};

bitflags! {
    /// Measurements requested from the engine for a statement.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct InstrumentOptions: u32 {
        /// Per-node timing.
        const TIMER = 1 << 0;
        /// Buffer usage counters.
        const BUFFERS = 1 << 1;
        /// Row counts only.
        const ROWS = 1 << 2;
        /// WAL usage counters.
        const WAL = 1 << 3;
        const ALL = Self::TIMER.bits()
            | Self::BUFFERS.bits()
            | Self::ROWS.bits()
            | Self::WAL.bits();
    }
}

/// Shared and temp buffer counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BufferUsage {
    pub shared_hit: u64,
    pub shared_read: u64,
    pub shared_dirtied: u64,
    pub shared_written: u64,
    pub temp_read: u64,
    pub temp_written: u64,
}

impl BufferUsage {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

impl AddAssign for BufferUsage {
    fn add_assign(&mut self, rhs: Self) {
        self.shared_hit += rhs.shared_hit;
        self.shared_read += rhs.shared_read;
        self.shared_dirtied += rhs.shared_dirtied;
        self.shared_written += rhs.shared_written;
        self.temp_read += rhs.temp_read;
        self.temp_written += rhs.temp_written;
    }
}

/// Write-ahead log counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WalUsage {
    pub records: u64,
    /// Full page images.
    pub fpi: u64,
    pub bytes: u64,
}

impl WalUsage {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

impl AddAssign for WalUsage {
    fn add_assign(&mut self, rhs: Self) {
        self.records += rhs.records;
        self.fpi += rhs.fpi;
        self.bytes += rhs.bytes;
    }
}

/// Timer and counter accumulator for one plan node or a whole statement.
///
/// A measurement cycle is `start_node` / `stop_node` pairs within a loop, closed
/// by [`end_loop`](Self::end_loop), which folds the loop into the totals.
#[derive(Debug, Clone, Default)]
pub struct Instrumentation {
    need_timer: bool,
    need_buffers: bool,
    need_wal: bool,
    running: bool,
    started_at: Option<Instant>,
    counter: Duration,
    first_tuple: Duration,
    tuple_count: f64,
    loop_buffers: BufferUsage,
    loop_wal: WalUsage,
    /// Total time to first tuple, summed over loops.
    pub startup: Duration,
    /// Total time, summed over loops.
    pub total: Duration,
    /// Tuples produced, summed over loops.
    pub ntuples: f64,
    /// Completed loops.
    pub nloops: f64,
    pub buffer_usage: BufferUsage,
    pub wal_usage: WalUsage,
}

impl Instrumentation {
    pub fn new(options: InstrumentOptions) -> Self {
        Self {
            need_timer: options.contains(InstrumentOptions::TIMER),
            need_buffers: options.contains(InstrumentOptions::BUFFERS),
            need_wal: options.contains(InstrumentOptions::WAL),
            ..Self::default()
        }
    }

    /// Whether this accumulator collects timing.
    pub fn has_timer(&self) -> bool {
        self.need_timer
    }

    /// Open a measurement interval.
    pub fn start_node(&mut self) {
        if self.need_timer {
            self.started_at = Some(Instant::now());
        }
    }

    /// Close the interval opened by [`start_node`](Self::start_node).
    pub fn stop_node(&mut self, n_tuples: f64) {
        if let Some(started) = self.started_at.take() {
            self.counter += started.elapsed();
        }
        self.tuple_count += n_tuples;
        if !self.running {
            self.running = true;
            self.first_tuple = self.counter;
        }
    }

    /// Record buffer activity of the current loop. Ignored unless requested.
    pub fn record_buffers(&mut self, usage: BufferUsage) {
        if self.need_buffers {
            self.loop_buffers += usage;
        }
    }

    /// Record WAL activity of the current loop. Ignored unless requested.
    pub fn record_wal(&mut self, usage: WalUsage) {
        if self.need_wal {
            self.loop_wal += usage;
        }
    }

    /// Fold the current loop into the totals.
    ///
    /// Safe to call repeatedly: without an open loop this does nothing.
    pub fn end_loop(&mut self) {
        if let Some(started) = self.started_at.take() {
            self.counter += started.elapsed();
            self.running = true;
        }
        if !self.running {
            return;
        }

        self.startup += self.first_tuple;
        self.total += self.counter;
        self.ntuples += self.tuple_count;
        self.nloops += 1.0;
        self.buffer_usage += std::mem::take(&mut self.loop_buffers);
        self.wal_usage += std::mem::take(&mut self.loop_wal);

        self.running = false;
        self.counter = Duration::ZERO;
        self.first_tuple = Duration::ZERO;
        self.tuple_count = 0.0;
    }

    /// A copy with any open loop folded in, for reporting without mutation.
    pub fn finalized(&self) -> Self {
        let mut copy = self.clone();
        copy.end_loop();
        copy
    }

    /// Total time in milliseconds.
    pub fn total_millis(&self) -> f64 {
        self.total.as_secs_f64() * 1000.0
    }
}
