//! Buffer Pool
//!
//! Size-classed pool of reusable byte buffers used by table readers so a
//! block read does not allocate on every call.
//!
//! ## Size Classes
//! ```text
//! class:     0        1        2       3        4        5
//! requests:  ≤ b/4    ≤ b/2    ≤ b     ≤ 2b     ≤ 4b     > 4b
//! ```
//! where `b` is the baseline (normally the table block size).
//!
//! ## Concurrency
//! Each class is a bounded lock-free queue. `get` never blocks: an empty
//! class (a miss) allocates fresh capacity, a full class drops the returned
//! buffer.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use crossbeam::queue::ArrayQueue;

const NUM_CLASSES: usize = 6;

/// How many idle buffers each class keeps.
const CLASS_CAPACITY: [usize; NUM_CLASSES] = [2, 2, 4, 4, 2, 1];

/// Engine-scoped pool of reusable buffers.
pub struct BufferPool {
    classes: [ArrayQueue<Vec<u8>>; NUM_CLASSES],
    baseline: [usize; NUM_CLASSES - 1],

    get: AtomicU64,
    put: AtomicU64,
    less: AtomicU64,
    equal: AtomicU64,
    greater: AtomicU64,
    miss: AtomicU64,

    closed: AtomicBool,
}

/// Snapshot of the pool's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    pub baseline: usize,
    /// Buffers handed out.
    pub get: u64,
    /// Buffers returned.
    pub put: u64,
    /// Hits where the pooled buffer was larger than requested.
    pub less: u64,
    /// Hits where the pooled buffer matched the request exactly.
    pub equal: u64,
    /// Pooled buffers that were too small for the request and got dropped.
    pub greater: u64,
    /// Requests that found their class empty.
    pub miss: u64,
}

impl BufferPool {
    /// Create a pool whose size classes are centred on `baseline` bytes.
    pub fn new(baseline: usize) -> Self {
        let baseline = baseline.max(4);
        Self {
            classes: CLASS_CAPACITY.map(ArrayQueue::new),
            baseline: [
                baseline / 4,
                baseline / 2,
                baseline,
                baseline * 2,
                baseline * 4,
            ],
            get: AtomicU64::new(0),
            put: AtomicU64::new(0),
            less: AtomicU64::new(0),
            equal: AtomicU64::new(0),
            greater: AtomicU64::new(0),
            miss: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        }
    }

    /// Class serving requests of `n` bytes.
    fn class_of_request(&self, n: usize) -> usize {
        self.baseline
            .iter()
            .position(|&b| n <= b)
            .unwrap_or(NUM_CLASSES - 1)
    }

    /// Class a returned buffer of capacity `cap` can serve every request of.
    fn class_of_capacity(&self, cap: usize) -> usize {
        if cap > self.baseline[NUM_CLASSES - 2] {
            return NUM_CLASSES - 1;
        }
        self.baseline
            .iter()
            .rposition(|&b| b <= cap)
            .unwrap_or(0)
    }

    /// Borrow a buffer of length `n`. Contents are zeroed.
    pub fn get(&self, n: usize) -> Vec<u8> {
        if self.closed.load(Ordering::Acquire) {
            return vec![0; n];
        }
        self.get.fetch_add(1, Ordering::Relaxed);

        let class = self.class_of_request(n);
        match self.classes[class].pop() {
            Some(mut buf) if buf.capacity() >= n => {
                if buf.capacity() == n {
                    self.equal.fetch_add(1, Ordering::Relaxed);
                } else {
                    self.less.fetch_add(1, Ordering::Relaxed);
                }
                buf.clear();
                buf.resize(n, 0);
                return buf;
            }
            Some(_) => {
                self.greater.fetch_add(1, Ordering::Relaxed);
            }
            None => {
                self.miss.fetch_add(1, Ordering::Relaxed);
            }
        }

        let cap = if class < NUM_CLASSES - 1 {
            self.baseline[class].max(n)
        } else {
            n
        };
        let mut buf = Vec::with_capacity(cap);
        buf.resize(n, 0);
        buf
    }

    /// Return a buffer to the pool. Dropped if its class is full or the pool
    /// is closed.
    pub fn put(&self, buf: Vec<u8>) {
        if self.closed.load(Ordering::Acquire) || buf.capacity() == 0 {
            return;
        }
        self.put.fetch_add(1, Ordering::Relaxed);
        let class = self.class_of_capacity(buf.capacity());
        let _ = self.classes[class].push(buf);
    }

    /// Drop every pooled buffer; later `get`s allocate and `put`s drop.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        for class in &self.classes {
            while class.pop().is_some() {}
        }
        tracing::debug!(stats = %self.stats(), "buffer pool closed");
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            baseline: self.baseline[2],
            get: self.get.load(Ordering::Relaxed),
            put: self.put.load(Ordering::Relaxed),
            less: self.less.load(Ordering::Relaxed),
            equal: self.equal.load(Ordering::Relaxed),
            greater: self.greater.load(Ordering::Relaxed),
            miss: self.miss.load(Ordering::Relaxed),
        }
    }
}

impl fmt::Debug for BufferPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferPool")
            .field("stats", &self.stats())
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl fmt::Display for PoolStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "BufferPool{{B·{} G·{} P·{} <·{} =·{} >·{} M·{}}}",
            self.baseline, self.get, self.put, self.less, self.equal, self.greater, self.miss
        )
    }
}
