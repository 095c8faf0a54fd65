//! Power-of-two buffer pool with per-worker shards
//!
//! File contents are staged into fixed-size buffers that are recycled between
//! files instead of being allocated and dropped for every read.
//!
//! ## Layout
//!
//! ```text
//! BufferPool
//! ├── shard 0 ── [class 0: 1 B] [class 1: 2 B] ... [class 31: 2 GiB]
//! ├── shard 1 ── ...
//! └── shard N ── ...
//! ```
//!
//! Every reader worker owns one shard through its [`PoolHandle`] and acquires
//! only from that shard. A buffer remembers the shard it came from, so when a
//! checksum worker releases it the buffer goes back to the free list its
//! reader will draw from next. The shard lock is therefore only ever contended
//! by one reader and the checksum worker handing it a buffer back, never by
//! the whole pipeline.
//!
//! ## Sizing
//!
//! Requests are rounded up to the next power of two. A request of zero bytes
//! returns an empty sentinel that owns no allocation and is not tracked.
//! Each size class keeps at most `max_free_per_class` idle buffers per shard;
//! releases beyond that are dropped so an idle pool never retains more than
//! its cap.

use crate::error::{Result, ScanError};
use parking_lot::Mutex;
use serde::Serialize;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{trace, warn};

/// Number of size classes (2^0 ..= 2^31)
pub const SIZE_CLASSES: usize = 32;

/// Largest buffer the pool will hand out
pub const MAX_BUFFER_SIZE: usize = 1 << (SIZE_CLASSES - 1);

/// Default cap on idle buffers per size class per shard
pub const DEFAULT_MAX_FREE_PER_CLASS: usize = 64;

/// A byte buffer owned by exactly one holder at a time
///
/// Buffers handed out by the pool always have a power-of-two length. The
/// buffer is not zeroed on reuse; callers track how much of it is valid.
#[derive(Debug)]
pub struct PooledBuffer {
    data: Box<[u8]>,
    home: Option<usize>,
}

impl PooledBuffer {
    /// Wrap an externally allocated buffer
    ///
    /// Releasing a foreign buffer whose length is a power of two adopts it into
    /// the pool; any other length is rejected on release.
    pub fn from_vec(data: Vec<u8>) -> Self {
        Self {
            data: data.into_boxed_slice(),
            home: None,
        }
    }

    fn sentinel() -> Self {
        Self {
            data: Box::default(),
            home: None,
        }
    }

    /// Length of the buffer in bytes
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether this is the zero-length sentinel
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Shard this buffer returns to, `None` for foreign buffers and sentinels
    pub fn home_shard(&self) -> Option<usize> {
        self.home
    }
}

impl Deref for PooledBuffer {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.data
    }
}

impl DerefMut for PooledBuffer {
    fn deref_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }
}

impl AsRef<[u8]> for PooledBuffer {
    fn as_ref(&self) -> &[u8] {
        &self.data
    }
}

/// Counters describing pool activity
#[derive(Debug, Default)]
struct PoolCounters {
    created: AtomicU64,
    reused: AtomicU64,
    released: AtomicU64,
    discarded: AtomicU64,
    rejected: AtomicU64,
    outstanding: AtomicUsize,
    peak_outstanding: AtomicUsize,
}

/// Point-in-time snapshot of pool activity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    /// Buffers freshly allocated
    pub created: u64,
    /// Acquisitions served from a free list
    pub reused: u64,
    /// Buffers accepted back into a free list
    pub released: u64,
    /// Buffers dropped because their free list was at its cap
    pub discarded: u64,
    /// Releases refused because the length was not a power of two
    pub rejected: u64,
    /// Pool buffers currently held outside the pool
    pub outstanding: usize,
    /// Highest value `outstanding` has reached
    pub peak_outstanding: usize,
}

type FreeLists = [Vec<Box<[u8]>>; SIZE_CLASSES];

/// Recycling allocator for power-of-two byte buffers
#[derive(Debug)]
pub struct BufferPool {
    shards: Vec<Mutex<FreeLists>>,
    max_free_per_class: usize,
    counters: PoolCounters,
}

impl BufferPool {
    /// Create a pool with `shards` independent free-list sets
    ///
    /// A shard count of zero is treated as one.
    pub fn new(shards: usize, max_free_per_class: usize) -> Self {
        let shards = (0..shards.max(1))
            .map(|_| Mutex::new(std::array::from_fn(|_| Vec::new())))
            .collect();

        Self {
            shards,
            max_free_per_class,
            counters: PoolCounters::default(),
        }
    }

    /// Get the handle a worker uses to acquire buffers
    ///
    /// Worker ids beyond the shard count wrap around.
    pub fn handle(self: &Arc<Self>, worker: usize) -> PoolHandle {
        PoolHandle {
            pool: Arc::clone(self),
            shard: worker % self.shards.len(),
        }
    }

    /// Acquire a buffer of at least `min_size` bytes from `shard`
    ///
    /// The result is exactly the smallest power of two `>= min_size`. A
    /// `min_size` of zero yields the untracked empty sentinel.
    ///
    /// # Errors
    ///
    /// - [`ScanError::BufferTooLarge`] if `min_size` exceeds [`MAX_BUFFER_SIZE`]
    pub fn acquire_from(&self, shard: usize, min_size: usize) -> Result<PooledBuffer> {
        if min_size == 0 {
            return Ok(PooledBuffer::sentinel());
        }
        if min_size > MAX_BUFFER_SIZE {
            return Err(ScanError::BufferTooLarge {
                requested: min_size,
                max: MAX_BUFFER_SIZE,
            });
        }

        let shard = shard % self.shards.len();
        let class = size_class(min_size);
        let recycled = self.shards[shard].lock()[class].pop();

        let data = match recycled {
            Some(data) => {
                self.counters.reused.fetch_add(1, Ordering::Relaxed);
                data
            }
            None => {
                self.counters.created.fetch_add(1, Ordering::Relaxed);
                vec![0u8; 1usize << class].into_boxed_slice()
            }
        };

        let outstanding = self.counters.outstanding.fetch_add(1, Ordering::SeqCst) + 1;
        self.counters
            .peak_outstanding
            .fetch_max(outstanding, Ordering::SeqCst);

        Ok(PooledBuffer {
            data,
            home: Some(shard),
        })
    }

    /// Return a buffer to the free list of its size class
    ///
    /// Pool buffers go back to the shard they were acquired from. Buffers whose
    /// length is not a power of two (including the empty sentinel) or exceeds
    /// [`MAX_BUFFER_SIZE`] are dropped without touching any free list.
    pub fn release(&self, buffer: PooledBuffer) {
        let PooledBuffer { data, home } = buffer;

        if home.is_some() {
            self.counters.outstanding.fetch_sub(1, Ordering::SeqCst);
        }

        if !data.len().is_power_of_two() {
            if !data.is_empty() {
                warn!(
                    "Rejected release of {}-byte buffer: length is not a power of two",
                    data.len()
                );
            }
            self.counters.rejected.fetch_add(1, Ordering::Relaxed);
            return;
        }
        if data.len() > MAX_BUFFER_SIZE {
            warn!(
                "Rejected release of {}-byte buffer: larger than the largest size class ({} bytes)",
                data.len(),
                MAX_BUFFER_SIZE
            );
            self.counters.rejected.fetch_add(1, Ordering::Relaxed);
            return;
        }

        let class = data.len().trailing_zeros() as usize;
        let shard = home.unwrap_or(0) % self.shards.len();
        let mut lists = self.shards[shard].lock();
        let list = &mut lists[class];

        if list.len() >= self.max_free_per_class {
            drop(lists);
            trace!("Free list for class {} on shard {} full, dropping buffer", class, shard);
            self.counters.discarded.fetch_add(1, Ordering::Relaxed);
            return;
        }

        list.push(data);
        self.counters.released.fetch_add(1, Ordering::Relaxed);
    }

    /// Return every buffer in `buffers` to the pool
    pub fn release_all(&self, buffers: impl IntoIterator<Item = PooledBuffer>) {
        for buffer in buffers {
            self.release(buffer);
        }
    }

    /// Number of idle buffers across all shards and size classes
    pub fn retained(&self) -> usize {
        self.shards
            .iter()
            .map(|shard| shard.lock().iter().map(Vec::len).sum::<usize>())
            .sum()
    }

    /// Snapshot pool counters
    pub fn stats(&self) -> PoolStats {
        // Outstanding first: a buffer counted there was created before it
        let outstanding = self.counters.outstanding.load(Ordering::SeqCst);
        let peak_outstanding = self.counters.peak_outstanding.load(Ordering::SeqCst);

        PoolStats {
            created: self.counters.created.load(Ordering::Relaxed),
            reused: self.counters.reused.load(Ordering::Relaxed),
            released: self.counters.released.load(Ordering::Relaxed),
            discarded: self.counters.discarded.load(Ordering::Relaxed),
            rejected: self.counters.rejected.load(Ordering::Relaxed),
            outstanding,
            peak_outstanding,
        }
    }
}

/// A worker's view of the pool, bound to the worker's own shard
#[derive(Debug, Clone)]
pub struct PoolHandle {
    pool: Arc<BufferPool>,
    shard: usize,
}

impl PoolHandle {
    /// Acquire a buffer of at least `min_size` bytes from this worker's shard
    pub fn acquire(&self, min_size: usize) -> Result<PooledBuffer> {
        self.pool.acquire_from(self.shard, min_size)
    }

    /// Return a buffer to the pool
    pub fn release(&self, buffer: PooledBuffer) {
        self.pool.release(buffer);
    }

    /// Shard this handle acquires from
    pub fn shard(&self) -> usize {
        self.shard
    }

    /// The pool behind this handle
    pub fn pool(&self) -> &Arc<BufferPool> {
        &self.pool
    }
}

/// Size class index for a non-zero request
fn size_class(min_size: usize) -> usize {
    min_size.next_power_of_two().trailing_zeros() as usize
}
