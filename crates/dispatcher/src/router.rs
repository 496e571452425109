//! Shard routing strategies

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use contracts::{HashFn, RoutingMode};

use crate::error::DispatchError;

/// CRC-32 (IEEE) over the key's UTF-8 bytes
pub fn default_hash(key: &str) -> u32 {
    crc32fast::hash(key.as_bytes())
}

/// Maps keys to shard indices in `[0, shard_count)`.
///
/// Hash routing reads only immutable state. Round-robin routing owns the
/// only mutable routing state, a single atomic cursor.
pub struct Router {
    shard_count: usize,
    hash_fn: HashFn,
    rr_cursor: AtomicUsize,
}

impl Router {
    /// Create a router; `shard_count` must be > 0
    pub fn new(shard_count: usize, hash_fn: Option<HashFn>) -> Result<Self, DispatchError> {
        if shard_count == 0 {
            return Err(DispatchError::invalid_config(
                "shard_count",
                "shard_count must be > 0",
            ));
        }

        Ok(Self {
            shard_count,
            hash_fn: hash_fn.unwrap_or_else(|| Arc::new(default_hash) as HashFn),
            rr_cursor: AtomicUsize::new(0),
        })
    }

    pub fn shard_count(&self) -> usize {
        self.shard_count
    }

    /// Pick a shard for `key` using `mode`
    pub fn route(&self, key: &str, mode: RoutingMode) -> usize {
        match mode {
            RoutingMode::Hash => self.hash_index(key),
            RoutingMode::RoundRobin => self.next_round_robin(),
        }
    }

    /// `hash_fn(key) mod shard_count`
    pub fn hash_index(&self, key: &str) -> usize {
        (self.hash_fn)(key) as usize % self.shard_count
    }

    /// Return the cursor and advance it modulo `shard_count` in one atomic step
    pub fn next_round_robin(&self) -> usize {
        let shard_count = self.shard_count;
        match self
            .rr_cursor
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |cursor| {
                Some((cursor + 1) % shard_count)
            }) {
            Ok(previous) | Err(previous) => previous,
        }
    }

    /// Next round-robin target, without advancing
    pub fn cursor(&self) -> usize {
        self.rr_cursor.load(Ordering::Acquire)
    }
}

impl fmt::Debug for Router {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Router")
            .field("shard_count", &self.shard_count)
            .field("rr_cursor", &self.cursor())
            .finish_non_exhaustive()
    }
}
