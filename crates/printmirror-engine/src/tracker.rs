// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Fingerprint tracker: the single source of truth for "already handled".
//
// Memory is bounded by a capacity. When it is reached the oldest fingerprint
// is evicted first. The capacity must stay above the number of jobs the
// sources can list at once; within that bound a job that is still enumerable
// is never relayed twice.

use std::collections::{HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::{debug, trace};

use printmirror_core::types::JobFingerprint;

/// Default number of fingerprints remembered per engine.
pub const DEFAULT_CAPACITY: usize = 10_000;

#[derive(Debug)]
struct TrackerInner {
    seen: HashSet<JobFingerprint>,
    /// Insertion order, oldest at the front.
    order: VecDeque<JobFingerprint>,
    capacity: usize,
    evicted: u64,
}

impl TrackerInner {
    fn evict_to(&mut self, limit: usize) {
        while self.order.len() > limit {
            if let Some(oldest) = self.order.pop_front() {
                self.seen.remove(&oldest);
                self.evicted += 1;
                debug!(fingerprint = %oldest, "evicted oldest fingerprint");
            }
        }
    }
}

/// Thread-safe set of job fingerprints with an atomic check-and-set.
#[derive(Debug)]
pub struct FingerprintTracker {
    inner: Mutex<TrackerInner>,
}

impl Default for FingerprintTracker {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl FingerprintTracker {
    /// Create an empty tracker. A capacity of zero is treated as one.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(TrackerInner {
                seen: HashSet::new(),
                order: VecDeque::new(),
                capacity: capacity.max(1),
                evicted: 0,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, TrackerInner> {
        // Every critical section leaves the set consistent, so a poisoned
        // lock is still safe to use.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Mark `fingerprint` as handled.
    ///
    /// Returns `true` if it was newly marked, `false` if it was already
    /// present. Check and insert happen under one lock, so of several
    /// concurrent callers with the same fingerprint exactly one sees `true`.
    pub fn mark_seen(&self, fingerprint: JobFingerprint) -> bool {
        let mut inner = self.lock();
        if inner.seen.contains(&fingerprint) {
            trace!(%fingerprint, "fingerprint already marked");
            return false;
        }

        let limit = inner.capacity - 1;
        inner.evict_to(limit);
        inner.seen.insert(fingerprint.clone());
        inner.order.push_back(fingerprint);
        true
    }

    /// Whether `fingerprint` has been marked.
    pub fn is_seen(&self, fingerprint: &JobFingerprint) -> bool {
        self.lock().seen.contains(fingerprint)
    }

    /// Forget every fingerprint. Called on each engine start.
    pub fn reset(&self) {
        let mut inner = self.lock();
        let cleared = inner.seen.len();
        inner.seen.clear();
        inner.order.clear();
        inner.evicted = 0;
        debug!(cleared, "fingerprint tracker reset");
    }

    /// Change the capacity, evicting the oldest entries if it shrank.
    pub fn set_capacity(&self, capacity: usize) {
        let mut inner = self.lock();
        inner.capacity = capacity.max(1);
        let limit = inner.capacity;
        inner.evict_to(limit);
    }

    pub fn capacity(&self) -> usize {
        self.lock().capacity
    }

    pub fn len(&self) -> usize {
        self.lock().seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().seen.is_empty()
    }

    /// Number of fingerprints dropped by the capacity bound since the last
    /// reset.
    pub fn evicted(&self) -> u64 {
        self.lock().evicted
    }
}
