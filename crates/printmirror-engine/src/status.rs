// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Status board shared between the polling task and its host.
//
// The host polls snapshots; nothing is pushed. The board keeps the engine
// state, the last cycle's counts, cumulative counters, and a bounded window
// of recent outcome records.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

use printmirror_core::types::{EngineState, QueueJob, QueueJobId, RelayOutcome, RunId, SkipReason};

/// Default size of the recent-outcome window.
pub const DEFAULT_HISTORY_LEN: usize = 50;

/// One relay decision, kept for status reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutcomeRecord {
    pub recorded_at: DateTime<Utc>,
    pub queue: String,
    pub job_id: QueueJobId,
    pub title: String,
    pub outcome: RelayOutcome,
}

impl OutcomeRecord {
    pub fn new(job: &QueueJob, outcome: RelayOutcome) -> Self {
        Self {
            recorded_at: Utc::now(),
            queue: job.queue.clone(),
            job_id: job.id,
            title: job.title.clone(),
            outcome,
        }
    }
}

/// Counts for a single polling cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CycleSummary {
    pub cycle: u64,
    pub relayed: u32,
    pub skipped: u32,
    pub failed: u32,
    /// Sources whose listing failed this cycle.
    pub source_errors: u32,
    pub finished_at: Option<DateTime<Utc>>,
}

impl CycleSummary {
    pub fn new(cycle: u64) -> Self {
        Self {
            cycle,
            ..Default::default()
        }
    }

    pub fn count(&mut self, outcome: &RelayOutcome) {
        match outcome {
            RelayOutcome::Relayed { .. } => self.relayed += 1,
            RelayOutcome::Skipped(_) => self.skipped += 1,
            RelayOutcome::Failed { .. } => self.failed += 1,
        }
    }
}

/// Counters accumulated over one engine run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Totals {
    pub cycles: u64,
    pub relayed: u64,
    pub skipped: u64,
    pub failed: u64,
    pub source_errors: u64,
}

/// Point-in-time view of the engine for its host.
#[derive(Debug, Clone, Serialize)]
pub struct EngineStatus {
    pub state: EngineState,
    pub run_id: Option<RunId>,
    pub started_at: Option<DateTime<Utc>>,
    pub last_cycle: Option<CycleSummary>,
    pub totals: Totals,
    /// Most recent outcomes, oldest first. Repeated "already seen" skips are
    /// counted but not listed.
    pub recent: Vec<OutcomeRecord>,
    /// Fingerprints currently remembered.
    pub fingerprints: usize,
    pub last_error: Option<String>,
}

#[derive(Debug)]
struct BoardInner {
    state: EngineState,
    run_id: Option<RunId>,
    started_at: Option<DateTime<Utc>>,
    last_cycle: Option<CycleSummary>,
    totals: Totals,
    recent: VecDeque<OutcomeRecord>,
    history_len: usize,
    last_error: Option<String>,
}

/// Cheaply cloneable handle to the shared status.
#[derive(Debug, Clone)]
pub struct StatusBoard {
    inner: Arc<Mutex<BoardInner>>,
}

impl Default for StatusBoard {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_LEN)
    }
}

impl StatusBoard {
    pub fn new(history_len: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(BoardInner {
                state: EngineState::Stopped,
                run_id: None,
                started_at: None,
                last_cycle: None,
                totals: Totals::default(),
                recent: VecDeque::new(),
                history_len,
                last_error: None,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BoardInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn state(&self) -> EngineState {
        self.lock().state
    }

    pub fn set_state(&self, state: EngineState) {
        let mut inner = self.lock();
        if inner.state != state {
            debug!(from = ?inner.state, to = ?state, "engine state change");
            inner.state = state;
        }
    }

    /// Move to `to` only if the current state is `from`.
    pub fn transition(&self, from: EngineState, to: EngineState) -> bool {
        let mut inner = self.lock();
        if inner.state != from {
            return false;
        }
        debug!(?from, ?to, "engine state change");
        inner.state = to;
        true
    }

    /// Clear all run data for a new run.
    pub fn begin_run(&self, run_id: RunId, history_len: usize) {
        let mut inner = self.lock();
        inner.run_id = Some(run_id);
        inner.started_at = Some(Utc::now());
        inner.last_cycle = None;
        inner.totals = Totals::default();
        inner.recent.clear();
        inner.history_len = history_len;
        inner.last_error = None;
    }

    /// Record a per-job outcome.
    pub fn record(&self, record: OutcomeRecord) {
        let mut inner = self.lock();
        match &record.outcome {
            RelayOutcome::Relayed { .. } => inner.totals.relayed += 1,
            RelayOutcome::Skipped(_) => inner.totals.skipped += 1,
            RelayOutcome::Failed { .. } => inner.totals.failed += 1,
        }

        if matches!(record.outcome, RelayOutcome::Skipped(SkipReason::AlreadySeen)) {
            return;
        }
        if inner.history_len == 0 {
            return;
        }
        while inner.recent.len() >= inner.history_len {
            inner.recent.pop_front();
        }
        inner.recent.push_back(record);
    }

    /// Publish a completed cycle.
    pub fn finish_cycle(&self, mut summary: CycleSummary) {
        summary.finished_at = Some(Utc::now());
        let mut inner = self.lock();
        inner.totals.cycles += 1;
        inner.totals.source_errors += u64::from(summary.source_errors);
        inner.last_cycle = Some(summary);
    }

    /// Enter the `Error` state with a reason.
    pub fn fail(&self, reason: impl Into<String>) {
        let mut inner = self.lock();
        inner.state = EngineState::Error;
        inner.last_error = Some(reason.into());
    }

    /// Remember an error without changing state.
    pub fn note_error(&self, reason: impl Into<String>) {
        self.lock().last_error = Some(reason.into());
    }

    pub fn snapshot(&self, fingerprints: usize) -> EngineStatus {
        let inner = self.lock();
        EngineStatus {
            state: inner.state,
            run_id: inner.run_id,
            started_at: inner.started_at,
            last_cycle: inner.last_cycle.clone(),
            totals: inner.totals,
            recent: inner.recent.iter().cloned().collect(),
            fingerprints,
            last_error: inner.last_error.clone(),
        }
    }
}
