// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Engine controller: owns the lifecycle of the polling task.
//
// There is no global engine. Each controller owns its provider handle,
// fingerprint tracker, status board and (while running) the configuration
// and cancellation token of the current run. Reconfiguring means `stop()`
// followed by `start(new_config)`.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use printmirror_core::config::MirrorConfig;
use printmirror_core::error::{ConfigError, MirrorError, Result};
use printmirror_core::types::{EngineState, RunId};

use crate::mirror::MirrorEngine;
use crate::provider::QueueProvider;
use crate::status::{EngineStatus, StatusBoard};
use crate::tracker::FingerprintTracker;

/// How long `stop()` waits for in-flight relays by default.
pub const DEFAULT_STOP_GRACE: Duration = Duration::from_secs(10);

/// Starts, stops and reports on one mirror engine.
pub struct EngineController<P> {
    provider: Arc<P>,
    tracker: Arc<FingerprintTracker>,
    board: StatusBoard,
    /// Configuration of the current (or last) run.
    config: Option<MirrorConfig>,
    /// Cancels the current run.
    cancel: Option<CancellationToken>,
    /// Handle to the supervising task of the current run.
    task_handle: Option<JoinHandle<()>>,
    stop_grace: Duration,
}

impl<P: QueueProvider> EngineController<P> {
    /// Create a controller in `Stopped` state.
    pub fn new(provider: Arc<P>) -> Self {
        Self {
            provider,
            tracker: Arc::new(FingerprintTracker::default()),
            board: StatusBoard::default(),
            config: None,
            cancel: None,
            task_handle: None,
            stop_grace: DEFAULT_STOP_GRACE,
        }
    }

    /// Bound how long `stop()` blocks waiting for in-flight relays.
    pub fn with_stop_grace(mut self, grace: Duration) -> Self {
        self.stop_grace = grace;
        self
    }

    pub fn state(&self) -> EngineState {
        self.board.state()
    }

    /// Configuration of the current or most recent run.
    pub fn config(&self) -> Option<&MirrorConfig> {
        self.config.as_ref()
    }

    /// Snapshot of state, last-cycle counts, totals and recent outcomes.
    pub fn status(&self) -> EngineStatus {
        self.board.snapshot(self.tracker.len())
    }

    /// Handle a host can keep to poll status without borrowing the
    /// controller.
    pub fn status_board(&self) -> StatusBoard {
        self.board.clone()
    }

    /// Forget every fingerprint. A running engine will treat every listed
    /// job as new on its next cycle.
    pub fn reset_fingerprints(&self) {
        self.tracker.reset();
    }

    /// Validate `config` and start polling.
    ///
    /// # Errors
    ///
    /// `ConfigError::AlreadyRunning` unless the engine is `Stopped` or in
    /// `Error`, or any validation error of `config`. The state is left
    /// untouched on error.
    #[instrument(skip_all, fields(sources = ?config.sources, destination = %config.destination))]
    pub async fn start(&mut self, config: MirrorConfig) -> Result<()> {
        let state = self.board.state();
        if !state.can_start() {
            return Err(ConfigError::AlreadyRunning(state).into());
        }
        config.validate()?;

        // Collect the previous run's supervisor; it has finished once the
        // state left Stopping.
        if let Some(handle) = self.task_handle.take() {
            if let Err(e) = handle.await {
                warn!(error = %e, "previous engine task ended abnormally");
            }
        }

        self.board.set_state(EngineState::Starting);

        let run_id = RunId::new();
        self.tracker.reset();
        self.tracker.set_capacity(config.fingerprint_capacity);
        self.board.begin_run(run_id, config.history_len);

        let cancel = CancellationToken::new();
        let engine = MirrorEngine::new(
            run_id,
            config.clone(),
            Arc::clone(&self.provider),
            Arc::clone(&self.tracker),
            self.board.clone(),
            cancel.clone(),
        );

        self.board.set_state(EngineState::Running);

        // The supervisor turns a panic of the polling task into the Error
        // state instead of leaving the board stuck in Running.
        let board = self.board.clone();
        let handle = tokio::spawn(async move {
            if let Err(e) = tokio::spawn(engine.run()).await {
                error!(%run_id, error = %e, "mirror engine task failed");
                board.fail(format!("engine task failed: {e}"));
            }
        });

        info!(%run_id, "mirror engine started");
        self.config = Some(config);
        self.cancel = Some(cancel);
        self.task_handle = Some(handle);
        Ok(())
    }

    /// Stop polling. Idempotent.
    ///
    /// No relay is dispatched after this is called; relays already running
    /// are allowed to finish. Waits for them up to the stop grace period. If
    /// the grace period elapses the state stays `Stopping` and the engine
    /// reports `Stopped` by itself once the last relay completes.
    #[instrument(skip_all)]
    pub async fn stop(&mut self) -> Result<()> {
        let Some(cancel) = self.cancel.take() else {
            debug!("mirror engine not running");
            return Ok(());
        };

        self.board.transition(EngineState::Running, EngineState::Stopping);
        info!("stopping mirror engine");
        cancel.cancel();

        let Some(handle) = self.task_handle.as_mut() else {
            self.board.set_state(EngineState::Stopped);
            return Ok(());
        };

        let joined = tokio::time::timeout(self.stop_grace, handle).await;
        match joined {
            Ok(Ok(())) => {
                self.task_handle = None;
                info!(state = ?self.board.state(), "mirror engine stopped");
                Ok(())
            }
            Ok(Err(e)) => {
                self.task_handle = None;
                self.board.fail(format!("engine task failed: {e}"));
                Err(MirrorError::TaskJoin(e.to_string()))
            }
            Err(_) => {
                warn!(
                    grace_ms = self.stop_grace.as_millis(),
                    "in-flight relays still running after grace period"
                );
                Ok(())
            }
        }
    }
}

impl<P> Drop for EngineController<P> {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel.cancel();
        }
    }
}
