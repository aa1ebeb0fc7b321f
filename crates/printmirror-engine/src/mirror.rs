// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Mirror engine: the polling loop.
//
// Each cycle walks the source queues in configured order, lists their jobs,
// filters out everything that must not be relayed, and dispatches the rest
// to relay workers. A job is marked seen before its relay starts, so a
// failed relay is never attempted again in a later cycle (at-most-once).
//
//   Idle -> Polling -> Listing -> Filtering -> Dispatching -> Polling ... -> Idle
//
// Cancellation is cooperative. The token is checked before each source is
// listed and before each dispatch, and raced against the inter-cycle sleep.
// Relays already running when it fires are allowed to finish.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};

use printmirror_core::config::MirrorConfig;
use printmirror_core::types::{
    is_relayed_title, EngineState, QueueJob, RelayOutcome, RunId, SkipReason,
};

use crate::provider::QueueProvider;
use crate::relay::{read_failure, RelayExecutor};
use crate::retry::{should_retry, ReadRetryPolicy, RetryDecision};
use crate::status::{CycleSummary, OutcomeRecord, StatusBoard};
use crate::tracker::FingerprintTracker;

/// Everything a relay worker needs, detached from the engine so it can be
/// moved into a spawned task.
struct RelayWorker<P> {
    relay: Arc<RelayExecutor<P>>,
    retry: ReadRetryPolicy,
    settle_delay: Duration,
    cancel: CancellationToken,
}

impl<P> Clone for RelayWorker<P> {
    fn clone(&self) -> Self {
        Self {
            relay: Arc::clone(&self.relay),
            retry: self.retry,
            settle_delay: self.settle_delay,
            cancel: self.cancel.clone(),
        }
    }
}

impl<P: QueueProvider> RelayWorker<P> {
    /// Settle, read (retrying transient failures), then submit once.
    async fn run(&self, job: &QueueJob) -> RelayOutcome {
        if !self.settle_delay.is_zero() {
            tokio::time::sleep(self.settle_delay).await;
        }
        if self.retry.max_retries == 0 {
            return self.relay.relay(job).await;
        }

        let mut attempt = 0;
        let payload = loop {
            let err = match self.relay.read_payload(job).await {
                Ok(payload) => break payload,
                Err(err) => err,
            };

            if self.cancel.is_cancelled() {
                return read_failure(job, &err);
            }
            match should_retry(&err, attempt, &self.retry) {
                RetryDecision::RetryAfter(delay) => {
                    debug!(
                        queue = %job.queue,
                        job_id = %job.id,
                        attempt,
                        error = %err,
                        "retrying payload read"
                    );
                    tokio::select! {
                        _ = self.cancel.cancelled() => return read_failure(job, &err),
                        _ = tokio::time::sleep(delay) => {}
                    }
                    attempt += 1;
                }
                RetryDecision::GiveUp(_) | RetryDecision::Exhausted => {
                    return read_failure(job, &err);
                }
            }
        };

        self.relay.submit(job, &payload).await
    }
}

/// The polling loop for one engine run.
pub struct MirrorEngine<P> {
    run_id: RunId,
    config: MirrorConfig,
    provider: Arc<P>,
    tracker: Arc<FingerprintTracker>,
    board: StatusBoard,
    cancel: CancellationToken,
    limiter: Arc<Semaphore>,
    worker: RelayWorker<P>,
}

impl<P: QueueProvider> MirrorEngine<P> {
    /// Build an engine for a validated configuration.
    pub fn new(
        run_id: RunId,
        config: MirrorConfig,
        provider: Arc<P>,
        tracker: Arc<FingerprintTracker>,
        board: StatusBoard,
        cancel: CancellationToken,
    ) -> Self {
        let relay = Arc::new(RelayExecutor::new(
            Arc::clone(&provider),
            config.destination.clone(),
        ));
        let worker = RelayWorker {
            relay,
            retry: ReadRetryPolicy {
                max_retries: config.read_retries,
                base_delay: config.retry_base_delay,
                ..Default::default()
            },
            settle_delay: config.settle_delay,
            cancel: cancel.clone(),
        };

        Self {
            run_id,
            limiter: Arc::new(Semaphore::new(config.max_concurrent_relays)),
            config,
            provider,
            tracker,
            board,
            cancel,
            worker,
        }
    }

    /// Run cycles until cancelled, then publish `Stopped`.
    ///
    /// Each cycle runs as its own task. A panic inside a cycle (in a provider
    /// call, say) is logged and counted, and polling resumes after the
    /// interval.
    pub async fn run(self) {
        let span = info_span!("mirror", run_id = %self.run_id);
        let engine = Arc::new(self);
        async move {
            info!(
                sources = ?engine.config.sources,
                destination = %engine.config.destination,
                interval_ms = engine.config.poll_interval.as_millis(),
                "mirror started"
            );

            if engine.config.skip_existing_jobs {
                let baseline = Arc::clone(&engine);
                let task = tokio::spawn(
                    async move { baseline.mark_existing().await }.in_current_span(),
                );
                if let Err(e) = task.await {
                    error!(error = %e, "baseline listing panicked");
                    engine.board.note_error(format!("baseline panicked: {e}"));
                }
            }

            let mut cycle = 0u64;
            while !engine.cancel.is_cancelled() {
                cycle += 1;
                let worker = Arc::clone(&engine);
                let task =
                    tokio::spawn(async move { worker.run_cycle(cycle).await }.in_current_span());
                let summary = match task.await {
                    Ok(summary) => summary,
                    Err(e) => {
                        error!(cycle, error = %e, "polling cycle panicked");
                        engine.board.note_error(format!("cycle {cycle} panicked: {e}"));
                        CycleSummary::new(cycle)
                    }
                };
                engine.board.finish_cycle(summary);

                tokio::select! {
                    _ = engine.cancel.cancelled() => break,
                    _ = tokio::time::sleep(engine.config.poll_interval) => {}
                }
            }

            engine.board.set_state(EngineState::Stopped);
            info!(cycles = cycle, "mirror stopped");
        }
        .instrument(span)
        .await
    }

    /// Mark every job already queued on the sources as seen, without
    /// relaying it.
    async fn mark_existing(&self) {
        for source in &self.config.sources {
            match self.provider.list_jobs(source).await {
                Ok(jobs) => {
                    let count = jobs.len();
                    for job in jobs {
                        self.tracker.mark_seen(job.fingerprint());
                    }
                    info!(queue = %source, count, "ignoring existing job(s)");
                }
                Err(err) => {
                    warn!(queue = %source, error = %err, "could not list existing jobs");
                }
            }
        }
    }

    /// One full pass over all sources. Waits for every relay it dispatched.
    pub async fn run_cycle(&self, cycle: u64) -> CycleSummary {
        let mut summary = CycleSummary::new(cycle);
        let mut relays = JoinSet::new();

        for source in &self.config.sources {
            if self.cancel.is_cancelled() {
                debug!(cycle, "stop requested, not listing remaining sources");
                break;
            }

            let jobs = match self.provider.list_jobs(source).await {
                Ok(jobs) => jobs,
                Err(err) => {
                    warn!(
                        queue = %source,
                        error = %err,
                        "listing failed, skipping source this cycle"
                    );
                    self.board.note_error(format!("{source}: {err}"));
                    summary.source_errors += 1;
                    continue;
                }
            };

            for mut job in jobs {
                // Fingerprints are scoped to the queue we polled.
                if job.queue != *source {
                    job.queue.clone_from(source);
                }

                if let Some(reason) = self.filter(&job) {
                    self.settle(&mut summary, &job, RelayOutcome::Skipped(reason));
                    continue;
                }

                if let Err(outcome) = self.dispatch(&mut relays, job.clone()).await {
                    self.settle(&mut summary, &job, outcome);
                }
            }
        }

        while let Some(joined) = relays.join_next().await {
            match joined {
                Ok((job, outcome)) => self.settle(&mut summary, &job, outcome),
                Err(err) => {
                    error!(cycle, error = %err, "relay task failed");
                    self.board.note_error(format!("relay task failed: {err}"));
                    summary.failed += 1;
                }
            }
        }

        if summary.relayed + summary.failed > 0 || summary.source_errors > 0 {
            info!(
                cycle,
                relayed = summary.relayed,
                skipped = summary.skipped,
                failed = summary.failed,
                source_errors = summary.source_errors,
                "cycle complete"
            );
        } else {
            debug!(cycle, skipped = summary.skipped, "cycle complete");
        }
        summary
    }

    /// Reason to skip `job`, if any. Marker first: a relayed job is skipped
    /// whatever its fingerprint state.
    fn filter(&self, job: &QueueJob) -> Option<SkipReason> {
        if is_relayed_title(&job.title) {
            return Some(SkipReason::RelayMarker);
        }
        if !job.status.is_readable() {
            return Some(SkipReason::NotReady(job.status));
        }
        if self.tracker.is_seen(&job.fingerprint()) {
            return Some(SkipReason::AlreadySeen);
        }
        None
    }

    /// Claim the job and spawn its relay, or return the skip outcome.
    async fn dispatch(
        &self,
        relays: &mut JoinSet<(QueueJob, RelayOutcome)>,
        job: QueueJob,
    ) -> Result<(), RelayOutcome> {
        let stopping = || RelayOutcome::Skipped(SkipReason::Stopping);
        if self.cancel.is_cancelled() {
            return Err(stopping());
        }

        // Wait for a free worker before claiming the job, so a stop that
        // arrives meanwhile leaves it unclaimed.
        let permit = tokio::select! {
            _ = self.cancel.cancelled() => return Err(stopping()),
            permit = Arc::clone(&self.limiter).acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => return Err(stopping()),
            },
        };

        if !self.tracker.mark_seen(job.fingerprint()) {
            return Err(RelayOutcome::Skipped(SkipReason::AlreadySeen));
        }

        info!(queue = %job.queue, job_id = %job.id, title = %job.title, "new job");
        let worker = self.worker.clone();
        relays.spawn(
            async move {
                let _permit = permit;
                let outcome = worker.run(&job).await;
                (job, outcome)
            }
            .in_current_span(),
        );
        Ok(())
    }

    fn settle(&self, summary: &mut CycleSummary, job: &QueueJob, outcome: RelayOutcome) {
        summary.count(&outcome);
        self.board.record(OutcomeRecord::new(job, outcome));
    }
}
