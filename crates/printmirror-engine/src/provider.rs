// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Queue provider abstraction.
//
// The engine never talks to a spooler directly. Everything it needs from the
// print subsystem goes through this trait: enumerate a queue, pull a job's
// raw payload, push a payload onto another queue. Implementations decide how
// (OS spooler API, spool directory, in-memory for tests).

use std::future::Future;

use printmirror_core::error::ProviderError;
use printmirror_core::types::{QueueJob, QueueJobId};

/// Capability the mirror engine consumes to reach print queues.
///
/// Implementations must be shareable across tasks; the engine holds one in an
/// `Arc` and calls it from the polling task and from relay workers at the
/// same time. If the underlying spooler serialises access to a queue, the
/// implementation does not need any extra locking.
pub trait QueueProvider: Send + Sync + 'static {
    /// List the jobs currently held by `queue`.
    ///
    /// Fails with `QueueNotFound` or `AccessDenied` when the queue cannot be
    /// enumerated.
    fn list_jobs(
        &self,
        queue: &str,
    ) -> impl Future<Output = Result<Vec<QueueJob>, ProviderError>> + Send;

    /// Read the raw payload bytes of a job.
    ///
    /// Fails with `JobNotFound` when the job has left the queue.
    fn read_payload(
        &self,
        queue: &str,
        job_id: QueueJobId,
    ) -> impl Future<Output = Result<Vec<u8>, ProviderError>> + Send;

    /// Submit `payload` to `queue` as a new job titled `title`, returning the
    /// identifier the queue assigned.
    fn submit_payload(
        &self,
        queue: &str,
        title: &str,
        payload: &[u8],
    ) -> impl Future<Output = Result<QueueJobId, ProviderError>> + Send;
}
