// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// In-memory queue provider.
//
// Holds queues, jobs and payloads in process memory. Used for dry runs of the
// engine and throughout the test suite; it can inject provider faults and
// hold payload reads open to simulate a slow spooler.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use tokio::sync::watch;
use tracing::debug;

use printmirror_core::error::ProviderError;
use printmirror_core::types::{QueueJob, QueueJobId, QueueJobStatus};

use crate::provider::QueueProvider;

/// A failure the in-memory provider can be told to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    QueueNotFound,
    AccessDenied,
    Busy,
    Unavailable,
    Rejected,
    /// The job disappears from the queue before its payload is read.
    Vanish,
}

impl Fault {
    fn to_error(self, queue: &str, job_id: Option<QueueJobId>) -> ProviderError {
        match self {
            Self::QueueNotFound => ProviderError::QueueNotFound(queue.to_string()),
            Self::AccessDenied => ProviderError::AccessDenied(queue.to_string()),
            Self::Busy => ProviderError::Busy(queue.to_string()),
            Self::Unavailable => ProviderError::Unavailable(queue.to_string()),
            Self::Rejected => ProviderError::Rejected(format!("{queue} refused the payload")),
            Self::Vanish => ProviderError::JobNotFound {
                queue: queue.to_string(),
                job_id: job_id.unwrap_or(QueueJobId(0)),
            },
        }
    }
}

#[derive(Debug)]
struct StoredJob {
    job: QueueJob,
    payload: Vec<u8>,
    /// Consumed one per read attempt.
    read_faults: VecDeque<Fault>,
}

#[derive(Debug, Default)]
struct MemoryQueue {
    jobs: BTreeMap<QueueJobId, StoredJob>,
    last_id: u32,
    list_fault: Option<Fault>,
    submit_fault: Option<Fault>,
}

impl MemoryQueue {
    fn insert(
        &mut self,
        name: &str,
        title: &str,
        payload: Vec<u8>,
        status: QueueJobStatus,
    ) -> QueueJobId {
        self.last_id += 1;
        let id = QueueJobId(self.last_id);
        let job = QueueJob {
            id,
            queue: name.to_string(),
            title: title.to_string(),
            size_bytes: payload.len() as u64,
            submitted_at: Utc::now(),
            status,
        };
        self.jobs.insert(
            id,
            StoredJob {
                job,
                payload,
                read_faults: VecDeque::new(),
            },
        );
        id
    }
}

/// Queue provider backed by process memory.
#[derive(Debug)]
pub struct InMemoryProvider {
    queues: Mutex<HashMap<String, MemoryQueue>>,
    /// `false` while payload reads are held.
    reads_open: watch::Sender<bool>,
    reads_started: AtomicU64,
    submissions: AtomicU64,
}

impl Default for InMemoryProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryProvider {
    pub fn new() -> Self {
        Self {
            queues: Mutex::new(HashMap::new()),
            reads_open: watch::Sender::new(true),
            reads_started: AtomicU64::new(0),
            submissions: AtomicU64::new(0),
        }
    }

    /// Provider with the given (empty) queues.
    pub fn with_queues<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let provider = Self::new();
        for name in names {
            provider.add_queue(name);
        }
        provider
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, MemoryQueue>> {
        self.queues.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn add_queue(&self, name: impl Into<String>) {
        self.lock().entry(name.into()).or_default();
    }

    /// Enqueue a ready job, creating the queue if needed.
    pub fn push_job(&self, queue: &str, title: &str, payload: impl Into<Vec<u8>>) -> QueueJobId {
        self.push_job_with_status(queue, title, payload, QueueJobStatus::Queued)
    }

    pub fn push_job_with_status(
        &self,
        queue: &str,
        title: &str,
        payload: impl Into<Vec<u8>>,
        status: QueueJobStatus,
    ) -> QueueJobId {
        let mut queues = self.lock();
        let q = queues.entry(queue.to_string()).or_default();
        q.insert(queue, title, payload.into(), status)
    }

    /// Change a job's status. Returns `false` if the job does not exist.
    pub fn set_status(&self, queue: &str, job_id: QueueJobId, status: QueueJobStatus) -> bool {
        let mut queues = self.lock();
        match queues.get_mut(queue).and_then(|q| q.jobs.get_mut(&job_id)) {
            Some(stored) => {
                stored.job.status = status;
                true
            }
            None => false,
        }
    }

    /// Remove a job, as if deleted by the user or completed by the device.
    pub fn remove_job(&self, queue: &str, job_id: QueueJobId) -> bool {
        self.lock()
            .get_mut(queue)
            .is_some_and(|q| q.jobs.remove(&job_id).is_some())
    }

    /// Snapshot of the jobs on `queue`, in id order.
    pub fn jobs(&self, queue: &str) -> Vec<QueueJob> {
        self.lock()
            .get(queue)
            .map(|q| q.jobs.values().map(|s| s.job.clone()).collect())
            .unwrap_or_default()
    }

    pub fn payload(&self, queue: &str, job_id: QueueJobId) -> Option<Vec<u8>> {
        self.lock()
            .get(queue)
            .and_then(|q| q.jobs.get(&job_id))
            .map(|s| s.payload.clone())
    }

    /// Make every listing of `queue` fail with `fault` (or succeed again
    /// with `None`).
    pub fn fail_listing(&self, queue: &str, fault: Option<Fault>) {
        self.lock().entry(queue.to_string()).or_default().list_fault = fault;
    }

    /// Make every submission to `queue` fail with `fault`.
    pub fn fail_submissions(&self, queue: &str, fault: Option<Fault>) {
        self.lock().entry(queue.to_string()).or_default().submit_fault = fault;
    }

    /// Queue faults for the next reads of one job, one fault per attempt.
    pub fn fail_reads(
        &self,
        queue: &str,
        job_id: QueueJobId,
        faults: impl IntoIterator<Item = Fault>,
    ) {
        let mut queues = self.lock();
        if let Some(stored) = queues.get_mut(queue).and_then(|q| q.jobs.get_mut(&job_id)) {
            stored.read_faults.extend(faults);
        }
    }

    /// Hold every payload read until [`resume_reads`](Self::resume_reads).
    pub fn pause_reads(&self) {
        self.reads_open.send_replace(false);
    }

    pub fn resume_reads(&self) {
        self.reads_open.send_replace(true);
    }

    /// Number of payload reads attempted so far, including held ones.
    pub fn reads_started(&self) -> u64 {
        self.reads_started.load(Ordering::SeqCst)
    }

    /// Number of successful submissions so far.
    pub fn submissions(&self) -> u64 {
        self.submissions.load(Ordering::SeqCst)
    }
}

impl QueueProvider for InMemoryProvider {
    async fn list_jobs(&self, queue: &str) -> Result<Vec<QueueJob>, ProviderError> {
        let queues = self.lock();
        let q = queues
            .get(queue)
            .ok_or_else(|| ProviderError::QueueNotFound(queue.to_string()))?;
        if let Some(fault) = q.list_fault {
            return Err(fault.to_error(queue, None));
        }
        Ok(q.jobs.values().map(|s| s.job.clone()).collect())
    }

    async fn read_payload(
        &self,
        queue: &str,
        job_id: QueueJobId,
    ) -> Result<Vec<u8>, ProviderError> {
        self.reads_started.fetch_add(1, Ordering::SeqCst);
        {
            let mut gate = self.reads_open.subscribe();
            if gate.wait_for(|open| *open).await.is_err() {
                return Err(ProviderError::Unavailable(queue.to_string()));
            }
        }

        let mut queues = self.lock();
        let q = queues
            .get_mut(queue)
            .ok_or_else(|| ProviderError::QueueNotFound(queue.to_string()))?;
        let not_found = || ProviderError::JobNotFound {
            queue: queue.to_string(),
            job_id,
        };

        let fault = q
            .jobs
            .get_mut(&job_id)
            .ok_or_else(not_found)?
            .read_faults
            .pop_front();
        match fault {
            Some(Fault::Vanish) => {
                q.jobs.remove(&job_id);
                Err(not_found())
            }
            Some(fault) => Err(fault.to_error(queue, Some(job_id))),
            None => q
                .jobs
                .get(&job_id)
                .map(|s| s.payload.clone())
                .ok_or_else(not_found),
        }
    }

    async fn submit_payload(
        &self,
        queue: &str,
        title: &str,
        payload: &[u8],
    ) -> Result<QueueJobId, ProviderError> {
        let mut queues = self.lock();
        let q = queues
            .get_mut(queue)
            .ok_or_else(|| ProviderError::QueueNotFound(queue.to_string()))?;
        if let Some(fault) = q.submit_fault {
            return Err(fault.to_error(queue, None));
        }
        let id = q.insert(queue, title, payload.to_vec(), QueueJobStatus::Queued);
        self.submissions.fetch_add(1, Ordering::SeqCst);
        debug!(queue, job_id = %id, bytes = payload.len(), "payload accepted");
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn listing_unknown_queue_fails() {
        let provider = InMemoryProvider::new();
        assert!(matches!(
            provider.list_jobs("nope").await,
            Err(ProviderError::QueueNotFound(_))
        ));
    }

    #[tokio::test]
    async fn submit_then_list() {
        let provider = InMemoryProvider::with_queues(["D"]);
        let id = provider
            .submit_payload("D", "[MIRROR] Invoice", b"%PDF")
            .await
            .expect("submit");
        let jobs = provider.list_jobs("D").await.expect("list");
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].id, id);
        assert_eq!(jobs[0].title, "[MIRROR] Invoice");
        assert_eq!(provider.payload("D", id).as_deref(), Some(&b"%PDF"[..]));
    }

    #[tokio::test]
    async fn read_faults_are_consumed_in_order() {
        let provider = InMemoryProvider::new();
        let id = provider.push_job("A", "Invoice", b"data".to_vec());
        provider.fail_reads("A", id, [Fault::Busy]);

        assert!(matches!(
            provider.read_payload("A", id).await,
            Err(ProviderError::Busy(_))
        ));
        assert_eq!(provider.read_payload("A", id).await.expect("read"), b"data");
        assert_eq!(provider.reads_started(), 2);
    }

    #[tokio::test]
    async fn vanish_removes_the_job() {
        let provider = InMemoryProvider::new();
        let id = provider.push_job("A", "Invoice", b"data".to_vec());
        provider.fail_reads("A", id, [Fault::Vanish]);

        assert!(matches!(
            provider.read_payload("A", id).await,
            Err(ProviderError::JobNotFound { .. })
        ));
        assert!(provider.jobs("A").is_empty());
    }
}
