// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Relay executor: copy one job's raw payload from its source queue to the
// destination queue.
//
// The submitted title is the original title prefixed with the relay marker.
// That prefix is the only thing that stops a relayed job from being relayed
// again when the destination is itself monitored somewhere. Payload bytes are
// passed through untouched.

use std::sync::Arc;

use tracing::{info, instrument, warn};

use printmirror_core::error::ProviderError;
use printmirror_core::types::{relayed_title, FailureStage, QueueJob, RelayOutcome};

use crate::integrity::hash_bytes;
use crate::provider::QueueProvider;
use crate::retry::classify_provider_error;

/// Failure reason reported when a job left its queue before it was read.
pub const VANISHED_REASON: &str = "job vanished";

/// Reads payloads from source queues and submits them to one destination.
#[derive(Debug)]
pub struct RelayExecutor<P> {
    provider: Arc<P>,
    destination: String,
}

impl<P: QueueProvider> RelayExecutor<P> {
    pub fn new(provider: Arc<P>, destination: impl Into<String>) -> Self {
        Self {
            provider,
            destination: destination.into(),
        }
    }

    pub fn destination(&self) -> &str {
        &self.destination
    }

    /// Relay `job`: one read, one submit, no retries.
    ///
    /// The engine calls this directly when read retries are disabled. With
    /// retries enabled it composes [`read_payload`](Self::read_payload) and
    /// [`submit`](Self::submit) itself, retrying only the read.
    #[instrument(skip_all, fields(queue = %job.queue, job_id = %job.id))]
    pub async fn relay(&self, job: &QueueJob) -> RelayOutcome {
        match self.read_payload(job).await {
            Ok(payload) => self.submit(job, &payload).await,
            Err(err) => read_failure(job, &err),
        }
    }

    /// Read the payload of `job` from its source queue.
    ///
    /// A zero-length payload is reported as `EmptyPayload`: the spooler has
    /// listed the job but not written it yet.
    pub async fn read_payload(&self, job: &QueueJob) -> Result<Vec<u8>, ProviderError> {
        let payload = self.provider.read_payload(&job.queue, job.id).await?;
        if payload.is_empty() {
            return Err(ProviderError::EmptyPayload {
                queue: job.queue.clone(),
                job_id: job.id,
            });
        }
        Ok(payload)
    }

    /// Submit an already read payload to the destination queue.
    pub async fn submit(&self, job: &QueueJob, payload: &[u8]) -> RelayOutcome {
        let title = relayed_title(&job.title);
        match self
            .provider
            .submit_payload(&self.destination, &title, payload)
            .await
        {
            Ok(destination_job) => {
                let payload_sha256 = hash_bytes(payload);
                info!(
                    queue = %job.queue,
                    job_id = %job.id,
                    destination = %self.destination,
                    destination_job = %destination_job,
                    bytes = payload.len(),
                    sha256 = %payload_sha256,
                    "job relayed"
                );
                RelayOutcome::Relayed {
                    destination_title: title,
                    destination_job,
                    bytes: payload.len(),
                    payload_sha256,
                }
            }
            Err(err) => {
                warn!(
                    queue = %job.queue,
                    job_id = %job.id,
                    destination = %self.destination,
                    error = %err,
                    "submission to destination failed"
                );
                RelayOutcome::Failed {
                    stage: FailureStage::Submit,
                    reason: err.to_string(),
                    class: classify_provider_error(&err),
                }
            }
        }
    }
}

/// Outcome for a payload read that will not be attempted again.
pub fn read_failure(job: &QueueJob, err: &ProviderError) -> RelayOutcome {
    let reason = match err {
        ProviderError::JobNotFound { .. } => VANISHED_REASON.to_string(),
        other => other.to_string(),
    };
    warn!(queue = %job.queue, job_id = %job.id, error = %err, "could not read job payload");
    RelayOutcome::Failed {
        stage: FailureStage::ReadPayload,
        reason,
        class: classify_provider_error(err),
    }
}
