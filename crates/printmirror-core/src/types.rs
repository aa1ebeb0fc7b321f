// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Core domain types for the Print Mirror relay.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Title prefix applied to every relayed job.
///
/// A job whose title starts with this marker was produced by a mirror and is
/// never relayed again. The check is a prefix match only.
pub const RELAY_MARKER: &str = "[MIRROR]";

/// Whether `title` carries the relay marker.
pub fn is_relayed_title(title: &str) -> bool {
    title.starts_with(RELAY_MARKER)
}

/// Title under which a job is submitted to the destination queue.
pub fn relayed_title(title: &str) -> String {
    format!("{RELAY_MARKER} {title}")
}

/// Queue-scoped job identifier, as assigned by the spooler.
///
/// Not unique across spooler restarts: identifiers are recycled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct QueueJobId(pub u32);

impl std::fmt::Display for QueueJobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a single engine run (one `start` .. `stop` span).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(pub Uuid);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Spooler-reported state of a queued job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueJobStatus {
    /// Fully spooled, waiting for the device.
    Queued,
    /// The spooler is still writing the payload.
    Spooling,
    /// Being sent to the device.
    Printing,
    /// Held by the user or an administrator.
    Paused,
    /// Printed; still listed until the spooler removes it.
    Completed,
    /// The device or driver reported an error for this job.
    Error,
    /// Being removed from the queue.
    Deleting,
}

impl QueueJobStatus {
    /// Whether the payload is complete and stable enough to be read.
    pub fn is_readable(&self) -> bool {
        matches!(
            self,
            Self::Queued | Self::Printing | Self::Paused | Self::Completed
        )
    }
}

/// A job as listed by a queue provider. Lives for one polling cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueJob {
    pub id: QueueJobId,
    /// Name of the queue the job was listed on.
    pub queue: String,
    /// Document name shown in the spooler.
    pub title: String,
    pub size_bytes: u64,
    pub submitted_at: DateTime<Utc>,
    pub status: QueueJobStatus,
}

impl QueueJob {
    pub fn fingerprint(&self) -> JobFingerprint {
        JobFingerprint {
            queue: self.queue.clone(),
            job_id: self.id,
            submitted_at: self.submitted_at,
        }
    }
}

/// Stable identity of a job used to decide "already handled".
///
/// The submission timestamp is part of the identity because spoolers recycle
/// job identifiers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobFingerprint {
    pub queue: String,
    pub job_id: QueueJobId,
    pub submitted_at: DateTime<Utc>,
}

impl std::fmt::Display for JobFingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}#{}@{}",
            self.queue,
            self.job_id,
            self.submitted_at.timestamp_millis()
        )
    }
}

/// Lifecycle states of the mirror engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EngineState {
    Stopped,
    Starting,
    Running,
    Stopping,
    /// The polling task terminated abnormally.
    Error,
}

impl EngineState {
    /// Whether a new run may be started from this state.
    pub fn can_start(&self) -> bool {
        matches!(self, Self::Stopped | Self::Error)
    }
}

/// Why a listed job was not relayed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SkipReason {
    /// The fingerprint was already marked during this run.
    AlreadySeen,
    /// The title carries the relay marker.
    RelayMarker,
    /// The job is not in a readable state yet.
    NotReady(QueueJobStatus),
    /// A stop signal arrived before the job could be dispatched.
    Stopping,
}

/// Which half of a relay failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureStage {
    ReadPayload,
    Submit,
}

/// Per-job result of a polling cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RelayOutcome {
    Relayed {
        /// Title the job was submitted under on the destination.
        destination_title: String,
        /// Identifier the destination assigned.
        destination_job: QueueJobId,
        bytes: usize,
        /// SHA-256 of the relayed payload, lowercase hex.
        payload_sha256: String,
    },
    Skipped(SkipReason),
    Failed {
        stage: FailureStage,
        reason: String,
        /// Classification of the underlying provider error.
        class: ErrorClass,
    },
}

impl RelayOutcome {
    pub fn is_relayed(&self) -> bool {
        matches!(self, Self::Relayed { .. })
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, Self::Skipped(_))
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

/// Classification of provider errors for retry decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorClass {
    /// Busy spooler, interrupted I/O: safe to retry the read.
    Transient,
    /// Permissions or a missing queue: an operator must fix it.
    UserAction,
    /// The job is gone or the payload was rejected.
    Permanent,
}
