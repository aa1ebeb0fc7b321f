// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Unified error types for Print Mirror.

use thiserror::Error;

use crate::types::{EngineState, QueueJobId};

/// Invalid mirror configuration. Fatal to `start()`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("at least one source queue is required")]
    NoSources,

    #[error("queue names must not be blank")]
    BlankQueueName,

    #[error("source queue {0:?} is listed more than once")]
    DuplicateSource(String),

    #[error("destination queue {0:?} is also a source queue")]
    DestinationIsSource(String),

    #[error("poll interval must be positive")]
    ZeroPollInterval,

    #[error("relay concurrency must be at least 1")]
    ZeroConcurrency,

    #[error("fingerprint capacity must be at least 1")]
    ZeroCapacity,

    #[error("invalid interval: {0}")]
    InvalidInterval(String),

    #[error("engine cannot start while {0:?}")]
    AlreadyRunning(EngineState),
}

/// Failure reported by a queue provider. Always scoped to one queue or one
/// job; never aborts an engine run.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("queue not found: {0}")]
    QueueNotFound(String),

    #[error("access denied to queue {0}")]
    AccessDenied(String),

    #[error("job {job_id} no longer present on {queue}")]
    JobNotFound { queue: String, job_id: QueueJobId },

    #[error("job {job_id} on {queue} has an empty payload")]
    EmptyPayload { queue: String, job_id: QueueJobId },

    #[error("queue {0} is busy")]
    Busy(String),

    #[error("queue unavailable: {0}")]
    Unavailable(String),

    #[error("payload rejected: {0}")]
    Rejected(String),

    #[error("spool I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Top-level error type for all Print Mirror operations.
#[derive(Debug, Error)]
pub enum MirrorError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("queue provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("engine task failed: {0}")]
    TaskJoin(String),

    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, MirrorError>;
