// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Spool-directory queue provider.
//
// Layout, one directory per queue under a spool root:
//
//   <root>/<queue>/00012.SPL   raw payload bytes
//   <root>/<queue>/00012.SHD   shadow file: JSON job metadata
//
// A job exists once its shadow file exists. Writers create the SPL file
// first and publish the shadow file last (write to a temp name, then rename),
// so a listing never sees metadata for a payload that is not on disk yet.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument};

use printmirror_core::error::ProviderError;
use printmirror_core::types::{QueueJob, QueueJobId, QueueJobStatus};

use crate::provider::QueueProvider;

const PAYLOAD_EXT: &str = "SPL";
const SHADOW_EXT: &str = "SHD";

/// Job metadata stored next to each payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShadowFile {
    pub title: String,
    pub submitted_at: DateTime<Utc>,
    pub status: QueueJobStatus,
}

/// Queue provider over a directory tree of spool files.
#[derive(Debug)]
pub struct SpoolDirProvider {
    root: PathBuf,
    /// Serialises id allocation for submissions from this process.
    submit_lock: Mutex<()>,
}

impl SpoolDirProvider {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            submit_lock: Mutex::new(()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding `queue`. Names that could escape the root are
    /// rejected.
    pub fn queue_dir(&self, queue: &str) -> Result<PathBuf, ProviderError> {
        let invalid = queue.is_empty()
            || queue == "."
            || queue == ".."
            || queue.contains(['/', '\\'])
            || queue.contains('\0');
        if invalid {
            return Err(ProviderError::QueueNotFound(queue.to_string()));
        }
        Ok(self.root.join(queue))
    }

    /// Create the directory for `queue` if it does not exist.
    pub async fn create_queue(&self, queue: &str) -> Result<(), ProviderError> {
        let dir = self.queue_dir(queue)?;
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| queue_io_error(queue, e))?;
        debug!(queue, path = %dir.display(), "queue directory ready");
        Ok(())
    }

    /// Add a job with the given status to an existing queue.
    #[instrument(skip(self, payload), fields(bytes = payload.len()))]
    pub async fn enqueue(
        &self,
        queue: &str,
        title: &str,
        payload: &[u8],
        status: QueueJobStatus,
    ) -> Result<QueueJobId, ProviderError> {
        let dir = self.queue_dir(queue)?;
        let _guard = self.submit_lock.lock().await;

        let id = highest_job_id(queue, &dir)
            .await?
            .checked_add(1)
            .map(QueueJobId)
            .ok_or_else(|| ProviderError::Rejected(format!("{queue}: job id space exhausted")))?;
        tokio::fs::write(file_path(&dir, id, PAYLOAD_EXT), payload)
            .await
            .map_err(|e| queue_io_error(queue, e))?;

        let shadow = ShadowFile {
            title: title.to_string(),
            submitted_at: Utc::now(),
            status,
        };
        let json = serde_json::to_vec_pretty(&shadow)
            .map_err(|e| ProviderError::Rejected(format!("encode shadow file: {e}")))?;
        let shadow_path = file_path(&dir, id, SHADOW_EXT);
        let tmp_path = shadow_path.with_extension("SHD.tmp");
        tokio::fs::write(&tmp_path, json)
            .await
            .map_err(|e| queue_io_error(queue, e))?;
        tokio::fs::rename(&tmp_path, &shadow_path)
            .await
            .map_err(|e| queue_io_error(queue, e))?;

        info!(queue, job_id = %id, "job spooled");
        Ok(id)
    }

    /// Rewrite the status in a job's shadow file.
    pub async fn set_status(
        &self,
        queue: &str,
        job_id: QueueJobId,
        status: QueueJobStatus,
    ) -> Result<(), ProviderError> {
        let dir = self.queue_dir(queue)?;
        let shadow_path = file_path(&dir, job_id, SHADOW_EXT);
        let mut shadow = read_shadow(queue, job_id, &shadow_path).await?;
        shadow.status = status;
        let json = serde_json::to_vec_pretty(&shadow)
            .map_err(|e| ProviderError::Rejected(format!("encode shadow file: {e}")))?;
        tokio::fs::write(&shadow_path, json)
            .await
            .map_err(|e| queue_io_error(queue, e))
    }
}

impl QueueProvider for SpoolDirProvider {
    #[instrument(skip(self))]
    async fn list_jobs(&self, queue: &str) -> Result<Vec<QueueJob>, ProviderError> {
        let dir = self.queue_dir(queue)?;
        let mut entries = tokio::fs::read_dir(&dir)
            .await
            .map_err(|e| queue_io_error(queue, e))?;

        let mut jobs = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(|e| queue_io_error(queue, e))? {
            let name = entry.file_name();
            let Some((job_id, ext)) = name.to_str().and_then(parse_file_name) else {
                continue;
            };
            if !ext.eq_ignore_ascii_case(SHADOW_EXT) {
                continue;
            }

            // Either file may disappear between the directory scan and these
            // reads; such a job is simply not listed this time.
            let shadow = match read_shadow(queue, job_id, &entry.path()).await {
                Ok(shadow) => shadow,
                Err(e) => {
                    debug!(queue, %job_id, error = %e, "skipping unreadable shadow file");
                    continue;
                }
            };
            let size_bytes = match tokio::fs::metadata(file_path(&dir, job_id, PAYLOAD_EXT)).await {
                Ok(meta) => meta.len(),
                Err(e) => {
                    debug!(queue, %job_id, error = %e, "shadow file without payload");
                    continue;
                }
            };

            jobs.push(QueueJob {
                id: job_id,
                queue: queue.to_string(),
                title: shadow.title,
                size_bytes,
                submitted_at: shadow.submitted_at,
                status: shadow.status,
            });
        }

        jobs.sort_by_key(|job| job.id);
        Ok(jobs)
    }

    async fn read_payload(
        &self,
        queue: &str,
        job_id: QueueJobId,
    ) -> Result<Vec<u8>, ProviderError> {
        let dir = self.queue_dir(queue)?;
        tokio::fs::read(file_path(&dir, job_id, PAYLOAD_EXT))
            .await
            .map_err(|e| job_io_error(queue, job_id, e))
    }

    async fn submit_payload(
        &self,
        queue: &str,
        title: &str,
        payload: &[u8],
    ) -> Result<QueueJobId, ProviderError> {
        let dir = self.queue_dir(queue)?;
        // Submitting never creates a queue: a missing destination is offline.
        tokio::fs::metadata(&dir)
            .await
            .map_err(|e| queue_io_error(queue, e))?;
        self.enqueue(queue, title, payload, QueueJobStatus::Queued).await
    }
}

fn file_path(dir: &Path, job_id: QueueJobId, ext: &str) -> PathBuf {
    dir.join(format!("{:05}.{ext}", job_id.0))
}

/// Split `00012.SHD` into its job id and extension.
fn parse_file_name(name: &str) -> Option<(QueueJobId, &str)> {
    let (stem, ext) = name.split_once('.')?;
    let id = stem.parse::<u32>().ok()?;
    Some((QueueJobId(id), ext))
}

async fn highest_job_id(queue: &str, dir: &Path) -> Result<u32, ProviderError> {
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .map_err(|e| queue_io_error(queue, e))?;
    let mut highest = 0;
    while let Some(entry) = entries.next_entry().await.map_err(|e| queue_io_error(queue, e))? {
        if let Some((id, _)) = entry.file_name().to_str().and_then(parse_file_name) {
            highest = highest.max(id.0);
        }
    }
    Ok(highest)
}

async fn read_shadow(
    queue: &str,
    job_id: QueueJobId,
    path: &Path,
) -> Result<ShadowFile, ProviderError> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| job_io_error(queue, job_id, e))?;
    serde_json::from_slice(&bytes).map_err(|e| {
        ProviderError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("shadow file {}: {e}", path.display()),
        ))
    })
}

fn queue_io_error(queue: &str, err: std::io::Error) -> ProviderError {
    match err.kind() {
        std::io::ErrorKind::NotFound => ProviderError::QueueNotFound(queue.to_string()),
        std::io::ErrorKind::PermissionDenied => ProviderError::AccessDenied(queue.to_string()),
        _ => ProviderError::Io(err),
    }
}

fn job_io_error(queue: &str, job_id: QueueJobId, err: std::io::Error) -> ProviderError {
    match err.kind() {
        std::io::ErrorKind::NotFound => ProviderError::JobNotFound {
            queue: queue.to_string(),
            job_id,
        },
        std::io::ErrorKind::PermissionDenied => ProviderError::AccessDenied(queue.to_string()),
        _ => ProviderError::Io(err),
    }
}
