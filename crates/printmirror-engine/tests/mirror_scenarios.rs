// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// End-to-end mirroring scenarios driven through the engine controller.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::{Duration, Instant};

use printmirror_core::error::{ConfigError, MirrorError, ProviderError};
use printmirror_core::types::{
    EngineState, FailureStage, QueueJob, QueueJobId, QueueJobStatus, RelayOutcome, SkipReason,
};
use printmirror_core::MirrorConfig;
use printmirror_engine::memory::Fault;
use printmirror_engine::{EngineController, InMemoryProvider, QueueProvider, SpoolDirProvider};

fn config(sources: &[&str], destination: &str) -> MirrorConfig {
    MirrorConfig {
        skip_existing_jobs: false,
        settle_delay: Duration::ZERO,
        retry_base_delay: Duration::from_millis(1),
        poll_interval: Duration::from_millis(20),
        ..MirrorConfig::new(sources.iter().map(|s| s.to_string()).collect(), destination)
    }
}

async fn wait_until(what: &str, mut done: impl FnMut() -> bool) {
    for _ in 0..1000 {
        if done() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("timed out waiting for {what}");
}

async fn wait_for_cycles<P: QueueProvider>(controller: &EngineController<P>, cycles: u64) {
    wait_until("polling cycles", || controller.status().totals.cycles >= cycles).await;
}

#[tokio::test]
async fn invoice_is_relayed_once_with_marker() {
    let provider = Arc::new(InMemoryProvider::with_queues(["A", "D"]));
    let payload = b"%PDF-1.7\n%\xe2\xe3\xcf\xd3".to_vec();
    provider.push_job("A", "Invoice", payload.clone());

    let mut controller = EngineController::new(Arc::clone(&provider));
    controller.start(config(&["A"], "D")).await.expect("start");
    wait_for_cycles(&controller, 3).await;
    controller.stop().await.expect("stop");

    let relayed = provider.jobs("D");
    assert_eq!(relayed.len(), 1);
    assert_eq!(relayed[0].title, "[MIRROR] Invoice");
    assert_eq!(provider.payload("D", relayed[0].id), Some(payload));

    let status = controller.status();
    assert_eq!(status.state, EngineState::Stopped);
    assert_eq!(status.totals.relayed, 1);
    assert_eq!(status.totals.failed, 0);
}

#[tokio::test]
async fn each_source_job_is_relayed_exactly_once() {
    let provider = Arc::new(InMemoryProvider::with_queues(["A", "B", "D"]));
    provider.push_job("A", "Quote", b"quote".to_vec());
    provider.push_job("B", "Label", b"^XA^FDlabel^FS^XZ".to_vec());

    let mut controller = EngineController::new(Arc::clone(&provider));
    controller.start(config(&["A", "B"], "D")).await.expect("start");
    wait_for_cycles(&controller, 2).await;

    // A job arriving on a running engine is picked up by a later cycle.
    provider.push_job("A", "Receipt", b"receipt".to_vec());
    wait_until("third relay", || provider.submissions() >= 3).await;
    let cycles = controller.status().totals.cycles;
    wait_for_cycles(&controller, cycles + 2).await;
    controller.stop().await.expect("stop");

    let mut titles: Vec<_> = provider.jobs("D").into_iter().map(|j| j.title).collect();
    titles.sort();
    assert_eq!(
        titles,
        ["[MIRROR] Label", "[MIRROR] Quote", "[MIRROR] Receipt"]
    );
}

#[tokio::test]
async fn relayed_copies_are_never_relayed_again() {
    // Two engines relaying into each other's queues.
    let provider = Arc::new(InMemoryProvider::with_queues(["A", "B"]));
    provider.push_job("A", "Invoice", b"data".to_vec());

    let mut forward = EngineController::new(Arc::clone(&provider));
    let mut backward = EngineController::new(Arc::clone(&provider));
    forward.start(config(&["A"], "B")).await.expect("start forward");
    backward.start(config(&["B"], "A")).await.expect("start backward");

    wait_until("forward relay", || provider.submissions() == 1).await;
    let cycles = backward.status().totals.cycles;
    wait_for_cycles(&backward, cycles + 3).await;
    wait_for_cycles(&forward, 3).await;
    forward.stop().await.expect("stop forward");
    backward.stop().await.expect("stop backward");

    assert_eq!(provider.jobs("A").len(), 1);
    let copies = provider.jobs("B");
    assert_eq!(copies.len(), 1);
    assert_eq!(copies[0].title, "[MIRROR] Invoice");

    let recent = backward.status().recent;
    assert!(
        recent
            .iter()
            .all(|r| r.outcome == RelayOutcome::Skipped(SkipReason::RelayMarker))
    );
    assert!(!recent.is_empty());
}

#[tokio::test]
async fn failed_read_is_not_attempted_in_later_cycles() {
    let provider = Arc::new(InMemoryProvider::with_queues(["A", "D"]));
    let id = provider.push_job("A", "Invoice", b"data".to_vec());
    provider.fail_reads("A", id, [Fault::Rejected]);

    let mut controller = EngineController::new(Arc::clone(&provider));
    controller.start(config(&["A"], "D")).await.expect("start");
    wait_for_cycles(&controller, 4).await;
    controller.stop().await.expect("stop");

    assert_eq!(provider.reads_started(), 1);
    assert!(provider.jobs("D").is_empty());

    let status = controller.status();
    assert_eq!(status.totals.failed, 1);
    assert!(matches!(
        status.recent.iter().find(|r| r.outcome.is_failed()).map(|r| &r.outcome),
        Some(RelayOutcome::Failed {
            stage: FailureStage::ReadPayload,
            ..
        })
    ));
}

#[tokio::test]
async fn paused_job_is_relayed_after_release() {
    let provider = Arc::new(InMemoryProvider::with_queues(["A", "D"]));
    let id =
        provider.push_job_with_status("A", "Contract", b"data".to_vec(), QueueJobStatus::Spooling);

    let mut controller = EngineController::new(Arc::clone(&provider));
    controller.start(config(&["A"], "D")).await.expect("start");
    wait_for_cycles(&controller, 2).await;
    assert!(provider.jobs("D").is_empty());

    provider.set_status("A", id, QueueJobStatus::Queued);
    wait_until("relay after spooling", || provider.submissions() == 1).await;
    controller.stop().await.expect("stop");
    assert_eq!(provider.jobs("D").len(), 1);
}

#[tokio::test]
async fn self_loop_is_rejected_before_starting() {
    let provider = Arc::new(InMemoryProvider::with_queues(["A", "B"]));
    let mut controller = EngineController::new(provider);

    let err = controller
        .start(config(&["A", "B"], "B"))
        .await
        .expect_err("destination is a source");
    assert!(matches!(
        err,
        MirrorError::Config(ConfigError::DestinationIsSource(ref q)) if q == "B"
    ));
    assert_eq!(controller.state(), EngineState::Stopped);
    assert!(controller.status().run_id.is_none());
}

#[tokio::test]
async fn stop_lets_in_flight_relay_finish_and_dispatches_nothing_new() {
    let provider = Arc::new(InMemoryProvider::with_queues(["A", "D"]));
    provider.push_job("A", "First", b"first".to_vec());
    provider.pause_reads();

    let mut controller =
        EngineController::new(Arc::clone(&provider)).with_stop_grace(Duration::from_millis(50));
    controller.start(config(&["A"], "D")).await.expect("start");
    wait_until("relay in flight", || provider.reads_started() >= 1).await;

    // The relay is held inside its payload read, so the grace period runs out.
    controller.stop().await.expect("stop");
    assert_eq!(controller.state(), EngineState::Stopping);

    provider.push_job("A", "Second", b"second".to_vec());
    provider.resume_reads();
    wait_until("engine stopped", || controller.state() == EngineState::Stopped).await;

    let relayed = provider.jobs("D");
    assert_eq!(relayed.len(), 1);
    assert_eq!(relayed[0].title, "[MIRROR] First");
    assert_eq!(provider.reads_started(), 1);

    // Stopped engines can be started again.
    controller.start(config(&["A"], "D")).await.expect("restart");
    wait_until("second relay", || provider.submissions() >= 2).await;
    controller.stop().await.expect("stop");
}

#[tokio::test]
async fn mirrors_between_spool_directories() {
    let root = tempfile::tempdir().expect("tempdir");
    let provider = Arc::new(SpoolDirProvider::new(root.path()));
    provider.create_queue("Front Desk").await.expect("source queue");
    provider.create_queue("Archive").await.expect("destination queue");

    let payload: Vec<u8> = (0..=255u8).cycle().take(8192).collect();
    provider
        .enqueue("Front Desk", "Invoice", &payload, QueueJobStatus::Queued)
        .await
        .expect("enqueue");

    let mut controller = EngineController::new(Arc::clone(&provider));
    controller
        .start(config(&["Front Desk"], "Archive"))
        .await
        .expect("start");
    wait_for_cycles(&controller, 3).await;
    controller.stop().await.expect("stop");

    let relayed = provider.list_jobs("Archive").await.expect("list");
    assert_eq!(relayed.len(), 1);
    assert_eq!(relayed[0].title, "[MIRROR] Invoice");
    let copy = provider
        .read_payload("Archive", relayed[0].id)
        .await
        .expect("read copy");
    assert_eq!(copy, payload);
}

/// Provider whose first listing panics, as a crashing spooler binding would.
struct PanicOnFirstListing {
    inner: InMemoryProvider,
    panicked: AtomicBool,
    listings: AtomicU32,
}

impl QueueProvider for PanicOnFirstListing {
    async fn list_jobs(&self, queue: &str) -> Result<Vec<QueueJob>, ProviderError> {
        self.listings.fetch_add(1, Ordering::SeqCst);
        if !self.panicked.swap(true, Ordering::SeqCst) {
            panic!("spooler binding crashed while listing {queue}");
        }
        self.inner.list_jobs(queue).await
    }

    async fn read_payload(
        &self,
        queue: &str,
        job_id: QueueJobId,
    ) -> Result<Vec<u8>, ProviderError> {
        self.inner.read_payload(queue, job_id).await
    }

    async fn submit_payload(
        &self,
        queue: &str,
        title: &str,
        payload: &[u8],
    ) -> Result<QueueJobId, ProviderError> {
        self.inner.submit_payload(queue, title, payload).await
    }
}

#[tokio::test]
async fn panicking_cycle_is_contained_and_polling_resumes() {
    let inner = InMemoryProvider::with_queues(["A", "D"]);
    inner.push_job("A", "Invoice", b"data".to_vec());
    let provider = Arc::new(PanicOnFirstListing {
        inner,
        panicked: AtomicBool::new(false),
        listings: AtomicU32::new(0),
    });

    let mut controller = EngineController::new(Arc::clone(&provider));
    controller.start(config(&["A"], "D")).await.expect("start");
    wait_until("relay after the panic", || provider.inner.submissions() == 1).await;

    let status = controller.status();
    assert_eq!(status.state, EngineState::Running);
    assert!(status.totals.cycles >= 1);
    assert!(
        status
            .last_error
            .as_deref()
            .is_some_and(|e| e.contains("cycle 1 panicked"))
    );
    controller.stop().await.expect("stop");

    assert!(provider.listings.load(Ordering::SeqCst) >= 2);
    assert_eq!(controller.state(), EngineState::Stopped);
    assert_eq!(provider.inner.jobs("D").len(), 1);
}

#[tokio::test]
async fn stop_interrupts_the_poll_interval() {
    let provider = Arc::new(InMemoryProvider::with_queues(["A", "D"]));
    let mut controller = EngineController::new(Arc::clone(&provider));
    controller
        .start(MirrorConfig {
            poll_interval: Duration::from_secs(60),
            ..config(&["A"], "D")
        })
        .await
        .expect("start");
    wait_for_cycles(&controller, 1).await;

    let began = Instant::now();
    controller.stop().await.expect("stop");
    assert!(began.elapsed() < Duration::from_secs(1), "stop took {:?}", began.elapsed());
    assert_eq!(controller.state(), EngineState::Stopped);
}

#[tokio::test]
async fn failed_submission_is_not_resubmitted() {
    let provider = Arc::new(InMemoryProvider::with_queues(["A", "D"]));
    provider.push_job("A", "Invoice", b"data".to_vec());
    provider.fail_submissions("D", Some(Fault::Unavailable));

    let mut controller = EngineController::new(Arc::clone(&provider));
    controller.start(config(&["A"], "D")).await.expect("start");
    wait_for_cycles(&controller, 3).await;

    // The destination comes back; the job stays handled.
    provider.fail_submissions("D", None);
    let cycles = controller.status().totals.cycles;
    wait_for_cycles(&controller, cycles + 3).await;
    controller.stop().await.expect("stop");

    assert_eq!(provider.reads_started(), 1);
    assert_eq!(provider.submissions(), 0);
    assert!(provider.jobs("D").is_empty());

    let status = controller.status();
    assert_eq!(status.totals.failed, 1);
    assert_eq!(status.totals.relayed, 0);
    assert!(matches!(
        status.recent.iter().find(|r| r.outcome.is_failed()).map(|r| &r.outcome),
        Some(RelayOutcome::Failed {
            stage: FailureStage::Submit,
            ..
        })
    ));
}
