// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Print Mirror engine: watches source print queues and relays every new job's
// raw payload, once, to a destination queue. The platform spooler sits behind
// the `QueueProvider` trait; an in-memory provider and a spool-directory
// provider ship with the crate.

pub mod controller;
pub mod integrity;
pub mod memory;
pub mod mirror;
pub mod provider;
pub mod relay;
pub mod retry;
pub mod spool_dir;
pub mod status;
pub mod tracker;

pub use controller::EngineController;
pub use memory::InMemoryProvider;
pub use mirror::MirrorEngine;
pub use provider::QueueProvider;
pub use relay::RelayExecutor;
pub use spool_dir::SpoolDirProvider;
pub use status::{EngineStatus, StatusBoard};
pub use tracker::FingerprintTracker;
