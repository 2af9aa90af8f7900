// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// idgate-session — Runs a validation session around the vision pipeline: a
// worker thread analyses the newest camera frame, and a single orchestrator
// task turns verified documents into text-extraction attempts with retry and
// timeout handling.

pub mod runtime;
pub mod state;
mod timers;
mod worker;

pub use runtime::{Orchestrator, OrchestratorHandle};
pub use state::{OrchestrationState, Stage};
