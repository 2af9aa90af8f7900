// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// idgate-bridge — Contracts for the collaborators idgate talks to but does not
// implement: the text extractor that reads a verified document, and the sink
// that presents per-frame results and final outcomes.
//
// Platform builds plug their native implementations in here; desktop and CI
// builds get the stubs.

use std::sync::Arc;

pub mod stub;
pub mod traits;

pub use stub::{FixedTextExtractor, LoggingSink, StubTextExtractor};
pub use traits::{ResultSink, TextExtractor};

/// The text extractor available on this platform.
pub fn default_text_extractor() -> Arc<dyn TextExtractor> {
    Arc::new(StubTextExtractor)
}

/// The result sink used when the host supplies none.
pub fn default_result_sink() -> Arc<dyn ResultSink> {
    Arc::new(LoggingSink)
}
