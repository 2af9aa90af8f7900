// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Platform-agnostic collaborator traits.

use image::GrayImage;
use idgate_core::error::Result;
use idgate_core::{ExtractionOutcome, SessionOutcome, ValidationResult};

/// Reads the personal data of a verified document.
///
/// Called from a blocking worker thread with the rectified document in
/// canonical template geometry. An `Err` is treated exactly like an
/// outcome with `success == false`.
pub trait TextExtractor: Send + Sync {
    fn extract(&self, document: &GrayImage) -> Result<ExtractionOutcome>;
}

/// Receives everything the validator reports to its host.
pub trait ResultSink: Send + Sync {
    /// Called once for every analysed frame, valid or not.
    fn on_validation_result(&self, result: &ValidationResult);

    /// Called once per terminal session outcome.
    fn on_session_outcome(&self, outcome: &SessionOutcome);
}
