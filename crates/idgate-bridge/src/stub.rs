// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Stub collaborators for desktop/CI builds where no native text recognizer
// exists.

use image::GrayImage;
use idgate_core::error::{IdGateError, Result};
use idgate_core::{ExtractionOutcome, SessionOutcome, ValidationResult};
use tracing::{debug, info, warn};

use crate::traits::{ResultSink, TextExtractor};

/// Text extractor returned on platforms without a recognizer.
pub struct StubTextExtractor;

impl TextExtractor for StubTextExtractor {
    fn extract(&self, document: &GrayImage) -> Result<ExtractionOutcome> {
        warn!(
            width = document.width(),
            height = document.height(),
            "TextExtractor::extract called on stub bridge"
        );
        Err(IdGateError::PlatformUnavailable)
    }
}

/// Extractor that answers every request with the same outcome.
///
/// Lets hosts and tests drive a session to completion without a recognizer.
#[derive(Debug, Clone)]
pub struct FixedTextExtractor {
    outcome: ExtractionOutcome,
}

impl FixedTextExtractor {
    pub fn new(outcome: ExtractionOutcome) -> Self {
        Self { outcome }
    }

    /// An extractor that always succeeds with full confidence.
    pub fn accepting() -> Self {
        Self::new(ExtractionOutcome {
            success: true,
            confidence: 1.0,
            ..ExtractionOutcome::default()
        })
    }
}

impl TextExtractor for FixedTextExtractor {
    fn extract(&self, _document: &GrayImage) -> Result<ExtractionOutcome> {
        Ok(self.outcome.clone())
    }
}

/// Sink that reports through `tracing`.
pub struct LoggingSink;

impl ResultSink for LoggingSink {
    fn on_validation_result(&self, result: &ValidationResult) {
        debug!(
            valid = result.is_valid,
            src_width = result.src_width,
            src_height = result.src_height,
            rotation = result.rotation_degrees,
            fps = result.fps,
            "Frame analysed"
        );
    }

    fn on_session_outcome(&self, outcome: &SessionOutcome) {
        match outcome {
            SessionOutcome::Validated { session, attempts, .. } => {
                info!(%session, attempts, "Document validated");
            }
            SessionOutcome::RetriesExhausted {
                session,
                attempts,
                last_failure,
            } => {
                warn!(%session, attempts, %last_failure, "Retries exhausted");
            }
        }
    }
}
