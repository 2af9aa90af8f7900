// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Unified error types for idgate.

use thiserror::Error;

/// Top-level error type for all idgate operations.
///
/// Expected negatives (no candidate in a frame, a candidate that fails the
/// geometry filters, too few feature matches) are *not* errors; they are
/// reported through `ValidationResult::is_valid == false`.
#[derive(Debug, Error)]
pub enum IdGateError {
    // -- Reference template (fatal at startup) --
    #[error("failed to load reference template: {0}")]
    TemplateLoad(String),

    #[error("reference template is unusable: {0}")]
    TemplateInvalid(String),

    // -- Frame / image errors --
    #[error("invalid frame: {0}")]
    InvalidFrame(String),

    #[error("unsupported rotation: {0} degrees")]
    UnsupportedRotation(u32),

    // -- Text extraction collaborator --
    #[error("text extraction failed: {0}")]
    Extraction(String),

    // -- Session / orchestration --
    #[error("orchestrator is no longer running")]
    SessionClosed,

    #[error("analysis worker failed: {0}")]
    Worker(String),

    // -- Configuration / persistence --
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // -- Platform bridge --
    #[error("platform bridge error: {0}")]
    Bridge(String),

    #[error("feature not available on this platform")]
    PlatformUnavailable,
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, IdGateError>;
