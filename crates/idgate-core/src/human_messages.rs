// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Plain-language messages for the outcomes an end user is allowed to see.
//
// Only two session outcomes surface to the user: a validated document, and a
// session whose retries ran out. Everything in between (frames without a
// card, failed matches, individual extraction failures) stays internal.
// Fatal startup errors are rendered for the operator who launched the tool.

use crate::error::IdGateError;
use crate::types::SessionOutcome;

/// Severity of a message from the user's perspective.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Everything worked.
    Success,
    /// The user should try again (reposition the card, improve lighting).
    ActionRequired,
    /// The validator cannot run at all until someone fixes the setup.
    Fatal,
}

/// A human-readable message with an actionable suggestion.
#[derive(Debug, Clone)]
pub struct HumanMessage {
    /// Plain summary (shown as a heading).
    pub message: String,
    /// What the user should try (shown as body text).
    pub suggestion: String,
    pub severity: Severity,
}

/// Render a final session outcome.
pub fn humanize_outcome(outcome: &SessionOutcome) -> HumanMessage {
    match outcome {
        SessionOutcome::Validated { outcome, .. } => {
            let holder = outcome
                .fields
                .as_ref()
                .and_then(|f| match (&f.given_names, &f.surname) {
                    (Some(given), Some(surname)) => Some(format!("{given} {surname}")),
                    (None, Some(surname)) => Some(surname.clone()),
                    _ => None,
                });
            HumanMessage {
                message: "Your document was verified.".into(),
                suggestion: match holder {
                    Some(name) => format!("Document read for {name}. You can continue."),
                    None => "You can continue.".into(),
                },
                severity: Severity::Success,
            }
        }
        SessionOutcome::RetriesExhausted { attempts, .. } => HumanMessage {
            message: "We couldn't read your document.".into(),
            suggestion: format!(
                "We tried {attempts} times. Hold the card flat, fill the frame with it, avoid glare, and try again."
            ),
            severity: Severity::ActionRequired,
        },
    }
}

/// Render an error for the operator.
pub fn humanize_error(err: &IdGateError) -> HumanMessage {
    match err {
        IdGateError::TemplateLoad(detail) => HumanMessage {
            message: "The reference document image could not be loaded.".into(),
            suggestion: format!("Check that the template image exists and is a readable PNG or JPEG. ({detail})"),
            severity: Severity::Fatal,
        },

        IdGateError::TemplateInvalid(detail) => HumanMessage {
            message: "The reference document image can't be used for matching.".into(),
            suggestion: format!("Use a sharper template whose chip, MRZ and barcode areas contain visible detail. ({detail})"),
            severity: Severity::Fatal,
        },

        IdGateError::Config(detail) => HumanMessage {
            message: "The configuration file has an invalid value.".into(),
            suggestion: format!("Fix the value or delete the file to use the defaults. ({detail})"),
            severity: Severity::Fatal,
        },

        IdGateError::InvalidFrame(_) | IdGateError::UnsupportedRotation(_) => {
            HumanMessage {
                message: "A camera image could not be processed.".into(),
                suggestion: "Try again. If this keeps happening, restart the camera.".into(),
                severity: Severity::ActionRequired,
            }
        }

        IdGateError::Extraction(_) => HumanMessage {
            message: "The text on the document couldn't be read.".into(),
            suggestion: "Make sure the bottom lines of the card are visible and in focus.".into(),
            severity: Severity::ActionRequired,
        },

        IdGateError::SessionClosed | IdGateError::Worker(_) => HumanMessage {
            message: "The document scanner stopped unexpectedly.".into(),
            suggestion: "Restart the scan.".into(),
            severity: Severity::Fatal,
        },

        IdGateError::Io(io_err) => {
            if io_err.kind() == std::io::ErrorKind::NotFound {
                HumanMessage {
                    message: "A file couldn't be found.".into(),
                    suggestion: "It may have been moved or deleted. Check the path and try again.".into(),
                    severity: Severity::Fatal,
                }
            } else {
                HumanMessage {
                    message: "There was a problem reading or writing a file.".into(),
                    suggestion: "Check the file permissions and free disk space, then try again.".into(),
                    severity: Severity::Fatal,
                }
            }
        }

        IdGateError::Serialization(_) => HumanMessage {
            message: "A settings file is not valid JSON.".into(),
            suggestion: "Fix the file or delete it to use the defaults.".into(),
            severity: Severity::Fatal,
        },

        IdGateError::Bridge(_) => HumanMessage {
            message: "A device-specific feature didn't work.".into(),
            suggestion: "Try again. Some features may not be available on all devices.".into(),
            severity: Severity::ActionRequired,
        },

        IdGateError::PlatformUnavailable => HumanMessage {
            message: "This feature isn't available on your device.".into(),
            suggestion: "Document text reading requires a supported phone or tablet.".into(),
            severity: Severity::Fatal,
        },
    }
}
