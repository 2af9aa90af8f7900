// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// idgate-vision — Single-frame document validation for idgate.
//
// Normalizes camera frames (rotation, CLAHE), finds card-shaped
// quadrilaterals, rectifies them onto the canonical template plane and
// verifies their content against the reference template with ORB-style
// binary features.

pub mod analyzer;
pub mod clahe;
pub mod detect;
pub mod features;
pub mod normalize;
pub mod rectify;
pub mod template;
pub mod verify;

#[cfg(test)]
pub(crate) mod test_utils;

// Re-export the primary structs so callers can use `idgate_vision::FrameAnalyzer` etc.
pub use analyzer::{FpsMeter, FrameAnalysis, FrameAnalyzer};
pub use detect::CandidateDetector;
pub use features::OrbExtractor;
pub use normalize::{FrameNormalizer, NormalizedFrame};
pub use rectify::PerspectiveRectifier;
pub use template::ReferenceTemplate;
pub use verify::ContentVerifier;
