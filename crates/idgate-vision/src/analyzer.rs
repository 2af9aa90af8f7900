// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Per-frame analysis: normalize, detect, rectify, verify.
//
// One call to `analyze` produces exactly one `ValidationResult`. Candidates
// are tried largest first and the first verified one wins; the rest are
// dropped unexamined. All intermediate images are owned by the call and
// freed when it returns, whichever way it returns.

use std::path::Path;
use std::time::Duration;

use image::GrayImage;
use idgate_core::error::Result;
use idgate_core::{Frame, GateConfig, MatchResult, PixelRect, ValidationResult};
use tracing::{debug, instrument};

use crate::detect::CandidateDetector;
use crate::features::OrbExtractor;
use crate::normalize::FrameNormalizer;
use crate::rectify::PerspectiveRectifier;
use crate::template::ReferenceTemplate;
use crate::verify::ContentVerifier;

/// Frames-per-second over a rolling one-second window, driven by frame
/// timestamps rather than the wall clock.
#[derive(Debug, Clone, Default)]
pub struct FpsMeter {
    window_start: Option<Duration>,
    frames: u32,
    fps: f32,
}

impl FpsMeter {
    /// Record a frame and return the latest rate.
    ///
    /// A timestamp earlier than the window start (a restarted source)
    /// opens a new window.
    pub fn tick(&mut self, timestamp: Duration) -> f32 {
        match self.window_start {
            Some(start) if timestamp >= start => {
                self.frames += 1;
                let elapsed = timestamp - start;
                if elapsed >= Duration::from_secs(1) {
                    self.fps = self.frames as f32 / elapsed.as_secs_f32();
                    self.window_start = Some(timestamp);
                    self.frames = 0;
                }
            }
            _ => {
                self.window_start = Some(timestamp);
                self.frames = 0;
            }
        }
        self.fps
    }

    pub fn fps(&self) -> f32 {
        self.fps
    }
}

/// Everything one frame's analysis produced.
#[derive(Debug, Clone)]
pub struct FrameAnalysis {
    pub result: ValidationResult,
    /// The verified candidate in canonical template geometry, handed on to
    /// text extraction. Present only when `result.is_valid`.
    pub rectified: Option<GrayImage>,
    /// Outcome of the last verification attempted, if any candidate got
    /// that far.
    pub match_result: Option<MatchResult>,
    pub candidates: usize,
}

/// The single-frame validation pipeline.
#[derive(Debug, Clone)]
pub struct FrameAnalyzer {
    normalizer: FrameNormalizer,
    detector: CandidateDetector,
    rectifier: PerspectiveRectifier,
    verifier: ContentVerifier,
    roi: Option<PixelRect>,
    fps: FpsMeter,
}

impl FrameAnalyzer {
    /// Assemble the pipeline around an already built verifier.
    pub fn new(config: &GateConfig, verifier: ContentVerifier) -> Self {
        Self {
            normalizer: FrameNormalizer::new(config.normalizer),
            detector: CandidateDetector::new(config.detector),
            rectifier: PerspectiveRectifier::new(config.template.width, config.template.height),
            verifier,
            roi: None,
            fps: FpsMeter::default(),
        }
    }

    /// Validate `config`, build the reference template from `template_path`
    /// and assemble the pipeline.
    pub fn open(config: &GateConfig, template_path: impl AsRef<Path>) -> Result<Self> {
        config.validate()?;
        let extractor = OrbExtractor::new(config.features);
        let template = ReferenceTemplate::open(template_path, &config.template, &extractor)?;
        let verifier = ContentVerifier::new(template, extractor, config.matcher);
        Ok(Self::new(config, verifier))
    }

    /// Restrict detection to `roi` (upright frame coordinates), or lift the
    /// restriction with `None`.
    pub fn set_region_of_interest(&mut self, roi: Option<PixelRect>) {
        self.roi = roi;
    }

    pub fn region_of_interest(&self) -> Option<PixelRect> {
        self.roi
    }

    pub fn verifier(&self) -> &ContentVerifier {
        &self.verifier
    }

    /// Analyse one frame.
    ///
    /// Errors only for frames that cannot be interpreted at all; a frame
    /// without a document is an ordinary invalid result.
    #[instrument(skip_all, fields(ts_ms = frame.timestamp().as_millis() as u64))]
    pub fn analyze(&mut self, frame: &Frame) -> Result<FrameAnalysis> {
        let fps = self.fps.tick(frame.timestamp());
        let normalized = self.normalizer.normalize(frame)?;
        let (src_w, src_h) = (normalized.width(), normalized.height());

        let candidates = self.detector.detect(&normalized.image, self.roi);
        let mut last_match = None;

        for candidate in &candidates {
            let Some(rectified) = self.rectifier.rectify(&normalized.image, candidate) else {
                continue;
            };
            let matched = self.verifier.verify(&rectified);
            last_match = Some(matched);
            if matched.verified {
                debug!(
                    good_matches = matched.good_matches,
                    aspect_ratio = candidate.aspect_ratio,
                    "Document verified in frame"
                );
                return Ok(FrameAnalysis {
                    result: ValidationResult::valid(
                        candidate.corners,
                        src_w,
                        src_h,
                        frame.rotation(),
                        fps,
                    ),
                    rectified: Some(rectified),
                    match_result: Some(matched),
                    candidates: candidates.len(),
                });
            }
        }

        Ok(FrameAnalysis {
            result: ValidationResult::invalid(src_w, src_h, frame.rotation(), fps),
            rectified: None,
            match_result: last_match,
            candidates: candidates.len(),
        })
    }
}
