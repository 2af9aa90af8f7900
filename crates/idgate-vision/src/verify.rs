// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Content verification: does a rectified candidate carry the reference
// document's chip, barcode and MRZ features?

use image::GrayImage;
use idgate_core::MatchResult;
use idgate_core::config::MatcherConfig;
use tracing::{debug, instrument, warn};

use crate::features::{OrbExtractor, RatioMatcher};
use crate::template::ReferenceTemplate;

/// Matches rectified candidates against the reference template.
#[derive(Debug, Clone)]
pub struct ContentVerifier {
    template: ReferenceTemplate,
    extractor: OrbExtractor,
    matcher: RatioMatcher,
    min_good_matches: usize,
}

impl ContentVerifier {
    /// `extractor` must be configured as the one that built `template`.
    pub fn new(template: ReferenceTemplate, extractor: OrbExtractor, config: MatcherConfig) -> Self {
        Self {
            template,
            extractor,
            matcher: RatioMatcher::new(config.ratio),
            min_good_matches: config.min_good_matches,
        }
    }

    pub fn template(&self) -> &ReferenceTemplate {
        &self.template
    }

    /// Verify one rectified candidate.
    ///
    /// The candidate is described without a mask. Reference descriptors are
    /// matched into the candidate's, and the candidate is verified when the
    /// number of ratio-test survivors exceeds the configured minimum.
    #[instrument(skip_all)]
    pub fn verify(&self, rectified: &GrayImage) -> MatchResult {
        let reference = self.template.features();
        if rectified.dimensions() != (self.template.width(), self.template.height()) {
            warn!(
                got = ?rectified.dimensions(),
                expected = ?(self.template.width(), self.template.height()),
                "Rectified candidate does not have canonical dimensions"
            );
            return MatchResult::rejected(reference.len(), 0);
        }

        let candidate = self.extractor.detect_and_compute(rectified, None);
        if reference.is_empty() || candidate.is_empty() {
            debug!(
                reference = reference.len(),
                candidate = candidate.len(),
                "Empty descriptor set; skipping match"
            );
            return MatchResult::rejected(reference.len(), candidate.len());
        }

        let good_matches = self
            .matcher
            .good_matches(&reference.descriptors, &candidate.descriptors);
        let verified = good_matches > self.min_good_matches;
        debug!(good_matches, verified, "Candidate matched against template");

        MatchResult {
            good_matches,
            reference_keypoints: reference.len(),
            candidate_keypoints: candidate.len(),
            verified,
        }
    }
}
