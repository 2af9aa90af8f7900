// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Binary feature extraction and descriptor matching.

pub mod matcher;
pub mod orb;

pub use matcher::{RatioMatcher, hamming};
pub use orb::{Descriptor, FeatureSet, Keypoint, OrbExtractor};
