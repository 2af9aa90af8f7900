// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Oriented FAST keypoints with rotated BRIEF descriptors.
//
// Keypoints are FAST-9 corners found on a small scale pyramid, thinned by
// 3x3 non-maximum suppression and ranked by corner score. Each keypoint gets
// an orientation from the intensity centroid of its patch, and a 256-bit
// descriptor from pairwise intensity tests on a smoothed copy of its level,
// rotated by that orientation.
//
// Everything is deterministic: the test pattern comes from a fixed seed and
// ties are broken by position, so identical images always produce identical
// feature sets.

use std::sync::OnceLock;

use image::GrayImage;
use image::imageops::{FilterType, resize};
use imageproc::corners::{Corner, corners_fast9};
use imageproc::filter::gaussian_blur_f32;
use idgate_core::config::FeatureConfig;
use tracing::{debug, instrument};

/// 256-bit binary descriptor.
pub type Descriptor = [u8; 32];

const DESCRIPTOR_BITS: usize = 256;
/// Radius of the orientation and descriptor patch (31x31).
const PATCH_RADIUS: i32 = 15;
/// Corners closer than this to a level's border are discarded.
const EDGE_BORDER: u32 = 20;
const DESCRIPTOR_BLUR_SIGMA: f32 = 2.0;
/// Spread of the test-pair offsets: patch size / 5.
const PATTERN_SIGMA: f32 = 6.2;
const PATTERN_LIMIT: f32 = 13.0;
const PATTERN_SEED: u64 = 0x1D6A_7E00_0000_0031;

/// A detected keypoint, in level-0 (input image) coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Keypoint {
    pub x: f32,
    pub y: f32,
    /// Orientation in radians.
    pub angle: f32,
    /// FAST corner score.
    pub response: f32,
    /// Pyramid level the keypoint was found on.
    pub level: u32,
}

/// Keypoints and their descriptors, index-aligned.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureSet {
    pub keypoints: Vec<Keypoint>,
    pub descriptors: Vec<Descriptor>,
}

impl FeatureSet {
    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}

/// ORB-style detector and descriptor extractor.
#[derive(Debug, Clone, Copy)]
pub struct OrbExtractor {
    config: FeatureConfig,
}

impl OrbExtractor {
    pub fn new(config: FeatureConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &FeatureConfig {
        &self.config
    }

    /// Detect up to `max_keypoints` keypoints and describe them.
    ///
    /// With a mask, only keypoints whose level-0 position falls on a
    /// non-zero mask pixel are kept. The mask must match the image size.
    #[instrument(skip_all, fields(w = image.width(), h = image.height(), masked = mask.is_some()))]
    pub fn detect_and_compute(&self, image: &GrayImage, mask: Option<&GrayImage>) -> FeatureSet {
        let budgets = level_budgets(
            self.config.max_keypoints,
            self.config.pyramid_levels,
            self.config.scale_factor,
        );

        let mut features = FeatureSet::default();
        let mut carry = 0usize;

        for (level, budget) in budgets.into_iter().enumerate() {
            let level = level as u32;
            let scale = self.config.scale_factor.powi(level as i32);
            let budget = budget + carry;

            let scaled;
            let level_image = if level == 0 {
                image
            } else {
                let w = (image.width() as f32 / scale).round() as u32;
                let h = (image.height() as f32 / scale).round() as u32;
                scaled = resize(image, w, h, FilterType::Triangle);
                &scaled
            };

            let (w, h) = level_image.dimensions();
            if w <= 2 * EDGE_BORDER || h <= 2 * EDGE_BORDER {
                carry = budget;
                continue;
            }

            let mut corners: Vec<Corner> =
                suppress_non_maxima(corners_fast9(level_image, self.config.fast_threshold), w, h)
                    .into_iter()
                    .filter(|c| {
                        c.x >= EDGE_BORDER
                            && c.y >= EDGE_BORDER
                            && c.x < w - EDGE_BORDER
                            && c.y < h - EDGE_BORDER
                    })
                    .filter(|c| mask.is_none_or(|m| mask_allows(m, c.x, c.y, scale)))
                    .collect();
            corners.sort_by(|a, b| {
                b.score
                    .total_cmp(&a.score)
                    .then(a.y.cmp(&b.y))
                    .then(a.x.cmp(&b.x))
            });
            corners.truncate(budget);
            carry = budget - corners.len();

            if corners.is_empty() {
                continue;
            }

            let smoothed = gaussian_blur_f32(level_image, DESCRIPTOR_BLUR_SIGMA);
            for corner in corners {
                let angle = orientation(level_image, corner.x, corner.y);
                features.descriptors.push(describe(&smoothed, corner.x, corner.y, angle));
                features.keypoints.push(Keypoint {
                    x: corner.x as f32 * scale,
                    y: corner.y as f32 * scale,
                    angle,
                    response: corner.score,
                    level,
                });
            }
        }

        debug!(keypoints = features.len(), "Features extracted");
        features
    }
}

/// Split the keypoint budget over the pyramid, geometrically decreasing
/// with scale so each level gets a share proportional to its area.
fn level_budgets(total: usize, levels: u32, scale_factor: f32) -> Vec<usize> {
    let levels = levels.max(1) as usize;
    let factor = 1.0 / scale_factor;
    let first = total as f32 * (1.0 - factor) / (1.0 - factor.powi(levels as i32));

    let mut budgets = Vec::with_capacity(levels);
    let mut assigned = 0usize;
    for level in 0..levels - 1 {
        let n = ((first * factor.powi(level as i32)).round() as usize).min(total - assigned);
        budgets.push(n);
        assigned += n;
    }
    budgets.push(total - assigned);
    budgets
}

/// Keep corners whose score is the maximum of their 3x3 neighbourhood.
/// Equal scores go to the neighbour that comes first in raster order.
fn suppress_non_maxima(corners: Vec<Corner>, width: u32, height: u32) -> Vec<Corner> {
    let mut scores = vec![0.0f32; width as usize * height as usize];
    for c in &corners {
        scores[c.y as usize * width as usize + c.x as usize] = c.score;
    }

    corners
        .into_iter()
        .filter(|c| {
            for dy in -1i64..=1 {
                for dx in -1i64..=1 {
                    if dx == 0 && dy == 0 {
                        continue;
                    }
                    let nx = c.x as i64 + dx;
                    let ny = c.y as i64 + dy;
                    if nx < 0 || ny < 0 || nx >= width as i64 || ny >= height as i64 {
                        continue;
                    }
                    let s = scores[ny as usize * width as usize + nx as usize];
                    let earlier = (ny, nx) < (c.y as i64, c.x as i64);
                    if s > c.score || (s == c.score && s > 0.0 && earlier) {
                        return false;
                    }
                }
            }
            true
        })
        .collect()
}

fn mask_allows(mask: &GrayImage, x: u32, y: u32, scale: f32) -> bool {
    if mask.width() == 0 || mask.height() == 0 {
        return false;
    }
    let mx = ((x as f32 * scale).round() as u32).min(mask.width() - 1);
    let my = ((y as f32 * scale).round() as u32).min(mask.height() - 1);
    mask.get_pixel(mx, my)[0] > 0
}

fn sample(image: &GrayImage, x: i32, y: i32) -> u8 {
    let cx = x.clamp(0, image.width() as i32 - 1) as u32;
    let cy = y.clamp(0, image.height() as i32 - 1) as u32;
    image.get_pixel(cx, cy)[0]
}

/// Orientation of the vector from the keypoint to the intensity centroid
/// of its circular patch.
fn orientation(image: &GrayImage, x: u32, y: u32) -> f32 {
    let (cx, cy) = (x as i32, y as i32);
    let mut m10 = 0i64;
    let mut m01 = 0i64;
    for dy in -PATCH_RADIUS..=PATCH_RADIUS {
        let span = ((PATCH_RADIUS * PATCH_RADIUS - dy * dy) as f32).sqrt() as i32;
        for dx in -span..=span {
            let v = sample(image, cx + dx, cy + dy) as i64;
            m10 += dx as i64 * v;
            m01 += dy as i64 * v;
        }
    }
    (m01 as f32).atan2(m10 as f32)
}

fn describe(smoothed: &GrayImage, x: u32, y: u32, angle: f32) -> Descriptor {
    let (sin, cos) = angle.sin_cos();
    let (cx, cy) = (x as i32, y as i32);
    let rotated = |dx: i8, dy: i8| {
        let (dx, dy) = (dx as f32, dy as f32);
        let rx = (cos * dx - sin * dy).round() as i32;
        let ry = (sin * dx + cos * dy).round() as i32;
        sample(smoothed, cx + rx, cy + ry)
    };

    let mut descriptor = [0u8; 32];
    for (bit, pair) in test_pattern().iter().enumerate() {
        if rotated(pair[0], pair[1]) < rotated(pair[2], pair[3]) {
            descriptor[bit / 8] |= 1 << (bit % 8);
        }
    }
    descriptor
}

/// The fixed set of point-pair offsets `[x1, y1, x2, y2]` compared to form
/// each descriptor bit.
fn test_pattern() -> &'static [[i8; 4]; DESCRIPTOR_BITS] {
    static PATTERN: OnceLock<[[i8; 4]; DESCRIPTOR_BITS]> = OnceLock::new();
    PATTERN.get_or_init(|| {
        let mut state = PATTERN_SEED;
        let mut pairs = [[0i8; 4]; DESCRIPTOR_BITS];
        for pair in pairs.iter_mut() {
            for offset in pair.iter_mut() {
                *offset = gaussian_offset(&mut state);
            }
        }
        pairs
    })
}

fn splitmix64(state: &mut u64) -> u64 {
    *state = state.wrapping_add(0x9E37_79B9_7F4A_7C15);
    let mut z = *state;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// Approximately normal offset (sum of four uniforms), clamped to the patch.
fn gaussian_offset(state: &mut u64) -> i8 {
    let sum: f32 = (0..4)
        .map(|_| (splitmix64(state) >> 40) as f32 / (1u64 << 24) as f32)
        .sum();
    let standard = (sum - 2.0) * 3.0f32.sqrt();
    (standard * PATTERN_SIGMA)
        .round()
        .clamp(-PATTERN_LIMIT, PATTERN_LIMIT) as i8
}
