// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Perspective rectification of a candidate onto the canonical template plane.

use image::{GrayImage, Luma};
use imageproc::geometric_transformations::{Interpolation, Projection, warp_into};
use idgate_core::{Candidate, Point};
use tracing::{instrument, trace, warn};

/// Warps candidate quadrilaterals to a fixed `width` x `height` rectangle.
#[derive(Debug, Clone, Copy)]
pub struct PerspectiveRectifier {
    width: u32,
    height: u32,
}

impl PerspectiveRectifier {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Resample the area enclosed by `candidate` into a canonical image.
    ///
    /// The candidate's corners map onto (0,0), (W,0), (W,H) and (0,H) in that
    /// order. Returns `None` when no invertible homography exists for the
    /// corners (collinear or coincident points).
    #[instrument(skip_all, fields(corners = ?candidate.corners))]
    pub fn rectify(&self, source: &GrayImage, candidate: &Candidate) -> Option<GrayImage> {
        let corners = candidate.corners;
        if corners.iter().any(|p| !p.x.is_finite() || !p.y.is_finite()) {
            warn!("Candidate has non-finite corners");
            return None;
        }
        if quad_area(&corners) <= 1.0 {
            warn!("Candidate quadrilateral is degenerate");
            return None;
        }

        let (w, h) = (self.width as f32, self.height as f32);
        let src = corners.map(|p| (p.x, p.y));
        let dest = [(0.0, 0.0), (w, 0.0), (w, h), (0.0, h)];

        let Some(projection) = Projection::from_control_points(src, dest) else {
            warn!("Failed to compute projective transform");
            return None;
        };

        let mut output = GrayImage::new(self.width, self.height);
        warp_into(source, &projection, Interpolation::Bilinear, Luma([0u8]), &mut output);
        trace!(out_w = self.width, out_h = self.height, "Candidate rectified");
        Some(output)
    }
}

/// Shoelace area of four ordered vertices.
fn quad_area(corners: &[Point; 4]) -> f32 {
    let mut area = 0.0f32;
    for i in 0..4 {
        let j = (i + 1) % 4;
        area += corners[i].x * corners[j].y;
        area -= corners[j].x * corners[i].y;
    }
    area.abs() / 2.0
}
