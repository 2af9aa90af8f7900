// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Candidate geometry detection: find convex quadrilaterals in a normalized
// frame whose proportions match the target document.

use image::GrayImage;
use image::imageops::crop_imm;
use imageproc::contours::{BorderType, find_contours};
use imageproc::distance_transform::Norm;
use imageproc::edges::canny;
use imageproc::filter::gaussian_blur_f32;
use imageproc::geometry::{approximate_polygon_dp, arc_length, min_area_rect};
use imageproc::morphology::close;
use imageproc::point::Point as PixelPoint;
use idgate_core::config::DetectorConfig;
use idgate_core::{Candidate, PixelRect, Point};
use tracing::{debug, instrument, trace};

/// Finds document-shaped quadrilaterals.
#[derive(Debug, Clone, Copy)]
pub struct CandidateDetector {
    config: DetectorConfig,
}

impl CandidateDetector {
    pub fn new(config: DetectorConfig) -> Self {
        Self { config }
    }

    /// Detect up to `max_contours` candidates in `image`.
    ///
    /// With a region of interest, only that part of the image is searched
    /// and the returned corners are translated back into full-image
    /// coordinates. A region entirely outside the image yields nothing.
    #[instrument(skip_all, fields(w = image.width(), h = image.height(), roi = ?roi))]
    pub fn detect(&self, image: &GrayImage, roi: Option<PixelRect>) -> Vec<Candidate> {
        let Some(rect) = roi else {
            return self.detect_in(image);
        };
        let Some(rect) = rect.clip_to(image.width(), image.height()) else {
            debug!("Region of interest lies outside the frame");
            return Vec::new();
        };
        let cropped = crop_imm(image, rect.x, rect.y, rect.width, rect.height).to_image();
        self.detect_in(&cropped)
            .into_iter()
            .map(|c| c.translated(rect.x as f32, rect.y as f32))
            .collect()
    }

    fn detect_in(&self, image: &GrayImage) -> Vec<Candidate> {
        let blurred = gaussian_blur_f32(image, self.config.blur_sigma);
        let edges = canny(&blurred, self.config.canny_low, self.config.canny_high);
        let closed = close(&edges, Norm::LInf, self.config.close_radius);

        let mut outlines: Vec<(f64, Vec<PixelPoint<i32>>)> = find_contours::<i32>(&closed)
            .into_iter()
            .filter(|c| c.border_type == BorderType::Outer && c.parent.is_none())
            .map(|c| (polygon_area(&c.points), c.points))
            .collect();
        outlines.sort_by(|a, b| b.0.total_cmp(&a.0));
        outlines.truncate(self.config.max_contours);

        let candidates: Vec<Candidate> = outlines
            .iter()
            .filter_map(|(area, points)| self.candidate_from_outline(points, *area))
            .collect();
        debug!(
            contours = outlines.len(),
            candidates = candidates.len(),
            "Candidate detection complete"
        );
        candidates
    }

    fn candidate_from_outline(&self, points: &[PixelPoint<i32>], area: f64) -> Option<Candidate> {
        if points.len() < 4 {
            return None;
        }
        let epsilon = self.config.approx_epsilon_ratio * arc_length(points, true);
        if epsilon <= 0.0 || !epsilon.is_finite() {
            return None;
        }

        let polygon = approximate_closed(points, epsilon);
        if polygon.len() != 4 {
            trace!(vertices = polygon.len(), "Outline is not a quadrilateral");
            return None;
        }
        let quad = [0, 1, 2, 3].map(|i| Point::new(polygon[i].x as f32, polygon[i].y as f32));
        if !is_convex(&quad) {
            trace!("Quadrilateral is not convex");
            return None;
        }

        let aspect_ratio = rect_aspect_ratio(&min_area_rect(&polygon));
        if !self.aspect_ratio_accepted(aspect_ratio) {
            trace!(aspect_ratio, "Aspect ratio outside tolerance");
            return None;
        }

        Some(Candidate {
            corners: order_corners(quad),
            aspect_ratio,
            area,
        })
    }

    /// Whether `ratio` lies strictly inside the tolerance band around the
    /// target document's long/short side ratio.
    pub fn aspect_ratio_accepted(&self, ratio: f32) -> bool {
        (ratio - self.config.target_aspect_ratio).abs() < self.config.aspect_ratio_tolerance
    }
}

/// Douglas-Peucker approximation of a closed outline.
///
/// The outline is split at its start point and the point farthest from it,
/// both halves are simplified as open curves, and the joined result is
/// pruned of vertices that lie within `epsilon` of the line through their
/// neighbours (the start point usually sits mid-edge).
fn approximate_closed(points: &[PixelPoint<i32>], epsilon: f64) -> Vec<PixelPoint<i32>> {
    let start = points[0];
    let far = points
        .iter()
        .enumerate()
        .max_by_key(|(_, p)| {
            let dx = (p.x - start.x) as i64;
            let dy = (p.y - start.y) as i64;
            dx * dx + dy * dy
        })
        .map(|(i, _)| i)
        .unwrap_or(0);
    if far == 0 {
        return vec![start];
    }

    let mut first = approximate_polygon_dp(&points[..=far], epsilon, false);
    let mut back: Vec<PixelPoint<i32>> = points[far..].to_vec();
    back.push(start);
    let mut second = approximate_polygon_dp(&back, epsilon, false);

    first.pop();
    second.pop();
    first.append(&mut second);
    prune_collinear(first, epsilon)
}

fn prune_collinear(mut polygon: Vec<PixelPoint<i32>>, epsilon: f64) -> Vec<PixelPoint<i32>> {
    loop {
        let n = polygon.len();
        if n <= 3 {
            return polygon;
        }
        let redundant = (0..n).find(|&i| {
            let prev = polygon[(i + n - 1) % n];
            let next = polygon[(i + 1) % n];
            distance_to_line(polygon[i], prev, next) < epsilon
        });
        match redundant {
            Some(i) => {
                polygon.remove(i);
            }
            None => return polygon,
        }
    }
}

fn distance_to_line(p: PixelPoint<i32>, a: PixelPoint<i32>, b: PixelPoint<i32>) -> f64 {
    let (ax, ay) = (a.x as f64, a.y as f64);
    let (dx, dy) = (b.x as f64 - ax, b.y as f64 - ay);
    let len = (dx * dx + dy * dy).sqrt();
    let (px, py) = (p.x as f64 - ax, p.y as f64 - ay);
    if len == 0.0 {
        return (px * px + py * py).sqrt();
    }
    (dx * py - dy * px).abs() / len
}

/// Shoelace area of a closed outline.
fn polygon_area(points: &[PixelPoint<i32>]) -> f64 {
    let n = points.len();
    if n < 3 {
        return 0.0;
    }
    let twice: i64 = (0..n)
        .map(|i| {
            let a = points[i];
            let b = points[(i + 1) % n];
            a.x as i64 * b.y as i64 - b.x as i64 * a.y as i64
        })
        .sum();
    twice.abs() as f64 / 2.0
}

/// A quadrilateral is convex when every turn goes the same way.
pub fn is_convex(quad: &[Point; 4]) -> bool {
    let mut sign = 0.0f32;
    for i in 0..4 {
        let a = quad[i];
        let b = quad[(i + 1) % 4];
        let c = quad[(i + 2) % 4];
        let cross = (b.x - a.x) * (c.y - b.y) - (b.y - a.y) * (c.x - b.x);
        if cross == 0.0 {
            return false;
        }
        if sign == 0.0 {
            sign = cross.signum();
        } else if cross.signum() != sign {
            return false;
        }
    }
    true
}

/// Long side over short side of a rectangle; 0 when degenerate.
fn rect_aspect_ratio(rect: &[PixelPoint<i32>; 4]) -> f32 {
    let side = |a: PixelPoint<i32>, b: PixelPoint<i32>| {
        let dx = (a.x - b.x) as f32;
        let dy = (a.y - b.y) as f32;
        (dx * dx + dy * dy).sqrt()
    };
    let s1 = side(rect[0], rect[1]);
    let s2 = side(rect[1], rect[2]);
    let short = s1.min(s2);
    if short <= f32::EPSILON {
        return 0.0;
    }
    s1.max(s2) / short
}

/// Order four points as top-left, top-right, bottom-right, bottom-left.
///
/// The two points with the smallest y form the top pair and the other two
/// the bottom pair; within a pair the smaller x is on the left.
pub fn order_corners(points: [Point; 4]) -> [Point; 4] {
    let mut sorted = points;
    sorted.sort_by(|a, b| a.y.total_cmp(&b.y).then(a.x.total_cmp(&b.x)));
    let (tl, tr) = if sorted[0].x <= sorted[1].x {
        (sorted[0], sorted[1])
    } else {
        (sorted[1], sorted[0])
    };
    let (bl, br) = if sorted[2].x <= sorted[3].x {
        (sorted[2], sorted[3])
    } else {
        (sorted[3], sorted[2])
    };
    [tl, tr, br, bl]
}
