// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Core domain types for the idgate frame validator.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{IdGateError, Result};

/// Unique identifier for a validation session.
///
/// A new session starts on every full reset of the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Clockwise rotation that must be applied to a frame to make it upright.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Rotation {
    #[default]
    Deg0,
    Deg90,
    Deg180,
    Deg270,
}

impl Rotation {
    /// Rotation in degrees (0, 90, 180 or 270).
    pub fn degrees(self) -> u32 {
        match self {
            Self::Deg0 => 0,
            Self::Deg90 => 90,
            Self::Deg180 => 180,
            Self::Deg270 => 270,
        }
    }

    /// Whether applying this rotation swaps width and height.
    pub fn swaps_axes(self) -> bool {
        matches!(self, Self::Deg90 | Self::Deg270)
    }
}

impl TryFrom<u32> for Rotation {
    type Error = IdGateError;

    fn try_from(degrees: u32) -> Result<Self> {
        match degrees {
            0 => Ok(Self::Deg0),
            90 => Ok(Self::Deg90),
            180 => Ok(Self::Deg180),
            270 => Ok(Self::Deg270),
            other => Err(IdGateError::UnsupportedRotation(other)),
        }
    }
}

/// A point in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// An axis-aligned rectangle in integer pixel coordinates.
///
/// Used both for the named template sub-regions and for the region of
/// interest that restricts candidate detection within a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PixelRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl PixelRect {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Clip the rectangle to a `width` x `height` canvas.
    ///
    /// Returns `None` when nothing of the rectangle lies inside the canvas.
    pub fn clip_to(&self, width: u32, height: u32) -> Option<Self> {
        if self.x >= width || self.y >= height || self.width == 0 || self.height == 0 {
            return None;
        }
        let w = self.width.min(width - self.x);
        let h = self.height.min(height - self.y);
        Some(Self::new(self.x, self.y, w, h))
    }
}

/// Named sub-regions of the reference document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RegionKind {
    Chip,
    Barcode,
    MachineReadableZone,
    /// Vertical strip carrying the pen-written number.
    PenNumber,
    DecorativeText,
}

impl RegionKind {
    /// Whether features of this region take part in template matching.
    pub fn is_matched(self) -> bool {
        matches!(self, Self::Chip | Self::Barcode | Self::MachineReadableZone)
    }
}

/// A named rectangle in canonical template coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateRegion {
    pub kind: RegionKind,
    pub rect: PixelRect,
}

/// The sub-regions of the reference document, in canonical template pixels.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateLayout {
    pub regions: Vec<TemplateRegion>,
}

impl Default for TemplateLayout {
    /// Layout of the bundled TD1 card at the default 640x404 canonical size.
    fn default() -> Self {
        Self {
            regions: vec![
                TemplateRegion {
                    kind: RegionKind::Chip,
                    rect: PixelRect::new(52, 128, 112, 92),
                },
                TemplateRegion {
                    kind: RegionKind::Barcode,
                    rect: PixelRect::new(398, 36, 214, 62),
                },
                TemplateRegion {
                    kind: RegionKind::MachineReadableZone,
                    rect: PixelRect::new(20, 286, 600, 104),
                },
                TemplateRegion {
                    kind: RegionKind::PenNumber,
                    rect: PixelRect::new(604, 112, 28, 160),
                },
                TemplateRegion {
                    kind: RegionKind::DecorativeText,
                    rect: PixelRect::new(196, 40, 180, 40),
                },
            ],
        }
    }
}

impl TemplateLayout {
    /// Look up a region by kind.
    pub fn region(&self, kind: RegionKind) -> Option<PixelRect> {
        self.regions.iter().find(|r| r.kind == kind).map(|r| r.rect)
    }

    /// Regions that make up the feature-extraction mask.
    pub fn matched_regions(&self) -> impl Iterator<Item = &TemplateRegion> {
        self.regions.iter().filter(|r| r.kind.is_matched())
    }
}

/// One camera frame: a single-plane intensity buffer plus metadata.
///
/// Immutable once constructed.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    width: u32,
    height: u32,
    rotation: Rotation,
    luma: Vec<u8>,
    timestamp: Duration,
}

impl Frame {
    /// Build a frame, checking that the buffer holds exactly
    /// `width * height` samples.
    pub fn new(
        width: u32,
        height: u32,
        rotation: Rotation,
        luma: Vec<u8>,
        timestamp: Duration,
    ) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(IdGateError::InvalidFrame(format!(
                "zero-sized frame {width}x{height}"
            )));
        }
        let expected = width as usize * height as usize;
        if luma.len() != expected {
            return Err(IdGateError::InvalidFrame(format!(
                "luma buffer holds {} bytes, expected {expected} for {width}x{height}",
                luma.len()
            )));
        }
        Ok(Self {
            width,
            height,
            rotation,
            luma,
            timestamp,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn rotation(&self) -> Rotation {
        self.rotation
    }

    pub fn luma(&self) -> &[u8] {
        &self.luma
    }

    /// Capture time, relative to an arbitrary epoch chosen by the source.
    pub fn timestamp(&self) -> Duration {
        self.timestamp
    }

    /// Frame dimensions after rotation correction.
    pub fn upright_dimensions(&self) -> (u32, u32) {
        if self.rotation.swaps_axes() {
            (self.height, self.width)
        } else {
            (self.width, self.height)
        }
    }
}

/// A quadrilateral hypothesised to be the document boundary.
///
/// Corners are always ordered top-left, top-right, bottom-right,
/// bottom-left.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub corners: [Point; 4],
    /// Long side over short side of the minimum-area bounding rectangle.
    pub aspect_ratio: f32,
    /// Area enclosed by the source contour, in square pixels.
    pub area: f64,
}

impl Candidate {
    pub fn top_left(&self) -> Point {
        self.corners[0]
    }

    pub fn top_right(&self) -> Point {
        self.corners[1]
    }

    pub fn bottom_right(&self) -> Point {
        self.corners[2]
    }

    pub fn bottom_left(&self) -> Point {
        self.corners[3]
    }

    /// Shift every corner by `(dx, dy)`.
    pub fn translated(mut self, dx: f32, dy: f32) -> Self {
        for corner in &mut self.corners {
            corner.x += dx;
            corner.y += dy;
        }
        self
    }
}

/// Outcome of matching a rectified candidate against the reference template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchResult {
    /// Correspondences that passed the distance-ratio test.
    pub good_matches: usize,
    pub reference_keypoints: usize,
    pub candidate_keypoints: usize,
    pub verified: bool,
}

impl MatchResult {
    /// A result for a verification that never reached the matching stage.
    pub fn rejected(reference_keypoints: usize, candidate_keypoints: usize) -> Self {
        Self {
            good_matches: 0,
            reference_keypoints,
            candidate_keypoints,
            verified: false,
        }
    }
}

/// Per-frame validation result, delivered once per analysed frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub is_valid: bool,
    /// Corners of the accepted candidate, in upright frame coordinates.
    /// Present only when `is_valid` is true.
    pub corners: Option<[Point; 4]>,
    pub src_width: u32,
    pub src_height: u32,
    pub rotation_degrees: u32,
    pub fps: f32,
}

impl ValidationResult {
    pub fn invalid(src_width: u32, src_height: u32, rotation: Rotation, fps: f32) -> Self {
        Self {
            is_valid: false,
            corners: None,
            src_width,
            src_height,
            rotation_degrees: rotation.degrees(),
            fps,
        }
    }

    pub fn valid(
        corners: [Point; 4],
        src_width: u32,
        src_height: u32,
        rotation: Rotation,
        fps: f32,
    ) -> Self {
        Self {
            is_valid: true,
            corners: Some(corners),
            src_width,
            src_height,
            rotation_degrees: rotation.degrees(),
            fps,
        }
    }
}

/// Structured personal data read from the machine-readable zone.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonalFields {
    pub document_number: Option<String>,
    pub surname: Option<String>,
    pub given_names: Option<String>,
    pub nationality: Option<String>,
    pub date_of_birth: Option<String>,
    pub sex: Option<String>,
    pub expiry_date: Option<String>,
}

/// Result reported by the text-extraction collaborator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractionOutcome {
    pub success: bool,
    pub confidence: f32,
    pub processing_time_ms: u64,
    pub fields: Option<PersonalFields>,
    pub raw_lines: Option<Vec<String>>,
    pub error_message: Option<String>,
}

impl ExtractionOutcome {
    /// A failed outcome carrying only an error message.
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            error_message: Some(message.into()),
            ..Self::default()
        }
    }
}

/// Final, user-visible outcome of a validation session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SessionOutcome {
    /// Text extraction succeeded on a verified document. Terminal.
    Validated {
        session: SessionId,
        /// Extraction attempts used, including the successful one.
        attempts: u32,
        outcome: ExtractionOutcome,
        validated_at: DateTime<Utc>,
    },
    /// Every retry failed; the session was hard-reset.
    RetriesExhausted {
        session: SessionId,
        attempts: u32,
        last_failure: String,
    },
}

impl SessionOutcome {
    pub fn session(&self) -> SessionId {
        match self {
            Self::Validated { session, .. } | Self::RetriesExhausted { session, .. } => *session,
        }
    }
}
