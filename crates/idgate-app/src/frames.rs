// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Turning image files on disk into camera frames.

use std::path::Path;
use std::time::Duration;

use idgate_core::error::{IdGateError, Result};
use idgate_core::{Frame, PixelRect, Rotation};

/// Load `path` as a sensor-oriented luminance frame.
pub fn load_frame(path: &Path, rotation: Rotation, timestamp: Duration) -> Result<Frame> {
    let image = image::open(path).map_err(|err| {
        IdGateError::InvalidFrame(format!("cannot read {}: {err}", path.display()))
    })?;
    let luma = image.into_luma8();
    let (width, height) = luma.dimensions();
    Frame::new(width, height, rotation, luma.into_raw(), timestamp)
}

/// Whether `roi` overlaps the upright image of `frame`.
pub fn roi_overlaps(roi: PixelRect, frame: &Frame) -> bool {
    let (width, height) = frame.upright_dimensions();
    roi.clip_to(width, height).is_some()
}

/// Parse `x,y,w,h` into a region of interest.
pub fn parse_roi(value: &str) -> std::result::Result<PixelRect, String> {
    let parts: Vec<u32> = value
        .split(',')
        .map(|p| p.trim().parse::<u32>())
        .collect::<std::result::Result<_, _>>()
        .map_err(|err| format!("invalid region '{value}': {err}"))?;
    match parts[..] {
        [x, y, width, height] if width > 0 && height > 0 => Ok(PixelRect::new(x, y, width, height)),
        [_, _, _, _] => Err(format!("region '{value}' has zero size")),
        _ => Err(format!("region '{value}' must be x,y,w,h")),
    }
}
