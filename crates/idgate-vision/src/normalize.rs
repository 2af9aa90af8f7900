// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Frame normalization: upright rotation followed by adaptive contrast
// equalization. The input frame is never modified.

use image::GrayImage;
use image::imageops::{rotate90, rotate180, rotate270};
use idgate_core::config::NormalizerConfig;
use idgate_core::error::{IdGateError, Result};
use idgate_core::{Frame, Rotation};
use tracing::{instrument, trace};

use crate::clahe::equalize_clahe;

/// An upright, contrast-equalized copy of a frame.
#[derive(Debug, Clone)]
pub struct NormalizedFrame {
    pub image: GrayImage,
    pub rotation: Rotation,
}

impl NormalizedFrame {
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

/// Rotates frames upright and equalizes their contrast.
#[derive(Debug, Clone, Copy)]
pub struct FrameNormalizer {
    config: NormalizerConfig,
}

impl FrameNormalizer {
    pub fn new(config: NormalizerConfig) -> Self {
        Self { config }
    }

    /// Produce the upright, equalized image of `frame`.
    ///
    /// Rotation is clockwise by `frame.rotation()`, so a frame of `w x h`
    /// with a 90 or 270 degree rotation comes out as `h x w`.
    #[instrument(skip_all, fields(w = frame.width(), h = frame.height(), rotation = frame.rotation().degrees()))]
    pub fn normalize(&self, frame: &Frame) -> Result<NormalizedFrame> {
        let raw = GrayImage::from_raw(frame.width(), frame.height(), frame.luma().to_vec())
            .ok_or_else(|| {
                IdGateError::InvalidFrame(format!(
                    "luma buffer does not fit {}x{}",
                    frame.width(),
                    frame.height()
                ))
            })?;

        let upright = match frame.rotation() {
            Rotation::Deg0 => raw,
            Rotation::Deg90 => rotate90(&raw),
            Rotation::Deg180 => rotate180(&raw),
            Rotation::Deg270 => rotate270(&raw),
        };

        let image = equalize_clahe(&upright, self.config.tile_grid, self.config.clip_limit);
        trace!(out_w = image.width(), out_h = image.height(), "Frame normalized");

        Ok(NormalizedFrame {
            image,
            rotation: frame.rotation(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn frame(rotation: Rotation) -> Frame {
        // 4x2: left column bright, everything else dark.
        let luma = vec![255, 0, 0, 0, 255, 0, 0, 0];
        Frame::new(4, 2, rotation, luma, Duration::ZERO).unwrap()
    }

    #[test]
    fn rotation_swaps_dimensions() {
        let normalizer = FrameNormalizer::new(NormalizerConfig::default());
        for (rotation, dims) in [
            (Rotation::Deg0, (4, 2)),
            (Rotation::Deg90, (2, 4)),
            (Rotation::Deg180, (4, 2)),
            (Rotation::Deg270, (2, 4)),
        ] {
            let out = normalizer.normalize(&frame(rotation)).unwrap();
            assert_eq!((out.width(), out.height()), dims, "{rotation:?}");
            assert_eq!(out.rotation, rotation);
        }
    }

    #[test]
    fn rotation_is_clockwise() {
        // A single tile keeps intensities ordered after equalization.
        let normalizer = FrameNormalizer::new(NormalizerConfig {
            tile_grid: 1,
            clip_limit: 40.0,
        });
        // Clockwise by 90: the left column becomes the top row.
        let out = normalizer.normalize(&frame(Rotation::Deg90)).unwrap();
        assert!(out.image.get_pixel(0, 0)[0] > out.image.get_pixel(0, 3)[0]);
        assert!(out.image.get_pixel(1, 0)[0] > out.image.get_pixel(1, 3)[0]);
    }

    #[test]
    fn source_frame_is_untouched() {
        let normalizer = FrameNormalizer::new(NormalizerConfig::default());
        let source = frame(Rotation::Deg180);
        let before = source.clone();
        normalizer.normalize(&source).unwrap();
        assert_eq!(source, before);
    }
}
