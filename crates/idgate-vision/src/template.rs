// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// The reference document every candidate is verified against.
//
// Built once at startup: the template image is resampled to the canonical
// size, a mask is painted over the chip, barcode and MRZ regions, and the
// features inside that mask are extracted. Immutable afterwards.

use std::path::Path;

use image::imageops::FilterType;
use image::{DynamicImage, GrayImage, Luma};
use imageproc::drawing::draw_filled_rect_mut;
use imageproc::rect::Rect;
use idgate_core::config::TemplateConfig;
use idgate_core::error::{IdGateError, Result};
use idgate_core::TemplateLayout;
use tracing::{info, instrument};

use crate::features::{FeatureSet, OrbExtractor};

/// Canonical reference image with its masked feature set.
#[derive(Debug, Clone)]
pub struct ReferenceTemplate {
    image: GrayImage,
    mask: GrayImage,
    features: FeatureSet,
    layout: TemplateLayout,
}

impl ReferenceTemplate {
    // -- Construction ---------------------------------------------------------

    /// Load the template from an image file.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn open(
        path: impl AsRef<Path>,
        config: &TemplateConfig,
        extractor: &OrbExtractor,
    ) -> Result<Self> {
        let image = image::open(path.as_ref()).map_err(|err| {
            IdGateError::TemplateLoad(format!("{}: {}", path.as_ref().display(), err))
        })?;
        Self::from_dynamic(image, config, extractor)
    }

    /// Load the template from encoded image bytes (PNG, JPEG, ...).
    #[instrument(skip_all, fields(data_len = data.len()))]
    pub fn from_bytes(
        data: &[u8],
        config: &TemplateConfig,
        extractor: &OrbExtractor,
    ) -> Result<Self> {
        let image = image::load_from_memory(data)
            .map_err(|err| IdGateError::TemplateLoad(format!("failed to decode template: {err}")))?;
        Self::from_dynamic(image, config, extractor)
    }

    /// Build the template from an already decoded image.
    ///
    /// Fails with `TemplateInvalid` when the masked regions yield no
    /// descriptors, since nothing could ever be verified against it.
    pub fn from_dynamic(
        image: DynamicImage,
        config: &TemplateConfig,
        extractor: &OrbExtractor,
    ) -> Result<Self> {
        if config.width == 0 || config.height == 0 {
            return Err(IdGateError::TemplateInvalid(
                "canonical size must be non-zero".into(),
            ));
        }
        let gray = image
            .resize_exact(config.width, config.height, FilterType::Triangle)
            .to_luma8();
        let mask = region_mask(&config.layout, config.width, config.height);
        let features = extractor.detect_and_compute(&gray, Some(&mask));

        if features.is_empty() {
            return Err(IdGateError::TemplateInvalid(
                "no features found inside the chip, barcode and MRZ regions".into(),
            ));
        }

        info!(
            width = config.width,
            height = config.height,
            keypoints = features.len(),
            "Reference template ready"
        );

        Ok(Self {
            image: gray,
            mask,
            features,
            layout: config.layout.clone(),
        })
    }

    // -- Accessors ------------------------------------------------------------

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// The canonical grayscale template.
    pub fn image(&self) -> &GrayImage {
        &self.image
    }

    pub fn mask(&self) -> &GrayImage {
        &self.mask
    }

    pub fn features(&self) -> &FeatureSet {
        &self.features
    }

    pub fn layout(&self) -> &TemplateLayout {
        &self.layout
    }
}

/// Union of the matched layout regions, white on black, clipped to the
/// canvas.
pub fn region_mask(layout: &TemplateLayout, width: u32, height: u32) -> GrayImage {
    let mut mask = GrayImage::new(width, height);
    for region in layout.matched_regions() {
        if let Some(r) = region.rect.clip_to(width, height) {
            draw_filled_rect_mut(
                &mut mask,
                Rect::at(r.x as i32, r.y as i32).of_size(r.width, r.height),
                Luma([255u8]),
            );
        }
    }
    mask
}
