// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Pipeline configuration. Every default reproduces the tuned constants the
// validator was calibrated with.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{IdGateError, Result};
use crate::types::TemplateLayout;

/// Complete validator configuration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    pub template: TemplateConfig,
    pub normalizer: NormalizerConfig,
    pub detector: DetectorConfig,
    pub features: FeatureConfig,
    pub matcher: MatcherConfig,
    pub session: SessionPolicy,
}

/// Canonical template geometry. Every rectified candidate is resampled to
/// `width` x `height`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TemplateConfig {
    pub width: u32,
    pub height: u32,
    /// Named sub-regions, in canonical template pixels.
    pub layout: TemplateLayout,
}

impl Default for TemplateConfig {
    fn default() -> Self {
        // ID-1 card (85.60 x 53.98 mm).
        Self {
            width: 640,
            height: 404,
            layout: TemplateLayout::default(),
        }
    }
}

/// Contrast-limited adaptive histogram equalization settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizerConfig {
    /// Tiles per axis.
    pub tile_grid: u32,
    /// Clip limit as a multiple of the mean bin height.
    pub clip_limit: f32,
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self {
            tile_grid: 8,
            clip_limit: 2.0,
        }
    }
}

/// Candidate geometry detector settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Gaussian sigma; 1.1 is the sigma a 5x5 kernel implies.
    pub blur_sigma: f32,
    pub canny_low: f32,
    pub canny_high: f32,
    /// Half-width of the square closing element (3 gives 7x7).
    pub close_radius: u8,
    /// Contours considered per frame, largest first.
    pub max_contours: usize,
    /// Polygon approximation tolerance as a fraction of the perimeter.
    pub approx_epsilon_ratio: f64,
    /// Long/short side ratio of the target document.
    pub target_aspect_ratio: f32,
    pub aspect_ratio_tolerance: f32,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            blur_sigma: 1.1,
            canny_low: 50.0,
            canny_high: 150.0,
            close_radius: 3,
            max_contours: 5,
            approx_epsilon_ratio: 0.02,
            target_aspect_ratio: 1.586,
            aspect_ratio_tolerance: 0.4,
        }
    }
}

/// ORB-style feature extractor settings, shared by template and candidates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureConfig {
    pub max_keypoints: usize,
    pub fast_threshold: u8,
    pub pyramid_levels: u32,
    pub scale_factor: f32,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            max_keypoints: 500,
            fast_threshold: 20,
            pyramid_levels: 3,
            scale_factor: 1.2,
        }
    }
}

/// Descriptor matching thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatcherConfig {
    /// Nearest/second-nearest distance ratio a good match must stay under.
    pub ratio: f32,
    /// Verification needs strictly more good matches than this.
    pub min_good_matches: usize,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            ratio: 0.75,
            min_good_matches: 8,
        }
    }
}

/// Retry and timeout policy of the validation session.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionPolicy {
    pub max_retries: u32,
    pub extraction_timeout_ms: u64,
    pub identity_timeout_ms: u64,
}

impl Default for SessionPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            extraction_timeout_ms: 5_000,
            identity_timeout_ms: 10_000,
        }
    }
}

impl GateConfig {
    /// Load a configuration from a JSON file.
    ///
    /// Missing fields fall back to their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let data = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&data)?;
        config.validate()?;
        Ok(config)
    }

    /// Write the configuration as pretty-printed JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path.as_ref(), json)?;
        Ok(())
    }

    /// Reject values the pipeline cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.template.width == 0 || self.template.height == 0 {
            return Err(IdGateError::Config(
                "template dimensions must be non-zero".into(),
            ));
        }
        let (w, h) = (self.template.width, self.template.height);
        if self
            .template
            .layout
            .matched_regions()
            .all(|r| r.rect.clip_to(w, h).is_none())
        {
            return Err(IdGateError::Config(
                "no chip, barcode or MRZ region lies inside the template".into(),
            ));
        }
        if self.normalizer.tile_grid == 0 {
            return Err(IdGateError::Config("CLAHE tile grid must be non-zero".into()));
        }
        if self.normalizer.clip_limit <= 0.0 {
            return Err(IdGateError::Config("CLAHE clip limit must be positive".into()));
        }
        if self.detector.blur_sigma <= 0.0 {
            return Err(IdGateError::Config("blur sigma must be positive".into()));
        }
        if self.detector.canny_low > self.detector.canny_high {
            return Err(IdGateError::Config(format!(
                "canny low threshold {} exceeds high threshold {}",
                self.detector.canny_low, self.detector.canny_high
            )));
        }
        if self.detector.max_contours == 0 {
            return Err(IdGateError::Config("max_contours must be non-zero".into()));
        }
        if self.detector.approx_epsilon_ratio <= 0.0 {
            return Err(IdGateError::Config(
                "polygon approximation tolerance must be positive".into(),
            ));
        }
        if !(self.matcher.ratio > 0.0 && self.matcher.ratio <= 1.0) {
            return Err(IdGateError::Config(format!(
                "match ratio {} must lie in (0, 1]",
                self.matcher.ratio
            )));
        }
        if self.features.max_keypoints == 0 || self.features.pyramid_levels == 0 {
            return Err(IdGateError::Config(
                "feature extractor needs a keypoint budget and at least one level".into(),
            ));
        }
        if self.features.scale_factor <= 1.0 {
            return Err(IdGateError::Config("pyramid scale factor must exceed 1.0".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_calibration() {
        let config = GateConfig::default();
        assert_eq!(config.normalizer.tile_grid, 8);
        assert_eq!(config.detector.max_contours, 5);
        assert_eq!(config.features.max_keypoints, 500);
        assert_eq!(config.matcher.ratio, 0.75);
        assert_eq!(config.matcher.min_good_matches, 8);
        assert_eq!(config.session.max_retries, 3);
        assert_eq!(config.session.extraction_timeout_ms, 5_000);
        assert_eq!(config.session.identity_timeout_ms, 10_000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let config: GateConfig =
            serde_json::from_str(r#"{ "matcher": { "min_good_matches": 12 } }"#).unwrap();
        assert_eq!(config.matcher.min_good_matches, 12);
        assert_eq!(config.matcher.ratio, 0.75);
        assert_eq!(config.template, TemplateConfig::default());
    }

    #[test]
    fn validate_rejects_layout_outside_template() {
        let mut config = GateConfig::default();
        config.template.width = 10;
        config.template.height = 10;
        assert!(matches!(config.validate(), Err(IdGateError::Config(_))));
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("idgate.json");
        let mut config = GateConfig::default();
        config.session.max_retries = 5;
        config.save(&path).unwrap();
        assert_eq!(GateConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn validate_rejects_inverted_canny_thresholds() {
        let mut config = GateConfig::default();
        config.detector.canny_low = 200.0;
        assert!(matches!(config.validate(), Err(IdGateError::Config(_))));
    }

    #[test]
    fn validate_rejects_ratio_out_of_range() {
        let mut config = GateConfig::default();
        config.matcher.ratio = 1.5;
        assert!(config.validate().is_err());
    }
}
