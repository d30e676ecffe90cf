//! Frame normalization: local contrast equalization and white balance
//!
//! Both steps are optional and always run in the same order: CLAHE first, then the
//! per-channel white-balance gains.

use image::RgbImage;
use serde::Serialize;
use tracing::info;
use utoipa::ToSchema;

use crate::image_processing::{self, ClaheParams};

/// Per-channel white-balance gains
#[derive(Debug, Clone, Copy, PartialEq, Serialize, ToSchema)]
pub struct Gains {
    pub r: f64,
    pub g: f64,
    pub b: f64,
}

impl Gains {
    pub const IDENTITY: Gains = Gains {
        r: 1.0,
        g: 1.0,
        b: 1.0,
    };

    pub fn is_identity(&self) -> bool {
        *self == Self::IDENTITY
    }

    pub fn as_array(&self) -> [f64; 3] {
        [self.r, self.g, self.b]
    }
}

impl Default for Gains {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Compute gains from a region pointed at a white reference
///
/// Each channel gets `255 / mean`; gains are then rescaled so the brightest channel
/// keeps a gain of exactly 1 and weaker channels are lifted to match it.
pub fn white_balance_gains(region: &RgbImage) -> Gains {
    let pixel_count = region.pixels().len();
    if pixel_count == 0 {
        return Gains::IDENTITY;
    }

    let mut sums = [0f64; 3];
    for p in region.pixels() {
        sums[0] += p[0] as f64;
        sums[1] += p[1] as f64;
        sums[2] += p[2] as f64;
    }

    let raw = sums.map(|s| 255.0 / (s / pixel_count as f64).max(1.0));
    let brightest = raw.iter().copied().fold(f64::INFINITY, f64::min);

    Gains {
        r: raw[0] / brightest,
        g: raw[1] / brightest,
        b: raw[2] / brightest,
    }
}

/// Applies the enabled normalization steps and owns the calibration state
#[derive(Debug, Clone)]
pub struct FrameNormalizer {
    clahe: ClaheParams,
    pub clahe_enabled: bool,
    pub white_balance_enabled: bool,
    gains: Gains,
}

impl FrameNormalizer {
    pub fn new(clahe: ClaheParams, clahe_enabled: bool, white_balance_enabled: bool) -> Self {
        Self {
            clahe,
            clahe_enabled,
            white_balance_enabled,
            gains: Gains::IDENTITY,
        }
    }

    pub fn gains(&self) -> Gains {
        self.gains
    }

    pub fn is_calibrated(&self) -> bool {
        !self.gains.is_identity()
    }

    /// Calibrate against a white reference and keep the gains
    pub fn calibrate(&mut self, region: &RgbImage) -> Gains {
        self.gains = white_balance_gains(region);
        info!(
            "White balance calibrated: R={:.3} G={:.3} B={:.3}",
            self.gains.r, self.gains.g, self.gains.b
        );
        self.gains
    }

    pub fn reset_calibration(&mut self) {
        self.gains = Gains::IDENTITY;
        info!("White balance calibration cleared");
    }

    /// Run the enabled steps over a region
    pub fn apply(&self, region: &RgbImage) -> RgbImage {
        let mut out = if self.clahe_enabled {
            image_processing::equalize_luminance(region, &self.clahe)
        } else {
            region.clone()
        };

        if self.white_balance_enabled && self.is_calibrated() {
            apply_gains(&mut out, self.gains);
        }

        out
    }
}

/// `clamp(raw * gain, 0, 255)` per channel
pub fn apply_gains(img: &mut RgbImage, gains: Gains) {
    let gains = gains.as_array();
    for p in img.pixels_mut() {
        for (c, gain) in p.0.iter_mut().zip(gains) {
            *c = (*c as f64 * gain).round().clamp(0.0, 255.0) as u8;
        }
    }
}
