//! Bradford chromatic adaptation
//!
//! Maps colors seen under the calibrated illuminant to how they would appear under
//! D65. The source white comes from the white-balance gains: a channel that needed a
//! gain of `g` was seen at `1/g` of its true strength.

use crate::colorspace::{self, Rgb, D65_WHITE, SRGB_TO_XYZ, XYZ_TO_SRGB};
use crate::normalizer::Gains;

/// Bradford cone response matrix
pub const BRADFORD: [[f64; 3]; 3] = [
    [0.8951, 0.2664, -0.1614],
    [-0.7502, 1.7135, 0.0367],
    [0.0389, -0.0685, 1.0296],
];

/// Inverse Bradford matrix
pub const BRADFORD_INV: [[f64; 3]; 3] = [
    [0.9869929, -0.1470543, 0.1599627],
    [0.4323053, 0.5183603, 0.0492912],
    [-0.0085287, 0.0400428, 0.9684867],
];

const CONE_FLOOR: f64 = 1e-10;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChromaticAdapter {
    /// XYZ to XYZ adaptation matrix
    matrix: [[f64; 3]; 3],
}

impl ChromaticAdapter {
    /// Build the adapter from white-balance gains
    pub fn from_gains(gains: Gains) -> Self {
        let inv = gains.as_array().map(|g| if g > 0.0 { 1.0 / g } else { 1.0 });
        let peak = inv.iter().copied().fold(0.0, f64::max).max(CONE_FLOOR);
        let src_linear = inv.map(|c| c / peak);
        let src_white = colorspace::mul3(&SRGB_TO_XYZ, src_linear);

        Self {
            matrix: adapt_matrix(src_white, D65_WHITE),
        }
    }

    /// Adapt one color to D65
    pub fn adapt(&self, rgb: Rgb) -> Rgb {
        let xyz = colorspace::mul3(&SRGB_TO_XYZ, colorspace::rgb_to_linear(rgb));
        let adapted = colorspace::mul3(&self.matrix, xyz);
        colorspace::linear_to_rgb(colorspace::mul3(&XYZ_TO_SRGB, adapted))
    }
}

/// `M⁻¹ · diag(dst / src) · M` in Bradford cone space
pub fn adapt_matrix(src_white: [f64; 3], dst_white: [f64; 3]) -> [[f64; 3]; 3] {
    let src_cone = colorspace::mul3(&BRADFORD, src_white);
    let dst_cone = colorspace::mul3(&BRADFORD, dst_white);

    let scale: [f64; 3] = std::array::from_fn(|i| dst_cone[i] / src_cone[i].max(CONE_FLOOR));

    // diag(scale) · M
    let scaled: [[f64; 3]; 3] = std::array::from_fn(|i| BRADFORD[i].map(|v| v * scale[i]));
    mat_mul(&BRADFORD_INV, &scaled)
}

fn mat_mul(a: &[[f64; 3]; 3], b: &[[f64; 3]; 3]) -> [[f64; 3]; 3] {
    std::array::from_fn(|i| std::array::from_fn(|j| (0..3).map(|k| a[i][k] * b[k][j]).sum()))
}
