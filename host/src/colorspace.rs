//! sRGB, CIE XYZ and CIE L*a*b* conversions
//!
//! All conversions assume sRGB primaries with a D65 white point.

use serde::Serialize;
use utoipa::ToSchema;

/// D65 reference white in XYZ
pub const D65_WHITE: [f64; 3] = [0.95047, 1.0, 1.08883];

/// Linear sRGB to XYZ (D65)
pub const SRGB_TO_XYZ: [[f64; 3]; 3] = [
    [0.4124564, 0.3575761, 0.1804375],
    [0.2126729, 0.7151522, 0.0721750],
    [0.0193339, 0.1191920, 0.9503041],
];

/// XYZ (D65) to linear sRGB
pub const XYZ_TO_SRGB: [[f64; 3]; 3] = [
    [3.2404542, -1.5371385, -0.4985314],
    [-0.9692660, 1.8760108, 0.0415560],
    [0.0556434, -0.2040259, 1.0572252],
];

const LAB_EPSILON: f64 = 0.008856;
const LAB_KAPPA: f64 = 7.787;
const LAB_OFFSET: f64 = 16.0 / 116.0;

/// RGB color representation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, ToSchema)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const BLACK: Rgb = Rgb::new(0, 0, 0);

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Convert to CIE L*a*b*
    pub fn to_lab(&self) -> Lab {
        rgb_to_lab(*self)
    }

    /// Uppercase `#RRGGBB`
    pub fn to_hex(&self) -> String {
        format!("#{:02X}{:02X}{:02X}", self.r, self.g, self.b)
    }

    /// Perceived luminance (ITU-R BT.601 weights), 0-255
    #[inline]
    pub fn luminance(&self) -> f64 {
        0.299 * self.r as f64 + 0.587 * self.g as f64 + 0.114 * self.b as f64
    }

    pub fn channels(&self) -> [u8; 3] {
        [self.r, self.g, self.b]
    }
}

/// CIE L*a*b* color
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, ToSchema)]
pub struct Lab {
    pub l: f64,
    pub a: f64,
    pub b: f64,
}

impl Lab {
    pub const fn new(l: f64, a: f64, b: f64) -> Self {
        Self { l, a, b }
    }

    /// Convert back to 8-bit sRGB (clamped)
    pub fn to_rgb(&self) -> Rgb {
        lab_to_rgb(*self)
    }
}

/// HSV with hue in degrees (0-359), saturation and value scaled to 0-255
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, ToSchema)]
pub struct Hsv {
    pub h: u16,
    pub s: u8,
    pub v: u8,
}

/// One observed color in every representation the pipeline needs
#[derive(Debug, Clone, Copy, PartialEq, Serialize, ToSchema)]
pub struct ColorSample {
    pub rgb: Rgb,
    pub lab: Lab,
    pub hsv: Hsv,
}

impl ColorSample {
    pub fn from_rgb(rgb: Rgb) -> Self {
        Self {
            rgb,
            lab: rgb_to_lab(rgb),
            hsv: rgb_to_hsv(rgb),
        }
    }
}

/// Convert sRGB byte to linear
#[inline]
pub fn srgb_to_linear(c: u8) -> f64 {
    let c = c as f64 / 255.0;
    if c <= 0.04045 {
        c / 12.92
    } else {
        ((c + 0.055) / 1.055).powf(2.4)
    }
}

/// Convert linear to sRGB byte
#[inline]
pub fn linear_to_srgb(c: f64) -> u8 {
    let c = if c <= 0.0031308 {
        c * 12.92
    } else {
        1.055 * c.powf(1.0 / 2.4) - 0.055
    };
    (c * 255.0).round().clamp(0.0, 255.0) as u8
}

#[inline]
pub fn mul3(m: &[[f64; 3]; 3], v: [f64; 3]) -> [f64; 3] {
    [
        m[0][0] * v[0] + m[0][1] * v[1] + m[0][2] * v[2],
        m[1][0] * v[0] + m[1][1] * v[1] + m[1][2] * v[2],
        m[2][0] * v[0] + m[2][1] * v[1] + m[2][2] * v[2],
    ]
}

/// Linear sRGB of an 8-bit color
pub fn rgb_to_linear(rgb: Rgb) -> [f64; 3] {
    [
        srgb_to_linear(rgb.r),
        srgb_to_linear(rgb.g),
        srgb_to_linear(rgb.b),
    ]
}

/// Encode linear sRGB back to 8-bit, clamping out-of-gamut values
pub fn linear_to_rgb(linear: [f64; 3]) -> Rgb {
    Rgb::new(
        linear_to_srgb(linear[0]),
        linear_to_srgb(linear[1]),
        linear_to_srgb(linear[2]),
    )
}

#[inline]
fn lab_f(t: f64) -> f64 {
    if t > LAB_EPSILON {
        t.cbrt()
    } else {
        LAB_KAPPA * t + LAB_OFFSET
    }
}

#[inline]
fn lab_f_inv(f: f64) -> f64 {
    let cube = f * f * f;
    if cube > LAB_EPSILON {
        cube
    } else {
        (f - LAB_OFFSET) / LAB_KAPPA
    }
}

/// Convert from RGB to CIE L*a*b* (D65)
pub fn rgb_to_lab(rgb: Rgb) -> Lab {
    let xyz = mul3(&SRGB_TO_XYZ, rgb_to_linear(rgb));

    let fx = lab_f(xyz[0] / D65_WHITE[0]);
    let fy = lab_f(xyz[1] / D65_WHITE[1]);
    let fz = lab_f(xyz[2] / D65_WHITE[2]);

    Lab {
        l: 116.0 * fy - 16.0,
        a: 500.0 * (fx - fy),
        b: 200.0 * (fy - fz),
    }
}

/// Convert from CIE L*a*b* (D65) to RGB
pub fn lab_to_rgb(lab: Lab) -> Rgb {
    let fy = (lab.l + 16.0) / 116.0;
    let fx = fy + lab.a / 500.0;
    let fz = fy - lab.b / 200.0;

    let xyz = [
        lab_f_inv(fx) * D65_WHITE[0],
        lab_f_inv(fy) * D65_WHITE[1],
        lab_f_inv(fz) * D65_WHITE[2],
    ];

    linear_to_rgb(mul3(&XYZ_TO_SRGB, xyz))
}

/// Convert from RGB to HSV
pub fn rgb_to_hsv(rgb: Rgb) -> Hsv {
    let r = rgb.r as f64;
    let g = rgb.g as f64;
    let b = rgb.b as f64;
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = max - min;

    let hue = if delta == 0.0 {
        0.0
    } else if max == r {
        60.0 * ((g - b) / delta)
    } else if max == g {
        60.0 * ((b - r) / delta) + 120.0
    } else {
        60.0 * ((r - g) / delta) + 240.0
    };
    let hue = if hue < 0.0 { hue + 360.0 } else { hue };

    let s = if max == 0.0 { 0.0 } else { delta / max * 255.0 };

    Hsv {
        h: (hue.round() as u16) % 360,
        s: s.round().clamp(0.0, 255.0) as u8,
        v: max as u8,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_lab_values() {
        let white = rgb_to_lab(Rgb::new(255, 255, 255));
        assert!((white.l - 100.0).abs() < 0.01);
        assert!(white.a.abs() < 0.01);
        assert!(white.b.abs() < 0.01);

        let black = rgb_to_lab(Rgb::BLACK);
        assert!(black.l.abs() < 1e-9);

        // sRGB red, reference L*a*b* (53.24, 80.09, 67.20)
        let red = rgb_to_lab(Rgb::new(255, 0, 0));
        assert!((red.l - 53.24).abs() < 0.05);
        assert!((red.a - 80.09).abs() < 0.05);
        assert!((red.b - 67.20).abs() < 0.05);
    }

    #[test]
    fn test_lab_round_trip() {
        for r in (0..=255u16).step_by(15) {
            for g in (0..=255u16).step_by(15) {
                for b in (0..=255u16).step_by(15) {
                    let rgb = Rgb::new(r as u8, g as u8, b as u8);
                    let back = lab_to_rgb(rgb_to_lab(rgb));
                    for (x, y) in rgb.channels().iter().zip(back.channels().iter()) {
                        assert!(
                            (*x as i16 - *y as i16).abs() <= 1,
                            "{:?} came back as {:?}",
                            rgb,
                            back
                        );
                    }
                }
            }
        }
    }

    #[test]
    fn test_hsv() {
        assert_eq!(rgb_to_hsv(Rgb::new(255, 0, 0)), Hsv { h: 0, s: 255, v: 255 });
        assert_eq!(rgb_to_hsv(Rgb::new(0, 255, 0)).h, 120);
        assert_eq!(rgb_to_hsv(Rgb::new(0, 0, 255)).h, 240);
        assert_eq!(rgb_to_hsv(Rgb::new(128, 128, 128)), Hsv { h: 0, s: 0, v: 128 });
        assert_eq!(rgb_to_hsv(Rgb::new(255, 0, 128)).h, 330);
    }

    #[test]
    fn test_hex_and_luminance() {
        assert_eq!(Rgb::new(255, 160, 10).to_hex(), "#FFA00A");
        assert!((Rgb::new(255, 255, 255).luminance() - 255.0).abs() < 1e-9);
        assert!((Rgb::new(100, 0, 0).luminance() - 29.9).abs() < 1e-9);
    }
}
