//! CIEDE2000 color difference (CIE 142-2001)
//!
//! Parametric weights are fixed at kL = kC = kH = 1.

use std::f64::consts::PI;

use crate::colorspace::Lab;

/// 25^7
const POW25_7: f64 = 6_103_515_625.0;

/// Perceptual distance between two L*a*b* colors
pub fn delta_e_2000(lab1: Lab, lab2: Lab) -> f64 {
    const KL: f64 = 1.0;
    const KC: f64 = 1.0;
    const KH: f64 = 1.0;

    let (l1, a1, b1) = (lab1.l, lab1.a, lab1.b);
    let (l2, a2, b2) = (lab2.l, lab2.a, lab2.b);

    let c1 = a1.hypot(b1);
    let c2 = a2.hypot(b2);
    let c_mean_pow7 = ((c1 + c2) / 2.0).powi(7);
    let g = 0.5 * (1.0 - (c_mean_pow7 / (c_mean_pow7 + POW25_7)).sqrt());

    let a1_prime = a1 * (1.0 + g);
    let a2_prime = a2 * (1.0 + g);
    let c1_prime = a1_prime.hypot(b1);
    let c2_prime = a2_prime.hypot(b2);
    let h1_prime = hue_angle(a1_prime, b1);
    let h2_prime = hue_angle(a2_prime, b2);

    let delta_l_prime = l2 - l1;
    let delta_c_prime = c2_prime - c1_prime;

    let chroma_product = c1_prime * c2_prime;
    let delta_h_prime = if chroma_product == 0.0 {
        0.0
    } else {
        let dh = h2_prime - h1_prime;
        if dh > 180.0 {
            dh - 360.0
        } else if dh < -180.0 {
            dh + 360.0
        } else {
            dh
        }
    };
    let delta_big_h_prime = 2.0 * chroma_product.sqrt() * (delta_h_prime.to_radians() / 2.0).sin();

    let l_mean = (l1 + l2) / 2.0;
    let c_mean_prime = (c1_prime + c2_prime) / 2.0;
    let h_mean_prime = if chroma_product == 0.0 {
        h1_prime + h2_prime
    } else if (h1_prime - h2_prime).abs() <= 180.0 {
        (h1_prime + h2_prime) / 2.0
    } else if h1_prime + h2_prime < 360.0 {
        (h1_prime + h2_prime + 360.0) / 2.0
    } else {
        (h1_prime + h2_prime - 360.0) / 2.0
    };

    let h = h_mean_prime.to_radians();
    let t = 1.0 - 0.17 * (h - PI / 6.0).cos()
        + 0.24 * (2.0 * h).cos()
        + 0.32 * (3.0 * h + 6f64.to_radians()).cos()
        - 0.20 * (4.0 * h - 63f64.to_radians()).cos();

    let l_offset_sq = (l_mean - 50.0).powi(2);
    let sl = 1.0 + (0.015 * l_offset_sq) / (20.0 + l_offset_sq).sqrt();
    let sc = 1.0 + 0.045 * c_mean_prime;
    let sh = 1.0 + 0.015 * c_mean_prime * t;

    let delta_theta = 30.0 * (-((h_mean_prime - 275.0) / 25.0).powi(2)).exp();
    let c_mean_prime_pow7 = c_mean_prime.powi(7);
    let rc = 2.0 * (c_mean_prime_pow7 / (c_mean_prime_pow7 + POW25_7)).sqrt();
    let rt = -rc * (2.0 * delta_theta).to_radians().sin();

    let term_l = delta_l_prime / (KL * sl);
    let term_c = delta_c_prime / (KC * sc);
    let term_h = delta_big_h_prime / (KH * sh);

    // Rounding can leave a tiny negative radicand for near-identical colors
    (term_l * term_l + term_c * term_c + term_h * term_h + rt * term_c * term_h)
        .max(0.0)
        .sqrt()
}

/// Hue angle in degrees, 0-360
fn hue_angle(a: f64, b: f64) -> f64 {
    if a == 0.0 && b == 0.0 {
        return 0.0;
    }
    let h = b.atan2(a).to_degrees();
    if h < 0.0 {
        h + 360.0
    } else {
        h
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::colorspace::{rgb_to_lab, Rgb};

    fn assert_de(lab1: (f64, f64, f64), lab2: (f64, f64, f64), expected: f64) {
        let a = Lab::new(lab1.0, lab1.1, lab1.2);
        let b = Lab::new(lab2.0, lab2.1, lab2.2);
        let de = delta_e_2000(a, b);
        assert!(
            (de - expected).abs() < 1e-4,
            "expected {} got {} for {:?} / {:?}",
            expected,
            de,
            a,
            b
        );
    }

    #[test]
    fn test_reference_pairs() {
        // Sharma, Wu & Dalal test data
        assert_de((50.0, 2.6772, -79.7751), (50.0, 0.0, -82.7485), 2.0425);
        assert_de((50.0, 0.0, 0.0), (50.0, -1.0, 2.0), 2.3669);
        assert_de((50.0, 2.5, 0.0), (73.0, 25.0, -18.0), 27.1492);
        assert_de((60.2574, -34.0099, 36.2677), (60.4626, -34.1751, 39.4387), 1.2644);
    }

    #[test]
    fn test_identity() {
        for rgb in [
            Rgb::new(0, 0, 0),
            Rgb::new(255, 255, 255),
            Rgb::new(220, 20, 60),
            Rgb::new(0, 71, 171),
            Rgb::new(128, 128, 0),
        ] {
            let lab = rgb_to_lab(rgb);
            assert_eq!(delta_e_2000(lab, lab), 0.0);
        }
    }

    #[test]
    fn test_symmetry() {
        let colors: Vec<Lab> = [
            Rgb::new(255, 0, 0),
            Rgb::new(250, 5, 5),
            Rgb::new(0, 0, 255),
            Rgb::new(106, 90, 205),
            Rgb::new(47, 79, 79),
            Rgb::new(128, 128, 128),
            Rgb::new(255, 255, 0),
        ]
        .iter()
        .map(|c| rgb_to_lab(*c))
        .collect();

        for a in &colors {
            for b in &colors {
                let ab = delta_e_2000(*a, *b);
                let ba = delta_e_2000(*b, *a);
                assert!(ab >= 0.0);
                assert!((ab - ba).abs() < 1e-12, "{} != {}", ab, ba);
            }
        }
    }
}
