//! Dominant color selection
//!
//! The dominant color of a region is the centroid of its largest color cluster. This
//! rejects shadows and specular highlights that would pull a plain average off.

use std::collections::HashMap;

use image::RgbImage;

use crate::colorspace::Rgb;
use crate::image_processing::{self, KmeansParams};

#[derive(Debug, Clone, Copy)]
pub struct DominantColorExtractor {
    params: KmeansParams,
}

impl Default for DominantColorExtractor {
    fn default() -> Self {
        Self::new(KmeansParams::default())
    }
}

impl DominantColorExtractor {
    pub fn new(params: KmeansParams) -> Self {
        Self { params }
    }

    pub fn extract(&self, region: &RgbImage) -> Rgb {
        self.extract_pixels(&image_processing::pixels(region))
    }

    /// Dominant color of a pixel buffer
    pub fn extract_pixels(&self, pixels: &[Rgb]) -> Rgb {
        let k = self.params.k.max(1);
        if pixels.len() < k {
            return image_processing::mean_color(pixels);
        }

        // Few distinct colors: each one is its own cluster
        if let Some(color) = most_frequent_if_at_most(pixels, k) {
            return color;
        }

        let clusters = image_processing::cluster_colors(pixels, &self.params);
        let mut best: Option<image_processing::Cluster> = None;
        for cluster in clusters {
            match best {
                Some(b) if cluster.size <= b.size => {}
                _ => best = Some(cluster),
            }
        }

        best.map(|c| c.centroid)
            .unwrap_or_else(|| image_processing::mean_color(pixels))
    }
}

/// Most frequent color when the buffer holds at most `limit` distinct colors
///
/// Ties go to the color seen first.
fn most_frequent_if_at_most(pixels: &[Rgb], limit: usize) -> Option<Rgb> {
    let mut order: Vec<Rgb> = Vec::with_capacity(limit + 1);
    let mut counts: HashMap<Rgb, usize> = HashMap::with_capacity(limit + 1);

    for &p in pixels {
        let count = counts.entry(p).or_insert_with(|| {
            order.push(p);
            0
        });
        *count += 1;
        if order.len() > limit {
            return None;
        }
    }

    let mut best: Option<(Rgb, usize)> = None;
    for color in order {
        let count = counts.get(&color).copied().unwrap_or(0);
        match best {
            Some((_, c)) if count <= c => {}
            _ => best = Some((color, count)),
        }
    }
    best.map(|(color, _)| color)
}
