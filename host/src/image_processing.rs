//! Image processing helpers used by the detection pipeline
//!
//! - Region cropping clamped to the frame
//! - Contrast-limited adaptive histogram equalization (CLAHE) on luminance
//! - k-means clustering of pixel colors
//! - Mean color

use image::{imageops, RgbImage};
use kmeans_colors::get_kmeans;
use palette::Srgb;

use crate::colorspace::Rgb;

/// CLAHE tuning
#[derive(Debug, Clone, Copy)]
pub struct ClaheParams {
    /// Histogram bin limit, as a multiple of the mean bin height
    pub clip_limit: f32,
    /// Tiles per axis (reduced for regions smaller than the grid)
    pub tile_grid: u32,
}

impl Default for ClaheParams {
    fn default() -> Self {
        Self {
            clip_limit: 2.0,
            tile_grid: 8,
        }
    }
}

/// k-means tuning
#[derive(Debug, Clone, Copy)]
pub struct KmeansParams {
    pub k: usize,
    pub max_iter: usize,
    pub converge: f32,
    pub seed: u64,
}

impl Default for KmeansParams {
    fn default() -> Self {
        Self {
            k: 3,
            max_iter: 20,
            converge: 0.0001,
            seed: 0,
        }
    }
}

/// One color cluster
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Cluster {
    pub centroid: Rgb,
    pub size: usize,
}

/// Crop a square region around (cx, cy)
///
/// The half-extent is clamped against the frame edges, so a region near a border
/// shrinks instead of failing. A center outside the frame yields an empty image.
pub fn crop_region(frame: &RgbImage, cx: u32, cy: u32, half_extent: u32) -> RgbImage {
    let (width, height) = frame.dimensions();
    if cx >= width || cy >= height {
        return RgbImage::new(0, 0);
    }

    let x0 = cx.saturating_sub(half_extent);
    let y0 = cy.saturating_sub(half_extent);
    let x1 = cx.saturating_add(half_extent).min(width);
    let y1 = cy.saturating_add(half_extent).min(height);

    imageops::crop_imm(frame, x0, y0, x1 - x0, y1 - y0).to_image()
}

/// Crop a `size`×`size` region at the frame center
pub fn center_region(frame: &RgbImage, size: u32) -> RgbImage {
    let (width, height) = frame.dimensions();
    crop_region(frame, width / 2, height / 2, size / 2)
}

/// Pixels of an image as colors
pub fn pixels(img: &RgbImage) -> Vec<Rgb> {
    img.pixels().map(|p| Rgb::new(p[0], p[1], p[2])).collect()
}

/// Arithmetic mean of the pixels (black for an empty slice)
pub fn mean_color(pixels: &[Rgb]) -> Rgb {
    if pixels.is_empty() {
        return Rgb::BLACK;
    }

    let mut sum = [0u64; 3];
    for p in pixels {
        sum[0] += p.r as u64;
        sum[1] += p.g as u64;
        sum[2] += p.b as u64;
    }

    let n = pixels.len() as f64;
    Rgb::new(
        (sum[0] as f64 / n).round() as u8,
        (sum[1] as f64 / n).round() as u8,
        (sum[2] as f64 / n).round() as u8,
    )
}

/// Cluster pixel colors in RGB space with k-means
///
/// Returns one cluster per centroid, in centroid order.
pub fn cluster_colors(pixels: &[Rgb], params: &KmeansParams) -> Vec<Cluster> {
    if pixels.is_empty() || params.k == 0 {
        return Vec::new();
    }

    let buf: Vec<Srgb> = pixels
        .iter()
        .map(|p| Srgb::new(p.r as f32 / 255.0, p.g as f32 / 255.0, p.b as f32 / 255.0))
        .collect();

    let result = get_kmeans(
        params.k,
        params.max_iter,
        params.converge,
        false,
        &buf,
        params.seed,
    );

    let mut sizes = vec![0usize; result.centroids.len()];
    for &idx in &result.indices {
        if let Some(size) = sizes.get_mut(idx as usize) {
            *size += 1;
        }
    }

    result
        .centroids
        .iter()
        .zip(sizes)
        .map(|(c, size)| Cluster {
            centroid: Rgb::new(unit_to_byte(c.red), unit_to_byte(c.green), unit_to_byte(c.blue)),
            size,
        })
        .collect()
}

#[inline]
fn unit_to_byte(v: f32) -> u8 {
    (v * 255.0).round().clamp(0.0, 255.0) as u8
}

/// Equalize the luminance of an image with CLAHE
///
/// Works on Y of full-range BT.601 YCbCr; Cb and Cr are carried through unchanged.
pub fn equalize_luminance(img: &RgbImage, params: &ClaheParams) -> RgbImage {
    let (width, height) = img.dimensions();
    if width == 0 || height == 0 {
        return img.clone();
    }

    let tiles_x = params.tile_grid.clamp(1, width);
    let tiles_y = params.tile_grid.clamp(1, height);

    // Split into luma and chroma offsets
    let mut luma = Vec::with_capacity((width * height) as usize);
    let mut chroma = Vec::with_capacity((width * height) as usize);
    for p in img.pixels() {
        let (r, g, b) = (p[0] as f32, p[1] as f32, p[2] as f32);
        let y = 0.299 * r + 0.587 * g + 0.114 * b;
        let cb = -0.168736 * r - 0.331264 * g + 0.5 * b;
        let cr = 0.5 * r - 0.418688 * g - 0.081312 * b;
        luma.push(y.round().clamp(0.0, 255.0) as u8);
        chroma.push((cb, cr));
    }

    // Per-tile mapping tables
    let mut luts = Vec::with_capacity((tiles_x * tiles_y) as usize);
    for ty in 0..tiles_y {
        for tx in 0..tiles_x {
            let x0 = tx * width / tiles_x;
            let x1 = (tx + 1) * width / tiles_x;
            let y0 = ty * height / tiles_y;
            let y1 = (ty + 1) * height / tiles_y;
            luts.push(tile_lut(&luma, width, x0, x1, y0, y1, params.clip_limit));
        }
    }

    let tile_w = width as f32 / tiles_x as f32;
    let tile_h = height as f32 / tiles_y as f32;

    let mut output = RgbImage::new(width, height);
    for y in 0..height {
        let (ty0, ty1, wy) = neighbours(y, tile_h, tiles_y);
        for x in 0..width {
            let (tx0, tx1, wx) = neighbours(x, tile_w, tiles_x);
            let idx = (y * width + x) as usize;
            let v = luma[idx] as usize;

            let top = luts[(ty0 * tiles_x + tx0) as usize][v] as f32 * (1.0 - wx)
                + luts[(ty0 * tiles_x + tx1) as usize][v] as f32 * wx;
            let bottom = luts[(ty1 * tiles_x + tx0) as usize][v] as f32 * (1.0 - wx)
                + luts[(ty1 * tiles_x + tx1) as usize][v] as f32 * wx;
            let y_new = (top * (1.0 - wy) + bottom * wy).round();

            let (cb, cr) = chroma[idx];
            let r = y_new + 1.402 * cr;
            let g = y_new - 0.344136 * cb - 0.714136 * cr;
            let b = y_new + 1.772 * cb;
            output.put_pixel(
                x,
                y,
                image::Rgb([
                    r.round().clamp(0.0, 255.0) as u8,
                    g.round().clamp(0.0, 255.0) as u8,
                    b.round().clamp(0.0, 255.0) as u8,
                ]),
            );
        }
    }

    output
}

/// Two nearest tile indices along an axis and the weight of the second
fn neighbours(pos: u32, tile_size: f32, tiles: u32) -> (u32, u32, f32) {
    let f = (pos as f32 + 0.5) / tile_size - 0.5;
    if f <= 0.0 {
        return (0, 0, 0.0);
    }
    let t0 = (f.floor() as u32).min(tiles - 1);
    let t1 = (t0 + 1).min(tiles - 1);
    let w = if t0 == t1 { 0.0 } else { f - t0 as f32 };
    (t0, t1, w)
}

/// Clipped-histogram equalization table for one tile
fn tile_lut(luma: &[u8], width: u32, x0: u32, x1: u32, y0: u32, y1: u32, clip_limit: f32) -> [u8; 256] {
    let mut hist = [0u32; 256];
    for y in y0..y1 {
        let row = (y * width) as usize;
        for x in x0..x1 {
            hist[luma[row + x as usize] as usize] += 1;
        }
    }

    let area = (x1 - x0) * (y1 - y0);
    let clip = ((clip_limit * area as f32 / 256.0) as u32).max(1);

    let mut excess = 0u32;
    for bin in hist.iter_mut() {
        if *bin > clip {
            excess += *bin - clip;
            *bin = clip;
        }
    }

    // Spread the clipped mass evenly, remainder at a fixed stride
    let per_bin = excess / 256;
    let remainder = (excess % 256) as usize;
    for bin in hist.iter_mut() {
        *bin += per_bin;
    }
    if remainder > 0 {
        let stride = (256 / remainder).max(1);
        for bin in hist.iter_mut().step_by(stride).take(remainder) {
            *bin += 1;
        }
    }

    let mut lut = [0u8; 256];
    let mut cdf = 0u32;
    let scale = 255.0 / area.max(1) as f32;
    for (v, bin) in hist.iter().enumerate() {
        cdf += bin;
        lut[v] = (cdf as f32 * scale).round().clamp(0.0, 255.0) as u8;
    }
    lut
}

#[cfg(test)]
mod tests {
    use super::*;

    fn luma_range(img: &RgbImage) -> (u8, u8) {
        let mut min = 255u8;
        let mut max = 0u8;
        for p in img.pixels() {
            let y = (0.299 * p[0] as f32 + 0.587 * p[1] as f32 + 0.114 * p[2] as f32).round() as u8;
            min = min.min(y);
            max = max.max(y);
        }
        (min, max)
    }

    #[test]
    fn test_crop_clamps_to_edges() {
        let frame = RgbImage::new(100, 80);

        assert_eq!(crop_region(&frame, 50, 40, 10).dimensions(), (20, 20));
        // Near the top-left corner the region shrinks
        assert_eq!(crop_region(&frame, 5, 3, 10).dimensions(), (15, 13));
        // Near the bottom-right corner
        assert_eq!(crop_region(&frame, 95, 78, 10).dimensions(), (15, 12));
        // Oversized half-extent covers the frame
        assert_eq!(crop_region(&frame, 50, 40, 1000).dimensions(), (100, 80));
        // Center outside the frame
        assert_eq!(crop_region(&frame, 200, 40, 10).dimensions(), (0, 0));
        // Empty frame
        assert_eq!(center_region(&RgbImage::new(0, 0), 50).dimensions(), (0, 0));
    }

    #[test]
    fn test_mean_color() {
        assert_eq!(mean_color(&[]), Rgb::BLACK);
        let pixels = [Rgb::new(10, 20, 30), Rgb::new(20, 40, 60)];
        assert_eq!(mean_color(&pixels), Rgb::new(15, 30, 45));
    }

    #[test]
    fn test_clahe_expands_low_contrast() {
        let img = RgbImage::from_fn(64, 64, |x, y| {
            let v = 100 + ((x + y) % 11) as u8;
            image::Rgb([v, v, v])
        });
        let (in_min, in_max) = luma_range(&img);
        let out = equalize_luminance(&img, &ClaheParams::default());
        let (out_min, out_max) = luma_range(&out);

        assert!(out_max - out_min > in_max - in_min);
    }

    #[test]
    fn test_clahe_keeps_gray_gray() {
        let img = RgbImage::from_fn(40, 30, |x, y| {
            let v = ((x * 5 + y * 3) % 256) as u8;
            image::Rgb([v, v, v])
        });
        let out = equalize_luminance(&img, &ClaheParams::default());
        for p in out.pixels() {
            assert_eq!(p[0], p[1]);
            assert_eq!(p[1], p[2]);
        }
    }

    #[test]
    fn test_clahe_handles_tiny_regions() {
        let img = RgbImage::from_pixel(3, 2, image::Rgb([200, 10, 10]));
        let out = equalize_luminance(&img, &ClaheParams::default());
        assert_eq!(out.dimensions(), (3, 2));
        let p = out.get_pixel(0, 0);
        // Chroma survives: still clearly red
        assert!(p[0] > p[1] && p[0] > p[2]);
    }

    #[test]
    fn test_cluster_sizes_cover_all_pixels() {
        let mut pixels = vec![Rgb::new(250, 10, 10); 60];
        pixels.extend(vec![Rgb::new(10, 10, 10); 25]);
        pixels.extend(vec![Rgb::new(250, 250, 250); 15]);

        let clusters = cluster_colors(&pixels, &KmeansParams::default());
        assert_eq!(clusters.len(), 3);
        assert_eq!(clusters.iter().map(|c| c.size).sum::<usize>(), pixels.len());

        let largest = clusters.iter().max_by_key(|c| c.size).unwrap();
        assert_eq!(largest.size, 60);
        assert_eq!(largest.centroid, Rgb::new(250, 10, 10));
    }
}
