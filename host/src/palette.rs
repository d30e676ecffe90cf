//! Multi-point palette construction
//!
//! A grid of sample points is laid over the frame. Each point yields one color; the
//! colors are merged by perceptual distance and ranked by how many points saw them.

use serde::Serialize;
use utoipa::ToSchema;

use crate::colorspace::{Lab, Rgb};
use crate::delta_e::delta_e_2000;

/// Row and column of a grid sample point
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
pub struct GridPosition {
    pub row: usize,
    pub col: usize,
}

/// A sample point in pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridPoint {
    pub x: u32,
    pub y: u32,
    pub position: GridPosition,
}

/// The color observed at one grid point
#[derive(Debug, Clone, PartialEq)]
pub struct GridColor {
    pub rgb: Rgb,
    pub lab: Lab,
    pub name: String,
    pub position: GridPosition,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct PaletteEntry {
    pub rgb: Rgb,
    pub hex: String,
    pub name: String,
    pub lab: Lab,
    /// Number of grid points merged into this entry
    pub count: usize,
    /// Grid point that first contributed this entry
    pub position: GridPosition,
}

/// Lay an `n`×`n` grid over a frame, row-major
///
/// Points are evenly spaced between `margin` and `1 - margin` of each axis, ends
/// included. A single point sits at the frame center.
pub fn grid_points(width: u32, height: u32, n: usize, margin: f64) -> Vec<GridPoint> {
    if n == 0 || width == 0 || height == 0 {
        return Vec::new();
    }

    let coord = |i: usize, extent: u32| -> u32 {
        let frac = if n == 1 {
            0.5
        } else {
            margin + (1.0 - 2.0 * margin) * i as f64 / (n - 1) as f64
        };
        ((frac * extent as f64) as u32).min(extent - 1)
    };

    let mut points = Vec::with_capacity(n * n);
    for row in 0..n {
        for col in 0..n {
            points.push(GridPoint {
                x: coord(col, width),
                y: coord(row, height),
                position: GridPosition { row, col },
            });
        }
    }
    points
}

/// Merges grid colors into a ranked palette
#[derive(Debug, Clone, Copy)]
pub struct PaletteBuilder {
    pub threshold: f64,
    pub max_entries: usize,
}

impl Default for PaletteBuilder {
    fn default() -> Self {
        Self {
            threshold: 10.0,
            max_entries: 8,
        }
    }
}

impl PaletteBuilder {
    pub fn new(threshold: f64, max_entries: usize) -> Self {
        Self {
            threshold,
            max_entries,
        }
    }

    /// Build the palette from colors in grid order
    ///
    /// A color within `threshold` of an accepted entry bumps the count of the first
    /// such entry; otherwise it becomes a new entry. Entries are then ordered by
    /// descending count (grid order on ties) and capped at `max_entries`.
    pub fn build(&self, colors: &[GridColor]) -> Vec<PaletteEntry> {
        let mut entries: Vec<PaletteEntry> = Vec::new();

        for color in colors {
            let existing = entries
                .iter_mut()
                .find(|e| delta_e_2000(color.lab, e.lab) <= self.threshold);

            match existing {
                Some(entry) => entry.count += 1,
                None => entries.push(PaletteEntry {
                    rgb: color.rgb,
                    hex: color.rgb.to_hex(),
                    name: color.name.clone(),
                    lab: color.lab,
                    count: 1,
                    position: color.position,
                }),
            }
        }

        entries.sort_by(|a, b| b.count.cmp(&a.count));
        entries.truncate(self.max_entries);
        entries
    }
}
