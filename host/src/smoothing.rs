//! Exponential moving average over LAB samples

use crate::colorspace::Lab;

/// One smoothing stream
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TemporalSmoother {
    alpha: f64,
    prev_lab: Option<Lab>,
}

impl TemporalSmoother {
    pub fn new(alpha: f64) -> Self {
        Self {
            alpha: alpha.clamp(0.0, 1.0),
            prev_lab: None,
        }
    }

    pub fn current(&self) -> Option<Lab> {
        self.prev_lab
    }

    /// Blend a new sample in; the first sample seeds the stream unblended
    pub fn update(&mut self, sample: Lab) -> Lab {
        let next = match self.prev_lab {
            None => sample,
            Some(prev) => {
                let keep = 1.0 - self.alpha;
                Lab::new(
                    prev.l * keep + sample.l * self.alpha,
                    prev.a * keep + sample.a * self.alpha,
                    prev.b * keep + sample.b * self.alpha,
                )
            }
        };
        self.prev_lab = Some(next);
        next
    }

    pub fn reset(&mut self) {
        self.prev_lab = None;
    }
}
