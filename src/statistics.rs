//! Burst statistics over ADC codes.
//!
//! Calibration takes bursts of a few hundred conversions per channel. Readings
//! are 13 bit integers, so the moments are accumulated exactly in integer
//! arithmetic, relative to the first reading, and only finalized in `f32`.

use num_traits::Float;
use serde::Serialize;

/// Mean, peak-to-peak and standard deviation of a sample burst, in ADC codes.
#[derive(Serialize, Copy, Clone, Debug, PartialEq)]
pub struct Statistics {
    pub mean: f32,
    pub ptp: f32,
    pub std: f32,
}

impl From<Buffer> for Option<Statistics> {
    /// `None` if no reading was added.
    fn from(buff: Buffer) -> Self {
        let (lowest, highest) = buff.span?;
        let n = buff.count as f32;
        let mean = buff.sum as f32 / n;
        let var = buff.sum_sq as f32 / n - mean * mean;
        Some(Statistics {
            mean: buff.first as f32 + mean,
            ptp: (highest - lowest) as f32,
            std: Float::sqrt(var.max(0.0)),
        })
    }
}

#[derive(Copy, Clone, Debug, Default)]
pub struct Buffer {
    /// Lowest and highest reading.
    span: Option<(i32, i32)>,
    first: i32,
    sum: i64,
    sum_sq: i64,
    count: u32,
}

impl Buffer {
    pub fn update(&mut self, code: i32) {
        self.span = Some(match self.span {
            None => {
                self.first = code;
                (code, code)
            }
            Some((lo, hi)) => (lo.min(code), hi.max(code)),
        });
        let d = i64::from(code - self.first);
        self.sum += d;
        self.sum_sq += d * d;
        self.count += 1;
    }

    pub fn count(&self) -> u32 {
        self.count
    }
}
