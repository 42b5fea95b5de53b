//! AveragingAccumulator - reduces raw frames to windowed measurement points
//!
//! Samples are appended pairwise (angle and force component together) so
//! the two buffers always hold the same count. When the buffer reaches the
//! configured window size the accumulator flushes: arithmetic means of the
//! four quantities, field-precision rounding, and a timestamp stamped by
//! the caller as elapsed time since acquisition start.

use crate::api::types::MeasurementPoint;

/// One calibrated sample ready for accumulation.
#[derive(Debug, Clone, Copy)]
pub struct DecodedSample {
    pub raw_angle: u32,
    pub raw_force: u32,
    pub angle_deg: f64,
    pub force_kg: f64,
}

/// Per-channel sample pair held until the window fills.
#[derive(Debug, Clone, Copy)]
struct AngleSample {
    angle_deg: f64,
    raw_angle: u32,
}

#[derive(Debug, Clone, Copy)]
struct ForceSample {
    force_kg: f64,
    raw_force: u32,
}

/// Collects raw samples and emits one averaged point per full window.
#[derive(Debug)]
pub struct AveragingAccumulator {
    window_size: usize,
    angles: Vec<AngleSample>,
    forces: Vec<ForceSample>,
}

impl AveragingAccumulator {
    /// Create an accumulator for the given window size (>= 1).
    pub fn new(window_size: u32) -> Self {
        Self {
            window_size: window_size.max(1) as usize,
            angles: Vec::new(),
            forces: Vec::new(),
        }
    }

    pub fn window_size(&self) -> u32 {
        self.window_size as u32
    }

    /// Change the window size, discarding any partially filled window.
    ///
    /// A resize never reinterprets already-buffered samples against the new
    /// size; the clear and the size change happen under the same borrow so
    /// no partial window spanning the resize can ever flush.
    pub fn set_window_size(&mut self, window_size: u32) {
        self.window_size = window_size.max(1) as usize;
        self.clear();
    }

    /// Drop all buffered samples.
    pub fn clear(&mut self) {
        self.angles.clear();
        self.forces.clear();
    }

    /// Number of samples buffered toward the next point.
    pub fn pending(&self) -> usize {
        self.angles.len()
    }

    /// Append one sample; returns the averaged point when the window fills.
    ///
    /// # Arguments
    /// * `sample` - calibrated sample to buffer
    /// * `elapsed_secs` - seconds since acquisition start, stamped onto the
    ///   emitted point
    pub fn push(&mut self, sample: DecodedSample, elapsed_secs: f64) -> Option<MeasurementPoint> {
        self.angles.push(AngleSample {
            angle_deg: sample.angle_deg,
            raw_angle: sample.raw_angle,
        });
        self.forces.push(ForceSample {
            force_kg: sample.force_kg,
            raw_force: sample.raw_force,
        });

        if self.angles.len() >= self.window_size {
            Some(self.flush(elapsed_secs))
        } else {
            None
        }
    }

    fn flush(&mut self, elapsed_secs: f64) -> MeasurementPoint {
        let count = self.angles.len();
        let n = count as f64;

        let avg_angle = self.angles.iter().map(|s| s.angle_deg).sum::<f64>() / n;
        let avg_force = self.forces.iter().map(|s| s.force_kg).sum::<f64>() / n;
        let avg_raw_angle = self.angles.iter().map(|s| s.raw_angle as f64).sum::<f64>() / n;
        let avg_raw_force = self.forces.iter().map(|s| s.raw_force as f64).sum::<f64>() / n;

        let point = MeasurementPoint {
            timestamp: elapsed_secs,
            angle: round_to(avg_angle, 2),
            force: round_to(avg_force, 3),
            raw_angle: avg_raw_angle.round() as u32,
            raw_force: avg_raw_force.round() as u32,
            samples_count: count as u32,
        };

        self.clear();
        point
    }
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}
