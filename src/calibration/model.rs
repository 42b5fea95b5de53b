// Calibration model - linear raw-to-physical conversion per channel
//
// Each channel maps two raw reference readings (raw_min, raw_max) onto two
// physical-unit bounds (real_min, real_max). Conversion is a plain linear
// interpolation and deliberately does NOT clamp: raw input outside the
// reference span extrapolates past the physical bounds.

use serde::{Deserialize, Serialize};

// Factory defaults captured against the reference sensor. The raw bounds are
// fractional because they were recorded as multi-second averages of the raw
// stream, not single ADC codes; they must not be rounded.
pub const DEFAULT_ANGLE_RAW_MIN: f64 = 1019.3323053199691;
pub const DEFAULT_ANGLE_RAW_MAX: f64 = 705.540192926045;
pub const DEFAULT_FORCE_RAW_MIN: f64 = 23.444794952681388;
pub const DEFAULT_FORCE_RAW_MAX: f64 = 55.96846254927727;

/// Physical bounds of the angle channel in degrees.
pub const ANGLE_REAL_MIN: f64 = 0.0;
pub const ANGLE_REAL_MAX: f64 = 45.0;

/// Physical bounds of the force channel in kilograms.
pub const FORCE_REAL_MIN: f64 = 0.0;
pub const FORCE_REAL_MAX: f64 = 1.0;

// Fallback scales used when a channel has never been calibrated, matching
// the sensor's 10-bit ADC full-scale interpretation.
const UNCALIBRATED_ANGLE_SCALE: f64 = 360.0 / 1023.0;
const UNCALIBRATED_FORCE_SCALE: f64 = 1.0 / 1023.0;

/// Linear calibration for one physical channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelCalibration {
    pub raw_min: f64,
    pub raw_max: f64,
    pub real_min: f64,
    pub real_max: f64,
    pub calibrated: bool,
}

impl ChannelCalibration {
    /// Apply the linear map of this channel to a raw reading.
    ///
    /// With a zero raw span the map degenerates to `real_min` for any input
    /// so the division can never blow up.
    fn linear(&self, raw: f64) -> f64 {
        if self.raw_max == self.raw_min {
            return self.real_min;
        }
        let ratio = (raw - self.raw_min) / (self.raw_max - self.raw_min);
        self.real_min + ratio * (self.real_max - self.real_min)
    }
}

/// Two-channel calibration as persisted on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Calibration {
    pub angle: ChannelCalibration,
    pub force: ChannelCalibration,
}

impl Calibration {
    /// Factory defaults validated against the reference sensor.
    ///
    /// Both channels ship pre-calibrated so a fresh installation produces
    /// sensible physical values out of the box.
    pub fn factory_default() -> Self {
        Self {
            angle: ChannelCalibration {
                raw_min: DEFAULT_ANGLE_RAW_MIN,
                raw_max: DEFAULT_ANGLE_RAW_MAX,
                real_min: ANGLE_REAL_MIN,
                real_max: ANGLE_REAL_MAX,
                calibrated: true,
            },
            force: ChannelCalibration {
                raw_min: DEFAULT_FORCE_RAW_MIN,
                raw_max: DEFAULT_FORCE_RAW_MAX,
                real_min: FORCE_REAL_MIN,
                real_max: FORCE_REAL_MAX,
                calibrated: true,
            },
        }
    }

    /// Convert one raw reading pair to physical units.
    ///
    /// # Arguments
    /// * `raw_angle` - raw angle-channel reading
    /// * `raw_force` - raw force-channel reading
    ///
    /// # Returns
    /// `(angle_deg, force_kg)` - unclamped physical values
    pub fn convert(&self, raw_angle: f64, raw_force: f64) -> (f64, f64) {
        let angle_deg = if self.angle.calibrated {
            self.angle.linear(raw_angle)
        } else {
            raw_angle * UNCALIBRATED_ANGLE_SCALE
        };

        let force_kg = if self.force.calibrated {
            self.force.linear(raw_force)
        } else {
            raw_force * UNCALIBRATED_FORCE_SCALE
        };

        (angle_deg, force_kg)
    }
}

impl Default for Calibration {
    fn default() -> Self {
        Self::factory_default()
    }
}
