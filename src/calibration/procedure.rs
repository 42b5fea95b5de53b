// CalibrationProcedure - guided reference capture workflow
//
// The procedure walks the operator through four sampling steps, two per
// channel. Each step records the mean raw reading of a fixed-duration
// capture; the finished procedure yields a full two-channel calibration
// with the physical bounds pinned to the bench references (0-45 deg,
// 0-1 kg).

use serde::{Deserialize, Serialize};

use crate::calibration::model::{
    Calibration, ChannelCalibration, ANGLE_REAL_MAX, ANGLE_REAL_MIN, FORCE_REAL_MAX,
    FORCE_REAL_MIN,
};
use crate::error::CalibrationError;

/// One sampling step of the guided procedure, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CalibrationStep {
    /// Device held at the 0-degree reference position
    AngleZero,
    /// Device held at the 45-degree reference position
    AngleSpan,
    /// Sensor unloaded
    ForceZero,
    /// Exactly one unit mass (1 kg) on the sensor
    ForceUnit,
}

impl CalibrationStep {
    /// Total number of steps in the procedure.
    pub const COUNT: u8 = 4;

    /// The step following this one, or `None` after the last.
    pub fn next(&self) -> Option<CalibrationStep> {
        match self {
            CalibrationStep::AngleZero => Some(CalibrationStep::AngleSpan),
            CalibrationStep::AngleSpan => Some(CalibrationStep::ForceZero),
            CalibrationStep::ForceZero => Some(CalibrationStep::ForceUnit),
            CalibrationStep::ForceUnit => None,
        }
    }

    /// Zero-based position in the sequence.
    pub fn index(&self) -> u8 {
        match self {
            CalibrationStep::AngleZero => 0,
            CalibrationStep::AngleSpan => 1,
            CalibrationStep::ForceZero => 2,
            CalibrationStep::ForceUnit => 3,
        }
    }

    /// Short name for logs and progress displays.
    pub fn display_name(&self) -> &'static str {
        match self {
            CalibrationStep::AngleZero => "angle reference 0 deg",
            CalibrationStep::AngleSpan => "angle reference 45 deg",
            CalibrationStep::ForceZero => "force reference empty",
            CalibrationStep::ForceUnit => "force reference 1 kg",
        }
    }

    /// Operator instruction shown before the step's capture runs.
    pub fn instruction(&self) -> &'static str {
        match self {
            CalibrationStep::AngleZero => "Place the device at 0 deg (reference position)",
            CalibrationStep::AngleSpan => "Place the device at 45 deg",
            CalibrationStep::ForceZero => "Remove all weight from the sensor",
            CalibrationStep::ForceUnit => "Place exactly 1 kg on the sensor",
        }
    }
}

/// Progress snapshot for the current procedure.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CalibrationProgress {
    /// Next step awaiting capture, `None` once all four are recorded
    pub current_step: Option<CalibrationStep>,
    /// Steps already recorded (0-4)
    pub steps_completed: u8,
    /// Total steps in the procedure
    pub steps_total: u8,
}

impl CalibrationProgress {
    /// True once every step has been recorded.
    pub fn is_complete(&self) -> bool {
        self.steps_completed >= self.steps_total
    }
}

/// Collects the four mean raw references of a calibration run.
#[derive(Debug, Default)]
pub struct CalibrationProcedure {
    angle_zero: Option<f64>,
    angle_span: Option<f64>,
    force_zero: Option<f64>,
    force_unit: Option<f64>,
}

impl CalibrationProcedure {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next step awaiting capture, `None` when the procedure is complete.
    pub fn current_step(&self) -> Option<CalibrationStep> {
        if self.angle_zero.is_none() {
            Some(CalibrationStep::AngleZero)
        } else if self.angle_span.is_none() {
            Some(CalibrationStep::AngleSpan)
        } else if self.force_zero.is_none() {
            Some(CalibrationStep::ForceZero)
        } else if self.force_unit.is_none() {
            Some(CalibrationStep::ForceUnit)
        } else {
            None
        }
    }

    /// Progress snapshot for broadcast to the operator UI.
    pub fn progress(&self) -> CalibrationProgress {
        let steps_completed = [
            self.angle_zero,
            self.angle_span,
            self.force_zero,
            self.force_unit,
        ]
        .iter()
        .filter(|slot| slot.is_some())
        .count() as u8;

        CalibrationProgress {
            current_step: self.current_step(),
            steps_completed,
            steps_total: CalibrationStep::COUNT,
        }
    }

    /// Record the mean raw readings of one capture and advance.
    ///
    /// Angle steps keep the angle mean, force steps the force mean; the
    /// other channel's reading of the capture is discarded.
    ///
    /// # Returns
    /// Progress after recording, or `NotInProgress` when all steps are
    /// already recorded.
    pub fn record_sample(
        &mut self,
        raw_angle_avg: f64,
        raw_force_avg: f64,
    ) -> Result<CalibrationProgress, CalibrationError> {
        match self.current_step() {
            Some(CalibrationStep::AngleZero) => self.angle_zero = Some(raw_angle_avg),
            Some(CalibrationStep::AngleSpan) => self.angle_span = Some(raw_angle_avg),
            Some(CalibrationStep::ForceZero) => self.force_zero = Some(raw_force_avg),
            Some(CalibrationStep::ForceUnit) => self.force_unit = Some(raw_force_avg),
            None => return Err(CalibrationError::NotInProgress),
        }
        Ok(self.progress())
    }

    /// True once every step has been recorded.
    pub fn is_complete(&self) -> bool {
        self.current_step().is_none()
    }

    /// Build the calibration from the recorded references.
    ///
    /// The physical bounds are fixed by the bench setup: 0/45 degrees for
    /// the angle channel, 0/1 kg for the force channel.
    pub fn finalize(self) -> Result<Calibration, CalibrationError> {
        let (Some(angle_zero), Some(angle_span), Some(force_zero), Some(force_unit)) = (
            self.angle_zero,
            self.angle_span,
            self.force_zero,
            self.force_unit,
        ) else {
            return Err(CalibrationError::NotInProgress);
        };

        Ok(Calibration {
            angle: ChannelCalibration {
                raw_min: angle_zero,
                raw_max: angle_span,
                real_min: ANGLE_REAL_MIN,
                real_max: ANGLE_REAL_MAX,
                calibrated: true,
            },
            force: ChannelCalibration {
                raw_min: force_zero,
                raw_max: force_unit,
                real_min: FORCE_REAL_MIN,
                real_max: FORCE_REAL_MAX,
                calibrated: true,
            },
        })
    }
}
