// Calibration error types and logging helper

use crate::error::ErrorCode;
use log::error;
use std::fmt;

/// Calibration-related errors
///
/// These errors cover the guided calibration procedure, raw sampling, and
/// persistence of the calibration file.
///
/// Error code range: 2001-2007
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CalibrationError {
    /// A calibration procedure is already in progress
    AlreadyInProgress,

    /// No calibration procedure is in progress
    NotInProgress,

    /// A sampling window elapsed without decoding a single frame
    SamplingTimeout { reason: String },

    /// An acquisition session is streaming and holds the serial path
    AcquisitionActive,

    /// Writing the calibration file failed
    StoreWriteFailed { details: String },

    /// Calibration state lock was poisoned
    StatePoisoned,

    /// The serial device could not be opened for sampling
    ConnectionFailed { details: String },
}

impl ErrorCode for CalibrationError {
    fn code(&self) -> i32 {
        match self {
            CalibrationError::AlreadyInProgress => 2001,
            CalibrationError::NotInProgress => 2002,
            CalibrationError::SamplingTimeout { .. } => 2003,
            CalibrationError::AcquisitionActive => 2004,
            CalibrationError::StoreWriteFailed { .. } => 2005,
            CalibrationError::StatePoisoned => 2006,
            CalibrationError::ConnectionFailed { .. } => 2007,
        }
    }

    fn message(&self) -> String {
        match self {
            CalibrationError::AlreadyInProgress => {
                "Calibration already in progress".to_string()
            }
            CalibrationError::NotInProgress => {
                "No calibration in progress. Call start_calibration() first.".to_string()
            }
            CalibrationError::SamplingTimeout { reason } => {
                format!("Sampling produced no frames: {}", reason)
            }
            CalibrationError::AcquisitionActive => {
                "Acquisition is streaming. Stop it before calibrating.".to_string()
            }
            CalibrationError::StoreWriteFailed { details } => {
                format!("Failed to write calibration file: {}", details)
            }
            CalibrationError::StatePoisoned => "Calibration state lock poisoned".to_string(),
            CalibrationError::ConnectionFailed { details } => {
                format!("Could not open the sensor for sampling: {}", details)
            }
        }
    }
}

impl fmt::Display for CalibrationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CalibrationError::{:?} (code {}): {}",
            self,
            self.code(),
            self.message()
        )
    }
}

impl std::error::Error for CalibrationError {}

/// Log a calibration error with structured context
pub fn log_calibration_error(err: &CalibrationError, context: &str) {
    error!(
        "Calibration error in {}: code={}, component=CalibrationProcedure, message={}",
        context,
        err.code(),
        err.message()
    );
}
