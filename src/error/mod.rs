// Error types for the MEVEM acquisition core
//
// This module defines custom error types for acquisition and calibration
// operations, providing structured error handling with stable numeric codes
// for the transport layer that sits on top of this crate.

mod acquisition;
mod calibration;

pub use acquisition::{log_acquisition_error, AcquisitionError};
pub use calibration::{log_calibration_error, CalibrationError};

/// Error codes for structured error reporting
///
/// This trait provides a standard way to get error codes and messages
/// from custom error types, enabling consistent error handling across
/// the transport boundary.
pub trait ErrorCode {
    /// Get the numeric error code
    fn code(&self) -> i32;

    /// Get the human-readable error message
    fn message(&self) -> String;
}
