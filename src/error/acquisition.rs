// Acquisition error types and logging helper

use crate::error::ErrorCode;
use log::error;
use std::fmt;

/// Acquisition-related errors
///
/// These errors cover the serial connection lifecycle, the streaming session
/// state machine, and session parameter validation.
///
/// Error code range: 1001-1009
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AcquisitionError {
    /// Averaging window size is out of range (must be 1-100)
    WindowInvalid { size: u32 },

    /// An acquisition session is already streaming
    AlreadyRunning,

    /// No acquisition session is streaming
    NotRunning,

    /// The serial device does not exist
    DeviceNotFound { port: String },

    /// Opening the serial device was refused by the OS
    PermissionDenied { port: String },

    /// The serial device is held by another process
    DeviceBusy { port: String },

    /// The serial device could not be opened for another reason
    OpenFailed { port: String, details: String },

    /// Mutex/RwLock was poisoned
    LockPoisoned { component: String },

    /// The guided calibration procedure currently holds the serial path
    CalibrationInProgress,
}

impl ErrorCode for AcquisitionError {
    fn code(&self) -> i32 {
        match self {
            AcquisitionError::WindowInvalid { .. } => 1001,
            AcquisitionError::AlreadyRunning => 1002,
            AcquisitionError::NotRunning => 1003,
            AcquisitionError::DeviceNotFound { .. } => 1004,
            AcquisitionError::PermissionDenied { .. } => 1005,
            AcquisitionError::DeviceBusy { .. } => 1006,
            AcquisitionError::OpenFailed { .. } => 1007,
            AcquisitionError::LockPoisoned { .. } => 1008,
            AcquisitionError::CalibrationInProgress => 1009,
        }
    }

    fn message(&self) -> String {
        match self {
            AcquisitionError::WindowInvalid { size } => {
                format!("Averaging window must be between 1 and 100 (got {})", size)
            }
            AcquisitionError::AlreadyRunning => {
                "Acquisition already running. Call stop_acquisition() first.".to_string()
            }
            AcquisitionError::NotRunning => {
                "Acquisition not running. Call start_acquisition() first.".to_string()
            }
            AcquisitionError::DeviceNotFound { port } => {
                format!("Serial device {} not found", port)
            }
            AcquisitionError::PermissionDenied { port } => {
                format!(
                    "Permission denied opening {}. Add your user to the dialout group (or its \
                     platform equivalent) and reconnect.",
                    port
                )
            }
            AcquisitionError::DeviceBusy { port } => {
                format!("Serial device {} is busy (held by another application)", port)
            }
            AcquisitionError::OpenFailed { port, details } => {
                format!("Failed to open serial device {}: {}", port, details)
            }
            AcquisitionError::LockPoisoned { component } => {
                format!("Lock poisoned for component: {}", component)
            }
            AcquisitionError::CalibrationInProgress => {
                "Calibration procedure is using the sensor. Finish or cancel it first.".to_string()
            }
        }
    }
}

impl fmt::Display for AcquisitionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "AcquisitionError::{:?} (code {}): {}",
            self,
            self.code(),
            self.message()
        )
    }
}

impl std::error::Error for AcquisitionError {}

/// Log an acquisition error with structured context
///
/// Logs the numeric error code alongside the message so transport layers
/// and operators can correlate failures without parsing free text.
pub fn log_acquisition_error(err: &AcquisitionError, context: &str) {
    error!(
        "Acquisition error in {}: code={}, component=SensorEngine, message={}",
        context,
        err.code(),
        err.message()
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acquisition_error_codes() {
        assert_eq!(AcquisitionError::WindowInvalid { size: 0 }.code(), 1001);
        assert_eq!(AcquisitionError::AlreadyRunning.code(), 1002);
        assert_eq!(AcquisitionError::NotRunning.code(), 1003);
        assert_eq!(
            AcquisitionError::DeviceNotFound {
                port: "/dev/ttyUSB0".to_string()
            }
            .code(),
            1004
        );
        assert_eq!(
            AcquisitionError::PermissionDenied {
                port: "/dev/ttyUSB0".to_string()
            }
            .code(),
            1005
        );
        assert_eq!(
            AcquisitionError::DeviceBusy {
                port: "/dev/ttyUSB0".to_string()
            }
            .code(),
            1006
        );
        assert_eq!(
            AcquisitionError::OpenFailed {
                port: "/dev/ttyUSB0".to_string(),
                details: "test".to_string()
            }
            .code(),
            1007
        );
        assert_eq!(
            AcquisitionError::LockPoisoned {
                component: "test".to_string()
            }
            .code(),
            1008
        );
        assert_eq!(AcquisitionError::CalibrationInProgress.code(), 1009);
    }

    #[test]
    fn test_acquisition_error_messages() {
        let err = AcquisitionError::WindowInvalid { size: 500 };
        assert!(err.message().contains("between 1 and 100"));
        assert!(err.message().contains("500"));

        let err = AcquisitionError::PermissionDenied {
            port: "/dev/ttyACM0".to_string(),
        };
        assert!(err.message().contains("/dev/ttyACM0"));
        assert!(err.message().contains("dialout"));

        let err = AcquisitionError::DeviceBusy {
            port: "COM3".to_string(),
        };
        assert!(err.message().contains("COM3"));
    }

    #[test]
    fn test_error_propagation() {
        fn may_fail() -> Result<(), AcquisitionError> {
            Err(AcquisitionError::NotRunning)
        }

        fn caller() -> Result<(), AcquisitionError> {
            may_fail()?;
            Ok(())
        }

        assert!(caller().is_err());
    }
}
