use serde::{Deserialize, Serialize};

use crate::calibration::Calibration;

/// One published, window-averaged sample.
///
/// This is the unit of the real-time stream to consumers and of the
/// measurement history handed to the export subsystem.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasurementPoint {
    /// Seconds elapsed since acquisition start
    pub timestamp: f64,
    /// Physical angle in degrees, rounded to 2 decimals
    pub angle: f64,
    /// Physical force in kilograms, rounded to 3 decimals
    pub force: f64,
    /// Raw angle average, rounded to the nearest integer
    pub raw_angle: u32,
    /// Raw force average, rounded to the nearest integer
    pub raw_force: u32,
    /// Number of raw samples averaged into this point
    pub samples_count: u32,
}

/// Reference bounds for one channel, as submitted by a transport-layer
/// manual calibration save.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChannelBounds {
    pub raw_min: f64,
    pub raw_max: f64,
    pub real_min: f64,
    pub real_max: f64,
}

/// Calibration status snapshot for transport-layer queries.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CalibrationStatus {
    pub angle_calibrated: bool,
    pub force_calibrated: bool,
    pub calibration: Calibration,
}

/// Counters maintained by the streaming worker, exposed for status queries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AcquisitionStats {
    /// Complete lines extracted from the byte stream
    pub lines_seen: u64,
    /// Frames successfully decoded from those lines
    pub frames_decoded: u64,
    /// Measurement points appended to the history
    pub points_published: u64,
}

/// Classification of a fault absorbed by the streaming loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FaultKind {
    /// Reading from the open serial device failed
    Connection,
    /// Bytes had to be replaced during UTF-8 decoding
    Decode,
    /// Shared session state was unusable for one iteration
    Parse,
}

/// Telemetry event emitted by the acquisition engine.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AcquisitionEvent {
    /// Milliseconds since the engine was created
    pub timestamp_ms: u64,
    pub kind: AcquisitionEventKind,
    pub detail: Option<String>,
}

/// Types of telemetry events supported by the engine.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum AcquisitionEventKind {
    Started { port: String, baud_rate: u32 },
    Stopped,
    StreamFault { kind: FaultKind },
}
