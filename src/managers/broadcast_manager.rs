// BroadcastChannelManager: Centralized tokio broadcast channel management
// Single Responsibility: Broadcast channel lifecycle and subscription

use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;

use crate::api::types::MeasurementPoint;
use crate::calibration::CalibrationProgress;

/// Manages the per-session tokio broadcast channels
///
/// Single Responsibility: Broadcast channel lifecycle and subscription
///
/// This manager centralizes creation, storage, and subscription handling
/// for the channels whose lifetime is bound to a session:
/// - Measurements: the real-time point stream of one acquisition session
/// - Calibration: progress updates of one guided calibration run
///
/// The engine-lifetime telemetry channel lives directly on the engine
/// because it never restarts.
pub struct BroadcastChannelManager {
    measurements: Arc<Mutex<Option<broadcast::Sender<MeasurementPoint>>>>,
    calibration: Arc<Mutex<Option<broadcast::Sender<CalibrationProgress>>>>,
}

impl BroadcastChannelManager {
    /// Create a new BroadcastChannelManager with all channels uninitialized
    pub fn new() -> Self {
        Self {
            measurements: Arc::new(Mutex::new(None)),
            calibration: Arc::new(Mutex::new(None)),
        }
    }

    // ========================================================================
    // MEASUREMENT CHANNEL
    // ========================================================================

    /// Initialize the measurement broadcast channel for a new session
    ///
    /// Returns the sender handed to the streaming worker. Buffer size 100:
    /// at the default 25-sample window the sensor emits a few points per
    /// second, so slow subscribers have seconds of slack before lagging.
    pub fn init_measurements(&self) -> broadcast::Sender<MeasurementPoint> {
        let (tx, _) = broadcast::channel(100);
        *self.measurements.lock().unwrap() = Some(tx.clone());
        tx
    }

    /// Subscribe to the measurement point stream
    ///
    /// # Returns
    /// `None` until the first session initialized the channel.
    pub fn subscribe_measurements(&self) -> Option<broadcast::Receiver<MeasurementPoint>> {
        self.measurements
            .lock()
            .unwrap()
            .as_ref()
            .map(|tx| tx.subscribe())
    }

    // ========================================================================
    // CALIBRATION CHANNEL
    // ========================================================================

    /// Initialize the calibration progress channel for a new procedure
    ///
    /// Buffer size 16: a full run emits one initial snapshot plus one
    /// update per recorded step.
    pub fn init_calibration(&self) -> broadcast::Sender<CalibrationProgress> {
        let (tx, _) = broadcast::channel(16);
        *self.calibration.lock().unwrap() = Some(tx.clone());
        tx
    }

    /// Subscribe to calibration progress updates
    pub fn subscribe_calibration(&self) -> Option<broadcast::Receiver<CalibrationProgress>> {
        self.calibration
            .lock()
            .unwrap()
            .as_ref()
            .map(|tx| tx.subscribe())
    }

    /// Current calibration progress sender, if a procedure initialized one
    pub fn get_calibration_sender(&self) -> Option<broadcast::Sender<CalibrationProgress>> {
        self.calibration.lock().unwrap().clone()
    }
}

impl Default for BroadcastChannelManager {
    fn default() -> Self {
        Self::new()
    }
}
