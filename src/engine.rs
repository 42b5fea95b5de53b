//! SensorEngine: acquisition orchestration layer.
//!
//! The one controller object behind every consumer-facing operation:
//! device selection, the streaming session lifecycle, window sizing,
//! history access, the guided calibration procedure, and raw sampling.
//! Transport layers (HTTP/WebSocket, CLI) hold a single engine and call
//! into it from their request contexts; the streaming worker is the only
//! other task touching the shared session state.

use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex, RwLock};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use futures::stream::{BoxStream, StreamExt};
use log::info;
use tokio::sync::broadcast;

use crate::acquisition::{
    sample_raw_average, spawn_stream_worker, SamplerSettings, SessionState, WorkerContext,
};
use crate::api::streams::broadcast_stream;
use crate::api::types::{
    AcquisitionEvent, AcquisitionEventKind, AcquisitionStats, CalibrationStatus, ChannelBounds,
    MeasurementPoint,
};
use crate::calibration::{CalibrationProgress, CalibrationStep, CalibrationStore};
use crate::config::{AppConfig, WINDOW_MAX, WINDOW_MIN};
use crate::error::{
    log_acquisition_error, log_calibration_error, AcquisitionError, CalibrationError, ErrorCode,
};
use crate::managers::{BroadcastChannelManager, CalibrationManager};
use crate::serial::{PortOpener, SensorPort, SerialPortOpener};

/// SensorEngine orchestrates the acquisition pipeline and shared channels.
pub struct SensorEngine {
    config: Arc<RwLock<AppConfig>>,
    opener: Arc<dyn PortOpener>,
    session: Arc<SessionState>,
    calibration: CalibrationManager,
    broadcasts: BroadcastChannelManager,
    event_tx: broadcast::Sender<AcquisitionEvent>,
    selected_port: Mutex<Option<String>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    start_instant: Instant,
}

impl SensorEngine {
    /// Create an engine with platform defaults: config and calibration from
    /// the per-user config directory, real serial ports.
    pub fn new() -> Self {
        Self::with_parts(
            AppConfig::load(),
            Arc::new(SerialPortOpener),
            CalibrationStore::open_default(),
        )
    }

    /// Create an engine from explicit parts.
    ///
    /// This is the embedding seam: tests and simulators inject a scripted
    /// `PortOpener` and a store at a scratch path.
    pub fn with_parts(
        config: AppConfig,
        opener: Arc<dyn PortOpener>,
        store: CalibrationStore,
    ) -> Self {
        let window_size = config.acquisition.window_size.clamp(WINDOW_MIN, WINDOW_MAX);
        let (event_tx, _) = broadcast::channel(128);

        Self {
            config: Arc::new(RwLock::new(config)),
            opener,
            session: Arc::new(SessionState::new(window_size)),
            calibration: CalibrationManager::new(store),
            broadcasts: BroadcastChannelManager::new(),
            event_tx,
            selected_port: Mutex::new(None),
            worker: Mutex::new(None),
            start_instant: Instant::now(),
        }
    }

    fn emit_event(&self, kind: AcquisitionEventKind, detail: Option<String>) {
        let timestamp_ms = self.start_instant.elapsed().as_millis() as u64;
        let _ = self.event_tx.send(AcquisitionEvent {
            timestamp_ms,
            kind,
            detail,
        });
    }

    /// Resolve (port, baud rate, read timeout) for the next open.
    fn connection_params(&self) -> Result<(String, u32, Duration), AcquisitionError> {
        let config = self.read_config()?;
        let selected = self
            .selected_port
            .lock()
            .map_err(|_| AcquisitionError::LockPoisoned {
                component: "selected_port".to_string(),
            })?
            .clone();

        Ok((
            selected.unwrap_or_else(|| config.serial.port.clone()),
            config.serial.baud_rate,
            Duration::from_millis(config.serial.read_timeout_ms),
        ))
    }

    fn read_config(&self) -> Result<AppConfig, AcquisitionError> {
        Ok(self
            .config
            .read()
            .map_err(|_| AcquisitionError::LockPoisoned {
                component: "config".to_string(),
            })?
            .clone())
    }

    // ========================================================================
    // DEVICE SELECTION
    // ========================================================================

    /// Validate a device path and remember it for the next session.
    ///
    /// The device is opened briefly and closed again; a running acquisition
    /// is stopped before switching. Open failures carry the classified
    /// connection errors, including the actionable permission message.
    pub fn select_device(&self, port: &str) -> Result<(), AcquisitionError> {
        if self.session.is_active() {
            self.stop_acquisition()?;
        }

        let config = self.read_config()?;
        let timeout = Duration::from_millis(config.serial.read_timeout_ms);
        let probe = self
            .opener
            .open(port, config.serial.baud_rate, timeout)
            .inspect_err(|err| log_acquisition_error(err, "select_device"))?;
        drop(probe);

        *self
            .selected_port
            .lock()
            .map_err(|_| AcquisitionError::LockPoisoned {
                component: "selected_port".to_string(),
            })? = Some(port.to_string());

        info!("[SensorEngine] Device {} selected", port);
        Ok(())
    }

    /// Device the next session will open: explicit selection or config default.
    pub fn current_device(&self) -> Result<String, AcquisitionError> {
        self.connection_params().map(|(port, _, _)| port)
    }

    // ========================================================================
    // ACQUISITION SESSION
    // ========================================================================

    /// Start a streaming session.
    ///
    /// Opens the serial device (Connecting), clears the previous session's
    /// history and accumulators, and hands the connection to the worker
    /// thread (Streaming). Exactly one session may run at a time.
    ///
    /// # Errors
    /// - `AlreadyRunning` if a session is active
    /// - `CalibrationInProgress` if the guided procedure is open
    /// - the classified connection errors when the open fails; the engine
    ///   stays Idle in that case
    pub fn start_acquisition(&self) -> Result<(), AcquisitionError> {
        if self.calibration.in_progress() {
            let err = AcquisitionError::CalibrationInProgress;
            log_acquisition_error(&err, "start_acquisition");
            return Err(err);
        }

        let mut worker_guard =
            self.worker
                .lock()
                .map_err(|_| AcquisitionError::LockPoisoned {
                    component: "worker".to_string(),
                })?;

        if self.session.is_active() {
            let err = AcquisitionError::AlreadyRunning;
            log_acquisition_error(&err, "start_acquisition");
            return Err(err);
        }

        let (port_name, baud_rate, timeout) = self.connection_params()?;
        let config = self.read_config()?;

        // Connecting: failure surfaces here, once per start() call.
        let port = self
            .opener
            .open(&port_name, baud_rate, timeout)
            .inspect_err(|err| log_acquisition_error(err, "start_acquisition"))?;

        // A new session never inherits points or half-filled windows.
        self.session.reset_for_start()?;

        let measurement_tx = self.broadcasts.init_measurements();
        self.session.active.store(true, Ordering::SeqCst);

        let ctx = WorkerContext {
            session: Arc::clone(&self.session),
            calibration: self.calibration.calibration_handle(),
            measurement_tx,
            event_tx: self.event_tx.clone(),
            epoch: self.start_instant,
            poll_interval: Duration::from_millis(config.acquisition.poll_interval_ms),
            error_backoff: Duration::from_millis(config.acquisition.error_backoff_ms),
            max_chunk_bytes: config.acquisition.max_chunk_bytes,
        };
        *worker_guard = Some(spawn_stream_worker(port, ctx));

        self.emit_event(
            AcquisitionEventKind::Started {
                port: port_name.clone(),
                baud_rate,
            },
            None,
        );
        info!(
            "[SensorEngine] Acquisition started on {} @ {} baud",
            port_name, baud_rate
        );
        Ok(())
    }

    /// Request a cooperative stop and wait for the worker to wind down.
    ///
    /// Idempotent and callable from any state; only a Streaming session is
    /// affected. The worker observes the cleared flag within one poll
    /// interval and closes the connection exactly once on its way out,
    /// no matter how many stop calls raced.
    pub fn stop_acquisition(&self) -> Result<(), AcquisitionError> {
        self.session.active.store(false, Ordering::SeqCst);

        let handle = self
            .worker
            .lock()
            .map_err(|_| AcquisitionError::LockPoisoned {
                component: "worker".to_string(),
            })?
            .take();

        if let Some(handle) = handle {
            if handle.join().is_err() {
                // A panicked worker already dropped the connection; the
                // session is down either way.
                log::error!("[SensorEngine] Worker thread panicked before stop");
            }
            info!("[SensorEngine] Acquisition stopped");
        }
        Ok(())
    }

    /// Whether a streaming session is currently running.
    pub fn is_active(&self) -> bool {
        self.session.is_active()
    }

    /// Point-in-time copy of the session history.
    pub fn get_history(&self) -> Result<Vec<MeasurementPoint>, AcquisitionError> {
        self.session.history_snapshot()
    }

    /// Stop any running session and drop all published points.
    pub fn clear_history(&self) -> Result<(), AcquisitionError> {
        if self.session.is_active() {
            self.stop_acquisition()?;
        }
        self.session.clear_history()
    }

    /// Worker counters for status queries.
    pub fn stats(&self) -> Result<AcquisitionStats, AcquisitionError> {
        self.session.stats_snapshot()
    }

    /// Current averaging window size.
    pub fn get_window_size(&self) -> Result<u32, AcquisitionError> {
        Ok(self
            .session
            .accumulator
            .lock()
            .map_err(|_| AcquisitionError::LockPoisoned {
                component: "accumulator".to_string(),
            })?
            .window_size())
    }

    /// Change the averaging window size (1-100).
    ///
    /// Takes effect at the worker's next push; partially accumulated
    /// samples are discarded as part of the same update, so no window
    /// spanning the resize is ever published.
    pub fn set_window_size(&self, window_size: u32) -> Result<(), AcquisitionError> {
        if !(WINDOW_MIN..=WINDOW_MAX).contains(&window_size) {
            let err = AcquisitionError::WindowInvalid { size: window_size };
            log_acquisition_error(&err, "set_window_size");
            return Err(err);
        }

        self.session
            .accumulator
            .lock()
            .map_err(|_| AcquisitionError::LockPoisoned {
                component: "accumulator".to_string(),
            })?
            .set_window_size(window_size);

        info!("[SensorEngine] Averaging window set to {}", window_size);
        Ok(())
    }

    // ========================================================================
    // CALIBRATION
    // ========================================================================

    /// Calibration status snapshot.
    pub fn calibration_status(&self) -> Result<CalibrationStatus, CalibrationError> {
        self.calibration.status()
    }

    /// Replace both channel calibrations from explicit bounds and persist.
    pub fn save_calibration(
        &self,
        angle: ChannelBounds,
        force: ChannelBounds,
    ) -> Result<(), CalibrationError> {
        self.calibration.save_manual(angle, force)
    }

    /// Open the guided calibration procedure.
    ///
    /// The procedure and live streaming share one serial device and must
    /// never run concurrently; starting while a session streams is
    /// rejected, and `start_acquisition` rejects the converse.
    pub fn start_calibration(&self) -> Result<CalibrationProgress, CalibrationError> {
        if self.session.is_active() {
            let err = CalibrationError::AcquisitionActive;
            log_calibration_error(&err, "start_calibration");
            return Err(err);
        }

        let progress = self.calibration.start()?;

        // Initial snapshot so the operator UI can render the first prompt.
        let tx = self.broadcasts.init_calibration();
        let _ = tx.send(progress.clone());

        info!("[SensorEngine] Calibration procedure started");
        Ok(progress)
    }

    /// Step the open procedure is waiting on.
    pub fn calibration_step(&self) -> Result<CalibrationStep, CalibrationError> {
        self.calibration.current_step()
    }

    /// Run the fixed-duration capture for the current step and record it.
    ///
    /// Reuses the worker's read/parse path but bypasses the averaging
    /// window: every raw frame captured within the duration feeds the step
    /// mean. A capture that decodes zero frames aborts with
    /// `SamplingTimeout` and leaves both the store and the step untouched,
    /// so the operator can retry the same step.
    ///
    /// Recording the fourth step finalizes the run: both channels are
    /// replaced atomically and persisted.
    pub fn capture_calibration_step(&self) -> Result<CalibrationProgress, CalibrationError> {
        if self.session.is_active() {
            let err = CalibrationError::AcquisitionActive;
            log_calibration_error(&err, "capture_calibration_step");
            return Err(err);
        }

        let step = self.calibration.current_step()?;
        let config = self
            .read_config()
            .map_err(|_| CalibrationError::StatePoisoned)?;
        let duration = Duration::from_millis(config.calibration.step_sample_ms);

        info!(
            "[SensorEngine] Capturing {} for {} ms",
            step.display_name(),
            duration.as_millis()
        );

        let (raw_angle_avg, raw_force_avg) = self
            .sample_with_open_port(duration, &config)
            .inspect_err(|err| log_calibration_error(err, "capture_calibration_step"))?;

        let progress = self.calibration.record_step_sample(raw_angle_avg, raw_force_avg)?;

        if let Some(tx) = self.broadcasts.get_calibration_sender() {
            let _ = tx.send(progress.clone());
        }

        Ok(progress)
    }

    /// Abandon the open procedure without touching the stored calibration.
    pub fn cancel_calibration(&self) -> Result<(), CalibrationError> {
        self.calibration.cancel()
    }

    /// Capture raw channel averages over a fixed duration.
    ///
    /// The ad-hoc probe behind the transport's `sample_raw` operation,
    /// using the config default duration when none is given. Rejected
    /// while a session streams: the device only supports one reader.
    pub fn sample_raw(&self, duration: Option<Duration>) -> Result<(f64, f64), CalibrationError> {
        if self.session.is_active() {
            let err = CalibrationError::AcquisitionActive;
            log_calibration_error(&err, "sample_raw");
            return Err(err);
        }

        let config = self
            .read_config()
            .map_err(|_| CalibrationError::StatePoisoned)?;
        let duration =
            duration.unwrap_or_else(|| Duration::from_millis(config.calibration.adhoc_sample_ms));

        self.sample_with_open_port(duration, &config)
            .inspect_err(|err| log_calibration_error(err, "sample_raw"))
    }

    /// Open the configured device and run one fixed-duration capture.
    fn sample_with_open_port(
        &self,
        duration: Duration,
        config: &AppConfig,
    ) -> Result<(f64, f64), CalibrationError> {
        let (port_name, baud_rate, timeout) = self
            .connection_params()
            .map_err(|err| CalibrationError::ConnectionFailed {
                details: err.message(),
            })?;

        let mut port: Box<dyn SensorPort> = self
            .opener
            .open(&port_name, baud_rate, timeout)
            .map_err(|err| CalibrationError::ConnectionFailed {
                details: err.message(),
            })?;

        let settings = SamplerSettings {
            duration,
            poll_interval: Duration::from_millis(config.acquisition.poll_interval_ms),
            error_backoff: Duration::from_millis(config.acquisition.error_backoff_ms),
            max_chunk_bytes: config.acquisition.max_chunk_bytes,
        };
        sample_raw_average(port.as_mut(), &settings)
    }

    // ========================================================================
    // STREAMS
    // ========================================================================

    /// Subscribe to the real-time measurement point stream.
    ///
    /// Returns `None` before the first session initialized the channel.
    pub fn subscribe_measurements(&self) -> Option<broadcast::Receiver<MeasurementPoint>> {
        self.broadcasts.subscribe_measurements()
    }

    /// Measurement points as a `futures::Stream`.
    ///
    /// Empty stream before the first session; ends when the session's
    /// channel is replaced by the next start.
    pub fn measurement_stream(&self) -> BoxStream<'static, MeasurementPoint> {
        match self.broadcasts.subscribe_measurements() {
            Some(rx) => broadcast_stream(rx).boxed(),
            None => futures::stream::empty().boxed(),
        }
    }

    /// Subscribe to calibration progress updates.
    pub fn subscribe_calibration(&self) -> Option<broadcast::Receiver<CalibrationProgress>> {
        self.broadcasts.subscribe_calibration()
    }

    /// Subscribe to engine telemetry events.
    pub fn subscribe_events(&self) -> broadcast::Receiver<AcquisitionEvent> {
        self.event_tx.subscribe()
    }
}

impl Default for SensorEngine {
    fn default() -> Self {
        Self::new()
    }
}
