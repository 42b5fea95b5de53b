// Streaming worker and raw sampler
//
// One background thread owns the open serial connection for the lifetime of
// a session: Idle -> Connecting (done by the engine before spawn) ->
// Streaming (this loop) -> Stopping (flag observed, connection dropped) ->
// Idle. Faults inside one poll iteration are absorbed, classified, and
// followed by a short backoff; only the cleared active flag ends the loop.
//
// The raw sampler below reuses the identical read/parse path for the
// fixed-duration captures of the calibration procedure, bypassing the
// averaging window.

use std::io;
use std::sync::{Arc, RwLock};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use tokio::sync::broadcast;

use crate::acquisition::accumulator::DecodedSample;
use crate::acquisition::session::SessionState;
use crate::api::types::{AcquisitionEvent, AcquisitionEventKind, FaultKind, MeasurementPoint};
use crate::calibration::Calibration;
use crate::error::CalibrationError;
use crate::protocol::{parse_line, LineBuffer};
use crate::serial::SensorPort;

/// Everything the streaming thread needs, bundled at spawn time.
pub struct WorkerContext {
    pub session: Arc<SessionState>,
    pub calibration: Arc<RwLock<Calibration>>,
    pub measurement_tx: broadcast::Sender<MeasurementPoint>,
    pub event_tx: broadcast::Sender<AcquisitionEvent>,
    /// Engine creation instant; telemetry timestamps are relative to it
    pub epoch: Instant,
    pub poll_interval: Duration,
    pub error_backoff: Duration,
    pub max_chunk_bytes: usize,
}

/// Spawn the streaming thread for an already-open connection.
///
/// The thread owns the port; dropping it on loop exit closes the
/// connection exactly once regardless of how many stop requests raced.
pub fn spawn_stream_worker(port: Box<dyn SensorPort>, ctx: WorkerContext) -> JoinHandle<()> {
    thread::spawn(move || {
        let mut port = port;
        stream_loop(port.as_mut(), &ctx);
    })
}

fn stream_loop(port: &mut dyn SensorPort, ctx: &WorkerContext) {
    let session_start = Instant::now();
    let mut line_buf = LineBuffer::new();
    let mut chunk = vec![0u8; ctx.max_chunk_bytes.max(1)];

    debug!("[worker] Streaming loop entered");

    while ctx.session.is_active() {
        match poll_once(port, &mut line_buf, &mut chunk, ctx, session_start) {
            Ok(()) => thread::sleep(ctx.poll_interval),
            Err(fault) => {
                warn!(
                    "[worker] {:?} fault absorbed, continuing: {}",
                    fault.kind, fault.detail
                );
                emit_event(
                    ctx,
                    AcquisitionEventKind::StreamFault { kind: fault.kind },
                    Some(fault.detail),
                );
                thread::sleep(ctx.error_backoff);
            }
        }
    }

    info!("[worker] Stop observed, closing connection");
    emit_event(ctx, AcquisitionEventKind::Stopped, None);
}

/// A fault absorbed by one poll iteration.
struct StreamFault {
    kind: FaultKind,
    detail: String,
}

fn poll_once(
    port: &mut dyn SensorPort,
    line_buf: &mut LineBuffer,
    chunk: &mut [u8],
    ctx: &WorkerContext,
    session_start: Instant,
) -> Result<(), StreamFault> {
    let read = read_available(port, chunk).map_err(|err| StreamFault {
        kind: FaultKind::Connection,
        detail: err.to_string(),
    })?;
    if read == 0 {
        return Ok(());
    }

    let clean = line_buf.extend_lossy(&chunk[..read]);
    if !clean {
        // Replaced bytes spoil at most the line they landed in; classify
        // without interrupting the stream.
        debug!("[worker] Invalid UTF-8 replaced in incoming chunk");
        emit_event(
            ctx,
            AcquisitionEventKind::StreamFault {
                kind: FaultKind::Decode,
            },
            None,
        );
    }

    drain_lines(line_buf, ctx, session_start)
}

/// Parse every complete buffered line and run its frames through the
/// accumulator, publishing whatever points flush out.
fn drain_lines(
    line_buf: &mut LineBuffer,
    ctx: &WorkerContext,
    session_start: Instant,
) -> Result<(), StreamFault> {
    let calibration = ctx
        .calibration
        .read()
        .map_err(|_| StreamFault {
            kind: FaultKind::Parse,
            detail: "calibration lock poisoned".to_string(),
        })?
        .clone();

    let mut lines_seen = 0u64;
    let mut frames_decoded = 0u64;
    let mut points_published = 0u64;

    while let Some(line) = line_buf.next_line() {
        lines_seen += 1;

        for frame in parse_line(&line) {
            frames_decoded += 1;
            let (angle_deg, force_kg) =
                calibration.convert(frame.raw_angle as f64, frame.raw_force as f64);

            let flushed = {
                let mut accumulator =
                    ctx.session.accumulator.lock().map_err(|_| StreamFault {
                        kind: FaultKind::Parse,
                        detail: "accumulator lock poisoned".to_string(),
                    })?;
                accumulator.push(
                    DecodedSample {
                        raw_angle: frame.raw_angle,
                        raw_force: frame.raw_force,
                        angle_deg,
                        force_kg,
                    },
                    session_start.elapsed().as_secs_f64(),
                )
            };

            if let Some(point) = flushed {
                ctx.session
                    .history
                    .lock()
                    .map_err(|_| StreamFault {
                        kind: FaultKind::Parse,
                        detail: "history lock poisoned".to_string(),
                    })?
                    .push(point.clone());
                points_published += 1;
                // Send failures just mean nobody is subscribed right now.
                let _ = ctx.measurement_tx.send(point);
            }
        }
    }

    if lines_seen > 0 {
        let mut stats = ctx.session.stats.lock().map_err(|_| StreamFault {
            kind: FaultKind::Parse,
            detail: "stats lock poisoned".to_string(),
        })?;
        stats.lines_seen += lines_seen;
        stats.frames_decoded += frames_decoded;
        stats.points_published += points_published;
    }

    Ok(())
}

fn emit_event(ctx: &WorkerContext, kind: AcquisitionEventKind, detail: Option<String>) {
    let timestamp_ms = ctx.epoch.elapsed().as_millis() as u64;
    let _ = ctx.event_tx.send(AcquisitionEvent {
        timestamp_ms,
        kind,
        detail,
    });
}

/// Bounded read of whatever is currently waiting on the port.
///
/// Reads at most `chunk.len()` bytes per call so a burst cannot balloon
/// memory. Timeouts and interrupts count as "nothing waiting".
fn read_available(port: &mut dyn SensorPort, chunk: &mut [u8]) -> io::Result<usize> {
    let available = port.bytes_to_read()?;
    if available == 0 {
        return Ok(0);
    }

    let take = (available as usize).min(chunk.len());
    match port.read_chunk(&mut chunk[..take]) {
        Ok(read) => Ok(read),
        Err(err)
            if matches!(
                err.kind(),
                io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
            ) =>
        {
            Ok(0)
        }
        Err(err) => Err(err),
    }
}

/// Timing parameters for a fixed-duration raw capture.
pub struct SamplerSettings {
    pub duration: Duration,
    pub poll_interval: Duration,
    pub error_backoff: Duration,
    pub max_chunk_bytes: usize,
}

/// Capture raw frames for a fixed duration and average them.
///
/// This is the calibration procedure's read path: same bounded reads, same
/// line reassembly and parser as the streaming loop, but every decoded
/// frame goes straight into the running means instead of the window.
///
/// # Returns
/// * `Ok((raw_angle_avg, raw_force_avg))` - means over all captured frames
/// * `Err(SamplingTimeout)` - the duration elapsed without a single frame
pub fn sample_raw_average(
    port: &mut dyn SensorPort,
    settings: &SamplerSettings,
) -> Result<(f64, f64), CalibrationError> {
    let deadline = Instant::now() + settings.duration;
    let mut line_buf = LineBuffer::new();
    let mut chunk = vec![0u8; settings.max_chunk_bytes.max(1)];
    let mut angles: Vec<f64> = Vec::new();
    let mut forces: Vec<f64> = Vec::new();

    while Instant::now() < deadline {
        match read_available(port, &mut chunk) {
            Ok(0) => {}
            Ok(read) => {
                line_buf.extend_lossy(&chunk[..read]);
                while let Some(line) = line_buf.next_line() {
                    for frame in parse_line(&line) {
                        angles.push(frame.raw_angle as f64);
                        forces.push(frame.raw_force as f64);
                    }
                }
            }
            Err(err) => {
                warn!("[sampler] Read fault absorbed: {}", err);
                thread::sleep(settings.error_backoff);
                continue;
            }
        }
        thread::sleep(settings.poll_interval);
    }

    if angles.is_empty() {
        return Err(CalibrationError::SamplingTimeout {
            reason: format!(
                "no frames decoded within {} ms",
                settings.duration.as_millis()
            ),
        });
    }

    let angle_avg = angles.iter().sum::<f64>() / angles.len() as f64;
    let force_avg = forces.iter().sum::<f64>() / forces.len() as f64;
    debug!(
        "[sampler] {} frames, angle avg {:.1}, force avg {:.1}",
        angles.len(),
        angle_avg,
        force_avg
    );
    Ok((angle_avg, force_avg))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedPort;
    use std::sync::atomic::Ordering;

    fn test_context(
        window_size: u32,
    ) -> (
        WorkerContext,
        Arc<SessionState>,
        broadcast::Receiver<MeasurementPoint>,
        broadcast::Receiver<AcquisitionEvent>,
    ) {
        let session = Arc::new(SessionState::new(window_size));
        let (measurement_tx, measurement_rx) = broadcast::channel(100);
        let (event_tx, event_rx) = broadcast::channel(100);
        let ctx = WorkerContext {
            session: Arc::clone(&session),
            calibration: Arc::new(RwLock::new(Calibration::factory_default())),
            measurement_tx,
            event_tx,
            epoch: Instant::now(),
            poll_interval: Duration::from_millis(1),
            error_backoff: Duration::from_millis(1),
            max_chunk_bytes: 1024,
        };
        (ctx, session, measurement_rx, event_rx)
    }

    fn wait_for<F: Fn() -> bool>(predicate: F, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if predicate() {
                return true;
            }
            thread::sleep(Duration::from_millis(2));
        }
        false
    }

    #[test]
    fn test_worker_publishes_window_averages() {
        let (ctx, session, mut measurement_rx, _events) = test_context(2);
        session.active.store(true, Ordering::SeqCst);

        let port = ScriptedPort::new(vec![
            b"VeTiMa 0x17 0x3FB\n".to_vec(),
            b"VeTiMa 0x17 0x3FB\n".to_vec(),
        ]);
        let handle = spawn_stream_worker(Box::new(port), ctx);

        assert!(
            wait_for(
                || session.history_snapshot().map(|h| h.len()).unwrap_or(0) == 1,
                Duration::from_secs(2)
            ),
            "one averaged point should appear in the history"
        );

        session.active.store(false, Ordering::SeqCst);
        handle.join().unwrap();

        let history = session.history_snapshot().unwrap();
        assert_eq!(history.len(), 1);
        let point = &history[0];
        assert_eq!(point.samples_count, 2);
        assert_eq!(point.raw_angle, 0x3FB);
        assert_eq!(point.raw_force, 0x17);

        // The same point went out on the broadcast channel.
        let published = measurement_rx.try_recv().unwrap();
        assert_eq!(&published, point);

        let stats = session.stats_snapshot().unwrap();
        assert_eq!(stats.lines_seen, 2);
        assert_eq!(stats.frames_decoded, 2);
        assert_eq!(stats.points_published, 1);
    }

    #[test]
    fn test_worker_stops_on_cleared_flag_and_emits_stopped() {
        let (ctx, session, _points, mut event_rx) = test_context(25);
        session.active.store(true, Ordering::SeqCst);

        let handle = spawn_stream_worker(Box::new(ScriptedPort::new(vec![])), ctx);
        thread::sleep(Duration::from_millis(20));
        session.active.store(false, Ordering::SeqCst);
        handle.join().unwrap();

        let mut saw_stopped = false;
        while let Ok(event) = event_rx.try_recv() {
            if matches!(event.kind, AcquisitionEventKind::Stopped) {
                saw_stopped = true;
            }
        }
        assert!(saw_stopped, "worker must emit Stopped on exit");
    }

    #[test]
    fn test_read_fault_is_classified_and_loop_survives() {
        let (ctx, session, _points, mut event_rx) = test_context(25);
        session.active.store(true, Ordering::SeqCst);

        let port = ScriptedPort::new(vec![b"VeTiMa 0x1 0x2\n".to_vec()]).failing_after_script();
        let handle = spawn_stream_worker(Box::new(port), ctx);

        assert!(
            wait_for(
                || session.stats_snapshot().map(|s| s.lines_seen).unwrap_or(0) == 1,
                Duration::from_secs(2)
            ),
            "the scripted line should be consumed before the faults start"
        );
        // Give the loop time to hit the failing reads.
        thread::sleep(Duration::from_millis(30));
        session.active.store(false, Ordering::SeqCst);
        handle.join().unwrap();

        let mut saw_connection_fault = false;
        while let Ok(event) = event_rx.try_recv() {
            if matches!(
                event.kind,
                AcquisitionEventKind::StreamFault {
                    kind: FaultKind::Connection
                }
            ) {
                saw_connection_fault = true;
            }
        }
        assert!(saw_connection_fault, "read errors must surface as Connection faults");
    }

    #[test]
    fn test_garbage_lines_produce_no_points() {
        let (ctx, session, _points, _events) = test_context(1);
        session.active.store(true, Ordering::SeqCst);

        let port = ScriptedPort::new(vec![b"noise without frames\nstill nothing\n".to_vec()]);
        let handle = spawn_stream_worker(Box::new(port), ctx);

        assert!(wait_for(
            || session.stats_snapshot().map(|s| s.lines_seen).unwrap_or(0) == 2,
            Duration::from_secs(2)
        ));
        session.active.store(false, Ordering::SeqCst);
        handle.join().unwrap();

        assert!(session.history_snapshot().unwrap().is_empty());
        assert_eq!(session.stats_snapshot().unwrap().frames_decoded, 0);
    }

    #[test]
    fn test_sample_raw_average_means_all_frames() {
        let mut port = ScriptedPort::new(vec![
            b"VeTiMa 0x10 0x100\n".to_vec(),
            b"VeTiMa 0x20 0x200\n".to_vec(),
        ]);
        let settings = SamplerSettings {
            duration: Duration::from_millis(60),
            poll_interval: Duration::from_millis(1),
            error_backoff: Duration::from_millis(1),
            max_chunk_bytes: 1024,
        };

        let (angle_avg, force_avg) = sample_raw_average(&mut port, &settings).unwrap();
        assert_eq!(angle_avg, (0x100 as f64 + 0x200 as f64) / 2.0);
        assert_eq!(force_avg, (0x10 as f64 + 0x20 as f64) / 2.0);
    }

    #[test]
    fn test_sample_raw_average_times_out_without_frames() {
        let mut port = ScriptedPort::new(vec![]);
        let settings = SamplerSettings {
            duration: Duration::from_millis(30),
            poll_interval: Duration::from_millis(1),
            error_backoff: Duration::from_millis(1),
            max_chunk_bytes: 1024,
        };

        let result = sample_raw_average(&mut port, &settings);
        assert!(matches!(
            result,
            Err(CalibrationError::SamplingTimeout { .. })
        ));
    }
}
