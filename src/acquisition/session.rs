// SessionState - shared state of one acquisition session
//
// Shared between the streaming worker thread and the request-handling
// contexts that query or control it. The active flag is the only
// cross-task synchronization primitive the worker polls; history and
// accumulator are mutex-guarded and tolerate point-in-time snapshots.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use crate::acquisition::accumulator::AveragingAccumulator;
use crate::api::types::{AcquisitionStats, MeasurementPoint};
use crate::error::AcquisitionError;

pub struct SessionState {
    /// Cooperative cancellation flag checked at every poll iteration
    pub(crate) active: AtomicBool,
    /// Published points in insertion order, unbounded until cleared
    pub(crate) history: Mutex<Vec<MeasurementPoint>>,
    /// Window accumulator written by the worker, resized from outside
    pub(crate) accumulator: Mutex<AveragingAccumulator>,
    /// Worker counters for status queries
    pub(crate) stats: Mutex<AcquisitionStats>,
}

impl SessionState {
    pub fn new(window_size: u32) -> Self {
        Self {
            active: AtomicBool::new(false),
            history: Mutex::new(Vec::new()),
            accumulator: Mutex::new(AveragingAccumulator::new(window_size)),
            stats: Mutex::new(AcquisitionStats::default()),
        }
    }

    /// Whether a streaming session is currently running.
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Point-in-time copy of the measurement history.
    pub fn history_snapshot(&self) -> Result<Vec<MeasurementPoint>, AcquisitionError> {
        Ok(self
            .history
            .lock()
            .map_err(|_| AcquisitionError::LockPoisoned {
                component: "history".to_string(),
            })?
            .clone())
    }

    /// Drop all published points.
    pub fn clear_history(&self) -> Result<(), AcquisitionError> {
        self.history
            .lock()
            .map_err(|_| AcquisitionError::LockPoisoned {
                component: "history".to_string(),
            })?
            .clear();
        Ok(())
    }

    /// Point-in-time copy of the worker counters.
    pub fn stats_snapshot(&self) -> Result<AcquisitionStats, AcquisitionError> {
        Ok(*self
            .stats
            .lock()
            .map_err(|_| AcquisitionError::LockPoisoned {
                component: "stats".to_string(),
            })?)
    }

    /// Reset history, accumulator, and counters for a fresh session.
    pub(crate) fn reset_for_start(&self) -> Result<(), AcquisitionError> {
        self.clear_history()?;
        self.accumulator
            .lock()
            .map_err(|_| AcquisitionError::LockPoisoned {
                component: "accumulator".to_string(),
            })?
            .clear();
        *self
            .stats
            .lock()
            .map_err(|_| AcquisitionError::LockPoisoned {
                component: "stats".to_string(),
            })? = AcquisitionStats::default();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acquisition::accumulator::DecodedSample;

    #[test]
    fn test_new_session_is_idle() {
        let session = SessionState::new(25);
        assert!(!session.is_active());
        assert!(session.history_snapshot().unwrap().is_empty());
        assert_eq!(session.stats_snapshot().unwrap(), AcquisitionStats::default());
    }

    #[test]
    fn test_reset_clears_everything() {
        let session = SessionState::new(5);
        session
            .history
            .lock()
            .unwrap()
            .push(MeasurementPoint {
                timestamp: 0.0,
                angle: 1.0,
                force: 0.1,
                raw_angle: 10,
                raw_force: 2,
                samples_count: 5,
            });
        session.accumulator.lock().unwrap().push(
            DecodedSample {
                raw_angle: 1,
                raw_force: 1,
                angle_deg: 1.0,
                force_kg: 1.0,
            },
            0.0,
        );
        session.stats.lock().unwrap().lines_seen = 7;

        session.reset_for_start().unwrap();
        assert!(session.history_snapshot().unwrap().is_empty());
        assert_eq!(session.accumulator.lock().unwrap().pending(), 0);
        assert_eq!(session.stats_snapshot().unwrap().lines_seen, 0);
    }
}
