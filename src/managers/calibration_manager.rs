// CalibrationManager: Focused manager for the calibration workflow
//
// Single Responsibility: Calibration procedure lifecycle and persistence

use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use crate::api::types::{CalibrationStatus, ChannelBounds};
use crate::calibration::{
    Calibration, CalibrationProcedure, CalibrationProgress, CalibrationStep, CalibrationStore,
    ChannelCalibration,
};
use crate::error::{log_calibration_error, CalibrationError};

/// Manages the guided calibration procedure and the persisted store
///
/// This manager handles:
/// - Starting/cancelling the four-step procedure
/// - Recording per-step sample means and auto-finalizing the run
/// - Persisting the finished calibration atomically (both channels at once)
/// - Status queries and manual saves from the transport layer
pub struct CalibrationManager {
    store: CalibrationStore,
    procedure: Arc<Mutex<Option<CalibrationProcedure>>>,
}

impl CalibrationManager {
    /// Create a manager over an already-loaded store
    pub fn new(store: CalibrationStore) -> Self {
        Self {
            store,
            procedure: Arc::new(Mutex::new(None)),
        }
    }

    /// Shared handle to the in-memory calibration for the streaming worker
    pub fn calibration_handle(&self) -> Arc<RwLock<Calibration>> {
        self.store.handle()
    }

    /// Whether a guided procedure is currently open
    pub fn in_progress(&self) -> bool {
        self.lock_procedure()
            .map(|guard| guard.is_some())
            .unwrap_or(false)
    }

    /// Begin a new guided procedure
    ///
    /// # Errors
    /// - `AlreadyInProgress` if a procedure is already open
    /// - `StatePoisoned` on lock poisoning
    pub fn start(&self) -> Result<CalibrationProgress, CalibrationError> {
        let mut guard = self.lock_procedure().inspect_err(|err| {
            log_calibration_error(err, "start_calibration");
        })?;

        if guard.is_some() {
            let err = CalibrationError::AlreadyInProgress;
            log_calibration_error(&err, "start_calibration");
            return Err(err);
        }

        let procedure = CalibrationProcedure::new();
        let progress = procedure.progress();
        *guard = Some(procedure);
        Ok(progress)
    }

    /// Step currently awaiting capture
    ///
    /// # Returns
    /// * `Ok(step)` - next step of the open procedure
    /// * `Err(NotInProgress)` - no procedure open, or all steps recorded
    pub fn current_step(&self) -> Result<CalibrationStep, CalibrationError> {
        let guard = self.lock_procedure()?;
        guard
            .as_ref()
            .and_then(|procedure| procedure.current_step())
            .ok_or(CalibrationError::NotInProgress)
    }

    /// Record the sample means of one captured step
    ///
    /// When the fourth step lands, the procedure is finalized in the same
    /// call: both channel calibrations are replaced atomically and the
    /// result is persisted. A failed save keeps the new calibration in
    /// memory (last-known-good stays usable) and surfaces the error.
    pub fn record_step_sample(
        &self,
        raw_angle_avg: f64,
        raw_force_avg: f64,
    ) -> Result<CalibrationProgress, CalibrationError> {
        let mut guard = self.lock_procedure().inspect_err(|err| {
            log_calibration_error(err, "record_step_sample");
        })?;

        let procedure = guard.as_mut().ok_or_else(|| {
            let err = CalibrationError::NotInProgress;
            log_calibration_error(&err, "record_step_sample");
            err
        })?;

        let progress = procedure.record_sample(raw_angle_avg, raw_force_avg)?;

        if progress.is_complete() {
            let finished = guard.take().ok_or(CalibrationError::NotInProgress)?;
            let calibration = finished.finalize()?;
            self.store.replace(calibration).inspect_err(|err| {
                log_calibration_error(err, "record_step_sample");
            })?;
            log::info!("[CalibrationManager] Procedure complete, calibration persisted");
        }

        Ok(progress)
    }

    /// Abandon the open procedure without touching the store
    pub fn cancel(&self) -> Result<(), CalibrationError> {
        let mut guard = self.lock_procedure()?;
        if guard.take().is_none() {
            return Err(CalibrationError::NotInProgress);
        }
        log::info!("[CalibrationManager] Procedure cancelled");
        Ok(())
    }

    /// Status snapshot of the persisted calibration
    pub fn status(&self) -> Result<CalibrationStatus, CalibrationError> {
        let calibration = self.store.snapshot()?;
        Ok(CalibrationStatus {
            angle_calibrated: calibration.angle.calibrated,
            force_calibrated: calibration.force.calibrated,
            calibration,
        })
    }

    /// Replace both channels from transport-supplied bounds and persist
    ///
    /// Both channels are marked calibrated; this is the manual-save path
    /// used when an operator tweaks references by hand.
    pub fn save_manual(
        &self,
        angle: ChannelBounds,
        force: ChannelBounds,
    ) -> Result<(), CalibrationError> {
        let calibration = Calibration {
            angle: channel_from_bounds(angle),
            force: channel_from_bounds(force),
        };
        self.store.replace(calibration).inspect_err(|err| {
            log_calibration_error(err, "save_calibration");
        })
    }

    /// Reload the persisted file over the in-memory calibration
    pub fn reload(&self) {
        self.store.load();
    }

    fn lock_procedure(
        &self,
    ) -> Result<MutexGuard<'_, Option<CalibrationProcedure>>, CalibrationError> {
        self.procedure
            .lock()
            .map_err(|_| CalibrationError::StatePoisoned)
    }
}

fn channel_from_bounds(bounds: ChannelBounds) -> ChannelCalibration {
    ChannelCalibration {
        raw_min: bounds.raw_min,
        raw_max: bounds.raw_max,
        real_min: bounds.real_min,
        real_max: bounds.real_max,
        calibrated: true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn temp_manager(name: &str) -> (CalibrationManager, PathBuf) {
        let path = std::env::temp_dir()
            .join(format!("mevem-calmgr-test-{}-{}", std::process::id(), name))
            .join("sensor_calibration.json");
        if let Some(dir) = path.parent() {
            let _ = std::fs::remove_dir_all(dir);
        }
        (CalibrationManager::new(CalibrationStore::open(path.clone())), path)
    }

    fn cleanup(path: &PathBuf) {
        if let Some(dir) = path.parent() {
            let _ = std::fs::remove_dir_all(dir);
        }
    }

    #[test]
    fn test_start_then_double_start_rejected() {
        let (manager, path) = temp_manager("double-start");

        let progress = manager.start().unwrap();
        assert_eq!(progress.steps_completed, 0);
        assert!(manager.in_progress());

        assert!(matches!(
            manager.start(),
            Err(CalibrationError::AlreadyInProgress)
        ));

        cleanup(&path);
    }

    #[test]
    fn test_record_without_start_rejected() {
        let (manager, path) = temp_manager("no-start");
        assert!(matches!(
            manager.record_step_sample(1.0, 2.0),
            Err(CalibrationError::NotInProgress)
        ));
        cleanup(&path);
    }

    #[test]
    fn test_full_run_persists_and_clears_procedure() {
        let (manager, path) = temp_manager("full-run");

        manager.start().unwrap();
        manager.record_step_sample(1019.0, 0.0).unwrap();
        manager.record_step_sample(705.0, 0.0).unwrap();
        manager.record_step_sample(0.0, 23.0).unwrap();
        let progress = manager.record_step_sample(0.0, 56.0).unwrap();
        assert!(progress.is_complete());
        assert!(!manager.in_progress());

        let status = manager.status().unwrap();
        assert!(status.angle_calibrated);
        assert_eq!(status.calibration.angle.raw_min, 1019.0);
        assert_eq!(status.calibration.angle.raw_max, 705.0);
        assert_eq!(status.calibration.force.raw_min, 23.0);
        assert_eq!(status.calibration.force.raw_max, 56.0);

        // The finished run reached the file too.
        let reloaded = CalibrationStore::open(path.clone());
        assert_eq!(reloaded.snapshot().unwrap(), status.calibration);

        cleanup(&path);
    }

    #[test]
    fn test_cancel_leaves_store_untouched() {
        let (manager, path) = temp_manager("cancel");
        let before = manager.status().unwrap();

        manager.start().unwrap();
        manager.record_step_sample(111.0, 222.0).unwrap();
        manager.cancel().unwrap();

        assert!(!manager.in_progress());
        assert_eq!(manager.status().unwrap(), before);
        assert!(matches!(
            manager.cancel(),
            Err(CalibrationError::NotInProgress)
        ));

        cleanup(&path);
    }

    #[test]
    fn test_save_manual_marks_channels_calibrated() {
        let (manager, path) = temp_manager("manual-save");

        manager
            .save_manual(
                ChannelBounds {
                    raw_min: 10.0,
                    raw_max: 20.0,
                    real_min: 0.0,
                    real_max: 45.0,
                },
                ChannelBounds {
                    raw_min: 1.0,
                    raw_max: 2.0,
                    real_min: 0.0,
                    real_max: 1.0,
                },
            )
            .unwrap();

        let status = manager.status().unwrap();
        assert!(status.angle_calibrated);
        assert!(status.force_calibrated);
        assert_eq!(status.calibration.angle.raw_min, 10.0);
        assert_eq!(status.calibration.force.raw_max, 2.0);

        cleanup(&path);
    }

    #[test]
    fn test_current_step_tracks_progress() {
        let (manager, path) = temp_manager("current-step");

        manager.start().unwrap();
        assert_eq!(manager.current_step().unwrap(), CalibrationStep::AngleZero);
        manager.record_step_sample(1.0, 0.0).unwrap();
        assert_eq!(manager.current_step().unwrap(), CalibrationStep::AngleSpan);

        cleanup(&path);
    }
}
