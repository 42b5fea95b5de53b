// CalibrationStore - persistence of the two-channel calibration
//
// The calibration lives in the per-user application-config directory, not
// next to the working directory, so it survives packaged-executable runs
// and directory changes. Loading merges channel by channel: a missing or
// corrupt entry for one channel never erases the defaults of the other.

use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use log::{info, warn};

use crate::calibration::model::{Calibration, ChannelCalibration};
use crate::error::CalibrationError;

/// File name of the persisted calibration inside the app config directory.
pub const CALIBRATION_FILE: &str = "sensor_calibration.json";

/// Directory name under the platform config root.
const APP_DIR: &str = "mevem";

/// Resolve the platform-scoped calibration path.
///
/// Uses the per-user config directory (e.g. `%APPDATA%` on Windows,
/// `~/.config` on Linux); falls back to a home dot-directory and finally
/// to the current directory when the platform reports neither.
pub fn default_calibration_path() -> PathBuf {
    let base = dirs::config_dir()
        .or_else(|| dirs::home_dir().map(|home| home.join(format!(".{}", APP_DIR))))
        .unwrap_or_else(|| PathBuf::from("."));
    base.join(APP_DIR).join(CALIBRATION_FILE)
}

/// Owns the in-memory calibration and its persisted location.
pub struct CalibrationStore {
    path: PathBuf,
    calibration: Arc<RwLock<Calibration>>,
}

impl CalibrationStore {
    /// Open the store at the platform default location and load it.
    pub fn open_default() -> Self {
        Self::open(default_calibration_path())
    }

    /// Open the store at an explicit path and load it.
    ///
    /// Starts from the factory defaults, overlays whatever the file holds,
    /// and materializes the default file on first use so operators can find
    /// and inspect it.
    pub fn open<P: Into<PathBuf>>(path: P) -> Self {
        let store = Self {
            path: path.into(),
            calibration: Arc::new(RwLock::new(Calibration::factory_default())),
        };
        store.load();
        store
    }

    /// Path of the persisted calibration file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Shared handle to the in-memory calibration for the streaming worker.
    pub fn handle(&self) -> Arc<RwLock<Calibration>> {
        Arc::clone(&self.calibration)
    }

    /// Clone the current in-memory calibration.
    pub fn snapshot(&self) -> Result<Calibration, CalibrationError> {
        Ok(self
            .calibration
            .read()
            .map_err(|_| CalibrationError::StatePoisoned)?
            .clone())
    }

    /// Replace both channels atomically and persist.
    pub fn replace(&self, calibration: Calibration) -> Result<(), CalibrationError> {
        {
            let mut guard = self
                .calibration
                .write()
                .map_err(|_| CalibrationError::StatePoisoned)?;
            *guard = calibration;
        }
        self.save()
    }

    /// Reload the persisted calibration, if any.
    ///
    /// - missing file: keep defaults and persist them immediately
    /// - unreadable/corrupt file: log and keep the in-memory values
    /// - valid file: overlay recognized channel entries one by one
    pub fn load(&self) {
        if !self.path.exists() {
            info!(
                "[CalibrationStore] No calibration at {}; writing factory defaults",
                self.path.display()
            );
            if let Err(err) = self.save() {
                warn!("[CalibrationStore] Could not persist defaults: {}", err);
            }
            return;
        }

        let text = match std::fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(err) => {
                warn!(
                    "[CalibrationStore] Failed to read {}: {}. Keeping current calibration.",
                    self.path.display(),
                    err
                );
                return;
            }
        };

        self.merge_stored(&text);
    }

    /// Serialize the full calibration to its persisted location.
    ///
    /// Failures are reported to the caller but never crash a session.
    pub fn save(&self) -> Result<(), CalibrationError> {
        let snapshot = self.snapshot()?;
        let json = serde_json::to_string_pretty(&snapshot).map_err(|err| {
            CalibrationError::StoreWriteFailed {
                details: err.to_string(),
            }
        })?;

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|err| CalibrationError::StoreWriteFailed {
                details: format!("{}: {}", parent.display(), err),
            })?;
        }

        std::fs::write(&self.path, json).map_err(|err| CalibrationError::StoreWriteFailed {
            details: format!("{}: {}", self.path.display(), err),
        })?;

        info!(
            "[CalibrationStore] Calibration saved to {}",
            self.path.display()
        );
        Ok(())
    }

    /// Overlay stored channel entries onto the in-memory calibration.
    ///
    /// Merge rule: only the recognized top-level keys `angle` and `force`
    /// are considered, each must decode as a complete channel record, and
    /// unknown keys anywhere are ignored. A channel that fails to decode is
    /// skipped with a warning while the other still loads.
    fn merge_stored(&self, text: &str) {
        let value: serde_json::Value = match serde_json::from_str(text) {
            Ok(value) => value,
            Err(err) => {
                warn!(
                    "[CalibrationStore] Corrupt calibration file {}: {}. Keeping defaults.",
                    self.path.display(),
                    err
                );
                return;
            }
        };

        let mut guard = match self.calibration.write() {
            Ok(guard) => guard,
            Err(_) => {
                warn!("[CalibrationStore] Calibration lock poisoned during load");
                return;
            }
        };

        for channel in ["angle", "force"] {
            let Some(entry) = value.get(channel) else {
                continue;
            };
            match serde_json::from_value::<ChannelCalibration>(entry.clone()) {
                Ok(parsed) => match channel {
                    "angle" => guard.angle = parsed,
                    _ => guard.force = parsed,
                },
                Err(err) => {
                    warn!(
                        "[CalibrationStore] Ignoring invalid '{}' entry in {}: {}",
                        channel,
                        self.path.display(),
                        err
                    );
                }
            }
        }

        info!(
            "[CalibrationStore] Calibration loaded from {}",
            self.path.display()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::model::{ChannelCalibration, DEFAULT_FORCE_RAW_MIN};

    fn temp_store_path(name: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!("mevem-store-test-{}-{}", std::process::id(), name))
            .join(CALIBRATION_FILE)
    }

    fn cleanup(path: &Path) {
        if let Some(dir) = path.parent() {
            let _ = std::fs::remove_dir_all(dir);
        }
    }

    #[test]
    fn test_missing_file_materializes_defaults() {
        let path = temp_store_path("missing");
        cleanup(&path);

        let store = CalibrationStore::open(path.clone());
        assert!(path.exists(), "defaults should be persisted on first use");
        assert_eq!(store.snapshot().unwrap(), Calibration::factory_default());

        cleanup(&path);
    }

    #[test]
    fn test_corrupt_file_keeps_defaults() {
        let path = temp_store_path("corrupt");
        cleanup(&path);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "{ not json").unwrap();

        let store = CalibrationStore::open(path.clone());
        assert_eq!(store.snapshot().unwrap(), Calibration::factory_default());

        cleanup(&path);
    }

    #[test]
    fn test_partial_file_overlays_one_channel() {
        let path = temp_store_path("partial");
        cleanup(&path);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        let json = r#"{
            "angle": {
                "raw_min": 100.0,
                "raw_max": 900.0,
                "real_min": 0.0,
                "real_max": 45.0,
                "calibrated": true
            }
        }"#;
        std::fs::write(&path, json).unwrap();

        let store = CalibrationStore::open(path.clone());
        let cal = store.snapshot().unwrap();
        assert_eq!(cal.angle.raw_min, 100.0);
        assert_eq!(cal.angle.raw_max, 900.0);
        // Force entry was absent: defaults stay.
        assert_eq!(cal.force.raw_min, DEFAULT_FORCE_RAW_MIN);

        cleanup(&path);
    }

    #[test]
    fn test_corrupt_channel_does_not_spoil_the_other() {
        let path = temp_store_path("bad-channel");
        cleanup(&path);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        let json = r#"{
            "angle": { "raw_min": "oops" },
            "force": {
                "raw_min": 10.0,
                "raw_max": 50.0,
                "real_min": 0.0,
                "real_max": 1.0,
                "calibrated": true
            }
        }"#;
        std::fs::write(&path, json).unwrap();

        let store = CalibrationStore::open(path.clone());
        let cal = store.snapshot().unwrap();
        let defaults = Calibration::factory_default();
        assert_eq!(cal.angle, defaults.angle);
        assert_eq!(cal.force.raw_min, 10.0);
        assert_eq!(cal.force.raw_max, 50.0);

        cleanup(&path);
    }

    #[test]
    fn test_unknown_keys_are_ignored() {
        let path = temp_store_path("unknown-keys");
        cleanup(&path);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        let json = r#"{
            "version": 3,
            "angle": {
                "raw_min": 1.0,
                "raw_max": 2.0,
                "real_min": 0.0,
                "real_max": 45.0,
                "calibrated": false
            }
        }"#;
        std::fs::write(&path, json).unwrap();

        let store = CalibrationStore::open(path.clone());
        let cal = store.snapshot().unwrap();
        assert_eq!(cal.angle.raw_min, 1.0);
        assert!(!cal.angle.calibrated);

        cleanup(&path);
    }

    #[test]
    fn test_replace_persists_roundtrip() {
        let path = temp_store_path("replace");
        cleanup(&path);

        let store = CalibrationStore::open(path.clone());
        let mut cal = Calibration::factory_default();
        cal.angle = ChannelCalibration {
            raw_min: 1019.0,
            raw_max: 705.0,
            real_min: 0.0,
            real_max: 45.0,
            calibrated: true,
        };
        store.replace(cal.clone()).unwrap();

        // A second store instance reads the replaced values back.
        let reopened = CalibrationStore::open(path.clone());
        assert_eq!(reopened.snapshot().unwrap(), cal);

        cleanup(&path);
    }

    #[test]
    fn test_save_reports_unwritable_path() {
        let store = CalibrationStore {
            path: PathBuf::from("/proc/mevem-definitely-not-writable/cal.json"),
            calibration: Arc::new(RwLock::new(Calibration::factory_default())),
        };
        let result = store.save();
        assert!(matches!(
            result,
            Err(CalibrationError::StoreWriteFailed { .. })
        ));
    }
}
