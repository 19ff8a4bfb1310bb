//! Platform power-source query.
//!
//! Answers the same question as a page's battery status (`dischargingTime ==
//! Infinity`): is the device running from external power? A machine without
//! any battery counts as externally powered.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::HostError;

pub const DEFAULT_POWER_SUPPLY_DIR: &str = "/sys/class/power_supply";

pub trait PowerSource: Send + Sync {
    fn on_external_power(&self) -> Result<bool, HostError>;
}

/// Linux `power_supply` class reader.
#[derive(Debug, Clone)]
pub struct SysfsPowerSource {
    root: PathBuf,
}

impl Default for SysfsPowerSource {
    fn default() -> Self {
        Self::new(DEFAULT_POWER_SUPPLY_DIR)
    }
}

impl SysfsPowerSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

fn read_attr(dir: &Path, name: &str) -> Option<String> {
    fs::read_to_string(dir.join(name))
        .ok()
        .map(|s| s.trim().to_string())
}

impl PowerSource for SysfsPowerSource {
    fn on_external_power(&self) -> Result<bool, HostError> {
        let entries = fs::read_dir(&self.root).map_err(|e| {
            HostError::Unavailable(format!("{}: {e}", self.root.display()))
        })?;

        let mut discharging = false;
        for entry in entries {
            let dir = entry?.path();
            match read_attr(&dir, "type").as_deref() {
                Some("Mains") | Some("USB") => {
                    if read_attr(&dir, "online").as_deref() == Some("1") {
                        return Ok(true);
                    }
                }
                Some("Battery") => {
                    if read_attr(&dir, "status").as_deref() == Some("Discharging") {
                        discharging = true;
                    }
                }
                _ => {}
            }
        }
        Ok(!discharging)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn supply(root: &Path, name: &str, attrs: &[(&str, &str)]) {
        let dir = root.join(name);
        fs::create_dir_all(&dir).expect("mkdir");
        for (k, v) in attrs {
            fs::write(dir.join(k), format!("{v}\n")).expect("write attr");
        }
    }

    #[test]
    fn mains_online_is_external_power() {
        let tmp = tempfile::tempdir().expect("tempdir");
        supply(tmp.path(), "AC", &[("type", "Mains"), ("online", "1")]);
        supply(tmp.path(), "BAT0", &[("type", "Battery"), ("status", "Charging")]);
        let src = SysfsPowerSource::new(tmp.path());
        assert!(src.on_external_power().expect("readable"));
    }

    #[test]
    fn discharging_battery_is_not_external_power() {
        let tmp = tempfile::tempdir().expect("tempdir");
        supply(tmp.path(), "AC", &[("type", "Mains"), ("online", "0")]);
        supply(tmp.path(), "BAT0", &[("type", "Battery"), ("status", "Discharging")]);
        let src = SysfsPowerSource::new(tmp.path());
        assert!(!src.on_external_power().expect("readable"));
    }

    #[test]
    fn no_battery_counts_as_external_power() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let src = SysfsPowerSource::new(tmp.path());
        assert!(src.on_external_power().expect("readable"));
    }

    #[test]
    fn missing_directory_is_unavailable() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let src = SysfsPowerSource::new(tmp.path().join("nope"));
        let err = src.on_external_power().expect_err("must fail");
        assert!(matches!(err, HostError::Unavailable(_)));
    }
}
