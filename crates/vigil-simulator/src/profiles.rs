//! Profile file loading and hot reload.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use log::{info, warn};
use vigil_core::{ProfileSet, SharedProfiles};

use crate::SimError;

/// Parse and validate a TOML profile set.
pub fn parse(text: &str) -> Result<ProfileSet, SimError> {
    let profiles: ProfileSet = toml::from_str(text)?;
    profiles.validate()?;
    Ok(profiles)
}

pub fn load(path: &Path) -> Result<ProfileSet, SimError> {
    let text = fs::read_to_string(path)?;
    parse(&text)
}

/// Polls a profile file for modification and swaps it into the shared
/// profiles when it changes.
pub struct ProfileWatcher {
    path: PathBuf,
    modified: Option<SystemTime>,
}

impl ProfileWatcher {
    pub fn new(path: PathBuf) -> Self {
        let modified = modified_time(&path);
        Self { path, modified }
    }

    /// Reload if the file changed since the last poll. A file that fails to
    /// load or validate is logged and the active profiles stay in place.
    pub fn poll(&mut self, shared: &SharedProfiles) -> bool {
        let modified = modified_time(&self.path);
        if modified == self.modified {
            return false;
        }
        self.modified = modified;

        let reloaded =
            load(&self.path).and_then(|profiles| shared.replace(profiles).map_err(SimError::from));
        match reloaded {
            Ok(()) => {
                info!("Reloaded profiles from {}", self.path.display());
                true
            }
            Err(e) => {
                warn!("Keeping previous profiles, {} is invalid: {}", self.path.display(), e);
                false
            }
        }
    }
}

fn modified_time(path: &Path) -> Option<SystemTime> {
    fs::metadata(path).and_then(|meta| meta.modified()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use vigil_core::{ProfileStore, SensorProfile};

    #[test]
    fn test_parse_profile_file() {
        let profiles = parse(
            r#"
            [frequency]
            samples_per_day = 1440

            [sensors.temp]

            [sensors.humidity]
            window_span_secs = 43200
            lower_limit = 30.0
            upper_limit = 60.0

            [rates.humidity]
            samples_per_day = 96
            "#,
        )
        .unwrap();

        let humidity = SensorProfile::new("humidity").unwrap();
        let temp = SensorProfile::new("temp").unwrap();
        assert_eq!(
            profiles.anomaly_profile(&humidity).unwrap().manual_limits(),
            Some((30.0, 60.0))
        );
        assert_eq!(profiles.anomaly_profile(&temp).unwrap().window_span_secs, 86_400);
        assert_eq!(profiles.frequency_profile(&humidity).unwrap().samples_per_day, 96);
        assert_eq!(profiles.frequency_profile(&temp).unwrap().samples_per_day, 1440);
    }

    #[test]
    fn test_invalid_profile_file_rejected() {
        let inverted = parse(
            r#"
            [frequency]
            samples_per_day = 1440

            [sensors.temp]
            lower_limit = 40.0
            upper_limit = 10.0
            "#,
        );
        assert!(matches!(inverted, Err(SimError::Config(_))));

        assert!(matches!(parse("frequency = 3"), Err(SimError::Toml(_))));
    }

    #[test]
    fn test_bad_reload_keeps_profiles() {
        let dir = std::env::temp_dir().join(format!("vigil-profiles-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("profiles.toml");
        fs::write(&path, "not = [valid").unwrap();

        let shared = SharedProfiles::new(ProfileSet::builtin(60)).unwrap();
        let mut watcher = ProfileWatcher {
            path: path.clone(),
            modified: None,
        };

        assert!(!watcher.poll(&shared));
        assert_eq!(shared.snapshot(), ProfileSet::builtin(60));
        // Unchanged file is not re-read
        assert!(!watcher.poll(&shared));

        fs::remove_dir_all(&dir).unwrap();
    }
}
