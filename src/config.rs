//! Application configuration.
//!
//! Everything is optional. A missing `config.toml` at the default location
//! means built-in defaults; only an explicitly named file has to exist.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::host::playback::PlaybackSettings;
use crate::host::rig::RigConfig;
use crate::mqtt::config::MqttConfig;
use crate::telemetry::handler::{TelemetryProfile, Tracked};

const APP_DIR: &str = "pendulum-telemetry";
const CONFIG_FILE: &str = "config.toml";

/// Which handler the run installs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Variant {
    /// One pendulum, angle published before evaluation.
    Simple,
    /// Two coupled pendulums, angles published after physics.
    Coupled,
    /// No telemetry; stop looping playback at the last frame.
    StopAtEnd,
}

/// Per-profile overrides on top of the built-in profiles.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfileOverrides {
    pub topic: Option<String>,
    pub stop_frame: Option<i32>,
    /// Object names. One entry for the single profile, two for the coupled.
    pub objects: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub playback: PlaybackSettings,
    pub mqtt: MqttConfig,
    pub rig: RigConfig,
    pub simple: ProfileOverrides,
    pub coupled: ProfileOverrides,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse config {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

impl AppConfig {
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(APP_DIR).join(CONFIG_FILE))
    }

    /// Loads `explicit`, or the default location if it exists.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match explicit {
            Some(path) => path.to_path_buf(),
            None => match Self::default_path() {
                Some(path) if path.is_file() => path,
                Some(path) => {
                    debug!("No config at {}, using defaults", path.display());
                    return Ok(Self::default());
                }
                None => {
                    warn!("Could not determine config directory, using defaults");
                    return Ok(Self::default());
                }
            },
        };

        let content = fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;
        let config = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.clone(),
            source,
        })?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Telemetry profile for `variant` with overrides applied. `None` for
    /// variants that publish nothing.
    pub fn profile(&self, variant: Variant) -> Option<TelemetryProfile> {
        let (mut profile, overrides) = match variant {
            Variant::Simple => (TelemetryProfile::simple(), &self.simple),
            Variant::Coupled => (TelemetryProfile::coupled(), &self.coupled),
            Variant::StopAtEnd => return None,
        };

        if let Some(topic) = &overrides.topic {
            profile.topic = topic.clone();
        }
        if let Some(stop_frame) = overrides.stop_frame {
            profile.stop_frame = stop_frame;
        }
        if let Some(objects) = &overrides.objects {
            match (&mut profile.tracked, objects.as_slice()) {
                (Tracked::Single { object, fallback }, [name]) => {
                    *object = name.clone();
                    *fallback = None;
                }
                (Tracked::Coupled { first, second }, [a, b]) => {
                    *first = a.clone();
                    *second = b.clone();
                }
                _ => warn!(
                    "Ignoring {} object override for {}",
                    objects.len(),
                    profile.handler_name
                ),
            }
        }
        Some(profile)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::HandlerPhase;
    use std::io::Write;

    #[test]
    fn defaults_match_the_built_in_profiles() {
        let config = AppConfig::default();
        let simple = config.profile(Variant::Simple).expect("simple");
        assert_eq!(simple, TelemetryProfile::simple());
        assert_eq!(simple.topic, "FABLAB_21_22/Blender/Pendule/out");
        assert_eq!(simple.stop_frame, 1000);
        assert_eq!(simple.phase, HandlerPhase::Pre);

        let coupled = config.profile(Variant::Coupled).expect("coupled");
        assert_eq!(coupled.topic, "FABLAB_21_22/Blender/Pendules_coupl/out");
        assert_eq!(coupled.stop_frame, 1500);
        assert_eq!(coupled.phase, HandlerPhase::Post);
        assert_eq!(coupled.object_names(), vec!["Pendule1", "Pendule2"]);

        assert!(config.profile(Variant::StopAtEnd).is_none());
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(
            file,
            r#"
[playback]
fps = 25
realtime = false

[mqtt]
tls = false

[simple]
stop_frame = 200
objects = ["Bob"]
"#
        )
        .expect("write");

        let config = AppConfig::load(Some(file.path())).expect("load");
        assert_eq!(config.playback.fps, 25);
        assert!(!config.playback.realtime);
        assert_eq!(config.playback.frame_end, PlaybackSettings::default().frame_end);
        assert!(!config.mqtt.tls);
        assert_eq!(config.mqtt.keep_alive_secs, 60);
        assert_eq!(config.mqtt.connect_timeout_secs, 5);
        assert_eq!(config.mqtt.close_timeout(), std::time::Duration::from_millis(250));

        let simple = config.profile(Variant::Simple).expect("simple");
        assert_eq!(simple.stop_frame, 200);
        assert_eq!(
            simple.tracked,
            Tracked::Single {
                object: "Bob".to_owned(),
                fallback: None
            }
        );
        assert_eq!(simple.topic, TelemetryProfile::simple().topic);
    }

    #[test]
    fn mismatched_object_override_is_ignored() {
        let config = AppConfig {
            coupled: ProfileOverrides {
                objects: Some(vec!["Only".to_owned()]),
                ..ProfileOverrides::default()
            },
            ..AppConfig::default()
        };
        let coupled = config.profile(Variant::Coupled).expect("coupled");
        assert_eq!(coupled.tracked, TelemetryProfile::coupled().tracked);
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let dir = tempfile::tempdir().expect("temp dir");
        let missing = dir.path().join("nope.toml");
        assert!(matches!(
            AppConfig::load(Some(&missing)),
            Err(ConfigError::Read { .. })
        ));
    }

    #[test]
    fn malformed_file_is_a_parse_error() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(file, "[playback]\nfps = \"fast\"").expect("write");
        assert!(matches!(
            AppConfig::load(Some(file.path())),
            Err(ConfigError::Parse { .. })
        ));
    }
}
