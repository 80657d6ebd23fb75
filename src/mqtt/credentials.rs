use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{debug, error, info, warn};

pub const SECRETS_FILE: &str = "mqtt_secrets.toml";
const APP_DIR: &str = "pendulum-telemetry";

/// Broker address and login. Read once at startup.
#[derive(Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Credentials {
    #[serde(alias = "HOST")]
    pub host: String,
    #[serde(alias = "PORT")]
    pub port: u16,
    #[serde(default, alias = "USERNAME")]
    pub username: String,
    #[serde(default, alias = "PASSWORD")]
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

impl Credentials {
    /// Placeholders used when no secrets file could be read.
    pub fn is_placeholder(&self) -> bool {
        self.host.is_empty() && self.port == 0
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CredentialsError {
    #[error("secrets file missing: {}", .0.display())]
    Missing(PathBuf),

    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("malformed secrets file {}: {source}", path.display())]
    Malformed {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Where broker credentials come from.
pub trait ConfigSource {
    fn load(&self) -> Result<Credentials, CredentialsError>;

    /// Loads credentials, degrading to empty placeholders with a logged
    /// warning when the source is missing or unreadable.
    fn load_or_default(&self) -> Credentials {
        match self.load() {
            Ok(credentials) => {
                info!(
                    "Broker credentials loaded for {}:{}",
                    credentials.host, credentials.port
                );
                credentials
            }
            Err(CredentialsError::Missing(path)) => {
                warn!("Secrets file {} missing, using empty credentials", path.display());
                warn!("Copy the secrets template next to the config and fill in your broker login");
                Credentials::default()
            }
            Err(e) => {
                error!("{}, using empty credentials", e);
                Credentials::default()
            }
        }
    }
}

/// TOML file with `host`, `port`, `username` and `password` keys.
#[derive(Debug, Clone)]
pub struct SecretsFile {
    path: PathBuf,
}

impl SecretsFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Picks the explicit path if given, otherwise the first existing of
    /// `./mqtt_secrets.toml` and `<config dir>/pendulum-telemetry/mqtt_secrets.toml`.
    /// Falls back to the working-directory path so the warning names it.
    pub fn locate(explicit: Option<&Path>) -> Self {
        if let Some(path) = explicit {
            return Self::new(path);
        }

        let local = PathBuf::from(SECRETS_FILE);
        let candidates = std::iter::once(local.clone())
            .chain(dirs::config_dir().map(|dir| dir.join(APP_DIR).join(SECRETS_FILE)));
        for candidate in candidates {
            if candidate.is_file() {
                debug!("Using secrets file {}", candidate.display());
                return Self::new(candidate);
            }
        }
        Self::new(local)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ConfigSource for SecretsFile {
    fn load(&self) -> Result<Credentials, CredentialsError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(CredentialsError::Missing(self.path.clone()))
            }
            Err(source) => {
                return Err(CredentialsError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        toml::from_str(&content).map_err(|source| CredentialsError::Malformed {
            path: self.path.clone(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn secrets(content: &str) -> (tempfile::TempDir, SecretsFile) {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join(SECRETS_FILE);
        let mut file = fs::File::create(&path).expect("create secrets");
        file.write_all(content.as_bytes()).expect("write secrets");
        (dir, SecretsFile::new(path))
    }

    #[test]
    fn loads_lowercase_keys() {
        let (_dir, source) = secrets(
            r#"
            host = "broker.example.org"
            port = 8883
            username = "fablab"
            password = "hunter2"
            "#,
        );
        let credentials = source.load().expect("credentials");
        assert_eq!(credentials.host, "broker.example.org");
        assert_eq!(credentials.port, 8883);
        assert_eq!(credentials.username, "fablab");
        assert_eq!(credentials.password, "hunter2");
    }

    #[test]
    fn accepts_uppercase_keys() {
        let (_dir, source) = secrets(
            r#"
            HOST = "broker.example.org"
            PORT = 8443
            USERNAME = "fablab"
            PASSWORD = "hunter2"
            "#,
        );
        let credentials = source.load().expect("credentials");
        assert_eq!(credentials.port, 8443);
        assert_eq!(credentials.username, "fablab");
    }

    #[test]
    fn missing_file_degrades_to_placeholders() {
        let dir = tempfile::tempdir().expect("tempdir");
        let source = SecretsFile::new(dir.path().join("absent.toml"));

        assert!(matches!(source.load(), Err(CredentialsError::Missing(_))));
        let credentials = source.load_or_default();
        assert!(credentials.is_placeholder());
        assert_eq!(credentials, Credentials::default());
    }

    #[test]
    fn malformed_file_degrades_to_placeholders() {
        let (_dir, source) = secrets("host = \"broker\"\nport = \"not a number\"\n");
        assert!(matches!(source.load(), Err(CredentialsError::Malformed { .. })));
        assert!(source.load_or_default().is_placeholder());
    }

    #[test]
    fn debug_output_hides_the_password() {
        let credentials = Credentials {
            host: "h".into(),
            port: 1,
            username: "u".into(),
            password: "secret".into(),
        };
        assert!(!format!("{:?}", credentials).contains("secret"));
    }

    #[test]
    fn explicit_path_wins() {
        let source = SecretsFile::locate(Some(Path::new("/tmp/custom.toml")));
        assert_eq!(source.path(), Path::new("/tmp/custom.toml"));
    }
}
