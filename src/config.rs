use std::{
    fmt,
    io::ErrorKind,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tokio::{fs, fs::File, io::AsyncReadExt};

use crate::error::SssError;

pub const DEFAULT_SCHOOL: &str = "cal_poly_pomona";
pub const DEFAULT_COURSE: &str = "CS_2600";
pub const DEFAULT_TERM: &str = "2020_fall";

const CONFIG_FILE_NAME: &str = ".sssconfig.json";

/// The on-disk configuration object
///
/// Every key is optional so a partial or missing file still resolves;
/// absent keys fall through to the next precedence layer.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct ConfigFile {
    pub school: Option<String>,
    pub course: Option<String>,
    pub term: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub session_id: Option<String>,
}

impl ConfigFile {
    /// Returns the default config file path, `.sssconfig.json` in the
    /// user's home directory
    pub fn default_path() -> Result<PathBuf> {
        Ok(homedir::my_home()?
            .context("home dir")?
            .join(CONFIG_FILE_NAME))
    }

    /// Loads the config file, treating a missing file as empty
    pub async fn load(path: &Path) -> Result<Self> {
        match File::open(path).await {
            Ok(mut file) => {
                let mut dest = Vec::new();
                file.read_to_end(&mut dest).await.context("read config file")?;
                serde_json::from_slice(&dest).context("parse config file")
            }

            Err(err) if err.kind() == ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => Err(err).context("open config file"),
        }
    }

    /// Writes the full object atomically: serialize to a sibling temp
    /// file, then rename over the destination
    pub async fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("serialize config")?;

        let mut tmp = path.to_path_buf();
        tmp.set_extension("json.tmp");

        fs::write(&tmp, json).await.context("write config file")?;
        fs::rename(&tmp, path).await.context("replace config file")?;

        Ok(())
    }
}

/// Values supplied on the command line, the highest precedence layer
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub school: Option<String>,
    pub course: Option<String>,
    pub term: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub session_id: Option<String>,
}

/// The merged configuration for one invocation
///
/// Built once by folding CLI arguments over the on-disk file over the
/// hard-coded defaults, independently per field, and passed down to
/// every component. Credentials and the session id have no defaults;
/// their absence is an error only for the actions that need them.
#[derive(Clone, PartialEq, Eq)]
pub struct EffectiveConfig {
    pub school: String,
    pub course: String,
    pub term: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub session_id: Option<String>,
}

impl EffectiveConfig {
    /// Merges the three precedence layers: CLI over file over default
    ///
    /// An empty string does not satisfy a layer; it falls through to
    /// the next one.
    pub fn resolve(overrides: &Overrides, on_disk: &ConfigFile) -> Self {
        Self {
            school: pick(&overrides.school, &on_disk.school, DEFAULT_SCHOOL),
            course: pick(&overrides.course, &on_disk.course, DEFAULT_COURSE),
            term: pick(&overrides.term, &on_disk.term, DEFAULT_TERM),
            username: pick_opt(&overrides.username, &on_disk.username),
            password: pick_opt(&overrides.password, &on_disk.password),
            session_id: pick_opt(&overrides.session_id, &on_disk.session_id),
        }
    }

    /// Returns the credentials, or the error that aborts actions
    /// requiring them
    pub fn require_credentials(&self) -> Result<(&str, &str), SssError> {
        match (self.username.as_deref(), self.password.as_deref()) {
            (Some(username), Some(password)) => Ok((username, password)),
            _ => Err(SssError::MissingCredentials),
        }
    }

    /// Returns the cached session id, or the invalid-session error
    ///
    /// With no cached id there is nothing to probe with, so the user
    /// gets the same answer an expired session would produce.
    pub fn require_session(&self) -> Result<&str, SssError> {
        self.session_id.as_deref().ok_or(SssError::SessionExpired)
    }

    /// The full on-disk shape of this configuration, for `--write-config`
    pub fn to_file(&self) -> ConfigFile {
        ConfigFile {
            school: Some(self.school.clone()),
            course: Some(self.course.clone()),
            term: Some(self.term.clone()),
            username: self.username.clone(),
            password: self.password.clone(),
            session_id: self.session_id.clone(),
        }
    }
}

impl fmt::Debug for EffectiveConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EffectiveConfig")
            .field("school", &self.school)
            .field("course", &self.course)
            .field("term", &self.term)
            .field("username", &self.username)
            .field("password", &self.password.as_deref().map(|_| "<redacted>"))
            .field("session_id", &self.session_id)
            .finish()
    }
}

fn pick(cli: &Option<String>, file: &Option<String>, default: &str) -> String {
    pick_opt(cli, file).unwrap_or_else(|| default.to_string())
}

fn pick_opt(cli: &Option<String>, file: &Option<String>) -> Option<String> {
    non_empty(cli).or_else(|| non_empty(file)).cloned()
}

fn non_empty(value: &Option<String>) -> Option<&String> {
    value.as_ref().filter(|v| !v.is_empty())
}
