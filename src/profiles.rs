//! Named cloud profiles stored in `stackfleet.toml`.
//!
//! Profiles live under `[clouds.<name>]` and override the credential fields
//! of [`crate::CloudConfig`]:
//!
//! ```toml
//! [clouds.staging]
//! auth_url = "https://keystone.staging.example:5000/v3"
//! project_name = "ops"
//! username = "deployer"
//! ```

use std::io;

use camino::{Utf8Path, Utf8PathBuf};
use cap_std::{ambient_authority, fs_utf8::Dir};
use ortho_config::ConfigDiscovery;
use ortho_config::toml;
use serde::Deserialize;
use thiserror::Error;

const APP_NAME: &str = "stackfleet";
const CONFIG_ENV_VAR: &str = "STACKFLEET_CONFIG_PATH";
const CONFIG_FILE_NAME: &str = "stackfleet.toml";
const DOTFILE_NAME: &str = ".stackfleet.toml";
const PROJECT_FILE_NAME: &str = "stackfleet.toml";
const CLOUDS_SECTION: &str = "clouds";

/// Credential overrides for one named cloud.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct CloudProfile {
    /// Identity service endpoint.
    pub auth_url: Option<String>,
    /// Project to scope the token to.
    pub project_name: Option<String>,
    /// User to authenticate as.
    pub username: Option<String>,
    /// Password for `username`.
    pub password: Option<String>,
    /// Domain owning the user.
    pub user_domain_name: Option<String>,
    /// Domain owning the project.
    pub project_domain_name: Option<String>,
    /// Region used to pick catalog endpoints.
    pub region_name: Option<String>,
    /// Catalog interface.
    pub interface: Option<String>,
}

/// Errors raised while reading named profiles.
#[derive(Debug, Error)]
pub enum ProfileError {
    /// Raised when no configuration file exists to read profiles from.
    #[error("no configuration file found; create stackfleet.toml with a [clouds.<name>] table")]
    NoConfigFile,
    /// Raised when the requested profile is absent.
    #[error("cloud profile '{name}' not found in {path}")]
    NotFound {
        /// Requested profile name.
        name: String,
        /// File that was searched.
        path: Utf8PathBuf,
    },
    /// Raised when file system operations fail.
    #[error("failed to access {path}: {message}")]
    Io {
        /// Path that could not be accessed.
        path: Utf8PathBuf,
        /// Human-readable error message.
        message: String,
    },
    /// Raised when parsing the TOML content fails.
    #[error("failed to parse {path}: {message}")]
    Parse {
        /// Path that could not be parsed.
        path: Utf8PathBuf,
        /// Human-readable error message.
        message: String,
    },
    /// Raised when the file has an unexpected structure.
    #[error("invalid configuration in {path}: {message}")]
    InvalidStructure {
        /// Path that had invalid content.
        path: Utf8PathBuf,
        /// Human-readable error message.
        message: String,
    },
}

/// Reads profiles from an explicit file or from the standard discovery
/// search order.
#[derive(Clone, Debug)]
pub struct ProfileStore {
    source: ProfileSource,
}

#[derive(Clone, Debug)]
enum ProfileSource {
    Discovery(ConfigDiscovery),
    File(Utf8PathBuf),
}

impl ProfileStore {
    /// Builds a store using the standard discovery settings.
    #[must_use]
    pub fn new() -> Self {
        Self {
            source: ProfileSource::Discovery(
                ConfigDiscovery::builder(APP_NAME)
                    .env_var(CONFIG_ENV_VAR)
                    .config_file_name(CONFIG_FILE_NAME)
                    .dotfile_name(DOTFILE_NAME)
                    .project_file_name(PROJECT_FILE_NAME)
                    .build(),
            ),
        }
    }

    /// Builds a store reading a single file.
    #[must_use]
    pub fn from_path(path: impl Into<Utf8PathBuf>) -> Self {
        Self {
            source: ProfileSource::File(path.into()),
        }
    }

    /// Loads the profile called `name`.
    ///
    /// # Errors
    ///
    /// Returns [`ProfileError`] when no file exists, the file cannot be read
    /// or parsed, or the profile is absent.
    pub fn load(&self, name: &str) -> Result<CloudProfile, ProfileError> {
        let path = self.resolve_path()?;
        let clouds = read_clouds(&path)?;
        let Some(raw) = clouds.get(name) else {
            return Err(ProfileError::NotFound {
                name: name.to_owned(),
                path,
            });
        };
        raw.clone()
            .try_into::<CloudProfile>()
            .map_err(|err| ProfileError::InvalidStructure {
                path: path.clone(),
                message: format!("{CLOUDS_SECTION}.{name}: {err}"),
            })
    }

    /// Lists the profile names defined in the configuration file, sorted.
    ///
    /// # Errors
    ///
    /// Returns [`ProfileError`] when the file cannot be read or parsed.
    pub fn names(&self) -> Result<Vec<String>, ProfileError> {
        let path = self.resolve_path()?;
        let mut names: Vec<String> = read_clouds(&path)?.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    fn resolve_path(&self) -> Result<Utf8PathBuf, ProfileError> {
        match &self.source {
            ProfileSource::File(path) => Ok(path.clone()),
            ProfileSource::Discovery(discovery) => {
                for candidate in discovery.utf8_candidates() {
                    if path_exists(&candidate)? {
                        return Ok(candidate);
                    }
                }
                Err(ProfileError::NoConfigFile)
            }
        }
    }
}

impl Default for ProfileStore {
    fn default() -> Self {
        Self::new()
    }
}

fn read_clouds(path: &Utf8Path) -> Result<toml::value::Table, ProfileError> {
    let contents = read_config(path)?;
    if contents.trim().is_empty() {
        return Ok(toml::value::Table::new());
    }
    let value: toml::Value = toml::from_str(&contents).map_err(|err| ProfileError::Parse {
        path: path.to_path_buf(),
        message: err.to_string(),
    })?;
    let table = value
        .as_table()
        .ok_or_else(|| ProfileError::InvalidStructure {
            path: path.to_path_buf(),
            message: String::from("configuration root is not a table"),
        })?;
    let Some(section) = table.get(CLOUDS_SECTION) else {
        return Ok(toml::value::Table::new());
    };
    section
        .as_table()
        .cloned()
        .ok_or_else(|| ProfileError::InvalidStructure {
            path: path.to_path_buf(),
            message: format!("[{CLOUDS_SECTION}] must be a table"),
        })
}

fn split_path(path: &Utf8Path) -> Result<(&Utf8Path, &str), ProfileError> {
    let parent = path
        .parent()
        .filter(|dir| !dir.as_str().is_empty())
        .unwrap_or_else(|| Utf8Path::new("."));
    let file_name = path
        .file_name()
        .ok_or_else(|| ProfileError::InvalidStructure {
            path: path.to_path_buf(),
            message: String::from("configuration file path is missing a filename"),
        })?;
    Ok((parent, file_name))
}

fn path_exists(path: &Utf8Path) -> Result<bool, ProfileError> {
    let (parent, file_name) = split_path(path)?;
    match Dir::open_ambient_dir(parent, ambient_authority()) {
        Ok(dir) => dir.try_exists(file_name).map_err(|err| ProfileError::Io {
            path: path.to_path_buf(),
            message: err.to_string(),
        }),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(err) => Err(ProfileError::Io {
            path: parent.to_path_buf(),
            message: err.to_string(),
        }),
    }
}

fn read_config(path: &Utf8Path) -> Result<String, ProfileError> {
    let (parent, file_name) = split_path(path)?;
    let dir = Dir::open_ambient_dir(parent, ambient_authority()).map_err(|err| ProfileError::Io {
        path: parent.to_path_buf(),
        message: err.to_string(),
    })?;
    dir.read_to_string(file_name)
        .map_err(|err| ProfileError::Io {
            path: path.to_path_buf(),
            message: err.to_string(),
        })
}
