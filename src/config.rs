use std::env;
use std::ffi::OsString;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

const APP_DIR: &str = "task_timelog";
const CONFIG_FILE: &str = "config.toml";
const STORE_FILE: &str = "tasks.json";
const LOG_FILE: &str = "task_timelog.log";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
	#[error("failed to read settings at {}: {source}", path.display())]
	Io {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},
	#[error("failed to parse settings at {}: {source}", path.display())]
	Decode {
		path: PathBuf,
		#[source]
		source: toml::de::Error,
	},
}

/// Optional user settings, read from `config.toml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
	#[serde(default)]
	pub store: Option<PathBuf>,
	#[serde(default)]
	pub export_dir: Option<PathBuf>,
}

impl Settings {
	pub fn load() -> Result<Self, ConfigError> {
		Self::load_from(&settings_path())
	}

	/// A missing file yields the defaults.
	pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
		let raw = match fs::read_to_string(path) {
			Ok(raw) => raw,
			Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Self::default()),
			Err(source) => {
				return Err(ConfigError::Io {
					path: path.to_path_buf(),
					source,
				});
			}
		};

		toml::from_str(&raw).map_err(|source| ConfigError::Decode {
			path: path.to_path_buf(),
			source,
		})
	}
}

pub fn resolve_store_path(cli_path: Option<PathBuf>, settings: &Settings) -> PathBuf {
	store_path_from(cli_path, env::var_os("TASKLOG_STORE"), settings, state_dir())
}

fn store_path_from(
	cli_path: Option<PathBuf>,
	env_path: Option<OsString>,
	settings: &Settings,
	state_dir: PathBuf,
) -> PathBuf {
	if let Some(path) = cli_path {
		return absolutize(path);
	}

	if let Some(path) = env_path {
		let path = PathBuf::from(path);
		if !path.as_os_str().is_empty() {
			return absolutize(path);
		}
	}

	if let Some(path) = &settings.store {
		return absolutize(path.clone());
	}

	state_dir.join(STORE_FILE)
}

pub fn resolve_export_dir(cli_dir: Option<PathBuf>, settings: &Settings) -> PathBuf {
	cli_dir
		.or_else(|| settings.export_dir.clone())
		.map(absolutize)
		.unwrap_or_else(|| absolutize(PathBuf::from(".")))
}

pub fn settings_path() -> PathBuf {
	if let Some(path) = env::var_os("TASKLOG_CONFIG") {
		return PathBuf::from(path);
	}
	config_dir().join(CONFIG_FILE)
}

pub fn log_path() -> PathBuf {
	state_dir().join(LOG_FILE)
}

pub fn state_dir() -> PathBuf {
	if let Some(path) = env::var_os("TASKLOG_STATE_DIR") {
		return PathBuf::from(path);
	}

	#[cfg(target_os = "windows")]
	{
		if let Some(path) = env::var_os("LOCALAPPDATA") {
			return PathBuf::from(path).join(APP_DIR);
		}
	}

	if let Some(path) = env::var_os("XDG_STATE_HOME") {
		return PathBuf::from(path).join(APP_DIR);
	}

	if let Some(path) = env::var_os("HOME") {
		return PathBuf::from(path).join(".local").join("state").join(APP_DIR);
	}

	PathBuf::from(".task_timelog")
}

fn config_dir() -> PathBuf {
	#[cfg(target_os = "windows")]
	{
		if let Some(path) = env::var_os("APPDATA") {
			return PathBuf::from(path).join(APP_DIR);
		}
	}

	if let Some(path) = env::var_os("XDG_CONFIG_HOME") {
		return PathBuf::from(path).join(APP_DIR);
	}

	if let Some(path) = env::var_os("HOME") {
		return PathBuf::from(path).join(".config").join(APP_DIR);
	}

	PathBuf::from(".task_timelog")
}

fn absolutize(path: PathBuf) -> PathBuf {
	if path.is_absolute() {
		path
	} else if let Ok(cwd) = env::current_dir() {
		cwd.join(path)
	} else {
		path
	}
}
