// SPDX-License-Identifier: GPL-3.0-only

use std::{
    fs, io,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

pub mod app_chooser;
pub mod file_chooser;

pub const APP_ID: &str = "xdg-desktop-portal-chooser";
pub const CONFIG_FILE: &str = "config.toml";

pub const DEFAULT_BUS_NAME: &str = "org.freedesktop.impl.portal.desktop.chooser";
pub const DEFAULT_DIALOG_PROGRAM: &str = "zenity";

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Well-known name owned on the session bus
    pub bus_name: String,
    /// Overrides the mount point reported by the document portal
    pub document_mount_point: Option<PathBuf>,
    /// Program used to render dialogs, must understand zenity's arguments
    pub dialog_program: String,
    pub file_chooser: file_chooser::FileChooser,
    pub app_chooser: app_chooser::AppChooser,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bus_name: DEFAULT_BUS_NAME.to_string(),
            document_mount_point: None,
            dialog_program: DEFAULT_DIALOG_PROGRAM.to_string(),
            file_chooser: file_chooser::FileChooser::default(),
            app_chooser: app_chooser::AppChooser::default(),
        }
    }
}

impl Config {
    /// Default location, `$XDG_CONFIG_HOME/xdg-desktop-portal-chooser/config.toml`.
    pub fn path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(APP_ID).join(CONFIG_FILE))
    }

    /// Load the configuration, falling back to defaults on any error.
    pub fn load(path: Option<&Path>) -> Self {
        let Some(path) = path.map(Path::to_path_buf).or_else(Self::path) else {
            log::warn!("no config directory, using default configuration");
            return Self::default();
        };

        match Self::load_from(&path) {
            Ok(config) => config,
            Err(Error::IO(err)) if err.kind() == io::ErrorKind::NotFound => {
                log::debug!("no configuration at {}, using defaults", path.display());
                Self::default()
            }
            Err(err) => {
                log::warn!("failed to load {}: {err}", path.display());
                Self::default()
            }
        }
    }

    pub fn load_from(path: &Path) -> Result<Self, Error> {
        let buf = fs::read_to_string(path)?;
        Self::parse(&buf)
    }

    pub fn parse(buf: &str) -> Result<Self, Error> {
        Ok(toml::from_str(buf)?)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error occured when loading the configuration file: {0}")]
    IO(#[from] io::Error),
    #[error("An error occured while parsing the configuration file: {0}")]
    Parse(#[from] toml::de::Error),
}
