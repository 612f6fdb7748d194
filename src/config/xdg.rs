//! XDG Base Directory support.

use std::path::{Path, PathBuf};

const APP_NAME: &str = "lisp-assistant";

/// XDG directory paths for the assistant.
#[derive(Debug, Clone)]
pub struct XdgDirs {
    /// Config directory (~/.config/lisp-assistant or XDG_CONFIG_HOME/lisp-assistant)
    pub config: PathBuf,
    /// Data directory (~/.local/share/lisp-assistant or XDG_DATA_HOME/lisp-assistant)
    pub data: PathBuf,
}

impl XdgDirs {
    /// Get XDG directories, respecting environment variables.
    pub fn new() -> Self {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        Self::from_roots(
            &home,
            std::env::var_os("XDG_CONFIG_HOME").map(PathBuf::from),
            std::env::var_os("XDG_DATA_HOME").map(PathBuf::from),
        )
    }

    /// Resolve from explicit roots; `None` falls back to the home defaults.
    pub fn from_roots(home: &Path, config_home: Option<PathBuf>, data_home: Option<PathBuf>) -> Self {
        Self {
            config: config_home
                .unwrap_or_else(|| home.join(".config"))
                .join(APP_NAME),
            data: data_home
                .unwrap_or_else(|| home.join(".local/share"))
                .join(APP_NAME),
        }
    }

    /// Ensure all directories exist.
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        for dir in [&self.config, &self.data] {
            std::fs::create_dir_all(dir)?;
        }
        Ok(())
    }

    /// The JSON configuration file.
    pub fn config_file(&self) -> PathBuf {
        self.config.join("config.json")
    }

    /// Where interactively saved code goes unless configured otherwise.
    pub fn default_save_dir(&self) -> PathBuf {
        self.data.join("lisp")
    }
}

impl Default for XdgDirs {
    fn default() -> Self {
        Self::new()
    }
}
