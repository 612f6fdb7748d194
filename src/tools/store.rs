//! Persistence of generated code.
//!
//! A save is either interactive (the user picks a permanent location, or
//! cancels) or non-interactive (always the fixed temporary file, which is
//! overwritten on every call).

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Local;
use dialoguer::{theme::ColorfulTheme, Input};
use thiserror::Error;
use tracing::debug;

/// File name of the non-interactive save target inside the temp directory.
pub const TEMP_FILE_NAME: &str = "tmpAIGenLisp.lsp";

const LISP_EXTENSION: &str = "lsp";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error writing {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Persists code and reports where it went.
pub trait CodeArtifactStore: Send + Sync {
    /// Persist `code`.
    ///
    /// Interactive saves return `Ok(None)` when the user declines to pick a
    /// location. Non-interactive saves always return the temporary path.
    fn save(&self, code: &str, interactive: bool) -> Result<Option<PathBuf>, StoreError>;

    /// The fixed non-interactive target.
    fn temp_path(&self) -> PathBuf;
}

/// Picks the destination of an interactive save.
pub trait SaveLocationChooser: Send + Sync {
    /// `None` means the user cancelled.
    fn choose(&self) -> Option<PathBuf>;
}

/// Store backed by the local filesystem.
pub struct FileArtifactStore {
    temp_dir: PathBuf,
    chooser: Box<dyn SaveLocationChooser>,
}

impl FileArtifactStore {
    /// Store using the system temporary directory.
    pub fn new(chooser: impl SaveLocationChooser + 'static) -> Self {
        Self::with_temp_dir(std::env::temp_dir(), chooser)
    }

    pub fn with_temp_dir(
        temp_dir: impl Into<PathBuf>,
        chooser: impl SaveLocationChooser + 'static,
    ) -> Self {
        Self {
            temp_dir: temp_dir.into(),
            chooser: Box::new(chooser),
        }
    }
}

fn write_code(path: &Path, code: &str) -> Result<(), StoreError> {
    let io_err = |source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
    }
    fs::write(path, code).map_err(io_err)
}

impl CodeArtifactStore for FileArtifactStore {
    fn save(&self, code: &str, interactive: bool) -> Result<Option<PathBuf>, StoreError> {
        let path = if interactive {
            match self.chooser.choose() {
                Some(path) => path,
                None => {
                    debug!("Save location not chosen");
                    return Ok(None);
                }
            }
        } else {
            self.temp_path()
        };

        write_code(&path, code)?;
        debug!(path = %path.display(), bytes = code.len(), interactive, "Code saved");
        Ok(Some(path))
    }

    fn temp_path(&self) -> PathBuf {
        self.temp_dir.join(TEMP_FILE_NAME)
    }
}

/// Saves into a fixed directory under a timestamped name.
#[derive(Debug, Clone)]
pub struct DirectoryChooser {
    dir: PathBuf,
}

impl DirectoryChooser {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl SaveLocationChooser for DirectoryChooser {
    fn choose(&self) -> Option<PathBuf> {
        let stamp = Local::now().format("%Y%m%d_%H%M%S");
        let mut candidate = self.dir.join(format!("ai_lisp_{stamp}.{LISP_EXTENSION}"));
        let mut n = 1;
        while candidate.exists() {
            candidate = self
                .dir
                .join(format!("ai_lisp_{stamp}_{n}.{LISP_EXTENSION}"));
            n += 1;
        }
        Some(candidate)
    }
}

/// Asks for a file name on the terminal.
#[derive(Debug, Clone)]
pub struct PromptChooser {
    default_dir: PathBuf,
}

impl PromptChooser {
    pub fn new(default_dir: impl Into<PathBuf>) -> Self {
        Self {
            default_dir: default_dir.into(),
        }
    }

    /// Turn what the user typed into a save path.
    fn resolve(&self, input: &str) -> Option<PathBuf> {
        let input = input.trim();
        if input.is_empty() {
            return None;
        }
        let mut path = PathBuf::from(input);
        if path.is_relative() {
            path = self.default_dir.join(path);
        }
        if path.extension().is_none() {
            path.set_extension(LISP_EXTENSION);
        }
        Some(path)
    }
}

impl SaveLocationChooser for PromptChooser {
    fn choose(&self) -> Option<PathBuf> {
        let input: String = Input::<String>::with_theme(&ColorfulTheme::default())
            .with_prompt(format!(
                "Save LISP file as (relative to {}, empty to cancel)",
                self.default_dir.display()
            ))
            .allow_empty(true)
            .interact_text()
            .unwrap_or_default();
        self.resolve(&input)
    }
}
