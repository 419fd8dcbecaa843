//! Output files consumed by the overlay renderer.
//!
//! Each rendered reading overwrites a text file and, optionally, a JSON
//! file. Writes go to a sibling temporary file that is then renamed over the
//! target, so a reader polling the files sees either the previous reading or
//! the new one, never a truncated file.

use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

use crate::render::RenderedOutput;

/// Default path of the overlay text file.
pub const DEFAULT_TEXT_OUTPUT: &str = "./weewx-wx.txt";

/// Default path of the structured JSON file.
pub const DEFAULT_JSON_OUTPUT: &str = "./weewx-wx.json";

/// Errors that can occur while writing output files.
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("Failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to serialize record: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Writes rendered readings to their fixed output paths.
#[derive(Debug, Clone)]
pub struct OutputWriter {
    text_path: PathBuf,
    json_path: Option<PathBuf>,
}

impl OutputWriter {
    /// Create a writer. `json_path` of `None` disables the JSON file.
    pub fn new(text_path: impl Into<PathBuf>, json_path: Option<PathBuf>) -> Self {
        Self {
            text_path: text_path.into(),
            json_path,
        }
    }

    pub fn text_path(&self) -> &Path {
        &self.text_path
    }

    pub fn json_path(&self) -> Option<&Path> {
        self.json_path.as_deref()
    }

    /// Overwrite the output files with a rendered reading.
    ///
    /// The text file is written first. If it fails the JSON file is left
    /// untouched.
    pub fn write(&self, output: &RenderedOutput) -> Result<(), OutputError> {
        replace_file(&self.text_path, output.summary.as_bytes())?;
        debug!("Wrote {}", self.text_path.display());

        if let Some(json_path) = &self.json_path {
            let json = output.record.to_json()?;
            replace_file(json_path, json.as_bytes())?;
            debug!("Wrote {}", json_path.display());
        }

        Ok(())
    }
}

impl Default for OutputWriter {
    fn default() -> Self {
        Self::new(DEFAULT_TEXT_OUTPUT, Some(PathBuf::from(DEFAULT_JSON_OUTPUT)))
    }
}

/// Replace `path` with `contents` via a temporary file and a rename.
fn replace_file(path: &Path, contents: &[u8]) -> Result<(), OutputError> {
    let tmp_path = temp_path_for(path);
    let io_err = |source| OutputError::Io {
        path: path.to_path_buf(),
        source,
    };

    fs::write(&tmp_path, contents).map_err(io_err)?;
    if let Err(e) = fs::rename(&tmp_path, path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(io_err(e));
    }
    Ok(())
}

/// `dir/name.ext` becomes `dir/.name.ext.tmp`.
fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = OsString::from(".");
    name.push(path.file_name().unwrap_or_else(|| path.as_os_str()));
    name.push(".tmp");
    path.with_file_name(name)
}
