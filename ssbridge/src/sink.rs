//! Shared append-mode log file.
//!
//! The bridge's own tracing output and the proxy's stdout/stderr all land
//! in the same file. Stdout itself is reserved for protocol frames.

use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

/// File name used under the platform temp directory.
pub const DEFAULT_LOG_NAME: &str = "outline-proxy.log";

/// An open log file shared by the bridge and its child.
#[derive(Debug)]
pub struct LogSink {
    /// Location of the file, for diagnostics.
    path: PathBuf,
    /// Append-mode handle; clones share the same open file description.
    file: File,
}

impl LogSink {
    /// Default location: `<temp dir>/outline-proxy.log`.
    pub fn default_path() -> PathBuf {
        std::env::temp_dir().join(DEFAULT_LOG_NAME)
    }

    /// Opens (or creates) `path` for appending.
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self { path, file })
    }

    /// Returns the file location.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns another handle onto the same file.
    pub fn handle(&self) -> io::Result<File> {
        self.file.try_clone()
    }

    /// Flushes everything written so far to disk and closes this handle.
    pub fn close(self) -> io::Result<()> {
        self.file.sync_all()
    }
}
