//! Locating the `sslocal` executable.
//!
//! The installer drops `sslocal` next to the bridge binary. Running the
//! bridge from a build directory is also supported by falling back to the
//! current working directory.

use std::env;
use std::path::{Path, PathBuf};

use tokio::process::Command;

/// File name of the proxy executable on this platform.
pub const EXECUTABLE: &str = if cfg!(windows) {
    "sslocal.exe"
} else {
    "sslocal"
};

/// Source of the command that launches the proxy.
///
/// The supervisor appends the per-config arguments and wires up stdio; an
/// implementation only decides *what* to run.
pub trait ProxyBinary {
    /// Returns the base command, or `None` if no executable is available.
    fn command(&self) -> Option<Command>;
}

/// The real `sslocal` executable, found on disk.
#[derive(Debug, Clone, Default)]
pub struct Sslocal {
    /// Explicit path that bypasses discovery.
    path: Option<PathBuf>,
}

impl Sslocal {
    /// Searches the executable's directory, then the working directory.
    pub fn discover() -> Self {
        Self::default()
    }

    /// Uses `path` as-is, without searching.
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
        }
    }

    /// Resolves the executable path, if it exists.
    pub fn find(&self) -> Option<PathBuf> {
        if let Some(path) = &self.path {
            return path.is_file().then(|| path.clone());
        }

        let exe_dir = env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(Path::to_path_buf));
        let cwd = env::current_dir().ok();
        search(exe_dir.iter().chain(cwd.iter()))
    }
}

impl ProxyBinary for Sslocal {
    fn command(&self) -> Option<Command> {
        self.find().map(Command::new)
    }
}

/// Returns the first `dir/EXECUTABLE` that is a regular file.
fn search<'a>(dirs: impl IntoIterator<Item = &'a PathBuf>) -> Option<PathBuf> {
    dirs.into_iter()
        .map(|dir| dir.join(EXECUTABLE))
        .find(|candidate| candidate.is_file())
}
