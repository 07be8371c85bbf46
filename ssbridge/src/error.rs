//! Error types for ssbridge operations.

use std::io;

/// Alias for `Result<T, ssbridge::Error>`.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned by supervisor and bridge operations.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// No `sslocal` executable could be located.
    #[error("sslocal executable not found")]
    BinaryNotFound,

    /// The OS refused to start `sslocal`.
    #[error("failed to launch sslocal: {0}")]
    LaunchFailed(#[source] io::Error),
}

impl Error {
    /// Text carried by the `ERROR` reply sent to the extension.
    ///
    /// Only the error kind is exposed; OS error codes stay in the log.
    pub fn reply_text(&self) -> String {
        match self {
            Self::BinaryNotFound => "sslocal not found. Please run the installer.".to_owned(),
            Self::LaunchFailed(e) => format!("Failed to start: {}", e.kind()),
        }
    }
}
