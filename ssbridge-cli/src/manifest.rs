//! Native-messaging host manifest generation.
//!
//! The browser only launches hosts that are registered with a manifest
//! naming the executable and the extensions allowed to talk to it.

use std::path::PathBuf;

use anyhow::{Context, Result, ensure};
use serde::Serialize;
use ssbridge_proto::HOST_NAME;

/// Length of a Chromium extension ID.
const EXTENSION_ID_LEN: usize = 32;

/// Host manifest as read by Chromium-based browsers.
#[derive(Debug, Serialize)]
pub(crate) struct Manifest {
    name: &'static str,
    description: &'static str,
    path: PathBuf,
    #[serde(rename = "type")]
    kind: &'static str,
    allowed_origins: Vec<String>,
}

impl Manifest {
    /// Builds a manifest for the executable at `path`.
    pub(crate) fn new(path: PathBuf, extension_id: &str) -> Result<Self> {
        ensure!(
            is_extension_id(extension_id),
            "invalid extension ID '{extension_id}': expected {EXTENSION_ID_LEN} characters in a-p"
        );
        Ok(Self {
            name: HOST_NAME,
            description: "Outline proxy native host",
            path,
            kind: "stdio",
            allowed_origins: vec![format!("chrome-extension://{extension_id}/")],
        })
    }

    /// Builds a manifest pointing at the running executable.
    pub(crate) fn for_current_exe(extension_id: &str) -> Result<Self> {
        let path = std::env::current_exe().context("failed to resolve executable path")?;
        Self::new(path, extension_id)
    }
}

/// Chromium extension IDs are 32 letters from `a` to `p`.
fn is_extension_id(id: &str) -> bool {
    id.len() == EXTENSION_ID_LEN && id.bytes().all(|b| (b'a'..=b'p').contains(&b))
}
