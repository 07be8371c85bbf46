//! Test doubles for running the supervisor against `/bin/sh`.

use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use ssbridge_proto::ProxyConfig;
use tokio::process::Command;

use crate::locate::ProxyBinary;

/// A swappable stand-in for `sslocal`.
///
/// Scripts run as `sh -c <script> sslocal <proxy args...>`, so the proxy
/// arguments show up as `$1..$n`. `None` simulates a missing executable.
#[derive(Debug, Clone)]
pub(crate) struct Shell(Arc<Mutex<Option<Vec<String>>>>);

impl Shell {
    fn argv(argv: Option<Vec<String>>) -> Self {
        Self(Arc::new(Mutex::new(argv)))
    }

    fn script_argv(script: &str) -> Vec<String> {
        ["/bin/sh", "-c", script, "sslocal"]
            .map(str::to_owned)
            .to_vec()
    }

    pub(crate) fn new(script: &str) -> Self {
        Self::argv(Some(Self::script_argv(script)))
    }

    /// A child that stays up until killed.
    pub(crate) fn sleeper() -> Self {
        Self::new("exec sleep 30")
    }

    pub(crate) fn missing() -> Self {
        Self::argv(None)
    }

    /// Runs `path` directly instead of a script.
    pub(crate) fn program(path: &str) -> Self {
        Self::argv(Some(vec![path.to_owned()]))
    }

    pub(crate) fn set(&self, script: Option<&str>) {
        *self.0.lock().unwrap() = script.map(Self::script_argv);
    }
}

impl ProxyBinary for Shell {
    fn command(&self) -> Option<Command> {
        let argv = self.0.lock().unwrap().clone()?;
        let (program, args) = argv.split_first()?;
        let mut cmd = Command::new(program);
        cmd.args(args);
        Some(cmd)
    }
}

pub(crate) fn config() -> ProxyConfig {
    ProxyConfig::new("198.51.100.4", 8388, 1080, "chacha20-ietf-poly1305", "s3cret")
}

/// Polls `cond` for up to five seconds.
pub(crate) async fn eventually(mut cond: impl FnMut() -> bool) -> bool {
    for _ in 0..100 {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    false
}

/// Whether `pid` names a process that has not been reaped yet.
pub(crate) fn is_running(pid: u32) -> bool {
    std::process::Command::new("kill")
        .arg("-0")
        .arg(pid.to_string())
        .stderr(Stdio::null())
        .status()
        .is_ok_and(|s| s.success())
}
