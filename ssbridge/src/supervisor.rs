//! Exclusive supervision of the single `sslocal` child process.
//!
//! [`Supervisor`] tracks at most one running proxy. Every state change goes
//! through one async mutex, so `start`, `stop` and `status` never interleave.
//! Each child is owned by a watcher task that waits for it to exit, either
//! on its own or because the supervisor asked for it to be killed. A
//! finished watcher is noticed (and its handle dropped) the next time the
//! lock is taken.

use std::fs::File;
use std::io;
use std::process::{ExitStatus, Stdio};

use ssbridge_proto::ProxyConfig;
use tokio::process::Child;
use tokio::sync::{Mutex, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::locate::ProxyBinary;
use crate::{Error, Result};

/// Builds the `sslocal` command line for `config`.
///
/// The order is part of the contract with sslocal's argument parser.
pub fn proxy_args(config: &ProxyConfig) -> Vec<String> {
    vec![
        "-s".to_owned(),
        config.server_addr(),
        "-k".to_owned(),
        config.password.clone(),
        "-m".to_owned(),
        config.method.clone(),
        "-b".to_owned(),
        config.local_addr(),
        "--protocol".to_owned(),
        "socks".to_owned(),
    ]
}

/// Renders `args` for logging with the `-k` secret masked.
fn redacted(args: &[String]) -> String {
    let mut out = Vec::with_capacity(args.len());
    let mut secret = false;
    for arg in args {
        out.push(if secret { "***" } else { arg.as_str() });
        secret = arg == "-k";
    }
    out.join(" ")
}

/// A running child and the task that owns it.
#[derive(Debug)]
struct Tracked {
    /// OS process ID.
    pid: u32,
    /// Asks the watcher to kill the child.
    kill: oneshot::Sender<()>,
    /// Resolves once the child has been reaped.
    watcher: JoinHandle<io::Result<ExitStatus>>,
}

impl Tracked {
    /// Kills the child (if still running) and waits until it is reaped.
    async fn terminate(self) {
        let pid = self.pid;
        // Fails only when the watcher already finished, which is fine.
        let _ = self.kill.send(());
        match self.watcher.await {
            Ok(Ok(status)) => info!(pid, %status, "sslocal stopped"),
            Ok(Err(e)) => warn!(pid, error = %e, "failed to reap sslocal"),
            Err(e) => error!(pid, error = %e, "sslocal watcher failed"),
        }
    }
}

/// Waits for `child` to exit, or kills it when `kill` fires.
///
/// Dropping the sender also counts as a kill request, so a supervisor that
/// goes away never leaves its child running.
async fn watch(
    mut child: Child,
    pid: u32,
    kill: oneshot::Receiver<()>,
) -> io::Result<ExitStatus> {
    tokio::select! {
        status = child.wait() => {
            match &status {
                Ok(s) => warn!(pid, status = %s, "sslocal exited"),
                Err(e) => warn!(pid, error = %e, "lost track of sslocal"),
            }
            status
        }
        _ = kill => {
            debug!(pid, "killing sslocal");
            if let Err(e) = child.start_kill() {
                debug!(pid, error = %e, "kill failed; child already gone");
            }
            child.wait().await
        }
    }
}

/// Owner of the single proxy process.
#[derive(Debug)]
pub struct Supervisor<B> {
    /// Where the proxy executable comes from.
    binary: B,
    /// Destination for the child's stdout and stderr; discarded if unset.
    output: Option<File>,
    /// The tracked child, if any.
    current: Mutex<Option<Tracked>>,
}

impl<B: ProxyBinary> Supervisor<B> {
    /// Creates a supervisor with nothing running.
    pub fn new(binary: B) -> Self {
        Self {
            binary,
            output: None,
            current: Mutex::new(None),
        }
    }

    /// Sends the child's stdout and stderr to `file`.
    #[must_use]
    pub fn with_output(mut self, file: File) -> Self {
        self.output = Some(file);
        self
    }

    /// Starts the proxy with `config`, replacing any running instance.
    ///
    /// The previous child is killed and reaped before the new one is
    /// spawned, so two proxies never compete for the same local port.
    /// On error nothing is left running. Returns the new child's PID.
    pub async fn start(&self, config: &ProxyConfig) -> Result<u32> {
        let mut current = self.current.lock().await;

        if let Some(previous) = current.take() {
            info!(pid = previous.pid, "replacing running sslocal");
            previous.terminate().await;
        }

        let Some(mut cmd) = self.binary.command() else {
            warn!("sslocal not found");
            return Err(Error::BinaryNotFound);
        };

        let args = proxy_args(config);
        info!(
            program = %cmd.as_std().get_program().to_string_lossy(),
            args = %redacted(&args),
            "starting sslocal"
        );

        cmd.args(&args)
            .stdin(Stdio::null())
            .stdout(self.output_stdio())
            .stderr(self.output_stdio())
            .kill_on_drop(true);

        let child = cmd.spawn().map_err(|e| {
            error!(error = %e, "failed to start sslocal");
            Error::LaunchFailed(e)
        })?;
        let pid = child.id().unwrap_or_default();
        info!(pid, "sslocal started");

        let (kill, on_kill) = oneshot::channel();
        let watcher = tokio::spawn(watch(child, pid, on_kill));
        *current = Some(Tracked { pid, kill, watcher });
        Ok(pid)
    }

    /// Stops the running proxy, if any, and waits until it is reaped.
    ///
    /// Returns `false` when nothing was running.
    pub async fn stop(&self) -> bool {
        let mut current = self.current.lock().await;
        match current.take() {
            Some(tracked) => {
                info!(pid = tracked.pid, "stopping sslocal");
                tracked.terminate().await;
                true
            }
            None => false,
        }
    }

    /// Reports whether a proxy is currently tracked.
    ///
    /// This is a snapshot: it does not check that the proxy is listening,
    /// and the child may exit right after this returns.
    pub async fn status(&self) -> bool {
        let mut current = self.current.lock().await;
        Self::forget_exited(&mut current);
        current.is_some()
    }

    /// PID of the tracked proxy, if any.
    #[cfg(test)]
    pub(crate) async fn pid(&self) -> Option<u32> {
        let mut current = self.current.lock().await;
        Self::forget_exited(&mut current);
        current.as_ref().map(|t| t.pid)
    }

    /// Clears the slot if its watcher has already reaped the child.
    fn forget_exited(current: &mut Option<Tracked>) {
        if let Some(tracked) = current.take_if(|t| t.watcher.is_finished()) {
            debug!(pid = tracked.pid, "cleared exited sslocal");
        }
    }

    /// A fresh stdio handle onto the log sink, or null.
    ///
    /// A handle that cannot be duplicated only costs the child's output; the
    /// proxy still starts.
    fn output_stdio(&self) -> Stdio {
        let Some(file) = &self.output else {
            return Stdio::null();
        };
        match file.try_clone() {
            Ok(handle) => Stdio::from(handle),
            Err(e) => {
                warn!(error = %e, "cannot share log file with sslocal; discarding its output");
                Stdio::null()
            }
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::fs;
    use std::io::Write;
    use std::sync::{Arc, Mutex as StdMutex};
    use std::time::Duration;

    use super::*;
    use crate::testing::{Shell, config, eventually, is_running};

    #[test]
    fn args_are_in_sslocal_order() {
        let args = proxy_args(&ProxyConfig::new("ss.example", 8388, 1081, "aes-128-gcm", "pw"));
        assert_eq!(
            args,
            [
                "-s",
                "ss.example:8388",
                "-k",
                "pw",
                "-m",
                "aes-128-gcm",
                "-b",
                "127.0.0.1:1081",
                "--protocol",
                "socks"
            ]
        );
    }

    #[test]
    fn redaction_masks_only_the_secret() {
        let args = proxy_args(&config());
        let shown = redacted(&args);
        assert!(!shown.contains("s3cret"));
        assert!(shown.contains("-k *** -m"));
        assert!(shown.ends_with("--protocol socks"));
    }

    #[tokio::test]
    async fn start_launches_one_child() {
        let sup = Supervisor::new(Shell::sleeper());
        assert!(!sup.status().await);

        let pid = sup.start(&config()).await.unwrap();
        assert!(sup.status().await);
        assert_eq!(sup.pid().await, Some(pid));
        assert!(is_running(pid));

        assert!(sup.stop().await);
        assert!(!sup.status().await);
        assert!(!is_running(pid));
    }

    #[tokio::test]
    async fn child_receives_proxy_args() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("argv");
        let script = format!(
            "printf '%s\\n' \"$@\" > '{}.tmp' && mv '{0}.tmp' '{0}'; exec sleep 30",
            out.display()
        );
        let sup = Supervisor::new(Shell::new(&script));

        sup.start(&config()).await.unwrap();
        assert!(eventually(|| out.exists()).await);
        let argv = fs::read_to_string(&out).unwrap();
        let expected = proxy_args(&config()).join("\n") + "\n";
        assert_eq!(argv, expected);

        sup.stop().await;
    }

    #[tokio::test]
    async fn second_start_reaps_the_first() {
        let sup = Supervisor::new(Shell::sleeper());

        let first = sup.start(&config()).await.unwrap();
        let second = sup.start(&config()).await.unwrap();

        assert_ne!(first, second);
        assert!(!is_running(first), "first child must be reaped before start returns");
        assert!(is_running(second));
        assert_eq!(sup.pid().await, Some(second));

        sup.stop().await;
        assert!(!is_running(second));
    }

    #[tokio::test]
    async fn stop_is_idempotent() {
        let sup = Supervisor::new(Shell::sleeper());
        assert!(!sup.stop().await);

        sup.start(&config()).await.unwrap();
        assert!(sup.stop().await);
        assert!(!sup.stop().await);
    }

    #[tokio::test]
    async fn crash_is_observed_without_stop() {
        let sup = Supervisor::new(Shell::new("exit 3"));
        sup.start(&config()).await.unwrap();

        let mut exited = false;
        for _ in 0..100 {
            if !sup.status().await {
                exited = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        assert!(exited, "status should report the crashed child as gone");
        assert_eq!(sup.pid().await, None);
    }

    /// In-memory log target for asserting on emitted events.
    #[derive(Clone, Default)]
    struct Captured(Arc<StdMutex<Vec<u8>>>);

    impl Captured {
        fn text(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    impl Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn crashed_child_is_cleared_not_stopped() {
        let logs = Captured::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let sup = Supervisor::new(Shell::new("exit 3"));
        sup.start(&config()).await.unwrap();
        for _ in 0..100 {
            if !sup.status().await {
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        assert!(!sup.stop().await, "crashed child must already be cleared");

        let text = logs.text();
        assert!(text.contains("sslocal exited"), "{text}");
        assert!(text.contains("cleared exited sslocal"), "{text}");
        assert!(!text.contains("sslocal stopped"), "{text}");
    }

    #[tokio::test]
    async fn missing_binary_leaves_nothing_running() {
        let shell = Shell::sleeper();
        let sup = Supervisor::new(shell.clone());
        let pid = sup.start(&config()).await.unwrap();

        shell.set(None);
        assert!(matches!(sup.start(&config()).await, Err(Error::BinaryNotFound)));
        assert!(!sup.status().await);
        assert!(!is_running(pid));
    }

    #[tokio::test]
    async fn launch_failure_is_reported() {
        let sup = Supervisor::new(Shell::program("/nonexistent/sslocal"));
        let err = sup.start(&config()).await.unwrap_err();
        assert!(matches!(err, Error::LaunchFailed(ref e) if e.kind() == io::ErrorKind::NotFound));
        assert!(!sup.status().await);
    }

    #[tokio::test]
    async fn child_output_goes_to_log() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("bridge.log");
        let file = File::create(&log).unwrap();
        let sup = Supervisor::new(Shell::new("echo listening; echo oops >&2; exec sleep 30"))
            .with_output(file);

        sup.start(&config()).await.unwrap();
        let seen = eventually(|| {
            fs::read_to_string(&log).is_ok_and(|s| s.contains("listening") && s.contains("oops"))
        })
        .await;
        assert!(seen);

        sup.stop().await;
    }

    #[tokio::test]
    async fn dropping_the_supervisor_kills_the_child() {
        let sup = Supervisor::new(Shell::sleeper());
        let pid = sup.start(&config()).await.unwrap();
        drop(sup);

        assert!(eventually(|| !is_running(pid)).await);
    }
}
