//! `ssbridge` — native-messaging host that runs `sslocal` for a browser
//! extension.
//!
//! The browser starts this binary with stdin/stdout connected to the
//! extension. Nothing but protocol frames may be written to stdout; all
//! diagnostics go to the log file.

#![allow(
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::missing_docs_in_private_items
)]

mod manifest;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Mutex;

use anyhow::{Context, Result};
use clap::{ArgAction, CommandFactory, Parser};
use clap_complete::Shell;
use ssbridge::{Bridge, LogSink, Sslocal, Supervisor};
use tracing::{info, warn};
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Environment variable holding a tracing filter directive.
const LOG_ENV: &str = "SSBRIDGE_LOG";

#[derive(Parser)]
#[command(
    name = "ssbridge",
    version,
    about = "Native-messaging host that supervises a local sslocal proxy"
)]
struct Cli {
    /// Arguments supplied by the browser (caller origin, or manifest path
    /// and extension ID). Logged, otherwise unused.
    caller: Vec<String>,

    /// Native window handle of the calling browser (Windows only).
    #[arg(long, value_name = "HANDLE")]
    parent_window: Option<String>,

    /// Log file shared with sslocal [default: <temp dir>/outline-proxy.log].
    #[arg(long, value_name = "PATH")]
    log_file: Option<PathBuf>,

    /// Path to the sslocal executable, skipping discovery.
    #[arg(long, value_name = "PATH")]
    sslocal: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace).
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,

    /// Print the host manifest for the given extension ID and exit.
    #[arg(long, value_name = "EXTENSION_ID")]
    manifest: Option<String>,

    /// Generate shell completion scripts.
    #[arg(long, value_name = "SHELL", hide = true)]
    completion: Option<Shell>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("ssbridge: failed to start runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    let result = runtime.block_on(cli.dispatch());
    // A pending stdin read cannot be cancelled; don't wait for it.
    runtime.shutdown_background();

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("ssbridge: {e:#}");
            ExitCode::FAILURE
        }
    }
}

impl Cli {
    async fn dispatch(self) -> Result<()> {
        if let Some(shell) = self.completion {
            clap_complete::generate(shell, &mut Self::command(), "ssbridge", &mut std::io::stdout());
            return Ok(());
        }
        if let Some(id) = &self.manifest {
            let manifest = manifest::Manifest::for_current_exe(id)?;
            println!("{}", serde_json::to_string_pretty(&manifest)?);
            return Ok(());
        }
        self.serve().await
    }

    /// Runs one bridge session over stdin/stdout.
    async fn serve(self) -> Result<()> {
        let log_path = self.log_file.unwrap_or_else(LogSink::default_path);
        // Without a log file the bridge still works; diagnostics fall back
        // to stderr and sslocal's output is discarded.
        let sink = match LogSink::open(&log_path) {
            Ok(sink) => Some(sink),
            Err(e) => {
                eprintln!("ssbridge: cannot open {}: {e}", log_path.display());
                None
            }
        };
        init_tracing(sink.as_ref(), self.verbose)?;

        info!(
            caller = ?self.caller,
            parent_window = ?self.parent_window,
            version = env!("CARGO_PKG_VERSION"),
            "native host started"
        );

        let binary = self.sslocal.map_or_else(Sslocal::discover, Sslocal::at);
        let mut supervisor = Supervisor::new(binary);
        if let Some(sink) = &sink {
            supervisor = supervisor.with_output(sink.handle().context("failed to share log file")?);
        }

        let bridge = Bridge::new(supervisor);
        let summary = bridge
            .run_until(&mut tokio::io::stdin(), &mut tokio::io::stdout(), shutdown_signal())
            .await;
        info!(
            handled = summary.handled,
            rejected = summary.rejected,
            "native host exiting"
        );

        if let Some(sink) = sink {
            sink.close().context("failed to flush log file")?;
        }
        Ok(())
    }
}

/// Installs the global subscriber, writing to the log sink when available.
///
/// `SSBRIDGE_LOG` takes precedence over `-v`.
fn init_tracing(sink: Option<&LogSink>, verbose: u8) -> Result<()> {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| {
        EnvFilter::new(match verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        })
    });

    let writer = match sink {
        Some(sink) => BoxMakeWriter::new(Mutex::new(
            sink.handle().context("failed to share log file")?,
        )),
        None => BoxMakeWriter::new(std::io::stderr),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_ansi(false).with_writer(writer))
        .try_init()
        .context("failed to initialize logging")
}

/// Resolves on SIGTERM or Ctrl-C.
///
/// Never resolves if no signal handler can be installed.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut term = match signal(SignalKind::terminate()) {
            Ok(term) => term,
            Err(e) => {
                warn!(error = %e, "cannot listen for SIGTERM");
                return ctrl_c().await;
            }
        };
        tokio::select! {
            _ = term.recv() => info!("received SIGTERM"),
            () = ctrl_c() => {}
        }
    }

    #[cfg(not(unix))]
    ctrl_c().await;
}

/// Resolves on Ctrl-C, or never if the handler cannot be installed.
async fn ctrl_c() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("received Ctrl-C"),
        Err(e) => {
            warn!(error = %e, "cannot listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    }
}
