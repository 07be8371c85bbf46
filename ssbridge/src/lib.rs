//! Native-messaging bridge that supervises a local Shadowsocks proxy.
//!
//! A browser extension talks to this process over stdin/stdout using the
//! length-prefixed JSON frames defined in [`ssbridge_proto`]. Each command
//! is turned into an operation on a single `sslocal` child process, which
//! the [`Supervisor`] starts, replaces, stops, and watches for crashes.
//!
//! # Quick start
//!
//! ```no_run
//! use ssbridge::{Bridge, LogSink, Sslocal, Supervisor};
//!
//! # async fn serve() -> std::io::Result<()> {
//! let sink = LogSink::open(LogSink::default_path())?;
//! let supervisor = Supervisor::new(Sslocal::discover()).with_output(sink.handle()?);
//! let bridge = Bridge::new(supervisor);
//!
//! // Returns once the extension closes stdin; the proxy is stopped by then.
//! bridge
//!     .run(&mut tokio::io::stdin(), &mut tokio::io::stdout())
//!     .await;
//! sink.close()
//! # }
//! ```

mod bridge;
mod error;
mod locate;
mod sink;
mod supervisor;
#[cfg(all(test, unix))]
mod testing;

pub use bridge::{Bridge, MISSING_CONFIG, Summary, UNKNOWN_TYPE};
pub use error::{Error, Result};
pub use locate::{EXECUTABLE, ProxyBinary, Sslocal};
pub use sink::{DEFAULT_LOG_NAME, LogSink};
pub use ssbridge_proto::{Message, ProxyConfig};
pub use supervisor::{Supervisor, proxy_args};
