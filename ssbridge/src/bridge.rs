//! The native-messaging loop: read a command, act on it, reply.

use std::future::Future;

use ssbridge_proto::{FrameError, Message};
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, error, info, warn};

use crate::locate::ProxyBinary;
use crate::supervisor::Supervisor;

/// Reply text for a `START` without a config.
pub const MISSING_CONFIG: &str = "Missing config";

/// Reply text for any tag the host does not handle.
pub const UNKNOWN_TYPE: &str = "Unknown message type";

/// Counters reported when a session ends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[non_exhaustive]
pub struct Summary {
    /// Frames decoded and answered.
    pub handled: u64,
    /// Frames dropped as truncated, oversized or malformed.
    pub rejected: u64,
}

/// One bridge session: the supervisor plus the request loop around it.
#[derive(Debug)]
pub struct Bridge<B> {
    /// Owner of the proxy process for this session.
    supervisor: Supervisor<B>,
}

impl<B: ProxyBinary> Bridge<B> {
    /// Creates a session around `supervisor`.
    pub const fn new(supervisor: Supervisor<B>) -> Self {
        Self { supervisor }
    }

    /// Returns the session's supervisor.
    #[cfg(test)]
    pub(crate) const fn supervisor(&self) -> &Supervisor<B> {
        &self.supervisor
    }

    /// Serves requests from `r` until it reaches end of stream.
    ///
    /// See [`Bridge::run_until`].
    pub async fn run(
        &self,
        r: &mut (impl AsyncRead + Unpin),
        w: &mut (impl AsyncWrite + Unpin),
    ) -> Summary {
        self.run_until(r, w, std::future::pending()).await
    }

    /// Serves requests until end of stream or until `shutdown` resolves.
    ///
    /// Sends `READY` first. Bad frames are logged and skipped; only the end
    /// of the input (or a read error, or `shutdown`) ends the loop. The
    /// proxy is always stopped before this returns.
    pub async fn run_until(
        &self,
        r: &mut (impl AsyncRead + Unpin),
        w: &mut (impl AsyncWrite + Unpin),
        shutdown: impl Future<Output = ()>,
    ) -> Summary {
        let mut summary = Summary::default();
        reply(w, &Message::Ready).await;

        tokio::pin!(shutdown);
        loop {
            let next = tokio::select! {
                next = ssbridge_proto::recv(r) => next,
                () = &mut shutdown => {
                    info!("shutdown requested");
                    break;
                }
            };

            match next {
                Ok(Some(msg)) => {
                    summary.handled += 1;
                    let resp = self.dispatch(msg).await;
                    reply(w, &resp).await;
                }
                Ok(None) => {
                    info!("extension disconnected");
                    break;
                }
                Err(FrameError::Io(e)) => {
                    error!(error = %e, "reading from extension failed");
                    break;
                }
                Err(e) => {
                    summary.rejected += 1;
                    warn!(error = %e, "dropping bad frame");
                }
            }
        }

        self.supervisor.stop().await;
        summary
    }

    /// Handles one request and returns the reply for it.
    pub async fn dispatch(&self, msg: Message) -> Message {
        debug!(?msg, "received message");
        match msg {
            Message::Start {
                config: Some(config),
            } => match self.supervisor.start(&config).await {
                Ok(_) => Message::Connected,
                Err(e) => Message::error(e.reply_text()),
            },
            Message::Start { config: None } => Message::error(MISSING_CONFIG),
            Message::Stop => {
                self.supervisor.stop().await;
                Message::Disconnected
            }
            Message::Status => {
                if self.supervisor.status().await {
                    Message::Connected
                } else {
                    Message::Disconnected
                }
            }
            Message::Ready
            | Message::Connected
            | Message::Disconnected
            | Message::Error { .. }
            | Message::Unknown => Message::error(UNKNOWN_TYPE),
        }
    }
}

/// Writes `msg`, logging instead of failing if the extension is gone.
async fn reply(w: &mut (impl AsyncWrite + Unpin), msg: &Message) {
    if let Err(e) = ssbridge_proto::send(w, msg).await {
        warn!(error = %e, "failed to send reply");
    }
}
