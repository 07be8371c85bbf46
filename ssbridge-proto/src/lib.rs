//! Wire protocol between a browser extension and the ssbridge native host.
//!
//! Messages are JSON objects framed with a 4-byte little-endian length
//! prefix, which is what the browser's native-messaging transport writes to
//! and expects from the host's stdin/stdout.

mod codec;
mod message;

pub use codec::{FrameError, MAX_FRAME, encode, recv, send};
pub use message::{HOST_NAME, Message, ProxyConfig};
