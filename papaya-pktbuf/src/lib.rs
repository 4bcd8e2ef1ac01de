#![no_std]

//! Uniform, windowed access to packet bytes for eBPF dissectors.
//!
//! A [`PktBuf`] wraps one of three packet sources (a TC socket buffer, a
//! decrypted TLS buffer in user memory, or an `sk_msg` buffer) and exposes
//! the same `[data_offset, data_end)` window, big-endian scalar reads and
//! block-chunked bulk reads over all of them.

#[cfg(any(test, feature = "host"))]
extern crate std;

mod chunked;
mod endian;
mod error;
mod platform;
mod telemetry;
mod view;

#[cfg(any(test, feature = "host"))]
pub mod host;
#[cfg(feature = "ebpf")]
pub mod kernel;

pub use endian::BigEndian;
pub use error::Error;
pub use platform::{Platform, SkMsgLoad, SkbLoad};
pub use telemetry::{LoadTelemetry, SOURCE_COUNT};
pub use view::{PktBuf, SkbInfo, Source, TlsStream};
