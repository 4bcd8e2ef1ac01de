#![no_std]

use core::{cmp, mem};

use papaya_pktbuf::Source;

mod request;

pub use request::{parse_request, MIN_HEADER_LEN};

/// Room for the client id in an event; longer ids are truncated.
pub const CLIENT_ID_SIZE: usize = 30;
/// Block size used when copying the client id out of the packet.
pub const CLIENT_ID_BLOCK: usize = 8;

/// A Kafka request header seen on one of the packet sources.
#[derive(Copy, Clone, Debug)]
#[repr(C)]
pub struct KafkaRequest {
    pub pid: u32,
    pub message_size: i32,
    pub correlation_id: i32,
    pub api_key: i16,
    pub api_version: i16,
    /// As encoded on the wire, -1 for a null client id.
    pub client_id_size: i16,
    /// Bytes of `client_id` holding packet data.
    pub client_id_len: u16,
    pub source: u8,
    pub client_id: [u8; CLIENT_ID_SIZE],
}

#[cfg(feature = "user")]
unsafe impl aya::Pod for KafkaRequest {}

impl KafkaRequest {
    pub const LEN: usize = mem::size_of::<KafkaRequest>();

    pub const fn empty() -> Self {
        Self {
            pid: 0,
            message_size: 0,
            correlation_id: 0,
            api_key: 0,
            api_version: 0,
            client_id_size: 0,
            client_id_len: 0,
            source: 0,
            client_id: [0; CLIENT_ID_SIZE],
        }
    }

    pub fn client_id(&self) -> &[u8] {
        &self.client_id[..cmp::min(self.client_id_len as usize, CLIENT_ID_SIZE)]
    }

    pub fn source(&self) -> Option<Source> {
        Source::from_u8(self.source)
    }

    /// True when the client id on the wire didn't fit the event.
    pub fn client_id_truncated(&self) -> bool {
        self.client_id_size > 0 && (self.client_id_len as i16) < self.client_id_size
    }
}

/// Key of the socket map the sk_msg program is attached to.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(C)]
pub struct SockKey {
    pub local_ip4: u32,
    pub remote_ip4: u32,
    pub local_port: u32,
    pub remote_port: u32,
}

#[cfg(feature = "user")]
unsafe impl aya::Pod for SockKey {}
