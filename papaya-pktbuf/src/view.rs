use core::{cmp, ffi::c_long};

use crate::{Error, Platform, SkMsgLoad, SkbLoad};

/// Precomputed payload window of a socket buffer, in absolute skb offsets.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
#[repr(C)]
pub struct SkbInfo {
    pub data_off: u32,
    pub data_end: u32,
}

impl SkbInfo {
    pub const fn new(data_off: u32, data_end: u32) -> Self {
        Self { data_off, data_end }
    }
}

/// A decrypted TLS buffer in user memory.
///
/// Offsets are relative to `buffer_ptr`; `[data_off, data_end)` is the part
/// holding plaintext.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
#[repr(C)]
pub struct TlsStream {
    pub buffer_ptr: u64,
    pub data_off: u32,
    pub data_end: u32,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum Source {
    Skb = 0,
    Tls = 1,
    SkMsg = 2,
}

impl Source {
    pub const ALL: [Source; 3] = [Source::Skb, Source::Tls, Source::SkMsg];

    /// Slot of this source in per-source maps.
    pub const fn index(self) -> u32 {
        self as u32
    }

    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Source::Skb),
            1 => Some(Source::Tls),
            2 => Some(Source::SkMsg),
            _ => None,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Source::Skb => "skb",
            Source::Tls => "tls",
            Source::SkMsg => "sk_msg",
        }
    }
}

/// Read-only view over the packet a program invocation is looking at.
///
/// The view borrows its backend handle and never outlives the invocation
/// that built it.
pub enum PktBuf<'a, P: Platform> {
    Skb {
        skb: &'a P::Skb,
        info: Option<&'a SkbInfo>,
    },
    Tls(&'a TlsStream),
    SkMsg(&'a P::Msg),
}

impl<P: Platform> Clone for PktBuf<'_, P> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<P: Platform> Copy for PktBuf<'_, P> {}

impl<'a, P: Platform> PktBuf<'a, P> {
    #[inline(always)]
    pub fn from_skb(skb: &'a P::Skb, info: Option<&'a SkbInfo>) -> Self {
        PktBuf::Skb { skb, info }
    }

    #[inline(always)]
    pub fn from_tls(tls: &'a TlsStream) -> Self {
        PktBuf::Tls(tls)
    }

    #[inline(always)]
    pub fn from_sk_msg(msg: &'a P::Msg) -> Self {
        PktBuf::SkMsg(msg)
    }

    #[inline(always)]
    pub fn source(&self) -> Source {
        match self {
            PktBuf::Skb { .. } => Source::Skb,
            PktBuf::Tls(_) => Source::Tls,
            PktBuf::SkMsg(_) => Source::SkMsg,
        }
    }

    /// Start of the readable window. An inverted window collapses onto
    /// `data_end`.
    #[inline(always)]
    pub fn data_offset(&self) -> u32 {
        match *self {
            PktBuf::Skb { info, .. } => {
                info.map_or(0, |info| cmp::min(info.data_off, info.data_end))
            }
            PktBuf::Tls(tls) => cmp::min(tls.data_off, tls.data_end),
            PktBuf::SkMsg(_) => 0,
        }
    }

    #[inline(always)]
    pub fn data_end(&self) -> u32 {
        match *self {
            PktBuf::Skb { info, .. } => info.map_or(0, |info| info.data_end),
            PktBuf::Tls(tls) => tls.data_end,
            PktBuf::SkMsg(msg) => msg.size(),
        }
    }

    /// Copies `dst.len()` bytes starting at `offset` into `dst`.
    ///
    /// Fails without touching `dst` when the range leaves the window.
    #[inline(always)]
    pub fn load(&self, offset: u32, dst: &mut [u8]) -> Result<(), Error> {
        self.check_window(offset, dst.len())?;
        if dst.is_empty() {
            return Ok(());
        }

        match *self {
            PktBuf::Skb { skb, .. } => complete(dst.len(), skb.load_bytes(offset, dst)),
            PktBuf::Tls(tls) => {
                P::read_user(tls.buffer_ptr.wrapping_add(offset as u64), dst).map_err(Error::Helper)
            }
            // sk_msg copies can come up short on scattered messages
            PktBuf::SkMsg(_) => self.copy_with_telemetry(offset, dst),
        }
    }

    #[inline(always)]
    pub(crate) fn check_window(&self, offset: u32, len: usize) -> Result<(), Error> {
        let len = u32::try_from(len).map_err(|_| Error::OutOfBounds)?;
        let end = offset.checked_add(len).ok_or(Error::OutOfBounds)?;
        if offset < self.data_offset() || end > self.data_end() {
            return Err(Error::OutOfBounds);
        }
        Ok(())
    }
}

#[inline(always)]
pub(crate) fn complete(requested: usize, outcome: Result<usize, c_long>) -> Result<(), Error> {
    match outcome {
        Ok(copied) if copied >= requested => Ok(()),
        Ok(_) => Err(Error::ShortRead),
        Err(code) => Err(Error::Helper(code)),
    }
}

#[cfg(test)]
mod tests {
    use std::vec::Vec;

    use super::*;
    use crate::host::{Host, HostMsg, HostSkb, HostTls};

    const PACKET: [u8; 12] = [0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11];

    #[test]
    fn windows_per_backend() {
        let skb = HostSkb::new(PACKET.to_vec());
        let info = SkbInfo::new(2, 10);
        let pkt = PktBuf::<Host>::from_skb(&skb, Some(&info));
        assert_eq!((pkt.data_offset(), pkt.data_end()), (2, 10));
        assert_eq!(pkt.source(), Source::Skb);

        let pkt = PktBuf::<Host>::from_skb(&skb, None);
        assert_eq!((pkt.data_offset(), pkt.data_end()), (0, 0));

        let tls = HostTls::new(PACKET.to_vec(), 4, 12);
        let pkt = PktBuf::<Host>::from_tls(tls.stream());
        assert_eq!((pkt.data_offset(), pkt.data_end()), (4, 12));
        assert_eq!(pkt.source(), Source::Tls);

        let msg = HostMsg::new(PACKET.to_vec());
        let pkt = PktBuf::<Host>::from_sk_msg(&msg);
        assert_eq!((pkt.data_offset(), pkt.data_end()), (0, 12));
        assert_eq!(pkt.source(), Source::SkMsg);
    }

    #[test]
    fn inverted_window_is_empty() {
        let skb = HostSkb::new(PACKET.to_vec());
        let info = SkbInfo::new(9, 3);
        let pkt = PktBuf::<Host>::from_skb(&skb, Some(&info));
        assert!(pkt.data_offset() <= pkt.data_end());
        assert_eq!(pkt.load(3, &mut [0u8; 1]), Err(Error::OutOfBounds));

        let tls = HostTls::new(PACKET.to_vec(), 8, 2);
        let pkt = PktBuf::<Host>::from_tls(tls.stream());
        assert!(pkt.data_offset() <= pkt.data_end());
    }

    #[test]
    fn in_window_loads_match_reference() {
        let skb = HostSkb::new(PACKET.to_vec());
        let info = SkbInfo::new(0, 12);
        let tls = HostTls::new(PACKET.to_vec(), 0, 12);
        let msg = HostMsg::new(PACKET.to_vec());

        let views = [
            PktBuf::<Host>::from_skb(&skb, Some(&info)),
            PktBuf::<Host>::from_tls(tls.stream()),
            PktBuf::<Host>::from_sk_msg(&msg),
        ];

        for pkt in views {
            for (offset, len) in [(0, 12), (3, 4), (11, 1), (5, 0)] {
                let mut dst = [0u8; 12];
                pkt.load(offset, &mut dst[..len]).unwrap();
                let start = offset as usize;
                assert_eq!(&dst[..len], &PACKET[start..start + len], "{:?}", pkt.source());
            }
        }
    }

    #[test]
    fn one_past_end_fails_without_side_effects() {
        let skb = HostSkb::new(PACKET.to_vec());
        let info = SkbInfo::new(0, 8);
        let tls = HostTls::new(PACKET.to_vec(), 0, 8);
        let msg = HostMsg::new(PACKET[..8].to_vec());

        let views = [
            PktBuf::<Host>::from_skb(&skb, Some(&info)),
            PktBuf::<Host>::from_tls(tls.stream()),
            PktBuf::<Host>::from_sk_msg(&msg),
        ];

        for pkt in views {
            let mut dst = [0xaa];
            assert_eq!(pkt.load(pkt.data_end(), &mut dst), Err(Error::OutOfBounds));
            assert_eq!(dst, [0xaa]);
            assert_eq!(crate::host::telemetry(pkt.source()).calls, 0);
        }
        assert!(skb.reads().is_empty());
        assert!(msg.reads().is_empty());
    }

    #[test]
    fn reads_below_window_start_fail() {
        let tls = HostTls::new(PACKET.to_vec(), 4, 12);
        let pkt = PktBuf::<Host>::from_tls(tls.stream());
        assert_eq!(pkt.load(3, &mut [0u8; 2]), Err(Error::OutOfBounds));
        assert_eq!(pkt.load(u32::MAX, &mut [0u8; 2]), Err(Error::OutOfBounds));
    }

    #[test]
    fn short_skb_read_is_an_error() {
        // window claims more than the buffer holds
        let skb = HostSkb::new(PACKET[..6].to_vec());
        let info = SkbInfo::new(0, 12);
        let pkt = PktBuf::<Host>::from_skb(&skb, Some(&info));

        let mut dst = [0u8; 4];
        assert_eq!(pkt.load(4, &mut dst), Err(Error::ShortRead));
        assert_eq!(pkt.load(8, &mut dst), Err(Error::Helper(-14)));
        assert_eq!(skb.reads(), Vec::from([(4, 4), (8, 4)]));
    }
}
