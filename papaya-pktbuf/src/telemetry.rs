use core::ffi::c_long;

use crate::{
    view::{complete, PktBuf},
    Error, Platform, SkMsgLoad, SkbLoad,
};

/// Number of per-source slots in the telemetry map.
pub const SOURCE_COUNT: usize = 3;

/// Load counters for one packet source, one value per CPU in the kernel.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
#[repr(C)]
pub struct LoadTelemetry {
    pub calls: u64,
    /// Loads that returned fewer bytes than requested.
    pub short_reads: u64,
    pub failures: u64,
    /// Requested bytes that were never copied, across short and failed loads.
    pub missing_bytes: u64,
}

#[cfg(feature = "user")]
unsafe impl aya::Pod for LoadTelemetry {}

impl LoadTelemetry {
    #[inline(always)]
    pub fn record(&mut self, requested: u32, outcome: Result<usize, c_long>) {
        let requested = requested as u64;
        self.calls += 1;
        match outcome {
            Ok(copied) if copied as u64 >= requested => {}
            Ok(copied) => {
                self.short_reads += 1;
                self.missing_bytes += requested - copied as u64;
            }
            Err(_) => {
                self.failures += 1;
                self.missing_bytes += requested;
            }
        }
    }

    pub fn merge(&mut self, other: &LoadTelemetry) {
        self.calls += other.calls;
        self.short_reads += other.short_reads;
        self.failures += other.failures;
        self.missing_bytes += other.missing_bytes;
    }

    /// Counter increase since `earlier`.
    pub fn since(&self, earlier: &LoadTelemetry) -> LoadTelemetry {
        LoadTelemetry {
            calls: self.calls.wrapping_sub(earlier.calls),
            short_reads: self.short_reads.wrapping_sub(earlier.short_reads),
            failures: self.failures.wrapping_sub(earlier.failures),
            missing_bytes: self.missing_bytes.wrapping_sub(earlier.missing_bytes),
        }
    }
}

impl<P: Platform> PktBuf<'_, P> {
    /// Same as [`load`](PktBuf::load), but also reports the helper outcome to
    /// [`Platform::record_load`], short copies included.
    #[inline(always)]
    pub fn load_with_telemetry(&self, offset: u32, dst: &mut [u8]) -> Result<(), Error> {
        self.check_window(offset, dst.len())?;
        if dst.is_empty() {
            return Ok(());
        }
        self.copy_with_telemetry(offset, dst)
    }

    /// Caller has already checked the window.
    #[inline(always)]
    pub(crate) fn copy_with_telemetry(&self, offset: u32, dst: &mut [u8]) -> Result<(), Error> {
        let requested = dst.len();
        let outcome = match *self {
            PktBuf::Skb { skb, .. } => skb.load_bytes(offset, dst),
            PktBuf::Tls(tls) => {
                P::read_user(tls.buffer_ptr.wrapping_add(offset as u64), dst).map(|()| requested)
            }
            PktBuf::SkMsg(msg) => msg.load_bytes(offset, dst),
        };

        P::record_load(self.source(), requested as u32, outcome);
        complete(requested, outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{self, Host, HostMsg, HostSkb};
    use crate::{SkbInfo, Source};

    #[test]
    fn record_classifies_outcomes() {
        let mut telemetry = LoadTelemetry::default();
        telemetry.record(8, Ok(8));
        telemetry.record(8, Ok(5));
        telemetry.record(4, Err(-14));

        assert_eq!(
            telemetry,
            LoadTelemetry {
                calls: 3,
                short_reads: 1,
                failures: 1,
                missing_bytes: 7,
            }
        );
    }

    #[test]
    fn merge_and_since() {
        let mut total = LoadTelemetry::default();
        let cpu0 = LoadTelemetry {
            calls: 4,
            short_reads: 1,
            failures: 0,
            missing_bytes: 2,
        };
        let cpu1 = LoadTelemetry {
            calls: 6,
            short_reads: 0,
            failures: 2,
            missing_bytes: 8,
        };
        total.merge(&cpu0);
        total.merge(&cpu1);
        assert_eq!(total.calls, 10);
        assert_eq!(total.failures, 2);
        assert_eq!(total.missing_bytes, 10);

        let delta = total.since(&cpu0);
        assert_eq!(delta, cpu1);
    }

    #[test]
    fn scattered_sk_msg_records_short_read() {
        // only the first 6 bytes are linear
        let msg = HostMsg::with_linear(b"abcdefghij".to_vec(), 6);
        let pkt = PktBuf::<Host>::from_sk_msg(&msg);

        let mut dst = [0u8; 4];
        assert_eq!(pkt.load(0, &mut dst), Ok(()));
        assert_eq!(&dst, b"abcd");
        assert_eq!(pkt.load(4, &mut dst), Err(Error::ShortRead));

        let telemetry = host::telemetry(Source::SkMsg);
        assert_eq!(telemetry.calls, 2);
        assert_eq!(telemetry.short_reads, 1);
        assert_eq!(telemetry.missing_bytes, 2);

        host::reset_telemetry();
        assert_eq!(host::telemetry(Source::SkMsg), LoadTelemetry::default());
    }

    #[test]
    fn plain_skb_load_skips_telemetry() {
        let skb = HostSkb::new(b"0123456789".to_vec());
        let info = SkbInfo::new(0, 10);
        let pkt = PktBuf::<Host>::from_skb(&skb, Some(&info));

        let mut dst = [0u8; 3];
        pkt.load(2, &mut dst).unwrap();
        assert_eq!(host::telemetry(Source::Skb).calls, 0);

        pkt.load_with_telemetry(2, &mut dst).unwrap();
        assert_eq!(&dst, b"234");
        assert_eq!(host::telemetry(Source::Skb).calls, 1);
        assert_eq!(host::telemetry(Source::Skb).short_reads, 0);
    }

    #[test]
    fn telemetry_wrapper_keeps_window_semantics() {
        let skb = HostSkb::new(b"0123456789".to_vec());
        let info = SkbInfo::new(0, 4);
        let pkt = PktBuf::<Host>::from_skb(&skb, Some(&info));

        assert_eq!(
            pkt.load_with_telemetry(2, &mut [0u8; 3]),
            Err(Error::OutOfBounds)
        );
        assert_eq!(host::telemetry(Source::Skb).calls, 0);
    }
}
