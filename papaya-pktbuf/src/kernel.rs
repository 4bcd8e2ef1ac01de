//! Backends for eBPF programs built on aya-ebpf.

use core::{cmp, ffi::c_long};

use aya_ebpf::{
    helpers::{bpf_probe_read_kernel_buf, bpf_probe_read_user_buf},
    macros::map,
    maps::PerCpuArray,
    programs::{SkMsgContext, TcContext},
};

use crate::{LoadTelemetry, Platform, PktBuf, SkMsgLoad, SkbLoad, Source, SOURCE_COUNT};

const EFAULT: c_long = 14;

/// Per-CPU load counters, indexed by [`Source::index`].
#[map]
pub static PKTBUF_TELEMETRY: PerCpuArray<LoadTelemetry> =
    PerCpuArray::with_max_entries(SOURCE_COUNT as u32, 0);

pub type KernelPktBuf<'a> = PktBuf<'a, Kernel>;

pub enum Kernel {}

impl Platform for Kernel {
    type Skb = TcContext;
    type Msg = SkMsgContext;

    #[inline(always)]
    fn read_user(addr: u64, dst: &mut [u8]) -> Result<(), c_long> {
        unsafe { bpf_probe_read_user_buf(addr as *const u8, dst) }
    }

    #[inline(always)]
    fn record_load(source: Source, requested: u32, outcome: Result<usize, c_long>) {
        if let Some(telemetry) = PKTBUF_TELEMETRY.get_ptr_mut(source.index()) {
            unsafe { (*telemetry).record(requested, outcome) };
        }
    }
}

impl SkbLoad for TcContext {
    #[inline(always)]
    fn load_bytes(&self, offset: u32, dst: &mut [u8]) -> Result<usize, c_long> {
        TcContext::load_bytes(self, offset as usize, dst)
    }
}

impl SkMsgLoad for SkMsgContext {
    #[inline(always)]
    fn size(&self) -> u32 {
        SkMsgContext::size(self)
    }

    /// Copies from the linear part of the message only, so the result may be
    /// shorter than `dst` when the message spans several pages.
    #[inline(always)]
    fn load_bytes(&self, offset: u32, dst: &mut [u8]) -> Result<usize, c_long> {
        let start = self.data() + offset as usize;
        let end = self.data_end();
        if start >= end {
            return Err(-EFAULT);
        }

        let len = cmp::min(dst.len(), end - start);
        unsafe { bpf_probe_read_kernel_buf(start as *const u8, &mut dst[..len])? };
        Ok(len)
    }
}
