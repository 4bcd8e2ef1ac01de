use core::ffi::c_long;

use crate::Source;

/// Bulk copy out of a socket buffer, shaped like `bpf_skb_load_bytes`.
///
/// Returns the number of bytes copied, which may be less than `dst.len()`
/// when the buffer ends early.
pub trait SkbLoad {
    fn load_bytes(&self, offset: u32, dst: &mut [u8]) -> Result<usize, c_long>;
}

/// Bulk copy out of an `sk_msg` buffer.
pub trait SkMsgLoad {
    /// Total message size, which may exceed the linear part readable in one go.
    fn size(&self) -> u32;

    fn load_bytes(&self, offset: u32, dst: &mut [u8]) -> Result<usize, c_long>;
}

/// The set of primitives a [`PktBuf`](crate::PktBuf) dispatches to.
///
/// Implemented by a marker type: [`kernel::Kernel`](crate::kernel) inside
/// eBPF programs, [`host::Host`](crate::host) in tests.
pub trait Platform {
    type Skb: SkbLoad;
    type Msg: SkMsgLoad;

    /// Copies `dst.len()` bytes of user memory starting at `addr`.
    ///
    /// Must not fault on a bad address; the kernel implementation goes
    /// through `bpf_probe_read_user`.
    fn read_user(addr: u64, dst: &mut [u8]) -> Result<(), c_long>;

    /// Records the outcome of a telemetry-wrapped load.
    fn record_load(source: Source, requested: u32, outcome: Result<usize, c_long>);
}
