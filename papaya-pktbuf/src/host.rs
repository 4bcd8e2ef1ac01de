//! In-memory backends for running dissectors off-target.
//!
//! Each backend records the `(offset, len)` of every helper call so tests
//! can check how a read was issued. Telemetry and the set of readable
//! [`HostTls`] buffers are kept per thread.

use core::{cell::RefCell, cmp, ffi::c_long};
use std::{thread_local, vec::Vec};

use crate::{LoadTelemetry, Platform, SkMsgLoad, SkbLoad, Source, TlsStream, SOURCE_COUNT};

const EFAULT: c_long = -14;

thread_local! {
    static TELEMETRY: RefCell<[LoadTelemetry; SOURCE_COUNT]> =
        RefCell::new([LoadTelemetry::default(); SOURCE_COUNT]);

    // (start, len) of every live HostTls buffer
    static USER_BUFFERS: RefCell<Vec<(u64, usize)>> = const { RefCell::new(Vec::new()) };
}

/// Telemetry recorded on this thread for `source`.
pub fn telemetry(source: Source) -> LoadTelemetry {
    TELEMETRY.with(|telemetry| telemetry.borrow()[source.index() as usize])
}

pub fn reset_telemetry() {
    TELEMETRY.with(|telemetry| *telemetry.borrow_mut() = [LoadTelemetry::default(); SOURCE_COUNT]);
}

pub enum Host {}

impl Platform for Host {
    type Skb = HostSkb;
    type Msg = HostMsg;

    /// Only ranges inside a live [`HostTls`] buffer can be read; anything
    /// else fails with `-EFAULT`, like `bpf_probe_read_user`.
    fn read_user(addr: u64, dst: &mut [u8]) -> Result<(), c_long> {
        let end = addr.checked_add(dst.len() as u64).ok_or(EFAULT)?;
        let mapped = USER_BUFFERS.with(|buffers| {
            buffers
                .borrow()
                .iter()
                .any(|&(start, len)| addr >= start && end <= start + len as u64)
        });
        if !mapped {
            return Err(EFAULT);
        }
        // SAFETY: the range lies inside a buffer owned by a HostTls that is
        // still alive on this thread.
        unsafe { core::ptr::copy_nonoverlapping(addr as *const u8, dst.as_mut_ptr(), dst.len()) };
        Ok(())
    }

    fn record_load(source: Source, requested: u32, outcome: Result<usize, c_long>) {
        TELEMETRY.with(|telemetry| {
            telemetry.borrow_mut()[source.index() as usize].record(requested, outcome)
        });
    }
}

/// A linear socket buffer, behaving like aya's `load_bytes`: copies are
/// truncated at the end of the buffer.
pub struct HostSkb {
    data: Vec<u8>,
    reads: RefCell<Vec<(u32, usize)>>,
}

impl HostSkb {
    pub fn new(data: Vec<u8>) -> Self {
        Self {
            data,
            reads: RefCell::new(Vec::new()),
        }
    }

    pub fn len(&self) -> u32 {
        self.data.len() as u32
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn reads(&self) -> Vec<(u32, usize)> {
        self.reads.borrow().clone()
    }
}

impl SkbLoad for HostSkb {
    fn load_bytes(&self, offset: u32, dst: &mut [u8]) -> Result<usize, c_long> {
        self.reads.borrow_mut().push((offset, dst.len()));
        copy_prefix(&self.data, offset, dst)
    }
}

/// Decrypted bytes standing in for a user-space TLS buffer.
pub struct HostTls {
    _data: Vec<u8>,
    stream: TlsStream,
}

impl HostTls {
    pub fn new(data: Vec<u8>, data_off: u32, data_end: u32) -> Self {
        assert!(data_end as usize <= data.len(), "window past end of buffer");
        let stream = TlsStream {
            buffer_ptr: data.as_ptr() as u64,
            data_off,
            data_end,
        };
        USER_BUFFERS.with(|buffers| buffers.borrow_mut().push((stream.buffer_ptr, data.len())));
        Self {
            _data: data,
            stream,
        }
    }

    pub fn stream(&self) -> &TlsStream {
        &self.stream
    }
}

impl Drop for HostTls {
    fn drop(&mut self) {
        let buffer = (self.stream.buffer_ptr, self._data.len());
        USER_BUFFERS.with(|buffers| {
            let mut buffers = buffers.borrow_mut();
            if let Some(pos) = buffers.iter().position(|&b| b == buffer) {
                buffers.swap_remove(pos);
            }
        });
    }
}

/// A socket message whose first `linear` bytes can be copied directly;
/// copies running past that come up short.
pub struct HostMsg {
    data: Vec<u8>,
    linear: usize,
    reads: RefCell<Vec<(u32, usize)>>,
}

impl HostMsg {
    pub fn new(data: Vec<u8>) -> Self {
        let linear = data.len();
        Self::with_linear(data, linear)
    }

    pub fn with_linear(data: Vec<u8>, linear: usize) -> Self {
        let linear = cmp::min(linear, data.len());
        Self {
            data,
            linear,
            reads: RefCell::new(Vec::new()),
        }
    }

    pub fn reads(&self) -> Vec<(u32, usize)> {
        self.reads.borrow().clone()
    }
}

impl SkMsgLoad for HostMsg {
    fn size(&self) -> u32 {
        self.data.len() as u32
    }

    fn load_bytes(&self, offset: u32, dst: &mut [u8]) -> Result<usize, c_long> {
        self.reads.borrow_mut().push((offset, dst.len()));
        copy_prefix(&self.data[..self.linear], offset, dst)
    }
}

fn copy_prefix(data: &[u8], offset: u32, dst: &mut [u8]) -> Result<usize, c_long> {
    let offset = offset as usize;
    if offset >= data.len() {
        return Err(EFAULT);
    }
    let len = cmp::min(dst.len(), data.len() - offset);
    dst[..len].copy_from_slice(&data[offset..offset + len]);
    Ok(len)
}
