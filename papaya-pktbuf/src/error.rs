use core::{ffi::c_long, fmt};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The read falls outside `[data_offset, data_end)`.
    OutOfBounds,
    /// The helper copied fewer bytes than requested.
    ShortRead,
    /// The helper failed with the given code.
    Helper(c_long),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::OutOfBounds => f.write_str("read outside of the packet window"),
            Error::ShortRead => f.write_str("short read from packet"),
            Error::Helper(code) => write!(f, "load helper failed: {code}"),
        }
    }
}
