use core::mem;

use crate::{PktBuf, Platform};

mod sealed {
    pub trait Sealed {}
}

/// Integers that can be decoded from network byte order.
pub trait BigEndian: sealed::Sealed + Copy {
    type Bytes: Default + AsMut<[u8]>;

    fn from_be_bytes(bytes: Self::Bytes) -> Self;
}

macro_rules! impl_big_endian {
    ($($t:ty),*) => {
        $(
            impl sealed::Sealed for $t {}

            impl BigEndian for $t {
                type Bytes = [u8; mem::size_of::<$t>()];

                #[inline(always)]
                fn from_be_bytes(bytes: Self::Bytes) -> Self {
                    <$t>::from_be_bytes(bytes)
                }
            }
        )*
    };
}

impl_big_endian!(i8, i16, i32);

impl<P: Platform> PktBuf<'_, P> {
    /// Decodes a big-endian `T` at `offset`, or `None` if any of its bytes
    /// can't be read.
    #[inline(always)]
    pub fn read_big_endian<T: BigEndian>(&self, offset: u32) -> Option<T> {
        let mut bytes = T::Bytes::default();
        self.load(offset, bytes.as_mut()).ok()?;
        Some(T::from_be_bytes(bytes))
    }

    /// Like [`read_big_endian`](PktBuf::read_big_endian), moving `offset`
    /// past the value on success and leaving it alone on failure.
    #[inline(always)]
    pub fn read_big_endian_advance<T: BigEndian>(&self, offset: &mut u32) -> Option<T> {
        let value = self.read_big_endian::<T>(*offset)?;
        *offset += mem::size_of::<T>() as u32;
        Some(value)
    }

    #[inline(always)]
    pub fn read_big_endian_s8(&self, offset: u32) -> Option<i8> {
        self.read_big_endian(offset)
    }

    #[inline(always)]
    pub fn read_big_endian_s16(&self, offset: u32) -> Option<i16> {
        self.read_big_endian(offset)
    }

    #[inline(always)]
    pub fn read_big_endian_s32(&self, offset: u32) -> Option<i32> {
        self.read_big_endian(offset)
    }
}
