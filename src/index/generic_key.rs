use std::fmt;

use crate::storage::page::Storable;

/// Fixed-width opaque key of `N` bytes. Shorter inputs are zero-padded and
/// longer ones truncated.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct GenericKey<const N: usize> {
    data: [u8; N],
}

pub type GenericKey4 = GenericKey<4>;
pub type GenericKey8 = GenericKey<8>;
pub type GenericKey16 = GenericKey<16>;
pub type GenericKey32 = GenericKey<32>;
pub type GenericKey64 = GenericKey<64>;

impl<const N: usize> GenericKey<N> {
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let mut data = [0u8; N];
        let len = bytes.len().min(N);
        data[..len].copy_from_slice(&bytes[..len]);
        Self { data }
    }

    /// Stores the little-endian encoding of `value`, truncated to `N` bytes.
    pub fn from_integer(value: i64) -> Self {
        Self::from_bytes(&value.to_le_bytes())
    }

    pub fn as_bytes(&self) -> &[u8; N] {
        &self.data
    }
}

impl<const N: usize> Default for GenericKey<N> {
    fn default() -> Self {
        Self { data: [0u8; N] }
    }
}

impl<const N: usize> fmt::Debug for GenericKey<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GenericKey<{}>(", N)?;
        for byte in &self.data {
            write!(f, "{:02x}", byte)?;
        }
        write!(f, ")")
    }
}

impl<const N: usize> Storable for GenericKey<N> {
    const SIZE: usize = N;

    fn write_to(&self, buf: &mut [u8]) {
        buf[..N].copy_from_slice(&self.data);
    }

    fn read_from(buf: &[u8]) -> Self {
        Self::from_bytes(&buf[..N])
    }
}
