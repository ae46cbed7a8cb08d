use crate::common::{PageId, RecordId, SlotId};

/// A fixed-width value that can be laid out in a page.
///
/// Encodings are little-endian and exactly `SIZE` bytes long; page views
/// read and write through this trait instead of casting page memory.
pub trait Storable: Copy + Send + Sync + 'static {
    const SIZE: usize;

    /// Writes `self` into `buf[..Self::SIZE]`.
    fn write_to(&self, buf: &mut [u8]);

    /// Reads a value from `buf[..Self::SIZE]`.
    fn read_from(buf: &[u8]) -> Self;
}

macro_rules! impl_storable_for_int {
    ($($t:ty),*) => {
        $(
            impl Storable for $t {
                const SIZE: usize = std::mem::size_of::<$t>();

                fn write_to(&self, buf: &mut [u8]) {
                    buf[..Self::SIZE].copy_from_slice(&self.to_le_bytes());
                }

                fn read_from(buf: &[u8]) -> Self {
                    let mut bytes = [0u8; std::mem::size_of::<$t>()];
                    bytes.copy_from_slice(&buf[..Self::SIZE]);
                    <$t>::from_le_bytes(bytes)
                }
            }
        )*
    };
}

impl_storable_for_int!(i32, u32, i64, u64);

impl Storable for PageId {
    const SIZE: usize = 4;

    fn write_to(&self, buf: &mut [u8]) {
        self.as_u32().write_to(buf);
    }

    fn read_from(buf: &[u8]) -> Self {
        PageId::new(u32::read_from(buf))
    }
}

/// Encoded as page id (4 bytes) followed by slot id (2 bytes)
impl Storable for RecordId {
    const SIZE: usize = 6;

    fn write_to(&self, buf: &mut [u8]) {
        self.page_id.write_to(&mut buf[..4]);
        buf[4..6].copy_from_slice(&self.slot_id.as_u16().to_le_bytes());
    }

    fn read_from(buf: &[u8]) -> Self {
        let page_id = PageId::read_from(&buf[..4]);
        let slot_id = SlotId::new(u16::from_le_bytes([buf[4], buf[5]]));
        RecordId::new(page_id, slot_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_int_encoding_is_little_endian() {
        let mut buf = [0u8; 8];
        0x0102_0304i32.write_to(&mut buf);
        assert_eq!(&buf[..4], &[4, 3, 2, 1]);
        assert_eq!(i32::read_from(&buf), 0x0102_0304);

        (-2i64).write_to(&mut buf);
        assert_eq!(i64::read_from(&buf), -2);
    }

    #[test]
    fn test_record_id_encoding() {
        let rid = RecordId::new(PageId::new(77), SlotId::new(513));
        let mut buf = [0u8; RecordId::SIZE];
        rid.write_to(&mut buf);
        assert_eq!(&buf[..4], &77u32.to_le_bytes());
        assert_eq!(&buf[4..], &513u16.to_le_bytes());
        assert_eq!(RecordId::read_from(&buf), rid);
    }
}
