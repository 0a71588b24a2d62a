//! Hint tables of linearized files.
//!
//! Only the page offset table carries data. Shared objects are claimed by the
//! first page that uses them, so the shared object table is empty and all
//! per-page shared object fields are zero bits wide.

use crate::pdf::{object::Name, Dictionary, Object, Stream};

const K_SHARED: &[u8] = b"S";

/// Packs values most significant bit first.
#[derive(Debug, Default)]
struct BitWriter {
    bytes: Vec<u8>,
    current: u8,
    used: u8,
}

impl BitWriter {
    fn write(&mut self, value: u64, bits: u16) {
        for shift in (0..bits).rev() {
            let bit = if shift < 64 { (value >> shift) & 1 } else { 0 };
            self.current = (self.current << 1) | bit as u8;
            self.used += 1;
            if self.used == 8 {
                self.bytes.push(self.current);
                self.current = 0;
                self.used = 0;
            }
        }
    }

    /// Fill the current byte with zero bits.
    fn pad(&mut self) {
        if self.used > 0 {
            self.bytes.push(self.current << (8 - self.used));
            self.current = 0;
            self.used = 0;
        }
    }

    fn len(&self) -> usize {
        self.bytes.len()
    }

    fn finish(mut self) -> Vec<u8> {
        self.pad();
        self.bytes
    }
}

/// Bits needed to store `value`.
fn bits_needed(value: u64) -> u16 {
    (64 - value.leading_zeros()) as u16
}

/// Objects and bytes of one page's section.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) struct PageHint {
    pub objects: u32,
    pub length: usize,
}

/// The hint stream for `pages`, first page first. `first_page` is the offset
/// of the first page object as if the hint stream were absent.
pub(super) fn hint_stream(first_page: usize, pages: &[PageHint]) -> Stream {
    let least_objects = pages.iter().map(|p| p.objects).min().unwrap_or(0);
    let most_objects = pages.iter().map(|p| p.objects).max().unwrap_or(0);
    let least_length = pages.iter().map(|p| p.length).min().unwrap_or(0);
    let most_length = pages.iter().map(|p| p.length).max().unwrap_or(0);
    let object_bits = bits_needed(u64::from(most_objects - least_objects));
    let length_bits = bits_needed((most_length - least_length) as u64);

    let mut bits = BitWriter::default();
    bits.write(u64::from(least_objects), 32);
    bits.write(first_page as u64, 32);
    bits.write(u64::from(object_bits), 16);
    bits.write(least_length as u64, 32);
    bits.write(u64::from(length_bits), 16);
    // content stream offsets and lengths
    bits.write(0, 32);
    bits.write(0, 16);
    bits.write(0, 32);
    bits.write(0, 16);
    // shared object references: count, identifier and numerator widths, denominator
    bits.write(0, 16);
    bits.write(0, 16);
    bits.write(0, 16);
    bits.write(1, 16);

    for page in pages {
        bits.write(u64::from(page.objects - least_objects), object_bits);
    }
    bits.pad();
    for page in pages {
        bits.write((page.length - least_length) as u64, length_bits);
    }
    bits.pad();
    let shared_offset = bits.len();

    // shared object table header without entries
    bits.write(0, 32);
    bits.write(0, 32);
    bits.write(0, 32);
    bits.write(0, 32);
    bits.write(0, 16);
    bits.write(0, 32);
    bits.write(0, 16);

    log::trace!("Hint tables for {} pages, shared table at {}", pages.len(), shared_offset);
    let mut dict = Dictionary::new();
    dict.insert(Name::from(K_SHARED), Object::from(shared_offset));
    Stream::new(dict, bits.finish())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bit_writer_packs_msb_first() {
        let mut bits = BitWriter::default();
        bits.write(0b101, 3);
        bits.write(0b1, 1);
        bits.pad();
        bits.write(0x1234, 16);
        assert_eq!(bits.finish(), vec![0b1011_0000, 0x12, 0x34]);
    }

    #[test]
    fn widths() {
        assert_eq!(bits_needed(0), 0);
        assert_eq!(bits_needed(1), 1);
        assert_eq!(bits_needed(50), 6);
        assert_eq!(bits_needed(255), 8);
    }

    #[test]
    fn page_offset_table() {
        let stream = hint_stream(
            700,
            &[
                PageHint { objects: 3, length: 100 },
                PageHint { objects: 5, length: 150 },
            ],
        );
        let data = stream.raw_data();
        // 36 byte header, 2 * 2 bits of object counts, 2 * 6 bits of lengths
        assert_eq!(stream.dictionary().get(K_SHARED), Some(&Object::from(39usize)));
        assert_eq!(data.len(), 39 + 24);
        assert_eq!(&data[..4], &3u32.to_be_bytes());
        assert_eq!(&data[4..8], &700u32.to_be_bytes());
        assert_eq!(data[36], 0b0010_0000);
        assert_eq!(&data[37..39], &[0b0000_0011, 0b0010_0000]);
    }
}
