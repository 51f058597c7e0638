//! MSB-first bit cursor used by the pixel code string decoders.

use super::{Error, ErrorDetails, Result};

/// Reads 1 to 8 bit wide fields from a byte slice, most significant bit first.
///
/// Pixel code strings are nibble (or 2-bit) addressed, so the cursor tracks a bit position
/// rather than a byte position. Use [`BitReader::byte_align`] after an end-of-string code to
/// skip the stuffing bits.
#[derive(Debug)]
pub struct BitReader<'a> {
    data: &'a [u8],
    bit_pos: usize,
    location: usize,
}

impl<'a> BitReader<'a> {
    /// `location` is the offset of `data[0]` within the enclosing buffer, used for errors.
    pub fn new(data: &'a [u8], location: usize) -> Self {
        Self {
            data,
            bit_pos: 0,
            location,
        }
    }

    fn make_error(&self, details: ErrorDetails) -> Error {
        Error::new(self.location + self.bit_pos / 8, details)
    }

    pub fn read_bits(&mut self, count: usize) -> Result<u8> {
        debug_assert!((1..=8).contains(&count));
        if self.bit_pos + count > self.data.len() * 8 {
            return Err(self.make_error(ErrorDetails::PacketOverrun((count + 7) / 8)));
        }
        let mut value = 0u8;
        for _ in 0..count {
            let byte = self.data[self.bit_pos / 8];
            let bit = (byte >> (7 - self.bit_pos % 8)) & 1;
            value = (value << 1) | bit;
            self.bit_pos += 1;
        }
        Ok(value)
    }

    pub fn read_bool(&mut self) -> Result<bool> {
        Ok(self.read_bits(1)? != 0)
    }

    pub fn read_nibble(&mut self) -> Result<u8> {
        self.read_bits(4)
    }

    pub fn read_byte(&mut self) -> Result<u8> {
        self.read_bits(8)
    }

    /// Advances to the next byte boundary, if not already on one.
    pub fn byte_align(&mut self) {
        self.bit_pos = (self.bit_pos + 7) / 8 * 8;
    }

    pub fn is_byte_aligned(&self) -> bool {
        self.bit_pos % 8 == 0
    }

    /// Number of bytes touched so far, counting a partially read byte.
    pub fn bytes_consumed(&self) -> usize {
        (self.bit_pos + 7) / 8
    }

    pub fn is_empty(&self) -> bool {
        self.bit_pos >= self.data.len() * 8
    }
}

#[test]
fn test_nibbles_and_alignment() {
    let data = [0xa5, 0x3c, 0xff];
    let mut reader = BitReader::new(&data, 10);
    assert_eq!(reader.read_nibble().unwrap(), 0xa);
    assert_eq!(reader.read_bits(2).unwrap(), 0b01);
    assert!(!reader.is_byte_aligned());
    assert_eq!(reader.read_bits(4).unwrap(), 0b0100);
    assert_eq!(reader.bytes_consumed(), 2);
    reader.byte_align();
    assert_eq!(reader.read_byte().unwrap(), 0xff);
    assert!(reader.is_empty());
    let err = reader.read_nibble().unwrap_err();
    assert_eq!(err.location(), 13);
    assert!(matches!(err.details(), ErrorDetails::PacketOverrun(1)));
}
