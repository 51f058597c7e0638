use super::{Error, ErrorDetails, Result};
use std::convert::TryFrom;

/// Bounded big-endian read cursor over a borrowed byte slice.
///
/// `location` is carried across sub-readers so errors point at the offset within the outermost
/// buffer.
#[derive(Debug, Clone)]
pub struct SliceReader<'a> {
    slice: &'a [u8],
    location: usize,
}

impl<'a> SliceReader<'a> {
    pub fn new(slice: &'a [u8]) -> Self {
        Self { slice, location: 0 }
    }

    pub(crate) fn with_location(slice: &'a [u8], location: usize) -> Self {
        Self { slice, location }
    }

    /// Splits off the next `length` bytes as an independent reader and advances past them.
    pub fn new_sub_reader(&mut self, length: usize) -> Result<Self> {
        let location = self.location;
        Ok(Self {
            slice: self.read(length)?,
            location,
        })
    }

    pub fn make_error(&self, details: ErrorDetails) -> Error {
        Error::new(self.location, details)
    }

    pub fn location(&self) -> usize {
        self.location
    }

    pub fn remaining_len(&self) -> usize {
        self.slice.len()
    }

    pub fn remaining(&self) -> &'a [u8] {
        self.slice
    }

    pub fn skip(&mut self, length: usize) -> Result<()> {
        self.read(length).map(|_| ())
    }

    pub fn read(&mut self, length: usize) -> Result<&'a [u8]> {
        if length > self.slice.len() {
            Err(self.make_error(ErrorDetails::PacketOverrun(length)))
        } else {
            self.location += length;
            let (left, right) = self.slice.split_at(length);
            self.slice = right;
            Ok(left)
        }
    }

    pub fn read_to_end(&mut self) -> Result<&'a [u8]> {
        self.read(self.slice.len())
    }

    pub fn read_array_ref<const N: usize>(&mut self) -> Result<&'a [u8; N]> {
        let bytes = self.read(N)?;
        <&[u8; N]>::try_from(bytes).map_err(|_| self.make_error(ErrorDetails::PacketOverrun(N)))
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.read_array_ref::<1>()?[0])
    }

    pub fn read_be_u16(&mut self) -> Result<u16> {
        Ok(u16::from_be_bytes(*self.read_array_ref::<2>()?))
    }

    pub fn peek_u8(&self) -> Option<u8> {
        self.slice.first().copied()
    }

    pub fn peek(&self, length: usize) -> Result<&'a [u8]> {
        if length > self.slice.len() {
            Err(self.make_error(ErrorDetails::PacketOverrun(length)))
        } else {
            Ok(&self.slice[0..length])
        }
    }
}

#[macro_export]
macro_rules! read_bitfield {
    ($reader:expr, $type:ty) => {
        <$type>::from_bytes(*$reader.read_array_ref::<{ std::mem::size_of::<$type>() }>()?)
    };
}

#[test]
fn test_sub_reader_keeps_location() {
    let data = [0x0f, 0x10, 0x00, 0x01, 0x00, 0x02, 0xaa, 0xbb, 0xff];
    let mut reader = SliceReader::new(&data);
    reader.skip(2).unwrap();
    assert_eq!(reader.read_be_u16().unwrap(), 1);
    let length = reader.read_be_u16().unwrap() as usize;
    let mut sub = reader.new_sub_reader(length).unwrap();
    assert_eq!(sub.location(), 6);
    assert_eq!(sub.read_u8().unwrap(), 0xaa);
    assert_eq!(sub.read_u8().unwrap(), 0xbb);
    assert!(matches!(
        sub.read_u8().unwrap_err().details(),
        ErrorDetails::PacketOverrun(1)
    ));
    assert_eq!(reader.location(), 8);
    assert_eq!(reader.peek_u8(), Some(0xff));
}
