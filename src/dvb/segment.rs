//! Segment framing and dispatch.

use super::{
    clut::ClutDefinition, object::ObjectData, page::PageComposition, region::RegionComposition,
    DecodeContext,
};
use crate::{read_bitfield, Result, SliceReader};
use enum_dispatch::enum_dispatch;
use log::{debug, warn};
use modular_bitfield_msb::prelude::*;

/// First byte of every segment.
pub const SYNC_BYTE: u8 = 0x0f;

/// Common 6-byte segment header.
#[bitfield]
#[derive(Debug)]
pub struct SegmentHeader {
    pub sync_byte: B8,
    pub segment_type: B8,
    pub page_id: B16,
    pub segment_length: B16,
}

#[enum_dispatch]
pub(crate) trait SegmentObject {
    /// Applies the segment to the decoder state, emitting trace and sink output.
    fn apply(&self, ctx: &mut DecodeContext<'_>) -> Result<()>;
}

/// A segment of a type this decoder does not interpret. Its body is skipped.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct UnknownSegment {
    pub segment_type: u8,
    pub page_id: u16,
    pub length: u16,
}

impl SegmentObject for UnknownSegment {
    fn apply(&self, _ctx: &mut DecodeContext<'_>) -> Result<()> {
        debug!(
            "skipping segment type {:#04x} ({} bytes) on page {}",
            self.segment_type, self.length, self.page_id
        );
        Ok(())
    }
}

macro_rules! segment_data {
    ($($(#[$vattr:meta])* $var:ident = $val:expr,)*) => {
        /// One parsed segment.
        #[enum_dispatch(SegmentObject)]
        #[derive(Debug)]
        pub enum Segment {
            $($(#[$vattr])* $var($var),)*
            /// Segment of an unhandled type.
            Unknown(UnknownSegment),
        }

        fn parse_segment_data(header: &SegmentHeader, body: &mut SliceReader) -> Result<Segment> {
            let segment = match header.segment_type() {
                $($val => Segment::$var($var::parse(header.page_id(), body)?),)*
                segment_type => {
                    return Ok(Segment::Unknown(UnknownSegment {
                        segment_type,
                        page_id: header.page_id(),
                        length: header.segment_length(),
                    }))
                }
            };

            if body.remaining_len() > 0 {
                warn!(
                    "{} trailing bytes in segment type {:#04x}",
                    body.remaining_len(),
                    header.segment_type()
                );
            }

            Ok(segment)
        }
    };
}

segment_data! {
    /// Page composition segment.
    PageComposition = 0x10,
    /// Region composition segment.
    RegionComposition = 0x11,
    /// CLUT definition segment.
    ClutDefinition = 0x12,
    /// Object data segment.
    ObjectData = 0x13,
}

impl Segment {
    /// Parses the segment at the reader, which is left at the first byte after it.
    pub fn parse(reader: &mut SliceReader) -> Result<Self> {
        let header = read_bitfield!(reader, SegmentHeader);
        let mut body = reader.new_sub_reader(header.segment_length() as usize)?;
        parse_segment_data(&header, &mut body)
    }
}

/// Applies consecutive segments until the next byte is not [`SYNC_BYTE`].
///
/// A segment whose declared length overruns the payload ends decoding with an error. A segment
/// whose fields overrun its own declared length is dropped with a warning and decoding resumes
/// at the next segment.
pub(crate) fn dispatch_segments(
    reader: &mut SliceReader,
    ctx: &mut DecodeContext<'_>,
) -> Result<usize> {
    let mut count = 0;
    while reader.peek_u8() == Some(SYNC_BYTE) {
        let header = read_bitfield!(reader, SegmentHeader);
        let mut body = reader.new_sub_reader(header.segment_length() as usize)?;
        match parse_segment_data(&header, &mut body) {
            Ok(segment) => segment.apply(ctx)?,
            Err(err) => warn!(
                "dropping malformed segment type {:#04x}: {}",
                header.segment_type(),
                err
            ),
        }
        count += 1;
    }
    if reader.remaining_len() > 0 {
        debug!(
            "{} bytes after last segment, starting with {:#04x}",
            reader.remaining_len(),
            reader.remaining()[0]
        );
    }
    Ok(count)
}

#[test]
fn test_unknown_segment_skipped() {
    let data = [
        0x0f, 0x14, 0x00, 0x01, 0x00, 0x03, 0xaa, 0xbb, 0xcc, 0x0f, 0x80,
    ];
    let mut reader = SliceReader::new(&data);
    let segment = Segment::parse(&mut reader).unwrap();
    assert!(matches!(
        segment,
        Segment::Unknown(UnknownSegment {
            segment_type: 0x14,
            page_id: 1,
            length: 3
        })
    ));
    // L + 4 bytes are counted from the byte after the type byte, at offset 2.
    assert_eq!(reader.location(), 2 + 3 + 4);
    assert_eq!(reader.peek_u8(), Some(SYNC_BYTE));
}

#[test]
fn test_segment_overrunning_payload() {
    let data = [0x0f, 0x10, 0x00, 0x01, 0x00, 0x08, 0x05, 0x10];
    let mut reader = SliceReader::new(&data);
    let err = Segment::parse(&mut reader).unwrap_err();
    assert_eq!(err.location(), 6);
    assert!(matches!(
        err.details(),
        crate::ErrorDetails::PacketOverrun(8)
    ));
}
