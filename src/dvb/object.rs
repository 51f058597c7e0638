use super::{pixel::decode_sub_block, segment::SegmentObject, DecodeContext};
use crate::{composition::PaintCursor, read_bitfield, Result, SliceReader};
use log::warn;
use modular_bitfield_msb::prelude::*;
use smallvec::SmallVec;
use std::fmt::{Debug, Formatter};

#[derive(Debug, Copy, Clone, PartialEq, Eq, BitfieldSpecifier)]
#[bits = 2]
pub enum CodingMethod {
    /// Run-length coded pixel data, one sub-block per field.
    Pixels,
    /// A string of character codes.
    Characters,
    Reserved2,
    Reserved3,
}

#[bitfield]
#[derive(Debug)]
struct ObjectDataHeader {
    object_id: B16,
    version: B4,
    coding_method: CodingMethod,
    non_modifying_colour: bool,
    #[skip]
    unused: bool,
}

/// The pixel data of one field.
#[derive(Clone, Default)]
pub struct PixelDataBlock {
    /// Offset of the block within the packet payload.
    pub location: usize,
    pub data: Vec<u8>,
}

impl Debug for PixelDataBlock {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PixelDataBlock")
            .field("location", &self.location)
            .field("data.len()", &self.data.len())
            .finish()
    }
}

impl PixelDataBlock {
    fn parse(reader: &mut SliceReader, length: usize) -> Result<Self> {
        let location = reader.location();
        Ok(Self {
            location,
            data: reader.read(length)?.to_vec(),
        })
    }
}

#[derive(Debug, Clone)]
pub enum ObjectBody {
    Pixels {
        top_field: PixelDataBlock,
        bottom_field: PixelDataBlock,
    },
    Characters(SmallVec<[u16; 32]>),
    /// Reserved coding method; the body is skipped.
    Unsupported,
}

/// Object data segment.
#[derive(Debug, Clone)]
pub struct ObjectData {
    pub page_id: u16,
    pub object_id: u16,
    pub version: u8,
    pub coding_method: CodingMethod,
    pub non_modifying_colour: bool,
    pub body: ObjectBody,
}

impl ObjectData {
    pub fn parse(page_id: u16, reader: &mut SliceReader) -> Result<Self> {
        let header = read_bitfield!(reader, ObjectDataHeader);
        let body = match header.coding_method() {
            CodingMethod::Pixels => {
                let top_length = reader.read_be_u16()? as usize;
                let bottom_length = reader.read_be_u16()? as usize;
                ObjectBody::Pixels {
                    top_field: PixelDataBlock::parse(reader, top_length)?,
                    bottom_field: PixelDataBlock::parse(reader, bottom_length)?,
                }
            }
            CodingMethod::Characters => {
                let number_of_codes = reader.read_u8()?;
                let mut codes = SmallVec::new();
                for _ in 0..number_of_codes {
                    codes.push(reader.read_be_u16()?);
                }
                ObjectBody::Characters(codes)
            }
            _ => {
                reader.read_to_end()?;
                ObjectBody::Unsupported
            }
        };
        Ok(Self {
            page_id,
            object_id: header.object_id(),
            version: header.version(),
            coding_method: header.coding_method(),
            non_modifying_colour: header.non_modifying_colour(),
            body,
        })
    }
}

impl SegmentObject for ObjectData {
    fn apply(&self, ctx: &mut DecodeContext<'_>) -> Result<()> {
        ctx.trace.begin(
            "object_data_segment",
            &[
                ("page_id", &format_args!("0x{:02x}", self.page_id)),
                ("object_id", &format_args!("0x{:02x}", self.object_id)),
            ],
        )?;
        ctx.trace.field("object_version_number", &self.version)?;
        ctx.trace
            .field("object_coding_method", &(self.coding_method as u8))?;
        ctx.trace
            .field("non_modifying_colour_flag", &(self.non_modifying_colour as u8))?;

        match &self.body {
            ObjectBody::Pixels {
                top_field,
                bottom_field,
            } => {
                let placement = ctx.state.objects.get(&self.object_id).copied();
                let placement = placement.unwrap_or_else(|| {
                    warn!("object {} has no placement; painting at 0,0", self.object_id);
                    Default::default()
                });
                let depth = ctx
                    .state
                    .regions
                    .get(&placement.region_id)
                    .and_then(|region| region.depth());

                for (field, block, row) in [("top", top_field, 0), ("bottom", bottom_field, 1)] {
                    ctx.trace.leaf(
                        "pixel_data_sub_block",
                        &[
                            ("type", &field),
                            ("length", &format_args!("0x{:04x}", block.data.len())),
                        ],
                    )?;
                    let cursor = PaintCursor::new(placement.x, placement.y + row);
                    decode_sub_block(&block.data, block.location, cursor, depth, ctx)?;
                }
                ctx.show();
            }
            ObjectBody::Characters(codes) => {
                ctx.trace.field("number_of_codes", &codes.len())?;
                for code in codes {
                    ctx.trace
                        .field("character_code", &format_args!("0x{:04x}", code))?;
                }
                warn!(
                    "object {} is character coded; nothing painted",
                    self.object_id
                );
            }
            ObjectBody::Unsupported => {
                warn!(
                    "object {} uses reserved coding method {:?}",
                    self.object_id, self.coding_method
                );
            }
        }

        ctx.trace.end("object_data_segment")?;
        Ok(())
    }
}

#[test]
fn test_parse_pixel_object() {
    let data = [
        0x00, 0x07, 0x10, 0x00, 0x03, 0x00, 0x00, 0x11, 0x30, 0x00, 0xaa,
    ];
    let mut reader = SliceReader::with_location(&data, 100);
    let object = ObjectData::parse(1, &mut reader).unwrap();
    assert_eq!(object.object_id, 7);
    assert_eq!(object.version, 1);
    assert_eq!(object.coding_method, CodingMethod::Pixels);
    assert!(!object.non_modifying_colour);
    match object.body {
        ObjectBody::Pixels {
            top_field,
            bottom_field,
        } => {
            assert_eq!(top_field.location, 107);
            assert_eq!(top_field.data, vec![0x11, 0x30, 0x00]);
            assert!(bottom_field.data.is_empty());
        }
        body => panic!("unexpected body {:?}", body),
    }
    assert_eq!(reader.remaining_len(), 1);
}

#[test]
fn test_parse_character_object() {
    let data = [0x00, 0x02, 0x06, 0x02, 0x00, 0x41, 0x00, 0x42];
    let mut reader = SliceReader::new(&data);
    let object = ObjectData::parse(1, &mut reader).unwrap();
    assert_eq!(object.coding_method, CodingMethod::Characters);
    assert!(object.non_modifying_colour);
    match object.body {
        ObjectBody::Characters(codes) => assert_eq!(codes.as_slice(), &[0x41, 0x42]),
        body => panic!("unexpected body {:?}", body),
    }
}

#[test]
fn test_field_block_overruns_segment() {
    let data = [0x00, 0x07, 0x10, 0x00, 0x08, 0x00, 0x00, 0x11];
    let mut reader = SliceReader::new(&data);
    assert!(ObjectData::parse(1, &mut reader).is_err());
}
