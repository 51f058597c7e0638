use super::{segment::SegmentObject, DecodeContext};
use crate::{read_bitfield, Result, SliceReader};
use log::debug;
use modular_bitfield_msb::prelude::*;
use num_derive::FromPrimitive;
use num_traits::FromPrimitive;
use smallvec::SmallVec;

/// Pixel depth of a region, which selects the CLUT table its pixel codes index.
#[derive(Debug, Copy, Clone, PartialEq, Eq, FromPrimitive)]
pub enum RegionDepth {
    TwoBit = 1,
    FourBit = 2,
    EightBit = 3,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, BitfieldSpecifier)]
#[bits = 2]
pub enum ObjectType {
    BasicBitmap,
    BasicCharacter,
    CompositeString,
    Reserved,
}

impl ObjectType {
    /// Character objects carry explicit foreground and background codes.
    fn has_pixel_codes(&self) -> bool {
        matches!(self, ObjectType::BasicCharacter | ObjectType::CompositeString)
    }
}

#[bitfield]
#[derive(Debug)]
struct RegionCompositionHeader {
    region_id: B8,
    version: B4,
    fill_flag: bool,
    #[skip]
    unused1: B3,
    width: B16,
    height: B16,
    level_of_compatibility: B3,
    depth: B3,
    #[skip]
    unused2: B2,
    clut_id: B8,
    pixel_code_8bit: B8,
    pixel_code_4bit: B4,
    pixel_code_2bit: B2,
    #[skip]
    unused3: B2,
}

#[bitfield]
#[derive(Debug)]
struct RegionObjectHeader {
    object_id: B16,
    object_type: ObjectType,
    provider_flag: B2,
    x: B12,
    #[skip]
    unused: B4,
    y: B12,
}

/// An object listed by a region, positioned relative to the region's origin.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct RegionObject {
    pub object_id: u16,
    pub object_type: ObjectType,
    pub provider_flag: u8,
    pub x: u16,
    pub y: u16,
    pub foreground_pixel_code: Option<u8>,
    pub background_pixel_code: Option<u8>,
}

impl RegionObject {
    fn parse(reader: &mut SliceReader) -> Result<Self> {
        let header = read_bitfield!(reader, RegionObjectHeader);
        let (foreground_pixel_code, background_pixel_code) =
            if header.object_type().has_pixel_codes() {
                (Some(reader.read_u8()?), Some(reader.read_u8()?))
            } else {
                (None, None)
            };
        Ok(Self {
            object_id: header.object_id(),
            object_type: header.object_type(),
            provider_flag: header.provider_flag(),
            x: header.x(),
            y: header.y(),
            foreground_pixel_code,
            background_pixel_code,
        })
    }
}

/// Absolute position of an object in the composition buffer, and the region that placed it.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct ObjectPlacement {
    pub x: i32,
    pub y: i32,
    pub region_id: u8,
}

/// Region composition segment. The latest one for each region id is kept in the decoder state.
#[derive(Debug, Clone)]
pub struct RegionComposition {
    pub page_id: u16,
    pub region_id: u8,
    pub version: u8,
    pub fill: bool,
    pub width: u16,
    pub height: u16,
    pub level_of_compatibility: u8,
    /// Raw depth field; see [`RegionComposition::depth`].
    pub depth_code: u8,
    pub clut_id: u8,
    pub pixel_code_8bit: u8,
    pub pixel_code_4bit: u8,
    pub pixel_code_2bit: u8,
    pub objects: SmallVec<[RegionObject; 4]>,
}

impl RegionComposition {
    pub fn parse(page_id: u16, reader: &mut SliceReader) -> Result<Self> {
        let header = read_bitfield!(reader, RegionCompositionHeader);
        let mut objects = SmallVec::new();
        while reader.remaining_len() > 0 {
            objects.push(RegionObject::parse(reader)?);
        }
        Ok(Self {
            page_id,
            region_id: header.region_id(),
            version: header.version(),
            fill: header.fill_flag(),
            width: header.width(),
            height: header.height(),
            level_of_compatibility: header.level_of_compatibility(),
            depth_code: header.depth(),
            clut_id: header.clut_id(),
            pixel_code_8bit: header.pixel_code_8bit(),
            pixel_code_4bit: header.pixel_code_4bit(),
            pixel_code_2bit: header.pixel_code_2bit(),
            objects,
        })
    }

    /// `None` for reserved depth codes.
    pub fn depth(&self) -> Option<RegionDepth> {
        RegionDepth::from_u8(self.depth_code)
    }

    fn trace(&self, ctx: &mut DecodeContext<'_>) -> Result<()> {
        let trace = &mut *ctx.trace;
        trace.begin(
            "region_composition_segment",
            &[
                ("page_id", &format_args!("0x{:02x}", self.page_id)),
                ("region_id", &format_args!("0x{:02x}", self.region_id)),
            ],
        )?;
        trace.field("region_version_number", &self.version)?;
        trace.field("region_fill_flag", &(self.fill as u8))?;
        trace.field("region_width", &self.width)?;
        trace.field("region_height", &self.height)?;
        trace.field(
            "region_level_of_compatibility",
            &self.level_of_compatibility,
        )?;
        trace.field("region_depth", &self.depth_code)?;
        trace.field("CLUT_id", &self.clut_id)?;
        trace.field("region_8_bit_pixel_code", &self.pixel_code_8bit)?;
        trace.field("region_4_bit_pixel_code", &self.pixel_code_4bit)?;
        trace.field("region_2_bit_pixel_code", &self.pixel_code_2bit)?;
        trace.begin("objects", &[])?;
        for object in &self.objects {
            trace.begin(
                "object",
                &[
                    ("id", &format_args!("0x{:02x}", object.object_id)),
                    ("type", &format_args!("0x{:02x}", object.object_type as u8)),
                ],
            )?;
            trace.field("object_provider_flag", &object.provider_flag)?;
            trace.field("object_x", &object.x)?;
            trace.field("object_y", &object.y)?;
            if let (Some(foreground), Some(background)) =
                (object.foreground_pixel_code, object.background_pixel_code)
            {
                trace.field("foreground_pixel_code", &foreground)?;
                trace.field("background_pixel_code", &background)?;
            }
            trace.end("object")?;
        }
        trace.end("objects")?;
        trace.end("region_composition_segment")?;
        Ok(())
    }
}

impl SegmentObject for RegionComposition {
    fn apply(&self, ctx: &mut DecodeContext<'_>) -> Result<()> {
        let origin = match ctx.state.page.as_ref().and_then(|p| p.region(self.region_id)) {
            Some(placement) => (placement.x as i32, placement.y as i32),
            None => {
                debug!("region {} is not placed on the page", self.region_id);
                (0, 0)
            }
        };

        if self.fill {
            ctx.state.buffer.fill(ctx.config.fill_code);
            ctx.show();
        }

        self.trace(ctx)?;

        for object in &self.objects {
            let placement = ObjectPlacement {
                x: origin.0 + object.x as i32,
                y: origin.1 + object.y as i32 - ctx.config.origin_y,
                region_id: self.region_id,
            };
            ctx.state.objects.insert(object.object_id, placement);
        }
        ctx.state.regions.insert(self.region_id, self.clone());
        Ok(())
    }
}

#[test]
fn test_parse_region_composition() {
    let data = [
        0x02, 0x18, 0x02, 0xd0, 0x00, 0x40, 0x48, 0x00, 0x00, 0x0c, //
        0x00, 0x07, 0x00, 0x0a, 0x00, 0x14, //
        0x00, 0x08, 0x40, 0x05, 0x00, 0x06, 0x01, 0x02,
    ];
    let mut reader = SliceReader::new(&data);
    let region = RegionComposition::parse(1, &mut reader).unwrap();
    assert_eq!(region.region_id, 2);
    assert_eq!(region.version, 1);
    assert!(region.fill);
    assert_eq!((region.width, region.height), (720, 64));
    assert_eq!(region.level_of_compatibility, 2);
    assert_eq!(region.depth(), Some(RegionDepth::FourBit));
    assert_eq!(region.pixel_code_4bit, 0);
    assert_eq!(region.pixel_code_2bit, 3);
    assert_eq!(region.objects.len(), 2);
    assert_eq!(
        region.objects[0],
        RegionObject {
            object_id: 7,
            object_type: ObjectType::BasicBitmap,
            provider_flag: 0,
            x: 10,
            y: 20,
            foreground_pixel_code: None,
            background_pixel_code: None,
        }
    );
    assert_eq!(region.objects[1].object_type, ObjectType::BasicCharacter);
    assert_eq!(region.objects[1].x, 5);
    assert_eq!(region.objects[1].foreground_pixel_code, Some(1));
    assert_eq!(region.objects[1].background_pixel_code, Some(2));
}
