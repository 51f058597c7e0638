use super::{region::RegionDepth, segment::SegmentObject, DecodeContext};
use crate::{color::ycbcr_to_rgba, read_bitfield, Result, Rgba, SliceReader};
use log::trace;
use modular_bitfield_msb::prelude::*;
use smallvec::SmallVec;

#[bitfield]
#[derive(Debug)]
struct ClutDefinitionHeader {
    clut_id: B8,
    version: B4,
    #[skip]
    unused: B4,
}

#[bitfield]
#[derive(Debug)]
struct ClutEntryFlags {
    two_bit: bool,
    four_bit: bool,
    eight_bit: bool,
    #[skip]
    unused: B4,
    full_range: bool,
}

#[bitfield]
#[derive(Debug)]
struct ReducedRangeValues {
    y: B6,
    cr: B4,
    cb: B4,
    t: B2,
}

/// One CLUT entry as transmitted.
///
/// Reduced range entries keep their short field values; [`ClutEntry::to_rgba`] scales them up.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ClutEntry {
    pub entry_id: u8,
    pub two_bit: bool,
    pub four_bit: bool,
    pub eight_bit: bool,
    pub full_range: bool,
    pub y: u8,
    pub cr: u8,
    pub cb: u8,
    pub t: u8,
}

impl ClutEntry {
    fn parse(reader: &mut SliceReader) -> Result<Self> {
        let entry_id = reader.read_u8()?;
        let flags = read_bitfield!(reader, ClutEntryFlags);
        let (y, cr, cb, t) = if flags.full_range() {
            let values = reader.read_array_ref::<4>()?;
            (values[0], values[1], values[2], values[3])
        } else {
            let values = read_bitfield!(reader, ReducedRangeValues);
            (values.y(), values.cr(), values.cb(), values.t())
        };
        Ok(Self {
            entry_id,
            two_bit: flags.two_bit(),
            four_bit: flags.four_bit(),
            eight_bit: flags.eight_bit(),
            full_range: flags.full_range(),
            y,
            cr,
            cb,
            t,
        })
    }

    /// Y, Cr, Cb and T scaled to 8 bits.
    pub fn full_range_values(&self) -> (u8, u8, u8, u8) {
        if self.full_range {
            (self.y, self.cr, self.cb, self.t)
        } else {
            (self.y << 2, self.cr << 4, self.cb << 4, self.t << 6)
        }
    }

    /// A Y value of 0 makes the entry fully transparent whatever its T value.
    pub fn to_rgba(&self) -> Rgba {
        let (y, cr, cb, t) = self.full_range_values();
        let mut color = ycbcr_to_rgba(y, cr, cb, t);
        if y == 0 {
            color.a = 0;
        }
        color
    }
}

/// CLUT definition segment.
#[derive(Debug, Clone)]
pub struct ClutDefinition {
    pub page_id: u16,
    pub clut_id: u8,
    pub version: u8,
    pub entries: SmallVec<[ClutEntry; 16]>,
}

impl ClutDefinition {
    pub fn parse(page_id: u16, reader: &mut SliceReader) -> Result<Self> {
        let header = read_bitfield!(reader, ClutDefinitionHeader);
        let mut entries = SmallVec::new();
        while reader.remaining_len() > 0 {
            entries.push(ClutEntry::parse(reader)?);
        }
        Ok(Self {
            page_id,
            clut_id: header.clut_id(),
            version: header.version(),
            entries,
        })
    }

    fn trace(&self, ctx: &mut DecodeContext<'_>) -> Result<()> {
        let trace = &mut *ctx.trace;
        trace.begin(
            "CLUT_definition_segment",
            &[
                ("page_id", &format_args!("0x{:02x}", self.page_id)),
                ("CLUT_id", &format_args!("0x{:02x}", self.clut_id)),
            ],
        )?;
        trace.field("CLUT_version_number", &self.version)?;
        trace.begin("CLUT_entries", &[])?;
        for entry in &self.entries {
            trace.begin(
                "CLUT_entry",
                &[("id", &format_args!("0x{:02x}", entry.entry_id))],
            )?;
            trace.field("CLUT_flag_2_bit", &(entry.two_bit as u8))?;
            trace.field("CLUT_flag_4_bit", &(entry.four_bit as u8))?;
            trace.field("CLUT_flag_8_bit", &(entry.eight_bit as u8))?;
            trace.field("full_range_flag", &(entry.full_range as u8))?;
            trace.field("Y_value", &entry.y)?;
            trace.field("Cr_value", &entry.cr)?;
            trace.field("Cb_value", &entry.cb)?;
            trace.field("T_value", &entry.t)?;
            trace.end("CLUT_entry")?;
        }
        trace.end("CLUT_entries")?;
        trace.end("CLUT_definition_segment")?;
        Ok(())
    }
}

impl SegmentObject for ClutDefinition {
    fn apply(&self, ctx: &mut DecodeContext<'_>) -> Result<()> {
        self.trace(ctx)?;

        let clut = ctx
            .state
            .cluts
            .entry(self.clut_id)
            .or_insert_with(|| Clut::new(self.clut_id));
        clut.version = self.version;
        for entry in &self.entries {
            let color = entry.to_rgba();
            clut.set(entry, color);
            if ctx.config.is_live_entry(self.clut_id, entry.entry_id) {
                trace!("palette entry {} = {:?}", entry.entry_id, color);
                ctx.sink.set_palette(entry.entry_id, color);
            }
        }
        Ok(())
    }
}

/// Resolved colors of one CLUT, one table per region depth.
#[derive(Clone)]
pub struct Clut {
    pub id: u8,
    pub version: u8,
    two_bit: [Rgba; 4],
    four_bit: [Rgba; 16],
    eight_bit: Box<[Rgba; 256]>,
}

impl std::fmt::Debug for Clut {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Clut")
            .field("id", &self.id)
            .field("version", &self.version)
            .field("two_bit", &self.two_bit)
            .field("four_bit", &self.four_bit)
            .finish()
    }
}

impl Clut {
    pub fn new(id: u8) -> Self {
        Self {
            id,
            version: 0,
            two_bit: [Rgba::TRANSPARENT; 4],
            four_bit: [Rgba::TRANSPARENT; 16],
            eight_bit: Box::new([Rgba::TRANSPARENT; 256]),
        }
    }

    /// Stores `color` in every table the entry's flags select. Ids beyond a table's size are
    /// ignored for that table.
    fn set(&mut self, entry: &ClutEntry, color: Rgba) {
        let id = entry.entry_id as usize;
        if entry.two_bit {
            if let Some(slot) = self.two_bit.get_mut(id) {
                *slot = color;
            }
        }
        if entry.four_bit {
            if let Some(slot) = self.four_bit.get_mut(id) {
                *slot = color;
            }
        }
        if entry.eight_bit {
            self.eight_bit[id] = color;
        }
    }

    /// Color of `code` in the table for `depth`.
    pub fn color(&self, depth: RegionDepth, code: u8) -> Option<Rgba> {
        match depth {
            RegionDepth::TwoBit => self.two_bit.get(code as usize).copied(),
            RegionDepth::FourBit => self.four_bit.get(code as usize).copied(),
            RegionDepth::EightBit => Some(self.eight_bit[code as usize]),
        }
    }
}

#[test]
fn test_parse_clut_definition() {
    let data = [
        0x00, 0x30, //
        0x01, 0x41, 0xeb, 0x80, 0x80, 0x00, //
        0x02, 0xe0, 0x42, 0x8d,
    ];
    let mut reader = SliceReader::new(&data);
    let clut = ClutDefinition::parse(1, &mut reader).unwrap();
    assert_eq!(clut.clut_id, 0);
    assert_eq!(clut.version, 3);
    assert_eq!(clut.entries.len(), 2);

    let full = clut.entries[0];
    assert!(full.four_bit && !full.two_bit && !full.eight_bit && full.full_range);
    assert_eq!(full.to_rgba(), Rgba::new(254, 254, 254, 255));

    let reduced = clut.entries[1];
    assert!(reduced.two_bit && reduced.four_bit && reduced.eight_bit && !reduced.full_range);
    // 0x428d: Y=0b010000, Cr=0b1010, Cb=0b0011, T=0b01
    assert_eq!((reduced.y, reduced.cr, reduced.cb, reduced.t), (16, 10, 3, 1));
    assert_eq!(reduced.full_range_values(), (64, 160, 48, 64));
}

#[test]
fn test_clut_tables_by_depth() {
    let mut clut = Clut::new(0);
    let entry = ClutEntry {
        entry_id: 5,
        two_bit: true,
        four_bit: true,
        eight_bit: false,
        full_range: true,
        y: 235,
        cr: 128,
        cb: 128,
        t: 0,
    };
    let white = entry.to_rgba();
    clut.set(&entry, white);
    assert_eq!(clut.color(RegionDepth::FourBit, 5), Some(white));
    assert_eq!(clut.color(RegionDepth::TwoBit, 5), None);
    assert_eq!(clut.color(RegionDepth::EightBit, 5), Some(Rgba::TRANSPARENT));
}

#[test]
fn test_zero_luma_is_transparent() {
    let mut entry = ClutEntry {
        entry_id: 1,
        two_bit: false,
        four_bit: true,
        eight_bit: false,
        full_range: true,
        y: 0,
        cr: 128,
        cb: 128,
        t: 0,
    };
    assert_eq!(entry.to_rgba().a, 0);

    entry.full_range = false;
    entry.t = 0;
    assert_eq!(entry.to_rgba().a, 0);

    entry.y = 1;
    assert_eq!(entry.to_rgba().a, 255);
}
