//! Pixel data sub-blocks: run-length coded pixel code strings, map tables and end-of-line
//! markers.

use super::{region::RegionDepth, DecodeContext};
use crate::{bit_reader::BitReader, composition::PaintCursor, Result, SliceReader};
use log::warn;
use num_derive::FromPrimitive;
use num_traits::FromPrimitive;

/// Leading byte of each item in a pixel data sub-block.
#[derive(Debug, Copy, Clone, PartialEq, Eq, FromPrimitive)]
pub enum DataType {
    TwoBitString = 0x10,
    FourBitString = 0x11,
    EightBitString = 0x12,
    TwoToFourMap = 0x20,
    TwoToEightMap = 0x21,
    FourToEightMap = 0x22,
    EndOfLine = 0xf0,
}

/// `run_length` cells of `pixel_code`.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct PixelRun {
    pub run_length: u16,
    pub pixel_code: u8,
}

/// One decoded code of a pixel code string.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PixelCode {
    Run(PixelRun),
    EndOfString,
}

impl PixelCode {
    fn run(run_length: u16, pixel_code: u8) -> Self {
        PixelCode::Run(PixelRun {
            run_length,
            pixel_code,
        })
    }
}

/// Reads one code of a 2-bit/pixel string.
pub fn read_2bit_code(bits: &mut BitReader) -> Result<PixelCode> {
    let code = bits.read_bits(2)?;
    if code != 0 {
        return Ok(PixelCode::run(1, code));
    }
    if bits.read_bool()? {
        let run_length = bits.read_bits(3)? as u16 + 3;
        return Ok(PixelCode::run(run_length, bits.read_bits(2)?));
    }
    if bits.read_bool()? {
        return Ok(PixelCode::run(1, 0));
    }
    Ok(match bits.read_bits(2)? {
        0 => PixelCode::EndOfString,
        1 => PixelCode::run(2, 0),
        2 => {
            let run_length = bits.read_nibble()? as u16 + 12;
            PixelCode::run(run_length, bits.read_bits(2)?)
        }
        _ => {
            let run_length = bits.read_byte()? as u16 + 29;
            PixelCode::run(run_length, bits.read_bits(2)?)
        }
    })
}

/// Reads one code of a 4-bit/pixel string.
pub fn read_4bit_code(bits: &mut BitReader) -> Result<PixelCode> {
    let code = bits.read_nibble()?;
    if code != 0 {
        return Ok(PixelCode::run(1, code));
    }
    let switch = bits.read_nibble()?;
    Ok(if switch & 0x8 == 0 {
        match switch & 0x7 {
            0 => PixelCode::EndOfString,
            run_length => PixelCode::run(run_length as u16 + 2, 0),
        }
    } else if switch & 0x4 == 0 {
        let run_length = (switch & 0x3) as u16 + 4;
        PixelCode::run(run_length, bits.read_nibble()?)
    } else {
        match switch & 0x3 {
            0 => PixelCode::run(1, 0),
            1 => PixelCode::run(2, 0),
            2 => {
                let run_length = bits.read_nibble()? as u16 + 9;
                PixelCode::run(run_length, bits.read_nibble()?)
            }
            _ => {
                let run_length = bits.read_byte()? as u16 + 25;
                PixelCode::run(run_length, bits.read_nibble()?)
            }
        }
    })
}

/// Reads one code of an 8-bit/pixel string.
pub fn read_8bit_code(bits: &mut BitReader) -> Result<PixelCode> {
    let code = bits.read_byte()?;
    if code != 0 {
        return Ok(PixelCode::run(1, code));
    }
    let with_code = bits.read_bool()?;
    let run_length = bits.read_bits(7)? as u16;
    Ok(if with_code {
        PixelCode::run(run_length, bits.read_byte()?)
    } else if run_length == 0 {
        PixelCode::EndOfString
    } else {
        PixelCode::run(run_length, 0)
    })
}

/// Translation of low-depth pixel codes for regions of a higher depth.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapTables {
    pub two_to_four: [u8; 4],
    pub two_to_eight: [u8; 4],
    pub four_to_eight: [u8; 16],
}

impl Default for MapTables {
    fn default() -> Self {
        let mut four_to_eight = [0; 16];
        for (code, entry) in four_to_eight.iter_mut().enumerate() {
            *entry = code as u8 * 0x11;
        }
        Self {
            two_to_four: [0x0, 0x7, 0x8, 0xf],
            two_to_eight: [0x00, 0x77, 0x88, 0xff],
            four_to_eight,
        }
    }
}

impl MapTables {
    /// Replaces the table selected by `data_type` with the one at the reader.
    fn parse(&mut self, data_type: DataType, reader: &mut SliceReader) -> Result<()> {
        match data_type {
            DataType::TwoToFourMap => {
                let mut bits = BitReader::new(reader.read(2)?, reader.location() - 2);
                for entry in self.two_to_four.iter_mut() {
                    *entry = bits.read_nibble()?;
                }
            }
            DataType::TwoToEightMap => {
                self.two_to_eight = *reader.read_array_ref::<4>()?;
            }
            DataType::FourToEightMap => {
                self.four_to_eight = *reader.read_array_ref::<16>()?;
            }
            _ => {}
        }
        Ok(())
    }

    /// Maps a code of a `string_depth` string into the depth of the region it is painted in.
    pub fn translate(
        &self,
        string_depth: RegionDepth,
        region_depth: Option<RegionDepth>,
        code: u8,
    ) -> u8 {
        match (string_depth, region_depth) {
            (RegionDepth::TwoBit, Some(RegionDepth::FourBit)) => {
                self.two_to_four[code as usize & 0x3]
            }
            (RegionDepth::TwoBit, Some(RegionDepth::EightBit)) => {
                self.two_to_eight[code as usize & 0x3]
            }
            (RegionDepth::FourBit, Some(RegionDepth::EightBit)) => {
                self.four_to_eight[code as usize & 0xf]
            }
            _ => code,
        }
    }
}

/// Decodes one string into the composition buffer and returns the bytes it occupied,
/// stuffing included.
fn decode_string(
    string_depth: RegionDepth,
    data: &[u8],
    location: usize,
    cursor: &mut PaintCursor,
    region_depth: Option<RegionDepth>,
    maps: &MapTables,
    ctx: &mut DecodeContext<'_>,
) -> Result<usize> {
    let read_code = match string_depth {
        RegionDepth::TwoBit => read_2bit_code,
        RegionDepth::FourBit => read_4bit_code,
        RegionDepth::EightBit => read_8bit_code,
    };
    let mut bits = BitReader::new(data, location);
    loop {
        let run = match read_code(&mut bits) {
            Ok(PixelCode::Run(run)) => run,
            Ok(PixelCode::EndOfString) => break,
            Err(err) => {
                warn!("pixel code string without end code: {}", err);
                break;
            }
        };
        ctx.trace.leaf(
            "pixel",
            &[
                ("run_length", &run.run_length),
                ("pixel_code", &run.pixel_code),
            ],
        )?;
        let code = maps.translate(string_depth, region_depth, run.pixel_code);
        ctx.state
            .buffer
            .plot(cursor, run.run_length as usize, code);
    }
    bits.byte_align();
    Ok(bits.bytes_consumed())
}

/// Decodes one field's pixel data sub-block, painting from `cursor`.
///
/// `region_depth` is the depth of the region the object was placed by; it selects the map
/// table applied to lower-depth strings.
pub(crate) fn decode_sub_block(
    data: &[u8],
    location: usize,
    mut cursor: PaintCursor,
    region_depth: Option<RegionDepth>,
    ctx: &mut DecodeContext<'_>,
) -> Result<()> {
    let mut reader = SliceReader::with_location(data, location);
    let mut maps = MapTables::default();
    let mut in_scanline = false;

    while reader.remaining_len() > 0 {
        let raw_type = reader.read_u8()?;
        let string_depth = match DataType::from_u8(raw_type) {
            Some(DataType::TwoBitString) => RegionDepth::TwoBit,
            Some(DataType::FourBitString) => RegionDepth::FourBit,
            Some(DataType::EightBitString) => RegionDepth::EightBit,
            Some(DataType::EndOfLine) => {
                if in_scanline {
                    ctx.trace.end("scanline")?;
                    in_scanline = false;
                }
                cursor.end_of_line();
                continue;
            }
            Some(map) => {
                ctx.trace
                    .leaf("map_table", &[("type", &format_args!("0x{:02x}", raw_type))])?;
                if let Err(err) = maps.parse(map, &mut reader) {
                    warn!("truncated map table: {}", err);
                    break;
                }
                continue;
            }
            None => {
                warn!(
                    "unimplemented data_type {:02x} in pixel_data_sub_block",
                    raw_type
                );
                continue;
            }
        };

        if !in_scanline {
            ctx.trace.begin("scanline", &[])?;
            in_scanline = true;
        }
        let consumed = decode_string(
            string_depth,
            reader.remaining(),
            reader.location(),
            &mut cursor,
            region_depth,
            &maps,
            ctx,
        )?;
        reader.skip(consumed)?;
    }

    if in_scanline {
        ctx.trace.end("scanline")?;
    }
    Ok(())
}

#[cfg(test)]
fn collect_runs(
    data: &[u8],
    read_code: fn(&mut BitReader) -> Result<PixelCode>,
) -> (Vec<(u16, u8)>, usize) {
    let mut bits = BitReader::new(data, 0);
    let mut runs = Vec::new();
    while let PixelCode::Run(run) = read_code(&mut bits).unwrap() {
        runs.push((run.run_length, run.pixel_code));
    }
    bits.byte_align();
    (runs, bits.bytes_consumed())
}

#[test]
fn test_4bit_codes() {
    let data = [
        0x30, 0x50, 0xa6, 0x0c, 0x0d, 0x0e, 0x79, 0x0f, 0x10, 0x20, 0x00, 0xf0,
    ];
    let (runs, consumed) = collect_runs(&data, read_4bit_code);
    assert_eq!(
        runs,
        vec![(1, 3), (7, 0), (6, 6), (1, 0), (2, 0), (16, 9), (41, 2)]
    );
    assert_eq!(consumed, 11);
}

#[test]
fn test_2bit_codes() {
    let data = [0xca, 0x44, 0x10, 0x8e, 0x0c, 0x07, 0x00, 0xf0];
    let (runs, consumed) = collect_runs(&data, read_2bit_code);
    assert_eq!(runs, vec![(1, 3), (5, 1), (1, 0), (2, 0), (15, 2), (30, 3)]);
    assert_eq!(consumed, 7);
}

#[test]
fn test_8bit_codes() {
    let data = [0x05, 0x00, 0x0a, 0x00, 0x83, 0x40, 0x00, 0x00, 0xf0];
    let (runs, consumed) = collect_runs(&data, read_8bit_code);
    assert_eq!(runs, vec![(1, 5), (10, 0), (3, 0x40)]);
    assert_eq!(consumed, 8);
}

#[cfg(test)]
fn encode_4bit_run(run_length: u16, pixel_code: u8, nibbles: &mut Vec<u8>) {
    let rl = |offset: u16| (run_length - offset) as u8;
    match (run_length, pixel_code) {
        (1, 0) => nibbles.extend_from_slice(&[0, 0xc]),
        (1, code) => nibbles.push(code),
        (2, 0) => nibbles.extend_from_slice(&[0, 0xd]),
        (3..=9, 0) => nibbles.extend_from_slice(&[0, rl(2)]),
        (4..=7, code) => nibbles.extend_from_slice(&[0, 0x8 | rl(4), code]),
        (9..=24, code) => nibbles.extend_from_slice(&[0, 0xe, rl(9), code]),
        (25..=280, code) => {
            nibbles.extend_from_slice(&[0, 0xf, rl(25) >> 4, rl(25) & 0xf, code])
        }
        _ => panic!("no single code for {} x {}", run_length, pixel_code),
    }
}

#[test]
fn test_4bit_branches_round_trip() {
    let cases = (1..=15)
        .map(|code| (1, code))
        .chain((3..=9).map(|run| (run, 0)))
        .chain((4..=7).map(|run| (run, 5)))
        .chain((9..=24).map(|run| (run, 9)))
        .chain((25..=280).map(|run| (run, 2)));
    for (run_length, pixel_code) in cases {
        let mut nibbles = Vec::new();
        encode_4bit_run(run_length, pixel_code, &mut nibbles);
        nibbles.extend_from_slice(&[0, 0, 0]);
        let data: Vec<u8> = nibbles.chunks(2).map(|pair| pair[0] << 4 | pair.get(1).unwrap_or(&0)).collect();

        let mut bits = BitReader::new(&data, 0);
        assert_eq!(
            read_4bit_code(&mut bits).unwrap(),
            PixelCode::run(run_length, pixel_code)
        );
        assert_eq!(read_4bit_code(&mut bits).unwrap(), PixelCode::EndOfString);
    }
}

#[test]
fn test_string_without_end_code() {
    let mut bits = BitReader::new(&[0x0e], 0);
    assert!(read_4bit_code(&mut bits).is_err());
}

#[test]
fn test_default_map_tables() {
    let maps = MapTables::default();
    assert_eq!(maps.translate(RegionDepth::TwoBit, Some(RegionDepth::FourBit), 2), 0x8);
    assert_eq!(maps.translate(RegionDepth::TwoBit, Some(RegionDepth::EightBit), 1), 0x77);
    assert_eq!(maps.translate(RegionDepth::FourBit, Some(RegionDepth::EightBit), 0xa), 0xaa);
    assert_eq!(maps.translate(RegionDepth::FourBit, Some(RegionDepth::FourBit), 0xa), 0xa);
    assert_eq!(maps.translate(RegionDepth::TwoBit, None, 3), 3);
}

#[cfg(test)]
fn decode_block(
    data: &[u8],
    cursor: PaintCursor,
    depth: Option<RegionDepth>,
) -> (super::DecoderState, String) {
    use crate::{config::DecoderConfig, sink::NullSink, trace::XmlTrace};

    let config = DecoderConfig::default().with_width(16).with_height(8);
    let mut state = super::DecoderState::new(&config);
    let mut sink = NullSink;
    let mut trace = XmlTrace::new(Vec::new());
    let mut ctx = DecodeContext {
        config: &config,
        state: &mut state,
        sink: &mut sink,
        trace: &mut trace,
    };
    decode_sub_block(data, 0, cursor, depth, &mut ctx).unwrap();
    (state, String::from_utf8(trace.into_inner()).unwrap())
}

#[test]
fn test_lines_and_unknown_data_type() {
    let data = [0x11, 0x30, 0x00, 0xf0, 0x11, 0x30, 0x00, 0x07, 0xf0];
    let (state, trace) = decode_block(&data, PaintCursor::new(2, 1), Some(RegionDepth::FourBit));
    let buffer = state.buffer();
    assert_eq!(buffer.get(2, 1), Some(3));
    assert_eq!(buffer.get(2, 3), Some(3));
    assert_eq!(buffer.cells().iter().filter(|&&c| c != 0).count(), 2);
    assert_eq!(
        trace,
        "<?xml version=\"1.0\" ?>\n\
         <scanline>\n\
         <pixel run_length=\"1\" pixel_code=\"3\" />\n\
         </scanline>\n\
         <scanline>\n\
         <pixel run_length=\"1\" pixel_code=\"3\" />\n\
         </scanline>\n"
    );
}

#[test]
fn test_map_table_applies_to_2bit_string() {
    let data = [0x20, 0x12, 0x34, 0x10, 0xc0];
    let (state, _) = decode_block(&data, PaintCursor::new(0, 0), Some(RegionDepth::FourBit));
    assert_eq!(state.buffer().get(0, 0), Some(4));
    assert_eq!(state.buffer().get(1, 0), Some(0));
}

#[test]
fn test_run_below_buffer_dropped() {
    let (state, _) = decode_block(&[0x11, 0x30, 0x00], PaintCursor::new(0, 9), None);
    assert!(state.buffer().cells().iter().all(|&c| c == 0));
}
