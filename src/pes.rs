//! Packetized Elementary Stream (PES) framing for subtitle streams.
//!
//! Reference: <https://en.wikipedia.org/wiki/Packetized_elementary_stream>

use super::{
    config::DecoderConfig, pts_format_args, read_bitfield, Error, ErrorDetails, Result,
    SliceReader,
};
use log::{debug, trace};
use modular_bitfield_msb::prelude::*;
use std::fmt::{Debug, Formatter};
use std::io::{BufReader, ErrorKind, Read};

/// Packet start code prefix.
pub const START_CODE: [u8; 3] = [0x00, 0x00, 0x01];
/// The only PES flags byte accepted: PTS present, no DTS or other optional fields.
pub const PTS_ONLY_FLAGS: u8 = 0x80;
/// Header data length matching [`PTS_ONLY_FLAGS`]: exactly one 5-byte PTS.
pub const PTS_ONLY_HEADER_LENGTH: u8 = 5;
/// Ticks per second of the PTS clock.
pub const PTS_CLOCK_HZ: f64 = 90000.0;

/// Header of PES unit.
#[bitfield]
#[derive(Debug)]
pub struct PesHeader {
    pub start_code: B24,
    pub stream_id: B8,
    pub packet_length: B16,
}

/// Optional header of PES unit.
#[bitfield]
#[derive(Debug)]
pub struct PesOptionalHeader {
    pub marker_bits: B2,
    pub scrambling_control: B2,
    pub priority: bool,
    pub data_alignment_indicator: bool,
    pub copyright: bool,
    pub original: bool,
    pub has_pts: bool,
    pub has_dts: bool,
    pub escr: bool,
    pub es_rate: bool,
    pub dsm_trick_mode: bool,
    pub has_additional_copy_info: bool,
    pub has_crc: bool,
    pub has_extension: bool,
    pub additional_header_length: B8,
}

/// Reassembles the 33-bit timestamp, dropping the three marker bits.
pub fn parse_timestamp(b: &[u8; 5]) -> u64 {
    let mut ts: u64 = ((b[0] & 0x0E) as u64) << 29;
    ts |= (b[1] as u64) << 22;
    ts |= ((b[2] & 0xFE) as u64) << 14;
    ts |= (b[3] as u64) << 7;
    ts |= ((b[4] & 0xFE) as u64) >> 1;
    ts
}

/// Converts 90 kHz clock ticks to seconds.
pub fn pts_to_secs(pts: u64) -> f64 {
    pts as f64 / PTS_CLOCK_HZ
}

/// One PES packet of a DVB subtitle stream.
pub struct PesPacket {
    /// PES Header.
    pub header: PesHeader,
    /// Optional header; always PTS-only for accepted packets.
    pub optional_header: PesOptionalHeader,
    /// Presentation time stamp in 90 kHz ticks.
    pub pts: u64,
    /// PES data identifier; 0x20 for DVB subtitles.
    pub data_identifier: u8,
    /// Subtitle stream id; 0x00 for DVB subtitles.
    pub subtitle_stream_id: u8,
    /// Segment data following the two identifier bytes, starting at the first sync byte.
    pub payload: Vec<u8>,
}

impl Debug for PesPacket {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PesPacket")
            .field("header", &self.header)
            .field("optional_header", &self.optional_header)
            .field("pts", &pts_format_args!(self.pts))
            .field("data_identifier", &self.data_identifier)
            .field("subtitle_stream_id", &self.subtitle_stream_id)
            .field("payload.len()", &self.payload.len())
            .finish()
    }
}

impl PesPacket {
    /// Parses one complete frame, starting at its start code.
    ///
    /// Bytes after the declared packet length are ignored.
    pub fn parse(frame: &[u8]) -> Result<Self> {
        let mut reader = SliceReader::new(frame);
        let header = read_bitfield!(reader, PesHeader);
        if header.start_code() != 0x000001 {
            return Err(Error::new(
                0,
                ErrorDetails::UnexpectedHeader {
                    field: "start code prefix",
                    expected: 0x000001,
                    found: header.start_code(),
                },
            ));
        }

        let declared = header.packet_length() as usize;
        if reader.remaining_len() < declared {
            return Err(reader.make_error(ErrorDetails::FrameTruncated {
                declared,
                available: reader.remaining_len(),
            }));
        }
        let mut body = reader.new_sub_reader(declared)?;

        let flags_location = body.location() + 1;
        let optional_bytes = *body.read_array_ref::<3>()?;
        let optional_header = PesOptionalHeader::from_bytes(optional_bytes);
        if optional_bytes[1] != PTS_ONLY_FLAGS {
            return Err(Error::new(
                flags_location,
                ErrorDetails::UnexpectedHeader {
                    field: "header flags",
                    expected: PTS_ONLY_FLAGS as u32,
                    found: optional_bytes[1] as u32,
                },
            ));
        }
        if optional_header.additional_header_length() != PTS_ONLY_HEADER_LENGTH {
            return Err(Error::new(
                flags_location + 1,
                ErrorDetails::UnexpectedHeader {
                    field: "header data length",
                    expected: PTS_ONLY_HEADER_LENGTH as u32,
                    found: optional_header.additional_header_length() as u32,
                },
            ));
        }

        let pts = parse_timestamp(body.read_array_ref::<5>()?);
        let data_identifier = body.read_u8()?;
        let subtitle_stream_id = body.read_u8()?;
        let payload = body.read_to_end()?.to_vec();

        Ok(Self {
            header,
            optional_header,
            pts,
            data_identifier,
            subtitle_stream_id,
            payload,
        })
    }

    pub fn pts_secs(&self) -> f64 {
        pts_to_secs(self.pts)
    }
}

/// Byte source wrapper that retries interrupted reads a bounded number of times.
struct RetryingSource<R> {
    inner: BufReader<R>,
    max_retries: u32,
    position: usize,
}

impl<R: Read> RetryingSource<R> {
    /// Fills as much of `buf` as possible; fewer bytes are returned only at end of input.
    fn read_some(&mut self, buf: &mut [u8]) -> Result<usize> {
        let mut filled = 0;
        let mut stalls = 0;
        while filled < buf.len() {
            match self.inner.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => {
                    filled += n;
                    stalls = 0;
                }
                Err(err)
                    if err.kind() == ErrorKind::Interrupted
                        || err.kind() == ErrorKind::WouldBlock =>
                {
                    stalls += 1;
                    if stalls > self.max_retries {
                        return Err(Error::new(self.position + filled, ErrorDetails::Io(err)));
                    }
                    trace!("retrying stalled read ({} of {})", stalls, self.max_retries);
                }
                Err(err) => {
                    return Err(Error::new(self.position + filled, ErrorDetails::Io(err)));
                }
            }
        }
        self.position += filled;
        Ok(filled)
    }
}

/// Pulls PES packets out of a byte stream.
///
/// Garbage before a start code is skipped. `Ok(None)` signals a clean end of input between
/// packets; input ending inside a packet is reported as
/// [`ErrorDetails::FrameTruncated`].
///
/// # Example
///
/// ```no_run
/// use dvbsub_io::PesReader;
///
/// let stdin = std::io::stdin();
/// for packet in PesReader::new(stdin.lock()) {
///     let packet = packet.expect("Parse Error!");
///     println!("{:.2}: {} bytes", packet.pts_secs(), packet.payload.len());
/// }
/// ```
pub struct PesReader<R> {
    source: RetryingSource<R>,
    frame: Vec<u8>,
}

impl<R: Read> PesReader<R> {
    pub fn new(inner: R) -> Self {
        Self::with_config(inner, &DecoderConfig::default())
    }

    pub fn with_config(inner: R, config: &DecoderConfig) -> Self {
        Self {
            source: RetryingSource {
                inner: BufReader::new(inner),
                max_retries: config.max_read_retries,
                position: 0,
            },
            frame: Vec::with_capacity(0x10000 + 6),
        }
    }

    /// Bytes consumed from the source so far.
    pub fn position(&self) -> usize {
        self.source.position
    }

    /// Scans forward to the next start code. Returns `false` at end of input.
    fn sync(&mut self) -> Result<bool> {
        let mut window = [0u8; 3];
        if self.source.read_some(&mut window)? < window.len() {
            return Ok(false);
        }
        let mut skipped = 0usize;
        while window != START_CODE {
            window.rotate_left(1);
            if self.source.read_some(&mut window[2..])? == 0 {
                debug!("{} trailing bytes without start code", skipped + 2);
                return Ok(false);
            }
            skipped += 1;
        }
        if skipped > 0 {
            debug!("skipped {} bytes before start code", skipped);
        }
        Ok(true)
    }

    /// Reads the next raw frame: start code, stream id, length and the declared payload.
    pub fn read_frame(&mut self) -> Result<Option<&[u8]>> {
        if !self.sync()? {
            return Ok(None);
        }
        let start = self.source.position - START_CODE.len();

        self.frame.clear();
        self.frame.extend_from_slice(&START_CODE);
        self.frame.resize(6, 0);
        let read = self.source.read_some(&mut self.frame[3..6])?;
        // Input ended inside the stream id and length bytes.
        if read < 3 {
            return Err(Error::new(
                start,
                ErrorDetails::FrameTruncated {
                    declared: 3,
                    available: read,
                },
            ));
        }

        let declared = u16::from_be_bytes([self.frame[4], self.frame[5]]) as usize;
        self.frame.resize(6 + declared, 0);
        let available = self.source.read_some(&mut self.frame[6..])?;
        if available < declared {
            return Err(Error::new(
                start,
                ErrorDetails::FrameTruncated {
                    declared,
                    available,
                },
            ));
        }
        Ok(Some(self.frame.as_slice()))
    }

    /// Reads and parses the next packet.
    pub fn next_packet(&mut self) -> Result<Option<PesPacket>> {
        match self.read_frame()? {
            Some(frame) => PesPacket::parse(frame).map(Some),
            None => Ok(None),
        }
    }
}

impl<R: Read> Iterator for PesReader<R> {
    type Item = Result<PesPacket>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_packet().transpose()
    }
}

#[cfg(test)]
fn encode_timestamp(pts: u64) -> [u8; 5] {
    [
        0x21 | ((pts >> 29) & 0x0E) as u8,
        (pts >> 22) as u8,
        ((pts >> 14) & 0xFE) as u8 | 1,
        (pts >> 7) as u8,
        ((pts << 1) & 0xFE) as u8 | 1,
    ]
}

#[cfg(test)]
fn make_frame(pts: u64, payload: &[u8]) -> Vec<u8> {
    let length = 3 + 5 + 2 + payload.len();
    let mut frame = vec![0x00, 0x00, 0x01, 0xbd, (length >> 8) as u8, length as u8];
    frame.extend_from_slice(&[0x81, PTS_ONLY_FLAGS, PTS_ONLY_HEADER_LENGTH]);
    frame.extend_from_slice(&encode_timestamp(pts));
    frame.extend_from_slice(&[0x20, 0x00]);
    frame.extend_from_slice(payload);
    frame
}

#[test]
fn test_timestamp_seconds() {
    for &pts in &[0u64, 1, 90000, 2815200, 0x1_2345_6789, (1 << 33) - 1] {
        let bytes = encode_timestamp(pts);
        assert_eq!(parse_timestamp(&bytes), pts);
        assert_eq!(pts_to_secs(parse_timestamp(&bytes)), pts as f64 / 90000.0);
    }
}

#[test]
fn test_parse_packet() {
    let frame = make_frame(900000, &[0x0f, 0x10, 0xff]);
    let packet = PesPacket::parse(&frame).unwrap();
    assert_eq!(packet.header.stream_id(), 0xbd);
    assert!(packet.optional_header.has_pts());
    assert!(!packet.optional_header.has_dts());
    assert_eq!(packet.pts, 900000);
    assert_eq!(packet.pts_secs(), 10.0);
    assert_eq!(packet.data_identifier, 0x20);
    assert_eq!(packet.subtitle_stream_id, 0x00);
    assert_eq!(packet.payload, vec![0x0f, 0x10, 0xff]);
}

#[test]
fn test_unexpected_header() {
    let mut frame = make_frame(0, &[0xff]);
    frame[7] = 0xc0;
    let err = PesPacket::parse(&frame).unwrap_err();
    assert_eq!(err.location(), 7);
    assert!(matches!(
        err.details(),
        ErrorDetails::UnexpectedHeader {
            expected: 0x80,
            found: 0xc0,
            ..
        }
    ));

    let mut frame = make_frame(0, &[0xff]);
    frame[8] = 10;
    assert!(matches!(
        PesPacket::parse(&frame).unwrap_err().details(),
        ErrorDetails::UnexpectedHeader {
            expected: 5,
            found: 10,
            ..
        }
    ));
}

#[test]
fn test_reader_skips_garbage_and_ends() {
    let mut stream = vec![0xaa, 0x00, 0x00, 0x00];
    stream.extend(make_frame(90000, &[0x0f]));
    stream.extend(make_frame(180000, &[0xff]));
    stream.extend(&[0x00, 0x00]);
    let mut reader = PesReader::new(&stream[..]);
    assert_eq!(reader.next_packet().unwrap().unwrap().pts, 90000);
    assert_eq!(reader.next_packet().unwrap().unwrap().pts, 180000);
    assert!(reader.next_packet().unwrap().is_none());
    assert_eq!(reader.position(), stream.len());
}

#[test]
fn test_reader_truncated_frame() {
    let mut stream = make_frame(0, &[0x0f, 0x10, 0x00, 0x01]);
    stream.truncate(stream.len() - 3);
    let mut reader = PesReader::new(&stream[..]);
    let err = reader.next_packet().unwrap_err();
    assert!(err.is_end_of_stream());
    assert!(matches!(
        err.details(),
        ErrorDetails::FrameTruncated {
            declared: 14,
            available: 11
        }
    ));
}

#[test]
fn test_reader_truncated_header() {
    let stream = [0x00, 0x00, 0x01, 0xbd];
    let mut reader = PesReader::new(&stream[..]);
    let err = reader.next_packet().unwrap_err();
    assert!(err.is_end_of_stream());
    assert_eq!(err.location(), 0);
    assert!(matches!(
        err.details(),
        ErrorDetails::FrameTruncated {
            declared: 3,
            available: 1
        }
    ));
}

#[cfg(test)]
struct Stuttering<'a> {
    data: &'a [u8],
    calls: usize,
}

#[cfg(test)]
impl Read for Stuttering<'_> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.calls += 1;
        if self.calls % 2 == 0 {
            return Err(std::io::Error::new(ErrorKind::Interrupted, "again"));
        }
        let n = buf.len().min(self.data.len()).min(1);
        buf[..n].copy_from_slice(&self.data[..n]);
        self.data = &self.data[n..];
        Ok(n)
    }
}

#[test]
fn test_reader_retries_short_reads() {
    let stream = make_frame(4500, &[0x0f, 0x13]);
    let reader = PesReader::new(Stuttering {
        data: &stream,
        calls: 0,
    });
    let packets: Vec<_> = reader.collect::<Result<_>>().unwrap();
    assert_eq!(packets.len(), 1);
    assert_eq!(packets[0].payload, vec![0x0f, 0x13]);
}

#[cfg(test)]
struct Blocked;

#[cfg(test)]
impl Read for Blocked {
    fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
        Err(std::io::Error::new(ErrorKind::WouldBlock, "blocked"))
    }
}

#[test]
fn test_reader_gives_up_on_stalled_source() {
    let config = DecoderConfig::default().with_max_read_retries(3);
    let mut reader = PesReader::with_config(Blocked, &config);
    let err = reader.next_packet().unwrap_err();
    assert!(matches!(err.details(), ErrorDetails::Io(_)));
    assert!(!err.is_end_of_stream());
}
