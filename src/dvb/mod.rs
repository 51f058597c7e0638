//! Decoding of DVB subtitling segments (ETS 300 743) into a composited page.
//!
//! Segments arrive in the payload of each PES packet. Page composition segments place regions
//! on the page, region composition segments place objects within regions, CLUT definition
//! segments program colors and object data segments carry the run-length coded pixels. All
//! cross-segment references are by numeric id and are resolved when the referencing segment is
//! applied.

use super::{
    color::Rgba,
    composition::CompositionBuffer,
    config::DecoderConfig,
    pes::{PesPacket, PesReader},
    sink::{NullSink, PresentationSink},
    trace::{NullTrace, TraceSink},
    ErrorDetails, Result, SliceReader,
};
use log::{debug, warn};
use std::collections::HashMap;
use std::io::Read;

pub mod clut;
pub mod object;
pub mod page;
pub mod pixel;
pub mod region;
pub mod segment;

use clut::Clut;
use page::Page;
use region::{ObjectPlacement, RegionComposition};

/// Number of sink palette entries reset to transparent when a decoder starts.
pub const SINK_PALETTE_ENTRIES: u8 = 16;

/// Page, region, object and CLUT tables plus the composition buffer.
///
/// Owned by one [`Decoder`]; nothing else mutates it.
#[derive(Debug)]
pub struct DecoderState {
    pub(crate) page: Option<Page>,
    pub(crate) regions: HashMap<u8, RegionComposition>,
    pub(crate) objects: HashMap<u16, ObjectPlacement>,
    pub(crate) cluts: HashMap<u8, Clut>,
    pub(crate) buffer: CompositionBuffer,
}

impl DecoderState {
    pub fn new(config: &DecoderConfig) -> Self {
        Self {
            page: None,
            regions: HashMap::new(),
            objects: HashMap::new(),
            cluts: HashMap::new(),
            buffer: CompositionBuffer::new(config.width, config.height),
        }
    }

    /// The page described by the latest page composition segment.
    pub fn page(&self) -> Option<&Page> {
        self.page.as_ref()
    }

    /// The latest region composition received for `region_id`.
    pub fn region(&self, region_id: u8) -> Option<&RegionComposition> {
        self.regions.get(&region_id)
    }

    /// Absolute placement of an object, as computed by the latest region that listed it.
    pub fn object_placement(&self, object_id: u16) -> Option<ObjectPlacement> {
        self.objects.get(&object_id).copied()
    }

    pub fn clut(&self, clut_id: u8) -> Option<&Clut> {
        self.cluts.get(&clut_id)
    }

    pub fn buffer(&self) -> &CompositionBuffer {
        &self.buffer
    }
}

/// Everything a segment needs while being applied.
pub(crate) struct DecodeContext<'a> {
    pub config: &'a DecoderConfig,
    pub state: &'a mut DecoderState,
    pub sink: &'a mut dyn PresentationSink,
    pub trace: &'a mut dyn TraceSink,
}

impl DecodeContext<'_> {
    /// Hands the whole composition buffer to the presentation sink.
    pub fn show(&mut self) {
        self.sink.show(self.state.buffer.update());
    }
}

/// Stateful DVB subtitle decoder.
///
/// Feed it PES packets in stream order, either one at a time with
/// [`Decoder::decode_packet`] or from a byte source with [`Decoder::run`].
pub struct Decoder<P = NullSink, T = NullTrace> {
    config: DecoderConfig,
    state: DecoderState,
    sink: P,
    trace: T,
}

impl Default for Decoder {
    fn default() -> Self {
        Decoder::new(DecoderConfig::default(), NullSink, NullTrace)
    }
}

impl<P: PresentationSink, T: TraceSink> Decoder<P, T> {
    pub fn new(config: DecoderConfig, sink: P, trace: T) -> Self {
        let state = DecoderState::new(&config);
        let mut decoder = Self {
            config,
            state,
            sink,
            trace,
        };
        decoder.reset_palette();
        decoder
    }

    /// Programs every sink palette entry as fully transparent.
    pub fn reset_palette(&mut self) {
        for entry_id in (0..SINK_PALETTE_ENTRIES).rev() {
            self.sink.set_palette(entry_id, Rgba::TRANSPARENT);
        }
    }

    pub fn config(&self) -> &DecoderConfig {
        &self.config
    }

    pub fn state(&self) -> &DecoderState {
        &self.state
    }

    pub fn sink(&self) -> &P {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut P {
        &mut self.sink
    }

    pub fn trace_mut(&mut self) -> &mut T {
        &mut self.trace
    }

    pub fn into_parts(self) -> (P, T) {
        (self.sink, self.trace)
    }

    /// Decodes all segments of one packet. The packet's trace elements are closed even when
    /// decoding fails.
    pub fn decode_packet(&mut self, packet: &PesPacket) -> Result<usize> {
        self.trace.begin(
            "pes_packet",
            &[
                (
                    "data_identifier",
                    &format_args!("0x{:02x}", packet.data_identifier),
                ),
                ("pts_secs", &format_args!("{:.2}", packet.pts_secs())),
            ],
        )?;
        self.trace.begin(
            "subtitle_stream",
            &[("id", &format_args!("0x{:02x}", packet.subtitle_stream_id))],
        )?;
        let result = self.decode_segments(&packet.payload);
        self.trace.end("subtitle_stream")?;
        self.trace.end("pes_packet")?;
        result
    }

    /// Decodes the run of segments at the start of `payload`, stopping at the first byte that
    /// is not a sync byte. Returns the number of segments seen, skipped ones included.
    pub fn decode_segments(&mut self, payload: &[u8]) -> Result<usize> {
        let mut reader = SliceReader::new(payload);
        let mut ctx = DecodeContext {
            config: &self.config,
            state: &mut self.state,
            sink: &mut self.sink,
            trace: &mut self.trace,
        };
        segment::dispatch_segments(&mut reader, &mut ctx)
    }

    /// Decodes packets from `reader` until end of input, or until `keep_going` returns `false`.
    ///
    /// `keep_going` is consulted before each packet; a packet is never abandoned half way.
    /// A packet whose segments overrun its payload is dropped from that point with a warning and
    /// counted. Returns the number of packets decoded.
    pub fn run<R: Read, F: FnMut() -> bool>(
        &mut self,
        reader: &mut PesReader<R>,
        mut keep_going: F,
    ) -> Result<usize> {
        let mut packets = 0;
        while keep_going() {
            let packet = match reader.next_packet() {
                Ok(Some(packet)) => packet,
                Ok(None) => break,
                Err(err) if err.is_end_of_stream() && self.config.truncated_frame_is_eos => {
                    warn!("stopping at truncated frame: {}", err);
                    break;
                }
                Err(err) => return Err(err),
            };
            match self.decode_packet(&packet) {
                Err(err) if matches!(err.details(), ErrorDetails::PacketOverrun(_)) => {
                    warn!("dropping rest of packet at pts {}: {}", packet.pts, err)
                }
                Err(err) => return Err(err),
                Ok(_) => {}
            }
            packets += 1;
        }
        debug!("decoded {} packets", packets);
        Ok(packets)
    }
}
