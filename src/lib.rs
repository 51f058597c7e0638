//! Library for decoding DVB bitmap subtitle streams (ETS 300 743).
//!
//! A subtitle elementary stream arrives as PES packets. Each packet carries a run of segments
//! (page composition, region composition, CLUT definition and object data) that together
//! describe a composited bitmap page. [`Decoder`] keeps the page state across packets, paints
//! decoded pixel runs into a [`CompositionBuffer`] and hands palette and bitmap updates to a
//! [`PresentationSink`]. Every parsed field can also be rendered through a [`TraceSink`].
//!
//! # Usage
//! Simply add this crate as a dependency in your `Cargo.toml`.
//!
//! ```toml
//! [dependencies]
//! dvbsub-io = "~0.1.0"
//! ```
//!
//! ```no_run
//! use dvbsub_io::{Decoder, DecoderConfig, MemorySink, NullTrace, PesReader};
//! use std::fs::File;
//!
//! let file = File::open("subtitles.pes").expect("Unable to open!");
//! let mut reader = PesReader::new(file);
//! let mut decoder = Decoder::new(DecoderConfig::default(), MemorySink::default(), NullTrace);
//! decoder.run(&mut reader, || true).expect("Decode error!");
//! println!("{} bitmap updates", decoder.sink().updates());
//! ```

//#![deny(missing_docs, unsafe_code, warnings)]

use std::fmt::{self, Display, Formatter};
use std::io;
use std::result;

mod slice_reader;
pub use slice_reader::SliceReader;

pub mod bit_reader;
pub mod color;
pub mod composition;
pub mod config;
pub mod dvb;
pub mod pes;
pub mod sink;
pub mod trace;

pub use color::Rgba;
pub use composition::{CompositionBuffer, PaintCursor};
pub use config::DecoderConfig;
pub use dvb::{Decoder, DecoderState};
pub use pes::{PesPacket, PesReader};
pub use sink::{BitmapUpdate, MemorySink, NullSink, PresentationSink};
pub use trace::{NullTrace, TraceSink, XmlTrace};

/// Kinds of failure that abort decoding of the current packet or stream.
#[derive(Debug)]
pub enum ErrorDetails {
    /// A read of the given number of bytes ran past the end of the current segment or frame.
    PacketOverrun(usize),
    /// The byte source ended inside a PES frame.
    ///
    /// When the input ends within the stream id and length bytes that follow the start code,
    /// `declared` is 3 and `available` counts those header bytes.
    FrameTruncated {
        /// Payload bytes promised by the PES length field, or 3 for a short header.
        declared: usize,
        /// Bytes actually read before end of input.
        available: usize,
    },
    /// A fixed marker byte of the PES optional header had an unsupported value.
    UnexpectedHeader {
        /// Name of the offending header field.
        field: &'static str,
        /// Required value.
        expected: u32,
        /// Value found in the stream.
        found: u32,
    },
    /// The byte source or the trace sink failed.
    Io(io::Error),
}

/// A decoding error and the byte offset it was detected at.
#[derive(Debug)]
pub struct Error {
    location: usize,
    details: ErrorDetails,
}

impl Error {
    pub fn new(location: usize, details: ErrorDetails) -> Self {
        Self { location, details }
    }

    /// Byte offset within the buffer (or stream, for framing errors) being parsed.
    pub fn location(&self) -> usize {
        self.location
    }

    pub fn details(&self) -> &ErrorDetails {
        &self.details
    }

    /// Truncated frames mean the source ran dry mid-packet; callers usually stop there.
    pub fn is_end_of_stream(&self) -> bool {
        matches!(self.details, ErrorDetails::FrameTruncated { .. })
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match &self.details {
            ErrorDetails::PacketOverrun(len) => {
                write!(f, "read of {} bytes overruns packet", len)?
            }
            ErrorDetails::FrameTruncated {
                declared,
                available,
            } => write!(
                f,
                "PES frame truncated: {} of {} bytes available",
                available, declared
            )?,
            ErrorDetails::UnexpectedHeader {
                field,
                expected,
                found,
            } => write!(
                f,
                "unexpected PES {}: {:#x} (expected {:#x})",
                field, found, expected
            )?,
            ErrorDetails::Io(err) => write!(f, "I/O error: {}", err)?,
        }
        write!(f, " at offset {}", self.location)
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match &self.details {
            ErrorDetails::Io(err) => Some(err),
            _ => None,
        }
    }
}

/// Trace sink failures carry no stream offset.
impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::new(0, ErrorDetails::Io(err))
    }
}

pub type Result<T> = result::Result<T, Error>;

#[macro_export]
macro_rules! pts_format_args {
    ($pts:expr) => {
        format_args!(
            "{}:{}:{}:{}",
            $pts / (90000 * 60 * 60),
            $pts / (90000 * 60) % 60,
            $pts / 90000 % 60,
            $pts % 90000
        )
    };
}
