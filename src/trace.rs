//! Structured rendering of every parsed field, for debugging and golden-output tests.

use std::fmt::Display;
use std::io::{self, Write};

/// A named attribute of a trace element.
pub type Attr<'a> = (&'a str, &'a dyn Display);

/// Receives the decoder's parse tree as nested elements.
///
/// Element and field names follow the segment syntax: `page_composition_segment`,
/// `region_composition_segment`, `CLUT_definition_segment`, `object_data_segment` and their
/// children.
pub trait TraceSink {
    /// Opens an element that later children nest under.
    fn begin(&mut self, tag: &str, attrs: &[Attr<'_>]) -> io::Result<()>;
    /// A scalar field of the current element.
    fn field(&mut self, tag: &str, value: &dyn Display) -> io::Result<()>;
    /// An element with attributes and no children.
    fn leaf(&mut self, tag: &str, attrs: &[Attr<'_>]) -> io::Result<()>;
    /// Closes the innermost open element, which is named `tag`.
    fn end(&mut self, tag: &str) -> io::Result<()>;
}

impl<T: TraceSink + ?Sized> TraceSink for &mut T {
    fn begin(&mut self, tag: &str, attrs: &[Attr<'_>]) -> io::Result<()> {
        (**self).begin(tag, attrs)
    }

    fn field(&mut self, tag: &str, value: &dyn Display) -> io::Result<()> {
        (**self).field(tag, value)
    }

    fn leaf(&mut self, tag: &str, attrs: &[Attr<'_>]) -> io::Result<()> {
        (**self).leaf(tag, attrs)
    }

    fn end(&mut self, tag: &str) -> io::Result<()> {
        (**self).end(tag)
    }
}

/// Discards the trace.
#[derive(Debug, Default, Copy, Clone)]
pub struct NullTrace;

impl TraceSink for NullTrace {
    fn begin(&mut self, _tag: &str, _attrs: &[Attr<'_>]) -> io::Result<()> {
        Ok(())
    }

    fn field(&mut self, _tag: &str, _value: &dyn Display) -> io::Result<()> {
        Ok(())
    }

    fn leaf(&mut self, _tag: &str, _attrs: &[Attr<'_>]) -> io::Result<()> {
        Ok(())
    }

    fn end(&mut self, _tag: &str) -> io::Result<()> {
        Ok(())
    }
}

/// Writes the trace as XML, one element per line, prefixed by an XML declaration.
#[derive(Debug)]
pub struct XmlTrace<W: Write> {
    out: W,
    started: bool,
}

impl<W: Write> XmlTrace<W> {
    pub fn new(out: W) -> Self {
        Self { out, started: false }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn start(&mut self) -> io::Result<()> {
        if !self.started {
            self.started = true;
            writeln!(self.out, "<?xml version=\"1.0\" ?>")?;
        }
        Ok(())
    }

    fn write_attrs(&mut self, attrs: &[Attr<'_>]) -> io::Result<()> {
        for (name, value) in attrs {
            write!(self.out, " {}=\"{}\"", name, value)?;
        }
        Ok(())
    }
}

impl<W: Write> TraceSink for XmlTrace<W> {
    fn begin(&mut self, tag: &str, attrs: &[Attr<'_>]) -> io::Result<()> {
        self.start()?;
        write!(self.out, "<{}", tag)?;
        self.write_attrs(attrs)?;
        writeln!(self.out, ">")
    }

    fn field(&mut self, tag: &str, value: &dyn Display) -> io::Result<()> {
        self.start()?;
        writeln!(self.out, "<{}>{}</{}>", tag, value, tag)
    }

    fn leaf(&mut self, tag: &str, attrs: &[Attr<'_>]) -> io::Result<()> {
        self.start()?;
        write!(self.out, "<{}", tag)?;
        self.write_attrs(attrs)?;
        writeln!(self.out, " />")
    }

    fn end(&mut self, tag: &str) -> io::Result<()> {
        self.start()?;
        writeln!(self.out, "</{}>", tag)
    }
}

#[test]
fn test_xml_trace() {
    let mut trace = XmlTrace::new(Vec::new());
    trace
        .begin("page_composition_segment", &[("page_id", &format_args!("0x{:02x}", 1))])
        .unwrap();
    trace.field("page_time_out", &5).unwrap();
    trace
        .leaf("page_region", &[("id", &"00"), ("x", &10), ("y", &20)])
        .unwrap();
    trace.end("page_composition_segment").unwrap();
    assert_eq!(
        String::from_utf8(trace.into_inner()).unwrap(),
        "<?xml version=\"1.0\" ?>\n\
         <page_composition_segment page_id=\"0x01\">\n\
         <page_time_out>5</page_time_out>\n\
         <page_region id=\"00\" x=\"10\" y=\"20\" />\n\
         </page_composition_segment>\n"
    );
}
