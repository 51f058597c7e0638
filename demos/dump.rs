use dvbsub_io::{Decoder, DecoderConfig, MemorySink, PesReader, XmlTrace};
use std::env;
use std::fs::File;
use std::io::{self, BufWriter, Read, Write};

fn main() {
    pretty_env_logger::init();
    let file_path = env::args().nth(1).expect("No file argument (use - for stdin)");

    let input: Box<dyn Read> = if file_path == "-" {
        Box::new(io::stdin())
    } else {
        Box::new(File::open(&file_path).expect("unable to open!"))
    };

    let config = DecoderConfig::default();
    let mut reader = PesReader::with_config(input, &config);
    let stdout = io::stdout();
    let trace = XmlTrace::new(BufWriter::new(stdout.lock()));
    let mut decoder = Decoder::new(config, MemorySink::default(), trace);

    let packets = decoder.run(&mut reader, || true).expect("Decode error!");
    let (sink, trace) = decoder.into_parts();
    trace.into_inner().flush().expect("IO Error!");
    eprintln!(
        "{} packets, {} bitmap updates, last bitmap {}x{}",
        packets,
        sink.updates(),
        sink.width(),
        sink.height()
    );
}
