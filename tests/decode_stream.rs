use dvbsub_io::{
    dvb::region::RegionDepth, Decoder, DecoderConfig, ErrorDetails, MemorySink, NullTrace,
    PesReader, Rgba, XmlTrace,
};

const WIDTH: usize = 720;

fn init_logger() {
    let _ = pretty_env_logger::try_init();
}

fn segment(segment_type: u8, body: &[u8]) -> Vec<u8> {
    let mut out = vec![0x0f, segment_type, 0x00, 0x01];
    out.extend_from_slice(&(body.len() as u16).to_be_bytes());
    out.extend_from_slice(body);
    out
}

fn page_composition(regions: &[(u8, u16, u16)]) -> Vec<u8> {
    // time-out 5, version 0, acquisition point
    let mut body = vec![0x05, 0x04];
    for &(region_id, x, y) in regions {
        body.extend_from_slice(&[region_id, 0xff]);
        body.extend_from_slice(&x.to_be_bytes());
        body.extend_from_slice(&y.to_be_bytes());
    }
    segment(0x10, &body)
}

fn region_composition(region_id: u8, fill: bool, objects: &[(u16, u16, u16)]) -> Vec<u8> {
    let mut body = vec![region_id, (fill as u8) << 3];
    body.extend_from_slice(&(WIDTH as u16).to_be_bytes());
    body.extend_from_slice(&64u16.to_be_bytes());
    // 4-bit compatibility and depth, CLUT 0, default codes 0
    body.extend_from_slice(&[0x48, 0x00, 0x00, 0x00]);
    for &(object_id, x, y) in objects {
        body.extend_from_slice(&object_id.to_be_bytes());
        body.extend_from_slice(&[(x >> 8) as u8 & 0x0f, x as u8]);
        body.extend_from_slice(&[(y >> 8) as u8 & 0x0f, y as u8]);
    }
    segment(0x11, &body)
}

fn clut_definition(clut_id: u8, entries: &[(u8, [u8; 4])]) -> Vec<u8> {
    let mut body = vec![clut_id, 0x00];
    for (entry_id, ycrcbt) in entries {
        body.extend_from_slice(&[*entry_id, 0x41]);
        body.extend_from_slice(ycrcbt);
    }
    segment(0x12, &body)
}

fn object_data(object_id: u16, top: &[u8], bottom: &[u8]) -> Vec<u8> {
    let mut body = object_id.to_be_bytes().to_vec();
    body.push(0x00);
    body.extend_from_slice(&(top.len() as u16).to_be_bytes());
    body.extend_from_slice(&(bottom.len() as u16).to_be_bytes());
    body.extend_from_slice(top);
    body.extend_from_slice(bottom);
    segment(0x13, &body)
}

fn pes_frame(pts: u64, segments: &[Vec<u8>]) -> Vec<u8> {
    let mut payload = vec![0x20, 0x00];
    for segment in segments {
        payload.extend_from_slice(segment);
    }
    payload.push(0xff);

    let length = 3 + 5 + payload.len();
    let mut frame = vec![0x00, 0x00, 0x01, 0xbd, (length >> 8) as u8, length as u8];
    frame.extend_from_slice(&[0x81, 0x80, 0x05]);
    frame.extend_from_slice(&[
        0x21 | ((pts >> 29) & 0x0e) as u8,
        (pts >> 22) as u8,
        ((pts >> 14) & 0xfe) as u8 | 1,
        (pts >> 7) as u8,
        ((pts << 1) & 0xfe) as u8 | 1,
    ]);
    frame.extend_from_slice(&payload);
    frame
}

fn decode(stream: &[u8]) -> Decoder<MemorySink, NullTrace> {
    init_logger();
    let mut decoder = Decoder::new(DecoderConfig::default(), MemorySink::default(), NullTrace);
    let mut reader = PesReader::new(stream);
    decoder.run(&mut reader, || true).unwrap();
    decoder
}

/// A 4-bit string holding one run of 5 pixels of code 3, then end of line.
const FIVE_OF_THREE: [u8; 5] = [0x11, 0x09, 0x30, 0x00, 0xf0];

#[test]
fn test_fill_then_paint() {
    let stream = pes_frame(
        90000,
        &[
            page_composition(&[(0, 4, 6)]),
            region_composition(0, true, &[(1, 6, 4)]),
            object_data(1, &FIVE_OF_THREE, &[]),
        ],
    );
    let decoder = decode(&stream);
    let sink = decoder.sink();
    assert_eq!(sink.updates(), 2);
    assert_eq!((sink.width(), sink.height()), (WIDTH, 226));
    for (index, &code) in sink.pixels().iter().enumerate() {
        let (x, y) = (index % WIDTH, index / WIDTH);
        let expected = if y == 10 && (10..15).contains(&x) { 3 } else { 15 };
        assert_eq!(code, expected, "cell ({}, {})", x, y);
    }
}

#[test]
fn test_fields_interlace() {
    let top = [0x11, 0x30, 0x00, 0xf0, 0x11, 0x30, 0x00, 0xf0];
    let bottom = [0x11, 0x40, 0x00, 0xf0];
    let stream = pes_frame(
        0,
        &[
            page_composition(&[(0, 0, 0)]),
            region_composition(0, false, &[(1, 10, 10)]),
            object_data(1, &top, &bottom),
        ],
    );
    let decoder = decode(&stream);
    let buffer = decoder.state().buffer();
    assert_eq!(buffer.get(10, 10), Some(3));
    assert_eq!(buffer.get(10, 11), Some(4));
    assert_eq!(buffer.get(10, 12), Some(3));
    assert_eq!(buffer.get(10, 13), Some(0));
    assert_eq!(buffer.get(11, 10), Some(0));
}

#[test]
fn test_object_placement_persists_across_packets() {
    let mut stream = pes_frame(
        0,
        &[
            page_composition(&[(0, 100, 20)]),
            region_composition(0, false, &[(1, 0, 0)]),
        ],
    );
    stream.extend(pes_frame(9000, &[object_data(1, &FIVE_OF_THREE, &[])]));
    let decoder = decode(&stream);
    let placement = decoder.state().object_placement(1).unwrap();
    assert_eq!((placement.x, placement.y, placement.region_id), (100, 20, 0));
    assert_eq!(decoder.state().buffer().get(104, 20), Some(3));
    assert_eq!(decoder.state().buffer().get(105, 20), Some(0));
}

#[test]
fn test_placement_kept_when_region_drops_object() {
    let stream = pes_frame(
        0,
        &[
            page_composition(&[(0, 0, 0)]),
            region_composition(0, false, &[(1, 5, 5)]),
            region_composition(0, false, &[(2, 0, 0)]),
        ],
    );
    let decoder = decode(&stream);
    let placement = decoder.state().object_placement(1).unwrap();
    assert_eq!((placement.x, placement.y), (5, 5));
    let placement = decoder.state().object_placement(2).unwrap();
    assert_eq!((placement.x, placement.y), (0, 0));
}

#[test]
fn test_placement_subtracts_origin_y() {
    init_logger();
    let stream = pes_frame(
        0,
        &[
            page_composition(&[(0, 10, 20)]),
            region_composition(0, false, &[(1, 3, 4)]),
        ],
    );
    let config = DecoderConfig::default().with_origin_y(5);
    let mut decoder = Decoder::new(config, MemorySink::default(), NullTrace);
    decoder.run(&mut PesReader::new(&stream[..]), || true).unwrap();
    let placement = decoder.state().object_placement(1).unwrap();
    assert_eq!((placement.x, placement.y, placement.region_id), (13, 19, 0));
}

#[test]
fn test_object_without_placement() {
    let stream = pes_frame(0, &[object_data(9, &FIVE_OF_THREE, &[])]);
    let decoder = decode(&stream);
    assert_eq!(decoder.state().buffer().row(0).unwrap()[..6], [3, 3, 3, 3, 3, 0]);
    assert_eq!(decoder.sink().updates(), 1);
}

#[test]
fn test_clut_entries_reach_live_palette() {
    let stream = pes_frame(
        0,
        &[
            clut_definition(0, &[(1, [235, 128, 128, 0]), (15, [16, 128, 128, 0])]),
            clut_definition(1, &[(2, [235, 128, 128, 0])]),
        ],
    );
    let decoder = decode(&stream);
    let palette = decoder.sink().palette();
    assert_eq!(palette[1], Rgba::new(254, 254, 254, 255));
    assert_eq!(palette[2], Rgba::TRANSPARENT);
    assert_eq!(palette[15], Rgba::TRANSPARENT);

    let state = decoder.state();
    assert_eq!(
        state.clut(0).unwrap().color(RegionDepth::FourBit, 15),
        Some(Rgba::new(0, 0, 0, 255))
    );
    assert_eq!(
        state.clut(1).unwrap().color(RegionDepth::FourBit, 2),
        Some(Rgba::new(254, 254, 254, 255))
    );
}

#[test]
fn test_black_entry_zero_is_transparent() {
    let stream = pes_frame(0, &[clut_definition(0, &[(0, [16, 128, 128, 255])])]);
    let decoder = decode(&stream);
    assert_eq!(decoder.sink().palette()[0], Rgba::new(0, 0, 0, 0));
}

#[test]
fn test_unknown_segment_skipped() {
    init_logger();
    let mut payload = page_composition(&[(0, 0, 0)]);
    payload.extend(segment(0x14, &[0x01, 0x02, 0x03]));
    payload.extend(region_composition(0, false, &[]));
    payload.push(0xff);

    let mut decoder: Decoder = Decoder::default();
    assert_eq!(decoder.decode_segments(&payload).unwrap(), 3);
    assert!(decoder.state().region(0).is_some());
}

#[test]
fn test_malformed_segment_dropped() {
    init_logger();
    // CLUT entry cut short inside its segment
    let mut payload = segment(0x12, &[0x00, 0x00, 0x01, 0x41, 0xeb]);
    payload.extend(region_composition(3, false, &[]));

    let mut decoder: Decoder = Decoder::default();
    assert_eq!(decoder.decode_segments(&payload).unwrap(), 2);
    assert!(decoder.state().clut(0).is_none());
    assert!(decoder.state().region(3).is_some());
}

#[test]
fn test_reserved_coding_method_paints_nothing() {
    let object = segment(0x13, &[0x00, 0x01, 0x08, 0x11, 0x30, 0x00]);
    let stream = pes_frame(
        0,
        &[
            page_composition(&[(0, 0, 0)]),
            region_composition(0, true, &[(1, 0, 0)]),
            object,
        ],
    );
    let decoder = decode(&stream);
    assert_eq!(decoder.sink().updates(), 1);
    assert!(decoder.sink().pixels().iter().all(|&code| code == 15));
}

#[test]
fn test_truncated_final_frame() {
    init_logger();
    let mut stream = pes_frame(0, &[page_composition(&[(0, 0, 0)])]);
    let second = pes_frame(0, &[region_composition(0, true, &[])]);
    stream.extend_from_slice(&second[..second.len() - 4]);

    let mut decoder: Decoder = Decoder::default();
    assert_eq!(decoder.run(&mut PesReader::new(&stream[..]), || true).unwrap(), 1);

    let config = DecoderConfig::default().with_truncated_frame_is_eos(false);
    let mut decoder = Decoder::new(config, MemorySink::default(), NullTrace);
    let err = decoder
        .run(&mut PesReader::new(&stream[..]), || true)
        .unwrap_err();
    assert!(err.is_end_of_stream());
    assert!(matches!(err.details(), ErrorDetails::FrameTruncated { .. }));
}

#[test]
fn test_overrunning_segment_drops_rest_of_packet() {
    init_logger();
    // Page composition declaring 8 body bytes with 3 left in the payload
    let overrun = vec![0x0f, 0x10, 0x00, 0x01, 0x00, 0x08, 0x05, 0x04];
    let mut stream = pes_frame(0, &[page_composition(&[(0, 0, 0)]), overrun]);
    stream.extend(pes_frame(9000, &[region_composition(0, false, &[])]));

    let mut decoder = Decoder::new(
        DecoderConfig::default(),
        MemorySink::default(),
        XmlTrace::new(Vec::new()),
    );
    assert_eq!(decoder.run(&mut PesReader::new(&stream[..]), || true).unwrap(), 2);
    assert!(decoder.state().page().is_some());
    assert!(decoder.state().region(0).is_some());

    let (_, trace) = decoder.into_parts();
    let xml = String::from_utf8(trace.into_inner()).unwrap();
    assert_eq!(xml.matches("<pes_packet ").count(), 2);
    assert_eq!(xml.matches("</subtitle_stream>").count(), 2);
    assert_eq!(xml.matches("</pes_packet>").count(), 2);
}

#[test]
fn test_overrunning_segment_closes_trace() {
    init_logger();
    let mut decoder = Decoder::new(
        DecoderConfig::default(),
        MemorySink::default(),
        XmlTrace::new(Vec::new()),
    );
    let frame = pes_frame(0, &[vec![0x0f, 0x12, 0x00, 0x01, 0x00, 0x20]]);
    let packet = PesReader::new(&frame[..]).next_packet().unwrap().unwrap();
    let err = decoder.decode_packet(&packet).unwrap_err();
    assert!(matches!(err.details(), ErrorDetails::PacketOverrun(_)));

    let (_, trace) = decoder.into_parts();
    let xml = String::from_utf8(trace.into_inner()).unwrap();
    assert!(xml.ends_with("</subtitle_stream>\n</pes_packet>\n"));
}

#[test]
fn test_run_stops_between_packets() {
    init_logger();
    let mut stream = pes_frame(0, &[page_composition(&[(0, 0, 0)])]);
    stream.extend(pes_frame(0, &[region_composition(0, true, &[])]));

    let mut decoder = Decoder::new(DecoderConfig::default(), MemorySink::default(), NullTrace);
    let mut budget = 1;
    let packets = decoder
        .run(&mut PesReader::new(&stream[..]), || {
            budget -= 1;
            budget >= 0
        })
        .unwrap();
    assert_eq!(packets, 1);
    assert_eq!(decoder.sink().updates(), 0);
}

#[test]
fn test_xml_trace() {
    init_logger();
    let stream = pes_frame(
        180000,
        &[
            page_composition(&[(0, 4, 6)]),
            clut_definition(0, &[(1, [235, 128, 128, 0])]),
        ],
    );
    let mut decoder = Decoder::new(
        DecoderConfig::default(),
        MemorySink::default(),
        XmlTrace::new(Vec::new()),
    );
    decoder.run(&mut PesReader::new(&stream[..]), || true).unwrap();
    let (_, trace) = decoder.into_parts();
    assert_eq!(
        String::from_utf8(trace.into_inner()).unwrap(),
        r#"<?xml version="1.0" ?>
<pes_packet data_identifier="0x20" pts_secs="2.00">
<subtitle_stream id="0x00">
<page_composition_segment page_id="0x01">
<page_time_out>5</page_time_out>
<page_version_number>0</page_version_number>
<page_state>acquisition_point</page_state>
<page_regions>
<page_region id="00" x="4" y="6" />
</page_regions>
</page_composition_segment>
<CLUT_definition_segment page_id="0x01" CLUT_id="0x00">
<CLUT_version_number>0</CLUT_version_number>
<CLUT_entries>
<CLUT_entry id="0x01">
<CLUT_flag_2_bit>0</CLUT_flag_2_bit>
<CLUT_flag_4_bit>1</CLUT_flag_4_bit>
<CLUT_flag_8_bit>0</CLUT_flag_8_bit>
<full_range_flag>1</full_range_flag>
<Y_value>235</Y_value>
<Cr_value>128</Cr_value>
<Cb_value>128</Cb_value>
<T_value>0</T_value>
</CLUT_entry>
</CLUT_entries>
</CLUT_definition_segment>
</subtitle_stream>
</pes_packet>
"#
    );
}
