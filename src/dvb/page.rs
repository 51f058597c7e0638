use super::{segment::SegmentObject, DecodeContext};
use crate::{read_bitfield, Result, SliceReader};
use log::{debug, warn};
use modular_bitfield_msb::prelude::*;
use smallvec::SmallVec;
use std::collections::HashMap;

/// How a page composition relates to the previous one.
#[derive(Debug, Copy, Clone, PartialEq, Eq, BitfieldSpecifier)]
#[bits = 2]
pub enum PageState {
    /// Page update; only changed regions are sent.
    NormalCase,
    /// Page refresh; the complete page is sent again.
    AcquisitionPoint,
    /// New page; all prior state may be discarded.
    ModeChange,
    Reserved,
}

impl PageState {
    pub fn name(&self) -> &'static str {
        match self {
            PageState::NormalCase => "normal_case",
            PageState::AcquisitionPoint => "acquisition_point",
            PageState::ModeChange => "mode_change",
            PageState::Reserved => "reserved",
        }
    }
}

#[bitfield]
#[derive(Debug)]
struct PageCompositionHeader {
    time_out: B8,
    version: B4,
    state: PageState,
    #[skip]
    unused: B2,
}

/// Placement of one region on the page.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct PageRegion {
    pub region_id: u8,
    pub x: u16,
    pub y: u16,
}

impl PageRegion {
    fn parse(reader: &mut SliceReader) -> Result<Self> {
        let region_id = reader.read_u8()?;
        reader.skip(1)?;
        let x = reader.read_be_u16()?;
        let y = reader.read_be_u16()?;
        Ok(Self { region_id, x, y })
    }
}

/// Page composition segment: page time-out, state and the regions shown on the page.
#[derive(Debug, Clone)]
pub struct PageComposition {
    pub page_id: u16,
    /// Seconds the page may stay on screen.
    pub time_out: u8,
    pub version: u8,
    pub state: PageState,
    pub regions: SmallVec<[PageRegion; 4]>,
}

impl PageComposition {
    pub fn parse(page_id: u16, reader: &mut SliceReader) -> Result<Self> {
        let header = read_bitfield!(reader, PageCompositionHeader);
        let mut regions = SmallVec::new();
        while reader.remaining_len() > 0 {
            regions.push(PageRegion::parse(reader)?);
        }
        Ok(Self {
            page_id,
            time_out: header.time_out(),
            version: header.version(),
            state: header.state(),
            regions,
        })
    }
}

/// The page currently being composed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    pub id: u16,
    pub time_out: u8,
    pub version: u8,
    pub state: PageState,
    regions: HashMap<u8, PageRegion>,
}

impl Page {
    fn new(composition: &PageComposition) -> Self {
        Self {
            id: composition.page_id,
            time_out: composition.time_out,
            version: composition.version,
            state: composition.state,
            regions: HashMap::new(),
        }
    }

    /// Latest placement announced for a region.
    pub fn region(&self, region_id: u8) -> Option<PageRegion> {
        self.regions.get(&region_id).copied()
    }

    pub fn regions(&self) -> impl Iterator<Item = &PageRegion> {
        self.regions.values()
    }
}

impl SegmentObject for PageComposition {
    fn apply(&self, ctx: &mut DecodeContext<'_>) -> Result<()> {
        let trace = &mut *ctx.trace;
        trace.begin(
            "page_composition_segment",
            &[("page_id", &format_args!("0x{:02x}", self.page_id))],
        )?;
        trace.field("page_time_out", &self.time_out)?;
        trace.field("page_version_number", &self.version)?;
        trace.field("page_state", &self.state.name())?;
        trace.begin("page_regions", &[])?;
        for region in &self.regions {
            trace.leaf(
                "page_region",
                &[
                    ("id", &format_args!("{:02x}", region.region_id)),
                    ("x", &region.x),
                    ("y", &region.y),
                ],
            )?;
        }
        trace.end("page_regions")?;
        trace.end("page_composition_segment")?;

        let same_page = matches!(&ctx.state.page, Some(page) if page.id == self.page_id);
        if !same_page {
            debug!("new page {} ({})", self.page_id, self.state.name());
            ctx.state.page = Some(Page::new(self));
        }
        if let Some(page) = ctx.state.page.as_mut() {
            page.time_out = self.time_out;
            page.version = self.version;
            page.state = self.state;
            for region in &self.regions {
                let replaced = page.regions.insert(region.region_id, *region).is_some();
                debug!(
                    "region {} {} at ({}, {})",
                    region.region_id,
                    if replaced { "moved" } else { "placed" },
                    region.x,
                    region.y
                );
            }
        }
        if self.regions.is_empty() && self.state != PageState::NormalCase {
            warn!("page {} refresh lists no regions", self.page_id);
        }
        Ok(())
    }
}

#[test]
fn test_parse_page_composition() {
    let data = [
        0x05, 0x94, 0x00, 0xff, 0x00, 0x10, 0x01, 0x20, 0x01, 0xff, 0x02, 0xd0, 0x00, 0x00,
    ];
    let mut reader = SliceReader::new(&data);
    let page = PageComposition::parse(1, &mut reader).unwrap();
    assert_eq!(page.time_out, 5);
    assert_eq!(page.version, 9);
    assert_eq!(page.state, PageState::AcquisitionPoint);
    assert_eq!(
        page.regions.as_slice(),
        &[
            PageRegion {
                region_id: 0,
                x: 16,
                y: 288
            },
            PageRegion {
                region_id: 1,
                x: 720,
                y: 0
            }
        ]
    );
}

#[test]
fn test_truncated_page_region() {
    let data = [0x05, 0x80, 0x00, 0x00, 0x00];
    let mut reader = SliceReader::new(&data);
    assert!(PageComposition::parse(1, &mut reader).is_err());
}
