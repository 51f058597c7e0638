/// Width of the composition buffer, in pixels.
pub const DEFAULT_WIDTH: usize = 720;
/// Height of the composition buffer; the size of the on-screen display window.
pub const DEFAULT_HEIGHT: usize = 226;
/// Pixel code written by a region fill; kept transparent in the sink palette.
pub const DEFAULT_FILL_CODE: u8 = 15;

/// Tunables for [`crate::Decoder`] and [`crate::PesReader`].
///
/// ```
/// use dvbsub_io::DecoderConfig;
///
/// let config = DecoderConfig::default().with_height(576).with_live_clut_id(None);
/// assert_eq!(config.height, 576);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct DecoderConfig {
    pub width: usize,
    pub height: usize,
    /// Vertical origin of the page; subtracted from every object placement.
    pub origin_y: i32,
    pub fill_code: u8,
    /// The only CLUT whose entries are forwarded to the presentation sink.
    pub live_clut_id: Option<u8>,
    /// Entries with an id below this limit are forwarded to the presentation sink.
    pub live_palette_entries: u8,
    /// Consecutive interrupted or would-block reads tolerated without progress.
    pub max_read_retries: u32,
    /// Have [`crate::Decoder::run`] stop cleanly on a truncated final frame.
    pub truncated_frame_is_eos: bool,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
            origin_y: 0,
            fill_code: DEFAULT_FILL_CODE,
            live_clut_id: Some(0),
            live_palette_entries: 15,
            max_read_retries: 16,
            truncated_frame_is_eos: true,
        }
    }
}

impl DecoderConfig {
    pub fn with_width(mut self, width: usize) -> Self {
        self.width = width;
        self
    }

    pub fn with_height(mut self, height: usize) -> Self {
        self.height = height;
        self
    }

    pub fn with_origin_y(mut self, origin_y: i32) -> Self {
        self.origin_y = origin_y;
        self
    }

    pub fn with_fill_code(mut self, fill_code: u8) -> Self {
        self.fill_code = fill_code;
        self
    }

    pub fn with_live_clut_id(mut self, live_clut_id: Option<u8>) -> Self {
        self.live_clut_id = live_clut_id;
        self
    }

    pub fn with_live_palette_entries(mut self, live_palette_entries: u8) -> Self {
        self.live_palette_entries = live_palette_entries;
        self
    }

    pub fn with_max_read_retries(mut self, max_read_retries: u32) -> Self {
        self.max_read_retries = max_read_retries;
        self
    }

    pub fn with_truncated_frame_is_eos(mut self, truncated_frame_is_eos: bool) -> Self {
        self.truncated_frame_is_eos = truncated_frame_is_eos;
        self
    }

    /// Whether a CLUT entry should be programmed into the sink palette.
    pub fn is_live_entry(&self, clut_id: u8, entry_id: u8) -> bool {
        self.live_clut_id == Some(clut_id) && entry_id < self.live_palette_entries
    }
}
