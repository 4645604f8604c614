//! The common contract every format parser implements, and the small
//! multi-subframe bookkeeping types the combined AC-3/E-AC-3 parser needs.

pub mod ac3;
pub mod dolby;
pub mod dts;
pub mod iec61937;
pub mod mpa;
pub mod multi;

use crate::chunk::{FrameInfo, SyncInfo};
use crate::errors::HeaderError;
use crate::speakers::Format;

/// Maximum number of E-AC-3 dependent+independent subframes a single
/// Dolby Digital Plus frame can multiplex, and the maximum number of
/// independent programs among them.
pub const MAX_SUBFRAMES: usize = 64;
pub const MAX_PROGRAMS: usize = 8;

/// One independent or dependent subframe inside a (possibly multiplexed)
/// E-AC-3 frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SubframeInfo {
    pub offset: usize,
    pub size: usize,
    pub is_independent: bool,
    /// Index into the frame's program table; the program this subframe
    /// contributes to.
    pub program: u8,
}

/// One independent program multiplexed into an E-AC-3 frame: the
/// independent substream id plus every dependent subframe that extends it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgramInfo {
    pub independent_substream_id: u8,
    pub subframe_count: u8,
}

/// Shared contract for every format-specific header parser.
///
/// Modeled as a single trait rather than a base-class hierarchy: each
/// format is a variant the multi-frame parser holds behind this trait
/// object, not a subtype relationship (no format "is a" more general
/// format).
pub trait FrameParser {
    /// Whether this parser's format is plausible for the given leading
    /// format tag (used by the multi-frame parser to skip parsers that
    /// cannot possibly apply, e.g. a caller that already knows the
    /// container declared PCM).
    fn can_parse(&self, format: Format) -> bool;

    /// The syncword(s) and frame-size bounds this parser scans for.
    fn sync_info(&self) -> SyncInfo;

    /// Minimum number of leading bytes `parse_header` needs to decide.
    fn header_size(&self) -> usize;

    /// Parses a candidate header without mutating parser state.
    fn parse_header(&self, data: &[u8]) -> Result<FrameInfo, HeaderError>;

    /// Whether two headers describe the same stream (same format,
    /// channel layout and sample rate — frame size may differ frame to
    /// frame for VBR-ish formats like MPA).
    fn compare_headers(&self, a: &[u8], b: &[u8]) -> bool;

    /// Parses the first frame of a new stream and latches its header as
    /// the stream's reference for subsequent `next_frame` calls.
    fn first_frame(&mut self, data: &[u8]) -> Result<FrameInfo, HeaderError>;

    /// Parses the next frame, validating it against the latched header.
    /// Returns `Err` (and leaves the parser unlocked) on any mismatch.
    fn next_frame(&mut self, data: &[u8]) -> Result<FrameInfo, HeaderError>;

    /// Drops any latched state; the next call must be `first_frame`.
    fn reset(&mut self);

    fn in_sync(&self) -> bool;

    fn frame_info(&self) -> Option<FrameInfo>;

    /// Diagnostic summary, e.g. with per-subframe/per-program detail for
    /// E-AC-3. Never used for control flow.
    fn stream_info(&self) -> String;
}
