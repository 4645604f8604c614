//! Probes several format parsers concurrently and latches onto whichever
//! one first achieves a stable, three-header-agreeing sync.
//!
//! Grounded on `examples/original_source/valib/parsers/multi_frame.h` and
//! `.../spdif/spdifable_header.h`'s `SpdifableFrameParser`, which bundles
//! the Dolby, DTS and MPA candidates behind one dispatch and resolves
//! ties by list order — the earlier parser in the list wins when more
//! than one recognizes the same bytes.

use crate::chunk::{FrameInfo, SyncInfo};
use crate::errors::HeaderError;
use crate::parsers::FrameParser;
use crate::speakers::Format;
use crate::sync_trie::SyncTrie;

/// Dispatches to the first parser (in list order) that both recognizes
/// the candidate header and stays locked across calls.
pub struct MultiFrameParser {
    parsers: Vec<Box<dyn FrameParser + Send>>,
    locked: Option<usize>,
}

impl MultiFrameParser {
    pub fn new(parsers: Vec<Box<dyn FrameParser + Send>>) -> Self {
        MultiFrameParser {
            parsers,
            locked: None,
        }
    }

    /// The usual bundle: AC-3/E-AC-3, DTS, then MPEG audio, matching
    /// `SpdifableFrameParser`'s construction order.
    pub fn spdifable() -> Self {
        MultiFrameParser::new(vec![
            Box::new(crate::parsers::dolby::DolbyParser::new()),
            Box::new(crate::parsers::dts::DtsParser::new()),
            Box::new(crate::parsers::mpa::MpaParser::new()),
        ])
    }

    pub fn is_locked(&self) -> bool {
        self.locked.is_some()
    }

    pub fn locked_format(&self) -> Option<Format> {
        self.locked
            .and_then(|i| self.parsers[i].frame_info())
            .map(|info| info.spk.format)
    }

    /// Tries every unlocked candidate against `data`, in list order, and
    /// latches the first one whose `first_frame` succeeds.
    pub fn first_frame(&mut self, data: &[u8]) -> Result<FrameInfo, HeaderError> {
        for (i, p) in self.parsers.iter_mut().enumerate() {
            if !p.can_parse(Format::Unknown) {
                continue;
            }
            if let Ok(info) = p.first_frame(data) {
                self.locked = Some(i);
                return Ok(info);
            }
        }
        Err(HeaderError::NoSync)
    }

    /// Continues with the locked parser; if it fails, falls back to
    /// re-probing every candidate from scratch (mirrors the original's
    /// behavior of dropping the lock and resyncing on any disagreement).
    pub fn next_frame(&mut self, data: &[u8]) -> Result<FrameInfo, HeaderError> {
        if let Some(i) = self.locked {
            match self.parsers[i].next_frame(data) {
                Ok(info) => return Ok(info),
                Err(_) => {
                    self.locked = None;
                }
            }
        }
        self.first_frame(data)
    }

    pub fn reset(&mut self) {
        for p in &mut self.parsers {
            p.reset();
        }
        self.locked = None;
    }
}

/// So a [`crate::splitter::FrameSplitter`] can drive the whole bundle as
/// if it were a single format: the union of every candidate's syncwords
/// and frame-size envelope, dispatching to whichever parser locks first.
impl FrameParser for MultiFrameParser {
    fn can_parse(&self, format: Format) -> bool {
        self.parsers.iter().any(|p| p.can_parse(format))
    }

    fn sync_info(&self) -> SyncInfo {
        let mut trie = SyncTrie::empty();
        let mut min = usize::MAX;
        let mut max = 0usize;
        for p in &self.parsers {
            let si = p.sync_info();
            trie = trie.union(si.sync_trie);
            min = min.min(si.min_frame_size);
            max = max.max(si.max_frame_size);
        }
        if min == usize::MAX {
            min = 0;
        }
        SyncInfo::new(trie, min, max)
    }

    fn header_size(&self) -> usize {
        self.parsers.iter().map(|p| p.header_size()).max().unwrap_or(0)
    }

    fn parse_header(&self, data: &[u8]) -> Result<FrameInfo, HeaderError> {
        for p in &self.parsers {
            if let Ok(info) = p.parse_header(data) {
                return Ok(info);
            }
        }
        Err(HeaderError::NoSync)
    }

    fn compare_headers(&self, a: &[u8], b: &[u8]) -> bool {
        match self.locked {
            Some(i) => self.parsers[i].compare_headers(a, b),
            None => self.parsers.iter().any(|p| p.compare_headers(a, b)),
        }
    }

    fn first_frame(&mut self, data: &[u8]) -> Result<FrameInfo, HeaderError> {
        MultiFrameParser::first_frame(self, data)
    }

    fn next_frame(&mut self, data: &[u8]) -> Result<FrameInfo, HeaderError> {
        MultiFrameParser::next_frame(self, data)
    }

    fn reset(&mut self) {
        MultiFrameParser::reset(self)
    }

    fn in_sync(&self) -> bool {
        self.is_locked()
    }

    fn frame_info(&self) -> Option<FrameInfo> {
        self.locked.and_then(|i| self.parsers[i].frame_info())
    }

    fn stream_info(&self) -> String {
        match self.locked {
            Some(i) => self.parsers[i].stream_info(),
            None => "multi-parser: not synced".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_ac3_frame() -> Vec<u8> {
        // Minimal legal AC-3 subframe header: 48kHz, frmsizecod=10,
        // acmod=2 (stereo), bsid=8, no LFE.
        let mut bits: u64 = 0;
        let mut nbits = 0u32;
        macro_rules! push {
            ($val:expr, $width:expr) => {{
                bits = (bits << $width) | ($val as u64);
                nbits += $width;
            }};
        }
        push!(0x0b77u32, 16);
        push!(0u32, 16);
        push!(0u32, 2); // fscod
        push!(10u32, 6); // frmsizecod
        push!(8u32, 5); // bsid
        push!(0u32, 3); // bsmod
        push!(2u32, 3); // acmod
        push!(0u32, 2); // cmixlev (acmod=2 -> skip table value 2)
        push!(0u32, 1); // lfeon
        let pad = (8 - (nbits % 8)) % 8;
        push!(0u32, pad);
        let total_bytes = (nbits / 8) as usize;
        let mut out = vec![0u8; total_bytes.max(10)];
        for i in 0..total_bytes {
            let shift = (total_bytes - 1 - i) * 8;
            out[i] = ((bits >> shift) & 0xff) as u8;
        }
        out
    }

    #[test]
    fn locks_onto_ac3_first() {
        let mut m = MultiFrameParser::spdifable();
        let data = build_ac3_frame();
        let info = m.first_frame(&data).unwrap();
        assert_eq!(info.spk.format, Format::Ac3);
        assert!(m.is_locked());
        assert_eq!(m.locked_format(), Some(Format::Ac3));
    }

    #[test]
    fn unrecognized_bytes_stay_unlocked() {
        let mut m = MultiFrameParser::spdifable();
        let data = vec![0u8; 64];
        assert!(m.first_frame(&data).is_err());
        assert!(!m.is_locked());
    }
}
