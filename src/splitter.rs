//! Byte-aligned frame splitter: scans a byte stream for a format's
//! syncword and confirms a lock by requiring three consecutive headers to
//! agree before trusting frame boundaries, rather than acting on the
//! first syncword match alone.
//!
//! Grounded on `truehd`'s `Extractor::resync` (a byte-by-byte
//! state-machine scan for a single fixed 4-byte pattern, with an
//! insufficient-data short-circuit and a draining ring buffer) —
//! generalized here to scan against an arbitrary [`SyncTrie`] so the
//! [`crate::parsers::multi::MultiFrameParser`] bundle can share one
//! scanner across formats instead of every format re-implementing its
//! own byte walk.

use std::collections::VecDeque;

use crate::chunk::FrameInfo;
use crate::errors::SplitterError;
use crate::parsers::FrameParser;

/// How many consecutive headers must agree before the splitter trusts
/// its lock and starts emitting frames without re-verifying every one.
const RESYNC_HEADER_COUNT: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Scanning,
    /// Candidate sync found; collecting consecutive agreeing headers.
    Confirming { agreeing: usize },
    Locked,
}

/// Drives a single [`FrameParser`] over an incoming byte stream, handing
/// back complete frames as soon as they can be trusted.
pub struct FrameSplitter<P: FrameParser> {
    parser: P,
    buf: VecDeque<u8>,
    state: State,
    /// Header bytes of the first candidate in the current `Confirming`
    /// run, kept so every later candidate can be checked for agreement
    /// with it via `compare_headers` (spec.md §4.2 step 4: three
    /// successive headers must *agree*, not merely each parse on their
    /// own).
    confirm_header: Option<Vec<u8>>,
}

impl<P: FrameParser> FrameSplitter<P> {
    pub fn new(parser: P) -> Self {
        FrameSplitter {
            parser,
            buf: VecDeque::new(),
            state: State::Scanning,
            confirm_header: None,
        }
    }

    pub fn is_locked(&self) -> bool {
        self.state == State::Locked
    }

    pub fn reset(&mut self) {
        self.parser.reset();
        self.state = State::Scanning;
        self.confirm_header = None;
    }

    /// Appends newly received bytes to the internal buffer.
    pub fn push(&mut self, data: &[u8]) {
        self.buf.extend(data);
    }

    fn contiguous(&self) -> Vec<u8> {
        self.buf.iter().copied().collect()
    }

    /// Attempts to pull one complete, trusted frame out of the buffer.
    ///
    /// Returns `Ok(None)` when there isn't enough data yet (not an
    /// error: the caller should push more bytes and try again). On
    /// success, returns both the parsed header and the exact frame bytes
    /// consumed from the front of the buffer (needed downstream to wrap
    /// or forward the frame).
    pub fn next_frame(&mut self) -> Result<Option<(FrameInfo, Vec<u8>)>, SplitterError> {
        let sync_info = self.parser.sync_info();
        let header_size = self.parser.header_size();

        loop {
            let data = self.contiguous();
            if data.len() < header_size {
                return Ok(None);
            }

            match self.state {
                State::Scanning | State::Confirming { .. } => {
                    // find the next byte offset whose leading bytes match
                    // the sync trie (probe 32 bits at a time, truncated at
                    // the edge of the available data).
                    let max_probe = sync_info.max_frame_size.max(header_size);
                    let mut found = None;
                    for offset in 0..data.len().saturating_sub(header_size - 1).min(max_probe) {
                        let window = &data[offset..];
                        let probe = probe_word(window);
                        if sync_info.sync_trie.matches(probe) {
                            found = Some(offset);
                            break;
                        }
                    }
                    let Some(offset) = found else {
                        // drop everything except enough trailing bytes to
                        // catch a syncword straddling the next push
                        let keep = header_size.saturating_sub(1);
                        let drop = data.len().saturating_sub(keep);
                        for _ in 0..drop {
                            self.buf.pop_front();
                        }
                        return Ok(None);
                    };
                    if offset > 0 {
                        for _ in 0..offset {
                            self.buf.pop_front();
                        }
                        self.state = State::Scanning;
                        self.confirm_header = None;
                        continue;
                    }

                    if data.len() < header_size {
                        return Ok(None);
                    }
                    let header_bytes = data[offset..offset + header_size].to_vec();
                    if let State::Confirming { .. } = self.state {
                        if let Some(first) = &self.confirm_header {
                            if !self.parser.compare_headers(first, &header_bytes) {
                                // disagrees with the run's first header:
                                // this isn't a stable lock, drop one byte
                                // and restart confirmation from scratch.
                                self.buf.pop_front();
                                self.state = State::Scanning;
                                self.confirm_header = None;
                                continue;
                            }
                        }
                    }

                    match self.parser.first_frame(&data[offset..]) {
                        Ok(info) => {
                            if info.frame_size < sync_info.min_frame_size {
                                return Err(SplitterError::TooShort {
                                    min: sync_info.min_frame_size,
                                    actual: info.frame_size,
                                });
                            }
                            if self.confirm_header.is_none() {
                                self.confirm_header = Some(header_bytes);
                            }
                            let agreeing = match self.state {
                                State::Confirming { agreeing } => agreeing + 1,
                                _ => 1,
                            };
                            if agreeing >= RESYNC_HEADER_COUNT {
                                self.state = State::Locked;
                                self.confirm_header = None;
                            } else {
                                self.state = State::Confirming { agreeing };
                            }
                            if data.len() < info.frame_size {
                                return Ok(None);
                            }
                            let frame_bytes = data[offset..offset + info.frame_size].to_vec();
                            for _ in 0..info.frame_size {
                                self.buf.pop_front();
                            }
                            if self.state == State::Locked {
                                return Ok(Some((info, frame_bytes)));
                            }
                            // still confirming: keep scanning for the next
                            // header right after this candidate frame.
                            continue;
                        }
                        Err(_) => {
                            // candidate syncword didn't decode; drop one
                            // byte and keep scanning past it.
                            self.buf.pop_front();
                            self.state = State::Scanning;
                            self.confirm_header = None;
                            continue;
                        }
                    }
                }
                State::Locked => {
                    match self.parser.next_frame(&data) {
                        Ok(info) => {
                            if data.len() < info.frame_size {
                                return Ok(None);
                            }
                            let frame_bytes = data[..info.frame_size].to_vec();
                            for _ in 0..info.frame_size {
                                self.buf.pop_front();
                            }
                            return Ok(Some((info, frame_bytes)));
                        }
                        Err(_) => {
                            self.parser.reset();
                            self.state = State::Scanning;
                            continue;
                        }
                    }
                }
            }
        }
    }
}

fn probe_word(window: &[u8]) -> u32 {
    let mut w = [0u8; 4];
    let n = window.len().min(4);
    w[..n].copy_from_slice(&window[..n]);
    u32::from_be_bytes(w)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsers::ac3::Ac3Parser;

    fn build_ac3_frame(frmsizecod: u32) -> Vec<u8> {
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
        push!(0u32, 2);
        push!(frmsizecod, 6);
        push!(8u32, 5);
        push!(0u32, 3);
        push!(2u32, 3);
        push!(0u32, 2);
        push!(0u32, 1);
        let pad = (8 - (nbits % 8)) % 8;
        push!(0u32, pad);
        let total_bytes = (nbits / 8) as usize;
        let mut out = vec![0u8; total_bytes.max(7)];
        for i in 0..total_bytes {
            let shift = (total_bytes - 1 - i) * 8;
            out[i] = ((bits >> shift) & 0xff) as u8;
        }
        // pad out to the real frame size with zero bytes
        out
    }

    #[test]
    fn locks_after_three_agreeing_headers() {
        let mut splitter = FrameSplitter::new(Ac3Parser::new());
        let header = build_ac3_frame(10);
        let frame_size = 160 * 2; // AC3_FRAME_SIZE_TBL[0][10] * 2 (frmsizecod=10, 48kHz)
        let mut frame = header.clone();
        frame.resize(frame_size, 0);

        let mut stream = Vec::new();
        for _ in 0..4 {
            stream.extend_from_slice(&frame);
        }
        splitter.push(&stream);

        let mut frames = Vec::new();
        while let Some((info, bytes)) = splitter.next_frame().unwrap() {
            assert_eq!(bytes.len(), info.frame_size);
            frames.push(info);
        }
        assert!(splitter.is_locked());
        assert!(!frames.is_empty());
    }

    #[test]
    fn insufficient_data_returns_none_not_error() {
        let mut splitter = FrameSplitter::new(Ac3Parser::new());
        splitter.push(&[0x0b, 0x77]);
        assert_eq!(splitter.next_frame().unwrap(), None);
    }
}
