//! The top-level pipeline: raw compressed bytes in, IEC 61937 burst (or
//! passthrough) bytes out.
//!
//! Wires together the three subsystems spec.md §2 names as the data flow
//! (`raw bytes → frame splitter → synchronized frame → S/PDIF wrapper →
//! burst bytes`): a [`FrameSplitter`] driving [`MultiFrameParser`]'s
//! spdifable bundle, feeding [`SpdifWrapper`]. Grounded on
//! `examples/original_source/valib/parsers/spdif/spdifable_header.h`'s
//! `SpdifableFrameParser` (the splitter+multi-parser composition) wired
//! to a `SpdifWrapper`, with the push-then-pull shape following
//! `truehd`'s `Extractor::push_bytes` + repeated-pull style rather than
//! its iterator (this pipeline has two distinct failure modes — "not
//! enough data yet" and "format not spdifable" — that read more clearly
//! as a `Result<Option<Chunk>, _>` than as an `Iterator` item).

use std::sync::Arc;

use crate::chunk::{Chunk, FrameInfo};
use crate::errors::{SplitterError, WrapError};
use crate::parsers::multi::MultiFrameParser;
use crate::speakers::Speakers;
use crate::splitter::FrameSplitter;
use crate::wrapper::{DtsConv, DtsMode, SpdifWrapper, SpdifWrapperConfig};

/// Errors `process`/`flush` can surface to the caller.
///
/// Both variants are open-time-shaped: a format-level sync failure
/// ([`SplitterError`]) only escalates here when the splitter's own
/// `fail_level` is configured to do so (see [`crate::log_or_err`]);
/// day to day the splitter recovers internally and this type is never
/// seen by the `Ok(None)` keep-feeding-me path.
#[derive(thiserror::Error, Debug)]
pub enum SpdiferError {
    #[error(transparent)]
    Splitter(#[from] SplitterError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Cold,
    /// Wrapping normally; may still fall back to passthrough per-frame.
    Active,
    /// Encapsulation failed for the current stream; forwarding raw
    /// frames unchanged until the input format changes or `reset`.
    Passthrough,
}

/// Drives a [`FrameSplitter<MultiFrameParser>`] and a [`SpdifWrapper`]
/// together as one instance, implementing the lifecycle and
/// configuration surface from spec.md §6.
pub struct Spdifer {
    splitter: FrameSplitter<MultiFrameParser>,
    wrapper: SpdifWrapper,
    mode: Mode,
    new_stream: bool,
    last_frame_info: Option<FrameInfo>,
    last_out_spk: Option<Speakers>,
}

impl Spdifer {
    pub fn new(config: SpdifWrapperConfig) -> Self {
        Spdifer {
            splitter: FrameSplitter::new(MultiFrameParser::spdifable()),
            wrapper: SpdifWrapper::new(config),
            mode: Mode::Cold,
            new_stream: false,
            last_frame_info: None,
            last_out_spk: None,
        }
    }

    /// Moves from *cold* to *open-but-not-in-sync*; allocates nothing
    /// beyond what `new` already allocated (the wrapper's output buffer
    /// is sized once, at construction, per spec.md §5's allocation
    /// discipline).
    pub fn open(&mut self) {
        self.splitter.reset();
        self.mode = Mode::Active;
        self.new_stream = false;
        self.last_frame_info = None;
        self.last_out_spk = None;
    }

    pub fn close(&mut self) {
        self.splitter.reset();
        self.mode = Mode::Cold;
        self.new_stream = false;
        self.last_frame_info = None;
        self.last_out_spk = None;
    }

    /// Drops sync and the passthrough degradation, keeps buffers.
    pub fn reset(&mut self) {
        self.splitter.reset();
        if self.mode != Mode::Cold {
            self.mode = Mode::Active;
        }
        self.new_stream = false;
        self.last_frame_info = None;
        self.last_out_spk = None;
    }

    /// True iff the last chunk `process`/`flush` returned represents a
    /// format transition (first frame after `open`/`reset`, a change in
    /// the latched input `FrameInfo`, or a change in the chosen output
    /// format — including the wrapped→passthrough fallback).
    pub fn new_stream(&self) -> bool {
        self.new_stream
    }

    /// Pure function: what this instance would emit for `input_spk`,
    /// without touching any state.
    pub fn spdif_spk(&self, input_spk: Speakers) -> Option<Speakers> {
        self.wrapper.spdif_spk(input_spk)
    }

    pub fn set_passthrough_mask(&mut self, mask: u32) {
        self.wrapper.set_passthrough_mask(mask);
    }

    pub fn set_spdif_as_pcm(&mut self, enabled: bool) {
        self.wrapper.set_spdif_as_pcm(enabled);
    }

    pub fn set_check_rate(&mut self, enabled: bool) {
        self.wrapper.set_check_rate(enabled);
    }

    pub fn set_rate_mask(&mut self, mask: u32) {
        self.wrapper.set_rate_mask(mask);
    }

    pub fn set_dts_mode(&mut self, mode: DtsMode) {
        self.wrapper.set_dts_mode(mode);
    }

    pub fn set_dts_conv(&mut self, conv: DtsConv) {
        self.wrapper.set_dts_conv(conv);
    }

    /// Feeds `in_chunk`'s bytes into the splitter, then attempts to
    /// produce one output chunk.
    ///
    /// Returns `Ok(None)` when no frame is ready yet: per spec.md §2,
    /// the caller keeps calling `process` (pushing further input, or an
    /// empty/dummy chunk to drain frames already buffered) until it
    /// does. A dummy input chunk (`Chunk::is_dummy`) contributes no
    /// bytes and only drains.
    pub fn process(&mut self, in_chunk: &Chunk) -> Result<Option<Chunk>, SpdiferError> {
        if self.mode == Mode::Cold {
            self.open();
        }
        if !in_chunk.data.is_empty() {
            self.splitter.push(&in_chunk.data);
        }
        self.pump(in_chunk.time)
    }

    /// Drains any residual frame the splitter already has enough bytes
    /// for, without accepting new input.
    pub fn flush(&mut self) -> Result<Option<Chunk>, SpdiferError> {
        self.pump(None)
    }

    fn pump(&mut self, time: Option<f64>) -> Result<Option<Chunk>, SpdiferError> {
        let Some((info, frame_bytes)) = self.splitter.next_frame()? else {
            return Ok(None);
        };

        let info_changed = self.last_frame_info != Some(info);
        self.last_frame_info = Some(info);

        if self.mode == Mode::Passthrough && !info_changed {
            self.new_stream = false;
            return Ok(Some(self.emit_raw(info, frame_bytes, time)));
        }

        match self.try_wrap(&info, &frame_bytes) {
            Ok(out_bytes) => {
                let out_spk = self.wrapper.out_spk();
                self.mode = Mode::Active;
                self.new_stream = info_changed || self.last_out_spk != Some(out_spk);
                self.last_out_spk = Some(out_spk);
                let chunk = with_optional_time(Chunk::new(out_spk, Arc::from(out_bytes)).with_sync(true), time);
                Ok(Some(chunk))
            }
            Err(_) => {
                // EncapsulationFailed: degrade to passthrough for the
                // remainder of this stream (spec.md §4.5, §7).
                self.mode = Mode::Passthrough;
                self.new_stream = true;
                self.last_out_spk = Some(info.spk);
                Ok(Some(self.emit_raw(info, frame_bytes, time)))
            }
        }
    }

    fn try_wrap(&mut self, info: &FrameInfo, frame_bytes: &[u8]) -> Result<Vec<u8>, WrapError> {
        if self.wrapper.in_spk() != Some(info.spk) {
            self.wrapper.open(info.spk)?;
        }
        let burst_type = info.spdif_burst_type.ok_or(WrapError::NotSpdifable)?;
        let out = self
            .wrapper
            .wrap(frame_bytes, burst_type, info.nsamples, info.bitstream_encoding)?;
        Ok(out.to_vec())
    }

    fn emit_raw(&self, info: FrameInfo, frame_bytes: Vec<u8>, time: Option<f64>) -> Chunk {
        with_optional_time(Chunk::new(info.spk, Arc::from(frame_bytes)).with_sync(true), time)
    }
}

fn with_optional_time(chunk: Chunk, time: Option<f64>) -> Chunk {
    match time {
        Some(t) => chunk.with_time(t),
        None => chunk,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::speakers::{ChannelMask, Format};
    use crate::wrapper::passthrough;

    fn build_ac3_frame(frmsizecod: u32, acmod: u32) -> Vec<u8> {
        let mut bits: u64 = 0;
        let mut nbits = 0u32;
        macro_rules! push {
            ($val:expr, $width:expr) => {{
                bits = (bits << $width) | ($val as u64);
                nbits += $width;
            }};
        }
        push!(0x0b77u32, 16); // syncword
        push!(0u32, 16); // crc1
        push!(0u32, 2); // fscod = 48kHz
        push!(frmsizecod, 6);
        push!(8u32, 5); // bsid
        push!(0u32, 3); // bsmod
        push!(acmod, 3);
        push!(0u32, 2); // cmixlev (acmod=2 skip table = 2 bits)
        push!(0u32, 1); // lfeon
        let pad = (8 - (nbits % 8)) % 8;
        push!(0u32, pad);
        let total_bytes = (nbits / 8) as usize;
        let frame_size = 160 * 2; // AC3_FRAME_SIZE_TBL[0][10] * 2 (frmsizecod=10, 48kHz)
        let mut out = vec![0u8; frame_size];
        for i in 0..total_bytes {
            let shift = (total_bytes - 1 - i) * 8;
            out[i] = ((bits >> shift) & 0xff) as u8;
        }
        out
    }

    #[test]
    fn ac3_stream_produces_wrapped_bursts() {
        let mut s = Spdifer::new(SpdifWrapperConfig::default());
        let frame = build_ac3_frame(10, 2);

        let mut stream = Vec::new();
        for _ in 0..6 {
            stream.extend_from_slice(&frame);
        }
        let in_chunk = Chunk::new(Speakers::unknown(), Arc::from(stream.as_slice()));

        let mut outputs = Vec::new();
        let first = s.process(&in_chunk).unwrap();
        outputs.extend(first);
        loop {
            match s.flush().unwrap() {
                Some(c) => outputs.push(c),
                None => break,
            }
        }

        assert!(!outputs.is_empty());
        for chunk in &outputs {
            assert_eq!(chunk.spk.format, Format::Spdif);
            assert_eq!(chunk.data.len(), 1536 * 4);
            assert_eq!(&chunk.data[0..2], &crate::parsers::iec61937::PA.to_le_bytes());
        }
    }

    #[test]
    fn new_stream_flag_fires_once_per_format() {
        let mut s = Spdifer::new(SpdifWrapperConfig::default());
        let frame = build_ac3_frame(10, 2);
        let mut stream = Vec::new();
        for _ in 0..5 {
            stream.extend_from_slice(&frame);
        }
        let in_chunk = Chunk::new(Speakers::unknown(), Arc::from(stream.as_slice()));
        s.process(&in_chunk).unwrap();

        let mut flags = Vec::new();
        loop {
            let out = s.flush().unwrap();
            if out.is_none() {
                break;
            }
            flags.push(s.new_stream());
        }
        assert_eq!(flags.iter().filter(|&&f| f).count(), 1);
    }

    #[test]
    fn disabled_format_falls_back_to_passthrough() {
        let config = SpdifWrapperConfig::default().with_passthrough_mask(passthrough::DTS | passthrough::MPA);
        let mut s = Spdifer::new(config);
        let frame = build_ac3_frame(10, 2);
        let mut stream = Vec::new();
        for _ in 0..4 {
            stream.extend_from_slice(&frame);
        }
        let in_chunk = Chunk::new(Speakers::unknown(), Arc::from(stream.as_slice()));
        let out = s
            .process(&in_chunk)
            .unwrap()
            .or_else(|| s.flush().unwrap())
            .expect("three agreeing AC-3 headers should lock and emit a frame");
        assert_eq!(out.spk.format, Format::Ac3);
        assert!(s.new_stream());
    }

    #[test]
    fn spdif_spk_is_pure() {
        let s = Spdifer::new(SpdifWrapperConfig::default());
        let spk = Speakers::new(Format::Ac3, ChannelMask::MODE_3_2, 48000);
        let out = s.spdif_spk(spk).unwrap();
        assert_eq!(out.format, Format::Spdif);
        assert_eq!(out.sample_rate, 48000);
    }

    #[test]
    fn eac3_over_hdmi_rate_visible_through_spdif_spk() {
        let config = SpdifWrapperConfig::default().with_passthrough_mask(passthrough::HDMI_EAC3);
        let s = Spdifer::new(config);
        let spk = Speakers::new(Format::Eac3, ChannelMask::MODE_3_2, 48000);
        let out = s.spdif_spk(spk).unwrap();
        assert_eq!(out.sample_rate, 192000);
    }
}
