//! MPEG-1/2 Audio (Layers I, II, III) header parser.
//!
//! Frame sizes in this family are derived from a bitrate/sample-rate
//! ratio rather than looked up whole, unlike AC-3/DTS; the bitrate and
//! sample-rate tables below are the standard ISO/IEC 11172-3 tables,
//! grouped the way `examples/original_source/valib/parsers` groups
//! per-format constant tables local to their own file.

use crate::bitstream::BitReader;
use crate::chunk::{FrameInfo, SyncInfo};
use crate::errors::HeaderError;
use crate::parsers::FrameParser;
use crate::speakers::{ChannelMask, Format, Speakers};
use crate::sync_trie::SyncTrie;

pub const HEADER_SIZE: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MpegVersion {
    V1,
    V2,
    V25,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Layer {
    I,
    Ii,
    Iii,
}

const MPEG1_SRATE: [u32; 3] = [44100, 48000, 32000];
const MPEG2_SRATE: [u32; 3] = [22050, 24000, 16000];
const MPEG25_SRATE: [u32; 3] = [11025, 12000, 8000];

const BITRATE_V1_L1: [u32; 16] = [
    0, 32, 64, 96, 128, 160, 192, 224, 256, 288, 320, 352, 384, 416, 448, 0,
];
const BITRATE_V1_L2: [u32; 16] = [
    0, 32, 48, 56, 64, 80, 96, 112, 128, 160, 192, 224, 256, 320, 384, 0,
];
const BITRATE_V1_L3: [u32; 16] = [
    0, 32, 40, 48, 56, 64, 80, 96, 112, 128, 160, 192, 224, 256, 320, 0,
];
const BITRATE_V2_L1: [u32; 16] = [
    0, 32, 48, 56, 64, 80, 96, 112, 128, 144, 160, 176, 192, 224, 256, 0,
];
const BITRATE_V2_L23: [u32; 16] = [
    0, 8, 16, 24, 32, 40, 48, 56, 64, 80, 96, 112, 128, 144, 160, 0,
];

fn bitrate_kbps(version: MpegVersion, layer: Layer, index: u32) -> u32 {
    let idx = index as usize;
    if idx == 0 || idx >= 15 {
        return 0;
    }
    match (version, layer) {
        (MpegVersion::V1, Layer::I) => BITRATE_V1_L1[idx],
        (MpegVersion::V1, Layer::Ii) => BITRATE_V1_L2[idx],
        (MpegVersion::V1, Layer::Iii) => BITRATE_V1_L3[idx],
        (_, Layer::I) => BITRATE_V2_L1[idx],
        (_, _) => BITRATE_V2_L23[idx],
    }
}

fn sample_rate(version: MpegVersion, index: u32) -> u32 {
    let idx = index as usize;
    if idx >= 3 {
        return 0;
    }
    match version {
        MpegVersion::V1 => MPEG1_SRATE[idx],
        MpegVersion::V2 => MPEG2_SRATE[idx],
        MpegVersion::V25 => MPEG25_SRATE[idx],
    }
}

fn frame_size(version: MpegVersion, layer: Layer, bitrate_kbps: u32, sample_rate: u32, padding: u32) -> usize {
    let bitrate = bitrate_kbps as u64 * 1000;
    let sr = sample_rate as u64;
    if sr == 0 {
        return 0;
    }
    let size = match layer {
        Layer::I => (12 * bitrate / sr + padding as u64) * 4,
        Layer::Ii => 144 * bitrate / sr + padding as u64,
        Layer::Iii => {
            if version == MpegVersion::V1 {
                144 * bitrate / sr + padding as u64
            } else {
                72 * bitrate / sr + padding as u64
            }
        }
    };
    size as usize
}

fn nsamples_per_frame(version: MpegVersion, layer: Layer) -> usize {
    match layer {
        Layer::I => 384,
        Layer::Ii => 1152,
        Layer::Iii => {
            if version == MpegVersion::V1 {
                1152
            } else {
                576
            }
        }
    }
}

fn spdif_burst_type(version: MpegVersion, layer: Layer) -> u16 {
    match (version, layer) {
        (MpegVersion::V1, Layer::I) => 4,
        (MpegVersion::V1, Layer::Ii | Layer::Iii) => 5,
        (_, Layer::I) => 8,
        (_, Layer::Ii) => 9,
        (_, Layer::Iii) => 10,
    }
}

fn parse(data: &[u8]) -> Result<FrameInfo, HeaderError> {
    if data.len() < HEADER_SIZE {
        return Err(HeaderError::NoSync);
    }
    let mut r = BitReader::new(data);
    let sync = r.get_n(11).map_err(|_| HeaderError::NoSync)?;
    if sync != 0x7ff {
        return Err(HeaderError::NoSync);
    }
    let version_bits = r.get_n(2).map_err(|_| HeaderError::NoSync)?;
    let layer_bits = r.get_n(2).map_err(|_| HeaderError::NoSync)?;
    let _protection = r.get_bool().map_err(|_| HeaderError::NoSync)?;
    let bitrate_index = r.get_n(4).map_err(|_| HeaderError::NoSync)?;
    let srate_index = r.get_n(2).map_err(|_| HeaderError::NoSync)?;
    let padding = r.get_n(1).map_err(|_| HeaderError::NoSync)?;
    let _private = r.get_bool().map_err(|_| HeaderError::NoSync)?;
    let channel_mode = r.get_n(2).map_err(|_| HeaderError::NoSync)?;

    let version = match version_bits {
        0b00 => MpegVersion::V25,
        0b10 => MpegVersion::V2,
        0b11 => MpegVersion::V1,
        _ => {
            return Err(HeaderError::InvalidField {
                field: "version",
                value: version_bits,
            })
        }
    };
    let layer = match layer_bits {
        0b11 => Layer::I,
        0b10 => Layer::Ii,
        0b01 => Layer::Iii,
        _ => {
            return Err(HeaderError::InvalidField {
                field: "layer",
                value: layer_bits,
            })
        }
    };

    let sr = sample_rate(version, srate_index);
    if sr == 0 {
        return Err(HeaderError::InvalidField {
            field: "sampling_frequency",
            value: srate_index,
        });
    }
    let br = bitrate_kbps(version, layer, bitrate_index);
    if br == 0 {
        return Err(HeaderError::InvalidField {
            field: "bitrate_index",
            value: bitrate_index,
        });
    }

    let size = frame_size(version, layer, br, sr, padding);
    if size < HEADER_SIZE {
        return Err(HeaderError::FrameSizeOutOfRange {
            size,
            min: HEADER_SIZE,
            max: 4096,
        });
    }

    let mask = if channel_mode == 0b11 {
        ChannelMask::MONO
    } else {
        ChannelMask::STEREO
    };

    let spk = Speakers::new(Format::Mpa, mask, sr);
    let mut info = FrameInfo::new(spk, size, nsamples_per_frame(version, layer));
    info.spdif_burst_type = Some(spdif_burst_type(version, layer));
    Ok(info)
}

/// Recognizes MPEG-1/2 Audio Layer I/II/III frames.
#[derive(Debug, Default)]
pub struct MpaParser {
    latched: Option<FrameInfo>,
}

impl MpaParser {
    pub fn new() -> Self {
        MpaParser::default()
    }
}

impl FrameParser for MpaParser {
    fn can_parse(&self, format: Format) -> bool {
        matches!(format, Format::Mpa | Format::Unknown)
    }

    fn sync_info(&self) -> SyncInfo {
        // 11-bit syncword, all-ones; stored here as the top bits of a
        // 16-bit probe so the splitter can scan with a uniform word width.
        SyncInfo::new(SyncTrie::singleton(0x7ff << 5, 16), HEADER_SIZE, 2880)
    }

    fn header_size(&self) -> usize {
        HEADER_SIZE
    }

    fn parse_header(&self, data: &[u8]) -> Result<FrameInfo, HeaderError> {
        parse(data)
    }

    fn compare_headers(&self, a: &[u8], b: &[u8]) -> bool {
        match (parse(a), parse(b)) {
            (Ok(ia), Ok(ib)) => ia.spk.format == ib.spk.format && ia.spk.sample_rate == ib.spk.sample_rate,
            _ => false,
        }
    }

    fn first_frame(&mut self, data: &[u8]) -> Result<FrameInfo, HeaderError> {
        let info = parse(data)?;
        self.latched = Some(info);
        Ok(info)
    }

    fn next_frame(&mut self, data: &[u8]) -> Result<FrameInfo, HeaderError> {
        let info = parse(data)?;
        match &self.latched {
            Some(prev) if prev.spk.format == info.spk.format && prev.spk.sample_rate == info.spk.sample_rate => {
                self.latched = Some(info);
                Ok(info)
            }
            Some(_) => {
                self.latched = None;
                Err(HeaderError::InvalidField { field: "sampling_frequency", value: 0 })
            }
            None => {
                self.latched = Some(info);
                Ok(info)
            }
        }
    }

    fn reset(&mut self) {
        self.latched = None;
    }

    fn in_sync(&self) -> bool {
        self.latched.is_some()
    }

    fn frame_info(&self) -> Option<FrameInfo> {
        self.latched
    }

    fn stream_info(&self) -> String {
        match &self.latched {
            Some(info) => format!("MPA: {}, {} bytes/frame", info.spk, info.frame_size),
            None => "MPA: not synced".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_mpa_frame(version_bits: u32, layer_bits: u32, bitrate_index: u32, srate_index: u32, padding: u32, channel_mode: u32) -> Vec<u8> {
        let mut bits: u32 = 0;
        bits |= 0x7ff << 21;
        bits |= version_bits << 19;
        bits |= layer_bits << 17;
        bits |= 1 << 16; // protection_bit = 1 (no CRC)
        bits |= bitrate_index << 12;
        bits |= srate_index << 10;
        bits |= padding << 9;
        bits |= 0 << 8; // private
        bits |= channel_mode << 6;
        bits.to_be_bytes().to_vec()
    }

    #[test]
    fn parses_mpeg1_layer2_frame() {
        // 128 kbps, 44100 Hz, no padding, stereo
        let data = build_mpa_frame(0b11, 0b10, 8, 0, 0, 0b00);
        let info = parse(&data).unwrap();
        assert_eq!(info.spk.sample_rate, 44100);
        assert_eq!(info.spk.mask, ChannelMask::STEREO);
        assert_eq!(info.nsamples, 1152);
        assert_eq!(info.frame_size, 144 * 128000 / 44100);
    }

    #[test]
    fn parses_mono_layer3() {
        let data = build_mpa_frame(0b11, 0b01, 5, 1, 0, 0b11);
        let info = parse(&data).unwrap();
        assert_eq!(info.spk.mask, ChannelMask::MONO);
    }

    #[test]
    fn rejects_bad_syncword() {
        let mut data = build_mpa_frame(0b11, 0b10, 8, 0, 0, 0b00);
        data[0] = 0;
        assert!(parse(&data).is_err());
    }

    #[test]
    fn rejects_free_bitrate() {
        let data = build_mpa_frame(0b11, 0b10, 0, 0, 0, 0b00);
        assert!(parse(&data).is_err());
    }
}
