//! Legacy (Dolby Digital, non-Plus) AC-3 header parser.
//!
//! Constants are taken from `examples/original_source/valib/parsers/dolby/dolby_header.cpp`,
//! which this crate's combined [`crate::parsers::dolby`] parser also draws
//! from; this standalone parser exists for callers that specifically want
//! to recognize legacy AC-3 only and never touch the E-AC-3 subframe
//! multiplexing logic.

use crate::bitstream::BitReader;
use crate::chunk::{FrameInfo, SyncInfo};
use crate::errors::HeaderError;
use crate::parsers::FrameParser;
use crate::speakers::{ChannelMask, Format, Speakers};
use crate::sync_trie::SyncTrie;

pub const SYNCWORD: u32 = 0x0b77;
pub const HEADER_SIZE: usize = 7;

const AC3_SRATE_TBL: [u32; 4] = [48000, 44100, 32000, 0];

/// `[fscod][frmsizecod]`, in 16-bit words; only `frmsizecod < 38` is valid.
const AC3_FRAME_SIZE_TBL: [[u16; 38]; 3] = [
    [
        64, 64, 80, 80, 96, 96, 112, 112, 128, 128, 160, 160, 192, 192, 224, 224, 256, 256, 320,
        320, 384, 384, 448, 448, 512, 512, 640, 640, 768, 768, 896, 896, 1024, 1024, 1152, 1152,
        1280, 1280,
    ],
    [
        69, 70, 87, 88, 104, 105, 121, 122, 139, 140, 174, 175, 208, 209, 243, 244, 278, 279, 348,
        349, 417, 418, 487, 488, 557, 558, 696, 697, 835, 836, 975, 976, 1114, 1115, 1253, 1254,
        1393, 1394,
    ],
    [
        96, 96, 120, 120, 144, 144, 168, 168, 192, 192, 240, 240, 288, 288, 336, 336, 384, 384,
        480, 480, 576, 576, 672, 672, 768, 768, 960, 960, 1152, 1152, 1344, 1344, 1536, 1536,
        1728, 1728, 1920, 1920,
    ],
];

/// Bits to skip (mix-level fields that only appear for some `acmod`
/// values) before the `lfeon` bit, indexed by `acmod`.
const AC3_LFE_SKIP_TBL: [u32; 8] = [0, 0, 2, 2, 2, 4, 2, 4];

const ACMOD2MASK_TBL: [ChannelMask; 8] = [
    ChannelMask::STEREO, // 1+1 dual mono, carried as two independent mono channels
    ChannelMask::MONO,
    ChannelMask::STEREO,
    ChannelMask::MODE_3_0,
    ChannelMask::MODE_2_1,
    ChannelMask::MODE_3_1,
    ChannelMask::MODE_2_2,
    ChannelMask::MODE_3_2,
];

fn is_ac3_bsid(bsid: u32) -> bool {
    bsid <= 8
}

#[derive(Debug, Clone, Copy)]
struct Parsed {
    info: FrameInfo,
}

fn parse(data: &[u8]) -> Result<Parsed, HeaderError> {
    if data.len() < HEADER_SIZE {
        return Err(HeaderError::NoSync);
    }
    let mut r = BitReader::new(data);
    let sync = r.get_n(16).map_err(|_| HeaderError::NoSync)?;
    if sync != SYNCWORD {
        return Err(HeaderError::NoSync);
    }
    let _crc1 = r.get_n(16).map_err(|_| HeaderError::NoSync)?;
    let fscod = r.get_n(2).map_err(|_| HeaderError::NoSync)?;
    let frmsizecod = r.get_n(6).map_err(|_| HeaderError::NoSync)?;
    let bsid = r.get_n(5).map_err(|_| HeaderError::NoSync)?;
    let _bsmod = r.get_n(3).map_err(|_| HeaderError::NoSync)?;
    let acmod = r.get_n(3).map_err(|_| HeaderError::NoSync)?;

    if fscod == 3 {
        return Err(HeaderError::InvalidField {
            field: "fscod",
            value: fscod,
        });
    }
    if frmsizecod as usize >= 38 {
        return Err(HeaderError::InvalidField {
            field: "frmsizecod",
            value: frmsizecod,
        });
    }
    if !is_ac3_bsid(bsid) {
        return Err(HeaderError::InvalidField {
            field: "bsid",
            value: bsid,
        });
    }

    r.skip_n(AC3_LFE_SKIP_TBL[acmod as usize])
        .map_err(|_| HeaderError::NoSync)?;
    let lfeon = r.get_bool().map_err(|_| HeaderError::NoSync)?;

    let sample_rate = AC3_SRATE_TBL[fscod as usize];
    let frame_size = AC3_FRAME_SIZE_TBL[fscod as usize][frmsizecod as usize] as usize * 2;
    let mut mask = ACMOD2MASK_TBL[acmod as usize];
    if lfeon {
        mask = mask.with_lfe();
    }

    let spk = Speakers::new(Format::Ac3, mask, sample_rate);
    let mut info = FrameInfo::new(spk, frame_size, 1536);
    info.spdif_burst_type = Some(1); // IEC61937 Pc = AC-3

    Ok(Parsed { info })
}

/// Recognizes and parses legacy (non-Plus) AC-3 frames.
#[derive(Debug, Default)]
pub struct Ac3Parser {
    latched: Option<FrameInfo>,
}

impl Ac3Parser {
    pub fn new() -> Self {
        Ac3Parser::default()
    }
}

impl FrameParser for Ac3Parser {
    fn can_parse(&self, format: Format) -> bool {
        matches!(format, Format::Ac3 | Format::Dolby | Format::Unknown)
    }

    fn sync_info(&self) -> SyncInfo {
        SyncInfo::new(SyncTrie::singleton(SYNCWORD, 16), HEADER_SIZE, 3840)
    }

    fn header_size(&self) -> usize {
        HEADER_SIZE
    }

    fn parse_header(&self, data: &[u8]) -> Result<FrameInfo, HeaderError> {
        parse(data).map(|p| p.info)
    }

    fn compare_headers(&self, a: &[u8], b: &[u8]) -> bool {
        match (parse(a), parse(b)) {
            (Ok(pa), Ok(pb)) => pa.info.spk == pb.info.spk,
            _ => false,
        }
    }

    fn first_frame(&mut self, data: &[u8]) -> Result<FrameInfo, HeaderError> {
        let info = self.parse_header(data)?;
        self.latched = Some(info);
        Ok(info)
    }

    fn next_frame(&mut self, data: &[u8]) -> Result<FrameInfo, HeaderError> {
        let info = self.parse_header(data)?;
        match &self.latched {
            Some(prev) if prev.spk == info.spk => {
                self.latched = Some(info);
                Ok(info)
            }
            Some(_) => {
                self.latched = None;
                Err(HeaderError::InvalidField {
                    field: "acmod/fscod",
                    value: 0,
                })
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
            Some(info) => format!("AC-3: {}, {} bytes/frame", info.spk, info.frame_size),
            None => "AC-3: not synced".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_ac3_frame(fscod: u32, frmsizecod: u32, acmod: u32, lfeon: bool) -> Vec<u8> {
        // Only the fields this parser reads are filled meaningfully;
        // everything else is zero, which is valid per the bit layout above.
        let mut bits: u64 = 0;
        let mut nbits = 0u32;
        macro_rules! push {
            ($val:expr, $width:expr) => {{
                bits = (bits << $width) | ($val as u64);
                nbits += $width;
            }};
        }
        push!(SYNCWORD, 16);
        push!(0u32, 16); // crc1
        push!(fscod, 2);
        push!(frmsizecod, 6);
        push!(8u32, 5); // bsid
        push!(0u32, 3); // bsmod
        push!(acmod, 3);
        let skip = AC3_LFE_SKIP_TBL[acmod as usize];
        push!(0u32, skip);
        push!(lfeon as u32, 1);
        // pad to a byte boundary
        let pad = (8 - (nbits % 8)) % 8;
        push!(0u32, pad);
        let total_bytes = (nbits / 8) as usize;
        let mut out = vec![0u8; total_bytes.max(HEADER_SIZE)];
        for i in 0..total_bytes {
            let shift = (total_bytes - 1 - i) * 8;
            out[i] = ((bits >> shift) & 0xff) as u8;
        }
        out
    }

    #[test]
    fn parses_48khz_stereo_frame() {
        let data = build_ac3_frame(0, 10, 2, false);
        let info = parse(&data).unwrap().info;
        assert_eq!(info.spk.sample_rate, 48000);
        assert_eq!(info.spk.mask, ChannelMask::STEREO);
        assert_eq!(info.frame_size, AC3_FRAME_SIZE_TBL[0][10] as usize * 2);
    }

    #[test]
    fn rejects_bad_syncword() {
        let mut data = build_ac3_frame(0, 10, 2, false);
        data[0] = 0;
        assert!(parse(&data).is_err());
    }

    #[test]
    fn rejects_reserved_fscod() {
        let data = build_ac3_frame(3, 10, 2, false);
        assert!(matches!(
            parse(&data),
            Err(HeaderError::InvalidField { field: "fscod", .. })
        ));
    }

    #[test]
    fn next_frame_rejects_format_change() {
        let mut p = Ac3Parser::new();
        let f1 = build_ac3_frame(0, 10, 2, false);
        p.first_frame(&f1).unwrap();
        let f2 = build_ac3_frame(1, 10, 2, false); // different sample rate
        assert!(p.next_frame(&f2).is_err());
        assert!(!p.in_sync());
    }

    #[test]
    fn lfe_flag_adds_lfe_channel() {
        let data = build_ac3_frame(0, 10, 7, true);
        let info = parse(&data).unwrap().info;
        assert!(info.spk.mask.has_lfe());
        assert_eq!(info.spk.mask, ChannelMask::MODE_3_2.with_lfe());
    }
}
