//! DTS Coherent Acoustics core header parser.
//!
//! DTS is the one format in this crate recognized across all five
//! [`crate::bitstream::BitstreamEncoding`] variants: a core stream is
//! sometimes stored 14-bit packed for legacy transports. The four
//! well-known syncword patterns below (big/little-endian, 16/14-bit) are
//! the same ones `examples/original_source/valib/parsers/dts/dts_header.cpp`
//! scans for; header field widths and validation below follow that file.

use crate::bitstream::{BitReader, BitstreamEncoding};
use crate::chunk::{FrameInfo, SyncInfo};
use crate::errors::HeaderError;
use crate::parsers::FrameParser;
use crate::speakers::{ChannelMask, ChannelRelation, Format, Speakers};
use crate::sync_trie::SyncTrie;

pub const SYNC_BE16: u32 = 0x7FFE_8001;
pub const SYNC_LE16: u32 = 0xFE7F_0180;
pub const SYNC_BE14: u32 = 0x1FFF_E800;
pub const SYNC_LE14: u32 = 0xFF1F_00E8;

pub const HEADER_SIZE: usize = 14;
/// Scan window used by the original implementation for DTS's (rarer) long
/// frames; retained here even though our splitter bounds scanning with
/// `SyncInfo::max_frame_size` instead.
pub const SCAN_SIZE: usize = 16384;

const DTS_SAMPLE_RATES: [u32; 16] = [
    0, 8000, 16000, 32000, 0, 0, 11025, 22050, 44100, 0, 0, 12000, 24000, 48000, 96000, 192000,
];

const AMODE2MASK_TBL: [ChannelMask; 10] = [
    ChannelMask::MONO,
    ChannelMask::STEREO, // dual mono (A+B), carried as two independent channels
    ChannelMask::STEREO,
    ChannelMask::STEREO, // sum-difference
    ChannelMask::STEREO, // matrixed (Lt/Rt)
    ChannelMask::MODE_3_0,
    ChannelMask::MODE_2_1,
    ChannelMask::MODE_3_1,
    ChannelMask::MODE_2_2,
    ChannelMask::MODE_3_2,
];

const AMODE2REL_TBL: [ChannelRelation; 10] = [
    ChannelRelation::None,
    ChannelRelation::None,
    ChannelRelation::None,
    ChannelRelation::SumDifference,
    ChannelRelation::DolbySurround,
    ChannelRelation::None,
    ChannelRelation::None,
    ChannelRelation::None,
    ChannelRelation::None,
    ChannelRelation::None,
];

fn probe_u32(data: &[u8]) -> Option<u32> {
    if data.len() < 4 {
        return None;
    }
    Some(u32::from_be_bytes([data[0], data[1], data[2], data[3]]))
}

/// Detects which of the four bitstream encodings a DTS frame is packed
/// in, from its leading syncword.
pub fn detect_encoding(data: &[u8]) -> Option<BitstreamEncoding> {
    let probe = probe_u32(data)?;
    if probe == SYNC_BE16 {
        Some(BitstreamEncoding::Bs16Be)
    } else if probe == SYNC_LE16 {
        Some(BitstreamEncoding::Bs16Le)
    } else if probe == SYNC_BE14 {
        Some(BitstreamEncoding::Bs14Be)
    } else if probe == SYNC_LE14 {
        Some(BitstreamEncoding::Bs14Le)
    } else {
        None
    }
}

fn spdif_burst_type_for(nsamples: usize) -> Option<u16> {
    match nsamples {
        512 => Some(11),
        1024 => Some(12),
        2048 => Some(13),
        _ => None,
    }
}

fn parse_core(data: &[u8], enc: BitstreamEncoding) -> Result<FrameInfo, HeaderError> {
    // Normalize to Bs8 so the rest of the header can be read with a plain
    // big-endian bit reader, mirroring `ReadBS::set_ptr`'s single-cursor
    // approach for all four encodings.
    let mut canon = vec![0u8; data.len()];
    let n = crate::bitstream::bs_convert(data, enc, &mut canon, BitstreamEncoding::Bs8);
    canon.truncate(n);

    if canon.len() < HEADER_SIZE {
        return Err(HeaderError::NoSync);
    }

    let mut r = BitReader::new(&canon);
    let sync = r.get_n(32).map_err(|_| HeaderError::NoSync)?;
    if sync != SYNC_BE16 {
        return Err(HeaderError::NoSync);
    }
    r.skip_n(6).map_err(|_| HeaderError::NoSync)?; // frametype(1) + deficit samples(5)
    let _cpf = r.get_bool().map_err(|_| HeaderError::NoSync)?;
    let nblks = r.get_n(7).map_err(|_| HeaderError::NoSync)? + 1;
    if nblks < 6 {
        return Err(HeaderError::InvalidField { field: "nblks", value: nblks });
    }
    let frame_size = r.get_n(14).map_err(|_| HeaderError::NoSync)? + 1;
    if frame_size < 96 {
        return Err(HeaderError::InvalidField {
            field: "fsize",
            value: frame_size,
        });
    }
    let amode = r.get_n(6).map_err(|_| HeaderError::NoSync)?;
    if amode > 0xc {
        return Err(HeaderError::InvalidField { field: "amode", value: amode });
    }
    let sfreq = r.get_n(4).map_err(|_| HeaderError::NoSync)?;
    if sfreq as usize >= DTS_SAMPLE_RATES.len() || DTS_SAMPLE_RATES[sfreq as usize] == 0 {
        return Err(HeaderError::InvalidField { field: "sfreq", value: sfreq });
    }
    r.skip_n(15).map_err(|_| HeaderError::NoSync)?;
    let lff = r.get_n(2).map_err(|_| HeaderError::NoSync)?;
    if lff == 3 {
        return Err(HeaderError::InvalidField { field: "lff", value: lff });
    }

    let amode_idx = amode.min(9) as usize;
    let mut mask = AMODE2MASK_TBL[amode_idx];
    let relation = AMODE2REL_TBL[amode_idx];
    if lff != 0 {
        mask = mask.with_lfe();
    }

    let sample_rate = DTS_SAMPLE_RATES[sfreq as usize];
    let nsamples = nblks as usize * 32;

    let spk = Speakers::new(Format::Dts, mask, sample_rate).with_relation(relation);
    let mut info = FrameInfo::new(spk, frame_size as usize, nsamples);
    info.bitstream_encoding = enc;
    info.spdif_burst_type = spdif_burst_type_for(nsamples);
    Ok(info)
}

/// Recognizes DTS core frames across all four physical packings.
#[derive(Debug, Default)]
pub struct DtsParser {
    latched: Option<FrameInfo>,
}

impl DtsParser {
    pub fn new() -> Self {
        DtsParser::default()
    }
}

impl FrameParser for DtsParser {
    fn can_parse(&self, format: Format) -> bool {
        matches!(format, Format::Dts | Format::Unknown)
    }

    fn sync_info(&self) -> SyncInfo {
        let trie = SyncTrie::singleton(SYNC_BE16, 32)
            .union(SyncTrie::singleton(SYNC_LE16, 32))
            .union(SyncTrie::singleton(SYNC_BE14, 32))
            .union(SyncTrie::singleton(SYNC_LE14, 32));
        SyncInfo::new(trie, HEADER_SIZE, SCAN_SIZE)
    }

    fn header_size(&self) -> usize {
        HEADER_SIZE
    }

    fn parse_header(&self, data: &[u8]) -> Result<FrameInfo, HeaderError> {
        let enc = detect_encoding(data).ok_or(HeaderError::NoSync)?;
        parse_core(data, enc)
    }

    fn compare_headers(&self, a: &[u8], b: &[u8]) -> bool {
        match (self.parse_header(a), self.parse_header(b)) {
            (Ok(ia), Ok(ib)) => ia.spk == ib.spk,
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
                Err(HeaderError::InvalidField { field: "amode/sfreq", value: 0 })
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
            Some(info) => format!("DTS: {}, {} bytes/frame", info.spk, info.frame_size),
            None => "DTS: not synced".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_dts_frame(nblks_minus1: u32, fsize_minus1: u32, amode: u32, sfreq: u32, lff: u32) -> Vec<u8> {
        let mut writer = BitVecWriter::new();
        writer.push(SYNC_BE16, 32);
        writer.push(0, 6);
        writer.push(0, 1);
        writer.push(nblks_minus1, 7);
        writer.push(fsize_minus1, 14);
        writer.push(amode, 6);
        writer.push(sfreq, 4);
        writer.push(0, 15);
        writer.push(lff, 2);
        writer.into_bytes(HEADER_SIZE)
    }

    struct BitVecWriter {
        bytes: Vec<u8>,
        cur: u32,
        nbits: u32,
    }

    impl BitVecWriter {
        fn new() -> Self {
            BitVecWriter { bytes: Vec::new(), cur: 0, nbits: 0 }
        }
        fn push(&mut self, val: u32, width: u32) {
            for i in (0..width).rev() {
                let bit = (val >> i) & 1;
                self.cur = (self.cur << 1) | bit;
                self.nbits += 1;
                if self.nbits == 8 {
                    self.bytes.push(self.cur as u8);
                    self.cur = 0;
                    self.nbits = 0;
                }
            }
        }
        fn into_bytes(mut self, min_len: usize) -> Vec<u8> {
            if self.nbits > 0 {
                self.cur <<= 8 - self.nbits;
                self.bytes.push(self.cur as u8);
            }
            while self.bytes.len() < min_len {
                self.bytes.push(0);
            }
            self.bytes
        }
    }

    #[test]
    fn parses_48khz_3_2_frame() {
        let data = build_dts_frame(15, 1023, 9, 13, 0);
        let info = parse_core(&data, BitstreamEncoding::Bs16Be).unwrap();
        assert_eq!(info.spk.sample_rate, 48000);
        assert_eq!(info.spk.mask, ChannelMask::MODE_3_2);
        assert_eq!(info.frame_size, 1024);
        assert_eq!(info.nsamples, 512);
        assert_eq!(info.spdif_burst_type, Some(11));
    }

    #[test]
    fn detects_all_four_encodings() {
        let be16 = [0x7F, 0xFE, 0x80, 0x01];
        let le16 = [0xFE, 0x7F, 0x01, 0x80];
        let be14 = [0x1F, 0xFF, 0xE8, 0x00];
        let le14 = [0xFF, 0x1F, 0x00, 0xE8];
        assert_eq!(detect_encoding(&be16), Some(BitstreamEncoding::Bs16Be));
        assert_eq!(detect_encoding(&le16), Some(BitstreamEncoding::Bs16Le));
        assert_eq!(detect_encoding(&be14), Some(BitstreamEncoding::Bs14Be));
        assert_eq!(detect_encoding(&le14), Some(BitstreamEncoding::Bs14Le));
    }

    #[test]
    fn rejects_short_frame_size() {
        let data = build_dts_frame(15, 50, 9, 13, 0);
        assert!(matches!(
            parse_core(&data, BitstreamEncoding::Bs16Be),
            Err(HeaderError::InvalidField { field: "fsize", .. })
        ));
    }

    #[test]
    fn rejects_reserved_lff() {
        let data = build_dts_frame(15, 1023, 9, 13, 3);
        assert!(matches!(
            parse_core(&data, BitstreamEncoding::Bs16Be),
            Err(HeaderError::InvalidField { field: "lff", .. })
        ));
    }
}
