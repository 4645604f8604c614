//! Combined AC-3 / Enhanced AC-3 (Dolby Digital Plus) parser.
//!
//! A single E-AC-3 "frame" on the wire is a chain of one independent
//! subframe followed by zero or more dependent subframes that extend it
//! with extra channels for additional programs (up to
//! [`crate::parsers::MAX_PROGRAMS`] independent programs,
//! [`crate::parsers::MAX_SUBFRAMES`] subframes total per
//! `dolby_header.cpp`'s capacity limits). Each subframe carries its own
//! syncword and header, so the splitter walks them one at a time; this
//! parser's job beyond per-subframe header decode is sequencing
//! validation (independent ids increment, dependent ids attach to the
//! most recent independent subframe) and the `programs`/`subframes`
//! bookkeeping used by `stream_info`.

use crate::bitstream::BitReader;
use crate::chunk::{FrameInfo, SyncInfo};
use crate::errors::HeaderError;
use crate::parsers::{FrameParser, ProgramInfo, SubframeInfo, MAX_PROGRAMS, MAX_SUBFRAMES};
use crate::speakers::{ChannelMask, ChannelRelation, Format, Speakers};
use crate::sync_trie::SyncTrie;

pub const SYNCWORD: u32 = 0x0b77;
pub const HEADER_SIZE: usize = 10;

const AC3_SRATE_TBL: [u32; 4] = [48000, 44100, 32000, 0];
const EAC3_SRATE_TBL: [u32; 4] = [48000, 44100, 32000, 0]; // fscod==3 uses EAC3_SRATE_TBL2 (half rate)
const EAC3_SRATE_TBL2: [u32; 3] = [24000, 22050, 16000];

const EAC3_NSAMPLES_TBL: [usize; 4] = [256, 512, 768, 1536];

/// `[fscod][frmsizecod]`, in 16-bit words; only `frmsizecod < 38` is valid.
/// Mirrors `ac3.rs`'s table; duplicated rather than shared so each parser
/// stays a self-contained unit, the way the teacher keeps small constant
/// tables local to the file that uses them.
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

const ACMOD2MASK_TBL: [ChannelMask; 8] = [
    ChannelMask::STEREO,
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

fn is_eac3_bsid(bsid: u32) -> bool {
    (11..=16).contains(&bsid)
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct SubframeHeader {
    is_eac3: bool,
    is_dependent: bool,
    substream_id: u8,
    frame_size: usize,
    spk: Speakers,
    nsamples: usize,
}

fn parse_ac3(r: &mut BitReader) -> Result<SubframeHeader, HeaderError> {
    let _crc1 = r.get_n(16).map_err(|_| HeaderError::NoSync)?;
    let fscod = r.get_n(2).map_err(|_| HeaderError::NoSync)?;
    let frmsizecod = r.get_n(6).map_err(|_| HeaderError::NoSync)?;
    let bsid = r.get_n(5).map_err(|_| HeaderError::NoSync)?;
    let _bsmod = r.get_n(3).map_err(|_| HeaderError::NoSync)?;
    let acmod = r.get_n(3).map_err(|_| HeaderError::NoSync)?;

    if fscod == 3 {
        return Err(HeaderError::InvalidField { field: "fscod", value: fscod });
    }
    if frmsizecod as usize >= 38 {
        return Err(HeaderError::InvalidField {
            field: "frmsizecod",
            value: frmsizecod,
        });
    }
    if !is_ac3_bsid(bsid) {
        return Err(HeaderError::InvalidField { field: "bsid", value: bsid });
    }

    // mix-level fields vary by acmod; skip table mirrors ac3.rs.
    const SKIP: [u32; 8] = [0, 0, 2, 2, 2, 4, 2, 4];
    r.skip_n(SKIP[acmod as usize]).map_err(|_| HeaderError::NoSync)?;
    let lfeon = r.get_bool().map_err(|_| HeaderError::NoSync)?;

    let frame_size = AC3_FRAME_SIZE_TBL[fscod as usize][frmsizecod as usize] as usize * 2;
    let mut mask = ACMOD2MASK_TBL[acmod as usize];
    if lfeon {
        mask = mask.with_lfe();
    }

    Ok(SubframeHeader {
        is_eac3: false,
        is_dependent: false,
        substream_id: 0,
        frame_size,
        spk: Speakers::new(Format::Ac3, mask, AC3_SRATE_TBL[fscod as usize]),
        nsamples: 1536,
    })
}

fn parse_eac3(r: &mut BitReader) -> Result<SubframeHeader, HeaderError> {
    let strmtyp = r.get_n(2).map_err(|_| HeaderError::NoSync)?;
    let substream_id = r.get_n(3).map_err(|_| HeaderError::NoSync)? as u8;
    let frmsiz = r.get_n(11).map_err(|_| HeaderError::NoSync)?;
    let fscod = r.get_n(2).map_err(|_| HeaderError::NoSync)?;

    let (sample_rate, nsamples) = if fscod == 3 {
        let fscod2 = r.get_n(2).map_err(|_| HeaderError::NoSync)?;
        if fscod2 as usize >= EAC3_SRATE_TBL2.len() {
            return Err(HeaderError::InvalidField { field: "fscod2", value: fscod2 });
        }
        (EAC3_SRATE_TBL2[fscod2 as usize], EAC3_NSAMPLES_TBL[3])
    } else {
        let numblkscod = r.get_n(2).map_err(|_| HeaderError::NoSync)?;
        (EAC3_SRATE_TBL[fscod as usize], EAC3_NSAMPLES_TBL[numblkscod as usize])
    };

    let acmod = r.get_n(3).map_err(|_| HeaderError::NoSync)?;
    let lfeon = r.get_bool().map_err(|_| HeaderError::NoSync)?;
    let bsid = r.get_n(5).map_err(|_| HeaderError::NoSync)?;

    if !is_eac3_bsid(bsid) {
        return Err(HeaderError::InvalidField { field: "bsid", value: bsid });
    }

    let is_dependent = strmtyp == 1;
    if is_dependent && substream_id != 0 {
        // dependent subframes in this design always extend substream 0's
        // most recent independent program; a nonzero id here is reserved.
        return Err(HeaderError::InvalidField {
            field: "substreamid",
            value: substream_id as u32,
        });
    }

    let frame_size = (frmsiz as usize + 1) * 2;
    let mut mask = ACMOD2MASK_TBL[acmod as usize];
    if lfeon {
        mask = mask.with_lfe();
    }
    let mut spk = Speakers::new(Format::Eac3, mask, sample_rate);
    if is_dependent {
        // Channel-map override (chanmape/chanmap) describes how this
        // dependent subframe's channels fold into the parent program;
        // this crate does not decode that mapping. Left unresolved rather
        // than guessed at.
        spk = spk.with_relation(ChannelRelation::None);
    }

    Ok(SubframeHeader {
        is_eac3: true,
        is_dependent,
        substream_id,
        frame_size,
        spk,
        nsamples,
    })
}

fn parse_subframe(data: &[u8]) -> Result<SubframeHeader, HeaderError> {
    if data.len() < HEADER_SIZE {
        return Err(HeaderError::NoSync);
    }
    let mut r = BitReader::new(data);
    let sync = r.get_n(16).map_err(|_| HeaderError::NoSync)?;
    if sync != SYNCWORD {
        return Err(HeaderError::NoSync);
    }
    // Peek ahead far enough to read bsid and decide the variant: for AC-3
    // that's crc1(16)+fscod(2)+frmsizecod(6)+bsid(5) = 29 bits after sync;
    // for E-AC-3, bsid sits later. We try the AC-3 layout first only when
    // its bsid field is in AC-3's range, otherwise fall back to E-AC-3.
    let mut probe = BitReader::new(data);
    probe.skip_n(16).ok();
    probe.skip_n(16).ok();
    probe.skip_n(8).ok();
    let candidate_bsid = probe.get_n(5).unwrap_or(0xff);

    if is_ac3_bsid(candidate_bsid) {
        parse_ac3(&mut r)
    } else {
        let mut r2 = BitReader::new(data);
        r2.skip_n(16).map_err(|_| HeaderError::NoSync)?;
        parse_eac3(&mut r2)
    }
}

/// Recognizes legacy AC-3 and multiplexed Enhanced AC-3 frames.
#[derive(Debug, Default)]
pub struct DolbyParser {
    latched_format: Option<Format>,
    latched_spk: Option<Speakers>,
    programs: Vec<ProgramInfo>,
    subframes: Vec<SubframeInfo>,
    next_independent_id: u8,
    current_program: u8,
}

impl DolbyParser {
    pub fn new() -> Self {
        DolbyParser::default()
    }

    fn reset_tables(&mut self) {
        self.programs.clear();
        self.subframes.clear();
        self.next_independent_id = 0;
        self.current_program = 0;
    }

    fn record_subframe(&mut self, hdr: &SubframeHeader, offset: usize) -> Result<(), HeaderError> {
        if self.subframes.len() >= MAX_SUBFRAMES {
            return Err(HeaderError::InvalidSubframe { offset });
        }
        if hdr.is_dependent {
            if self.programs.is_empty() {
                return Err(HeaderError::FirstSubframeDependent);
            }
            let program = self.current_program;
            self.subframes.push(SubframeInfo {
                offset,
                size: hdr.frame_size,
                is_independent: false,
                program,
            });
            let last = self.programs.len() - 1;
            self.programs[last].subframe_count = self.programs[last].subframe_count.saturating_add(1);
        } else {
            if self.programs.len() >= MAX_PROGRAMS {
                return Err(HeaderError::InvalidSubframe { offset });
            }
            self.current_program = self.programs.len() as u8;
            self.programs.push(ProgramInfo {
                independent_substream_id: hdr.substream_id,
                subframe_count: 1,
            });
            self.subframes.push(SubframeInfo {
                offset,
                size: hdr.frame_size,
                is_independent: true,
                program: self.current_program,
            });
        }
        Ok(())
    }

    fn frame_info_from(hdr: &SubframeHeader) -> FrameInfo {
        let mut info = FrameInfo::new(hdr.spk, hdr.frame_size, hdr.nsamples);
        info.spdif_burst_type = Some(if hdr.is_eac3 { 21 } else { 1 });
        info
    }
}

impl FrameParser for DolbyParser {
    fn can_parse(&self, format: Format) -> bool {
        matches!(format, Format::Ac3 | Format::Eac3 | Format::Dolby | Format::Unknown)
    }

    fn sync_info(&self) -> SyncInfo {
        SyncInfo::new(SyncTrie::singleton(SYNCWORD, 16), HEADER_SIZE, 4096)
    }

    fn header_size(&self) -> usize {
        HEADER_SIZE
    }

    fn parse_header(&self, data: &[u8]) -> Result<FrameInfo, HeaderError> {
        parse_subframe(data).map(|h| Self::frame_info_from(&h))
    }

    fn compare_headers(&self, a: &[u8], b: &[u8]) -> bool {
        match (parse_subframe(a), parse_subframe(b)) {
            (Ok(ha), Ok(hb)) => ha.spk.format == hb.spk.format && ha.is_eac3 == hb.is_eac3,
            _ => false,
        }
    }

    fn first_frame(&mut self, data: &[u8]) -> Result<FrameInfo, HeaderError> {
        self.reset_tables();
        let hdr = parse_subframe(data)?;
        if hdr.is_dependent {
            return Err(HeaderError::FirstSubframeDependent);
        }
        self.record_subframe(&hdr, 0)?;
        self.latched_format = Some(hdr.spk.format);
        self.latched_spk = Some(hdr.spk);
        Ok(Self::frame_info_from(&hdr))
    }

    fn next_frame(&mut self, data: &[u8]) -> Result<FrameInfo, HeaderError> {
        let hdr = parse_subframe(data).map_err(|e| {
            self.reset_tables();
            self.latched_format = None;
            e
        })?;

        match self.latched_format {
            Some(fmt) if fmt == hdr.spk.format => {}
            Some(_) => {
                self.reset_tables();
                self.latched_format = None;
                return Err(HeaderError::InvalidField { field: "format", value: 0 });
            }
            None => {}
        }

        if !hdr.is_dependent {
            // A new independent subframe starts a fresh multiplex cycle;
            // subframe/program bookkeeping resets so stream_info reports
            // this cycle's structure rather than accumulating forever.
            self.reset_tables();
            self.next_independent_id = self.next_independent_id.wrapping_add(1);
        }

        let offset: usize = self.subframes.iter().map(|s| s.size).sum();
        self.record_subframe(&hdr, offset)?;
        self.latched_format = Some(hdr.spk.format);
        self.latched_spk = Some(hdr.spk);
        Ok(Self::frame_info_from(&hdr))
    }

    fn reset(&mut self) {
        self.latched_format = None;
        self.latched_spk = None;
        self.reset_tables();
    }

    fn in_sync(&self) -> bool {
        self.latched_format.is_some()
    }

    fn frame_info(&self) -> Option<FrameInfo> {
        None
    }

    fn stream_info(&self) -> String {
        match self.latched_spk {
            Some(spk) => format!(
                "{}: {} programs, {} subframes",
                spk,
                self.programs.len(),
                self.subframes.len()
            ),
            None => "Dolby: not synced".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_ac3_frame(fscod: u32, frmsizecod: u32, acmod: u32) -> Vec<u8> {
        let mut bits: u64 = 0;
        let mut nbits = 0u32;
        macro_rules! push {
            ($val:expr, $width:expr) => {{
                bits = (bits << $width) | ($val as u64);
                nbits += $width;
            }};
        }
        push!(SYNCWORD, 16);
        push!(0u32, 16);
        push!(fscod, 2);
        push!(frmsizecod, 6);
        push!(8u32, 5);
        push!(0u32, 3);
        push!(acmod, 3);
        const SKIP: [u32; 8] = [0, 0, 2, 2, 2, 4, 2, 4];
        push!(0u32, SKIP[acmod as usize]);
        push!(0u32, 1);
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
    fn recognizes_legacy_ac3_subframe() {
        let data = build_ac3_frame(0, 10, 2);
        let hdr = parse_subframe(&data).unwrap();
        assert!(!hdr.is_eac3);
        assert_eq!(hdr.spk.format, Format::Ac3);
    }

    #[test]
    fn first_frame_rejects_dependent_subframe() {
        // bsid 14 forces the E-AC-3 path; strmtyp=1 (dependent) as the
        // first two bits after the 16-bit sync field.
        let mut bits: u64 = 0;
        let mut nbits = 0u32;
        macro_rules! push {
            ($val:expr, $width:expr) => {{
                bits = (bits << $width) | ($val as u64);
                nbits += $width;
            }};
        }
        push!(SYNCWORD, 16);
        push!(1u32, 2); // strmtyp = dependent
        push!(0u32, 3); // substreamid
        push!(100u32, 11); // frmsiz
        push!(0u32, 2); // fscod
        push!(1u32, 2); // numblkscod
        push!(2u32, 3); // acmod
        push!(0u32, 1); // lfeon
        push!(14u32, 5); // bsid
        let pad = (8 - (nbits % 8)) % 8;
        push!(0u32, pad);
        let total_bytes = (nbits / 8) as usize;
        let mut out = vec![0u8; total_bytes.max(HEADER_SIZE)];
        for i in 0..total_bytes {
            let shift = (total_bytes - 1 - i) * 8;
            out[i] = ((bits >> shift) & 0xff) as u8;
        }

        let mut p = DolbyParser::new();
        assert!(p.first_frame(&out).is_err());
    }

    #[test]
    fn first_frame_then_next_frame_same_format_ok() {
        let mut p = DolbyParser::new();
        let f1 = build_ac3_frame(0, 10, 2);
        p.first_frame(&f1).unwrap();
        let f2 = build_ac3_frame(0, 10, 2);
        assert!(p.next_frame(&f2).is_ok());
        assert!(p.in_sync());
    }

    #[test]
    fn next_frame_rejects_format_switch() {
        let mut p = DolbyParser::new();
        let f1 = build_ac3_frame(0, 10, 2);
        p.first_frame(&f1).unwrap();

        // an E-AC-3 independent subframe, strmtyp=0
        let mut bits: u64 = 0;
        let mut nbits = 0u32;
        macro_rules! push {
            ($val:expr, $width:expr) => {{
                bits = (bits << $width) | ($val as u64);
                nbits += $width;
            }};
        }
        push!(SYNCWORD, 16);
        push!(0u32, 2);
        push!(0u32, 3);
        push!(100u32, 11);
        push!(0u32, 2);
        push!(1u32, 2);
        push!(2u32, 3);
        push!(0u32, 1);
        push!(14u32, 5);
        let pad = (8 - (nbits % 8)) % 8;
        push!(0u32, pad);
        let total_bytes = (nbits / 8) as usize;
        let mut out = vec![0u8; total_bytes.max(HEADER_SIZE)];
        for i in 0..total_bytes {
            let shift = (total_bytes - 1 - i) * 8;
            out[i] = ((bits >> shift) & 0xff) as u8;
        }

        assert!(p.next_frame(&out).is_err());
        assert!(!p.in_sync());
    }
}
