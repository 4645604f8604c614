//! Inbound IEC 61937 burst parser: recognizes an already-wrapped S/PDIF
//! burst so a host that receives PCM-nominal audio from an S/PDIF input
//! can tell compressed passthrough apart from real PCM and recover the
//! original compressed payload.
//!
//! This is the mirror image of [`crate::wrapper::SpdifWrapper`]: the
//! wrapper writes `Pa Pb Pc Pd <payload> <zero padding>`, this parser
//! reads it back. Grounded on
//! `examples/original_source/valib/parsers/spdif/spdif_wrapper.h` and
//! `spdif_defs.h`'s `spdif_type_t` table.

use crate::chunk::{FrameInfo, SyncInfo};
use crate::errors::HeaderError;
use crate::parsers::FrameParser;
use crate::speakers::{ChannelMask, Format, Speakers};
use crate::sync_trie::SyncTrie;

pub const PA: u16 = 0xF872;
pub const PB: u16 = 0x4E1F;
pub const HEADER_SIZE: usize = 8;

/// `Pc` burst data-type codes, from `spdif_defs.h`'s `spdif_type_t`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BurstType {
    Null,
    Ac3,
    Mpeg1Layer1,
    Mpeg1Layer23,
    Mpeg2Ext,
    Mpeg2LsfLayer1,
    Mpeg2LsfLayer2,
    Mpeg2LsfLayer3,
    Dts512,
    Dts1024,
    Dts2048,
    Eac3,
}

impl BurstType {
    pub fn from_code(code: u16) -> Option<BurstType> {
        Some(match code {
            0 => BurstType::Null,
            1 => BurstType::Ac3,
            4 => BurstType::Mpeg1Layer1,
            5 => BurstType::Mpeg1Layer23,
            6 => BurstType::Mpeg2Ext,
            8 => BurstType::Mpeg2LsfLayer1,
            9 => BurstType::Mpeg2LsfLayer2,
            10 => BurstType::Mpeg2LsfLayer3,
            11 => BurstType::Dts512,
            12 => BurstType::Dts1024,
            13 => BurstType::Dts2048,
            21 => BurstType::Eac3,
            _ => return None,
        })
    }

    pub fn code(self) -> u16 {
        match self {
            BurstType::Null => 0,
            BurstType::Ac3 => 1,
            BurstType::Mpeg1Layer1 => 4,
            BurstType::Mpeg1Layer23 => 5,
            BurstType::Mpeg2Ext => 6,
            BurstType::Mpeg2LsfLayer1 => 8,
            BurstType::Mpeg2LsfLayer2 => 9,
            BurstType::Mpeg2LsfLayer3 => 10,
            BurstType::Dts512 => 11,
            BurstType::Dts1024 => 12,
            BurstType::Dts2048 => 13,
            BurstType::Eac3 => 21,
        }
    }

    pub fn format(self) -> Format {
        match self {
            BurstType::Null => Format::Unknown,
            BurstType::Ac3 => Format::Ac3,
            BurstType::Eac3 => Format::Eac3,
            BurstType::Dts512 | BurstType::Dts1024 | BurstType::Dts2048 => Format::Dts,
            _ => Format::Mpa,
        }
    }
}

/// The burst header's four words are 16-bit little-endian on the wire
/// (spec.md §6); `Pa`/`Pb`/`Pc`/`Pd` themselves are the native (logical)
/// values once read back.
fn read_u16_le(data: &[u8], offset: usize) -> Option<u16> {
    Some(u16::from_le_bytes([*data.get(offset)?, *data.get(offset + 1)?]))
}

fn parse(data: &[u8]) -> Result<FrameInfo, HeaderError> {
    if data.len() < HEADER_SIZE {
        return Err(HeaderError::NoSync);
    }
    let pa = read_u16_le(data, 0).ok_or(HeaderError::NoSync)?;
    let pb = read_u16_le(data, 2).ok_or(HeaderError::NoSync)?;
    if pa != PA || pb != PB {
        return Err(HeaderError::NoSync);
    }
    let pc = read_u16_le(data, 4).ok_or(HeaderError::NoSync)?;
    let pd = read_u16_le(data, 6).ok_or(HeaderError::NoSync)?;

    let burst_type = BurstType::from_code(pc & 0x7f).ok_or(HeaderError::InvalidField {
        field: "Pc",
        value: pc as u32,
    })?;

    let payload_bytes = (pd as usize + 7) / 8;
    let frame_size = HEADER_SIZE + payload_bytes + (payload_bytes % 2);

    let spk = Speakers::new(burst_type.format(), ChannelMask::default(), 0);
    let mut info = FrameInfo::new(spk, frame_size, 0);
    info.spdif_burst_type = Some(burst_type.code());
    Ok(info)
}

/// Recognizes IEC 61937 burst headers on an S/PDIF-nominal PCM input.
#[derive(Debug, Default)]
pub struct SpdifInputParser {
    latched: Option<FrameInfo>,
}

impl SpdifInputParser {
    pub fn new() -> Self {
        SpdifInputParser::default()
    }
}

impl FrameParser for SpdifInputParser {
    fn can_parse(&self, format: Format) -> bool {
        matches!(format, Format::Spdif | Format::Unknown)
    }

    fn sync_info(&self) -> SyncInfo {
        // `PA` is transmitted little-endian, so the leading 16 bits the
        // splitter's MSB-first probe sees are its byte-swapped form.
        SyncInfo::new(SyncTrie::singleton(PA.swap_bytes() as u32, 16), HEADER_SIZE, 32768)
    }

    fn header_size(&self) -> usize {
        HEADER_SIZE
    }

    fn parse_header(&self, data: &[u8]) -> Result<FrameInfo, HeaderError> {
        parse(data)
    }

    fn compare_headers(&self, a: &[u8], b: &[u8]) -> bool {
        match (parse(a), parse(b)) {
            (Ok(ia), Ok(ib)) => ia.spdif_burst_type == ib.spdif_burst_type,
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
            Some(prev) if prev.spdif_burst_type == info.spdif_burst_type => {
                self.latched = Some(info);
                Ok(info)
            }
            Some(_) => {
                self.latched = None;
                Err(HeaderError::InvalidField { field: "Pc", value: 0 })
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
            Some(info) => format!(
                "S/PDIF burst: Pc=0x{:04x}, {} bytes",
                info.spdif_burst_type.unwrap_or(0),
                info.frame_size
            ),
            None => "S/PDIF burst: not synced".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_burst(pc: u16, pd: u16) -> Vec<u8> {
        let mut v = Vec::new();
        v.extend_from_slice(&PA.to_le_bytes());
        v.extend_from_slice(&PB.to_le_bytes());
        v.extend_from_slice(&pc.to_le_bytes());
        v.extend_from_slice(&pd.to_le_bytes());
        let payload_bytes = (pd as usize + 7) / 8;
        v.extend(std::iter::repeat(0u8).take(payload_bytes + (payload_bytes % 2)));
        v
    }

    #[test]
    fn recognizes_ac3_burst() {
        let data = build_burst(BurstType::Ac3.code(), 1536 * 8);
        let info = parse(&data).unwrap();
        assert_eq!(info.spdif_burst_type, Some(1));
        assert_eq!(info.frame_size, HEADER_SIZE + 1536);
    }

    #[test]
    fn rejects_wrong_preamble() {
        let mut data = build_burst(BurstType::Ac3.code(), 100);
        data[0] = 0;
        assert!(parse(&data).is_err());
    }

    #[test]
    fn rejects_unknown_burst_type() {
        let data = build_burst(99, 100);
        assert!(parse(&data).is_err());
    }
}
