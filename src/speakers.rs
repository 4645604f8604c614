//! The closed data model shared by every parser and the wrapper: audio
//! format tags, channel layout masks and the `Speakers` descriptor that
//! pairs them with a sample rate.

use std::fmt;

/// Closed enumeration of the payload formats this crate ever tags a
/// [`Chunk`](crate::chunk::Chunk) with.
///
/// Decoded PCM variants are included because `Speakers` is the descriptor
/// for *both* sides of the encapsulation boundary (compressed input,
/// optionally-wrapped S/PDIF output); this crate never produces or
/// consumes the PCM variants itself, it only carries the tag through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Format {
    Unknown,
    RawData,
    Linear,
    Pcm16,
    Pcm24,
    Pcm32,
    Pcm16Be,
    Pcm24Be,
    Pcm32Be,
    PcmFloat,
    PcmDouble,
    Pes,
    Spdif,
    Ac3,
    Mpa,
    Dts,
    Eac3,
    /// A Dolby syncword was recognized but AC-3 vs. E-AC-3 has not been
    /// resolved yet (before the `bsid` field is read).
    Dolby,
    AacAdts,
    TrueHd,
    Mlp,
    DvdLpcm20,
    DvdLpcm24,
}

impl Format {
    /// Whether this format can ever be handed to [`crate::wrapper::SpdifWrapper`].
    pub fn is_spdifable(self) -> bool {
        matches!(self, Format::Ac3 | Format::Eac3 | Format::Dolby | Format::Dts | Format::Mpa)
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Format::Unknown => "unknown",
            Format::RawData => "raw data",
            Format::Linear => "linear",
            Format::Pcm16 => "pcm16",
            Format::Pcm24 => "pcm24",
            Format::Pcm32 => "pcm32",
            Format::Pcm16Be => "pcm16_be",
            Format::Pcm24Be => "pcm24_be",
            Format::Pcm32Be => "pcm32_be",
            Format::PcmFloat => "pcm_float",
            Format::PcmDouble => "pcm_double",
            Format::Pes => "pes",
            Format::Spdif => "spdif",
            Format::Ac3 => "ac3",
            Format::Mpa => "mpa",
            Format::Dts => "dts",
            Format::Eac3 => "eac3",
            Format::Dolby => "dolby",
            Format::AacAdts => "aac adts",
            Format::TrueHd => "truehd",
            Format::Mlp => "mlp",
            Format::DvdLpcm20 => "lpcm20",
            Format::DvdLpcm24 => "lpcm24",
        };
        f.write_str(s)
    }
}

/// A bitmask over the eleven channel positions this crate understands.
///
/// Bit layout matches the channel ordering used throughout
/// `examples/original_source/valib/spk.cpp`'s `mode_map` table: L, C, R,
/// SL, SR, LFE, BL, BR, BC, CL, CR.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ChannelMask(pub u16);

impl ChannelMask {
    pub const L: ChannelMask = ChannelMask(1 << 0);
    pub const C: ChannelMask = ChannelMask(1 << 1);
    pub const R: ChannelMask = ChannelMask(1 << 2);
    pub const SL: ChannelMask = ChannelMask(1 << 3);
    pub const SR: ChannelMask = ChannelMask(1 << 4);
    pub const LFE: ChannelMask = ChannelMask(1 << 5);
    pub const BL: ChannelMask = ChannelMask(1 << 6);
    pub const BR: ChannelMask = ChannelMask(1 << 7);
    pub const BC: ChannelMask = ChannelMask(1 << 8);
    pub const CL: ChannelMask = ChannelMask(1 << 9);
    pub const CR: ChannelMask = ChannelMask(1 << 10);

    pub const MONO: ChannelMask = Self::C;
    pub const STEREO: ChannelMask = ChannelMask(Self::L.0 | Self::R.0);
    pub const MODE_3_0: ChannelMask = ChannelMask(Self::L.0 | Self::C.0 | Self::R.0);
    pub const MODE_2_1: ChannelMask = ChannelMask(Self::STEREO.0 | Self::BC.0);
    pub const MODE_3_1: ChannelMask = ChannelMask(Self::MODE_3_0.0 | Self::BC.0);
    pub const MODE_2_2: ChannelMask = ChannelMask(Self::STEREO.0 | Self::BL.0 | Self::BR.0);
    pub const MODE_3_2: ChannelMask = ChannelMask(Self::MODE_3_0.0 | Self::BL.0 | Self::BR.0);

    /// 6.0: 3/2 plus a back-center surround channel.
    pub const MODE_3_2_1: ChannelMask = ChannelMask(Self::MODE_3_2.0 | Self::BC.0);
    /// 7.0: 3/2 plus front-of-side center-left/center-right channels.
    pub const MODE_3_2_2: ChannelMask = ChannelMask(Self::MODE_3_2.0 | Self::CL.0 | Self::CR.0);

    pub const fn with_lfe(self) -> ChannelMask {
        ChannelMask(self.0 | Self::LFE.0)
    }

    pub fn contains(self, other: ChannelMask) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn has_lfe(self) -> bool {
        self.contains(Self::LFE)
    }

    pub fn channel_count(self) -> u32 {
        self.0.count_ones()
    }

    pub fn union(self, other: ChannelMask) -> ChannelMask {
        ChannelMask(self.0 | other.0)
    }
}

impl fmt::Display for ChannelMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let without_lfe = ChannelMask(self.0 & !Self::LFE.0);
        let base = match without_lfe {
            Self::MONO => "1/0",
            Self::STEREO => "2/0",
            Self::MODE_3_0 => "3/0",
            Self::MODE_2_1 => "2/1",
            Self::MODE_3_1 => "3/1",
            Self::MODE_2_2 => "2/2",
            Self::MODE_3_2 => "3/2",
            Self::MODE_3_2_1 => "3/2/1",
            Self::MODE_3_2_2 => "3/2/2",
            ChannelMask(0) => "-",
            _ => "custom",
        };
        if self.has_lfe() {
            write!(f, "{base}+LFE")
        } else {
            f.write_str(base)
        }
    }
}

/// How a downmix-ambiguous two-channel signal should be interpreted by a
/// decoder further down the chain. This crate never performs the matrix
/// decode itself; it only carries the tag through from the parsed header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChannelRelation {
    #[default]
    None,
    DolbySurround,
    DolbyProLogicIi,
    SumDifference,
}

impl fmt::Display for ChannelRelation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ChannelRelation::None => "none",
            ChannelRelation::DolbySurround => "dolby surround",
            ChannelRelation::DolbyProLogicIi => "dolby pro logic ii",
            ChannelRelation::SumDifference => "sum/difference",
        };
        f.write_str(s)
    }
}

/// Format + channel layout + sample rate: the descriptor attached to every
/// frame and every [`Chunk`](crate::chunk::Chunk).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Speakers {
    pub format: Format,
    pub mask: ChannelMask,
    pub sample_rate: u32,
    /// dB relative to full scale; `None` when the format carries no
    /// dialnorm/reference-level field.
    pub reference_level: Option<f32>,
    pub relation: ChannelRelation,
}

impl Speakers {
    pub fn new(format: Format, mask: ChannelMask, sample_rate: u32) -> Self {
        Speakers {
            format,
            mask,
            sample_rate,
            reference_level: None,
            relation: ChannelRelation::None,
        }
    }

    pub fn unknown() -> Self {
        Speakers::new(Format::Unknown, ChannelMask::default(), 0)
    }

    pub fn with_reference_level(mut self, level: f32) -> Self {
        self.reference_level = Some(level);
        self
    }

    pub fn with_relation(mut self, relation: ChannelRelation) -> Self {
        self.relation = relation;
        self
    }

    /// Human-readable diagnostic summary, e.g. `"ac3 3/2+LFE 48000Hz"`.
    ///
    /// Grounded on `spk.cpp`'s `format_text()`/`mode_text()` pair; used only
    /// for logging, never for control flow.
    pub fn format_text(&self) -> String {
        format!("{} {} {}Hz", self.format, self.mask, self.sample_rate)
    }
}

impl fmt::Display for Speakers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.format_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mask_display_matches_named_modes() {
        assert_eq!(ChannelMask::STEREO.to_string(), "2/0");
        assert_eq!(ChannelMask::MODE_3_2.with_lfe().to_string(), "3/2+LFE");
        assert_eq!(ChannelMask::MONO.to_string(), "1/0");
    }

    #[test]
    fn mask_contains_and_count() {
        let m = ChannelMask::MODE_3_2.with_lfe();
        assert!(m.contains(ChannelMask::L));
        assert!(m.has_lfe());
        assert_eq!(m.channel_count(), 6);
    }

    #[test]
    fn speakers_format_text() {
        let spk = Speakers::new(Format::Ac3, ChannelMask::MODE_3_2, 48000);
        assert_eq!(spk.format_text(), "ac3 3/2 48000Hz");
    }

    #[test]
    fn is_spdifable_excludes_pcm() {
        assert!(Format::Ac3.is_spdifable());
        assert!(Format::Dts.is_spdifable());
        assert!(!Format::Pcm16.is_spdifable());
        assert!(!Format::TrueHd.is_spdifable());
    }
}
