#![doc = include_str!("../README.md")]

/// The format/channel-layout/sample-rate data model shared by every
/// parser and the wrapper.
///
/// - **Format** ([`speakers::Format`]): closed enumeration of payload
///   kinds, compressed and PCM.
/// - **ChannelMask** ([`speakers::ChannelMask`]): the eleven-position
///   channel vocabulary and its named modes.
/// - **Speakers** ([`speakers::Speakers`]): format + mask + sample rate,
///   the descriptor attached to every frame.
pub mod speakers;

/// Bit-level reading over a canonicalized byte buffer, and the standalone
/// 8/14/16-bit repacking conversion (`bs_convert`) used before a header
/// can be parsed and by the wrapper's DTS conversion modes.
pub mod bitstream;

/// An immutable prefix automaton over fixed-width bit patterns, used to
/// describe a format's syncword(s) to the splitter.
pub mod sync_trie;

/// The transport record ([`chunk::Chunk`]) and the two descriptors a
/// parser latches onto a locked stream ([`chunk::FrameInfo`],
/// [`chunk::SyncInfo`]).
pub mod chunk;

/// Format-specific header parsers behind one shared contract
/// ([`parsers::FrameParser`]), plus the multi-format dispatcher
/// ([`parsers::multi::MultiFrameParser`]).
///
/// - **AC-3** ([`parsers::ac3`]): legacy Dolby Digital only.
/// - **Dolby** ([`parsers::dolby`]): combined AC-3 / E-AC-3, including
///   E-AC-3's independent/dependent subframe multiplexing.
/// - **DTS** ([`parsers::dts`]): core stream, all four physical packings.
/// - **MPA** ([`parsers::mpa`]): MPEG-1/2 Audio Layers I/II/III.
/// - **IEC 61937** ([`parsers::iec61937`]): recognizes an already-wrapped
///   S/PDIF burst on the way back in.
pub mod parsers;

/// Byte-aligned frame splitter driving a single [`parsers::FrameParser`]
/// over an incoming byte stream.
pub mod splitter;

/// The S/PDIF/HDMI encapsulation state machine
/// ([`wrapper::SpdifWrapper`]) and its configuration surface
/// ([`wrapper::SpdifWrapperConfig`]).
pub mod wrapper;

/// Per-subsystem error types and the `log_or_err!` escalation macro.
pub mod errors;

/// The top-level pipeline ([`spdifer::Spdifer`]) tying the splitter,
/// multi-frame parser and wrapper into the `open`/`close`/`reset`/
/// `process`/`flush` lifecycle from spec.md §6.
pub mod spdifer;

pub use chunk::{Chunk, FrameInfo, SyncInfo};
pub use errors::{BitstreamError, HeaderError, SplitterError, WrapError};
pub use spdifer::{Spdifer, SpdiferError};
pub use speakers::{ChannelMask, ChannelRelation, Format, Speakers};
pub use sync_trie::SyncTrie;
