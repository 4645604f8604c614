//! Error taxonomy for the synchronization, framing and S/PDIF encapsulation
//! pipeline.
//!
//! Format-level errors (bad bitstream reads, invalid headers, header
//! mismatches, encapsulation failures) are always recoverable by the
//! component that raised them and are never propagated as panics. They are
//! logged through the [`log`] facade and also surfaced as typed return
//! values so a caller that wants to count or inspect them can.

/// Emits a log event at `$level`, unless the component's configured
/// `fail_level` says this class of error should instead be returned.
///
/// Mirrors the escalation knob used throughout this crate: by default
/// every recoverable error is just a log line and local recovery (drop the
/// candidate, resync, fall back to passthrough); a caller that wants strict
/// behavior (e.g. under fuzzing) can lower `fail_level` to turn warnings
/// into hard errors.
#[macro_export]
macro_rules! log_or_err {
    ($state:expr, $level:expr, $err:expr $(,)?) => {{
        if $level <= $state.fail_level {
            return Err($err);
        } else {
            match $level {
                ::log::Level::Error => ::log::error!("{}", $err),
                ::log::Level::Warn => ::log::warn!("{}", $err),
                ::log::Level::Info => ::log::info!("{}", $err),
                ::log::Level::Debug => ::log::debug!("{}", $err),
                ::log::Level::Trace => ::log::trace!("{}", $err),
            }
        }
    }};
}

/// A bit read ran past the caller-specified length of a header.
///
/// Local recovery: discard the candidate syncword, advance one byte, keep
/// scanning.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum BitstreamError {
    #[error("bit read of {requested} bits at position {position} exceeds header length {len}")]
    OutOfBounds {
        requested: u32,
        position: u64,
        len: u64,
    },

    #[error("unsupported bitstream encoding pair for conversion")]
    UnsupportedConversion,
}

/// Decoded header fields fail the format's constraint table.
///
/// Same recovery as [`BitstreamError`].
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderError {
    #[error("no sync pattern recognized at this offset")]
    NoSync,

    #[error("reserved or out-of-range field value: {field} = {value}")]
    InvalidField { field: &'static str, value: u32 },

    #[error("frame size {size} is outside the allowed range [{min}, {max}]")]
    FrameSizeOutOfRange { size: usize, min: usize, max: usize },

    #[error("E-AC-3 frame has an invalid subframe at byte offset {offset}")]
    InvalidSubframe { offset: usize },

    #[error(
        "independent substream id {found} is not the expected sequential id {expected}"
    )]
    NonSequentialIndependentId { found: u8, expected: u8 },

    #[error("dependent substream id {found} is not the expected sequential id {expected}")]
    NonSequentialDependentId { found: u8, expected: u8 },

    #[error("first E-AC-3 subframe must be independent")]
    FirstSubframeDependent,
}

/// `next_frame` disagreed with the latched frame info.
///
/// Recovery: `reset()` the parser and rescan for three-header agreement.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SplitterError {
    #[error("header at expected offset does not agree with the latched stream invariants")]
    HeaderMismatch,

    #[error("no syncword found within max_frame_size ({0} bytes) of the scan start")]
    ScanLimitExceeded(usize),

    #[error("candidate frame is shorter than min_frame_size ({min}), got {actual}")]
    TooShort { min: usize, actual: usize },
}

/// The wrapper cannot fit the payload under the selected DTS mode.
///
/// Recovery: switch the instance to transparent passthrough and raise
/// `new_stream`.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum WrapError {
    #[error("payload of {payload} bytes does not fit in the {burst} byte IEC 61937 burst")]
    DoesNotFit { payload: usize, burst: usize },

    #[error("format is not spdifable or disabled by the passthrough mask")]
    NotSpdifable,
}
