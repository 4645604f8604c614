//! The transport record passed between a splitter, a parser and the
//! wrapper, and the two small descriptor types — [`FrameInfo`] and
//! [`SyncInfo`] — latched by a parser once it has locked onto a stream.

use std::sync::Arc;

use crate::speakers::Speakers;
use crate::sync_trie::SyncTrie;

/// What a format parser knows about the sync pattern(s) it is looking for.
#[derive(Debug, Clone)]
pub struct SyncInfo {
    pub sync_trie: SyncTrie,
    pub min_frame_size: usize,
    pub max_frame_size: usize,
}

impl SyncInfo {
    pub fn new(sync_trie: SyncTrie, min_frame_size: usize, max_frame_size: usize) -> Self {
        SyncInfo {
            sync_trie,
            min_frame_size,
            max_frame_size,
        }
    }
}

/// What a format parser knows about the frame it just parsed or is
/// currently locked onto: enough to split the next frame out of a byte
/// stream and to describe the payload to a decoder or the S/PDIF wrapper.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameInfo {
    pub spk: Speakers,
    pub frame_size: usize,
    pub nsamples: usize,
    pub bitstream_encoding: crate::bitstream::BitstreamEncoding,
    /// The IEC 61937 `Pc` burst-payload type this frame maps to when
    /// wrapped, if any (`None` for formats the wrapper never encapsulates,
    /// e.g. while only partially synced).
    pub spdif_burst_type: Option<u16>,
}

impl FrameInfo {
    pub fn new(spk: Speakers, frame_size: usize, nsamples: usize) -> Self {
        FrameInfo {
            spk,
            frame_size,
            nsamples,
            bitstream_encoding: crate::bitstream::BitstreamEncoding::Bs8,
            spdif_burst_type: None,
        }
    }
}

/// A unit of transport between pipeline stages.
///
/// Either a raw-byte view (compressed frame data, or an already-wrapped
/// S/PDIF burst) or a linear-sample view (never produced inside this
/// crate, carried only so the type can describe a post-decode chunk too).
/// `sync` marks the first chunk of a new frame/stream (equivalent to the
/// original's "new stream" flag); `time` is an optional presentation
/// timestamp threaded through from the source. A chunk with zero-length
/// data and `sync == false` is the defined "dummy chunk" used to signal
/// end-of-stream without carrying data.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub spk: Speakers,
    pub data: Arc<[u8]>,
    pub sync: bool,
    pub time: Option<f64>,
}

impl Chunk {
    pub fn new(spk: Speakers, data: Arc<[u8]>) -> Self {
        Chunk {
            spk,
            data,
            sync: false,
            time: None,
        }
    }

    pub fn with_sync(mut self, sync: bool) -> Self {
        self.sync = sync;
        self
    }

    pub fn with_time(mut self, time: f64) -> Self {
        self.time = Some(time);
        self
    }

    /// An empty, non-sync chunk used purely to signal end-of-stream.
    pub fn dummy(spk: Speakers) -> Self {
        Chunk {
            spk,
            data: Arc::from(&[][..]),
            sync: false,
            time: None,
        }
    }

    pub fn is_dummy(&self) -> bool {
        self.data.is_empty() && !self.sync
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::speakers::{ChannelMask, Format};

    #[test]
    fn dummy_chunk_is_empty_and_not_sync() {
        let spk = Speakers::new(Format::Ac3, ChannelMask::MODE_3_2, 48000);
        let c = Chunk::dummy(spk);
        assert!(c.is_dummy());
        assert!(!c.sync);
    }

    #[test]
    fn sync_chunk_carries_data() {
        let spk = Speakers::new(Format::Ac3, ChannelMask::MODE_3_2, 48000);
        let data: Arc<[u8]> = Arc::from(&[1, 2, 3][..]);
        let c = Chunk::new(spk, data).with_sync(true).with_time(1.5);
        assert!(!c.is_dummy());
        assert!(c.sync);
        assert_eq!(c.time, Some(1.5));
    }
}
