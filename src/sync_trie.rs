//! An immutable prefix automaton over fixed-width bit patterns, used to
//! describe (and efficiently test for) a format's set of possible
//! syncwords.
//!
//! A lone format typically has one or two syncwords (e.g. AC-3's `0x0b77`
//! read big-endian or swapped); the multi-frame parser needs the union of
//! every candidate's syncwords to recognize "something interesting might
//! start here" during a single byte-aligned scan. `SyncTrie` represents
//! both cases (and their union) with the same type so the splitter never
//! needs to special-case "one format" vs. "many formats".

/// A node in the prefix trie: either no patterns, a single fixed pattern,
/// or the union of two subtries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncTrie {
    Empty,
    Singleton { pattern: u32, bits: u32 },
    Union(Box<SyncTrie>, Box<SyncTrie>),
}

impl SyncTrie {
    pub fn empty() -> Self {
        SyncTrie::Empty
    }

    /// A single fixed bit pattern, `bits` wide (`bits <= 32`). `pattern`'s
    /// low `bits` bits hold the value to match; `matches` compares it
    /// against the *leading* `bits` bits of a 32-bit MSB-first probe.
    pub fn singleton(pattern: u32, bits: u32) -> Self {
        debug_assert!(bits <= 32);
        let mask = if bits == 32 { u32::MAX } else { (1u32 << bits) - 1 };
        SyncTrie::Singleton {
            pattern: pattern & mask,
            bits,
        }
    }

    pub fn union(self, other: SyncTrie) -> Self {
        match (&self, &other) {
            (SyncTrie::Empty, _) => other,
            (_, SyncTrie::Empty) => self,
            _ => SyncTrie::Union(Box::new(self), Box::new(other)),
        }
    }

    /// Whether `probe`'s leading bits (of however many bits each
    /// candidate pattern needs) match any pattern stored in this trie.
    ///
    /// `probe` is a 32-bit, byte-aligned window read MSB-first from the
    /// stream (the first scanned byte is the most significant byte of
    /// `probe`); each stored pattern is compared against the same number
    /// of leading bits of `probe`, not its low bits.
    pub fn matches(&self, probe: u32) -> bool {
        match self {
            SyncTrie::Empty => false,
            SyncTrie::Singleton { pattern, bits } => {
                let leading = if *bits == 32 { probe } else { probe >> (32 - bits) };
                leading == *pattern
            }
            SyncTrie::Union(a, b) => a.matches(probe) || b.matches(probe),
        }
    }

    /// The widest pattern stored, in bits; `0` for an empty trie.
    pub fn max_bits(&self) -> u32 {
        match self {
            SyncTrie::Empty => 0,
            SyncTrie::Singleton { bits, .. } => *bits,
            SyncTrie::Union(a, b) => a.max_bits().max(b.max_bits()),
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, SyncTrie::Empty)
    }
}

impl Default for SyncTrie {
    fn default() -> Self {
        SyncTrie::Empty
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn singleton_matches_exact_pattern() {
        let t = SyncTrie::singleton(0x0b77, 16);
        assert!(t.matches(0x0b77 << 16));
        assert!(!t.matches(0x0b78 << 16));
        // trailing bits past the pattern width are ignored
        assert!(t.matches(0x0b77_ffff));
    }

    #[test]
    fn union_matches_either_branch() {
        let t = SyncTrie::singleton(0x0b77, 16).union(SyncTrie::singleton(0x770b, 16));
        assert!(t.matches(0x0b77 << 16));
        assert!(t.matches(0x770b << 16));
        assert!(!t.matches(0x1234 << 16));
    }

    #[test]
    fn empty_matches_nothing() {
        let t = SyncTrie::empty();
        assert!(!t.matches(0));
        assert!(t.is_empty());
    }

    #[test]
    fn union_with_empty_is_identity() {
        let single = SyncTrie::singleton(0xabcd, 16);
        let unioned = single.clone().union(SyncTrie::empty());
        assert_eq!(single, unioned);
    }
}
