mod hierarchy;

pub use hierarchy::{CacheHierarchy, L1DCache, L1ICache, L2Cache, Replacement};

use crate::addr::PhyAddr;
use crate::error::{Error, Result};
use crate::mem::Memory;
use std::io::Write;

pub const WORDS_PER_LINE: usize = 4;
/// Byte-select plus word-select bits below the set index.
const LINE_OFFSET_BITS: u32 = 4;

/// One cache line: valid bit, LRU age, physical tag, four data words.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CacheEntry {
    pub valid: bool,
    pub age: u8,
    pub tag: u32,
    pub line: [u32; WORDS_PER_LINE],
}

/// Per-cache hit/miss counters.
#[derive(Default, Debug, Clone)]
pub struct CacheStats {
    pub read_hits: usize,
    pub read_misses: usize,
    pub write_hits: usize,
    pub write_misses: usize,
}

/// Set-associative cache with `SETS` sets of `WAYS` ways and 16-byte lines.
///
/// Within a set the `age` fields of the valid ways are a permutation of
/// `0..k`: age 0 is most recently used, and the way with the maximum age
/// is the eviction victim. Geometry is part of the type, so a lookup can
/// never be dispatched against the wrong shape.
#[derive(Clone, Debug)]
pub struct SetAssocCache<const SETS: usize, const WAYS: usize> {
    entries: Vec<CacheEntry>,
    pub stats: CacheStats,
}

impl<const SETS: usize, const WAYS: usize> SetAssocCache<SETS, WAYS> {
    const SET_BITS: u32 = SETS.trailing_zeros();

    pub fn new() -> Self {
        SetAssocCache {
            entries: vec![CacheEntry::default(); SETS * WAYS],
            stats: CacheStats::default(),
        }
    }

    /// Invalidates every entry.
    pub fn flush(&mut self) {
        for entry in &mut self.entries {
            *entry = CacheEntry::default();
        }
    }

    pub fn set_of(paddr: PhyAddr) -> usize {
        ((paddr.to_u32() >> LINE_OFFSET_BITS) as usize) % SETS
    }

    pub fn tag_of(paddr: PhyAddr) -> u32 {
        paddr.to_u32() >> (LINE_OFFSET_BITS + Self::SET_BITS)
    }

    fn index(set: usize, way: usize) -> usize {
        set * WAYS + way
    }

    pub fn entry_at(&self, set: usize, way: usize) -> &CacheEntry {
        &self.entries[Self::index(set, way)]
    }

    pub fn entry_mut(&mut self, set: usize, way: usize) -> &mut CacheEntry {
        &mut self.entries[Self::index(set, way)]
    }

    /// Fabricates a line by reading four words from memory at the line
    /// base, tagged for this cache shape.
    pub fn entry_init(mem: &Memory, paddr: PhyAddr) -> Result<CacheEntry> {
        let base = (paddr.line_base() >> 2) as usize;
        let mut line = [0u32; WORDS_PER_LINE];
        for (i, word) in line.iter_mut().enumerate() {
            *word = mem.read_word(base + i)?;
        }
        Ok(CacheEntry {
            valid: true,
            age: 0,
            tag: Self::tag_of(paddr),
            line,
        })
    }

    /// Returns `(way, set)` of the matching valid entry, if any.
    pub fn hit(&self, paddr: PhyAddr) -> Option<(usize, usize)> {
        let set = Self::set_of(paddr);
        let tag = Self::tag_of(paddr);
        (0..WAYS)
            .find(|&way| {
                let entry = self.entry_at(set, way);
                entry.valid && entry.tag == tag
            })
            .map(|way| (way, set))
    }

    /// Unconditionally writes `entry` at the given slot.
    pub fn insert(&mut self, set: usize, way: usize, entry: CacheEntry) -> Result<()> {
        if set >= SETS || way >= WAYS {
            return Err(Error::BadParameter(format!(
                "slot {way}/{set} outside a {SETS}-set {WAYS}-way cache"
            )));
        }
        self.entries[Self::index(set, way)] = entry;
        Ok(())
    }

    pub fn invalidate(&mut self, set: usize, way: usize) {
        self.entries[Self::index(set, way)].valid = false;
    }

    /// LRU bookkeeping after filling a previously invalid way: every other
    /// way ages by one (saturating at `WAYS - 1`), the filled way becomes
    /// the freshest.
    pub fn lru_age_increase(&mut self, set: usize, way: usize) {
        for w in 0..WAYS {
            let entry = self.entry_mut(set, w);
            if entry.age < (WAYS - 1) as u8 {
                entry.age += 1;
            }
        }
        self.entry_mut(set, way).age = 0;
    }

    /// LRU bookkeeping after touching a valid way: ways fresher than the
    /// touched one age by one, the touched way becomes the freshest.
    pub fn lru_age_update(&mut self, set: usize, way: usize) {
        let touched = self.entry_at(set, way).age;
        for w in 0..WAYS {
            let entry = self.entry_mut(set, w);
            if entry.age < touched {
                entry.age += 1;
            }
        }
        self.entry_mut(set, way).age = 0;
    }

    fn invalid_way(&self, set: usize) -> Option<usize> {
        (0..WAYS).find(|&way| !self.entry_at(set, way).valid)
    }

    fn lru_way(&self, set: usize) -> usize {
        (0..WAYS)
            .max_by_key(|&way| self.entry_at(set, way).age)
            .unwrap_or(0)
    }

    /// Installs `entry` in its set, preferring an invalid way. When the set
    /// is full the least-recently-used way is replaced and its previous
    /// content returned to the caller.
    pub fn install(&mut self, set: usize, entry: CacheEntry) -> Result<Option<CacheEntry>> {
        match self.invalid_way(set) {
            Some(way) => {
                self.insert(set, way, entry)?;
                self.lru_age_increase(set, way);
                Ok(None)
            }
            None => {
                let way = self.lru_way(set);
                let victim = *self.entry_at(set, way);
                // age shift is driven by the victim's age, so it runs
                // before the slot is overwritten
                self.lru_age_update(set, way);
                self.insert(set, way, entry)?;
                self.entry_mut(set, way).age = 0;
                Ok(Some(victim))
            }
        }
    }

    /// Renders every entry, one line each: `way/set: V: AGE: TAG: WORDS`,
    /// dashes for invalid entries.
    pub fn dump<W: Write>(&self, out: &mut W) -> Result<()> {
        for set in 0..SETS {
            for way in 0..WAYS {
                let entry = self.entry_at(set, way);
                if entry.valid {
                    writeln!(
                        out,
                        "{}/{}: V:1 AGE:{} TAG:0x{:X} WORDS: {:08X} {:08X} {:08X} {:08X}",
                        way,
                        set,
                        entry.age,
                        entry.tag,
                        entry.line[0],
                        entry.line[1],
                        entry.line[2],
                        entry.line[3]
                    )?;
                } else {
                    writeln!(
                        out,
                        "{way}/{set}: V:- AGE:- TAG:- WORDS: -------- -------- -------- --------"
                    )?;
                }
            }
        }
        Ok(())
    }

    /// The multiset of ages over the valid ways of `set` must always be
    /// `{0, 1, ..., k-1}`.
    #[cfg(test)]
    pub(crate) fn assert_age_permutation(&self, set: usize) {
        let mut ages: Vec<u8> = (0..WAYS)
            .filter(|&way| self.entry_at(set, way).valid)
            .map(|way| self.entry_at(set, way).age)
            .collect();
        ages.sort_unstable();
        let expected: Vec<u8> = (0..ages.len() as u8).collect();
        assert_eq!(ages, expected, "ages in set {set} are not a permutation");
    }
}

impl<const SETS: usize, const WAYS: usize> Default for SetAssocCache<SETS, WAYS> {
    fn default() -> Self {
        Self::new()
    }
}
