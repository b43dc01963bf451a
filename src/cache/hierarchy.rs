use super::{CacheEntry, SetAssocCache, WORDS_PER_LINE};
use crate::addr::PhyAddr;
use crate::error::{Error, Result};
use crate::mem::Memory;
use crate::program::AccessType;
use std::io::Write;

pub const L1_SETS: usize = 64;
pub const L1_ICACHE_WAYS: usize = 2;
pub const L1_DCACHE_WAYS: usize = 4;
pub const L2_SETS: usize = 512;
pub const L2_WAYS: usize = 8;

pub type L1ICache = SetAssocCache<{ L1_SETS }, { L1_ICACHE_WAYS }>;
pub type L1DCache = SetAssocCache<{ L1_SETS }, { L1_DCACHE_WAYS }>;
pub type L2Cache = SetAssocCache<{ L2_SETS }, { L2_WAYS }>;

/// An L1 tag is three bits wider than an L2 tag; those bits are the high
/// part of the L2 set index.
const L1_SET_BITS: u32 = 6;
const TAG_DIFF_BITS: u32 = 3;
const TAG_DIFF_MASK: u32 = 0x7;

/// Replacement policies understood by the hierarchy. Only LRU exists;
/// anything else is unrepresentable.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Replacement {
    #[default]
    Lru,
}

/// Exclusive two-level cache: a line lives in at most one of L1 I, L1 D
/// and L2, with L2 acting as a victim cache for both L1s.
///
/// Reads promote an L2 hit into the matching L1; writes go through to main
/// memory before they complete, so no dirty state is tracked.
pub struct CacheHierarchy {
    pub l1i: L1ICache,
    pub l1d: L1DCache,
    pub l2: L2Cache,
}

impl CacheHierarchy {
    pub fn new() -> Self {
        CacheHierarchy {
            l1i: SetAssocCache::new(),
            l1d: SetAssocCache::new(),
            l2: SetAssocCache::new(),
        }
    }

    pub fn flush(&mut self) {
        self.l1i.flush();
        self.l1d.flush();
        self.l2.flush();
    }

    fn check_word_access(paddr: PhyAddr, policy: Replacement) -> Result<()> {
        match policy {
            Replacement::Lru => {}
        }
        if paddr.byte_select() != 0 {
            return Err(Error::BadParameter(format!(
                "word access at unaligned physical address 0x{:X}",
                paddr.to_u32()
            )));
        }
        Ok(())
    }

    /// Reads the word at `paddr` through the hierarchy, filling from L2 or
    /// main memory as needed.
    pub fn read(
        &mut self,
        mem: &Memory,
        paddr: PhyAddr,
        access: AccessType,
        policy: Replacement,
    ) -> Result<u32> {
        Self::check_word_access(paddr, policy)?;
        match access {
            AccessType::Instruction => Self::read_in(mem, &mut self.l1i, &mut self.l2, paddr),
            AccessType::Data => Self::read_in(mem, &mut self.l1d, &mut self.l2, paddr),
        }
    }

    fn read_in<const WAYS: usize>(
        mem: &Memory,
        l1: &mut SetAssocCache<{ L1_SETS }, WAYS>,
        l2: &mut L2Cache,
        paddr: PhyAddr,
    ) -> Result<u32> {
        let word = paddr.word_select();
        if let Some((way, set)) = l1.hit(paddr) {
            l1.stats.read_hits += 1;
            let value = l1.entry_at(set, way).line[word];
            l1.lru_age_update(set, way);
            return Ok(value);
        }
        l1.stats.read_misses += 1;

        if let Some((way, set)) = l2.hit(paddr) {
            l2.stats.read_hits += 1;
            // promotion: the L2 copy is dropped so the line lives in L1 only
            let entry = *l2.entry_at(set, way);
            l2.invalidate(set, way);
            let value = entry.line[word];
            Self::fill_l1(l1, l2, paddr, entry.line)?;
            return Ok(value);
        }
        l2.stats.read_misses += 1;

        // both levels missed: fetch from memory straight into L1
        let entry = SetAssocCache::<{ L1_SETS }, WAYS>::entry_init(mem, paddr)?;
        let value = entry.line[word];
        Self::install_l1(l1, l2, paddr, entry)?;
        Ok(value)
    }

    /// Writes the word at `paddr`, keeping main memory current before the
    /// call returns.
    pub fn write(
        &mut self,
        mem: &mut Memory,
        paddr: PhyAddr,
        value: u32,
        policy: Replacement,
    ) -> Result<()> {
        Self::check_word_access(paddr, policy)?;
        let word = paddr.word_select();

        if let Some((way, set)) = self.l1d.hit(paddr) {
            self.l1d.stats.write_hits += 1;
            let entry = self.l1d.entry_mut(set, way);
            entry.line[word] = value;
            let line = entry.line;
            self.l1d.lru_age_update(set, way);
            return Self::write_line(mem, paddr, &line);
        }
        self.l1d.stats.write_misses += 1;

        if let Some((way, set)) = self.l2.hit(paddr) {
            self.l2.stats.write_hits += 1;
            let mut entry = *self.l2.entry_at(set, way);
            // invalidate before promoting so the line is never in two levels
            self.l2.invalidate(set, way);
            entry.line[word] = value;
            Self::write_line(mem, paddr, &entry.line)?;
            return Self::fill_l1(&mut self.l1d, &mut self.l2, paddr, entry.line);
        }
        self.l2.stats.write_misses += 1;

        let mut entry = L1DCache::entry_init(mem, paddr)?;
        entry.line[word] = value;
        Self::write_line(mem, paddr, &entry.line)?;
        Self::install_l1(&mut self.l1d, &mut self.l2, paddr, entry)
    }

    /// Reads one byte by deriving the aligned word access.
    pub fn read_byte(&mut self, mem: &Memory, paddr: PhyAddr, policy: Replacement) -> Result<u8> {
        let word = self.read(mem, paddr.word_aligned(), AccessType::Data, policy)?;
        Ok((word >> (8 * paddr.byte_select())) as u8)
    }

    /// Writes one byte by patching it into the aligned word.
    pub fn write_byte(
        &mut self,
        mem: &mut Memory,
        paddr: PhyAddr,
        value: u8,
        policy: Replacement,
    ) -> Result<()> {
        let aligned = paddr.word_aligned();
        let word = self.read(mem, aligned, AccessType::Data, policy)?;
        let shift = 8 * paddr.byte_select();
        let patched = (word & !(0xFFu32 << shift)) | (u32::from(value) << shift);
        self.write(mem, aligned, patched, policy)
    }

    /// Builds an L1 entry around an already fetched line and installs it.
    fn fill_l1<const WAYS: usize>(
        l1: &mut SetAssocCache<{ L1_SETS }, WAYS>,
        l2: &mut L2Cache,
        paddr: PhyAddr,
        line: [u32; WORDS_PER_LINE],
    ) -> Result<()> {
        let entry = CacheEntry {
            valid: true,
            age: 0,
            tag: SetAssocCache::<{ L1_SETS }, WAYS>::tag_of(paddr),
            line,
        };
        Self::install_l1(l1, l2, paddr, entry)
    }

    /// Insert-or-evict into L1. A victim is demoted into L2 at the set
    /// reconstructed from its L1 tag; L2's own victims are dropped.
    fn install_l1<const WAYS: usize>(
        l1: &mut SetAssocCache<{ L1_SETS }, WAYS>,
        l2: &mut L2Cache,
        paddr: PhyAddr,
        entry: CacheEntry,
    ) -> Result<()> {
        let l1_set = SetAssocCache::<{ L1_SETS }, WAYS>::set_of(paddr);
        if let Some(victim) = l1.install(l1_set, entry)? {
            let l2_set = (((victim.tag & TAG_DIFF_MASK) << L1_SET_BITS) as usize) | l1_set;
            let demoted = CacheEntry {
                valid: true,
                age: 0,
                tag: victim.tag >> TAG_DIFF_BITS,
                line: victim.line,
            };
            l2.install(l2_set, demoted)?;
        }
        Ok(())
    }

    /// Write-through: the whole line goes back to main memory.
    fn write_line(mem: &mut Memory, paddr: PhyAddr, line: &[u32; WORDS_PER_LINE]) -> Result<()> {
        let base = (paddr.line_base() >> 2) as usize;
        for (i, word) in line.iter().enumerate() {
            mem.write_word(base + i, *word)?;
        }
        Ok(())
    }

    /// Renders all three caches.
    pub fn dump<W: Write>(&self, out: &mut W) -> Result<()> {
        writeln!(out, "L1 ICACHE:")?;
        self.l1i.dump(out)?;
        writeln!(out, "L1 DCACHE:")?;
        self.l1d.dump(out)?;
        writeln!(out, "L2 CACHE:")?;
        self.l2.dump(out)
    }

    /// How many of the three caches hold a valid copy of the line at
    /// `paddr`; exclusivity demands this never exceeds one.
    #[cfg(test)]
    pub(crate) fn copies_of(&self, paddr: PhyAddr) -> usize {
        [
            self.l1i.hit(paddr).is_some(),
            self.l1d.hit(paddr).is_some(),
            self.l2.hit(paddr).is_some(),
        ]
        .iter()
        .filter(|&&present| present)
        .count()
    }
}

impl Default for CacheHierarchy {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::addr::PAGE_SIZE;

    const LRU: Replacement = Replacement::Lru;

    fn paddr(raw: u32) -> PhyAddr {
        PhyAddr::new(raw & !0xFFF, raw & 0xFFF).unwrap()
    }

    fn test_memory() -> Memory {
        let mut mem = Memory::new(64 * PAGE_SIZE as usize).unwrap();
        // every word holds its own byte address
        for word in 0..mem.len() / 4 {
            mem.write_word(word, (word * 4) as u32).unwrap();
        }
        mem
    }

    #[test]
    fn test_read_miss_fills_l1_only() {
        let mem = test_memory();
        let mut caches = CacheHierarchy::new();
        let addr = paddr(0x4010);
        let value = caches.read(&mem, addr, AccessType::Data, LRU).unwrap();
        assert_eq!(value, 0x4010);
        assert!(caches.l1d.hit(addr).is_some());
        assert!(caches.l2.hit(addr).is_none());
        assert_eq!(caches.copies_of(addr), 1);
        // second read hits
        caches.read(&mem, addr, AccessType::Data, LRU).unwrap();
        assert_eq!(caches.l1d.stats.read_hits, 1);
        assert_eq!(caches.l1d.stats.read_misses, 1);
    }

    #[test]
    fn test_instruction_reads_use_the_icache() {
        let mem = test_memory();
        let mut caches = CacheHierarchy::new();
        let addr = paddr(0x4000);
        caches
            .read(&mem, addr, AccessType::Instruction, LRU)
            .unwrap();
        assert!(caches.l1i.hit(addr).is_some());
        assert!(caches.l1d.hit(addr).is_none());
    }

    #[test]
    fn test_read_rejects_unaligned_address() {
        let mem = test_memory();
        let mut caches = CacheHierarchy::new();
        assert!(caches
            .read(&mem, paddr(0x4001), AccessType::Data, LRU)
            .is_err());
    }

    #[test]
    fn test_word_select() {
        let mem = test_memory();
        let mut caches = CacheHierarchy::new();
        for offset in [0u32, 4, 8, 12] {
            let value = caches
                .read(&mem, paddr(0x4000 + offset), AccessType::Data, LRU)
                .unwrap();
            assert_eq!(value, 0x4000 + offset);
        }
    }

    #[test]
    fn test_eviction_demotes_to_l2() {
        let mem = test_memory();
        let mut caches = CacheHierarchy::new();
        // five lines in L1 D set 0, differing only in tag
        let addr_of = |tag: u32| paddr(tag << 10);
        for tag in 0..5 {
            caches
                .read(&mem, addr_of(tag), AccessType::Data, LRU)
                .unwrap();
        }
        // tag 0 was the least recent; it moved to L2 set (0 & 7) << 6 | 0
        assert!(caches.l1d.hit(addr_of(0)).is_none());
        let (_, l2_set) = caches.l2.hit(addr_of(0)).expect("victim must be in L2");
        assert_eq!(l2_set, 0);
        for tag in 0..5 {
            assert_eq!(caches.copies_of(addr_of(tag)), 1);
        }
        caches.l1d.assert_age_permutation(0);
    }

    #[test]
    fn test_l2_set_reconstruction_uses_tag_bits() {
        let mem = test_memory();
        let mut caches = CacheHierarchy::new();
        // L1 tags 3, 8+3, 16+3, 24+3, 32+3 share L1 set 0; tag 3 lands in
        // L2 set 3 << 6
        let addr_of = |tag: u32| paddr(tag << 10);
        for tag in [3u32, 11, 19, 27, 35] {
            caches
                .read(&mem, addr_of(tag), AccessType::Data, LRU)
                .unwrap();
        }
        let (_, l2_set) = caches.l2.hit(addr_of(3)).expect("victim must be in L2");
        assert_eq!(l2_set, 3 << 6);
    }

    #[test]
    fn test_l2_hit_promotes_back_to_l1() {
        let mem = test_memory();
        let mut caches = CacheHierarchy::new();
        let addr_of = |tag: u32| paddr(tag << 10);
        for tag in 0..5 {
            caches
                .read(&mem, addr_of(tag), AccessType::Data, LRU)
                .unwrap();
        }
        assert!(caches.l2.hit(addr_of(0)).is_some());
        // re-reading the evicted line hits L2, invalidates it there and
        // repopulates L1 D
        let value = caches.read(&mem, addr_of(0), AccessType::Data, LRU).unwrap();
        assert_eq!(value, 0);
        assert_eq!(caches.l2.stats.read_hits, 1);
        assert!(caches.l2.hit(addr_of(0)).is_none());
        assert!(caches.l1d.hit(addr_of(0)).is_some());
        assert_eq!(caches.copies_of(addr_of(0)), 1);
    }

    #[test]
    fn test_write_through_on_l1_hit() {
        let mut mem = test_memory();
        let mut caches = CacheHierarchy::new();
        let addr = paddr(0x4000);
        caches.read(&mem, addr, AccessType::Data, LRU).unwrap();
        caches.write(&mut mem, addr, 0xCAFEBABE, LRU).unwrap();
        assert_eq!(caches.l1d.stats.write_hits, 1);
        // the cache answers the next read and memory already agrees
        assert_eq!(
            caches.read(&mem, addr, AccessType::Data, LRU).unwrap(),
            0xCAFEBABE
        );
        assert_eq!(mem.read_word(0x4000 / 4).unwrap(), 0xCAFEBABE);
    }

    #[test]
    fn test_write_miss_goes_through_to_memory() {
        let mut mem = test_memory();
        let mut caches = CacheHierarchy::new();
        let addr = paddr(0x8004);
        caches.write(&mut mem, addr, 0x12345678, LRU).unwrap();
        assert_eq!(caches.l1d.stats.write_misses, 1);
        assert_eq!(mem.read_word(0x8004 / 4).unwrap(), 0x12345678);
        // the rest of the line was fetched around the written word
        assert!(caches.l1d.hit(addr).is_some());
        assert_eq!(
            caches.read(&mem, paddr(0x8000), AccessType::Data, LRU).unwrap(),
            0x8000
        );
    }

    #[test]
    fn test_write_l2_hit_promotes_exclusively() {
        let mut mem = test_memory();
        let mut caches = CacheHierarchy::new();
        let addr_of = |tag: u32| paddr(tag << 10);
        for tag in 0..5 {
            caches
                .read(&mem, addr_of(tag), AccessType::Data, LRU)
                .unwrap();
        }
        assert!(caches.l2.hit(addr_of(0)).is_some());
        caches.write(&mut mem, addr_of(0), 0xFEEDFACE, LRU).unwrap();
        assert_eq!(caches.l2.stats.write_hits, 1);
        assert!(caches.l2.hit(addr_of(0)).is_none());
        assert!(caches.l1d.hit(addr_of(0)).is_some());
        assert_eq!(caches.copies_of(addr_of(0)), 1);
        assert_eq!(mem.read_word(0).unwrap(), 0xFEEDFACE);
    }

    #[test]
    fn test_read_byte_little_endian() {
        let mut mem = test_memory();
        let mut caches = CacheHierarchy::new();
        mem.write_word(0x4000 / 4, 0xEFBEADDE).unwrap(); // bytes DE AD BE EF
        assert_eq!(caches.read_byte(&mem, paddr(0x4000), LRU).unwrap(), 0xDE);
        assert_eq!(caches.read_byte(&mem, paddr(0x4001), LRU).unwrap(), 0xAD);
        assert_eq!(caches.read_byte(&mem, paddr(0x4002), LRU).unwrap(), 0xBE);
        assert_eq!(caches.read_byte(&mem, paddr(0x4003), LRU).unwrap(), 0xEF);
    }

    #[test]
    fn test_write_byte_patches_the_word() {
        let mut mem = test_memory();
        let mut caches = CacheHierarchy::new();
        mem.write_word(0x4000 / 4, 0x11223344).unwrap();
        caches.write_byte(&mut mem, paddr(0x4001), 0xAB, LRU).unwrap();
        assert_eq!(mem.read_word(0x4000 / 4).unwrap(), 0x1122AB44);
        assert_eq!(
            caches
                .read(&mem, paddr(0x4000), AccessType::Data, LRU)
                .unwrap(),
            0x1122AB44
        );
    }

    #[test]
    fn test_exclusivity_over_a_long_run() {
        let mut mem = test_memory();
        let mut caches = CacheHierarchy::new();
        let addrs: Vec<PhyAddr> = (0..40).map(|tag| paddr(tag << 10)).collect();
        for (i, &addr) in addrs.iter().enumerate().cycle().take(200) {
            if i % 3 == 0 {
                caches.write(&mut mem, addr, i as u32, LRU).unwrap();
            } else {
                caches.read(&mem, addr, AccessType::Data, LRU).unwrap();
            }
            for &a in &addrs {
                assert!(caches.copies_of(a) <= 1);
            }
        }
        for set in 0..L1_SETS {
            caches.l1d.assert_age_permutation(set);
        }
        for set in 0..L2_SETS {
            caches.l2.assert_age_permutation(set);
        }
    }

    #[test]
    fn test_flush() {
        let mem = test_memory();
        let mut caches = CacheHierarchy::new();
        let addr = paddr(0x4000);
        caches.read(&mem, addr, AccessType::Data, LRU).unwrap();
        caches.flush();
        assert_eq!(caches.copies_of(addr), 0);
    }
}
