use super::{translation, TlbEntry, TlbStats};
use crate::addr::{PhyAddr, VirtAddr};
use crate::error::{Error, Result};
use crate::mem::Memory;
use crate::program::AccessType;
use crate::walk::page_walk;

pub const L1_TLB_LINES: usize = 16;
pub const L2_TLB_LINES: usize = 64;

pub type L1Tlb = DirectTlb<16>;
pub type L2Tlb = DirectTlb<64>;

/// Direct-mapped TLB with `LINES` lines.
///
/// The virtual page number selects a line with its low log2(LINES) bits;
/// the tag holds the remaining high bits.
pub struct DirectTlb<const LINES: usize> {
    entries: Vec<TlbEntry>,
    pub stats: TlbStats,
}

impl<const LINES: usize> DirectTlb<LINES> {
    const LINE_BITS: u32 = LINES.trailing_zeros();

    pub fn new() -> Self {
        DirectTlb {
            entries: vec![TlbEntry::default(); LINES],
            stats: TlbStats::default(),
        }
    }

    pub fn flush(&mut self) {
        for entry in &mut self.entries {
            *entry = TlbEntry::default();
        }
    }

    fn line_of(vpn: u64) -> usize {
        (vpn as usize) % LINES
    }

    fn tag_of(vpn: u64) -> u64 {
        vpn >> Self::LINE_BITS
    }

    pub fn hit(&self, vaddr: VirtAddr) -> Option<PhyAddr> {
        let vpn = vaddr.page_number();
        let entry = self.entries[Self::line_of(vpn)];
        if entry.valid() && entry.tag() == Self::tag_of(vpn) {
            Some(translation(entry.phy_page_num(), vaddr))
        } else {
            None
        }
    }

    /// Overwrites the entry at `line_index`.
    pub fn insert(&mut self, line_index: usize, entry: TlbEntry) -> Result<()> {
        if line_index >= LINES {
            return Err(Error::BadParameter(format!(
                "tlb line {line_index} out of range (0..{LINES})"
            )));
        }
        self.entries[line_index] = entry;
        Ok(())
    }

    /// A valid entry for this TLB shape, tag already shifted.
    pub fn entry_for(vaddr: VirtAddr, paddr: PhyAddr) -> TlbEntry {
        let mut entry = TlbEntry::default();
        entry.set_tag(Self::tag_of(vaddr.page_number()));
        entry.set_phy_page_num(paddr.phy_page_num());
        entry.set_valid(true);
        entry
    }

    fn entry_at(&self, line_index: usize) -> TlbEntry {
        self.entries[line_index]
    }

    fn invalidate(&mut self, line_index: usize) {
        self.entries[line_index].set_valid(false);
    }
}

impl<const LINES: usize> Default for DirectTlb<LINES> {
    fn default() -> Self {
        Self::new()
    }
}

/// Split L1 instruction/data TLBs backed by a unified L2.
///
/// The L1s cache the L2, so evicting an L2 line must also drop any copy
/// still sitting in an L1.
pub struct TlbHierarchy {
    pub itlb: L1Tlb,
    pub dtlb: L1Tlb,
    pub l2: L2Tlb,
}

impl TlbHierarchy {
    pub fn new() -> Self {
        TlbHierarchy {
            itlb: L1Tlb::new(),
            dtlb: L1Tlb::new(),
            l2: L2Tlb::new(),
        }
    }

    pub fn flush(&mut self) {
        self.itlb.flush();
        self.dtlb.flush();
        self.l2.flush();
    }

    fn l1_mut(&mut self, access: AccessType) -> &mut L1Tlb {
        match access {
            AccessType::Instruction => &mut self.itlb,
            AccessType::Data => &mut self.dtlb,
        }
    }

    /// Looks `vaddr` up through both levels, walking the page table on a
    /// full miss. Returns the translation and whether any level hit.
    pub fn search(
        &mut self,
        mem: &Memory,
        vaddr: VirtAddr,
        access: AccessType,
    ) -> Result<(PhyAddr, bool)> {
        let vpn = vaddr.page_number();

        {
            let l1 = self.l1_mut(access);
            if let Some(paddr) = l1.hit(vaddr) {
                l1.stats.hits += 1;
                return Ok((paddr, true));
            }
            l1.stats.misses += 1;
        }

        if let Some(paddr) = self.l2.hit(vaddr) {
            self.l2.stats.hits += 1;
            let entry = L1Tlb::entry_for(vaddr, paddr);
            self.l1_mut(access)
                .insert(vpn as usize % L1_TLB_LINES, entry)?;
            return Ok((paddr, true));
        }
        self.l2.stats.misses += 1;

        let paddr = page_walk(mem, vaddr)?;
        let l2_line = vpn as usize % L2_TLB_LINES;

        // The L2 refill may evict a live mapping; reconstruct its page
        // number so a stale copy in the other L1 can be dropped.
        let evicted_vpn = {
            let old = self.l2.entry_at(l2_line);
            old.valid()
                .then(|| old.tag() * L2_TLB_LINES as u64 + l2_line as u64)
        };

        self.l2.insert(l2_line, L2Tlb::entry_for(vaddr, paddr))?;

        let l1_line = vpn as usize % L1_TLB_LINES;
        let l1_entry = L1Tlb::entry_for(vaddr, paddr);
        let other = match access {
            AccessType::Instruction => {
                self.itlb.insert(l1_line, l1_entry)?;
                &mut self.dtlb
            }
            AccessType::Data => {
                self.dtlb.insert(l1_line, l1_entry)?;
                &mut self.itlb
            }
        };
        if let Some(old_vpn) = evicted_vpn {
            let line = old_vpn as usize % L1_TLB_LINES;
            let entry = other.entry_at(line);
            if entry.valid() && entry.tag() == L1Tlb::tag_of(old_vpn) {
                debug!("dropping stale l1 tlb mapping for page 0x{old_vpn:X}");
                other.invalidate(line);
            }
        }

        Ok((paddr, false))
    }
}

impl Default for TlbHierarchy {
    fn default() -> Self {
        Self::new()
    }
}
