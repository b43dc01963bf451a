mod assoc;
mod hierarchy;

pub use assoc::{AssocTlb, TLB_LINES};
pub use hierarchy::{DirectTlb, L1Tlb, L2Tlb, TlbHierarchy, L1_TLB_LINES, L2_TLB_LINES};

use crate::addr::{PhyAddr, VirtAddr};
use bitfield::bitfield;

bitfield! {
    /// One translation entry, shared by every TLB shape.
    ///
    /// The fully-associative TLB stores the whole 36-bit virtual page
    /// number as the tag; a direct-mapped TLB with L lines stores the page
    /// number shifted right by log2(L).
    #[derive(Clone, Copy, PartialEq, Eq, Default)]
    pub struct TlbEntry(u64);
    impl Debug;
    pub u64, tag, set_tag: 35, 0;
    pub u32, phy_page_num, set_phy_page_num: 55, 36;
    pub valid, set_valid: 56;
}

/// Hit/miss counters for one translation level.
#[derive(Default, Debug, Clone)]
pub struct TlbStats {
    pub hits: usize,
    pub misses: usize,
}

/// Completes a hit: the entry supplies the page number, the virtual
/// address the offset.
fn translation(phy_page_num: u32, vaddr: VirtAddr) -> PhyAddr {
    PhyAddr::from_page_num(phy_page_num, vaddr.page_offset())
}
