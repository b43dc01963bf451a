use crate::error::{Error, Result};
use bitfield::bitfield;
use std::fmt::{self, Display};

pub const PAGE_SIZE: u32 = 4096;
pub const PAGE_OFFSET_BITS: u32 = 12;
/// Width of one page-table index field.
const ENTRY_BITS: u32 = 9;
const ENTRY_LIMIT: u16 = 1 << ENTRY_BITS;
/// Width of a virtual page number (four 9-bit table indices).
pub const VPN_BITS: u32 = 4 * ENTRY_BITS;
const VADDR_MASK: u64 = (1 << (VPN_BITS + PAGE_OFFSET_BITS)) - 1;

// offset    pte       pmd       pud       pgd       reserved
// [11:0]    [20:12]   [29:21]   [38:30]   [47:39]   [63:48]
bitfield! {
    /// A 48-bit virtual address; the high 16 bits are reserved and zero.
    #[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct VirtAddr(u64);
    impl Debug;
    pub u16, page_offset, set_page_offset: 11, 0;
    pub u16, pte_entry, set_pte_entry: 20, 12;
    pub u16, pmd_entry, set_pmd_entry: 29, 21;
    pub u16, pud_entry, set_pud_entry: 38, 30;
    pub u16, pgd_entry, set_pgd_entry: 47, 39;
    pub u16, reserved, set_reserved: 63, 48;
}

impl VirtAddr {
    /// Builds an address from its five fields.
    ///
    /// Rejects an offset reaching past the page and any table index wider
    /// than nine bits.
    pub fn new(
        pgd_entry: u16,
        pud_entry: u16,
        pmd_entry: u16,
        pte_entry: u16,
        page_offset: u16,
    ) -> Result<Self> {
        if u32::from(page_offset) >= PAGE_SIZE {
            return Err(Error::BadParameter(format!(
                "page offset 0x{page_offset:X} reaches past the page"
            )));
        }
        for (name, value) in [
            ("pgd", pgd_entry),
            ("pud", pud_entry),
            ("pmd", pmd_entry),
            ("pte", pte_entry),
        ] {
            if value >= ENTRY_LIMIT {
                return Err(Error::BadParameter(format!(
                    "{name} index 0x{value:X} wider than {ENTRY_BITS} bits"
                )));
            }
        }
        let mut vaddr = VirtAddr(0);
        vaddr.set_pgd_entry(pgd_entry);
        vaddr.set_pud_entry(pud_entry);
        vaddr.set_pmd_entry(pmd_entry);
        vaddr.set_pte_entry(pte_entry);
        vaddr.set_page_offset(page_offset);
        Ok(vaddr)
    }

    /// Decodes a raw 64-bit address, dropping the reserved high bits.
    pub fn from_u64(raw: u64) -> Self {
        VirtAddr(raw & VADDR_MASK)
    }

    pub fn to_u64(self) -> u64 {
        self.0 & VADDR_MASK
    }

    /// Virtual page number: the `pgd|pud|pmd|pte` concatenation, 36 bits.
    pub fn page_number(self) -> u64 {
        self.to_u64() >> PAGE_OFFSET_BITS
    }
}

impl Display for VirtAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "PGD=0x{:X}; PUD=0x{:X}; PMD=0x{:X}; PTE=0x{:X}; offset=0x{:X}",
            self.pgd_entry(),
            self.pud_entry(),
            self.pmd_entry(),
            self.pte_entry(),
            self.page_offset()
        )
    }
}

// offset    page number
// [11:0]    [31:12]
bitfield! {
    /// A 32-bit physical address: 20-bit page number over a 12-bit offset.
    #[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct PhyAddr(u32);
    impl Debug;
    pub u16, page_offset, set_page_offset: 11, 0;
    pub u32, phy_page_num, set_phy_page_num: 31, 12;
}

impl PhyAddr {
    /// Builds an address from a page base (a byte address, page aligned)
    /// and an offset within the page.
    pub fn new(page_base: u32, page_offset: u32) -> Result<Self> {
        if page_offset >= PAGE_SIZE {
            return Err(Error::BadParameter(format!(
                "page offset 0x{page_offset:X} reaches past the page"
            )));
        }
        if page_base % PAGE_SIZE != 0 {
            return Err(Error::BadParameter(format!(
                "page base 0x{page_base:X} is not page aligned"
            )));
        }
        Ok(PhyAddr(page_base | page_offset))
    }

    /// Rebuilds an address from an already validated page number.
    pub(crate) fn from_page_num(phy_page_num: u32, page_offset: u16) -> Self {
        PhyAddr((phy_page_num << PAGE_OFFSET_BITS) | u32::from(page_offset))
    }

    pub fn to_u32(self) -> u32 {
        self.0
    }

    /// Index into main memory viewed as an array of 32-bit words.
    pub fn word_index(self) -> usize {
        (self.0 >> 2) as usize
    }

    /// Byte address of the 16-byte cache line holding this address.
    pub fn line_base(self) -> u32 {
        self.0 & !0xF
    }

    /// Which of the four words of its cache line this address selects.
    pub fn word_select(self) -> usize {
        ((self.0 & 0xC) >> 2) as usize
    }

    /// Which byte of its word this address selects (little-endian order).
    pub fn byte_select(self) -> usize {
        (self.0 & 0x3) as usize
    }

    /// The same address with the byte-select bits cleared.
    pub fn word_aligned(self) -> Self {
        PhyAddr(self.0 & !0x3)
    }
}

impl Display for PhyAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "page num=0x{:X}; offset=0x{:X}",
            self.phy_page_num(),
            self.page_offset()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_virt_addr_round_trip() {
        let vaddr = VirtAddr::new(0x1FF, 0x0, 0x155, 0x2A, 0xFFF).unwrap();
        assert_eq!(VirtAddr::from_u64(vaddr.to_u64()), vaddr);
        assert_eq!(vaddr.pgd_entry(), 0x1FF);
        assert_eq!(vaddr.pud_entry(), 0x0);
        assert_eq!(vaddr.pmd_entry(), 0x155);
        assert_eq!(vaddr.pte_entry(), 0x2A);
        assert_eq!(vaddr.page_offset(), 0xFFF);
    }

    #[test]
    fn test_virt_addr_layout() {
        let vaddr = VirtAddr::new(1, 2, 3, 4, 5).unwrap();
        let raw = (1u64 << 39) | (2 << 30) | (3 << 21) | (4 << 12) | 5;
        assert_eq!(vaddr.to_u64(), raw);
        assert_eq!(vaddr.page_number(), raw >> 12);
    }

    #[test]
    fn test_virt_addr_rejects_wide_fields() {
        assert!(VirtAddr::new(0, 0, 0, 0, 0x1000).is_err());
        assert!(VirtAddr::new(0x200, 0, 0, 0, 0).is_err());
        assert!(VirtAddr::new(0, 0x200, 0, 0, 0).is_err());
    }

    #[test]
    fn test_virt_addr_from_u64_drops_reserved() {
        let vaddr = VirtAddr::from_u64(0xDEAD_0000_0000_1234);
        assert_eq!(vaddr.reserved(), 0);
        assert_eq!(vaddr.to_u64(), 0x1234);
    }

    #[test]
    fn test_phy_addr() {
        let paddr = PhyAddr::new(0x4000, 0x123).unwrap();
        assert_eq!(paddr.phy_page_num(), 0x4);
        assert_eq!(paddr.page_offset(), 0x123);
        assert_eq!(paddr.to_u32(), 0x4123);
        assert_eq!(paddr.word_index(), 0x4123 >> 2);
        assert!(PhyAddr::new(0x4001, 0).is_err());
        assert!(PhyAddr::new(0x4000, 0x1000).is_err());
    }

    #[test]
    fn test_phy_addr_line_fields() {
        let paddr = PhyAddr::new(0x4000, 0xE).unwrap();
        assert_eq!(paddr.line_base(), 0x4000);
        assert_eq!(paddr.word_select(), 3);
        assert_eq!(paddr.byte_select(), 2);
        assert_eq!(paddr.word_aligned().to_u32(), 0x400C);
    }

    #[test]
    fn test_display() {
        let vaddr = VirtAddr::new(0x12, 0x34, 0x56, 0x78, 0x9AB).unwrap();
        assert_eq!(
            format!("{vaddr}"),
            "PGD=0x12; PUD=0x34; PMD=0x56; PTE=0x78; offset=0x9AB"
        );
        let paddr = PhyAddr::new(0x4000, 0x123).unwrap();
        assert_eq!(format!("{paddr}"), "page num=0x4; offset=0x123");
    }
}
