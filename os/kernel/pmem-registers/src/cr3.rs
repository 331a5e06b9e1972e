use bitfield_struct::bitfield;
use pmem_addresses::PhysicalAddress;

#[cfg(all(feature = "asm", target_arch = "x86_64"))]
use crate::LoadRegisterUnsafe;

/// CR3: Page-Map Level-4 Base Register (IA-32e, 4-level paging).
///
/// The metadata provider hands the CR3 value over as an opaque `u64`; this
/// type decodes the PML4 base out of it. The low twelve bits are either the
/// PCID (`CR4.PCIDE = 1`) or the PWT/PCD cache-control flags, and are never
/// part of the table address.
#[bitfield(u64)]
pub struct Cr3 {
    /// Bits 0–11: PCID, or PWT (bit 3) / PCD (bit 4) when PCIDs are disabled.
    #[bits(12)]
    pub pcid: u16,

    /// Bits 12–51: PML4 physical base >> 12.
    #[bits(40)]
    pml4_frame: u64,

    /// Bits 52–63: Reserved. Bit 63 is the no-flush hint on writes with PCID.
    #[bits(12)]
    pub reserved_high: u16,
}

impl Cr3 {
    /// Build a CR3 value naming the PML4 at `pml4` (must be 4 KiB-aligned).
    #[must_use]
    pub const fn from_pml4_base(pml4: PhysicalAddress) -> Self {
        debug_assert!(pml4.as_u64() & 0xFFF == 0, "PML4 base must be 4K-aligned");
        Self::new().with_pml4_frame(pml4.as_u64() >> 12)
    }

    /// Physical address of the PML4 table.
    #[must_use]
    pub const fn pml4_base(self) -> PhysicalAddress {
        PhysicalAddress::new(self.pml4_frame() << 12)
    }

    /// Page-level write-through for PML4 accesses (meaningful without PCID).
    #[must_use]
    pub const fn pwt(self) -> bool {
        self.pcid() & (1 << 3) != 0
    }

    /// Page-level cache disable for PML4 accesses (meaningful without PCID).
    #[must_use]
    pub const fn pcd(self) -> bool {
        self.pcid() & (1 << 4) != 0
    }
}

#[cfg(all(feature = "asm", target_arch = "x86_64"))]
impl LoadRegisterUnsafe for Cr3 {
    unsafe fn load_unsafe() -> Self {
        let cr3: u64;
        unsafe {
            core::arch::asm!("mov {}, cr3", out(reg) cr3, options(nomem, nostack, preserves_flags));
        }
        Self::from_bits(cr3)
    }
}
