//! Sparse physical memory and page-table builders for unit tests.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;

use pmem_addresses::{PhysicalAddress, VirtualAddress};
use pmem_registers::Cr3;

use crate::{
    PagingEntry, PhysMemory, RootTableError, RootTableSource, TableIndex, TableLevel, TableWalker,
};
use crate::{Pd, Pdpt, Pml4, Pt};

/// Sparse 64-bit word store; unbacked words read as zero.
pub struct TestMachine {
    words: RefCell<HashMap<u64, u64>>,
    next_table: Cell<u64>,
    cr3: Cr3,
}

pub struct NoRoot;

impl RootTableSource for NoRoot {
    fn root_table_address(&self) -> Result<u64, RootTableError> {
        Err(RootTableError::Unavailable)
    }
}

impl TestMachine {
    const PML4: u64 = 0x0010_0000;

    pub fn new() -> Self {
        Self {
            words: RefCell::new(HashMap::new()),
            next_table: Cell::new(Self::PML4 + 0x1000),
            cr3: Cr3::from_pml4_base(PhysicalAddress::new(Self::PML4)),
        }
    }

    pub fn walker(&self) -> TableWalker<'_, Self, Cr3> {
        TableWalker::new(self, &self.cr3)
    }

    pub const fn root_table(&self) -> PhysicalAddress {
        self.cr3.pml4_base()
    }

    pub fn write(&self, pa: PhysicalAddress, value: u64) {
        self.words.borrow_mut().insert(pa.as_u64(), value);
    }

    pub fn read(&self, pa: PhysicalAddress) -> u64 {
        self.words.borrow().get(&pa.as_u64()).copied().unwrap_or(0)
    }

    fn alloc_table(&self) -> PhysicalAddress {
        let pa = self.next_table.get();
        self.next_table.set(pa + 0x1000);
        PhysicalAddress::new(pa)
    }

    /// Next-level table under `table[index_of(va)]`, creating it if absent.
    fn child<L: TableLevel>(&self, table: PhysicalAddress, va: VirtualAddress) -> PhysicalAddress {
        let slot = table + TableIndex::<L>::of(va).entry_offset();
        let entry = PagingEntry::<L>::from_bits(self.read(slot));
        if let Some(next) = entry.next_table() {
            return next.base();
        }
        let next = self.alloc_table();
        self.write(slot, PagingEntry::<L>::new_table(next.page()).into_bits());
        next
    }

    pub fn map_4k(&self, va: VirtualAddress, pa: PhysicalAddress) {
        let pdpt = self.child::<Pml4>(self.root_table(), va);
        let pd = self.child::<Pdpt>(pdpt, va);
        let pt = self.child::<Pd>(pd, va);
        let slot = pt + TableIndex::<Pt>::of(va).entry_offset();
        self.write(slot, PagingEntry::<Pt>::new_leaf(pa).into_bits());
    }

    pub fn map_2m(&self, va: VirtualAddress, pa: PhysicalAddress) {
        let pdpt = self.child::<Pml4>(self.root_table(), va);
        let pd = self.child::<Pdpt>(pdpt, va);
        let slot = pd + TableIndex::<Pd>::of(va).entry_offset();
        self.write(slot, PagingEntry::<Pd>::new_leaf(pa).into_bits());
    }

    pub fn map_1g(&self, va: VirtualAddress, pa: PhysicalAddress) {
        let pdpt = self.child::<Pml4>(self.root_table(), va);
        let slot = pdpt + TableIndex::<Pdpt>::of(va).entry_offset();
        self.write(slot, PagingEntry::<Pdpt>::new_leaf(pa).into_bits());
    }
}

impl PhysMemory for TestMachine {
    unsafe fn read_u64(&self, pa: PhysicalAddress) -> u64 {
        self.read(pa)
    }

    unsafe fn write_u64(&self, pa: PhysicalAddress, value: u64) {
        self.write(pa, value);
    }
}
