//! A small simulated x86-64 machine for driving rogue mappings in tests.
//!
//! - 16 MiB of RAM, addressed physically.
//! - Page tables live in RAM from `0x10_0000`; CR3 points at the first one.
//! - 4 KiB backing frames come from `0x40_0000`, 2 MiB ones from `0x80_0000`.
//! - A TLB caches one translation per reserved page. `touch` fills it,
//!   `invalidate` and `release_page` drop it, and `window` uses it before
//!   falling back to a walk.
//! - Every allocator call, entry store and invalidation is recorded.

#![allow(dead_code, clippy::cast_possible_truncation)]

use std::cell::{Cell, RefCell, UnsafeCell};
use std::collections::HashMap;

use pmem_addresses::{PageSizeClass, PhysicalAddress, VirtualAddress};
use pmem_paging::{
    PagingEntry, PdEntry, Pd, Pdpt, PhysMemory, Pml4, Pt, PtEntry, RootTableError,
    RootTableSource, TableIndex, TableLevel, TableWalker,
};
use pmem_registers::Cr3;
use pmem_rogue::{KernelVm, VmError};

pub const RAM_SIZE: u64 = 16 * 1024 * 1024;
const TABLES: u64 = 0x0010_0000;
const FRAMES_4K: u64 = 0x0040_0000;
const FRAMES_2M: u64 = 0x0080_0000;
const VA_4K: u64 = 0xFFFF_FF80_0000_0000;
const VA_2M: u64 = 0xFFFF_FF80_4000_0000;

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Event {
    Reserve(VirtualAddress, PageSizeClass),
    Touch(VirtualAddress),
    EntryWrite { at: PhysicalAddress, value: u64 },
    Invalidate(VirtualAddress),
    Release {
        va: VirtualAddress,
        entry: u64,
        restored: bool,
    },
}

/// One reserve-to-release lifecycle as seen by the machine.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct Cycle {
    pub va: VirtualAddress,
    pub target: Option<PhysicalAddress>,
    pub restored: bool,
}

pub struct Machine {
    ram: UnsafeCell<Box<[u64]>>,
    cr3: Cr3,
    next_table: Cell<u64>,
    next_frame: Cell<u64>,
    next_va_4k: Cell<u64>,
    next_va_2m: Cell<u64>,
    free_4k: RefCell<Vec<VirtualAddress>>,
    free_2m: RefCell<Vec<VirtualAddress>>,
    reserved: RefCell<HashMap<VirtualAddress, PageSizeClass>>,
    installed: RefCell<HashMap<VirtualAddress, u64>>,
    tlb: RefCell<HashMap<VirtualAddress, PhysicalAddress>>,
    events: RefCell<Vec<Event>>,
    pub fail_reserve: Cell<bool>,
    pub fail_release: Cell<bool>,
    pub skip_materialize: Cell<bool>,
    pub split_large_pages: Cell<bool>,
    pub root_unavailable: Cell<bool>,
}

impl Machine {
    pub fn new() -> Self {
        Self {
            ram: UnsafeCell::new(vec![0u64; (RAM_SIZE / 8) as usize].into_boxed_slice()),
            cr3: Cr3::from_pml4_base(PhysicalAddress::new(TABLES)),
            next_table: Cell::new(TABLES + 0x1000),
            next_frame: Cell::new(0),
            next_va_4k: Cell::new(VA_4K),
            next_va_2m: Cell::new(VA_2M),
            free_4k: RefCell::new(Vec::new()),
            free_2m: RefCell::new(Vec::new()),
            reserved: RefCell::new(HashMap::new()),
            installed: RefCell::new(HashMap::new()),
            tlb: RefCell::new(HashMap::new()),
            events: RefCell::new(Vec::new()),
            fail_reserve: Cell::new(false),
            fail_release: Cell::new(false),
            skip_materialize: Cell::new(false),
            split_large_pages: Cell::new(false),
            root_unavailable: Cell::new(false),
        }
    }

    pub fn walker(&self) -> TableWalker<'_, Self, Cr3> {
        TableWalker::new(self, &self.cr3)
    }

    fn ram_ptr(&self) -> *mut u8 {
        // SAFETY: the boxed slice is never reallocated.
        unsafe { (*self.ram.get()).as_mut_ptr().cast::<u8>() }
    }

    fn raw_read(&self, pa: PhysicalAddress) -> u64 {
        assert!(pa.as_u64() + 8 <= RAM_SIZE, "read outside RAM at {pa}");
        assert_eq!(pa.as_u64() % 8, 0);
        unsafe { self.ram_ptr().add(pa.as_u64() as usize).cast::<u64>().read() }
    }

    fn raw_write(&self, pa: PhysicalAddress, value: u64) {
        assert!(pa.as_u64() + 8 <= RAM_SIZE, "write outside RAM at {pa}");
        assert_eq!(pa.as_u64() % 8, 0);
        unsafe { self.ram_ptr().add(pa.as_u64() as usize).cast::<u64>().write(value) }
    }

    /// Store bytes straight into RAM, bypassing any translation.
    pub fn poke(&self, pa: u64, bytes: &[u8]) {
        assert!(pa + bytes.len() as u64 <= RAM_SIZE);
        unsafe {
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), self.ram_ptr().add(pa as usize), bytes.len());
        }
    }

    /// Load bytes straight from RAM.
    pub fn peek(&self, pa: u64, len: usize) -> Vec<u8> {
        assert!(pa + len as u64 <= RAM_SIZE);
        let mut out = vec![0u8; len];
        unsafe {
            std::ptr::copy_nonoverlapping(self.ram_ptr().add(pa as usize), out.as_mut_ptr(), len);
        }
        out
    }

    /// Fill `pa..pa + len` with [`pattern`].
    pub fn fill_pattern(&self, pa: u64, len: usize) {
        let bytes: Vec<u8> = (pa..pa + len as u64).map(pattern).collect();
        self.poke(pa, &bytes);
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.borrow().clone()
    }

    pub fn clear_events(&self) {
        self.events.borrow_mut().clear();
    }

    pub fn entry_writes(&self) -> Vec<(PhysicalAddress, u64)> {
        self.events
            .borrow()
            .iter()
            .filter_map(|e| match *e {
                Event::EntryWrite { at, value } => Some((at, value)),
                _ => None,
            })
            .collect()
    }

    /// Reserve/release lifecycles in order, with the first diverted frame of each.
    pub fn cycles(&self) -> Vec<Cycle> {
        let mut cycles = Vec::new();
        let mut open: Option<(Cycle, PageSizeClass)> = None;
        for event in self.events.borrow().iter() {
            match *event {
                Event::Reserve(va, size) => {
                    open = Some((
                        Cycle {
                            va,
                            target: None,
                            restored: false,
                        },
                        size,
                    ));
                }
                Event::EntryWrite { value, .. } => {
                    if let Some((cycle, size)) = open.as_mut() {
                        if cycle.target.is_none() {
                            cycle.target = Some(match size {
                                PageSizeClass::Size2M => PdEntry::from_bits(value).frame_base(),
                                _ => PtEntry::from_bits(value).frame_base(),
                            });
                        }
                    }
                }
                Event::Release { va, restored, .. } => {
                    if let Some((mut cycle, _)) = open.take() {
                        assert_eq!(cycle.va, va);
                        cycle.restored = restored;
                        cycles.push(cycle);
                    }
                }
                _ => {}
            }
        }
        cycles
    }

    pub fn live_reservations(&self) -> usize {
        self.reserved.borrow().len()
    }

    /// Value the touched page's leaf entry held before anyone diverted it.
    pub fn installed_entry(&self, va: VirtualAddress) -> Option<u64> {
        self.installed.borrow().get(&va).copied()
    }

    fn alloc_table(&self) -> PhysicalAddress {
        let pa = self.next_table.get();
        assert!(pa < FRAMES_4K, "simulated page-table region exhausted");
        self.next_table.set(pa + 0x1000);
        PhysicalAddress::new(pa)
    }

    fn alloc_frame(&self, size: PageSizeClass) -> PhysicalAddress {
        let n = self.next_frame.get();
        self.next_frame.set(n + 1);
        PhysicalAddress::new(match size {
            PageSizeClass::Size2M => FRAMES_2M + (n % 4) * 0x20_0000,
            _ => FRAMES_4K + (n % 1024) * 0x1000,
        })
    }

    fn child<L: TableLevel>(&self, table: PhysicalAddress, va: VirtualAddress) -> PhysicalAddress {
        let slot = table + TableIndex::<L>::of(va).entry_offset();
        if let Some(next) = PagingEntry::<L>::from_bits(self.raw_read(slot)).next_table() {
            return next.base();
        }
        let next = self.alloc_table();
        self.raw_write(slot, PagingEntry::<L>::new_table(next.page()).into_bits());
        next
    }

    /// Build the translation the host kernel would create on first access.
    fn materialize(&self, va: VirtualAddress, size: PageSizeClass) {
        let pdpt = self.child::<Pml4>(self.cr3.pml4_base(), va);
        let pd = self.child::<Pdpt>(pdpt, va);

        let (slot, entry) = if size == PageSizeClass::Size2M && !self.split_large_pages.get() {
            let slot = pd + TableIndex::<Pd>::of(va).entry_offset();
            let entry = PdEntry::new_leaf(self.alloc_frame(size)).with_global(true);
            (slot, entry.into_bits())
        } else {
            let pt = self.child::<Pd>(pd, va);
            let slot = pt + TableIndex::<Pt>::of(va).entry_offset();
            let entry = PtEntry::new_leaf(self.alloc_frame(PageSizeClass::Size4K)).with_global(true);
            (slot, entry.into_bits())
        };

        self.raw_write(slot, entry);
        self.installed.borrow_mut().insert(va, entry);
    }

    fn leaf_slot(&self, va: VirtualAddress, size: PageSizeClass) -> Option<PhysicalAddress> {
        match size {
            PageSizeClass::Size2M => self.walker().pde(va).ok().map(|e| e.address),
            _ => self.walker().pte(va).ok().map(|e| e.address),
        }
    }

    fn translate(&self, va: VirtualAddress) -> PhysicalAddress {
        let cached = self.tlb.borrow().get(&va).copied();
        if let Some(pa) = cached {
            return pa;
        }
        let pa = self
            .walker()
            .resolve(va)
            .unwrap_or_else(|e| panic!("page fault at {va}: {e}"));
        self.tlb.borrow_mut().insert(va, pa);
        pa
    }
}

/// Deterministic content for physical byte `pa`.
pub fn pattern(pa: u64) -> u8 {
    (pa ^ (pa >> 8) ^ (pa >> 16)).wrapping_mul(31) as u8
}

impl PhysMemory for Machine {
    unsafe fn read_u64(&self, pa: PhysicalAddress) -> u64 {
        self.raw_read(pa)
    }

    unsafe fn write_u64(&self, pa: PhysicalAddress, value: u64) {
        self.events
            .borrow_mut()
            .push(Event::EntryWrite { at: pa, value });
        self.raw_write(pa, value);
    }
}

impl RootTableSource for Machine {
    fn root_table_address(&self) -> Result<u64, RootTableError> {
        if self.root_unavailable.get() {
            return Err(RootTableError::Unavailable);
        }
        Ok(self.cr3.into_bits())
    }
}

impl KernelVm for Machine {
    fn reserve_page(&self, size: PageSizeClass) -> Result<VirtualAddress, VmError> {
        if self.fail_reserve.get() {
            return Err(VmError::ReserveFailed { size, code: 3 });
        }

        let (free, next, step) = match size {
            PageSizeClass::Size2M => (&self.free_2m, &self.next_va_2m, 0x20_0000),
            _ => (&self.free_4k, &self.next_va_4k, 0x1000),
        };
        let va = free.borrow_mut().pop().unwrap_or_else(|| {
            let va = next.get();
            next.set(va + step);
            VirtualAddress::new(va)
        });

        self.reserved.borrow_mut().insert(va, size);
        self.events.borrow_mut().push(Event::Reserve(va, size));
        Ok(va)
    }

    fn release_page(&self, va: VirtualAddress, size: PageSizeClass) -> Result<(), VmError> {
        let slot = self.leaf_slot(va, size);
        let entry = slot.map_or(0, |s| self.raw_read(s));
        let restored = self.installed_entry(va) == Some(entry);
        self.events
            .borrow_mut()
            .push(Event::Release { va, entry, restored });

        if self.fail_release.get() {
            return Err(VmError::ReleaseFailed { va, code: 5 });
        }
        if self.reserved.borrow_mut().remove(&va) != Some(size) {
            return Err(VmError::ReleaseFailed { va, code: 22 });
        }

        if let Some(slot) = slot {
            self.raw_write(slot, 0);
        }
        self.installed.borrow_mut().remove(&va);
        self.tlb.borrow_mut().remove(&va);
        match size {
            PageSizeClass::Size2M => self.free_2m.borrow_mut().push(va),
            _ => self.free_4k.borrow_mut().push(va),
        }
        Ok(())
    }

    unsafe fn touch(&self, va: VirtualAddress) {
        self.events.borrow_mut().push(Event::Touch(va));
        if self.skip_materialize.get() {
            return;
        }
        let size = self.reserved.borrow().get(&va).copied();
        self.materialize(va, size.unwrap_or_else(|| panic!("touch of unreserved page {va}")));
        let pa = self.translate(va);
        self.poke(pa.as_u64(), &0x0101_0101u32.to_le_bytes());
    }

    unsafe fn invalidate(&self, va: VirtualAddress) {
        self.events.borrow_mut().push(Event::Invalidate(va));
        self.tlb.borrow_mut().remove(&va);
    }

    unsafe fn window<'w>(&self, va: VirtualAddress, len: usize) -> &'w mut [u8] {
        let pa = self.translate(va).as_u64();
        assert!(pa + len as u64 <= RAM_SIZE, "window at {va} leaves RAM");
        unsafe { std::slice::from_raw_parts_mut(self.ram_ptr().add(pa as usize), len) }
    }
}
