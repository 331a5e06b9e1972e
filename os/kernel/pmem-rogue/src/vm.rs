//! # Kernel Virtual Memory Hooks
//!
//! The rogue mapper borrows exactly one page of kernel virtual address space
//! at a time. [`KernelVm`] is the seam to the host kernel's allocator; the
//! defaults for the remaining primitives assume the reserved page is
//! addressable from the executing context.

use pmem_addresses::{PageSizeClass, VirtualAddress};

/// Failures reported by the host allocator, carrying its native status code.
#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum VmError {
    #[error("could not reserve a {size} page (status {code})")]
    ReserveFailed { size: PageSizeClass, code: i32 },
    #[error("could not release page {va} (status {code})")]
    ReleaseFailed { va: VirtualAddress, code: i32 },
}

pub trait KernelVm {
    /// Reserve one page of the given size anywhere in kernel space.
    ///
    /// Called with the transfer engine's spinlock held; must not block.
    ///
    /// # Errors
    /// [`VmError::ReserveFailed`] when no page could be reserved.
    fn reserve_page(&self, size: PageSizeClass) -> Result<VirtualAddress, VmError>;

    /// Return a page obtained from [`reserve_page`](Self::reserve_page).
    ///
    /// Called with the transfer engine's spinlock held; must not block.
    ///
    /// # Errors
    /// [`VmError::ReleaseFailed`] when the allocator rejects the release.
    fn release_page(&self, va: VirtualAddress, size: PageSizeClass) -> Result<(), VmError>;

    /// Write to the freshly reserved page so the kernel builds its translation.
    ///
    /// # Safety
    /// `va` must be a page returned by [`reserve_page`](Self::reserve_page)
    /// and not yet diverted.
    unsafe fn touch(&self, va: VirtualAddress) {
        unsafe { va.as_mut_ptr().cast::<u32>().write_volatile(0x0101_0101) }
    }

    /// Drop the cached translation for `va` on the executing CPU.
    ///
    /// # Safety
    /// Must run at CPL0.
    unsafe fn invalidate(&self, va: VirtualAddress) {
        unsafe { pmem_registers::tlb::invlpg(va) }
    }

    /// Byte view of `len` bytes starting at `va`.
    ///
    /// # Safety
    /// `va..va + len` must be mapped for the whole lifetime `'w` and must not
    /// be aliased by another live view.
    unsafe fn window<'w>(&self, va: VirtualAddress, len: usize) -> &'w mut [u8] {
        unsafe { core::slice::from_raw_parts_mut(va.as_mut_ptr(), len) }
    }
}

impl<T: KernelVm + ?Sized> KernelVm for &T {
    fn reserve_page(&self, size: PageSizeClass) -> Result<VirtualAddress, VmError> {
        (**self).reserve_page(size)
    }

    fn release_page(&self, va: VirtualAddress, size: PageSizeClass) -> Result<(), VmError> {
        (**self).release_page(va, size)
    }

    unsafe fn touch(&self, va: VirtualAddress) {
        unsafe { (**self).touch(va) }
    }

    unsafe fn invalidate(&self, va: VirtualAddress) {
        unsafe { (**self).invalidate(va) }
    }

    unsafe fn window<'w>(&self, va: VirtualAddress, len: usize) -> &'w mut [u8] {
        unsafe { (**self).window(va, len) }
    }
}
