//! # Translation Lookaside Buffer Maintenance

use pmem_addresses::VirtualAddress;

/// Invalidate any TLB entry for the page containing `va` on the current CPU.
///
/// Other CPUs are not notified; a translation cached elsewhere survives until
/// that CPU flushes it on its own.
///
/// # Safety
/// Must run at CPL0; `invlpg` faults in user mode.
#[inline]
pub unsafe fn invlpg(va: VirtualAddress) {
    #[cfg(all(feature = "asm", target_arch = "x86_64"))]
    unsafe {
        core::arch::asm!("invlpg [{}]", in(reg) va.as_u64(), options(nostack, preserves_flags));
    }

    #[cfg(not(all(feature = "asm", target_arch = "x86_64")))]
    {
        let _ = va;
        core::sync::atomic::compiler_fence(core::sync::atomic::Ordering::SeqCst);
    }
}
