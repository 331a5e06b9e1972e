//! # Virtual-to-Physical Resolution
//!
//! Resolution walks to the PTE first. If that fails for any reason, the PDE
//! is consulted: a present PDE with `PS=1` maps a 2 MiB page and yields the
//! address directly. Any other outcome reports the error of the PTE walk.
//! Addresses inside 1 GiB pages do not resolve.

use log::debug;
use pmem_addresses::{PhysicalAddress, Size2M, Size4K, VirtualAddress};

use crate::access::PhysMemory;
use crate::root::RootTableSource;
use crate::walker::{TableWalker, WalkError};

impl<P, R> TableWalker<'_, P, R>
where
    P: PhysMemory + ?Sized,
    R: RootTableSource + ?Sized,
{
    /// Translate `va` to the physical address it is mapped to.
    ///
    /// # Errors
    /// The [`WalkError`] from the PTE walk when `va` is neither mapped by a
    /// present PTE nor by a present 2 MiB PDE.
    pub fn resolve(&self, va: VirtualAddress) -> Result<PhysicalAddress, WalkError> {
        let pte_error = match self.pte(va) {
            Ok(pte) => return Ok(pte.entry.frame_base() + va.offset::<Size4K>().as_u64()),
            Err(e) => e,
        };

        match self.pde(va) {
            Ok(pde) if pde.entry.is_large() => {
                Ok(pde.entry.frame_base() + va.offset::<Size2M>().as_u64())
            }
            _ => {
                debug!("vaddr {va} does not resolve: {pte_error}");
                Err(pte_error)
            }
        }
    }
}
