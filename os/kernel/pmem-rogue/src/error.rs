use pmem_addresses::{PageSizeClass, PhysicalAddress, VirtualAddress};
use pmem_paging::WalkError;

use crate::vm::VmError;

/// Failure of a rogue mapping or of a transfer built on it.
#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum PmemError {
    #[error(transparent)]
    Walk(#[from] WalkError),
    #[error("physical address {0} is beyond the 52-bit physical address space")]
    AddressOutOfRange(PhysicalAddress),
    #[error("no rogue page available")]
    ResourceExhaustion(#[source] VmError),
    #[error("entry of rogue page {0} does not map a 2M page")]
    NotLargePage(VirtualAddress),
    #[error("rogue page {va} was restored but not released")]
    RestorationFailure {
        va: VirtualAddress,
        #[source]
        source: VmError,
    },
    #[error("copy left {residual} of {requested} bytes unmoved")]
    CopyFault { requested: usize, residual: usize },
    #[error("negative physical offset {0}")]
    NegativeOffset(i64),
    #[error("rogue pages of size {0} are not supported")]
    UnsupportedPageSize(PageSizeClass),
}
