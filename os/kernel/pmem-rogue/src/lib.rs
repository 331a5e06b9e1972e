//! # Rogue-Page Physical Memory Access
//!
//! Reads and writes arbitrary physical memory without an identity map of RAM.
//! For every page touched, one page of kernel virtual memory is borrowed and
//! its paging entry is temporarily pointed at the physical page of interest.
//!
//! ```text
//!  PmemDevice::read/write
//!        │
//!        ▼
//!  TransferEngine ──► RogueMapper ──► TableWalker ──► PhysMemory
//!        │                 │
//!        ▼                 ▼
//!  TransferCursor      KernelVm (reserve, touch, invlpg, release)
//! ```
//!
//! The host kernel provides three things:
//! - [`PhysMemory`]: 64-bit loads and stores by physical address.
//! - [`RootTableSource`]: the CR3 value naming the active PML4.
//! - [`KernelVm`]: page reservation and release.
//!
//! Nothing here checks whether a physical range is RAM. Reading device
//! memory through a rogue page has whatever side effects the device gives it.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

mod config;
mod cursor;
mod device;
mod error;
mod mapping;
mod transfer;
mod vm;

pub use crate::config::PmemConfig;
pub use crate::cursor::{ReadCursor, TransferCursor, WriteCursor};
pub use crate::device::{DeviceError, PmemDevice};
pub use crate::error::PmemError;
pub use crate::mapping::{RogueMapper, RogueMapping};
pub use crate::transfer::TransferEngine;
pub use crate::vm::{KernelVm, VmError};

pub use pmem_paging::{PhysMemory, RootTableError, RootTableSource, WalkError};
