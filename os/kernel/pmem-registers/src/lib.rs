//! # Typed `x86_64` Registers and TLB Primitives
//!
//! The rogue-page machinery needs exactly two pieces of privileged CPU state:
//! the [`Cr3`] value naming the active PML4, and the `invlpg` instruction to
//! drop a single stale translation after an entry has been rewritten.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

pub mod cr3;
pub mod tlb;

pub use crate::cr3::Cr3;

pub trait LoadRegisterUnsafe {
    /// # Safety
    /// The caller must uphold the implementation-specific safety requirements.
    /// For example, the register access might be privileged and require kernel mode (Ring 0).
    unsafe fn load_unsafe() -> Self;
}
