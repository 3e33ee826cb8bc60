//! Demand-paged virtual memory core for a teaching kernel with a software-managed TLB.
//!
//! This crate implements the coupled set of subsystems that turn a user virtual address
//! into a physical frame on demand: a physical-frame allocator (the coremap), a two-level
//! per-process page table, a software TLB refill path, a fixed-size swap-file manager and
//! a segment loader that fills pages from an executable image. [`fault::vm_fault`] is the
//! single entry point that ties all of them together on every TLB miss.
//!
//! The host kernel is modeled through narrow traits (see [`host`]) so the core can be
//! exercised on any target, including a plain host build under `#[cfg(test)]`.

#![cfg_attr(not(test), no_std)]
#![deny(unsafe_op_in_unsafe_fn)]

extern crate alloc;

/// Build-time-resolved tunables (page geometry, table fan-out, swap file size, ...).
pub mod config {
	include!(concat!(env!("OUT_DIR"), "/config.rs"));
}

pub mod addr;
pub mod addrspace;
pub mod coremap;
pub mod error;
pub mod fault;
pub mod host;
pub mod pagetable;
pub mod phys;
pub mod segment;
pub mod stats;
pub mod swap;
pub mod sync;
pub mod tlb;
pub mod vm;

#[cfg(test)]
mod testutil;

pub use error::VmError;
pub use vm::{vm_bootstrap, vm_fault, vm_shutdown, vm_tlbshootdown};
