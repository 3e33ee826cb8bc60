//! The crate's top-level entry points (§6): `vm_bootstrap`/`vm_shutdown` bring the four
//! singleton subsystems up and down together, and re-export [`fault::vm_fault`] and
//! [`fault::vm_tlbshootdown`] as the two operations the host trap handler calls on every
//! TLB exception.
//!
//! Grounded on the teacher's `kernel_main` boot sequence, which brings up the buddy
//! allocator, then higher subsystems, in a fixed order and tears them down symmetrically at
//! shutdown.

use alloc::boxed::Box;

use crate::{
	config, coremap, host::BackingStore, host::BumpAllocator, host::PhysMem, host::TlbDevice, phys,
	stats, swap, tlb,
};

pub use crate::fault::{vm_fault, vm_tlbshootdown};

/// Brings up the coremap, TLB helper, swap manager and physical-memory accessor, and resets
/// the statistics counters. Must be called once before any call to [`vm_fault`].
pub fn vm_bootstrap(
	bump: Box<dyn BumpAllocator + Send>,
	tlb_device: Box<dyn TlbDevice + Send>,
	swap_store: Box<dyn BackingStore + Send>,
	phys_mem: Box<dyn PhysMem + Send>,
) {
	coremap::init(bump);
	tlb::init(tlb_device);
	swap::init(swap_store, config::SWAP_FILE_SIZE as u64);
	phys::init(phys_mem);
	stats::reset();
	log::info!(target: "vmcore", "vm_bootstrap complete");
}

/// Reports the final statistics (and any violated consistency identity) and tears down
/// every subsystem brought up by [`vm_bootstrap`], in reverse order.
pub fn vm_shutdown() {
	stats::report_at_shutdown();
	phys::shutdown();
	swap::shutdown();
	tlb::shutdown();
	coremap::shutdown();
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::{
		addr::VirtAddr,
		addrspace::AddressSpace,
		segment::{Perm, Segment, SegmentKind},
		testutil::{FakeBump, FakePhysMem, FakeStore, FakeTlb},
	};

	#[test]
	fn bootstrap_then_shutdown_is_idempotent_with_a_fault_in_between() {
		vm_bootstrap(
			Box::new(FakeBump::new(16)),
			Box::new(FakeTlb::new(8)),
			Box::new(FakeStore::new(1 << 16)),
			Box::new(FakePhysMem::new(16 * config::PAGE_SIZE)),
		);

		let code = Segment {
			vaddr: VirtAddr(0x00400000),
			offset: 0,
			filesz: 0,
			memsz: 0x1000,
			perm: Perm::READ | Perm::EXEC,
			kind: SegmentKind::Image(FakeStore::new(0x1000)),
		};
		let data = Segment {
			vaddr: VirtAddr(0x00500000),
			offset: 0,
			filesz: 0,
			memsz: 0x1000,
			perm: Perm::READ | Perm::WRITE,
			kind: SegmentKind::Image(FakeStore::new(0x1000)),
		};
		let stack = Segment::stack(VirtAddr(0x7FFFB000), 0x1000);
		let asp = AddressSpace::create(code, data, stack);
		vm_fault(1, VirtAddr(0x00400000), &asp).unwrap();

		vm_shutdown();
	}
}
