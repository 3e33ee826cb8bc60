//! The fault handler (§4.6): the hot path and the only component that synthesizes the
//! coremap, page table, segment loader, swap manager and TLB helper.
//!
//! Grounded on the teacher's `MemSpace::handle_page_fault`, which plays the same
//! orchestrating role (classify the access, find the mapping, resolve it, install the
//! translation) — generalized here to the specification's resident/swapped/cold-miss
//! classification and swap-backed eviction, which the teacher's own hardware-paged design
//! does not need.

use alloc::sync::Arc;

use crate::{
	addr::VirtAddr,
	addrspace::{tlb_tag, AddressSpace},
	coremap,
	error::{VmError, VmResult},
	host::BackingStore,
	pagetable::PtEntryState,
	phys,
	segment::Perm,
	stats,
	stats::Event,
	tlb,
};

/// The classified fault type (§4.6 step 1).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FaultKind {
	Read,
	Write,
	/// A write against a page whose dirty bit is cleared; reported as permission-denied.
	ReadOnly,
}

impl FaultKind {
	/// Decodes the raw fault-type code passed by the host trap handler. Any code other
	/// than the three recognized values is *invalid argument* per §4.6 step 1.
	pub fn from_code(code: u32) -> Option<Self> {
		match code {
			0 => Some(Self::ReadOnly),
			1 => Some(Self::Read),
			2 => Some(Self::Write),
			_ => None,
		}
	}
}

/// Writes one TLB entry for `va` mapped to `pa`, with the dirty (writable) bit set for
/// writable segments and the stack, cleared for read-only/executable text (§4.6 step 7).
fn install_tlb(va: VirtAddr, pa: crate::addr::PhysAddr, perm: Perm) {
	let writable = perm.contains(Perm::WRITE) || perm.contains(Perm::STACK);
	let lo = (pa.0 as u32) | (writable as u32);
	let replaced_valid = tlb::install(tlb_tag(va), lo);
	if replaced_valid {
		stats::inc(Event::TlbFaultReplace);
	} else {
		stats::inc(Event::TlbFaultFree);
	}
}

/// The single entry point for every TLB miss: classifies the fault, resolves the
/// translation (resident hit, swap hit, or cold miss) and installs one TLB entry.
///
/// Recoverable conditions (§7) are returned as `Err`; physical-memory or swap-file
/// exhaustion panics inside the components this function calls, per the fatal/recoverable
/// split of §7.
pub fn vm_fault<S>(code: u32, fault_addr: VirtAddr, asp: &Arc<AddressSpace<S>>) -> VmResult<()>
where
	S: BackingStore + Send + Sync + 'static,
{
	let kind = FaultKind::from_code(code).ok_or(VmError::InvalidFault)?;
	if kind == FaultKind::ReadOnly {
		log::warn!(target: "vmcore", "read-only violation at {fault_addr:?}");
		return Err(VmError::PermissionDenied);
	}
	let write = kind == FaultKind::Write;
	let page_va = fault_addr.page_align_down();

	let Some(perm) = asp.perm_for(page_va) else {
		log::info!(target: "vmcore", "fault at {fault_addr:?} outside every segment");
		return Err(VmError::BadAddress);
	};
	if write && !perm.contains(Perm::WRITE) {
		log::warn!(target: "vmcore", "write fault against read-only segment at {fault_addr:?}");
		return Err(VmError::PermissionDenied);
	}

	match asp.entry_state(page_va) {
		PtEntryState::Resident(pa) => {
			stats::inc(Event::TlbReload);
			stats::inc(Event::TlbFault);
			log::trace!(target: "vmcore", "resident hit at {page_va:?}");
			install_tlb(page_va, pa, perm);
		}
		PtEntryState::Swapped(offset) => {
			let owner: Arc<dyn coremap::FrameOwner> = asp.clone();
			let pa = coremap::page_alloc(Arc::downgrade(&owner), page_va)
				.unwrap_or_else(|| panic!("out of physical memory servicing swap-in at {page_va:?}"));
			let mut page = [0u8; crate::config::PAGE_SIZE];
			crate::swap::swap_in(offset as u64, &mut page);
			phys::write_frame(pa, &page);
			asp.set_resident(page_va, pa);
			stats::inc(Event::PageFaultDisk);
			stats::inc(Event::TlbFault);
			log::info!(target: "vmcore", "swap-in at {page_va:?} from offset {offset}");
			install_tlb(page_va, pa, perm);
		}
		PtEntryState::Unmapped => {
			let owner: Arc<dyn coremap::FrameOwner> = asp.clone();
			let pa = coremap::page_alloc(Arc::downgrade(&owner), page_va)
				.unwrap_or_else(|| panic!("out of physical memory servicing cold fault at {page_va:?}"));
			let is_stack = match asp.load_page(page_va, pa) {
				Ok(is_stack) => is_stack,
				Err(e) => {
					coremap::page_free(pa);
					return Err(e);
				}
			};
			asp.set_resident(page_va, pa);
			if is_stack {
				stats::inc(Event::PageFaultZero);
				log::info!(target: "vmcore", "zero-fill fault at {page_va:?}");
			} else {
				stats::inc(Event::PageFaultDisk);
				log::info!(target: "vmcore", "cold image fault at {page_va:?}");
			}
			stats::inc(Event::TlbFault);
			install_tlb(page_va, pa, perm);
		}
	}
	Ok(())
}

/// `vm_tlbshootdown`: a stub that panics, per the single-CPU baseline of §9 — a
/// multi-CPU extension would require a TLB shootdown IPI and per-CPU cursors.
pub fn vm_tlbshootdown() -> ! {
	panic!("vm_tlbshootdown: multi-CPU TLB shootdown is not supported");
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::{
		addrspace::AddressSpace,
		host::BackingStore,
		segment::{Segment, SegmentKind},
		testutil::{FakeBump, FakePhysMem, FakeStore, FakeTlb},
	};
	use alloc::boxed::Box;

	fn bootstrap(frames: usize, tlb_entries: usize) {
		coremap::shutdown();
		coremap::init(Box::new(FakeBump::new(frames)));
		tlb::shutdown();
		tlb::init(Box::new(FakeTlb::new(tlb_entries)));
		crate::swap::shutdown();
		crate::swap::init(Box::new(FakeStore::new(1 << 20)), 1 << 20);
		crate::phys::shutdown();
		crate::phys::init(Box::new(FakePhysMem::new(frames * crate::config::PAGE_SIZE)));
		stats::reset();
	}

	fn code_addrspace() -> Arc<AddressSpace<FakeStore>> {
		let mut image = FakeStore::new(0x10000);
		for i in 0..0x3000u64 {
			image.write_at(0x1000 + i, &[(i % 251) as u8]);
		}
		let code = Segment {
			vaddr: VirtAddr(0x00400000),
			offset: 0x1000,
			filesz: 0x3000,
			memsz: 0x3000,
			perm: Perm::READ | Perm::EXEC,
			kind: SegmentKind::Image(image),
		};
		let data = Segment {
			vaddr: VirtAddr(0x00500000),
			offset: 0,
			filesz: 0,
			memsz: 0x1000,
			perm: Perm::READ | Perm::WRITE,
			kind: SegmentKind::Image(FakeStore::new(0x10000)),
		};
		let stack = Segment::stack(VirtAddr(0x7FFFB000), 0x5000);
		AddressSpace::create(code, data, stack)
	}

	#[test]
	fn scenario_1_cold_code_fault() {
		bootstrap(16, 8);
		let asp = code_addrspace();
		vm_fault(1, VirtAddr(0x00401000), &asp).unwrap();
		let snap = stats::snapshot();
		assert_eq!(snap.get(Event::ElfFileRead), 1);
		assert_eq!(snap.get(Event::PageFaultDisk), 1);
		assert_eq!(snap.get(Event::TlbFault), 1);
	}

	#[test]
	fn scenario_2_stack_growth() {
		bootstrap(16, 8);
		let asp = code_addrspace();
		vm_fault(1, VirtAddr(0x7FFFE008), &asp).unwrap();
		let snap = stats::snapshot();
		assert_eq!(snap.get(Event::PageFaultZero), 1);
		assert_eq!(snap.get(Event::TlbFault), 1);
	}

	#[test]
	fn scenario_5_readonly_violation() {
		bootstrap(16, 8);
		let asp = code_addrspace();
		let err = vm_fault(2, VirtAddr(0x00400100), &asp).unwrap_err();
		assert_eq!(err, VmError::PermissionDenied);
	}

	#[test]
	fn invalid_fault_code_rejected() {
		bootstrap(16, 8);
		let asp = code_addrspace();
		let err = vm_fault(99, VirtAddr(0x00400100), &asp).unwrap_err();
		assert_eq!(err, VmError::InvalidFault);
	}

	#[test]
	fn bad_address_outside_every_segment() {
		bootstrap(16, 8);
		let asp = code_addrspace();
		let err = vm_fault(1, VirtAddr(0x00000000), &asp).unwrap_err();
		assert_eq!(err, VmError::BadAddress);
	}

	#[test]
	fn resident_hit_counts_as_reload() {
		bootstrap(16, 8);
		let asp = code_addrspace();
		vm_fault(1, VirtAddr(0x00401000), &asp).unwrap();
		stats::reset();
		vm_fault(1, VirtAddr(0x00401000), &asp).unwrap();
		let snap = stats::snapshot();
		assert_eq!(snap.get(Event::TlbReload), 1);
		assert_eq!(snap.get(Event::TlbFault), 1);
	}
}
