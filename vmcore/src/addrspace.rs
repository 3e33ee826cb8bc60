//! Address spaces (§3): three segments (code, data, stack) plus a page table, and the
//! owner of every frame referenced by that table.
//!
//! Grounded on the teacher's `process::mem_space::MemSpace`: a lock-protected model struct
//! with a `handle_page_fault` entry point and explicit `bind`/fork operations. Simplified
//! here to the specification's fixed three-segment layout (no dynamic `mmap`/gap tracking,
//! which the Non-goals of §1 exclude).

use alloc::sync::{Arc, Weak};

use crate::{
	addr::{PhysAddr, VirtAddr},
	coremap::FrameOwner,
	host::BackingStore,
	pagetable::{PageTable, PtEntryState},
	phys, segment,
	segment::Segment,
	stats,
	sync::Spin,
	tlb,
};

/// Which of the three fixed segments a VA belongs to.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SegmentId {
	Code,
	Data,
	Stack,
}

/// Which of the two image-backed regions `as_define_region` is filling in (the stack is
/// set up separately by `as_define_stack`, per the reference source's `seg_n` parameter).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RegionKind {
	Code,
	Data,
}

struct Segments<S> {
	code: Option<Segment<S>>,
	data: Option<Segment<S>>,
	stack: Option<Segment<S>>,
}

impl<S> Segments<S> {
	fn empty() -> Self {
		Self {
			code: None,
			data: None,
			stack: None,
		}
	}

	fn find(&mut self, va: VirtAddr) -> Option<(SegmentId, &mut Segment<S>)> {
		if let Some(s) = self.code.as_mut().filter(|s| s.contains(va)) {
			Some((SegmentId::Code, s))
		} else if let Some(s) = self.data.as_mut().filter(|s| s.contains(va)) {
			Some((SegmentId::Data, s))
		} else if let Some(s) = self.stack.as_mut().filter(|s| s.contains(va)) {
			Some((SegmentId::Stack, s))
		} else {
			None
		}
	}
}

/// A process's virtual memory context: three segments and a page table.
pub struct AddressSpace<S> {
	segments: Spin<Segments<S>>,
	page_table: Spin<PageTable>,
}

impl<S: BackingStore> AddressSpace<S> {
	/// `as_create`: allocates a fresh address space with an empty page table and no
	/// segments defined yet. Callers fill in the code/data regions with
	/// [`AddressSpace::define_region`] and the stack with [`AddressSpace::define_stack`]
	/// before the first fault, mirroring the reference source's `as_create` (which
	/// likewise returns an address space whose three segments are not yet populated).
	pub fn as_create() -> Arc<Self> {
		Arc::new(Self {
			segments: Spin::new(Segments::empty()),
			page_table: Spin::new(PageTable::new()),
		})
	}

	/// `as_define_region`: registers the code or data segment's `(offset, vaddr, filesz,
	/// memsz, perm)` tuple. Called once per region (`seg_n` 0 and 1 in the reference
	/// source's `as_define_region`).
	pub fn define_region(&self, which: RegionKind, seg: Segment<S>) {
		let mut segs = self.segments.lock();
		match which {
			RegionKind::Code => segs.code = Some(seg),
			RegionKind::Data => segs.data = Some(seg),
		}
	}

	/// `as_define_stack`: registers the stack segment and returns the initial user-level
	/// stack pointer, the top of the stack's address range (the reference source's fixed
	/// `USERSTACK` constant, generalized to the configured segment's own top instead of a
	/// single hardwired address).
	pub fn define_stack(&self, seg: Segment<S>) -> VirtAddr {
		let top = seg.vaddr + seg.memsz as usize;
		self.segments.lock().stack = Some(seg);
		top
	}

	/// `as_prepare_load`: brackets the start of image loading. A no-op here, matching the
	/// reference source's own `as_prepare_load` (`(void)as; return 0;`) — this core's
	/// segment loader writes frame contents directly rather than through a user-visible
	/// write fault, so there is no temporary-writability state to establish.
	pub fn prepare_load(&self) {
		log::trace!(target: "vmcore", "as_prepare_load");
	}

	/// `as_complete_load`: brackets the end of image loading. A no-op here for the same
	/// reason as [`AddressSpace::prepare_load`].
	pub fn complete_load(&self) {
		log::trace!(target: "vmcore", "as_complete_load");
	}

	/// Convenience constructor combining `as_create` with two `as_define_region` calls
	/// and one `as_define_stack` call, for callers (and tests) that already have all
	/// three segments in hand up front.
	pub fn create(code: Segment<S>, data: Segment<S>, stack: Segment<S>) -> Arc<Self> {
		let asp = Self::as_create();
		asp.define_region(RegionKind::Code, code);
		asp.define_region(RegionKind::Data, data);
		asp.define_stack(stack);
		asp
	}

	/// `as_copy`: deep-copies the segment descriptors but gives the child a fresh, empty
	/// page table (§9's resolution of the `as_copy` ambiguity) — faults in the child
	/// re-populate pages from the image rather than aliasing the parent's frames.
	pub fn copy(&self) -> Arc<Self>
	where
		S: Clone,
	{
		let segs = self.segments.lock();
		Arc::new(Self {
			segments: Spin::new(Segments {
				code: segs.code.as_ref().map(Segment::clone_descriptor),
				data: segs.data.as_ref().map(Segment::clone_descriptor),
				stack: segs.stack.as_ref().map(Segment::clone_descriptor),
			}),
			page_table: Spin::new(PageTable::new()),
		})
	}

	/// `as_activate`: sweeps the TLB so no stale translation from a previous address
	/// space is visible.
	pub fn activate(&self) {
		tlb::invalidate_all();
	}

	/// `as_deactivate`: sweeps the TLB before switching away.
	pub fn deactivate(&self) {
		tlb::invalidate_all();
	}

	/// `as_get_segment`: returns which segment, if any, owns `va`.
	pub fn segment_for(&self, va: VirtAddr) -> Option<SegmentId> {
		self.segments.lock().find(va).map(|(id, _)| id)
	}

	/// Returns the permission bits of the segment owning `va`, if any.
	pub fn perm_for(&self, va: VirtAddr) -> Option<segment::Perm> {
		self.segments.lock().find(va).map(|(_, s)| s.perm)
	}

	/// Loads the page containing `va` from its owning segment's image (or zero-fills it
	/// for the stack) into `pa`. Returns `Err` on a truncated image read (§4.3).
	pub fn load_page(&self, va: VirtAddr, pa: PhysAddr) -> crate::error::VmResult<bool> {
		let mut segs = self.segments.lock();
		let Some((id, seg)) = segs.find(va) else {
			return Err(crate::error::VmError::BadAddress);
		};
		let is_stack = id == SegmentId::Stack;
		let page_va = va.page_align_down();
		let mut page = phys::read_frame(pa);
		seg.load_page(page_va, &mut page)?;
		phys::write_frame(pa, &page);
		Ok(is_stack)
	}

	/// Consults the page table for `va`.
	pub fn entry_state(&self, va: VirtAddr) -> PtEntryState {
		let pt = self.page_table.lock();
		pt.get_pa(va)
			.map(PtEntryState::Resident)
			.or_else(|| pt.get_offset(va).map(PtEntryState::Swapped))
			.unwrap_or(PtEntryState::Unmapped)
	}

	/// Installs a resident translation for `va`.
	pub fn set_resident(&self, va: VirtAddr, pa: PhysAddr) {
		self.page_table.lock().set_pa(va, pa);
	}

	/// Marks `va` swapped at `offset`.
	pub fn set_swapped(&self, va: VirtAddr, offset: i64) {
		self.page_table.lock().set_offset(va, offset);
	}

	/// `as_destroy`: frees every resident frame and drops the page table. The caller
	/// supplies the frame-free callback (normally [`crate::coremap::page_free`]) so this
	/// module does not need to depend on the coremap directly.
	pub fn destroy(self: Arc<Self>, mut free_frame: impl FnMut(PhysAddr)) {
		let Ok(this) = Arc::try_unwrap(self) else {
			panic!("as_destroy: address space still referenced elsewhere");
		};
		this.page_table.into_inner().destroy(&mut free_frame);
	}
}

impl<S: BackingStore + Send + Sync + 'static> FrameOwner for AddressSpace<S> {
	fn evict(&self, vaddr: VirtAddr, pa: PhysAddr) {
		// (i) write the victim frame to swap.
		let data = phys::read_frame(pa);
		let offset = crate::swap::swap_out(&data);
		// (ii) update the owner's page table to (pfn=PFN_NONE, swap_offset=slot).
		self.page_table.lock().set_offset(vaddr, offset as i64);
		// (iii) remove any TLB entry referencing the victim.
		tlb::remove_by_tag(tlb_tag(vaddr));
		stats::inc(stats::Event::TlbInvalidate);
	}
}

/// Maps a VA to the tag used to address it in the TLB. Kept as a free function (rather
/// than on [`AddressSpace`]) since the TLB is a single global device reflecting only the
/// currently active address space, per the single-CPU assumption of §9.
pub fn tlb_tag(va: VirtAddr) -> u32 {
	(va.0 / crate::config::PAGE_SIZE) as u32
}

impl<S> Segment<S> {
	fn clone_descriptor(&self) -> Segment<S>
	where
		S: Clone,
	{
		Segment {
			vaddr: self.vaddr,
			offset: self.offset,
			filesz: self.filesz,
			memsz: self.memsz,
			perm: self.perm,
			kind: match &self.kind {
				segment::SegmentKind::Image(s) => segment::SegmentKind::Image(s.clone()),
				segment::SegmentKind::Stack => segment::SegmentKind::Stack,
			},
		}
	}
}

/// A weak, non-owning reference to an address space, used by the coremap to look up the
/// owner of a `Dirty` frame without keeping it alive (§9's "weak reference" design note).
pub type WeakAddressSpace<S> = Weak<AddressSpace<S>>;

#[cfg(test)]
mod tests {
	use super::*;
	use crate::testutil::FakeStore;

	fn make() -> Arc<AddressSpace<FakeStore>> {
		let code = Segment {
			vaddr: VirtAddr(0x00400000),
			offset: 0x1000,
			filesz: 0x3000,
			memsz: 0x3000,
			perm: segment::Perm::READ | segment::Perm::EXEC,
			kind: segment::SegmentKind::Image(FakeStore::new(0x10000)),
		};
		let data = Segment {
			vaddr: VirtAddr(0x00500000),
			offset: 0x4000,
			filesz: 0x1000,
			memsz: 0x2000,
			perm: segment::Perm::READ | segment::Perm::WRITE,
			kind: segment::SegmentKind::Image(FakeStore::new(0x10000)),
		};
		let stack = Segment::stack(VirtAddr(0x7FFFB000), 0x5000);
		AddressSpace::create(code, data, stack)
	}

	#[test]
	fn segment_lookup() {
		let asp = make();
		assert_eq!(asp.segment_for(VirtAddr(0x00401000)), Some(SegmentId::Code));
		assert_eq!(asp.segment_for(VirtAddr(0x00500abc)), Some(SegmentId::Data));
		assert_eq!(asp.segment_for(VirtAddr(0x7FFFE008)), Some(SegmentId::Stack));
		assert_eq!(asp.segment_for(VirtAddr(0x00000000)), None);
	}

	#[test]
	fn incremental_definition_matches_eager_create() {
		let asp: Arc<AddressSpace<FakeStore>> = AddressSpace::as_create();
		assert_eq!(asp.segment_for(VirtAddr(0x00401000)), None);
		asp.define_region(
			RegionKind::Code,
			Segment {
				vaddr: VirtAddr(0x00400000),
				offset: 0x1000,
				filesz: 0x3000,
				memsz: 0x3000,
				perm: segment::Perm::READ | segment::Perm::EXEC,
				kind: segment::SegmentKind::Image(FakeStore::new(0x10000)),
			},
		);
		let top = asp.define_stack(Segment::stack(VirtAddr(0x7FFFB000), 0x5000));
		asp.prepare_load();
		asp.complete_load();
		assert_eq!(top, VirtAddr(0x80000000));
		assert_eq!(asp.segment_for(VirtAddr(0x00401000)), Some(SegmentId::Code));
		assert_eq!(asp.segment_for(VirtAddr(0x7FFFE008)), Some(SegmentId::Stack));
	}

	#[test]
	fn copy_has_empty_page_table() {
		let asp = make();
		asp.set_resident(VirtAddr(0x00401000), PhysAddr(0x3000));
		let child = asp.copy();
		assert_eq!(child.entry_state(VirtAddr(0x00401000)), PtEntryState::Unmapped);
		assert_eq!(
			asp.entry_state(VirtAddr(0x00401000)),
			PtEntryState::Resident(PhysAddr(0x3000))
		);
	}
}
