//! Segment descriptors and the per-page image loader (§4.3).
//!
//! Grounded on the shape of the teacher's ELF loader (`process::exec::elf`): a descriptor
//! carries the ELF-style `(offset, vaddr, filesz, memsz, permission)` tuple plus a handle
//! on the backing image, and loading happens one page at a time as faults arrive rather
//! than eagerly at exec time.

use bitflags::bitflags;

use crate::{
	addr::VirtAddr,
	config::PAGE_SIZE,
	error::{VmError, VmResult},
	host::BackingStore,
	stats,
};

bitflags! {
	/// Segment permission bits. The stack carries [`Perm::STACK`] in addition to
	/// `READ | WRITE`.
	#[derive(Clone, Copy, Debug, Eq, PartialEq)]
	pub struct Perm: u8 {
		const READ = 0b0001;
		const WRITE = 0b0010;
		const EXEC = 0b0100;
		const STACK = 0b1000;
	}
}

/// Which image, if any, backs a segment.
pub enum SegmentKind<S> {
	/// Loaded from an executable image on first touch.
	Image(S),
	/// Never backed by an image; faults here are always zero-fill.
	Stack,
}

/// An ELF-style segment descriptor (§3).
pub struct Segment<S> {
	pub vaddr: VirtAddr,
	pub offset: u64,
	pub filesz: u64,
	pub memsz: u64,
	pub perm: Perm,
	pub kind: SegmentKind<S>,
}

impl<S> Segment<S> {
	/// Tells whether `va` falls within `[vaddr, vaddr + memsz)`. A VA exactly at
	/// `vaddr + memsz` belongs to the next segment, not this one (§8 boundary behaviour).
	pub fn contains(&self, va: VirtAddr) -> bool {
		va.0 >= self.vaddr.0 && va.0 < self.vaddr.0 + self.memsz as usize
	}

	/// A synthetic stack segment at `[vaddr, vaddr + memsz)`, always zero-filled.
	pub fn stack(vaddr: VirtAddr, memsz: u64) -> Self {
		Self {
			vaddr,
			offset: 0,
			filesz: 0,
			memsz,
			perm: Perm::READ | Perm::WRITE | Perm::STACK,
			kind: SegmentKind::Stack,
		}
	}
}

impl<S: BackingStore> Segment<S> {
	/// Loads the page of this segment containing `va` into `page`, per the per-page
	/// algorithm of §4.3: the frame is zeroed first so BSS tail bytes and padding are
	/// well-defined, then the overlapping portion of `filesz` is read from the image at
	/// the correct file offset.
	pub fn load_page(&mut self, va: VirtAddr, page: &mut [u8; PAGE_SIZE]) -> VmResult<()> {
		page.fill(0);
		let SegmentKind::Image(store) = &mut self.kind else {
			// Stack segments are never loaded; they are only zero-filled.
			return Ok(());
		};
		let seg_page_base = self.vaddr.page_align_down();
		let base_offset = self.vaddr.page_offset();
		let k = (va.0 - seg_page_base.0) / PAGE_SIZE;

		// Byte range within `seg.filesz` covered by this page, in segment-relative terms.
		let page_start_in_seg = if k == 0 {
			0u64
		} else {
			(k * PAGE_SIZE) as u64 - base_offset as u64
		};
		if page_start_in_seg >= self.filesz {
			// Entirely BSS: the page was already zeroed above.
			return Ok(());
		}
		let dest_start = if k == 0 { base_offset } else { 0 };
		let avail_in_page = PAGE_SIZE - dest_start;
		let remaining_in_file = (self.filesz - page_start_in_seg) as usize;
		let len = avail_in_page.min(remaining_in_file);
		let file_offset = self.offset + page_start_in_seg;

		let n = store.read_at(file_offset, &mut page[dest_start..dest_start + len]);
		stats::inc(stats::Event::ElfFileRead);
		if n < len {
			return Err(VmError::ExecTruncated);
		}
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::testutil::FakeStore;

	#[test]
	fn cold_code_fault_scenario() {
		// Text segment at VA 0x00400000, file offset 0x1000, filesz 0x3000, memsz 0x3000.
		let mut image = FakeStore::new(0x10000);
		for i in 0..0x3000u64 {
			image.write_at(0x1000 + i, &[(i % 251) as u8]);
		}
		let mut seg = Segment {
			vaddr: VirtAddr(0x00400000),
			offset: 0x1000,
			filesz: 0x3000,
			memsz: 0x3000,
			perm: Perm::READ | Perm::EXEC,
			kind: SegmentKind::Image(image),
		};
		let mut page = [0u8; PAGE_SIZE];
		seg.load_page(VirtAddr(0x00401000), &mut page).unwrap();
		// Bytes [0x2000, 0x3000) of the image are copied into the fault page.
		for i in 0..PAGE_SIZE {
			let expected = ((0x2000 + i) % 251) as u8;
			assert_eq!(page[i], expected);
		}
	}

	#[test]
	fn short_read_is_truncated() {
		let image = FakeStore::new(4); // much shorter than filesz below
		let mut seg = Segment {
			vaddr: VirtAddr(0x00400000),
			offset: 0,
			filesz: PAGE_SIZE as u64,
			memsz: PAGE_SIZE as u64,
			perm: Perm::READ,
			kind: SegmentKind::Image(image),
		};
		let mut page = [0u8; PAGE_SIZE];
		let err = seg.load_page(VirtAddr(0x00400000), &mut page).unwrap_err();
		assert_eq!(err, VmError::ExecTruncated);
	}

	#[test]
	fn boundary_va_belongs_to_next_segment() {
		let seg: Segment<FakeStore> = Segment::stack(VirtAddr(0x7FFFB000), 0x5000);
		assert!(seg.contains(VirtAddr(0x7FFFB000)));
		assert!(!seg.contains(VirtAddr(0x80000000)));
	}
}
