//! The two-level per-process page table (§4.2): an outer array of `N_OUT` entries whose
//! entries lazily own an inner array of `N_IN` entries, translating a VA to a resident
//! frame or a swap-file offset.
//!
//! Resident/swapped/unmapped is modeled as the tagged sum [`PtEntryState`] per the design
//! note in §9, rather than as three parallel fields with an exclusion invariant enforced
//! by convention.

use alloc::{boxed::Box, vec::Vec};

use crate::{
	addr::{PhysAddr, VirtAddr},
	config::{N_IN, N_OUT, PAGE_SIZE},
};

/// The state of one page-table entry.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PtEntryState {
	/// No translation and no swap-file backing.
	Unmapped,
	/// Resident in the given physical frame.
	Resident(PhysAddr),
	/// Swapped out to the given byte offset in the swap file.
	Swapped(i64),
}

impl Default for PtEntryState {
	fn default() -> Self {
		Self::Unmapped
	}
}

struct Inner {
	entries: [PtEntryState; N_IN],
}

impl Inner {
	fn new() -> Box<Self> {
		Box::new(Self {
			entries: [PtEntryState::Unmapped; N_IN],
		})
	}
}

/// Splits a virtual address into (outer index, inner index), per the fixed masks of §3.
/// Equivalent to the reference's 10/10/12 bit split when `N_OUT == N_IN == 1024` and
/// `PAGE_SIZE == 4096`, expressed here as plain division/modulo so it generalizes to any
/// configured fan-out without assuming powers of two line up with bit shifts.
fn split(va: VirtAddr) -> (usize, usize) {
	let page = va.0 / PAGE_SIZE;
	(page / N_IN, page % N_IN)
}

/// A process's page table.
pub struct PageTable {
	outer: Vec<Option<Box<Inner>>>,
}

impl PageTable {
	/// Allocates an empty outer array; all entries invalid (`Unmapped`).
	pub fn new() -> Self {
		Self {
			outer: core::iter::repeat_with(|| None).take(N_OUT).collect(),
		}
	}

	/// Walks the two levels; returns `None` if either level is invalid or the entry is
	/// not resident.
	pub fn get_pa(&self, va: VirtAddr) -> Option<PhysAddr> {
		let (outer_idx, inner_idx) = split(va);
		match self.outer.get(outer_idx)?.as_ref()?.entries[inner_idx] {
			PtEntryState::Resident(pfn) => Some(pfn),
			_ => None,
		}
	}

	/// Returns the swap-file offset recorded for `va`, or `None` if unmapped or resident.
	pub fn get_offset(&self, va: VirtAddr) -> Option<i64> {
		let (outer_idx, inner_idx) = split(va);
		match self.outer.get(outer_idx)?.as_ref()?.entries[inner_idx] {
			PtEntryState::Swapped(off) => Some(off),
			_ => None,
		}
	}

	/// Lazily allocates the inner array if absent, marks the entry resident at `pfn`.
	pub fn set_pa(&mut self, va: VirtAddr, pfn: PhysAddr) {
		let (outer_idx, inner_idx) = split(va);
		let slot = self.outer[outer_idx].get_or_insert_with(Inner::new);
		slot.entries[inner_idx] = PtEntryState::Resident(pfn);
	}

	/// Lazily allocates the inner array if absent, marks the entry swapped at `off`.
	pub fn set_offset(&mut self, va: VirtAddr, off: i64) {
		let (outer_idx, inner_idx) = split(va);
		let slot = self.outer[outer_idx].get_or_insert_with(Inner::new);
		slot.entries[inner_idx] = PtEntryState::Swapped(off);
	}

	/// Marks `va` unmapped, returning the previous state (used on process exit to decide
	/// whether to free a frame or release a swap slot).
	pub fn clear(&mut self, va: VirtAddr) -> PtEntryState {
		let (outer_idx, inner_idx) = split(va);
		let Some(Some(inner)) = self.outer.get_mut(outer_idx) else {
			return PtEntryState::Unmapped;
		};
		core::mem::replace(&mut inner.entries[inner_idx], PtEntryState::Unmapped)
	}

	/// Calls `on_resident` for every currently resident frame, in outer/inner order, then
	/// drops both levels. Swapped entries do not free a frame here; their slot is released
	/// separately by the caller (§4.2).
	pub fn destroy(mut self, mut on_resident: impl FnMut(PhysAddr)) {
		for inner in self.outer.iter_mut().flatten() {
			for entry in inner.entries.iter() {
				if let PtEntryState::Resident(pfn) = entry {
					on_resident(*pfn);
				}
			}
		}
		self.outer.clear();
	}
}

impl Default for PageTable {
	fn default() -> Self {
		Self::new()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn map_unmap_round_trip() {
		let mut pt = PageTable::new();
		let va = VirtAddr(0x00401000);
		pt.set_pa(va, PhysAddr(0x3000));
		assert_eq!(pt.get_pa(va), Some(PhysAddr(0x3000)));
		assert_eq!(pt.get_offset(va), None);
		pt.set_offset(va, 4096);
		assert_eq!(pt.get_pa(va), None);
		assert_eq!(pt.get_offset(va), Some(4096));
	}

	#[test]
	fn unmapped_by_default() {
		let pt = PageTable::new();
		assert_eq!(pt.get_pa(VirtAddr(0x00500000)), None);
		assert_eq!(pt.get_offset(VirtAddr(0x00500000)), None);
	}

	#[test]
	fn destroy_visits_only_resident() {
		let mut pt = PageTable::new();
		pt.set_pa(VirtAddr(0x1000), PhysAddr(0x1000));
		pt.set_offset(VirtAddr(0x2000), 0);
		let mut visited = Vec::new();
		pt.destroy(|pfn| visited.push(pfn));
		assert_eq!(visited, alloc::vec![PhysAddr(0x1000)]);
	}

	#[test]
	fn distinct_outer_slots_stay_independent() {
		let mut pt = PageTable::new();
		let va_a = VirtAddr(0);
		let va_b = VirtAddr(N_IN * PAGE_SIZE);
		pt.set_pa(va_a, PhysAddr(0x1000));
		assert_eq!(pt.get_pa(va_b), None);
	}
}
