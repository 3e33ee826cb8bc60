//! Process-wide access to physical frame contents.
//!
//! Stands in for the direct-mapped kernel window the teacher's `PhysAddr::kernel_to_virtual`
//! provides: the coremap and page table deal purely in physical addresses, and the fault
//! handler and coremap-driven eviction path need a way to actually read or zero a frame's
//! bytes by that address.

use alloc::boxed::Box;

use crate::{addr::PhysAddr, config::PAGE_SIZE, host::PhysMem, sync::Spin};

static PHYS: Spin<Option<Box<dyn PhysMem + Send>>> = Spin::new(None);

/// Installs `mem` as the process-wide physical-memory accessor.
pub fn init(mem: Box<dyn PhysMem + Send>) {
	*PHYS.lock() = Some(mem);
}

/// Removes the active physical-memory accessor.
pub fn shutdown() {
	*PHYS.lock() = None;
}

/// Reads the full contents of the frame at `pa`.
pub fn read_frame(pa: PhysAddr) -> [u8; PAGE_SIZE] {
	let mut buf = [0u8; PAGE_SIZE];
	let guard = PHYS.lock();
	guard
		.as_ref()
		.expect("physical memory accessor not initialized")
		.read_frame(pa, &mut buf);
	buf
}

/// Overwrites the frame at `pa` with `buf`.
pub fn write_frame(pa: PhysAddr, buf: &[u8; PAGE_SIZE]) {
	let mut guard = PHYS.lock();
	guard
		.as_mut()
		.expect("physical memory accessor not initialized")
		.write_frame(pa, buf);
}

/// Zeroes the frame at `pa`.
pub fn zero_frame(pa: PhysAddr) {
	write_frame(pa, &[0u8; PAGE_SIZE]);
}
