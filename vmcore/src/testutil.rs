//! Host-side fakes for the traits in [`crate::host`], used only by `#[cfg(test)]` module
//! tests throughout the crate. None of these are wired into a real kernel; they exist so
//! the coremap, swap manager, TLB helper and segment loader can be exercised without
//! hardware.

use alloc::{boxed::Box, vec, vec::Vec};

use crate::{
	addr::PhysAddr,
	config::PAGE_SIZE,
	host::{BackingStore, BumpAllocator, PhysMem, TlbDevice, TlbEntry},
};

/// A bump allocator over `n` frames, frame 0 already consumed by the coremap's own
/// reserved `Fixed` frame.
pub struct FakeBump {
	total: usize,
	next: usize,
}

impl FakeBump {
	pub fn new(total: usize) -> Self {
		Self { total, next: 1 }
	}
}

impl BumpAllocator for FakeBump {
	fn ram_getsize(&self) -> usize {
		self.total
	}

	fn ram_stealmem(&mut self, n: usize) -> Option<PhysAddr> {
		if self.next + n > self.total {
			return None;
		}
		let start = self.next;
		self.next += n;
		Some(PhysAddr(start * PAGE_SIZE))
	}
}

/// A growable in-memory byte store standing in for an executable image or the swap file.
#[derive(Clone)]
pub struct FakeStore {
	bytes: Vec<u8>,
}

impl FakeStore {
	pub fn new(len: usize) -> Self {
		Self { bytes: vec![0u8; len] }
	}
}

impl BackingStore for FakeStore {
	fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> usize {
		let offset = offset as usize;
		if offset >= self.bytes.len() {
			return 0;
		}
		let n = buf.len().min(self.bytes.len() - offset);
		buf[..n].copy_from_slice(&self.bytes[offset..offset + n]);
		n
	}

	fn write_at(&mut self, offset: u64, buf: &[u8]) {
		let offset = offset as usize;
		if offset + buf.len() > self.bytes.len() {
			self.bytes.resize(offset + buf.len(), 0);
		}
		self.bytes[offset..offset + buf.len()].copy_from_slice(buf);
	}
}

/// A software TLB device: a flat array of entries, invalid by default.
pub struct FakeTlb {
	entries: Vec<TlbEntry>,
}

impl FakeTlb {
	pub fn new(n: usize) -> Self {
		Self {
			entries: vec![TlbEntry::default(); n],
		}
	}
}

impl TlbDevice for FakeTlb {
	fn len(&self) -> usize {
		self.entries.len()
	}

	fn read(&self, index: usize) -> TlbEntry {
		self.entries[index]
	}

	fn write(&mut self, index: usize, entry: TlbEntry) {
		self.entries[index] = entry;
	}

	fn probe(&self, hi: u32) -> Option<usize> {
		self.entries.iter().position(|e| e.valid && e.hi == hi)
	}
}

/// Flat physical memory backing [`crate::phys`] in tests: `frames` contiguous page-sized
/// buffers indexed by physical frame number.
pub struct FakePhysMem {
	bytes: Vec<u8>,
}

impl FakePhysMem {
	pub fn new(total_bytes: usize) -> Self {
		Self {
			bytes: vec![0u8; total_bytes],
		}
	}
}

impl PhysMem for FakePhysMem {
	fn read_frame(&self, pa: PhysAddr, buf: &mut [u8]) {
		buf.copy_from_slice(&self.bytes[pa.0..pa.0 + buf.len()]);
	}

	fn write_frame(&mut self, pa: PhysAddr, buf: &[u8]) {
		self.bytes[pa.0..pa.0 + buf.len()].copy_from_slice(buf);
	}
}

/// Convenience constructor used by tests that only need `vmcore::phys` initialized, not a
/// full bootstrap.
pub fn fake_phys(frames: usize) -> Box<dyn PhysMem + Send> {
	Box::new(FakePhysMem::new(frames * PAGE_SIZE))
}
