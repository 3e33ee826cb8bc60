//! The software TLB helper (§4.5): a thin layer over `tlb_read`/`tlb_write`/`tlb_probe`
//! with round-robin replacement, run under raised interrupt priority (§5).
//!
//! No example in the reference pack implements a software-refilled TLB (the x86-family
//! kernels there all walk hardware page tables); this module is built directly from
//! §4.5/§5, reusing the crate's own [`crate::sync::IntSpin`] for the IPL-bracketed
//! singleton idiom established by [`crate::coremap`] and [`crate::swap`].

use alloc::boxed::Box;

use crate::{
	host::{TlbDevice, TlbEntry},
	stats,
	sync::IntSpin,
};

struct TlbState {
	device: Box<dyn TlbDevice + Send>,
	/// Round-robin cursor over the device's slots.
	cursor: usize,
}

static TLB: IntSpin<Option<TlbState>> = IntSpin::new(None);

/// Installs `device` as the active TLB.
pub fn init(device: Box<dyn TlbDevice + Send>) {
	let mut guard = TLB.lock();
	*guard = Some(TlbState { device, cursor: 0 });
}

/// Removes the active TLB device.
pub fn shutdown() {
	*TLB.lock() = None;
}

/// Rewrites every slot with an invalid entry. Called on address-space activation and
/// deactivation so no stale entry from the outgoing process is visible to the incoming
/// one.
pub fn invalidate_all() {
	let mut guard = TLB.lock();
	let state = guard.as_mut().expect("tlb not initialized");
	let n = state.device.len();
	for i in 0..n {
		state.device.write(i, TlbEntry::default());
	}
	state.cursor = 0;
	stats::inc(stats::Event::TlbInvalidate);
}

/// Probes for `hi` in the active address space; if present, invalidates the slot.
/// Returns `false` if no matching entry was found (the reference's `-1`/"no current
/// address space" case collapses to "nothing to remove" at this layer).
pub fn remove_by_tag(hi: u32) -> bool {
	let mut guard = TLB.lock();
	let state = guard.as_mut().expect("tlb not initialized");
	let Some(index) = state.device.probe(hi) else {
		return false;
	};
	state.device.write(index, TlbEntry::default());
	true
}

/// Installs one translation, choosing the victim slot by round-robin. Returns whether the
/// overwritten slot had previously held a valid entry (a "replace" rather than a
/// "free-slot fill", for the caller's statistics bookkeeping per §4.6 step 7).
pub fn install(hi: u32, lo: u32) -> bool {
	let mut guard = TLB.lock();
	let state = guard.as_mut().expect("tlb not initialized");
	let n = state.device.len();
	let index = state.cursor;
	state.cursor = (state.cursor + 1) % n;
	let prev = state.device.read(index);
	state.device.write(
		index,
		TlbEntry {
			hi,
			lo,
			valid: true,
		},
	);
	prev.valid
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::testutil::FakeTlb;

	fn setup(entries: usize) {
		shutdown();
		init(Box::new(FakeTlb::new(entries)));
	}

	#[test]
	fn invalidate_all_clears_valid_bit() {
		setup(4);
		install(1, 0x1000);
		install(2, 0x2000);
		invalidate_all();
		let guard = TLB.lock();
		let state = guard.as_ref().unwrap();
		for i in 0..state.device.len() {
			assert!(!state.device.read(i).valid);
		}
	}

	#[test]
	fn first_fill_is_not_a_replace() {
		setup(2);
		assert!(!install(1, 0x1000));
	}

	#[test]
	fn wrap_around_replaces() {
		setup(2);
		install(1, 0x1000);
		install(2, 0x2000);
		// Third install wraps to slot 0, which was valid: a replace.
		assert!(install(3, 0x3000));
	}
}
