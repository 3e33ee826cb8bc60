//! Interrupt-priority-level primitive used to bracket TLB reads/writes/probes.
//!
//! Grounded on the teacher's `cli`/`sti` wrappers: on the real target these would mask
//! maskable interrupts around the hardware TLB instructions; under `#[cfg(test)]` (no
//! hardware to touch) `raise`/`restore` degrade to a no-op so the same call sequence runs
//! identically on host and target.

/// Opaque saved interrupt state, returned by [`raise`] and consumed by [`restore`].
#[derive(Clone, Copy)]
pub struct Ipl(bool);

cfg_if::cfg_if! {
	if #[cfg(all(target_arch = "x86_64", not(test)))] {
		use core::arch::asm;

		fn is_enabled() -> bool {
			let flags: u64;
			unsafe {
				asm!("pushfq", "pop {}", out(reg) flags);
			}
			flags & 0x200 != 0
		}

		fn cli() {
			unsafe { asm!("cli") };
		}

		fn sti() {
			unsafe { asm!("sti") };
		}

		/// Raises the interrupt priority to the maximum, masking maskable interrupts.
		///
		/// Returns the previous state so [`restore`] can undo exactly this call.
		pub fn raise() -> Ipl {
			let prev = is_enabled();
			cli();
			Ipl(prev)
		}

		/// Restores the interrupt state saved by a matching [`raise`] call.
		pub fn restore(prev: Ipl) {
			if prev.0 {
				sti();
			}
		}
	} else {
		/// Raises the interrupt priority to the maximum. No-op on the host test target.
		pub fn raise() -> Ipl {
			Ipl(false)
		}

		/// Restores the interrupt state saved by a matching [`raise`] call. No-op on the
		/// host test target.
		pub fn restore(_prev: Ipl) {}
	}
}
