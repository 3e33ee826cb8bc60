//! The crate-wide recoverable-error type.
//!
//! Only conditions that a caller can meaningfully react to are represented here (§7 of
//! the specification). Conditions that indicate physical-memory or swap-space exhaustion,
//! or a violated internal invariant, are unrecoverable and are raised with `panic!`
//! directly at the call site rather than threaded through this type.

use core::fmt;

/// A recoverable error surfaced from [`crate::fault::vm_fault`] or one of the components
/// it calls into.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum VmError {
	/// The fault type was neither `READ` nor `WRITE`.
	InvalidFault,
	/// A write was attempted against a page without write permission.
	PermissionDenied,
	/// No segment in the active address space contains the faulting address, or there is
	/// no active process/address space at all.
	BadAddress,
	/// A segment read from the executable image returned fewer bytes than expected.
	ExecTruncated,
}

impl fmt::Display for VmError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let msg = match self {
			Self::InvalidFault => "invalid fault type",
			Self::PermissionDenied => "permission denied",
			Self::BadAddress => "bad address",
			Self::ExecTruncated => "executable truncated",
		};
		f.write_str(msg)
	}
}

/// Convenience alias for results returned by the VM core's public entry points.
pub type VmResult<T> = Result<T, VmError>;
