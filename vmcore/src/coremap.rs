//! The physical-frame allocator (§4.1): one [`Frame`] entry per physical page of RAM,
//! handing frames to kernel and user code and choosing eviction victims under pressure.
//!
//! Grounded on the teacher's `memory::buddy` allocator: a single lock-protected array
//! singleton, narrow module-level functions, and struct layouts sized to fit in as few
//! words as practical. The victim-selection and eviction-ordering policy itself has no
//! buddy-allocator analogue (a buddy allocator never evicts) and is built directly from
//! §4.1/§4.6 of the specification.

use alloc::{boxed::Box, sync::Weak, vec::Vec};

use vmcore_macros::instrument;

use crate::{
	addr::{PhysAddr, VirtAddr, PFN_NONE},
	config::PAGE_SIZE,
	host::BumpAllocator,
	stats,
	sync::Spin,
};

/// The lifecycle state of one physical frame (§3).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FrameStatus {
	/// Kernel-owned, non-evictable.
	Fixed,
	/// Previously used, returnable without stealing.
	Free,
	/// Assigned to a user page.
	Dirty,
	/// Never handed out; reachable only through `steal_ram`.
	Clean,
}

/// An address space (or other owner) that can be asked to evict one of its resident
/// pages. Implemented by [`crate::addrspace::AddressSpace`]; kept as a trait here so the
/// coremap does not depend on the concrete address-space type, only on a weak handle
/// satisfying the three-step eviction ordering of §4.6.
pub trait FrameOwner: Send + Sync {
	/// Evicts the resident page mapped at `vaddr` onto frame `pa`: writes the frame to
	/// swap, flips the owning page-table entry to swapped, and invalidates any TLB entry
	/// referencing `vaddr`, in that order (§4.6's ordering rule). Must not touch the
	/// coremap; the caller relabels the frame once this returns.
	fn evict(&self, vaddr: VirtAddr, pa: PhysAddr);
}

#[derive(Clone)]
struct Frame {
	status: FrameStatus,
	owner: Option<Weak<dyn FrameOwner>>,
	vaddr: VirtAddr,
	/// Non-zero only on the first frame of a contiguous kernel allocation.
	alloc_size: usize,
}

impl Frame {
	const fn clean() -> Self {
		Self {
			status: FrameStatus::Clean,
			owner: None,
			vaddr: VirtAddr(0),
			alloc_size: 0,
		}
	}
}

struct CoremapState {
	frames: Vec<Frame>,
	/// Round-robin cursor for victim selection, never allowed to rest on index 0.
	current_victim: usize,
}

impl CoremapState {
	fn frame_addr(&self, index: usize) -> PhysAddr {
		PhysAddr(index * PAGE_SIZE)
	}

	fn free_count(&self) -> usize {
		self.frames
			.iter()
			.filter(|f| f.status == FrameStatus::Free)
			.count()
	}
}

static FREEMEM: Spin<Option<CoremapState>> = Spin::new(None);
static STEALMEM: Spin<Option<Box<dyn BumpAllocator + Send>>> = Spin::new(None);

/// Initializes the coremap over `bump.ram_getsize()` frames. Frame 0 is reserved `Fixed`
/// at boot (it is never chosen as a victim, §3) and the rest start out `Clean`.
pub fn init(bump: Box<dyn BumpAllocator + Send>) {
	let n = bump.ram_getsize();
	let mut frames = Vec::with_capacity(n);
	frames.push(Frame {
		status: FrameStatus::Fixed,
		owner: None,
		vaddr: VirtAddr(0),
		alloc_size: 1,
	});
	frames.resize(n, Frame::clean());
	*FREEMEM.lock() = Some(CoremapState {
		frames,
		current_victim: 1,
	});
	*STEALMEM.lock() = Some(bump);
	stats::mem_info_init(n, 0);
	log::info!(target: "vmcore", "coremap initialized with {n} frames");
}

/// Tears down the coremap singleton. Exposed so tests can reset state between cases.
pub fn shutdown() {
	*FREEMEM.lock() = None;
	*STEALMEM.lock() = None;
}

/// Steals `n` contiguous never-before-used frames from the host bump allocator and marks
/// them in the coremap, returning the index of the first one.
fn steal_ram(n: usize) -> Option<usize> {
	let mut steal = STEALMEM.lock();
	let pa = steal.as_mut()?.ram_stealmem(n)?;
	Some(pa.0 / PAGE_SIZE)
}

/// Finds a run of exactly `n` contiguous `Free` frames, if one exists.
fn find_free_run(frames: &[Frame], n: usize) -> Option<usize> {
	let mut run_start = None;
	let mut run_len = 0;
	for (i, f) in frames.iter().enumerate().skip(1) {
		if f.status == FrameStatus::Free {
			if run_len == 0 {
				run_start = Some(i);
			}
			run_len += 1;
			if run_len == n {
				return run_start;
			}
		} else {
			run_len = 0;
		}
	}
	None
}

/// Advances the round-robin cursor to find `n` contiguous evictable (non-`Fixed`,
/// non-`Clean`) frames, skipping frame 0, wrapping at most once. Returns the index of the
/// first frame in the run and leaves `current_victim` pointing at the frame after it.
fn find_victim_run(state: &mut CoremapState, n: usize) -> Option<usize> {
	let total = state.frames.len();
	let mut run_start = None;
	let mut run_len = 0;
	let mut visited = 0;
	let mut i = state.current_victim.max(1);
	while visited < total {
		let eligible = !matches!(
			state.frames[i].status,
			FrameStatus::Fixed | FrameStatus::Clean
		);
		if eligible {
			if run_len == 0 {
				run_start = Some(i);
			}
			run_len += 1;
			if run_len == n {
				state.current_victim = if i + 1 >= total { 1 } else { i + 1 };
				return run_start;
			}
		} else {
			run_len = 0;
		}
		i = if i + 1 >= total { 1 } else { i + 1 };
		visited += 1;
	}
	None
}

/// A frame selected for eviction, snapshotted while `FREEMEM` is held so the owner's
/// swap-out I/O can run with the lock released (§4.1/§5: frame I/O is performed with
/// locks released, and no spinlock may be held across it).
struct Victim {
	index: usize,
	vaddr: VirtAddr,
	pa: PhysAddr,
	owner: Option<Weak<dyn FrameOwner>>,
}

/// Finds `n` contiguous free-or-stealable frames, or, failing that, `n` contiguous
/// eviction victims. Returns the index of the first frame in the run, or `None` if
/// physical memory is exhausted (fatal per §7; this function itself does not panic).
///
/// The eviction path snapshots each victim's `(vaddr, pa, owner)` under `FREEMEM`, drops
/// the guard, calls each owner's `evict` (which performs swap-out I/O) with no coremap
/// lock held, then re-acquires `FREEMEM` only to relabel the victims `Free` — this avoids
/// the coremap→swap lock nesting §5 forbids.
fn find_or_evict_run(n: usize) -> Option<usize> {
	{
		let mut guard = FREEMEM.lock();
		let state = guard.as_mut().expect("coremap not initialized");
		if let Some(start) = find_free_run(&state.frames, n) {
			return Some(start);
		}
	}
	if let Some(start) = steal_ram(n) {
		return Some(start);
	}
	let victims = {
		let mut guard = FREEMEM.lock();
		let state = guard.as_mut().expect("coremap not initialized");
		let start = find_victim_run(state, n)?;
		(start..start + n)
			.map(|i| {
				let f = &state.frames[i];
				Victim {
					index: i,
					vaddr: f.vaddr,
					pa: state.frame_addr(i),
					owner: (f.status == FrameStatus::Dirty)
						.then(|| f.owner.clone())
						.flatten(),
				}
			})
			.collect::<Vec<_>>()
	};
	for v in &victims {
		if let Some(owner) = v.owner.as_ref().and_then(Weak::upgrade) {
			owner.evict(v.vaddr, v.pa);
		}
	}
	let mut guard = FREEMEM.lock();
	let state = guard.as_mut().expect("coremap not initialized");
	for v in &victims {
		let f = &mut state.frames[v.index];
		f.status = FrameStatus::Free;
		f.owner = None;
		f.vaddr = VirtAddr(0);
		f.alloc_size = 0;
	}
	Some(victims[0].index)
}

/// Allocates `n` contiguous `Fixed` frames for kernel use and returns the physical
/// address of the first one, or `None` if physical memory is exhausted (fatal per §7;
/// callers are expected to panic on `None`, this function itself does not).
#[instrument(name = "alloc_kpages")]
pub fn alloc_kpages(n: usize) -> Option<PhysAddr> {
	assert!(n > 0);
	let start = find_or_evict_run(n)?;
	let mut guard = FREEMEM.lock();
	let state = guard.as_mut().expect("coremap not initialized");
	for (k, i) in (start..start + n).enumerate() {
		let f = &mut state.frames[i];
		f.status = FrameStatus::Fixed;
		f.owner = None;
		f.vaddr = VirtAddr(0);
		f.alloc_size = if k == 0 { n } else { 0 };
	}
	stats::mem_info_set_free(state.free_count());
	log::debug!(target: "vmcore", "alloc_kpages({n}) -> frame {start}");
	Some(state.frame_addr(start))
}

/// Allocates one frame for `vaddr` in the address space identified by `owner`, marking it
/// `Dirty`. Returns `None` if physical memory is exhausted.
#[instrument(name = "page_alloc")]
pub fn page_alloc(owner: Weak<dyn FrameOwner>, vaddr: VirtAddr) -> Option<PhysAddr> {
	let index = find_or_evict_run(1)?;
	let mut guard = FREEMEM.lock();
	let state = guard.as_mut().expect("coremap not initialized");
	let f = &mut state.frames[index];
	f.status = FrameStatus::Dirty;
	f.owner = Some(owner);
	f.vaddr = vaddr;
	f.alloc_size = 0;
	stats::mem_info_set_free(state.free_count());
	log::debug!(target: "vmcore", "page_alloc({vaddr:?}) -> frame {index}");
	Some(state.frame_addr(index))
}

/// Returns a `Dirty` or `Free` frame to `Free`. Asserts the frame is neither `Fixed` nor
/// `Clean` (a programming bug per §4.1).
#[instrument(name = "page_free")]
pub fn page_free(pa: PhysAddr) {
	let mut guard = FREEMEM.lock();
	let state = guard.as_mut().expect("coremap not initialized");
	let index = pa.0 / PAGE_SIZE;
	let f = &mut state.frames[index];
	assert!(
		!matches!(f.status, FrameStatus::Fixed | FrameStatus::Clean),
		"page_free: frame {index} is {:?}, not Dirty/Free",
		f.status
	);
	f.status = FrameStatus::Free;
	f.owner = None;
	f.vaddr = VirtAddr(0);
	f.alloc_size = 0;
	stats::mem_info_set_free(state.free_count());
}

/// Returns the contiguous kernel run rooted at `pa` to `Free`, using the root's stored
/// `alloc_size`.
#[instrument(name = "free_kpages")]
pub fn free_kpages(pa: PhysAddr) {
	let mut guard = FREEMEM.lock();
	let state = guard.as_mut().expect("coremap not initialized");
	let root = pa.0 / PAGE_SIZE;
	let n = state.frames[root].alloc_size;
	assert!(n > 0, "free_kpages: frame {root} is not a run root");
	for i in root..root + n {
		let f = &mut state.frames[i];
		f.status = FrameStatus::Free;
		f.owner = None;
		f.vaddr = VirtAddr(0);
		f.alloc_size = 0;
	}
	stats::mem_info_set_free(state.free_count());
}

/// Returns the status of the frame at `pa`, for tests and invariant checks.
pub fn status_of(pa: PhysAddr) -> FrameStatus {
	let guard = FREEMEM.lock();
	let state = guard.as_ref().expect("coremap not initialized");
	state.frames[pa.0 / PAGE_SIZE].status
}

/// Re-exported so callers constructing a "no frame" sentinel do not need to reach into
/// [`crate::addr`] themselves.
pub const NONE: PhysAddr = PFN_NONE;
