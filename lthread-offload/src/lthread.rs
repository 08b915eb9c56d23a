//! Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
//! http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
//! http://opensource.org/licenses/MIT>, at your option. This file may not be
//! copied, modified, or distributed except according to those terms.

use crate::context::SwitchContext;
use crate::origin::OriginHandle;
use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicI64, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

bitflags::bitflags! {
    /// The lthread state bitset (spec §3).
    ///
    /// Invariant: at most one of `PENDING_RUNCOMPUTE`/`RUNCOMPUTE` is ever
    /// set, and at most one of `WAIT_IO_READ`/`WAIT_IO_WRITE`.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct LthreadState: u32 {
        const PENDING_RUNCOMPUTE = 1 << 0;
        const RUNCOMPUTE         = 1 << 1;
        const WAIT_IO_READ       = 1 << 2;
        const WAIT_IO_WRITE      = 1 << 3;
    }
}

/// The fd/buf/nbytes half of the I/O descriptor block (spec §3): written once
/// by the enqueuing lthread before it is linked onto an I/O worker's queue,
/// read once by that worker after it dequeues. Never touched concurrently.
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct IoRequest {
    pub fd: i32,
    pub buf: *mut u8,
    pub nbytes: usize,
}

/// The I/O descriptor block, valid while a `WAIT_IO_*` flag is set (spec §3).
#[derive(Debug, Default)]
pub struct IoDescriptor {
    request: UnsafeCell<IoRequest>,
    pub ret: AtomicI64,
    pub err: AtomicI64,
}

impl IoDescriptor {
    /// Write the request fields. Caller must hold exclusive logical
    /// ownership of this lthread's I/O slot (true of the lthread itself,
    /// before it enqueues on a worker).
    pub(crate) fn set_request(&self, request: IoRequest) {
        // SAFETY: the offload protocol hands this slot to exactly one
        // I/O worker after this write, across the worker's queue mutex,
        // which establishes happens-before with the read in `request()`.
        unsafe { *self.request.get() = request };
    }

    /// Read the request fields. Caller must be the single I/O worker that
    /// just dequeued this lthread.
    pub(crate) fn request(&self) -> IoRequest {
        // SAFETY: see `set_request`.
        unsafe { *self.request.get() }
    }
}

// SAFETY: `request` is only ever written by the enqueuing lthread and read
// by the one I/O worker it was handed off to, serialized by the worker's
// queue mutex (see `io_pool::offload`); `ret`/`err` are plain atomics.
unsafe impl Send for IoDescriptor {}
// SAFETY: see above.
unsafe impl Sync for IoDescriptor {}

/// One coroutine, as far as the offload core is concerned (spec §3).
///
/// `C` is the embedding runtime's stack/register context type (see
/// [`crate::context::SwitchContext`]); this core never constructs one, it
/// only calls `C::switch` at the suspension points the spec names.
pub struct Lthread<C: SwitchContext> {
    pub(crate) ctx: C,
    /// Immutable for the lthread's life (spec §3).
    pub(crate) origin: Arc<OriginHandle<C>>,
    /// The compute helper this lthread is currently attached to, if any.
    pub(crate) compute_helper: Mutex<Option<Arc<crate::compute_pool::ComputeHelper<C>>>>,
    state: AtomicU32,
    pub(crate) io: IoDescriptor,
}

impl<C: SwitchContext> Lthread<C> {
    /// Construct an lthread bound to `origin` for its whole life.
    pub fn new(ctx: C, origin: Arc<OriginHandle<C>>) -> Arc<Self> {
        Arc::new(Self {
            ctx,
            origin,
            compute_helper: Mutex::new(None),
            state: AtomicU32::new(0),
            io: IoDescriptor::default(),
        })
    }

    pub fn origin(&self) -> &Arc<OriginHandle<C>> {
        &self.origin
    }

    /// This lthread's switch context. The embedder's scheduler loop uses
    /// this to resume a deferred lthread (spec §4.D) — actually switching
    /// stacks is its job, not this crate's (spec §1).
    pub fn ctx(&self) -> &C {
        &self.ctx
    }

    pub(crate) fn io(&self) -> &IoDescriptor {
        &self.io
    }

    pub fn state(&self) -> LthreadState {
        LthreadState::from_bits_truncate(self.state.load(Ordering::Acquire))
    }

    pub(crate) fn insert_state(&self, flags: LthreadState) {
        self.state.fetch_or(flags.bits(), Ordering::AcqRel);
    }

    pub(crate) fn remove_state(&self, flags: LthreadState) {
        self.state.fetch_and(!flags.bits(), Ordering::AcqRel);
    }

    /// Suspend the caller (which must currently be executing this lthread)
    /// and transfer control to its origin scheduler.
    ///
    /// Used both by `compute_begin`, before acquisition completes, and by
    /// the I/O offload calls, after enqueue (spec §5).
    pub(crate) fn yield_to_origin(&self) {
        C::switch(&self.ctx, &self.origin.ctx);
    }
}
