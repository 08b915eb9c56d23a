//! Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
//! http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
//! http://opensource.org/licenses/MIT>, at your option. This file may not be
//! copied, modified, or distributed except according to those terms.

//! The fields of an origin scheduler that this core reads and writes
//! directly (spec §3): its busy-list, its defer-list, and its wake channel.
//! The scheduler's own main loop — what drains this and decides what's
//! runnable — is an external collaborator (spec §1).

use crate::context::SwitchContext;
use crate::lthread::Lthread;
use crate::poller::PollerRegistrar;
use crate::trigger::Trigger;
use std::collections::VecDeque;
use std::os::unix::io::RawFd;
use std::sync::{Arc, Mutex, OnceLock};

/// The core-owned state of one origin scheduler.
pub struct OriginHandle<C: SwitchContext> {
    pub(crate) ctx: C,
    /// lthreads currently off-CPU on a helper, attributed back to this
    /// origin (spec §3 invariants 3 and 4).
    busy: Mutex<Vec<Arc<Lthread<C>>>>,
    /// lthreads a helper has finished with, awaiting re-activation by this
    /// origin (spec §3 invariant 5, §4.D).
    defer: Mutex<VecDeque<Arc<Lthread<C>>>>,
    trigger: OnceLock<Trigger>,
}

impl<C: SwitchContext> OriginHandle<C> {
    pub fn new(ctx: C) -> Arc<Self> {
        Arc::new(Self {
            ctx,
            busy: Mutex::new(Vec::new()),
            defer: Mutex::new(VecDeque::new()),
            trigger: OnceLock::new(),
        })
    }

    /// The origin's own switch context, for the scheduler loop driving it.
    pub fn ctx(&self) -> &C {
        &self.ctx
    }

    /// Lazily allocate this origin's wake channel and register it in
    /// `poller`. Idempotent (spec §4.A).
    pub fn register_trigger(&self, poller: &dyn PollerRegistrar) {
        let first_time = self.trigger.get().is_none();
        let trigger = self.trigger.get_or_init(Trigger::new);
        if first_time {
            trigger.register(poller);
        }
    }

    fn trigger(&self) -> &Trigger {
        self.trigger
            .get()
            .expect("origin used before register_trigger was called")
    }

    /// Wake this origin's poll wait. Safe to call from any thread (spec
    /// §4.A).
    pub fn wake(&self) {
        self.trigger().trigger();
    }

    /// Called by the origin itself once it observes its own wake channel
    /// ready.
    pub fn clear_wake(&self) {
        self.trigger().clear();
    }

    /// The wake channel's file descriptor, for registration in a readiness
    /// poller (spec §4.A contract).
    ///
    /// # Panics
    ///
    /// Panics if called before [`Self::register_trigger`].
    pub fn trigger_fd(&self) -> RawFd {
        self.trigger().fd()
    }

    pub(crate) fn push_busy(&self, lt: Arc<Lthread<C>>) {
        self.busy.lock().unwrap().push(lt);
    }

    fn remove_busy(&self, lt: &Arc<Lthread<C>>) {
        let mut busy = self.busy.lock().unwrap();
        if let Some(idx) = busy.iter().position(|other| Arc::ptr_eq(other, lt)) {
            busy.swap_remove(idx);
        }
    }

    /// # Panics
    ///
    /// Panics if the busy-list mutex is poisoned (spec §7 kind 3).
    pub fn busy_len(&self) -> usize {
        self.busy.lock().unwrap().len()
    }

    /// Append `lt` to the defer-list; called by a helper once it has
    /// finished running `lt` (spec §3 invariant 5, §4.B step 3, §4.C.3).
    pub(crate) fn defer(&self, lt: Arc<Lthread<C>>) {
        self.remove_busy(&lt);
        self.defer.lock().unwrap().push_back(lt);
    }

    /// Drain the defer-list under its mutex, handing each lthread to `f` to
    /// be re-queued as runnable (spec §4.D). Called by the origin after it
    /// clears its wake channel.
    ///
    /// # Panics
    ///
    /// Panics if the defer-list mutex is poisoned (spec §7 kind 3).
    pub fn drain_defer(&self, mut f: impl FnMut(Arc<Lthread<C>>)) {
        let drained: Vec<_> = self.defer.lock().unwrap().drain(..).collect();
        for lt in drained {
            f(lt);
        }
    }
}
