//! Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
//! http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
//! http://opensource.org/licenses/MIT>, at your option. This file may not be
//! copied, modified, or distributed except according to those terms.

//! Component C: the dynamic compute helper pool (spec §4.C).
//!
//! Helpers are created on demand, run arbitrary cooperative-blocking code for
//! an offloaded lthread, and self-destruct after an idle timeout. Unlike the
//! reference implementation's thread-local "current helper" lookup (spec §9),
//! `compute_end` here locates the helper through the lthread's own
//! back-reference — the message-passing alternative the design notes call
//! out as removing the global entirely.

use crate::config::Config;
use crate::context::SwitchContext;
use crate::error::OffloadError;
use crate::lthread::{Lthread, LthreadState};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::Duration;

/// How many times the helper loop will spin on a `PENDING_RUNCOMPUTE` head
/// before backing off (spec §9 open question 1: the reference loop spins
/// unboundedly).
const PENDING_SPIN_LIMIT: u32 = 1000;
const PENDING_BACKOFF: Duration = Duration::from_micros(50);

/// A dynamically-allocated helper thread with its own nested scheduler
/// (spec §3).
pub struct ComputeHelper<C: SwitchContext> {
    ctx: C,
    queue: Mutex<VecDeque<Arc<Lthread<C>>>>,
    current: Mutex<Option<Arc<Lthread<C>>>>,
    run_mutex: Mutex<()>,
    run_cond: Condvar,
    /// `true` == `FREE`, `false` == `BUSY` (spec §3 availability flag).
    free: AtomicBool,
}

impl<C: SwitchContext> ComputeHelper<C> {
    fn new(ctx: C) -> Arc<Self> {
        Arc::new(Self {
            ctx,
            queue: Mutex::new(VecDeque::new()),
            current: Mutex::new(None),
            run_mutex: Mutex::new(()),
            run_cond: Condvar::new(),
            free: AtomicBool::new(true),
        })
    }

    pub(crate) fn is_free(&self) -> bool {
        self.free.load(Ordering::Acquire)
    }

    /// Current lthread this helper is executing, if any. Exposed for the
    /// `availability == BUSY ⇔ current_lthread != nil` invariant (spec §8).
    ///
    /// # Panics
    ///
    /// Panics if the current-lthread mutex is poisoned (spec §7 kind 3).
    pub fn current(&self) -> Option<Arc<Lthread<C>>> {
        self.current.lock().unwrap().clone()
    }

    pub(crate) fn notify(&self) {
        let _guard = self.run_mutex.lock().unwrap();
        self.run_cond.notify_one();
    }

    /// The helper scheduler loop (spec §4.C.3).
    fn run(self: Arc<Self>, pool: Arc<ComputeHelperPool<C>>, idle_timeout: Duration) {
        loop {
            match self.next_runnable() {
                Some(lt) => self.execute(&lt),
                None => {
                    if self.wait_for_work_or_timeout(idle_timeout)
                        && self.retire_if_still_idle(&pool)
                    {
                        return;
                    }
                }
            }
        }
    }

    /// Find and dequeue the first non-`PENDING_RUNCOMPUTE` head, spinning
    /// (bounded, with back-off) while the head is still pending, per the
    /// §9 open-question decision to bound the spin.
    fn next_runnable(&self) -> Option<Arc<Lthread<C>>> {
        let mut spins = 0u32;
        loop {
            let mut queue = self.queue.lock().unwrap();
            let head = queue.front()?;
            if head.state().contains(LthreadState::PENDING_RUNCOMPUTE) {
                drop(queue);
                spins += 1;
                if spins > PENDING_SPIN_LIMIT {
                    if spins == PENDING_SPIN_LIMIT + 1 {
                        tracing::warn!(
                            spins,
                            "compute helper: spinning on PENDING_RUNCOMPUTE head"
                        );
                    }
                    thread::sleep(PENDING_BACKOFF);
                } else {
                    thread::yield_now();
                }
                continue;
            }
            return queue.pop_front();
        }
    }

    fn execute(self: &Arc<Self>, lt: &Arc<Lthread<C>>) {
        *self.current.lock().unwrap() = Some(lt.clone());
        self.free.store(false, Ordering::Release);
        tracing::trace!("compute helper: running lthread");

        C::switch(&self.ctx, &lt.ctx);
        // Resumes here once the lthread calls `compute_end`.

        *self.current.lock().unwrap() = None;
        self.free.store(true, Ordering::Release);

        let origin = lt.origin().clone();
        origin.defer(lt.clone());
        lt.remove_state(LthreadState::RUNCOMPUTE);
        origin.wake();
        tracing::trace!("compute helper: lthread handed back to origin");
    }

    /// Returns `true` if the wait actually timed out (as opposed to being
    /// woken by a signal).
    fn wait_for_work_or_timeout(&self, idle_timeout: Duration) -> bool {
        let guard = self.run_mutex.lock().unwrap();
        let (_guard, result) = self.run_cond.wait_timeout(guard, idle_timeout).unwrap();
        result.timed_out()
    }

    /// On idle timeout, re-check under both the helpers mutex and this
    /// helper's queue mutex (spec §4.C.3 wait phase) and exit if still idle.
    fn retire_if_still_idle(self: &Arc<Self>, pool: &Arc<ComputeHelperPool<C>>) -> bool {
        let mut helpers = pool.helpers.lock().unwrap();
        let queue = self.queue.lock().unwrap();
        if queue.is_empty() {
            drop(queue);
            helpers.retain(|h| !Arc::ptr_eq(h, self));
            tracing::debug!("compute helper: idle timeout, exiting");
            true
        } else {
            false
        }
    }
}

/// The process-wide dynamic pool of compute helpers (spec §3, §4.C).
pub struct ComputeHelperPool<C: SwitchContext> {
    helpers: Mutex<Vec<Arc<ComputeHelper<C>>>>,
    make_ctx: Box<dyn Fn() -> C + Send + Sync>,
    idle_timeout: Duration,
}

impl<C: SwitchContext> ComputeHelperPool<C> {
    /// `make_ctx` constructs a fresh helper-scheduler context each time a new
    /// helper thread is spawned; creating that context is the embedder's
    /// responsibility in the same way lthread context creation is (spec §1).
    pub fn new(config: &Config, make_ctx: impl Fn() -> C + Send + Sync + 'static) -> Arc<Self> {
        Arc::new(Self {
            helpers: Mutex::new(Vec::new()),
            make_ctx: Box::new(make_ctx),
            idle_timeout: config.compute_idle_timeout,
        })
    }

    /// # Panics
    ///
    /// Panics if the helpers-list mutex is poisoned (spec §7 kind 3).
    pub fn helper_count(&self) -> usize {
        self.helpers.lock().unwrap().len()
    }

    /// `compute_begin` (spec §4.C, public contract): acquire or create a
    /// helper, enqueue `lt` in `PENDING_RUNCOMPUTE`, yield to `lt`'s origin.
    /// Returns once the helper has switched back into `lt`.
    ///
    /// # Errors
    ///
    /// Returns [`OffloadError::NoHelperAvailable`] if no `FREE` helper exists
    /// and creating one failed (spec §7 kind 1).
    ///
    /// # Panics
    ///
    /// Panics if the helpers-list mutex is poisoned (spec §7 kind 3).
    pub fn compute_begin(self: &Arc<Self>, lt: &Arc<Lthread<C>>) -> Result<(), OffloadError> {
        let helper = {
            let mut helpers = self.helpers.lock().unwrap();
            let helper = match helpers.iter().find(|h| h.is_free()).cloned() {
                Some(h) => h,
                None => match self.spawn_helper() {
                    Some(h) => {
                        helpers.insert(0, h.clone());
                        h
                    }
                    None => helpers
                        .first()
                        .cloned()
                        .ok_or(OffloadError::NoHelperAvailable)?,
                },
            };

            *lt.compute_helper.lock().unwrap() = Some(helper.clone());
            lt.insert_state(LthreadState::PENDING_RUNCOMPUTE);
            helper.queue.lock().unwrap().push_back(lt.clone());
            // Mark busy here, not when the helper's loop actually starts
            // running it: a freshly spawned helper's first iteration is
            // asynchronous, so without this a second concurrent attach
            // could still observe it as FREE and queue behind the first
            // instead of getting its own helper.
            helper.free.store(false, Ordering::Release);
            helper
        };
        drop(helper);

        lt.yield_to_origin();
        Ok(())
    }

    fn spawn_helper(self: &Arc<Self>) -> Option<Arc<ComputeHelper<C>>> {
        let helper = ComputeHelper::new((self.make_ctx)());
        let run_on = helper.clone();
        let pool = self.clone();
        let idle_timeout = self.idle_timeout;
        thread::Builder::new()
            .name("compute-helper".to_string())
            .spawn(move || run_on.run(pool, idle_timeout))
            .ok()?;
        Some(helper)
    }
}

/// `commit_to_compute` (spec §4.C.2): the origin-side second half of the
/// hand-off, performed after the offloading lthread's yield returns control
/// to the origin scheduler.
///
/// # Panics
///
/// Panics if `lt` has no attached compute helper, or if a mutex is
/// poisoned (spec §7 kind 3) — both are process invariants, not recoverable
/// errors.
pub fn commit_to_compute<C: SwitchContext>(lt: &Arc<Lthread<C>>) {
    let helper = lt
        .compute_helper
        .lock()
        .unwrap()
        .clone()
        .expect("commit_to_compute called on an lthread with no attached compute helper");

    {
        let _queue = helper.queue.lock().unwrap();
        lt.remove_state(LthreadState::PENDING_RUNCOMPUTE);
        lt.insert_state(LthreadState::RUNCOMPUTE);
        lt.origin().push_busy(lt.clone());
    }
    helper.notify();
}

/// `compute_end` (spec §4.C.4): called from the lthread while it is
/// executing on a helper; switches back into the helper's scheduler context.
///
/// # Panics
///
/// Panics if `lt` has no attached compute helper, or if a mutex is
/// poisoned (spec §7 kind 3).
pub fn compute_end<C: SwitchContext>(lt: &Arc<Lthread<C>>) {
    let helper = lt
        .compute_helper
        .lock()
        .unwrap()
        .clone()
        .expect("compute_end called on an lthread with no attached compute helper");
    C::switch(&lt.ctx, &helper.ctx);
}
