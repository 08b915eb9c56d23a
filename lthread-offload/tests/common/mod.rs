//! Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
//! http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
//! http://opensource.org/licenses/MIT>, at your option. This file may not be
//! copied, modified, or distributed except according to those terms.

//! The external-collaborator harness described in SPEC_FULL.md §10.4.
//!
//! Real stackful context switching is out of scope for the core (spec §1);
//! tests stand it up as a strict hand-off between two parked OS threads,
//! gated by a condition variable pair. This lives here, not in the crate
//! itself, because production embedders plug in a real coroutine library.

#![allow(
    dead_code,
    reason = "not every helper is used by every integration test binary"
)]

use lthread_offload::{Lthread, OriginHandle, PollerRegistrar, SwitchContext};
use std::collections::HashSet;
use std::os::unix::io::RawFd;
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

/// A counting-semaphore rendezvous: `signal` wakes one `wait`er. Counting
/// (rather than a single boolean flag) matters once more than one lthread
/// can switch into the same origin context concurrently (scenario 2: four
/// simultaneous `compute_begin` yields) — a plain flag would coalesce two
/// back-to-back signals into one wake-up and strand a waiter.
struct Carrier {
    count: Mutex<u64>,
    cond: Condvar,
}

impl Carrier {
    fn new() -> Self {
        Self {
            count: Mutex::new(0),
            cond: Condvar::new(),
        }
    }

    fn signal(&self) {
        let mut count = self.count.lock().unwrap();
        *count += 1;
        self.cond.notify_one();
    }

    fn wait(&self) {
        let mut count = self.count.lock().unwrap();
        while *count == 0 {
            count = self.cond.wait(count).unwrap();
        }
        *count -= 1;
    }
}

/// The harness's [`SwitchContext`]: one `Carrier` per logical execution
/// slot (an lthread, an origin, or a compute helper). `switch(from, to)`
/// wakes `to`'s carrier and parks on `from`'s.
#[derive(Clone)]
pub struct ThreadCtx {
    carrier: Arc<Carrier>,
}

impl ThreadCtx {
    pub fn new() -> Self {
        Self {
            carrier: Arc::new(Carrier::new()),
        }
    }

    /// Block until some other context switches into this one. Used by the
    /// test driver standing in for the origin scheduler, which has no
    /// "previous" context to switch from on its very first wait.
    pub fn wait_for_switch(&self) {
        self.carrier.wait();
    }
}

impl Default for ThreadCtx {
    fn default() -> Self {
        Self::new()
    }
}

impl SwitchContext for ThreadCtx {
    fn switch(from: &Self, to: &Self) {
        to.carrier.signal();
        from.carrier.wait();
    }
}

/// A `PollerRegistrar` that just records registrations; the harness drives
/// the wake channel directly with a real `poll(2)` rather than running a
/// full readiness multiplexer (out of scope per spec §1).
#[derive(Default)]
pub struct TestPoller {
    registered: Mutex<HashSet<RawFd>>,
}

impl TestPoller {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

impl PollerRegistrar for TestPoller {
    fn register_read(&self, fd: RawFd) {
        self.registered.lock().unwrap().insert(fd);
    }

    fn deregister(&self, fd: RawFd) {
        self.registered.lock().unwrap().remove(&fd);
    }
}

/// Build an origin with its wake channel registered, standing in for the
/// primary scheduler (spec §3 "Origin scheduler").
pub fn new_origin() -> (Arc<OriginHandle<ThreadCtx>>, Arc<TestPoller>) {
    let origin = OriginHandle::new(ThreadCtx::new());
    let poller = TestPoller::new();
    origin.register_trigger(poller.as_ref());
    (origin, poller)
}

/// Spawn an lthread's dedicated OS thread running `body`, mirroring the
/// "each lthread is backed by an OS thread for the harness's duration"
/// substitution in SPEC_FULL.md §10.4.
pub fn spawn_lthread(
    origin: &Arc<OriginHandle<ThreadCtx>>,
    body: impl FnOnce(Arc<Lthread<ThreadCtx>>) + Send + 'static,
) -> (Arc<Lthread<ThreadCtx>>, JoinHandle<()>) {
    let lt = Lthread::new(ThreadCtx::new(), origin.clone());
    let lt_for_thread = lt.clone();
    let handle = std::thread::Builder::new()
        .name("test-lthread".to_string())
        .spawn(move || body(lt_for_thread))
        .expect("failed to spawn test lthread thread");
    (lt, handle)
}

/// Resume a deferred lthread, standing in for the origin scheduler's own
/// run loop (spec §4.D: re-activating a deferred lthread is the
/// embedder's job, not this crate's).
pub fn resume(origin: &Arc<OriginHandle<ThreadCtx>>, lt: &Arc<Lthread<ThreadCtx>>) {
    ThreadCtx::switch(origin.ctx(), lt.ctx());
}

/// Perform the origin-side half of one `compute_begin` hand-off: wait for
/// `lt` (or any lthread sharing this origin) to yield, then commit it to
/// its helper (spec §4.C.2, §4.D).
pub fn commit_one(origin: &Arc<OriginHandle<ThreadCtx>>, lt: &Arc<Lthread<ThreadCtx>>) {
    origin.ctx().wait_for_switch();
    lthread_offload::commit_to_compute(lt);
}

/// Block until `origin`'s wake channel becomes readable via a real
/// `poll(2)`, matching the liveness property in spec §8 ("after
/// `trigger(sched)`, any in-flight `poll_wait` returns"). `timeout` bounds
/// the wait so a protocol bug fails the test instead of hanging it.
pub fn poll_for_wake(origin: &OriginHandle<ThreadCtx>, timeout: Duration) -> bool {
    let fd = origin.trigger_fd();
    let mut pollfd = libc::pollfd {
        fd,
        events: libc::POLLIN,
        revents: 0,
    };
    let timeout_ms = i32::try_from(timeout.as_millis()).unwrap_or(i32::MAX);
    // SAFETY: `pollfd` is a single, live `libc::pollfd` for the duration of
    // the call.
    let ret = unsafe { libc::poll(std::ptr::from_mut(&mut pollfd), 1, timeout_ms) };
    assert!(ret >= 0, "poll failed: {}", std::io::Error::last_os_error());
    if ret > 0 {
        origin.clear_wake();
        true
    } else {
        false
    }
}
