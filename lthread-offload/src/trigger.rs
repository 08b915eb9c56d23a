//! Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
//! http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
//! http://opensource.org/licenses/MIT>, at your option. This file may not be
//! copied, modified, or distributed except according to those terms.

//! Component A: the poller wake channel.
//!
//! A per-origin, counter-semantics event-fd that any thread can write to in
//! order to unblock that origin's `poll_wait`. Built on the real
//! `eventfd(2)` primitive, matching the reference `lthread_epoll.c`
//! (`eventfd(0, EFD_NONBLOCK)`, an 8-byte counter read/write).

use std::io;
use std::os::unix::io::RawFd;

const COUNTER_BYTES: usize = std::mem::size_of::<u64>();

/// A single origin's wake channel.
///
/// `register_trigger` is idempotent: the event-fd is allocated lazily on
/// first use and reused afterward.
pub struct Trigger {
    fd: RawFd,
}

impl Trigger {
    /// Allocate the underlying event-fd.
    ///
    /// # Panics
    ///
    /// Panics (spec §7 kind 3: fatal synchronization-primitive failure) if
    /// the kernel refuses to hand out an fd, since the process is almost
    /// certainly out of file descriptors and can't make progress anyway.
    pub fn new() -> Self {
        // SAFETY: `eventfd(2)` with no flags beyond `EFD_NONBLOCK` is always
        // a valid call; failure is reported through the return value.
        let fd = unsafe { libc::eventfd(0, libc::EFD_NONBLOCK) };
        assert!(
            fd >= 0,
            "eventfd creation failed: {}",
            io::Error::last_os_error()
        );
        tracing::trace!(fd, "trigger: allocated wake channel");
        Self { fd }
    }

    pub fn fd(&self) -> RawFd {
        self.fd
    }

    /// Register this wake channel in `poller` for read readiness. Idempotent
    /// from the caller's perspective as long as `poller.register_read` is.
    pub fn register(&self, poller: &dyn crate::poller::PollerRegistrar) {
        poller.register_read(self.fd);
    }

    /// Write an 8-byte, non-zero value to the event-fd, unblocking any
    /// in-flight `poll_wait` for this origin. Safe to call from any thread.
    ///
    /// # Panics
    ///
    /// Panics if the write does not complete as a single 8-byte counter
    /// update (spec §7 kind 3: a fatal synchronization-primitive failure).
    pub fn trigger(&self) {
        let value: u64 = 2;
        let expected = isize::try_from(COUNTER_BYTES).unwrap();
        // SAFETY: `value` is a live `u64` for the duration of the call;
        // eventfd writes of exactly 8 bytes complete atomically per eventfd(2).
        let ret = unsafe { libc::write(self.fd, std::ptr::from_ref(&value).cast(), COUNTER_BYTES) };
        assert_eq!(
            ret,
            expected,
            "trigger write failed: {}",
            io::Error::last_os_error()
        );
        tracing::trace!(fd = self.fd, "trigger: woke origin");
    }

    /// Read and discard the pending counter value. Called by the origin
    /// itself once it observes its wake channel ready.
    ///
    /// # Panics
    ///
    /// Panics if the read does not complete as a single 8-byte counter read
    /// (spec §7 kind 3).
    pub fn clear(&self) {
        let mut value: u64 = 0;
        let expected = isize::try_from(COUNTER_BYTES).unwrap();
        // SAFETY: `value` is a live, writable `u64` for the duration of the
        // call; eventfd reads of exactly 8 bytes complete atomically.
        let ret = unsafe {
            libc::read(
                self.fd,
                std::ptr::from_mut(&mut value).cast(),
                COUNTER_BYTES,
            )
        };
        assert_eq!(
            ret,
            expected,
            "trigger clear failed: {}",
            io::Error::last_os_error()
        );
    }
}

impl Default for Trigger {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Trigger {
    fn drop(&mut self) {
        // SAFETY: `self.fd` was opened by `eventfd(2)` in `new` and is not
        // shared past this point.
        unsafe {
            libc::close(self.fd);
        }
    }
}

// SAFETY: `Trigger` only ever touches its fd through `eventfd`'s documented
// thread-safe read/write/close operations.
unsafe impl Send for Trigger {}
// SAFETY: see above.
unsafe impl Sync for Trigger {}
