//! Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
//! http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
//! http://opensource.org/licenses/MIT>, at your option. This file may not be
//! copied, modified, or distributed except according to those terms.

//! The readiness poller: an external collaborator (spec §1, §6).
//!
//! The primary scheduler's `poll_add`/`poll_del`/`poll_wait` loop is out of
//! scope for this core; we only need a place to register the wake channel's
//! event-fd so the scheduler's own poll wait is woken by [`crate::trigger`].

use std::os::unix::io::RawFd;

/// The subset of a readiness poller the offload core needs: a way to add a
/// read-interest registration for the wake channel's event-fd.
///
/// Mirrors the original's one-shot-then-rearm discipline
/// (`EPOLLONESHOT | EPOLLRDHUP`, re-armed via `EPOLL_CTL_MOD` falling back to
/// `EPOLL_CTL_ADD`): implementations should re-register `fd` every time it is
/// reported ready if they want level-triggered-once-per-event semantics.
pub trait PollerRegistrar: Send + Sync {
    /// Register `fd` for read readiness, adding it if not already registered.
    fn register_read(&self, fd: RawFd);

    /// Remove `fd`'s registration.
    fn deregister(&self, fd: RawFd);
}
