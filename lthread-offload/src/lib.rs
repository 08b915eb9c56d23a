//! Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
//! http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
//! http://opensource.org/licenses/MIT>, at your option. This file may not be
//! copied, modified, or distributed except according to those terms.

//! The off-loading core of a user-space coroutine runtime.
//!
//! A primary scheduler runs many cooperative lthreads on a single host
//! thread, multiplexed over a readiness poller. This crate is the part that
//! temporarily migrates a running lthread *off* that scheduler:
//!
//! - [`compute_pool`]: a dynamic pool of helper threads for CPU-bound work
//!   that would otherwise monopolize the cooperative loop.
//! - [`io_pool`]: a fixed pool of worker threads that perform one blocking
//!   read or write on an lthread's behalf.
//! - [`trigger`]: the per-origin wake channel helpers use to unblock a
//!   scheduler parked in its readiness wait.
//! - [`origin`]: the origin-scheduler fields (busy-list, defer-list, wake
//!   channel) this core reads and writes directly.
//! - [`lthread`]: the lthread state machine shared by both offload paths.
//!
//! The primary scheduler's main loop, the readiness poller itself, and
//! context-switching of stacks are external collaborators: this crate only
//! defines the [`context::SwitchContext`] and [`poller::PollerRegistrar`]
//! seams it needs from them.

pub mod compute_pool;
pub mod config;
pub mod context;
pub mod error;
pub mod io_pool;
pub mod lthread;
pub mod origin;
pub mod poller;
pub mod trigger;

pub use compute_pool::{ComputeHelper, ComputeHelperPool, commit_to_compute, compute_end};
pub use config::Config;
pub use context::SwitchContext;
pub use error::OffloadError;
pub use io_pool::IoWorkerPool;
pub use lthread::{Lthread, LthreadState};
pub use origin::OriginHandle;
pub use poller::PollerRegistrar;
pub use trigger::Trigger;
