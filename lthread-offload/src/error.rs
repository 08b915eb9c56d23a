//! Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
//! http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
//! http://opensource.org/licenses/MIT>, at your option. This file may not be
//! copied, modified, or distributed except according to those terms.

use std::io;

/// Errors surfaced across the offload protocol's public API.
///
/// Synchronization-primitive failures and an lthread observed in neither
/// `WAIT_IO_READ` nor `WAIT_IO_WRITE` are process invariants, not recoverable
/// errors (spec §7 kinds 3 and 4): those abort via `unreachable!`/`panic!`
/// rather than flowing through this type.
#[derive(Debug, onlyerror::Error)]
pub enum OffloadError {
    /// `compute_begin` found no `FREE` helper and failed to create one.
    #[error("no compute helper available and helper creation failed")]
    NoHelperAvailable,

    /// The offloaded `read`/`write` syscall returned `-1`; `errno` is carried
    /// in the captured `std::io::Error` for the caller to inspect.
    #[error("offloaded i/o failed: {0}")]
    Io(io::Error),
}
