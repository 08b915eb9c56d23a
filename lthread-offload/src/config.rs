//! Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
//! http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
//! http://opensource.org/licenses/MIT>, at your option. This file may not be
//! copied, modified, or distributed except according to those terms.

use std::time::Duration;

/// Tunables for the offload core (spec §6).
///
/// Production code should use [`Config::default`]; tests may shrink
/// `compute_idle_timeout` so the helper-timeout scenario (spec §8.4) doesn't
/// need a literal 65 second sleep.
#[derive(Debug, Clone, Copy)]
pub struct Config {
    /// Number of fixed I/O worker threads. Spec default: 2.
    pub io_workers: usize,
    /// How long an idle compute helper waits for work before self-destructing.
    /// Spec default: 60s.
    pub compute_idle_timeout: Duration,
    /// Maximum events a single poll wait can report. Consumed by the poller
    /// collaborator; carried here only because it's one of the spec's
    /// documented tunables.
    pub max_poll_events: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            io_workers: 2,
            compute_idle_timeout: Duration::from_secs(60),
            max_poll_events: 1024,
        }
    }
}
