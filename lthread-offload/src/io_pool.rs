//! Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
//! http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
//! http://opensource.org/licenses/MIT>, at your option. This file may not be
//! copied, modified, or distributed except according to those terms.

//! Component B: the fixed-size I/O worker pool (spec §4.B).

use crate::config::Config;
use crate::context::SwitchContext;
use crate::error::OffloadError;
use crate::lthread::{IoRequest, Lthread, LthreadState};
use std::collections::VecDeque;
use std::io;
use std::os::unix::io::RawFd;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;

struct IoWorker<C: SwitchContext> {
    queue: Mutex<VecDeque<Arc<Lthread<C>>>>,
    queue_cond: Condvar,
}

impl<C: SwitchContext> IoWorker<C> {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            queue: Mutex::new(VecDeque::new()),
            queue_cond: Condvar::new(),
        })
    }

    /// The per-worker loop: block for work, run exactly one syscall per
    /// lthread, hand it back to its origin (spec §4.B).
    fn run(self: Arc<Self>) {
        loop {
            let lt = {
                let mut queue = self.queue.lock().unwrap();
                while queue.is_empty() {
                    queue = self.queue_cond.wait(queue).unwrap();
                }
                queue.pop_front().unwrap()
            };
            Self::service(&lt);
        }
    }

    fn service(lt: &Arc<Lthread<C>>) {
        let req = lt.io().request();
        let state = lt.state();

        let ret = if state.contains(LthreadState::WAIT_IO_READ) {
            // SAFETY: `req.buf`/`req.nbytes` describe a buffer the caller
            // guaranteed is valid for the duration of the offload (it is
            // still on the caller's stack, suspended at `yield_to_origin`).
            unsafe { libc::read(req.fd, req.buf.cast(), req.nbytes) }
        } else if state.contains(LthreadState::WAIT_IO_WRITE) {
            // SAFETY: see above.
            unsafe { libc::write(req.fd, req.buf.cast(), req.nbytes) }
        } else {
            unreachable!(
                "io worker saw an lthread with neither WAIT_IO_READ nor WAIT_IO_WRITE set"
            );
        };
        let err = if ret == -1 {
            io::Error::last_os_error().raw_os_error().unwrap_or(0)
        } else {
            0
        };
        lt.io()
            .ret
            .store(i64::try_from(ret).unwrap_or(-1), Ordering::Release);
        lt.io().err.store(i64::from(err), Ordering::Release);

        tracing::trace!(fd = req.fd, ret, err, "io worker: syscall complete");

        let origin = lt.origin().clone();
        origin.defer(lt.clone());
        origin.wake();
    }
}

/// The fixed pool of `IO_WORKERS` I/O worker threads (spec §4.B).
pub struct IoWorkerPool<C: SwitchContext> {
    workers: Vec<Arc<IoWorker<C>>>,
    next: AtomicUsize,
}

impl<C: SwitchContext> IoWorkerPool<C> {
    /// Create the pool and spawn all worker threads. I/O workers are created
    /// once and live for the process (spec §3 lifecycle).
    ///
    /// # Panics
    ///
    /// Panics if an OS thread cannot be spawned for a worker.
    pub fn new(config: &Config) -> Arc<Self> {
        let workers: Vec<_> = (0..config.io_workers)
            .map(|i| {
                let worker = IoWorker::new();
                let run_on = worker.clone();
                thread::Builder::new()
                    .name(format!("io-worker-{i}"))
                    .spawn(move || run_on.run())
                    .expect("failed to spawn io worker thread");
                worker
            })
            .collect();
        Arc::new(Self {
            workers,
            next: AtomicUsize::new(0),
        })
    }

    /// Offloaded `read` (spec §4.B). Blocks the calling lthread (by
    /// yielding to its origin) until a worker has performed the syscall.
    ///
    /// # Errors
    ///
    /// Returns [`OffloadError::Io`] if the underlying `read(2)` returns `-1`.
    pub fn offload_read(
        &self,
        lt: &Arc<Lthread<C>>,
        fd: RawFd,
        buf: &mut [u8],
    ) -> Result<usize, OffloadError> {
        self.offload(
            lt,
            fd,
            buf.as_mut_ptr(),
            buf.len(),
            LthreadState::WAIT_IO_READ,
        )
    }

    /// Offloaded `write` (spec §4.B), symmetric to `offload_read`.
    ///
    /// # Errors
    ///
    /// Returns [`OffloadError::Io`] if the underlying `write(2)` returns `-1`.
    pub fn offload_write(
        &self,
        lt: &Arc<Lthread<C>>,
        fd: RawFd,
        buf: &[u8],
    ) -> Result<usize, OffloadError> {
        self.offload(
            lt,
            fd,
            buf.as_ptr().cast_mut(),
            buf.len(),
            LthreadState::WAIT_IO_WRITE,
        )
    }

    fn offload(
        &self,
        lt: &Arc<Lthread<C>>,
        fd: RawFd,
        buf: *mut u8,
        nbytes: usize,
        flag: LthreadState,
    ) -> Result<usize, OffloadError> {
        lt.insert_state(flag);
        lt.io().set_request(IoRequest { fd, buf, nbytes });

        // Enqueue protocol (spec §4.B caller side).
        lt.origin().push_busy(lt.clone());
        let worker = self.select_worker();
        {
            let mut queue = worker.queue.lock().unwrap();
            queue.push_back(lt.clone());
        }
        worker.queue_cond.notify_one();

        lt.yield_to_origin();

        lt.remove_state(flag);

        let ret = lt.io().ret.load(Ordering::Acquire);
        if ret == -1 {
            let err = i32::try_from(lt.io().err.load(Ordering::Acquire)).unwrap_or(0);
            Err(OffloadError::Io(io::Error::from_raw_os_error(err)))
        } else {
            Ok(usize::try_from(ret).unwrap_or(0))
        }
    }

    /// Strict round-robin over the worker slots (spec §4.B selection).
    fn select_worker(&self) -> &Arc<IoWorker<C>> {
        let idx = self.next.fetch_add(1, Ordering::Relaxed) % self.workers.len();
        &self.workers[idx]
    }
}
