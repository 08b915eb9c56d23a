//! Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
//! http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
//! http://opensource.org/licenses/MIT>, at your option. This file may not be
//! copied, modified, or distributed except according to those terms.

//! End-to-end scenarios for the I/O worker pool (spec §8, items 5-6).

mod common;

use common::{new_origin, poll_for_wake, spawn_lthread};
use lthread_offload::{Config, IoWorkerPool};
use std::sync::mpsc;
use std::time::Duration;

/// Scenario 5: a pipe read offloaded via `offload_read` returns once a
/// separate OS thread writes to the pipe, and the origin is free to observe
/// other progress in the meantime.
#[test]
fn io_offload_read_from_pipe() {
    let (origin, _poller) = new_origin();
    let pool = IoWorkerPool::new(&Config::default());

    let mut fds = [0i32; 2];
    // SAFETY: `fds` is a valid two-element array receiving the pipe's ends.
    assert_eq!(unsafe { libc::pipe(fds.as_mut_ptr()) }, 0);
    let [read_fd, write_fd] = fds;

    let writer = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(50));
        // SAFETY: `write_fd` is a valid, open pipe write end; `b"abcd"` is a
        // live 4-byte buffer for the duration of the call.
        let n = unsafe { libc::write(write_fd, b"abcd".as_ptr().cast(), 4) };
        assert_eq!(n, 4);
        // SAFETY: `write_fd` is not used again after this close.
        unsafe { libc::close(write_fd) };
    });

    let (tx, rx) = mpsc::channel();
    let pool_for_lt = pool.clone();
    let (lt, _handle) = spawn_lthread(&origin, move |lt| {
        let mut buf = [0u8; 4];
        let n = pool_for_lt.offload_read(&lt, read_fd, &mut buf).unwrap();
        tx.send((n, buf)).unwrap();
    });

    // The origin itself is free to do other work here; the offloading
    // lthread yielded and is parked on the I/O worker, not on the origin.
    assert!(origin.busy_len() <= 1);

    assert!(poll_for_wake(&origin, Duration::from_secs(2)));
    let mut resumed = Vec::new();
    origin.drain_defer(|lt| resumed.push(lt));
    assert_eq!(resumed.len(), 1);
    common::resume(&origin, &lt);

    let (n, buf) = rx
        .recv_timeout(Duration::from_secs(2))
        .expect("io_read never completed");
    assert_eq!(n, 4);
    assert_eq!(&buf, b"abcd");

    writer.join().unwrap();
    // SAFETY: `read_fd` is not used again after this close.
    unsafe { libc::close(read_fd) };
}

/// Scenario 6: offloading a read on a bad file descriptor surfaces `EBADF`.
#[test]
fn io_offload_read_error_surfaces_errno() {
    let (origin, _poller) = new_origin();
    let pool = IoWorkerPool::new(&Config::default());

    let (tx, rx) = mpsc::channel();
    let pool_for_lt = pool.clone();
    let (lt, _handle) = spawn_lthread(&origin, move |lt| {
        let mut buf = [0u8; 1];
        let result = pool_for_lt.offload_read(&lt, -1, &mut buf);
        tx.send(result).unwrap();
    });

    assert!(poll_for_wake(&origin, Duration::from_secs(2)));
    origin.drain_defer(|_| {});
    common::resume(&origin, &lt);

    let result = rx
        .recv_timeout(Duration::from_secs(2))
        .expect("io_read never completed");
    let err = result.expect_err("read on fd -1 must fail");
    match err {
        lthread_offload::OffloadError::Io(io_err) => {
            assert_eq!(io_err.raw_os_error(), Some(libc::EBADF));
        }
        other => panic!("expected an Io error, got {other:?}"),
    }
}
