mod common;

use common::TestLoop;
use evpoll::{
    backend::poll::PollBackend, AsPoller, BackendKind, IoCondition, PollFd, Poller,
};
use std::{
    io::Write,
    os::{fd::AsRawFd, unix::net::UnixStream},
    sync::{atomic::Ordering, Arc},
    time::{Duration, Instant},
};

fn all_ready(fds: &mut [PollFd], _timeout: i32) -> nix::Result<usize> {
    for pfd in fds.iter_mut() {
        pfd.revents = pfd.events;
    }
    Ok(fds.len())
}

fn failing_poll(_fds: &mut [PollFd], _timeout: i32) -> nix::Result<usize> {
    Err(nix::errno::Errno::EIO)
}

fn backend(max_priority: i32, timeout: i32) -> (Arc<TestLoop>, Arc<PollBackend>) {
    let ctx = Arc::new(TestLoop::new(max_priority, timeout));
    let backend = Arc::new(PollBackend::new(ctx.clone()));
    (ctx, backend)
}

#[test]
fn priority_threshold_selects_records() {
    let (ctx, backend) = backend(0, 0);
    backend.set_poll_func(Some(all_ready));

    backend.add_fd(5, IoCondition::IN, 0).unwrap();
    backend.add_fd(7, IoCondition::IN, 10).unwrap();

    assert!(backend.iterate(false, false));
    assert_eq!(ctx.checked_fds(), [5]);

    ctx.set_max_priority(10);
    assert!(backend.iterate(false, false));
    assert_eq!(ctx.checked_fds(), [5, 7]);
}

#[test]
fn wait_array_grows_to_fit() {
    let (ctx, backend) = backend(100, 0);
    backend.set_poll_func(Some(all_ready));

    backend.add_fd(1, IoCondition::IN, 1).unwrap();
    assert!(backend.iterate(false, false));
    assert_eq!(ctx.checked_fds(), [1]);

    for fd in 2..20 {
        backend.add_fd(fd, IoCondition::IN, 20 - fd).unwrap();
    }
    assert!(backend.iterate(false, false));

    // fd 1 and fd 19 share priority 1, registration order breaks the tie
    let mut expected = vec![1];
    expected.extend((2..20).rev());
    assert_eq!(ctx.checked_fds(), expected);
}

#[test]
fn mutations_wake_the_loop() {
    let (ctx, backend) = backend(0, 0);

    backend.add_fd(3, IoCondition::IN, 0).unwrap();
    backend.modify_fd(3, IoCondition::OUT, 0).unwrap();
    backend.remove_fd(3).unwrap();

    assert_eq!(ctx.wakeups.load(Ordering::SeqCst), 3);
    assert!(backend.is_empty());
}

#[test]
fn priority_change_reorders() {
    let (ctx, backend) = backend(10, 0);
    backend.set_poll_func(Some(all_ready));

    backend.add_fd(5, IoCondition::IN, 0).unwrap();
    backend.add_fd(7, IoCondition::IN, 5).unwrap();
    backend.modify_fd(5, IoCondition::IN, 8).unwrap();

    backend.iterate(false, false);
    assert_eq!(ctx.checked_fds(), [7, 5]);

    backend.modify_fd(5, IoCondition::IN, 50).unwrap();
    backend.iterate(false, false);
    assert_eq!(ctx.checked_fds(), [7]);
}

#[test]
fn reports_real_readiness() {
    let (ctx, backend) = backend(0, 1000);
    let (mut tx, rx) = UnixStream::pair().unwrap();

    backend.add_fd(rx.as_raw_fd(), IoCondition::IN, 0).unwrap();
    assert!(!backend.iterate(false, true));
    assert_eq!(ctx.dispatches.load(Ordering::SeqCst), 0);

    tx.write_all(b"x").unwrap();
    assert!(backend.iterate(true, true));
    assert_eq!(ctx.ready_fds(), [rx.as_raw_fd()]);
    assert_eq!(ctx.dispatches.load(Ordering::SeqCst), 1);
}

#[test]
fn empty_mask_does_not_wake_the_loop() {
    let (ctx, backend) = backend(0, 200);
    let (tx, rx) = UnixStream::pair().unwrap();
    drop(tx);

    // a hung-up socket nobody wants events from
    backend.add_fd(rx.as_raw_fd(), IoCondition::empty(), 0).unwrap();

    let start = Instant::now();
    assert!(!backend.iterate(true, false));
    assert!(start.elapsed() >= Duration::from_millis(100));
    assert_eq!(ctx.checked_fds(), [-1]);
    assert!(ctx.ready_fds().is_empty());

    backend.modify_fd(rx.as_raw_fd(), IoCondition::IN, 0).unwrap();
    assert!(backend.iterate(true, false));
    assert_eq!(ctx.ready_fds(), [rx.as_raw_fd()]);
}

#[test]
fn pending_source_skips_the_wait() {
    let (ctx, backend) = backend(0, 10_000);
    let (_tx, rx) = UnixStream::pair().unwrap();
    backend.add_fd(rx.as_raw_fd(), IoCondition::IN, 0).unwrap();

    ctx.pending.store(true, Ordering::SeqCst);
    let start = Instant::now();
    backend.iterate(true, false);
    assert!(start.elapsed() < Duration::from_secs(5));
}

#[test]
fn change_during_pass_aborts_it() {
    let (ctx, backend) = backend(0, 0);
    let (_tx, rx) = UnixStream::pair().unwrap();
    backend.add_fd(rx.as_raw_fd(), IoCondition::IN, 0).unwrap();

    let mutator = Arc::clone(&backend);
    ctx.on_timeout(move || {
        mutator.add_fd(42, IoCondition::IN, 0).unwrap();
    });

    assert!(!backend.iterate(true, true));
    assert_eq!(ctx.checks(), 0);

    // the next pass sees the new set
    backend.set_poll_func(Some(all_ready));
    assert!(backend.iterate(true, false));
    assert_eq!(ctx.checked_fds(), [rx.as_raw_fd(), 42]);
}

#[test]
fn concurrent_registration() {
    let (ctx, backend) = backend(i32::MAX, 0);
    backend.set_poll_func(Some(all_ready));

    let handles: Vec<_> = (0..4)
        .map(|t| {
            let backend = Arc::clone(&backend);
            std::thread::spawn(move || {
                for i in 0..25 {
                    let fd = 100 + t * 25 + i;
                    backend.add_fd(fd, IoCondition::IN, i).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(backend.len(), 100);
    assert!(backend.iterate(false, false));
    assert_eq!(ctx.checked_fds().len(), 100);
    assert_eq!(ctx.wakeups.load(Ordering::SeqCst), 100);
}

#[test]
fn failed_wait_reports_nothing_ready() {
    let (ctx, backend) = backend(0, 0);
    backend.set_poll_func(Some(failing_poll));
    backend.add_fd(5, IoCondition::IN, 0).unwrap();

    assert!(!backend.iterate(false, false));
    assert_eq!(ctx.checks(), 1);
    assert!(ctx.ready_fds().is_empty());
}

#[test]
fn poll_func_can_be_restored() {
    let (ctx, backend) = backend(0, 0);
    let (_tx, rx) = UnixStream::pair().unwrap();
    backend.add_fd(rx.as_raw_fd(), IoCondition::IN, 0).unwrap();

    backend.set_poll_func(Some(all_ready));
    assert!(backend.iterate(false, false));

    backend.set_poll_func(None);
    assert!(!backend.iterate(false, false));
    assert!(ctx.ready_fds().is_empty());
}

#[test]
fn reset_drops_everything() {
    let (ctx, backend) = backend(0, 0);
    backend.set_poll_func(Some(all_ready));
    backend.add_fd(5, IoCondition::IN, 0).unwrap();
    backend.reset().unwrap();

    assert!(backend.is_empty());
    assert!(!backend.iterate(false, false));
    assert!(ctx.checked_fds().is_empty());
}

#[test]
fn poller_selects_poll_variant() {
    let ctx = Arc::new(TestLoop::new(0, 0));
    let poller = Poller::new(BackendKind::Poll, ctx).unwrap();
    assert_eq!(poller.kind(), BackendKind::Poll);
    assert!(poller.acquire());
}
