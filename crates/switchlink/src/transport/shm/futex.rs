// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Futex primitives for words living in shared memory.
//!
//! The queue header holds three futex words: the queue lock and the
//! not-empty / not-full sequence words. All of them are waited on from
//! different processes, so only the SHARED futex ops are valid here:
//! `FUTEX_WAIT` (0) and `FUTEX_WAKE` (1). The `_PRIVATE` variants (128/129)
//! never wake a waiter in another process.

use std::ptr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};

#[cfg(target_os = "linux")]
const FUTEX_WAIT: i32 = 0;
#[cfg(target_os = "linux")]
const FUTEX_WAKE: i32 = 1;

/// Block while `*addr == expected`, for at most `timeout`.
///
/// Returns on wake, value mismatch, timeout or signal; callers re-check
/// their condition in a loop.
#[cfg(target_os = "linux")]
pub fn futex_wait(addr: &AtomicU32, expected: u32, timeout: Option<Duration>) {
    let ts = timeout.map(|d| libc::timespec {
        tv_sec: d.as_secs() as libc::time_t,
        tv_nsec: d.subsec_nanos() as libc::c_long,
    });
    let ts_ptr = ts
        .as_ref()
        .map_or(ptr::null(), |t| t as *const libc::timespec);

    // SAFETY: addr is a live reference for the duration of the call and the
    // remaining arguments match the FUTEX_WAIT calling convention.
    unsafe {
        libc::syscall(
            libc::SYS_futex,
            addr as *const AtomicU32 as *const u32,
            FUTEX_WAIT,
            expected,
            ts_ptr,
            ptr::null::<u32>(),
            0i32,
        );
    }
}

/// Wake up to `count` waiters blocked on `addr`.
#[cfg(target_os = "linux")]
pub fn futex_wake(addr: &AtomicU32, count: i32) {
    // SAFETY: addr is a live reference; FUTEX_WAKE ignores the timeout,
    // uaddr2 and val3 arguments.
    unsafe {
        libc::syscall(
            libc::SYS_futex,
            addr as *const AtomicU32 as *const u32,
            FUTEX_WAKE,
            count,
            ptr::null::<libc::timespec>(),
            ptr::null::<u32>(),
            0i32,
        );
    }
}

// Non-Linux fallback: short sleeps, callers poll their condition
#[cfg(not(target_os = "linux"))]
pub fn futex_wait(_addr: &AtomicU32, _expected: u32, timeout: Option<Duration>) {
    let sleep_time = timeout.unwrap_or(Duration::from_millis(1));
    std::thread::sleep(sleep_time.min(Duration::from_millis(1)));
}

#[cfg(not(target_os = "linux"))]
pub fn futex_wake(_addr: &AtomicU32, _count: i32) {}

/// Wake every waiter.
#[inline]
pub fn futex_wake_all(addr: &AtomicU32) {
    futex_wake(addr, i32::MAX);
}

/// Time left until `deadline`, `None` once it has passed.
pub fn remaining(deadline: Instant) -> Option<Duration> {
    deadline
        .checked_duration_since(Instant::now())
        .filter(|d| !d.is_zero())
}

// ============================================================================
// Inter-process lock
// ============================================================================

const UNLOCKED: u32 = 0;
const LOCKED: u32 = 1;
const CONTENDED: u32 = 2;

/// Mutex over a shared-memory futex word.
///
/// States: 0 = unlocked, 1 = locked, 2 = locked with waiters. Unlock only
/// issues a wake syscall when someone may be waiting.
pub struct FutexLock<'a> {
    word: &'a AtomicU32,
}

impl<'a> FutexLock<'a> {
    /// Wrap a lock word. The word must be zero-initialized by the creator.
    pub fn new(word: &'a AtomicU32) -> Self {
        Self { word }
    }

    /// Acquire the lock, blocking as long as needed.
    pub fn lock(&self) -> FutexGuard<'a> {
        if self
            .word
            .compare_exchange(UNLOCKED, LOCKED, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            self.lock_contended();
        }
        FutexGuard { word: self.word }
    }

    #[cold]
    fn lock_contended(&self) {
        // Brief spin: critical sections are a slot copy
        for _ in 0..100 {
            if self
                .word
                .compare_exchange(UNLOCKED, LOCKED, Ordering::Acquire, Ordering::Relaxed)
                .is_ok()
            {
                return;
            }
            std::hint::spin_loop();
        }

        while self.word.swap(CONTENDED, Ordering::Acquire) != UNLOCKED {
            futex_wait(self.word, CONTENDED, None);
        }
    }
}

/// Releases the lock on drop.
pub struct FutexGuard<'a> {
    word: &'a AtomicU32,
}

impl Drop for FutexGuard<'_> {
    fn drop(&mut self) {
        if self.word.swap(UNLOCKED, Ordering::Release) == CONTENDED {
            futex_wake(self.word, 1);
        }
    }
}
