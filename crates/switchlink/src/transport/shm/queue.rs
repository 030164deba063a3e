// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Bounded inter-process priority message queue.
//!
//! # Memory Layout
//!
//! ```text
//! +-------------------------+ offset 0
//! | QueueHeader (64 bytes)  |  magic, version, limits, lock,
//! |                         |  count, futex words, next_seq
//! +-------------------------+ offset 64
//! | Slot 0                  |  SlotHeader (24 bytes) + data
//! +-------------------------+ offset 64 + stride
//! | Slot 1                  |
//! +-------------------------+
//! | ...                     |
//! +-------------------------+
//! ```
//!
//! Every slot access happens under the futex lock in the header. Receivers
//! take the highest priority first, and the lowest sequence number among
//! equal priorities, so ordering is FIFO within a priority.
//!
//! Blocking uses two futex words: `not_empty` is bumped by every send and
//! `not_full` by every receive. A waiter samples the word before checking
//! the queue, so a concurrent bump makes its futex wait return immediately.

use super::futex::{futex_wait, futex_wake_all, remaining, FutexLock};
use super::segment::ShmSegment;
use super::{Result, ShmError};
use std::mem;
use std::ptr;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// "SLMQ" in little-endian
pub const QUEUE_MAGIC: u32 = 0x514D_4C53;

/// Layout version
pub const QUEUE_VERSION: u32 = 1;

/// Queue control block at the start of the segment.
#[repr(C, align(64))]
struct QueueHeader {
    /// Written last by the creator (Release)
    magic: AtomicU32,
    version: AtomicU32,
    max_msg_count: AtomicU32,
    max_msg_size: AtomicU32,
    /// Futex lock word guarding `count`, `next_seq` and all slots
    lock: AtomicU32,
    /// Occupied slots
    count: AtomicU32,
    /// Bumped on every send
    not_empty: AtomicU32,
    /// Bumped on every receive
    not_full: AtomicU32,
    /// Sequence number of the next message
    next_seq: AtomicU64,
}

const HEADER_SIZE: usize = mem::size_of::<QueueHeader>();

/// Per-slot metadata, followed by `max_msg_size` data bytes.
#[repr(C)]
#[derive(Clone, Copy)]
struct SlotHeader {
    used: u32,
    priority: u32,
    len: u32,
    _pad: u32,
    seq: u64,
}

const SLOT_HEADER_SIZE: usize = mem::size_of::<SlotHeader>();

/// Message taken from a queue.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QueuedMessage {
    pub data: Vec<u8>,
    pub priority: u32,
}

/// Handle to a named message queue.
///
/// The creating side unlinks the name when the handle is dropped.
pub struct ShmMessageQueue {
    segment: ShmSegment,
    max_msg_count: usize,
    max_msg_size: usize,
    stride: usize,
    unlink_on_drop: bool,
}

impl ShmMessageQueue {
    /// Bytes needed for a queue with these limits.
    pub fn segment_size(max_msg_count: usize, max_msg_size: usize) -> usize {
        HEADER_SIZE + max_msg_count * Self::stride_for(max_msg_size)
    }

    fn stride_for(max_msg_size: usize) -> usize {
        (SLOT_HEADER_SIZE + max_msg_size + 7) & !7
    }

    fn check_limits(max_msg_count: usize, max_msg_size: usize) -> Result<()> {
        if max_msg_count == 0 || max_msg_count > u32::MAX as usize {
            return Err(ShmError::InvalidCapacity(max_msg_count));
        }
        if max_msg_size == 0 || max_msg_size > u32::MAX as usize {
            return Err(ShmError::InvalidCapacity(max_msg_size));
        }
        Ok(())
    }

    /// Create (or re-create) the queue `name`.
    pub fn create(name: &str, max_msg_count: usize, max_msg_size: usize) -> Result<Self> {
        Self::check_limits(max_msg_count, max_msg_size)?;
        let segment = ShmSegment::create(name, Self::segment_size(max_msg_count, max_msg_size))?;

        let queue = Self {
            segment,
            max_msg_count,
            max_msg_size,
            stride: Self::stride_for(max_msg_size),
            unlink_on_drop: true,
        };

        // Segment is zeroed: lock free, count 0, every slot unused
        let header = queue.header();
        header.version.store(QUEUE_VERSION, Ordering::Relaxed);
        header.max_msg_count.store(max_msg_count as u32, Ordering::Relaxed);
        header.max_msg_size.store(max_msg_size as u32, Ordering::Relaxed);
        header.magic.store(QUEUE_MAGIC, Ordering::Release);

        Ok(queue)
    }

    /// Attach to an existing queue created with the same limits.
    pub fn open(name: &str, max_msg_count: usize, max_msg_size: usize) -> Result<Self> {
        Self::check_limits(max_msg_count, max_msg_size)?;
        let segment = ShmSegment::open(name, Self::segment_size(max_msg_count, max_msg_size))?;

        let queue = Self {
            segment,
            max_msg_count,
            max_msg_size,
            stride: Self::stride_for(max_msg_size),
            unlink_on_drop: false,
        };

        let header = queue.header();
        if header.magic.load(Ordering::Acquire) != QUEUE_MAGIC {
            return Err(ShmError::InvalidLayout(format!("{}: bad magic", name)));
        }
        let version = header.version.load(Ordering::Relaxed);
        if version != QUEUE_VERSION {
            return Err(ShmError::InvalidLayout(format!(
                "{}: version {} (expected {})",
                name, version, QUEUE_VERSION
            )));
        }
        let count = header.max_msg_count.load(Ordering::Relaxed) as usize;
        let size = header.max_msg_size.load(Ordering::Relaxed) as usize;
        if count != max_msg_count || size != max_msg_size {
            return Err(ShmError::InvalidLayout(format!(
                "{}: limits {}x{} bytes, expected {}x{} bytes",
                name, count, size, max_msg_count, max_msg_size
            )));
        }

        Ok(queue)
    }

    /// Queue name.
    pub fn name(&self) -> &str {
        self.segment.name()
    }

    /// Largest message accepted.
    pub fn max_msg_size(&self) -> usize {
        self.max_msg_size
    }

    /// Number of slots.
    pub fn capacity(&self) -> usize {
        self.max_msg_count
    }

    /// Messages currently queued.
    pub fn len(&self) -> usize {
        self.header().count.load(Ordering::Acquire) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Enqueue, blocking while the queue is full.
    pub fn send(&self, data: &[u8], priority: u32) -> Result<()> {
        self.send_until(data, priority, None).map(|_| ())
    }

    /// Enqueue, waiting at most `timeout` for a free slot.
    ///
    /// Returns `Ok(false)` if the queue stayed full.
    pub fn send_timeout(&self, data: &[u8], priority: u32, timeout: Duration) -> Result<bool> {
        self.send_until(data, priority, Some(Instant::now() + timeout))
    }

    /// Enqueue without blocking. Returns `Ok(false)` if the queue is full.
    pub fn try_send(&self, data: &[u8], priority: u32) -> Result<bool> {
        self.send_until(data, priority, Some(Instant::now()))
    }

    /// Dequeue the highest-priority message, waiting at most `timeout`.
    pub fn receive_timeout(&self, timeout: Duration) -> Result<Option<QueuedMessage>> {
        let deadline = Instant::now() + timeout;
        let header = self.header();

        loop {
            let seen = header.not_empty.load(Ordering::Acquire);

            if let Some(msg) = self.try_take() {
                futex_wake_all(&header.not_full);
                return Ok(Some(msg));
            }

            let Some(left) = remaining(deadline) else {
                return Ok(None);
            };
            futex_wait(&header.not_empty, seen, Some(left));
        }
    }

    fn send_until(&self, data: &[u8], priority: u32, deadline: Option<Instant>) -> Result<bool> {
        if data.len() > self.max_msg_size {
            return Err(ShmError::PayloadTooLarge {
                size: data.len(),
                capacity: self.max_msg_size,
            });
        }
        let header = self.header();

        loop {
            let seen = header.not_full.load(Ordering::Acquire);

            if self.try_put(data, priority) {
                futex_wake_all(&header.not_empty);
                return Ok(true);
            }

            let timeout = match deadline {
                None => None,
                Some(d) => match remaining(d) {
                    Some(left) => Some(left),
                    None => return Ok(false),
                },
            };
            futex_wait(&header.not_full, seen, timeout);
        }
    }

    /// Write into a free slot under the lock. False if full.
    fn try_put(&self, data: &[u8], priority: u32) -> bool {
        let header = self.header();
        let _guard = FutexLock::new(&header.lock).lock();

        if header.count.load(Ordering::Relaxed) as usize >= self.max_msg_count {
            return false;
        }

        let Some(index) = (0..self.max_msg_count).find(|&i| self.read_slot(i).used == 0) else {
            // count says there is room; a free slot must exist
            return false;
        };

        let seq = header.next_seq.fetch_add(1, Ordering::Relaxed);
        let slot = self.slot_ptr(index);
        // SAFETY: slot points at a slot of `stride` bytes inside the mapping;
        // data fits (checked against max_msg_size) and the lock is held.
        unsafe {
            ptr::copy_nonoverlapping(data.as_ptr(), slot.add(SLOT_HEADER_SIZE), data.len());
            ptr::write(
                slot as *mut SlotHeader,
                SlotHeader {
                    used: 1,
                    priority,
                    len: data.len() as u32,
                    _pad: 0,
                    seq,
                },
            );
        }

        header.count.fetch_add(1, Ordering::Release);
        header.not_empty.fetch_add(1, Ordering::Release);
        true
    }

    /// Remove the best message under the lock. None if empty.
    fn try_take(&self) -> Option<QueuedMessage> {
        let header = self.header();
        let _guard = FutexLock::new(&header.lock).lock();

        if header.count.load(Ordering::Relaxed) == 0 {
            return None;
        }

        let mut best: Option<(usize, SlotHeader)> = None;
        for i in 0..self.max_msg_count {
            let slot = self.read_slot(i);
            if slot.used == 0 {
                continue;
            }
            let better = match &best {
                None => true,
                Some((_, b)) => {
                    slot.priority > b.priority || (slot.priority == b.priority && slot.seq < b.seq)
                }
            };
            if better {
                best = Some((i, slot));
            }
        }
        let (index, meta) = best?;

        let len = (meta.len as usize).min(self.max_msg_size);
        let slot = self.slot_ptr(index);
        let mut data = vec![0u8; len];
        // SAFETY: slot is inside the mapping, len <= max_msg_size, lock held.
        unsafe {
            ptr::copy_nonoverlapping(slot.add(SLOT_HEADER_SIZE), data.as_mut_ptr(), len);
            (*(slot as *mut SlotHeader)).used = 0;
        }

        header.count.fetch_sub(1, Ordering::Release);
        header.not_full.fetch_add(1, Ordering::Release);
        Some(QueuedMessage {
            data,
            priority: meta.priority,
        })
    }

    fn header(&self) -> &QueueHeader {
        // SAFETY: the segment is at least HEADER_SIZE bytes, page aligned
        // (so aligned for QueueHeader) and lives as long as self. The header
        // only contains atomics.
        unsafe { &*(self.segment.as_ptr() as *const QueueHeader) }
    }

    fn slot_ptr(&self, index: usize) -> *mut u8 {
        debug_assert!(index < self.max_msg_count);
        // SAFETY: index < max_msg_count, so the offset is inside the mapping.
        unsafe { self.segment.as_ptr().add(HEADER_SIZE + index * self.stride) }
    }

    fn read_slot(&self, index: usize) -> SlotHeader {
        // SAFETY: slot headers are 8-byte aligned (HEADER_SIZE and stride are
        // multiples of 8) and only accessed with the lock held.
        unsafe { ptr::read(self.slot_ptr(index) as *const SlotHeader) }
    }
}

impl Drop for ShmMessageQueue {
    fn drop(&mut self) {
        if self.unlink_on_drop {
            if let Err(e) = ShmSegment::unlink(self.segment.name()) {
                log::warn!("[SHM] unlink {} failed: {}", self.segment.name(), e);
            } else {
                log::debug!("[SHM] unlinked queue {}", self.segment.name());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn unique_name() -> String {
        static COUNTER: AtomicU32 = AtomicU32::new(0);
        format!(
            "/switchlink_q_{}_{}",
            std::process::id(),
            COUNTER.fetch_add(1, Ordering::Relaxed)
        )
    }

    #[test]
    fn test_header_layout() {
        assert_eq!(HEADER_SIZE, 64);
        assert_eq!(SLOT_HEADER_SIZE, 24);
        assert_eq!(ShmMessageQueue::stride_for(1), 32);
        assert_eq!(ShmMessageQueue::segment_size(2, 8), 64 + 2 * 32);
    }

    #[test]
    fn test_send_receive() {
        let name = unique_name();
        let queue = ShmMessageQueue::create(&name, 4, 64).expect("create");

        queue.send(b"hello", 2).expect("send");
        assert_eq!(queue.len(), 1);

        let msg = queue
            .receive_timeout(Duration::from_millis(100))
            .expect("receive")
            .expect("message");
        assert_eq!(msg.data, b"hello");
        assert_eq!(msg.priority, 2);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_priority_then_fifo() {
        let name = unique_name();
        let queue = ShmMessageQueue::create(&name, 8, 16).expect("create");

        queue.send(b"low-1", 1).expect("send");
        queue.send(b"high-1", 3).expect("send");
        queue.send(b"low-2", 1).expect("send");
        queue.send(b"high-2", 3).expect("send");
        queue.send(b"mid", 2).expect("send");

        let order: Vec<Vec<u8>> = (0..5)
            .map(|_| {
                queue
                    .receive_timeout(Duration::from_millis(100))
                    .expect("receive")
                    .expect("message")
                    .data
            })
            .collect();
        let expected = vec![
            b"high-1".to_vec(),
            b"high-2".to_vec(),
            b"mid".to_vec(),
            b"low-1".to_vec(),
            b"low-2".to_vec(),
        ];
        assert_eq!(order, expected);
    }

    #[test]
    fn test_full_queue() {
        let name = unique_name();
        let queue = ShmMessageQueue::create(&name, 2, 16).expect("create");

        assert!(queue.try_send(b"a", 0).expect("send"));
        assert!(queue.try_send(b"b", 0).expect("send"));
        assert!(!queue.try_send(b"c", 0).expect("send"));
        assert!(!queue
            .send_timeout(b"c", 0, Duration::from_millis(20))
            .expect("send"));
    }

    #[test]
    fn test_receive_timeout_on_empty() {
        let name = unique_name();
        let queue = ShmMessageQueue::create(&name, 2, 16).expect("create");

        let start = Instant::now();
        assert!(queue
            .receive_timeout(Duration::from_millis(30))
            .expect("receive")
            .is_none());
        assert!(start.elapsed() >= Duration::from_millis(25));
    }

    #[test]
    fn test_payload_too_large() {
        let name = unique_name();
        let queue = ShmMessageQueue::create(&name, 2, 4).expect("create");
        assert!(matches!(
            queue.send(b"too long", 0),
            Err(ShmError::PayloadTooLarge { size: 8, capacity: 4 })
        ));
    }

    #[test]
    fn test_open_checks_limits() {
        let name = unique_name();
        let _queue = ShmMessageQueue::create(&name, 4, 64).expect("create");

        assert!(ShmMessageQueue::open(&name, 4, 64).is_ok());
        assert!(matches!(
            ShmMessageQueue::open(&name, 2, 64),
            Err(ShmError::InvalidLayout(_))
        ));
    }

    #[test]
    fn test_blocked_sender_released_by_receive() {
        let name = unique_name();
        let queue = Arc::new(ShmMessageQueue::create(&name, 1, 16).expect("create"));
        queue.send(b"first", 0).expect("send");

        let sender = Arc::clone(&queue);
        let handle = thread::spawn(move || sender.send(b"second", 0));

        thread::sleep(Duration::from_millis(20));
        let first = queue
            .receive_timeout(Duration::from_secs(1))
            .expect("receive")
            .expect("message");
        assert_eq!(first.data, b"first");

        handle.join().expect("sender panicked").expect("send");
        let second = queue
            .receive_timeout(Duration::from_secs(1))
            .expect("receive")
            .expect("message");
        assert_eq!(second.data, b"second");
    }

    #[test]
    fn test_cross_handle_delivery() {
        let name = unique_name();
        let owner = ShmMessageQueue::create(&name, 4, 32).expect("create");
        let attached = ShmMessageQueue::open(&name, 4, 32).expect("open");

        attached.send(b"via other mapping", 4).expect("send");
        let msg = owner
            .receive_timeout(Duration::from_millis(100))
            .expect("receive")
            .expect("message");
        assert_eq!(msg.data, b"via other mapping");
    }

    #[test]
    fn test_drop_unlinks_created_queue() {
        let name = unique_name();
        let queue = ShmMessageQueue::create(&name, 1, 8).expect("create");
        assert!(ShmSegment::exists(&name));
        drop(queue);
        assert!(!ShmSegment::exists(&name));
    }
}
