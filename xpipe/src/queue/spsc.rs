//! Unbounded single-producer/single-consumer queue with batched visibility.
//!
//! Items live in a singly linked chain of heap nodes. The chain always ends in
//! an empty node (`back`) that the next write fills. Three producer cursors
//! split the chain:
//!
//! ```text
//!   front ........ w ............ f ............ back
//!   |  published  |  complete,    |  incomplete  |  empty
//!   |  (readable) |  unflushed    |  fragments   |  slot
//! ```
//!
//! `c` is the only field both threads touch. It holds the first unpublished
//! node, or null once the reader has found the queue empty and gone idle.
//! `flush` moves `c` from `w` to `f` with a compare-and-swap; a failed swap
//! means the reader is idle and has to be woken.

#![allow(unsafe_code)]

use std::cell::UnsafeCell;
use std::fmt;
use std::mem::MaybeUninit;
use std::ptr;
use std::sync::atomic::{AtomicPtr, Ordering};
use std::sync::Arc;

struct Node<T> {
    value: MaybeUninit<T>,
    next: *mut Node<T>,
    // Producer only. Lets `unwrite` step back over staged fragments.
    prev: *mut Node<T>,
}

impl<T> Node<T> {
    fn alloc(prev: *mut Node<T>) -> *mut Node<T> {
        Box::into_raw(Box::new(Node {
            value: MaybeUninit::uninit(),
            next: ptr::null_mut(),
            prev,
        }))
    }
}

struct Shared<T> {
    c: AtomicPtr<Node<T>>,

    // Reader only while the reader is alive.
    front: UnsafeCell<*mut Node<T>>,
}

// SAFETY: the node chain is handed between exactly one writer and one reader,
// synchronized through `c`.
unsafe impl<T: Send> Send for Shared<T> {}
unsafe impl<T: Send> Sync for Shared<T> {}

impl<T> Drop for Shared<T> {
    fn drop(&mut self) {
        let mut node = *self.front.get_mut();
        while !node.is_null() {
            // SAFETY: both ends are gone, every node from `front` on belongs to us.
            let mut boxed = unsafe { Box::from_raw(node) };
            node = boxed.next;
            // Only the trailing empty slot has no successor.
            if !node.is_null() {
                unsafe { boxed.value.assume_init_drop() };
            }
        }
    }
}

/// Creates a new empty queue, returning its two ends.
pub fn channel<T>() -> (Writer<T>, Reader<T>) {
    let stub = Node::alloc(ptr::null_mut());
    let shared = Arc::new(Shared {
        c: AtomicPtr::new(stub),
        front: UnsafeCell::new(stub),
    });

    let writer = Writer {
        shared: Arc::clone(&shared),
        back: stub,
        w: stub,
        f: stub,
    };
    let reader = Reader { shared, r: stub };

    (writer, reader)
}

/// Producer end of the queue.
pub struct Writer<T> {
    shared: Arc<Shared<T>>,

    /// Empty slot the next write fills.
    back: *mut Node<T>,

    /// First unflushed item.
    w: *mut Node<T>,

    /// One past the last complete item; the next flush publishes up to here.
    f: *mut Node<T>,
}

// SAFETY: the raw cursors point into the chain owned by `shared`.
unsafe impl<T: Send> Send for Writer<T> {}

impl<T> Writer<T> {
    /// Stages an item.
    ///
    /// An `incomplete` item is held back from every flush until a later
    /// complete item closes the message it belongs to.
    pub fn write(&mut self, value: T, incomplete: bool) {
        let next = Node::alloc(self.back);

        // SAFETY: `back` is past the publish point; the reader cannot reach it.
        let slot = unsafe { &mut *self.back };
        slot.value.write(value);
        slot.next = next;

        self.back = next;
        if !incomplete {
            self.f = self.back;
        }
    }

    /// Removes the most recently staged incomplete item.
    ///
    /// Returns `None` once only complete or published items remain.
    pub fn unwrite(&mut self) -> Option<T> {
        if self.f == self.back {
            return None;
        }

        let stale = self.back;
        // SAFETY: everything between `f` and `back` is unpublished and `f`
        // precedes `back`, so `prev` is a live staged node.
        unsafe {
            self.back = (*stale).prev;
            drop(Box::from_raw(stale));

            let slot = &mut *self.back;
            slot.next = ptr::null_mut();
            Some(slot.value.assume_init_read())
        }
    }

    /// Publishes every staged complete item.
    ///
    /// Returns true if the reader had found the queue empty and went idle,
    /// meaning it has to be told that data arrived.
    pub fn flush(&mut self) -> bool {
        if self.w == self.f {
            return false;
        }

        let idle = match self.shared.c.compare_exchange(
            self.w,
            self.f,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => false,
            Err(_) => {
                // `c` is null: the reader is parked and will not touch it
                // until it is woken.
                self.shared.c.store(self.f, Ordering::Release);
                true
            }
        };

        self.w = self.f;
        idle
    }

    /// Returns true if items were written since the last flush.
    pub fn has_unflushed(&self) -> bool {
        self.w != self.back
    }
}

impl<T> fmt::Debug for Writer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Writer")
            .field("unflushed", &self.has_unflushed())
            .finish_non_exhaustive()
    }
}

/// Consumer end of the queue.
pub struct Reader<T> {
    shared: Arc<Shared<T>>,

    /// Publish point seen by the last prefetch.
    r: *mut Node<T>,
}

// SAFETY: the raw cursor points into the chain owned by `shared`.
unsafe impl<T: Send> Send for Reader<T> {}

impl<T> Reader<T> {
    fn front(&self) -> *mut Node<T> {
        // SAFETY: only the reader reads or writes `front`.
        unsafe { *self.shared.front.get() }
    }

    /// Returns true if a published item is available.
    ///
    /// When nothing is available the reader marks itself idle, so the next
    /// flush on the writer reports that a wake-up is needed.
    pub fn check_read(&mut self) -> bool {
        let front = self.front();

        // Items prefetched by an earlier call.
        if front != self.r && !self.r.is_null() {
            return true;
        }

        self.r = self
            .shared
            .c
            .compare_exchange(front, ptr::null_mut(), Ordering::AcqRel, Ordering::Acquire)
            .unwrap_or_else(|current| current);

        front != self.r && !self.r.is_null()
    }

    /// Removes and returns the oldest published item.
    pub fn read(&mut self) -> Option<T> {
        if !self.check_read() {
            return None;
        }

        let front = self.front();
        // SAFETY: `front` precedes the publish point, so its value and `next`
        // were written before the flush that published them, and the writer
        // never touches it again.
        let node = unsafe { Box::from_raw(front) };
        let Node { value, next, .. } = *node;
        unsafe {
            *self.shared.front.get() = next;
            Some(value.assume_init())
        }
    }

    /// Returns the oldest published item without removing it.
    pub fn probe(&mut self) -> Option<&T> {
        if !self.check_read() {
            return None;
        }

        let front = self.front();
        // SAFETY: as in `read`.
        unsafe { Some((*front).value.assume_init_ref()) }
    }
}

impl<T> fmt::Debug for Reader<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reader")
            .field("idle", &self.shared.c.load(Ordering::Acquire).is_null())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::thread;

    #[test]
    fn test_write_flush_read() {
        let (mut tx, mut rx) = channel();

        tx.write(1, false);
        tx.write(2, false);
        assert!(!rx.check_read());

        tx.flush();
        assert_eq!(rx.read(), Some(1));
        assert_eq!(rx.read(), Some(2));
        assert_eq!(rx.read(), None);
    }

    #[test]
    fn test_incomplete_held_back() {
        let (mut tx, mut rx) = channel();

        tx.write("a1", true);
        tx.write("a2", true);
        tx.flush();
        assert!(!rx.check_read());

        tx.write("a3", false);
        tx.flush();
        assert_eq!(rx.read(), Some("a1"));
        assert_eq!(rx.read(), Some("a2"));
        assert_eq!(rx.read(), Some("a3"));
        assert!(rx.read().is_none());
    }

    #[test]
    fn test_unwrite_stops_at_complete() {
        let (mut tx, mut rx) = channel();

        tx.write(10, false);
        tx.write(11, true);
        tx.write(12, true);

        assert_eq!(tx.unwrite(), Some(12));
        assert_eq!(tx.unwrite(), Some(11));
        assert_eq!(tx.unwrite(), None);

        tx.flush();
        assert_eq!(rx.read(), Some(10));
        assert_eq!(rx.read(), None);

        // Slot reuse after unwrite.
        tx.write(13, false);
        tx.flush();
        assert_eq!(rx.read(), Some(13));
    }

    #[test]
    fn test_flush_reports_idle_reader() {
        let (mut tx, mut rx) = channel();

        // Reader never looked, so it is not idle yet.
        tx.write(1, false);
        assert!(!tx.flush());
        assert_eq!(rx.read(), Some(1));

        // Reader drained the queue and parked.
        assert!(rx.read().is_none());
        tx.write(2, false);
        assert!(tx.flush());

        // Reader not parked while the item is still unread.
        tx.write(3, false);
        assert!(!tx.flush());

        // Nothing to publish.
        assert!(!tx.flush());
        assert_eq!(rx.read(), Some(2));
        assert_eq!(rx.read(), Some(3));
    }

    #[test]
    fn test_probe() {
        let (mut tx, mut rx) = channel();
        assert!(rx.probe().is_none());

        tx.write(String::from("head"), false);
        tx.flush();

        assert_eq!(rx.probe().map(String::as_str), Some("head"));
        assert_eq!(rx.probe().map(String::as_str), Some("head"));
        assert_eq!(rx.read().as_deref(), Some("head"));
        assert!(rx.probe().is_none());
    }

    #[test]
    fn test_debug_reports_parked_reader() {
        let (mut tx, mut rx) = channel::<u8>();
        assert!(format!("{:?}", rx).contains("idle: false"));

        assert!(!rx.check_read());
        assert!(format!("{:?}", rx).contains("idle: true"));

        tx.write(1, false);
        assert!(tx.flush());
        assert!(format!("{:?}", rx).contains("idle: false"));
        assert_eq!(rx.read(), Some(1));
    }

    struct Counted(Arc<AtomicUsize>);

    impl Drop for Counted {
        fn drop(&mut self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_drop_releases_every_item() {
        let drops = Arc::new(AtomicUsize::new(0));
        let (mut tx, mut rx) = channel();

        for i in 0..6 {
            tx.write(Counted(Arc::clone(&drops)), i == 5);
        }
        tx.flush();
        drop(rx.read());
        assert_eq!(drops.load(Ordering::SeqCst), 1);

        drop(tx);
        assert_eq!(drops.load(Ordering::SeqCst), 1);
        drop(rx);
        assert_eq!(drops.load(Ordering::SeqCst), 6);
    }

    #[test]
    fn test_cross_thread_fifo() {
        const COUNT: u64 = 100_000;
        const BATCH: u64 = 10;

        let (mut tx, mut rx) = channel::<u64>();

        let producer = thread::spawn(move || {
            for i in 0..COUNT {
                tx.write(i, false);
                if (i + 1) % BATCH == 0 {
                    tx.flush();
                }
            }
        });

        let mut expected = 0;
        while expected < COUNT {
            match rx.read() {
                Some(v) => {
                    assert_eq!(v, expected);
                    expected += 1;

                    // A flush publishes the whole batch at once.
                    if v % BATCH == 0 {
                        for _ in 1..BATCH {
                            assert_eq!(rx.read(), Some(expected));
                            expected += 1;
                        }
                    }
                }
                None => thread::yield_now(),
            }
        }

        producer.join().unwrap();
        assert!(rx.read().is_none());
    }
}
