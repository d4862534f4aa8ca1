use crate::utils::heap::BinaryHeap;
use std::{
    cmp::Ordering,
    sync::{Condvar, Mutex, MutexGuard},
    time::{Duration, Instant},
};

/// Anything that can say how far away it is from being ready, in signed
/// nanoseconds. Zero or negative means ready now.
pub trait Delayed {
    fn delay(&self) -> i64;
}

impl<T: Delayed + ?Sized> Delayed for Box<T> {
    fn delay(&self) -> i64 {
        (**self).delay()
    }
}

fn delay_order<T: Delayed>(a: &T, b: &T) -> Ordering {
    a.delay().cmp(&b.delay())
}

struct Shared<T> {
    heap: BinaryHeap<T>,
    interrupted: bool,
}

/// An unbounded blocking priority queue ordered by ascending delay.
///
/// `offer`, `peek`, `poll` and `len` never block beyond the internal
/// mutex. `take` and `take_with_timeout` sleep until the earliest item
/// becomes ready, waking early whenever a new offer may have changed the
/// top. `interrupt` is sticky: once set, every current and future blocking
/// call returns `None`.
///
/// Two items with equal delay come back in unspecified order, and
/// concurrent takers race for items; each item is delivered exactly once.
pub struct DelayQueue<T: Delayed> {
    shared: Mutex<Shared<T>>,
    available: Condvar,
}

impl<T: Delayed> DelayQueue<T> {
    pub fn new() -> Self {
        Self {
            shared: Mutex::new(Shared {
                heap: BinaryHeap::new(delay_order),
                interrupted: false,
            }),
            available: Condvar::new(),
        }
    }

    pub fn offer(&self, item: T) {
        let mut shared = self.lock();
        shared.heap.push(item);
        self.available.notify_all();
    }

    /// Applies `inspect` to the earliest item without removing it.
    pub fn peek<R>(&self, inspect: impl FnOnce(&T) -> R) -> Option<R> {
        self.lock().heap.peek().map(inspect)
    }

    /// Pops the earliest item only if it is already due.
    pub fn poll(&self) -> Option<T> {
        let mut shared = self.lock();
        let due = shared.heap.peek().is_some_and(|item| item.delay() <= 0);
        if due {
            shared.heap.pop()
        } else {
            None
        }
    }

    /// Blocks until an item is due or the queue is interrupted.
    pub fn take(&self) -> Option<T> {
        self.take_inner(None)
    }

    /// Like [`DelayQueue::take`], but gives up `timeout` after entry,
    /// measured on the monotonic clock.
    pub fn take_with_timeout(&self, timeout: Duration) -> Option<T> {
        self.take_inner(Some(Instant::now() + timeout))
    }

    /// Wakes every blocked taker and makes all blocking calls return
    /// `None` from here on.
    pub fn interrupt(&self) {
        let mut shared = self.lock();
        shared.interrupted = true;
        self.available.notify_all();
    }

    pub fn len(&self) -> usize {
        self.lock().heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().heap.is_empty()
    }

    fn take_inner(&self, deadline: Option<Instant>) -> Option<T> {
        let mut shared = self.lock();
        loop {
            if shared.interrupted {
                return None;
            }

            let until_ready = match shared.heap.peek().map(Delayed::delay) {
                Some(delay) if delay <= 0 => return shared.heap.pop(),
                Some(delay) => Some(Duration::from_nanos(delay as u64)),
                None => None,
            };

            let remaining = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return None;
                    }
                    Some(deadline - now)
                }
                None => None,
            };

            // Sleep until the top is due, the deadline passes, or an offer
            // re-arranges the heap; then look again.
            let wait = match (until_ready, remaining) {
                (Some(ready), Some(left)) => Some(ready.min(left)),
                (Some(ready), None) => Some(ready),
                (None, left) => left,
            };
            shared = match wait {
                Some(duration) => {
                    self.available
                        .wait_timeout(shared, duration)
                        .expect("delay queue lock poisoned")
                        .0
                }
                None => self
                    .available
                    .wait(shared)
                    .expect("delay queue lock poisoned"),
            };
        }
    }

    fn lock(&self) -> MutexGuard<'_, Shared<T>> {
        self.shared.lock().expect("delay queue lock poisoned")
    }
}

impl<T: Delayed> Default for DelayQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::{DelayQueue, Delayed};
    use std::{
        sync::Arc,
        thread,
        time::{Duration, Instant},
    };

    struct Item {
        delay: i64,
        value: &'static str,
    }

    impl Item {
        fn new(delay: i64, value: &'static str) -> Self {
            Self { delay, value }
        }
    }

    impl Delayed for Item {
        fn delay(&self) -> i64 {
            self.delay
        }
    }

    #[test]
    fn offer_grows_the_queue() {
        let queue = DelayQueue::new();
        queue.offer(Item::new(10, "test1"));
        queue.offer(Item::new(5, "test2"));
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn peek_sees_the_earliest_without_removing() {
        let queue = DelayQueue::new();
        queue.offer(Item::new(10, "test1"));
        queue.offer(Item::new(5, "test2"));

        assert_eq!(queue.peek(|item| item.value), Some("test2"));
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn poll_returns_only_due_items() {
        let queue = DelayQueue::new();
        queue.offer(Item::new(-1, "test1"));
        queue.offer(Item::new(5_000_000_000, "test2"));

        assert_eq!(queue.poll().map(|item| item.value), Some("test1"));
        assert_eq!(queue.len(), 1);

        // The remaining item is not ready, even though the queue is not empty.
        assert!(queue.poll().is_none());

        queue.offer(Item::new(0, "test3"));
        assert_eq!(queue.poll().map(|item| item.value), Some("test3"));
    }

    #[test]
    fn drain_by_poll_is_sorted_by_delay() {
        let queue = DelayQueue::new();
        for delay in [-5, -40, -1, -100, -7, -3, -2, -60] {
            queue.offer(Item::new(delay, "x"));
        }

        let mut delays = Vec::new();
        while let Some(item) = queue.poll() {
            delays.push(item.delay);
        }
        let mut sorted = delays.clone();
        sorted.sort();
        assert_eq!(delays, sorted);
        assert!(queue.is_empty());
    }

    #[test]
    fn take_returns_a_ready_item_immediately() {
        let queue = DelayQueue::new();
        queue.offer(Item::new(0, "test1"));
        assert_eq!(queue.take().map(|item| item.value), Some("test1"));
    }

    #[test]
    fn take_blocks_until_an_offer_arrives() {
        let queue = Arc::new(DelayQueue::new());

        let taker = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || queue.take().map(|item: Item| item.value))
        };

        thread::sleep(Duration::from_millis(10));
        queue.offer(Item::new(0, "test1"));
        assert_eq!(taker.join().unwrap(), Some("test1"));
    }

    #[test]
    fn take_observes_interrupt() {
        let queue = Arc::new(DelayQueue::<Item>::new());

        let taker = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || queue.take())
        };

        thread::sleep(Duration::from_millis(10));
        queue.interrupt();
        assert!(taker.join().unwrap().is_none());
    }

    #[test]
    fn interrupt_is_sticky() {
        let queue = DelayQueue::new();
        queue.interrupt();
        queue.offer(Item::new(0, "test1"));
        assert!(queue.take().is_none());
        assert!(queue.take_with_timeout(Duration::from_millis(10)).is_none());
    }

    #[test]
    fn take_with_timeout_gives_up_in_time() {
        let queue = DelayQueue::new();
        queue.offer(Item::new(Duration::from_millis(100).as_nanos() as i64, "test1"));

        let start = Instant::now();
        assert!(queue.take_with_timeout(Duration::from_millis(10)).is_none());
        assert!(start.elapsed() < Duration::from_millis(90));
    }

    #[test]
    fn take_with_timeout_returns_a_ready_item() {
        let queue = DelayQueue::new();
        queue.offer(Item::new(0, "test1"));
        assert_eq!(
            queue
                .take_with_timeout(Duration::from_millis(10))
                .map(|item| item.value),
            Some("test1"),
        );
    }

    #[test]
    fn take_with_timeout_catches_late_offers() {
        let queue = Arc::new(DelayQueue::new());

        let offerer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(10));
                queue.offer(Item::new(0, "test1"));
            })
        };

        assert_eq!(
            queue
                .take_with_timeout(Duration::from_millis(500))
                .map(|item| item.value),
            Some("test1"),
        );
        offerer.join().unwrap();
    }

    #[test]
    fn interrupt_releases_a_timed_take() {
        let queue = Arc::new(DelayQueue::new());
        queue.offer(Item::new(Duration::from_millis(100).as_nanos() as i64, "test1"));

        let interrupter = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(5));
                queue.interrupt();
            })
        };

        assert!(queue.take_with_timeout(Duration::from_millis(100)).is_none());
        interrupter.join().unwrap();
    }

    struct TimedItem {
        ready_at: Instant,
        value: &'static str,
    }

    impl Delayed for TimedItem {
        fn delay(&self) -> i64 {
            self.ready_at
                .saturating_duration_since(Instant::now())
                .as_nanos() as i64
        }
    }

    #[test]
    fn take_waits_out_a_short_delay() {
        let queue = DelayQueue::new();
        queue.offer(TimedItem {
            ready_at: Instant::now() + Duration::from_millis(20),
            value: "test1",
        });

        let start = Instant::now();
        assert_eq!(queue.take().map(|item| item.value), Some("test1"));
        assert!(start.elapsed() >= Duration::from_millis(10));
    }
}
