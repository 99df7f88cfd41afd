//! Depth-ordered drawable queue
//!
//! Drawables accumulate during scene assembly and are replayed farthest
//! first, so nearer geometry paints over farther geometry without relying on
//! the depth buffer for blended content. Entries at the same distance replay
//! in insertion order.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

struct OrderedEntry<D> {
    drawable: D,
    distance: f64,
    sequence: u64,
}

impl<D> PartialEq for OrderedEntry<D> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl<D> Eq for OrderedEntry<D> {}

impl<D> PartialOrd for OrderedEntry<D> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<D> Ord for OrderedEntry<D> {
    // Max-heap: greatest distance wins; among equal distances the earliest
    // insertion wins, so equal-depth drawables keep submission order.
    fn cmp(&self, other: &Self) -> Ordering {
        self.distance
            .total_cmp(&other.distance)
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

/// Priority queue of drawables for one frame, ordered farthest first.
///
/// [`add_to_back`](Self::add_to_back) puts a drawable behind everything with
/// a real distance; back entries replay first, in the order they were added.
/// The queue is cleared at the start of each frame and drained during the
/// draw pass.
///
/// # Example
///
/// ```
/// use globestream_frame::FrameQueue;
///
/// let mut queue = FrameQueue::new();
/// queue.add("near", 10.0);
/// queue.add("far", 90.0);
/// queue.add_to_back("terrain");
///
/// assert_eq!(queue.poll(), Some("terrain"));
/// assert_eq!(queue.poll(), Some("far"));
/// assert_eq!(queue.poll(), Some("near"));
/// assert_eq!(queue.poll(), None);
/// ```
pub struct FrameQueue<D> {
    heap: BinaryHeap<OrderedEntry<D>>,
    next_sequence: u64,
}

impl<D> FrameQueue<D> {
    pub fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
            next_sequence: 0,
        }
    }

    /// Queue a drawable at its distance from the eye, in meters.
    ///
    /// NaN distances indicate broken view math upstream; they are treated as
    /// distance zero (drawn last) so the heap ordering stays total.
    pub fn add(&mut self, drawable: D, distance: f64) {
        debug_assert!(!distance.is_nan(), "drawable queued with NaN eye distance");
        let distance = if distance.is_nan() { 0.0 } else { distance };
        self.push(drawable, distance);
    }

    /// Queue a drawable behind everything else. Back entries replay before
    /// any distance-ordered entry, first added first.
    pub fn add_to_back(&mut self, drawable: D) {
        self.push(drawable, f64::INFINITY);
    }

    fn push(&mut self, drawable: D, distance: f64) {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.heap.push(OrderedEntry {
            drawable,
            distance,
            sequence,
        });
    }

    /// The next drawable to replay, without removing it
    pub fn peek(&self) -> Option<&D> {
        self.heap.peek().map(|entry| &entry.drawable)
    }

    /// Remove and return the next drawable to replay
    pub fn poll(&mut self) -> Option<D> {
        self.heap.pop().map(|entry| entry.drawable)
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Discard everything; called at the start of each frame
    pub fn clear(&mut self) {
        self.heap.clear();
        self.next_sequence = 0;
    }

    /// Drain the queue in replay order
    pub fn drain(&mut self) -> impl Iterator<Item = D> + '_ {
        std::iter::from_fn(move || self.poll())
    }
}

impl<D> Default for FrameQueue<D> {
    fn default() -> Self {
        Self::new()
    }
}
