//! Color-coded picking
//!
//! During a pick frame every drawable paints with a unique flat RGB color
//! into an off-screen target; reading the pixel under the cursor back and
//! looking its color up yields the picked object. The coordinator hands out
//! the colors and keeps the color-to-object table for one frame.

use std::collections::HashMap;

use crate::FrameQueue;

/// White. Never assigned as a pick color; the counter wraps back to 1
/// before reaching it, so assigned colors stay strictly below.
pub const MAX_PICK_COLOR: u32 = 0x00FF_FFFF;

/// Pack 8-bit RGB channels into the low 24 bits of a u32
pub fn pack_rgb(r: u8, g: u8, b: u8) -> u32 {
    ((r as u32) << 16) | ((g as u32) << 8) | b as u32
}

/// Split a packed color back into (r, g, b)
pub fn unpack_rgb(color: u32) -> (u8, u8, u8) {
    ((color >> 16) as u8, (color >> 8) as u8, color as u8)
}

/// One registration in the pick table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PickedObject {
    pub color: u32,
    pub object_id: u64,
    pub is_terrain: bool,
}

/// Reads a pixel back from the pick render target.
///
/// Implementors normalize the frame's clear color to 0 before returning, so
/// "nothing under the cursor" and "missed every drawable" look the same to
/// the coordinator.
pub trait PickReadback {
    fn color_at(&self, x: u32, y: u32) -> u32;
}

/// Hands out unique pick colors and resolves them back to objects.
///
/// Color 0 is reserved for "no hit" and the frame's clear color is never
/// assigned, so any readback equal to either resolves to nothing.
///
/// # Example
///
/// ```
/// use globestream_frame::PickCoordinator;
///
/// let mut pick = PickCoordinator::new();
/// pick.begin_frame(0x000000);
///
/// let color = pick.next_color();
/// pick.register(color, 42, false);
/// assert_eq!(pick.top_object(color), Some(42));
/// assert_eq!(pick.top_object(0), None);
/// ```
pub struct PickCoordinator {
    next_number: u32,
    clear_color: u32,
    objects: HashMap<u32, PickedObject>,
}

impl PickCoordinator {
    pub fn new() -> Self {
        Self {
            next_number: 0,
            clear_color: 0,
            objects: HashMap::new(),
        }
    }

    /// Reset for a new pick frame. Colors assigned in earlier frames are
    /// forgotten and will be handed out again.
    pub fn begin_frame(&mut self, clear_color: u32) {
        self.next_number = 0;
        self.clear_color = clear_color & MAX_PICK_COLOR;
        self.objects.clear();
    }

    /// Next unique pick color: counts up from 1, never returns the clear
    /// color, and never returns black (0) or white ([`MAX_PICK_COLOR`]) —
    /// the counter wraps back to 1 before reaching white.
    pub fn next_color(&mut self) -> u32 {
        loop {
            self.next_number += 1;
            if self.next_number >= MAX_PICK_COLOR {
                self.next_number = 1;
            }
            if self.next_number != self.clear_color {
                return self.next_number;
            }
        }
    }

    /// Record which object a color was assigned to this frame
    pub fn register(&mut self, color: u32, object_id: u64, is_terrain: bool) {
        self.objects.insert(
            color,
            PickedObject {
                color,
                object_id,
                is_terrain,
            },
        );
    }

    /// The object a readback color resolves to. Color 0 and the clear color
    /// mean no hit.
    pub fn top_object(&self, color: u32) -> Option<u64> {
        self.picked_object(color).map(|picked| picked.object_id)
    }

    /// Full registration record for a readback color
    pub fn picked_object(&self, color: u32) -> Option<PickedObject> {
        if color == 0 || color == self.clear_color {
            return None;
        }
        self.objects.get(&color).copied()
    }

    /// Read the pixel at (x, y) and resolve it
    pub fn resolve(&self, readback: &dyn PickReadback, x: u32, y: u32) -> Option<PickedObject> {
        self.picked_object(readback.color_at(x, y) & MAX_PICK_COLOR)
    }
}

impl Default for PickCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

/// Drawables that can share one pick color as a batch.
///
/// Returning the same `Some(group)` from consecutive queue entries lets the
/// pick pass draw them in one call under one color; `None` means the
/// drawable always picks alone.
pub trait PickBatchable {
    fn batch_group(&self) -> Option<u64>;
}

/// Pull the next pick batch off the queue.
///
/// Consecutive entries sharing a `Some` batch group come back together; an
/// entry with no group (or a different group) ends the batch and is returned
/// alone on a later call. Returns `None` once the queue is empty.
pub fn next_batch<D: PickBatchable>(queue: &mut FrameQueue<D>) -> Option<Vec<D>> {
    let first = queue.poll()?;
    let group = first.batch_group();
    let mut batch = vec![first];

    if let Some(group) = group {
        while queue.peek().map(PickBatchable::batch_group) == Some(Some(group)) {
            // unwrap is fine: peek just said there's an entry
            batch.push(queue.poll().unwrap());
        }
    }
    Some(batch)
}
