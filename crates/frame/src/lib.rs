//! Per-frame ordering and picking
//!
//! Two small pieces of frame machinery: a [`FrameQueue`] that replays
//! drawables farthest first, and a [`PickCoordinator`] that assigns unique
//! RGB pick colors and resolves them back to objects after readback.

pub mod ordered;
pub mod pick;

pub use ordered::FrameQueue;
pub use pick::{
    next_batch, pack_rgb, unpack_rgb, PickBatchable, PickCoordinator, PickReadback, PickedObject,
    MAX_PICK_COLOR,
};
