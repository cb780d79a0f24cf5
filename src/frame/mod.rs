//! Captured frames and the shared latest-frame slot.
//!
//! The device link writes into a [`FrameSlot`] and every stream
//! connection reads from it. Nothing else is shared between the two.

mod buffer;
mod slot;

pub use buffer::Frame;
pub use slot::FrameSlot;
