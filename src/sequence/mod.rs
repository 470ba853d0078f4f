//! Turning an ordered item list into one ordered frame stream.

/// Chapter markers and FFMETADATA rendering.
pub mod chapters;
/// Item-by-item frame production, crossfades and parallel compositing.
pub mod sequencer;
/// Frame counts, transition lengths and zoom ramps.
pub mod timing;
