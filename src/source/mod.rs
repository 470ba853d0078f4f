/// Per-item foreground frame sequences.
pub mod frame_source;
