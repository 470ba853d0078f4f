/// Letterbox compositing of one output frame.
pub mod compositor;
/// Output frame buffer.
pub mod frame;
