/// Separable Gaussian blur for RGB8 buffers.
pub mod blur;
/// Fixed-point per-pixel blends.
pub mod composite;
