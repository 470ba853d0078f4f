/// Still and animated image decoding.
pub mod decode;
/// Media items, kinds and directory discovery.
pub mod item;
/// Video probing and streaming decode through the system `ffmpeg`.
pub mod media;
