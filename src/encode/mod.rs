//! Encoding sinks.
//!
//! Sinks consume composited frames in output order and are driven by `RenderSession`.

/// `ffmpeg` subprocess sink.
pub mod ffmpeg;
/// Codec preference list and encoder knobs.
pub mod job;
/// Poster extraction and chapter muxing on the finished file.
pub mod post;
/// Sink trait and in-memory sink.
pub mod sink;
