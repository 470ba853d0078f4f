//! Montage turns a folder of stills, clips and animated images into one fixed-size video.
//!
//! Every item is letterboxed over a blurred, darkened fill of itself, optionally zoomed, and
//! streamed in order to an `ffmpeg` encoder subprocess:
//!
//! - Describe the run with a [`RunConfig`]
//! - Create a [`RenderSession`] and [`discover`](RenderSession::discover) the media
//! - Stream the frames into a [`FrameSink`], or let [`RenderSession::run`] encode with codec
//!   fallback
#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod foundation;

/// Media items, decoding and discovery.
pub mod assets;
/// Run configuration.
pub mod config;
pub(crate) mod effects;
/// Encoding sinks.
pub mod encode;
/// Natural path ordering.
pub mod ordering;
/// Compositing.
pub mod render;
/// Sequencing.
pub mod sequence;
/// Session-oriented rendering API.
pub mod session;
/// Per-item frame sources.
pub mod source;

pub use crate::foundation::core::{Canvas, CanvasPreset, Fps, FrameIndex, FrameRange};
pub use crate::foundation::error::{MontageError, MontageResult};

pub use crate::assets::item::{MediaItem, MediaKind, discover_media};
pub use crate::config::RunConfig;
pub use crate::encode::ffmpeg::{FfmpegSink, FfmpegSinkOpts, is_ffmpeg_on_path};
pub use crate::encode::job::{Container, EncodeSettings, PixelDepth, VideoCodec};
pub use crate::encode::sink::{FrameSink, InMemorySink, SinkConfig};
pub use crate::render::frame::FrameRgb;
pub use crate::sequence::sequencer::{RenderMode, SequenceReport};
pub use crate::session::render_session::{
    FfmpegSinkFactory, RenderReport, RenderSession, SinkFactory,
};
pub use crate::source::frame_source::PlaybackPolicy;
