use std::sync::Arc;

use image::RgbImage;

use crate::assets::decode::{DecodedAnimation, decode_animation_until, decode_still};
use crate::assets::item::{MediaItem, MediaKind};
use crate::assets::media::{VideoFrameStream, VideoSourceInfo, probe_video};
use crate::foundation::core::Fps;
use crate::foundation::error::{MontageError, MontageResult};
use crate::sequence::timing::frame_count;

/// What to do with a video longer than its target duration.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackPolicy {
    /// Emit the full native length.
    #[default]
    PlayThrough,
    /// Truncate to the target duration.
    Constrained,
}

/// Options shared by every source of a run.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SourceOpts {
    /// Output frame rate; sources are sampled at `i / fps`.
    pub fps: Fps,
    /// Policy for videos longer than their target.
    pub video_policy: PlaybackPolicy,
}

/// One foreground frame of an item.
#[derive(Clone, Debug)]
pub struct SourceFrame {
    /// 0-based frame index within the item.
    pub index: u64,
    /// Item-local time of the frame (`index / fps`).
    pub time_secs: f64,
    /// Decoded picture. Consecutive frames showing the same picture share the allocation.
    pub image: Arc<RgbImage>,
}

enum SourceFrames {
    Still(Arc<RgbImage>),
    Animated(DecodedAnimation),
    Video(VideoPlayback),
}

/// Lazy, finite foreground frame sequence for one media item.
///
/// Opening decodes (or probes and starts decoding) the item, so an undecodable item fails in
/// [`FrameSource::open`] and never yields frames. The iterator always yields exactly
/// [`FrameSource::frame_count`] frames.
pub struct FrameSource {
    item: MediaItem,
    fps: Fps,
    background: Arc<RgbImage>,
    frame_count: u64,
    next_index: u64,
    frames: SourceFrames,
}

impl std::fmt::Debug for FrameSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameSource")
            .field("path", &self.item.path)
            .field("kind", &self.item.kind)
            .field("frame_count", &self.frame_count)
            .field("next_index", &self.next_index)
            .finish()
    }
}

impl FrameSource {
    /// Open `item` and resolve its frame count.
    #[tracing::instrument(skip_all, fields(path = %item.path.display(), kind = item.kind.label()))]
    pub fn open(item: &MediaItem, opts: &SourceOpts) -> MontageResult<Self> {
        let target = frame_count(item.target_duration_secs, opts.fps);
        let (frames, background, count) = match item.kind {
            MediaKind::StaticImage => {
                let img = Arc::new(decode_still(&item.path)?);
                (SourceFrames::Still(img.clone()), img, target)
            }
            MediaKind::AnimatedImage => {
                // Frames past the last sampled instant are never shown.
                let last_t = opts.fps.frames_to_secs(target.saturating_sub(1));
                let anim = decode_animation_until(&item.path, Some(last_t))?;
                let first = anim
                    .frames
                    .first()
                    .cloned()
                    .ok_or_else(|| MontageError::decode("animation has no frames"))?;
                (SourceFrames::Animated(anim), first, target)
            }
            MediaKind::Video => {
                let mut playback = VideoPlayback::start(&item.path, opts.fps)?;
                let native = playback.native_frames();
                let count = match (opts.video_policy, native) {
                    (PlaybackPolicy::PlayThrough, Some(native)) => native.max(target),
                    (PlaybackPolicy::PlayThrough, None) | (PlaybackPolicy::Constrained, _) => {
                        target
                    }
                };
                // Only a clip shorter than its slot restarts at end of stream. A clip planned from
                // its own length holds its last frame when the decoder comes up a frame short.
                playback.loops = native.is_none_or(|n| n < count);
                let first = playback.first_frame();
                (SourceFrames::Video(playback), first, count)
            }
        };
        tracing::debug!(frames = count, "opened media item");

        Ok(Self {
            item: item.clone(),
            fps: opts.fps,
            background,
            frame_count: count,
            next_index: 0,
            frames,
        })
    }

    /// The item this source reads.
    pub fn item(&self) -> &MediaItem {
        &self.item
    }

    /// First decoded frame, used for the blurred background.
    pub fn background(&self) -> &Arc<RgbImage> {
        &self.background
    }

    /// Total frames this source yields.
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// On-screen duration of the item in seconds.
    pub fn duration_secs(&self) -> f64 {
        self.fps.frames_to_secs(self.frame_count)
    }
}

impl Iterator for FrameSource {
    type Item = SourceFrame;

    fn next(&mut self) -> Option<SourceFrame> {
        if self.next_index >= self.frame_count {
            return None;
        }
        let index = self.next_index;
        self.next_index += 1;
        let time_secs = self.fps.frames_to_secs(index);

        let image = match &mut self.frames {
            SourceFrames::Still(img) => img.clone(),
            SourceFrames::Animated(anim) => anim.frames[anim.frame_index_at(time_secs)].clone(),
            SourceFrames::Video(playback) => playback.next_frame(),
        };
        Some(SourceFrame {
            index,
            time_secs,
            image,
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = usize::try_from(self.frame_count - self.next_index).unwrap_or(usize::MAX);
        (left, Some(left))
    }
}

/// Decoder state of a video item: loops by restarting `ffmpeg` and holds the last good frame
/// after a mid-stream failure.
struct VideoPlayback {
    info: VideoSourceInfo,
    fps: Fps,
    stream: Option<VideoFrameStream>,
    pending: Option<Arc<RgbImage>>,
    last: Arc<RgbImage>,
    frames_this_pass: u64,
    held: bool,
    loops: bool,
}

impl VideoPlayback {
    fn start(path: &std::path::Path, fps: Fps) -> MontageResult<Self> {
        let info = probe_video(path)?;
        let mut stream = VideoFrameStream::spawn(info.clone(), fps)?;
        let first = stream.next_frame()?.ok_or_else(|| {
            MontageError::decode(format!("'{}' decoded to zero frames", path.display()))
        })?;
        tracing::debug!(
            width = info.width,
            height = info.height,
            native_fps = ?info.native_fps,
            duration_secs = ?info.duration_secs,
            has_audio = info.has_audio,
            "probed video"
        );
        let first = Arc::new(first);
        Ok(Self {
            info,
            fps,
            stream: Some(stream),
            pending: Some(first.clone()),
            last: first,
            frames_this_pass: 0,
            held: false,
            loops: true,
        })
    }

    fn native_frames(&self) -> Option<u64> {
        self.info.native_frames(self.fps)
    }

    fn first_frame(&self) -> Arc<RgbImage> {
        self.last.clone()
    }

    fn next_frame(&mut self) -> Arc<RgbImage> {
        if let Some(frame) = self.pending.take() {
            self.frames_this_pass += 1;
            return frame;
        }
        if self.held {
            return self.last.clone();
        }
        match self.read() {
            Ok(Some(frame)) => {
                self.frames_this_pass += 1;
                self.last = Arc::new(frame);
            }
            // End of stream: loop from the start unless the pass produced nothing.
            Ok(None) if self.loops && self.frames_this_pass > 0 => {
                self.frames_this_pass = 0;
                self.restart();
                return self.next_frame();
            }
            Ok(None) => {
                tracing::debug!(
                    path = %self.info.source_path.display(),
                    decoded = self.frames_this_pass,
                    "video ended before its planned length; holding last frame"
                );
                self.hold();
            }
            Err(e) => {
                tracing::warn!(
                    path = %self.info.source_path.display(),
                    error = %e,
                    "video decode failed mid-stream; holding last frame"
                );
                self.hold();
            }
        }
        self.last.clone()
    }

    fn hold(&mut self) {
        self.held = true;
        self.stream = None;
    }

    fn read(&mut self) -> MontageResult<Option<RgbImage>> {
        match self.stream.as_mut() {
            Some(stream) => stream.next_frame(),
            None => Ok(None),
        }
    }

    fn restart(&mut self) {
        self.stream = None;
        match VideoFrameStream::spawn(self.info.clone(), self.fps) {
            Ok(stream) => self.stream = Some(stream),
            Err(e) => {
                tracing::warn!(
                    path = %self.info.source_path.display(),
                    error = %e,
                    "failed to restart video decoder; holding last frame"
                );
                self.hold();
            }
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/source/frame_source.rs"]
mod tests;
