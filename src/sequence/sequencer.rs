use std::path::PathBuf;
use std::sync::Arc;

use image::RgbImage;
use rayon::prelude::*;

use crate::assets::item::{MediaItem, MediaKind};
use crate::effects::composite::crossfade_in_place;
use crate::foundation::core::{Canvas, Fps, FrameIndex, FrameRange};
use crate::foundation::error::{MontageError, MontageResult};
use crate::render::compositor::{BackgroundStyle, LetterboxCompositor};
use crate::render::frame::FrameRgb;
use crate::sequence::chapters::Chapter;
use crate::sequence::timing::{ZoomRamp, ZoomSettings, ZoomState, transition_frames};
use crate::source::frame_source::{FrameSource, PlaybackPolicy, SourceFrame, SourceOpts};

/// How items are joined and when they are opened.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RenderMode {
    /// Items are opened just in time and concatenated without crossfades.
    #[default]
    Streaming,
    /// Every item is measured up front; adjacent items crossfade.
    Batch,
}

/// Immutable options of a sequencer run.
#[derive(Clone, Debug, PartialEq)]
pub struct SequencerOpts {
    /// Output canvas.
    pub canvas: Canvas,
    /// Output frame rate.
    pub fps: Fps,
    /// Join mode.
    pub mode: RenderMode,
    /// Crossfade length in seconds (batch mode only).
    pub transition_secs: f64,
    /// Zoom applied to still images.
    pub zoom: ZoomSettings,
    /// Background fill look.
    pub background: BackgroundStyle,
    /// Policy for videos longer than their target.
    pub video_policy: PlaybackPolicy,
    /// Frames composited per parallel chunk.
    pub chunk_size: usize,
}

impl SequencerOpts {
    /// Defaults for `canvas` at `fps`.
    pub fn new(canvas: Canvas, fps: Fps) -> Self {
        Self {
            canvas,
            fps,
            mode: RenderMode::default(),
            transition_secs: 0.0,
            zoom: ZoomSettings::default(),
            background: BackgroundStyle::default(),
            video_policy: PlaybackPolicy::default(),
            chunk_size: 16,
        }
    }

    fn source_opts(&self) -> SourceOpts {
        SourceOpts {
            fps: self.fps,
            video_policy: self.video_policy,
        }
    }
}

/// An item that made it into the output.
#[derive(Clone, Debug, PartialEq, serde::Serialize)]
pub struct RenderedItem {
    /// Source file.
    pub path: PathBuf,
    /// Resolved kind.
    pub kind: MediaKind,
    /// Output frames starting at the item's first frame, up to the next item's first frame.
    pub frames: FrameRange,
}

/// An item that was skipped because it could not be opened.
#[derive(Clone, Debug, PartialEq, serde::Serialize)]
pub struct SkippedItem {
    /// Source file.
    pub path: PathBuf,
    /// Decode error message.
    pub reason: String,
}

/// Outcome of one sequencer pass.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize)]
pub struct SequenceReport {
    /// Frames emitted.
    pub frames_total: u64,
    /// Frames actually composited.
    pub frames_composited: u64,
    /// Frames that reused the previous composite because nothing changed.
    pub frames_elided: u64,
    /// Items in output order.
    pub rendered: Vec<RenderedItem>,
    /// Items that failed to open.
    pub skipped: Vec<SkippedItem>,
    /// One chapter per rendered item.
    pub chapters: Vec<Chapter>,
}

impl SequenceReport {
    fn record(&mut self, item: &MediaItem, frames: FrameRange, fps: Fps, stats: CursorStats) {
        self.rendered.push(RenderedItem {
            path: item.path.clone(),
            kind: item.kind,
            frames,
        });
        self.chapters.push(Chapter::new(item.title(), frames, fps));
        self.frames_composited += stats.composited;
        self.frames_elided += stats.elided;
    }
}

/// Turns an ordered item list into one ordered frame stream.
///
/// Frames are handed to the `emit` callback in strictly increasing index order starting at 0.
/// An error returned by `emit` stops production and is propagated unchanged.
#[derive(Clone, Debug)]
pub struct Sequencer {
    opts: SequencerOpts,
}

impl Sequencer {
    /// Create a sequencer.
    pub fn new(opts: SequencerOpts) -> MontageResult<Self> {
        if !opts.transition_secs.is_finite() || opts.transition_secs < 0.0 {
            return Err(MontageError::validation(
                "transition_secs must be finite and >= 0",
            ));
        }
        if opts.chunk_size == 0 {
            return Err(MontageError::validation("chunk_size must be >= 1"));
        }
        Ok(Self { opts })
    }

    /// Options of this sequencer.
    pub fn opts(&self) -> &SequencerOpts {
        &self.opts
    }

    /// Produce every frame of `items`.
    #[tracing::instrument(skip_all, fields(items = items.len(), mode = ?self.opts.mode))]
    pub fn run(
        &self,
        items: &[MediaItem],
        pool: Option<&rayon::ThreadPool>,
        emit: &mut dyn FnMut(FrameIndex, Arc<FrameRgb>) -> MontageResult<()>,
    ) -> MontageResult<SequenceReport> {
        let report = match self.opts.mode {
            RenderMode::Streaming => self.run_streaming(items, pool, emit)?,
            RenderMode::Batch => self.run_batch(items, pool, emit)?,
        };
        tracing::debug!(
            frames = report.frames_total,
            composited = report.frames_composited,
            elided = report.frames_elided,
            skipped = report.skipped.len(),
            "sequence complete"
        );
        Ok(report)
    }

    fn run_streaming(
        &self,
        items: &[MediaItem],
        pool: Option<&rayon::ThreadPool>,
        emit: &mut dyn FnMut(FrameIndex, Arc<FrameRgb>) -> MontageResult<()>,
    ) -> MontageResult<SequenceReport> {
        let mut report = SequenceReport::default();
        let mut next = 0u64;
        for item in items {
            let Some(source) = self.open_or_skip(item, &mut report)? else {
                continue;
            };
            let start = next;
            let mut cursor = ItemCursor::new(source, &self.opts, pool)?;
            while let Some(chunk) = cursor.next_chunk()? {
                for frame in chunk {
                    emit(FrameIndex(next), frame)?;
                    next += 1;
                }
            }
            let frames = FrameRange::new(FrameIndex(start), FrameIndex(next))?;
            report.record(item, frames, self.opts.fps, cursor.stats);
        }
        report.frames_total = next;
        Ok(report)
    }

    fn run_batch(
        &self,
        items: &[MediaItem],
        pool: Option<&rayon::ThreadPool>,
        emit: &mut dyn FnMut(FrameIndex, Arc<FrameRgb>) -> MontageResult<()>,
    ) -> MontageResult<SequenceReport> {
        let mut report = SequenceReport::default();

        let mut planned = Vec::<(&MediaItem, u64)>::new();
        for item in items {
            if let Some(source) = self.open_or_skip(item, &mut report)? {
                planned.push((item, source.frame_count()));
            }
        }
        let counts: Vec<u64> = planned.iter().map(|(_, n)| *n).collect();
        let overlaps = plan_overlaps(
            &counts,
            transition_frames(self.opts.transition_secs, self.opts.fps),
        );
        tracing::debug!(items = planned.len(), ?overlaps, "batch plan ready");

        let mut next = 0u64;
        let mut outgoing = Vec::<Arc<FrameRgb>>::new();
        for (k, (item, count)) in planned.iter().enumerate() {
            let source = FrameSource::open(item, &self.opts.source_opts()).map_err(|e| {
                MontageError::evaluation(format!(
                    "'{}' could not be reopened for rendering: {e}",
                    item.path.display()
                ))
            })?;
            if source.frame_count() != *count {
                return Err(MontageError::evaluation(format!(
                    "'{}' changed length between planning and rendering",
                    item.path.display()
                )));
            }

            let head = overlaps[k];
            let tail = overlaps.get(k + 1).copied().unwrap_or(0);
            let start = next;
            let mut held = Vec::<Arc<FrameRgb>>::with_capacity(tail as usize);
            let mut cursor = ItemCursor::new(source, &self.opts, pool)?;
            let mut i = 0u64;
            while let Some(chunk) = cursor.next_chunk()? {
                for frame in chunk {
                    if i < head {
                        let under = outgoing.get(i as usize).ok_or_else(|| {
                            MontageError::evaluation("crossfade window is missing frames")
                        })?;
                        let mut mixed = FrameRgb::clone(under);
                        crossfade_in_place(&mut mixed.data, &frame.data, i as f32 / head as f32)?;
                        emit(FrameIndex(next), Arc::new(mixed))?;
                        next += 1;
                    } else if i >= count - tail {
                        held.push(frame);
                    } else {
                        emit(FrameIndex(next), frame)?;
                        next += 1;
                    }
                    i += 1;
                }
            }
            outgoing = held;

            let frames = FrameRange::new(FrameIndex(start), FrameIndex(next))?;
            report.record(item, frames, self.opts.fps, cursor.stats);
        }
        report.frames_total = next;
        Ok(report)
    }

    fn open_or_skip(
        &self,
        item: &MediaItem,
        report: &mut SequenceReport,
    ) -> MontageResult<Option<FrameSource>> {
        match FrameSource::open(item, &self.opts.source_opts()) {
            Ok(source) => Ok(Some(source)),
            Err(MontageError::Decode(reason)) => {
                tracing::warn!(path = %item.path.display(), %reason, "skipping media item");
                report.skipped.push(SkippedItem {
                    path: item.path.clone(),
                    reason,
                });
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}

/// Composite frame `index` of `item` on its own, as the sequencer would in streaming mode.
pub fn render_item_frame(
    item: &MediaItem,
    index: u64,
    opts: &SequencerOpts,
) -> MontageResult<FrameRgb> {
    let mut source = FrameSource::open(item, &opts.source_opts())?;
    let count = source.frame_count();
    if index >= count {
        return Err(MontageError::validation(format!(
            "frame {index} is out of range; '{}' has {count} frames",
            item.path.display()
        )));
    }
    let compositor = LetterboxCompositor::new(source.background(), opts.canvas, &opts.background)?;
    let ramp = ZoomRamp::for_item(item.kind, item.target_duration_secs, &opts.zoom);
    let frame = source
        .nth(index as usize)
        .ok_or_else(|| MontageError::evaluation("source ended before its frame count"))?;
    compositor.compose(&frame.image, ramp.state_at(index, count))
}

/// Overlap, in frames, between each item and the one before it (`0` for the first item).
///
/// Each overlap is at most `transition` and stays below both items' frame counts; an item's
/// incoming and outgoing overlaps never share a frame.
pub fn plan_overlaps(counts: &[u64], transition: u64) -> Vec<u64> {
    let mut overlaps = vec![0u64; counts.len()];
    for k in 1..counts.len() {
        let prev = counts[k - 1];
        let prev_free = prev.saturating_sub(overlaps[k - 1]).min(prev.saturating_sub(1));
        overlaps[k] = transition
            .min(prev_free)
            .min(counts[k].saturating_sub(1));
    }
    overlaps
}

#[derive(Clone, Copy, Debug, Default)]
struct CursorStats {
    composited: u64,
    elided: u64,
}

enum Slot {
    Carry,
    Job(usize),
}

/// Pulls source frames in chunks and composites each chunk, optionally on the rayon pool.
/// Results keep frame order.
struct ItemCursor<'a> {
    source: FrameSource,
    compositor: LetterboxCompositor,
    ramp: ZoomRamp,
    chunk_size: usize,
    pool: Option<&'a rayon::ThreadPool>,
    carry: Option<(Arc<RgbImage>, Arc<FrameRgb>)>,
    stats: CursorStats,
}

impl<'a> ItemCursor<'a> {
    fn new(
        source: FrameSource,
        opts: &SequencerOpts,
        pool: Option<&'a rayon::ThreadPool>,
    ) -> MontageResult<Self> {
        let compositor =
            LetterboxCompositor::new(source.background(), opts.canvas, &opts.background)?;
        let item = source.item();
        let ramp = ZoomRamp::for_item(item.kind, item.target_duration_secs, &opts.zoom);
        Ok(Self {
            source,
            compositor,
            ramp,
            chunk_size: opts.chunk_size.max(1),
            pool,
            carry: None,
            stats: CursorStats::default(),
        })
    }

    fn next_chunk(&mut self) -> MontageResult<Option<Vec<Arc<FrameRgb>>>> {
        let frame_count = self.source.frame_count();
        let batch: Vec<SourceFrame> = self.source.by_ref().take(self.chunk_size).collect();
        if batch.is_empty() {
            return Ok(None);
        }

        // Without zoom, a repeated source picture composites to the same frame.
        let mut jobs = Vec::<(Arc<RgbImage>, ZoomState)>::new();
        let mut slots = Vec::<Slot>::with_capacity(batch.len());
        let mut prev = self.carry.as_ref().map(|(img, _)| img.clone());
        for frame in batch {
            let repeated = self.ramp.is_static()
                && prev.as_ref().is_some_and(|p| Arc::ptr_eq(p, &frame.image));
            if repeated {
                slots.push(match jobs.len() {
                    0 => Slot::Carry,
                    n => Slot::Job(n - 1),
                });
                continue;
            }
            prev = Some(frame.image.clone());
            jobs.push((frame.image, self.ramp.state_at(frame.index, frame_count)));
            slots.push(Slot::Job(jobs.len() - 1));
        }

        let compositor = &self.compositor;
        let rendered = match self.pool {
            Some(pool) => pool.install(|| {
                jobs.par_iter()
                    .map(|(img, zoom)| compositor.compose(img, *zoom).map(Arc::new))
                    .collect::<MontageResult<Vec<_>>>()
            })?,
            None => jobs
                .iter()
                .map(|(img, zoom)| compositor.compose(img, *zoom).map(Arc::new))
                .collect::<MontageResult<Vec<_>>>()?,
        };

        let carried = self.carry.as_ref().map(|(_, f)| f.clone());
        let mut out = Vec::with_capacity(slots.len());
        for slot in slots {
            let frame = match slot {
                Slot::Job(i) => rendered[i].clone(),
                Slot::Carry => carried
                    .clone()
                    .ok_or_else(|| MontageError::evaluation("missing carried frame"))?,
            };
            out.push(frame);
        }

        self.stats.composited += rendered.len() as u64;
        self.stats.elided += (out.len() - rendered.len()) as u64;
        if let (Some((img, _)), Some(frame)) = (jobs.last(), rendered.last()) {
            self.carry = Some((img.clone(), frame.clone()));
        }
        Ok(Some(out))
    }
}

#[cfg(test)]
#[path = "../../tests/unit/sequence/sequencer.rs"]
mod tests;
