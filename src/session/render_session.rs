use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, mpsc};

use crate::assets::item::{MediaItem, discover_media};
use crate::config::RunConfig;
use crate::encode::ffmpeg::{FfmpegSink, FfmpegSinkOpts, available_encoders};
use crate::encode::job::{EncodeJob, EncodeSettings, VideoCodec};
use crate::encode::post::{extract_poster, mux_chapters};
use crate::encode::sink::{FrameSink, SinkConfig};
use crate::foundation::core::FrameIndex;
use crate::foundation::error::{MontageError, MontageResult};
use crate::render::frame::FrameRgb;
use crate::sequence::chapters::Chapter;
use crate::sequence::sequencer::{
    RenderedItem, SequenceReport, Sequencer, SkippedItem, render_item_frame,
};

const POSTER_AT_SECS: f64 = 1.0;

/// Creates one sink per codec attempt.
pub trait SinkFactory {
    /// Sink writing `out` with `codec`.
    fn make_sink(&self, codec: &VideoCodec, out: &Path) -> MontageResult<Box<dyn FrameSink>>;

    /// `false` skips `codec` without attempting it.
    fn supports(&self, _codec: &VideoCodec) -> bool {
        true
    }

    /// Remove whatever a failed attempt left at `path`.
    fn discard_output(&self, path: &Path) {
        let _ = std::fs::remove_file(path);
    }
}

/// [`SinkFactory`] spawning the system `ffmpeg`.
#[derive(Clone, Debug)]
pub struct FfmpegSinkFactory {
    settings: EncodeSettings,
    overwrite: bool,
    available: Option<std::collections::BTreeSet<String>>,
}

impl FfmpegSinkFactory {
    /// Factory that attempts every codec.
    pub fn new(settings: EncodeSettings, overwrite: bool) -> Self {
        Self {
            settings,
            overwrite,
            available: None,
        }
    }

    /// Factory that skips codecs missing from `ffmpeg -encoders`.
    pub fn probed(settings: EncodeSettings, overwrite: bool) -> Self {
        let available = match available_encoders() {
            Ok(set) => Some(set),
            Err(e) => {
                tracing::warn!(error = %e, "could not list ffmpeg encoders; trying every codec");
                None
            }
        };
        Self {
            settings,
            overwrite,
            available,
        }
    }
}

impl SinkFactory for FfmpegSinkFactory {
    fn make_sink(&self, codec: &VideoCodec, out: &Path) -> MontageResult<Box<dyn FrameSink>> {
        Ok(Box::new(FfmpegSink::new(FfmpegSinkOpts {
            out_path: out.to_path_buf(),
            overwrite: self.overwrite,
            codec: codec.clone(),
            settings: self.settings.clone(),
        })))
    }

    fn supports(&self, codec: &VideoCodec) -> bool {
        self.available
            .as_ref()
            .is_none_or(|set| set.contains(codec.encoder_name()))
    }
}

/// Summary of a finished run.
#[derive(Clone, Debug, PartialEq, serde::Serialize)]
pub struct RenderReport {
    /// Written video.
    pub output: PathBuf,
    /// Poster image, when requested and extracted.
    pub poster: Option<PathBuf>,
    /// Codec that produced the output.
    pub codec: VideoCodec,
    /// Frames written.
    pub frames: u64,
    /// Frames composited (the rest reused an identical predecessor).
    pub frames_composited: u64,
    /// Items in output order.
    pub rendered: Vec<RenderedItem>,
    /// Items that could not be decoded.
    pub skipped: Vec<SkippedItem>,
    /// One chapter per rendered item.
    pub chapters: Vec<Chapter>,
}

/// Owns a validated [`RunConfig`] and drives discovery, sequencing and encoding.
///
/// Frames flow from the sequencer (caller thread) to the sink (scoped encoder thread) through a
/// bounded channel, so at most `channel_capacity` composited frames are in flight.
pub struct RenderSession {
    config: RunConfig,
    sequencer: Sequencer,
    pool: Option<rayon::ThreadPool>,
}

impl RenderSession {
    /// Validate `config` and set up the worker pool.
    pub fn new(config: RunConfig) -> MontageResult<Self> {
        config.validate()?;
        let sequencer = Sequencer::new(config.sequencer_opts()?)?;
        let pool = if config.threading.parallel {
            Some(build_thread_pool(config.threading.threads)?)
        } else {
            None
        };
        Ok(Self {
            config,
            sequencer,
            pool,
        })
    }

    /// Configuration of this session.
    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Naturally ordered media under the configured input directory.
    pub fn discover(&self) -> MontageResult<Vec<MediaItem>> {
        let root = if self.config.input_dir.as_os_str().is_empty() {
            Path::new(".")
        } else {
            self.config.input_dir.as_path()
        };
        discover_media(root, self.config.image_duration_secs())
    }

    /// Composite output frame `index` of a single item.
    pub fn render_frame(&self, item: &MediaItem, index: u64) -> MontageResult<FrameRgb> {
        render_item_frame(item, index, self.sequencer.opts())
    }

    /// Stream every frame of `items` into `sink`.
    ///
    /// `begin` runs lazily with the first frame, so a run without frames never touches the sink
    /// and fails with [`MontageError::NoMedia`]. When production fails after frames were sent the
    /// sink is aborted instead of ended. A sink failure takes precedence over the producer error
    /// it causes.
    #[tracing::instrument(skip_all, fields(items = items.len()))]
    pub fn render_to_sink(
        &self,
        items: &[MediaItem],
        sink: &mut dyn FrameSink,
    ) -> MontageResult<SequenceReport> {
        if items.is_empty() {
            return Err(MontageError::no_media("no media items to render"));
        }
        let canvas = self.config.canvas();
        let cfg = SinkConfig {
            width: canvas.width,
            height: canvas.height,
            fps: self.sequencer.opts().fps,
        };
        let cap = self.config.threading.channel_capacity.max(1);
        let aborted = AtomicBool::new(false);

        std::thread::scope(|scope| -> MontageResult<SequenceReport> {
            let (tx, rx) = mpsc::sync_channel::<FrameMsg>(cap);
            let aborted_ref = &aborted;
            let enc = scope.spawn(move || drive_sink(sink, cfg, rx, aborted_ref));

            let produced = self
                .sequencer
                .run(items, self.pool.as_ref(), &mut |idx, frame| {
                    tx.send(FrameMsg { idx, frame }).map_err(|_| {
                        MontageError::evaluation("encoder thread is not accepting frames")
                    })
                });
            if produced.is_err() {
                aborted.store(true, Ordering::Release);
            }
            drop(tx);
            let enc_res = enc
                .join()
                .map_err(|_| MontageError::evaluation("encoder thread panicked"))?;

            let (report, pushed) = match (produced, enc_res) {
                (_, Err(sink_err)) => return Err(sink_err),
                (Err(e), Ok(_)) => return Err(e),
                (Ok(report), Ok(pushed)) => (report, pushed),
            };
            if pushed == 0 {
                return Err(MontageError::no_media(format!(
                    "none of the {} media items could be decoded",
                    items.len()
                )));
            }
            if pushed != report.frames_total {
                return Err(MontageError::evaluation(format!(
                    "sink received {pushed} frames, sequencer produced {}",
                    report.frames_total
                )));
            }
            Ok(report)
        })
    }

    /// Render `items` to `out`, walking the codec preference list until one succeeds.
    ///
    /// Only encoder failures advance to the next codec; every failed attempt's output is
    /// discarded through the factory.
    #[tracing::instrument(skip_all, fields(out = %out.display()))]
    pub fn render_with_fallback(
        &self,
        items: &[MediaItem],
        factory: &dyn SinkFactory,
        out: &Path,
    ) -> MontageResult<(SequenceReport, VideoCodec)> {
        if !self.config.output.overwrite && out.exists() {
            return Err(MontageError::validation(format!(
                "output file '{}' already exists",
                out.display()
            )));
        }

        let mut job = EncodeJob::new(out, &self.config.encode)?;
        let mut failures = Vec::<String>::new();
        while let Some(codec) = job.current().cloned() {
            if !factory.supports(&codec) {
                tracing::warn!(%codec, "encoder not available in ffmpeg, trying next codec");
                failures.push(format!("{codec}: not available"));
                job.advance();
                continue;
            }

            tracing::info!(%codec, "encoding");
            let mut sink = factory.make_sink(&codec, job.output_path())?;
            let res = self.render_to_sink(items, sink.as_mut());
            drop(sink);
            match res {
                Ok(report) => return Ok((report, codec)),
                Err(e) if e.is_encoder_failure() => {
                    factory.discard_output(job.output_path());
                    tracing::warn!(%codec, error = %e, "encoder failed, falling back");
                    failures.push(e.to_string());
                    job.advance();
                }
                Err(e) => {
                    factory.discard_output(job.output_path());
                    return Err(e);
                }
            }
        }

        let tried: Vec<&str> = job.codecs().iter().map(VideoCodec::encoder_name).collect();
        Err(MontageError::encode(
            tried.join(","),
            format!("every codec failed:\n{}", failures.join("\n")),
        ))
    }

    /// Full run: discover, render with fallback, then mux chapters and extract the poster.
    ///
    /// Chapter muxing and poster extraction run on a finished file; their failures are warned
    /// and leave the video in place.
    #[tracing::instrument(skip_all, fields(input = %self.config.input_dir.display()))]
    pub fn run(&self, factory: &dyn SinkFactory) -> MontageResult<RenderReport> {
        let items = self.discover()?;
        tracing::info!(items = items.len(), "discovered media");
        if items.is_empty() {
            return Err(MontageError::no_media(format!(
                "no recognised media under '{}'",
                self.config.input_dir.display()
            )));
        }

        let out = self.config.output_path();
        let (seq, codec) = self.render_with_fallback(&items, factory, &out)?;

        if self.config.output.chapters
            && let Err(e) = mux_chapters(&out, &seq.chapters, self.sequencer.opts().fps)
        {
            tracing::warn!(error = %e, "chapter markers were not written");
        }

        let poster = if self.config.output.poster {
            let fps = self.sequencer.opts().fps;
            let at = POSTER_AT_SECS.min(fps.frames_to_secs(seq.frames_total) / 2.0);
            let path = self.config.poster_path();
            match extract_poster(&out, &path, at) {
                Ok(()) => Some(path),
                Err(e) => {
                    tracing::warn!(error = %e, "poster was not written");
                    None
                }
            }
        } else {
            None
        };

        let report = RenderReport {
            output: out,
            poster,
            codec,
            frames: seq.frames_total,
            frames_composited: seq.frames_composited,
            rendered: seq.rendered,
            skipped: seq.skipped,
            chapters: seq.chapters,
        };
        tracing::info!(
            output = %report.output.display(),
            codec = %report.codec,
            frames = report.frames,
            rendered = report.rendered.len(),
            skipped = report.skipped.len(),
            "render complete"
        );
        Ok(report)
    }
}

#[derive(Debug)]
struct FrameMsg {
    idx: FrameIndex,
    frame: Arc<FrameRgb>,
}

/// Encoder thread body. Returns the number of frames pushed.
fn drive_sink(
    sink: &mut dyn FrameSink,
    cfg: SinkConfig,
    rx: mpsc::Receiver<FrameMsg>,
    aborted: &AtomicBool,
) -> MontageResult<u64> {
    let mut started = false;
    let res = pump_frames(sink, cfg, &rx, &mut started);
    // Unblock a producer waiting on a full channel before tearing the sink down.
    drop(rx);
    if !started {
        return res;
    }
    if res.is_err() || aborted.load(Ordering::Acquire) {
        sink.abort();
        return res;
    }
    sink.end()?;
    res
}

fn pump_frames(
    sink: &mut dyn FrameSink,
    cfg: SinkConfig,
    rx: &mpsc::Receiver<FrameMsg>,
    started: &mut bool,
) -> MontageResult<u64> {
    let mut next = 0u64;
    let mut pending = HashMap::<u64, Arc<FrameRgb>>::new();
    for msg in rx.iter() {
        pending.insert(msg.idx.0, msg.frame);
        while let Some(frame) = pending.remove(&next) {
            if !*started {
                *started = true;
                sink.begin(cfg)?;
            }
            sink.push_frame(FrameIndex(next), &frame)?;
            next += 1;
        }
    }
    if !pending.is_empty() {
        return Err(MontageError::evaluation(format!(
            "frame stream has a gap at index {next}"
        )));
    }
    Ok(next)
}

/// Dedicated rayon pool; `threads` must be >= 1 when set.
pub fn build_thread_pool(threads: Option<usize>) -> MontageResult<rayon::ThreadPool> {
    if let Some(n) = threads
        && n == 0
    {
        return Err(MontageError::validation(
            "'threads' must be >= 1 when set",
        ));
    }
    let mut builder = rayon::ThreadPoolBuilder::new();
    if let Some(n) = threads {
        builder = builder.num_threads(n);
    }
    builder
        .build()
        .map_err(|e| MontageError::evaluation(format!("failed to build rayon thread pool: {e}")))
}

#[cfg(test)]
#[path = "../../tests/unit/session/render_session.rs"]
mod tests;
