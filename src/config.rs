use std::path::{Path, PathBuf};

use anyhow::Context as _;

use crate::encode::job::EncodeSettings;
use crate::foundation::core::{Canvas, CanvasPreset, Fps};
use crate::foundation::error::{MontageError, MontageResult};
use crate::render::compositor::BackgroundStyle;
use crate::sequence::sequencer::{RenderMode, SequencerOpts};
use crate::sequence::timing::{ZoomSettings, default_transition_secs};
use crate::source::frame_source::PlaybackPolicy;

const DEFAULT_IMAGE_DURATION_SECS: f64 = 0.33;
/// A wider blur than the canvas short edge only flattens the fill further.
const MAX_BLUR_RADIUS_AT_1080: f32 = 1080.0;

/// Per-item timing.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Seconds each item stays on screen. Mutually exclusive with `images_per_second`.
    pub image_duration_secs: Option<f64>,
    /// Items per second (`1 / image_duration_secs`).
    pub images_per_second: Option<f64>,
    /// Output frame rate.
    pub fps: u32,
    /// Crossfade length in batch mode. Derived from the item duration when unset.
    pub transition_secs: Option<f64>,
    /// Slow zoom on stills.
    pub zoom: ZoomSettings,
    /// Videos longer than the item duration.
    pub video_policy: PlaybackPolicy,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            image_duration_secs: None,
            images_per_second: None,
            fps: 30,
            transition_secs: None,
            zoom: ZoomSettings::default(),
            video_policy: PlaybackPolicy::default(),
        }
    }
}

/// Where and what to write.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Output directory.
    pub dir: PathBuf,
    /// File name without extension.
    pub name: String,
    /// Replace an existing output file.
    pub overwrite: bool,
    /// Also write `<name>.jpg` from the finished video.
    pub poster: bool,
    /// Mux one chapter per item into the output.
    pub chapters: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("output"),
            name: "output".to_owned(),
            overwrite: true,
            poster: false,
            chapters: false,
        }
    }
}

/// Producer/consumer tuning.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ThreadingConfig {
    /// Composite chunks of frames on a rayon pool.
    pub parallel: bool,
    /// Worker threads; `None` uses rayon's default.
    pub threads: Option<usize>,
    /// Frames per parallel chunk.
    pub chunk_size: usize,
    /// Frames buffered between the producer and the encoder thread.
    pub channel_capacity: usize,
}

impl Default for ThreadingConfig {
    fn default() -> Self {
        Self {
            parallel: true,
            threads: None,
            chunk_size: 16,
            channel_capacity: 1,
        }
    }
}

/// Complete, immutable configuration of one run.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Directory walked for media.
    pub input_dir: PathBuf,
    /// Output geometry.
    pub canvas: CanvasPreset,
    /// Item timing.
    pub timing: TimingConfig,
    /// Background fill look.
    pub background: BackgroundStyle,
    /// Encoder knobs and codec preference list.
    pub encode: EncodeSettings,
    /// Output location and extras.
    pub output: OutputConfig,
    /// Streaming (concatenate) or batch (crossfade).
    pub mode: RenderMode,
    /// Concurrency tuning.
    pub threading: ThreadingConfig,
}

impl RunConfig {
    /// Parse a JSON config. Missing fields take their defaults.
    pub fn from_json_str(json: &str) -> MontageResult<Self> {
        serde_json::from_str(json)
            .map_err(|e| MontageError::validation(format!("invalid config json: {e}")))
    }

    /// Read and parse a JSON config file.
    pub fn from_json_file(path: &Path) -> MontageResult<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("read config '{}'", path.display()))?;
        Self::from_json_str(&text)
    }

    /// Seconds each item stays on screen.
    pub fn image_duration_secs(&self) -> f64 {
        match (self.timing.image_duration_secs, self.timing.images_per_second) {
            (Some(d), _) => d,
            (None, Some(ips)) if ips > 0.0 => 1.0 / ips,
            (None, _) => DEFAULT_IMAGE_DURATION_SECS,
        }
    }

    /// Crossfade length, configured or derived from the item duration.
    pub fn transition_secs(&self) -> f64 {
        self.timing
            .transition_secs
            .unwrap_or_else(|| default_transition_secs(self.image_duration_secs()))
    }

    /// Output frame rate.
    pub fn fps(&self) -> MontageResult<Fps> {
        Fps::whole(self.timing.fps)
    }

    /// Output canvas.
    pub fn canvas(&self) -> Canvas {
        self.canvas.canvas()
    }

    /// `<dir>/<name>.<container extension>`
    pub fn output_path(&self) -> PathBuf {
        self.output.dir.join(format!(
            "{}.{}",
            self.output.name,
            self.encode.container.extension()
        ))
    }

    /// `<dir>/<name>.jpg`
    pub fn poster_path(&self) -> PathBuf {
        self.output.dir.join(format!("{}.jpg", self.output.name))
    }

    /// Check every invariant of the run.
    pub fn validate(&self) -> MontageResult<()> {
        if self.timing.image_duration_secs.is_some() && self.timing.images_per_second.is_some() {
            return Err(MontageError::validation(
                "set either timing.image_duration_secs or timing.images_per_second, not both",
            ));
        }
        if let Some(ips) = self.timing.images_per_second
            && !(ips.is_finite() && ips > 0.0)
        {
            return Err(MontageError::validation(
                "timing.images_per_second must be > 0",
            ));
        }
        let duration = self.image_duration_secs();
        if !(duration.is_finite() && duration > 0.0) {
            return Err(MontageError::validation(
                "timing.image_duration_secs must be > 0",
            ));
        }
        self.fps()?;

        let transition = self.transition_secs();
        if !(transition.is_finite() && transition >= 0.0 && transition < duration) {
            return Err(MontageError::validation(format!(
                "timing.transition_secs must be in [0, {duration}) (got {transition})"
            )));
        }
        let zoom = &self.timing.zoom;
        if !(zoom.rate.is_finite() && zoom.rate >= 0.0) {
            return Err(MontageError::validation("timing.zoom.rate must be >= 0"));
        }
        if !zoom.min_duration_secs.is_finite() {
            return Err(MontageError::validation(
                "timing.zoom.min_duration_secs must be finite",
            ));
        }

        let bg = &self.background;
        if !(bg.darken > 0.0 && bg.darken <= 1.0) {
            return Err(MontageError::validation(
                "background.darken must be in (0, 1]",
            ));
        }
        if !(bg.blur_radius_at_1080.is_finite()
            && (0.0..=MAX_BLUR_RADIUS_AT_1080).contains(&bg.blur_radius_at_1080))
        {
            return Err(MontageError::validation(format!(
                "background.blur_radius_at_1080 must be in [0, {MAX_BLUR_RADIUS_AT_1080}]"
            )));
        }
        if bg.thumbnail_divisor == 0 {
            return Err(MontageError::validation(
                "background.thumbnail_divisor must be >= 1",
            ));
        }

        self.encode.validate()?;

        let name = self.output.name.as_str();
        if name.is_empty() || name.contains(['/', '\\']) || name == "." || name == ".." {
            return Err(MontageError::validation(
                "output.name must be a plain file name",
            ));
        }

        let t = &self.threading;
        if t.chunk_size == 0 {
            return Err(MontageError::validation("threading.chunk_size must be >= 1"));
        }
        if t.channel_capacity == 0 {
            return Err(MontageError::validation(
                "threading.channel_capacity must be >= 1",
            ));
        }
        if t.threads == Some(0) {
            return Err(MontageError::validation(
                "threading.threads must be >= 1 when set",
            ));
        }
        Ok(())
    }

    /// Sequencer options derived from this config.
    pub fn sequencer_opts(&self) -> MontageResult<SequencerOpts> {
        Ok(SequencerOpts {
            canvas: self.canvas(),
            fps: self.fps()?,
            mode: self.mode,
            transition_secs: self.transition_secs(),
            zoom: self.timing.zoom,
            background: self.background,
            video_policy: self.timing.video_policy,
            chunk_size: self.threading.chunk_size,
        })
    }
}

#[cfg(test)]
#[path = "../tests/unit/config.rs"]
mod tests;
