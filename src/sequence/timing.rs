use crate::assets::item::MediaKind;
use crate::foundation::core::Fps;

/// Durations longer than this get a crossfade by default.
const DEFAULT_TRANSITION_MIN_DURATION_SECS: f64 = 0.5;
const DEFAULT_TRANSITION_MAX_SECS: f64 = 0.3;
const DEFAULT_TRANSITION_DURATION_FRACTION: f64 = 0.4;

/// Number of output frames for an item on screen for `duration_secs`.
///
/// `max(1, round(duration * fps))`, with halves rounded away from zero.
pub fn frame_count(duration_secs: f64, fps: Fps) -> u64 {
    if !duration_secs.is_finite() || duration_secs <= 0.0 {
        return 1;
    }
    fps.secs_to_frames_round(duration_secs).max(1)
}

/// Crossfade length used when none is configured.
///
/// Fast slideshows (half a second per item or less) get none.
pub fn default_transition_secs(duration_secs: f64) -> f64 {
    if duration_secs > DEFAULT_TRANSITION_MIN_DURATION_SECS {
        DEFAULT_TRANSITION_MAX_SECS.min(duration_secs * DEFAULT_TRANSITION_DURATION_FRACTION)
    } else {
        0.0
    }
}

/// Crossfade length in frames.
pub fn transition_frames(transition_secs: f64, fps: Fps) -> u64 {
    if !transition_secs.is_finite() || transition_secs <= 0.0 {
        return 0;
    }
    fps.secs_to_frames_round(transition_secs)
}

/// Slow zoom applied to still images.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ZoomSettings {
    /// Master switch.
    pub enabled: bool,
    /// Scale gained over the whole item (`0.03` ends at 103%).
    pub rate: f64,
    /// Items must stay on screen longer than this to zoom.
    pub min_duration_secs: f64,
}

impl Default for ZoomSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            rate: 0.03,
            min_duration_secs: 1.0,
        }
    }
}

/// Zoom of one item at one frame.
///
/// `scale()` goes from `start_scale` at progress 0 toward `end_scale` at progress 1.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ZoomState {
    /// Scale of the first frame.
    pub start_scale: f64,
    /// Scale the item approaches on its last frame; the compositor reserves room for it.
    pub end_scale: f64,
    /// Position within the item in `[0, 1)`.
    pub progress: f64,
}

impl ZoomState {
    /// No zoom.
    pub const IDENTITY: Self = Self {
        start_scale: 1.0,
        end_scale: 1.0,
        progress: 0.0,
    };

    /// Effective scale multiplier.
    pub fn scale(self) -> f64 {
        self.start_scale + (self.end_scale - self.start_scale) * self.progress.clamp(0.0, 1.0)
    }
}

/// Per-item zoom progression: `scale(i) = 1 + rate * i / frame_count`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ZoomRamp {
    rate: f64,
}

impl ZoomRamp {
    /// Ramp that never zooms.
    pub const NONE: Self = Self { rate: 0.0 };

    /// Resolve the ramp for an item of `kind` shown for `duration_secs`.
    pub fn for_item(kind: MediaKind, duration_secs: f64, settings: &ZoomSettings) -> Self {
        let zooms = settings.enabled
            && kind == MediaKind::StaticImage
            && duration_secs > settings.min_duration_secs
            && settings.rate.is_finite()
            && settings.rate > 0.0;
        if zooms {
            Self {
                rate: settings.rate,
            }
        } else {
            Self::NONE
        }
    }

    /// Scale gained over the item.
    pub fn rate(self) -> f64 {
        self.rate
    }

    /// `true` when every frame of the item uses scale 1.0.
    pub fn is_static(self) -> bool {
        self.rate == 0.0
    }

    /// Zoom state of frame `index` out of `frame_count`.
    pub fn state_at(self, index: u64, frame_count: u64) -> ZoomState {
        if self.is_static() || frame_count == 0 {
            return ZoomState::IDENTITY;
        }
        ZoomState {
            start_scale: 1.0,
            end_scale: 1.0 + self.rate,
            progress: index as f64 / frame_count as f64,
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/sequence/timing.rs"]
mod tests;
