use std::fmt;
use std::path::{Path, PathBuf};

use crate::foundation::error::{MontageError, MontageResult};

/// Video encoder passed to `ffmpeg -c:v`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(from = "String", into = "String")]
pub enum VideoCodec {
    /// `libsvtav1` (AV1).
    SvtAv1,
    /// `libx264` (H.264).
    X264,
    /// `libx265` (HEVC).
    X265,
    /// `mpeg4` (MPEG-4 Part 2), built into every `ffmpeg`.
    Mpeg4,
    /// Any other encoder name, passed through verbatim.
    Other(String),
}

impl VideoCodec {
    /// Parse a codec name or common alias (`av1`, `h264`, `hevc`, ...).
    pub fn parse(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "av1" | "svtav1" | "svt-av1" | "libsvtav1" => Self::SvtAv1,
            "h264" | "x264" | "libx264" | "avc" => Self::X264,
            "h265" | "x265" | "libx265" | "hevc" => Self::X265,
            "mpeg4" => Self::Mpeg4,
            _ => Self::Other(name.trim().to_owned()),
        }
    }

    /// Encoder name as listed by `ffmpeg -encoders`.
    pub fn encoder_name(&self) -> &str {
        match self {
            Self::SvtAv1 => "libsvtav1",
            Self::X264 => "libx264",
            Self::X265 => "libx265",
            Self::Mpeg4 => "mpeg4",
            Self::Other(name) => name,
        }
    }

    /// `false` for encoders limited to 8-bit 4:2:0 input.
    pub fn supports_ten_bit(&self) -> bool {
        !matches!(self, Self::Mpeg4)
    }
}

impl fmt::Display for VideoCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.encoder_name())
    }
}

impl From<String> for VideoCodec {
    fn from(value: String) -> Self {
        Self::parse(&value)
    }
}

impl From<VideoCodec> for String {
    fn from(value: VideoCodec) -> Self {
        value.encoder_name().to_owned()
    }
}

impl std::str::FromStr for VideoCodec {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::parse(s))
    }
}

/// Output container.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Container {
    /// MP4 with AAC audio.
    #[default]
    Mp4,
    /// Matroska with the audio stream copied.
    Mkv,
}

impl Container {
    /// File extension without the dot.
    pub fn extension(self) -> &'static str {
        match self {
            Self::Mp4 => "mp4",
            Self::Mkv => "mkv",
        }
    }
}

/// Bit depth of the encoded luma/chroma samples.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum PixelDepth {
    /// `yuv420p`.
    Eight,
    /// `yuv420p10le`.
    #[default]
    Ten,
}

impl PixelDepth {
    /// `ffmpeg` pixel format for this depth, falling back to 8-bit for encoders without 10-bit
    /// support.
    pub fn pix_fmt(self, codec: &VideoCodec) -> &'static str {
        match self {
            Self::Ten if codec.supports_ten_bit() => "yuv420p10le",
            _ => "yuv420p",
        }
    }
}

impl TryFrom<u8> for PixelDepth {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            8 => Ok(Self::Eight),
            10 => Ok(Self::Ten),
            other => Err(format!("unsupported pixel depth {other} (expected 8 or 10)")),
        }
    }
}

impl From<PixelDepth> for u8 {
    fn from(value: PixelDepth) -> Self {
        match value {
            PixelDepth::Eight => 8,
            PixelDepth::Ten => 10,
        }
    }
}

/// Color signaling written into the stream, with the RGB to YUV matrix that matches it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColorStandard {
    /// ITU-R BT.709 (HD).
    #[default]
    Bt709,
    /// ITU-R BT.601 / SMPTE 170M (SD).
    Bt601,
    /// ITU-R BT.2020 non-constant luminance.
    Bt2020,
}

impl ColorStandard {
    /// `-color_primaries` value.
    pub fn primaries(self) -> &'static str {
        match self {
            Self::Bt709 => "bt709",
            Self::Bt601 => "smpte170m",
            Self::Bt2020 => "bt2020",
        }
    }

    /// `-color_trc` value.
    pub fn transfer(self) -> &'static str {
        match self {
            Self::Bt709 => "bt709",
            Self::Bt601 => "smpte170m",
            Self::Bt2020 => "bt2020-10",
        }
    }

    /// `-colorspace` value.
    pub fn colorspace(self) -> &'static str {
        match self {
            Self::Bt709 => "bt709",
            Self::Bt601 => "smpte170m",
            Self::Bt2020 => "bt2020nc",
        }
    }

    /// `scale=out_color_matrix` value.
    pub fn matrix(self) -> &'static str {
        match self {
            Self::Bt709 => "bt709",
            Self::Bt601 => "bt601",
            Self::Bt2020 => "bt2020",
        }
    }
}

/// Encoder knobs shared by every attempt of a run.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct EncodeSettings {
    /// Codec preference list; later entries are fallbacks.
    pub codecs: Vec<VideoCodec>,
    /// Constant rate factor (quality).
    pub crf: u8,
    /// Speed preset on the SVT-AV1 `0..=13` scale (higher is faster).
    pub preset: u8,
    /// Output sample depth.
    pub pixel_depth: PixelDepth,
    /// Color signaling.
    pub color: ColorStandard,
    /// Output container.
    pub container: Container,
    /// Optional audio track muxed in with `-shortest`.
    pub audio: Option<PathBuf>,
}

impl Default for EncodeSettings {
    fn default() -> Self {
        Self {
            codecs: vec![VideoCodec::SvtAv1, VideoCodec::X264],
            crf: 32,
            preset: 10,
            pixel_depth: PixelDepth::Ten,
            color: ColorStandard::Bt709,
            container: Container::Mp4,
            audio: None,
        }
    }
}

impl EncodeSettings {
    /// Check knob ranges.
    pub fn validate(&self) -> MontageResult<()> {
        if self.codecs.is_empty() {
            return Err(MontageError::validation(
                "encode.codecs must list at least one codec",
            ));
        }
        if self.crf > 63 {
            return Err(MontageError::validation("encode.crf must be in 0..=63"));
        }
        if self.preset > 13 {
            return Err(MontageError::validation("encode.preset must be in 0..=13"));
        }
        Ok(())
    }
}

/// Output file plus the codec fallback cursor.
///
/// Only [`EncodeJob::advance`] mutates the job; it is terminal once a codec succeeds or the list
/// is exhausted.
#[derive(Clone, Debug, PartialEq)]
pub struct EncodeJob {
    output_path: PathBuf,
    codecs: Vec<VideoCodec>,
    current: usize,
}

impl EncodeJob {
    /// Job writing `output_path` with the settings' codec preference list.
    pub fn new(output_path: impl Into<PathBuf>, settings: &EncodeSettings) -> MontageResult<Self> {
        if settings.codecs.is_empty() {
            return Err(MontageError::validation(
                "encode job needs at least one codec",
            ));
        }
        Ok(Self {
            output_path: output_path.into(),
            codecs: settings.codecs.clone(),
            current: 0,
        })
    }

    /// Destination file.
    pub fn output_path(&self) -> &Path {
        &self.output_path
    }

    /// Codec for the current attempt, `None` once every codec failed.
    pub fn current(&self) -> Option<&VideoCodec> {
        self.codecs.get(self.current)
    }

    /// Move to the next codec in the preference list.
    pub fn advance(&mut self) -> Option<&VideoCodec> {
        if self.current < self.codecs.len() {
            self.current += 1;
        }
        self.current()
    }

    /// Full preference list.
    pub fn codecs(&self) -> &[VideoCodec] {
        &self.codecs
    }
}

#[cfg(test)]
#[path = "../../tests/unit/encode/job.rs"]
mod tests;
