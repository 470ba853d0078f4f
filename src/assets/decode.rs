use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use image::{AnimationDecoder, DynamicImage, RgbImage};

use crate::foundation::error::{MontageError, MontageResult};

/// GIF/WebP delays at or below this play at `FALLBACK_FRAME_DELAY_SECS`, as in browsers.
const MIN_FRAME_DELAY_SECS: f64 = 0.02;
const FALLBACK_FRAME_DELAY_SECS: f64 = 0.1;

/// Decoded animation: RGB frames with the time each one stays on screen.
#[derive(Clone, Debug)]
pub struct DecodedAnimation {
    /// Frames in display order.
    pub frames: Vec<Arc<RgbImage>>,
    /// Display time of each frame in seconds (same length as `frames`).
    pub delays_secs: Vec<f64>,
}

impl DecodedAnimation {
    /// Total native playback time of one loop.
    pub fn total_secs(&self) -> f64 {
        self.delays_secs.iter().sum()
    }

    /// Index of the frame visible at `t` seconds, looping over the native length.
    pub fn frame_index_at(&self, t: f64) -> usize {
        let total = self.total_secs();
        if self.frames.len() <= 1 || total <= 0.0 {
            return 0;
        }
        let mut local = t.max(0.0) % total;
        for (i, d) in self.delays_secs.iter().enumerate() {
            if local < *d {
                return i;
            }
            local -= d;
        }
        self.frames.len() - 1
    }
}

/// Decode a still image into RGB8. Alpha is dropped.
pub fn decode_still(path: &Path) -> MontageResult<RgbImage> {
    let img = image::ImageReader::open(path)
        .map_err(|e| decode_err(path, e))?
        .with_guessed_format()
        .map_err(|e| decode_err(path, e))?
        .decode()
        .map_err(|e| decode_err(path, e))?;
    non_empty(path, img.to_rgb8())
}

/// Decode a GIF, animated WebP or APNG up to the frame visible at `until_secs`.
///
/// Frames starting after `until_secs` are never decoded; `None` decodes every frame. When the
/// animation ends earlier the whole loop is kept, so [`DecodedAnimation::frame_index_at`] agrees
/// with a full decode for every `t <= until_secs`. Single-frame WebP and PNG files decode to a
/// one-frame animation.
pub fn decode_animation_until(
    path: &Path,
    until_secs: Option<f64>,
) -> MontageResult<DecodedAnimation> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    let frames = match ext.as_str() {
        "gif" => {
            let decoder = image::codecs::gif::GifDecoder::new(open_buffered(path)?)
                .map_err(|e| decode_err(path, e))?;
            collect_frames(path, decoder, until_secs)?
        }
        "webp" => {
            let decoder = image::codecs::webp::WebPDecoder::new(open_buffered(path)?)
                .map_err(|e| decode_err(path, e))?;
            if decoder.has_animation() {
                collect_frames(path, decoder, until_secs)?
            } else {
                single_frame(path)?
            }
        }
        "png" | "apng" => {
            let decoder = image::codecs::png::PngDecoder::new(open_buffered(path)?)
                .map_err(|e| decode_err(path, e))?;
            if decoder.is_apng().map_err(|e| decode_err(path, e))? {
                let apng = decoder.apng().map_err(|e| decode_err(path, e))?;
                collect_frames(path, apng, until_secs)?
            } else {
                single_frame(path)?
            }
        }
        _ => single_frame(path)?,
    };

    if frames.is_empty() {
        return Err(MontageError::decode(format!(
            "'{}' contains no frames",
            path.display()
        )));
    }
    let (frames, delays_secs): (Vec<_>, Vec<_>) = frames.into_iter().unzip();
    Ok(DecodedAnimation {
        frames,
        delays_secs,
    })
}

fn collect_frames<'a, D: AnimationDecoder<'a>>(
    path: &Path,
    decoder: D,
    until_secs: Option<f64>,
) -> MontageResult<Vec<(Arc<RgbImage>, f64)>> {
    let mut out = Vec::new();
    let mut elapsed = 0.0;
    for frame in decoder.into_frames() {
        let frame = frame.map_err(|e| decode_err(path, e))?;
        let (num, den) = frame.delay().numer_denom_ms();
        let mut delay = if den == 0 {
            0.0
        } else {
            f64::from(num) / f64::from(den) / 1000.0
        };
        if delay <= MIN_FRAME_DELAY_SECS {
            delay = FALLBACK_FRAME_DELAY_SECS;
        }
        let rgb = DynamicImage::ImageRgba8(frame.into_buffer()).to_rgb8();
        out.push((Arc::new(non_empty(path, rgb)?), delay));
        elapsed += delay;
        if until_secs.is_some_and(|until| elapsed > until) {
            break;
        }
    }
    Ok(out)
}

fn single_frame(path: &Path) -> MontageResult<Vec<(Arc<RgbImage>, f64)>> {
    Ok(vec![(Arc::new(decode_still(path)?), FALLBACK_FRAME_DELAY_SECS)])
}

fn open_buffered(path: &Path) -> MontageResult<BufReader<File>> {
    File::open(path)
        .map(BufReader::new)
        .map_err(|e| decode_err(path, e))
}

fn non_empty(path: &Path, img: RgbImage) -> MontageResult<RgbImage> {
    if img.width() == 0 || img.height() == 0 {
        return Err(MontageError::decode(format!(
            "'{}' decoded to an empty image",
            path.display()
        )));
    }
    Ok(img)
}

fn decode_err(path: &Path, e: impl std::fmt::Display) -> MontageError {
    MontageError::decode(format!("failed to decode '{}': {e}", path.display()))
}

#[cfg(test)]
#[path = "../../tests/unit/assets/decode.rs"]
mod tests;
