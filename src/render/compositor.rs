use std::sync::Arc;

use image::imageops::{self, FilterType};
use image::RgbImage;

use crate::effects::blur::blur_rgb8;
use crate::effects::composite::darken_in_place;
use crate::foundation::core::Canvas;
use crate::foundation::error::{MontageError, MontageResult};
use crate::render::frame::FrameRgb;
use crate::sequence::timing::ZoomState;

/// Look of the blurred fill behind each item.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct BackgroundStyle {
    /// Gaussian blur radius in pixels for a canvas whose short edge is 1080 px.
    pub blur_radius_at_1080: f32,
    /// Brightness multiplier in `(0, 1]`.
    pub darken: f32,
    /// The fill is blurred at `canvas / thumbnail_divisor` and upscaled.
    pub thumbnail_divisor: u32,
}

impl Default for BackgroundStyle {
    fn default() -> Self {
        Self {
            blur_radius_at_1080: 50.0,
            darken: 0.4,
            thumbnail_divisor: 8,
        }
    }
}

impl BackgroundStyle {
    /// Blur radius for `canvas`, scaled from the 1080 px reference.
    pub fn blur_radius_for(&self, canvas: Canvas) -> f32 {
        self.blur_radius_at_1080 * canvas.short_edge() as f32 / 1080.0
    }
}

/// Foreground placement on the canvas.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Placement {
    /// Left edge.
    pub x: u32,
    /// Top edge.
    pub y: u32,
    /// Scaled foreground width.
    pub width: u32,
    /// Scaled foreground height.
    pub height: u32,
}

/// Centered aspect-fit rectangle for a `src_w`x`src_h` source, shrunk by `end_scale` and grown by
/// the current zoom. Always fits inside the canvas.
pub fn foreground_placement(src_w: u32, src_h: u32, canvas: Canvas, zoom: ZoomState) -> Placement {
    let (cw, ch) = (f64::from(canvas.width), f64::from(canvas.height));
    let (iw, ih) = (f64::from(src_w.max(1)), f64::from(src_h.max(1)));
    let end_scale = zoom.end_scale.max(1.0);
    let scale = (cw / iw).min(ch / ih) / end_scale * zoom.scale();

    let width = ((iw * scale).round() as u32).clamp(1, canvas.width);
    let height = ((ih * scale).round() as u32).clamp(1, canvas.height);
    Placement {
        x: (canvas.width - width) / 2,
        y: (canvas.height - height) / 2,
        width,
        height,
    }
}

/// Blurred, darkened aspect-fill of `src`, canvas sized.
pub fn render_background(
    src: &RgbImage,
    canvas: Canvas,
    style: &BackgroundStyle,
) -> MontageResult<RgbImage> {
    if src.width() == 0 || src.height() == 0 {
        return Err(MontageError::evaluation("background source is empty"));
    }
    let divisor = style.thumbnail_divisor.max(1);
    let tw = (canvas.width / divisor).max(1);
    let th = (canvas.height / divisor).max(1);

    let mut thumb = fill_crop(src, tw, th);
    let sigma = style.blur_radius_for(canvas) / divisor as f32;
    thumb = blur_rgb8(&thumb, sigma)?;
    darken_in_place(&mut thumb, style.darken);

    if (tw, th) == (canvas.width, canvas.height) {
        return Ok(thumb);
    }
    Ok(imageops::resize(
        &thumb,
        canvas.width,
        canvas.height,
        FilterType::CatmullRom,
    ))
}

/// Scale `src` to cover `w`x`h` and crop the center.
fn fill_crop(src: &RgbImage, w: u32, h: u32) -> RgbImage {
    let (iw, ih) = (f64::from(src.width()), f64::from(src.height()));
    let scale = (f64::from(w) / iw).max(f64::from(h) / ih);
    let sw = ((iw * scale).ceil() as u32).max(w);
    let sh = ((ih * scale).ceil() as u32).max(h);
    let scaled = imageops::resize(src, sw, sh, FilterType::Triangle);
    imageops::crop_imm(&scaled, (sw - w) / 2, (sh - h) / 2, w, h).to_image()
}

/// Letterbox compositor for one item: the background is prepared once and reused for every
/// frame of the item.
#[derive(Clone, Debug)]
pub struct LetterboxCompositor {
    canvas: Canvas,
    background: Arc<RgbImage>,
}

impl LetterboxCompositor {
    /// Prepare the background from the item's first frame.
    pub fn new(
        background_source: &RgbImage,
        canvas: Canvas,
        style: &BackgroundStyle,
    ) -> MontageResult<Self> {
        Ok(Self {
            canvas,
            background: Arc::new(render_background(background_source, canvas, style)?),
        })
    }

    /// Output canvas.
    pub fn canvas(&self) -> Canvas {
        self.canvas
    }

    /// Composite one foreground frame over the prepared background.
    pub fn compose(&self, source: &RgbImage, zoom: ZoomState) -> MontageResult<FrameRgb> {
        if source.width() == 0 || source.height() == 0 {
            return Err(MontageError::evaluation("foreground source is empty"));
        }
        let place = foreground_placement(source.width(), source.height(), self.canvas, zoom);
        let mut out = (*self.background).clone();
        if (place.width, place.height) == source.dimensions() {
            imageops::replace(&mut out, source, i64::from(place.x), i64::from(place.y));
        } else {
            let fg = imageops::resize(source, place.width, place.height, FilterType::CatmullRom);
            imageops::replace(&mut out, &fg, i64::from(place.x), i64::from(place.y));
        }
        Ok(FrameRgb::from_image(out))
    }
}

/// Composite `source` over a background derived from `background_source`.
///
/// Same inputs always produce the same pixels.
pub fn composite(
    source: &RgbImage,
    background_source: &RgbImage,
    canvas: Canvas,
    zoom: ZoomState,
    style: &BackgroundStyle,
) -> MontageResult<FrameRgb> {
    LetterboxCompositor::new(background_source, canvas, style)?.compose(source, zoom)
}

#[cfg(test)]
#[path = "../../tests/unit/render/compositor.rs"]
mod tests;
