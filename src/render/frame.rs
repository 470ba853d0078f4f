use image::RgbImage;

use crate::foundation::core::Canvas;
use crate::foundation::error::{MontageError, MontageResult};

/// A composited output frame as packed RGB24 pixels.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FrameRgb {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// RGB8 bytes, tightly packed, row-major.
    pub data: Vec<u8>,
}

impl FrameRgb {
    /// Wrap an RGB image without copying.
    pub fn from_image(img: RgbImage) -> Self {
        let (width, height) = img.dimensions();
        Self {
            width,
            height,
            data: img.into_raw(),
        }
    }

    /// Copy the frame back into an [`RgbImage`].
    pub fn to_image(&self) -> MontageResult<RgbImage> {
        RgbImage::from_raw(self.width, self.height, self.data.clone())
            .ok_or_else(|| MontageError::evaluation("frame data does not match its dimensions"))
    }

    /// `true` when the frame has the canvas dimensions.
    pub fn matches(&self, canvas: Canvas) -> bool {
        self.width == canvas.width
            && self.height == canvas.height
            && self.data.len() == canvas.rgb24_len()
    }

    /// RGB value at `(x, y)`.
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 3]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let i = (y as usize * self.width as usize + x as usize) * 3;
        let px = self.data.get(i..i + 3)?;
        Some([px[0], px[1], px[2]])
    }
}
