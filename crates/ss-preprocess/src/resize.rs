use anyhow::{Context, Result, ensure};
use fast_image_resize::images::Image;
use fast_image_resize::{PixelType, ResizeOptions, Resizer as FirResizer};
use image::GrayImage;

/// Resizer réutilisable wrappant fast_image_resize pour les images en niveaux de gris.
///
/// # Example
/// ```
/// use image::GrayImage;
/// use ss_preprocess::resize::GrayResizer;
/// let mut r = GrayResizer::new();
/// let out = r.resize(&GrayImage::new(100, 40), 50, 20).unwrap();
/// assert_eq!(out.dimensions(), (50, 20));
/// ```
pub struct GrayResizer {
    inner: FirResizer,
    options: ResizeOptions,
    /// Owned copy of the source: fast_image_resize wants `&mut` on it.
    src_buf: Vec<u8>,
}

impl GrayResizer {
    /// Create a new resizer.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: FirResizer::new(),
            options: ResizeOptions::new(),
            src_buf: Vec::new(),
        }
    }

    /// Resize `src` to `width` x `height`.
    ///
    /// # Errors
    /// Returns an error if either image has a zero dimension or the resize
    /// fails.
    pub fn resize(&mut self, src: &GrayImage, width: u32, height: u32) -> Result<GrayImage> {
        let (sw, sh) = src.dimensions();
        ensure!(
            sw > 0 && sh > 0 && width > 0 && height > 0,
            "cannot resize {sw}x{sh} to {width}x{height}"
        );
        if (sw, sh) == (width, height) {
            return Ok(src.clone());
        }

        self.src_buf.clear();
        self.src_buf.extend_from_slice(src.as_raw());
        let src_image = Image::from_slice_u8(sw, sh, &mut self.src_buf, PixelType::U8)
            .context("Invalid source dimensions")?;

        let mut dst_image = Image::new(width, height, PixelType::U8);
        self.inner
            .resize(&src_image, &mut dst_image, Some(&self.options))
            .context("Resize failed")?;

        GrayImage::from_raw(width, height, dst_image.into_vec())
            .context("Resized buffer has the wrong length")
    }
}

impl Default for GrayResizer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniform_image_stays_uniform() {
        let src = GrayImage::from_pixel(64, 30, image::Luma([120]));
        let out = GrayResizer::new().resize(&src, 16, 90).unwrap();
        assert_eq!(out.dimensions(), (16, 90));
        assert!(out.pixels().all(|p| p.0[0].abs_diff(120) <= 1));
    }

    #[test]
    fn zero_sized_target_is_rejected() {
        let src = GrayImage::new(4, 4);
        assert!(GrayResizer::new().resize(&src, 0, 4).is_err());
    }
}
