// panorama.rs — equirectangular source image, decoded once and shared
// between backends

use image::{GenericImage, GenericImageView, Rgba, RgbaImage};

use crate::error::PanoramaError;

/// Decoded equirectangular panorama in RGBA8, at most `max_dimension` wide
/// and exactly 2:1 unless the source was taller than that.
#[derive(Debug, Clone)]
pub struct Panorama {
    pixels: RgbaImage,
}

impl Panorama {
    /// Decode an encoded image (JPEG/PNG), downscale it to fit
    /// `max_dimension` and pad it to 2:1.
    pub fn decode(bytes: &[u8], max_dimension: u32) -> Result<Self, PanoramaError> {
        let img = image::load_from_memory(bytes)?;
        let (w, h) = img.dimensions();
        log::debug!("panorama decoded: {w}x{h}");
        Self::from_rgba(img.to_rgba8(), max_dimension)
    }

    /// Wrap already-decoded pixels, applying the same size normalisation as
    /// [`Panorama::decode`].
    pub fn from_rgba(img: RgbaImage, max_dimension: u32) -> Result<Self, PanoramaError> {
        if img.width() == 0 || img.height() == 0 {
            return Err(PanoramaError::Empty);
        }
        let img = fit_texture_limit(img, max_dimension.max(1));
        Ok(Self { pixels: pad_to_equirect(img) })
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn pixels(&self) -> &RgbaImage {
        &self.pixels
    }

    /// Nearest-neighbour sample at texture coordinate (`u`, `v`), the same
    /// addressing the software projector uses: `floor(u * (w - 1))`.
    pub fn sample_nearest(&self, u: f32, v: f32) -> [u8; 4] {
        let (w, h) = self.pixels.dimensions();
        let x = ((u.clamp(0.0, 1.0) * (w - 1) as f32).floor() as u32).min(w - 1);
        let y = ((v.clamp(0.0, 1.0) * (h - 1) as f32).floor() as u32).min(h - 1);
        self.pixels.get_pixel(x, y).0
    }
}

fn fit_texture_limit(img: RgbaImage, max_dimension: u32) -> RgbaImage {
    let (src_w, src_h) = img.dimensions();
    if src_w <= max_dimension && src_h <= max_dimension {
        return img;
    }
    let scale = (max_dimension as f32 / src_w.max(src_h) as f32).min(1.0);
    let new_w = ((src_w as f32 * scale) as u32).max(1);
    let new_h = ((src_h as f32 * scale) as u32).max(1);
    log::info!("panorama {src_w}x{src_h} exceeds texture limit {max_dimension}, scaled to {new_w}x{new_h}");
    image::DynamicImage::ImageRgba8(img)
        .resize(new_w, new_h, image::imageops::FilterType::Lanczos3)
        .to_rgba8()
}

/// Images shorter than 2:1 get black rows on top so the source lands on the
/// lower part of the sphere.
fn pad_to_equirect(img: RgbaImage) -> RgbaImage {
    let (w, h) = img.dimensions();
    let target_h = w / 2;
    if target_h == 0 || h >= target_h {
        return img;
    }
    let mut canvas = RgbaImage::from_pixel(w, target_h, Rgba([0, 0, 0, 255]));
    if let Err(e) = canvas.copy_from(&img, 0, target_h - h) {
        log::warn!("failed to pad panorama: {e}");
        return img;
    }
    canvas
}
