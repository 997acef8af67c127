use anyhow::{Context, Result};
use image::imageops::{self, FilterType};
use image::{DynamicImage, ImageFormat};
use std::io::Cursor;
use std::path::Path;

/// Scale `overlay` to `scale * base.width` (keeping its aspect ratio) and
/// alpha-blend it centered on the bottom edge of `base`.
///
/// Returns a new RGBA image; neither input is modified.
pub fn composite(base: &DynamicImage, overlay: &DynamicImage, scale: f32) -> DynamicImage {
    let mut canvas = base.to_rgba8();
    let badge = overlay.to_rgba8();
    let (width, height) = canvas.dimensions();

    if width == 0 || height == 0 || badge.width() == 0 || badge.height() == 0 {
        return DynamicImage::ImageRgba8(canvas);
    }

    let target_width = ((width as f64 * scale as f64).floor() as u32).clamp(1, width);
    let target_height =
        ((badge.height() as f64 * target_width as f64 / badge.width() as f64).floor() as u32).max(1);

    let resized = imageops::resize(&badge, target_width, target_height, FilterType::Lanczos3);

    let x = ((width - target_width) / 2) as i64;
    let y = height as i64 - target_height as i64;
    imageops::overlay(&mut canvas, &resized, x, y);

    DynamicImage::ImageRgba8(canvas)
}

/// The badge image plus the scale it is applied at.
pub struct Compositor {
    overlay: DynamicImage,
    scale: f32,
}

impl Compositor {
    pub fn new(overlay: DynamicImage, scale: f32) -> Self {
        Self { overlay, scale }
    }

    pub fn load(path: &Path, scale: f32) -> Result<Self> {
        let overlay = image::open(path)
            .with_context(|| format!("Failed to open overlay image {}", path.display()))?;
        Ok(Self::new(overlay, scale))
    }

    /// Decode a downloaded poster and badge it.
    pub fn apply(&self, poster: &[u8]) -> Result<DynamicImage> {
        let base = image::load_from_memory(poster).context("Poster is not a decodable image")?;
        Ok(composite(&base, &self.overlay, self.scale))
    }
}

pub fn encode_png(image: &DynamicImage) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut out), ImageFormat::Png)
        .context("Failed to encode PNG")?;
    Ok(out)
}

pub fn save_png(image: &DynamicImage, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    image
        .save_with_format(path, ImageFormat::Png)
        .with_context(|| format!("Failed to write {}", path.display()))
}
