use image::codecs::bmp::BmpEncoder;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::{DynamicImage, ImageEncoder, ImageError, RgbaImage, imageops};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::mpsc;
use tracing::{debug, info, warn};

use crate::error::{RedactError, Result};

/// Extensions (lowercase) accepted as source images.
pub const SUPPORTED_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "bmp", "webp"];

/// Default longest-edge limit applied on load.
pub const DEFAULT_MAX_DIMENSION: u32 = 2500;

pub fn is_supported_extension(ext: &str) -> bool {
    SUPPORTED_EXTENSIONS.contains(&ext.to_lowercase().as_str())
}

fn extension_of(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase()
}

// ============================================================================
// LOADING
// ============================================================================

/// Synchronously load a source image, downscaled so its longest edge is at
/// most `max_dimension`.
///
/// Supported inputs: JPEG, PNG, GIF (first frame), BMP, WebP. Anything else is
/// rejected by extension before any decoding happens.
pub fn load_image_sync(path: &Path, max_dimension: u32) -> Result<RgbaImage> {
    let ext = extension_of(path);
    if !is_supported_extension(&ext) {
        return Err(RedactError::UnsupportedFormat(format!(
            "{} (accepted: {})",
            path.display(),
            SUPPORTED_EXTENSIONS.join(", ")
        )));
    }

    let img = image::open(path)?.to_rgba8();
    let (w, h) = img.dimensions();
    if w == 0 || h == 0 {
        return Err(RedactError::InvalidInput(format!("{} has no pixels", path.display())));
    }
    let img = downscale_to_fit(img, max_dimension);
    info!(path = %path.display(), width = img.width(), height = img.height(), "image decoded");
    Ok(img)
}

/// Proportionally shrink `img` so neither edge exceeds `max_dimension`.
pub fn downscale_to_fit(img: RgbaImage, max_dimension: u32) -> RgbaImage {
    let (w, h) = img.dimensions();
    let longest = w.max(h);
    if max_dimension == 0 || longest <= max_dimension {
        return img;
    }
    let scale = max_dimension as f32 / longest as f32;
    let new_w = ((w as f32 * scale).round() as u32).clamp(1, max_dimension);
    let new_h = ((h as f32 * scale).round() as u32).clamp(1, max_dimension);
    debug!(from_w = w, from_h = h, new_w, new_h, "downscaling source");
    imageops::resize(&img, new_w, new_h, imageops::FilterType::Triangle)
}

/// Handle to a decode running on the rayon pool. Yields exactly one result.
pub struct PendingLoad {
    receiver: mpsc::Receiver<Result<RgbaImage>>,
}

impl PendingLoad {
    /// Non-blocking poll. `None` while the decode is still running.
    pub fn try_take(&self) -> Option<Result<RgbaImage>> {
        match self.receiver.try_recv() {
            Ok(result) => Some(result),
            Err(mpsc::TryRecvError::Empty) => None,
            Err(mpsc::TryRecvError::Disconnected) => Some(Err(worker_lost())),
        }
    }

    /// Block until the decode finishes.
    pub fn wait(self) -> Result<RgbaImage> {
        self.receiver.recv().unwrap_or_else(|_| Err(worker_lost()))
    }
}

fn worker_lost() -> RedactError {
    RedactError::InvalidInput("decode worker exited without a result".into())
}

/// Decode `path` in the background.
pub fn spawn_load(path: impl AsRef<Path>, max_dimension: u32) -> PendingLoad {
    let path = path.as_ref().to_path_buf();
    let (sender, receiver) = mpsc::channel();
    rayon::spawn(move || {
        let result = load_image_sync(&path, max_dimension);
        if let Err(e) = &result {
            warn!(path = %path.display(), error = %e, "background load failed");
        }
        let _ = sender.send(result);
    });
    PendingLoad { receiver }
}

// ============================================================================
// SAVING
// ============================================================================

/// Output formats for exported images.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum SaveFormat {
    #[default]
    Png,
    Jpeg,
    Webp,
    Bmp,
}

impl SaveFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            SaveFormat::Png => "png",
            SaveFormat::Jpeg => "jpg",
            SaveFormat::Webp => "webp",
            SaveFormat::Bmp => "bmp",
        }
    }

    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "png" => Some(SaveFormat::Png),
            "jpg" | "jpeg" => Some(SaveFormat::Jpeg),
            "webp" => Some(SaveFormat::Webp),
            "bmp" => Some(SaveFormat::Bmp),
            _ => None,
        }
    }

    /// Format implied by a path's extension, PNG when unknown.
    pub fn for_path(path: &Path) -> Self {
        Self::from_extension(&extension_of(path)).unwrap_or_default()
    }
}

/// Encode and write an image to a file.
/// Standalone (no `&mut self`) so it can run on a background thread.
/// Every failure is reported as [`RedactError::ExportFailed`].
pub fn encode_and_write(image: &RgbaImage, path: &Path, format: SaveFormat, quality: u8) -> Result<()> {
    encode_inner(image, path, format, quality)
        .map_err(|e| RedactError::ExportFailed(format!("{}: {}", path.display(), e)))?;
    debug!(path = %path.display(), ?format, "export written");
    Ok(())
}

fn encode_inner(image: &RgbaImage, path: &Path, format: SaveFormat, quality: u8) -> std::result::Result<(), ImageError> {
    let create = || -> std::io::Result<BufWriter<File>> { Ok(BufWriter::new(File::create(path)?)) };

    match format {
        SaveFormat::Png => {
            let mut writer = create()?;
            PngEncoder::new(&mut writer).write_image(
                image.as_raw(),
                image.width(),
                image.height(),
                image::ColorType::Rgba8,
            )?;
            writer.flush()?;
        }
        SaveFormat::Jpeg => {
            let mut writer = create()?;
            let rgb_image = DynamicImage::ImageRgba8(image.clone()).to_rgb8();
            let mut encoder = JpegEncoder::new_with_quality(&mut writer, quality.clamp(1, 100));
            encoder.encode(
                rgb_image.as_raw(),
                rgb_image.width(),
                rgb_image.height(),
                image::ColorType::Rgb8,
            )?;
            writer.flush()?;
        }
        SaveFormat::Webp => {
            DynamicImage::ImageRgba8(image.clone()).save_with_format(path, image::ImageFormat::WebP)?;
        }
        SaveFormat::Bmp => {
            let mut writer = create()?;
            let mut encoder = BmpEncoder::new(&mut writer);
            encoder.encode(
                image.as_raw(),
                image.width(),
                image.height(),
                image::ColorType::Rgba8,
            )?;
            writer.flush()?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn sample() -> RgbaImage {
        RgbaImage::from_fn(30, 20, |x, y| Rgba([x as u8 * 8, y as u8 * 12, 90, 255]))
    }

    #[test]
    fn rejects_unlisted_extensions_before_decoding() {
        let err = load_image_sync(Path::new("scan.tiff"), DEFAULT_MAX_DIMENSION).unwrap_err();
        assert!(matches!(err, RedactError::UnsupportedFormat(_)));
        assert!(is_supported_extension("JPEG"));
    }

    #[test]
    fn missing_file_is_a_decode_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_image_sync(&dir.path().join("nope.png"), DEFAULT_MAX_DIMENSION).unwrap_err();
        assert!(matches!(err, RedactError::Decode(_)));
    }

    #[test]
    fn png_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.png");
        encode_and_write(&sample(), &path, SaveFormat::for_path(&path), 90).unwrap();
        assert_eq!(load_image_sync(&path, DEFAULT_MAX_DIMENSION).unwrap(), sample());
    }

    #[test]
    fn large_images_are_downscaled_on_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("big.bmp");
        encode_and_write(&RgbaImage::new(400, 100), &path, SaveFormat::Bmp, 90).unwrap();
        let img = load_image_sync(&path, 200).unwrap();
        assert_eq!(img.dimensions(), (200, 50));
    }

    #[test]
    fn jpeg_export_drops_alpha_but_writes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.jpg");
        assert_eq!(SaveFormat::for_path(&path), SaveFormat::Jpeg);
        encode_and_write(&sample(), &path, SaveFormat::Jpeg, 80).unwrap();
        assert_eq!(load_image_sync(&path, 0).unwrap().dimensions(), (30, 20));
    }

    #[test]
    fn unwritable_destination_is_export_failed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("no_such_dir").join("out.png");
        let err = encode_and_write(&sample(), &path, SaveFormat::Png, 90).unwrap_err();
        assert!(matches!(err, RedactError::ExportFailed(_)));
    }

    #[test]
    fn background_load_delivers_one_result() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bg.png");
        encode_and_write(&sample(), &path, SaveFormat::Png, 90).unwrap();
        let pending = spawn_load(&path, DEFAULT_MAX_DIMENSION);
        assert_eq!(pending.wait().unwrap().dimensions(), (30, 20));

        let failing = spawn_load(dir.path().join("absent.gif"), DEFAULT_MAX_DIMENSION);
        assert!(failing.wait().is_err());
    }
}
