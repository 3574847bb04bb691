//! Image decoding, fitting and JPEG encoding.
//!
//! Everything here is synchronous and CPU-bound; [`render_targets`] moves the
//! work onto tokio's blocking pool.

use crate::models::derivation::{DerivationTarget, FitMode};
use image::{
    DynamicImage, GenericImageView, ImageDecoder, ImageReader, codecs::jpeg::JpegEncoder,
    imageops::FilterType,
};
use std::{
    fs::File,
    io::{self, BufWriter, Write},
    path::{Path, PathBuf},
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ImagingError {
    #[error("image codec error: {0}")]
    Codec(#[from] image::ImageError),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("image worker failed: {0}")]
    Worker(String),
}

/// Decode the file at `path` and apply its EXIF orientation.
///
/// Metadata is not carried over; re-encoded output has none.
pub fn load_oriented(path: &Path) -> Result<DynamicImage, ImagingError> {
    let mut decoder = ImageReader::open(path)?
        .with_guessed_format()?
        .into_decoder()?;
    let orientation = decoder.orientation()?;
    let mut image = DynamicImage::from_decoder(decoder)?;
    image.apply_orientation(orientation);
    Ok(image)
}

/// Map `image` into a `max_width × max_height` box.
///
/// An image already inside the box is returned as is. Otherwise `Inside`
/// shrinks it to fit and `Outside` scales it to cover the box (upscaling the
/// short side if needed) before center-cropping to exactly the box.
pub fn fit_image(image: DynamicImage, max_width: u32, max_height: u32, fit: FitMode) -> DynamicImage {
    let (width, height) = image.dimensions();
    if width <= max_width && height <= max_height {
        return image;
    }

    match fit {
        FitMode::Inside => image.resize(max_width, max_height, FilterType::Lanczos3),
        FitMode::Outside => image.resize_to_fill(max_width, max_height, FilterType::Lanczos3),
    }
}

/// Encode as baseline JPEG at `quality` (clamped to 1–100).
pub fn write_jpeg(image: &DynamicImage, quality: u8, path: &Path) -> Result<(), ImagingError> {
    let rgb = DynamicImage::ImageRgb8(image.to_rgb8());
    let mut writer = BufWriter::new(File::create(path)?);
    let encoder = JpegEncoder::new_with_quality(&mut writer, quality.clamp(1, 100));
    rgb.write_with_encoder(encoder)?;
    writer.flush()?;
    Ok(())
}

/// Apply `targets` in order, each to the previous output, writing each result
/// to its paired path.
pub fn render_chain(
    source: &Path,
    targets: &[(DerivationTarget, PathBuf)],
) -> Result<(), ImagingError> {
    let mut image = load_oriented(source)?;
    for (target, output) in targets {
        image = fit_image(image, target.max_width, target.max_height, target.fit);
        write_jpeg(&image, target.quality, output)?;
    }
    Ok(())
}

/// [`render_chain`] on the blocking pool.
pub async fn render_targets(
    source: PathBuf,
    targets: Vec<(DerivationTarget, PathBuf)>,
) -> Result<(), ImagingError> {
    tokio::task::spawn_blocking(move || render_chain(&source, &targets))
        .await
        .map_err(|err| ImagingError::Worker(err.to_string()))?
}

#[cfg(test)]
pub(crate) fn sample_jpeg(width: u32, height: u32) -> Vec<u8> {
    let img = image::RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([(x % 256) as u8, (y % 256) as u8, 128])
    });
    let mut buf = io::Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(img)
        .write_to(&mut buf, image::ImageFormat::Jpeg)
        .unwrap();
    buf.into_inner()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blank(width: u32, height: u32) -> DynamicImage {
        DynamicImage::new_rgb8(width, height)
    }

    #[test]
    fn inside_shrinks_preserving_aspect() {
        let out = fit_image(blank(2048, 1024), 1024, 1024, FitMode::Inside);
        assert_eq!(out.dimensions(), (1024, 512));

        let out = fit_image(blank(900, 3000), 1024, 1024, FitMode::Inside);
        let (w, h) = out.dimensions();
        assert_eq!(h, 1024);
        assert!(w <= 1024 && w >= 306);
    }

    #[test]
    fn inside_never_upscales() {
        let out = fit_image(blank(640, 480), 1024, 1024, FitMode::Inside);
        assert_eq!(out.dimensions(), (640, 480));
    }

    #[test]
    fn outside_crops_to_exact_bound() {
        let out = fit_image(blank(400, 300), 150, 150, FitMode::Outside);
        assert_eq!(out.dimensions(), (150, 150));

        let out = fit_image(blank(300, 1200), 150, 150, FitMode::Outside);
        assert_eq!(out.dimensions(), (150, 150));
    }

    #[test]
    fn outside_leaves_small_sources_alone() {
        let out = fit_image(blank(100, 80), 150, 150, FitMode::Outside);
        assert_eq!(out.dimensions(), (100, 80));
    }

    #[test]
    fn outside_scales_short_side_up_when_one_side_overflows() {
        for (w, h) in [(100, 400), (400, 120), (149, 1000)] {
            let out = fit_image(blank(w, h), 150, 150, FitMode::Outside);
            assert_eq!(out.dimensions(), (150, 150), "source {w}x{h}");
        }
    }

    #[test]
    fn chain_feeds_each_target_the_previous_output() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("src.jpg");
        std::fs::write(&source, sample_jpeg(2000, 1500)).unwrap();

        let compressed = dir.path().join("compressed.jpg");
        let thumb = dir.path().join("thumb.jpg");
        render_chain(
            &source,
            &[
                (DerivationTarget::compressed_original(), compressed.clone()),
                (DerivationTarget::thumbnail(), thumb.clone()),
            ],
        )
        .unwrap();

        assert_eq!(image::image_dimensions(&compressed).unwrap(), (1024, 768));
        assert_eq!(image::image_dimensions(&thumb).unwrap(), (150, 150));
    }

    #[test]
    fn png_with_alpha_is_written_as_jpeg() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("logo.png");
        DynamicImage::new_rgba8(300, 200).save(&source).unwrap();

        let out = dir.path().join("thumb_logo.png");
        render_chain(&source, &[(DerivationTarget::thumbnail(), out.clone())]).unwrap();

        let bytes = std::fs::read(&out).unwrap();
        assert_eq!(image::guess_format(&bytes).unwrap(), image::ImageFormat::Jpeg);
    }

    /// Splice an APP1 Exif segment carrying only an Orientation tag right after SOI.
    fn with_exif_orientation(jpeg: Vec<u8>, orientation: u16) -> Vec<u8> {
        let mut tiff = vec![b'I', b'I', 0x2A, 0x00, 0x08, 0x00, 0x00, 0x00];
        tiff.extend_from_slice(&1u16.to_le_bytes());
        tiff.extend_from_slice(&0x0112u16.to_le_bytes());
        tiff.extend_from_slice(&3u16.to_le_bytes());
        tiff.extend_from_slice(&1u32.to_le_bytes());
        tiff.extend_from_slice(&orientation.to_le_bytes());
        tiff.extend_from_slice(&[0, 0]);
        tiff.extend_from_slice(&0u32.to_le_bytes());

        let mut payload = b"Exif\0\0".to_vec();
        payload.extend_from_slice(&tiff);
        let len = (payload.len() + 2) as u16;

        let mut out = jpeg[..2].to_vec();
        out.extend_from_slice(&[0xFF, 0xE1]);
        out.extend_from_slice(&len.to_be_bytes());
        out.extend_from_slice(&payload);
        out.extend_from_slice(&jpeg[2..]);
        out
    }

    #[test]
    fn exif_rotation_is_applied_and_metadata_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("portrait.jpg");
        std::fs::write(&source, with_exif_orientation(sample_jpeg(40, 20), 6)).unwrap();

        let mut decoder = ImageReader::open(&source)
            .unwrap()
            .with_guessed_format()
            .unwrap()
            .into_decoder()
            .unwrap();
        assert_eq!(decoder.orientation().unwrap(), image::metadata::Orientation::Rotate90);

        assert_eq!(load_oriented(&source).unwrap().dimensions(), (20, 40));

        let out = dir.path().join("compressed_portrait.jpg");
        render_chain(&source, &[(DerivationTarget::compressed_original(), out.clone())]).unwrap();
        assert_eq!(image::image_dimensions(&out).unwrap(), (20, 40));

        let mut written = ImageReader::open(&out)
            .unwrap()
            .with_guessed_format()
            .unwrap()
            .into_decoder()
            .unwrap();
        assert!(written.exif_metadata().unwrap().is_none());
        assert_eq!(written.orientation().unwrap(), image::metadata::Orientation::NoTransforms);
    }

    #[test]
    fn undecodable_input_is_a_codec_error() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("broken.jpg");
        std::fs::write(&source, b"definitely not a jpeg").unwrap();
        let err = load_oriented(&source).unwrap_err();
        assert!(matches!(err, ImagingError::Codec(_)));
    }
}
