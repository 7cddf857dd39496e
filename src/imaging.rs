/// Chart image normalization for OCR.
///
/// The charts render their tables in small anti-aliased digits on a light,
/// sometimes tinted background. Tesseract reads them reliably only after:
///
///   linear upscale (3x) → grayscale → Otsu binarization → 3x3 median filter
///
/// The output is a single-channel image containing only 0 and 255.

use crate::config::ImagingConfig;
use crate::model::ImageError;
use image::codecs::png::PngEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, GrayImage, ImageEncoder};
use imageproc::contrast::{ThresholdType, otsu_level, threshold};
use imageproc::filter::median_filter;

/// Decode downloaded chart bytes into an image of any color type.
pub fn decode_chart(bytes: &[u8]) -> Result<DynamicImage, ImageError> {
    let img = image::load_from_memory(bytes)?;
    let (width, height) = img.dimensions();
    if width == 0 || height == 0 {
        return Err(ImageError::Empty { width, height });
    }
    Ok(img)
}

/// Produce the binary image handed to the OCR engine.
pub fn normalize(img: &DynamicImage, cfg: &ImagingConfig) -> Result<GrayImage, ImageError> {
    let (width, height) = img.dimensions();
    if width == 0 || height == 0 {
        return Err(ImageError::Empty { width, height });
    }

    let factor = cfg.scale_factor.max(1);
    let scaled = img.resize_exact(width * factor, height * factor, FilterType::Triangle);
    let gray = scaled.to_luma8();

    let level = otsu_level(&gray);
    let binary = threshold(&gray, level, ThresholdType::Binary);

    if cfg.median_radius == 0 {
        return Ok(binary);
    }
    Ok(median_filter(&binary, cfg.median_radius, cfg.median_radius))
}

/// PNG-encode a normalized image, e.g. to inspect what the OCR engine saw.
pub fn encode_png(img: &GrayImage) -> Result<Vec<u8>, ImageError> {
    let mut png = Vec::new();
    PngEncoder::new(&mut png).write_image(
        img.as_raw(),
        img.width(),
        img.height(),
        image::ExtendedColorType::L8,
    )?;
    Ok(png)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    /// Light background with a dark vertical bar, like one glyph stroke.
    fn sample_chart() -> DynamicImage {
        let img = RgbImage::from_fn(20, 10, |x, _| {
            if (8..12).contains(&x) { Rgb([30, 30, 60]) } else { Rgb([235, 240, 250]) }
        });
        DynamicImage::ImageRgb8(img)
    }

    #[test]
    fn test_normalize_upscales_by_configured_factor() {
        let out = normalize(&sample_chart(), &ImagingConfig::default()).expect("should normalize");
        assert_eq!(out.dimensions(), (60, 30));
    }

    #[test]
    fn test_normalize_output_is_binary() {
        let out = normalize(&sample_chart(), &ImagingConfig::default()).expect("should normalize");
        assert!(out.pixels().all(|p| p[0] == 0 || p[0] == 255));
        // Glyph stays dark, background turns white.
        assert_eq!(out.get_pixel(30, 15)[0], 0);
        assert_eq!(out.get_pixel(2, 15)[0], 255);
    }

    #[test]
    fn test_median_filter_removes_isolated_speckle() {
        let mut img = RgbImage::from_pixel(12, 12, Rgb([240, 240, 240]));
        for x in 0..6 {
            for y in 0..12 {
                img.put_pixel(x, y, Rgb([20, 20, 20]));
            }
        }
        img.put_pixel(9, 6, Rgb([20, 20, 20]));
        let cfg = ImagingConfig { scale_factor: 1, median_radius: 1 };
        let out = normalize(&DynamicImage::ImageRgb8(img), &cfg).expect("should normalize");
        assert_eq!(out.get_pixel(9, 6)[0], 255, "single dark pixel should be filtered out");
        assert_eq!(out.get_pixel(2, 6)[0], 0, "solid dark region should survive");
    }

    #[test]
    fn test_empty_image_is_rejected() {
        let empty = DynamicImage::ImageRgb8(RgbImage::new(0, 5));
        let err = normalize(&empty, &ImagingConfig::default()).unwrap_err();
        assert!(matches!(err, ImageError::Empty { width: 0, height: 5 }));
    }

    #[test]
    fn test_decode_rejects_non_image_bytes() {
        let err = decode_chart(b"<html>404</html>").unwrap_err();
        assert!(matches!(err, ImageError::Decode(_)), "got {err:?}");
    }

    #[test]
    fn test_encoded_png_decodes_back_to_same_size() {
        let out = normalize(&sample_chart(), &ImagingConfig::default()).unwrap();
        let png = encode_png(&out).expect("png encoding");
        let decoded = decode_chart(&png).expect("png should decode");
        assert_eq!(decoded.dimensions(), out.dimensions());
    }
}
