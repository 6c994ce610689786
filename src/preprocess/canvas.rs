//! Image preprocessing for hand-drawn digit uploads.
//!
//! Browser canvases produce dark strokes on a light background at arbitrary
//! sizes; the networks are trained on MNIST-style digits (light strokes on
//! black, fitted into a 20×20 box and centred on a 28×28 canvas). These
//! functions bridge the two.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use image::codecs::png::PngEncoder;
use image::imageops::{self, FilterType};
use image::{ColorType, GrayImage, ImageEncoder, Luma};

use crate::error::PreprocessError;
use crate::math::tensor::Tensor;
use crate::network::registry::INPUT_SIDE;

/// Pixels brighter than this (after inversion) count as ink.
const INK_THRESHOLD: u8 = 50;
/// Longest side of the digit once fitted.
const FIT_SIDE: u32 = 20;

const MNIST_MEAN: f64 = 0.1307;
const MNIST_STD: f64 = 0.3081;

fn binarize(img: &mut GrayImage) {
    for p in img.pixels_mut() {
        p.0[0] = if p.0[0] > INK_THRESHOLD { 255 } else { 0 };
    }
}

/// Bounding box `(x, y, width, height)` of the non-zero pixels.
fn ink_bounds(img: &GrayImage) -> Option<(u32, u32, u32, u32)> {
    let mut bounds: Option<(u32, u32, u32, u32)> = None;
    for (x, y, p) in img.enumerate_pixels() {
        if p.0[0] == 0 {
            continue;
        }
        bounds = Some(match bounds {
            None => (x, y, x, y),
            Some((x0, y0, x1, y1)) => (x0.min(x), y0.min(y), x1.max(x), y1.max(y)),
        });
    }
    bounds.map(|(x0, y0, x1, y1)| (x0, y0, x1 - x0 + 1, y1 - y0 + 1))
}

/// Decodes an uploaded image and turns it into a centred 28×28 MNIST-style
/// digit: inverted, binarized, cropped to the ink, fitted into 20×20 and
/// pasted in the middle of a black canvas.
///
/// An image with no ink gives the all-black canvas. Feeding an output back in
/// (after inverting it to dark-on-light again) reproduces the same output.
pub fn normalize_for_model(bytes: &[u8]) -> Result<GrayImage, PreprocessError> {
    let mut img = image::load_from_memory(bytes)?.to_luma8();
    imageops::invert(&mut img);
    binarize(&mut img);

    let side = INPUT_SIDE as u32;
    let mut canvas = GrayImage::from_pixel(side, side, Luma([0]));

    let (x, y, w, h) = match ink_bounds(&img) {
        Some(b) => b,
        None => return Ok(canvas),
    };
    let mut digit = imageops::crop_imm(&img, x, y, w, h).to_image();

    let ratio = (FIT_SIDE as f64 / w as f64).min(FIT_SIDE as f64 / h as f64);
    let new_w = ((w as f64 * ratio).floor() as u32).max(1);
    let new_h = ((h as f64 * ratio).floor() as u32).max(1);
    if (new_w, new_h) != (w, h) {
        digit = imageops::resize(&digit, new_w, new_h, FilterType::Lanczos3);
        binarize(&mut digit);
    }

    let left = (side - new_w) / 2;
    let top = (side - new_h) / 2;
    imageops::replace(&mut canvas, &digit, left as i64, top as i64);
    Ok(canvas)
}

/// MNIST-normalized `[1, 1, 28, 28]` tensor for a preprocessed digit.
pub fn to_model_input(img: &GrayImage) -> Tensor {
    let side = INPUT_SIDE;
    let resized;
    let img = if img.dimensions() == (side as u32, side as u32) {
        img
    } else {
        resized = imageops::resize(img, side as u32, side as u32, FilterType::Triangle);
        &resized
    };
    let data = img
        .pixels()
        .map(|p| (p.0[0] as f64 / 255.0 - MNIST_MEAN) / MNIST_STD)
        .collect();
    Tensor::from_vec(&[1, 1, side, side], data)
}

/// Min-max scales arbitrary values into a `side × side` grayscale image.
/// A constant input maps to black.
pub fn scaled_to_image(values: &[f64], side: u32) -> Result<GrayImage, PreprocessError> {
    let (lo, hi) = values
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    let range = hi - lo;
    let pixels = values
        .iter()
        .map(|&v| {
            if range > 0.0 && range.is_finite() {
                ((v - lo) / range * 255.0).round().clamp(0.0, 255.0) as u8
            } else {
                0
            }
        })
        .collect();
    GrayImage::from_raw(side, side, pixels).ok_or_else(|| {
        PreprocessError::Encode(format!("{} values do not fill a {}x{} image", values.len(), side, side))
    })
}

pub fn encode_png(img: &GrayImage) -> Result<Vec<u8>, PreprocessError> {
    let mut buf = Vec::new();
    PngEncoder::new(&mut buf)
        .write_image(img.as_raw(), img.width(), img.height(), ColorType::L8)
        .map_err(|e| PreprocessError::Encode(e.to_string()))?;
    Ok(buf)
}

/// `data:image/png;base64,…` URL for display in the browser.
pub fn to_data_url(img: &GrayImage) -> Result<String, PreprocessError> {
    let png = encode_png(img)?;
    Ok(format!("data:image/png;base64,{}", STANDARD.encode(png)))
}

#[cfg(test)]
mod tests {
    use super::*;

    /// White 28×28 canvas with a dark filled rectangle.
    fn drawing(x: u32, y: u32, w: u32, h: u32) -> GrayImage {
        let mut img = GrayImage::from_pixel(28, 28, Luma([255]));
        for py in y..y + h {
            for px in x..x + w {
                img.put_pixel(px, py, Luma([0]));
            }
        }
        img
    }

    fn lit(img: &GrayImage) -> usize {
        img.pixels().filter(|p| p.0[0] == 255).count()
    }

    #[test]
    fn blank_canvas_gives_black_image() {
        let png = encode_png(&GrayImage::from_pixel(40, 40, Luma([255]))).unwrap();
        let out = normalize_for_model(&png).unwrap();
        assert_eq!(out.dimensions(), (28, 28));
        assert_eq!(lit(&out), 0);
    }

    #[test]
    fn fitted_digit_is_kept_and_centred() {
        let png = encode_png(&drawing(10, 4, 8, 20)).unwrap();
        let out = normalize_for_model(&png).unwrap();
        assert_eq!(lit(&out), 8 * 20);
        assert_eq!(ink_bounds(&out), Some((10, 4, 8, 20)));
    }

    #[test]
    fn renormalizing_output_is_idempotent() {
        let png = encode_png(&drawing(10, 4, 8, 20)).unwrap();
        let first = normalize_for_model(&png).unwrap();

        let mut inverted = first.clone();
        imageops::invert(&mut inverted);
        let second = normalize_for_model(&encode_png(&inverted).unwrap()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn small_corner_mark_is_scaled_to_twenty_pixels() {
        let png = encode_png(&drawing(0, 0, 4, 4)).unwrap();
        let out = normalize_for_model(&png).unwrap();
        assert_eq!(ink_bounds(&out), Some((4, 4, 20, 20)));
        assert_eq!(lit(&out), 400);
    }

    #[test]
    fn wide_mark_keeps_aspect_ratio() {
        let png = encode_png(&drawing(2, 12, 24, 3)).unwrap();
        let out = normalize_for_model(&png).unwrap();
        // 24×3 scaled by 20/24 → 20×2, centred at ((28-20)/2, (28-2)/2).
        let (x, y, w, h) = ink_bounds(&out).unwrap();
        assert_eq!((x, w), (4, 20));
        assert!(h <= 3 && y >= 12 && y <= 13);
    }

    #[test]
    fn garbage_bytes_are_a_decode_error() {
        assert!(matches!(
            normalize_for_model(b"definitely not an image"),
            Err(PreprocessError::Decode(_))
        ));
    }

    #[test]
    fn model_input_uses_mnist_normalization() {
        let t = to_model_input(&GrayImage::from_pixel(28, 28, Luma([255])));
        assert_eq!(t.shape, vec![1, 1, 28, 28]);
        assert!((t.data[0] - (1.0 - 0.1307) / 0.3081).abs() < 1e-12);
    }

    #[test]
    fn data_url_has_png_prefix() {
        let img = scaled_to_image(&[0.0, 1.0, 2.0, 3.0], 2).unwrap();
        assert_eq!(img.get_pixel(1, 1).0[0], 255);
        assert_eq!(img.get_pixel(0, 0).0[0], 0);
        let url = to_data_url(&img).unwrap();
        assert!(url.starts_with("data:image/png;base64,"));
        assert!(scaled_to_image(&[1.0; 3], 2).is_err());
    }
}
