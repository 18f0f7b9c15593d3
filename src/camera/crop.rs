//! Cropping a detection rectangle out of the camera still.

use image::{RgbaImage, imageops};

use super::detection::ClassifiedDetection;

/// Pixel rectangle in image coordinates (origin top-left).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Pixel rectangle covering `detection` plus symmetric padding.
///
/// Padding is `padding_ratio` of the smaller box side, added on every side,
/// then the rectangle is clipped to the image. Returns `None` when the
/// clipped rectangle is empty.
pub fn padded_detection_rect(
    detection: &ClassifiedDetection,
    image_width: u32,
    image_height: u32,
    padding_ratio: f64,
) -> Option<PixelRect> {
    if image_width == 0 || image_height == 0 {
        return None;
    }
    let w_img = image_width as f64;
    let h_img = image_height as f64;

    let wid = (detection.width * w_img).round();
    let hei = (detection.height * h_img).round();
    let left = (w_img * (0.5 + detection.center_x) - detection.width * w_img * 0.5).round();
    let top = (h_img * (0.5 + detection.center_y) - detection.height * h_img * 0.5).round();

    let pad = (wid * padding_ratio).min(hei * padding_ratio).max(0.0).floor();

    let x0 = (left - pad).clamp(0.0, w_img - 1.0);
    let y0 = (top - pad).clamp(0.0, h_img - 1.0);
    let x1 = (left + wid + pad).clamp(0.0, w_img);
    let y1 = (top + hei + pad).clamp(0.0, h_img);

    // Negated so NaN coordinates count as empty
    if !(x1 > x0 && y1 > y0) {
        return None;
    }
    let rect = PixelRect {
        x: x0 as u32,
        y: y0 as u32,
        width: (x1 - x0) as u32,
        height: (y1 - y0) as u32,
    };
    if rect.width == 0 || rect.height == 0 {
        return None;
    }
    Some(rect)
}

/// Copy of the padded detection region.
pub fn crop_detection(
    image: &RgbaImage,
    detection: &ClassifiedDetection,
    padding_ratio: f64,
) -> Option<RgbaImage> {
    let rect = padded_detection_rect(detection, image.width(), image.height(), padding_ratio)?;
    Some(imageops::crop_imm(image, rect.x, rect.y, rect.width, rect.height).to_image())
}
