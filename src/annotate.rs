//! Review overlay: outlines every card on the source image, green when it
//! resolved to a catalog entry and red when it did not.

use crate::error::ScanError;
use crate::resolve::ResolvedCard;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;
use std::io::Cursor;

pub const MATCHED_COLOR: Rgb<u8> = Rgb([0, 128, 0]);
pub const UNMATCHED_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
/// Outline thickness in pixels, drawn inward from the card's box
pub const LINE_WIDTH: u32 = 6;

fn color_for(card: &ResolvedCard) -> Rgb<u8> {
    if card.status.is_matched() {
        MATCHED_COLOR
    } else {
        UNMATCHED_COLOR
    }
}

/// Pixel rectangle of a card clamped to the image, `None` if it lies outside
fn pixel_bounds(card: &ResolvedCard, width: u32, height: u32) -> Option<(i64, i64, i64, i64)> {
    if width == 0 || height == 0 {
        return None;
    }
    let xs = card.bbox.iter().map(|p| p.x);
    let ys = card.bbox.iter().map(|p| p.y);
    let x_min = xs.clone().fold(f64::INFINITY, f64::min).floor();
    let x_max = xs.fold(f64::NEG_INFINITY, f64::max).ceil();
    let y_min = ys.clone().fold(f64::INFINITY, f64::min).floor();
    let y_max = ys.fold(f64::NEG_INFINITY, f64::max).ceil();

    if !(x_min.is_finite() && x_max.is_finite() && y_min.is_finite() && y_max.is_finite()) {
        return None;
    }
    if x_max < 0.0 || y_max < 0.0 || x_min >= width as f64 || y_min >= height as f64 {
        return None;
    }

    let clamp_x = |v: f64| (v as i64).clamp(0, width as i64 - 1);
    let clamp_y = |v: f64| (v as i64).clamp(0, height as i64 - 1);
    Some((clamp_x(x_min), clamp_y(y_min), clamp_x(x_max), clamp_y(y_max)))
}

/// Draw card outlines onto a copy of the image
pub fn render(image: &DynamicImage, cards: &[ResolvedCard]) -> RgbImage {
    let mut canvas = image.to_rgb8();
    let (width, height) = canvas.dimensions();

    for card in cards {
        let Some((x0, y0, x1, y1)) = pixel_bounds(card, width, height) else {
            tracing::debug!("Card {:?} lies outside the image, not drawn", card.text);
            continue;
        };
        let color = color_for(card);

        for inset in 0..LINE_WIDTH as i64 {
            let (left, top) = (x0 + inset, y0 + inset);
            let (right, bottom) = (x1 - inset, y1 - inset);
            if right < left || bottom < top {
                break;
            }
            let rect = Rect::at(left as i32, top as i32)
                .of_size((right - left + 1) as u32, (bottom - top + 1) as u32);
            draw_hollow_rect_mut(&mut canvas, rect, color);
        }
    }

    canvas
}

/// Render and encode as PNG
pub fn render_png(image: &DynamicImage, cards: &[ResolvedCard]) -> Result<Vec<u8>, ScanError> {
    let annotated = render(image, cards);
    let mut buffer = Cursor::new(Vec::new());
    annotated
        .write_to(&mut buffer, ImageFormat::Png)
        .map_err(|e| ScanError::ImageEncode(format!("Failed to encode PNG: {}", e)))?;
    Ok(buffer.into_inner())
}
