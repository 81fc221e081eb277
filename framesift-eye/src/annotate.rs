//! Box and label rendering for annotated result frames

use framesift_core::Detection;
use image::{Rgb, RgbImage};

const BOX_THICKNESS: u32 = 2;

const GLYPH_WIDTH: i64 = 5;
const GLYPH_HEIGHT: i64 = 7;
const GLYPH_ADVANCE: i64 = GLYPH_WIDTH + 1;
const LABEL_PADDING: i64 = 1;
const LABEL_HEIGHT: i64 = GLYPH_HEIGHT + 2 * LABEL_PADDING;
const TEXT_COLOR: Rgb<u8> = Rgb([0, 0, 0]);

const PALETTE: [[u8; 3]; 8] = [
    [255, 56, 56],
    [255, 157, 151],
    [255, 112, 31],
    [255, 178, 29],
    [207, 210, 49],
    [72, 249, 10],
    [26, 147, 52],
    [0, 194, 255],
];

/// Stable color for a class id.
pub fn class_color(class_id: usize) -> Rgb<u8> {
    Rgb(PALETTE[class_id % PALETTE.len()])
}

/// Caption drawn above a box, e.g. `person 0.87`.
pub fn label_text(detection: &Detection) -> String {
    format!("{} {:.2}", detection.label, detection.confidence)
}

/// Draw every detection onto `image` as a rectangle outline with a filled
/// caption above it. Captions that would leave the frame are pulled back inside.
pub fn draw_detections(image: &mut RgbImage, detections: &[Detection]) {
    for detection in detections {
        let [x1, y1, x2, y2] = detection.bbox.xyxy();
        if !(x1.is_finite() && y1.is_finite() && x2.is_finite() && y2.is_finite()) {
            continue;
        }
        let (left, top) = (x1.round() as i64, y1.round() as i64);
        let color = class_color(detection.class_id);
        draw_rect(image, left, top, x2.round() as i64, y2.round() as i64, color);
        draw_caption(image, left, top, &label_text(detection), color);
    }
}

fn draw_caption(image: &mut RgbImage, left: i64, top: i64, text: &str, background: Rgb<u8>) {
    let (width, height) = (image.width() as i64, image.height() as i64);
    let text_width = text.chars().count() as i64 * GLYPH_ADVANCE;
    let caption_width = text_width + 2 * LABEL_PADDING;

    let x = left.min(width - caption_width).max(0);
    let y = (top - LABEL_HEIGHT).min(height - LABEL_HEIGHT).max(0);

    fill_rect(image, x, y, x + caption_width - 1, y + LABEL_HEIGHT - 1, background);
    draw_text(image, x + LABEL_PADDING, y + LABEL_PADDING, text, TEXT_COLOR);
}

fn draw_rect(image: &mut RgbImage, left: i64, top: i64, right: i64, bottom: i64, color: Rgb<u8>) {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return;
    }
    let max_x = width as i64 - 1;
    let max_y = height as i64 - 1;

    for t in 0..BOX_THICKNESS as i64 {
        let l = (left + t).clamp(0, max_x);
        let r = (right - t).clamp(0, max_x);
        let top_y = (top + t).clamp(0, max_y);
        let bottom_y = (bottom - t).clamp(0, max_y);
        if l > r || top_y > bottom_y {
            break;
        }

        for x in l..=r {
            image.put_pixel(x as u32, top_y as u32, color);
            image.put_pixel(x as u32, bottom_y as u32, color);
        }
        for y in top_y..=bottom_y {
            image.put_pixel(l as u32, y as u32, color);
            image.put_pixel(r as u32, y as u32, color);
        }
    }
}

fn fill_rect(image: &mut RgbImage, left: i64, top: i64, right: i64, bottom: i64, color: Rgb<u8>) {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return;
    }
    let left = left.clamp(0, width as i64 - 1);
    let right = right.clamp(0, width as i64 - 1);
    let top = top.clamp(0, height as i64 - 1);
    let bottom = bottom.clamp(0, height as i64 - 1);

    for y in top..=bottom {
        for x in left..=right {
            image.put_pixel(x as u32, y as u32, color);
        }
    }
}

/// 5x7 bitmap text. Letters render uppercase; characters without a glyph
/// still advance the cursor.
fn draw_text(image: &mut RgbImage, mut x: i64, y: i64, text: &str, color: Rgb<u8>) {
    let (width, height) = (image.width() as i64, image.height() as i64);
    for ch in text.chars().flat_map(char::to_uppercase) {
        if let Some(glyph) = glyph_bits(ch) {
            for (row, pattern) in glyph.iter().enumerate() {
                let py = y + row as i64;
                if py < 0 || py >= height {
                    continue;
                }
                for col in 0..GLYPH_WIDTH {
                    let px = x + col;
                    if (pattern >> (GLYPH_WIDTH - 1 - col)) & 1 == 1 && px >= 0 && px < width {
                        image.put_pixel(px as u32, py as u32, color);
                    }
                }
            }
        }
        x += GLYPH_ADVANCE;
    }
}

fn glyph_bits(ch: char) -> Option<[u8; 7]> {
    let bits = match ch {
        'A' => [0b01110, 0b10001, 0b10001, 0b11111, 0b10001, 0b10001, 0b10001],
        'B' => [0b11110, 0b10001, 0b10001, 0b11110, 0b10001, 0b10001, 0b11110],
        'C' => [0b01110, 0b10001, 0b10000, 0b10000, 0b10000, 0b10001, 0b01110],
        'D' => [0b11110, 0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b11110],
        'E' => [0b11111, 0b10000, 0b11110, 0b10000, 0b10000, 0b10000, 0b11111],
        'F' => [0b11111, 0b10000, 0b11110, 0b10000, 0b10000, 0b10000, 0b10000],
        'G' => [0b01110, 0b10001, 0b10000, 0b10111, 0b10001, 0b10001, 0b01111],
        'H' => [0b10001, 0b10001, 0b10001, 0b11111, 0b10001, 0b10001, 0b10001],
        'I' => [0b01110, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100, 0b01110],
        'J' => [0b00111, 0b00010, 0b00010, 0b00010, 0b00010, 0b10010, 0b01100],
        'K' => [0b10001, 0b10010, 0b10100, 0b11000, 0b10100, 0b10010, 0b10001],
        'L' => [0b10000, 0b10000, 0b10000, 0b10000, 0b10000, 0b10000, 0b11111],
        'M' => [0b10001, 0b11011, 0b10101, 0b10101, 0b10001, 0b10001, 0b10001],
        'N' => [0b10001, 0b11001, 0b10101, 0b10101, 0b10011, 0b10001, 0b10001],
        'O' => [0b01110, 0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b01110],
        'P' => [0b11110, 0b10001, 0b10001, 0b11110, 0b10000, 0b10000, 0b10000],
        'Q' => [0b01110, 0b10001, 0b10001, 0b10001, 0b10101, 0b10010, 0b01101],
        'R' => [0b11110, 0b10001, 0b10001, 0b11110, 0b10100, 0b10010, 0b10001],
        'S' => [0b01111, 0b10000, 0b01110, 0b00001, 0b00001, 0b10001, 0b01110],
        'T' => [0b11111, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100],
        'U' => [0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b01110],
        'V' => [0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b01010, 0b00100],
        'W' => [0b10001, 0b10001, 0b10001, 0b10101, 0b10101, 0b11011, 0b10001],
        'X' => [0b10001, 0b10001, 0b01010, 0b00100, 0b01010, 0b10001, 0b10001],
        'Y' => [0b10001, 0b10001, 0b01010, 0b00100, 0b00100, 0b00100, 0b00100],
        'Z' => [0b11111, 0b00001, 0b00010, 0b00100, 0b01000, 0b10000, 0b11111],
        '0' => [0b01110, 0b10001, 0b10011, 0b10101, 0b11001, 0b10001, 0b01110],
        '1' => [0b00100, 0b01100, 0b00100, 0b00100, 0b00100, 0b00100, 0b01110],
        '2' => [0b01110, 0b10001, 0b00001, 0b00010, 0b00100, 0b01000, 0b11111],
        '3' => [0b11110, 0b00001, 0b00001, 0b01110, 0b00001, 0b00001, 0b11110],
        '4' => [0b00010, 0b00110, 0b01010, 0b10010, 0b11111, 0b00010, 0b00010],
        '5' => [0b11111, 0b10000, 0b11110, 0b00001, 0b00001, 0b10001, 0b01110],
        '6' => [0b00110, 0b01000, 0b10000, 0b11110, 0b10001, 0b10001, 0b01110],
        '7' => [0b11111, 0b00001, 0b00010, 0b00100, 0b01000, 0b01000, 0b01000],
        '8' => [0b01110, 0b10001, 0b10001, 0b01110, 0b10001, 0b10001, 0b01110],
        '9' => [0b01110, 0b10001, 0b10001, 0b01111, 0b00001, 0b00010, 0b01100],
        '.' => [0, 0, 0, 0, 0, 0b00110, 0b00110],
        '-' => [0, 0, 0, 0b11111, 0, 0, 0],
        '_' => [0, 0, 0, 0, 0, 0, 0b11111],
        ' ' => [0; 7],
        _ => return None,
    };
    Some(bits)
}

#[cfg(test)]
mod tests {
    use super::*;
    use framesift_core::BoundingBox;

    const GRAY: Rgb<u8> = Rgb([128, 128, 128]);

    fn count_in_rows(image: &RgbImage, rows: std::ops::Range<u32>, color: Rgb<u8>) -> usize {
        rows.flat_map(|y| (0..image.width()).map(move |x| (x, y)))
            .filter(|&(x, y)| *image.get_pixel(x, y) == color)
            .count()
    }

    #[test]
    fn test_draws_outline_only() {
        let mut image = RgbImage::new(40, 40);
        let det = Detection::new(0, "person", 0.9, BoundingBox::from_xyxy(10.0, 20.0, 30.0, 34.0));
        draw_detections(&mut image, &[det]);

        let color = class_color(0);
        assert_eq!(*image.get_pixel(10, 20), color);
        assert_eq!(*image.get_pixel(11, 27), color);
        assert_eq!(*image.get_pixel(30, 28), color);
        assert_eq!(*image.get_pixel(20, 27), Rgb([0, 0, 0]));
    }

    #[test]
    fn test_label_drawn_above_box() {
        let mut image = RgbImage::from_pixel(120, 80, GRAY);
        let det = Detection::new(2, "car", 0.87, BoundingBox::from_xyxy(20.0, 40.0, 90.0, 70.0));
        draw_detections(&mut image, &[det.clone()]);

        assert_eq!(label_text(&det), "car 0.87");
        let caption_rows = (40 - LABEL_HEIGHT as u32)..40;
        assert!(count_in_rows(&image, caption_rows.clone(), class_color(2)) > 0);
        assert!(count_in_rows(&image, caption_rows, TEXT_COLOR) > 0);
        // Nothing drawn above the caption
        assert_eq!(count_in_rows(&image, 0..(40 - LABEL_HEIGHT as u32), GRAY), 120 * 31);
    }

    #[test]
    fn test_label_at_top_edge_stays_in_frame() {
        let mut image = RgbImage::from_pixel(40, 30, GRAY);
        let det = Detection::new(0, "person", 0.9, BoundingBox::from_xyxy(30.0, 0.0, 39.0, 20.0));
        draw_detections(&mut image, &[det]);

        // Caption pinned to the top rows and pulled left to start at the frame edge
        assert_eq!(*image.get_pixel(0, 0), class_color(0));
        assert!(count_in_rows(&image, 0..LABEL_HEIGHT as u32, TEXT_COLOR) > 0);
        assert_eq!(*image.get_pixel(0, LABEL_HEIGHT as u32), GRAY);
    }

    #[test]
    fn test_label_clamped_to_right_edge() {
        let mut image = RgbImage::from_pixel(100, 40, GRAY);
        let det = Detection::new(1, "dog", 0.5, BoundingBox::from_xyxy(95.0, 20.0, 99.0, 30.0));
        draw_detections(&mut image, &[det]);

        let caption_width = 8 * GLYPH_ADVANCE + 2 * LABEL_PADDING;
        let x = (100 - caption_width) as u32;
        assert_eq!(*image.get_pixel(x, 11), class_color(1));
        assert_eq!(*image.get_pixel(x - 1, 11), GRAY);
        assert_eq!(*image.get_pixel(99, 11), class_color(1));
    }

    #[test]
    fn test_box_outside_frame_is_clamped() {
        let mut image = RgbImage::new(10, 10);
        let det = Detection::new(3, "car", 0.9, BoundingBox::from_xyxy(-5.0, -5.0, 50.0, 50.0));
        draw_detections(&mut image, &[det]);
        assert_eq!(*image.get_pixel(0, 0), class_color(3));
        assert_eq!(*image.get_pixel(9, 9), class_color(3));
    }

    #[test]
    fn test_unknown_characters_still_advance() {
        assert!(glyph_bits('#').is_none());
        let mut image = RgbImage::from_pixel(20, 9, GRAY);
        draw_text(&mut image, 0, 0, "#1", TEXT_COLOR);
        // '1' starts one advance in; its stem sits in the glyph's middle column
        assert_eq!(*image.get_pixel(GLYPH_ADVANCE as u32 + 2, 3), TEXT_COLOR);
        assert_eq!(count_in_rows(&image, 0..7, TEXT_COLOR), 10);
    }

    #[test]
    fn test_colors_cycle_by_class() {
        assert_eq!(class_color(1), class_color(1 + PALETTE.len()));
        assert_ne!(class_color(0), class_color(1));
    }
}
