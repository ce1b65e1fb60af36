//! Pixel-level drawing onto RGB24 frames.
//!
//! The recorded video carries a wall-clock stamp in the top-left corner and,
//! when a pose detector is attached, marker squares at each landmark. Both
//! are drawn directly into the frame buffer with a small built-in 5x7 font;
//! frames never leave plain `Vec<u8>` RGB.

const GLYPH_COLS: u32 = 5;
/// Horizontal advance per character (5 columns + 1 spacing), pre-scale.
const GLYPH_ADVANCE: u32 = GLYPH_COLS + 1;

/// Clock stamp position and scale, top-left corner of the frame.
const STAMP_X: u32 = 10;
const STAMP_Y: u32 = 30;
const STAMP_SCALE: u32 = 2;

const WHITE: [u8; 3] = [255, 255, 255];
const GREEN: [u8; 3] = [0, 220, 40];

/// 5x7 glyphs for the clock character set. Each byte is one row, bit 4 is the
/// leftmost column.
fn glyph(ch: char) -> Option<[u8; 7]> {
    Some(match ch {
        '0' => [0x0E, 0x11, 0x13, 0x15, 0x19, 0x11, 0x0E],
        '1' => [0x04, 0x0C, 0x04, 0x04, 0x04, 0x04, 0x0E],
        '2' => [0x0E, 0x11, 0x01, 0x02, 0x04, 0x08, 0x1F],
        '3' => [0x1F, 0x02, 0x04, 0x02, 0x01, 0x11, 0x0E],
        '4' => [0x02, 0x06, 0x0A, 0x12, 0x1F, 0x02, 0x02],
        '5' => [0x1F, 0x10, 0x1E, 0x01, 0x01, 0x11, 0x0E],
        '6' => [0x06, 0x08, 0x10, 0x1E, 0x11, 0x11, 0x0E],
        '7' => [0x1F, 0x01, 0x02, 0x04, 0x08, 0x08, 0x08],
        '8' => [0x0E, 0x11, 0x11, 0x0E, 0x11, 0x11, 0x0E],
        '9' => [0x0E, 0x11, 0x11, 0x0F, 0x01, 0x02, 0x0C],
        '-' => [0x00, 0x00, 0x00, 0x1F, 0x00, 0x00, 0x00],
        ':' => [0x00, 0x0C, 0x0C, 0x00, 0x0C, 0x0C, 0x00],
        '.' => [0x00, 0x00, 0x00, 0x00, 0x00, 0x0C, 0x0C],
        ' ' => [0x00; 7],
        _ => return None,
    })
}

fn fill_rect(frame: &mut [u8], width: u32, height: u32, x0: u32, y0: u32, w: u32, h: u32, rgb: [u8; 3]) {
    let x_end = x0.saturating_add(w).min(width);
    let y_end = y0.saturating_add(h).min(height);
    for y in y0.min(height)..y_end {
        for x in x0.min(width)..x_end {
            let idx = ((y * width + x) * 3) as usize;
            frame[idx] = rgb[0];
            frame[idx + 1] = rgb[1];
            frame[idx + 2] = rgb[2];
        }
    }
}

/// Draw `text` at (x, y) with the given scale and color. Characters without a
/// glyph still advance the cursor, so unsupported input degrades to gaps.
pub fn draw_text(
    frame: &mut [u8],
    width: u32,
    height: u32,
    x: u32,
    y: u32,
    text: &str,
    scale: u32,
    rgb: [u8; 3],
) {
    let mut cursor = x;
    for ch in text.chars() {
        if let Some(rows) = glyph(ch) {
            for (row, bits) in rows.iter().enumerate() {
                for col in 0..GLYPH_COLS {
                    if bits & (0x10 >> col) != 0 {
                        fill_rect(
                            frame,
                            width,
                            height,
                            cursor + col * scale,
                            y + row as u32 * scale,
                            scale,
                            scale,
                            rgb,
                        );
                    }
                }
            }
        }
        cursor = cursor.saturating_add(GLYPH_ADVANCE * scale);
    }
}

/// Stamp the wall-clock string into the top-left corner of a frame.
pub fn stamp_clock(frame: &mut [u8], width: u32, height: u32, text: &str) {
    draw_text(frame, width, height, STAMP_X, STAMP_Y, text, STAMP_SCALE, WHITE);
}

/// Draw one marker square per normalized (x, y) point. Points outside [0, 1)
/// are dropped.
pub fn draw_markers(frame: &mut [u8], width: u32, height: u32, points: &[(f64, f64)]) {
    const MARKER: u32 = 5;
    for &(nx, ny) in points {
        if !(0.0..1.0).contains(&nx) || !(0.0..1.0).contains(&ny) {
            continue;
        }
        let px = (nx * width as f64) as u32;
        let py = (ny * height as f64) as u32;
        fill_rect(
            frame,
            width,
            height,
            px.saturating_sub(MARKER / 2),
            py.saturating_sub(MARKER / 2),
            MARKER,
            MARKER,
            GREEN,
        );
    }
}
