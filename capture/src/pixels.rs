//! Pixel format conversions and cursor placement shared by the capture
//! backends.

use image::{Rgba, RgbaImage, imageops};

/// The colour GDI leaves behind in the untouched parts of a cursor bitmap.
pub const CURSOR_COLOR_KEY: Rgba<u8> = Rgba([0, 0, 0, 255]);

/// Converts 32-bit BGRX rows (X11 ZPixmap, GDI DIB) into an opaque RGBA image.
pub fn bgrx_to_rgba(data: &[u8], width: u32, height: u32) -> Option<RgbaImage> {
    let len = width as usize * height as usize * 4;
    let data = data.get(..len)?;

    let rgba = data
        .chunks_exact(4)
        .flat_map(|bgrx| [bgrx[2], bgrx[1], bgrx[0], 255])
        .collect();

    RgbaImage::from_raw(width, height, rgba)
}

/// Converts premultiplied ARGB words (XFixes cursor images) into straight RGBA.
pub fn argb_to_rgba(pixels: &[u32], width: u32, height: u32) -> Option<RgbaImage> {
    let rgba = pixels
        .iter()
        .flat_map(|&argb| {
            let alpha = (argb >> 24) as u8;
            let channel = |shift: u32| unpremultiply(((argb >> shift) & 0xff) as u8, alpha);
            [channel(16), channel(8), channel(0), alpha]
        })
        .collect();

    RgbaImage::from_raw(width, height, rgba)
}

fn unpremultiply(value: u8, alpha: u8) -> u8 {
    match alpha {
        0 => 0,
        255 => value,
        alpha => {
            let alpha = u32::from(alpha);
            ((u32::from(value) * 255 + alpha / 2) / alpha).min(255) as u8
        }
    }
}

/// Makes every pixel equal to `key` fully transparent.
pub fn color_key_to_alpha(image: &mut RgbaImage, key: Rgba<u8>) {
    for pixel in image.pixels_mut() {
        if *pixel == key {
            *pixel = Rgba([0, 0, 0, 0]);
        }
    }
}

/// Where the top-left corner of the cursor image goes on the screen grab.
///
/// `position` is in logical pixels and `scale` maps it to the grab's pixels;
/// the hotspot is already in grab pixels.
pub fn cursor_origin(position: (i32, i32), scale: f64, hotspot: (u32, u32)) -> (i64, i64) {
    let place = |pos: i32, hot: u32| (f64::from(pos) * scale - f64::from(hot)).round() as i64;
    (place(position.0, hotspot.0), place(position.1, hotspot.1))
}

/// Alpha-blends `cursor` onto `screen`, clipping at the screen edges.
pub fn paste_cursor(screen: &mut RgbaImage, cursor: &RgbaImage, origin: (i64, i64)) {
    imageops::overlay(screen, cursor, origin.0, origin.1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bgrx_to_rgba() {
        let data = [1, 2, 3, 0, 10, 20, 30, 99];
        let image = bgrx_to_rgba(&data, 2, 1).unwrap();
        assert_eq!(image.get_pixel(0, 0), &Rgba([3, 2, 1, 255]));
        assert_eq!(image.get_pixel(1, 0), &Rgba([30, 20, 10, 255]));

        assert!(bgrx_to_rgba(&data, 2, 2).is_none());
    }

    #[test]
    fn test_argb_to_rgba_unpremultiplies() {
        let pixels = [0xff_10_20_30, 0x80_40_20_00, 0x00_00_00_00];
        let image = argb_to_rgba(&pixels, 3, 1).unwrap();
        assert_eq!(image.get_pixel(0, 0), &Rgba([0x10, 0x20, 0x30, 0xff]));
        assert_eq!(image.get_pixel(1, 0), &Rgba([0x80, 0x40, 0x00, 0x80]));
        assert_eq!(image.get_pixel(2, 0), &Rgba([0, 0, 0, 0]));
    }

    #[test]
    fn test_color_key_to_alpha() {
        let mut image = RgbaImage::from_pixel(2, 2, CURSOR_COLOR_KEY);
        image.put_pixel(1, 1, Rgba([255, 255, 255, 255]));

        color_key_to_alpha(&mut image, CURSOR_COLOR_KEY);

        assert_eq!(image.get_pixel(0, 0), &Rgba([0, 0, 0, 0]));
        assert_eq!(image.get_pixel(1, 1), &Rgba([255, 255, 255, 255]));
    }

    #[test]
    fn test_cursor_origin() {
        assert_eq!(cursor_origin((100, 50), 1.0, (0, 0)), (100, 50));
        assert_eq!(cursor_origin((100, 50), 1.5, (4, 2)), (146, 73));
        assert_eq!(cursor_origin((1, 1), 1.25, (3, 3)), (-2, -2));
    }

    #[test]
    fn test_paste_cursor_blends_and_clips() {
        let mut screen = RgbaImage::from_pixel(4, 4, Rgba([0, 0, 255, 255]));
        let mut cursor = RgbaImage::from_pixel(2, 2, Rgba([255, 0, 0, 255]));
        cursor.put_pixel(0, 0, Rgba([0, 0, 0, 0]));

        paste_cursor(&mut screen, &cursor, (3, 3));
        assert_eq!(screen.get_pixel(3, 3), &Rgba([0, 0, 255, 255]));

        paste_cursor(&mut screen, &cursor, (-1, -1));
        assert_eq!(screen.get_pixel(0, 0), &Rgba([255, 0, 0, 255]));
        assert_eq!(screen.get_pixel(1, 1), &Rgba([0, 0, 255, 255]));
    }
}
