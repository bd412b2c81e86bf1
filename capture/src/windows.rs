use std::fmt::Display;

use image::RgbaImage;
use windows::Win32::{
    Graphics::Gdi::{
        BI_RGB, BITMAPINFO, BITMAPINFOHEADER, BitBlt, CAPTUREBLT, CreateCompatibleBitmap,
        CreateCompatibleDC, DIB_RGB_COLORS, DeleteDC, DeleteObject, GetDC, GetDIBits, HBITMAP,
        HDC, ROP_CODE, ReleaseDC, SRCCOPY, SelectObject,
    },
    UI::{
        Shell::{DEVICE_PRIMARY, GetScaleFactorForDevice},
        WindowsAndMessaging::{
            CURSORINFO, DrawIcon, GetCursorInfo, GetIconInfo, GetSystemMetrics, HICON, ICONINFO,
            SM_CXCURSOR, SM_CXSCREEN, SM_CYCURSOR, SM_CYSCREEN,
        },
    },
};

use crate::{
    CaptureError, CursorCompositor, ScreenCapturer,
    pixels::{CURSOR_COLOR_KEY, bgrx_to_rgba, color_key_to_alpha, cursor_origin, paste_cursor},
};

/// Grabs the primary screen, layered windows included, through GDI.
pub struct GdiCapturer;

impl ScreenCapturer for GdiCapturer {
    fn capture(&self) -> Result<RgbaImage, CaptureError> {
        // metrics are logical pixels for a DPI-unaware process, the grab is physical
        let scale = display_scale();
        let (width, height) = unsafe {
            (
                (f64::from(GetSystemMetrics(SM_CXSCREEN)) * scale).round() as i32,
                (f64::from(GetSystemMetrics(SM_CYSCREEN)) * scale).round() as i32,
            )
        };

        let data = unsafe { copy_from_screen(width, height) }.map_err(grab_error)?;
        bgrx_to_rgba(&data, width as u32, height as u32)
            .ok_or_else(|| CaptureError::Grab("short screen bitmap".into()))
    }
}

/// Renders the current cursor with `DrawIcon` and pastes it at its hotspot.
pub struct GdiCursor;

impl CursorCompositor for GdiCursor {
    fn composite(&self, screen: &mut RgbaImage) -> Result<(), CaptureError> {
        let mut info = CURSORINFO {
            cbSize: size_of::<CURSORINFO>() as u32,
            ..Default::default()
        };
        unsafe { GetCursorInfo(&mut info) }.map_err(cursor_error)?;
        let icon = HICON(info.hCursor.0);

        let mut icon_info = ICONINFO::default();
        unsafe { GetIconInfo(icon, &mut icon_info) }.map_err(cursor_error)?;
        // GetIconInfo hands us copies of the cursor bitmaps
        unsafe {
            free_bitmap(icon_info.hbmMask);
            free_bitmap(icon_info.hbmColor);
        }

        let (width, height) = unsafe { (GetSystemMetrics(SM_CXCURSOR), GetSystemMetrics(SM_CYCURSOR)) };
        let data = unsafe { draw_cursor(icon, width, height) }.map_err(cursor_error)?;

        let mut cursor = bgrx_to_rgba(&data, width as u32, height as u32)
            .ok_or_else(|| CaptureError::Cursor("short cursor bitmap".into()))?;
        color_key_to_alpha(&mut cursor, CURSOR_COLOR_KEY);

        let origin = cursor_origin(
            (info.ptScreenPos.x, info.ptScreenPos.y),
            display_scale(),
            (icon_info.xHotspot, icon_info.yHotspot),
        );
        paste_cursor(screen, &cursor, origin);
        Ok(())
    }
}

fn display_scale() -> f64 {
    let factor = unsafe { GetScaleFactorForDevice(DEVICE_PRIMARY) };
    f64::from(factor.0) / 100.0
}

unsafe fn copy_from_screen(width: i32, height: i32) -> windows::core::Result<Vec<u8>> {
    unsafe {
        let screen = GetDC(None);
        let memory = CreateCompatibleDC(Some(screen));
        let bitmap = CreateCompatibleBitmap(screen, width, height);

        let previous = SelectObject(memory, bitmap.into());
        let copied = BitBlt(
            memory,
            0,
            0,
            width,
            height,
            Some(screen),
            0,
            0,
            ROP_CODE(SRCCOPY.0 | CAPTUREBLT.0),
        );
        SelectObject(memory, previous);

        let data = copied.and_then(|()| read_bitmap(memory, bitmap, width, height));

        free_bitmap(bitmap);
        let _ = DeleteDC(memory);
        ReleaseDC(None, screen);
        data
    }
}

unsafe fn draw_cursor(icon: HICON, width: i32, height: i32) -> windows::core::Result<Vec<u8>> {
    unsafe {
        let screen = GetDC(None);
        let memory = CreateCompatibleDC(Some(screen));
        let bitmap = CreateCompatibleBitmap(screen, width, height);

        let previous = SelectObject(memory, bitmap.into());
        let drawn = DrawIcon(memory, 0, 0, icon);
        SelectObject(memory, previous);

        let data = drawn.and_then(|()| read_bitmap(memory, bitmap, width, height));

        free_bitmap(bitmap);
        let _ = DeleteDC(memory);
        ReleaseDC(None, screen);
        data
    }
}

/// Copies a bitmap out as top-down 32-bit BGRX rows. The bitmap must not be
/// selected into a DC.
unsafe fn read_bitmap(
    dc: HDC,
    bitmap: HBITMAP,
    width: i32,
    height: i32,
) -> windows::core::Result<Vec<u8>> {
    let mut info = BITMAPINFO {
        bmiHeader: BITMAPINFOHEADER {
            biSize: size_of::<BITMAPINFOHEADER>() as u32,
            biWidth: width,
            biHeight: -height,
            biPlanes: 1,
            biBitCount: 32,
            biCompression: BI_RGB.0,
            ..Default::default()
        },
        ..Default::default()
    };

    let mut data = vec![0u8; width as usize * height as usize * 4];
    let lines = unsafe {
        GetDIBits(
            dc,
            bitmap,
            0,
            height as u32,
            Some(data.as_mut_ptr().cast()),
            &mut info,
            DIB_RGB_COLORS,
        )
    };

    if lines == 0 {
        return Err(windows::core::Error::from_win32());
    }
    Ok(data)
}

unsafe fn free_bitmap(bitmap: HBITMAP) {
    if !bitmap.is_invalid() {
        let _ = unsafe { DeleteObject(bitmap.into()) };
    }
}

fn grab_error(error: impl Display) -> CaptureError {
    CaptureError::Grab(error.to_string())
}

fn cursor_error(error: impl Display) -> CaptureError {
    CaptureError::Cursor(error.to_string())
}
