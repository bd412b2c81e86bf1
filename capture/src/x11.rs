use std::fmt::Display;

use image::RgbaImage;
use x11rb::{
    connection::Connection,
    protocol::{
        xfixes::ConnectionExt as _,
        xproto::{ConnectionExt as _, ImageFormat},
    },
    rust_connection::RustConnection,
};

use crate::{
    CaptureError, CursorCompositor, ScreenCapturer,
    pixels::{argb_to_rgba, bgrx_to_rgba, paste_cursor},
};

const ALL_PLANES: u32 = !0;

/// Grabs the X root window.
pub struct X11Capturer;

impl ScreenCapturer for X11Capturer {
    fn capture(&self) -> Result<RgbaImage, CaptureError> {
        let (conn, screen_num) = x11rb::connect(None).map_err(grab_error)?;
        let screen = conn
            .setup()
            .roots
            .get(screen_num)
            .ok_or_else(|| CaptureError::Grab(format!("no X screen {screen_num}")))?;

        let (width, height) = (screen.width_in_pixels, screen.height_in_pixels);
        let reply = conn
            .get_image(
                ImageFormat::Z_PIXMAP,
                screen.root,
                0,
                0,
                width,
                height,
                ALL_PLANES,
            )
            .map_err(grab_error)?
            .reply()
            .map_err(grab_error)?;

        bgrx_to_rgba(&reply.data, width.into(), height.into()).ok_or_else(|| {
            CaptureError::Grab(format!(
                "unexpected image data for depth {} ({} bytes)",
                reply.depth,
                reply.data.len()
            ))
        })
    }
}

/// Reads the live cursor through the XFixes extension and pastes it at the
/// pointer position.
pub struct XFixesCursor;

impl CursorCompositor for XFixesCursor {
    fn composite(&self, screen: &mut RgbaImage) -> Result<(), CaptureError> {
        let (conn, _) = x11rb::connect(None).map_err(cursor_error)?;
        query_xfixes(&conn)?;

        let cursor = conn
            .xfixes_get_cursor_image()
            .map_err(cursor_error)?
            .reply()
            .map_err(cursor_error)?;

        let image = argb_to_rgba(&cursor.cursor_image, cursor.width.into(), cursor.height.into())
            .ok_or_else(|| CaptureError::Cursor("truncated cursor image".into()))?;

        paste_cursor(screen, &image, (cursor.x.into(), cursor.y.into()));
        Ok(())
    }
}

fn query_xfixes(conn: &RustConnection) -> Result<(), CaptureError> {
    // the server ignores XFixes requests until the version is negotiated
    conn.xfixes_query_version(4, 0)
        .map_err(cursor_error)?
        .reply()
        .map_err(cursor_error)?;
    Ok(())
}

fn grab_error(error: impl Display) -> CaptureError {
    CaptureError::Grab(error.to_string())
}

fn cursor_error(error: impl Display) -> CaptureError {
    CaptureError::Cursor(error.to_string())
}
