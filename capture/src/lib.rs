use std::path::Path;

use image::{ImageFormat, RgbaImage};
use thiserror::Error;

pub mod pixels;

#[cfg(target_os = "macos")]
mod macos;
#[cfg(target_os = "windows")]
mod windows;
#[cfg(all(unix, not(target_os = "macos")))]
mod x11;

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("screen capture is not supported on this platform")]
    Unsupported,
    #[error("failed to grab screen: {0}")]
    Grab(String),
    #[error("failed to read cursor: {0}")]
    Cursor(String),
    #[error("failed to encode screenshot: {0}")]
    Encode(#[from] image::ImageError),
    #[error("failed to write screenshot: {0}")]
    Io(#[from] std::io::Error),
}

/// Grabs the full screen.
pub trait ScreenCapturer: Send + Sync {
    fn capture(&self) -> Result<RgbaImage, CaptureError>;
}

/// Draws the live mouse cursor onto a screen grab.
pub trait CursorCompositor: Send + Sync {
    fn composite(&self, screen: &mut RgbaImage) -> Result<(), CaptureError>;
}

/// Fallback for hosts without any capture backend.
pub struct Unsupported;

impl ScreenCapturer for Unsupported {
    fn capture(&self) -> Result<RgbaImage, CaptureError> {
        Err(CaptureError::Unsupported)
    }
}

pub struct Screenshotter {
    capturer: Box<dyn ScreenCapturer>,
    compositor: Option<Box<dyn CursorCompositor>>,
}

impl Screenshotter {
    pub fn new(capturer: Box<dyn ScreenCapturer>) -> Self {
        Self {
            capturer,
            compositor: None,
        }
    }

    pub fn with_compositor(mut self, compositor: Box<dyn CursorCompositor>) -> Self {
        self.compositor = Some(compositor);
        self
    }

    /// Picks the capture backend for the operating system we were built for.
    pub fn for_host() -> Self {
        host_screenshotter()
    }

    /// Grabs the screen and draws the cursor on it.
    ///
    /// Cursor failures are logged and the bare grab is returned instead.
    pub fn capture(&self) -> Result<RgbaImage, CaptureError> {
        let mut screen = self.capturer.capture()?;

        if let Some(compositor) = &self.compositor
            && let Err(error) = compositor.composite(&mut screen)
        {
            tracing::warn!("failed to draw cursor, screenshot will not have a cursor: {error}");
        }

        Ok(screen)
    }

    /// Captures a screenshot and writes it to `path` as PNG, replacing any
    /// previous file.
    pub fn capture_to(&self, path: &Path) -> Result<(), CaptureError> {
        let screen = self.capture()?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        screen.save_with_format(path, ImageFormat::Png)?;
        Ok(())
    }
}

#[cfg(target_os = "windows")]
fn host_screenshotter() -> Screenshotter {
    Screenshotter::new(Box::new(windows::GdiCapturer))
        .with_compositor(Box::new(windows::GdiCursor))
}

#[cfg(target_os = "linux")]
fn host_screenshotter() -> Screenshotter {
    Screenshotter::new(Box::new(x11::X11Capturer)).with_compositor(Box::new(x11::XFixesCursor))
}

#[cfg(target_os = "macos")]
fn host_screenshotter() -> Screenshotter {
    // screencapture draws the cursor itself
    Screenshotter::new(Box::new(macos::ScreencaptureCli))
}

#[cfg(all(unix, not(any(target_os = "linux", target_os = "macos"))))]
fn host_screenshotter() -> Screenshotter {
    tracing::warn!(
        "cursor capture is not supported on {}, screenshots will not have a cursor",
        std::env::consts::OS
    );
    Screenshotter::new(Box::new(x11::X11Capturer))
}

#[cfg(not(any(unix, target_os = "windows")))]
fn host_screenshotter() -> Screenshotter {
    tracing::warn!(
        "the platform you're using ({}) is not currently supported",
        std::env::consts::OS
    );
    Screenshotter::new(Box::new(Unsupported))
}
