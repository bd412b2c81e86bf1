use std::process::Command;

use image::RgbaImage;

use crate::{CaptureError, ScreenCapturer};

/// Delegates to the system `screencapture` tool, which can include the cursor.
pub struct ScreencaptureCli;

impl ScreenCapturer for ScreencaptureCli {
    fn capture(&self) -> Result<RgbaImage, CaptureError> {
        let file = tempfile::Builder::new()
            .prefix("deskpilot-")
            .suffix(".png")
            .tempfile()?;

        // -C includes the cursor, -x keeps it quiet
        let output = Command::new("screencapture")
            .args(["-C", "-x"])
            .arg(file.path())
            .output()?;

        if !output.status.success() {
            return Err(CaptureError::Grab(format!(
                "screencapture exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        Ok(image::open(file.path())?.into_rgba8())
    }
}
