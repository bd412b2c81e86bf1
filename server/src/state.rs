use std::{
    path::{Path, PathBuf},
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use anyhow::Context;
use deskpilot_capture::Screenshotter;

use crate::{args::Args, executor::CommandExecutor};

const SCREENSHOT_FILE: &str = "screenshot.png";

/// Everything a request handler needs, shared by all requests.
#[derive(Clone)]
pub struct AppState(Arc<AppStateInner>);

impl AppState {
    pub fn new(
        executor: CommandExecutor,
        screenshotter: Screenshotter,
        screenshot_path: PathBuf,
    ) -> Self {
        Self(Arc::new(AppStateInner {
            executor,
            screenshotter,
            screenshot_path,
            screenshot_lock: Mutex::new(()),
        }))
    }

    pub fn from_args(args: &Args) -> anyhow::Result<Self> {
        let screenshot_path = match &args.screenshot_path {
            Some(path) => path.clone(),
            None => default_screenshot_path()?,
        };

        tracing::info!("screenshots are written to {}", screenshot_path.display());

        Ok(Self::new(
            CommandExecutor::new(Duration::from_secs(args.exec_timeout)),
            Screenshotter::for_host(),
            screenshot_path,
        ))
    }

    pub fn executor(&self) -> &CommandExecutor {
        &self.0.executor
    }

    pub fn screenshotter(&self) -> &Screenshotter {
        &self.0.screenshotter
    }

    pub fn screenshot_path(&self) -> &Path {
        &self.0.screenshot_path
    }

    /// Serializes writers of the screenshot file.
    pub fn lock_screenshot(&self) -> MutexGuard<'_, ()> {
        self.0
            .screenshot_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

struct AppStateInner {
    executor: CommandExecutor,
    screenshotter: Screenshotter,
    screenshot_path: PathBuf,
    screenshot_lock: Mutex<()>,
}

fn default_screenshot_path() -> anyhow::Result<PathBuf> {
    let cache_dir = dirs::cache_dir().context("missing cache directory")?;
    Ok(cache_dir.join("deskpilot").join(SCREENSHOT_FILE))
}
