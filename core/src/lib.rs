pub mod message;

pub use message::{CommandLine, ExecuteRequest, ExecuteResponse};

/// Route that runs a command on the controlled machine.
pub const EXECUTE_PATH: &str = "/execute";
/// Alias of [`EXECUTE_PATH`] used by environment setup scripts.
pub const SETUP_EXECUTE_PATH: &str = "/setup/execute";
/// Route that returns the current screen with the cursor drawn in.
pub const SCREENSHOT_PATH: &str = "/screenshot";
