use std::{fmt, str::FromStr};

use thiserror::Error;
use unicase::UniCase;

mod action;
mod keys;
mod quote;

pub use action::{Action, Click, Easing, Point, Scroll};
pub use keys::{KEYBOARD_KEYS, Key};
pub use quote::python_str;

/// Raised when an action cannot be turned into an automation command.
///
/// These errors happen before anything is sent to the controlled machine.
#[derive(Debug, Error)]
pub enum ActionError {
    #[error("unknown action type: {0}")]
    UnknownActionType(String),
    #[error("unknown parameters for {action_type}: {parameters}")]
    InvalidParameters {
        action_type: String,
        parameters: serde_json::Value,
    },
    #[error("key must be one of the recognized keyboard keys, got {0:?}")]
    InvalidKey(String),
    #[error("keys must all be recognized keyboard keys, got {0:?}")]
    InvalidHotkey(Vec<String>),
    #[error("invalid mouse button: {0}")]
    InvalidButton(String),
    #[error("malformed action: {0}")]
    Malformed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MouseButton {
    Left,
    Middle,
    Right,
    Primary,
    Secondary,
}

impl MouseButton {
    pub fn as_str(&self) -> &'static str {
        match self {
            MouseButton::Left => "left",
            MouseButton::Middle => "middle",
            MouseButton::Right => "right",
            MouseButton::Primary => "primary",
            MouseButton::Secondary => "secondary",
        }
    }
}

impl fmt::Display for MouseButton {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MouseButton {
    type Err = ActionError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        [
            MouseButton::Left,
            MouseButton::Middle,
            MouseButton::Right,
            MouseButton::Primary,
            MouseButton::Secondary,
        ]
        .into_iter()
        .find(|button| UniCase::new(button.as_str()) == UniCase::new(name))
        .ok_or_else(|| ActionError::InvalidButton(name.to_string()))
    }
}
