use std::{fmt, str::FromStr, time::Duration};

use crate::ClientError;

const PLACEHOLDER: &str = "{command}";

/// Prefix wrapped around every automation expression before it is run by
/// the remote interpreter.
pub const DEFAULT_TEMPLATE: &str =
    "import pyautogui; import time; pyautogui.FAILSAFE = False; {command}";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandTemplate(String);

impl CommandTemplate {
    pub fn new(template: impl Into<String>) -> Result<Self, ClientError> {
        let template = template.into();
        if template.matches(PLACEHOLDER).count() != 1 {
            return Err(ClientError::InvalidTemplate(template));
        }
        Ok(Self(template))
    }

    pub fn render(&self, command: &str) -> String {
        self.0.replacen(PLACEHOLDER, command, 1)
    }
}

impl Default for CommandTemplate {
    fn default() -> Self {
        Self(DEFAULT_TEMPLATE.to_string())
    }
}

impl FromStr for CommandTemplate {
    type Err = ClientError;

    fn from_str(template: &str) -> Result<Self, Self::Err> {
        Self::new(template)
    }
}

impl fmt::Display for CommandTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total number of tries, including the first one.
    pub attempts: u32,
    /// Pause between two consecutive tries.
    pub interval: Duration,
    pub screenshot_timeout: Duration,
    pub execute_timeout: Duration,
    /// Deadline for establishing the connection, part of both timeouts above.
    pub connect_timeout: Duration,
}

impl RetryPolicy {
    /// The connect deadline actually used, kept below the request timeouts
    /// so a hung connect is never mistaken for a slow command.
    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
            .min(self.execute_timeout / 2)
            .min(self.screenshot_timeout / 2)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            interval: Duration::from_secs(5),
            screenshot_timeout: Duration::from_secs(10),
            execute_timeout: Duration::from_secs(90),
            connect_timeout: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub host: String,
    pub port: u16,
    pub template: CommandTemplate,
    pub retry: RetryPolicy,
}

impl ClientConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            template: CommandTemplate::default(),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_template(mut self, template: CommandTemplate) -> Self {
        self.template = template;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn base_url(&self) -> String {
        if self.host.contains(':') && !self.host.starts_with('[') {
            format!("http://[{}]:{}", self.host, self.port)
        } else {
            format!("http://{}:{}", self.host, self.port)
        }
    }
}
