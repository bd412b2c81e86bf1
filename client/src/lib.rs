use thiserror::Error;

mod config;
mod controller;

pub use config::{ClientConfig, CommandTemplate, DEFAULT_TEMPLATE, RetryPolicy};
pub use controller::Controller;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("command template must contain exactly one {{command}} placeholder: {0:?}")]
    InvalidTemplate(String),
    #[error("failed to create http client: {0}")]
    Http(#[from] reqwest::Error),
}
