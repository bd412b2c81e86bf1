use deskpilot_core::{EXECUTE_PATH, ExecuteRequest, ExecuteResponse, SCREENSHOT_PATH};
use deskpilot_input::{Action, ActionError};
use reqwest::{StatusCode, header};
use serde_json::Value;

use crate::{ClientConfig, ClientError};

const PNG_MAGIC: &[u8] = b"\x89PNG\r\n\x1a\n";
const JPEG_MAGIC: &[u8] = b"\xff\xd8\xff";
const IMAGE_CONTENT_TYPES: [&str; 3] = ["image/png", "image/jpeg", "image/jpg"];

/// Drives a remote desktop through its execute and screenshot endpoints.
///
/// Transport failures never surface as errors: after the retry budget is
/// spent the operations return `None`.
pub struct Controller {
    http: reqwest::Client,
    config: ClientConfig,
    base_url: String,
}

enum Attempt<T> {
    Done(T),
    Retry,
    Abort,
}

impl Controller {
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .connect_timeout(config.retry.connect_timeout())
            .build()?;
        let base_url = config.base_url();

        Ok(Self {
            http,
            config,
            base_url,
        })
    }

    /// Fetches the current screen, with the cursor drawn in.
    pub async fn fetch_screenshot(&self) -> Option<Vec<u8>> {
        let url = format!("{}{SCREENSHOT_PATH}", self.base_url);
        let screenshot = self
            .retry("get screenshot", || self.try_fetch_screenshot(&url))
            .await;

        if screenshot.is_some() {
            tracing::info!("got screenshot successfully");
        } else {
            tracing::error!("failed to get screenshot");
        }
        screenshot
    }

    async fn try_fetch_screenshot(&self, url: &str) -> Attempt<Vec<u8>> {
        let response = match self
            .http
            .get(url)
            .timeout(self.config.retry.screenshot_timeout)
            .send()
            .await
        {
            Ok(response) => response,
            Err(error) => {
                tracing::error!("an error occurred while trying to get the screenshot: {error}");
                return Attempt::Retry;
            }
        };

        if response.status() != StatusCode::OK {
            tracing::error!(
                "failed to get screenshot, status code: {}",
                response.status().as_u16()
            );
            return Attempt::Retry;
        }

        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or("")
            .to_string();

        match response.bytes().await {
            Ok(body) if is_valid_image(&content_type, &body) => Attempt::Done(body.to_vec()),
            Ok(_) => {
                tracing::error!("invalid screenshot payload");
                Attempt::Retry
            }
            Err(error) => {
                tracing::error!("failed to read screenshot body: {error}");
                Attempt::Retry
            }
        }
    }

    /// Runs one automation expression on the remote interpreter.
    pub async fn run_command(&self, command: &str) -> Option<ExecuteResponse> {
        let url = format!("{}{EXECUTE_PATH}", self.base_url);
        let request = ExecuteRequest::argv(["python", "-c", &self.config.template.render(command)]);

        let result = self
            .retry("execute command", || self.try_run_command(&url, &request))
            .await;

        if result.is_none() {
            tracing::error!("failed to execute command");
        }
        result
    }

    async fn try_run_command(
        &self,
        url: &str,
        request: &ExecuteRequest,
    ) -> Attempt<ExecuteResponse> {
        let sent = self
            .http
            .post(url)
            .json(request)
            .timeout(self.config.retry.execute_timeout)
            .send()
            .await;

        let response = match sent {
            Ok(response) => response,
            Err(error) if is_read_timeout(&error) => {
                tracing::warn!("command did not answer in time, not retrying: {error}");
                return Attempt::Abort;
            }
            Err(error) => {
                tracing::error!("an error occurred while trying to execute the command: {error}");
                return Attempt::Retry;
            }
        };

        if response.status() != StatusCode::OK {
            tracing::error!(
                "failed to execute command, status code: {}",
                response.status().as_u16()
            );
            return Attempt::Retry;
        }

        match response.json::<ExecuteResponse>().await {
            Ok(result) => {
                tracing::info!("command executed successfully: {result:?}");
                Attempt::Done(result)
            }
            Err(error) if is_read_timeout(&error) => {
                tracing::warn!("command did not answer in time, not retrying: {error}");
                Attempt::Abort
            }
            // the command ran, sending it again would repeat its side effects
            Err(error) => {
                tracing::error!("invalid execute response, not retrying: {error}");
                Attempt::Abort
            }
        }
    }

    /// Translates the action and runs each resulting expression in order.
    /// Sentinel actions run nothing.
    pub async fn execute_action(&self, action: &Action) -> Vec<Option<ExecuteResponse>> {
        tracing::info!("executing {} action", action.action_type());

        let mut results = Vec::new();
        for command in action.translate() {
            results.push(self.run_command(&command).await);
        }
        results
    }

    /// Like [`Controller::execute_action`] for an action in its JSON form.
    /// Nothing is sent when the action is invalid.
    pub async fn execute_json(
        &self,
        action: Value,
    ) -> Result<Vec<Option<ExecuteResponse>>, ActionError> {
        let action = Action::from_value(action)?;
        Ok(self.execute_action(&action).await)
    }

    async fn retry<T, F, Fut>(&self, what: &str, mut attempt: F) -> Option<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Attempt<T>>,
    {
        let policy = self.config.retry;

        for n in 1..=policy.attempts {
            if n > 1 {
                tracing::info!("retrying to {what} ({n}/{})", policy.attempts);
                tokio::time::sleep(policy.interval).await;
            }

            match attempt().await {
                Attempt::Done(value) => return Some(value),
                Attempt::Retry => continue,
                Attempt::Abort => return None,
            }
        }

        None
    }
}

/// Accepts PNG or JPEG bytes, or any non-empty body declared as one.
fn is_valid_image(content_type: &str, data: &[u8]) -> bool {
    if data.is_empty() {
        return false;
    }

    data.starts_with(PNG_MAGIC)
        || data.starts_with(JPEG_MAGIC)
        || IMAGE_CONTENT_TYPES
            .iter()
            .any(|mime| content_type.contains(mime))
}

/// A timeout after the connection was made. Connect timeouts are reported
/// with `is_connect()` because the client sets its own connect deadline.
fn is_read_timeout(error: &reqwest::Error) -> bool {
    error.is_timeout() && !error.is_connect()
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{
            Arc,
            atomic::{AtomicUsize, Ordering},
        },
        time::{Duration, Instant},
    };

    use axum::{
        Json, Router,
        extract::State,
        http::StatusCode,
        response::IntoResponse,
        routing::{get, post},
    };
    use serde_json::json;
    use tokio::net::TcpListener;

    use super::*;
    use crate::RetryPolicy;

    const PNG_BYTES: &[u8] = b"\x89PNG\r\n\x1a\nrest-of-image";

    fn fast_retry() -> RetryPolicy {
        RetryPolicy {
            attempts: 3,
            interval: Duration::from_millis(50),
            screenshot_timeout: Duration::from_secs(2),
            execute_timeout: Duration::from_secs(2),
            connect_timeout: Duration::from_millis(100),
        }
    }

    async fn serve(app: Router) -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        port
    }

    fn controller(port: u16, retry: RetryPolicy) -> Controller {
        Controller::new(ClientConfig::new("127.0.0.1", port).with_retry(retry)).unwrap()
    }

    #[test]
    fn test_image_validation() {
        assert!(is_valid_image("", PNG_BYTES));
        assert!(is_valid_image("application/octet-stream", b"\xff\xd8\xff\xe0"));
        assert!(is_valid_image("image/png", b"stripped"));
        assert!(is_valid_image("image/jpg; charset=binary", b"stripped"));
        assert!(!is_valid_image("text/html", b"<html>"));
        assert!(!is_valid_image("image/png", b""));
    }

    #[tokio::test]
    async fn test_screenshot_success() {
        let app = Router::new().route(
            SCREENSHOT_PATH,
            get(|| async { ([(header::CONTENT_TYPE, "image/png")], PNG_BYTES) }),
        );
        let port = serve(app).await;

        let screenshot = controller(port, fast_retry()).fetch_screenshot().await;
        assert_eq!(screenshot.as_deref(), Some(PNG_BYTES));
    }

    #[tokio::test]
    async fn test_screenshot_retries_invalid_payload() {
        let hits = Arc::new(AtomicUsize::new(0));
        let app = Router::new()
            .route(
                SCREENSHOT_PATH,
                get(|State(hits): State<Arc<AtomicUsize>>| async move {
                    hits.fetch_add(1, Ordering::SeqCst);
                    ([(header::CONTENT_TYPE, "text/plain")], "not an image")
                }),
            )
            .with_state(hits.clone());
        let port = serve(app).await;

        let started = Instant::now();
        let screenshot = controller(port, fast_retry()).fetch_screenshot().await;

        assert!(screenshot.is_none());
        assert_eq!(hits.load(Ordering::SeqCst), 3);
        assert!(started.elapsed() >= Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_screenshot_gives_up_after_budget() {
        let hits = Arc::new(AtomicUsize::new(0));
        let app = Router::new()
            .route(
                SCREENSHOT_PATH,
                get(|State(hits): State<Arc<AtomicUsize>>| async move {
                    hits.fetch_add(1, Ordering::SeqCst);
                    StatusCode::INTERNAL_SERVER_ERROR
                }),
            )
            .with_state(hits.clone());
        let port = serve(app).await;

        let retry = RetryPolicy {
            interval: Duration::from_millis(300),
            ..fast_retry()
        };
        let started = Instant::now();
        let screenshot = controller(port, retry).fetch_screenshot().await;
        let elapsed = started.elapsed();

        assert!(screenshot.is_none());
        assert_eq!(hits.load(Ordering::SeqCst), 3);
        assert!(elapsed >= Duration::from_millis(600));
        assert!(elapsed < Duration::from_millis(900), "{elapsed:?}");
    }

    #[tokio::test]
    async fn test_screenshot_recovers_after_error() {
        let hits = Arc::new(AtomicUsize::new(0));
        let app = Router::new()
            .route(
                SCREENSHOT_PATH,
                get(|State(hits): State<Arc<AtomicUsize>>| async move {
                    if hits.fetch_add(1, Ordering::SeqCst) == 0 {
                        StatusCode::INTERNAL_SERVER_ERROR.into_response()
                    } else {
                        PNG_BYTES.into_response()
                    }
                }),
            )
            .with_state(hits.clone());
        let port = serve(app).await;

        let screenshot = controller(port, fast_retry()).fetch_screenshot().await;
        assert_eq!(screenshot.as_deref(), Some(PNG_BYTES));
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_unreachable_server_gives_up() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let controller = controller(port, fast_retry());
        assert!(controller.fetch_screenshot().await.is_none());
        assert!(controller.run_command("pyautogui.click()").await.is_none());
    }

    #[tokio::test]
    async fn test_run_command_sends_wrapped_argv() {
        let seen = Arc::new(std::sync::Mutex::new(None));
        let app = Router::new()
            .route(
                EXECUTE_PATH,
                post(
                    |State(seen): State<Arc<std::sync::Mutex<Option<Value>>>>,
                     Json(body): Json<Value>| async move {
                        *seen.lock().unwrap() = Some(body);
                        Json(json!({
                            "status": "success",
                            "output": "",
                            "error": "",
                            "returncode": 0
                        }))
                    },
                ),
            )
            .with_state(seen.clone());
        let port = serve(app).await;

        let result = controller(port, fast_retry())
            .run_command("pyautogui.press('enter')")
            .await;
        assert_eq!(
            result,
            Some(ExecuteResponse::Success {
                output: String::new(),
                error: String::new(),
                returncode: 0
            })
        );

        let body = seen.lock().unwrap().take().unwrap();
        assert_eq!(
            body,
            json!({
                "command": [
                    "python",
                    "-c",
                    "import pyautogui; import time; pyautogui.FAILSAFE = False; pyautogui.press('enter')"
                ],
                "shell": false
            })
        );
    }

    #[tokio::test]
    async fn test_run_command_retries_server_errors() {
        let hits = Arc::new(AtomicUsize::new(0));
        let app = Router::new()
            .route(
                EXECUTE_PATH,
                post(|State(hits): State<Arc<AtomicUsize>>| async move {
                    hits.fetch_add(1, Ordering::SeqCst);
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        Json(json!({"status": "error", "message": "boom"})),
                    )
                }),
            )
            .with_state(hits.clone());
        let port = serve(app).await;

        let result = controller(port, fast_retry()).run_command("1").await;
        assert!(result.is_none());
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_run_command_read_timeout_is_not_retried() {
        let hits = Arc::new(AtomicUsize::new(0));
        let app = Router::new()
            .route(
                EXECUTE_PATH,
                post(|State(hits): State<Arc<AtomicUsize>>| async move {
                    hits.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    StatusCode::OK
                }),
            )
            .with_state(hits.clone());
        let port = serve(app).await;

        let retry = RetryPolicy {
            execute_timeout: Duration::from_millis(200),
            ..fast_retry()
        };
        let result = controller(port, retry).run_command("time.sleep(5)").await;

        assert!(result.is_none());
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_run_command_undecodable_success_is_not_retried() {
        let hits = Arc::new(AtomicUsize::new(0));
        let app = Router::new()
            .route(
                EXECUTE_PATH,
                post(|State(hits): State<Arc<AtomicUsize>>| async move {
                    hits.fetch_add(1, Ordering::SeqCst);
                    Json(json!({
                        "status": "success",
                        "output": "",
                        "error": "",
                        "returncode": null
                    }))
                }),
            )
            .with_state(hits.clone());
        let port = serve(app).await;

        let result = controller(port, fast_retry())
            .run_command("pyautogui.click()")
            .await;
        assert!(result.is_none());
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[cfg(target_os = "linux")]
    /// Binds a listener with a backlog of zero and fills its accept queue,
    /// so further connection attempts hang without an answer.
    async fn saturated_listener() -> (TcpListener, Vec<tokio::net::TcpStream>) {
        let socket = tokio::net::TcpSocket::new_v4().unwrap();
        socket.bind("127.0.0.1:0".parse().unwrap()).unwrap();
        let listener = socket.listen(0).unwrap();
        let addr = listener.local_addr().unwrap();

        let mut held = Vec::new();
        for _ in 0..16 {
            let connect = tokio::net::TcpStream::connect(addr);
            match tokio::time::timeout(Duration::from_millis(200), connect).await {
                Ok(Ok(stream)) => held.push(stream),
                _ => break,
            }
        }

        (listener, held)
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_run_command_retries_hung_connect() {
        let (listener, _held) = saturated_listener().await;
        let port = listener.local_addr().unwrap().port();

        let retry = RetryPolicy {
            execute_timeout: Duration::from_secs(1),
            connect_timeout: Duration::from_millis(150),
            ..fast_retry()
        };
        let started = Instant::now();
        let result = controller(port, retry).run_command("pyautogui.click()").await;
        let elapsed = started.elapsed();

        assert!(result.is_none());
        // three connect deadlines and two waits, well short of one execute timeout
        assert!(elapsed >= Duration::from_millis(450), "{elapsed:?}");
        assert!(elapsed < Duration::from_millis(950), "{elapsed:?}");
    }

    #[tokio::test]
    async fn test_execute_action_runs_every_command() {
        let hits = Arc::new(AtomicUsize::new(0));
        let app = Router::new()
            .route(
                EXECUTE_PATH,
                post(|State(hits): State<Arc<AtomicUsize>>| async move {
                    hits.fetch_add(1, Ordering::SeqCst);
                    Json(json!({
                        "status": "success",
                        "output": "",
                        "error": "",
                        "returncode": 0
                    }))
                }),
            )
            .with_state(hits.clone());
        let port = serve(app).await;
        let controller = controller(port, fast_retry());

        let results = controller
            .execute_json(json!({"action_type": "SCROLL", "dx": 1, "dy": -2}))
            .await
            .unwrap();
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(Option::is_some));

        let results = controller.execute_json(json!("WAIT")).await.unwrap();
        assert!(results.is_empty());
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_invalid_action_sends_nothing() {
        let hits = Arc::new(AtomicUsize::new(0));
        let app = Router::new()
            .route(
                EXECUTE_PATH,
                post(|State(hits): State<Arc<AtomicUsize>>| async move {
                    hits.fetch_add(1, Ordering::SeqCst);
                    StatusCode::OK
                }),
            )
            .with_state(hits.clone());
        let port = serve(app).await;

        let result = controller(port, fast_retry())
            .execute_json(json!({"action_type": "PRESS", "key": "not-a-key"}))
            .await;
        assert!(matches!(result, Err(ActionError::InvalidKey(_))));
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }
}
