use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use deskpilot_core::{ExecuteRequest, ExecuteResponse};

use crate::AppState;

const CONTENT_TYPE_PNG: &str = "image/png";

pub async fn execute(
    State(state): State<AppState>,
    request: Result<Json<ExecuteRequest>, JsonRejection>,
) -> (StatusCode, Json<ExecuteResponse>) {
    let request = match request {
        Ok(Json(request)) => request,
        Err(rejection) => {
            tracing::warn!("rejected execute request: {}", rejection.body_text());
            return (
                rejection.status(),
                Json(ExecuteResponse::Error {
                    message: rejection.body_text(),
                }),
            );
        }
    };

    let response = state.executor().execute(request).await;
    let status = if response.is_success() {
        StatusCode::OK
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };

    (status, Json(response))
}

pub async fn screenshot(State(state): State<AppState>) -> Response {
    let capture = tokio::task::spawn_blocking(move || {
        let _guard = state.lock_screenshot();
        let path = state.screenshot_path();

        state.screenshotter().capture_to(path)?;
        std::fs::read(path).map_err(deskpilot_capture::CaptureError::from)
    })
    .await;

    match capture {
        Ok(Ok(png)) => ([(header::CONTENT_TYPE, CONTENT_TYPE_PNG)], png).into_response(),
        Ok(Err(error)) => {
            tracing::error!("failed to capture screenshot: {error}");
            error_response(error.to_string())
        }
        Err(error) => {
            tracing::error!("screenshot task failed: {error}");
            error_response(error.to_string())
        }
    }
}

fn error_response(message: String) -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ExecuteResponse::Error { message }),
    )
        .into_response()
}
