//! Administrative web surface: axum HTTP for the operator.
//!
//! - `GET /`: firmware upload form
//! - `POST /update`: multipart upload, streamed into the update gate
//! - `GET /api/status`: interface, session and light status

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::StatusCode;
use axum::response::{Html, Json};
use axum::routing::{get, post};
use axum::Router;
use onair::UpdateRequest;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::control::ControlHandle;
use crate::image::MAX_IMAGE_SIZE;

const UPLOAD_FORM: &str = r#"<!doctype html>
<html>
<head><title>onair firmware</title></head>
<body>
<h1>onair firmware update</h1>
<form method="POST" action="/update" enctype="multipart/form-data">
<input type="file" name="update">
<input type="submit" value="Update">
</form>
</body>
</html>
"#;

/// Shared state for the admin server
struct AdminState {
    control: ControlHandle,
    start_time: Instant,
}

fn router(control: ControlHandle) -> Router {
    let state = Arc::new(AdminState {
        control,
        start_time: Instant::now(),
    });

    Router::new()
        .route("/", get(upload_form))
        .route("/update", post(upload))
        .route("/api/status", get(api_status))
        // Multipart framing on top of the largest accepted image
        .layer(DefaultBodyLimit::max(MAX_IMAGE_SIZE as usize + 64 * 1024))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Serve the admin surface until the process exits.
pub async fn start(control: ControlHandle, bind: SocketAddr) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .context(format!("Failed to bind to {}", bind))?;

    info!("Admin server listening on http://{}", bind);

    axum::serve(listener, router(control))
        .await
        .context("Admin server error")?;

    Ok(())
}

/// GET /: upload form
async fn upload_form() -> Html<&'static str> {
    Html(UPLOAD_FORM)
}

/// POST /update: stream the first file field into the update gate
async fn upload(
    State(state): State<Arc<AdminState>>,
    multipart: Multipart,
) -> (StatusCode, String) {
    match stream_upload(&state.control, multipart).await {
        Ok(status) => (StatusCode::OK, status),
        Err(e) => {
            warn!("Firmware upload failed: {:#}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, format!("Update Failed: {:#}", e))
        }
    }
}

async fn stream_upload(control: &ControlHandle, mut multipart: Multipart) -> Result<String> {
    while let Some(mut field) = multipart
        .next_field()
        .await
        .context("Malformed upload")?
    {
        if field.file_name().is_none() {
            continue;
        }
        info!(
            "Receiving firmware upload {:?}",
            field.file_name().unwrap_or_default()
        );

        control.update(UpdateRequest::Start).await?;
        loop {
            let chunk = match field.chunk().await {
                Ok(Some(chunk)) => chunk,
                Ok(None) => break,
                // The open transaction is abandoned by the next start
                Err(e) => return Err(e).context("Upload interrupted"),
            };
            control.update(UpdateRequest::Chunk(chunk)).await?;
        }
        let report = control.update(UpdateRequest::End).await?;
        return Ok(report.to_string());
    }

    anyhow::bail!("No firmware file in upload")
}

/// GET /api/status: device status
async fn api_status(State(state): State<Arc<AdminState>>) -> Json<serde_json::Value> {
    let snapshot = state.control.status();
    let mut resp = serde_json::json!({
        "version": env!("ONAIR_GIT_SHA"),
        "build": env!("ONAIR_BUILD_PROFILE"),
        "uptime_secs": state.start_time.elapsed().as_secs(),
    });
    if let (Some(obj), Ok(serde_json::Value::Object(status))) =
        (resp.as_object_mut(), serde_json::to_value(&snapshot))
    {
        obj.extend(status);
    }
    Json(resp)
}
