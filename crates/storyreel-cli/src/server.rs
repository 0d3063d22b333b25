//! HTTP shell over the renderer.
//!
//! Every render endpoint builds one [`RenderRequest`], runs it to completion
//! on its own task and answers with the base64 MP4 or a single failure.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    extract::{rejection::JsonRejection, DefaultBodyLimit, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use base64::{engine::general_purpose, Engine as _};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use storyreel_core::{CompositionConfig, RenderError, RenderRequest, StoryreelConfig};
use storyreel_render::{composition, Renderer};
use tower_http::cors::CorsLayer;

type Reply = (StatusCode, Json<Value>);

#[derive(Clone)]
pub struct AppState {
    renderer: Arc<Renderer>,
    defaults: CompositionConfig,
}

impl AppState {
    pub fn new(renderer: Arc<Renderer>, defaults: CompositionConfig) -> Self {
        Self { renderer, defaults }
    }
}

pub fn router(state: AppState, body_limit_mb: usize) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/compositions", get(list_compositions))
        .route("/render-video", post(render_video))
        .route("/render-html-video-puppeteer", post(render_html_video))
        .route("/image-to-video", post(image_to_video))
        .layer(DefaultBodyLimit::max(body_limit_mb.saturating_mul(1024 * 1024)))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn run_server(config: StoryreelConfig) -> Result<()> {
    let renderer = Renderer::from_config(&config).context("failed to set up renderer")?;
    let state = AppState::new(Arc::new(renderer), config.compositions.clone());
    let app = router(state, config.server.body_limit_mb);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .with_context(|| format!("invalid listen address {}:{}", config.server.host, config.server.port))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;

    tracing::info!(%addr, body_limit_mb = config.server.body_limit_mb, "storyreel listening");
    println!("🎬 Storyreel render service listening on http://{}", addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;
    Ok(())
}

async fn health() -> Reply {
    (
        StatusCode::OK,
        Json(json!({
            "status": "ok",
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "service": "storyreel",
            "version": env!("CARGO_PKG_VERSION"),
        })),
    )
}

async fn list_compositions(State(state): State<AppState>) -> Reply {
    (
        StatusCode::OK,
        Json(json!({ "compositions": state.renderer.registry().list() })),
    )
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RenderVideoBody {
    composition_id: Option<String>,
    props: Option<Value>,
    html: Option<String>,
    day_of_week: Option<String>,
    template_type: Option<String>,
    form_data: Option<Value>,
    width: Option<u32>,
    height: Option<u32>,
    fps: Option<f64>,
    duration_ms: Option<u64>,
    device_scale_factor: Option<f64>,
}

async fn render_video(State(state): State<AppState>, body: Result<Json<Value>, JsonRejection>) -> Reply {
    let body: RenderVideoBody = match parse_body(body) {
        Ok(body) => body,
        Err(reply) => return reply,
    };
    match render_video_request(&state, body) {
        Ok(request) => run_job(&state, request, "/render-video").await,
        Err(message) => bad_request(message),
    }
}

/// Map the three accepted `/render-video` shapes onto a composition request.
fn render_video_request(state: &AppState, body: RenderVideoBody) -> Result<RenderRequest, String> {
    let (id, props) = if let Some(id) = body.composition_id {
        let props = body.props.unwrap_or_else(|| Value::Object(Map::new()));
        if !props.is_object() {
            return Err("props must be a JSON object".to_string());
        }
        (id, props)
    } else if let Some(html) = body.html {
        (composition::HTML_VIDEO.to_string(), json!({ "html": html }))
    } else {
        match (body.day_of_week, body.template_type, body.form_data) {
            (Some(day), Some(template), Some(Value::Object(form))) => {
                let mut props = Map::new();
                props.insert("dayOfWeek".to_string(), Value::String(day));
                props.insert("templateType".to_string(), Value::String(template));
                props.extend(form);
                (composition::CONTENT_PILLAR.to_string(), Value::Object(props))
            }
            (Some(_), Some(_), Some(_)) => return Err("formData must be a JSON object".to_string()),
            _ => {
                return Err(
                    "Missing required fields: compositionId, html, or dayOfWeek/templateType/formData"
                        .to_string(),
                )
            }
        }
    };

    // Unknown ids fall back to the configured defaults; the renderer rejects them.
    let (width, height, fps, duration_ms) = match state.renderer.registry().get(&id) {
        Ok(c) => (c.width, c.height, c.fps, c.duration_ms),
        Err(_) => (
            state.defaults.default_width,
            state.defaults.default_height,
            state.defaults.default_fps,
            state.defaults.default_duration_ms,
        ),
    };
    let request = RenderRequest::composition(
        id,
        props,
        body.width.unwrap_or(width),
        body.height.unwrap_or(height),
        body.fps.unwrap_or(fps),
        body.duration_ms.unwrap_or(duration_ms),
    )
    .with_device_scale_factor(body.device_scale_factor.unwrap_or(1.0));
    Ok(request)
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HtmlVideoBody {
    html: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    fps: Option<f64>,
    /// Seconds.
    duration: Option<f64>,
    device_scale_factor: Option<f64>,
}

async fn render_html_video(State(state): State<AppState>, body: Result<Json<Value>, JsonRejection>) -> Reply {
    let body: HtmlVideoBody = match parse_body(body) {
        Ok(body) => body,
        Err(reply) => return reply,
    };
    let Some(html) = body.html else {
        return bad_request("Missing required field: html".to_string());
    };
    let duration_ms = match seconds_to_ms(body.duration.unwrap_or(7.0), "duration") {
        Ok(ms) => ms,
        Err(message) => return bad_request(message),
    };
    let request = RenderRequest::html(
        html,
        body.width.unwrap_or(1080),
        body.height.unwrap_or(1920),
        body.fps.unwrap_or(30.0),
        duration_ms,
    )
    .with_device_scale_factor(body.device_scale_factor.unwrap_or(1.0));
    run_job(&state, request, "/render-html-video-puppeteer").await
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ImageToVideoBody {
    image_base64: Option<String>,
    duration_seconds: Option<f64>,
    width: Option<u32>,
    height: Option<u32>,
    fps: Option<f64>,
}

async fn image_to_video(State(state): State<AppState>, body: Result<Json<Value>, JsonRejection>) -> Reply {
    let body: ImageToVideoBody = match parse_body(body) {
        Ok(body) => body,
        Err(reply) => return reply,
    };
    let Some(encoded) = body.image_base64 else {
        return bad_request("Missing required field: imageBase64".to_string());
    };
    let image = match decode_image(&encoded) {
        Ok(bytes) => bytes,
        Err(message) => return bad_request(message),
    };
    let duration_ms = match seconds_to_ms(body.duration_seconds.unwrap_or(7.0), "durationSeconds") {
        Ok(ms) => ms,
        Err(message) => return bad_request(message),
    };
    let request = RenderRequest::still_image(
        image,
        body.width.unwrap_or(state.defaults.default_width),
        body.height.unwrap_or(state.defaults.default_height),
        body.fps.unwrap_or(state.defaults.default_fps),
        duration_ms,
    );
    run_job(&state, request, "/image-to-video").await
}

/// Accepts bare base64 or a `data:<mime>;base64,` URL.
fn decode_image(encoded: &str) -> Result<Vec<u8>, String> {
    let payload = match encoded.strip_prefix("data:") {
        Some(rest) => match rest.split_once(',') {
            Some((meta, data)) if meta.ends_with(";base64") => data,
            _ => return Err("imageBase64 data URL must be base64 encoded".to_string()),
        },
        None => encoded,
    };
    let payload: String = payload.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    general_purpose::STANDARD
        .decode(payload.as_bytes())
        .map_err(|e| format!("imageBase64 is not valid base64: {}", e))
}

fn seconds_to_ms(seconds: f64, field: &str) -> Result<u64, String> {
    if !seconds.is_finite() || seconds <= 0.0 {
        return Err(format!("{} must be a positive number of seconds", field));
    }
    Ok((seconds * 1000.0).round() as u64)
}

fn parse_body<T: serde::de::DeserializeOwned>(body: Result<Json<Value>, JsonRejection>) -> Result<T, Reply> {
    let Json(value) = body.map_err(|rejection| {
        (
            rejection.status(),
            Json(json!({ "success": false, "error": rejection.body_text() })),
        )
    })?;
    serde_json::from_value(value).map_err(|e| bad_request(format!("invalid request body: {}", e)))
}

/// Run the job on its own task so a dropped connection does not abort it.
async fn run_job(state: &AppState, request: RenderRequest, endpoint: &'static str) -> Reply {
    tracing::info!(
        endpoint,
        strategy = %request.strategy(),
        width = request.width,
        height = request.height,
        duration_ms = request.duration_ms,
        "render request received"
    );
    let renderer = state.renderer.clone();
    let outcome = tokio::spawn(async move { renderer.render(&request).await }).await;

    match outcome {
        Ok(Ok(artifact)) => (
            StatusCode::OK,
            Json(json!({
                "success": true,
                "videoData": artifact.to_base64(),
                "stats": artifact.stats(),
            })),
        ),
        Ok(Err(e)) => failure(&e),
        Err(e) => {
            tracing::error!(endpoint, error = %e, "render task panicked");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "success": false, "error": "render task aborted", "details": "internal_error" })),
            )
        }
    }
}

fn failure(e: &RenderError) -> Reply {
    if e.is_client_error() {
        return bad_request(e.to_string());
    }
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "success": false, "error": e.to_string(), "details": e.kind() })),
    )
}

fn bad_request(message: String) -> Reply {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "success": false, "error": message })),
    )
}
