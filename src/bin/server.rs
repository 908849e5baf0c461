use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use base64::Engine;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tracing::{error, info};

use terrainstream::config::{Knob, KnobDescriptor, TERRAIN_KNOBS};
use terrainstream::{
    ConsumerStats, ControlSurface, HeightfieldConfig, HeightfieldEngine, Pipeline, PipelineConfig,
    PreviewRenderer, TerrainShape, Viewpoint, logging,
};

#[derive(Clone)]
struct AppState {
    pipeline: Arc<Pipeline>,
    controls: Arc<Mutex<ControlSurface>>,
    renderer: Arc<Mutex<PreviewRenderer>>,
    consumer_stats: Arc<Mutex<ConsumerStats>>,
}

#[derive(Serialize)]
struct StateResponse {
    shape: TerrainShape,
    render_distance: u32,
    generation_rate: f32,
    consumer: ConsumerStats,
    coalesced_commands: u64,
    dropped_frames: u64,
}

#[derive(Deserialize)]
struct RenderDistanceRequest {
    distance: u32,
}

#[derive(Serialize)]
struct RenderDistanceResponse {
    distance: u32,
}

#[derive(Serialize)]
struct TerrainResponse {
    shape: TerrainShape,
}

#[derive(Deserialize)]
struct PreviewQuery {
    size: Option<usize>,
}

#[derive(Serialize)]
struct PreviewResponse {
    data_url: String,
    vertices: usize,
    triangles: usize,
}

type ApiError = (StatusCode, String);

async fn knobs_handler() -> Json<&'static [KnobDescriptor]> {
    Json(&TERRAIN_KNOBS[..])
}

async fn state_handler(State(state): State<AppState>) -> Json<StateResponse> {
    let (shape, render_distance) = {
        let controls = state.controls.lock();
        (controls.shape(), controls.render_distance())
    };
    Json(StateResponse {
        shape,
        render_distance,
        generation_rate: state.pipeline.generation_rate(),
        consumer: *state.consumer_stats.lock(),
        coalesced_commands: state.pipeline.commands().coalesced(),
        dropped_frames: state.pipeline.results().dropped(),
    })
}

async fn viewpoint_handler(
    State(state): State<AppState>,
    Json(viewpoint): Json<Viewpoint>,
) -> StatusCode {
    // Forwarded (throttled) by the consumer tick.
    state.renderer.lock().set_camera(viewpoint);
    StatusCode::NO_CONTENT
}

async fn render_distance_handler(
    State(state): State<AppState>,
    Json(req): Json<RenderDistanceRequest>,
) -> Json<RenderDistanceResponse> {
    let commands = state.pipeline.commands();
    let distance = state.controls.lock().set_render_distance(&commands, req.distance);
    Json(RenderDistanceResponse { distance })
}

/// Partial update: any subset of knobs, keyed by control id or field name.
async fn terrain_handler(
    State(state): State<AppState>,
    Json(values): Json<BTreeMap<String, f32>>,
) -> Result<Json<TerrainResponse>, ApiError> {
    let unknown: Vec<&str> = values
        .keys()
        .map(String::as_str)
        .filter(|name| Knob::from_name(name).is_none())
        .collect();
    if !unknown.is_empty() {
        return Err((
            StatusCode::UNPROCESSABLE_ENTITY,
            format!("unknown knobs: {}", unknown.join(", ")),
        ));
    }

    let commands = state.pipeline.commands();
    let mut controls = state.controls.lock();
    for (name, value) in &values {
        controls.set_named(name, *value);
    }
    let shape = controls.apply(&commands);
    Ok(Json(TerrainResponse { shape }))
}

async fn reset_handler(State(state): State<AppState>) -> Json<TerrainResponse> {
    let commands = state.pipeline.commands();
    let shape = state.controls.lock().reset(&commands);
    Json(TerrainResponse { shape })
}

async fn preview_handler(
    State(state): State<AppState>,
    Query(query): Query<PreviewQuery>,
) -> Result<Json<PreviewResponse>, ApiError> {
    let size = query.size.unwrap_or(256).clamp(16, 1024);
    // Short lock: the snapshot shares the geometry, drawing happens outside.
    let renderer = state.renderer.lock().snapshot();

    tokio::task::spawn_blocking(move || -> Result<Json<PreviewResponse>, ApiError> {
        let stats = renderer.held_stats();
        let png = renderer
            .encode_png(size)
            .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
        let b64 = base64::engine::general_purpose::STANDARD.encode(&png);
        Ok(Json(PreviewResponse {
            data_url: format!("data:image/png;base64,{}", b64),
            vertices: stats.vertex_count,
            triangles: stats.triangle_count,
        }))
    })
    .await
    .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to listen for ctrl-c");
    }
}

#[tokio::main]
async fn main() {
    logging::init();

    let pipeline = match Pipeline::start_with(
        || HeightfieldEngine::new(HeightfieldConfig::default()),
        PipelineConfig::default(),
    ) {
        Ok(p) => Arc::new(p),
        Err(e) => {
            error!(error = %e, "pipeline failed to start");
            std::process::exit(1);
        }
    };

    let renderer = Arc::new(Mutex::new(PreviewRenderer::new(Viewpoint::new(0.0, 20.0, 0.0))));
    let consumer_stats = Arc::new(Mutex::new(ConsumerStats::default()));

    // Render loop: display-rate ticks on the runtime, independent of generation.
    let (stop_tx, mut stop_rx) = watch::channel(false);
    let consumer_task = {
        let mut consumer = pipeline.consumer(renderer.clone());
        let consumer_stats = consumer_stats.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_millis(16));
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        consumer.tick(Instant::now());
                        *consumer_stats.lock() = consumer.stats();
                    }
                    _ = stop_rx.changed() => break,
                }
            }
            consumer.stop();
            info!("render loop stopped");
        })
    };

    let state = AppState {
        pipeline,
        controls: Arc::new(Mutex::new(ControlSurface::new())),
        renderer,
        consumer_stats,
    };

    let app = Router::new()
        .route("/api/knobs", get(knobs_handler))
        .route("/api/state", get(state_handler))
        .route("/api/viewpoint", post(viewpoint_handler))
        .route("/api/render-distance", post(render_distance_handler))
        .route("/api/terrain", post(terrain_handler))
        .route("/api/reset", post(reset_handler))
        .route("/api/preview", get(preview_handler))
        .fallback_service(ServeDir::new("frontend"))
        .layer(CorsLayer::permissive())
        .with_state(state);

    let addr = SocketAddr::from(([127, 0, 0, 1], 3000));
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(e) => {
            error!(error = %e, %addr, "failed to bind");
            std::process::exit(1);
        }
    };
    info!("terrainstream server at http://{}", addr);

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!(error = %e, "server error");
    }

    let _ = stop_tx.send(true);
    let _ = consumer_task.await;
    // The router (and with it the last pipeline handle) is gone: generation
    // thread joined, engine released.
}
