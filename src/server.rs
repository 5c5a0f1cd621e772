use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Multipart, State, multipart::MultipartRejection},
    response::Html,
    routing::{get, post},
};
use serde::Serialize;
use tower_http::{services::ServeDir, trace::TraceLayer};

use crate::{
    config::AppConfig,
    error::{ApiError, ServiceError},
    model::{ModelMetadata, ModelRegistry},
    page::{self, PageContext},
    pipeline::{self, ImageUpload},
    storage::MediaStorage,
};

const IMAGE_FIELD: &str = "image";

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub registry: Arc<ModelRegistry>,
    pub storage: Arc<MediaStorage>,
}

#[derive(Serialize)]
struct MetadataResponse {
    loaded: bool,
    model: Option<ModelMetadata>,
    media_url: String,
}

pub fn build_router(config: Arc<AppConfig>, registry: Arc<ModelRegistry>) -> Router {
    let storage = Arc::new(MediaStorage::new(
        config.media_root.clone(),
        config.media_url.clone(),
    ));
    let media = ServeDir::new(&config.media_root);
    let media_prefix = config.media_url.trim_end_matches('/').to_string();
    let body_limit = config.body_limit_bytes;

    let state = AppState {
        config,
        registry,
        storage,
    };

    let router = Router::new()
        .route("/", get(index).post(upload))
        .route("/health", get(health))
        .route("/metadata", get(metadata))
        .route("/model/reload", post(reload_model))
        .with_state(state);

    let router = if media_prefix.is_empty() {
        router.fallback_service(media)
    } else {
        router.nest_service(&media_prefix, media)
    };

    router
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
}

async fn index() -> Html<String> {
    page::render_index(&PageContext::default())
}

async fn upload(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Html<String>, ServiceError> {
    // A form posted without multipart encoding cannot carry a file.
    let Ok(multipart) = multipart else {
        return Err(ServiceError::MissingUpload);
    };
    let upload = read_image_field(multipart).await?;

    let result = pipeline::classify_upload(
        state.storage.clone(),
        &state.registry,
        state.config.channel_order,
        upload,
    )
    .await?;

    Ok(page::render_index(&PageContext {
        message: None,
        prediction: Some(result.prediction.class_index),
        score: Some(result.prediction.score),
        image_url: Some(result.upload.url),
    }))
}

/// Pulls the first `image` part. A part with no filename or no bytes is what
/// browsers send when nothing was picked, so it counts as missing.
async fn read_image_field(mut multipart: Multipart) -> Result<ImageUpload, ServiceError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ServiceError::BadRequest(e.to_string()))?
    {
        if field.name() != Some(IMAGE_FIELD) {
            continue;
        }
        let file_name = field.file_name().unwrap_or_default().to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ServiceError::BadRequest(e.to_string()))?;

        if file_name.is_empty() || bytes.is_empty() {
            return Err(ServiceError::MissingUpload);
        }
        return Ok(ImageUpload { file_name, bytes });
    }
    Err(ServiceError::MissingUpload)
}

async fn health() -> &'static str {
    "ok"
}

async fn metadata(State(state): State<AppState>) -> Json<MetadataResponse> {
    let model = state.registry.metadata();
    Json(MetadataResponse {
        loaded: model.is_some(),
        model,
        media_url: state.config.media_url.clone(),
    })
}

async fn reload_model(State(state): State<AppState>) -> Result<Json<ModelMetadata>, ApiError> {
    let metadata = state.registry.reload().await?;
    Ok(Json(metadata))
}
