use std::sync::Arc;

use axum::body::Bytes;
use serde::Serialize;
use tokio::task;

use crate::{
    config::ChannelOrder,
    error::ServiceError,
    model::{ModelRegistry, Prediction},
    preprocess,
    storage::{MediaStorage, StoredUpload},
};

/// File taken from the `image` form field.
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub file_name: String,
    pub bytes: Bytes,
}

#[derive(Debug, Clone, Serialize)]
pub struct Classification {
    pub upload: StoredUpload,
    pub prediction: Prediction,
}

/// Store, decode from disk, preprocess and classify one upload.
pub async fn classify_upload(
    storage: Arc<MediaStorage>,
    registry: &ModelRegistry,
    channel_order: ChannelOrder,
    upload: ImageUpload,
) -> Result<Classification, ServiceError> {
    let (stored, input) = task::spawn_blocking(move || {
        // Decode under the name's lock so a same-name upload cannot swap the file.
        storage.save_with(&upload.file_name, &upload.bytes, |stored| {
            preprocess::preprocess_file(&stored.path, channel_order)
        })
    })
    .await
    .map_err(|err| ServiceError::InferenceFailure(format!("preprocess task failed: {err}")))??;

    tracing::debug!(path = %stored.path.display(), shape = ?input.shape(), "upload preprocessed");

    let prediction = registry.classify(input).await?;
    tracing::info!(
        file = %stored.name,
        class_index = prediction.class_index,
        score = prediction.score,
        "prediction"
    );

    Ok(Classification {
        upload: stored,
        prediction,
    })
}
