use std::sync::Arc;

use parking_lot::RwLock;
use tokio::task;

use crate::{
    error::ServiceError,
    model::{Classifier, ModelMetadata, Prediction, predict},
    preprocess::InputTensor,
};

pub type ModelLoader = dyn Fn() -> Result<Arc<dyn Classifier>, ServiceError> + Send + Sync;

/// Process-wide holder of the loaded model.
///
/// The model is built once by [`ModelRegistry::initialize`] and shared
/// read-only afterwards. [`ModelRegistry::reload`] swaps in a fresh instance
/// from the same loader; requests already holding the old one finish on it.
/// [`ModelRegistry::shutdown`] drops it.
pub struct ModelRegistry {
    loader: Arc<ModelLoader>,
    current: RwLock<Option<Arc<dyn Classifier>>>,
}

impl ModelRegistry {
    pub fn initialize<F>(loader: F) -> Result<Self, ServiceError>
    where
        F: Fn() -> Result<Arc<dyn Classifier>, ServiceError> + Send + Sync + 'static,
    {
        let loader: Arc<ModelLoader> = Arc::new(loader);
        let model = loader()?;
        Ok(Self {
            loader,
            current: RwLock::new(Some(model)),
        })
    }

    #[cfg(feature = "tch-backend")]
    pub fn from_config(config: &crate::config::AppConfig) -> Result<Self, ServiceError> {
        let config = config.clone();
        Self::initialize(move || {
            let model = crate::model::TorchClassifier::from_config(&config)?;
            Ok(Arc::new(model) as Arc<dyn Classifier>)
        })
    }

    pub fn current(&self) -> Result<Arc<dyn Classifier>, ServiceError> {
        self.current
            .read()
            .clone()
            .ok_or_else(|| ServiceError::ModelUnavailable("model has been shut down".into()))
    }

    pub fn metadata(&self) -> Option<ModelMetadata> {
        self.current.read().as_ref().map(|model| model.metadata())
    }

    pub fn is_loaded(&self) -> bool {
        self.current.read().is_some()
    }

    /// Runs the forward pass on a blocking worker.
    pub async fn classify(&self, input: InputTensor) -> Result<Prediction, ServiceError> {
        let model = self.current()?;
        task::spawn_blocking(move || predict(model.as_ref(), &input))
            .await
            .map_err(|err| ServiceError::InferenceFailure(format!("inference task failed: {err}")))?
    }

    /// Loads a fresh model and swaps it in. On failure the previous model
    /// stays active.
    pub async fn reload(&self) -> Result<ModelMetadata, ServiceError> {
        let loader = self.loader.clone();
        let model = task::spawn_blocking(move || loader())
            .await
            .map_err(|err| ServiceError::ModelUnavailable(format!("reload task failed: {err}")))??;

        let metadata = model.metadata();
        self.current.write().replace(model);
        tracing::info!(model = %metadata.name, "model reloaded");
        Ok(metadata)
    }

    pub fn shutdown(&self) {
        if self.current.write().take().is_some() {
            tracing::info!("model released");
        }
    }
}
