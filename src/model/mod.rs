mod classifier;
mod registry;
mod types;

#[cfg(feature = "tch-backend")]
mod loader;

pub use classifier::{Classifier, argmax, predict};
pub use registry::{ModelLoader, ModelRegistry};
pub use types::{ModelMetadata, Prediction};

#[cfg(feature = "tch-backend")]
pub use loader::TorchClassifier;
