use std::{fs, path::Path};

use parking_lot::Mutex;
use tch::{Device, Kind, Tensor, no_grad};

use crate::{
    config::{AppConfig, INPUT_SIZE},
    error::ServiceError,
    model::{Classifier, ModelMetadata},
    preprocess::InputTensor,
};

/// TorchScript classifier. The module expects an NHWC `f32` batch and returns
/// one score per class.
pub struct TorchClassifier {
    metadata: ModelMetadata,
    device: Device,
    module: Mutex<tch::CModule>,
}

impl TorchClassifier {
    pub fn from_config(config: &AppConfig) -> Result<Self, ServiceError> {
        Self::load(&config.model_name, &config.model_path, config.device)
    }

    pub fn load(name: &str, module_path: &Path, device: Device) -> Result<Self, ServiceError> {
        if !module_path.is_file() {
            return Err(ServiceError::ModelUnavailable(format!(
                "model artifact missing: {}",
                module_path.display()
            )));
        }
        let size_bytes = fs::metadata(module_path)
            .map_err(|e| ServiceError::ModelUnavailable(e.to_string()))?
            .len();
        let mut module = tch::CModule::load_on_device(module_path, device)
            .map_err(|e| ServiceError::ModelUnavailable(e.to_string()))?;
        module.set_eval();

        tracing::info!(
            model = name,
            path = %module_path.display(),
            size_bytes,
            ?device,
            "model loaded"
        );

        Ok(Self {
            metadata: ModelMetadata {
                name: name.to_string(),
                path: module_path.to_path_buf(),
                size_bytes,
                device: format!("{device:?}"),
                input_shape: [1, INPUT_SIZE as usize, INPUT_SIZE as usize, 3],
            },
            device,
            module: Mutex::new(module),
        })
    }
}

impl Classifier for TorchClassifier {
    fn scores(&self, input: &InputTensor) -> Result<Vec<f32>, ServiceError> {
        let [n, h, w, c] = input.shape().map(|d| d as i64);
        let batch = Tensor::from_slice(input.data())
            .reshape([n, h, w, c])
            .to(self.device);

        let output = no_grad(|| {
            let module = self.module.lock();
            module.forward_ts(&[batch])
        })
        .map_err(|e| ServiceError::InferenceFailure(e.to_string()))?;

        // Scores come back as [1, num_classes]; flatten the batch away.
        let flat = output
            .to_kind(Kind::Float)
            .to(Device::Cpu)
            .flatten(0, -1);
        Vec::<f32>::try_from(&flat).map_err(|e| ServiceError::InferenceFailure(e.to_string()))
    }

    fn metadata(&self) -> ModelMetadata {
        self.metadata.clone()
    }
}
