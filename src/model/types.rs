use std::path::PathBuf;

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Prediction {
    pub class_index: usize,
    pub score: f32,
    pub num_classes: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ModelMetadata {
    pub name: String,
    pub path: PathBuf,
    pub size_bytes: u64,
    pub device: String,
    pub input_shape: [usize; 4],
}
