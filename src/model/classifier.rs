use crate::{
    error::ServiceError,
    model::{ModelMetadata, Prediction},
    preprocess::InputTensor,
};

/// A loaded, read-only classification model.
pub trait Classifier: Send + Sync {
    /// One forward pass, returning a score per class.
    fn scores(&self, input: &InputTensor) -> Result<Vec<f32>, ServiceError>;

    fn metadata(&self) -> ModelMetadata;
}

/// Index and value of the highest score. Ties resolve to the lowest index and
/// NaN scores never win. Returns `None` when no score is comparable.
pub fn argmax(scores: &[f32]) -> Option<(usize, f32)> {
    let mut best: Option<(usize, f32)> = None;
    for (idx, &score) in scores.iter().enumerate() {
        if score.is_nan() {
            continue;
        }
        match best {
            Some((_, top)) if score <= top => {}
            _ => best = Some((idx, score)),
        }
    }
    best
}

pub fn predict(classifier: &dyn Classifier, input: &InputTensor) -> Result<Prediction, ServiceError> {
    let scores = classifier.scores(input)?;
    let (class_index, score) = argmax(&scores).ok_or_else(|| {
        ServiceError::InferenceFailure(format!(
            "model returned no usable scores ({} values)",
            scores.len()
        ))
    })?;

    Ok(Prediction {
        class_index,
        score,
        num_classes: scores.len(),
    })
}
