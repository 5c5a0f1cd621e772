use std::path::Path;

use image::{DynamicImage, RgbImage, imageops::FilterType};

use crate::{
    config::{ChannelOrder, INPUT_SIZE},
    error::ServiceError,
};

/// Single-sample batch in NHWC layout, raw `[0, 255]` pixel values.
#[derive(Debug, Clone, PartialEq)]
pub struct InputTensor {
    shape: [usize; 4],
    data: Vec<f32>,
}

impl InputTensor {
    pub fn new(shape: [usize; 4], data: Vec<f32>) -> Result<Self, ServiceError> {
        let expected: usize = shape.iter().product();
        if expected != data.len() {
            return Err(ServiceError::InferenceFailure(format!(
                "tensor shape {shape:?} needs {expected} values, got {}",
                data.len()
            )));
        }
        Ok(Self { shape, data })
    }

    pub fn shape(&self) -> [usize; 4] {
        self.shape
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }
}

/// Decodes by content rather than extension, so a misnamed upload still loads.
pub fn load_image(path: &Path) -> Result<DynamicImage, ServiceError> {
    let reader = image::io::Reader::open(path)?.with_guessed_format()?;
    reader
        .decode()
        .map_err(|err| ServiceError::InvalidImage(format!("{}: {err}", path.display())))
}

/// Squashes the image to `INPUT_SIZE` x `INPUT_SIZE`, ignoring aspect ratio.
pub fn resize(image: &DynamicImage) -> RgbImage {
    image
        .resize_exact(INPUT_SIZE, INPUT_SIZE, FilterType::CatmullRom)
        .to_rgb8()
}

/// Resizes, drops alpha and adds the leading batch dimension.
pub fn to_input_tensor(image: &DynamicImage, order: ChannelOrder) -> Result<InputTensor, ServiceError> {
    let resized = resize(image);
    let side = INPUT_SIZE as usize;

    let mut data = Vec::with_capacity(side * side * 3);
    for pixel in resized.pixels() {
        let [r, g, b] = pixel.0;
        let ordered = match order {
            ChannelOrder::Rgb => [r, g, b],
            ChannelOrder::Bgr => [b, g, r],
        };
        data.extend(ordered.iter().map(|&v| v as f32));
    }

    InputTensor::new([1, side, side, 3], data)
}

pub fn preprocess_file(path: &Path, order: ChannelOrder) -> Result<InputTensor, ServiceError> {
    let image = load_image(path)?;
    to_input_tensor(&image, order)
}
