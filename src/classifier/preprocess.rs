use image::imageops::{self, FilterType};

use super::model::{InputSize, ModelError};

/// A single-item NHWC batch of RGB values scaled to `[0, 1]`.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageTensor {
    size: InputSize,
    data: Vec<f32>,
}

impl ImageTensor {
    /// `[batch, height, width, channels]`.
    pub fn shape(&self) -> [usize; 4] {
        [1, self.size.height as usize, self.size.width as usize, 3]
    }

    pub fn size(&self) -> InputSize {
        self.size
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }
}

/// Decode `bytes`, force three colour channels, resize to `size` and scale to `[0, 1]`.
pub fn preprocess(bytes: &[u8], size: InputSize) -> Result<ImageTensor, ModelError> {
    let decoded = image::load_from_memory(bytes)?;
    if decoded.width() == 0 || decoded.height() == 0 {
        return Err(ModelError::EmptyImage);
    }
    let rgb = decoded.to_rgb8();
    let resized = imageops::resize(&rgb, size.width, size.height, FilterType::Triangle);
    let data = resized
        .as_raw()
        .iter()
        .map(|&value| f32::from(value) / 255.0)
        .collect();
    Ok(ImageTensor { size, data })
}

#[cfg(test)]
pub(crate) fn tensor_from_values(size: InputSize, data: Vec<f32>) -> ImageTensor {
    ImageTensor { size, data }
}
