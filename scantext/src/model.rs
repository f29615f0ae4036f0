use std::path::Path;

use anyhow::{anyhow, Context};
use image::GrayImage;
use rten_tensor::{NdTensor, Tensor, TensorView};

/// The value used to represent fully black pixels in model inputs.
///
/// Model inputs are greyscale values in `[BLACK_VALUE, BLACK_VALUE + 1.]`.
pub const BLACK_VALUE: f32 = -0.5;

/// Interface for running an ML model.
pub trait Model {
    /// Return the expected input shape as a mix of fixed and dynamic-sized
    /// dimensions.
    fn input_shape(&self) -> anyhow::Result<Vec<rten::Dimension>>;

    /// Run the model and return inference outputs.
    fn run(
        &self,
        input: TensorView<f32>,
        opts: Option<rten::RunOptions>,
    ) -> anyhow::Result<Tensor<f32>>;
}

impl Model for rten::Model {
    fn input_shape(&self) -> anyhow::Result<Vec<rten::Dimension>> {
        let input_id = self
            .input_ids()
            .first()
            .copied()
            .ok_or(anyhow!("model has no inputs"))?;
        let input_shape = self
            .node_info(input_id)
            .and_then(|info| info.shape())
            .ok_or(anyhow!("model does not specify expected input shape"))?;
        Ok(input_shape)
    }

    fn run(
        &self,
        input: TensorView<f32>,
        opts: Option<rten::RunOptions>,
    ) -> anyhow::Result<Tensor<f32>> {
        let output = self.run_one(input.into(), opts)?.try_into()?;
        Ok(output)
    }
}

/// Load an RTen model from a file.
pub fn load_model(path: &Path) -> anyhow::Result<rten::Model> {
    rten::Model::load_file(path)
        .with_context(|| format!("failed to load model from \"{}\"", path.display()))
}

/// Convert a greyscale image to a `[1, height, width]` tensor of model
/// input values.
pub fn image_tensor(image: &GrayImage) -> NdTensor<f32, 3> {
    let (width, height) = image.dimensions();
    NdTensor::from_fn([1, height as usize, width as usize], |[_, y, x]| {
        image.get_pixel(x as u32, y as u32).0[0] as f32 / 255. + BLACK_VALUE
    })
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use image::{GrayImage, Luma};
    use rten_tensor::prelude::*;

    use super::{image_tensor, load_model, BLACK_VALUE};

    #[test]
    fn test_image_tensor() {
        let image = GrayImage::from_fn(4, 2, |x, _| if x == 3 { Luma([255]) } else { Luma([0]) });
        let tensor = image_tensor(&image);

        assert_eq!(tensor.shape(), [1, 2, 4]);
        assert_eq!(tensor[[0, 1, 0]], BLACK_VALUE);
        assert_eq!(tensor[[0, 1, 3]], BLACK_VALUE + 1.);
    }

    #[test]
    fn test_load_model_missing_file() {
        let err = load_model(Path::new("does-not-exist.rten")).err().unwrap();
        assert!(err.to_string().contains("does-not-exist.rten"));
    }
}
