use anyhow::anyhow;
use image::imageops::FilterType;
use image::GrayImage;
use rten::ctc::CtcDecoder;
use rten::{Dimension, NodeId};
use rten_tensor::prelude::*;
use rten_tensor::{NdTensor, Tensor};
use tracing::debug;

use crate::errors::ModelRunError;
use crate::model::{image_tensor, Model};

/// Converts prepared region images into raw text.
///
/// A recognizer is initialized once per extraction call, producing a
/// [RecognitionSession] which processes the regions one at a time.
pub trait CharRecognizer {
    type Session<'a>: RecognitionSession
    where
        Self: 'a;

    /// Prepare to recognize text in the language identified by `language`.
    fn init(&self, language: &str) -> anyhow::Result<Self::Session<'_>>;
}

/// Recognition state for a sequence of regions.
pub trait RecognitionSession {
    /// Set the image to recognize next.
    fn set_image(&mut self, image: &GrayImage);

    /// Recognize the text in the current image.
    fn recognize(&mut self) -> anyhow::Result<String>;

    /// Reset per-image state, ready for the next region.
    fn clear(&mut self);

    /// Release resources held by the session.
    fn end(self);
}

/// Characters recognized by the English line recognition model.
///
/// Label `i + 1` in the model output corresponds to character `i` of this
/// string. Label `0` is the CTC blank.
pub const ENGLISH_ALPHABET: &str = " 0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz!\"#$%&'()*+,-./:;<=>?@[\\]^_`{|}~";

/// Return the alphabet for a recognizer language identifier.
fn alphabet_for_language(language: &str) -> Option<&'static str> {
    match language {
        "eng" | "en" => Some(ENGLISH_ALPHABET),
        _ => None,
    }
}

/// Compute width to resize a region image to, for a given height.
fn resized_width(orig_width: u32, orig_height: u32, height: u32) -> u32 {
    let min_width = 10.;

    // Very wide regions are squashed, which costs accuracy but bounds the
    // processing time.
    let max_width = 2400.;

    let aspect_ratio = orig_width as f32 / orig_height as f32;
    (height as f32 * aspect_ratio).clamp(min_width, max_width) as u32
}

/// Convert a sequence of CTC output labels into text.
///
/// Labels with no corresponding character in `alphabet` are mapped to the
/// Unicode replacement character.
fn labels_to_text(labels: impl Iterator<Item = u32>, alphabet: &str) -> String {
    labels
        .filter(|&label| label != 0)
        .map(|label| {
            alphabet
                .chars()
                .nth((label - 1) as usize)
                .unwrap_or(char::REPLACEMENT_CHARACTER)
        })
        .collect()
}

/// Recognizes text in region images using a trained RTen model with CTC
/// outputs.
pub struct ModelRecognizer {
    model: rten::Model,
    input_id: NodeId,
    input_shape: Vec<Dimension>,
    output_id: NodeId,
}

impl ModelRecognizer {
    /// Initialize a recognizer from a trained RTen model. Fails if the
    /// model does not have the expected inputs or outputs.
    pub fn from_model(model: rten::Model) -> anyhow::Result<ModelRecognizer> {
        let input_id = model
            .input_ids()
            .first()
            .copied()
            .ok_or(anyhow!("recognition model has no inputs"))?;
        let input_shape = Model::input_shape(&model)?;
        let output_id = model
            .output_ids()
            .first()
            .copied()
            .ok_or(anyhow!("recognition model has no outputs"))?;
        Ok(ModelRecognizer {
            model,
            input_id,
            input_shape,
            output_id,
        })
    }

    /// Return the expected height of input images.
    fn input_height(&self) -> u32 {
        match self.input_shape.get(2) {
            Some(Dimension::Fixed(size)) => *size as u32,
            _ => 50,
        }
    }

    /// Scale a region image to the model's input height and convert it to an
    /// NCHW tensor.
    fn prepare_input(&self, image: &GrayImage) -> NdTensor<f32, 4> {
        let height = self.input_height();
        let width = resized_width(image.width(), image.height(), height);
        let resized = image::imageops::resize(image, width, height, FilterType::Triangle);

        let tensor = image_tensor(&resized);
        let [chans, height, width] = tensor.shape();
        tensor.into_shape([1, chans, height, width])
    }

    /// Run recognition on an NCHW batch of images, and return a
    /// `[batch, seq, label]` tensor of class probabilities.
    fn run(&self, input: &NdTensor<f32, 4>) -> Result<NdTensor<f32, 3>, ModelRunError> {
        let input: Tensor<f32> = input.to_tensor().into_dyn();
        let [output] = self
            .model
            .run_n(
                vec![(self.input_id, (&input).into())],
                [self.output_id],
                None,
            )
            .map_err(|err| ModelRunError::RunFailed(err.into()))?;

        let output_ndim = output.ndim();
        let mut rec_sequence: NdTensor<f32, 3> = output.try_into().map_err(|_| {
            ModelRunError::WrongOutput(format!(
                "expected recognition output to have 3 dims but it has {}",
                output_ndim
            ))
        })?;

        // Transpose from [seq, batch, class] => [batch, seq, class]
        rec_sequence.permute([1, 0, 2]);

        Ok(rec_sequence)
    }
}

impl CharRecognizer for ModelRecognizer {
    type Session<'a> = ModelSession<'a>;

    fn init(&self, language: &str) -> anyhow::Result<ModelSession<'_>> {
        let alphabet = alphabet_for_language(language)
            .ok_or_else(|| anyhow!("unsupported language \"{}\"", language))?;
        Ok(ModelSession {
            recognizer: self,
            alphabet,
            input: SessionInput::None,
        })
    }
}

enum SessionInput {
    /// No image has been set.
    None,
    /// The image has no pixels.
    Empty,
    Image(NdTensor<f32, 4>),
}

/// Recognition session created by [ModelRecognizer].
pub struct ModelSession<'a> {
    recognizer: &'a ModelRecognizer,
    alphabet: &'static str,
    input: SessionInput,
}

impl RecognitionSession for ModelSession<'_> {
    fn set_image(&mut self, image: &GrayImage) {
        self.input = if image.width() == 0 || image.height() == 0 {
            SessionInput::Empty
        } else {
            SessionInput::Image(self.recognizer.prepare_input(image))
        };
    }

    fn recognize(&mut self) -> anyhow::Result<String> {
        let input = match &self.input {
            SessionInput::None => return Err(anyhow!("no image set")),
            SessionInput::Empty => return Ok(String::new()),
            SessionInput::Image(input) => input,
        };

        let output = self.recognizer.run(input)?;
        let alphabet_len = self.alphabet.chars().count();
        if output.size(2) < alphabet_len + 1 {
            return Err(ModelRunError::WrongOutput(format!(
                "output column count ({}) is smaller than alphabet size ({})",
                output.size(2),
                alphabet_len + 1
            ))
            .into());
        }

        let decoder = CtcDecoder::new();
        let hypothesis = decoder.decode_greedy(output.slice([0]));
        let text = labels_to_text(
            hypothesis.steps().iter().map(|step| step.label),
            self.alphabet,
        );
        debug!(
            width = input.size(3),
            chars = text.chars().count(),
            "recognized region"
        );

        Ok(text)
    }

    fn clear(&mut self) {
        self.input = SessionInput::None;
    }

    fn end(self) {}
}

#[cfg(test)]
mod tests {
    use image::{GrayImage, Luma};

    use super::{
        alphabet_for_language, labels_to_text, resized_width, CharRecognizer, ModelRecognizer,
        RecognitionSession, ENGLISH_ALPHABET,
    };
    use crate::test_util::fake_recognition_model;

    /// Generate a black image of the given size with row `row` filled white.
    ///
    /// The fake recognition model predicts label `row` for every column.
    fn gen_line_image(width: u32, height: u32, row: u32) -> GrayImage {
        GrayImage::from_fn(width, height, |_, y| if y == row { Luma([255]) } else { Luma([0]) })
    }

    #[test]
    fn test_labels_to_text() {
        // Label 0 is the CTC blank. Label `i + 1` is `alphabet[i]`.
        let labels = [2, 0, 12, 1, 38];
        assert_eq!(labels_to_text(labels.into_iter(), ENGLISH_ALPHABET), "0A a");

        let out_of_range = [12, 500];
        assert_eq!(
            labels_to_text(out_of_range.into_iter(), ENGLISH_ALPHABET),
            "A\u{FFFD}"
        );
    }

    #[test]
    fn test_resized_width() {
        assert_eq!(resized_width(100, 50, 64), 128);

        // Clamped to min and max widths
        assert_eq!(resized_width(1, 100, 64), 10);
        assert_eq!(resized_width(10_000, 10, 64), 2400);
    }

    #[test]
    fn test_alphabet_for_language() {
        assert_eq!(alphabet_for_language("eng"), Some(ENGLISH_ALPHABET));
        assert_eq!(alphabet_for_language("deu"), None);
    }

    #[test]
    fn test_model_recognizer() {
        let height = 128;
        let recognizer = ModelRecognizer::from_model(fake_recognition_model(height)).unwrap();
        assert_eq!(recognizer.input_height(), height as u32);

        let mut session = recognizer.init("eng").unwrap();

        // Label 12 is "A". Repeated labels are collapsed by CTC decoding.
        session.set_image(&gen_line_image(64, height as u32, 12));
        assert_eq!(session.recognize().unwrap(), "A");
        session.clear();

        // Label 0 is the CTC blank.
        session.set_image(&gen_line_image(64, height as u32, 0));
        assert_eq!(session.recognize().unwrap(), "");
        session.clear();

        // Recognizing without an image fails.
        assert!(session.recognize().is_err());

        // Regions with no pixels produce no text.
        session.set_image(&GrayImage::new(0, 0));
        assert_eq!(session.recognize().unwrap(), "");

        session.end();
    }

    #[test]
    fn test_model_recognizer_too_few_classes() {
        // The model output has fewer classes than the alphabet needs.
        let height = 64;
        let recognizer = ModelRecognizer::from_model(fake_recognition_model(height)).unwrap();
        let mut session = recognizer.init("eng").unwrap();

        session.set_image(&gen_line_image(32, height as u32, 12));
        let err = session.recognize().unwrap_err();

        assert!(err.to_string().contains("alphabet size"));
    }

    #[test]
    fn test_model_recognizer_unsupported_language() {
        let recognizer = ModelRecognizer::from_model(fake_recognition_model(128)).unwrap();
        let err = recognizer.init("deu").err().unwrap();
        assert!(err.to_string().contains("deu"));
    }
}
