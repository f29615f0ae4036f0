use std::path::Path;

use image::{DynamicImage, RgbImage};
use tracing::{debug, warn};

mod dedup;
mod detection;
mod errors;
mod geom_util;
mod model;
mod postprocess;
mod preprocess;
mod recognition;

#[cfg(test)]
mod test_util;

pub use dedup::remove_duplicates;
pub use detection::{ClassifierPaths, DetectorParams, ModelRegionDetector, RegionDetector};
pub use errors::{ExtractError, ModelRunError};
pub use model::load_model;
pub use postprocess::{filter_text, join_fragments, unique_words};
pub use preprocess::{
    binarize, otsu_threshold, prepare_regions, to_grayscale, PreparedRegion, RegionSource,
};
pub use recognition::{
    CharRecognizer, ModelRecognizer, ModelSession, RecognitionSession, ENGLISH_ALPHABET,
};
pub use rten_imageproc::Rect;

/// How the text of all regions is combined into the final result.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub enum FinishMode {
    /// Concatenate the filtered text of each region, each followed by a
    /// space.
    #[default]
    Concatenate,

    /// Concatenate, then remove repeated words.
    UniqueWords,
}

/// Configuration for a [TextExtractor] instance.
#[derive(Clone, Debug, PartialEq)]
pub struct ExtractorParams {
    /// Language identifier passed to the character recognizer.
    pub language: String,

    /// How region texts are combined.
    pub finish: FinishMode,
}

impl Default for ExtractorParams {
    fn default() -> ExtractorParams {
        ExtractorParams {
            language: "eng".to_string(),
            finish: FinishMode::default(),
        }
    }
}

/// Intermediate and final results of extracting text from an image.
#[derive(Clone, Debug, Default)]
pub struct Extraction {
    /// Number of candidate rects returned by the detector, before
    /// duplicates were removed.
    pub detected: usize,

    /// Non-overlapping text regions.
    pub rects: Vec<Rect>,

    /// Images passed to the recognizer. This is either one image per rect
    /// or a single image of the whole input.
    pub regions: Vec<PreparedRegion>,

    /// Filtered text of each entry in `regions`, or `None` if recognition
    /// failed or produced no text.
    pub texts: Vec<Option<String>>,

    /// Final combined text.
    pub text: String,
}

/// Load an image file for text extraction.
pub fn load_image<P: AsRef<Path>>(path: P) -> Result<DynamicImage, ExtractError> {
    let path = path.as_ref();
    if path.as_os_str().is_empty() {
        return Err(ExtractError::Input("bad file name".to_string()));
    }
    let image = image::open(path).map_err(|err| {
        ExtractError::Input(format!(
            "failed to load image \"{}\": {}",
            path.display(),
            err
        ))
    })?;
    if image.width() == 0 || image.height() == 0 {
        return Err(ExtractError::Input(format!(
            "image \"{}\" is empty",
            path.display()
        )));
    }
    Ok(image)
}

/// Finds and recognizes text in images.
///
/// A `TextExtractor` locates candidate text regions using a
/// [RegionDetector], reduces them to a set of non-overlapping regions,
/// prepares an image for each, recognizes them with a [CharRecognizer] and
/// cleans up the recognized text.
pub struct TextExtractor<D: RegionDetector, R: CharRecognizer> {
    detector: D,
    recognizer: R,
    params: ExtractorParams,
}

impl TextExtractor<ModelRegionDetector, ModelRecognizer> {
    /// Construct an extractor which uses the detection models at `paths`
    /// and the recognition model `recognition_model`.
    pub fn from_models(
        paths: &ClassifierPaths,
        recognition_model: rten::Model,
        params: ExtractorParams,
    ) -> Result<Self, ExtractError> {
        let detector = ModelRegionDetector::from_classifiers(paths, DetectorParams::default())?;
        let recognizer =
            ModelRecognizer::from_model(recognition_model).map_err(ExtractError::RecognizerInit)?;
        Ok(TextExtractor::new(detector, recognizer, params))
    }
}

impl<D: RegionDetector, R: CharRecognizer> TextExtractor<D, R> {
    /// Construct an extractor from a detector and recognizer.
    pub fn new(detector: D, recognizer: R, params: ExtractorParams) -> Self {
        TextExtractor {
            detector,
            recognizer,
            params,
        }
    }

    /// Extract text from the image file at `path`.
    pub fn get_text_from_file<P: AsRef<Path>>(&self, path: P) -> Result<String, ExtractError> {
        let image = load_image(path)?;
        self.get_text(&image)
    }

    /// Extract text from a decoded image.
    ///
    /// Returns an empty string if no text was found.
    pub fn get_text(&self, image: &DynamicImage) -> Result<String, ExtractError> {
        self.extract(image).map(|extraction| extraction.text)
    }

    /// Extract text from a decoded image, returning the regions that were
    /// recognized along with the text.
    pub fn extract(&self, image: &DynamicImage) -> Result<Extraction, ExtractError> {
        if image.width() == 0 || image.height() == 0 {
            return Err(ExtractError::Input("failed to load image".to_string()));
        }
        let image = image.to_rgb8();

        let detected = self.detect_regions(&image)?;
        if detected.is_empty() {
            debug!("no text regions found");
            return Ok(Extraction::default());
        }

        let rects = remove_duplicates(&detected);
        let regions = self.prepare_regions(&image, &rects);
        let texts = self.recognize_regions(&regions)?;
        let text = self.finish_text(&texts);

        Ok(Extraction {
            detected: detected.len(),
            rects,
            regions,
            texts,
            text,
        })
    }

    /// Find candidate text regions in an image.
    ///
    /// The result may contain duplicate and overlapping rects. Use
    /// [remove_duplicates] to reduce them to a non-overlapping set.
    pub fn detect_regions(&self, image: &RgbImage) -> Result<Vec<Rect>, ExtractError> {
        let rects = self
            .detector
            .detect(image)
            .map_err(ExtractError::Detection)?;
        debug!(regions = rects.len(), "detected text regions");
        Ok(rects)
    }

    /// Prepare greyscale or binarized images of text regions for
    /// recognition.
    ///
    /// `rects` is expected to be the output of [remove_duplicates].
    pub fn prepare_regions(&self, image: &RgbImage, rects: &[Rect]) -> Vec<PreparedRegion> {
        prepare_regions(image, rects)
    }

    /// Recognize and filter the text in each prepared region.
    ///
    /// Entries in the result are `None` if recognition of a region failed or
    /// produced no text after filtering.
    pub fn recognize_regions(
        &self,
        regions: &[PreparedRegion],
    ) -> Result<Vec<Option<String>>, ExtractError> {
        let mut session = self
            .recognizer
            .init(&self.params.language)
            .map_err(ExtractError::RecognizerInit)?;

        let mut texts = Vec::with_capacity(regions.len());
        for (index, region) in regions.iter().enumerate() {
            session.set_image(region.image());
            let text = match session.recognize() {
                Ok(raw) => Some(filter_text(&raw)).filter(|text| !text.is_empty()),
                Err(err) => {
                    warn!(region = index, source = ?region.source(), "recognition failed: {:#}", err);
                    None
                }
            };
            texts.push(text);
            session.clear();
        }
        session.end();

        Ok(texts)
    }

    /// Combine the outputs of [TextExtractor::recognize_regions] into the
    /// final text, according to the configured [FinishMode].
    pub fn finish_text(&self, texts: &[Option<String>]) -> String {
        let text = join_fragments(texts.iter().flatten().map(|t| t.as_str()));
        match self.params.finish {
            FinishMode::Concatenate => text,
            FinishMode::UniqueWords => unique_words(&text),
        }
    }
}
