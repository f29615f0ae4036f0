use std::path::PathBuf;

use anyhow::anyhow;
use image::{GrayImage, Luma, RgbImage};
use rayon::prelude::*;
use rten::{thread_pool, Dimension, FloatOperators};
use rten_imageproc::{
    find_contours, min_area_rect, simplify_polygon, BoundingRect, Rect, RetrievalMode,
};
use rten_tensor::prelude::*;
use rten_tensor::{NdTensor, NdTensorView, Tensor};
use tracing::debug;

use crate::errors::ExtractError;
use crate::geom_util::clamp_to_image;
use crate::model::{image_tensor, load_model, Model, BLACK_VALUE};
use crate::preprocess::{to_grayscale, MAX_CHANNEL};

/// Finds rectangles in an image that are likely to contain text.
pub trait RegionDetector {
    /// Return the candidate text regions in `image`.
    ///
    /// The result may contain duplicate and overlapping rects. An empty
    /// result means no text was found.
    fn detect(&self, image: &RgbImage) -> anyhow::Result<Vec<Rect>>;
}

/// Locations of the models used by [ModelRegionDetector].
#[derive(Clone, Debug, PartialEq)]
pub struct ClassifierPaths {
    /// Model for the first, permissive, stage of text pixel classification.
    pub stage_one: PathBuf,

    /// Model for the second stage, which verifies candidates from the first.
    pub stage_two: PathBuf,

    /// Model which classifies pixels as belonging to a group of characters.
    pub grouping: PathBuf,
}

impl Default for ClassifierPaths {
    fn default() -> ClassifierPaths {
        ClassifierPaths {
            stage_one: "trained_classifierNM1.rten".into(),
            stage_two: "trained_classifierNM2.rten".into(),
            grouping: "trained_classifier_erGrouping.rten".into(),
        }
    }
}

/// Parameters that control post-processing of the detector's model outputs.
#[derive(Clone, Debug, PartialEq)]
pub struct DetectorParams {
    /// Threshold for per-pixel scores of the first stage model.
    pub stage_one_threshold: f32,

    /// Minimum mean score of the second stage model within a candidate rect
    /// for the candidate to be kept.
    pub stage_two_min_probability: f32,

    /// Threshold for per-pixel scores of the grouping model.
    pub grouping_threshold: f32,

    /// Minimum area of connected components.
    pub min_area: f32,

    /// Distance to expand connected component boxes by.
    pub expand_dist: f32,
}

impl Default for DetectorParams {
    fn default() -> DetectorParams {
        DetectorParams {
            stage_one_threshold: 0.2,
            stage_two_min_probability: 0.5,
            grouping_threshold: 0.5,
            min_area: 16.,
            expand_dist: 3.,
        }
    }
}

/// Index of the luminance channel in the output of [compute_channels].
const LUMINANCE_CHANNEL: usize = 3;

/// Decompose an RGB image into the channels which are searched for text.
///
/// The result contains the R, G, B and luminance channels followed by the
/// inverted R, G, B and luminance channels. The inverted channels allow
/// light text on a dark background to be found.
pub fn compute_channels(image: &RgbImage) -> Vec<GrayImage> {
    let mut channels: Vec<GrayImage> = (0..3)
        .map(|c| {
            GrayImage::from_fn(image.width(), image.height(), |x, y| {
                Luma([image.get_pixel(x, y).0[c]])
            })
        })
        .collect();
    channels.push(to_grayscale(image));

    let n_chans = channels.len();
    for c in 0..n_chans {
        let inverted = GrayImage::from_fn(image.width(), image.height(), |x, y| {
            Luma([MAX_CHANNEL - channels[c].get_pixel(x, y).0[0]])
        });
        channels.push(inverted);
    }

    channels
}

/// Convert a probability map into a binary mask.
fn binary_mask(probs: NdTensorView<f32, 2>, threshold: f32) -> NdTensor<i32, 2> {
    probs.map(|prob| if *prob > threshold { 1i32 } else { 0 })
}

/// Find the bounding rects of connected components in the binary mask
/// `mask`.
fn find_component_rects(mask: NdTensorView<i32, 2>, expand_dist: f32, min_area: f32) -> Vec<Rect> {
    find_contours(mask.map(|v| *v != 0).view(), RetrievalMode::External)
        .iter()
        .filter_map(|poly| {
            let float_points: Vec<_> = poly.iter().map(|p| p.to_f32()).collect();
            let simplified = simplify_polygon(&float_points, 2. /* epsilon */);

            min_area_rect(&simplified).map(|mut rect| {
                rect.resize(
                    rect.width() + 2. * expand_dist,
                    rect.height() + 2. * expand_dist,
                );
                rect
            })
        })
        .filter(|r| r.area() >= min_area)
        .map(|r| r.bounding_rect().integral_bounding_rect())
        .collect()
}

/// Return the mean value of `probs` within `rect`, or `None` if `rect` does
/// not overlap the map.
fn mean_probability(probs: NdTensorView<f32, 2>, rect: &Rect) -> Option<f32> {
    let [height, width] = probs.shape();
    let r = clamp_to_image(rect, width as u32, height as u32);
    if r.width() <= 0 || r.height() <= 0 {
        return None;
    }

    let mut sum = 0.;
    for y in r.top()..r.bottom() {
        for x in r.left()..r.right() {
            sum += probs[[y as usize, x as usize]];
        }
    }
    Some(sum / (r.width() * r.height()) as f32)
}

/// Keep only the candidates whose mean score in `probs` reaches
/// `min_probability`.
fn verify_candidates(
    candidates: Vec<Rect>,
    probs: NdTensorView<f32, 2>,
    min_probability: f32,
) -> Vec<Rect> {
    candidates
        .into_iter()
        .filter(|r| mean_probability(probs.view(), r).is_some_and(|p| p >= min_probability))
        .collect()
}

/// Merge candidate rects into one rect per group.
///
/// A candidate belongs to every group that contains its center. Each group
/// with at least one member yields the union of its members' rects. Groups
/// without members and candidates outside every group are dropped.
fn group_candidates(candidates: &[Rect], groups: &[Rect]) -> Vec<Rect> {
    groups
        .iter()
        .filter_map(|group| {
            candidates
                .iter()
                .filter(|c| {
                    let (cy, cx) = ((c.top() + c.bottom()) / 2, (c.left() + c.right()) / 2);
                    group.left() <= cx
                        && cx < group.right()
                        && group.top() <= cy
                        && cy < group.bottom()
                })
                .fold(None, |merged: Option<Rect>, c| {
                    merged.map(|m| m.union(*c)).or(Some(*c))
                })
        })
        .collect()
}

/// A model which assigns each pixel of a greyscale image a probability of
/// belonging to the class it was trained on.
struct PixelClassifier {
    model: rten::Model,
    input_shape: Vec<Dimension>,
}

impl PixelClassifier {
    fn from_model(model: rten::Model) -> anyhow::Result<PixelClassifier> {
        let input_shape = Model::input_shape(&model)?;
        Ok(PixelClassifier { model, input_shape })
    }

    /// Return an (H, W) probability map for a greyscale CHW image with values
    /// in the range `BLACK_VALUE` to `BLACK_VALUE + 1`.
    ///
    /// The image is padded and resized to the model's expected input size
    /// and the output is resized back to the input size.
    fn probability_map(&self, image: NdTensorView<f32, 3>) -> anyhow::Result<NdTensor<f32, 2>> {
        let [img_chans, img_height, img_width] = image.shape();

        let [_, _, Dimension::Fixed(in_height), Dimension::Fixed(in_width)] = self.input_shape[..]
        else {
            return Err(anyhow!("failed to get model dims"));
        };

        // Pad small images to the input size of the model, rather than
        // scaling them up and distorting the text.
        let padded_height = img_height.max(in_height);
        let padded_width = img_width.max(in_width);
        let pad_bottom = padded_height - img_height;
        let pad_right = padded_width - img_width;

        let mut padded = NdTensor::full([1, img_chans, padded_height, padded_width], BLACK_VALUE);
        padded
            .slice_mut((0, .., ..img_height, ..img_width))
            .copy_from(&image);

        // Scale down images that are larger than the model's input size.
        let input: Tensor<f32> = if padded_height != in_height || padded_width != in_width {
            padded.resize_image([in_height, in_width])?
        } else {
            padded.into_dyn()
        };

        let probs = Model::run(&self.model, input.view(), None)?;

        // Remove padding and resize back to the original input size.
        let probs = probs
            .slice((
                ..,
                ..,
                ..(in_height - pad_bottom),
                ..(in_width - pad_right),
            ))
            .resize_image([img_height, img_width])?;

        // Remove batch, channel dims.
        Ok(probs.into_shape([img_height, img_width]))
    }
}

/// Region detector which uses a two-stage cascade of pixel classification
/// models over several image channels, followed by a grouping model which
/// merges character candidates into text regions.
pub struct ModelRegionDetector {
    stage_one: PixelClassifier,
    stage_two: PixelClassifier,
    grouping: PixelClassifier,
    params: DetectorParams,
}

impl ModelRegionDetector {
    /// Load the detector's models from the locations in `paths`.
    pub fn from_classifiers(
        paths: &ClassifierPaths,
        params: DetectorParams,
    ) -> Result<ModelRegionDetector, ExtractError> {
        let load = |path: &PathBuf| load_model(path).map_err(ExtractError::DetectorInit);
        ModelRegionDetector::from_models(
            load(&paths.stage_one)?,
            load(&paths.stage_two)?,
            load(&paths.grouping)?,
            params,
        )
    }

    /// Construct a detector from already loaded models.
    ///
    /// Each model must take a `[batch, 1, height, width]` input with fixed
    /// height and width and output a probability map of the same shape.
    pub fn from_models(
        stage_one: rten::Model,
        stage_two: rten::Model,
        grouping: rten::Model,
        params: DetectorParams,
    ) -> Result<ModelRegionDetector, ExtractError> {
        let classifier =
            |model| PixelClassifier::from_model(model).map_err(ExtractError::DetectorInit);
        Ok(ModelRegionDetector {
            stage_one: classifier(stage_one)?,
            stage_two: classifier(stage_two)?,
            grouping: classifier(grouping)?,
            params,
        })
    }

    /// Find and verify character candidates in a single channel.
    fn channel_candidates(&self, channel: &GrayImage) -> anyhow::Result<Vec<Rect>> {
        let input = image_tensor(channel);

        let stage_one_probs = self.stage_one.probability_map(input.view())?;
        let mask = binary_mask(stage_one_probs.view(), self.params.stage_one_threshold);
        let candidates =
            find_component_rects(mask.view(), self.params.expand_dist, self.params.min_area);
        if candidates.is_empty() {
            return Ok(candidates);
        }

        let stage_two_probs = self.stage_two.probability_map(input.view())?;
        Ok(verify_candidates(
            candidates,
            stage_two_probs.view(),
            self.params.stage_two_min_probability,
        ))
    }
}

impl RegionDetector for ModelRegionDetector {
    fn detect(&self, image: &RgbImage) -> anyhow::Result<Vec<Rect>> {
        let channels = compute_channels(image);

        // Channels are independent, so process them in parallel.
        let channel_candidates: Vec<Vec<Rect>> = thread_pool().run(|| {
            channels
                .par_iter()
                .map(|channel| self.channel_candidates(channel))
                .collect::<anyhow::Result<Vec<_>>>()
        })?;
        let candidates: Vec<Rect> = channel_candidates.into_iter().flatten().collect();
        debug!(
            channels = channels.len(),
            candidates = candidates.len(),
            "found character candidates"
        );
        if candidates.is_empty() {
            return Ok(candidates);
        }

        let luminance = image_tensor(&channels[LUMINANCE_CHANNEL]);
        let group_probs = self.grouping.probability_map(luminance.view())?;
        let group_mask = binary_mask(group_probs.view(), self.params.grouping_threshold);
        let groups = find_component_rects(
            group_mask.view(),
            self.params.expand_dist,
            self.params.min_area,
        );

        // Components touching the image border are expanded past it.
        let (width, height) = image.dimensions();
        let regions: Vec<Rect> = group_candidates(&candidates, &groups)
            .iter()
            .map(|r| clamp_to_image(r, width, height))
            .filter(|r| r.width() > 0 && r.height() > 0)
            .collect();
        debug!(
            groups = groups.len(),
            regions = regions.len(),
            "grouped character candidates"
        );

        Ok(regions)
    }
}
