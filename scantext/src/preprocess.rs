use image::{GrayImage, Luma, RgbImage};
use rten_imageproc::Rect;
use tracing::debug;

use crate::geom_util::{clamp_to_image, rect_area};

/// Maximum value of a pixel channel. Binarized regions use only `0` and this
/// value.
pub const MAX_CHANNEL: u8 = 255;

/// ITU BT.601 weights for RGB => luminance conversion.
const LUMA_WEIGHTS: [f32; 3] = [0.299, 0.587, 0.114];

/// Where the pixels of a [PreparedRegion] came from.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum RegionSource {
    /// The whole input image, converted to greyscale.
    WholeImage,
    /// A crop of the input image, converted to greyscale and binarized.
    Crop(Rect),
}

/// A single-channel image ready for character recognition.
#[derive(Clone, Debug)]
pub struct PreparedRegion {
    image: GrayImage,
    source: RegionSource,
}

impl PreparedRegion {
    /// Return the greyscale or binary pixels of this region.
    pub fn image(&self) -> &GrayImage {
        &self.image
    }

    pub fn source(&self) -> RegionSource {
        self.source
    }

    /// Return true if the region has no pixels.
    pub fn is_empty(&self) -> bool {
        self.image.width() == 0 || self.image.height() == 0
    }
}

/// Convert an RGB image to greyscale.
pub fn to_grayscale(image: &RgbImage) -> GrayImage {
    GrayImage::from_fn(image.width(), image.height(), |x, y| {
        let pixel = image.get_pixel(x, y);
        let luma: f32 = pixel
            .0
            .iter()
            .zip(LUMA_WEIGHTS)
            .map(|(&c, weight)| c as f32 * weight)
            .sum();
        Luma([luma.round().min(MAX_CHANNEL as f32) as u8])
    })
}

/// Compute a global binarization threshold for `image` using Otsu's method.
///
/// The returned value is the greatest intensity of the darker class. Pixels
/// above it belong to the lighter class.
pub fn otsu_threshold(image: &GrayImage) -> u8 {
    let mut histogram = [0u64; 256];
    for pixel in image.pixels() {
        histogram[pixel.0[0] as usize] += 1;
    }

    let total = image.width() as f64 * image.height() as f64;
    if total == 0. {
        return 0;
    }

    let sum_total: f64 = histogram
        .iter()
        .enumerate()
        .map(|(i, &count)| i as f64 * count as f64)
        .sum();

    let mut sum_bg = 0.;
    let mut weight_bg = 0.;
    let mut max_variance = -1.;
    let mut threshold = 0;

    for (level, &count) in histogram.iter().enumerate() {
        weight_bg += count as f64;
        sum_bg += level as f64 * count as f64;
        if weight_bg == 0. {
            continue;
        }

        let weight_fg = total - weight_bg;
        if weight_fg == 0. {
            break;
        }

        let mean_bg = sum_bg / weight_bg;
        let mean_fg = (sum_total - sum_bg) / weight_fg;
        let variance = weight_bg * weight_fg * (mean_bg - mean_fg).powi(2);

        if variance > max_variance {
            max_variance = variance;
            threshold = level as u8;
        }
    }

    threshold
}

/// Binarize a greyscale image with a threshold chosen by [otsu_threshold].
///
/// Pixels brighter than the threshold are set to [MAX_CHANNEL], all others
/// to zero.
pub fn binarize(image: &GrayImage) -> GrayImage {
    let threshold = otsu_threshold(image);
    GrayImage::from_fn(image.width(), image.height(), |x, y| {
        if image.get_pixel(x, y).0[0] > threshold {
            Luma([MAX_CHANNEL])
        } else {
            Luma([0])
        }
    })
}

/// Crop `rect` out of `image` and convert it to greyscale.
///
/// `rect` is clamped to the image bounds. The result is empty if `rect`
/// lies outside the image or has no area.
fn crop_grayscale(image: &RgbImage, rect: &Rect) -> GrayImage {
    let clamped = clamp_to_image(rect, image.width(), image.height());
    if clamped.width() <= 0 || clamped.height() <= 0 {
        return GrayImage::new(0, 0);
    }
    let crop = image::imageops::crop_imm(
        image,
        clamped.left() as u32,
        clamped.top() as u32,
        clamped.width() as u32,
        clamped.height() as u32,
    )
    .to_image();
    to_grayscale(&crop)
}

/// Return true if the regions in `rects` together cover at least half of
/// an image with the given dimensions.
///
/// Only the part of each rect that lies inside the image is counted.
pub fn covers_most_of_image(rects: &[Rect], width: u32, height: u32) -> bool {
    let sum_area: i64 = rects
        .iter()
        .map(|r| rect_area(&clamp_to_image(r, width, height)))
        .sum();
    let image_area = width as i64 * height as i64;
    sum_area >= image_area / 2
}

/// Produce the images to pass to the character recognizer for a set of
/// deduplicated text regions.
///
/// If the regions cover at least half of the image, a single region
/// containing the whole image in greyscale is returned. Otherwise each rect
/// is cropped, converted to greyscale and binarized.
pub fn prepare_regions(image: &RgbImage, rects: &[Rect]) -> Vec<PreparedRegion> {
    if rects.is_empty() {
        return Vec::new();
    }
    if covers_most_of_image(rects, image.width(), image.height()) {
        debug!(regions = rects.len(), "regions cover most of image, using whole image");
        return vec![PreparedRegion {
            image: to_grayscale(image),
            source: RegionSource::WholeImage,
        }];
    }

    rects
        .iter()
        .map(|rect| PreparedRegion {
            image: binarize(&crop_grayscale(image, rect)),
            source: RegionSource::Crop(*rect),
        })
        .collect()
}
