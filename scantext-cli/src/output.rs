use serde_json::json;

use scantext::{Extraction, RegionSource};

pub enum OutputFormat {
    /// Output the extracted text.
    Text,

    /// Output the extracted text along with region information in JSON
    /// format.
    Json,
}

/// Input data for [format_json_output].
pub struct FormatJsonArgs<'a> {
    pub input_path: &'a str,

    /// Input image size as `[width, height]`.
    pub input_size: [u32; 2],

    pub extraction: &'a Extraction,
}

/// Format extracted text for output.
///
/// The separator after the last region is not useful in terminal output, so
/// it is removed.
pub fn format_text_output(text: &str) -> String {
    text.trim_end_matches(' ').to_string()
}

/// Format the extraction result as JSON.
pub fn format_json_output(args: FormatJsonArgs) -> String {
    let extraction = args.extraction;
    let region_items: Vec<_> = extraction
        .rects
        .iter()
        .map(|r| {
            json!({
                "coords": [r.left(), r.top(), r.right(), r.bottom()],
            })
        })
        .collect();

    let whole_image = matches!(
        extraction.regions.as_slice(),
        [region] if region.source() == RegionSource::WholeImage
    );
    let [width, height] = args.input_size;

    let json_data = json!({
        "url": args.input_path,
        "resolution": {
            "width": width,
            "height": height,
        },
        "whole_image": whole_image,
        "regions": region_items,
        "text": extraction.text,
    });
    serde_json::to_string_pretty(&json_data).expect("JSON formatting failed")
}
