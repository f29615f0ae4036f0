use std::collections::VecDeque;
use std::error::Error;
use std::fmt;

use scantext::{
    load_image, ClassifierPaths, DetectorParams, ExtractorParams, FinishMode, ModelRecognizer,
    ModelRegionDetector, TextExtractor,
};
use tracing::{debug, Level};

mod models;
use models::{load_model, ModelSource};
mod output;
use output::{format_json_output, format_text_output, FormatJsonArgs, OutputFormat};

struct Args {
    /// Paths to the region detection classifiers.
    classifiers: ClassifierPaths,

    /// Path to a text recognition model.
    recognition_model: Option<String>,

    /// Recognizer language.
    language: Option<String>,

    /// Path to image to process.
    image: String,

    /// Enable debug output.
    debug: bool,

    output_format: OutputFormat,

    /// Output file path. Defaults to stdout.
    output_path: Option<String>,

    /// Remove repeated words from the output.
    unique_words: bool,
}

fn parse_args() -> Result<Args, lexopt::Error> {
    use lexopt::prelude::*;

    let mut values = VecDeque::new();
    let mut classifiers = ClassifierPaths::default();
    let mut debug = false;
    let mut language = None;
    let mut output_format = OutputFormat::Text;
    let mut output_path = None;
    let mut recognition_model = None;
    let mut unique_words = false;

    let mut parser = lexopt::Parser::from_env();
    while let Some(arg) = parser.next()? {
        match arg {
            Value(val) => values.push_back(val.string()?),
            Long("debug") => {
                debug = true;
            }
            Long("grouping-model") => {
                classifiers.grouping = parser.value()?.string()?.into();
            }
            Short('j') | Long("json") => {
                output_format = OutputFormat::Json;
            }
            Long("lang") => {
                language = Some(parser.value()?.string()?);
            }
            Short('o') | Long("output") => {
                output_path = Some(parser.value()?.string()?);
            }
            Long("rec-model") => {
                recognition_model = Some(parser.value()?.string()?);
            }
            Long("stage1-model") => {
                classifiers.stage_one = parser.value()?.string()?.into();
            }
            Long("stage2-model") => {
                classifiers.stage_two = parser.value()?.string()?.into();
            }
            Long("unique-words") => {
                unique_words = true;
            }
            Long("help") => {
                println!(
                    "Extract text from an image.

Usage: {bin_name} [OPTIONS] <image>

Options:

  --debug

    Enable debug logging.

  -j, --json

    Output text and detected regions in JSON format.

  --lang <lang>

    Language of the text. Defaults to \"eng\".

  -o, --output <path>

    Output file path (defaults to stdout)

  --unique-words

    Remove repeated words from the output.

Model options:

  --stage1-model <path>
  --stage2-model <path>
  --grouping-model <path>

    Region detection classifiers. These default to the files
    \"trained_classifierNM1.rten\", \"trained_classifierNM2.rten\" and
    \"trained_classifier_erGrouping.rten\" in the current directory.

  --rec-model <path>

    Use a custom text recognition model.
",
                    bin_name = parser.bin_name().unwrap_or("scantext")
                );
                std::process::exit(0);
            }
            _ => return Err(arg.unexpected()),
        }
    }

    Ok(Args {
        classifiers,
        debug,
        image: values.pop_front().ok_or("missing `<image>` arg")?,
        language,
        output_format,
        output_path,
        recognition_model,
        unique_words,
    })
}

/// Adds context to an error reading or parsing a file.
trait FileErrorContext<T> {
    /// If `self` represents a failed operation to read a file, convert the
    /// error to a message of the form "{context} from {path}: {original_error}".
    fn file_error_context<P: fmt::Display>(self, context: &str, path: P) -> Result<T, String>;
}

impl<T, E: std::fmt::Display> FileErrorContext<T> for Result<T, E> {
    fn file_error_context<P: fmt::Display>(self, context: &str, path: P) -> Result<T, String> {
        self.map_err(|err| format!("{} from \"{}\": {:#}", context, path, err))
    }
}

/// Default text recognition model.
const RECOGNITION_MODEL: &str =
    "https://s3.amazonaws.com/io.github.robertknight/ocrs-models/text-recognition.rten";

fn main() -> Result<(), Box<dyn Error>> {
    let args = parse_args()?;

    tracing_subscriber::fmt()
        .with_max_level(if args.debug { Level::DEBUG } else { Level::WARN })
        .with_writer(std::io::stderr)
        .init();

    // Check the input before fetching any models.
    let image = load_image(&args.image)?;

    let detector =
        ModelRegionDetector::from_classifiers(&args.classifiers, DetectorParams::default())?;

    let recognition_model_src =
        ModelSource::from_option(args.recognition_model.as_deref(), RECOGNITION_MODEL)?;
    let recognition_model = load_model(&recognition_model_src).file_error_context(
        "Failed to load text recognition model",
        &recognition_model_src,
    )?;
    let recognizer = ModelRecognizer::from_model(recognition_model)
        .file_error_context("Unsupported text recognition model", &recognition_model_src)?;

    let mut params = ExtractorParams::default();
    if let Some(language) = args.language {
        params.language = language;
    }
    if args.unique_words {
        params.finish = FinishMode::UniqueWords;
    }
    let extractor = TextExtractor::new(detector, recognizer, params);
    let extraction = extractor.extract(&image)?;

    debug!(
        detected = extraction.detected,
        regions = extraction.rects.len(),
        recognized = extraction.texts.iter().flatten().count(),
        width = image.width(),
        height = image.height(),
        "finished extraction"
    );

    let content = match args.output_format {
        OutputFormat::Text => format_text_output(&extraction.text),
        OutputFormat::Json => format_json_output(FormatJsonArgs {
            input_path: &args.image,
            input_size: [image.width(), image.height()],
            extraction: &extraction,
        }),
    };

    if let Some(output_path) = &args.output_path {
        std::fs::write(output_path, content.into_bytes())?;
    } else {
        println!("{}", content);
    }

    Ok(())
}
