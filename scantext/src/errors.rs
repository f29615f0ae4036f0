use thiserror::Error;

/// The error type returned when a text extraction call fails.
///
/// All variants are fatal to the call that produced them. Failures to
/// recognize an individual region are not reported here; that region simply
/// contributes no text.
#[derive(Error, Debug)]
pub enum ExtractError {
    /// The input path was empty, or the image could not be decoded or has
    /// no pixels.
    #[error("invalid input: {0}")]
    Input(String),

    /// The region detector's models could not be loaded or are unusable.
    #[error("failed to initialize region detector: {0:#}")]
    DetectorInit(anyhow::Error),

    /// The region detector failed while processing an image.
    #[error("region detection failed: {0:#}")]
    Detection(anyhow::Error),

    /// The character recognizer could not be initialized for the requested
    /// language.
    #[error("failed to initialize character recognizer: {0:#}")]
    RecognizerInit(anyhow::Error),
}

/// The error type returned when running a machine learning model fails.
#[derive(Error, Debug)]
pub enum ModelRunError {
    /// Model execution failed.
    #[error("model run failed: {0}")]
    RunFailed(Box<dyn std::error::Error + Send + Sync>),

    /// The model output had a different data type or shape than expected.
    #[error("model output had unexpected type or shape: {0}")]
    WrongOutput(String),
}
