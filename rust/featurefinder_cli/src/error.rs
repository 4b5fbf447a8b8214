use featurefinder::FeatureFindingError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CliError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Feature finding error: {0}")]
    FeatureFinding(#[from] FeatureFindingError),

    #[error("Error interpreting the config: {0}")]
    Config(String),

    #[error("Progress template error: {0}")]
    Template(#[from] indicatif::style::TemplateError),
}
