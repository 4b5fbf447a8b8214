use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FeatureFindingError {
    /// The caller asked for the extraction to stop.
    /// This is the only error that aborts a run.
    #[error("Feature finding was cancelled")]
    Cancelled,

    #[error("Spectrum reading error: {0}")]
    SpectrumRead(#[from] SpectrumReadError),

    #[error("Invalid configuration for `{field}`: {reason}")]
    InvalidConfig { field: &'static str, reason: String },

    #[error("Data processing error: {0}")]
    DataProcessing(#[from] DataProcessingError),

    #[error("I/O error on {path:?}: {source}")]
    Io {
        source: std::io::Error,
        path: Option<PathBuf>,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Delimited output error: {0}")]
    Csv(#[from] csv::Error),
}

pub type Result<T> = std::result::Result<T, FeatureFindingError>;

#[derive(Error, Debug)]
pub enum SpectrumReadError {
    #[error("Spectrum for scan {scan_number} unavailable after {attempts} attempts: {reason}")]
    Unavailable {
        scan_number: u32,
        attempts: usize,
        reason: String,
    },
    #[error("Scan {0} is not part of the run")]
    UnknownScan(u32),
}

#[derive(Error, Debug)]
pub enum DataProcessingError {
    #[error("Expected non-empty data ({context:?})")]
    ExpectedNonEmptyData { context: Option<String> },

    #[error("Expected slices of the same length, got {expected} and {other} ({context})")]
    ExpectedSlicesSameLength {
        expected: usize,
        other: usize,
        context: String,
    },

    #[error("Spectrum of scan {scan_number} is not sorted by m/z")]
    UnsortedSpectrum { scan_number: u32 },

    #[error("Expected finite, non-NaN data ({context})")]
    ExpectedFiniteNonNanData { context: String },
}

impl DataProcessingError {
    pub fn append_to_context(mut self, context: &str) -> Self {
        match &mut self {
            DataProcessingError::ExpectedNonEmptyData {
                context: owned_context,
            } => match owned_context {
                Some(x) => x.push_str(context),
                None => *owned_context = Some(context.to_string()),
            },
            DataProcessingError::ExpectedSlicesSameLength {
                context: owned_context,
                ..
            } => {
                owned_context.push_str(context);
            }
            DataProcessingError::ExpectedFiniteNonNanData {
                context: owned_context,
            } => {
                owned_context.push_str(context);
            }
            DataProcessingError::UnsortedSpectrum { .. } => {}
        }
        self
    }
}

impl FeatureFindingError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, FeatureFindingError::Cancelled)
    }

    pub(crate) fn io(source: std::io::Error, path: impl Into<PathBuf>) -> Self {
        FeatureFindingError::Io {
            source,
            path: Some(path.into()),
        }
    }
}
