pub mod accurate_mass;
pub mod broker;
pub mod cancellation;
pub mod combining;
pub mod config;
pub mod errors;
pub mod extraction;
pub mod finder;
pub mod models;
pub mod spatial;
pub mod spectra;
pub mod utils;

pub use accurate_mass::AccurateMassAdjuster;
pub use broker::{
    FeatureFindingBroker,
    ScanWindow,
};
pub use cancellation::CancellationToken;
pub use combining::{
    DefaultFeatureScorer,
    DefaultPeakCombiner,
    FeatureScorer,
    PeakCombiner,
    SmallMoleculePeakCombiner,
};
pub use config::{
    AccurateMassConfig,
    CombinerKind,
    FeatureFindingConfig,
};
pub use errors::{
    FeatureFindingError,
    Result,
};
pub use extraction::{
    BackgroundRemover,
    SpectrumResampler,
    WaveletPeakExtractor,
};
pub use finder::FeatureFinder;
pub use models::{
    Feature,
    FeatureSelector,
    FeatureSet,
    Peak,
    PeakId,
    Run,
    RunFile,
    Scan,
    ScanRecord,
    Spectrum,
};
pub use spectra::{
    InMemorySpectra,
    SpectrumSource,
    SpectrumStore,
};
