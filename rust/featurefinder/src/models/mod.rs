pub mod feature;
pub mod feature_set;
pub mod grid;
pub mod peak;
pub mod run;
pub mod spectrum;

pub use feature::{
    Feature,
    IsotopePeak,
};
pub use feature_set::{
    FeatureSelector,
    FeatureSet,
};
pub use grid::IntensityGrid;
pub use peak::{
    Peak,
    PeakId,
};
pub use run::{
    MsLevel,
    Precursor,
    Run,
    RunFile,
    Scan,
    ScanRecord,
};
pub use spectrum::Spectrum;
