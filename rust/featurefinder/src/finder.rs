use tracing::debug;

use crate::cancellation::CancellationToken;
use crate::combining::{
    PeakCombiner,
    combiner_for,
};
use crate::config::FeatureFindingConfig;
use crate::errors::Result;
use crate::extraction::{
    SpectrumResampler,
    WaveletPeakExtractor,
};
use crate::models::{
    Feature,
    Run,
    Scan,
};
use crate::utils::TupleRange;

/// One pass of the pipeline over a block of MS1 scans:
/// resample, extract elution peaks, combine them into features.
pub struct FeatureFinder {
    resampler: SpectrumResampler,
    extractor: WaveletPeakExtractor,
    combiner: Box<dyn PeakCombiner>,
}

impl std::fmt::Debug for FeatureFinder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeatureFinder")
            .field("resampler", &self.resampler)
            .field("extractor", &self.extractor)
            .field("combiner", &self.combiner.name())
            .finish()
    }
}

impl FeatureFinder {
    /// The configured m/z range wins over the run's own.
    pub fn new(config: &FeatureFindingConfig, run_mz_range: TupleRange<f64>) -> Result<Self> {
        config.validate()?;
        let mz_range = config.mz_tuple_range().unwrap_or(run_mz_range);
        let tolerances = config.derived();
        Ok(Self {
            resampler: SpectrumResampler::new(
                mz_range,
                config.resampling_frequency,
                config.median_smoothing,
            ),
            extractor: WaveletPeakExtractor::new(tolerances, config.min_peak_scans),
            combiner: combiner_for(config),
        })
    }

    pub fn combiner_name(&self) -> &'static str {
        self.combiner.name()
    }

    pub fn resampler(&self) -> &SpectrumResampler {
        &self.resampler
    }

    #[cfg_attr(
        feature = "instrumentation",
        tracing::instrument(skip_all, level = "trace")
    )]
    pub fn find_features(
        &self,
        run: &Run,
        scans: &[Scan],
        token: &CancellationToken,
    ) -> Result<Vec<Feature>> {
        if scans.is_empty() {
            return Ok(Vec::new());
        }
        let grid = self.resampler.resample(run, scans, token)?;
        let peaks = self
            .extractor
            .extract_peaks(scans, &grid, &self.resampler, token)?;
        let npeaks = peaks.len();
        let features = self.combiner.create_features(run, peaks, token)?;
        debug!(
            "Scans {}-{}: {} peaks, {} features",
            scans[0].scan_number,
            scans[scans.len() - 1].scan_number,
            npeaks,
            features.len()
        );
        Ok(features)
    }
}
