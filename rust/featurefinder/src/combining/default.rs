use super::scorer::DefaultFeatureScorer;
use super::{
    PeakCombiner,
    SearchParams,
    combine_peaks,
};
use crate::cancellation::CancellationToken;
use crate::config::FeatureFindingConfig;
use crate::errors::Result;
use crate::models::{
    Feature,
    Peak,
    Run,
};

/// Monoisotopic peaks may sit this many isotopes below the seed.
const PEPTIDE_ISOTOPES_BELOW: usize = 4;

/// Peptide clusters, Poisson envelopes over up to `max_peaks_per_feature` isotopes.
#[derive(Debug, Clone, Copy)]
pub struct DefaultPeakCombiner {
    params: SearchParams,
    scorer: DefaultFeatureScorer,
}

impl DefaultPeakCombiner {
    pub fn new(params: SearchParams) -> Self {
        Self {
            scorer: DefaultFeatureScorer::new(params.max_peaks, params.isotope_tolerance),
            params,
        }
    }

    pub fn from_config(config: &FeatureFindingConfig) -> Self {
        Self::new(SearchParams {
            min_charge: config.min_charge,
            max_charge: config.max_charge,
            scan_window: config.scan_window,
            max_peaks: config.max_peaks_per_feature,
            isotope_tolerance: config.derived().isotope_tolerance,
            isotopes_below: PEPTIDE_ISOTOPES_BELOW,
        })
    }

    pub fn params(&self) -> &SearchParams {
        &self.params
    }
}

impl PeakCombiner for DefaultPeakCombiner {
    fn name(&self) -> &'static str {
        "default"
    }

    #[cfg_attr(
        feature = "instrumentation",
        tracing::instrument(skip_all, level = "trace")
    )]
    fn create_features(
        &self,
        run: &Run,
        peaks: Vec<Peak>,
        token: &CancellationToken,
    ) -> Result<Vec<Feature>> {
        combine_peaks(run, peaks, &self.params, &self.scorer, token)
    }
}
