use super::scorer::{
    SMALL_MOLECULE_ENVELOPE_LEN,
    SmallMoleculeScorer,
};
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

const SMALL_MOLECULE_ISOTOPES_BELOW: usize = 2;

/// Three position clusters with an optional chlorine at M+2.
#[derive(Debug, Clone, Copy)]
pub struct SmallMoleculePeakCombiner {
    params: SearchParams,
    scorer: SmallMoleculeScorer,
}

impl SmallMoleculePeakCombiner {
    pub fn new(mut params: SearchParams) -> Self {
        params.max_peaks = SMALL_MOLECULE_ENVELOPE_LEN;
        Self {
            scorer: SmallMoleculeScorer::new(params.isotope_tolerance),
            params,
        }
    }

    pub fn from_config(config: &FeatureFindingConfig) -> Self {
        Self::new(SearchParams {
            min_charge: config.min_charge,
            max_charge: config.max_charge,
            scan_window: config.scan_window,
            max_peaks: SMALL_MOLECULE_ENVELOPE_LEN,
            isotope_tolerance: config.derived().isotope_tolerance,
            isotopes_below: SMALL_MOLECULE_ISOTOPES_BELOW,
        })
    }
}

impl PeakCombiner for SmallMoleculePeakCombiner {
    fn name(&self) -> &'static str {
        "small_molecule"
    }

    fn create_features(
        &self,
        run: &Run,
        peaks: Vec<Peak>,
        token: &CancellationToken,
    ) -> Result<Vec<Feature>> {
        combine_peaks(run, peaks, &self.params, &self.scorer, token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::combining::isotopes::chlorine_envelope;
    use crate::combining::tests::{
        peak,
        run_with_scans,
    };
    use crate::utils::constants::{
        CHLORINE_ISOTOPE_SHIFT,
        NEUTRON_MASS,
        PROTON_MASS,
    };

    #[test]
    fn test_chlorinated_compound_is_one_feature() {
        let mono = 310.05;
        let env = chlorine_envelope(mono - PROTON_MASS);
        let peaks = vec![
            peak(mono, 8, (env[0] * 1000.0) as f32),
            peak(mono + NEUTRON_MASS, 8, (env[1] * 1000.0) as f32),
            peak(mono + CHLORINE_ISOTOPE_SHIFT, 8, (env[2] * 1000.0) as f32),
        ];
        let combiner = SmallMoleculePeakCombiner::from_config(&FeatureFindingConfig::small_molecule());
        let run = run_with_scans(20);
        let features = combiner
            .create_features(&run, peaks, &crate::CancellationToken::new())
            .unwrap();
        assert_eq!(features.len(), 1, "Got {:#?}", features);
        let f = &features[0];
        assert_eq!(f.charge, 1);
        assert_eq!(f.comprised.len(), 3);
        assert!((f.mz - mono).abs() < 1e-3);
        assert_eq!(combiner.name(), "small_molecule");
    }
}
