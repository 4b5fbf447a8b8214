use serde::{
    Deserialize,
    Serialize,
};

use crate::errors::{
    FeatureFindingError,
    Result,
};
use crate::utils::TupleRange;
use crate::utils::rolling_calculators::MAX_WINDOW_SIZE;

/// Which isotope-cluster assembler runs after peak extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CombinerKind {
    #[default]
    Default,
    SmallMolecule,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccurateMassConfig {
    pub enabled: bool,
    /// Scans on each side of the apex averaged in profile mode.
    pub profile_scan_window: usize,
    /// Refinements moving the mass further than this from the raw match are dropped.
    pub max_ppm_shift: f64,
}

impl Default for AccurateMassConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            profile_scan_window: 1,
            max_ppm_shift: 5.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureFindingConfig {
    /// m/z range to resample, the run's own range when absent.
    pub mz_range: Option<(f64, f64)>,
    /// Grid bins per dalton.
    pub resampling_frequency: u32,
    pub min_charge: u8,
    pub max_charge: u8,
    /// Scans on either side of a seed searched for isotope partners.
    pub scan_window: usize,
    /// Derived from `resampling_frequency / max_charge` when absent.
    pub wavelet_level: Option<u32>,
    pub min_peak_scans: usize,
    pub max_peaks_per_feature: usize,
    /// Median instead of gaussian smoothing along time after resampling.
    pub median_smoothing: bool,
    pub combiner: CombinerKind,
    pub accurate_mass: AccurateMassConfig,
    pub window_scans: usize,
    pub window_overlap: usize,
    /// Windows of one run processed at the same time.
    pub max_concurrent_windows: usize,
    pub spectrum_cache_size: usize,
    pub spectrum_read_retries: usize,
}

impl Default for FeatureFindingConfig {
    fn default() -> Self {
        Self {
            mz_range: None,
            resampling_frequency: 36,
            min_charge: 1,
            max_charge: 6,
            scan_window: 9,
            wavelet_level: None,
            min_peak_scans: 5,
            max_peaks_per_feature: 10,
            median_smoothing: false,
            combiner: CombinerKind::Default,
            accurate_mass: AccurateMassConfig::default(),
            window_scans: 256,
            window_overlap: 32,
            max_concurrent_windows: 4,
            spectrum_cache_size: 512,
            spectrum_read_retries: 3,
        }
    }
}

impl FeatureFindingConfig {
    /// Defaults tuned for small molecules, charges 1 and 2 only and a tighter scan window.
    pub fn small_molecule() -> Self {
        Self {
            max_charge: 2,
            scan_window: 5,
            max_peaks_per_feature: 3,
            combiner: CombinerKind::SmallMolecule,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        fn invalid(field: &'static str, reason: impl Into<String>) -> FeatureFindingError {
            FeatureFindingError::InvalidConfig {
                field,
                reason: reason.into(),
            }
        }

        if self.resampling_frequency < 1 {
            return Err(invalid("resampling_frequency", "must be at least 1"));
        }
        // The m/z median spans two daltons of bins.
        if self.resampling_frequency as usize * 2 > MAX_WINDOW_SIZE {
            return Err(invalid(
                "resampling_frequency",
                format!("must be at most {}", MAX_WINDOW_SIZE / 2),
            ));
        }
        if self.min_charge < 1 || self.min_charge > self.max_charge {
            return Err(invalid(
                "min_charge",
                format!(
                    "charge range [{}, {}] is empty or includes 0",
                    self.min_charge, self.max_charge
                ),
            ));
        }
        if let Some((lo, hi)) = self.mz_range {
            if !(lo.is_finite() && hi.is_finite()) || lo >= hi {
                return Err(invalid(
                    "mz_range",
                    format!("expected finite lo < hi, got ({}, {})", lo, hi),
                ));
            }
        }
        if self.min_peak_scans == 0 {
            return Err(invalid("min_peak_scans", "must be at least 1"));
        }
        if self.max_peaks_per_feature < 2 {
            return Err(invalid("max_peaks_per_feature", "must be at least 2"));
        }
        if self.window_scans == 0 {
            return Err(invalid("window_scans", "must be at least 1"));
        }
        if self.window_overlap >= self.window_scans {
            return Err(invalid(
                "window_overlap",
                format!(
                    "overlap {} must be smaller than the window ({})",
                    self.window_overlap, self.window_scans
                ),
            ));
        }
        if self.max_concurrent_windows == 0 {
            return Err(invalid("max_concurrent_windows", "must be at least 1"));
        }
        if let Some(level) = self.wavelet_level {
            if !(1..=8).contains(&level) {
                return Err(invalid("wavelet_level", "must be in [1, 8]"));
            }
        }
        if self.accurate_mass.max_ppm_shift <= 0.0 {
            return Err(invalid("accurate_mass.max_ppm_shift", "must be positive"));
        }
        Ok(())
    }

    pub fn mz_tuple_range(&self) -> Option<TupleRange<f64>> {
        self.mz_range.map(|(lo, hi)| TupleRange::spanning(lo, hi))
    }

    pub fn derived(&self) -> DerivedTolerances {
        DerivedTolerances::new(self)
    }
}

/// All the resampling-frequency dependent constants.
///
/// The tuned multipliers (2.5 for isotope matching, 1.5 for duplicates)
/// are expressed in grid bins so they keep their meaning at any frequency.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DerivedTolerances {
    pub frequency: f64,
    /// Width of one grid bin in daltons.
    pub resolution: f64,
    /// Max error when matching an isotope spacing, 2.5 bins.
    pub isotope_tolerance: f64,
    /// Peaks closer than 1.5 bins in m/z are the same peak.
    pub duplicate_separation: f64,
    /// Search half width around expected positions in raw spectra, 1 bin.
    pub raw_match_tolerance: f64,
    /// Rolling median along m/z, 2 daltons.
    pub mz_median_window: usize,
    /// Rolling median along time, `frequency` scans.
    pub scan_median_window: usize,
    /// Baseline moving average along m/z, 1 dalton.
    pub mz_background_window: usize,
    pub wavelet_level: u32,
}

pub const ISOTOPE_TOLERANCE_BINS: f64 = 2.5;
pub const DUPLICATE_SEPARATION_BINS: f64 = 1.5;

impl DerivedTolerances {
    pub fn new(config: &FeatureFindingConfig) -> Self {
        let frequency = config.resampling_frequency.max(1) as f64;
        let resolution = 1.0 / frequency;
        let wavelet_level = config.wavelet_level.unwrap_or_else(|| {
            // Coarsest scale whose width (2^level bins) matches the isotope
            // spacing at max charge, 36 / 6 = 6 bins -> level 3.
            let bins_per_isotope = frequency / config.max_charge.max(1) as f64;
            (bins_per_isotope.log2().round() as i64).clamp(1, 8) as u32
        });
        Self {
            frequency,
            resolution,
            isotope_tolerance: ISOTOPE_TOLERANCE_BINS * resolution,
            duplicate_separation: DUPLICATE_SEPARATION_BINS * resolution,
            raw_match_tolerance: resolution,
            mz_median_window: (2.0 * frequency) as usize,
            scan_median_window: frequency as usize,
            mz_background_window: frequency as usize,
            wavelet_level,
        }
    }
}
