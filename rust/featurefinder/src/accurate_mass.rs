//! Mass refinement against the raw spectra.
//!
//! The grid has a resolution of one bin (1/36 Da by default), the raw
//! spectra are much finer. Refinement is best effort: anything odd
//! leaves the feature as it was.

use tracing::{
    debug,
    warn,
};

use crate::cancellation::CancellationToken;
use crate::config::AccurateMassConfig;
use crate::errors::Result;
use crate::models::{
    Feature,
    Run,
    Spectrum,
};
use crate::utils::TupleRange;
use crate::utils::constants::PPM;
use crate::utils::math::weighted_mean;

#[derive(Debug, Clone, Copy)]
pub struct AccurateMassAdjuster {
    /// Half width of the raw search window, in daltons.
    tolerance: f64,
    profile_scan_window: usize,
    max_ppm_shift: f64,
}

impl AccurateMassAdjuster {
    pub fn new(config: &AccurateMassConfig, tolerance: f64) -> Self {
        Self {
            tolerance,
            profile_scan_window: config.profile_scan_window,
            max_ppm_shift: config.max_ppm_shift,
        }
    }

    /// Refines every feature in place, returns how many were adjusted.
    ///
    /// Features whose spectra cannot be read are left alone.
    #[cfg_attr(
        feature = "instrumentation",
        tracing::instrument(skip_all, level = "trace")
    )]
    pub fn adjust_all_masses(
        &self,
        run: &Run,
        features: &mut [Feature],
        token: &CancellationToken,
    ) -> Result<usize> {
        let mut adjusted = 0;
        for feature in features.iter_mut() {
            token.check()?;
            let refined = if run.is_centroided() {
                self.refine_centroided(run, feature)
            } else {
                self.refine_profile(run, feature)
            };
            if let Some(mz) = refined {
                feature.set_mz(mz);
                feature.accurate_mz = true;
                adjusted += 1;
            }
        }
        debug!(
            "Adjusted the mass of {} of {} features",
            adjusted,
            features.len()
        );
        Ok(adjusted)
    }

    fn spectrum(&self, run: &Run, scan_number: u32) -> Option<std::sync::Arc<Spectrum>> {
        match run.try_spectrum(scan_number) {
            Ok(s) => Some(s),
            Err(e) => {
                warn!("Skipping mass adjustment at scan {}: {}", scan_number, e);
                None
            }
        }
    }

    /// Tallest raw peak at the first two isotope positions, averaged as
    /// monoisotopic equivalents.
    fn refine_centroided(&self, run: &Run, feature: &Feature) -> Option<f64> {
        let spectrum = self.spectrum(run, feature.scan)?;
        let (mono_mz, mono_intensity) =
            spectrum.largest_in(TupleRange::around(feature.mz, self.tolerance))?;

        let mut matches = vec![(mono_mz, mono_intensity as f64)];
        if feature.comprised.len() > 1 {
            if let Some(spacing) = feature.isotope_spacing() {
                if let Some((mz, intensity)) =
                    spectrum.largest_in(TupleRange::around(feature.mz + spacing, self.tolerance))
                {
                    matches.push((mz - spacing, intensity as f64));
                }
            }
        }
        let refined = weighted_mean(matches.into_iter())?;

        let shift_ppm = (refined - mono_mz).abs() / (mono_mz * PPM);
        if shift_ppm > self.max_ppm_shift {
            debug!(
                "Abandoning refinement of {:.4} at scan {}, {:.1} ppm from the raw peak",
                feature.mz, feature.scan, shift_ppm
            );
            return None;
        }
        Some(refined)
    }

    /// Mean of the per-scan centroids around the monoisotopic m/z.
    fn refine_profile(&self, run: &Run, feature: &Feature) -> Option<f64> {
        let scans = run.ms1_scans();
        let center = run.ms1_index_for_scan_number(feature.scan)?;
        let range = TupleRange::around_clamped(center, self.profile_scan_window, scans.len() - 1);
        let window = TupleRange::around(feature.mz, self.tolerance);

        let mut total = 0.0;
        let mut used = 0;
        for scan in &scans[range.start()..=range.end()] {
            let spectrum = self.spectrum(run, scan.scan_number)?;
            if let Some((mz, _)) = spectrum.centroid_in(window) {
                total += mz;
                used += 1;
            }
        }
        (used > 0).then(|| total / used as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        MsLevel,
        Scan,
        ScanRecord,
    };
    use crate::spectra::SpectrumSource;
    use crate::utils::constants::NEUTRON_MASS;
    use crate::models::{
        Peak,
        PeakId,
    };

    fn record(scan_number: u32, points: &[(f64, f32)]) -> ScanRecord {
        ScanRecord {
            header: Scan {
                scan_number,
                retention_time: scan_number as f64,
                ms_level: MsLevel::Ms1,
                precursor: None,
            },
            mz: points.iter().map(|p| p.0).collect(),
            intensity: points.iter().map(|p| p.1).collect(),
        }
    }

    fn feature(mz: f64, charge: u8, scan: u32) -> Feature {
        let peak = Peak {
            id: PeakId(0),
            mz,
            intensity: 100.0,
            total_intensity: 100.0,
            scan_index: 0,
            scan_number: scan,
            first_scan_index: 0,
            last_scan_index: 2,
            first_scan_number: scan,
            last_scan_number: scan + 2,
            background: 0.0,
            median: 0.0,
        };
        let mut f = Feature::candidate(&peak, charge);
        let mut second = f.comprised[0];
        second.id = PeakId(1);
        second.isotope = 1;
        f.comprised.push(second);
        f
    }

    fn adjuster() -> AccurateMassAdjuster {
        AccurateMassAdjuster::new(&AccurateMassConfig::default(), 1.0 / 36.0)
    }

    #[test]
    fn test_centroided_refinement() {
        let spacing = NEUTRON_MASS / 2.0;
        let raw = 500.2503;
        let run = Run::from_records(
            "centroided",
            vec![record(10, &[(raw, 100.0), (raw + spacing, 35.0), (510.0, 5.0)])],
            true,
            8,
            0,
        )
        .unwrap();
        let mut features = vec![feature(500.25, 2, 10)];
        let n = adjuster()
            .adjust_all_masses(&run, &mut features, &CancellationToken::new())
            .unwrap();
        assert_eq!(n, 1);
        assert!((features[0].mz - raw).abs() < 1e-9, "mz {}", features[0].mz);
        assert!(features[0].accurate_mz);
        assert!((features[0].mass - (raw - crate::utils::constants::PROTON_MASS) * 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_large_shift_leaves_feature_unchanged() {
        let spacing = NEUTRON_MASS / 2.0;
        // Second isotope 15 mDa off, the mean lands 15 ppm away from the raw mono.
        let run = Run::from_records(
            "centroided",
            vec![record(10, &[(500.25, 100.0), (500.25 + spacing + 0.015, 100.0)])],
            true,
            8,
            0,
        )
        .unwrap();
        let mut features = vec![feature(500.25, 2, 10)];
        let before = features.clone();
        let n = adjuster()
            .adjust_all_masses(&run, &mut features, &CancellationToken::new())
            .unwrap();
        assert_eq!(n, 0);
        assert_eq!(features, before);
    }

    #[test]
    fn test_profile_refinement_averages_scans() {
        let profile = |center: f64| -> Vec<(f64, f32)> {
            vec![
                (center - 0.01, 50.0),
                (center, 100.0),
                (center + 0.01, 50.0),
            ]
        };
        let run = Run::from_records(
            "profile",
            vec![
                record(9, &profile(600.001)),
                record(10, &profile(600.003)),
                record(11, &profile(600.005)),
                record(12, &profile(600.5)),
            ],
            false,
            8,
            0,
        )
        .unwrap();
        let mut features = vec![feature(600.0, 1, 10)];
        adjuster()
            .adjust_all_masses(&run, &mut features, &CancellationToken::new())
            .unwrap();
        assert!((features[0].mz - 600.003).abs() < 1e-9, "mz {}", features[0].mz);
    }

    struct BrokenSource;

    impl SpectrumSource for BrokenSource {
        fn read_spectrum(&mut self, _scan_number: u32) -> std::io::Result<Spectrum> {
            Err(std::io::Error::other("channel closed"))
        }
    }

    #[test]
    fn test_unreadable_scan_is_skipped() {
        let scans = vec![Scan {
            scan_number: 10,
            retention_time: 10.0,
            ms_level: MsLevel::Ms1,
            precursor: None,
        }];
        let run = Run::with_source(
            "broken",
            scans,
            TupleRange::spanning(400.0, 600.0),
            true,
            BrokenSource,
            8,
            2,
        );
        let mut features = vec![feature(500.25, 2, 10), feature(450.0, 1, 10)];
        let before = features.clone();
        let n = adjuster()
            .adjust_all_masses(&run, &mut features, &CancellationToken::new())
            .unwrap();
        assert_eq!(n, 0);
        assert_eq!(features, before);
    }

    #[test]
    fn test_cancelled_adjustment() {
        let run = Run::from_records("c", vec![record(10, &[(500.0, 1.0)])], true, 8, 0).unwrap();
        let token = CancellationToken::new();
        token.cancel();
        let mut features = vec![feature(500.0, 1, 10)];
        assert!(
            adjuster()
                .adjust_all_masses(&run, &mut features, &token)
                .unwrap_err()
                .is_cancelled()
        );
    }
}
