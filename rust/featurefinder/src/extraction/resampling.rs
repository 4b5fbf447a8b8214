use tracing::debug;

use crate::cancellation::CancellationToken;
use crate::errors::Result;
use crate::models::{
    IntensityGrid,
    Run,
    Scan,
    Spectrum,
};
use crate::utils::TupleRange;
use crate::utils::math::gaussblur_in_place;
use crate::utils::rolling_calculators::centered_rolling_median_into;

/// Scans in the median smoothing window.
const MEDIAN_SMOOTHING_SCANS: usize = 3;

/// Puts irregular spectra on a shared, uniform m/z axis.
///
/// Bin `i` sits at `mz_range.start() + i / frequency`.
#[derive(Debug, Clone, Copy)]
pub struct SpectrumResampler {
    mz_range: TupleRange<f64>,
    frequency: f64,
    median_smoothing: bool,
}

impl SpectrumResampler {
    pub fn new(mz_range: TupleRange<f64>, frequency: u32, median_smoothing: bool) -> Self {
        Self {
            mz_range,
            frequency: frequency.max(1) as f64,
            median_smoothing,
        }
    }

    pub fn num_bins(&self) -> usize {
        (self.mz_range.width() * self.frequency).floor() as usize + 1
    }

    pub fn bin_mz(&self, bin: f64) -> f64 {
        self.mz_range.start() + bin / self.frequency
    }

    /// Fractional bin of an m/z, `None` outside the range.
    pub fn mz_bin(&self, mz: f64) -> Option<f64> {
        if !self.mz_range.contains(mz) {
            return None;
        }
        Some((mz - self.mz_range.start()) * self.frequency)
    }

    /// Adds a spectrum to a grid row.
    ///
    /// Each point is split between the two bins around it, proportionally
    /// to its distance from them, so the row keeps the spectrum's total
    /// intensity (minus what falls outside the range).
    pub fn resample_into(&self, spectrum: &Spectrum, row: &mut [f32]) {
        let nbins = row.len();
        if nbins == 0 {
            return;
        }
        for (mz, intensity) in spectrum.iter() {
            let Some(pos) = self.mz_bin(mz) else {
                continue;
            };
            let lo = (pos.floor() as usize).min(nbins - 1);
            let frac = (pos - lo as f64).clamp(0.0, 1.0) as f32;
            if lo + 1 < nbins {
                row[lo] += intensity * (1.0 - frac);
                row[lo + 1] += intensity * frac;
            } else {
                row[lo] += intensity;
            }
        }
    }

    /// Resamples the spectra of `scans` and smooths every bin along time.
    #[cfg_attr(
        feature = "instrumentation",
        tracing::instrument(skip_all, level = "trace")
    )]
    pub fn resample(
        &self,
        run: &Run,
        scans: &[Scan],
        token: &CancellationToken,
    ) -> Result<IntensityGrid> {
        let mut grid = IntensityGrid::zeros(scans.len(), self.num_bins());
        let mut empty_scans = 0;
        for (i, scan) in scans.iter().enumerate() {
            token.check()?;
            let spectrum = run.spectrum_or_empty(scan.scan_number);
            if spectrum.is_empty() {
                empty_scans += 1;
                continue;
            }
            self.resample_into(&spectrum, grid.row_mut(i));
        }
        debug!(
            "Resampled {} scans into {} bins ({} empty)",
            scans.len(),
            grid.ncols(),
            empty_scans
        );
        self.smooth(&mut grid);
        Ok(grid)
    }

    /// Light smoothing along the time axis of every bin.
    ///
    /// The median mode trades peak shape for robustness against periodic
    /// single scan artifacts (lock mass scans).
    pub fn smooth(&self, grid: &mut IntensityGrid) {
        if self.median_smoothing {
            grid.column_apply(|col| {
                let mut out = Vec::with_capacity(col.len());
                centered_rolling_median_into(col, MEDIAN_SMOOTHING_SCANS, &mut out);
                *col = out;
            });
        } else {
            grid.column_apply(|col| gaussblur_in_place(col));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resampler() -> SpectrumResampler {
        SpectrumResampler::new(TupleRange::try_new(400.0, 410.0).unwrap(), 36, false)
    }

    #[test]
    fn test_triangular_peak_is_conserved() {
        let rs = resampler();
        // Triangular profile sampled off grid.
        let pairs: Vec<(f64, f32)> = (0..21)
            .map(|i| {
                let mz = 404.0 + i as f64 * 0.0137;
                let h = 10.0 - (i as f32 - 10.0).abs();
                (mz, h * 3.0)
            })
            .collect();
        let spectrum = Spectrum::from_unsorted(pairs, 1).unwrap();
        let mut row = vec![0.0; rs.num_bins()];
        rs.resample_into(&spectrum, &mut row);
        let total: f64 = row.iter().map(|x| *x as f64).sum();
        let expected = spectrum.total_intensity();
        assert!(
            (total - expected).abs() / expected < 1e-5,
            "Expected {} got {}",
            expected,
            total
        );
    }

    #[test]
    fn test_point_on_bin_and_between_bins() {
        let rs = resampler();
        assert_eq!(rs.num_bins(), 361);
        let spectrum = Spectrum::try_new(vec![400.25, 401.0 + 0.5 / 36.0], vec![10.0, 8.0], 1).unwrap();
        let mut row = vec![0.0; rs.num_bins()];
        rs.resample_into(&spectrum, &mut row);
        assert_eq!(row[9], 10.0);
        assert!((row[36] - 4.0).abs() < 1e-4);
        assert!((row[37] - 4.0).abs() < 1e-4);
        assert!((rs.bin_mz(9.0) - 400.25).abs() < 1e-12);
    }

    #[test]
    fn test_out_of_range_points_are_dropped() {
        let rs = resampler();
        let spectrum = Spectrum::try_new(vec![399.0, 405.0, 411.0], vec![1.0, 2.0, 4.0], 1).unwrap();
        let mut row = vec![0.0; rs.num_bins()];
        rs.resample_into(&spectrum, &mut row);
        let total: f32 = row.iter().sum();
        assert!((total - 2.0).abs() < 1e-6);
        // Last bin sits exactly on the range end.
        let edge = Spectrum::try_new(vec![410.0], vec![3.0], 1).unwrap();
        let mut row = vec![0.0; rs.num_bins()];
        rs.resample_into(&edge, &mut row);
        assert_eq!(row[360], 3.0);
    }

    #[test]
    fn test_median_smoothing_removes_single_scan_spikes() {
        let mut grid = IntensityGrid::from_rows(&[
            vec![1.0, 0.0],
            vec![1.0, 0.0],
            vec![1.0, 50.0],
            vec![1.0, 0.0],
            vec![1.0, 0.0],
        ])
        .unwrap();
        let rs = SpectrumResampler::new(TupleRange::try_new(400.0, 400.03).unwrap(), 36, true);
        rs.smooth(&mut grid);
        let mut col = Vec::new();
        grid.column_into(1, &mut col);
        assert_eq!(col, vec![0.0; 5]);
        grid.column_into(0, &mut col);
        assert_eq!(col, vec![1.0; 5]);
    }
}
