use rayon::prelude::*;

use crate::config::DerivedTolerances;
use crate::errors::Result;
use crate::models::IntensityGrid;
use crate::utils::rolling_calculators::{
    centered_rolling_median_into,
    centered_rolling_quantile_into,
};

/// Scans in the baseline window, long enough to span several elution peaks.
const BACKGROUND_SCAN_WINDOW: usize = 51;
/// Low quantile taken as the chemical noise floor of a bin.
const BACKGROUND_QUANTILE: f32 = 0.1;

/// Chemical background and local median surfaces of a resampled grid.
///
/// Both vary over time and m/z, they are used as adaptive thresholds
/// instead of a single global noise floor.
#[derive(Debug, Clone, Copy)]
pub struct BackgroundRemover {
    tolerances: DerivedTolerances,
}

impl BackgroundRemover {
    pub fn new(tolerances: DerivedTolerances) -> Self {
        Self { tolerances }
    }

    /// Baseline estimate, same shape as the input.
    ///
    /// A long rolling low quantile along time per bin, followed by a
    /// moving average over one dalton along m/z.
    #[cfg_attr(
        feature = "instrumentation",
        tracing::instrument(skip_all, level = "trace")
    )]
    pub fn remove_background(&self, grid: &IntensityGrid) -> IntensityGrid {
        let mut out = grid.clone();
        out.column_apply(|col| {
            let mut tmp = Vec::with_capacity(col.len());
            centered_rolling_quantile_into(col, BACKGROUND_SCAN_WINDOW, BACKGROUND_QUANTILE, &mut tmp);
            *col = tmp;
        });
        let window = self.tolerances.mz_background_window.max(1);
        out.par_rows_mut().for_each_init(Vec::new, |buf, row| {
            centered_moving_average_into(row, window, buf);
            row.copy_from_slice(buf);
        });
        out
    }

    /// Local median, the pointwise max of a rolling median along m/z
    /// (2 daltons wide) and one along time (`frequency` scans).
    #[cfg_attr(
        feature = "instrumentation",
        tracing::instrument(skip_all, level = "trace")
    )]
    pub fn calculate_median(&self, grid: &IntensityGrid) -> Result<IntensityGrid> {
        let mz_window = self.tolerances.mz_median_window;
        let scan_window = self.tolerances.scan_median_window;

        let mut along_mz = grid.clone();
        along_mz
            .par_rows_mut()
            .for_each_init(Vec::new, |buf, row| {
                centered_rolling_median_into(row, mz_window, buf);
                row.copy_from_slice(buf);
            });

        let mut along_time = grid.clone();
        along_time.column_apply(|col| {
            let mut tmp = Vec::with_capacity(col.len());
            centered_rolling_median_into(col, scan_window, &mut tmp);
            *col = tmp;
        });

        along_mz.zip_map_inplace(&along_time, f32::max)?;
        Ok(along_mz)
    }
}

/// Centered moving average, windows truncated at the edges.
fn centered_moving_average_into(values: &[f32], window: usize, out: &mut Vec<f32>) {
    out.clear();
    out.resize(values.len(), 0.0);
    if values.is_empty() {
        return;
    }
    let half = window / 2;
    let right = window - half - 1;
    let mut prefix = Vec::with_capacity(values.len() + 1);
    prefix.push(0.0f64);
    for v in values {
        let last = prefix[prefix.len() - 1];
        prefix.push(last + *v as f64);
    }
    for i in 0..values.len() {
        let lo = i.saturating_sub(half);
        let hi = (i + right).min(values.len() - 1);
        out[i] = ((prefix[hi + 1] - prefix[lo]) / (hi + 1 - lo) as f64) as f32;
    }
}
