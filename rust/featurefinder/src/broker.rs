//! Runs the pipeline over a whole run in overlapping windows of scans.
//!
//! Each window is extended by half the overlap on both sides of its
//! core. A feature is kept only by the window whose core holds its apex
//! scan, so features near a window edge are found with full context and
//! reported once.

#[cfg(not(feature = "serial_windows"))]
use rayon::prelude::*;
use std::time::Instant;
use tracing::info;

use crate::accurate_mass::AccurateMassAdjuster;
use crate::cancellation::CancellationToken;
use crate::config::FeatureFindingConfig;
use crate::errors::Result;
use crate::finder::FeatureFinder;
use crate::models::{
    Feature,
    FeatureSet,
    Run,
};
use crate::utils::TupleRange;

/// A block of MS1 scan indices and the part of it that owns features.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanWindow {
    pub scans: TupleRange<usize>,
    pub core: TupleRange<usize>,
}

/// Splits `nscans` scans into windows of `window_scans` sharing `overlap` scans.
///
/// Cores are contiguous and cover every scan exactly once.
pub fn plan_windows(nscans: usize, window_scans: usize, overlap: usize) -> Vec<ScanWindow> {
    if nscans == 0 {
        return Vec::new();
    }
    let window_scans = window_scans.max(1);
    let overlap = overlap.min(window_scans - 1);
    let step = window_scans - overlap;
    let lead = overlap / 2;
    let trail = overlap - lead;

    let mut out = Vec::new();
    let mut start = 0;
    loop {
        let end = (start + window_scans).min(nscans) - 1;
        let first = start == 0;
        let last = end == nscans - 1;
        let core_start = if first { 0 } else { start + lead };
        let core_end = if last { end } else { end - trail };
        out.push(ScanWindow {
            scans: TupleRange::spanning(start, end),
            core: TupleRange::spanning(core_start, core_end),
        });
        if last {
            break;
        }
        start += step;
    }
    out
}

/// Entry point for feature finding on whole runs.
#[derive(Debug, Clone)]
pub struct FeatureFindingBroker {
    config: FeatureFindingConfig,
}

impl FeatureFindingBroker {
    pub fn new(config: FeatureFindingConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &FeatureFindingConfig {
        &self.config
    }

    #[cfg_attr(
        feature = "instrumentation",
        tracing::instrument(skip_all, fields(run = run.name()), level = "trace")
    )]
    pub fn find_features(&self, run: &Run, token: &CancellationToken) -> Result<FeatureSet> {
        let start = Instant::now();
        let finder = FeatureFinder::new(&self.config, run.mz_range())?;
        let scans = run.ms1_scans();
        let windows = plan_windows(
            scans.len(),
            self.config.window_scans,
            self.config.window_overlap,
        );

        let run_window = |window: &ScanWindow| -> Result<Vec<Feature>> {
            let block = &scans[window.scans.start()..=window.scans.end()];
            let features = finder.find_features(run, block, token)?;
            Ok(features
                .into_iter()
                .filter(|f| {
                    run.ms1_index_for_scan_number(f.scan)
                        .is_some_and(|i| window.core.contains(i))
                })
                .collect())
        };

        // Every window in flight holds several full grids, so only a
        // bounded number run at once.
        let mut per_window: Vec<Vec<Feature>> = Vec::with_capacity(windows.len());
        for batch in windows.chunks(self.config.max_concurrent_windows.max(1)) {
            #[cfg(not(feature = "serial_windows"))]
            let found: Vec<Vec<Feature>> = batch
                .par_iter()
                .map(&run_window)
                .collect::<Result<_>>()?;

            #[cfg(feature = "serial_windows")]
            let found: Vec<Vec<Feature>> = batch
                .iter()
                .map(&run_window)
                .collect::<Result<_>>()?;

            per_window.extend(found);
        }

        let mut set = FeatureSet::new(run.name(), finder.combiner_name(), self.config.clone());
        set.features = per_window.into_iter().flatten().collect();
        set.sort_by_scan();

        let adjusted = if self.config.accurate_mass.enabled {
            let adjuster = AccurateMassAdjuster::new(
                &self.config.accurate_mass,
                self.config.derived().raw_match_tolerance,
            );
            adjuster.adjust_all_masses(run, &mut set.features, token)?
        } else {
            0
        };

        let stats = run.store().stats();
        info!(
            "Found {} features in {} ({} scans, {} windows, {} mass adjusted) in {:?}",
            set.len(),
            run.name(),
            scans.len(),
            windows.len(),
            adjusted,
            start.elapsed()
        );
        info!("Spectrum cache for {}: {:?}", run.name(), stats);
        Ok(set)
    }

    /// Runs one after the other, windows of each run in parallel.
    ///
    /// The first cancellation stops the whole batch.
    pub fn find_features_batch<'a>(
        &self,
        runs: impl IntoIterator<Item = &'a Run>,
        token: &CancellationToken,
    ) -> Result<Vec<FeatureSet>> {
        runs.into_iter()
            .map(|run| {
                token.check()?;
                self.find_features(run, token)
            })
            .collect()
    }
}
