use std::collections::HashMap;
use tracing::debug;

use super::background::BackgroundRemover;
use super::resampling::SpectrumResampler;
use super::wavelet::{
    ridge_surface,
    smooth_along_time,
};
use crate::cancellation::CancellationToken;
use crate::config::DerivedTolerances;
use crate::errors::Result;
use crate::models::{
    IntensityGrid,
    Peak,
    PeakId,
    Scan,
};
use crate::spatial::{
    PeakArena,
    PeakIndex,
};
use crate::utils::TupleRange;
use crate::utils::math::trapezoid;

/// A rise of more than this factor over the lowest point seen ends a walk.
const VALLEY_RISE: f32 = 1.1;
/// Bins on each side whose ridge value must stay below the walked bin.
const RIDGE_OFFSET: usize = 2;
const NEIGHBOUR_SCANS: usize = 5;
const NEIGHBOUR_MZ: f64 = 1.1;
/// Combined apex intensity over combined local noise needed to corroborate.
const CORRELATION_INTENSITY_FACTOR: f32 = 5.0;

/// 2D local maximum of the time-smoothed ridge surface.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawPeak {
    pub scan_index: usize,
    pub bin: usize,
    pub intensity: f32,
}

/// Every surface the walk looks at, all the same shape.
pub struct Surfaces<'a> {
    pub intensity: &'a IntensityGrid,
    pub background: &'a IntensityGrid,
    pub median: &'a IntensityGrid,
    pub ridge: &'a IntensityGrid,
}

impl Surfaces<'_> {
    #[inline]
    fn threshold(&self, scan: usize, bin: usize) -> f32 {
        self.background.get(scan, bin) + self.median.get(scan, bin)
    }

    /// How far the intensity sits above the local threshold.
    #[inline]
    fn excess(&self, scan: usize, bin: usize) -> f32 {
        self.intensity.get(scan, bin) - self.threshold(scan, bin)
    }

    /// Whether the bin is still the top of a ridge in this scan.
    fn on_ridge(&self, scan: usize, bin: usize) -> bool {
        let here = self.ridge.get(scan, bin);
        let left_ok = bin < RIDGE_OFFSET || here > self.ridge.get(scan, bin - RIDGE_OFFSET);
        let right_ok = bin + RIDGE_OFFSET >= self.ridge.ncols()
            || here > self.ridge.get(scan, bin + RIDGE_OFFSET);
        left_ok && right_ok
    }
}

/// Finds elution peaks on a resampled grid.
///
/// Output peaks are single m/z traces with a scan extent, no charge
/// has been assigned yet.
#[derive(Debug, Clone, Copy)]
pub struct WaveletPeakExtractor {
    tolerances: DerivedTolerances,
    min_peak_scans: usize,
}

impl WaveletPeakExtractor {
    pub fn new(tolerances: DerivedTolerances, min_peak_scans: usize) -> Self {
        Self {
            tolerances,
            min_peak_scans: min_peak_scans.max(1),
        }
    }

    #[cfg_attr(
        feature = "instrumentation",
        tracing::instrument(skip_all, level = "trace")
    )]
    pub fn extract_peaks(
        &self,
        scans: &[Scan],
        grid: &IntensityGrid,
        resampler: &SpectrumResampler,
        token: &CancellationToken,
    ) -> Result<Vec<Peak>> {
        if grid.nrows() == 0 || grid.ncols() == 0 {
            return Ok(Vec::new());
        }
        let remover = BackgroundRemover::new(self.tolerances);
        let background = remover.remove_background(grid);
        let median = remover.calculate_median(grid)?;
        let ridge = ridge_surface(grid, self.tolerances.wavelet_level);
        let mut smoothed = ridge.clone();
        smooth_along_time(&mut smoothed);

        let surfaces = Surfaces {
            intensity: grid,
            background: &background,
            median: &median,
            ridge: &ridge,
        };
        let raw = find_raw_peaks(&smoothed, &surfaces);
        let peaks = self.walk_raw_peaks(scans, &surfaces, resampler, raw, token)?;
        let walked = peaks.len();
        let peaks = self.correlation_filter(peaks);
        debug!(
            "Extracted {} elution peaks, {} survive the correlation filter",
            walked,
            peaks.len()
        );
        Ok(peaks)
    }

    /// Turns raw maxima into elution peaks, tallest first.
    ///
    /// Every raw maximum on the same trace (within one bin) and inside an
    /// accepted extent is claimed by that extent and never walked again.
    pub fn walk_raw_peaks(
        &self,
        scans: &[Scan],
        surfaces: &Surfaces<'_>,
        resampler: &SpectrumResampler,
        mut raw: Vec<RawPeak>,
        token: &CancellationToken,
    ) -> Result<Vec<Peak>> {
        raw.sort_by(|a, b| {
            b.intensity
                .total_cmp(&a.intensity)
                .then(a.scan_index.cmp(&b.scan_index))
                .then(a.bin.cmp(&b.bin))
        });
        let mut by_bin: HashMap<usize, Vec<usize>> = HashMap::new();
        for (i, r) in raw.iter().enumerate() {
            by_bin.entry(r.bin).or_default().push(i);
        }
        let mut claimed = vec![false; raw.len()];
        let mut peaks = Vec::new();
        let mut too_short = 0;

        for i in 0..raw.len() {
            if claimed[i] {
                continue;
            }
            token.check()?;
            let seed = raw[i];
            let (first, last) = walk_extent(surfaces, seed.scan_index, seed.bin);

            for bin in seed.bin.saturating_sub(1)..=seed.bin + 1 {
                if let Some(others) = by_bin.get(&bin) {
                    for &j in others {
                        if (first..=last).contains(&raw[j].scan_index) {
                            claimed[j] = true;
                        }
                    }
                }
            }
            claimed[i] = true;

            if last - first + 1 < self.min_peak_scans {
                too_short += 1;
                continue;
            }
            peaks.push(build_peak(
                PeakId(peaks.len() as u32),
                scans,
                surfaces,
                resampler,
                seed.bin,
                first,
                last,
            ));
        }
        debug!(
            "Walked {} raw maxima into {} peaks ({} too short)",
            raw.len(),
            peaks.len(),
            too_short
        );
        Ok(peaks)
    }

    /// Keeps only peaks corroborated by a neighbour in m/z and time.
    pub fn correlation_filter(&self, peaks: Vec<Peak>) -> Vec<Peak> {
        let mut arena = PeakArena::new(peaks);
        if arena.is_empty() {
            return Vec::new();
        }
        arena.consume_all();
        let index = PeakIndex::new(&arena);
        let max_scan = arena
            .peaks()
            .iter()
            .map(|p| p.last_scan_index)
            .max()
            .unwrap_or(0);

        let mut corroborated = Vec::new();
        for p in arena.peaks() {
            let mz_range = TupleRange::around(p.mz, NEIGHBOUR_MZ);
            let scan_range = TupleRange::around_clamped(p.scan_index, NEIGHBOUR_SCANS, max_scan);
            for q in index.query(&arena, mz_range, scan_range) {
                if q.id > p.id && self.corroborates(p, q) {
                    corroborated.push(p.id);
                    corroborated.push(q.id);
                }
            }
        }
        for id in corroborated {
            arena.release(id);
        }
        arena.into_available()
    }

    fn corroborates(&self, p: &Peak, q: &Peak) -> bool {
        if (p.mz - q.mz).abs() <= self.tolerances.duplicate_separation {
            return false;
        }
        let overlap = p.spans_scan_index(q.center_scan_index())
            || q.spans_scan_index(p.center_scan_index());
        if !overlap {
            return false;
        }
        let min_len = self.min_peak_scans + 1;
        let long_enough = p.scan_count() + q.scan_count() >= 2 * min_len;
        let noise = p.median.max(q.median) + p.background.max(q.background);
        let intense_enough = p.intensity + q.intensity > CORRELATION_INTENSITY_FACTOR * noise;
        long_enough || intense_enough
    }
}

/// Strict 2D maxima of the smoothed ridge surface over the 3x3 neighbourhood.
///
/// Ties are broken in raster order so a flat top yields one maximum.
pub fn find_raw_peaks(smoothed: &IntensityGrid, surfaces: &Surfaces<'_>) -> Vec<RawPeak> {
    let nrows = smoothed.nrows();
    let ncols = smoothed.ncols();
    let mut out = Vec::new();
    for s in 0..nrows {
        for b in 0..ncols {
            let v = smoothed.get(s, b);
            if v <= 0.0 || surfaces.excess(s, b) <= 0.0 {
                continue;
            }
            let mut is_max = true;
            'outer: for ds in -1i64..=1 {
                for db in -1i64..=1 {
                    if ds == 0 && db == 0 {
                        continue;
                    }
                    let ns = s as i64 + ds;
                    let nb = b as i64 + db;
                    if ns < 0 || nb < 0 || ns >= nrows as i64 || nb >= ncols as i64 {
                        continue;
                    }
                    let other = smoothed.get(ns as usize, nb as usize);
                    let earlier = ds < 0 || (ds == 0 && db < 0);
                    if (earlier && other > v) || (!earlier && other >= v) {
                        is_max = false;
                        break 'outer;
                    }
                }
            }
            if is_max {
                out.push(RawPeak {
                    scan_index: s,
                    bin: b,
                    intensity: surfaces.intensity.get(s, b),
                });
            }
        }
    }
    out
}

/// Scan extent of the trace through `(scan, bin)`, inclusive.
pub fn walk_extent(surfaces: &Surfaces<'_>, scan: usize, bin: usize) -> (usize, usize) {
    let nrows = surfaces.intensity.nrows();
    let first = walk_direction(surfaces, scan, bin, (0..scan).rev());
    let last = walk_direction(surfaces, scan, bin, scan + 1..nrows);
    (first, last)
}

fn walk_direction(
    surfaces: &Surfaces<'_>,
    start: usize,
    bin: usize,
    steps: impl Iterator<Item = usize>,
) -> usize {
    let mut edge = start;
    let mut lowest = surfaces.excess(start, bin);
    let mut lowest_at = start;
    // The seed may sit below the apex, no valley until the trace has gone down.
    let mut climbing = true;
    for s in steps {
        let excess = surfaces.excess(s, bin);
        if excess <= 0.0 || !surfaces.on_ridge(s, bin) {
            break;
        }
        if excess < lowest {
            lowest = excess;
            lowest_at = s;
            climbing = false;
        } else if climbing {
            lowest = excess;
        } else if excess > VALLEY_RISE * lowest {
            // Second hump, split at the bottom of the valley.
            return lowest_at;
        }
        edge = s;
    }
    edge
}

fn build_peak(
    id: PeakId,
    scans: &[Scan],
    surfaces: &Surfaces<'_>,
    resampler: &SpectrumResampler,
    bin: usize,
    first: usize,
    last: usize,
) -> Peak {
    let grid = surfaces.intensity;
    let apex = (first..=last)
        .max_by(|a, b| {
            grid.get(*a, bin)
                .total_cmp(&grid.get(*b, bin))
                .then(b.cmp(a))
        })
        .unwrap_or(first);

    // Centroid over the neighbouring bins recovers sub-bin m/z.
    let lo = bin.saturating_sub(1);
    let hi = (bin + 1).min(grid.ncols() - 1);
    let (weighted, total) = (lo..=hi).fold((0.0f64, 0.0f64), |(w, t), b| {
        let v = grid.get(apex, b).max(0.0) as f64;
        (w + b as f64 * v, t + v)
    });
    let center_bin = if total > 0.0 { weighted / total } else { bin as f64 };

    let times: Vec<f64> = scans[first..=last]
        .iter()
        .map(|s| s.retention_time)
        .collect();
    let values: Vec<f32> = (first..=last).map(|s| grid.get(s, bin)).collect();

    Peak {
        id,
        mz: resampler.bin_mz(center_bin),
        intensity: grid.get(apex, bin),
        total_intensity: trapezoid(&times, &values),
        scan_index: apex,
        scan_number: scans[apex].scan_number,
        first_scan_index: first,
        last_scan_index: last,
        first_scan_number: scans[first].scan_number,
        last_scan_number: scans[last].scan_number,
        background: surfaces.background.get(apex, bin),
        median: surfaces.median.get(apex, bin),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FeatureFindingConfig;
    use crate::models::MsLevel;

    fn scans(n: usize) -> Vec<Scan> {
        (0..n)
            .map(|i| Scan {
                scan_number: i as u32 + 1,
                retention_time: i as f64 * 2.0,
                ms_level: MsLevel::Ms1,
                precursor: None,
            })
            .collect()
    }

    fn flat_surfaces(grid: &IntensityGrid) -> (IntensityGrid, IntensityGrid, IntensityGrid) {
        let zeros = IntensityGrid::zeros(grid.nrows(), grid.ncols());
        let ridge = ridge_surface(grid, 3);
        (zeros.clone(), zeros, ridge)
    }

    /// One trace on `bin` following `profile` from scan 0.
    fn trace_grid(nbins: usize, bin: usize, profile: &[f32]) -> IntensityGrid {
        let mut grid = IntensityGrid::zeros(profile.len(), nbins);
        for (s, v) in profile.iter().enumerate() {
            grid.set(s, bin, *v);
        }
        grid
    }

    #[test]
    fn test_walk_stops_at_zero_and_valley() {
        let profile = [0.0, 10.0, 50.0, 100.0, 40.0, 10.0, 30.0, 60.0, 20.0, 0.0];
        let grid = trace_grid(30, 15, &profile);
        let (bg, med, ridge) = flat_surfaces(&grid);
        let surfaces = Surfaces {
            intensity: &grid,
            background: &bg,
            median: &med,
            ridge: &ridge,
        };
        assert_eq!(walk_extent(&surfaces, 3, 15), (1, 5));
        assert_eq!(walk_extent(&surfaces, 7, 15), (5, 8));
    }

    #[test]
    fn test_walk_from_off_apex_seed() {
        let profile = [0.0, 50.0, 90.0, 100.0, 90.0, 50.0, 0.0];
        let grid = trace_grid(30, 15, &profile);
        let (bg, med, ridge) = flat_surfaces(&grid);
        let surfaces = Surfaces {
            intensity: &grid,
            background: &bg,
            median: &med,
            ridge: &ridge,
        };
        for seed in 2..=4 {
            assert_eq!(walk_extent(&surfaces, seed, 15), (1, 5), "Seed at {}", seed);
        }

        // Valley above the seed level still splits once past the apex.
        let profile = [0.0, 20.0, 100.0, 60.0, 90.0, 30.0, 0.0];
        let grid = trace_grid(30, 15, &profile);
        let (bg, med, ridge) = flat_surfaces(&grid);
        let surfaces = Surfaces {
            intensity: &grid,
            background: &bg,
            median: &med,
            ridge: &ridge,
        };
        assert_eq!(walk_extent(&surfaces, 1, 15), (1, 3));
    }

    #[test]
    fn test_walk_stops_when_ridge_is_lost() {
        // A broad plateau across m/z is not a ridge.
        let mut grid = IntensityGrid::zeros(5, 30);
        for s in 0..5 {
            grid.set(s, 15, 100.0);
        }
        for b in 5..25 {
            grid.set(0, b, 100.0);
        }
        let (bg, med, ridge) = flat_surfaces(&grid);
        let surfaces = Surfaces {
            intensity: &grid,
            background: &bg,
            median: &med,
            ridge: &ridge,
        };
        assert_eq!(walk_extent(&surfaces, 2, 15), (1, 4));
    }

    #[test]
    fn test_raw_peaks_single_per_plateau() {
        let profile = [0.0, 50.0, 100.0, 100.0, 50.0, 0.0];
        let grid = trace_grid(30, 15, &profile);
        let (bg, med, ridge) = flat_surfaces(&grid);
        let surfaces = Surfaces {
            intensity: &grid,
            background: &bg,
            median: &med,
            ridge: &ridge,
        };
        let raw = find_raw_peaks(&ridge, &surfaces);
        assert_eq!(raw.len(), 1);
        assert_eq!(raw[0].bin, 15);
        // Equal neighbours only block the earlier one.
        assert_eq!(raw[0].scan_index, 3);
    }

    #[test]
    fn test_short_peaks_are_dropped() {
        let config = FeatureFindingConfig::default();
        let extractor = WaveletPeakExtractor::new(config.derived(), 5);
        let resampler = SpectrumResampler::new(TupleRange::try_new(400.0, 401.0).unwrap(), 36, false);
        let profile = [0.0, 0.0, 20.0, 100.0, 20.0, 0.0, 0.0, 0.0];
        let grid = trace_grid(resampler.num_bins(), 10, &profile);
        let (bg, med, ridge) = flat_surfaces(&grid);
        let surfaces = Surfaces {
            intensity: &grid,
            background: &bg,
            median: &med,
            ridge: &ridge,
        };
        let raw = find_raw_peaks(&ridge, &surfaces);
        let peaks = extractor
            .walk_raw_peaks(&scans(8), &surfaces, &resampler, raw, &CancellationToken::new())
            .unwrap();
        assert!(peaks.is_empty());
    }

    #[test]
    fn test_peak_integration_and_position() {
        let resampler = SpectrumResampler::new(TupleRange::try_new(400.0, 401.0).unwrap(), 36, false);
        let profile = [0.0, 10.0, 20.0, 40.0, 20.0, 10.0, 0.0];
        let mut grid = trace_grid(resampler.num_bins(), 10, &profile);
        // Some signal on the next bin pulls the centroid up.
        grid.set(3, 11, 40.0);
        let (bg, med, ridge) = flat_surfaces(&grid);
        let surfaces = Surfaces {
            intensity: &grid,
            background: &bg,
            median: &med,
            ridge: &ridge,
        };
        let peak = build_peak(PeakId(0), &scans(7), &surfaces, &resampler, 10, 1, 5);
        assert_eq!(peak.scan_index, 3);
        assert_eq!(peak.scan_number, 4);
        assert_eq!(peak.intensity, 40.0);
        assert!((peak.mz - (400.0 + 10.5 / 36.0)).abs() < 1e-9);
        // Trapezoid with 2 s spacing: 2 * (10/2 + 20 + 40 + 20 + 10/2)
        assert!((peak.total_intensity - 180.0).abs() < 1e-6);
        assert_eq!(peak.scan_count(), 5);
    }

    fn peak(id: u32, mz: f64, first: usize, last: usize) -> Peak {
        Peak {
            id: PeakId(id),
            mz,
            intensity: 100.0,
            total_intensity: 100.0,
            scan_index: (first + last) / 2,
            scan_number: ((first + last) / 2) as u32,
            first_scan_index: first,
            last_scan_index: last,
            first_scan_number: first as u32,
            last_scan_number: last as u32,
            background: 10.0,
            median: 20.0,
        }
    }

    #[test]
    fn test_correlation_filter() {
        let extractor = WaveletPeakExtractor::new(FeatureFindingConfig::default().derived(), 5);
        let peaks = vec![
            // Isotope pair, long enough together.
            peak(0, 500.0, 10, 20),
            peak(1, 501.0, 11, 19),
            // Same m/z sampled twice, not a corroboration.
            peak(2, 600.0, 10, 20),
            peak(3, 600.01, 10, 20),
            // Isolated.
            peak(4, 700.0, 10, 20),
            // Partner too far in time.
            peak(5, 800.0, 10, 16),
            peak(6, 801.0, 40, 46),
        ];
        let kept: Vec<f64> = extractor
            .correlation_filter(peaks)
            .iter()
            .map(|p| p.mz)
            .collect();
        assert_eq!(kept, vec![500.0, 501.0]);
    }
}
