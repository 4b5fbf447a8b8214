//! Isotope cluster assembly.
//!
//! Peaks are visited tallest first. Each unconsumed seed collects its
//! neighbourhood, every plausible (anchor, charge) interpretation is
//! scored, the best one becomes a feature and its peaks are consumed.

pub mod default;
pub mod isotopes;
pub mod scorer;
pub mod small_molecule;

use tracing::debug;

pub use default::DefaultPeakCombiner;
pub use scorer::{
    DefaultFeatureScorer,
    FeatureScorer,
    SmallMoleculeScorer,
};
pub use small_molecule::SmallMoleculePeakCombiner;

use crate::cancellation::CancellationToken;
use crate::config::{
    CombinerKind,
    FeatureFindingConfig,
};
use crate::errors::Result;
use crate::models::{
    Feature,
    Peak,
    Run,
};
use crate::spatial::{
    PeakArena,
    PeakIndex,
};
use crate::utils::TupleRange;
use crate::utils::constants::NEUTRON_MASS;

/// Candidates scoring worse than the best by more than this are dropped.
const SCORE_MARGIN: f64 = 0.5;
/// A subsumed lower charge candidate survives with at least this many real peaks.
const SUBSUMED_MIN_PEAKS: usize = 6;
/// Peaks closer than this in m/z are the same peak seen in another scan.
const SAME_MZ_EPSILON: f64 = 1e-6;

/// Turns single-trace peaks into charge resolved features.
pub trait PeakCombiner: Send + Sync {
    fn name(&self) -> &'static str;

    fn create_features(
        &self,
        run: &Run,
        peaks: Vec<Peak>,
        token: &CancellationToken,
    ) -> Result<Vec<Feature>>;
}

pub fn combiner_for(config: &FeatureFindingConfig) -> Box<dyn PeakCombiner> {
    match config.combiner {
        CombinerKind::Default => Box::new(DefaultPeakCombiner::from_config(config)),
        CombinerKind::SmallMolecule => Box::new(SmallMoleculePeakCombiner::from_config(config)),
    }
}

/// Search ranges shared by the combiner strategies.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchParams {
    pub min_charge: u8,
    pub max_charge: u8,
    /// Scans on either side of the seed apex.
    pub scan_window: usize,
    pub max_peaks: usize,
    pub isotope_tolerance: f64,
    /// How many isotopes below the seed the monoisotopic peak may sit.
    pub isotopes_below: usize,
}

#[derive(Debug, Clone)]
struct Candidate {
    feature: Feature,
    score: f64,
}

/// The seed loop, common to every strategy.
pub(crate) fn combine_peaks(
    run: &Run,
    peaks: Vec<Peak>,
    params: &SearchParams,
    scorer: &dyn FeatureScorer,
    token: &CancellationToken,
) -> Result<Vec<Feature>> {
    let mut arena = PeakArena::new(peaks);
    let index = PeakIndex::new(&arena);
    let max_scan = arena
        .peaks()
        .iter()
        .map(|p| p.last_scan_index)
        .max()
        .unwrap_or(0);
    let min_spacing = NEUTRON_MASS / params.min_charge.max(1) as f64;

    let mut features = Vec::new();
    let mut single_peak = 0;
    for seed_id in arena.ids_by_intensity_desc() {
        token.check()?;
        if arena.is_consumed(seed_id) {
            continue;
        }
        let seed = arena.get(seed_id);
        let mz_range = TupleRange::spanning(
            seed.mz - params.isotopes_below as f64 * min_spacing - params.isotope_tolerance,
            seed.mz + params.max_peaks as f64 * min_spacing + params.isotope_tolerance,
        );
        let scan_range = TupleRange::around_clamped(seed.scan_index, params.scan_window, max_scan);
        let neighbours = dedup_same_mz(index.query_available(&arena, mz_range, scan_range), seed);

        let candidates = score_candidates(seed, &neighbours, params, scorer);
        let winner = match select_best(candidates) {
            Some(f) => f,
            None => {
                single_peak += 1;
                Feature::from_peak(seed)
            }
        };
        let feature = finalize(run, &arena, seed, winner);
        for p in &feature.comprised {
            arena.consume(p.id);
        }
        arena.consume(seed_id);
        features.push(feature);
    }
    debug!(
        "Combined {} peaks into {} features ({} single peak)",
        arena.len(),
        features.len(),
        single_peak
    );
    Ok(features)
}

/// Sorted by m/z, one peak per m/z value, the one closest in scan to the seed.
fn dedup_same_mz<'a>(neighbours: impl Iterator<Item = &'a Peak>, seed: &Peak) -> Vec<&'a Peak> {
    let mut out: Vec<&Peak> = Vec::new();
    for p in neighbours {
        match out.last_mut() {
            Some(last) if (p.mz - last.mz).abs() < SAME_MZ_EPSILON => {
                if p.scan_index.abs_diff(seed.scan_index) < last.scan_index.abs_diff(seed.scan_index) {
                    *last = p;
                }
            }
            _ => out.push(p),
        }
    }
    out
}

/// Every (anchor, charge) reading that puts the seed on the isotope ladder.
fn score_candidates(
    seed: &Peak,
    neighbours: &[&Peak],
    params: &SearchParams,
    scorer: &dyn FeatureScorer,
) -> Vec<Candidate> {
    let mut out = Vec::new();
    for anchor in neighbours.iter().filter(|p| p.mz <= seed.mz) {
        let distance = seed.mz - anchor.mz;
        for charge in (params.min_charge..=params.max_charge).rev() {
            let spacing = NEUTRON_MASS / charge as f64;
            let steps = (distance / spacing).round();
            if anchor.id != seed.id && steps < 1.0 {
                continue;
            }
            if steps as usize >= params.max_peaks {
                continue;
            }
            if (distance - steps * spacing).abs() > params.isotope_tolerance {
                continue;
            }
            let mut feature = Feature::candidate(anchor, charge);
            let score = scorer.score_feature(&mut feature, neighbours);
            if score.is_finite() && feature.comprised.len() > 1 && feature.contains_peak(seed.id) {
                out.push(Candidate { feature, score });
            }
        }
    }
    out
}

/// Picks one interpretation out of the scored candidates.
fn select_best(mut candidates: Vec<Candidate>) -> Option<Feature> {
    let best = candidates
        .iter()
        .map(|c| c.score)
        .min_by(|a, b| a.total_cmp(b))?;
    candidates.retain(|c| c.score <= best + SCORE_MARGIN);
    candidates.sort_by(|a, b| {
        a.feature
            .mz
            .total_cmp(&b.feature.mz)
            .then(b.feature.charge.cmp(&a.feature.charge))
    });

    // A lower charge reading whose monoisotopic peak is already explained
    // by a multiple of its charge is the same cluster seen at half resolution.
    let n = candidates.len();
    let mut keep = vec![true; n];
    for i in 0..n {
        for j in 0..n {
            if i == j || !keep[i] || !keep[j] {
                continue;
            }
            let a = &candidates[i].feature;
            let b = &candidates[j].feature;
            let multiple = a.charge > b.charge && a.charge % b.charge == 0;
            let first_in_a = b.monoisotopic().is_some_and(|p| a.contains_peak(p.id));
            let b_has_more = b.peaks >= SUBSUMED_MIN_PEAKS && b.peaks > a.peaks;
            if multiple && first_in_a && !b_has_more {
                keep[j] = false;
            }
        }
    }

    candidates
        .into_iter()
        .zip(keep)
        .filter_map(|(c, k)| k.then_some(c.feature))
        .reduce(|best, f| {
            if secondary_score(&f) > secondary_score(&best) {
                f
            } else {
                best
            }
        })
}

fn secondary_score(feature: &Feature) -> f64 {
    feature.peaks as f64 * 0.1 - feature.kl
}

/// Seed scan, time from the run and intensities summed over the cluster.
fn finalize(run: &Run, arena: &PeakArena, seed: &Peak, mut feature: Feature) -> Feature {
    feature.scan = seed.scan_number;
    feature.time = run
        .retention_time_for_scan_number(seed.scan_number)
        .unwrap_or_default();
    feature.first_scan = seed.first_scan_number;
    feature.last_scan = seed.last_scan_number;
    feature.scan_count = seed.scan_count();
    feature.background = seed.background;
    feature.median = seed.median;
    feature.intensity = feature
        .comprised
        .iter()
        .map(|p| p.intensity)
        .fold(seed.intensity, f32::max);
    feature.total_intensity = feature
        .comprised
        .iter()
        .map(|p| arena.get(p.id).total_intensity)
        .sum();
    feature
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::models::{
        MsLevel,
        PeakId,
        Scan,
        ScanRecord,
    };
    use crate::combining::isotopes::poisson_envelope;
    use crate::utils::constants::PROTON_MASS;
    use std::collections::HashSet;

    pub(crate) fn run_with_scans(n: u32) -> Run {
        let records = (1..=n)
            .map(|i| ScanRecord {
                header: Scan {
                    scan_number: i,
                    retention_time: i as f64 * 3.0,
                    ms_level: MsLevel::Ms1,
                    precursor: None,
                },
                mz: vec![100.0, 2000.0],
                intensity: vec![1.0, 1.0],
            })
            .collect();
        Run::from_records("synthetic", records, true, 16, 0).unwrap()
    }

    pub(crate) fn peak(mz: f64, scan_index: usize, intensity: f32) -> Peak {
        Peak {
            id: PeakId(0),
            mz,
            intensity,
            total_intensity: intensity as f64 * 10.0,
            scan_index,
            scan_number: scan_index as u32 + 1,
            first_scan_index: scan_index.saturating_sub(3),
            last_scan_index: scan_index + 3,
            first_scan_number: scan_index.saturating_sub(3) as u32 + 1,
            last_scan_number: scan_index as u32 + 4,
            background: 0.0,
            median: 0.0,
        }
    }

    pub(crate) fn poisson_cluster(mono_mz: f64, charge: u8, n: usize, scale: f32, scan_index: usize) -> Vec<Peak> {
        let mass = (mono_mz - PROTON_MASS) * charge as f64;
        poisson_envelope(mass, n)
            .iter()
            .enumerate()
            .map(|(i, p)| {
                peak(
                    mono_mz + i as f64 * NEUTRON_MASS / charge as f64,
                    scan_index,
                    *p as f32 * scale,
                )
            })
            .collect()
    }

    fn default_combiner() -> DefaultPeakCombiner {
        DefaultPeakCombiner::from_config(&FeatureFindingConfig::default())
    }

    #[test]
    fn test_charge_inference() {
        let mut peaks = Vec::new();
        peaks.extend(poisson_cluster(800.4, 1, 6, 1000.0, 10));
        peaks.extend(poisson_cluster(700.3, 2, 6, 1000.0, 12));
        peaks.extend(poisson_cluster(600.3, 3, 6, 1000.0, 14));
        let run = run_with_scans(30);
        let features = default_combiner()
            .create_features(&run, peaks, &CancellationToken::new())
            .unwrap();
        assert_eq!(features.len(), 3, "Got {:#?}", features);

        for (mz, charge) in [(800.4, 1), (700.3, 2), (600.3, 3)] {
            let f = features
                .iter()
                .find(|f| (f.mz - mz).abs() < 0.01)
                .unwrap_or_else(|| panic!("No feature at {}", mz));
            assert_eq!(f.charge, charge, "Wrong charge at {}", mz);
            assert_eq!(f.comprised.len(), 6);
            assert!(f.kl < 1e-4);
        }
    }

    #[test]
    fn test_peaks_are_never_shared() {
        // Two overlapping clusters plus loose peaks.
        let mut peaks = Vec::new();
        peaks.extend(poisson_cluster(500.0, 2, 5, 800.0, 10));
        peaks.extend(poisson_cluster(500.5, 1, 4, 300.0, 11));
        peaks.push(peak(503.0, 30, 50.0));
        peaks.push(peak(499.2, 9, 20.0));
        let n = peaks.len();
        let run = run_with_scans(40);
        let features = default_combiner()
            .create_features(&run, peaks, &CancellationToken::new())
            .unwrap();

        let mut seen = HashSet::new();
        for f in &features {
            for p in &f.comprised {
                assert!(seen.insert(p.id), "Peak {:?} used twice", p.id);
            }
        }
        // Every input peak ends up somewhere.
        assert_eq!(seen.len(), n);
    }

    #[test]
    fn test_lonely_seed_becomes_charge_zero() {
        let run = run_with_scans(20);
        let features = default_combiner()
            .create_features(&run, vec![peak(650.0, 5, 100.0)], &CancellationToken::new())
            .unwrap();
        assert_eq!(features.len(), 1);
        let f = &features[0];
        assert_eq!(f.charge, 0);
        assert_eq!(f.comprised.len(), 1);
        assert_eq!(f.scan, 6);
        assert_eq!(f.time, 18.0);
        assert_eq!(f.mass, 0.0);
    }

    #[test]
    fn test_duplicate_mz_keeps_closest_scan() {
        let seed = peak(500.0, 10, 100.0);
        let far = Peak { id: PeakId(1), ..peak(501.0, 2, 10.0) };
        let near = Peak { id: PeakId(2), ..peak(501.0, 9, 10.0) };
        let out = dedup_same_mz([&seed, &far, &near].into_iter(), &seed);
        assert_eq!(out.len(), 2);
        assert_eq!(out[1].id, PeakId(2));
    }

    #[test]
    fn test_cancellation_propagates() {
        let token = CancellationToken::new();
        token.cancel();
        let run = run_with_scans(20);
        let err = default_combiner()
            .create_features(&run, poisson_cluster(700.3, 2, 4, 100.0, 5), &token)
            .unwrap_err();
        assert!(err.is_cancelled());
    }
}
