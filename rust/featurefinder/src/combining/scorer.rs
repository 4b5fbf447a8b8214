use super::isotopes::{
    ENVELOPE_LEN,
    kl_distance,
    observed_envelope,
    poisson_envelope,
    small_molecule_kl,
};
use crate::models::{
    Feature,
    IsotopePeak,
    Peak,
    PeakId,
};
use crate::utils::constants::{
    CHLORINE_ISOTOPE_SHIFT,
    NEUTRON_MASS,
};
use crate::utils::math::weighted_mean;

/// m/z errors are scaled so 1/6 Da weighs like 1/4 of relative intensity.
const MZ_ERROR_WEIGHT: f64 = 6.0;
const INTENSITY_ERROR_WEIGHT: f64 = 4.0;
/// From the third position on, a peak this much taller than the previous one ends the envelope.
const ANOMALOUS_RISE: f32 = 1.5;
const MAX_CONSECUTIVE_MISSES: usize = 2;
/// A matched isotope counts as real above this fraction of the tallest one.
const REAL_PEAK_FRACTION: f32 = 1.0 / 50.0;
/// ...and above this multiple of the local median.
const REAL_PEAK_MEDIAN_FACTOR: f32 = 2.0;

/// Scores an isotope cluster candidate, lower is better.
///
/// Scoring also fills in the candidate: `comprised` with the matched
/// isotope peaks, a recentred `mz` (and mass), `kl` and `peaks`.
/// `comprised[0]` on entry is the anchor, assumed monoisotopic.
/// `candidates` must be sorted by m/z.
pub trait FeatureScorer: Send + Sync {
    fn score_feature(&self, feature: &mut Feature, candidates: &[&Peak]) -> f64;
}

#[derive(Debug, Clone, Copy)]
struct IsotopeMatch<'a> {
    isotope: usize,
    /// Distance from the monoisotopic m/z this position is expected at.
    shift: f64,
    peak: &'a Peak,
}

/// Closest unmatched candidate within `tolerance` of `expected`.
fn closest_peak<'a>(
    candidates: &[&'a Peak],
    expected: f64,
    tolerance: f64,
    taken: &[PeakId],
) -> Option<&'a Peak> {
    let start = candidates.partition_point(|p| p.mz < expected - tolerance);
    candidates[start..]
        .iter()
        .take_while(|p| p.mz <= expected + tolerance)
        .filter(|p| !taken.contains(&p.id))
        .min_by(|a, b| {
            (a.mz - expected)
                .abs()
                .total_cmp(&(b.mz - expected).abs())
        })
        .copied()
}

fn anchor_peak<'a>(feature: &Feature, candidates: &[&'a Peak]) -> Option<&'a Peak> {
    let id = feature.monoisotopic()?.id;
    candidates.iter().find(|p| p.id == id).copied()
}

/// Writes the matches back into the feature and returns the envelope score.
fn finish_feature(
    feature: &mut Feature,
    matches: &[IsotopeMatch<'_>],
    envelope_len: usize,
    model: impl Fn(&[f64], f64) -> (f64, Vec<f64>),
) -> f64 {
    let mono = weighted_mean(
        matches
            .iter()
            .map(|m| (m.peak.mz - m.shift, m.peak.intensity as f64)),
    )
    .unwrap_or(matches[0].peak.mz);
    feature.set_mz(mono);

    let mut intensities: Vec<Option<f64>> = vec![None; envelope_len];
    let mut mz_errors = vec![0.0; envelope_len];
    for m in matches.iter().filter(|m| m.isotope < envelope_len) {
        intensities[m.isotope] = Some(m.peak.intensity as f64);
        mz_errors[m.isotope] = m.peak.mz - (mono + m.shift);
    }
    let observed = observed_envelope(&intensities);
    let (kl, theoretical) = model(&observed, feature.mass);

    let score = observed
        .iter()
        .zip(theoretical.iter())
        .zip(mz_errors.iter())
        .map(|((s, p), dmz)| {
            (dmz * MZ_ERROR_WEIGHT).powi(2) + ((s - p) * INTENSITY_ERROR_WEIGHT).powi(2)
        })
        .sum::<f64>();

    let tallest = matches
        .iter()
        .map(|m| m.peak.intensity)
        .fold(0.0f32, f32::max);
    feature.peaks = matches
        .iter()
        .filter(|m| {
            m.peak.intensity >= tallest * REAL_PEAK_FRACTION
                && m.peak.intensity >= REAL_PEAK_MEDIAN_FACTOR * m.peak.median
        })
        .count();
    feature.kl = kl;
    feature.comprised = matches
        .iter()
        .map(|m| IsotopePeak {
            id: m.peak.id,
            isotope: m.isotope,
            mz: m.peak.mz,
            intensity: m.peak.intensity,
        })
        .collect();
    score
}

/// Poisson envelope scorer for peptides.
#[derive(Debug, Clone, Copy)]
pub struct DefaultFeatureScorer {
    max_peaks: usize,
    tolerance: f64,
}

impl DefaultFeatureScorer {
    pub fn new(max_peaks: usize, tolerance: f64) -> Self {
        Self {
            max_peaks: max_peaks.max(2),
            tolerance,
        }
    }

    /// Follows the isotope ladder up from the anchor.
    ///
    /// The expected spacing is corrected by the mean offset of the peaks
    /// matched so far, so a small calibration error does not lose the
    /// later isotopes.
    fn walk<'a>(&self, anchor: &'a Peak, spacing: f64, candidates: &[&'a Peak]) -> Vec<IsotopeMatch<'a>> {
        let mut matches = vec![IsotopeMatch {
            isotope: 0,
            shift: 0.0,
            peak: anchor,
        }];
        let mut taken = vec![anchor.id];
        let mut offset_sum = 0.0;
        let mut misses = 0;
        let mut previous = anchor.intensity;

        for i in 1..self.max_peaks {
            let shift = i as f64 * spacing;
            let mean_offset = offset_sum / (matches.len() as f64);
            let expected = anchor.mz + shift + mean_offset;
            match closest_peak(candidates, expected, self.tolerance, &taken) {
                None => {
                    misses += 1;
                    if misses >= MAX_CONSECUTIVE_MISSES {
                        break;
                    }
                }
                Some(peak) => {
                    if i >= 2 && peak.intensity > ANOMALOUS_RISE * previous {
                        break;
                    }
                    misses = 0;
                    offset_sum += peak.mz - (anchor.mz + shift);
                    previous = peak.intensity;
                    taken.push(peak.id);
                    matches.push(IsotopeMatch {
                        isotope: i,
                        shift,
                        peak,
                    });
                }
            }
        }
        matches
    }
}

impl FeatureScorer for DefaultFeatureScorer {
    fn score_feature(&self, feature: &mut Feature, candidates: &[&Peak]) -> f64 {
        let (Some(anchor), Some(spacing)) =
            (anchor_peak(feature, candidates), feature.isotope_spacing())
        else {
            return f64::INFINITY;
        };
        let matches = self.walk(anchor, spacing, candidates);
        finish_feature(feature, &matches, ENVELOPE_LEN, |observed, mass| {
            let theoretical = poisson_envelope(mass, ENVELOPE_LEN);
            (kl_distance(observed, &theoretical), theoretical)
        })
    }
}

/// Three position scorer for small molecules.
///
/// The third position is matched either at two isotope spacings or at
/// the Cl35/Cl37 shift, and the envelope is compared against the better
/// of a plain and a one-chlorine model.
#[derive(Debug, Clone, Copy)]
pub struct SmallMoleculeScorer {
    tolerance: f64,
}

pub const SMALL_MOLECULE_ENVELOPE_LEN: usize = 3;

impl SmallMoleculeScorer {
    pub fn new(tolerance: f64) -> Self {
        Self { tolerance }
    }
}

impl FeatureScorer for SmallMoleculeScorer {
    fn score_feature(&self, feature: &mut Feature, candidates: &[&Peak]) -> f64 {
        let (Some(anchor), Some(charge)) = (
            anchor_peak(feature, candidates),
            (feature.charge > 0).then_some(feature.charge as f64),
        ) else {
            return f64::INFINITY;
        };
        let mut matches = vec![IsotopeMatch {
            isotope: 0,
            shift: 0.0,
            peak: anchor,
        }];
        let mut taken = vec![anchor.id];

        let first_shift = NEUTRON_MASS / charge;
        if let Some(peak) = closest_peak(candidates, anchor.mz + first_shift, self.tolerance, &taken) {
            taken.push(peak.id);
            matches.push(IsotopeMatch {
                isotope: 1,
                shift: first_shift,
                peak,
            });
        }

        let second = [2.0 * NEUTRON_MASS / charge, CHLORINE_ISOTOPE_SHIFT / charge]
            .into_iter()
            .filter_map(|shift| {
                closest_peak(candidates, anchor.mz + shift, self.tolerance, &taken)
                    .map(|peak| (shift, peak))
            })
            .min_by(|a, b| {
                (a.1.mz - anchor.mz - a.0)
                    .abs()
                    .total_cmp(&(b.1.mz - anchor.mz - b.0).abs())
            });
        if let Some((shift, peak)) = second {
            matches.push(IsotopeMatch {
                isotope: 2,
                shift,
                peak,
            });
        }

        finish_feature(feature, &matches, SMALL_MOLECULE_ENVELOPE_LEN, small_molecule_kl)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::combining::isotopes::chlorine_envelope;
    use crate::utils::constants::PROTON_MASS;

    fn peak(id: u32, mz: f64, intensity: f32) -> Peak {
        Peak {
            id: PeakId(id),
            mz,
            intensity,
            total_intensity: intensity as f64,
            scan_index: 10,
            scan_number: 10,
            first_scan_index: 7,
            last_scan_index: 13,
            first_scan_number: 7,
            last_scan_number: 13,
            background: 0.0,
            median: 0.0,
        }
    }

    /// Peaks following the Poisson model exactly.
    fn cluster(mono_mz: f64, charge: u8, n: usize, scale: f32) -> Vec<Peak> {
        let mass = (mono_mz - PROTON_MASS) * charge as f64;
        let env = poisson_envelope(mass, n);
        env.iter()
            .enumerate()
            .map(|(i, p)| {
                peak(
                    i as u32,
                    mono_mz + i as f64 * NEUTRON_MASS / charge as f64,
                    (*p as f32) * scale,
                )
            })
            .collect()
    }

    fn scorer() -> DefaultFeatureScorer {
        DefaultFeatureScorer::new(10, 2.5 / 36.0)
    }

    #[test]
    fn test_perfect_cluster_scores_near_zero() {
        let peaks = cluster(700.3, 2, 6, 1000.0);
        let refs: Vec<&Peak> = peaks.iter().collect();
        let mut feature = Feature::candidate(&peaks[0], 2);
        let score = scorer().score_feature(&mut feature, &refs);
        assert!(score < 1e-6, "Score {}", score);
        assert!(feature.kl.abs() < 1e-6, "kl {}", feature.kl);
        assert_eq!(feature.comprised.len(), 6);
        assert!((feature.mz - 700.3).abs() < 1e-6);
        // The last two isotopes are under 1/50 of the tallest.
        assert_eq!(feature.peaks, 4);
    }

    #[test]
    fn test_two_peak_pair_scores() {
        // Scaled apex intensities of a 100:35 pair after smoothing.
        let peaks = vec![peak(0, 500.25, 80.0), peak(1, 500.752, 28.0)];
        let refs: Vec<&Peak> = peaks.iter().collect();

        let mut z2 = Feature::candidate(&peaks[0], 2);
        let s2 = scorer().score_feature(&mut z2, &refs);
        assert_eq!(z2.comprised.len(), 2);
        assert!((s2 - 0.616).abs() < 0.01, "charge 2 score {}", s2);

        let mut z4 = Feature::candidate(&peaks[0], 4);
        let s4 = scorer().score_feature(&mut z4, &refs);
        assert_eq!(z4.comprised.len(), 2);
        assert_eq!(z4.comprised[1].isotope, 2);
        assert!(s4 > s2 + 0.5, "charge 4 score {}", s4);

        let mut z3 = Feature::candidate(&peaks[0], 3);
        scorer().score_feature(&mut z3, &refs);
        assert_eq!(z3.comprised.len(), 1);
    }

    #[test]
    fn test_walk_stops_on_anomalous_rise() {
        let peaks = vec![
            peak(0, 600.0, 100.0),
            peak(1, 600.0 + NEUTRON_MASS, 60.0),
            peak(2, 600.0 + 2.0 * NEUTRON_MASS, 200.0),
        ];
        let refs: Vec<&Peak> = peaks.iter().collect();
        let mut feature = Feature::candidate(&peaks[0], 1);
        scorer().score_feature(&mut feature, &refs);
        assert_eq!(feature.comprised.len(), 2);
    }

    #[test]
    fn test_walk_tolerates_single_gap_and_drift() {
        let drift = 0.01;
        let peaks = vec![
            peak(0, 600.0, 100.0),
            peak(1, 600.0 + NEUTRON_MASS + drift, 80.0),
            // position 2 missing
            peak(3, 600.0 + 3.0 * NEUTRON_MASS + 2.0 * drift, 20.0),
        ];
        let refs: Vec<&Peak> = peaks.iter().collect();
        let mut feature = Feature::candidate(&peaks[0], 1);
        scorer().score_feature(&mut feature, &refs);
        let isotopes: Vec<usize> = feature.comprised.iter().map(|p| p.isotope).collect();
        assert_eq!(isotopes, vec![0, 1, 3]);
    }

    #[test]
    fn test_missing_anchor_is_rejected() {
        let peaks = vec![peak(0, 600.0, 100.0)];
        let other = peak(5, 300.0, 1.0);
        let refs: Vec<&Peak> = peaks.iter().collect();
        let mut feature = Feature::candidate(&other, 1);
        assert!(scorer().score_feature(&mut feature, &refs).is_infinite());
    }

    #[test]
    fn test_small_molecule_chlorine_pattern() {
        let mono = 250.0;
        let mass = mono - PROTON_MASS;
        let env = chlorine_envelope(mass);
        let peaks = vec![
            peak(0, mono, (env[0] * 1000.0) as f32),
            peak(1, mono + NEUTRON_MASS, (env[1] * 1000.0) as f32),
            peak(2, mono + CHLORINE_ISOTOPE_SHIFT, (env[2] * 1000.0) as f32),
        ];
        let refs: Vec<&Peak> = peaks.iter().collect();
        let mut feature = Feature::candidate(&peaks[0], 1);
        let score = SmallMoleculeScorer::new(2.5 / 36.0).score_feature(&mut feature, &refs);
        assert_eq!(feature.comprised.len(), 3);
        assert!(feature.kl < 1e-4, "kl {}", feature.kl);
        assert!(score < 1e-3, "score {}", score);
    }
}
