//! Theoretical isotope envelopes and the distance used to compare them.

/// Daltons per unit of the Poisson mean, averagine-like peptides.
pub const POISSON_MASS_SCALE: f64 = 1800.0;
/// Missing isotope positions are filled with this fraction of the tallest peak.
pub const MISSING_PEAK_FLOOR: f64 = 1e-3;
/// Isotope positions compared for peptides.
pub const ENVELOPE_LEN: usize = 6;
/// Relative abundance of Cl37 to Cl35.
const CHLORINE_37_RATIO: f64 = 0.2423 / 0.7577;

/// Poisson isotope distribution for a neutral mass, normalized over `len` positions.
pub fn poisson_envelope(mass: f64, len: usize) -> Vec<f64> {
    let lambda = (mass / POISSON_MASS_SCALE).max(0.0);
    let mut out = Vec::with_capacity(len);
    let mut term = 1.0;
    for k in 0..len {
        if k > 0 {
            term *= lambda / k as f64;
        }
        out.push(term);
    }
    normalize(&mut out);
    out
}

/// Plain envelope plus one chlorine atom, three positions (M, M+1, M+2).
pub fn chlorine_envelope(mass: f64) -> Vec<f64> {
    let plain = poisson_envelope(mass, 3);
    let mut out = vec![plain[0], plain[1], plain[2] + plain[0] * CHLORINE_37_RATIO];
    normalize(&mut out);
    out
}

pub fn normalize(values: &mut [f64]) {
    let total: f64 = values.iter().sum();
    if total > 0.0 {
        values.iter_mut().for_each(|x| *x /= total);
    }
}

/// Observed intensities per isotope position as proportions.
///
/// Only `None` positions are filled, with a small fraction of the
/// tallest peak, so the distance stays finite. Observed values are kept
/// as they are, however small.
pub fn observed_envelope(intensities: &[Option<f64>]) -> Vec<f64> {
    let max = intensities
        .iter()
        .flatten()
        .fold(0.0f64, |acc, x| acc.max(*x));
    let floor = (max * MISSING_PEAK_FLOOR).max(f64::MIN_POSITIVE);
    let mut out: Vec<f64> = intensities
        .iter()
        .map(|x| x.map_or(floor, |v| v.max(0.0)))
        .collect();
    normalize(&mut out);
    out
}

/// Kullback-Leibler divergence of the observed proportions from the theoretical ones.
///
/// Zero proportions contribute nothing.
pub fn kl_distance(observed: &[f64], theoretical: &[f64]) -> f64 {
    observed
        .iter()
        .zip(theoretical.iter())
        .filter(|(s, _)| **s > 0.0)
        .map(|(s, p)| s * (s / p.max(f64::MIN_POSITIVE)).ln())
        .sum()
}

/// KL against the better of the plain and one-chlorine models, with that model.
pub fn small_molecule_kl(observed: &[f64], mass: f64) -> (f64, Vec<f64>) {
    let plain = poisson_envelope(mass, 3);
    let chlorine = chlorine_envelope(mass);
    let kl_plain = kl_distance(observed, &plain);
    let kl_chlorine = kl_distance(observed, &chlorine);
    if kl_chlorine < kl_plain {
        (kl_chlorine, chlorine)
    } else {
        (kl_plain, plain)
    }
}
