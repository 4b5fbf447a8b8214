/// Applies a 1D Gaussian blur in-place.
///
/// Three point kernel (0.25, 0.5, 0.25), edges reflect their own value
/// so the total signal is preserved.
pub fn gaussblur_in_place(x: &mut [f32]) {
    let len = x.len();
    if len < 3 {
        return;
    }
    const W_SIDE: f32 = 0.5;
    const W_CENTER: f32 = 1.0;
    const NORM: f32 = 2.0;

    let mut prev_val = x[0];
    x[0] = (x[0] * 1.5 + x[1] * 0.5) / NORM;

    for i in 1..len - 1 {
        let current_val = x[i];
        x[i] = (prev_val * W_SIDE + current_val * W_CENTER + x[i + 1] * W_SIDE) / NORM;
        prev_val = current_val;
    }
    x[len - 1] = (x[len - 1] * 1.5 + prev_val * 0.5) / NORM;
}

/// Trapezoidal integral of `values` sampled at the (possibly irregular) `times`.
///
/// A single sample has no width, so its integral is 0.
pub fn trapezoid(times: &[f64], values: &[f32]) -> f64 {
    assert_eq!(times.len(), values.len());
    times
        .windows(2)
        .zip(values.windows(2))
        .map(|(t, v)| (t[1] - t[0]) * (v[0] as f64 + v[1] as f64) * 0.5)
        .sum()
}

/// Weighted mean of `(value, weight)` pairs, `None` when the total weight is 0.
pub fn weighted_mean(pairs: impl Iterator<Item = (f64, f64)>) -> Option<f64> {
    let (sum, weight) = pairs.fold((0.0, 0.0), |(s, w), (v, vw)| (s + v * vw, w + vw));
    if weight > 0.0 {
        Some(sum / weight)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gaussblur_preserves_sum() {
        let mut x = vec![0.0, 0.0, 4.0, 0.0, 0.0];
        gaussblur_in_place(&mut x);
        assert_eq!(x, vec![0.0, 1.0, 2.0, 1.0, 0.0]);
        let total: f32 = x.iter().sum();
        assert!((total - 4.0).abs() < 1e-6);
    }

    #[test]
    fn test_trapezoid_irregular_spacing() {
        let times = vec![0.0, 1.0, 3.0];
        let values = vec![0.0, 2.0, 2.0];
        // 1 * (0 + 2) / 2 + 2 * (2 + 2) / 2
        assert!((trapezoid(&times, &values) - 5.0).abs() < 1e-9);
        assert_eq!(trapezoid(&[1.0], &[10.0]), 0.0);
    }

    #[test]
    fn test_weighted_mean() {
        let out = weighted_mean([(1.0, 1.0), (3.0, 3.0)].into_iter()).unwrap();
        assert!((out - 2.5).abs() < 1e-12);
        assert!(weighted_mean([(1.0, 0.0)].into_iter()).is_none());
    }
}
