//! Undecimated ("a trous") wavelet transforms on 1D signals.
//!
//! Level `j` smooths level `j - 1` with the (1/4, 1/2, 1/4) kernel dilated
//! to a step of `2^(j - 1)` samples. Edges are clamped.

use rayon::prelude::*;

use crate::models::IntensityGrid;
use crate::utils::rolling_calculators::RollingQuantileCalculator;

/// MAD to standard deviation for gaussian noise.
const MAD_TO_SIGMA: f32 = 0.6745;

/// One smoothing step of the a trous transform.
pub fn atrous_smooth_into(input: &[f32], step: usize, out: &mut Vec<f32>) {
    out.clear();
    let n = input.len();
    if n == 0 {
        return;
    }
    let last = n - 1;
    out.extend((0..n).map(|k| {
        let left = input[k.saturating_sub(step)];
        let right = input[(k + step).min(last)];
        0.25 * left + 0.5 * input[k] + 0.25 * right
    }));
}

/// Band-pass "ridge" response, first approximation minus the `level`-th.
///
/// Narrow peaks (a few samples wide) come out positive and sharpened,
/// slow trends cancel.
pub fn ridge_into(input: &[f32], level: u32, out: &mut Vec<f32>, scratch: &mut Vec<f32>) {
    atrous_smooth_into(input, 1, out);
    let first = out.clone();
    for j in 2..=level.max(1) {
        let step = 1usize << (j - 1);
        atrous_smooth_into(out, step, scratch);
        std::mem::swap(out, scratch);
    }
    for (o, f) in out.iter_mut().zip(first.iter()) {
        *o = *f - *o;
    }
}

fn soft_threshold(x: f32, t: f32) -> f32 {
    if x > t {
        x - t
    } else if x < -t {
        x + t
    } else {
        0.0
    }
}

/// Wavelet denoising, two detail levels soft thresholded at the
/// universal threshold estimated from the finest level.
pub fn denoise_in_place(values: &mut [f32]) {
    let n = values.len();
    if n < 3 {
        return;
    }
    let mut c1 = Vec::with_capacity(n);
    let mut c2 = Vec::with_capacity(n);
    atrous_smooth_into(values, 1, &mut c1);
    atrous_smooth_into(&c1, 2, &mut c2);

    let mut mad = RollingQuantileCalculator::new();
    let sample_step = n.div_ceil(256).max(1);
    for (i, (v, c)) in values.iter().zip(c1.iter()).enumerate().step_by(sample_step) {
        mad.add((v - c).abs(), i);
    }
    let sigma = mad.median().unwrap_or(0.0) / MAD_TO_SIGMA;
    let t = sigma * (2.0 * (n as f32).ln()).sqrt();
    if t <= 0.0 {
        return;
    }
    for i in 0..n {
        let w1 = values[i] - c1[i];
        let w2 = c1[i] - c2[i];
        values[i] = c2[i] + soft_threshold(w1, t) + soft_threshold(w2, t);
    }
}

/// Ridge response of every scan (row) of the grid.
#[cfg_attr(
    feature = "instrumentation",
    tracing::instrument(skip_all, level = "trace")
)]
pub fn ridge_surface(grid: &IntensityGrid, level: u32) -> IntensityGrid {
    let mut out = grid.clone();
    out.par_rows_mut()
        .for_each_init(|| (Vec::new(), Vec::new()), |(buf, scratch), row| {
            ridge_into(row, level, buf, scratch);
            row.copy_from_slice(buf);
        });
    out
}

/// Denoises every bin (column) of the surface along time.
pub fn smooth_along_time(surface: &mut IntensityGrid) {
    surface.column_apply(|col| denoise_in_place(col));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_atrous_step() {
        let mut out = Vec::new();
        atrous_smooth_into(&[0.0, 0.0, 4.0, 0.0, 0.0], 2, &mut out);
        assert_eq!(out, vec![1.0, 0.0, 2.0, 0.0, 1.0]);
    }

    #[test]
    fn test_ridge_of_spike() {
        let mut signal = vec![0.0f32; 31];
        signal[15] = 1.0;
        let mut out = Vec::new();
        let mut scratch = Vec::new();
        ridge_into(&signal, 3, &mut out, &mut scratch);
        assert!((out[15] - 0.375).abs() < 1e-6);
        assert!((out[14] - 0.140625).abs() < 1e-6);
        assert!((out[16] - 0.140625).abs() < 1e-6);
        assert!((out[17] + 0.09375).abs() < 1e-6);
        assert!(out[23].abs() < 1e-6);
        let argmax = out
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .unwrap()
            .0;
        assert_eq!(argmax, 15);
    }

    #[test]
    fn test_ridge_cancels_flat_signal() {
        let signal = vec![5.0f32; 20];
        let mut out = Vec::new();
        let mut scratch = Vec::new();
        ridge_into(&signal, 3, &mut out, &mut scratch);
        assert!(out.iter().all(|x| x.abs() < 1e-5));
    }

    #[test]
    fn test_denoise_keeps_clean_signal() {
        let mut signal = vec![0.0f32; 20];
        signal[9] = 0.6;
        signal[10] = 1.0;
        signal[11] = 0.6;
        let before = signal.clone();
        denoise_in_place(&mut signal);
        assert_eq!(signal, before);
    }

    #[test]
    fn test_denoise_shrinks_noise() {
        // Alternating noise around a smooth bump.
        let mut signal: Vec<f32> = (0..64)
            .map(|i| {
                let bump = 10.0 * (-((i as f32 - 32.0) / 6.0).powi(2)).exp();
                let noise = if i % 2 == 0 { 0.5 } else { -0.5 };
                bump + noise
            })
            .collect();
        let noisy_roughness: f32 = signal.windows(2).map(|w| (w[1] - w[0]).abs()).sum();
        denoise_in_place(&mut signal);
        let roughness: f32 = signal.windows(2).map(|w| (w[1] - w[0]).abs()).sum();
        assert!(roughness < noisy_roughness, "{} vs {}", roughness, noisy_roughness);
    }
}
