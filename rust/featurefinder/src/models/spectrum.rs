use serde::{
    Deserialize,
    Serialize,
};

use crate::errors::DataProcessingError;
use crate::utils::{
    TupleRange,
    binary_search_range_by_f64_key,
};

/// One decoded mass spectrum, m/z ascending.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Spectrum {
    mz: Vec<f64>,
    intensity: Vec<f32>,
}

impl Spectrum {
    /// Checks lengths match, values are finite and m/z is sorted.
    ///
    /// `scan_number` is only used to label the error.
    pub fn try_new(
        mz: Vec<f64>,
        intensity: Vec<f32>,
        scan_number: u32,
    ) -> Result<Self, DataProcessingError> {
        if mz.len() != intensity.len() {
            return Err(DataProcessingError::ExpectedSlicesSameLength {
                expected: mz.len(),
                other: intensity.len(),
                context: format!("mz and intensity arrays of scan {}", scan_number),
            });
        }
        if mz.iter().any(|x| !x.is_finite()) || intensity.iter().any(|x| !x.is_finite()) {
            return Err(DataProcessingError::ExpectedFiniteNonNanData {
                context: format!("spectrum of scan {}", scan_number),
            });
        }
        if mz.windows(2).any(|w| w[0] > w[1]) {
            return Err(DataProcessingError::UnsortedSpectrum { scan_number });
        }
        Ok(Self { mz, intensity })
    }

    /// Sorts the pairs by m/z before validating.
    pub fn from_unsorted(
        pairs: impl IntoIterator<Item = (f64, f32)>,
        scan_number: u32,
    ) -> Result<Self, DataProcessingError> {
        let mut pairs: Vec<(f64, f32)> = pairs.into_iter().collect();
        pairs.sort_by(|a, b| a.0.total_cmp(&b.0));
        let (mz, intensity) = pairs.into_iter().unzip();
        Self::try_new(mz, intensity, scan_number)
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.mz.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mz.is_empty()
    }

    pub fn mz(&self) -> &[f64] {
        &self.mz
    }

    pub fn intensity(&self) -> &[f32] {
        &self.intensity
    }

    pub fn iter(&self) -> impl Iterator<Item = (f64, f32)> + '_ {
        self.mz.iter().copied().zip(self.intensity.iter().copied())
    }

    pub fn total_intensity(&self) -> f64 {
        self.intensity.iter().map(|x| *x as f64).sum()
    }

    pub fn mz_bounds(&self) -> Option<(f64, f64)> {
        Some((*self.mz.first()?, *self.mz.last()?))
    }

    /// Points with m/z inside the closed range.
    pub fn mz_window(&self, range: TupleRange<f64>) -> (&[f64], &[f32]) {
        let idx = binary_search_range_by_f64_key(&self.mz, range, |x| *x);
        (&self.mz[idx.clone()], &self.intensity[idx])
    }

    /// Tallest point inside the range.
    pub fn largest_in(&self, range: TupleRange<f64>) -> Option<(f64, f32)> {
        let (mzs, ints) = self.mz_window(range);
        mzs.iter()
            .zip(ints.iter())
            .filter(|(_, i)| **i > 0.0)
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(mz, i)| (*mz, *i))
    }

    /// Intensity weighted m/z and summed intensity inside the range.
    pub fn centroid_in(&self, range: TupleRange<f64>) -> Option<(f64, f64)> {
        let (mzs, ints) = self.mz_window(range);
        let (weighted, total) = mzs
            .iter()
            .zip(ints.iter())
            .fold((0.0, 0.0), |(w, t), (mz, i)| {
                (w + mz * (*i as f64), t + *i as f64)
            });
        if total > 0.0 {
            Some((weighted / total, total))
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_bad_arrays() {
        assert!(matches!(
            Spectrum::try_new(vec![1.0, 2.0], vec![1.0], 7),
            Err(DataProcessingError::ExpectedSlicesSameLength { .. })
        ));
        assert!(matches!(
            Spectrum::try_new(vec![2.0, 1.0], vec![1.0, 1.0], 7),
            Err(DataProcessingError::UnsortedSpectrum { scan_number: 7 })
        ));
        assert!(Spectrum::try_new(vec![1.0], vec![f32::NAN], 7).is_err());
    }

    #[test]
    fn test_window_queries() {
        let spec =
            Spectrum::from_unsorted(vec![(502.0, 5.0), (500.0, 1.0), (501.0, 3.0)], 1).unwrap();
        assert_eq!(spec.mz(), &[500.0, 501.0, 502.0]);
        assert_eq!(spec.total_intensity(), 9.0);

        let range = TupleRange::try_new(500.5, 502.5).unwrap();
        let (mzs, ints) = spec.mz_window(range);
        assert_eq!(mzs, &[501.0, 502.0]);
        assert_eq!(ints, &[3.0, 5.0]);
        assert_eq!(spec.largest_in(range), Some((502.0, 5.0)));

        let (mz, total) = spec.centroid_in(range).unwrap();
        assert!((mz - (501.0 * 3.0 + 502.0 * 5.0) / 8.0).abs() < 1e-9);
        assert_eq!(total, 8.0);

        let nothing = TupleRange::try_new(600.0, 601.0).unwrap();
        assert!(spec.largest_in(nothing).is_none());
        assert!(spec.centroid_in(nothing).is_none());
    }
}
