use rayon::prelude::*;

use crate::errors::DataProcessingError;

/// Dense scan x m/z surface.
///
/// Rows are scans (time), columns are m/z bins. Values that belong to
/// the same scan are adjacent in memory, so per-spectrum passes work on
/// contiguous slices and per-bin (chromatogram) passes go through
/// [`IntensityGrid::column_apply`].
#[derive(Debug, Clone, PartialEq)]
pub struct IntensityGrid {
    values: Vec<f32>,
    nrows: usize,
    ncols: usize,
}

impl IntensityGrid {
    pub fn zeros(nrows: usize, ncols: usize) -> Self {
        Self {
            values: vec![0.0; nrows * ncols],
            nrows,
            ncols,
        }
    }

    pub fn from_flat_vector(
        values: Vec<f32>,
        nrows: usize,
        ncols: usize,
    ) -> Result<Self, DataProcessingError> {
        if values.len() != nrows * ncols {
            return Err(DataProcessingError::ExpectedSlicesSameLength {
                expected: nrows * ncols,
                other: values.len(),
                context: "flat grid values vs nrows * ncols".into(),
            });
        }
        Ok(Self {
            values,
            nrows,
            ncols,
        })
    }

    /// Builds from per-scan rows, all rows must have the same length.
    pub fn from_rows<S: AsRef<[f32]>>(rows: &[S]) -> Result<Self, DataProcessingError> {
        let nrows = rows.len();
        let ncols = rows.first().map(|r| r.as_ref().len()).unwrap_or(0);
        let mut values = Vec::with_capacity(nrows * ncols);
        for row in rows {
            let row = row.as_ref();
            if row.len() != ncols {
                return Err(DataProcessingError::ExpectedSlicesSameLength {
                    expected: ncols,
                    other: row.len(),
                    context: "grid rows".into(),
                });
            }
            values.extend_from_slice(row);
        }
        Ok(Self {
            values,
            nrows,
            ncols,
        })
    }

    pub fn nrows(&self) -> usize {
        self.nrows
    }

    pub fn ncols(&self) -> usize {
        self.ncols
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    #[inline]
    pub fn get(&self, row: usize, col: usize) -> f32 {
        self.values[row * self.ncols + col]
    }

    #[inline]
    pub fn set(&mut self, row: usize, col: usize, value: f32) {
        self.values[row * self.ncols + col] = value;
    }

    pub fn row(&self, row: usize) -> &[f32] {
        let start = row * self.ncols;
        &self.values[start..start + self.ncols]
    }

    pub fn row_mut(&mut self, row: usize) -> &mut [f32] {
        let start = row * self.ncols;
        &mut self.values[start..start + self.ncols]
    }

    pub fn iter_rows(&self) -> impl Iterator<Item = &[f32]> {
        // `max(1)` keeps chunks valid for zero width grids.
        self.values.chunks(self.ncols.max(1))
    }

    pub fn par_rows_mut(&mut self) -> impl IndexedParallelIterator<Item = &mut [f32]> {
        self.values.par_chunks_mut(self.ncols.max(1))
    }

    pub fn column_into(&self, col: usize, out: &mut Vec<f32>) {
        out.clear();
        out.extend((0..self.nrows).map(|r| self.get(r, col)));
    }

    /// Applies `f` to every column in place, in parallel.
    ///
    /// Columns are strided in memory, so each is copied out, transformed
    /// and written back. Scratch buffers are reused per rayon worker.
    pub fn column_apply<F>(&mut self, f: F)
    where
        F: Fn(&mut Vec<f32>) + Sync + Send,
    {
        let nrows = self.nrows;
        let ncols = self.ncols;
        let src = &self.values;
        let columns: Vec<Vec<f32>> = (0..ncols)
            .into_par_iter()
            .map_init(Vec::new, |buf, col| {
                buf.clear();
                buf.extend((0..nrows).map(|r| src[r * ncols + col]));
                f(buf);
                buf.clone()
            })
            .collect();
        for (col, values) in columns.into_iter().enumerate() {
            for (row, v) in values.into_iter().enumerate().take(nrows) {
                self.values[row * ncols + col] = v;
            }
        }
    }

    pub fn map_inplace(&mut self, f: impl Fn(f32) -> f32 + Sync + Send) {
        self.values.par_iter_mut().for_each(|x| *x = f(*x));
    }

    /// Element-wise combination with a grid of the same shape.
    pub fn zip_map_inplace(
        &mut self,
        other: &IntensityGrid,
        f: impl Fn(f32, f32) -> f32 + Sync + Send,
    ) -> Result<(), DataProcessingError> {
        if other.values.len() != self.values.len() {
            return Err(DataProcessingError::ExpectedSlicesSameLength {
                expected: self.values.len(),
                other: other.values.len(),
                context: "zipped grids".into(),
            });
        }
        self.values
            .par_iter_mut()
            .zip(other.values.par_iter())
            .for_each(|(a, b)| *a = f(*a, *b));
        Ok(())
    }

    pub fn sum(&self) -> f64 {
        self.values.iter().map(|x| *x as f64).sum()
    }
}
