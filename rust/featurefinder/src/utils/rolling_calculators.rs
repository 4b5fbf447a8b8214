use arrayvec::ArrayVec;
use tracing::warn;

pub const MAX_WINDOW_SIZE: usize = 256;

/// Keeps the values of a sliding window in sorted order so any
/// quantile can be read in constant time.
///
/// Values are tagged with their position in the input so the one
/// leaving the window can be removed even when it is duplicated.
pub struct RollingQuantileCalculator<T: PartialOrd + Copy + Clone> {
    data: ArrayVec<(T, usize), MAX_WINDOW_SIZE>,
}

impl<T: PartialOrd + Copy + Clone> Default for RollingQuantileCalculator<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: PartialOrd + Copy + Clone> RollingQuantileCalculator<T> {
    pub fn new() -> Self {
        Self {
            data: ArrayVec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Adds a value, returns false (and ignores it) when the window is full.
    pub fn add(&mut self, value: T, position: usize) -> bool {
        if self.data.is_full() {
            return false;
        }
        // Only the new element can be out of place, so one insertion step does it.
        let mut pos = self.data.len();
        while pos > 0 && value < self.data[pos - 1].0 {
            pos -= 1;
        }
        self.data.insert(pos, (value, position));
        true
    }

    pub fn remove(&mut self, position: usize) {
        if let Some(idx) = self.data.iter().position(|x| x.1 == position) {
            self.data.remove(idx);
        }
    }

    /// Value at the requested quantile, `quantile` in [0, 1].
    /// For 0.5 on an even number of elements this is the upper median.
    pub fn quantile(&self, quantile: f32) -> Option<T> {
        if self.data.is_empty() {
            return None;
        }
        let idx = ((self.data.len() as f32) * quantile.clamp(0.0, 1.0)) as usize;
        Some(self.data[idx.min(self.data.len() - 1)].0)
    }

    pub fn median(&self) -> Option<T> {
        self.quantile(0.5)
    }
}

fn clamp_window(window_size: usize) -> usize {
    if window_size > MAX_WINDOW_SIZE {
        warn!(
            "Window size {} is larger than max size {}. Clamping to max size.",
            window_size, MAX_WINDOW_SIZE
        );
        MAX_WINDOW_SIZE
    } else {
        window_size.max(1)
    }
}

/// Centered rolling quantile.
///
/// Every output position sees the `window_size` values centered on it,
/// windows are truncated (not padded) at the edges of the slice, so
/// the output is always defined.
pub fn centered_rolling_quantile_into<T: PartialOrd + Copy + Clone + Default>(
    values: &[T],
    window_size: usize,
    quantile: f32,
    out: &mut Vec<T>,
) {
    out.clear();
    out.resize(values.len(), T::default());
    if values.is_empty() {
        return;
    }
    let window_size = clamp_window(window_size);
    let half = window_size / 2;
    let right_extent = window_size - half - 1;

    let mut rolling = RollingQuantileCalculator::new();
    for (i, v) in values.iter().enumerate().take(right_extent + 1) {
        rolling.add(*v, i);
    }

    for i in 0..values.len() {
        if i > half {
            rolling.remove(i - half - 1);
        }
        if i > 0 {
            let incoming = i + right_extent;
            if incoming < values.len() {
                rolling.add(values[incoming], incoming);
            }
        }
        // Window always holds at least `values[i]`.
        out[i] = rolling.quantile(quantile).unwrap_or(values[i]);
    }
}

pub fn centered_rolling_median_into<T: PartialOrd + Copy + Clone + Default>(
    values: &[T],
    window_size: usize,
    out: &mut Vec<T>,
) {
    centered_rolling_quantile_into(values, window_size, 0.5, out)
}
