use serde::{
    Deserialize,
    Serialize,
};

/// Index of a peak in the arena of one extraction pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeakId(pub u32);

impl PeakId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// An elution peak at a single m/z, before charge assignment.
///
/// Scan indices refer to the scans handed to the extractor (one
/// window of the run), scan numbers are run-wide.
#[derive(Debug, Clone, PartialEq)]
pub struct Peak {
    pub id: PeakId,
    pub mz: f64,
    /// Grid intensity at the apex.
    pub intensity: f32,
    /// Intensity integrated over retention time across the extent.
    pub total_intensity: f64,
    pub scan_index: usize,
    pub scan_number: u32,
    pub first_scan_index: usize,
    pub last_scan_index: usize,
    pub first_scan_number: u32,
    pub last_scan_number: u32,
    pub background: f32,
    pub median: f32,
}

impl Peak {
    pub fn scan_count(&self) -> usize {
        self.last_scan_index - self.first_scan_index + 1
    }

    pub fn center_scan_index(&self) -> usize {
        (self.first_scan_index + self.last_scan_index) / 2
    }

    pub fn spans_scan_index(&self, scan_index: usize) -> bool {
        self.first_scan_index <= scan_index && scan_index <= self.last_scan_index
    }
}
