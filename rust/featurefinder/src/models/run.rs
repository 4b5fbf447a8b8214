use serde::{
    Deserialize,
    Serialize,
};
use std::sync::Arc;

use crate::errors::{
    DataProcessingError,
    Result,
    SpectrumReadError,
};
use crate::models::Spectrum;
use crate::spectra::{
    InMemorySpectra,
    SpectrumSource,
    SpectrumStore,
};
use crate::utils::TupleRange;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum MsLevel {
    Ms1,
    Ms2,
    Ms3,
}

impl TryFrom<u8> for MsLevel {
    type Error = String;

    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        match value {
            1 => Ok(MsLevel::Ms1),
            2 => Ok(MsLevel::Ms2),
            3 => Ok(MsLevel::Ms3),
            other => Err(format!("Unsupported MS level {}", other)),
        }
    }
}

impl From<MsLevel> for u8 {
    fn from(value: MsLevel) -> Self {
        match value {
            MsLevel::Ms1 => 1,
            MsLevel::Ms2 => 2,
            MsLevel::Ms3 => 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Precursor {
    pub mz: f64,
    pub charge: Option<u8>,
}

/// Scan header, the peaks live in the run's [`SpectrumStore`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scan {
    pub scan_number: u32,
    /// Seconds.
    pub retention_time: f64,
    pub ms_level: MsLevel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub precursor: Option<Precursor>,
}

/// Header plus peak arrays, the interchange form used for run files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanRecord {
    #[serde(flatten)]
    pub header: Scan,
    pub mz: Vec<f64>,
    pub intensity: Vec<f32>,
}

/// On-disk JSON representation of a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunFile {
    pub name: String,
    #[serde(default)]
    pub centroided: bool,
    pub scans: Vec<ScanRecord>,
}

impl RunFile {
    pub fn into_run(self, cache_size: usize, read_retries: usize) -> Result<Run> {
        Run::from_records(self.name, self.scans, self.centroided, cache_size, read_retries)
    }
}

/// An LC-MS run. Headers are read-only once built, spectra are decoded
/// lazily through the store.
#[derive(Debug)]
pub struct Run {
    name: String,
    ms1: Vec<Scan>,
    msn: Vec<Scan>,
    mz_range: TupleRange<f64>,
    centroided: bool,
    store: SpectrumStore,
}

impl Run {
    /// Scans are split by MS level and ordered by scan number.
    pub fn new(
        name: impl Into<String>,
        scans: Vec<Scan>,
        mz_range: TupleRange<f64>,
        centroided: bool,
        store: SpectrumStore,
    ) -> Self {
        let (mut ms1, mut msn): (Vec<Scan>, Vec<Scan>) = scans
            .into_iter()
            .partition(|s| s.ms_level == MsLevel::Ms1);
        ms1.sort_by_key(|s| s.scan_number);
        msn.sort_by_key(|s| s.scan_number);
        Self {
            name: name.into(),
            ms1,
            msn,
            mz_range,
            centroided,
            store,
        }
    }

    /// Builds an in-memory run, the m/z range spans every MS1 peak.
    pub fn from_records(
        name: impl Into<String>,
        records: Vec<ScanRecord>,
        centroided: bool,
        cache_size: usize,
        read_retries: usize,
    ) -> Result<Self> {
        let name = name.into();
        let mut headers = Vec::with_capacity(records.len());
        let mut spectra = InMemorySpectra::new();
        let mut bounds: Option<(f64, f64)> = None;

        for rec in records {
            let spectrum = Spectrum::try_new(rec.mz, rec.intensity, rec.header.scan_number)
                .map_err(|e| e.append_to_context(&format!(" in run {}", name)))?;
            if rec.header.ms_level == MsLevel::Ms1 {
                if let Some((lo, hi)) = spectrum.mz_bounds() {
                    bounds = Some(match bounds {
                        Some((blo, bhi)) => (blo.min(lo), bhi.max(hi)),
                        None => (lo, hi),
                    });
                }
            }
            spectra.insert(rec.header.scan_number, spectrum);
            headers.push(rec.header);
        }

        let (lo, hi) = bounds.ok_or(DataProcessingError::ExpectedNonEmptyData {
            context: Some("run has no MS1 peaks".into()),
        })?;
        let store = SpectrumStore::new(spectra, cache_size, read_retries);
        Ok(Self::new(
            name,
            headers,
            TupleRange::spanning(lo, hi),
            centroided,
            store,
        ))
    }

    /// Same as [`Run::new`] with a custom source.
    pub fn with_source(
        name: impl Into<String>,
        scans: Vec<Scan>,
        mz_range: TupleRange<f64>,
        centroided: bool,
        source: impl SpectrumSource + 'static,
        cache_size: usize,
        read_retries: usize,
    ) -> Self {
        Self::new(
            name,
            scans,
            mz_range,
            centroided,
            SpectrumStore::new(source, cache_size, read_retries),
        )
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ms1_scans(&self) -> &[Scan] {
        &self.ms1
    }

    pub fn msn_scans(&self) -> &[Scan] {
        &self.msn
    }

    pub fn mz_range(&self) -> TupleRange<f64> {
        self.mz_range
    }

    pub fn is_centroided(&self) -> bool {
        self.centroided
    }

    pub fn store(&self) -> &SpectrumStore {
        &self.store
    }

    /// Index into the MS1 scans, the nearest scan number when there is no exact match.
    pub fn ms1_index_for_scan_number(&self, scan_number: u32) -> Option<usize> {
        nearest_scan_index(&self.ms1, scan_number)
    }

    pub fn retention_time_for_scan_number(&self, scan_number: u32) -> Option<f64> {
        self.ms1_index_for_scan_number(scan_number)
            .map(|i| self.ms1[i].retention_time)
    }

    pub fn try_spectrum(&self, scan_number: u32) -> std::result::Result<Arc<Spectrum>, SpectrumReadError> {
        self.store.try_spectrum(scan_number)
    }

    pub fn spectrum_or_empty(&self, scan_number: u32) -> Arc<Spectrum> {
        self.store.spectrum_or_empty(scan_number)
    }
}

/// Scans must be sorted by scan number. Ties go to the lower scan.
pub fn nearest_scan_index(scans: &[Scan], scan_number: u32) -> Option<usize> {
    if scans.is_empty() {
        return None;
    }
    let idx = scans.partition_point(|s| s.scan_number < scan_number);
    if idx == scans.len() {
        return Some(idx - 1);
    }
    if idx == 0 || scans[idx].scan_number == scan_number {
        return Some(idx);
    }
    let below = scan_number - scans[idx - 1].scan_number;
    let above = scans[idx].scan_number - scan_number;
    if above < below { Some(idx) } else { Some(idx - 1) }
}
