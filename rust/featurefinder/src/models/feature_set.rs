use serde::{
    Deserialize,
    Serialize,
};
use std::fs::File;
use std::io::{
    BufWriter,
    Write,
};
use std::path::Path;

use super::feature::Feature;
use crate::config::FeatureFindingConfig;
use crate::errors::{
    FeatureFindingError,
    Result,
};

/// Features found in one run plus how they were found.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureSet {
    pub run_name: String,
    pub algorithm: String,
    pub parameters: FeatureFindingConfig,
    pub features: Vec<Feature>,
}

/// Filter over a feature set, every unset bound passes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureSelector {
    pub min_charge: Option<u8>,
    pub max_charge: Option<u8>,
    pub min_peaks: Option<usize>,
    pub max_kl: Option<f64>,
    pub min_intensity: Option<f32>,
    pub mz_range: Option<(f64, f64)>,
    pub scan_range: Option<(u32, u32)>,
}

impl FeatureSelector {
    pub fn matches(&self, feature: &Feature) -> bool {
        self.min_charge.is_none_or(|x| feature.charge >= x)
            && self.max_charge.is_none_or(|x| feature.charge <= x)
            && self.min_peaks.is_none_or(|x| feature.peaks >= x)
            && self.max_kl.is_none_or(|x| feature.kl <= x)
            && self.min_intensity.is_none_or(|x| feature.intensity >= x)
            && self
                .mz_range
                .is_none_or(|(lo, hi)| lo <= feature.mz && feature.mz <= hi)
            && self
                .scan_range
                .is_none_or(|(lo, hi)| lo <= feature.scan && feature.scan <= hi)
    }
}

/// Flat row for delimited output.
#[derive(Debug, Serialize)]
struct FeatureRow<'a> {
    scan: u32,
    time: f64,
    mz: f64,
    accurate_mz: bool,
    mass: f64,
    intensity: f32,
    charge: u8,
    peaks: usize,
    kl: f64,
    total_intensity: f64,
    first_scan: u32,
    last_scan: u32,
    scan_count: usize,
    background: f32,
    median: f32,
    comprised_mz: &'a str,
}

impl FeatureSet {
    pub fn new(run_name: impl Into<String>, algorithm: impl Into<String>, parameters: FeatureFindingConfig) -> Self {
        Self {
            run_name: run_name.into(),
            algorithm: algorithm.into(),
            parameters,
            features: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Feature> {
        self.features.iter()
    }

    pub fn select(&self, selector: &FeatureSelector) -> FeatureSet {
        FeatureSet {
            run_name: self.run_name.clone(),
            algorithm: self.algorithm.clone(),
            parameters: self.parameters.clone(),
            features: self
                .features
                .iter()
                .filter(|f| selector.matches(f))
                .cloned()
                .collect(),
        }
    }

    /// Scan ascending, then m/z ascending.
    pub fn sort_by_scan(&mut self) {
        self.features
            .sort_by(|a, b| a.scan.cmp(&b.scan).then(a.mz.total_cmp(&b.mz)));
    }

    pub fn sort_by_mz(&mut self) {
        self.features.sort_by(|a, b| a.mz.total_cmp(&b.mz));
    }

    pub fn sort_by_intensity_desc(&mut self) {
        self.features
            .sort_by(|a, b| b.intensity.total_cmp(&a.intensity));
    }

    pub fn write_json(&self, writer: impl Write) -> Result<()> {
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }

    pub fn write_tsv(&self, writer: impl Write) -> Result<()> {
        let mut wtr = csv::WriterBuilder::new()
            .delimiter(b'\t')
            .from_writer(writer);
        for feature in &self.features {
            let comprised_mz = feature
                .comprised
                .iter()
                .map(|p| format!("{:.4}", p.mz))
                .collect::<Vec<_>>()
                .join(";");
            wtr.serialize(FeatureRow {
                scan: feature.scan,
                time: feature.time,
                mz: feature.mz,
                accurate_mz: feature.accurate_mz,
                mass: feature.mass,
                intensity: feature.intensity,
                charge: feature.charge,
                peaks: feature.peaks,
                kl: feature.kl,
                total_intensity: feature.total_intensity,
                first_scan: feature.first_scan,
                last_scan: feature.last_scan,
                scan_count: feature.scan_count,
                background: feature.background,
                median: feature.median,
                comprised_mz: &comprised_mz,
            })?;
        }
        wtr.flush()
            .map_err(|e| FeatureFindingError::Io { source: e, path: None })?;
        Ok(())
    }

    pub fn write_json_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let file = File::create(path).map_err(|e| FeatureFindingError::io(e, path))?;
        self.write_json(BufWriter::new(file))
    }

    pub fn write_tsv_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let file = File::create(path).map_err(|e| FeatureFindingError::io(e, path))?;
        self.write_tsv(BufWriter::new(file))
    }
}
