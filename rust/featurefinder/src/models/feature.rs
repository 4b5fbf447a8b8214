use serde::{
    Deserialize,
    Serialize,
};

use super::peak::{
    Peak,
    PeakId,
};
use crate::utils::constants::PROTON_MASS;

/// One matched isotope position of a feature.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IsotopePeak {
    pub id: PeakId,
    /// 0 is the monoisotopic position.
    pub isotope: usize,
    pub mz: f64,
    pub intensity: f32,
}

/// A peptide (or small molecule) ion candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feature {
    pub scan: u32,
    /// Retention time of `scan`, seconds.
    pub time: f64,
    pub first_scan: u32,
    pub last_scan: u32,
    pub scan_count: usize,
    pub mz: f64,
    /// 0 when only a single isotope peak was found.
    pub charge: u8,
    /// Neutral mass, 0 when the charge is undetermined.
    pub mass: f64,
    pub intensity: f32,
    pub total_intensity: f64,
    pub kl: f64,
    /// Isotope peaks judged real.
    pub peaks: usize,
    pub comprised: Vec<IsotopePeak>,
    pub background: f32,
    pub median: f32,
    /// Set once the m/z has been refined against the raw spectra.
    #[serde(default)]
    pub accurate_mz: bool,
}

impl Feature {
    /// A charge 0 feature made of the peak alone.
    pub fn from_peak(peak: &Peak) -> Self {
        Self {
            scan: peak.scan_number,
            time: 0.0,
            first_scan: peak.first_scan_number,
            last_scan: peak.last_scan_number,
            scan_count: peak.scan_count(),
            mz: peak.mz,
            charge: 0,
            mass: 0.0,
            intensity: peak.intensity,
            total_intensity: peak.total_intensity,
            kl: 0.0,
            peaks: 1,
            comprised: vec![IsotopePeak {
                id: peak.id,
                isotope: 0,
                mz: peak.mz,
                intensity: peak.intensity,
            }],
            background: peak.background,
            median: peak.median,
            accurate_mz: false,
        }
    }

    /// Candidate anchored on `anchor` (assumed monoisotopic) at `charge`.
    pub fn candidate(anchor: &Peak, charge: u8) -> Self {
        let mut out = Self::from_peak(anchor);
        out.charge = charge;
        out.update_mass();
        out
    }

    pub fn set_mz(&mut self, mz: f64) {
        self.mz = mz;
        self.update_mass();
    }

    pub fn update_mass(&mut self) {
        self.mass = neutral_mass(self.mz, self.charge);
    }

    pub fn contains_peak(&self, id: PeakId) -> bool {
        self.comprised.iter().any(|p| p.id == id)
    }

    pub fn monoisotopic(&self) -> Option<&IsotopePeak> {
        self.comprised.first()
    }

    /// Distance between adjacent isotopes in m/z.
    pub fn isotope_spacing(&self) -> Option<f64> {
        if self.charge == 0 {
            None
        } else {
            Some(crate::utils::constants::NEUTRON_MASS / self.charge as f64)
        }
    }
}

pub fn neutral_mass(mz: f64, charge: u8) -> f64 {
    if charge == 0 {
        0.0
    } else {
        (mz - PROTON_MASS) * charge as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peak() -> Peak {
        Peak {
            id: PeakId(4),
            mz: 500.25,
            intensity: 100.0,
            total_intensity: 250.0,
            scan_index: 9,
            scan_number: 10,
            first_scan_index: 6,
            last_scan_index: 12,
            first_scan_number: 7,
            last_scan_number: 13,
            background: 0.0,
            median: 0.0,
        }
    }

    #[test]
    fn test_mass_follows_charge() {
        let single = Feature::from_peak(&peak());
        assert_eq!(single.charge, 0);
        assert_eq!(single.mass, 0.0);
        assert_eq!(single.scan_count, 7);
        assert!(single.contains_peak(PeakId(4)));

        let mut f = Feature::candidate(&peak(), 2);
        assert!((f.mass - (500.25 - PROTON_MASS) * 2.0).abs() < 1e-9);
        f.set_mz(500.0);
        assert!((f.mass - (500.0 - PROTON_MASS) * 2.0).abs() < 1e-9);
        assert!((f.isotope_spacing().unwrap() - 0.5016774).abs() < 1e-6);
    }
}
