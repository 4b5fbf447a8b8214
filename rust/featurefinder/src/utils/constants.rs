/// Mass of a proton (the usual charge carrier), in daltons.
pub const PROTON_MASS: f64 = 1.007276;

/// Mass difference between C13 and C12, used as the isotope spacing.
pub const NEUTRON_MASS: f64 = 1.0033548;

/// Mass difference between Cl37 and Cl35.
pub const CHLORINE_ISOTOPE_SHIFT: f64 = 1.99705;

/// Parts-per-million conversion factor.
pub const PPM: f64 = 1e-6;
