//! Boron isotope unit conversions
//!
//! Isotopic composition can be expressed three ways:
//!
//! - **delta**: per mil deviation of the 11B/10B ratio from a reference ratio
//! - **ratio**: the atomic 11B/10B ratio, $R > 0$
//! - **abundance**: the 11B fraction of total boron, $A = R / (1 + R)$
//!
//! All conversions go through the ratio. The reference ratio defaults to
//! NIST SRM 951 ([`NIST951_RATIO`]).
//!
//! The scalar functions follow IEEE semantics so they can be used inside the
//! forward model, where non-finite values must be allowed to propagate.
//! The `checked_*` variants validate their domain and should be used at data
//! boundaries.

use crate::errors::{BoronError, BoronResult};
use crate::FloatValue;
use ndarray::Array1;
use serde::{Deserialize, Serialize};

/// 11B/10B ratio of the NIST SRM 951 boric acid standard
pub const NIST951_RATIO: FloatValue = 4.04367;

/// Equilibrium fractionation factor between B(OH)3 and B(OH)4-
pub const BORATE_FRACTIONATION: FloatValue = 1.026;

/// Convert delta notation to an isotope ratio
///
/// $$R = R_{ref} (\delta / 1000 + 1)$$
pub fn delta_to_ratio(delta: FloatValue, reference_ratio: FloatValue) -> FloatValue {
    reference_ratio * (delta / 1000.0 + 1.0)
}

/// Convert an isotope ratio to delta notation
///
/// $$\delta = (R / R_{ref} - 1) \cdot 1000$$
pub fn ratio_to_delta(ratio: FloatValue, reference_ratio: FloatValue) -> FloatValue {
    (ratio / reference_ratio - 1.0) * 1000.0
}

/// Convert an isotope ratio to fractional abundance
pub fn ratio_to_abundance(ratio: FloatValue) -> FloatValue {
    ratio / (1.0 + ratio)
}

/// Convert fractional abundance to an isotope ratio
///
/// Diverges as the abundance approaches 1.
pub fn abundance_to_ratio(abundance: FloatValue) -> FloatValue {
    abundance / (1.0 - abundance)
}

pub fn delta_to_abundance(delta: FloatValue, reference_ratio: FloatValue) -> FloatValue {
    ratio_to_abundance(delta_to_ratio(delta, reference_ratio))
}

pub fn abundance_to_delta(abundance: FloatValue, reference_ratio: FloatValue) -> FloatValue {
    ratio_to_delta(abundance_to_ratio(abundance), reference_ratio)
}

/// Convert an isotope ratio to fractional abundance, rejecting negative or
/// non-finite ratios
pub fn checked_ratio_to_abundance(ratio: FloatValue) -> BoronResult<FloatValue> {
    if !ratio.is_finite() || ratio < 0.0 {
        return Err(BoronError::domain(
            "isotope ratio",
            format!("ratio must be finite and non-negative, got {ratio}"),
        ));
    }
    Ok(ratio_to_abundance(ratio))
}

/// Convert fractional abundance to an isotope ratio, rejecting abundances
/// outside `[0, 1)`
pub fn checked_abundance_to_ratio(abundance: FloatValue) -> BoronResult<FloatValue> {
    if !(0.0..1.0).contains(&abundance) {
        return Err(BoronError::domain(
            "isotope abundance",
            format!("abundance must be in [0, 1), got {abundance}"),
        ));
    }
    Ok(abundance_to_ratio(abundance))
}

/// Elementwise [`delta_to_abundance`]
pub fn delta_to_abundance_array(
    delta: &Array1<FloatValue>,
    reference_ratio: FloatValue,
) -> Array1<FloatValue> {
    delta.mapv(|d| delta_to_abundance(d, reference_ratio))
}

/// Elementwise [`abundance_to_delta`]
pub fn abundance_to_delta_array(
    abundance: &Array1<FloatValue>,
    reference_ratio: FloatValue,
) -> Array1<FloatValue> {
    abundance.mapv(|a| abundance_to_delta(a, reference_ratio))
}

/// Isotopic composition of the two aqueous boron species
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpeciesDeltas {
    /// delta 11B of B(OH)4-
    /// unit: per mil
    pub bo4: FloatValue,
    /// delta 11B of B(OH)3
    /// unit: per mil
    pub bo3: FloatValue,
}

impl SpeciesDeltas {
    /// Offset between the two species, $\delta_{BO3} - \delta_{BO4}$
    pub fn offset(&self) -> FloatValue {
        self.bo3 - self.bo4
    }
}

/// Split a bulk solution delta between B(OH)4- and B(OH)3 by linear mass balance
///
/// The two species are offset by a constant $\epsilon = 1000(\alpha - 1)$:
///
/// $$\delta_T B_T = \delta_{BO4} [BO_4] + (\delta_{BO4} + \epsilon)(B_T - [BO_4])$$
///
/// which gives
///
/// $$\delta_{BO4} = \frac{\delta_T B_T - \epsilon (B_T - [BO_4])}{B_T}$$
///
/// This is the linearised counterpart of [`crate::solution::solve`], which
/// should be preferred when pH is known.
pub fn mass_balance_split(
    total_b: FloatValue,
    bo4: FloatValue,
    delta_total: FloatValue,
    alpha: FloatValue,
) -> BoronResult<SpeciesDeltas> {
    if !total_b.is_finite() || total_b <= 0.0 {
        return Err(BoronError::domain(
            "total boron",
            format!("must be finite and positive, got {total_b}"),
        ));
    }
    if !bo4.is_finite() || bo4 < 0.0 || bo4 > total_b {
        return Err(BoronError::domain(
            "B(OH)4- concentration",
            format!("must lie between 0 and total boron ({total_b}), got {bo4}"),
        ));
    }
    if !delta_total.is_finite() || !alpha.is_finite() {
        return Err(BoronError::domain(
            "mass balance split",
            format!("delta ({delta_total}) and alpha ({alpha}) must be finite"),
        ));
    }

    let epsilon = 1000.0 * (alpha - 1.0);
    let bo3 = total_b - bo4;
    let delta_bo4 = (delta_total * total_b - epsilon * bo3) / total_b;

    Ok(SpeciesDeltas {
        bo4: delta_bo4,
        bo3: delta_bo4 + epsilon,
    })
}
