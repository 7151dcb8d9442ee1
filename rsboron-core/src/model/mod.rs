//! Kinetic partitioning of boron into calcium carbonate
//!
//! The forward model predicts two observables for each sample:
//!
//! - **LambdaB**: the solid B/Ca normalised by the solution B/DIC
//! - **EpsilonB**: the isotopic offset between the solid and aqueous B(OH)4-
//!
//! from a vector of kinetic parameters and the solution chemistry of each
//! sample. Each boron species contributes to the solid according to an
//! attachment/detachment rate law ([`partition_ratio`]); the isotopic
//! composition of the solid is the abundance-weighted mix of the
//! contributions.
//!
//! # Model Variants
//!
//! Four variants of increasing detail are available via [`ModelVariant`]:
//!
//! | Variant | Parameters |
//! |---------|------------|
//! | `DualSpecies` | `kb3, kf3, kb4, kf4, log_rb` |
//! | `SingleSpecies` | `kb, kf, log_rb, epsilon` |
//! | `Bo4Fractionated` | `kb3, kf3, kb4, kf4, log_rb, eps4` |
//! | `FullyFractionated` | `kb3, kf3, kb4, kf4, log_rb, eps3, eps4` |
//!
//! Parameter vectors are passed in the order shown and decoded into
//! [`KineticParameters`].

mod inputs;
mod variants;

pub use inputs::ModelInputs;
pub use variants::{KineticParameters, ModelVariant, SpeciesRates};

use crate::FloatValue;
use ndarray::Array1;
use serde::{Deserialize, Serialize};

/// Steady-state species/Ca ratio incorporated into the solid
///
/// $$r_S = \frac{K_f \, r_L \, (R_p + R_b)}{R_b K_b + R_p}$$
///
/// # Arguments
///
/// * `rb` - Solid isotope ratio term, $10^{\log R_b}$
/// * `rp` - Precipitation rate (linear, not log10)
/// * `kf` - Forward (attachment) rate constant
/// * `rl` - Solution ratio of the species to its carbon proxy
/// * `kb` - Backward (detachment) rate constant
///
/// A zero denominator gives a non-finite result rather than an error, so an
/// optimiser can see and reject the offending parameters.
pub fn partition_ratio(
    rb: FloatValue,
    rp: FloatValue,
    kf: FloatValue,
    rl: FloatValue,
    kb: FloatValue,
) -> FloatValue {
    let rf = rp + rb;
    (kf * rl * rf) / (rb * kb + rp)
}

/// Predicted observables, aligned with the samples of the [`ModelInputs`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub lambda_b: Array1<FloatValue>,
    pub epsilon_b: Array1<FloatValue>,
}

impl Prediction {
    pub fn len(&self) -> usize {
        self.lambda_b.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lambda_b.is_empty()
    }

    /// True when every predicted value is finite
    pub fn is_finite(&self) -> bool {
        self.lambda_b.iter().chain(self.epsilon_b.iter()).all(|v| v.is_finite())
    }
}
