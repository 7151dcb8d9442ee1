use super::{partition_ratio, ModelInputs, Prediction};
use crate::errors::{BoronError, BoronResult};
use crate::isotopes::{abundance_to_delta, delta_to_abundance};
use crate::FloatValue;
use ndarray::Array1;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Selects one of the forward model variants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelVariant {
    /// B(OH)3 and B(OH)4- incorporated independently, isotopes from the
    /// measured aqueous abundances
    DualSpecies,
    /// B(OH)4- only, with a constant isotopic offset
    SingleSpecies,
    /// As `DualSpecies` with an extra fractionation on the B(OH)4- channel
    Bo4Fractionated,
    /// As `DualSpecies` with independent fractionations on both channels
    FullyFractionated,
}

impl ModelVariant {
    pub const ALL: [ModelVariant; 4] = [
        ModelVariant::DualSpecies,
        ModelVariant::SingleSpecies,
        ModelVariant::Bo4Fractionated,
        ModelVariant::FullyFractionated,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ModelVariant::DualSpecies => "dual_species",
            ModelVariant::SingleSpecies => "single_species",
            ModelVariant::Bo4Fractionated => "bo4_fractionated",
            ModelVariant::FullyFractionated => "fully_fractionated",
        }
    }

    /// Names of the parameters in the order the optimiser passes them
    pub fn parameter_names(&self) -> &'static [&'static str] {
        match self {
            ModelVariant::DualSpecies => &["kb3", "kf3", "kb4", "kf4", "log_rb"],
            ModelVariant::SingleSpecies => &["kb", "kf", "log_rb", "epsilon"],
            ModelVariant::Bo4Fractionated => &["kb3", "kf3", "kb4", "kf4", "log_rb", "eps4"],
            ModelVariant::FullyFractionated => {
                &["kb3", "kf3", "kb4", "kf4", "log_rb", "eps3", "eps4"]
            }
        }
    }

    pub fn n_parameters(&self) -> usize {
        self.parameter_names().len()
    }

    /// Interpret an ordered parameter vector for this variant
    pub fn decode(&self, params: &[FloatValue]) -> BoronResult<KineticParameters> {
        if params.len() != self.n_parameters() {
            return Err(BoronError::InvalidParameterCount {
                variant: self.name().to_string(),
                expected: self.n_parameters(),
                actual: params.len(),
            });
        }

        let parameters = match self {
            ModelVariant::DualSpecies => KineticParameters::DualSpecies {
                bo3: SpeciesRates::new(params[0], params[1]),
                bo4: SpeciesRates::new(params[2], params[3]),
                log_rb: params[4],
            },
            ModelVariant::SingleSpecies => KineticParameters::SingleSpecies {
                rates: SpeciesRates::new(params[0], params[1]),
                log_rb: params[2],
                epsilon: params[3],
            },
            ModelVariant::Bo4Fractionated => KineticParameters::Bo4Fractionated {
                bo3: SpeciesRates::new(params[0], params[1]),
                bo4: SpeciesRates::new(params[2], params[3]),
                log_rb: params[4],
                eps4: params[5],
            },
            ModelVariant::FullyFractionated => KineticParameters::FullyFractionated {
                bo3: SpeciesRates::new(params[0], params[1]),
                bo4: SpeciesRates::new(params[2], params[3]),
                log_rb: params[4],
                eps3: params[5],
                eps4: params[6],
            },
        };
        Ok(parameters)
    }

    /// Predict LambdaB and EpsilonB from an ordered parameter vector
    pub fn predict(&self, params: &[FloatValue], inputs: &ModelInputs) -> BoronResult<Prediction> {
        self.decode(params)?.predict(inputs)
    }
}

impl fmt::Display for ModelVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Backward and forward rate constants of one boron species
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpeciesRates {
    /// Backward (detachment) rate constant
    pub kb: FloatValue,
    /// Forward (attachment) rate constant
    pub kf: FloatValue,
}

impl SpeciesRates {
    pub fn new(kb: FloatValue, kf: FloatValue) -> Self {
        Self { kb, kf }
    }

    fn partition_ratio(&self, rb: FloatValue, rp: FloatValue, rl: FloatValue) -> FloatValue {
        partition_ratio(rb, rp, self.kf, rl, self.kb)
    }
}

/// A decoded parameter vector
///
/// `log_rb` is the base-10 logarithm of the solid isotope ratio term and the
/// `eps*` offsets are in per mil.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "variant", rename_all = "snake_case")]
pub enum KineticParameters {
    DualSpecies {
        bo3: SpeciesRates,
        bo4: SpeciesRates,
        log_rb: FloatValue,
    },
    SingleSpecies {
        rates: SpeciesRates,
        log_rb: FloatValue,
        epsilon: FloatValue,
    },
    Bo4Fractionated {
        bo3: SpeciesRates,
        bo4: SpeciesRates,
        log_rb: FloatValue,
        eps4: FloatValue,
    },
    FullyFractionated {
        bo3: SpeciesRates,
        bo4: SpeciesRates,
        log_rb: FloatValue,
        eps3: FloatValue,
        eps4: FloatValue,
    },
}

impl KineticParameters {
    pub fn variant(&self) -> ModelVariant {
        match self {
            KineticParameters::DualSpecies { .. } => ModelVariant::DualSpecies,
            KineticParameters::SingleSpecies { .. } => ModelVariant::SingleSpecies,
            KineticParameters::Bo4Fractionated { .. } => ModelVariant::Bo4Fractionated,
            KineticParameters::FullyFractionated { .. } => ModelVariant::FullyFractionated,
        }
    }

    /// Flatten back into the ordered vector used by optimisers
    pub fn to_vec(&self) -> Vec<FloatValue> {
        match *self {
            KineticParameters::DualSpecies { bo3, bo4, log_rb } => {
                vec![bo3.kb, bo3.kf, bo4.kb, bo4.kf, log_rb]
            }
            KineticParameters::SingleSpecies {
                rates,
                log_rb,
                epsilon,
            } => vec![rates.kb, rates.kf, log_rb, epsilon],
            KineticParameters::Bo4Fractionated {
                bo3,
                bo4,
                log_rb,
                eps4,
            } => vec![bo3.kb, bo3.kf, bo4.kb, bo4.kf, log_rb, eps4],
            KineticParameters::FullyFractionated {
                bo3,
                bo4,
                log_rb,
                eps3,
                eps4,
            } => vec![bo3.kb, bo3.kf, bo4.kb, bo4.kf, log_rb, eps3, eps4],
        }
    }

    pub fn log_rb(&self) -> FloatValue {
        match *self {
            KineticParameters::DualSpecies { log_rb, .. }
            | KineticParameters::SingleSpecies { log_rb, .. }
            | KineticParameters::Bo4Fractionated { log_rb, .. }
            | KineticParameters::FullyFractionated { log_rb, .. } => log_rb,
        }
    }

    /// Predict LambdaB and EpsilonB for every sample
    ///
    /// Only mismatched input lengths are errors. Parameters that drive a
    /// denominator to zero produce non-finite predictions.
    pub fn predict(&self, inputs: &ModelInputs) -> BoronResult<Prediction> {
        let n = inputs.validate()?;
        let rb = 10.0_f64.powf(self.log_rb());
        let reference = inputs.reference_ratio;

        let mut lambda_b = Array1::zeros(n);
        let mut epsilon_b = Array1::zeros(n);

        for i in 0..n {
            let rp = inputs.rate[i];
            let delta_bo4 = inputs.delta_bo4[i];

            let (lambda, epsilon) = match *self {
                KineticParameters::SingleSpecies {
                    rates, epsilon, ..
                } => {
                    let rs = rates.partition_ratio(rb, rp, inputs.rl4[i]);
                    let delta_solid = delta_bo4 + epsilon;
                    (rs / inputs.b_dic[i], delta_solid - delta_bo4)
                }
                KineticParameters::DualSpecies { bo3, bo4, .. } => mix(
                    bo3.partition_ratio(rb, rp, inputs.rl3[i]),
                    bo4.partition_ratio(rb, rp, inputs.rl4[i]),
                    inputs.abundance_bo3[i],
                    inputs.abundance_bo4[i],
                    inputs.b_dic[i],
                    delta_bo4,
                    reference,
                ),
                KineticParameters::Bo4Fractionated { bo3, bo4, eps4, .. } => mix(
                    bo3.partition_ratio(rb, rp, inputs.rl3[i]),
                    bo4.partition_ratio(rb, rp, inputs.rl4[i]),
                    delta_to_abundance(inputs.delta_bo3[i], reference),
                    delta_to_abundance(delta_bo4 + eps4, reference),
                    inputs.b_dic[i],
                    delta_bo4,
                    reference,
                ),
                KineticParameters::FullyFractionated {
                    bo3,
                    bo4,
                    eps3,
                    eps4,
                    ..
                } => mix(
                    bo3.partition_ratio(rb, rp, inputs.rl3[i]),
                    bo4.partition_ratio(rb, rp, inputs.rl4[i]),
                    delta_to_abundance(inputs.delta_bo3[i] + eps3, reference),
                    delta_to_abundance(delta_bo4 + eps4, reference),
                    inputs.b_dic[i],
                    delta_bo4,
                    reference,
                ),
            };

            lambda_b[i] = lambda;
            epsilon_b[i] = epsilon;
        }

        Ok(Prediction {
            lambda_b,
            epsilon_b,
        })
    }
}

/// Combine the two species contributions into (LambdaB, EpsilonB)
///
/// The 11B abundance of the solid is the mix of the species abundances
/// weighted by their contribution to the total solid B/Ca.
fn mix(
    rs3: FloatValue,
    rs4: FloatValue,
    abundance_bo3: FloatValue,
    abundance_bo4: FloatValue,
    b_dic: FloatValue,
    delta_bo4: FloatValue,
    reference_ratio: FloatValue,
) -> (FloatValue, FloatValue) {
    let rsb = rs3 + rs4;
    let abundance_solid = (abundance_bo3 * rs3 + abundance_bo4 * rs4) / rsb;

    (
        rsb / b_dic,
        abundance_to_delta(abundance_solid, reference_ratio) - delta_bo4,
    )
}
