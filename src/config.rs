//! Fit configuration
//!
//! A fit is described by a TOML file. Every section is optional:
//!
//! ```toml
//! variant = "bo4_fractionated"
//! weighting = "mean_normalised"
//! lambda_b_bias = 250.0
//!
//! [selection]
//! experiment = "Uchikawa"
//! phase = "Calcite"
//!
//! [optimizer]
//! max_iterations = 10000
//!
//! [preparation]
//! alpha = 1.0272
//! ```

use crate::errors::{Error, Result};
use crate::optimize::NelderMeadOptions;
use rsboron_core::assembly::{AssembledData, Selection};
use rsboron_core::cost::is_valid_bias;
use rsboron_core::model::ModelVariant;
use rsboron_core::prepare::PreparationOptions;
use rsboron_core::weighted::WeightedArray;
use rsboron_core::FloatValue;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// How the observation errors weight the cost
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Weighting {
    /// The measured standard errors
    #[default]
    Absolute,
    /// Standard errors normalised by their mean within each channel
    MeanNormalised,
}

impl Weighting {
    /// Observed LambdaB and EpsilonB carrying the selected errors
    pub fn observations(&self, data: &AssembledData) -> (WeightedArray, WeightedArray) {
        match self {
            Weighting::Absolute => (data.lambda_b.clone(), data.epsilon_b.clone()),
            Weighting::MeanNormalised => (
                data.lambda_b.mean_normalised(),
                data.epsilon_b.mean_normalised(),
            ),
        }
    }
}

/// Everything needed to run one fit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FitConfig {
    /// default: dual_species
    pub variant: ModelVariant,
    /// default: absolute
    pub weighting: Weighting,
    /// Weight of the LambdaB channel. Derived from the observations when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lambda_b_bias: Option<FloatValue>,
    /// Starting parameter vector, in the order of the variant's parameter names.
    /// Derived from the data when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub initial_parameters: Option<Vec<FloatValue>>,
    /// Recalculate LambdaB, species isotopes and EpsilonB before fitting
    /// default: true
    pub derive_quantities: bool,
    pub selection: Selection,
    pub optimizer: NelderMeadOptions,
    pub preparation: PreparationOptions,
}

impl Default for FitConfig {
    fn default() -> Self {
        Self {
            variant: ModelVariant::DualSpecies,
            weighting: Weighting::Absolute,
            lambda_b_bias: None,
            initial_parameters: None,
            derive_quantities: true,
            selection: Selection::default(),
            optimizer: NelderMeadOptions::default(),
            preparation: PreparationOptions::default(),
        }
    }
}

impl FitConfig {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: FitConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string(self).map_err(|e| Error::Parse {
            what: "TOML".to_string(),
            details: e.to_string(),
        })
    }

    /// Check values that deserialise but cannot be used
    pub fn validate(&self) -> Result<()> {
        if let Some(bias) = self.lambda_b_bias {
            if !is_valid_bias(bias) {
                return Err(Error::Config(format!(
                    "lambda_b_bias must be finite and positive, got {bias}"
                )));
            }
        }
        if let Some(initial) = &self.initial_parameters {
            if initial.len() != self.variant.n_parameters() {
                return Err(Error::Config(format!(
                    "the {} model takes {} initial parameters ({}), got {}",
                    self.variant,
                    self.variant.n_parameters(),
                    self.variant.parameter_names().join(", "),
                    initial.len()
                )));
            }
        }
        let preparation = &self.preparation;
        if !(preparation.alpha.is_finite() && preparation.alpha > 0.0) {
            return Err(Error::Config(format!(
                "alpha must be finite and positive, got {}",
                preparation.alpha
            )));
        }
        if !(preparation.reference_ratio.is_finite() && preparation.reference_ratio > 0.0) {
            return Err(Error::Config(format!(
                "reference_ratio must be finite and positive, got {}",
                preparation.reference_ratio
            )));
        }
        self.optimizer.validate()
    }
}
