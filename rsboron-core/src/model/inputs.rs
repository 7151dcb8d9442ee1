use crate::errors::{BoronError, BoronResult};
use crate::isotopes::NIST951_RATIO;
use crate::FloatValue;
use ndarray::Array1;
use serde::{Deserialize, Serialize};

/// Per-sample solution chemistry consumed by the forward model
///
/// All arrays are aligned by sample and must have the same length.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelInputs {
    /// Precipitation rate (linear)
    pub rate: Array1<FloatValue>,
    /// [B(OH)3] / [DIC]
    pub rl3: Array1<FloatValue>,
    /// Free [B(OH)4-] / [CO3 2-]
    pub rl4: Array1<FloatValue>,
    /// [B] / [DIC], used to normalise the solid B/Ca into LambdaB
    pub b_dic: Array1<FloatValue>,
    /// 11B abundance of aqueous B(OH)3
    pub abundance_bo3: Array1<FloatValue>,
    /// 11B abundance of aqueous B(OH)4-
    pub abundance_bo4: Array1<FloatValue>,
    /// delta 11B of aqueous B(OH)3 (per mil)
    pub delta_bo3: Array1<FloatValue>,
    /// delta 11B of aqueous B(OH)4- (per mil)
    pub delta_bo4: Array1<FloatValue>,
    /// Reference ratio of the delta values
    #[serde(default = "default_reference_ratio")]
    pub reference_ratio: FloatValue,
}

fn default_reference_ratio() -> FloatValue {
    NIST951_RATIO
}

impl ModelInputs {
    /// Number of samples
    pub fn len(&self) -> usize {
        self.rate.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rate.is_empty()
    }

    /// Check that every array has one value per sample
    ///
    /// Returns the number of samples.
    pub fn validate(&self) -> BoronResult<usize> {
        let n = self.rate.len();
        let arrays = [
            ("rl3", &self.rl3),
            ("rl4", &self.rl4),
            ("b_dic", &self.b_dic),
            ("abundance_bo3", &self.abundance_bo3),
            ("abundance_bo4", &self.abundance_bo4),
            ("delta_bo3", &self.delta_bo3),
            ("delta_bo4", &self.delta_bo4),
        ];
        for (name, array) in arrays {
            if array.len() != n {
                return Err(BoronError::shape(name, n, array.len()));
            }
        }
        if !self.reference_ratio.is_finite() || self.reference_ratio <= 0.0 {
            return Err(BoronError::domain(
                "reference ratio",
                format!("must be finite and positive, got {}", self.reference_ratio),
            ));
        }
        Ok(n)
    }
}
