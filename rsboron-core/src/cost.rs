//! Cost functions for fitting the forward model
//!
//! The cost combines the two observable channels into a single scalar:
//!
//! $$C = \frac{b}{2} \sum_i \frac{(\Lambda_i^{pred} - \Lambda_i^{obs})^2}{\sigma_{\Lambda,i}^2}
//!     + \frac{1}{2} \sum_i \frac{(\epsilon_i^{pred} - \epsilon_i^{obs})^2}{\sigma_{\epsilon,i}^2}$$
//!
//! where $b$ is the LambdaB bias. Without an explicit bias it is the ratio of
//! the ranges of the observations, $b = \mathrm{ptp}(\epsilon^{obs}) / \mathrm{ptp}(\Lambda^{obs})$,
//! which puts both channels on a comparable scale.
//!
//! This is a weighted sum of squares rather than a normalised negative
//! log-likelihood: the $\log(2\pi\sigma^2)$ terms are omitted. The value is
//! kept exactly as is so fits remain comparable with earlier results.

use crate::errors::{BoronError, BoronResult};
use crate::model::{ModelInputs, ModelVariant, Prediction};
use crate::weighted::WeightedArray;
use crate::FloatValue;
use log::debug;

/// A scalar function of an ordered parameter vector, minimised by an optimiser
pub trait Objective {
    /// Number of parameters `evaluate` expects
    fn n_parameters(&self) -> usize;

    /// Evaluate the objective. Lower is better.
    ///
    /// A non-finite value marks the parameters as invalid; an `Err` means
    /// the evaluation itself could not be performed.
    fn evaluate(&self, params: &[FloatValue]) -> BoronResult<FloatValue>;
}

/// Default LambdaB bias: the range of EpsilonB over the range of LambdaB
pub fn default_lambda_b_bias(
    lambda_b: &WeightedArray,
    epsilon_b: &WeightedArray,
) -> BoronResult<FloatValue> {
    let lambda_range = lambda_b.range();
    let epsilon_range = epsilon_b.range();
    let bias = epsilon_range / lambda_range;
    if !is_valid_bias(bias) {
        return Err(BoronError::domain(
            "LambdaB bias",
            format!(
                "range of EpsilonB ({epsilon_range}) over range of LambdaB ({lambda_range}) \
                 is not finite and positive; supply an explicit bias"
            ),
        ));
    }
    Ok(bias)
}

/// A LambdaB bias must be finite and positive, whether given or derived
pub fn is_valid_bias(bias: FloatValue) -> bool {
    bias.is_finite() && bias > 0.0
}

/// Every observation entering the cost needs a nonzero standard error
fn require_nonzero_errors(channel: &str, observed: &WeightedArray) -> BoronResult<()> {
    match observed.errors().iter().position(|e| *e == 0.0) {
        Some(i) => Err(BoronError::domain(
            &format!("{channel} errors"),
            format!("standard error of sample {i} is zero"),
        )),
        None => Ok(()),
    }
}

/// Weighted two-channel sum of squares between predictions and observations
///
/// Non-finite predictions propagate into the returned value.
pub fn weighted_cost(
    prediction: &Prediction,
    lambda_b: &WeightedArray,
    epsilon_b: &WeightedArray,
    lambda_b_bias: FloatValue,
) -> BoronResult<FloatValue> {
    if prediction.lambda_b.len() != lambda_b.len() {
        return Err(BoronError::shape(
            "predicted LambdaB",
            lambda_b.len(),
            prediction.lambda_b.len(),
        ));
    }
    if prediction.epsilon_b.len() != epsilon_b.len() {
        return Err(BoronError::shape(
            "predicted EpsilonB",
            epsilon_b.len(),
            prediction.epsilon_b.len(),
        ));
    }

    let lambda_err = lambda_b_bias * sum_of_squares(&prediction.lambda_b, lambda_b);
    let epsilon_err = sum_of_squares(&prediction.epsilon_b, epsilon_b);

    Ok(lambda_err / 2.0 + epsilon_err / 2.0)
}

fn sum_of_squares(predicted: &ndarray::Array1<FloatValue>, observed: &WeightedArray) -> FloatValue {
    predicted
        .iter()
        .zip(observed.values().iter())
        .zip(observed.errors().iter())
        .map(|((p, o), e)| (p - o).powi(2) / e.powi(2))
        .sum()
}

/// The cost of one model variant against one set of observations
///
/// Holds everything except the parameter vector, which is supplied by the
/// optimiser on every evaluation. The bias is fixed at construction.
#[derive(Debug, Clone)]
pub struct CostFunction {
    variant: ModelVariant,
    inputs: ModelInputs,
    lambda_b: WeightedArray,
    epsilon_b: WeightedArray,
    lambda_b_bias: FloatValue,
}

impl CostFunction {
    /// Create a cost function
    ///
    /// If `lambda_b_bias` is `None` the default bias is calculated from the
    /// observations.
    ///
    /// # Errors
    ///
    /// Returns a shape error if the observations and inputs differ in length,
    /// or a domain error if any standard error is zero or the bias is not
    /// finite and positive.
    pub fn new(
        variant: ModelVariant,
        inputs: ModelInputs,
        lambda_b: WeightedArray,
        epsilon_b: WeightedArray,
        lambda_b_bias: Option<FloatValue>,
    ) -> BoronResult<Self> {
        let n = inputs.validate()?;
        if lambda_b.len() != n {
            return Err(BoronError::shape("observed LambdaB", n, lambda_b.len()));
        }
        if epsilon_b.len() != n {
            return Err(BoronError::shape("observed EpsilonB", n, epsilon_b.len()));
        }

        require_nonzero_errors("observed LambdaB", &lambda_b)?;
        require_nonzero_errors("observed EpsilonB", &epsilon_b)?;

        let lambda_b_bias = match lambda_b_bias {
            Some(bias) if is_valid_bias(bias) => bias,
            Some(bias) => {
                return Err(BoronError::domain(
                    "LambdaB bias",
                    format!("must be finite and positive, got {bias}"),
                ))
            }
            None => default_lambda_b_bias(&lambda_b, &epsilon_b)?,
        };
        debug!(
            "Cost function for {} model over {} samples, LambdaB bias {:.4e}",
            variant, n, lambda_b_bias
        );

        Ok(Self {
            variant,
            inputs,
            lambda_b,
            epsilon_b,
            lambda_b_bias,
        })
    }

    pub fn variant(&self) -> ModelVariant {
        self.variant
    }

    pub fn inputs(&self) -> &ModelInputs {
        &self.inputs
    }

    pub fn lambda_b(&self) -> &WeightedArray {
        &self.lambda_b
    }

    pub fn epsilon_b(&self) -> &WeightedArray {
        &self.epsilon_b
    }

    pub fn lambda_b_bias(&self) -> FloatValue {
        self.lambda_b_bias
    }

    /// Run the forward model for a parameter vector
    pub fn predict(&self, params: &[FloatValue]) -> BoronResult<Prediction> {
        self.variant.predict(params, &self.inputs)
    }
}

impl Objective for CostFunction {
    fn n_parameters(&self) -> usize {
        self.variant.n_parameters()
    }

    fn evaluate(&self, params: &[FloatValue]) -> BoronResult<FloatValue> {
        let prediction = self.predict(params)?;
        weighted_cost(
            &prediction,
            &self.lambda_b,
            &self.epsilon_b,
            self.lambda_b_bias,
        )
    }
}
