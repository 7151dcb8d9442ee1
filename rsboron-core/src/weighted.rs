//! Values paired with their standard errors

use crate::errors::{BoronError, BoronResult};
use crate::FloatValue;
use ndarray::Array1;
use serde::{Deserialize, Serialize};

/// An array of observations and the standard error of each element
///
/// Both arrays always have the same length and all errors are non-negative.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawWeightedArray")]
pub struct WeightedArray {
    values: Array1<FloatValue>,
    errors: Array1<FloatValue>,
}

/// Unchecked serialised form
#[derive(Deserialize)]
struct RawWeightedArray {
    values: Array1<FloatValue>,
    errors: Array1<FloatValue>,
}

impl TryFrom<RawWeightedArray> for WeightedArray {
    type Error = BoronError;

    fn try_from(raw: RawWeightedArray) -> BoronResult<Self> {
        WeightedArray::new("WeightedArray", raw.values, raw.errors)
    }
}

impl WeightedArray {
    /// Pair values with their standard errors
    ///
    /// `quantity` names the observable in any error message.
    pub fn new(
        quantity: &str,
        values: Array1<FloatValue>,
        errors: Array1<FloatValue>,
    ) -> BoronResult<Self> {
        if values.len() != errors.len() {
            return Err(BoronError::shape(
                &format!("{quantity} errors"),
                values.len(),
                errors.len(),
            ));
        }
        if let Some(bad) = errors.iter().find(|e| !(**e >= 0.0)) {
            return Err(BoronError::domain(
                &format!("{quantity} errors"),
                format!("standard errors must be non-negative, got {bad}"),
            ));
        }
        Ok(Self { values, errors })
    }

    /// Observations with unit weight
    pub fn unweighted(values: Array1<FloatValue>) -> Self {
        let errors = Array1::ones(values.len());
        Self { values, errors }
    }

    pub fn values(&self) -> &Array1<FloatValue> {
        &self.values
    }

    pub fn errors(&self) -> &Array1<FloatValue> {
        &self.errors
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Peak-to-peak range of the values
    ///
    /// Returns NaN for an empty array.
    pub fn range(&self) -> FloatValue {
        if self.values.is_empty() {
            return FloatValue::NAN;
        }
        let max = self.values.fold(FloatValue::NEG_INFINITY, |a, b| a.max(*b));
        let min = self.values.fold(FloatValue::INFINITY, |a, b| a.min(*b));
        max - min
    }

    /// Errors scaled by their own mean, $\sqrt{\sigma_i / \bar{\sigma}}$
    ///
    /// Makes channels with very different error magnitudes comparable while
    /// keeping the relative weighting within each channel.
    pub fn mean_normalised_errors(&self) -> Array1<FloatValue> {
        let mean = self.errors.mean().unwrap_or(FloatValue::NAN);
        self.errors.mapv(|e| (e / mean).powf(0.5))
    }

    /// Copy of this array carrying mean-normalised errors
    pub fn mean_normalised(&self) -> Self {
        Self {
            values: self.values.clone(),
            errors: self.mean_normalised_errors(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use is_close::is_close;
    use ndarray::array;

    #[test]
    fn test_length_mismatch() {
        let err = WeightedArray::new("LambdaB", array![1.0, 2.0], array![0.1]).unwrap_err();
        assert_eq!(
            err,
            BoronError::Shape {
                quantity: "LambdaB errors".to_string(),
                expected: 2,
                actual: 1
            }
        );
    }

    #[test]
    fn test_negative_errors_rejected() {
        assert!(WeightedArray::new("EpsilonB", array![1.0, 2.0], array![0.1, -0.1]).is_err());
        assert!(WeightedArray::new("EpsilonB", array![1.0], array![FloatValue::NAN]).is_err());
        assert!(WeightedArray::new("EpsilonB", array![1.0], array![0.0]).is_ok());
    }

    #[test]
    fn test_deserialize_validates() {
        let values: WeightedArray = serde_json::from_str(
            r#"{"values": {"v": 1, "dim": [2], "data": [1.0, 2.0]},
                "errors": {"v": 1, "dim": [2], "data": [0.1, 0.2]}}"#,
        )
        .unwrap();
        assert_eq!(values.errors(), &array![0.1, 0.2]);
        assert_eq!(
            serde_json::from_str::<WeightedArray>(&serde_json::to_string(&values).unwrap())
                .unwrap(),
            values
        );

        let negative = serde_json::from_str::<WeightedArray>(
            r#"{"values": {"v": 1, "dim": [2], "data": [1.0, 2.0]},
                "errors": {"v": 1, "dim": [2], "data": [0.1, -0.2]}}"#,
        )
        .unwrap_err();
        assert!(negative.to_string().contains("non-negative"));

        let mismatched = serde_json::from_str::<WeightedArray>(
            r#"{"values": {"v": 1, "dim": [2], "data": [1.0, 2.0]},
                "errors": {"v": 1, "dim": [1], "data": [0.1]}}"#,
        );
        assert!(mismatched.is_err());
    }

    #[test]
    fn test_range() {
        let values = WeightedArray::unweighted(array![3.0, -1.0, 7.5, 2.0]);
        assert!(is_close!(values.range(), 8.5));
        assert!(WeightedArray::unweighted(Array1::from(vec![])).range().is_nan());
    }

    #[test]
    fn test_mean_normalised_errors() {
        let values = WeightedArray::new("LambdaB", array![1.0, 2.0, 3.0], array![1.0, 2.0, 3.0])
            .unwrap();
        let normalised = values.mean_normalised_errors();

        // Mean error is 2
        assert_abs_diff_eq!(normalised[0], 0.5_f64.sqrt(), epsilon = 1e-12);
        assert_abs_diff_eq!(normalised[1], 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(normalised[2], 1.5_f64.sqrt(), epsilon = 1e-12);

        let copy = values.mean_normalised();
        assert_eq!(copy.values(), values.values());
        assert_eq!(copy.errors(), &normalised);
    }
}
