//! Assemble fitting arrays from the dataset
//!
//! Extracts, for one experiment and phase, the per-sample arrays consumed by
//! the forward model and the observations it is fitted against.
//!
//! | Array | Source |
//! |-------|--------|
//! | rate | `solid.rate` or `10^solid.log_rate` |
//! | rl3 | `speciation.boh3 / speciation.c` |
//! | rl4 | `speciation.boh4_free / speciation.co3` |
//! | b_dic | `speciation.b / speciation.c` |
//! | delta_bo3, delta_bo4 | `solution.d11b_bo3`, `solution.d11b_bo4` |
//! | LambdaB, EpsilonB | `solid.lambda_b`, `solid.epsilon_b` |

use crate::dataset::{require, Dataset, SampleRecord};
use crate::errors::{BoronError, BoronResult};
use crate::isotopes::{delta_to_abundance_array, NIST951_RATIO};
use crate::model::ModelInputs;
use crate::weighted::WeightedArray;
use crate::FloatValue;
use log::debug;
use ndarray::Array1;
use serde::{Deserialize, Serialize};

/// Which precipitation rate field is stored in the dataset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateColumn {
    /// `solid.log_rate`; the linear rate is derived
    #[default]
    LogRate,
    /// `solid.rate`; the log rate is derived
    Rate,
}

/// The subset of the dataset to fit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Selection {
    /// default: Uchikawa
    pub experiment: String,
    /// default: Calcite
    pub phase: String,
    /// default: log_rate
    pub rate_column: RateColumn,
}

impl Default for Selection {
    fn default() -> Self {
        Self {
            experiment: "Uchikawa".to_string(),
            phase: "Calcite".to_string(),
            rate_column: RateColumn::LogRate,
        }
    }
}

impl Selection {
    pub fn new(experiment: &str, phase: &str, rate_column: RateColumn) -> Self {
        Self {
            experiment: experiment.to_string(),
            phase: phase.to_string(),
            rate_column,
        }
    }
}

/// Arrays for one selection, aligned by sample
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssembledData {
    /// Sample identifiers, in the order of every array below
    pub samples: Vec<String>,
    /// log10 of the precipitation rate
    pub log_rate: Array1<FloatValue>,
    pub inputs: ModelInputs,
    pub lambda_b: WeightedArray,
    pub epsilon_b: WeightedArray,
}

impl AssembledData {
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// LambdaB errors normalised by their mean
    pub fn lambda_b_err_norm(&self) -> Array1<FloatValue> {
        self.lambda_b.mean_normalised_errors()
    }

    /// EpsilonB errors normalised by their mean
    pub fn epsilon_b_err_norm(&self) -> Array1<FloatValue> {
        self.epsilon_b.mean_normalised_errors()
    }
}

/// One sample's worth of every assembled array
struct Row {
    rate: FloatValue,
    log_rate: FloatValue,
    rl3: FloatValue,
    rl4: FloatValue,
    b_dic: FloatValue,
    delta_bo3: FloatValue,
    delta_bo4: FloatValue,
    lambda_b: (FloatValue, FloatValue),
    epsilon_b: (FloatValue, FloatValue),
}

fn extract_row(record: &SampleRecord, rate_column: RateColumn) -> BoronResult<Row> {
    let sample = record.sample.as_str();
    let solid = &record.solid;
    let solution = &record.solution;
    let speciation = record.speciation()?;

    let (rate, log_rate) = match rate_column {
        RateColumn::LogRate => {
            let log_rate = require(solid.log_rate, sample, "solid", "log_rate")?;
            (10.0_f64.powf(log_rate), log_rate)
        }
        RateColumn::Rate => {
            let rate = require(solid.rate, sample, "solid", "rate")?;
            (rate, rate.log10())
        }
    };

    let delta_bo3 = require(solution.d11b_bo3, sample, "solution", "d11b_bo3")?;
    let delta_bo4 = require(solution.d11b_bo4, sample, "solution", "d11b_bo4")?;
    let lambda_b = require(solid.lambda_b, sample, "solid", "lambda_b")?;
    let epsilon_b = require(solid.epsilon_b, sample, "solid", "epsilon_b")?;

    let species = |value: Option<FloatValue>, field: &str| {
        require(value, sample, "speciation", field)
    };
    let c = species(speciation.c, "c")?;

    Ok(Row {
        rate,
        log_rate,
        rl3: speciation_ratio("rl3", sample, species(speciation.boh3, "boh3")?, c)?,
        rl4: speciation_ratio(
            "rl4",
            sample,
            species(speciation.boh4_free, "boh4_free")?,
            species(speciation.co3, "co3")?,
        )?,
        b_dic: speciation_ratio("b_dic", sample, species(speciation.b, "b")?, c)?,
        delta_bo3: delta_bo3.nominal(),
        delta_bo4: delta_bo4.nominal(),
        lambda_b: (lambda_b.nominal(), lambda_b.std_dev()),
        epsilon_b: (epsilon_b.nominal(), epsilon_b.std_dev()),
    })
}

fn speciation_ratio(
    quantity: &str,
    sample: &str,
    numerator: FloatValue,
    denominator: FloatValue,
) -> BoronResult<FloatValue> {
    let ratio = numerator / denominator;
    if !ratio.is_finite() {
        return Err(BoronError::domain(
            quantity,
            format!("{numerator} / {denominator} is not finite for sample {sample}"),
        ));
    }
    Ok(ratio)
}

/// Extract the fitting arrays for one experiment and phase
///
/// Aqueous species deltas are converted to 11B abundances with
/// `reference_ratio`, which is also carried into the [`ModelInputs`] so the
/// model converts back with the same reference.
///
/// # Errors
///
/// - [`BoronError::EmptySelection`] if no records match
/// - [`BoronError::MissingField`] naming the first absent field
pub fn assemble(
    dataset: &Dataset,
    selection: &Selection,
    reference_ratio: FloatValue,
) -> BoronResult<AssembledData> {
    let records = dataset.select(&selection.experiment, &selection.phase);
    if records.is_empty() {
        return Err(BoronError::EmptySelection {
            experiment: selection.experiment.clone(),
            phase: selection.phase.clone(),
        });
    }

    let rows = records
        .iter()
        .map(|r| extract_row(r, selection.rate_column))
        .collect::<BoronResult<Vec<Row>>>()?;

    let column = |f: fn(&Row) -> FloatValue| rows.iter().map(f).collect::<Array1<FloatValue>>();

    let delta_bo3 = column(|r| r.delta_bo3);
    let delta_bo4 = column(|r| r.delta_bo4);

    let inputs = ModelInputs {
        rate: column(|r| r.rate),
        rl3: column(|r| r.rl3),
        rl4: column(|r| r.rl4),
        b_dic: column(|r| r.b_dic),
        abundance_bo3: delta_to_abundance_array(&delta_bo3, reference_ratio),
        abundance_bo4: delta_to_abundance_array(&delta_bo4, reference_ratio),
        delta_bo3,
        delta_bo4,
        reference_ratio,
    };

    let lambda_b = WeightedArray::new(
        "LambdaB",
        column(|r| r.lambda_b.0),
        column(|r| r.lambda_b.1),
    )?;
    let epsilon_b = WeightedArray::new(
        "EpsilonB",
        column(|r| r.epsilon_b.0),
        column(|r| r.epsilon_b.1),
    )?;

    debug!(
        "Assembled {} samples for experiment={}, phase={}",
        rows.len(),
        selection.experiment,
        selection.phase
    );

    Ok(AssembledData {
        samples: records.iter().map(|r| r.sample.clone()).collect(),
        log_rate: column(|r| r.log_rate),
        inputs,
        lambda_b,
        epsilon_b,
    })
}

/// [`assemble`] with the NIST951 reference ratio
pub fn assemble_default(dataset: &Dataset, selection: &Selection) -> BoronResult<AssembledData> {
    assemble(dataset, selection, NIST951_RATIO)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{Speciation, Uncertain};
    use crate::isotopes::delta_to_abundance;
    use approx::assert_abs_diff_eq;

    fn record(sample: &str, log_rate: FloatValue) -> SampleRecord {
        let mut record = SampleRecord::new(sample, "Uchikawa", "Calcite");
        record.solid.log_rate = Some(log_rate);
        record.solid.lambda_b = Some(Uncertain::new(0.01, 0.001));
        record.solid.epsilon_b = Some(Uncertain::new(-1.5, 0.4));
        record.solution.d11b_bo3 = Some(Uncertain::new(45.0, 0.2));
        record.solution.d11b_bo4 = Some(Uncertain::new(18.0, 0.2));
        record.speciation = Some(Speciation {
            c: Some(2e-3),
            co3: Some(2e-4),
            b: Some(4e-4),
            boh3: Some(3e-4),
            boh4_free: Some(8e-5),
            ..Default::default()
        });
        record
    }

    #[test]
    fn test_assemble_ratios() {
        let dataset = Dataset::new(vec![record("b", -5.0), record("a", -6.0)]);
        let data = assemble_default(&dataset, &Selection::default()).unwrap();

        assert_eq!(data.samples, vec!["a".to_string(), "b".to_string()]);
        assert_abs_diff_eq!(data.inputs.rate[0], 1e-6, epsilon = 1e-18);
        assert_abs_diff_eq!(data.log_rate[1], -5.0);
        assert_abs_diff_eq!(data.inputs.rl3[0], 0.15, epsilon = 1e-12);
        assert_abs_diff_eq!(data.inputs.rl4[0], 0.4, epsilon = 1e-12);
        assert_abs_diff_eq!(data.inputs.b_dic[0], 0.2, epsilon = 1e-12);
        assert_abs_diff_eq!(
            data.inputs.abundance_bo4[0],
            delta_to_abundance(18.0, NIST951_RATIO),
            epsilon = 1e-15
        );
        assert_eq!(data.lambda_b.errors()[0], 0.001);
        assert_eq!(data.epsilon_b.values()[1], -1.5);
        assert_eq!(data.inputs.validate().unwrap(), 2);
    }

    #[test]
    fn test_assemble_linear_rate() {
        let mut r = record("a", -6.0);
        r.solid.log_rate = None;
        r.solid.rate = Some(1e-4);
        let dataset = Dataset::new(vec![r]);

        let selection = Selection::new("Uchikawa", "Calcite", RateColumn::Rate);
        let data = assemble_default(&dataset, &selection).unwrap();
        assert_abs_diff_eq!(data.log_rate[0], -4.0, epsilon = 1e-12);
        assert_eq!(data.inputs.rate[0], 1e-4);
    }

    #[test]
    fn test_equal_errors_normalise_to_one() {
        let dataset = Dataset::new(vec![record("a", -6.0), record("b", -5.0)]);
        let data = assemble_default(&dataset, &Selection::default()).unwrap();
        for value in data.lambda_b_err_norm().iter().chain(data.epsilon_b_err_norm().iter()) {
            assert_abs_diff_eq!(*value, 1.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_missing_field_is_named() {
        let mut r = record("a", -6.0);
        r.solution.d11b_bo4 = None;
        let dataset = Dataset::new(vec![r]);

        let err = assemble_default(&dataset, &Selection::default()).unwrap_err();
        assert_eq!(
            err,
            BoronError::MissingField {
                sample: "a".to_string(),
                category: "solution".to_string(),
                field: "d11b_bo4".to_string(),
            }
        );
    }

    #[test]
    fn test_missing_speciation_column_is_named() {
        let mut r = record("a", -6.0);
        let mut value = serde_json::to_value(&r).unwrap();
        value["speciation"]
            .as_object_mut()
            .unwrap()
            .remove("co3");
        r = serde_json::from_value(value).unwrap();
        assert_eq!(r.speciation.as_ref().unwrap().co3, None);

        let dataset = Dataset::new(vec![r]);
        let err = assemble_default(&dataset, &Selection::default()).unwrap_err();
        assert_eq!(
            err,
            BoronError::MissingField {
                sample: "a".to_string(),
                category: "speciation".to_string(),
                field: "co3".to_string(),
            }
        );
    }

    #[test]
    fn test_zero_carbonate_is_rejected() {
        let mut r = record("a", -6.0);
        if let Some(speciation) = r.speciation.as_mut() {
            speciation.co3 = Some(0.0);
        }
        let dataset = Dataset::new(vec![r]);
        let err = assemble_default(&dataset, &Selection::default()).unwrap_err();
        assert!(matches!(err, BoronError::Domain { quantity, .. } if quantity == "rl4"));
    }

    #[test]
    fn test_missing_rate_column() {
        let dataset = Dataset::new(vec![record("a", -6.0)]);
        let selection = Selection::new("Uchikawa", "Calcite", RateColumn::Rate);
        let err = assemble_default(&dataset, &selection).unwrap_err();
        assert!(matches!(err, BoronError::MissingField { field, .. } if field == "rate"));
    }

    #[test]
    fn test_empty_selection() {
        let dataset = Dataset::new(vec![record("a", -6.0)]);
        let selection = Selection::new("Holcomb", "Calcite", RateColumn::LogRate);
        assert!(matches!(
            assemble_default(&dataset, &selection),
            Err(BoronError::EmptySelection { .. })
        ));
    }
}
