//! Fit a kinetic model to one experiment
//!
//! Ties the pieces together: derive quantities, assemble the selection,
//! build the cost function and minimise it. The outcome is a [`FitReport`]
//! holding the fitted parameters and a per-sample comparison of model and
//! observations.

use crate::config::FitConfig;
use crate::errors::Result;
use crate::optimize::minimize;
use log::{info, warn};
use ndarray::Array1;
use rsboron_core::assembly::{assemble, AssembledData};
use rsboron_core::cost::CostFunction;
use rsboron_core::dataset::Dataset;
use rsboron_core::model::{KineticParameters, ModelVariant, Prediction};
use rsboron_core::prepare::derive_quantities;
use rsboron_core::FloatValue;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Observation, model and residual of one channel for one sample
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChannelFit {
    pub observed: FloatValue,
    /// Measured standard error
    pub error: FloatValue,
    pub predicted: FloatValue,
    /// `observed - predicted`
    pub residual: FloatValue,
}

impl ChannelFit {
    fn new(observed: FloatValue, error: FloatValue, predicted: FloatValue) -> Self {
        Self {
            observed,
            error,
            predicted,
            residual: observed - predicted,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleFit {
    pub sample: String,
    pub log_rate: FloatValue,
    pub lambda_b: ChannelFit,
    pub epsilon_b: ChannelFit,
}

/// Result of fitting one model variant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitReport {
    pub variant: ModelVariant,
    pub experiment: String,
    pub phase: String,
    pub parameter_names: Vec<String>,
    pub parameters: KineticParameters,
    pub cost: FloatValue,
    pub lambda_b_bias: FloatValue,
    pub iterations: u64,
    pub evaluations: u64,
    pub converged: bool,
    pub samples: Vec<SampleFit>,
}

impl FitReport {
    /// Fitted parameters in optimiser order
    pub fn parameter_values(&self) -> Vec<FloatValue> {
        self.parameters.to_vec()
    }

    /// Root mean square of the residuals scaled by their errors, per channel
    pub fn normalised_rms(&self) -> (FloatValue, FloatValue) {
        let n = self.samples.len() as FloatValue;
        let rms = |channel: fn(&SampleFit) -> ChannelFit| {
            let sum: FloatValue = self
                .samples
                .iter()
                .map(|s| {
                    let c = channel(s);
                    (c.residual / c.error).powi(2)
                })
                .sum();
            (sum / n).sqrt()
        };
        (rms(|s| s.lambda_b), rms(|s| s.epsilon_b))
    }
}

impl fmt::Display for FitReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} model, {}/{} ({} samples)",
            self.variant,
            self.experiment,
            self.phase,
            self.samples.len()
        )?;
        writeln!(
            f,
            "cost {:.6e} after {} iterations ({} evaluations){}",
            self.cost,
            self.iterations,
            self.evaluations,
            if self.converged { "" } else { ", not converged" }
        )?;
        for (name, value) in self.parameter_names.iter().zip(self.parameter_values()) {
            writeln!(f, "  {name:>8} = {value:.6e}")?;
        }
        writeln!(
            f,
            "{:>12} {:>8} {:>12} {:>12} {:>9} {:>9}",
            "sample", "log_rate", "LambdaB", "model", "EpsilonB", "model"
        )?;
        for s in &self.samples {
            writeln!(
                f,
                "{:>12} {:>8.3} {:>12.4e} {:>12.4e} {:>9.3} {:>9.3}",
                s.sample,
                s.log_rate,
                s.lambda_b.observed,
                s.lambda_b.predicted,
                s.epsilon_b.observed,
                s.epsilon_b.predicted
            )?;
        }
        Ok(())
    }
}

/// Starting parameters derived from the data
///
/// Rate constants start at 1, forward constants at the value that
/// reproduces the mean observed LambdaB when species contribute equally,
/// `log_rb` at the mean log rate and fractionations at zero.
pub fn initial_guess(variant: ModelVariant, data: &AssembledData) -> Vec<FloatValue> {
    let inputs = &data.inputs;
    let lambda_b = data.lambda_b.values();
    let mean_log_rate = data.log_rate.mean().unwrap_or(0.0);
    let forward = |rl: &Array1<FloatValue>, share: FloatValue| {
        let scaled = lambda_b * &inputs.b_dic / rl;
        share * scaled.mean().unwrap_or(1.0)
    };

    match variant {
        ModelVariant::SingleSpecies => {
            vec![1.0, forward(&inputs.rl4, 1.0), mean_log_rate, 0.0]
        }
        ModelVariant::DualSpecies
        | ModelVariant::Bo4Fractionated
        | ModelVariant::FullyFractionated => {
            let mut guess = vec![
                1.0,
                forward(&inputs.rl3, 0.5),
                1.0,
                forward(&inputs.rl4, 0.5),
                mean_log_rate,
            ];
            guess.resize(variant.n_parameters(), 0.0);
            guess
        }
    }
}

/// Fit the configured variant to already assembled data
pub fn fit_assembled(data: &AssembledData, config: &FitConfig) -> Result<FitReport> {
    config.validate()?;
    let variant = config.variant;
    let (lambda_b, epsilon_b) = config.weighting.observations(data);
    let cost = CostFunction::new(
        variant,
        data.inputs.clone(),
        lambda_b,
        epsilon_b,
        config.lambda_b_bias,
    )?;

    let x0 = match &config.initial_parameters {
        Some(initial) => initial.clone(),
        None => initial_guess(variant, data),
    };
    info!(
        "Fitting {} model to {} samples from {:?}",
        variant,
        data.len(),
        x0
    );

    let result = minimize(&cost, &x0, &config.optimizer)?;
    if !result.converged {
        warn!(
            "{} fit did not converge within {} iterations",
            variant, config.optimizer.max_iterations
        );
    }

    let parameters = variant.decode(&result.parameters)?;
    let prediction = parameters.predict(&data.inputs)?;

    Ok(FitReport {
        variant,
        experiment: config.selection.experiment.clone(),
        phase: config.selection.phase.clone(),
        parameter_names: variant
            .parameter_names()
            .iter()
            .map(|s| s.to_string())
            .collect(),
        parameters,
        cost: result.cost,
        lambda_b_bias: cost.lambda_b_bias(),
        iterations: result.iterations,
        evaluations: result.evaluations,
        converged: result.converged,
        samples: sample_fits(data, &prediction),
    })
}

fn sample_fits(data: &AssembledData, prediction: &Prediction) -> Vec<SampleFit> {
    let lambda_b = &data.lambda_b;
    let epsilon_b = &data.epsilon_b;
    data.samples
        .iter()
        .enumerate()
        .map(|(i, sample)| SampleFit {
            sample: sample.clone(),
            log_rate: data.log_rate[i],
            lambda_b: ChannelFit::new(
                lambda_b.values()[i],
                lambda_b.errors()[i],
                prediction.lambda_b[i],
            ),
            epsilon_b: ChannelFit::new(
                epsilon_b.values()[i],
                epsilon_b.errors()[i],
                prediction.epsilon_b[i],
            ),
        })
        .collect()
}

/// Derive quantities if configured, then assemble the selection
pub fn prepare(dataset: &Dataset, config: &FitConfig) -> Result<AssembledData> {
    let data = if config.derive_quantities {
        let mut derived = dataset.clone();
        derive_quantities(&mut derived, &config.preparation)?;
        assemble(&derived, &config.selection, config.preparation.reference_ratio)?
    } else {
        assemble(dataset, &config.selection, config.preparation.reference_ratio)?
    };
    Ok(data)
}

/// Fit the configured variant to a dataset
pub fn fit(dataset: &Dataset, config: &FitConfig) -> Result<FitReport> {
    let data = prepare(dataset, config)?;
    fit_assembled(&data, config)
}

/// Fit every model variant to the same data, best first
///
/// Configured initial parameters apply only to the configured variant; the
/// other variants start from [`initial_guess`].
pub fn compare_variants(dataset: &Dataset, config: &FitConfig) -> Result<Vec<FitReport>> {
    let data = prepare(dataset, config)?;
    let mut reports = ModelVariant::ALL
        .iter()
        .map(|&variant| {
            let variant_config = FitConfig {
                variant,
                initial_parameters: if variant == config.variant {
                    config.initial_parameters.clone()
                } else {
                    None
                },
                ..config.clone()
            };
            fit_assembled(&data, &variant_config)
        })
        .collect::<Result<Vec<FitReport>>>()?;
    reports.sort_by(|a, b| a.cost.total_cmp(&b.cost));
    Ok(reports)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use rsboron_core::assembly::assemble_default;
    use rsboron_core::dataset::{SampleRecord, Speciation, Uncertain};
    use rsboron_core::isotopes::{delta_to_abundance_array, NIST951_RATIO};
    use rsboron_core::model::ModelInputs;

    const LOG_RATE: [FloatValue; 6] = [-7.0, -6.5, -6.0, -5.5, -5.0, -4.5];
    const RL3: [FloatValue; 6] = [0.22, 0.2, 0.18, 0.15, 0.13, 0.11];
    const RL4: [FloatValue; 6] = [0.8, 0.95, 1.1, 1.3, 1.5, 1.8];
    const B_DIC: [FloatValue; 6] = [0.25, 0.245, 0.24, 0.23, 0.22, 0.21];
    const DELTA_BO3: [FloatValue; 6] = [47.0, 46.5, 46.0, 45.4, 44.8, 44.1];
    const DELTA_BO4: [FloatValue; 6] = [19.6, 19.1, 18.6, 18.0, 17.4, 16.8];

    fn inputs() -> ModelInputs {
        let delta_bo3 = Array1::from(DELTA_BO3.to_vec());
        let delta_bo4 = Array1::from(DELTA_BO4.to_vec());
        ModelInputs {
            rate: Array1::from(LOG_RATE.to_vec()).mapv(|x| 10.0_f64.powf(x)),
            rl3: Array1::from(RL3.to_vec()),
            rl4: Array1::from(RL4.to_vec()),
            b_dic: Array1::from(B_DIC.to_vec()),
            abundance_bo3: delta_to_abundance_array(&delta_bo3, NIST951_RATIO),
            abundance_bo4: delta_to_abundance_array(&delta_bo4, NIST951_RATIO),
            delta_bo3,
            delta_bo4,
            reference_ratio: NIST951_RATIO,
        }
    }

    /// Records whose observations are exactly the model output for `truth`
    fn synthetic_dataset(variant: ModelVariant, truth: &[FloatValue]) -> Dataset {
        let prediction = variant.predict(truth, &inputs()).unwrap();
        let records = (0..LOG_RATE.len())
            .map(|i| {
                let mut record = SampleRecord::new(&format!("S{i}"), "Uchikawa", "Calcite");
                record.solid.log_rate = Some(LOG_RATE[i]);
                record.solid.lambda_b = Some(Uncertain::new(
                    prediction.lambda_b[i],
                    0.05 * prediction.lambda_b[i],
                ));
                record.solid.epsilon_b = Some(Uncertain::new(prediction.epsilon_b[i], 0.3));
                record.solution.d11b_bo3 = Some(Uncertain::new(DELTA_BO3[i], 0.2));
                record.solution.d11b_bo4 = Some(Uncertain::new(DELTA_BO4[i], 0.2));
                record.speciation = Some(Speciation {
                    c: Some(1.0),
                    co3: Some(1.0),
                    b: Some(B_DIC[i]),
                    boh3: Some(RL3[i]),
                    boh4_free: Some(RL4[i]),
                    ..Default::default()
                });
                record
            })
            .collect();
        Dataset::new(records)
    }

    fn config(variant: ModelVariant) -> FitConfig {
        FitConfig {
            variant,
            derive_quantities: false,
            ..Default::default()
        }
    }

    #[test]
    fn test_initial_guess_lengths() {
        let dataset = synthetic_dataset(ModelVariant::SingleSpecies, &[3.0, 0.02, -5.5, -2.0]);
        let data = assemble_default(&dataset, &Default::default()).unwrap();
        for variant in ModelVariant::ALL {
            let guess = initial_guess(variant, &data);
            assert_eq!(guess.len(), variant.n_parameters());
            assert!(guess.iter().all(|x| x.is_finite()));
        }
        assert_abs_diff_eq!(
            initial_guess(ModelVariant::DualSpecies, &data)[4],
            -5.75,
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_recovers_single_species_parameters() {
        let truth = [3.0, 0.02, -5.5, -2.0];
        let dataset = synthetic_dataset(ModelVariant::SingleSpecies, &truth);
        // EpsilonB is constant, so the default bias would be zero
        let config = FitConfig {
            lambda_b_bias: Some(1.0),
            ..config(ModelVariant::SingleSpecies)
        };

        let report = fit(&dataset, &config).unwrap();
        assert!(report.converged);
        assert!(report.cost < 1e-10);
        for (fitted, expected) in report.parameter_values().iter().zip(truth) {
            assert_abs_diff_eq!(*fitted, expected, epsilon = 1e-5);
        }
        for sample in &report.samples {
            assert_abs_diff_eq!(sample.epsilon_b.residual, 0.0, epsilon = 1e-6);
            assert!((sample.lambda_b.residual / sample.lambda_b.observed).abs() < 1e-6);
        }
    }

    #[test]
    fn test_recovers_dual_species_from_nearby_start() {
        let truth = [4.0, 0.01, 2.0, 0.02, -5.5];
        let dataset = synthetic_dataset(ModelVariant::DualSpecies, &truth);
        let config = FitConfig {
            initial_parameters: Some(truth.iter().map(|x| 1.1 * x).collect()),
            ..config(ModelVariant::DualSpecies)
        };

        let report = fit(&dataset, &config).unwrap();
        assert!(report.converged);
        assert!(report.cost < 1e-10);
        assert_eq!(report.parameter_names[4], "log_rb");
        for (fitted, expected) in report.parameter_values().iter().zip(truth) {
            assert_abs_diff_eq!(*fitted, expected, epsilon = 1e-5);
        }
        let (lambda_rms, epsilon_rms) = report.normalised_rms();
        assert!(lambda_rms < 1e-4 && epsilon_rms < 1e-4);
    }

    #[test]
    fn test_report_serialises() {
        let dataset = synthetic_dataset(ModelVariant::SingleSpecies, &[3.0, 0.02, -5.5, -2.0]);
        let config = FitConfig {
            lambda_b_bias: Some(1.0),
            optimizer: crate::optimize::NelderMeadOptions {
                max_iterations: 10,
                ..Default::default()
            },
            ..config(ModelVariant::SingleSpecies)
        };
        let report = fit(&dataset, &config).unwrap();
        assert!(!report.converged);
        assert_eq!(report.samples.len(), 6);

        let json = serde_json::to_string(&report).unwrap();
        let parsed: FitReport = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.parameters, report.parameters);
        assert!(report.to_string().contains("single_species model, Uchikawa/Calcite"));
    }

    #[test]
    fn test_compare_variants_sorted_by_cost() {
        let dataset = synthetic_dataset(ModelVariant::SingleSpecies, &[3.0, 0.02, -5.5, -2.0]);
        let config = FitConfig {
            lambda_b_bias: Some(1.0),
            ..config(ModelVariant::SingleSpecies)
        };
        let reports = compare_variants(&dataset, &config).unwrap();
        assert_eq!(reports.len(), 4);
        assert!(reports.windows(2).all(|w| w[0].cost <= w[1].cost));
    }

    #[test]
    fn test_wrong_initial_length() {
        let dataset = synthetic_dataset(ModelVariant::SingleSpecies, &[3.0, 0.02, -5.5, -2.0]);
        let config = FitConfig {
            initial_parameters: Some(vec![1.0]),
            ..config(ModelVariant::SingleSpecies)
        };
        assert!(matches!(
            fit(&dataset, &config),
            Err(crate::errors::Error::Config(_))
        ));
    }
}
