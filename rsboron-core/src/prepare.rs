//! Derived quantities
//!
//! Turns raw measurements into the quantities the model is fitted against.
//! The steps run in order, each reading fields written by the previous one:
//!
//! 1. [`speciate`]: carbon and boron speciation of every solution, via an
//!    external [`SpeciationEngine`]
//! 2. [`calculate_lambda`]: LambdaB from the solid B/Ca
//! 3. [`calculate_solution_isotopes`]: delta 11B of B(OH)3 and B(OH)4-
//! 4. [`calculate_epsilon`]: EpsilonB, the solid offset from B(OH)4-
//!
//! Steps 2-4 are bundled as [`derive_quantities`] and all four as [`process`].

use crate::dataset::{require, Dataset, Speciation, Uncertain};
use crate::errors::{BoronError, BoronResult};
use crate::isotopes::{BORATE_FRACTIONATION, NIST951_RATIO};
use crate::solution;
use crate::FloatValue;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Solution composition passed to a speciation engine
///
/// Concentrations in mol/L.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SolutionComposition {
    /// unit: degC
    pub temperature: FloatValue,
    pub ph: FloatValue,
    pub na: FloatValue,
    pub cl: FloatValue,
    pub k: FloatValue,
    pub b: FloatValue,
    pub ca: FloatValue,
    pub dic: FloatValue,
    pub mg: FloatValue,
    pub so4: FloatValue,
}

/// An equilibrium speciation calculation
///
/// Implementations wrap an external chemistry engine; the model treats the
/// engine as a black box. Engines that load a thermodynamic database take a
/// [`SpeciationConfig`] in their constructor.
pub trait SpeciationEngine {
    fn speciate(&self, composition: &SolutionComposition) -> BoronResult<Speciation>;
}

/// Location of the speciation engine and its thermodynamic database
///
/// Passed to [`SpeciationEngine`] implementations when they are created. Fit
/// configuration does not carry it, since fits start from speciated records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeciationConfig {
    /// Name of the thermodynamic database, without extension
    /// default: pitzer
    pub database: String,
    /// Directory containing the database files
    /// default: database
    pub database_dir: PathBuf,
    /// Path to the engine's shared library
    /// default: /usr/local/lib/libiphreeqc.so
    pub library_path: PathBuf,
}

impl Default for SpeciationConfig {
    fn default() -> Self {
        Self {
            database: "pitzer".to_string(),
            database_dir: PathBuf::from("database"),
            library_path: PathBuf::from("/usr/local/lib/libiphreeqc.so"),
        }
    }
}

impl SpeciationConfig {
    /// Full path of the database file
    pub fn database_file(&self) -> PathBuf {
        self.database_dir.join(format!("{}.dat", self.database))
    }
}

/// Solution boron species used as the LambdaB numerator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LambdaNumerator {
    /// Total dissolved boron
    #[default]
    TotalBoron,
    /// B(OH)3
    BoricAcid,
    /// Total B(OH)4-, including ion pairs
    Borate,
    /// Free B(OH)4-
    FreeBorate,
}

impl LambdaNumerator {
    fn value(&self, speciation: &Speciation, sample: &str) -> BoronResult<FloatValue> {
        let (value, field) = match self {
            LambdaNumerator::TotalBoron => (speciation.b, "b"),
            LambdaNumerator::BoricAcid => (speciation.boh3, "boh3"),
            LambdaNumerator::Borate => (speciation.boh4, "boh4"),
            LambdaNumerator::FreeBorate => (speciation.boh4_free, "boh4_free"),
        };
        require(value, sample, "speciation", field)
    }
}

/// Solution carbon species used as the LambdaB denominator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LambdaDenominator {
    /// Dissolved inorganic carbon
    #[default]
    Dic,
    Bicarbonate,
    Carbonate,
}

impl LambdaDenominator {
    fn value(&self, speciation: &Speciation, sample: &str) -> BoronResult<FloatValue> {
        let (value, field) = match self {
            LambdaDenominator::Dic => (speciation.c, "c"),
            LambdaDenominator::Bicarbonate => (speciation.hco3, "hco3"),
            LambdaDenominator::Carbonate => (speciation.co3, "co3"),
        };
        require(value, sample, "speciation", field)
    }
}

/// Which B(OH)4- concentration sets the species isotope mass balance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BorateMode {
    /// B(OH)4- including ion pairs
    #[default]
    Total,
    /// Free B(OH)4- only
    Free,
}

/// Options for deriving LambdaB, species isotopes and EpsilonB
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreparationOptions {
    /// default: total_boron
    pub lambda_numerator: LambdaNumerator,
    /// default: dic
    pub lambda_denominator: LambdaDenominator,
    /// default: total
    pub borate_mode: BorateMode,
    /// B(OH)3/B(OH)4- fractionation factor
    /// default: 1.026
    pub alpha: FloatValue,
    /// 11B/10B of the delta reference
    /// default: 4.04367 (NIST951)
    pub reference_ratio: FloatValue,
}

impl Default for PreparationOptions {
    fn default() -> Self {
        Self {
            lambda_numerator: LambdaNumerator::TotalBoron,
            lambda_denominator: LambdaDenominator::Dic,
            borate_mode: BorateMode::Total,
            alpha: BORATE_FRACTIONATION,
            reference_ratio: NIST951_RATIO,
        }
    }
}

/// Step used for the numerical sensitivity of species deltas to the bulk delta
/// unit: per mil
const DELTA_STEP: FloatValue = 1e-3;

/// Calculate the speciation of every solution
pub fn speciate<E: SpeciationEngine + ?Sized>(dataset: &mut Dataset, engine: &E) -> BoronResult<()> {
    for record in dataset.iter_mut() {
        let sample = record.sample.as_str();
        let s = &record.solution;
        let composition = SolutionComposition {
            temperature: require(s.temperature, sample, "solution", "temperature")?,
            ph: require(s.ph, sample, "solution", "ph")?,
            na: s.na.unwrap_or(0.0),
            cl: s.cl.unwrap_or(0.0),
            k: s.k.unwrap_or(0.0),
            b: require(s.b, sample, "solution", "b")?,
            ca: require(s.ca, sample, "solution", "ca")?,
            dic: require(s.dic, sample, "solution", "dic")?,
            mg: s.mg.unwrap_or(0.0),
            so4: s.so4.unwrap_or(0.0),
        };
        let speciation = engine.speciate(&composition)?;
        debug!("Speciated {}: pH {:?}", record, speciation.ph);
        record.speciation = Some(speciation);
    }
    Ok(())
}

/// Calculate LambdaB for every record with a solid B/Ca
///
/// $$\Lambda_B = \frac{10^{-3} \, B/Ca}{[numerator] / [denominator]}$$
///
/// with B/Ca in umol/mol. Records without B/Ca are left untouched.
pub fn calculate_lambda(
    dataset: &mut Dataset,
    numerator: LambdaNumerator,
    denominator: LambdaDenominator,
) -> BoronResult<()> {
    for record in dataset.iter_mut() {
        let Some(b_ca) = record.solid.b_ca else {
            continue;
        };
        let speciation = record.speciation()?;
        let solution_ratio = numerator.value(speciation, &record.sample)?
            / denominator.value(speciation, &record.sample)?;
        if !solution_ratio.is_finite() || solution_ratio <= 0.0 {
            return Err(BoronError::domain(
                "LambdaB",
                format!("solution B/C ratio of {record} is {solution_ratio}"),
            ));
        }
        record.solid.lambda_b = Some(b_ca.scale(1e-3 / solution_ratio));
    }
    Ok(())
}

/// Calculate the delta 11B of B(OH)3 and B(OH)4- for every record with a
/// bulk solution delta
///
/// The standard error of each species delta is the bulk error scaled by the
/// sensitivity of the species delta to the bulk delta.
pub fn calculate_solution_isotopes(
    dataset: &mut Dataset,
    borate_mode: BorateMode,
    alpha: FloatValue,
    reference_ratio: FloatValue,
) -> BoronResult<()> {
    for record in dataset.iter_mut() {
        let Some(d11b) = record.solution.d11b else {
            continue;
        };
        let speciation = record.speciation()?;
        let sample = record.sample.as_str();
        let bo4 = match borate_mode {
            BorateMode::Total => require(speciation.boh4, sample, "speciation", "boh4")?,
            BorateMode::Free => require(speciation.boh4_free, sample, "speciation", "boh4_free")?,
        };
        let ph = require(speciation.ph, sample, "speciation", "ph")?;
        let total_b = require(speciation.b, sample, "speciation", "b")?;
        let solve =
            |delta: FloatValue| solution::solve(ph, total_b, bo4, alpha, delta, reference_ratio);

        let deltas = solve(d11b.nominal())?;
        let upper = solve(d11b.nominal() + DELTA_STEP)?;
        let lower = solve(d11b.nominal() - DELTA_STEP)?;
        let sensitivity_bo4 = (upper.bo4 - lower.bo4) / (2.0 * DELTA_STEP);
        let sensitivity_bo3 = (upper.bo3 - lower.bo3) / (2.0 * DELTA_STEP);

        record.solution.d11b_bo4 = Some(Uncertain::new(
            deltas.bo4,
            d11b.std_dev() * sensitivity_bo4.abs(),
        ));
        record.solution.d11b_bo3 = Some(Uncertain::new(
            deltas.bo3,
            d11b.std_dev() * sensitivity_bo3.abs(),
        ));
    }
    Ok(())
}

/// Calculate EpsilonB for every record with a solid delta 11B
///
/// Solid and solution are measured independently, so their errors combine in
/// quadrature.
pub fn calculate_epsilon(dataset: &mut Dataset) -> BoronResult<()> {
    for record in dataset.iter_mut() {
        let Some(d11b_solid) = record.solid.d11b else {
            continue;
        };
        let d11b_bo4 = require(
            record.solution.d11b_bo4,
            &record.sample,
            "solution",
            "d11b_bo4",
        )?;
        record.solid.epsilon_b = Some(d11b_solid.difference(&d11b_bo4));
    }
    Ok(())
}

/// Run every derivation that follows speciation
pub fn derive_quantities(dataset: &mut Dataset, options: &PreparationOptions) -> BoronResult<()> {
    calculate_lambda(
        dataset,
        options.lambda_numerator,
        options.lambda_denominator,
    )?;
    calculate_solution_isotopes(
        dataset,
        options.borate_mode,
        options.alpha,
        options.reference_ratio,
    )?;
    calculate_epsilon(dataset)?;
    dataset.sort();
    info!("Derived LambdaB and EpsilonB for {} records", dataset.len());
    Ok(())
}

/// Speciate every solution and derive the fitted quantities
pub fn process<E: SpeciationEngine + ?Sized>(
    dataset: &mut Dataset,
    engine: &E,
    options: &PreparationOptions,
) -> BoronResult<()> {
    speciate(dataset, engine)?;
    derive_quantities(dataset, options)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::SampleRecord;
    use approx::assert_abs_diff_eq;
    use std::cell::Cell;

    /// Fixed speciation: 20% of boron as total borate, 15% free
    struct FixedFraction {
        calls: Cell<usize>,
    }

    impl SpeciationEngine for FixedFraction {
        fn speciate(&self, composition: &SolutionComposition) -> BoronResult<Speciation> {
            self.calls.set(self.calls.get() + 1);
            Ok(Speciation {
                c: Some(composition.dic),
                hco3: Some(0.9 * composition.dic),
                co3: Some(0.08 * composition.dic),
                b: Some(composition.b),
                boh3: Some(0.8 * composition.b),
                boh4: Some(0.2 * composition.b),
                boh4_free: Some(0.15 * composition.b),
                ph: Some(composition.ph),
                temperature: Some(composition.temperature),
                ..Default::default()
            })
        }
    }

    fn raw_record(sample: &str) -> SampleRecord {
        let mut record = SampleRecord::new(sample, "Uchikawa", "Calcite");
        record.solution.temperature = Some(25.0);
        record.solution.ph = Some(8.2);
        record.solution.b = Some(4e-4);
        record.solution.ca = Some(1e-2);
        record.solution.dic = Some(2e-3);
        record.solution.d11b = Some(Uncertain::new(39.5, 0.3));
        record.solid.b_ca = Some(Uncertain::new(100.0, 5.0));
        record.solid.d11b = Some(Uncertain::new(22.0, 0.4));
        record
    }

    // ===== Speciation Tests =====

    #[test]
    fn test_speciate_fills_every_record() {
        let mut dataset = Dataset::new(vec![raw_record("a"), raw_record("b")]);
        let engine = FixedFraction {
            calls: Cell::new(0),
        };
        speciate(&mut dataset, &engine).unwrap();

        assert_eq!(engine.calls.get(), 2);
        assert!(dataset.iter().all(|r| r.speciation.is_some()));
    }

    #[test]
    fn test_speciate_requires_composition() {
        let mut record = raw_record("a");
        record.solution.dic = None;
        let mut dataset = Dataset::new(vec![record]);
        let engine = FixedFraction {
            calls: Cell::new(0),
        };

        let err = speciate(&mut dataset, &engine).unwrap_err();
        assert!(matches!(err, BoronError::MissingField { field, .. } if field == "dic"));
    }

    #[test]
    fn test_database_file() {
        let config = SpeciationConfig {
            database_dir: PathBuf::from("/opt/phreeqc/database"),
            ..Default::default()
        };
        assert_eq!(
            config.database_file(),
            PathBuf::from("/opt/phreeqc/database/pitzer.dat")
        );
    }

    #[test]
    fn test_options_from_toml() {
        let options: PreparationOptions = toml::from_str(
            r#"
            lambda_numerator = "free_borate"
            borate_mode = "free"
            alpha = 1.0272
            "#,
        )
        .unwrap();
        assert_eq!(options.lambda_numerator, LambdaNumerator::FreeBorate);
        assert_eq!(options.lambda_denominator, LambdaDenominator::Dic);
        assert_eq!(options.borate_mode, BorateMode::Free);
        assert_eq!(options.reference_ratio, NIST951_RATIO);

        let config: SpeciationConfig = toml::from_str("database = \"phreeqc\"").unwrap();
        assert_eq!(config.database_file(), PathBuf::from("database/phreeqc.dat"));
    }

    // ===== Derived Quantity Tests =====

    #[test]
    fn test_lambda_from_b_ca() {
        let mut dataset = Dataset::new(vec![raw_record("a")]);
        let engine = FixedFraction {
            calls: Cell::new(0),
        };
        speciate(&mut dataset, &engine).unwrap();
        calculate_lambda(
            &mut dataset,
            LambdaNumerator::TotalBoron,
            LambdaDenominator::Dic,
        )
        .unwrap();

        // B/DIC = 0.2, so LambdaB = 0.1 / 0.2
        let lambda = dataset.records[0].solid.lambda_b.unwrap();
        assert_abs_diff_eq!(lambda.nominal(), 0.5, epsilon = 1e-12);
        assert_abs_diff_eq!(lambda.std_dev(), 0.025, epsilon = 1e-12);
    }

    #[test]
    fn test_lambda_requires_speciation() {
        let mut dataset = Dataset::new(vec![raw_record("a")]);
        assert!(matches!(
            calculate_lambda(&mut dataset, LambdaNumerator::Borate, LambdaDenominator::Carbonate),
            Err(BoronError::MissingField { .. })
        ));
    }

    #[test]
    fn test_lambda_requires_selected_species() {
        let mut dataset = Dataset::new(vec![raw_record("a")]);
        dataset.records[0].speciation = Some(Speciation {
            c: Some(2e-3),
            b: Some(4e-4),
            ..Default::default()
        });

        calculate_lambda(&mut dataset, LambdaNumerator::TotalBoron, LambdaDenominator::Dic)
            .unwrap();
        let err = calculate_lambda(
            &mut dataset,
            LambdaNumerator::TotalBoron,
            LambdaDenominator::Carbonate,
        )
        .unwrap_err();
        assert_eq!(
            err,
            BoronError::MissingField {
                sample: "a".to_string(),
                category: "speciation".to_string(),
                field: "co3".to_string(),
            }
        );

        let err = calculate_solution_isotopes(&mut dataset, BorateMode::Free, 1.026, NIST951_RATIO)
            .unwrap_err();
        assert!(matches!(err, BoronError::MissingField { field, .. } if field == "boh4_free"));
    }

    #[test]
    fn test_process_end_to_end() {
        let mut dataset = Dataset::new(vec![raw_record("a"), raw_record("b")]);
        let engine = FixedFraction {
            calls: Cell::new(0),
        };
        process(&mut dataset, &engine, &PreparationOptions::default()).unwrap();

        for record in dataset.iter() {
            let bo4 = record.solution.d11b_bo4.unwrap();
            let bo3 = record.solution.d11b_bo3.unwrap();
            assert!(bo4.nominal() < 39.5 && bo3.nominal() > 39.5);

            // Species track the bulk delta almost one-to-one
            assert!(bo4.std_dev() > 0.25 && bo4.std_dev() < 0.35);

            let epsilon = record.solid.epsilon_b.unwrap();
            assert_abs_diff_eq!(epsilon.nominal(), 22.0 - bo4.nominal(), epsilon = 1e-12);
            assert_abs_diff_eq!(
                epsilon.std_dev(),
                (0.4_f64.powi(2) + bo4.std_dev().powi(2)).sqrt(),
                epsilon = 1e-12
            );
        }
    }

    #[test]
    fn test_free_borate_mode_changes_species() {
        let engine = FixedFraction {
            calls: Cell::new(0),
        };
        let mut total = Dataset::new(vec![raw_record("a")]);
        let mut free = total.clone();
        speciate(&mut total, &engine).unwrap();
        speciate(&mut free, &engine).unwrap();

        calculate_solution_isotopes(&mut total, BorateMode::Total, 1.026, NIST951_RATIO).unwrap();
        calculate_solution_isotopes(&mut free, BorateMode::Free, 1.026, NIST951_RATIO).unwrap();

        let total_bo4 = total.records[0].solution.d11b_bo4.unwrap().nominal();
        let free_bo4 = free.records[0].solution.d11b_bo4.unwrap().nominal();
        // Less borate leaves it closer to the boric acid end member
        assert!(free_bo4 < total_bo4);
    }

    #[test]
    fn test_epsilon_requires_species_delta() {
        let mut dataset = Dataset::new(vec![raw_record("a")]);
        let err = calculate_epsilon(&mut dataset).unwrap_err();
        assert!(matches!(err, BoronError::MissingField { field, .. } if field == "d11b_bo4"));
    }
}
