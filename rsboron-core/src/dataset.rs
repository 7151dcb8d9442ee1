//! Tabular experimental dataset
//!
//! Each [`SampleRecord`] is one row of the dataset, identified by
//! `(sample, experiment, phase)`. Measurements are grouped into three
//! categories with named fields:
//!
//! - [`SolidMeasurements`]: the precipitated carbonate
//! - [`SolutionMeasurements`]: the solution it grew from
//! - [`Speciation`]: carbon and boron speciation of the solution, produced by
//!   an external speciation engine
//!
//! Fields that are not measured for every sample, or that are derived later
//! in the pipeline, are optional. Reading an absent field through
//! [`require`] yields [`BoronError::MissingField`] naming the sample, category
//! and field.

use crate::errors::{BoronError, BoronResult};
use crate::FloatValue;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A measured value and its standard error
///
/// Only the two accessors are needed by the model; propagation of
/// uncertainty through arbitrary arithmetic is out of scope.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Uncertain {
    pub value: FloatValue,
    pub std_dev: FloatValue,
}

impl Uncertain {
    pub fn new(value: FloatValue, std_dev: FloatValue) -> Self {
        Self { value, std_dev }
    }

    /// Nominal value
    pub fn nominal(&self) -> FloatValue {
        self.value
    }

    /// Standard error
    pub fn std_dev(&self) -> FloatValue {
        self.std_dev
    }

    /// Multiply by an exact constant
    pub fn scale(&self, factor: FloatValue) -> Self {
        Self {
            value: self.value * factor,
            std_dev: self.std_dev * factor.abs(),
        }
    }

    /// Difference of two independent measurements
    ///
    /// Standard errors are combined in quadrature.
    pub fn difference(&self, other: &Uncertain) -> Self {
        Self {
            value: self.value - other.value,
            std_dev: self.std_dev.hypot(other.std_dev),
        }
    }
}

/// Measurements of the precipitated solid
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolidMeasurements {
    /// Precipitation rate
    /// unit: mol/m2/s
    pub rate: Option<FloatValue>,
    /// Base-10 logarithm of the precipitation rate
    pub log_rate: Option<FloatValue>,
    /// Solid B/Ca
    /// unit: umol/mol
    pub b_ca: Option<Uncertain>,
    /// delta 11B of the solid
    /// unit: per mil vs NIST951
    pub d11b: Option<Uncertain>,
    /// Boron partition coefficient, derived
    pub lambda_b: Option<Uncertain>,
    /// Isotopic offset between solid and aqueous B(OH)4-, derived
    /// unit: per mil
    pub epsilon_b: Option<Uncertain>,
}

/// Measurements of the growth solution
///
/// Concentrations are the inputs to the speciation engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolutionMeasurements {
    /// unit: degC
    pub temperature: Option<FloatValue>,
    /// NBS scale
    pub ph: Option<FloatValue>,
    /// unit: mol/L
    pub na: Option<FloatValue>,
    /// unit: mol/L
    pub cl: Option<FloatValue>,
    /// unit: mol/L
    pub k: Option<FloatValue>,
    /// unit: mol/L
    pub b: Option<FloatValue>,
    /// unit: mol/L
    pub ca: Option<FloatValue>,
    /// unit: mol/L
    pub dic: Option<FloatValue>,
    /// unit: mol/L
    pub mg: Option<FloatValue>,
    /// unit: mol/L
    pub so4: Option<FloatValue>,
    /// Bulk delta 11B of dissolved boron
    /// unit: per mil vs NIST951
    pub d11b: Option<Uncertain>,
    /// delta 11B of B(OH)3, derived
    pub d11b_bo3: Option<Uncertain>,
    /// delta 11B of B(OH)4-, derived
    pub d11b_bo4: Option<Uncertain>,
}

/// Carbon and boron speciation of a solution
///
/// All concentrations in mol/kgw. Engines need not report every quantity;
/// absent ones are read through [`require`] with category `speciation`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Speciation {
    /// Dissolved inorganic carbon
    pub c: Option<FloatValue>,
    pub co2: Option<FloatValue>,
    pub hco3: Option<FloatValue>,
    pub co3: Option<FloatValue>,
    /// Total boron
    pub b: Option<FloatValue>,
    /// B(OH)3
    pub boh3: Option<FloatValue>,
    /// Total B(OH)4-, including ion pairs
    pub boh4: Option<FloatValue>,
    /// Free B(OH)4-
    pub boh4_free: Option<FloatValue>,
    pub ph: Option<FloatValue>,
    pub temperature: Option<FloatValue>,
    /// unit: eq/kgw
    pub alkalinity: Option<FloatValue>,
    pub si_calcite: Option<FloatValue>,
    pub si_aragonite: Option<FloatValue>,
    pub ionic_strength: Option<FloatValue>,
}

/// One row of the dataset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleRecord {
    pub sample: String,
    pub experiment: String,
    pub phase: String,
    #[serde(default)]
    pub solid: SolidMeasurements,
    #[serde(default)]
    pub solution: SolutionMeasurements,
    #[serde(default)]
    pub speciation: Option<Speciation>,
}

impl SampleRecord {
    pub fn new(sample: &str, experiment: &str, phase: &str) -> Self {
        Self {
            sample: sample.to_string(),
            experiment: experiment.to_string(),
            phase: phase.to_string(),
            solid: SolidMeasurements::default(),
            solution: SolutionMeasurements::default(),
            speciation: None,
        }
    }

    /// Speciation results, which must already have been calculated
    pub fn speciation(&self) -> BoronResult<&Speciation> {
        self.speciation
            .as_ref()
            .ok_or_else(|| missing(&self.sample, "speciation", "*"))
    }

    fn key(&self) -> (&str, &str, &str) {
        (&self.sample, &self.experiment, &self.phase)
    }
}

impl fmt::Display for SampleRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.sample, self.experiment, self.phase)
    }
}

/// Read an optional field, failing with an error that names it
pub fn require<T: Copy>(
    value: Option<T>,
    sample: &str,
    category: &str,
    field: &str,
) -> BoronResult<T> {
    value.ok_or_else(|| missing(sample, category, field))
}

fn missing(sample: &str, category: &str, field: &str) -> BoronError {
    BoronError::MissingField {
        sample: sample.to_string(),
        category: category.to_string(),
        field: field.to_string(),
    }
}

/// A collection of sample records
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    pub records: Vec<SampleRecord>,
}

impl Dataset {
    pub fn new(records: Vec<SampleRecord>) -> Self {
        let mut dataset = Self { records };
        dataset.sort();
        dataset
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Order records by `(sample, experiment, phase)`
    pub fn sort(&mut self) {
        self.records.sort_by(|a, b| a.key().cmp(&b.key()));
    }

    pub fn iter(&self) -> impl Iterator<Item = &SampleRecord> {
        self.records.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut SampleRecord> {
        self.records.iter_mut()
    }

    /// Records belonging to an experiment and phase, in index order
    pub fn select(&self, experiment: &str, phase: &str) -> Vec<&SampleRecord> {
        let mut selected: Vec<&SampleRecord> = self
            .records
            .iter()
            .filter(|r| r.experiment == experiment && r.phase == phase)
            .collect();
        selected.sort_by(|a, b| a.key().cmp(&b.key()));
        selected
    }

    /// Distinct experiment names, sorted
    pub fn experiments(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.records.iter().map(|r| r.experiment.as_str()).collect();
        names.sort_unstable();
        names.dedup();
        names
    }
}
