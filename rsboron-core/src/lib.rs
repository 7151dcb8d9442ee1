//! Kinetic partitioning of boron isotopes between aqueous solution and
//! calcium carbonate.
//!
//! The crate is organised bottom-up:
//!
//! - [`isotopes`] and [`solution`]: isotope unit conversions and the
//!   speciation of dissolved boron isotopes
//! - [`model`]: the forward model predicting LambdaB and EpsilonB from
//!   precipitation rate
//! - [`cost`]: a weighted misfit of predictions against observations
//! - [`dataset`], [`prepare`] and [`assembly`]: the experimental data, the
//!   quantities derived from it, and the arrays handed to the model

pub mod assembly;
pub mod cost;
pub mod dataset;
pub mod errors;
pub mod isotopes;
pub mod model;
pub mod prepare;
pub mod solution;
pub mod weighted;

pub type FloatValue = f64;
