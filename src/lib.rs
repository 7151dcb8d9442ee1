//! Fitting of kinetic boron partitioning models
//!
//! The models themselves live in [`rsboron_core`]; this crate adds a
//! Nelder–Mead minimiser, TOML fit configuration and fit reports.

pub mod config;
pub mod errors;
pub mod fit;
pub mod optimize;

pub use errors::{Error, Result};
