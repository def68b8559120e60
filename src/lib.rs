#![crate_name = "epigen"]
//! Purely epistatic penetrance tables and the case/control datasets sampled from them.
//!
//! A run searches a population of random tables for every [`Model`], keeps
//! evenly spaced quantiles of that population by score, and samples
//! replicate datasets whose class depends on the genotypes at each table's
//! loci and on nothing else.

pub mod prelude;

pub mod config;
pub mod construction;
pub mod error;
pub mod genetics;
pub mod hypercube;
pub mod model;
pub mod normalize;
pub mod observable;
pub mod penetrance;
pub mod population;
pub mod simulator;
pub mod synthesizer;
pub mod table_io;

pub use config::{DatasetConfig, ModelConfig, RunConfig};
pub use error::{ConstructionError, NormalizeError, SimError};
pub use model::{Model, Quantile};
pub use penetrance::{PenetranceTable, Scores, TableState};
pub use simulator::{run, RunSummary, Simulator};
