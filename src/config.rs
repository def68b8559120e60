//! Run files: every parameter of a simulation run, stored as TOML.

use crate::construction::StartPoint;
use crate::error::SimError;
use crate::model::Model;
use crate::population::PopulationParams;
use crate::synthesizer::DatasetParams;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

fn default_quantiles() -> usize {
    3
}

fn default_population() -> usize {
    1000
}

fn default_tries() -> usize {
    50000
}

fn default_fraction() -> f64 {
    1.0
}

fn default_total_attributes() -> usize {
    100
}

fn default_case_count() -> usize {
    400
}

fn default_replicates() -> usize {
    100
}

fn default_maf_min() -> f64 {
    0.01
}

fn default_maf_max() -> f64 {
    0.5
}

fn default_delimiter() -> char {
    '\t'
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default)]
    pub id: Option<String>,
    pub heritability: f64,
    #[serde(default)]
    pub prevalence: Option<f64>,
    #[serde(default)]
    pub use_odds_ratio: bool,
    #[serde(default = "default_fraction")]
    pub fraction: f64,
    /// Numbered `P1, P2, ...` across all models when omitted.
    #[serde(default)]
    pub attribute_names: Option<Vec<String>>,
    pub minor_allele_frequencies: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetConfig {
    /// Base name of the dataset files, or their directory when a run has several datasets.
    pub output: PathBuf,
    #[serde(default = "default_total_attributes")]
    pub total_attributes: usize,
    #[serde(default = "default_case_count")]
    pub cases: usize,
    #[serde(default = "default_case_count")]
    pub controls: usize,
    #[serde(default = "default_replicates")]
    pub replicates: usize,
    #[serde(default = "default_maf_min")]
    pub maf_min: f64,
    #[serde(default = "default_maf_max")]
    pub maf_max: f64,
    /// Also write each replicate's per-cell case and control counts.
    #[serde(default)]
    pub write_counts: bool,
}

impl DatasetConfig {
    pub fn params(&self) -> DatasetParams {
        DatasetParams {
            total_attribute_count: self.total_attributes,
            case_count: self.cases,
            control_count: self.controls,
            noise_maf_min: self.maf_min,
            noise_maf_max: self.maf_max,
        }
    }

    pub fn validate(&self) -> Result<(), SimError> {
        if !(0.0..=0.5).contains(&self.maf_min) || !(0.0..=0.5).contains(&self.maf_max) {
            return Err(SimError::input(format!(
                "Noise minor allele frequencies must be within [0, 0.5], got {} to {}",
                self.maf_min, self.maf_max
            )));
        }
        if self.maf_min > self.maf_max {
            return Err(SimError::input(format!(
                "Minimum noise minor allele frequency {} exceeds the maximum {}",
                self.maf_min, self.maf_max
            )));
        }
        if self.cases + self.controls == 0 {
            return Err(SimError::input("A dataset needs at least one case or control"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default = "default_quantiles")]
    pub quantiles: usize,
    #[serde(default = "default_population")]
    pub population: usize,
    #[serde(default = "default_tries")]
    pub tries: usize,
    #[serde(default)]
    pub start_at_origin: bool,
    /// Where the selected tables and population scores are written.
    #[serde(default)]
    pub model_output: Option<PathBuf>,
    /// Table files whose quantiles are added to the generated ones.
    #[serde(default)]
    pub model_inputs: Vec<PathBuf>,
    #[serde(default)]
    pub model_input_fractions: Vec<f64>,
    #[serde(default)]
    pub predictive_input: Option<PathBuf>,
    #[serde(default)]
    pub noise_input: Option<PathBuf>,
    /// Field separator of both passthrough files.
    #[serde(default = "default_delimiter")]
    pub passthrough_delimiter: char,
    #[serde(default, rename = "model")]
    pub models: Vec<ModelConfig>,
    #[serde(default, rename = "dataset")]
    pub datasets: Vec<DatasetConfig>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            seed: None,
            quantiles: default_quantiles(),
            population: default_population(),
            tries: default_tries(),
            start_at_origin: false,
            model_output: None,
            model_inputs: Vec::new(),
            model_input_fractions: Vec::new(),
            predictive_input: None,
            noise_input: None,
            passthrough_delimiter: default_delimiter(),
            models: Vec::new(),
            datasets: Vec::new(),
        }
    }
}

impl RunConfig {
    pub fn from_toml(text: &str) -> Result<Self, SimError> {
        Ok(toml::from_str(text)?)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, SimError> {
        let text = fs::read_to_string(path.as_ref())?;
        Self::from_toml(&text)
    }

    pub fn population_params(&self) -> PopulationParams {
        PopulationParams {
            quantile_count: self.quantiles,
            population_size: self.population,
            try_count: self.tries,
            start_point: if self.start_at_origin {
                StartPoint::Origin
            } else {
                StartPoint::Random
            },
        }
    }

    /// Builds validated models, naming unnamed loci `P1, P2, ...` in model order.
    pub fn models(&self) -> Result<Vec<Model>, SimError> {
        let mut next_name = 1;
        let mut models = Vec::with_capacity(self.models.len());
        for (i, mc) in self.models.iter().enumerate() {
            let id = mc.id.clone().unwrap_or_else(|| format!("Model {}", i + 1));
            let mut model = Model::new(id, mc.heritability);
            model.prevalence = mc.prevalence;
            model.use_odds_ratio = mc.use_odds_ratio;
            model.fraction = mc.fraction;
            model.minor_allele_frequencies = mc.minor_allele_frequencies.clone();
            model.attribute_names = match &mc.attribute_names {
                Some(names) => names.clone(),
                None => (0..mc.minor_allele_frequencies.len())
                    .map(|j| format!("P{}", next_name + j))
                    .collect(),
            };
            next_name += model.locus_count();
            model.validate()?;
            models.push(model);
        }
        Ok(models)
    }

    pub fn validate(&self) -> Result<(), SimError> {
        if self.quantiles == 0 {
            return Err(SimError::input("The quantile count must be at least 1"));
        }
        if !self.models.is_empty() && self.population < self.quantiles {
            return Err(SimError::input(format!(
                "A population of {} tables cannot supply {} quantiles",
                self.population, self.quantiles
            )));
        }
        if self.models.is_empty() && self.model_inputs.is_empty() {
            return Err(SimError::input(
                "A run needs at least one model or model input file",
            ));
        }
        if !self.passthrough_delimiter.is_ascii() {
            return Err(SimError::input(format!(
                "Passthrough delimiter '{}' must be a single ASCII character",
                self.passthrough_delimiter
            )));
        }
        if self.model_input_fractions.iter().any(|&f| !(f >= 0.0)) {
            return Err(SimError::input("Model input fractions must not be negative"));
        }
        for dataset in self.datasets.iter() {
            dataset.validate()?;
        }
        self.models().map(|_| ())
    }
}
