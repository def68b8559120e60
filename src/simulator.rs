//! Drives a whole run: table search for every model, quantile assembly,
//! output of tables and scores, then dataset replicates.

use crate::config::{DatasetConfig, RunConfig};
use crate::error::SimError;
use crate::model::{combine_into_quantiles, Model, Quantile};
use crate::observable::{Passthrough, PassthroughBuilder};
use crate::population::{generate_population, PopulationParams, ProgressHandler};
use crate::synthesizer::synthesize;
use crate::table_io::{self, ScoreName};
use log::{debug, error, info};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Owns the random number generator and the quantiles shared by every dataset.
pub struct Simulator {
    rng: StdRng,
    quantiles: Vec<Quantile>,
}

/// Outcome of the table search for each model, in model order.
#[derive(Debug, Default)]
pub struct TableSearch {
    /// Population scores of models whose search succeeded.
    pub scores: Vec<Vec<f64>>,
    /// Models whose search failed, with the reason.
    pub failures: Vec<(String, SimError)>,
}

fn strip_txt(name: &str) -> &str {
    match name.len().checked_sub(4).and_then(|i| name.get(i..).map(|ext| (i, ext))) {
        Some((i, ext)) if ext.eq_ignore_ascii_case(".txt") => &name[..i],
        _ => name,
    }
}

/// Splits an output path into its directory and base file name without `.txt`.
fn split_output(path: &Path) -> (PathBuf, String) {
    let directory = path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    let name = path
        .file_name()
        .map(|n| strip_txt(&n.to_string_lossy()).to_string())
        .unwrap_or_default();
    (directory, name)
}

/// Left-pads `n` with zeros to the width of `largest`.
fn padded(n: usize, largest: usize) -> String {
    let width = largest.to_string().len();
    format!("{:0width$}", n, width = width)
}

impl Simulator {
    /// Seeds the generator from `seed`, or from system entropy when absent.
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            rng,
            quantiles: Vec::new(),
        }
    }

    pub fn quantiles(&self) -> &[Quantile] {
        &self.quantiles
    }

    /// Searches a population for every model and stores each model's selected tables.
    ///
    /// A failing model is logged and reported but does not stop the others.
    pub fn generate_tables_for_models(
        &mut self,
        models: &mut [Model],
        params: &PopulationParams,
        progress: &mut dyn ProgressHandler,
    ) -> TableSearch {
        info!("Generating tables for {} models", models.len());
        progress.set_maximum(models.len() * params.try_count);
        let mut search = TableSearch::default();
        for (i, model) in models.iter_mut().enumerate() {
            let base = i * params.try_count;
            match generate_population(&mut self.rng, model, params, progress, base) {
                Ok(population) => {
                    search.scores.push(population.scores());
                    model.tables = population.into_quantiles(params.quantile_count);
                }
                Err(e) => {
                    error!("{}", e);
                    search.failures.push((model.id.clone(), e));
                }
            }
        }
        search
    }

    /// Groups the models' tables and any loaded tables into quantiles.
    pub fn combine_quantiles(
        &mut self,
        models: &[Model],
        loaded: Vec<Quantile>,
        loaded_fractions: &[f64],
    ) -> Result<(), SimError> {
        self.quantiles = combine_into_quantiles(models, loaded, loaded_fractions)?;
        Ok(())
    }

    /// Writes `{base}_{score}_Scores.txt` and `{base}_models.txt` next to `output`.
    pub fn write_tables_and_scores(
        &self,
        output: &Path,
        models: &[Model],
        scores: &[Vec<f64>],
    ) -> Result<(PathBuf, PathBuf), SimError> {
        let (directory, base) = split_output(output);
        fs::create_dir_all(&directory)?;
        let score_name = ScoreName::for_models(models);

        let scores_path = directory.join(format!("{}_{}_Scores.txt", base, score_name));
        let mut writer = BufWriter::new(File::create(&scores_path)?);
        table_io::write_scores(&mut writer, score_name, scores)?;
        writer.flush()?;

        let population_size = scores.iter().map(|s| s.len()).min().unwrap_or(0);
        let models_path = directory.join(format!("{}_models.txt", base));
        let mut writer = BufWriter::new(File::create(&models_path)?);
        table_io::write_tables(&mut writer, score_name, population_size, &self.quantiles)?;
        writer.flush()?;
        for table in self.quantiles.iter().flat_map(|q| q.tables.iter()) {
            debug!(
                "Marginal penetrance mass of {:?} per locus and genotype:\n{}",
                table.attribute_names(),
                table.marginal_prevalences()
            );
        }

        info!(
            "Wrote scores to {} and tables to {}",
            scores_path.display(),
            models_path.display()
        );
        Ok((scores_path, models_path))
    }

    /// Writes every replicate of every dataset for every quantile.
    ///
    /// With more than one dataset each output path names a directory that is
    /// created; otherwise it names the base file. Returns the number of files
    /// written.
    pub fn generate_datasets(
        &mut self,
        datasets: &[DatasetConfig],
        predictive: Option<&Passthrough>,
        noise: Option<&Passthrough>,
        progress: &mut dyn ProgressHandler,
    ) -> Result<usize, SimError> {
        if self.quantiles.is_empty() {
            return Err(SimError::input("There are no penetrance tables to sample from"));
        }
        let total_replicates: usize = datasets.iter().map(|d| d.replicates).sum();
        progress.set_maximum(self.quantiles.len() * total_replicates);

        let own_directories = datasets.len() > 1;
        let mut file_count = 0;
        for dataset in datasets {
            let (directory, name) = if own_directories {
                let directory = dataset.output.clone();
                fs::create_dir_all(&directory)?;
                let name = dataset
                    .output
                    .file_name()
                    .map(|n| strip_txt(&n.to_string_lossy()).to_string())
                    .unwrap_or_default();
                (directory, name)
            } else {
                split_output(&dataset.output)
            };
            let params = dataset.params();

            for (q, quantile) in self.quantiles.iter().enumerate() {
                let quantile_name = format!("{}_EDM-{}", name, padded(q + 1, self.quantiles.len()));
                let subdirectory = directory.join(&quantile_name);
                fs::create_dir_all(&subdirectory)?;

                for r in 0..dataset.replicates {
                    let file_name = format!("{}_{}", quantile_name, padded(r + 1, dataset.replicates));
                    let generated = synthesize(&mut self.rng, quantile, &params, predictive, noise)?;
                    generated.write_to_path(subdirectory.join(format!("{}.txt", file_name)))?;

                    if dataset.write_counts {
                        let path = subdirectory.join(format!("{}_counts.txt", file_name));
                        let mut writer = BufWriter::new(File::create(path)?);
                        for (t, (table, counts)) in
                            quantile.tables.iter().zip(generated.cell_counts.iter()).enumerate()
                        {
                            if t > 0 {
                                write!(writer, "\n\n\n\n")?;
                            }
                            table_io::write_case_control_counts(&mut writer, table, counts)?;
                        }
                    }

                    file_count += 1;
                    progress.set_value(file_count);
                }
            }
            info!(
                "Wrote {} replicates of {} quantiles under {}",
                dataset.replicates,
                self.quantiles.len(),
                directory.display()
            );
        }
        Ok(file_count)
    }
}

/// What a completed run produced.
#[derive(Debug, Default)]
pub struct RunSummary {
    pub quantile_count: usize,
    pub files_written: usize,
    pub failures: Vec<(String, SimError)>,
}

/// Runs every step described by `config`.
///
/// Models whose table search fails are reported in the summary; the run
/// continues with the others, and fails only if nothing is left to sample.
pub fn run(
    config: &RunConfig,
    table_progress: &mut dyn ProgressHandler,
    dataset_progress: &mut dyn ProgressHandler,
) -> Result<RunSummary, SimError> {
    config.validate()?;
    let mut simulator = Simulator::new(config.seed);
    let mut models = config.models()?;
    let params = config.population_params();

    let search = simulator.generate_tables_for_models(&mut models, &params, table_progress);
    let failed: Vec<&str> = search.failures.iter().map(|(id, _)| id.as_str()).collect();
    models.retain(|m| !failed.contains(&m.id.as_str()));

    let mut loaded = Vec::new();
    for path in config.model_inputs.iter() {
        let quantiles = table_io::read_tables_file(path)?;
        info!(
            "Loaded {} quantiles of {} tables from {}",
            quantiles.len(),
            quantiles.first().map_or(0, |q| q.len()),
            path.display()
        );
        loaded = if loaded.is_empty() {
            quantiles
        } else {
            combine_loaded(loaded, quantiles)?
        };
    }
    simulator.combine_quantiles(&models, loaded, &config.model_input_fractions)?;

    if let Some(output) = &config.model_output {
        simulator.write_tables_and_scores(output, &models, &search.scores)?;
    }

    let mut reader = PassthroughBuilder::new();
    reader.delimiter(config.passthrough_delimiter as u8);
    let predictive = match &config.predictive_input {
        Some(path) => Some(reader.from_path(path)?),
        None => None,
    };
    let noise = match &config.noise_input {
        Some(path) => Some(reader.from_path(path)?),
        None => None,
    };

    let files_written = if config.datasets.is_empty() {
        0
    } else {
        simulator.generate_datasets(
            &config.datasets,
            predictive.as_ref(),
            noise.as_ref(),
            dataset_progress,
        )?
    };

    Ok(RunSummary {
        quantile_count: simulator.quantiles().len(),
        files_written,
        failures: search.failures,
    })
}

/// Appends the tables of a further table file, quantile by quantile.
fn combine_loaded(first: Vec<Quantile>, second: Vec<Quantile>) -> Result<Vec<Quantile>, SimError> {
    if first.len() != second.len() {
        return Err(SimError::input(
            "Every model input file must have the same number of quantiles",
        ));
    }
    Ok(first
        .into_iter()
        .zip(second)
        .map(|(mut a, b)| {
            a.tables.extend(b.tables);
            a.fractions.extend(b.fractions);
            a
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::population::NoopProgress;

    #[test]
    fn test_split_output_strips_txt() {
        let (dir, name) = split_output(Path::new("out/run/tables.TXT"));
        assert_eq!(dir, PathBuf::from("out/run"));
        assert_eq!(name, "tables");
        let (_, name) = split_output(Path::new("data"));
        assert_eq!(name, "data");
    }

    #[test]
    fn test_padding_follows_largest_number() {
        assert_eq!(padded(3, 100), "003");
        assert_eq!(padded(12, 12), "12");
        assert_eq!(padded(1, 9), "1");
    }

    #[test]
    fn test_failed_model_does_not_stop_others() {
        let mut good = Model::new("good", 0.05);
        good.attribute_names = vec!["P1".into(), "P2".into()];
        good.minor_allele_frequencies = vec![0.3, 0.3];
        let mut bad = good.clone();
        bad.id = "bad".into();
        bad.heritability = 1.0;
        let mut models = vec![bad, good];
        let params = PopulationParams {
            quantile_count: 2,
            population_size: 4,
            try_count: 2000,
            ..PopulationParams::default()
        };
        let mut simulator = Simulator::new(Some(5));
        let search = simulator.generate_tables_for_models(&mut models, &params, &mut NoopProgress);
        assert_eq!(search.failures.len(), 1);
        assert_eq!(search.failures[0].0, "bad");
        assert_eq!(search.scores.len(), 1);
        assert_eq!(models[1].tables.len(), 2);
        assert!(models[0].tables.is_empty());
    }

    #[test]
    fn test_datasets_need_tables() {
        let mut simulator = Simulator::new(Some(1));
        let result = simulator.generate_datasets(&[], None, None, &mut NoopProgress);
        assert!(matches!(result, Err(SimError::Input(_))));
    }
}
