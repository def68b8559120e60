use clap::Parser;
use epigen::population::ProgressHandler;
use epigen::{run, RunConfig};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use log::{error, info};
use std::path::PathBuf;
use std::process;
use std::time::Instant;

#[derive(Parser, Debug)]
#[clap(
    name = "epigen",
    version,
    about = "Generates purely epistatic penetrance tables and samples case/control datasets from them."
)]
struct Args {
    /// Path to the TOML run file.
    config: PathBuf,

    /// Seed for the random number generator.
    #[clap(long)]
    seed: Option<u64>,

    /// Number of tables kept from each model's population.
    #[clap(long)]
    quantiles: Option<usize>,

    /// Number of valid tables to search for per model.
    #[clap(long)]
    population: Option<usize>,

    /// Attempts allowed per model before giving up.
    #[clap(long)]
    tries: Option<usize>,

    /// Base path of the tables and scores files.
    #[clap(long)]
    model_output: Option<PathBuf>,

    /// A table file whose quantiles are added to the generated ones. Repeatable.
    #[clap(long)]
    model_input: Vec<PathBuf>,

    /// Sampling fraction for each table of a model input file, in file order. Repeatable.
    #[clap(long)]
    model_input_fraction: Vec<f64>,

    /// Log level: error, warn, info, debug, or trace.
    #[clap(long, default_value = "info")]
    log_level: String,

    /// Hide the progress bars.
    #[clap(long)]
    quiet: bool,
}

impl Args {
    /// Applies the command-line overrides on top of the run file.
    fn apply(&self, config: &mut RunConfig) {
        if self.seed.is_some() {
            config.seed = self.seed;
        }
        if let Some(quantiles) = self.quantiles {
            config.quantiles = quantiles;
        }
        if let Some(population) = self.population {
            config.population = population;
        }
        if let Some(tries) = self.tries {
            config.tries = tries;
        }
        if self.model_output.is_some() {
            config.model_output = self.model_output.clone();
        }
        if !self.model_input.is_empty() {
            config.model_inputs = self.model_input.clone();
        }
        if !self.model_input_fraction.is_empty() {
            config.model_input_fractions = self.model_input_fraction.clone();
        }
    }
}

/// Reports search and sampling progress on a terminal bar.
struct BarProgress {
    bar: ProgressBar,
}

impl BarProgress {
    fn new(label: &str, quiet: bool) -> Self {
        let target = if quiet {
            ProgressDrawTarget::hidden()
        } else {
            ProgressDrawTarget::stderr_with_hz(20)
        };
        let bar = ProgressBar::with_draw_target(Some(0), target);
        if let Ok(style) = ProgressStyle::with_template(
            "> [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}",
        ) {
            bar.set_style(style.progress_chars("█▉▊▋▌▍▎▏ "));
        }
        bar.set_message(label.to_string());
        Self { bar }
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl ProgressHandler for BarProgress {
    fn set_maximum(&mut self, maximum: usize) {
        self.bar.set_length(maximum as u64);
    }

    fn set_value(&mut self, value: usize) {
        self.bar.set_position(value as u64);
    }
}

fn main() {
    let start_time = Instant::now();
    let args = Args::parse();

    let log_level = args
        .log_level
        .parse::<log::LevelFilter>()
        .unwrap_or_else(|_| {
            eprintln!(
                "Warning: Invalid log level '{}' provided. Defaulting to Info.",
                args.log_level
            );
            log::LevelFilter::Info
        });
    env_logger::Builder::new().filter_level(log_level).init();

    let mut config = match RunConfig::load(&args.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error reading run file '{}': {}", args.config.display(), e);
            process::exit(1);
        }
    };
    args.apply(&mut config);
    info!("Loaded run file {}", args.config.display());

    let mut table_progress = BarProgress::new("tables", args.quiet);
    let mut dataset_progress = BarProgress::new("datasets", args.quiet);
    let result = run(&config, &mut table_progress, &mut dataset_progress);
    table_progress.finish();
    dataset_progress.finish();

    let summary = match result {
        Ok(summary) => summary,
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    };

    info!(
        "Finished {} quantiles and {} dataset files in {:.2?}",
        summary.quantile_count,
        summary.files_written,
        start_time.elapsed()
    );
    if !summary.failures.is_empty() {
        for (model, e) in summary.failures.iter() {
            error!("Model '{}' failed: {}", model, e);
        }
        process::exit(1);
    }
}
