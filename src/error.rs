use thiserror::Error;

/// Why filling a penetrance table was abandoned. Recovered by retrying with a fresh table.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConstructionError {
    #[error("Ran out of basis values before every cell was set.")]
    Ambiguous,

    #[error("Completed row along locus {axis} has weighted sum {sum}, expected 0.")]
    Conflict { axis: usize, sum: f64 },

    #[error("Unable to find an empty cell that works.")]
    NoEmptyCell,
}

/// Why normalizing a filled table failed. Recovered by retrying with a fresh table.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum NormalizeError {
    #[error("Table values span [{min}, {max}], which does not straddle zero.")]
    Degenerate { min: f64, max: f64 },

    #[error("Heritability would have to be scaled up by {factor}, which is not possible.")]
    HeritabilityUnreachable { factor: f64 },
}

/// Which passthrough dataset ran out of rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassthroughKind {
    Noise,
    Predictive,
}

impl std::fmt::Display for PassthroughKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Noise => f.write_str("noise"),
            Self::Predictive => f.write_str("predictive"),
        }
    }
}

/// Errors surfaced to callers of the simulator.
#[derive(Error, Debug)]
pub enum SimError {
    #[error("Invalid input: {0}")]
    Input(String),

    #[error(
        "Unable to generate {requested} table quantiles for model '{model}': only {found} valid tables were found."
    )]
    PopulationShortfall {
        model: String,
        requested: usize,
        found: usize,
    },

    #[error("Not enough {kind} input data for instance {row}.")]
    PassthroughExhausted { kind: PassthroughKind, row: usize },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Error reading or writing delimited data: {0}")]
    Csv(#[from] csv::Error),

    #[error("Failed to parse TOML run file: {0}")]
    TomlParse(#[from] toml::de::Error),
}

impl SimError {
    pub fn input<S: Into<String>>(msg: S) -> Self {
        Self::Input(msg.into())
    }
}
