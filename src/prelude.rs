pub use crate::config::{DatasetConfig, ModelConfig, RunConfig};
pub use crate::construction::StartPoint;
pub use crate::error::{ConstructionError, NormalizeError, SimError};
pub use crate::genetics::Genotype;
pub use crate::model::{Model, Quantile};
pub use crate::observable::{Passthrough, PassthroughBuilder};
pub use crate::penetrance::{PenetranceTable, Scores, TableState};
pub use crate::population::{generate_population, NoopProgress, PopulationParams, ProgressHandler};
pub use crate::simulator::{run, RunSummary, Simulator};
pub use crate::synthesizer::{synthesize, Dataset, DatasetParams};
