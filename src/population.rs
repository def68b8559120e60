//! Searches for valid tables of one model and picks representatives spread
//! across the range of their detection difficulty.

use crate::construction::StartPoint;
use crate::error::{ConstructionError, NormalizeError, SimError};
use crate::genetics::GENOTYPE_STATES;
use crate::model::Model;
use crate::penetrance::PenetranceTable;
use log::{debug, info};
use rand::Rng;
use std::fmt;
use std::sync::Arc;

/// Observer for reporting progress of long-running generation steps.
pub trait ProgressHandler {
    fn set_maximum(&mut self, maximum: usize) {
        let _ = maximum;
    }
    fn set_value(&mut self, value: usize) {
        let _ = value;
    }
}

#[derive(Default)]
pub struct NoopProgress;

impl ProgressHandler for NoopProgress {}

/// Run parameters shared by every model's population search.
#[derive(Debug, Clone)]
pub struct PopulationParams {
    pub quantile_count: usize,
    pub population_size: usize,
    pub try_count: usize,
    pub start_point: StartPoint,
}

impl Default for PopulationParams {
    fn default() -> Self {
        Self {
            quantile_count: 3,
            population_size: 1000,
            try_count: 50000,
            start_point: StartPoint::Random,
        }
    }
}

/// Why candidate tables were kept or thrown away during one population search.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConstructionStats {
    pub attempts: usize,
    pub ambiguous: usize,
    pub conflicts: usize,
    pub degenerate: usize,
    pub heritability_unreachable: usize,
    pub row_sum_failures: usize,
    pub accepted: usize,
}

impl fmt::Display for ConstructionStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} attempts, {} accepted, {} ambiguous, {} conflicts, {} degenerate, {} heritability unreachable, {} row-sum failures",
            self.attempts,
            self.accepted,
            self.ambiguous,
            self.conflicts,
            self.degenerate,
            self.heritability_unreachable,
            self.row_sum_failures
        )
    }
}

/// Minimum, maximum, mean and standard deviation of a set of scores.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreSummary {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std_dev: f64,
}

impl ScoreSummary {
    pub fn from_scores(scores: &[f64]) -> Option<Self> {
        if scores.is_empty() {
            return None;
        }
        let n = scores.len() as f64;
        let mean = scores.iter().sum::<f64>() / n;
        let variance = scores.iter().map(|s| (s - mean) * (s - mean)).sum::<f64>() / n;
        Some(Self {
            min: scores.iter().cloned().fold(f64::INFINITY, f64::min),
            max: scores.iter().cloned().fold(f64::NEG_INFINITY, f64::max),
            mean,
            std_dev: variance.sqrt(),
        })
    }
}

impl fmt::Display for ScoreSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "min {:.6}, max {:.6}, mean {:.6}, sd {:.6}",
            self.min, self.max, self.mean, self.std_dev
        )
    }
}

/// Normalized tables of one model, sorted by ascending quantile score.
#[derive(Debug, Clone)]
pub struct Population {
    pub tables: Vec<PenetranceTable>,
    pub use_odds_ratio: bool,
    pub stats: ConstructionStats,
}

impl Population {
    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Quantile scores in population order.
    pub fn scores(&self) -> Vec<f64> {
        self.tables
            .iter()
            .map(|t| t.scores().quantile_score(self.use_odds_ratio))
            .collect()
    }

    /// Moves the selected representatives out of the population.
    pub fn into_quantiles(self, quantile_count: usize) -> Vec<Arc<PenetranceTable>> {
        let selected = select_quantiles(&self.scores(), quantile_count);
        let mut slots: Vec<Option<PenetranceTable>> = self.tables.into_iter().map(Some).collect();
        selected
            .into_iter()
            .filter_map(|i| slots[i].take())
            .map(Arc::new)
            .collect()
    }
}

/// Builds candidate tables for `model` until enough pass every check or the
/// try count runs out.
///
/// Progress is reported as `progress_base` plus the attempt index.
pub fn generate_population<R: Rng + ?Sized>(
    rng: &mut R,
    model: &Model,
    params: &PopulationParams,
    progress: &mut dyn ProgressHandler,
    progress_base: usize,
) -> Result<Population, SimError> {
    let mut stats = ConstructionStats::default();
    let mut tables = Vec::new();

    for attempt in 0..params.try_count {
        stats.attempts += 1;
        let mut table = PenetranceTable::new(
            GENOTYPE_STATES,
            model.attribute_names.clone(),
            model.minor_allele_frequencies.clone(),
        )?;
        table.initialize(rng, params.start_point);

        match build_table(&mut table, rng, model) {
            Ok(()) => {
                stats.accepted += 1;
                tables.push(table);
            }
            Err(Rejection::Construction(e)) => {
                match e {
                    ConstructionError::Conflict { .. } => stats.conflicts += 1,
                    ConstructionError::Ambiguous | ConstructionError::NoEmptyCell => {
                        stats.ambiguous += 1
                    }
                }
                debug!("Discarded table {}: {}", attempt, e);
            }
            Err(Rejection::Normalize(e)) => {
                match e {
                    NormalizeError::Degenerate { .. } => stats.degenerate += 1,
                    NormalizeError::HeritabilityUnreachable { .. } => {
                        stats.heritability_unreachable += 1
                    }
                }
                debug!("Discarded table {}: {}", attempt, e);
            }
            Err(Rejection::RowSums) => {
                stats.row_sum_failures += 1;
                debug!("Discarded table {}: failed the row-sum test", attempt);
            }
        }

        progress.set_value(progress_base + attempt);
        if tables.len() >= params.population_size {
            break;
        }
    }

    info!("Model '{}': {}", model.id, stats);

    if tables.len() < params.quantile_count {
        return Err(SimError::PopulationShortfall {
            model: model.id.clone(),
            requested: params.quantile_count,
            found: tables.len(),
        });
    }

    let use_odds_ratio = model.use_odds_ratio;
    tables.sort_by(|a, b| {
        a.scores()
            .quantile_score(use_odds_ratio)
            .total_cmp(&b.scores().quantile_score(use_odds_ratio))
    });

    let population = Population {
        tables,
        use_odds_ratio,
        stats,
    };
    if let Some(summary) = ScoreSummary::from_scores(&population.scores()) {
        info!(
            "Model '{}' population of {} tables, {} scores: {}",
            model.id,
            population.len(),
            if use_odds_ratio { "odds ratio" } else { "EDM" },
            summary
        );
    }
    Ok(population)
}

enum Rejection {
    Construction(ConstructionError),
    Normalize(NormalizeError),
    RowSums,
}

fn build_table<R: Rng + ?Sized>(
    table: &mut PenetranceTable,
    rng: &mut R,
    model: &Model,
) -> Result<(), Rejection> {
    table.fill(rng).map_err(Rejection::Construction)?;
    table
        .normalize(model.prevalence, model.heritability)
        .map_err(Rejection::Normalize)?;
    if !table.check_row_sums() {
        return Err(Rejection::RowSums);
    }
    Ok(())
}

/// Picks `quantile_count` distinct indices into ascending `scores`, spread
/// evenly between the smallest and largest score.
///
/// With more than one quantile the first and last scores are always chosen.
/// A single quantile takes the table closest to the midpoint.
pub fn select_quantiles(scores: &[f64], quantile_count: usize) -> Vec<usize> {
    let size = scores.len();
    if size == 0 || quantile_count == 0 {
        return Vec::new();
    }
    let min = scores[0];
    let max = scores[size - 1];
    let targets: Vec<f64> = if quantile_count == 1 {
        vec![(min + max) / 2.0]
    } else {
        let delta = (max - min) / (quantile_count - 1) as f64;
        (0..quantile_count).map(|q| min + q as f64 * delta).collect()
    };

    let mut selected: Vec<Option<usize>> = vec![None; quantile_count];
    let mut qi = 0;
    let mut ti = 0;
    let mut prior: Option<usize> = None;
    if quantile_count > 1 {
        selected[0] = Some(0);
        prior = Some(0);
        qi = 1;
        ti = 1;
    }

    while ti < size && qi < quantile_count {
        let target = targets[qi];
        if scores[ti] > target {
            let mut matching =
                if ti > 0 && (scores[ti - 1] - target).abs() < (scores[ti] - target).abs() {
                    ti - 1
                } else {
                    ti
                };
            if let Some(p) = prior {
                if matching <= p {
                    matching = p + 1;
                }
            }
            if matching >= size {
                break;
            }
            selected[qi] = Some(matching);
            prior = Some(matching);
            qi += 1;
        }
        ti += 1;
    }

    // Fill any unset trailing slots from the end, keeping indices distinct.
    let last = quantile_count - 1;
    if selected[last].is_none() {
        let mut ti = size - 1;
        selected[last] = Some(ti);
        let mut qi = last;
        while qi > 0 {
            qi -= 1;
            let next = selected[qi + 1];
            match (selected[qi], next) {
                (Some(s), Some(n)) if s < n => break,
                _ => {
                    ti = ti.saturating_sub(1);
                    selected[qi] = Some(ti);
                }
            }
        }
    }

    selected.into_iter().map(|s| s.unwrap_or(0)).collect()
}
