//! Maps a filled table onto penetrance probabilities and tunes it to the
//! requested prevalence and heritability.

use crate::error::NormalizeError;
use crate::penetrance::{PenetranceTable, ERROR_LIMIT};
use log::{debug, warn};
use ndarray::Array2;

/// Largest prevalence produced by `scale_to_unit_interval`.
pub const MAX_PREVALENCE: f64 = 0.95;

impl PenetranceTable {
    /// Runs every normalization step in order.
    ///
    /// Prevalence is adjusted before heritability because the heritability
    /// adjustment preserves prevalence but not the other way around.
    pub fn normalize(
        &mut self,
        desired_prevalence: Option<f64>,
        desired_heritability: f64,
    ) -> Result<(), NormalizeError> {
        self.scale_to_unit_interval()?;
        self.adjust_prevalence(desired_prevalence);
        self.adjust_heritability(desired_heritability)
    }

    /// Affinely maps the smallest value to 0 and the largest to 1.
    ///
    /// A filled table has zero weighted row sums, so after the mapping every
    /// row sums to the intercept, which becomes the prevalence.
    pub fn scale_to_unit_interval(&mut self) -> Result<(), NormalizeError> {
        let (min, max) = self.cells.iter().fold(
            (f64::INFINITY, f64::NEG_INFINITY),
            |(min, max), c| (min.min(c.value), max.max(c.value)),
        );
        if !(min < 0.0 && max > 0.0) {
            return Err(NormalizeError::Degenerate { min, max });
        }
        let prevalence = (min / (min - max)).min(MAX_PREVALENCE);
        let slope = -prevalence / min;
        for cell in self.cells.iter_mut() {
            cell.value = slope * cell.value + prevalence;
        }
        self.scores.prevalence = prevalence;
        Ok(())
    }

    /// Shrinks the table towards 0 or 1 until it has the desired prevalence.
    pub fn adjust_prevalence(&mut self, desired: Option<f64>) {
        let desired = match desired {
            Some(d) if d != self.scores.prevalence => d,
            _ => return,
        };
        let current = self.scores.prevalence;
        let (scale, offset) = if desired < current {
            (desired / current, 0.0)
        } else {
            (
                (1.0 - desired) / (1.0 - current),
                (desired - current) / (1.0 - current),
            )
        };
        for cell in self.cells.iter_mut() {
            cell.value = scale * cell.value + offset;
            debug_assert!(-ERROR_LIMIT < cell.value && cell.value < 1.0 + ERROR_LIMIT);
        }
        self.scores.prevalence = self.calc_prevalence();
        if (self.scores.prevalence - desired).abs() >= ERROR_LIMIT {
            warn!(
                "Prevalence is {} after adjusting to {}",
                self.scores.prevalence, desired
            );
        }
    }

    /// Contracts the table towards its prevalence until the heritability matches.
    ///
    /// Heritability can only be lowered. On success the EDM and odds ratio are
    /// cached and the table is marked normalized.
    pub fn adjust_heritability(&mut self, desired: f64) -> Result<(), NormalizeError> {
        let heritability = self.calc_heritability();
        let factor = (desired / heritability).sqrt();
        if factor > 1.0 || factor.is_nan() {
            self.normalized = false;
            return Err(NormalizeError::HeritabilityUnreachable { factor });
        }
        let prevalence = self.scores.prevalence;
        for cell in self.cells.iter_mut() {
            cell.value = factor * cell.value + prevalence * (1.0 - factor);
        }
        debug_assert!((self.calc_prevalence() - prevalence).abs() < ERROR_LIMIT);

        self.recompute_scores();
        if (self.scores.heritability - desired).abs() >= ERROR_LIMIT {
            warn!(
                "Heritability is {} after adjusting to {}",
                self.scores.heritability, desired
            );
        }
        self.normalized = true;
        Ok(())
    }

    /// Recomputes prevalence, heritability, EDM and odds ratio from the cell values.
    pub fn recompute_scores(&mut self) {
        self.scores.prevalence = self.calc_prevalence();
        self.scores.heritability = self.calc_heritability();
        self.scores.edm = self.calc_edm();
        self.scores.odds_ratio = self.calc_odds_ratio();
    }

    /// Probability-weighted mean penetrance.
    pub fn calc_prevalence(&self) -> f64 {
        self.weighted_cells().map(|(p, v)| p * v).sum()
    }

    /// `Σ p (v - K)² / (K (1 - K))` using the cached prevalence `K`.
    pub fn calc_heritability(&self) -> f64 {
        let k = self.scores.prevalence;
        let sum: f64 = self.weighted_cells().map(|(p, v)| p * (v - k) * (v - k)).sum();
        sum / (k * (1.0 - k))
    }

    /// Ease-of-detection metric `Σ p² (v - K)² / (2 (K (1 - K))²)`.
    pub fn calc_edm(&self) -> f64 {
        let k = self.scores.prevalence;
        let sum: f64 = self
            .weighted_cells()
            .map(|(p, v)| p * p * (v - k) * (v - k))
            .sum();
        let k_product = k * (1.0 - k);
        sum / (2.0 * k_product * k_product)
    }

    /// Odds ratio of the classifier calling every cell at or above `K` a case.
    pub fn calc_odds_ratio(&self) -> f64 {
        let k = self.scores.prevalence;
        let (mut tp, mut tn, mut fp, mut fn_) = (0.0, 0.0, 0.0, 0.0);
        for (p, v) in self.weighted_cells() {
            if v >= k {
                tp += p * v;
                fp += p * (1.0 - v);
            } else {
                tn += p * (1.0 - v);
                fn_ += p * v;
            }
        }
        tp * tn / (fn_ * fp)
    }

    /// Checks every completed row against the current prevalence and records the outcome.
    pub fn check_row_sums(&mut self) -> bool {
        self.row_sums_valid = self.check_row_sums_against(self.scores.prevalence);
        self.row_sums_valid
    }

    /// Whether every completed row's weighted sum is within the tolerance of `target`.
    pub fn check_row_sums_against(&self, target: f64) -> bool {
        let mut valid = true;
        for axis in 0..self.loci {
            let stride = self.states.pow(axis as u32);
            for master in 0..self.cell_count() {
                // Visit each row once, from its state-0 cell.
                if (master / stride) % self.states != 0 {
                    continue;
                }
                if self.count_filled(master, axis).0 != self.states {
                    continue;
                }
                let sum = self.weighted_row_sum(master, axis);
                if (sum - target).abs() > ERROR_LIMIT {
                    debug!(
                        "Row through cell {} along locus {} sums to {}, expected {}",
                        master, axis, sum, target
                    );
                    valid = false;
                }
            }
        }
        valid
    }

    /// Probability-weighted penetrance mass of every locus and state.
    ///
    /// Dividing an entry by the state's probability gives the marginal
    /// penetrance of that genotype, which for a normalized table is `K`.
    pub fn marginal_prevalences(&self) -> Array2<f64> {
        let mut marginals = Array2::zeros((self.loci, self.states));
        let mut coords = vec![0; self.loci];
        for master in 0..self.cell_count() {
            crate::hypercube::fill_coords(master, self.states, &mut coords);
            let mass = self.cell_probabilities[master] * self.cells[master].value;
            for (locus, &state) in coords.iter().enumerate() {
                marginals[[locus, state]] += mass;
            }
        }
        marginals
    }

    fn weighted_cells(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.cell_probabilities
            .iter()
            .zip(self.cells.iter())
            .map(|(&p, c)| (p, c.value))
    }
}
