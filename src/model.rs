use crate::error::SimError;
use crate::hypercube;
use crate::genetics::GENOTYPE_STATES;
use crate::penetrance::PenetranceTable;
use std::sync::Arc;

/// Description of one epistatic disease model and the tables selected for it.
#[derive(Debug, Clone)]
pub struct Model {
    pub id: String,
    pub attribute_names: Vec<String>,
    pub minor_allele_frequencies: Vec<f64>,
    pub heritability: f64,
    pub prevalence: Option<f64>,
    pub use_odds_ratio: bool,
    /// Relative share of the dataset rows in which this model carries the signal.
    pub fraction: f64,
    /// One table per quantile, in ascending score order.
    pub tables: Vec<Arc<PenetranceTable>>,
}

impl Model {
    pub fn new<S: Into<String>>(id: S, heritability: f64) -> Self {
        Self {
            id: id.into(),
            attribute_names: Vec::new(),
            minor_allele_frequencies: Vec::new(),
            heritability,
            prevalence: None,
            use_odds_ratio: false,
            fraction: 1.0,
            tables: Vec::new(),
        }
    }

    pub fn locus_count(&self) -> usize {
        self.attribute_names.len()
    }

    /// Number of multi-locus genotypes, i.e. cells in each of the model's tables.
    pub fn genotype_count(&self) -> Option<usize> {
        hypercube::cell_count(GENOTYPE_STATES, self.locus_count())
    }

    pub fn validate(&self) -> Result<(), SimError> {
        if self.attribute_names.is_empty() {
            return Err(SimError::input(format!(
                "Model '{}' must have at least one attribute",
                self.id
            )));
        }
        if self.genotype_count().is_none() {
            return Err(SimError::input(format!(
                "Model '{}' has {} loci, too many for a penetrance table",
                self.id,
                self.locus_count()
            )));
        }
        if self.attribute_names.len() != self.minor_allele_frequencies.len() {
            return Err(SimError::input(format!(
                "Model '{}' has {} attribute names but {} minor allele frequencies",
                self.id,
                self.attribute_names.len(),
                self.minor_allele_frequencies.len()
            )));
        }
        if let Some(maf) = self
            .minor_allele_frequencies
            .iter()
            .find(|&&maf| !(maf > 0.0 && maf < 1.0))
        {
            return Err(SimError::input(format!(
                "Model '{}' has minor allele frequency {}, which must be between 0 and 1",
                self.id, maf
            )));
        }
        if !(self.heritability > 0.0 && self.heritability <= 1.0) {
            return Err(SimError::input(format!(
                "Model '{}' has heritability {}, which must be in (0, 1]",
                self.id, self.heritability
            )));
        }
        if let Some(prevalence) = self.prevalence {
            if !(prevalence > 0.0 && prevalence < 1.0) {
                return Err(SimError::input(format!(
                    "Model '{}' has prevalence {}, which must be between 0 and 1",
                    self.id, prevalence
                )));
            }
        }
        if !(self.fraction >= 0.0) {
            return Err(SimError::input(format!(
                "Model '{}' has a negative fraction {}",
                self.id, self.fraction
            )));
        }
        Ok(())
    }
}

/// Tables of equal rank across models, emitted together into one dataset.
#[derive(Debug, Clone, Default)]
pub struct Quantile {
    pub tables: Vec<Arc<PenetranceTable>>,
    /// Share of the rows in which each table carries the signal.
    pub fractions: Vec<f64>,
}

impl Quantile {
    pub fn push(&mut self, table: Arc<PenetranceTable>, fraction: f64) {
        self.tables.push(table);
        self.fractions.push(fraction);
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Total number of loci across the quantile's tables.
    pub fn locus_count(&self) -> usize {
        self.tables.iter().map(|t| t.loci()).sum()
    }
}

/// Groups the models' selected tables by rank and appends the tables loaded
/// from a file.
///
/// `loaded_fractions` gives the fraction of each loaded table within its
/// quantile; loaded tables without an entry get 1.
pub fn combine_into_quantiles(
    models: &[Model],
    loaded: Vec<Quantile>,
    loaded_fractions: &[f64],
) -> Result<Vec<Quantile>, SimError> {
    let generated = if models.is_empty() {
        None
    } else {
        let quantile_count = models[0].tables.len();
        if let Some(m) = models.iter().find(|m| m.tables.len() != quantile_count) {
            return Err(SimError::input(format!(
                "Model '{}' has {} tables but the first model has {}",
                m.id,
                m.tables.len(),
                quantile_count
            )));
        }
        let quantiles: Vec<Quantile> = (0..quantile_count)
            .map(|q| {
                let mut quantile = Quantile::default();
                for model in models {
                    quantile.push(model.tables[q].clone(), model.fraction);
                }
                quantile
            })
            .collect();
        Some(quantiles)
    };

    let loaded = if loaded.is_empty() {
        None
    } else {
        Some(
            loaded
                .into_iter()
                .map(|mut quantile| {
                    quantile.fractions = (0..quantile.len())
                        .map(|t| loaded_fractions.get(t).copied().unwrap_or(1.0))
                        .collect();
                    quantile
                })
                .collect::<Vec<_>>(),
        )
    };

    match (generated, loaded) {
        (Some(generated), Some(loaded)) => merge_quantiles(generated, loaded),
        (Some(generated), None) => Ok(generated),
        (None, Some(loaded)) => Ok(loaded),
        (None, None) => Ok(Vec::new()),
    }
}

fn merge_quantiles(first: Vec<Quantile>, second: Vec<Quantile>) -> Result<Vec<Quantile>, SimError> {
    if first.len() != second.len() {
        return Err(SimError::input(
            "The generated models and the models from the file must have the same number of quantiles",
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

    fn table(names: &[&str]) -> Arc<PenetranceTable> {
        let names: Vec<String> = names.iter().map(|s| s.to_string()).collect();
        let mafs = vec![0.5; names.len()];
        let values = vec![0.1; hypercube::cell_count(3, names.len()).unwrap()];
        Arc::new(PenetranceTable::from_values(3, names, mafs, &values).unwrap())
    }

    fn model(id: &str, names: &[&str], quantiles: usize) -> Model {
        let mut m = Model::new(id, 0.1);
        m.attribute_names = names.iter().map(|s| s.to_string()).collect();
        m.minor_allele_frequencies = vec![0.3; names.len()];
        m.tables = (0..quantiles).map(|_| table(names)).collect();
        m
    }

    #[test]
    fn test_validate_rejects_bad_parameters() {
        let mut m = model("a", &["P1", "P2"], 0);
        assert!(m.validate().is_ok());
        assert_eq!(m.genotype_count(), Some(9));

        m.minor_allele_frequencies = vec![0.3, 1.0];
        assert!(m.validate().is_err());

        m.minor_allele_frequencies = vec![0.3];
        assert!(m.validate().is_err());

        let mut m = model("b", &["P1"], 0);
        m.heritability = 0.0;
        assert!(m.validate().is_err());

        let mut m = model("c", &["P1"], 0);
        m.prevalence = Some(1.0);
        assert!(m.validate().is_err());
    }

    #[test]
    fn test_too_many_loci_is_an_input_error() {
        let names: Vec<String> = (0..45).map(|i| format!("P{}", i + 1)).collect();
        let mut m = Model::new("wide", 0.1);
        m.minor_allele_frequencies = vec![0.3; names.len()];
        m.attribute_names = names.clone();
        assert_eq!(m.genotype_count(), None);
        assert!(matches!(m.validate(), Err(SimError::Input(_))));
        assert!(matches!(
            PenetranceTable::new(3, names, vec![0.3; 45]),
            Err(SimError::Input(_))
        ));
    }

    #[test]
    fn test_quantiles_group_tables_by_rank() {
        let mut a = model("a", &["P1", "P2"], 3);
        a.fraction = 0.3;
        let b = model("b", &["P3"], 3);
        let quantiles = combine_into_quantiles(&[a.clone(), b], Vec::new(), &[]).unwrap();
        assert_eq!(quantiles.len(), 3);
        for (q, quantile) in quantiles.iter().enumerate() {
            assert_eq!(quantile.len(), 2);
            assert!(Arc::ptr_eq(&quantile.tables[0], &a.tables[q]));
            assert_eq!(quantile.fractions, vec![0.3, 1.0]);
            assert_eq!(quantile.locus_count(), 3);
        }
    }

    #[test]
    fn test_loaded_quantiles_are_merged() {
        let a = model("a", &["P1", "P2"], 2);
        let loaded: Vec<Quantile> = (0..2)
            .map(|_| {
                let mut q = Quantile::default();
                q.push(table(&["X1"]), 0.0);
                q.push(table(&["X2"]), 0.0);
                q
            })
            .collect();
        let quantiles = combine_into_quantiles(&[a], loaded, &[0.5]).unwrap();
        assert_eq!(quantiles[1].len(), 3);
        assert_eq!(quantiles[1].fractions, vec![1.0, 0.5, 1.0]);
        assert_eq!(quantiles[1].tables[2].attribute_names(), &["X2".to_string()]);
    }

    #[test]
    fn test_mismatched_quantile_counts_are_rejected() {
        let a = model("a", &["P1"], 3);
        let mut loaded = Quantile::default();
        loaded.push(table(&["X1"]), 1.0);
        let err = combine_into_quantiles(&[a], vec![loaded], &[]).unwrap_err();
        assert!(err.to_string().contains("same number of quantiles"));
    }
}
