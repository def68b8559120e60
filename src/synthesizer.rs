//! Draws case/control rows from a quantile of penetrance tables.
//!
//! Columns are laid out as passthrough noise, generated noise, passthrough
//! predictive, then each table's loci in order, followed by `Class`.

use crate::error::{PassthroughKind, SimError};
use crate::genetics::{
    draw_genotype, draw_minor_allele_frequency, genotype_probabilities, Genotype, GENOTYPE_STATES,
};
use crate::model::Quantile;
use crate::observable::Passthrough;
use crate::penetrance::{PenetranceTable, ERROR_LIMIT};
use csv;
use log::{debug, warn};
use ndarray::Array2;
use rand::Rng;
use std::fs::File;
use std::io::Write;
use std::path::Path;

pub const CASE: Genotype = 1;
pub const CONTROL: Genotype = 0;

/// Shape of one generated dataset.
#[derive(Debug, Clone)]
pub struct DatasetParams {
    pub total_attribute_count: usize,
    pub case_count: usize,
    pub control_count: usize,
    pub noise_maf_min: f64,
    pub noise_maf_max: f64,
}

impl Default for DatasetParams {
    fn default() -> Self {
        Self {
            total_attribute_count: 100,
            case_count: 400,
            control_count: 400,
            noise_maf_min: 0.01,
            noise_maf_max: 0.5,
        }
    }
}

/// How many cases and controls landed in each cell of one table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CellCounts {
    pub case: Vec<u32>,
    pub control: Vec<u32>,
}

impl CellCounts {
    pub fn new(cell_count: usize) -> Self {
        Self {
            case: vec![0; cell_count],
            control: vec![0; cell_count],
        }
    }

    fn record(&mut self, cell: usize, class: Genotype) {
        if class == CASE {
            self.case[cell] += 1;
        } else {
            self.control[cell] += 1;
        }
    }

    /// Balanced accuracy of the classifier calling a cell a case whenever its
    /// case share is at least its control share.
    pub fn balanced_accuracy(&self) -> f64 {
        let total_case: u64 = self.case.iter().map(|&c| c as u64).sum();
        let total_control: u64 = self.control.iter().map(|&c| c as u64).sum();
        let (mut correct_case, mut correct_control) = (0u64, 0u64);
        for (&case, &control) in self.case.iter().zip(self.control.iter()) {
            if case as u64 * total_control >= control as u64 * total_case {
                correct_case += case as u64;
            } else {
                correct_control += control as u64;
            }
        }
        (correct_case as f64 / total_case as f64 + correct_control as f64 / total_control as f64)
            / 2.0
    }
}

/// A generated dataset with its per-table bookkeeping.
#[derive(Debug, Clone)]
pub struct Dataset {
    pub header: Vec<String>,
    /// One row per individual, cases first, with the class label last.
    pub data: Array2<Genotype>,
    /// Index into the quantile of the table carrying each row's signal.
    pub signal_tables: Vec<usize>,
    /// One entry per table of the quantile.
    pub cell_counts: Vec<CellCounts>,
}

impl Dataset {
    pub fn rows(&self) -> usize {
        self.data.nrows()
    }

    pub fn write<W: Write>(&self, writer: W) -> Result<(), SimError> {
        let mut wtr = csv::WriterBuilder::new()
            .delimiter(b'\t')
            .has_headers(false)
            .from_writer(writer);
        wtr.write_record(&self.header)?;
        for row in self.data.rows() {
            wtr.write_record(row.iter().map(|v| v.to_string()))?;
        }
        wtr.flush()?;
        Ok(())
    }

    pub fn write_to_path<P: AsRef<Path>>(&self, path: P) -> Result<(), SimError> {
        let file = File::create(path.as_ref())?;
        self.write(file)
    }
}

/// Cumulative sampling intervals of one table, normalized to end at 1.
struct SamplingIntervals {
    case: Vec<f64>,
    control: Vec<f64>,
}

impl SamplingIntervals {
    fn new(table: &PenetranceTable) -> Self {
        let mut case = Vec::with_capacity(table.cell_count());
        let mut control = Vec::with_capacity(table.cell_count());
        let (mut case_sum, mut control_sum) = (0.0, 0.0);
        for master in 0..table.cell_count() {
            let p = table.cell_probability(master);
            let penetrance = table.value(master);
            case_sum += p * penetrance;
            control_sum += p * (1.0 - penetrance);
            case.push(case_sum);
            control.push(control_sum);
        }
        debug_assert!((case_sum + control_sum - 1.0).abs() < ERROR_LIMIT);
        for c in case.iter_mut() {
            *c /= case_sum;
        }
        for c in control.iter_mut() {
            *c /= control_sum;
        }
        Self { case, control }
    }

    fn for_class(&self, class: Genotype) -> &[f64] {
        if class == CASE {
            &self.case
        } else {
            &self.control
        }
    }
}

fn draw_cell<R: Rng + ?Sized>(rng: &mut R, intervals: &[f64]) -> usize {
    let draw: f64 = rng.gen();
    intervals
        .iter()
        .position(|&edge| draw < edge)
        .unwrap_or(intervals.len() - 1)
}

/// Index of the table carrying the signal for a row at `row_fraction` of its class.
fn signal_table(row_fraction: f64, fractions: &[f64]) -> usize {
    let total: f64 = fractions.iter().sum();
    let mut before = 0.0;
    for (k, &fraction) in fractions.iter().enumerate() {
        if row_fraction * total < before + fraction {
            return k;
        }
        before += fraction;
    }
    fractions.len().saturating_sub(1)
}

struct Generator<'a> {
    quantile: &'a Quantile,
    intervals: Vec<SamplingIntervals>,
    locus_probabilities: Vec<Vec<Vec<f64>>>,
    noise_probabilities: Vec<Vec<f64>>,
    predictive: Option<&'a Passthrough>,
    noise: Option<&'a Passthrough>,
    data: Array2<Genotype>,
    signal_tables: Vec<usize>,
    cell_counts: Vec<CellCounts>,
}

impl<'a> Generator<'a> {
    /// Writes `count` rows of `class` starting at output row `first_row`.
    fn emit<R: Rng + ?Sized>(
        &mut self,
        rng: &mut R,
        class: Genotype,
        count: usize,
        first_row: usize,
    ) -> Result<(), SimError> {
        let mut next_noise = first_row;
        let mut next_predictive = 0;

        for row in 0..count {
            let out = first_row + row;
            let signal = signal_table(row as f64 / count as f64, &self.quantile.fractions);
            let mut col = 0;

            if let Some(noise) = self.noise {
                if next_noise >= noise.rows() {
                    return Err(SimError::PassthroughExhausted {
                        kind: PassthroughKind::Noise,
                        row: out,
                    });
                }
                for &value in noise.data.row(next_noise).iter() {
                    self.data[[out, col]] = value;
                    col += 1;
                }
                next_noise += 1;
            }

            for probs in self.noise_probabilities.iter() {
                self.data[[out, col]] = draw_genotype(rng, probs) as Genotype;
                col += 1;
            }

            if let Some(predictive) = self.predictive {
                let label = predictive.columns() - 1;
                while next_predictive < predictive.rows()
                    && predictive.data[[next_predictive, label]] != class
                {
                    next_predictive += 1;
                }
                if next_predictive >= predictive.rows() {
                    return Err(SimError::PassthroughExhausted {
                        kind: PassthroughKind::Predictive,
                        row: out,
                    });
                }
                for &value in predictive.data.row(next_predictive).iter().take(label) {
                    self.data[[out, col]] = value;
                    col += 1;
                }
                next_predictive += 1;
            }

            for (t, table) in self.quantile.tables.iter().enumerate() {
                let cell = if t == signal {
                    let cell = draw_cell(rng, self.intervals[t].for_class(class));
                    let mut coords = vec![0; table.loci()];
                    crate::hypercube::fill_coords(cell, table.states(), &mut coords);
                    for state in coords {
                        self.data[[out, col]] = state as Genotype;
                        col += 1;
                    }
                    cell
                } else {
                    let mut coords = Vec::with_capacity(table.loci());
                    for probs in self.locus_probabilities[t].iter() {
                        let state = draw_genotype(rng, probs);
                        self.data[[out, col]] = state as Genotype;
                        col += 1;
                        coords.push(state);
                    }
                    table.master_index(&coords)
                };
                self.cell_counts[t].record(cell, class);
            }

            self.data[[out, col]] = class;
            self.signal_tables.push(signal);
        }
        Ok(())
    }
}

/// Generates one dataset of `params.case_count` cases followed by
/// `params.control_count` controls.
///
/// The number of generated noise columns is whatever remains of
/// `total_attribute_count` after the tables' loci and both passthroughs.
pub fn synthesize<R: Rng + ?Sized>(
    rng: &mut R,
    quantile: &Quantile,
    params: &DatasetParams,
    predictive: Option<&Passthrough>,
    noise: Option<&Passthrough>,
) -> Result<Dataset, SimError> {
    if quantile.fractions.len() != quantile.tables.len() {
        return Err(SimError::input("Every table in a quantile needs a fraction"));
    }
    if let Some(p) = predictive {
        if p.columns() == 0 {
            return Err(SimError::input("Predictive passthrough data needs a class column"));
        }
    }

    let table_locus_count = quantile.locus_count();
    let predictive_columns = predictive.map_or(0, |p| p.columns() - 1);
    let noise_passthrough_columns = noise.map_or(0, |n| n.columns());
    let predictive_count = table_locus_count + predictive_columns;
    let total_noise = params
        .total_attribute_count
        .checked_sub(predictive_count)
        .ok_or_else(|| {
            SimError::input(format!(
                "Total attribute count {} is smaller than the {} predictive attributes",
                params.total_attribute_count, predictive_count
            ))
        })?;
    let generated_noise = total_noise
        .checked_sub(noise_passthrough_columns)
        .ok_or_else(|| {
            SimError::input(format!(
                "Total attribute count {} leaves room for {} noise attributes but the noise passthrough has {}",
                params.total_attribute_count, total_noise, noise_passthrough_columns
            ))
        })?;

    let mut header: Vec<String> = (0..total_noise).map(|i| format!("N{}", i)).collect();
    header.extend((0..predictive_columns).map(|i| format!("P{}", table_locus_count + 1 + i)));
    for table in quantile.tables.iter() {
        header.extend(table.attribute_names().iter().cloned());
    }
    header.push("Class".to_string());

    let noise_probabilities: Vec<Vec<f64>> = (0..generated_noise)
        .map(|_| {
            let maf = draw_minor_allele_frequency(rng, params.noise_maf_min, params.noise_maf_max);
            genotype_probabilities(maf, GENOTYPE_STATES)
        })
        .collect();

    for table in quantile.tables.iter() {
        if !table.is_normalized() {
            warn!(
                "Sampling from table {:?}, which is not normalized",
                table.attribute_names()
            );
        }
    }

    let rows = params.case_count + params.control_count;
    let mut generator = Generator {
        quantile,
        intervals: quantile.tables.iter().map(|t| SamplingIntervals::new(t)).collect(),
        locus_probabilities: quantile
            .tables
            .iter()
            .map(|t| (0..t.loci()).map(|l| t.locus_probabilities(l)).collect())
            .collect(),
        noise_probabilities,
        predictive,
        noise,
        data: Array2::zeros((rows, header.len())),
        signal_tables: Vec::with_capacity(rows),
        cell_counts: quantile
            .tables
            .iter()
            .map(|t| CellCounts::new(t.cell_count()))
            .collect(),
    };

    generator.emit(rng, CASE, params.case_count, 0)?;
    generator.emit(rng, CONTROL, params.control_count, params.case_count)?;
    debug!(
        "Generated {} rows x {} columns ({} noise)",
        rows,
        header.len(),
        total_noise
    );

    Ok(Dataset {
        header,
        data: generator.data,
        signal_tables: generator.signal_tables,
        cell_counts: generator.cell_counts,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::construction::StartPoint;
    use approx::assert_abs_diff_eq;
    use ndarray::array;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::sync::Arc;

    fn normalized_table(rng: &mut StdRng, names: &[&str]) -> Arc<PenetranceTable> {
        let names: Vec<String> = names.iter().map(|s| s.to_string()).collect();
        loop {
            let mut t = PenetranceTable::new(3, names.clone(), vec![0.3; names.len()]).unwrap();
            t.initialize(rng, StartPoint::Random);
            if t.fill(rng).is_ok() && t.normalize(None, 0.1).is_ok() && t.check_row_sums() {
                return Arc::new(t);
            }
        }
    }

    fn quantile(rng: &mut StdRng, fractions: &[f64]) -> Quantile {
        let mut q = Quantile::default();
        for (i, &f) in fractions.iter().enumerate() {
            let a = format!("M{}P1", i);
            let b = format!("M{}P2", i);
            q.push(normalized_table(rng, &[a.as_str(), b.as_str()]), f);
        }
        q
    }

    fn params(total: usize, cases: usize, controls: usize) -> DatasetParams {
        DatasetParams {
            total_attribute_count: total,
            case_count: cases,
            control_count: controls,
            ..DatasetParams::default()
        }
    }

    #[test]
    fn test_rows_and_labels() {
        let mut rng = StdRng::seed_from_u64(10);
        let q = quantile(&mut rng, &[1.0]);
        let dataset = synthesize(&mut rng, &q, &params(10, 100, 50), None, None).unwrap();
        assert_eq!(dataset.data.dim(), (150, 11));
        let class = dataset.data.ncols() - 1;
        assert!((0..100).all(|r| dataset.data[[r, class]] == CASE));
        assert!((100..150).all(|r| dataset.data[[r, class]] == CONTROL));
        assert!(dataset
            .data
            .iter()
            .all(|&v| (0..GENOTYPE_STATES as Genotype).contains(&v)));
        let counts = &dataset.cell_counts[0];
        assert_eq!(counts.case.iter().sum::<u32>(), 100);
        assert_eq!(counts.control.iter().sum::<u32>(), 50);
    }

    #[test]
    fn test_header_order() {
        let mut rng = StdRng::seed_from_u64(11);
        let q = quantile(&mut rng, &[1.0, 1.0]);
        let predictive = Passthrough {
            header: None,
            data: array![[2, 1], [0, 0], [1, 1], [2, 0]],
        };
        let noise = Passthrough {
            header: None,
            data: Array2::zeros((4, 2)),
        };
        let dataset =
            synthesize(&mut rng, &q, &params(8, 2, 2), Some(&predictive), Some(&noise)).unwrap();
        assert_eq!(
            dataset.header,
            vec!["N0", "N1", "N2", "P5", "M0P1", "M0P2", "M1P1", "M1P2", "Class"]
        );
        // Cases take the predictive rows labelled 1, controls those labelled 0.
        assert_eq!(dataset.data[[0, 3]], 2);
        assert_eq!(dataset.data[[1, 3]], 1);
        assert_eq!(dataset.data[[2, 3]], 0);
        assert_eq!(dataset.data[[3, 3]], 2);
    }

    #[test]
    fn test_heterogeneity_splits_signal_by_fraction() {
        let mut rng = StdRng::seed_from_u64(12);
        let q = quantile(&mut rng, &[0.3, 0.7]);
        let dataset = synthesize(&mut rng, &q, &params(4, 500, 500), None, None).unwrap();
        let first = dataset.signal_tables.iter().filter(|&&t| t == 0).count();
        assert_abs_diff_eq!(first as f64 / 1000.0, 0.3, epsilon = 0.05);
        // Signal rows come first within each class.
        assert_eq!(dataset.signal_tables[0], 0);
        assert_eq!(dataset.signal_tables[499], 1);
    }

    #[test]
    fn test_zero_fraction_table_is_pure_noise() {
        let mut rng = StdRng::seed_from_u64(13);
        let q = quantile(&mut rng, &[1.0, 0.0]);
        let dataset = synthesize(&mut rng, &q, &params(4, 50, 50), None, None).unwrap();
        assert!(dataset.signal_tables.iter().all(|&t| t == 0));
    }

    #[test]
    fn test_exhausted_noise_passthrough() {
        let mut rng = StdRng::seed_from_u64(14);
        let q = quantile(&mut rng, &[1.0]);
        let noise = Passthrough {
            header: None,
            data: Array2::zeros((5, 1)),
        };
        let err = synthesize(&mut rng, &q, &params(5, 3, 3), None, Some(&noise)).unwrap_err();
        assert!(matches!(
            err,
            SimError::PassthroughExhausted {
                kind: PassthroughKind::Noise,
                row: 5
            }
        ));
    }

    #[test]
    fn test_exhausted_predictive_passthrough() {
        let mut rng = StdRng::seed_from_u64(15);
        let q = quantile(&mut rng, &[1.0]);
        let predictive = Passthrough {
            header: None,
            data: array![[1, 1], [1, 0]],
        };
        let err = synthesize(&mut rng, &q, &params(5, 2, 1), Some(&predictive), None).unwrap_err();
        assert!(matches!(
            err,
            SimError::PassthroughExhausted {
                kind: PassthroughKind::Predictive,
                row: 1
            }
        ));
    }

    #[test]
    fn test_too_few_attributes_is_an_input_error() {
        let mut rng = StdRng::seed_from_u64(16);
        let q = quantile(&mut rng, &[1.0, 1.0]);
        let err = synthesize(&mut rng, &q, &params(3, 1, 1), None, None).unwrap_err();
        assert!(matches!(err, SimError::Input(_)));
    }

    #[test]
    fn test_cases_follow_penetrance() {
        let mut rng = StdRng::seed_from_u64(17);
        let q = quantile(&mut rng, &[1.0]);
        let dataset = synthesize(&mut rng, &q, &params(2, 4000, 4000), None, None).unwrap();
        let table = &q.tables[0];
        let counts = &dataset.cell_counts[0];
        let case_mass: f64 = (0..table.cell_count())
            .map(|m| table.cell_probability(m) * table.value(m))
            .sum();
        // The most case-heavy cell's observed share tracks its expected share.
        let best = (0..table.cell_count())
            .max_by(|&a, &b| {
                (table.cell_probability(a) * table.value(a))
                    .total_cmp(&(table.cell_probability(b) * table.value(b)))
            })
            .unwrap();
        let expected = table.cell_probability(best) * table.value(best) / case_mass;
        assert_abs_diff_eq!(counts.case[best] as f64 / 4000.0, expected, epsilon = 0.03);
        assert!(counts.balanced_accuracy() > 0.5);
    }

    #[test]
    fn test_balanced_accuracy_of_separable_counts() {
        let counts = CellCounts {
            case: vec![10, 0, 0],
            control: vec![0, 5, 5],
        };
        assert_abs_diff_eq!(counts.balanced_accuracy(), 1.0);
        let counts = CellCounts {
            case: vec![5, 5],
            control: vec![5, 5],
        };
        assert_abs_diff_eq!(counts.balanced_accuracy(), 0.5);
    }

    #[test]
    fn test_write_is_tab_delimited() {
        let dataset = Dataset {
            header: vec!["N0".into(), "P1".into(), "Class".into()],
            data: array![[0, 2, 1], [1, 1, 0]],
            signal_tables: vec![0, 0],
            cell_counts: Vec::new(),
        };
        let mut out = Vec::new();
        dataset.write(&mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "N0\tP1\tClass\n0\t2\t1\n1\t1\t0\n");
    }
}
