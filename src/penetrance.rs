use crate::error::SimError;
use crate::genetics::state_probability_matrix;
use crate::hypercube;
use ndarray::Array2;

/// Absolute tolerance for every row-sum, prevalence and heritability check.
pub const ERROR_LIMIT: f64 = 0.01;

/// Where a table is in its construction lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableState {
    Empty,
    Filling,
    Valid,
    Ambiguous,
    Conflict,
}

/// One penetrance cell. `value` is only meaningful once `is_set`.
#[derive(Debug, Clone, Default)]
pub struct Cell {
    pub value: f64,
    pub is_set: bool,
    /// Index into the table's basis when the value was drawn rather than forced.
    pub basis_ref: Option<usize>,
}

/// One independently drawn parameter of the table.
#[derive(Debug, Clone, Default)]
pub struct BasisSlot {
    pub value: f64,
    /// Master index of the cell holding this value, if it has been placed.
    pub which_cell: Option<usize>,
}

/// Statistics of a normalized table.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Scores {
    pub prevalence: f64,
    pub heritability: f64,
    pub edm: f64,
    pub odds_ratio: f64,
}

impl Scores {
    /// The score tables are ranked by when picking quantiles.
    pub fn quantile_score(&self, use_odds_ratio: bool) -> f64 {
        if use_odds_ratio {
            self.odds_ratio
        } else {
            self.edm
        }
    }
}

/// An n-dimensional table of case probabilities indexed by multi-locus genotype.
#[derive(Debug, Clone)]
pub struct PenetranceTable {
    pub(crate) states: usize,
    pub(crate) loci: usize,
    attribute_names: Vec<String>,
    minor_allele_frequencies: Vec<f64>,
    pub(crate) state_probabilities: Array2<f64>,
    pub(crate) cell_probabilities: Vec<f64>,
    pub(crate) cells: Vec<Cell>,
    pub(crate) basis: Vec<BasisSlot>,
    pub(crate) basis_next: usize,
    pub(crate) unset_count: usize,
    pub(crate) start_point: Vec<usize>,
    pub(crate) state: TableState,
    pub(crate) scores: Scores,
    pub(crate) normalized: bool,
    pub(crate) row_sums_valid: bool,
}

impl PenetranceTable {
    /// Constructs an empty table with every cell unset.
    pub fn new(
        states: usize,
        attribute_names: Vec<String>,
        minor_allele_frequencies: Vec<f64>,
    ) -> Result<Self, SimError> {
        if states < 2 {
            return Err(SimError::input(format!(
                "A locus needs at least 2 genotype states, got {}",
                states
            )));
        }
        if attribute_names.is_empty() {
            return Err(SimError::input("A penetrance table needs at least one locus"));
        }
        if attribute_names.len() != minor_allele_frequencies.len() {
            return Err(SimError::input(format!(
                "Got {} attribute names but {} minor allele frequencies",
                attribute_names.len(),
                minor_allele_frequencies.len()
            )));
        }
        let loci = attribute_names.len();
        let (cell_count, basis_size) = match (
            hypercube::cell_count(states, loci),
            hypercube::cell_count(states - 1, loci),
        ) {
            (Some(cells), Some(basis)) => (cells, basis),
            _ => {
                return Err(SimError::input(format!(
                    "A table with {} loci of {} states has too many cells",
                    loci, states
                )))
            }
        };
        let state_probabilities = state_probability_matrix(&minor_allele_frequencies, states);

        let mut coords = vec![0; loci];
        let cell_probabilities: Vec<f64> = (0..cell_count)
            .map(|master| {
                hypercube::fill_coords(master, states, &mut coords);
                coords
                    .iter()
                    .enumerate()
                    .map(|(locus, &s)| state_probabilities[[locus, s]])
                    .product::<f64>()
            })
            .collect();

        Ok(Self {
            states,
            loci,
            attribute_names,
            minor_allele_frequencies,
            state_probabilities,
            cell_probabilities,
            cells: vec![Cell::default(); cell_count],
            basis: vec![BasisSlot::default(); basis_size],
            basis_next: 0,
            unset_count: cell_count,
            start_point: vec![0; loci],
            state: TableState::Empty,
            scores: Scores::default(),
            normalized: false,
            row_sums_valid: false,
        })
    }

    /// Constructs a fully set table from previously computed penetrance values.
    ///
    /// The table is treated as normalized and its scores are recomputed.
    pub fn from_values(
        states: usize,
        attribute_names: Vec<String>,
        minor_allele_frequencies: Vec<f64>,
        values: &[f64],
    ) -> Result<Self, SimError> {
        let mut table = Self::new(states, attribute_names, minor_allele_frequencies)?;
        if values.len() != table.cell_count() {
            return Err(SimError::input(format!(
                "Expected {} penetrance values but got {}",
                table.cell_count(),
                values.len()
            )));
        }
        for (cell, &value) in table.cells.iter_mut().zip(values) {
            cell.value = value;
            cell.is_set = true;
        }
        table.unset_count = 0;
        table.state = TableState::Valid;
        table.normalized = true;
        table.recompute_scores();
        table.check_row_sums();
        Ok(table)
    }

    /// Clears every cell and basis assignment.
    pub fn clear(&mut self) {
        for cell in self.cells.iter_mut() {
            *cell = Cell::default();
        }
        for slot in self.basis.iter_mut() {
            slot.which_cell = None;
        }
        self.basis_next = 0;
        self.unset_count = self.cells.len();
        self.state = TableState::Empty;
        self.scores = Scores::default();
        self.normalized = false;
        self.row_sums_valid = false;
    }

    pub fn states(&self) -> usize {
        self.states
    }

    pub fn loci(&self) -> usize {
        self.loci
    }

    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }

    pub fn basis_size(&self) -> usize {
        self.basis.len()
    }

    pub fn attribute_names(&self) -> &[String] {
        &self.attribute_names
    }

    pub fn minor_allele_frequencies(&self) -> &[f64] {
        &self.minor_allele_frequencies
    }

    /// Genotype state probabilities of one locus.
    pub fn locus_probabilities(&self, locus: usize) -> Vec<f64> {
        self.state_probabilities.row(locus).to_vec()
    }

    pub fn state(&self) -> TableState {
        self.state
    }

    pub fn scores(&self) -> Scores {
        self.scores
    }

    pub fn is_normalized(&self) -> bool {
        self.normalized
    }

    pub fn row_sums_valid(&self) -> bool {
        self.row_sums_valid
    }

    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    pub fn basis(&self) -> &[BasisSlot] {
        &self.basis
    }

    /// Penetrance of the cell at `master`.
    pub fn value(&self, master: usize) -> f64 {
        self.cells[master].value
    }

    pub fn values(&self) -> Vec<f64> {
        self.cells.iter().map(|c| c.value).collect()
    }

    /// Joint genotype probability of the cell at `master`.
    pub fn cell_probability(&self, master: usize) -> f64 {
        self.cell_probabilities[master]
    }

    pub fn master_index(&self, coords: &[usize]) -> usize {
        hypercube::to_master_index(coords, self.states)
    }

    pub fn coords(&self, master: usize) -> Vec<usize> {
        hypercube::from_master_index(master, self.states, self.loci)
    }

    /// Master indices of the `k` cells on the line through `master` along `axis`.
    pub(crate) fn row(&self, master: usize, axis: usize) -> impl Iterator<Item = usize> {
        let states = self.states;
        (0..states).map(move |s| hypercube::along_axis(master, states, axis, s))
    }

    /// Counts the set cells on a row, also returning one of the unset cells if any.
    pub(crate) fn count_filled(&self, master: usize, axis: usize) -> (usize, Option<usize>) {
        let mut filled = 0;
        let mut empty = None;
        for cell in self.row(master, axis) {
            if self.cells[cell].is_set {
                filled += 1;
            } else {
                empty = Some(cell);
            }
        }
        (filled, empty)
    }

    /// Probability-weighted sum of the set values on a row.
    pub(crate) fn weighted_row_sum(&self, master: usize, axis: usize) -> f64 {
        self.row(master, axis)
            .enumerate()
            .filter(|&(_, cell)| self.cells[cell].is_set)
            .map(|(s, cell)| self.state_probabilities[[axis, s]] * self.cells[cell].value)
            .sum()
    }

    /// Number of cells that were set directly from the basis.
    pub fn basis_cells_used(&self) -> usize {
        self.cells.iter().filter(|c| c.basis_ref.is_some()).count()
    }
}
