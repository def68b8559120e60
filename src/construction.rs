//! Fills an empty penetrance table so that every row along every locus has a
//! probability-weighted sum of zero.
//!
//! Cells are chosen one at a time and given the next value from the table's
//! basis. Whenever a row has exactly one unset cell left, that cell is forced
//! to the value that brings the row back to zero, which in turn may force
//! cells on other rows. A row whose last cell arrives with a non-zero sum is a
//! conflict and the whole table is thrown away.

use crate::error::ConstructionError;
use crate::hypercube;
use crate::penetrance::{PenetranceTable, TableState, ERROR_LIMIT};
use log::trace;
use rand::Rng;
use std::collections::VecDeque;

/// Tables with at least this many loci pick cells with the point method.
pub const POINT_METHOD_MIN_LOCI: usize = 6;

/// Random draws tried before scanning for an unset cell.
const RANDOM_PICK_ATTEMPTS: usize = 100;

/// Weighted row sum every completed row must reach before normalization.
const ROW_SUM: f64 = 0.0;

/// Where the first basis value is placed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartPoint {
    Random,
    Origin,
}

/// Strategy for choosing the next cell to receive a basis value.
#[derive(Debug, Clone)]
pub enum CellPicker {
    /// Random unset cells, starting from the table's start point.
    Random { started: bool },
    /// Sequential scan over the cells sharing no state with `blocked`.
    Point { blocked: Vec<usize>, next: usize },
}

impl CellPicker {
    /// Selects the strategy suited to the table's dimensionality.
    pub fn for_table<R: Rng + ?Sized>(table: &PenetranceTable, rng: &mut R) -> Self {
        if table.loci() >= POINT_METHOD_MIN_LOCI {
            let blocked = table.coords(rng.gen_range(0..table.cell_count()));
            CellPicker::Point { blocked, next: 0 }
        } else {
            CellPicker::Random { started: false }
        }
    }

    /// Returns the master index of an unset cell, or `None` if none can be found.
    pub fn pick_next_empty_cell<R: Rng + ?Sized>(
        &mut self,
        table: &PenetranceTable,
        rng: &mut R,
    ) -> Option<usize> {
        match self {
            CellPicker::Random { started } => {
                if !*started {
                    *started = true;
                    let start = table.master_index(&table.start_point);
                    if !table.cells[start].is_set {
                        return Some(start);
                    }
                }
                let cell_count = table.cell_count();
                for _ in 0..RANDOM_PICK_ATTEMPTS {
                    let master = rng.gen_range(0..cell_count);
                    if !table.cells[master].is_set {
                        return Some(master);
                    }
                }
                let offset = rng.gen_range(0..cell_count);
                (0..cell_count)
                    .map(|i| (offset + i) % cell_count)
                    .find(|&master| !table.cells[master].is_set)
            }
            CellPicker::Point { blocked, next } => {
                let mut coords = vec![0; table.loci()];
                while *next < table.cell_count() {
                    let master = *next;
                    *next += 1;
                    hypercube::fill_coords(master, table.states(), &mut coords);
                    if !hypercube::matches_on_any_axis(blocked, &coords)
                        && !table.cells[master].is_set
                    {
                        return Some(master);
                    }
                }
                None
            }
        }
    }
}

/// A cell waiting in the propagation queue.
enum Pending {
    /// Takes the next basis value when committed.
    Basis(usize),
    /// Value forced by a row with one cell missing.
    Forced(usize, f64),
}

impl PenetranceTable {
    /// Clears the table, draws a fresh unit-norm basis and picks a start point.
    pub fn initialize<R: Rng + ?Sized>(&mut self, rng: &mut R, start: StartPoint) {
        self.clear();

        let mut squared_sum = 0.0;
        for slot in self.basis.iter_mut() {
            slot.value = rng.gen::<f64>();
            squared_sum += slot.value * slot.value;
        }
        let norm = squared_sum.sqrt();
        if norm > 0.0 {
            for slot in self.basis.iter_mut() {
                slot.value /= norm;
            }
        }

        for coord in self.start_point.iter_mut() {
            *coord = match start {
                StartPoint::Random => rng.gen_range(0..self.states),
                StartPoint::Origin => 0,
            };
        }
    }

    /// Fills every cell of an initialized table.
    ///
    /// On error the table is left in the `Ambiguous` or `Conflict` state and
    /// should be discarded.
    pub fn fill<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Result<(), ConstructionError> {
        let mut picker = CellPicker::for_table(self, rng);
        self.state = TableState::Filling;
        let result = self.fill_with(&mut picker, rng);
        self.state = match &result {
            Ok(()) => TableState::Valid,
            Err(ConstructionError::Conflict { .. }) => TableState::Conflict,
            Err(_) => TableState::Ambiguous,
        };
        trace!(
            "table {:?}: {:?} with {} of {} basis values used",
            self.attribute_names(),
            self.state,
            self.basis_cells_used(),
            self.basis_size()
        );
        result
    }

    fn fill_with<R: Rng + ?Sized>(
        &mut self,
        picker: &mut CellPicker,
        rng: &mut R,
    ) -> Result<(), ConstructionError> {
        while self.unset_count > 0 {
            let master = picker
                .pick_next_empty_cell(self, rng)
                .ok_or(ConstructionError::NoEmptyCell)?;
            self.set_and_propagate(master)?;
        }
        Ok(())
    }

    /// Places the next basis value at `master` and sets every cell it forces.
    fn set_and_propagate(&mut self, master: usize) -> Result<(), ConstructionError> {
        let mut pending = VecDeque::new();
        pending.push_back(Pending::Basis(master));

        while let Some(next) = pending.pop_front() {
            let cell = match next {
                Pending::Basis(cell) | Pending::Forced(cell, _) => cell,
            };
            // The same cell can be queued by several rows; the first one wins
            // and the completed-row check below catches any disagreement.
            if self.cells[cell].is_set {
                continue;
            }
            match next {
                Pending::Basis(_) => self.commit_basis(cell)?,
                Pending::Forced(_, value) => self.commit(cell, value),
            }

            for axis in 0..self.loci {
                let (filled, empty) = self.count_filled(cell, axis);
                if filled == self.states {
                    let sum = self.weighted_row_sum(cell, axis);
                    if (sum - ROW_SUM).abs() > ERROR_LIMIT {
                        trace!("conflict on locus {} through cell {}: {}", axis, cell, sum);
                        return Err(ConstructionError::Conflict { axis, sum });
                    }
                } else if filled == self.states - 1 {
                    if let Some(empty) = empty {
                        let value = self.forced_value(empty, axis);
                        pending.push_back(Pending::Forced(empty, value));
                    }
                }
            }
        }
        Ok(())
    }

    fn commit_basis(&mut self, cell: usize) -> Result<(), ConstructionError> {
        if self.basis_next >= self.basis.len() {
            return Err(ConstructionError::Ambiguous);
        }
        let which = self.basis_next;
        self.basis_next += 1;
        self.basis[which].which_cell = Some(cell);
        let value = self.basis[which].value;
        self.commit(cell, value);
        self.cells[cell].basis_ref = Some(which);
        Ok(())
    }

    fn commit(&mut self, cell: usize, value: f64) {
        debug_assert!(!self.cells[cell].is_set);
        self.cells[cell].value = value;
        self.cells[cell].is_set = true;
        self.unset_count -= 1;
    }

    /// Value that brings the row through the unset cell `empty` to `ROW_SUM`.
    fn forced_value(&self, empty: usize, axis: usize) -> f64 {
        let state = self.coords(empty)[axis];
        let sum = self.weighted_row_sum(empty, axis);
        (ROW_SUM - sum) / self.state_probabilities[[axis, state]]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hypercube;
    use approx::assert_abs_diff_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn table(states: usize, mafs: &[f64]) -> PenetranceTable {
        let names = (0..mafs.len()).map(|i| format!("P{}", i + 1)).collect();
        PenetranceTable::new(states, names, mafs.to_vec()).unwrap()
    }

    fn assert_rows_sum_to_zero(table: &PenetranceTable) {
        for axis in 0..table.loci() {
            for master in 0..table.cell_count() {
                if table.coords(master)[axis] == 0 {
                    assert_abs_diff_eq!(table.weighted_row_sum(master, axis), 0.0, epsilon = ERROR_LIMIT);
                }
            }
        }
    }

    #[test]
    fn test_initialize_draws_unit_norm_basis() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut t = table(3, &[0.2, 0.4, 0.3]);
        t.initialize(&mut rng, StartPoint::Random);
        let norm: f64 = t.basis().iter().map(|b| b.value * b.value).sum::<f64>().sqrt();
        assert_abs_diff_eq!(norm, 1.0, epsilon = 1e-12);
        assert!(t.basis().iter().all(|b| b.value >= 0.0 && b.which_cell.is_none()));
        assert_eq!(t.state(), TableState::Empty);
    }

    #[test]
    fn test_two_state_tables_always_fill() {
        // With two states there is a single basis value and every other cell is forced.
        let mut rng = StdRng::seed_from_u64(11);
        for loci in 1..=4 {
            let mut t = table(2, &vec![0.3; loci]);
            t.initialize(&mut rng, StartPoint::Random);
            assert_eq!(t.fill(&mut rng), Ok(()));
            assert_eq!(t.state(), TableState::Valid);
            assert_eq!(t.basis_cells_used(), 1);
            assert_rows_sum_to_zero(&t);
        }
    }

    #[test]
    fn test_valid_tables_respect_row_sums_and_basis_budget() {
        let mut rng = StdRng::seed_from_u64(5);
        let mut valid = 0;
        for _ in 0..200 {
            let mut t = table(3, &[0.3, 0.3]);
            t.initialize(&mut rng, StartPoint::Random);
            match t.fill(&mut rng) {
                Ok(()) => {
                    valid += 1;
                    assert_eq!(t.state(), TableState::Valid);
                    assert!(t.cells().iter().all(|c| c.is_set));
                    assert!(t.basis_cells_used() <= t.basis_size());
                    for (which, slot) in t.basis().iter().enumerate() {
                        if let Some(cell) = slot.which_cell {
                            assert_eq!(t.cells()[cell].basis_ref, Some(which));
                        }
                    }
                    assert_rows_sum_to_zero(&t);
                }
                Err(ConstructionError::Conflict { .. }) => assert_eq!(t.state(), TableState::Conflict),
                Err(_) => assert_eq!(t.state(), TableState::Ambiguous),
            }
        }
        assert!(valid > 0);
    }

    #[test]
    fn test_origin_start_places_first_basis_value_at_origin() {
        let mut rng = StdRng::seed_from_u64(9);
        let mut t = table(3, &[0.25, 0.4]);
        t.initialize(&mut rng, StartPoint::Origin);
        let _ = t.fill(&mut rng);
        assert_eq!(t.basis()[0].which_cell, Some(0));
        assert_eq!(t.cells()[0].basis_ref, Some(0));
    }

    #[test]
    fn test_point_method_skips_blocked_states() {
        let mut rng = StdRng::seed_from_u64(21);
        let mut t = table(3, &[0.3; POINT_METHOD_MIN_LOCI]);
        t.initialize(&mut rng, StartPoint::Random);
        let mut picker = CellPicker::for_table(&t, &mut rng);
        let blocked = match &picker {
            CellPicker::Point { blocked, .. } => blocked.clone(),
            CellPicker::Random { .. } => panic!("expected the point method for six loci"),
        };
        let mut picked = 0;
        while let Some(master) = picker.pick_next_empty_cell(&t, &mut rng) {
            let coords = hypercube::from_master_index(master, 3, POINT_METHOD_MIN_LOCI);
            assert!(!hypercube::matches_on_any_axis(&blocked, &coords));
            picked += 1;
        }
        // Exactly the (k-1)^n cells avoiding every blocked state.
        assert_eq!(picked, t.basis_size());
    }

    #[test]
    fn test_small_tables_use_random_picking() {
        let mut rng = StdRng::seed_from_u64(1);
        let t = table(3, &[0.3; 3]);
        assert!(matches!(
            CellPicker::for_table(&t, &mut rng),
            CellPicker::Random { .. }
        ));
    }

    #[test]
    fn test_high_dimensional_fill_terminates() {
        let mut rng = StdRng::seed_from_u64(2);
        let mut t = table(3, &[0.3; POINT_METHOD_MIN_LOCI]);
        t.initialize(&mut rng, StartPoint::Random);
        let result = t.fill(&mut rng);
        assert_ne!(t.state(), TableState::Filling);
        if result.is_ok() {
            assert_rows_sum_to_zero(&t);
        }
    }
}
