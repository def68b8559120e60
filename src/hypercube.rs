//! Bijection between per-locus genotype coordinates and a flat cell index.
//!
//! Locus 0 is the least significant digit, so incrementing the master index
//! walks across a row first (locus 0), then down a column (locus 1), then
//! from one square to the next (locus 2), and so on.

/// Returns `k^n`, the number of cells in a table with `n` loci of `k` states,
/// or `None` when that does not fit in a `usize`.
pub fn cell_count(states: usize, loci: usize) -> Option<usize> {
    u32::try_from(loci).ok().and_then(|n| states.checked_pow(n))
}

/// Converts per-locus coordinates into a master index.
pub fn to_master_index(coords: &[usize], states: usize) -> usize {
    coords
        .iter()
        .rev()
        .fold(0, |index, &coord| index * states + coord)
}

/// Converts a master index into per-locus coordinates.
pub fn from_master_index(master: usize, states: usize, loci: usize) -> Vec<usize> {
    let mut coords = vec![0; loci];
    fill_coords(master, states, &mut coords);
    coords
}

/// Like `from_master_index`, but writes into a caller-owned buffer.
pub fn fill_coords(master: usize, states: usize, coords: &mut [usize]) {
    let mut index = master;
    for coord in coords.iter_mut() {
        *coord = index % states;
        index /= states;
    }
}

/// True when the two cells share a state on at least one locus.
pub fn matches_on_any_axis(a: &[usize], b: &[usize]) -> bool {
    a.iter().zip(b).any(|(x, y)| x == y)
}

/// Master index of the cell reached from `master` by moving locus `axis` to `state`.
pub fn along_axis(master: usize, states: usize, axis: usize, state: usize) -> usize {
    let stride = states.pow(axis as u32);
    let current = (master / stride) % states;
    master - current * stride + state * stride
}
