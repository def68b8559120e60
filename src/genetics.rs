use ndarray::Array2;
use rand::Rng;

/// Number of genotype states of a diploid biallelic SNP.
pub const GENOTYPE_STATES: usize = 3;

/// Genotype symbol written to a dataset column.
pub type Genotype = i32;

/// Probability of each of the `states` genotype states of one locus.
///
/// State `j` is the genotype carrying `j` copies of the minor allele, so with
/// three states index 0 is major/major and index 2 is minor/minor. The values
/// are the binomial expansion of `(maf + (1 - maf))^(states - 1)`.
pub fn genotype_probabilities(maf: f64, states: usize) -> Vec<f64> {
    let n = states - 1;
    let mut comb = 1.0;
    (0..states)
        .map(|j| {
            let p = comb * maf.powi(j as i32) * (1.0 - maf).powi((n - j) as i32);
            comb = comb * (n - j) as f64 / (j + 1) as f64;
            p
        })
        .collect()
}

/// Loci x states matrix of genotype probabilities for a set of minor allele frequencies.
pub fn state_probability_matrix(mafs: &[f64], states: usize) -> Array2<f64> {
    let mut probs = Array2::zeros((mafs.len(), states));
    for (mut row, &maf) in probs.rows_mut().into_iter().zip(mafs) {
        for (slot, p) in row.iter_mut().zip(genotype_probabilities(maf, states)) {
            *slot = p;
        }
    }
    probs
}

/// Draws a genotype state from a vector of state probabilities.
pub fn draw_genotype<R: Rng + ?Sized>(rng: &mut R, probabilities: &[f64]) -> usize {
    let draw: f64 = rng.gen();
    let mut cumulative = 0.0;
    for (state, p) in probabilities.iter().enumerate() {
        cumulative += p;
        if draw < cumulative {
            return state;
        }
    }
    // Rounding can leave the cumulative sum a hair below 1.
    probabilities.len() - 1
}

/// Draws a minor allele frequency uniformly from `[min, max)`.
pub fn draw_minor_allele_frequency<R: Rng + ?Sized>(rng: &mut R, min: f64, max: f64) -> f64 {
    rng.gen::<f64>() * (max - min) + min
}
