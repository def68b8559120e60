//! Text formats for penetrance tables, population scores and per-cell counts.

use crate::error::SimError;
use crate::genetics::GENOTYPE_STATES;
use crate::model::{Model, Quantile};
use crate::penetrance::PenetranceTable;
use crate::synthesizer::CellCounts;
use std::fmt;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::path::Path;
use std::sync::Arc;

const ATTRIBUTE_TOKEN: &str = "Attribute names:";
const FREQUENCY_TOKEN: &str = "Minor allele frequencies:";
const TABLE_TOKEN: &str = "Table:";
const CELL_DELIMITER: &str = ",  ";

/// Which score the tables of a run were ranked by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreName {
    Edm,
    OddsRatio,
    Mixed,
}

impl ScoreName {
    pub fn for_models(models: &[Model]) -> Self {
        let any_odds = models.iter().any(|m| m.use_odds_ratio);
        let any_edm = models.iter().any(|m| !m.use_odds_ratio);
        match (any_edm, any_odds) {
            (true, true) => Self::Mixed,
            (false, true) => Self::OddsRatio,
            _ => Self::Edm,
        }
    }
}

impl fmt::Display for ScoreName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Edm => f.write_str("EDM"),
            Self::OddsRatio => f.write_str("OddsRatio"),
            Self::Mixed => f.write_str("Mixed"),
        }
    }
}

/// Writes `values` `states` to a line with a blank line between squares.
fn write_grid<W: Write, T: fmt::Display>(w: &mut W, values: &[T], states: usize) -> io::Result<()> {
    for (i, value) in values.iter().enumerate() {
        if i > 0 && i % states == 0 {
            writeln!(w)?;
            if i % (states * states) == 0 {
                writeln!(w)?;
            }
        }
        write!(w, "{}", value)?;
        if (i + 1) % states != 0 {
            write!(w, "{}", CELL_DELIMITER)?;
        }
    }
    writeln!(w)
}

fn write_attribute_names<W: Write>(w: &mut W, table: &PenetranceTable) -> io::Result<()> {
    write!(w, "{}", ATTRIBUTE_TOKEN)?;
    for name in table.attribute_names() {
        write!(w, "\t{}", name)?;
    }
    writeln!(w)
}

/// Writes one table with its statistics.
pub fn write_table<W: Write>(w: &mut W, table: &PenetranceTable) -> io::Result<()> {
    write_attribute_names(w, table)?;
    write!(w, "{}", FREQUENCY_TOKEN)?;
    for maf in table.minor_allele_frequencies() {
        write!(w, "\t{}", maf)?;
    }
    writeln!(w)?;
    if !table.is_normalized() {
        return writeln!(w, "Failed to normalize penetrance table!");
    }
    let scores = table.scores();
    writeln!(w, "K: {}", scores.prevalence)?;
    writeln!(w, "Heritability: {}", scores.heritability)?;
    writeln!(w, "Ease-of-detection metric: {}", scores.edm)?;
    writeln!(w, "Odds ratio: {}", scores.odds_ratio)?;
    if table.row_sums_valid() {
        writeln!(w, "Table has passed the row-sum test.")?;
    } else {
        writeln!(w, "Table has FAILED the row-sum test.")?;
    }
    writeln!(w)?;
    writeln!(w, "{}", TABLE_TOKEN)?;
    writeln!(w)?;
    write_grid(w, &table.values(), table.states())
}

/// Writes a models file: a summary line followed by every table, quantile by quantile.
pub fn write_tables<W: Write>(
    w: &mut W,
    score_name: ScoreName,
    population_size: usize,
    quantiles: &[Quantile],
) -> io::Result<()> {
    writeln!(
        w,
        "Selected {} {} quantiles from a population of {} tables.",
        quantiles.len(),
        score_name,
        population_size
    )?;
    for table in quantiles.iter().flat_map(|q| q.tables.iter()) {
        write!(w, "\n\n\n\n")?;
        write_table(w, table)?;
    }
    Ok(())
}

/// Writes every model's population scores, one per line.
pub fn write_scores<W: Write>(w: &mut W, score_name: ScoreName, scores: &[Vec<f64>]) -> io::Result<()> {
    for (model, model_scores) in scores.iter().enumerate() {
        writeln!(w, "{} scores for model: {}", score_name, model)?;
        for score in model_scores {
            writeln!(w, "{}", score)?;
        }
        writeln!(w)?;
    }
    Ok(())
}

/// Writes the case and control counts observed in each cell of `table`.
pub fn write_case_control_counts<W: Write>(
    w: &mut W,
    table: &PenetranceTable,
    counts: &CellCounts,
) -> io::Result<()> {
    write_attribute_names(w, table)?;
    writeln!(w, "Balanced accuracy of best model: {}", counts.balanced_accuracy())?;
    writeln!(w, "Case values:")?;
    write_grid(w, &counts.case, table.states())?;
    writeln!(w, "Control values:")?;
    write_grid(w, &counts.control, table.states())
}

fn strip_token<'a>(line: &'a str, token: &str) -> Option<&'a str> {
    let head = line.get(..token.len())?;
    if head.eq_ignore_ascii_case(token) {
        Some(&line[token.len()..])
    } else {
        None
    }
}

fn split_fields(rest: &str) -> impl Iterator<Item = &str> {
    rest.split('\t').map(str::trim).filter(|s| !s.is_empty())
}

/// Parses every table after the next attribute-names line.
struct TableParser<I> {
    lines: I,
}

impl<I: Iterator<Item = io::Result<String>>> TableParser<I> {
    fn next_header(&mut self) -> Result<Option<Vec<String>>, SimError> {
        for line in self.lines.by_ref() {
            let line = line?;
            if let Some(rest) = strip_token(&line, ATTRIBUTE_TOKEN) {
                return Ok(Some(split_fields(rest).map(String::from).collect()));
            }
        }
        Ok(None)
    }

    fn parse_body(&mut self, names: Vec<String>) -> Result<PenetranceTable, SimError> {
        let mut mafs = None;
        loop {
            let line = self
                .lines
                .next()
                .ok_or_else(|| SimError::input("Got a table-header without a table"))??;
            if let Some(rest) = strip_token(&line, FREQUENCY_TOKEN) {
                let parsed = split_fields(rest)
                    .map(|s| s.parse::<f64>())
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(|_| {
                        SimError::input("Got a table with a non-numeric minor allele frequency")
                    })?;
                mafs = Some(parsed);
            }
            if strip_token(&line, TABLE_TOKEN).is_some() {
                break;
            }
        }
        let mafs = mafs.ok_or_else(|| {
            SimError::input(format!(
                "Table for {:?} has no minor allele frequencies",
                names
            ))
        })?;

        let cell_count = GENOTYPE_STATES.pow(names.len() as u32);
        let mut values = Vec::with_capacity(cell_count);
        while values.len() < cell_count {
            let line = self
                .lines
                .next()
                .ok_or_else(|| SimError::input("Got a table with too few cells"))??;
            if line.trim().is_empty() {
                continue;
            }
            for field in line.split(',') {
                let value = field
                    .trim()
                    .parse::<f64>()
                    .map_err(|_| SimError::input("Got a table with a non-numeric cell"))?;
                if values.len() >= cell_count {
                    return Err(SimError::input("Got a table with too many cells"));
                }
                values.push(value);
            }
        }
        PenetranceTable::from_values(GENOTYPE_STATES, names, mafs, &values)
    }
}

/// Reads tables back into quantiles.
///
/// A new quantile starts whenever a table has the same attribute names as
/// the first table of the current quantile. Every table gets a fraction of 1.
pub fn parse_tables<R: BufRead>(reader: R) -> Result<Vec<Quantile>, SimError> {
    let mut parser = TableParser {
        lines: reader.lines(),
    };
    let mut quantiles: Vec<Quantile> = Vec::new();
    while let Some(names) = parser.next_header()? {
        let starts_group = match quantiles.last() {
            None => true,
            Some(q) => q.tables[0].attribute_names() == names.as_slice(),
        };
        if starts_group {
            quantiles.push(Quantile::default());
        }
        let table = parser.parse_body(names)?;
        if let Some(q) = quantiles.last_mut() {
            q.push(Arc::new(table), 1.0);
        }
    }

    let size = match quantiles.first() {
        Some(q) => q.len(),
        None => return Err(SimError::input("No penetrance tables were found")),
    };
    if quantiles.iter().any(|q| q.len() != size) {
        return Err(SimError::input("Each quantile must have the same number of tables"));
    }
    Ok(quantiles)
}

pub fn read_tables_file<P: AsRef<Path>>(path: P) -> Result<Vec<Quantile>, SimError> {
    let file = File::open(path.as_ref())?;
    parse_tables(BufReader::new(file))
}
