use crate::error::SimError;
use crate::genetics::Genotype;
use csv;
use ndarray::Array2;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

/// An integer dataset whose columns are copied verbatim into generated rows.
///
/// A predictive passthrough carries its class label in the last column.
#[derive(Debug, Clone, PartialEq)]
pub struct Passthrough {
    pub header: Option<Vec<String>>,
    pub data: Array2<Genotype>,
}

impl Passthrough {
    pub fn rows(&self) -> usize {
        self.data.nrows()
    }

    pub fn columns(&self) -> usize {
        self.data.ncols()
    }
}

/// Whether a first line should be treated as data.
fn is_numeric(record: &csv::StringRecord) -> bool {
    record
        .iter()
        .all(|field| field.chars().all(|c| c.is_ascii_digit() || c == ' '))
}

pub struct PassthroughBuilder {
    delimiter: u8,
}

impl Default for PassthroughBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl PassthroughBuilder {
    /// Construct a new builder for tab-delimited data
    pub fn new() -> Self {
        Self { delimiter: b'\t' }
    }

    pub fn delimiter(&mut self, delimiter: u8) -> &mut Self {
        self.delimiter = delimiter;
        self
    }

    pub fn from_path<P: AsRef<Path>>(&self, path: P) -> Result<Passthrough, SimError> {
        let file = File::open(path.as_ref())?;
        self.from_reader(Box::new(BufReader::new(file)))
    }

    pub fn from_reader(&self, reader: Box<dyn Read>) -> Result<Passthrough, SimError> {
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .delimiter(self.delimiter)
            .from_reader(reader);

        let mut header = None;
        let mut width = None;
        let mut values = Vec::new();
        let mut rows = 0;
        for (line, record) in rdr.records().enumerate() {
            let record = record?;
            if line == 0 && !is_numeric(&record) {
                header = Some(record.iter().map(|s| s.to_string()).collect());
                continue;
            }
            match width {
                None => width = Some(record.len()),
                Some(w) if w != record.len() => {
                    return Err(SimError::input(format!(
                        "Line {} of the passthrough data has {} columns, expected {}",
                        line + 1,
                        record.len(),
                        w
                    )))
                }
                Some(_) => {}
            }
            for field in record.iter() {
                let value = field.trim().parse::<Genotype>().map_err(|_| {
                    SimError::input(format!(
                        "Non-integer value '{}' on line {} of the passthrough data",
                        field,
                        line + 1
                    ))
                })?;
                values.push(value);
            }
            rows += 1;
        }

        let width = width.ok_or_else(|| SimError::input("The passthrough data has no rows"))?;
        let data = Array2::from_shape_vec((rows, width), values)
            .map_err(|e| SimError::input(format!("Malformed passthrough data: {}", e)))?;
        Ok(Passthrough { header, data })
    }
}
