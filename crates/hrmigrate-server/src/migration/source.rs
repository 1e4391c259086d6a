//! Source decoding and batch partitioning

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Source is not valid UTF-8: {0}")]
    Encoding(#[from] std::string::FromUtf8Error),

    #[error("Source is not valid CSV: {0}")]
    Csv(#[from] csv::Error),
}

/// One raw row of a source file. Fields are kept exactly as read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record(Vec<String>);

impl Record {
    pub fn new<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(fields.into_iter().map(Into::into).collect())
    }

    pub fn fields(&self) -> &[String] {
        &self.0
    }

    pub fn arity(&self) -> usize {
        self.0.len()
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.0.get(index).map(String::as_str)
    }

    /// Row rendering used in error reports, e.g. `["1","Alice"]`
    pub fn render(&self) -> String {
        serde_json::to_string(&self.0).unwrap_or_else(|_| self.0.join(","))
    }
}

impl<S: Into<String>> FromIterator<S> for Record {
    fn from_iter<T: IntoIterator<Item = S>>(iter: T) -> Self {
        Self::new(iter)
    }
}

/// A numbered slice of one source file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Batch {
    /// 1-based position of the slice within its file
    pub batch_id: u32,
    pub records: Vec<Record>,
}

impl Batch {
    pub fn new(batch_id: u32, records: Vec<Record>) -> Self {
        Self { batch_id, records }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Decode raw object bytes into records, one record per line.
///
/// A leading byte-order mark is dropped and carriage returns are removed
/// before splitting. Quoting applies within a line only, so an unbalanced
/// quote never swallows the lines after it. Rows may have any number of
/// fields; arity is the validator's concern. Blank lines produce no record.
pub fn decode_source(bytes: Vec<u8>) -> Result<Vec<Record>, SourceError> {
    let text = String::from_utf8(bytes)?;
    let text = text.strip_prefix('\u{feff}').unwrap_or(&text).replace('\r', "");

    text.split('\n')
        .filter(|line| !line.is_empty())
        .map(decode_line)
        .collect()
}

fn decode_line(line: &str) -> Result<Record, SourceError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(line.as_bytes());

    let mut row = csv::StringRecord::new();
    reader.read_record(&mut row)?;
    Ok(row.iter().collect())
}

/// Cut `records` into contiguous slices of at most `batch_size`, numbered from 1.
pub fn partition(records: Vec<Record>, batch_size: usize) -> Vec<Batch> {
    let batch_size = batch_size.max(1);
    let mut batches = Vec::with_capacity(records.len().div_ceil(batch_size));
    let mut records = records.into_iter().peekable();
    let mut batch_id = 0u32;

    while records.peek().is_some() {
        batch_id += 1;
        batches.push(Batch::new(batch_id, records.by_ref().take(batch_size).collect()));
    }

    batches
}
