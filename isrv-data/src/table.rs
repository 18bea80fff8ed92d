//! # Indicator Table
//!
//! Read-only, in-memory table of indicator series loaded from a World
//! Development Indicators style CSV export.
//!
//! ```text
//! "Country Name","Country Code","Indicator Name","Indicator Code","1960",...,"2022",
//! "Germany","DEU","GDP (current US$)","NY.GDP.MKTP.CD","","",...,"4.08E12",
//! ```
//!
//! Rows are indexed by `(country code, indicator code)`; missing numeric cells
//! load as `0.0`.

use std::fmt::Write as _;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use ahash::RandomState;
use hashbrown::{Equivalent, HashMap};
use tracing::info;

use isrv_common::protocol::FIELD_SEPARATOR;
use isrv_common::{IsrvError, IsrvResult};

use crate::csv::split_cells;
use crate::Dataset;

/// Number of leading descriptive columns before the first year column.
const META_COLUMNS: usize = 4;

/// One country/indicator series.
#[derive(Debug, Clone, PartialEq)]
pub struct WdiRecord {
    pub country_name: String,
    pub country_code: String,
    pub indicator_name: String,
    pub indicator_code: String,
    /// One value per year column, oldest first.
    pub values: Vec<f64>,
}

impl WdiRecord {
    /// Mean over the non-zero values; `0.0` when every value is zero.
    pub fn mean(&self) -> f64 {
        let (sum, count) = self
            .values
            .iter()
            .filter(|v| **v != 0.0)
            .fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
        if count == 0 {
            0.0
        } else {
            sum / count as f64
        }
    }
}

#[derive(Debug, Hash, PartialEq, Eq)]
struct SeriesKey {
    country: Box<str>,
    indicator: Box<str>,
}

/// Borrowed lookup form of [`SeriesKey`]; hashes identically.
#[derive(Hash)]
struct SeriesRef<'a> {
    country: &'a str,
    indicator: &'a str,
}

impl Equivalent<SeriesKey> for SeriesRef<'_> {
    fn equivalent(&self, key: &SeriesKey) -> bool {
        *self.country == *key.country && *self.indicator == *key.indicator
    }
}

/// The loaded dataset.
#[derive(Debug)]
pub struct WdiTable {
    first_year: u16,
    year_count: usize,
    records: Vec<WdiRecord>,
    index: HashMap<SeriesKey, usize, RandomState>,
}

impl WdiTable {
    /// Loads the table from a CSV file.
    pub fn load(path: &Path) -> IsrvResult<Self> {
        let file = File::open(path)?;
        let table = Self::from_reader(BufReader::new(file))?;
        info!(
            path = %path.display(),
            rows = table.len(),
            first_year = table.first_year,
            years = table.year_count,
            "dataset loaded"
        );
        Ok(table)
    }

    /// Parses the table from any buffered reader; the first line is the header.
    pub fn from_reader<R: BufRead>(reader: R) -> IsrvResult<Self> {
        let mut lines = reader.lines();
        let header = match lines.next() {
            Some(line) => line?,
            None => return Err(dataset_error(1, "missing header")),
        };
        let (first_year, year_count) = parse_header(&header)?;

        let mut records = Vec::new();
        let mut index = HashMap::with_hasher(RandomState::new());
        for (i, line) in lines.enumerate() {
            let line_no = i + 2;
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let record = parse_record(&line, line_no, year_count)?;
            let key = SeriesKey {
                country: record.country_code.as_str().into(),
                indicator: record.indicator_code.as_str().into(),
            };
            // First occurrence wins for duplicate series.
            index.entry(key).or_insert(records.len());
            records.push(record);
        }

        Ok(WdiTable {
            first_year,
            year_count,
            records,
            index,
        })
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn first_year(&self) -> u16 {
        self.first_year
    }

    pub fn last_year(&self) -> u16 {
        self.first_year + self.year_count.saturating_sub(1) as u16
    }

    pub fn records(&self) -> &[WdiRecord] {
        &self.records
    }

    pub fn series(&self, country: &str, indicator: &str) -> Option<&WdiRecord> {
        self.index
            .get(&SeriesRef { country, indicator })
            .map(|&idx| &self.records[idx])
    }

    /// Value for one year, or `None` when the year is outside the loaded range.
    pub fn value(&self, record: &WdiRecord, year: u16) -> Option<f64> {
        let offset = year.checked_sub(self.first_year)? as usize;
        record.values.get(offset).copied()
    }
}

impl Dataset for WdiTable {
    fn query(&self, country: &str, indicator: &str) -> String {
        let Some(record) = self.series(country, indicator) else {
            return not_found(country, indicator);
        };
        let mut out = format!("{country}{FIELD_SEPARATOR}{indicator}");
        for value in &record.values {
            let _ = write!(out, "{FIELD_SEPARATOR}{value}");
        }
        out
    }

    fn query_year(&self, country: &str, indicator: &str, year: u16) -> String {
        let Some(record) = self.series(country, indicator) else {
            return not_found(country, indicator);
        };
        match self.value(record, year) {
            Some(value) => format!(
                "{country}{sep}{indicator}{sep}{year}{sep}{value}",
                sep = FIELD_SEPARATOR
            ),
            None => format!("Year out of range {year}"),
        }
    }

    fn report(&self, indicator: &str) -> String {
        let mut out = String::new();
        for record in self.records.iter().filter(|r| r.indicator_code == indicator) {
            let _ = write!(
                out,
                "{}{sep}{}{sep}",
                record.country_code,
                record.mean(),
                sep = FIELD_SEPARATOR
            );
        }
        if out.is_empty() {
            return format!("No data for {indicator}");
        }
        out
    }
}

fn not_found(country: &str, indicator: &str) -> String {
    format!("No data for {country}{FIELD_SEPARATOR}{indicator}")
}

fn dataset_error(line: usize, reason: impl Into<String>) -> IsrvError {
    IsrvError::Dataset {
        line,
        reason: reason.into(),
    }
}

fn parse_header(header: &str) -> IsrvResult<(u16, usize)> {
    let cells = split_cells(header);
    let mut years = cells
        .iter()
        .skip(META_COLUMNS)
        .map_while(|cell| cell.trim().parse::<u16>().ok());

    let first_year = years
        .next()
        .ok_or_else(|| dataset_error(1, "header has no year columns"))?;
    let mut expected = first_year;
    let mut count = 1;
    for year in years {
        expected += 1;
        if year != expected {
            return Err(dataset_error(1, format!("year columns not contiguous at {year}")));
        }
        count += 1;
    }
    Ok((first_year, count))
}

fn parse_record(line: &str, line_no: usize, year_count: usize) -> IsrvResult<WdiRecord> {
    let mut cells = split_cells(line).into_iter();
    let mut meta = || {
        cells
            .next()
            .ok_or_else(|| dataset_error(line_no, "row has fewer than four descriptive columns"))
    };
    let country_name = meta()?;
    let country_code = meta()?;
    let indicator_name = meta()?;
    let indicator_code = meta()?;

    let mut values = Vec::with_capacity(year_count);
    for (column, cell) in cells.take(year_count).enumerate() {
        let cell = cell.trim();
        let value = if cell.is_empty() {
            0.0
        } else {
            cell.parse::<f64>().map_err(|err| {
                dataset_error(
                    line_no,
                    format!("column {}: {err}", column + META_COLUMNS + 1),
                )
            })?
        };
        values.push(value);
    }
    values.resize(year_count, 0.0);

    Ok(WdiRecord {
        country_name,
        country_code,
        indicator_name,
        indicator_code,
        values,
    })
}
