use std::io::Read;

use super::normalizer::find_column;
use super::ImportError;
use crate::allocation::quota::QuotaConfig;

const FILE: &str = "quota table";
const CATEGORY: &[&str] = &["category", "Seat Category"];
const SET_SEATS: &[&str] = &["set_seats", "Seats", "Total Seats"];

/// Reads the seat matrix. The informational `seats_allocated` and
/// `seats_booked` columns are ignored; allocation is always replayed.
/// Blank seat counts read as zero.
pub fn parse_quota<R: Read>(reader: R) -> Result<QuotaConfig, ImportError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(reader);
    let headers = csv_reader.headers()?.clone();
    let category_column = find_column(&headers, CATEGORY).ok_or(ImportError::MissingColumn {
        file: FILE,
        column: CATEGORY[0],
    })?;
    let seats_column = find_column(&headers, SET_SEATS).ok_or(ImportError::MissingColumn {
        file: FILE,
        column: SET_SEATS[0],
    })?;

    let mut rows = Vec::new();
    for record in csv_reader.records() {
        let record = record?;
        let line = record.position().map(|p| p.line()).unwrap_or_default();
        let category = record.get(category_column).unwrap_or("").trim();
        if category.is_empty() {
            continue;
        }

        let raw = record.get(seats_column).unwrap_or("").trim();
        let seats = if raw.is_empty() {
            0
        } else {
            raw.parse::<u32>().map_err(|_| ImportError::InvalidValue {
                file: FILE,
                line,
                column: SET_SEATS[0].to_string(),
                value: raw.to_string(),
            })?
        };
        rows.push((category.to_string(), seats));
    }

    Ok(QuotaConfig::from_labels(rows)?)
}
