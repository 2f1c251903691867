use std::collections::BTreeMap;
use std::io::Read;

use tracing::warn;

use super::normalizer::{find_column, is_yes};
use super::ImportError;
use crate::allocation::domain::{BaseCategory, Candidate, CandidateId, Gender};

const FILE: &str = "roster";

const ID: &[&str] = &["COAP", "COAP Reg Id", "COAP Registration Id"];
const APPLICATION_NO: &[&str] = &["App no", "MTech Application No", "Mtech App No", "Application No"];
const NAME: &[&str] = &["Full Name", "Name", "Candidate Name"];
const CATEGORY: &[&str] = &["Category", "Base Category"];
const EWS: &[&str] = &["EWS", "Ews"];
const GENDER: &[&str] = &["Gender"];
const PWD: &[&str] = &["PWD", "Pwd"];
const MERIT: &[&str] = &[
    "MaxGATEScore out of 3 yrs",
    "MaxGATEScore 3yrs",
    "MaxGateScore",
    "Merit Score",
];

struct Layout {
    id: usize,
    application_no: Option<usize>,
    name: Option<usize>,
    category: Option<usize>,
    ews: Option<usize>,
    gender: Option<usize>,
    pwd: Option<usize>,
    merit: usize,
}

impl Layout {
    fn from_headers(headers: &csv::StringRecord) -> Result<Self, ImportError> {
        let id = find_column(headers, ID).ok_or(ImportError::MissingColumn {
            file: FILE,
            column: ID[0],
        })?;
        let merit = find_column(headers, MERIT).ok_or(ImportError::MissingColumn {
            file: FILE,
            column: MERIT[0],
        })?;

        Ok(Self {
            id,
            application_no: find_column(headers, APPLICATION_NO),
            name: find_column(headers, NAME),
            category: find_column(headers, CATEGORY),
            ews: find_column(headers, EWS),
            gender: find_column(headers, GENDER),
            pwd: find_column(headers, PWD),
            merit,
        })
    }

    fn known(&self, index: usize) -> bool {
        index == self.id
            || index == self.merit
            || [
                self.application_no,
                self.name,
                self.category,
                self.ews,
                self.gender,
                self.pwd,
            ]
            .contains(&Some(index))
    }
}

fn cell(record: &csv::StringRecord, index: Option<usize>) -> &str {
    index
        .and_then(|index| record.get(index))
        .map(str::trim)
        .unwrap_or("")
}

/// Reads the season roster. Columns beyond the recognised ones are kept as
/// candidate attributes; rows without an id are skipped.
pub fn parse_roster<R: Read>(reader: R) -> Result<Vec<Candidate>, ImportError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(reader);
    let headers = csv_reader.headers()?.clone();
    let layout = Layout::from_headers(&headers)?;

    let mut candidates = Vec::new();
    for record in csv_reader.records() {
        let record = record?;
        let line = record.position().map(|p| p.line()).unwrap_or_default();

        let id = cell(&record, Some(layout.id));
        if id.is_empty() {
            warn!(line, "skipped roster row without a candidate id");
            continue;
        }

        let raw_category = cell(&record, layout.category);
        let base_category =
            BaseCategory::parse(raw_category).ok_or_else(|| ImportError::InvalidValue {
                file: FILE,
                line,
                column: CATEGORY[0].to_string(),
                value: raw_category.to_string(),
            })?;

        let raw_merit = cell(&record, Some(layout.merit));
        let merit_score = if raw_merit.is_empty() {
            None
        } else {
            let score = raw_merit
                .parse::<f64>()
                .ok()
                .filter(|score| score.is_finite())
                .ok_or_else(|| ImportError::InvalidValue {
                    file: FILE,
                    line,
                    column: MERIT[0].to_string(),
                    value: raw_merit.to_string(),
                })?;
            Some(score)
        };

        let attributes: BTreeMap<String, String> = headers
            .iter()
            .enumerate()
            .filter(|(index, header)| !layout.known(*index) && !header.trim().is_empty())
            .filter_map(|(index, header)| {
                let value = record.get(index)?.trim();
                (!value.is_empty()).then(|| (header.trim().to_string(), value.to_string()))
            })
            .collect();

        candidates.push(Candidate {
            id: CandidateId::new(id),
            application_no: cell(&record, layout.application_no).to_string(),
            name: cell(&record, layout.name).to_string(),
            base_category,
            ews: is_yes(cell(&record, layout.ews)),
            gender: Gender::parse(cell(&record, layout.gender)),
            pwd: is_yes(cell(&record, layout.pwd)),
            merit_score,
            attributes,
        });
    }

    Ok(candidates)
}
