use std::io::Read;

use serde::{Deserialize, Deserializer};
use tracing::{debug, warn};

use super::normalizer::{find_column, normalize_header};
use super::ImportError;
use crate::allocation::domain::{DecisionEntry, DecisionKind, DecisionReport, DecisionSource};

const APPLICATION_NO: &[&str] = &["MTech Application No", "Mtech App No", "App no"];
const REGISTRATION_ID: &[&str] = &["COAP Reg Id", "COAP", "COAP Registration Id"];
const APPLICANT_DECISION: &[&str] = &["Applicant Decision"];
const OTHER_DECISION: &[&str] = &["Other Institution Decision", "Other Institute Decision"];

/// Columns of one report: identifier aliases, then decision aliases.
fn layout(source: DecisionSource) -> (&'static [&'static str], &'static [&'static str]) {
    match source {
        DecisionSource::LocalOffer => (APPLICATION_NO, APPLICANT_DECISION),
        DecisionSource::OtherInstitute => (APPLICATION_NO, OTHER_DECISION),
        DecisionSource::Consolidated => (REGISTRATION_ID, APPLICANT_DECISION),
    }
}

#[derive(Debug, Deserialize)]
struct DecisionRow {
    #[serde(rename = "identifier", default, deserialize_with = "empty_string_as_none")]
    identifier: Option<String>,
    #[serde(rename = "decision", default, deserialize_with = "empty_string_as_none")]
    decision: Option<String>,
}

fn empty_string_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let opt = Option::<String>::deserialize(deserializer)?;
    Ok(opt
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty()))
}

/// Reads one decision report. Rows with a blank decision are skipped;
/// decision text other than the three known kinds rejects the report.
pub fn parse_decisions<R: Read>(
    source: DecisionSource,
    reader: R,
) -> Result<DecisionReport, ImportError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(reader);

    let headers = csv_reader.headers()?.clone();
    let (id_aliases, decision_aliases) = layout(source);
    let id_column = find_column(&headers, id_aliases).ok_or(ImportError::MissingColumn {
        file: source.label(),
        column: id_aliases[0],
    })?;
    let decision_column =
        find_column(&headers, decision_aliases).ok_or(ImportError::MissingColumn {
            file: source.label(),
            column: decision_aliases[0],
        })?;

    // Rows deserialize against these names; every other column is renamed
    // out of the way so a stray header cannot collide with them.
    let renamed: csv::StringRecord = headers
        .iter()
        .enumerate()
        .map(|(index, header)| {
            if index == id_column {
                "identifier".to_string()
            } else if index == decision_column {
                "decision".to_string()
            } else {
                format!("ignored {}", normalize_header(header))
            }
        })
        .collect();

    let mut entries = Vec::new();
    let mut skipped = 0usize;
    for record in csv_reader.records() {
        let record = record?;
        let line = record.position().map(|p| p.line()).unwrap_or_default();
        let row: DecisionRow = record.deserialize(Some(&renamed))?;

        let Some(raw) = row.decision else {
            skipped += 1;
            continue;
        };
        let Some(identifier) = row.identifier else {
            warn!(source = %source, line, "skipped decision row without an identifier");
            continue;
        };
        let kind = DecisionKind::parse(&raw).ok_or_else(|| ImportError::InvalidValue {
            file: source.label(),
            line,
            column: decision_aliases[0].to_string(),
            value: raw.clone(),
        })?;

        entries.push(DecisionEntry { identifier, kind });
    }

    debug!(source = %source, entries = entries.len(), skipped, "decision report read");
    Ok(DecisionReport { source, entries })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_local_offer_report() {
        let csv = "\
Si No,MTech Application No,Applicant Decision,Remarks
1,MT-1,Accept and Freeze,
2,MT-2,  retain   AND wait ,late
3,MT-3,,
4,MT-4,Reject & Wait,
";
        let report = parse_decisions(DecisionSource::LocalOffer, csv.as_bytes()).expect("parses");
        assert_eq!(report.source, DecisionSource::LocalOffer);
        let kinds: Vec<(&str, DecisionKind)> = report
            .entries
            .iter()
            .map(|entry| (entry.identifier.as_str(), entry.kind))
            .collect();
        assert_eq!(
            kinds,
            vec![
                ("MT-1", DecisionKind::AcceptFreeze),
                ("MT-2", DecisionKind::RetainWait),
                ("MT-4", DecisionKind::RejectWait),
            ]
        );
    }

    #[test]
    fn other_institute_report_accepts_header_aliases() {
        let csv = "mtech app no,Other Institute Decision\nMT-9,Accept and Freeze\n";
        let report =
            parse_decisions(DecisionSource::OtherInstitute, csv.as_bytes()).expect("parses");
        assert_eq!(report.entries.len(), 1);
        assert_eq!(report.entries[0].identifier, "MT-9");
    }

    #[test]
    fn consolidated_report_is_keyed_by_registration_id() {
        let csv = "COAP Reg Id,Applicant Decision\nC001,Accept and Freeze\n";
        let report =
            parse_decisions(DecisionSource::Consolidated, csv.as_bytes()).expect("parses");
        assert_eq!(report.entries[0].identifier, "C001");

        let wrong = "MTech Application No,Applicant Decision\nMT-1,Accept and Freeze\n";
        assert!(matches!(
            parse_decisions(DecisionSource::Consolidated, wrong.as_bytes()),
            Err(ImportError::MissingColumn { .. })
        ));
    }

    #[test]
    fn unknown_decision_text_names_the_row() {
        let csv = "MTech Application No,Applicant Decision\nMT-1,Accept and Freeze\nMT-2,Maybe later\n";
        match parse_decisions(DecisionSource::LocalOffer, csv.as_bytes()) {
            Err(ImportError::InvalidValue { line, value, .. }) => {
                assert_eq!(line, 3);
                assert_eq!(value, "Maybe later");
            }
            other => panic!("expected invalid value, got {other:?}"),
        }
    }
}
