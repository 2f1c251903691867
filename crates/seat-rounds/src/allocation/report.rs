use std::collections::{BTreeMap, BTreeSet};
use std::io::Write;

use serde::Serialize;
use tracing::warn;

use super::allocator::{AllocationPlan, RetentionConflict};
use super::domain::{Candidate, CandidateId, Offer, OfferStatus, RoundNo, SeatCategoryKey};
use super::quota::QuotaSnapshot;

/// Allocated and configured seats for one category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CategoryFill {
    pub category: SeatCategoryKey,
    pub total: u32,
    pub allocated: u32,
    pub remaining: u32,
}

pub fn category_fill(snapshot: &QuotaSnapshot) -> Vec<CategoryFill> {
    snapshot
        .iter()
        .map(|(category, count)| CategoryFill {
            category,
            total: count.total,
            allocated: count.allocated,
            remaining: count.remaining(),
        })
        .collect()
}

/// Outcome counts of one generated round.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoundSummary {
    pub round: RoundNo,
    pub eligible: usize,
    pub offered: usize,
    pub by_status: BTreeMap<OfferStatus, usize>,
    /// Eligible candidates who found no seat, in merit order.
    pub unallocated: Vec<CandidateId>,
    pub retention_conflicts: Vec<RetentionConflict>,
    /// Seats confirmed in earlier rounds plus this round's offers.
    pub categories: Vec<CategoryFill>,
}

impl RoundSummary {
    pub fn from_plan(plan: &AllocationPlan, eligible: usize) -> Self {
        let mut by_status = BTreeMap::new();
        for offer in &plan.offers {
            *by_status.entry(offer.status).or_insert(0) += 1;
        }

        Self {
            round: plan.round_no,
            eligible,
            offered: plan.offers.len(),
            by_status,
            unallocated: plan.unallocated.clone(),
            retention_conflicts: plan.retention_conflicts.clone(),
            categories: category_fill(&plan.quota),
        }
    }
}

/// Short export row: one per offer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryRow {
    #[serde(rename = "Round")]
    pub round: RoundNo,
    #[serde(rename = "COAP Reg Id")]
    pub candidate_id: CandidateId,
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Category")]
    pub category: SeatCategoryKey,
    #[serde(rename = "Merit Score")]
    pub merit_score: f64,
    #[serde(rename = "Status")]
    pub status: OfferStatus,
}

/// Full roster record joined with its offer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetailedRow {
    pub round: RoundNo,
    pub candidate: Candidate,
    pub category: SeatCategoryKey,
    pub status: OfferStatus,
}

/// Both projections of a round's offers, sorted by merit descending and
/// then candidate id.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OfferExport {
    pub round: RoundNo,
    pub summary: Vec<SummaryRow>,
    pub detailed: Vec<DetailedRow>,
}

const DETAILED_COLUMNS: [&str; 11] = [
    "Round",
    "COAP Reg Id",
    "MTech Application No",
    "Name",
    "Category",
    "EWS",
    "Gender",
    "PWD",
    "Merit Score",
    "Offered Category",
    "Status",
];

impl OfferExport {
    pub fn build(round: RoundNo, offers: &[Offer], roster: &[Candidate]) -> Self {
        let by_id: BTreeMap<&CandidateId, &Candidate> =
            roster.iter().map(|candidate| (&candidate.id, candidate)).collect();

        let mut sorted: Vec<&Offer> = offers.iter().collect();
        sorted.sort_by(|left, right| {
            right
                .merit_score
                .total_cmp(&left.merit_score)
                .then_with(|| left.candidate_id.cmp(&right.candidate_id))
        });

        let mut summary = Vec::with_capacity(sorted.len());
        let mut detailed = Vec::with_capacity(sorted.len());
        for offer in sorted {
            let candidate = by_id.get(&offer.candidate_id).copied();
            if candidate.is_none() {
                warn!(round, candidate = %offer.candidate_id, "offer holder missing from roster");
            }

            summary.push(SummaryRow {
                round,
                candidate_id: offer.candidate_id.clone(),
                name: candidate.map(|c| c.name.clone()).unwrap_or_default(),
                category: offer.category,
                merit_score: offer.merit_score,
                status: offer.status,
            });

            if let Some(candidate) = candidate {
                detailed.push(DetailedRow {
                    round,
                    candidate: candidate.clone(),
                    category: offer.category,
                    status: offer.status,
                });
            }
        }

        Self {
            round,
            summary,
            detailed,
        }
    }

    pub fn write_summary_csv<W: Write>(&self, writer: W) -> Result<(), csv::Error> {
        let mut out = csv::Writer::from_writer(writer);
        for row in &self.summary {
            out.serialize(row)?;
        }
        if self.summary.is_empty() {
            out.write_record(["Round", "COAP Reg Id", "Name", "Category", "Merit Score", "Status"])?;
        }
        out.flush()?;
        Ok(())
    }

    /// Writes the detailed projection. Extra roster columns become one
    /// column each, in name order, after the fixed columns.
    pub fn write_detailed_csv<W: Write>(&self, writer: W) -> Result<(), csv::Error> {
        let extra: BTreeSet<&str> = self
            .detailed
            .iter()
            .flat_map(|row| row.candidate.attributes.keys().map(String::as_str))
            .collect();

        let mut out = csv::Writer::from_writer(writer);
        let header: Vec<&str> = DETAILED_COLUMNS
            .iter()
            .copied()
            .chain(extra.iter().copied())
            .collect();
        out.write_record(&header)?;

        for row in &self.detailed {
            let candidate = &row.candidate;
            let mut record = vec![
                row.round.to_string(),
                candidate.id.to_string(),
                candidate.application_no.clone(),
                candidate.name.clone(),
                candidate.base_category.label().to_string(),
                yes_no(candidate.ews).to_string(),
                candidate.gender.label().to_string(),
                yes_no(candidate.pwd).to_string(),
                candidate
                    .merit_score
                    .map(|score| score.to_string())
                    .unwrap_or_default(),
                row.category.label(),
                row.status.label().to_string(),
            ];
            record.extend(
                extra
                    .iter()
                    .map(|key| candidate.attributes.get(*key).cloned().unwrap_or_default()),
            );
            out.write_record(&record)?;
        }
        out.flush()?;
        Ok(())
    }
}

fn yes_no(flag: bool) -> &'static str {
    if flag {
        "Yes"
    } else {
        "No"
    }
}
