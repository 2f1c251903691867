use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use super::allocator::OfferAllocator;
use super::domain::{
    Candidate, CandidateId, Decision, DecisionKind, DecisionReport, DecisionSource, Offer,
    RoundNo, SeatCategoryKey,
};
use super::eligibility::{self, Eligibility};
use super::history::SeasonHistory;
use super::quota::{self, QuotaConfig};
use super::report::{category_fill, CategoryFill, OfferExport, RoundSummary};
use super::repository::{AllocationRepository, DatasetLock, RepositoryError};
use super::retention;

/// Result of a round run. Running out of candidates is a normal end of the
/// season, not a failure.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RoundOutcome {
    Generated(RoundSummary),
    Exhausted { round: RoundNo },
}

/// Where the season stands, derived from persisted history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum RoundPhase {
    NotStarted,
    /// Offers are out and no decision report has been recorded yet.
    Generated { round: RoundNo },
    /// Some, but not all, reports for the round are in.
    AwaitingDecisions {
        round: RoundNo,
        missing: Vec<DecisionSource>,
    },
    Ready { next_round: RoundNo },
    Exhausted { last_round: RoundNo },
}

/// What one ingestion call recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngestSummary {
    pub round: RoundNo,
    pub recorded: BTreeMap<DecisionSource, usize>,
    /// Rows naming a candidate that is not on the roster.
    pub dropped: usize,
    pub outstanding: Vec<DecisionSource>,
}

#[derive(Debug, thiserror::Error)]
pub enum RoundError {
    #[error("invalid input: {0}")]
    Validation(String),
    #[error("round {round} cannot run: missing decision reports ({})", source_list(.missing))]
    MissingDecisions {
        round: RoundNo,
        missing: Vec<DecisionSource>,
    },
    #[error("another round operation is in progress")]
    RoundInProgress,
    #[error("round {round} is not valid: {reason}")]
    InvalidRound { round: RoundNo, reason: String },
    #[error("round {round} is superseded by generated round {latest}")]
    RoundSuperseded { round: RoundNo, latest: RoundNo },
    #[error("round {round} cannot be reset: {reason}")]
    ResetRejected { round: RoundNo, reason: String },
    #[error("round {round} has not been generated")]
    NotGenerated { round: RoundNo },
    #[error("persistence failure: {0}")]
    Persistence(#[from] RepositoryError),
}

fn application_key(candidate: &Candidate) -> Option<String> {
    let number = candidate.application_no.trim();
    (!number.is_empty()).then(|| number.to_string())
}

fn source_list(sources: &[DecisionSource]) -> String {
    sources
        .iter()
        .map(|source| source.label())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Clears the in-flight flag when the operation ends, however it ends.
struct Flight<'a>(&'a AtomicBool);

impl Drop for Flight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Sequences rounds over an injected store and enforces their
/// preconditions. Mutating operations are single-flight: a second call while
/// one is running is refused with [`RoundError::RoundInProgress`].
pub struct RoundOrchestrator<R> {
    repository: Arc<R>,
    max_rounds: RoundNo,
    in_flight: AtomicBool,
}

impl<R> RoundOrchestrator<R>
where
    R: AllocationRepository + 'static,
{
    pub fn new(repository: Arc<R>, max_rounds: RoundNo) -> Self {
        Self {
            repository,
            max_rounds,
            in_flight: AtomicBool::new(false),
        }
    }

    pub fn repository(&self) -> &Arc<R> {
        &self.repository
    }

    pub fn max_rounds(&self) -> RoundNo {
        self.max_rounds
    }

    fn claim(&self) -> Result<Flight<'_>, RoundError> {
        self.in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| {
                warn!("rejected operation while another is in flight");
                RoundError::RoundInProgress
            })?;
        Ok(Flight(&self.in_flight))
    }

    /// Dataset-wide lock held by every mutating operation, so a second
    /// process sharing the store cannot interleave with it.
    fn lock(&self) -> Result<DatasetLock, RoundError> {
        self.repository.lock_dataset().map_err(|err| match err {
            RepositoryError::Locked => {
                warn!("dataset locked by another process");
                RoundError::RoundInProgress
            }
            other => other.into(),
        })
    }

    fn latest_round(&self) -> Result<RoundNo, RoundError> {
        Ok(self
            .repository
            .generated_rounds()?
            .into_iter()
            .max()
            .unwrap_or(0))
    }

    fn missing_sources(&self, round: RoundNo) -> Result<Vec<DecisionSource>, RoundError> {
        let present = self.repository.decision_sources(round)?;
        Ok(DecisionSource::ALL
            .into_iter()
            .filter(|source| !present.contains(source))
            .collect())
    }

    fn check_bound(&self, round: RoundNo) -> Result<(), RoundError> {
        if round == 0 {
            return Err(RoundError::InvalidRound {
                round,
                reason: "rounds are numbered from 1".to_string(),
            });
        }
        if round > self.max_rounds {
            return Err(RoundError::InvalidRound {
                round,
                reason: format!("the season allows at most {} rounds", self.max_rounds),
            });
        }
        Ok(())
    }

    /// Adds candidates to the roster, ignoring ids already loaded. An
    /// application number may name only one candidate.
    pub fn load_roster(&self, candidates: Vec<Candidate>) -> Result<usize, RoundError> {
        let _flight = self.claim()?;
        let _lock = self.lock()?;

        let roster = self.repository.candidates()?;
        let mut known: BTreeSet<CandidateId> = roster.iter().map(|c| c.id.clone()).collect();
        let mut owners: BTreeMap<String, CandidateId> = roster
            .iter()
            .filter_map(|c| application_key(c).map(|no| (no, c.id.clone())))
            .collect();
        for candidate in &candidates {
            if !known.insert(candidate.id.clone()) {
                continue;
            }
            let Some(number) = application_key(candidate) else {
                continue;
            };
            if let Some(owner) = owners.get(&number) {
                return Err(RoundError::Validation(format!(
                    "application number {number} is used by both {owner} and {}",
                    candidate.id
                )));
            }
            owners.insert(number, candidate.id.clone());
        }

        let offered = candidates.len();
        let added = self.repository.add_candidates(candidates)?;
        if added < offered {
            warn!(offered, added, "ignored roster rows with known candidate ids");
        }
        info!(added, "roster loaded");
        Ok(added)
    }

    /// Generates the offers of `round` and replaces any earlier offers of the
    /// same round. Nothing is written unless every precondition holds.
    pub fn run(&self, round: RoundNo) -> Result<RoundOutcome, RoundError> {
        let _flight = self.claim()?;
        let _lock = self.lock()?;

        self.check_bound(round)?;
        let latest = self.latest_round()?;
        if round > latest + 1 {
            return Err(RoundError::InvalidRound {
                round,
                reason: format!("round {} has not been generated", round - 1),
            });
        }
        if round < latest {
            return Err(RoundError::RoundSuperseded { round, latest });
        }
        if !self.repository.decision_sources(round)?.is_empty() {
            return Err(RoundError::InvalidRound {
                round,
                reason: format!(
                    "decisions for round {round} are already recorded; reset round {} first",
                    round + 1
                ),
            });
        }
        if round > 1 {
            let missing = self.missing_sources(round - 1)?;
            if !missing.is_empty() {
                warn!(round, missing = %source_list(&missing), "round blocked on missing decisions");
                return Err(RoundError::MissingDecisions { round, missing });
            }
        }

        let history = SeasonHistory::load(self.repository.as_ref(), round - 1)?;
        let roster = self.repository.candidates()?;

        let eligible = match eligibility::resolve(&roster, &history) {
            Eligibility::Eligible(ids) => ids,
            Eligibility::RoundComplete => {
                info!(round, "no eligible candidates left; season exhausted");
                return Ok(RoundOutcome::Exhausted { round });
            }
        };

        let pool: Vec<Candidate> = roster
            .into_iter()
            .filter(|candidate| eligible.contains(&candidate.id))
            .collect();
        let retained = retention::retained(&history);
        let config = self.repository.quota_config()?;
        let snapshot = quota::replay(&config, &history);
        for key in snapshot.overdrawn() {
            warn!(round, category = %key, "confirmed seats exceed the configured total");
        }

        let plan = OfferAllocator::new(round).allocate(&pool, &retained, snapshot);
        let summary = RoundSummary::from_plan(&plan, eligible.len());

        self.repository.commit_round(round, plan.offers)?;
        info!(
            round,
            eligible = summary.eligible,
            offered = summary.offered,
            unallocated = summary.unallocated.len(),
            conflicts = summary.retention_conflicts.len(),
            "round generated"
        );

        Ok(RoundOutcome::Generated(summary))
    }

    /// Discards the offers of `round` and the decisions recorded for the
    /// round before it, so those reports can be ingested again.
    pub fn reset(&self, round: RoundNo) -> Result<(), RoundError> {
        let _flight = self.claim()?;
        let _lock = self.lock()?;

        if round <= 1 {
            return Err(RoundError::ResetRejected {
                round,
                reason: "round 1 has no preceding decisions".to_string(),
            });
        }
        self.check_bound(round)?;

        let latest = self.latest_round()?;
        if round > latest + 1 {
            return Err(RoundError::ResetRejected {
                round,
                reason: format!("round {} has not been generated", round - 1),
            });
        }
        if latest > round {
            return Err(RoundError::ResetRejected {
                round,
                reason: format!("round {latest} was generated after it; reset later rounds first"),
            });
        }
        if !self.repository.decision_sources(round)?.is_empty() {
            return Err(RoundError::ResetRejected {
                round,
                reason: format!(
                    "decisions for round {round} are recorded; reset round {} first",
                    round + 1
                ),
            });
        }

        self.repository.reset_round(round)?;
        info!(round, "round reset");
        Ok(())
    }

    /// Records decision reports for `round`, which must be the latest
    /// generated round. Reports in one call commit together; a source
    /// already recorded is replaced.
    pub fn ingest(
        &self,
        round: RoundNo,
        reports: Vec<DecisionReport>,
    ) -> Result<IngestSummary, RoundError> {
        let _flight = self.claim()?;
        let _lock = self.lock()?;

        let latest = self.latest_round()?;
        if latest == 0 || round != latest {
            return Err(RoundError::InvalidRound {
                round,
                reason: if latest == 0 {
                    "no round has been generated yet".to_string()
                } else {
                    format!("decisions can only be recorded for the latest round {latest}")
                },
            });
        }

        let mut seen = BTreeSet::new();
        for report in &reports {
            if !seen.insert(report.source) {
                return Err(RoundError::Validation(format!(
                    "{} supplied more than once",
                    report.source
                )));
            }
        }

        let roster = self.repository.candidates()?;
        let by_application: BTreeMap<&str, &CandidateId> = roster
            .iter()
            .filter(|candidate| !candidate.application_no.trim().is_empty())
            .map(|candidate| (candidate.application_no.trim(), &candidate.id))
            .collect();
        let by_id: BTreeSet<&str> = roster.iter().map(|c| c.id.as_str()).collect();

        let mut dropped = 0;
        let mut recorded = BTreeMap::new();
        let mut batch = Vec::with_capacity(reports.len());

        for report in reports {
            let mut kinds: BTreeMap<CandidateId, DecisionKind> = BTreeMap::new();
            for entry in report.entries {
                let identifier = entry.identifier.trim();
                if identifier.is_empty() {
                    warn!(round, source = %report.source, "dropped decision without an identifier");
                    dropped += 1;
                    continue;
                }
                let resolved = if report.source.keyed_by_application_no() {
                    by_application.get(identifier).map(|id| (*id).clone())
                } else {
                    by_id.get(identifier).map(|id| CandidateId::new(*id))
                };
                let Some(candidate_id) = resolved else {
                    warn!(round, source = %report.source, identifier, "dropped decision for unknown candidate");
                    dropped += 1;
                    continue;
                };

                match kinds.get(&candidate_id) {
                    Some(previous) if *previous != entry.kind => {
                        return Err(RoundError::Validation(format!(
                            "{} lists conflicting decisions for {candidate_id}",
                            report.source
                        )));
                    }
                    Some(_) => {}
                    None => {
                        kinds.insert(candidate_id, entry.kind);
                    }
                }
            }

            let decisions: Vec<Decision> = kinds
                .into_iter()
                .map(|(candidate_id, kind)| Decision {
                    round_no: round,
                    candidate_id,
                    source: report.source,
                    kind,
                })
                .collect();
            recorded.insert(report.source, decisions.len());
            batch.push((report.source, decisions));
        }

        if batch.is_empty() {
            return Err(RoundError::Validation("no decision reports supplied".to_string()));
        }

        self.repository.record_decisions(round, batch)?;
        let outstanding = self.missing_sources(round)?;
        info!(round, dropped, outstanding = outstanding.len(), "decisions recorded");

        Ok(IngestSummary {
            round,
            recorded,
            dropped,
            outstanding,
        })
    }

    pub fn status(&self) -> Result<RoundPhase, RoundError> {
        let latest = self.latest_round()?;
        if latest == 0 {
            return Ok(RoundPhase::NotStarted);
        }

        let missing = self.missing_sources(latest)?;
        if missing.len() == DecisionSource::ALL.len() {
            return Ok(RoundPhase::Generated { round: latest });
        }
        if !missing.is_empty() {
            return Ok(RoundPhase::AwaitingDecisions {
                round: latest,
                missing,
            });
        }

        if latest >= self.max_rounds || self.eligible(latest + 1)?.is_empty() {
            return Ok(RoundPhase::Exhausted { last_round: latest });
        }
        Ok(RoundPhase::Ready {
            next_round: latest + 1,
        })
    }

    /// Candidates who would enter `round` given the history recorded so far.
    pub fn eligible(&self, round: RoundNo) -> Result<Eligibility, RoundError> {
        if round == 0 {
            return Err(RoundError::InvalidRound {
                round,
                reason: "rounds are numbered from 1".to_string(),
            });
        }
        let history = SeasonHistory::load(self.repository.as_ref(), round - 1)?;
        let roster = self.repository.candidates()?;
        Ok(eligibility::resolve(&roster, &history))
    }

    pub fn offers(&self, round: RoundNo) -> Result<Vec<Offer>, RoundError> {
        self.repository
            .offers(round)?
            .ok_or(RoundError::NotGenerated { round })
    }

    pub fn export(&self, round: RoundNo) -> Result<OfferExport, RoundError> {
        let offers = self.offers(round)?;
        let roster = self.repository.candidates()?;
        Ok(OfferExport::build(round, &offers, &roster))
    }

    /// Seat table with confirmed seats replayed through the latest round.
    pub fn quota(&self) -> Result<Vec<CategoryFill>, RoundError> {
        let latest = self.latest_round()?;
        let history = SeasonHistory::load(self.repository.as_ref(), latest)?;
        let config = self.repository.quota_config()?;
        Ok(category_fill(&quota::replay(&config, &history)))
    }

    /// Changes one category's total. Refused if it would fall below the
    /// seats already confirmed.
    pub fn set_quota(&self, key: SeatCategoryKey, total: u32) -> Result<(), RoundError> {
        let _flight = self.claim()?;
        let _lock = self.lock()?;
        let mut config = self.repository.quota_config()?;
        config.set(key, total);
        self.check_confirmed(&config)?;
        self.repository.save_quota_config(config)?;
        info!(category = %key, total, "seat total updated");
        Ok(())
    }

    /// Replaces the whole seat table under the same rule as [`Self::set_quota`].
    pub fn replace_quota(&self, config: QuotaConfig) -> Result<(), RoundError> {
        let _flight = self.claim()?;
        let _lock = self.lock()?;
        self.check_confirmed(&config)?;
        let total = config.total_seats();
        self.repository.save_quota_config(config)?;
        info!(total, "seat table replaced");
        Ok(())
    }

    fn check_confirmed(&self, config: &QuotaConfig) -> Result<(), RoundError> {
        let latest = self.latest_round()?;
        let history = SeasonHistory::load(self.repository.as_ref(), latest)?;
        let confirmed = quota::replay(config, &history);
        for (key, total) in config.entries() {
            if !quota::fits_confirmed(&confirmed, key, total) {
                warn!(category = %key, total, "rejected seat total below confirmed seats");
                return Err(RoundError::Validation(format!(
                    "{key} already has {} confirmed seats",
                    confirmed.get(key).allocated
                )));
            }
        }
        Ok(())
    }
}
