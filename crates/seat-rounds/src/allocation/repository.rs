use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{Candidate, CandidateId, Decision, DecisionSource, Offer, RoundNo};
use super::quota::QuotaConfig;

/// Storage abstraction injected into the orchestrator. Every mutating call
/// is one transaction: it either fully applies or leaves the store untouched.
pub trait AllocationRepository: Send + Sync {
    fn candidates(&self) -> Result<Vec<Candidate>, RepositoryError>;
    /// Adds roster entries, ignoring ids already present. Returns how many were added.
    fn add_candidates(&self, candidates: Vec<Candidate>) -> Result<usize, RepositoryError>;

    fn quota_config(&self) -> Result<QuotaConfig, RepositoryError>;
    fn save_quota_config(&self, config: QuotaConfig) -> Result<(), RepositoryError>;

    fn decisions(&self, round: RoundNo) -> Result<Vec<Decision>, RepositoryError>;
    /// Sources whose report for `round` has been recorded, even if empty.
    fn decision_sources(&self, round: RoundNo) -> Result<BTreeSet<DecisionSource>, RepositoryError>;
    /// Replaces the reports of the given sources for `round` in one commit.
    fn record_decisions(
        &self,
        round: RoundNo,
        reports: Vec<(DecisionSource, Vec<Decision>)>,
    ) -> Result<(), RepositoryError>;

    /// Offers of `round`, or `None` if the round was never generated.
    fn offers(&self, round: RoundNo) -> Result<Option<Vec<Offer>>, RepositoryError>;
    fn generated_rounds(&self) -> Result<Vec<RoundNo>, RepositoryError>;
    /// Replaces the offers of `round` in one commit.
    fn commit_round(&self, round: RoundNo, offers: Vec<Offer>) -> Result<(), RepositoryError>;
    /// Removes the offers of `round` and the decision reports recorded for
    /// `round - 1` in one commit.
    fn reset_round(&self, round: RoundNo) -> Result<(), RepositoryError>;

    /// Exclusive claim on the dataset for the duration of a round run.
    fn lock_dataset(&self) -> Result<DatasetLock, RepositoryError>;
}

/// Error enumeration for repository failures.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("dataset is locked by another operation")]
    Locked,
    #[error("repository unavailable: {0}")]
    Unavailable(String),
    #[error("stored season data is unreadable: {0}")]
    Corrupt(String),
    #[error("repository io failure: {0}")]
    Io(#[from] std::io::Error),
}

/// Held for as long as a dataset-wide operation runs; released on drop.
pub struct DatasetLock {
    _guard: Option<Box<dyn Send>>,
}

impl DatasetLock {
    /// For stores that are only reachable from this process, where the
    /// orchestrator's own guard is enough.
    pub fn process_local() -> Self {
        Self { _guard: None }
    }

    pub fn holding<G: Send + 'static>(guard: G) -> Self {
        Self {
            _guard: Some(Box::new(guard)),
        }
    }
}

impl std::fmt::Debug for DatasetLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatasetLock")
            .field("external", &self._guard.is_some())
            .finish()
    }
}

/// Decisions from one report, stamped with when they were recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordedReport {
    pub recorded_at: DateTime<Utc>,
    pub decisions: Vec<Decision>,
}

/// Entire persisted state of a season.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SeasonState {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
    #[serde(default)]
    pub quota: QuotaConfig,
    #[serde(default)]
    pub decisions: BTreeMap<RoundNo, BTreeMap<DecisionSource, RecordedReport>>,
    #[serde(default)]
    pub offers: BTreeMap<RoundNo, Vec<Offer>>,
}

impl SeasonState {
    pub fn add_candidates(&mut self, candidates: Vec<Candidate>) -> usize {
        let mut known: BTreeSet<CandidateId> =
            self.candidates.iter().map(|c| c.id.clone()).collect();
        let before = self.candidates.len();
        for candidate in candidates {
            if known.insert(candidate.id.clone()) {
                self.candidates.push(candidate);
            }
        }
        self.candidates.len() - before
    }

    pub fn decisions(&self, round: RoundNo) -> Vec<Decision> {
        self.decisions
            .get(&round)
            .map(|reports| {
                reports
                    .values()
                    .flat_map(|report| report.decisions.iter().cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn decision_sources(&self, round: RoundNo) -> BTreeSet<DecisionSource> {
        self.decisions
            .get(&round)
            .map(|reports| reports.keys().copied().collect())
            .unwrap_or_default()
    }

    pub fn record_decisions(
        &mut self,
        round: RoundNo,
        reports: Vec<(DecisionSource, Vec<Decision>)>,
        recorded_at: DateTime<Utc>,
    ) {
        let slot = self.decisions.entry(round).or_default();
        for (source, decisions) in reports {
            slot.insert(
                source,
                RecordedReport {
                    recorded_at,
                    decisions,
                },
            );
        }
    }

    pub fn commit_round(&mut self, round: RoundNo, offers: Vec<Offer>) {
        self.offers.insert(round, offers);
    }

    pub fn reset_round(&mut self, round: RoundNo) {
        self.offers.remove(&round);
        if round > 1 {
            self.decisions.remove(&(round - 1));
        }
    }
}

/// Process-local store, used by tests and the demo server.
#[derive(Debug, Default)]
pub struct InMemoryRepository {
    state: Mutex<SeasonState>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_state(state: SeasonState) -> Self {
        Self {
            state: Mutex::new(state),
        }
    }

    pub fn snapshot(&self) -> Result<SeasonState, RepositoryError> {
        Ok(self.state()?.clone())
    }

    fn state(&self) -> Result<MutexGuard<'_, SeasonState>, RepositoryError> {
        self.state
            .lock()
            .map_err(|_| RepositoryError::Unavailable("season state lock poisoned".to_string()))
    }
}

impl AllocationRepository for InMemoryRepository {
    fn candidates(&self) -> Result<Vec<Candidate>, RepositoryError> {
        Ok(self.state()?.candidates.clone())
    }

    fn add_candidates(&self, candidates: Vec<Candidate>) -> Result<usize, RepositoryError> {
        Ok(self.state()?.add_candidates(candidates))
    }

    fn quota_config(&self) -> Result<QuotaConfig, RepositoryError> {
        Ok(self.state()?.quota.clone())
    }

    fn save_quota_config(&self, config: QuotaConfig) -> Result<(), RepositoryError> {
        self.state()?.quota = config;
        Ok(())
    }

    fn decisions(&self, round: RoundNo) -> Result<Vec<Decision>, RepositoryError> {
        Ok(self.state()?.decisions(round))
    }

    fn decision_sources(&self, round: RoundNo) -> Result<BTreeSet<DecisionSource>, RepositoryError> {
        Ok(self.state()?.decision_sources(round))
    }

    fn record_decisions(
        &self,
        round: RoundNo,
        reports: Vec<(DecisionSource, Vec<Decision>)>,
    ) -> Result<(), RepositoryError> {
        self.state()?.record_decisions(round, reports, Utc::now());
        Ok(())
    }

    fn offers(&self, round: RoundNo) -> Result<Option<Vec<Offer>>, RepositoryError> {
        Ok(self.state()?.offers.get(&round).cloned())
    }

    fn generated_rounds(&self) -> Result<Vec<RoundNo>, RepositoryError> {
        Ok(self.state()?.offers.keys().copied().collect())
    }

    fn commit_round(&self, round: RoundNo, offers: Vec<Offer>) -> Result<(), RepositoryError> {
        self.state()?.commit_round(round, offers);
        Ok(())
    }

    fn reset_round(&self, round: RoundNo) -> Result<(), RepositoryError> {
        self.state()?.reset_round(round);
        Ok(())
    }

    fn lock_dataset(&self) -> Result<DatasetLock, RepositoryError> {
        Ok(DatasetLock::process_local())
    }
}
