use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use crate::allocation::domain::{
    BaseCategory, Candidate, CandidateId, Decision, DecisionEntry, DecisionKind, DecisionReport,
    DecisionSource, DisabilityScope, Gender, GenderScope, Offer, RoundNo, SeatBase,
    SeatCategoryKey,
};
use crate::allocation::quota::QuotaConfig;
use crate::allocation::repository::{
    AllocationRepository, DatasetLock, InMemoryRepository, RepositoryError,
};
use crate::allocation::service::{IngestSummary, RoundOrchestrator};

pub(super) const MAX_ROUNDS: RoundNo = 10;

pub(super) fn app_no(id: &str) -> String {
    format!("MT-{id}")
}

pub(super) fn candidate(id: &str, score: f64) -> Candidate {
    Candidate {
        id: CandidateId::new(id),
        application_no: app_no(id),
        name: format!("Candidate {id}"),
        base_category: BaseCategory::Gen,
        ews: false,
        gender: Gender::Male,
        pwd: false,
        merit_score: Some(score),
        attributes: BTreeMap::new(),
    }
}

pub(super) fn pwd_candidate(id: &str, score: f64) -> Candidate {
    Candidate {
        pwd: true,
        ..candidate(id, score)
    }
}

pub(super) fn key(base: BaseCategory, gender: GenderScope, disability: DisabilityScope) -> SeatCategoryKey {
    SeatCategoryKey::seat(SeatBase::Category(base), gender, disability)
}

pub(super) fn gen_any() -> SeatCategoryKey {
    key(BaseCategory::Gen, GenderScope::AnyGender, DisabilityScope::General)
}

pub(super) fn gen_any_pwd() -> SeatCategoryKey {
    key(BaseCategory::Gen, GenderScope::AnyGender, DisabilityScope::Pwd)
}

pub(super) fn quota(entries: &[(SeatCategoryKey, u32)]) -> QuotaConfig {
    QuotaConfig::new(entries.iter().copied())
}

pub(super) fn orchestrator(
    roster: Vec<Candidate>,
    config: QuotaConfig,
) -> RoundOrchestrator<InMemoryRepository> {
    let repository = Arc::new(InMemoryRepository::new());
    repository.add_candidates(roster).expect("roster loads");
    repository.save_quota_config(config).expect("quota saves");
    RoundOrchestrator::new(repository, MAX_ROUNDS)
}

pub(super) fn report(source: DecisionSource, entries: &[(&str, DecisionKind)]) -> DecisionReport {
    DecisionReport {
        source,
        entries: entries
            .iter()
            .map(|(id, kind)| DecisionEntry {
                identifier: if source.keyed_by_application_no() {
                    app_no(id)
                } else {
                    id.to_string()
                },
                kind: *kind,
            })
            .collect(),
    }
}

/// Records all three reports for `round`; entries are given per source.
pub(super) fn close_round(
    orchestrator: &RoundOrchestrator<InMemoryRepository>,
    round: RoundNo,
    local: &[(&str, DecisionKind)],
    other: &[(&str, DecisionKind)],
    consolidated: &[(&str, DecisionKind)],
) -> IngestSummary {
    orchestrator
        .ingest(
            round,
            vec![
                report(DecisionSource::LocalOffer, local),
                report(DecisionSource::OtherInstitute, other),
                report(DecisionSource::Consolidated, consolidated),
            ],
        )
        .expect("decisions recorded")
}

pub(super) fn offer_ids(offers: &[Offer]) -> Vec<&str> {
    offers.iter().map(|offer| offer.candidate_id.as_str()).collect()
}

pub(super) fn offer_for<'a>(offers: &'a [Offer], id: &str) -> Option<&'a Offer> {
    offers.iter().find(|offer| offer.candidate_id.as_str() == id)
}

/// Store whose every call fails, for persistence error paths.
pub(super) struct UnavailableRepository;

fn unavailable<T>() -> Result<T, RepositoryError> {
    Err(RepositoryError::Unavailable("store offline".to_string()))
}

impl AllocationRepository for UnavailableRepository {
    fn candidates(&self) -> Result<Vec<Candidate>, RepositoryError> {
        unavailable()
    }

    fn add_candidates(&self, _candidates: Vec<Candidate>) -> Result<usize, RepositoryError> {
        unavailable()
    }

    fn quota_config(&self) -> Result<QuotaConfig, RepositoryError> {
        unavailable()
    }

    fn save_quota_config(&self, _config: QuotaConfig) -> Result<(), RepositoryError> {
        unavailable()
    }

    fn decisions(&self, _round: RoundNo) -> Result<Vec<Decision>, RepositoryError> {
        unavailable()
    }

    fn decision_sources(&self, _round: RoundNo) -> Result<BTreeSet<DecisionSource>, RepositoryError> {
        unavailable()
    }

    fn record_decisions(
        &self,
        _round: RoundNo,
        _reports: Vec<(DecisionSource, Vec<Decision>)>,
    ) -> Result<(), RepositoryError> {
        unavailable()
    }

    fn offers(&self, _round: RoundNo) -> Result<Option<Vec<Offer>>, RepositoryError> {
        unavailable()
    }

    fn generated_rounds(&self) -> Result<Vec<RoundNo>, RepositoryError> {
        unavailable()
    }

    fn commit_round(&self, _round: RoundNo, _offers: Vec<Offer>) -> Result<(), RepositoryError> {
        unavailable()
    }

    fn reset_round(&self, _round: RoundNo) -> Result<(), RepositoryError> {
        unavailable()
    }

    fn lock_dataset(&self) -> Result<DatasetLock, RepositoryError> {
        Ok(DatasetLock::process_local())
    }
}
