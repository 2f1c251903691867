use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use tracing::{debug, error};

use super::domain::{
    merit_order, Candidate, CandidateId, DisabilityScope, Offer, OfferStatus, RoundNo,
    SeatCategoryKey,
};
use super::quota::QuotaSnapshot;

/// A retained candidate whose seat was unexpectedly full. The ledger replay
/// should make this impossible, so every occurrence is surfaced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RetentionConflict {
    pub candidate_id: CandidateId,
    pub category: SeatCategoryKey,
}

/// Result of one allocation pass.
#[derive(Debug, Clone)]
pub struct AllocationPlan {
    pub round_no: RoundNo,
    /// Offers in the order they were made.
    pub offers: Vec<Offer>,
    /// Eligible candidates left without a seat, in merit order.
    pub unallocated: Vec<CandidateId>,
    pub retention_conflicts: Vec<RetentionConflict>,
    /// Capacity after every offer of the round has been counted.
    pub quota: QuotaSnapshot,
}

/// Greedy, tiered seat assignment for a single round.
///
/// Tiers run strictly in order, each over its candidates in merit order:
/// retained offers, the single top disability candidate on the common
/// quota, the remaining disability candidates on PWD seats, then everyone
/// else on general seats. Seat keys are first-fit and capacity is claimed
/// the moment an offer is made.
pub struct OfferAllocator {
    round_no: RoundNo,
}

struct Pass<'a> {
    round_no: RoundNo,
    quota: QuotaSnapshot,
    placed: BTreeSet<&'a CandidateId>,
    offers: Vec<Offer>,
}

impl<'a> Pass<'a> {
    fn offer(&mut self, candidate: &'a Candidate, category: SeatCategoryKey, status: OfferStatus) {
        debug!(
            round = self.round_no,
            candidate = %candidate.id,
            %category,
            status = status.label(),
            "seat offered"
        );
        self.placed.insert(&candidate.id);
        self.offers.push(Offer {
            round_no: self.round_no,
            candidate_id: candidate.id.clone(),
            category,
            merit_score: candidate.merit_score.unwrap_or_default(),
            status,
        });
    }

    fn is_placed(&self, candidate: &Candidate) -> bool {
        self.placed.contains(&candidate.id)
    }

    /// First key in `keys` with a free seat, claimed on return.
    fn claim_first(&mut self, keys: &[SeatCategoryKey]) -> Option<SeatCategoryKey> {
        keys.iter().copied().find(|key| self.quota.try_take(*key))
    }
}

impl OfferAllocator {
    pub fn new(round_no: RoundNo) -> Self {
        Self { round_no }
    }

    /// Allocates seats to `pool`. Unranked candidates in the pool are ignored;
    /// retained entries for candidates outside the pool are ignored too.
    pub fn allocate(
        &self,
        pool: &[Candidate],
        retained: &BTreeMap<CandidateId, SeatCategoryKey>,
        quota: QuotaSnapshot,
    ) -> AllocationPlan {
        let mut ranked: Vec<&Candidate> = pool.iter().filter(|c| c.is_ranked()).collect();
        ranked.sort_by(|left, right| merit_order(left, right));

        let mut pass = Pass {
            round_no: self.round_no,
            quota,
            placed: BTreeSet::new(),
            offers: Vec::new(),
        };
        let mut retention_conflicts = Vec::new();

        let (holding, fresh): (Vec<&Candidate>, Vec<&Candidate>) = ranked
            .iter()
            .copied()
            .partition(|candidate| retained.contains_key(&candidate.id));

        for &candidate in &holding {
            let category = retained[&candidate.id];
            if pass.quota.try_take(category) {
                pass.offer(candidate, category, OfferStatus::OfferedRetained);
            } else {
                error!(
                    round = self.round_no,
                    candidate = %candidate.id,
                    %category,
                    "retained seat has no capacity left; candidate left unallocated"
                );
                retention_conflicts.push(RetentionConflict {
                    candidate_id: candidate.id.clone(),
                    category,
                });
            }
        }

        let (disabled, general): (Vec<&Candidate>, Vec<&Candidate>) =
            fresh.into_iter().partition(|candidate| candidate.pwd);

        if pass.quota.has_capacity(SeatCategoryKey::CommonPwd) {
            if let Some(top) = disabled.first().copied() {
                let keys = top.seat_preferences(DisabilityScope::General);
                if let Some(category) = pass.claim_first(&keys) {
                    pass.quota.try_take(SeatCategoryKey::CommonPwd);
                    pass.offer(top, category, OfferStatus::OfferedCommonPwd);
                }
            }
        }

        let mut unallocated = Vec::new();

        for candidate in disabled {
            if pass.is_placed(candidate) {
                continue;
            }
            let keys = candidate.seat_preferences(DisabilityScope::Pwd);
            match pass.claim_first(&keys) {
                Some(category) => pass.offer(candidate, category, OfferStatus::OfferedPwd),
                None => {
                    debug!(round = self.round_no, candidate = %candidate.id, "no PWD seat available");
                    unallocated.push(&candidate.id);
                }
            }
        }

        for candidate in general {
            let keys = candidate.seat_preferences(DisabilityScope::General);
            match pass.claim_first(&keys) {
                Some(category) => pass.offer(candidate, category, OfferStatus::Offered),
                None => {
                    debug!(round = self.round_no, candidate = %candidate.id, "no seat available");
                    unallocated.push(&candidate.id);
                }
            }
        }

        // Report in merit order regardless of which tier left them out.
        let unallocated: Vec<CandidateId> = ranked
            .iter()
            .filter(|candidate| {
                unallocated.contains(&&candidate.id)
                    || retention_conflicts
                        .iter()
                        .any(|conflict| conflict.candidate_id == candidate.id)
            })
            .map(|candidate| candidate.id.clone())
            .collect();

        AllocationPlan {
            round_no: self.round_no,
            offers: pass.offers,
            unallocated,
            retention_conflicts,
            quota: pass.quota,
        }
    }
}
