use std::collections::BTreeMap;

use super::domain::{Decision, DecisionKind, DecisionSource, Offer, RoundNo};
use super::repository::{AllocationRepository, RepositoryError};

/// Read-only view of the decision journal and offer history for rounds
/// `1..=through`. Every resolver works from one of these so a round is
/// computed from a single consistent read of the store.
#[derive(Debug, Clone, Default)]
pub struct SeasonHistory {
    through: RoundNo,
    decisions: BTreeMap<RoundNo, Vec<Decision>>,
    offers: BTreeMap<RoundNo, Vec<Offer>>,
}

impl SeasonHistory {
    pub fn new(through: RoundNo) -> Self {
        Self {
            through,
            ..Self::default()
        }
    }

    pub fn load<R>(repository: &R, through: RoundNo) -> Result<Self, RepositoryError>
    where
        R: AllocationRepository + ?Sized,
    {
        let mut history = Self::new(through);
        for round in 1..=through {
            history
                .decisions
                .insert(round, repository.decisions(round)?);
            history
                .offers
                .insert(round, repository.offers(round)?.unwrap_or_default());
        }
        Ok(history)
    }

    pub fn through(&self) -> RoundNo {
        self.through
    }

    pub fn record_decision(&mut self, decision: Decision) {
        self.through = self.through.max(decision.round_no);
        self.decisions
            .entry(decision.round_no)
            .or_default()
            .push(decision);
    }

    pub fn record_offers(&mut self, round: RoundNo, offers: Vec<Offer>) {
        self.through = self.through.max(round);
        self.offers.insert(round, offers);
    }

    pub fn decisions_in(&self, round: RoundNo) -> &[Decision] {
        self.decisions.get(&round).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn offers_in(&self, round: RoundNo) -> &[Offer] {
        self.offers.get(&round).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Decisions of `kind` recorded by `source` in `round`.
    pub fn decided<'a>(
        &'a self,
        round: RoundNo,
        source: Option<DecisionSource>,
        kind: DecisionKind,
    ) -> impl Iterator<Item = &'a Decision> + 'a {
        self.decisions_in(round).iter().filter(move |decision| {
            decision.kind == kind && source.map_or(true, |wanted| decision.source == wanted)
        })
    }
}
