use std::collections::{BTreeMap, BTreeSet};

use super::domain::{CandidateId, DecisionKind, DecisionSource, SeatCategoryKey};
use super::history::SeasonHistory;

/// Candidates who held an offer in the history's last round and chose
/// Retain-and-Wait on the local report, mapped to the category they hold.
/// They are re-offered exactly that category in the next round.
pub fn retained(history: &SeasonHistory) -> BTreeMap<CandidateId, SeatCategoryKey> {
    let previous = history.through();
    if previous == 0 {
        return BTreeMap::new();
    }

    let waiting: BTreeSet<&CandidateId> = history
        .decided(
            previous,
            Some(DecisionSource::LocalOffer),
            DecisionKind::RetainWait,
        )
        .map(|decision| &decision.candidate_id)
        .collect();

    history
        .offers_in(previous)
        .iter()
        .filter(|offer| waiting.contains(&offer.candidate_id))
        .map(|offer| (offer.candidate_id.clone(), offer.category))
        .collect()
}
