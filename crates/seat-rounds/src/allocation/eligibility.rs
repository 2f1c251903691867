use std::collections::BTreeSet;

use tracing::debug;

use super::domain::{Candidate, CandidateId, DecisionKind, DecisionSource};
use super::history::SeasonHistory;

/// Candidate pool entering the round after the history's horizon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Eligibility {
    Eligible(BTreeSet<CandidateId>),
    /// Nobody is left to offer a seat to. Terminal, not a failure.
    RoundComplete,
}

impl Eligibility {
    pub fn is_eligible(&self, id: &CandidateId) -> bool {
        match self {
            Self::Eligible(ids) => ids.contains(id),
            Self::RoundComplete => false,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Eligible(ids) => ids.len(),
            Self::RoundComplete => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Candidates permanently out of the pool after the rounds in `history`:
/// anyone who accepted and froze a seat on any report, and anyone who
/// rejected this institute's offer on the local report.
pub fn excluded(history: &SeasonHistory) -> BTreeSet<CandidateId> {
    let mut out = BTreeSet::new();

    for round in 1..=history.through() {
        out.extend(
            history
                .decided(round, None, DecisionKind::AcceptFreeze)
                .map(|decision| decision.candidate_id.clone()),
        );
        out.extend(
            history
                .decided(
                    round,
                    Some(DecisionSource::LocalOffer),
                    DecisionKind::RejectWait,
                )
                .map(|decision| decision.candidate_id.clone()),
        );
    }

    out
}

/// Resolves the pool for round `history.through() + 1`: every candidate with
/// a merit score, minus the exclusions accumulated so far.
pub fn resolve(roster: &[Candidate], history: &SeasonHistory) -> Eligibility {
    let out = excluded(history);

    let eligible: BTreeSet<CandidateId> = roster
        .iter()
        .filter(|candidate| candidate.is_ranked())
        .filter(|candidate| !out.contains(&candidate.id))
        .map(|candidate| candidate.id.clone())
        .collect();

    debug!(
        round = history.through() + 1,
        excluded = out.len(),
        eligible = eligible.len(),
        "resolved eligible pool"
    );

    if eligible.is_empty() {
        Eligibility::RoundComplete
    } else {
        Eligibility::Eligible(eligible)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allocation::domain::{BaseCategory, Decision, Gender, RoundNo};
    use std::collections::BTreeMap;

    fn candidate(id: &str, score: Option<f64>) -> Candidate {
        Candidate {
            id: CandidateId::new(id),
            application_no: format!("APP-{id}"),
            name: format!("Candidate {id}"),
            base_category: BaseCategory::Gen,
            ews: false,
            gender: Gender::Male,
            pwd: false,
            merit_score: score,
            attributes: BTreeMap::new(),
        }
    }

    fn decision(round: RoundNo, id: &str, source: DecisionSource, kind: DecisionKind) -> Decision {
        Decision {
            round_no: round,
            candidate_id: CandidateId::new(id),
            source,
            kind,
        }
    }

    fn ids(eligibility: &Eligibility) -> Vec<&str> {
        match eligibility {
            Eligibility::Eligible(ids) => ids.iter().map(CandidateId::as_str).collect(),
            Eligibility::RoundComplete => Vec::new(),
        }
    }

    #[test]
    fn first_round_admits_every_ranked_candidate() {
        let roster = vec![
            candidate("a", Some(80.0)),
            candidate("b", None),
            candidate("c", Some(12.5)),
        ];
        let eligibility = resolve(&roster, &SeasonHistory::new(0));
        assert_eq!(ids(&eligibility), vec!["a", "c"]);
    }

    #[test]
    fn accept_and_freeze_from_any_source_is_binding() {
        let roster = vec![
            candidate("a", Some(80.0)),
            candidate("b", Some(70.0)),
            candidate("c", Some(60.0)),
            candidate("d", Some(50.0)),
        ];
        let mut history = SeasonHistory::new(1);
        history.record_decision(decision(1, "a", DecisionSource::LocalOffer, DecisionKind::AcceptFreeze));
        history.record_decision(decision(1, "b", DecisionSource::OtherInstitute, DecisionKind::AcceptFreeze));
        history.record_decision(decision(1, "c", DecisionSource::Consolidated, DecisionKind::AcceptFreeze));

        assert_eq!(ids(&resolve(&roster, &history)), vec!["d"]);
    }

    #[test]
    fn reject_and_wait_only_counts_on_the_local_report() {
        let roster = vec![candidate("a", Some(80.0)), candidate("b", Some(70.0))];
        let mut history = SeasonHistory::new(1);
        history.record_decision(decision(1, "a", DecisionSource::LocalOffer, DecisionKind::RejectWait));
        history.record_decision(decision(1, "b", DecisionSource::Consolidated, DecisionKind::RejectWait));

        assert_eq!(ids(&resolve(&roster, &history)), vec!["b"]);
    }

    #[test]
    fn exclusions_accumulate_across_rounds() {
        let roster = vec![
            candidate("a", Some(80.0)),
            candidate("b", Some(70.0)),
            candidate("c", Some(60.0)),
        ];
        let mut history = SeasonHistory::new(2);
        history.record_decision(decision(1, "a", DecisionSource::Consolidated, DecisionKind::AcceptFreeze));
        history.record_decision(decision(2, "b", DecisionSource::LocalOffer, DecisionKind::RejectWait));
        history.record_decision(decision(2, "c", DecisionSource::LocalOffer, DecisionKind::RetainWait));

        let eligibility = resolve(&roster, &history);
        assert_eq!(ids(&eligibility), vec!["c"]);
        assert!(!eligibility.is_eligible(&CandidateId::new("a")));
    }

    #[test]
    fn empty_pool_signals_round_complete() {
        let roster = vec![candidate("a", Some(80.0)), candidate("b", None)];
        let mut history = SeasonHistory::new(1);
        history.record_decision(decision(1, "a", DecisionSource::LocalOffer, DecisionKind::AcceptFreeze));

        assert_eq!(resolve(&roster, &history), Eligibility::RoundComplete);
    }
}
