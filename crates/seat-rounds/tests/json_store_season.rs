use std::sync::Arc;

use seat_rounds::allocation::{
    AllocationRepository, BaseCategory, Candidate, CandidateId, DecisionEntry, DecisionKind,
    DecisionReport, DecisionSource, Gender, JsonFileRepository, OfferStatus, QuotaConfig,
    RoundError, RoundOrchestrator, RoundOutcome, RoundPhase, SeatCategoryKey,
};
use tempfile::tempdir;

fn candidate(id: &str, category: BaseCategory, score: f64) -> Candidate {
    Candidate {
        id: CandidateId::new(id),
        application_no: format!("MT-{id}"),
        name: format!("Candidate {id}"),
        base_category: category,
        ews: false,
        gender: Gender::Male,
        pwd: false,
        merit_score: Some(score),
        attributes: Default::default(),
    }
}

fn report(source: DecisionSource, rows: &[(&str, DecisionKind)]) -> DecisionReport {
    DecisionReport {
        source,
        entries: rows
            .iter()
            .map(|(id, kind)| DecisionEntry {
                identifier: if source.keyed_by_application_no() {
                    format!("MT-{id}")
                } else {
                    id.to_string()
                },
                kind: *kind,
            })
            .collect(),
    }
}

fn seat_matrix() -> QuotaConfig {
    QuotaConfig::from_labels(vec![("GEN_FandM", 2u32), ("OBC_FandM", 1)]).expect("valid labels")
}

fn offered_ids(outcome: &RoundOutcome) -> usize {
    match outcome {
        RoundOutcome::Generated(summary) => summary.offered,
        RoundOutcome::Exhausted { .. } => 0,
    }
}

#[test]
fn season_survives_reopening_the_store() {
    let dir = tempdir().expect("temp dir");
    let path = dir.path().join("season.json");

    {
        let orchestrator = RoundOrchestrator::new(Arc::new(JsonFileRepository::new(&path)), 5);
        orchestrator
            .load_roster(vec![
                candidate("A", BaseCategory::Gen, 95.0),
                candidate("B", BaseCategory::Gen, 90.0),
                candidate("C", BaseCategory::Obc, 85.0),
                candidate("D", BaseCategory::Gen, 80.0),
            ])
            .expect("roster loads");
        orchestrator.replace_quota(seat_matrix()).expect("quota saved");

        let first = orchestrator.run(1).expect("round 1 runs");
        assert_eq!(offered_ids(&first), 3);
    }

    // A fresh process sees the persisted round and continues from it.
    let orchestrator = RoundOrchestrator::new(Arc::new(JsonFileRepository::new(&path)), 5);
    assert_eq!(
        orchestrator.status().expect("status"),
        RoundPhase::Generated { round: 1 }
    );

    orchestrator
        .ingest(
            1,
            vec![
                report(
                    DecisionSource::LocalOffer,
                    &[("A", DecisionKind::AcceptFreeze), ("B", DecisionKind::RejectWait)],
                ),
                report(DecisionSource::OtherInstitute, &[]),
                report(DecisionSource::Consolidated, &[]),
            ],
        )
        .expect("reports recorded");
    assert_eq!(
        orchestrator.status().expect("status"),
        RoundPhase::Ready { next_round: 2 }
    );

    orchestrator.run(2).expect("round 2 runs");
    let offers = orchestrator.offers(2).expect("round 2 offers");
    let mut ids: Vec<&str> = offers.iter().map(|offer| offer.candidate_id.as_str()).collect();
    ids.sort_unstable();
    // A froze a GEN seat, B rejected and left; C keeps OBC, D takes the free GEN seat.
    assert_eq!(ids, vec!["C", "D"]);
    assert!(offers
        .iter()
        .all(|offer| offer.status == OfferStatus::Offered));

    let fill = orchestrator.quota().expect("quota view");
    let gen = fill
        .iter()
        .find(|line| line.category.label() == "GEN_FandM")
        .expect("GEN row");
    assert_eq!(gen.allocated, 1);
    assert_eq!(gen.remaining, 1);
}

#[test]
fn held_run_lock_reports_round_in_progress() {
    let dir = tempdir().expect("temp dir");
    let path = dir.path().join("season.json");

    let holder = JsonFileRepository::new(&path);
    let orchestrator = RoundOrchestrator::new(Arc::new(JsonFileRepository::new(&path)), 5);
    orchestrator
        .load_roster(vec![candidate("A", BaseCategory::Gen, 90.0)])
        .expect("roster loads");
    orchestrator.replace_quota(seat_matrix()).expect("quota saved");

    let guard = holder.lock_dataset().expect("lock acquired");
    assert!(matches!(
        orchestrator.run(1),
        Err(RoundError::RoundInProgress)
    ));
    assert!(holder.offers(1).expect("readable").is_none());

    drop(guard);
    assert!(orchestrator.run(1).is_ok());
}

#[test]
fn held_run_lock_blocks_every_write() {
    let dir = tempdir().expect("temp dir");
    let path = dir.path().join("season.json");

    let holder = JsonFileRepository::new(&path);
    let orchestrator = RoundOrchestrator::new(Arc::new(JsonFileRepository::new(&path)), 5);
    orchestrator
        .load_roster(vec![candidate("A", BaseCategory::Gen, 90.0)])
        .expect("roster loads");
    orchestrator.replace_quota(seat_matrix()).expect("quota saved");
    orchestrator.run(1).expect("round 1 runs");

    let guard = holder.lock_dataset().expect("lock acquired");
    let local = || vec![report(DecisionSource::LocalOffer, &[("A", DecisionKind::AcceptFreeze)])];
    assert!(matches!(
        orchestrator.ingest(1, local()),
        Err(RoundError::RoundInProgress)
    ));
    assert!(matches!(
        orchestrator.load_roster(vec![candidate("B", BaseCategory::Gen, 80.0)]),
        Err(RoundError::RoundInProgress)
    ));
    assert!(matches!(
        orchestrator.replace_quota(seat_matrix()),
        Err(RoundError::RoundInProgress)
    ));
    assert!(matches!(
        orchestrator.set_quota("GEN_FandM".parse::<SeatCategoryKey>().expect("label"), 5),
        Err(RoundError::RoundInProgress)
    ));
    assert!(holder.decision_sources(1).expect("readable").is_empty());
    assert_eq!(holder.candidates().expect("readable").len(), 1);

    drop(guard);
    let summary = orchestrator.ingest(1, local()).expect("ingest after release");
    assert_eq!(summary.recorded[&DecisionSource::LocalOffer], 1);
}

#[test]
fn reset_rewinds_the_file_store() {
    let dir = tempdir().expect("temp dir");
    let path = dir.path().join("season.json");
    let repository = Arc::new(JsonFileRepository::new(&path));
    let orchestrator = RoundOrchestrator::new(repository.clone(), 5);

    orchestrator
        .load_roster(vec![
            candidate("A", BaseCategory::Gen, 95.0),
            candidate("B", BaseCategory::Gen, 90.0),
        ])
        .expect("roster loads");
    orchestrator
        .replace_quota(QuotaConfig::from_labels(vec![("GEN_FandM", 1u32)]).expect("labels"))
        .expect("quota saved");

    orchestrator.run(1).expect("round 1 runs");
    orchestrator
        .ingest(
            1,
            vec![
                report(DecisionSource::LocalOffer, &[("A", DecisionKind::RejectWait)]),
                report(DecisionSource::OtherInstitute, &[]),
                report(DecisionSource::Consolidated, &[]),
            ],
        )
        .expect("reports recorded");
    orchestrator.run(2).expect("round 2 runs");

    orchestrator.reset(2).expect("round 2 resets");

    assert!(repository.offers(2).expect("readable").is_none());
    assert!(repository
        .decision_sources(1)
        .expect("readable")
        .is_empty());
    assert_eq!(
        orchestrator.status().expect("status"),
        RoundPhase::Generated { round: 1 }
    );
}
