//! Round-by-round seat allocation.
//!
//! Each round is computed from persisted history alone: the eligible pool,
//! the retained offers and the confirmed-seat ledger are all re-derived from
//! the decision journal and earlier offers before the allocator runs.

pub mod allocator;
pub mod domain;
pub mod eligibility;
pub mod history;
pub mod quota;
pub mod report;
pub mod repository;
pub mod retention;
pub mod router;
pub mod service;
pub mod storage;

#[cfg(test)]
mod tests;

pub use allocator::{AllocationPlan, OfferAllocator, RetentionConflict};
pub use domain::{
    BaseCategory, Candidate, CandidateId, Decision, DecisionEntry, DecisionKind, DecisionReport,
    DecisionSource, DisabilityScope, Gender, GenderScope, Offer, OfferStatus, RoundNo, SeatBase,
    SeatCategoryKey, UnknownCategory,
};
pub use eligibility::Eligibility;
pub use history::SeasonHistory;
pub use quota::{QuotaConfig, QuotaConfigError, QuotaSnapshot, SeatCount};
pub use report::{CategoryFill, OfferExport, RoundSummary};
pub use repository::{AllocationRepository, DatasetLock, InMemoryRepository, RepositoryError, SeasonState};
pub use router::round_router;
pub use service::{IngestSummary, RoundError, RoundOrchestrator, RoundOutcome, RoundPhase};
pub use storage::JsonFileRepository;
