use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::domain::{
    CandidateId, DecisionKind, DecisionSource, OfferStatus, SeatCategoryKey, UnknownCategory,
};
use super::history::SeasonHistory;

/// Operator-maintained seat totals. Every known category is present; keys
/// the operator never declared carry zero seats.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaConfig {
    seats: BTreeMap<SeatCategoryKey, u32>,
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            seats: SeatCategoryKey::all()
                .into_iter()
                .map(|key| (key, 0))
                .collect(),
        }
    }
}

impl QuotaConfig {
    pub fn new(entries: impl IntoIterator<Item = (SeatCategoryKey, u32)>) -> Self {
        let mut config = Self::default();
        for (key, total) in entries {
            config.seats.insert(key, total);
        }
        config
    }

    /// Builds a table from raw labels, validating every key once.
    pub fn from_labels<S: AsRef<str>>(
        rows: impl IntoIterator<Item = (S, u32)>,
    ) -> Result<Self, QuotaConfigError> {
        let mut seen = BTreeSet::new();
        let mut entries = Vec::new();
        for (label, total) in rows {
            let key: SeatCategoryKey = label.as_ref().parse()?;
            if !seen.insert(key) {
                return Err(QuotaConfigError::DuplicateCategory(key.label()));
            }
            entries.push((key, total));
        }
        Ok(Self::new(entries))
    }

    pub fn total(&self, key: SeatCategoryKey) -> u32 {
        self.seats.get(&key).copied().unwrap_or(0)
    }

    pub fn set(&mut self, key: SeatCategoryKey, total: u32) {
        self.seats.insert(key, total);
    }

    pub fn entries(&self) -> impl Iterator<Item = (SeatCategoryKey, u32)> + '_ {
        self.seats.iter().map(|(key, total)| (*key, *total))
    }

    pub fn total_seats(&self) -> u32 {
        self.seats
            .iter()
            .filter(|(key, _)| **key != SeatCategoryKey::CommonPwd)
            .map(|(_, total)| *total)
            .sum()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QuotaConfigError {
    #[error(transparent)]
    UnknownCategory(#[from] UnknownCategory),
    #[error("seat category '{0}' is declared more than once")]
    DuplicateCategory(String),
}

/// Total and allocated counters for one category.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeatCount {
    pub total: u32,
    pub allocated: u32,
}

impl SeatCount {
    pub fn remaining(&self) -> u32 {
        self.total.saturating_sub(self.allocated)
    }

    pub fn has_capacity(&self) -> bool {
        self.allocated < self.total
    }
}

/// Working capacity map. Built from history by [`replay`] and then consumed
/// seat by seat during allocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaSnapshot {
    counts: BTreeMap<SeatCategoryKey, SeatCount>,
}

impl QuotaSnapshot {
    pub fn from_config(config: &QuotaConfig) -> Self {
        Self {
            counts: config
                .entries()
                .map(|(key, total)| {
                    (
                        key,
                        SeatCount {
                            total,
                            allocated: 0,
                        },
                    )
                })
                .collect(),
        }
    }

    pub fn get(&self, key: SeatCategoryKey) -> SeatCount {
        self.counts.get(&key).copied().unwrap_or_default()
    }

    pub fn has_capacity(&self, key: SeatCategoryKey) -> bool {
        self.get(key).has_capacity()
    }

    /// Claims one seat if the category has room.
    pub fn try_take(&mut self, key: SeatCategoryKey) -> bool {
        match self.counts.get_mut(&key) {
            Some(count) if count.has_capacity() => {
                count.allocated += 1;
                true
            }
            _ => false,
        }
    }

    /// Counts a confirmed seat from history. Never refuses; an overrun shows
    /// up in [`Self::overdrawn`].
    fn confirm(&mut self, key: SeatCategoryKey) {
        self.counts.entry(key).or_default().allocated += 1;
    }

    pub fn iter(&self) -> impl Iterator<Item = (SeatCategoryKey, SeatCount)> + '_ {
        self.counts.iter().map(|(key, count)| (*key, *count))
    }

    /// Categories whose allocated count exceeds the configured total.
    pub fn overdrawn(&self) -> Vec<SeatCategoryKey> {
        self.iter()
            .filter(|(_, count)| count.allocated > count.total)
            .map(|(key, _)| key)
            .collect()
    }
}

/// Recomputes confirmed seats from scratch: for every round up to the
/// history's horizon, offers whose holder recorded Accept-and-Freeze on the
/// local report count against their category. Common-quota placements also
/// count against `COMMON_PWD`.
pub fn replay(config: &QuotaConfig, history: &SeasonHistory) -> QuotaSnapshot {
    let mut snapshot = QuotaSnapshot::from_config(config);

    for round in 1..=history.through() {
        let frozen: BTreeSet<&CandidateId> = history
            .decided(
                round,
                Some(DecisionSource::LocalOffer),
                DecisionKind::AcceptFreeze,
            )
            .map(|decision| &decision.candidate_id)
            .collect();

        let mut confirmed_in_round = 0usize;
        for offer in history.offers_in(round) {
            if !frozen.contains(&offer.candidate_id) {
                continue;
            }
            snapshot.confirm(offer.category);
            if offer.status == OfferStatus::OfferedCommonPwd {
                snapshot.confirm(SeatCategoryKey::CommonPwd);
            }
            confirmed_in_round += 1;
        }

        debug!(round, confirmed = confirmed_in_round, "replayed confirmed seats");
    }

    snapshot
}

/// Checks whether lowering `key` to `total` would undercut seats already
/// confirmed in history.
pub fn fits_confirmed(snapshot: &QuotaSnapshot, key: SeatCategoryKey, total: u32) -> bool {
    snapshot.get(key).allocated <= total
}
