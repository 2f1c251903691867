use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// One-based round number. Round 0 means "no round completed yet".
pub type RoundNo = u32;

/// Registration identifier for a candidate (the COAP id on the roster).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CandidateId(pub String);

impl CandidateId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CandidateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Social category recorded on the roster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum BaseCategory {
    #[serde(rename = "GEN")]
    Gen,
    #[serde(rename = "OBC")]
    Obc,
    #[serde(rename = "SC")]
    Sc,
    #[serde(rename = "ST")]
    St,
}

impl BaseCategory {
    pub const fn ordered() -> [Self; 4] {
        [Self::Gen, Self::Obc, Self::Sc, Self::St]
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Gen => "GEN",
            Self::Obc => "OBC",
            Self::Sc => "SC",
            Self::St => "ST",
        }
    }

    /// Blank values fall back to GEN, as the roster feed leaves the column
    /// empty for unreserved candidates.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "" | "GEN" | "GENERAL" | "OPEN" => Some(Self::Gen),
            "OBC" | "OBC-NCL" | "OBC_NCL" => Some(Self::Obc),
            "SC" => Some(Self::Sc),
            "ST" => Some(Self::St),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Gender {
    Female,
    Male,
    Other,
}

impl Gender {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Female => "Female",
            Self::Male => "Male",
            Self::Other => "Other",
        }
    }

    /// Missing gender is read as Male, which only ever makes the candidate
    /// eligible for gender-neutral seats.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "female" | "f" => Self::Female,
            "" | "male" | "m" => Self::Male,
            _ => Self::Other,
        }
    }
}

/// Effective base of a seat: the economic-status override or a social category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SeatBase {
    Ews,
    Category(BaseCategory),
}

impl SeatBase {
    pub fn ordered() -> [Self; 5] {
        [
            Self::Ews,
            Self::Category(BaseCategory::Gen),
            Self::Category(BaseCategory::Obc),
            Self::Category(BaseCategory::Sc),
            Self::Category(BaseCategory::St),
        ]
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Ews => "EWS",
            Self::Category(category) => category.label(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum GenderScope {
    FemaleOnly,
    AnyGender,
}

impl GenderScope {
    pub const fn label(self) -> &'static str {
        match self {
            Self::FemaleOnly => "Female",
            Self::AnyGender => "FandM",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DisabilityScope {
    General,
    Pwd,
}

/// Typed seat category. Serialized as its canonical label, e.g. `GEN_FandM_PWD`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum SeatCategoryKey {
    /// Cross-category quota for disability-flagged candidates.
    CommonPwd,
    Seat {
        base: SeatBase,
        gender: GenderScope,
        disability: DisabilityScope,
    },
}

impl SeatCategoryKey {
    pub const COMMON_PWD_LABEL: &'static str = "COMMON_PWD";

    pub const fn seat(base: SeatBase, gender: GenderScope, disability: DisabilityScope) -> Self {
        Self::Seat {
            base,
            gender,
            disability,
        }
    }

    /// Every key a quota table can declare, in canonical order.
    pub fn all() -> Vec<Self> {
        let mut keys = vec![Self::CommonPwd];
        for base in SeatBase::ordered() {
            for gender in [GenderScope::AnyGender, GenderScope::FemaleOnly] {
                for disability in [DisabilityScope::General, DisabilityScope::Pwd] {
                    keys.push(Self::seat(base, gender, disability));
                }
            }
        }
        keys
    }

    pub fn label(&self) -> String {
        match self {
            Self::CommonPwd => Self::COMMON_PWD_LABEL.to_string(),
            Self::Seat {
                base,
                gender,
                disability,
            } => {
                let mut label = format!("{}_{}", base.label(), gender.label());
                if *disability == DisabilityScope::Pwd {
                    label.push_str("_PWD");
                }
                label
            }
        }
    }
}

impl fmt::Display for SeatCategoryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

/// Raised when a category label does not name a known seat pool.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown seat category '{0}'")]
pub struct UnknownCategory(pub String);

impl FromStr for SeatCategoryKey {
    type Err = UnknownCategory;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let trimmed = raw.trim();
        if trimmed.eq_ignore_ascii_case(Self::COMMON_PWD_LABEL) {
            return Ok(Self::CommonPwd);
        }

        let unknown = || UnknownCategory(raw.to_string());
        let parts: Vec<&str> = trimmed.split('_').collect();
        let (base, gender, disability) = match parts.as_slice() {
            [base, gender] => (*base, *gender, DisabilityScope::General),
            [base, gender, pwd] if pwd.eq_ignore_ascii_case("PWD") => {
                (*base, *gender, DisabilityScope::Pwd)
            }
            _ => return Err(unknown()),
        };

        let base = if base.eq_ignore_ascii_case("EWS") {
            SeatBase::Ews
        } else {
            BaseCategory::ordered()
                .into_iter()
                .find(|category| category.label().eq_ignore_ascii_case(base))
                .map(SeatBase::Category)
                .ok_or_else(unknown)?
        };

        let gender = if gender.eq_ignore_ascii_case("Female") {
            GenderScope::FemaleOnly
        } else if gender.eq_ignore_ascii_case("FandM") {
            GenderScope::AnyGender
        } else {
            return Err(unknown());
        };

        Ok(Self::seat(base, gender, disability))
    }
}

impl TryFrom<String> for SeatCategoryKey {
    type Error = UnknownCategory;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<SeatCategoryKey> for String {
    fn from(value: SeatCategoryKey) -> Self {
        value.label()
    }
}

/// Immutable roster entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub id: CandidateId,
    /// Institute application number; the local decision reports key on it.
    pub application_no: String,
    pub name: String,
    pub base_category: BaseCategory,
    pub ews: bool,
    pub gender: Gender,
    pub pwd: bool,
    /// Absent scores exclude the candidate from every round.
    pub merit_score: Option<f64>,
    /// Remaining roster columns, carried through to the detailed export.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, String>,
}

impl Candidate {
    pub fn is_ranked(&self) -> bool {
        self.merit_score.is_some()
    }

    pub fn seat_base(&self) -> SeatBase {
        if self.ews {
            SeatBase::Ews
        } else {
            SeatBase::Category(self.base_category)
        }
    }

    /// Seat keys to try in order: the female-only pool first for female
    /// candidates, then the gender-neutral pool.
    pub fn seat_preferences(&self, disability: DisabilityScope) -> Vec<SeatCategoryKey> {
        let base = self.seat_base();
        let mut keys = Vec::with_capacity(2);
        if self.gender == Gender::Female {
            keys.push(SeatCategoryKey::seat(
                base,
                GenderScope::FemaleOnly,
                disability,
            ));
        }
        keys.push(SeatCategoryKey::seat(base, GenderScope::AnyGender, disability));
        keys
    }
}

/// Merit order: score descending, then id ascending. Unranked candidates sort last.
pub fn merit_order(left: &Candidate, right: &Candidate) -> Ordering {
    match (left.merit_score, right.merit_score) {
        (Some(a), Some(b)) => b.total_cmp(&a),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
    .then_with(|| left.id.cmp(&right.id))
}

/// The three reports collected after every round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionSource {
    /// Decisions on offers made by this institute.
    LocalOffer,
    /// Candidates offered here who accepted a seat at another institute.
    OtherInstitute,
    /// Accept-and-freeze decisions consolidated across all institutes.
    Consolidated,
}

impl DecisionSource {
    pub const ALL: [Self; 3] = [Self::LocalOffer, Self::OtherInstitute, Self::Consolidated];

    pub const fn label(self) -> &'static str {
        match self {
            Self::LocalOffer => "local offer report",
            Self::OtherInstitute => "other institute report",
            Self::Consolidated => "consolidated report",
        }
    }

    /// LocalOffer and OtherInstitute rows carry application numbers;
    /// consolidated rows carry registration ids.
    pub const fn keyed_by_application_no(self) -> bool {
        !matches!(self, Self::Consolidated)
    }
}

impl fmt::Display for DecisionSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DecisionKind {
    #[serde(rename = "Accept and Freeze")]
    AcceptFreeze,
    #[serde(rename = "Retain and Wait")]
    RetainWait,
    #[serde(rename = "Reject and Wait")]
    RejectWait,
}

impl DecisionKind {
    pub const fn label(self) -> &'static str {
        match self {
            Self::AcceptFreeze => "Accept and Freeze",
            Self::RetainWait => "Retain and Wait",
            Self::RejectWait => "Reject and Wait",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        let normalized = raw
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_ascii_lowercase()
            .replace('&', "and");
        match normalized.as_str() {
            "accept and freeze" => Some(Self::AcceptFreeze),
            "retain and wait" => Some(Self::RetainWait),
            "reject and wait" => Some(Self::RejectWait),
            _ => None,
        }
    }
}

/// One recorded decision. Never mutated; removed only by a round reset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    pub round_no: RoundNo,
    pub candidate_id: CandidateId,
    pub source: DecisionSource,
    pub kind: DecisionKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum OfferStatus {
    #[serde(rename = "Offered")]
    Offered,
    #[serde(rename = "Offered (Retained)")]
    OfferedRetained,
    #[serde(rename = "Offered (PWD)")]
    OfferedPwd,
    #[serde(rename = "Offered (Common PWD)")]
    OfferedCommonPwd,
}

impl OfferStatus {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Offered => "Offered",
            Self::OfferedRetained => "Offered (Retained)",
            Self::OfferedPwd => "Offered (PWD)",
            Self::OfferedCommonPwd => "Offered (Common PWD)",
        }
    }
}

/// Seat offer made to one candidate in one round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Offer {
    pub round_no: RoundNo,
    pub candidate_id: CandidateId,
    pub category: SeatCategoryKey,
    pub merit_score: f64,
    pub status: OfferStatus,
}

/// Decision report as delivered for one source, before identifiers are
/// resolved against the roster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionReport {
    pub source: DecisionSource,
    pub entries: Vec<DecisionEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionEntry {
    /// Application number or registration id, depending on the source.
    pub identifier: String,
    pub kind: DecisionKind,
}
