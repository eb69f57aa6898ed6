use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

/// Identifier wrapper for candidate profiles.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CandidateId(pub String);

impl CandidateId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl fmt::Display for CandidateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of a recruiter; matches the identity provider uid.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HrProfileId(pub String);

impl fmt::Display for HrProfileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A 0-100 score. Construction rejects anything outside the range instead of clamping.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct Score(u8);

impl Score {
    pub const MAX: u8 = 100;

    pub const fn new(value: u8) -> Option<Self> {
        if value <= Self::MAX {
            Some(Self(value))
        } else {
            None
        }
    }

    pub const fn value(self) -> u8 {
        self.0
    }
}

impl<'de> Deserialize<'de> for Score {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = u8::deserialize(deserializer)?;
        Score::new(raw).ok_or_else(|| {
            serde::de::Error::custom(format!("score {raw} outside 0..=100"))
        })
    }
}

impl fmt::Display for Score {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Verification state of a candidate as seen by recruiters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProfileStatus {
    PendingDocuments,
    Verified,
    Rejected,
}

impl ProfileStatus {
    pub const fn label(self) -> &'static str {
        match self {
            ProfileStatus::PendingDocuments => "pending_documents",
            ProfileStatus::Verified => "verified",
            ProfileStatus::Rejected => "rejected",
        }
    }

    /// Allowed moves: out of pending into a decision, or between decisions.
    /// Nothing returns to pending.
    pub const fn can_become(self, next: ProfileStatus) -> bool {
        !matches!(next, ProfileStatus::PendingDocuments)
            || matches!(self, ProfileStatus::PendingDocuments)
    }
}

/// Identity and verification state for one candidate (`candidate_profiles/{id}`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateProfile {
    pub id: CandidateId,
    pub full_name: String,
    pub email: String,
    pub role: String,
    pub profile_status: ProfileStatus,
    pub trust_score: Score,
    pub fraud_risk_score: Score,
    pub is_shortlisted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CandidateProfile {
    /// Fresh profile awaiting documents, with zeroed scores.
    pub fn pending(
        id: CandidateId,
        full_name: impl Into<String>,
        email: impl Into<String>,
        role: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            full_name: full_name.into(),
            email: email.into(),
            role: role.into(),
            profile_status: ProfileStatus::PendingDocuments,
            trust_score: Score::default(),
            fraud_risk_score: Score::default(),
            is_shortlisted: false,
            created_at: now,
            updated_at: now,
        }
    }
}

/// End of an employment stint: a calendar date or the literal `Present`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EndDate {
    On(NaiveDate),
    Present,
}

impl EndDate {
    pub const PRESENT_LITERAL: &'static str = "Present";

    pub fn date(self) -> Option<NaiveDate> {
        match self {
            EndDate::On(date) => Some(date),
            EndDate::Present => None,
        }
    }
}

impl fmt::Display for EndDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EndDate::On(date) => write!(f, "{}", date.format(DATE_FORMAT)),
            EndDate::Present => f.write_str(Self::PRESENT_LITERAL),
        }
    }
}

impl Serialize for EndDate {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for EndDate {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        if raw == Self::PRESENT_LITERAL {
            return Ok(EndDate::Present);
        }
        parse_calendar_date(&raw)
            .map(EndDate::On)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid end date '{raw}'")))
    }
}

/// Canonical textual date format for employment periods.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Strict `YYYY-MM-DD`: zero padded, exactly ten characters, and a real calendar day.
pub fn parse_calendar_date(raw: &str) -> Option<NaiveDate> {
    let bytes = raw.as_bytes();
    let shaped = bytes.len() == 10
        && bytes[4] == b'-'
        && bytes[7] == b'-'
        && bytes
            .iter()
            .enumerate()
            .all(|(idx, byte)| idx == 4 || idx == 7 || byte.is_ascii_digit());
    if !shaped {
        return None;
    }
    NaiveDate::parse_from_str(raw, DATE_FORMAT).ok()
}

/// One employment stint extracted from a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmploymentPeriod {
    pub company_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_title: Option<String>,
    #[serde(with = "calendar_date")]
    pub start_date: NaiveDate,
    pub end_date: EndDate,
}

impl EmploymentPeriod {
    pub fn is_ongoing(&self) -> bool {
        matches!(self.end_date, EndDate::Present)
    }
}

mod calendar_date {
    use super::{parse_calendar_date, DATE_FORMAT};
    use chrono::NaiveDate;
    use serde::{Deserialize, Deserializer, Serializer};

    pub(super) fn serialize<S>(date: &NaiveDate, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(&date.format(DATE_FORMAT))
    }

    pub(super) fn deserialize<'de, D>(deserializer: D) -> Result<NaiveDate, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        parse_calendar_date(&raw)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid date '{raw}'")))
    }
}

/// Kind of decision recorded in the audit log. Unknown actions are kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AuditAction {
    InvitationSent,
    AutoShortlist,
    Verified,
    Rejected,
    RuleSet,
    SystemInitialized,
    Other(String),
}

impl AuditAction {
    pub fn as_str(&self) -> &str {
        match self {
            AuditAction::InvitationSent => "INVITATION_SENT",
            AuditAction::AutoShortlist => "AUTO_SHORTLIST",
            AuditAction::Verified => "VERIFIED",
            AuditAction::Rejected => "REJECTED",
            AuditAction::RuleSet => "RULE_SET",
            AuditAction::SystemInitialized => "SYSTEM_INITIALIZED",
            AuditAction::Other(raw) => raw,
        }
    }

    pub fn parse(raw: &str) -> Self {
        match raw {
            "INVITATION_SENT" => AuditAction::InvitationSent,
            "AUTO_SHORTLIST" => AuditAction::AutoShortlist,
            "VERIFIED" => AuditAction::Verified,
            "REJECTED" => AuditAction::Rejected,
            "RULE_SET" => AuditAction::RuleSet,
            "SYSTEM_INITIALIZED" => AuditAction::SystemInitialized,
            other => AuditAction::Other(other.to_string()),
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for AuditAction {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for AuditAction {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Ok(AuditAction::parse(&raw))
    }
}

/// Immutable record of a manual or automatic decision (`audit_logs/{id}`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditLogEntry {
    pub id: String,
    pub hr_profile_id: HrProfileId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub candidate_id: Option<CandidateId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub candidate_name: Option<String>,
    pub action: AuditAction,
    pub timestamp: DateTime<Utc>,
    pub notes: String,
}

impl AuditLogEntry {
    pub fn new(
        actor: HrProfileId,
        action: AuditAction,
        notes: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            hr_profile_id: actor,
            candidate_id: None,
            candidate_name: None,
            action,
            timestamp,
            notes: notes.into(),
        }
    }

    pub fn for_candidate(mut self, candidate: &CandidateProfile) -> Self {
        self.candidate_id = Some(candidate.id.clone());
        self.candidate_name = Some(candidate.full_name.clone());
        self
    }
}

/// Recruiter identity record (`hr_profiles/{id}`); its presence grants HR privileges.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HrProfile {
    pub id: HrProfileId,
    pub display_name: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
}

/// Opaque identity handed over by the external identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthenticatedUser {
    pub uid: String,
    pub display_name: String,
    pub email: String,
}

impl AuthenticatedUser {
    pub fn new(
        uid: impl Into<String>,
        display_name: impl Into<String>,
        email: impl Into<String>,
    ) -> Self {
        Self {
            uid: uid.into(),
            display_name: display_name.into(),
            email: email.into(),
        }
    }

    pub fn hr_profile_id(&self) -> HrProfileId {
        HrProfileId(self.uid.clone())
    }

    pub fn candidate_id(&self) -> CandidateId {
        CandidateId(self.uid.clone())
    }
}
