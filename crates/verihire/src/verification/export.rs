//! Recruiter reporting: CSV export of the candidate list and dashboard counters.

use serde::Serialize;

use super::domain::{CandidateProfile, ProfileStatus, Score};

/// Fraud risk above this counts as high risk on the dashboard.
pub const HIGH_RISK_THRESHOLD: u8 = 20;

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("failed to write csv: {0}")]
    Csv(#[from] csv::Error),
    #[error("failed to flush csv: {0}")]
    Flush(String),
    #[error("csv output was not valid utf-8")]
    Encoding(#[from] std::string::FromUtf8Error),
}

#[derive(Serialize)]
struct CandidateRow<'a> {
    id: &'a str,
    name: &'a str,
    email: &'a str,
    role: &'a str,
    status: &'static str,
    trust: u8,
    risk: u8,
    shortlisted: bool,
    created_at: String,
}

impl<'a> From<&'a CandidateProfile> for CandidateRow<'a> {
    fn from(profile: &'a CandidateProfile) -> Self {
        Self {
            id: &profile.id.0,
            name: &profile.full_name,
            email: &profile.email,
            role: &profile.role,
            status: profile.profile_status.label(),
            trust: profile.trust_score.value(),
            risk: profile.fraud_risk_score.value(),
            shortlisted: profile.is_shortlisted,
            created_at: profile.created_at.to_rfc3339(),
        }
    }
}

/// Render candidates in the given order, header row first.
pub fn candidates_csv(candidates: &[CandidateProfile]) -> Result<String, ExportError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    if candidates.is_empty() {
        writer.write_record([
            "id",
            "name",
            "email",
            "role",
            "status",
            "trust",
            "risk",
            "shortlisted",
            "created_at",
        ])?;
    }
    for candidate in candidates {
        writer.serialize(CandidateRow::from(candidate))?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|err| ExportError::Flush(err.error().to_string()))?;
    Ok(String::from_utf8(bytes)?)
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardSummary {
    pub total: usize,
    pub verified: usize,
    pub rejected: usize,
    pub pending: usize,
    pub shortlisted: usize,
    pub high_risk: usize,
    /// Mean trust over candidates that left `pending_documents`; `None` when there are none.
    pub average_trust_score: Option<f64>,
}

impl DashboardSummary {
    pub fn from_candidates(candidates: &[CandidateProfile]) -> Self {
        let mut summary = Self {
            total: candidates.len(),
            ..Self::default()
        };
        let mut trust_total = 0u64;
        let mut scored = 0u64;

        for candidate in candidates {
            match candidate.profile_status {
                ProfileStatus::Verified => summary.verified += 1,
                ProfileStatus::Rejected => summary.rejected += 1,
                ProfileStatus::PendingDocuments => summary.pending += 1,
            }
            if candidate.is_shortlisted {
                summary.shortlisted += 1;
            }
            if candidate.fraud_risk_score > Score::new(HIGH_RISK_THRESHOLD).unwrap_or_default() {
                summary.high_risk += 1;
            }
            if candidate.profile_status != ProfileStatus::PendingDocuments {
                trust_total += u64::from(candidate.trust_score.value());
                scored += 1;
            }
        }

        if scored > 0 {
            let average = trust_total as f64 / scored as f64;
            summary.average_trust_score = Some((average * 10.0).round() / 10.0);
        }
        summary
    }
}
