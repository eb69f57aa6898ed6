//! Document-store collaborator.
//!
//! Collections mirror the hosted store: `candidate_profiles/{id}`, the workflow
//! sub-resource under each candidate, `hr_profiles/{id}`, and the append-only
//! `audit_logs`. Writes are merge-writes: only the fields a patch names change.

mod memory;

pub use memory::MemoryDocumentStore;

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;

use super::domain::{
    AuditLogEntry, CandidateId, CandidateProfile, HrProfile, HrProfileId, ProfileStatus, Score,
};
use super::workflow::{StageStatus, VerificationWorkflow, WorkflowStages};

/// Storage abstraction so the verification services can run against any backend.
pub trait DocumentStore: Send + Sync {
    fn create_candidate(&self, profile: CandidateProfile) -> Result<CandidateProfile, StoreError>;
    fn merge_candidate(
        &self,
        id: &CandidateId,
        patch: CandidatePatch,
    ) -> Result<CandidateProfile, StoreError>;
    fn candidate(&self, id: &CandidateId) -> Result<Option<CandidateProfile>, StoreError>;
    /// Every candidate, newest `created_at` first.
    fn candidates(&self) -> Result<Vec<CandidateProfile>, StoreError>;

    /// Create-or-update the workflow slot; notes in the patch are appended.
    fn merge_workflow(
        &self,
        id: &CandidateId,
        patch: WorkflowPatch,
    ) -> Result<VerificationWorkflow, StoreError>;
    fn workflow(&self, id: &CandidateId) -> Result<Option<VerificationWorkflow>, StoreError>;

    fn append_audit(&self, entry: AuditLogEntry) -> Result<(), StoreError>;
    /// Every audit entry, newest `timestamp` first.
    fn audit_log(&self) -> Result<Vec<AuditLogEntry>, StoreError>;

    fn create_hr_profile(&self, profile: HrProfile) -> Result<HrProfile, StoreError>;
    fn hr_profile(&self, id: &HrProfileId) -> Result<Option<HrProfile>, StoreError>;

    /// Push notifications for every committed write.
    fn subscribe(&self) -> broadcast::Receiver<StoreEvent>;
}

/// Change notification published after a write commits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEvent {
    CandidateChanged(CandidateId),
    WorkflowChanged(CandidateId),
    AuditAppended(String),
    HrProfileCreated(HrProfileId),
}

impl StoreEvent {
    pub fn touches_candidates(&self) -> bool {
        matches!(self, StoreEvent::CandidateChanged(_))
    }
}

/// Fields to merge into a candidate profile. `None` leaves the stored value untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CandidatePatch {
    pub full_name: Option<String>,
    pub email: Option<String>,
    pub role: Option<String>,
    pub profile_status: Option<ProfileStatus>,
    pub trust_score: Option<Score>,
    pub fraud_risk_score: Option<Score>,
    pub is_shortlisted: Option<bool>,
    pub updated_at: Option<DateTime<Utc>>,
    /// Compare-and-set guard: fail with `PreconditionFailed` unless the stored status matches.
    pub require_status: Option<ProfileStatus>,
    /// Compare-and-set guard: fail with `PreconditionFailed` if the candidate is already shortlisted.
    pub require_unshortlisted: bool,
}

impl CandidatePatch {
    /// Backends check this under the same lock as [`CandidatePatch::apply`].
    pub fn precondition_holds(&self, profile: &CandidateProfile) -> bool {
        let status_ok = self
            .require_status
            .map_or(true, |status| profile.profile_status == status);
        status_ok && !(self.require_unshortlisted && profile.is_shortlisted)
    }

    pub fn apply(&self, profile: &mut CandidateProfile) {
        if let Some(full_name) = &self.full_name {
            profile.full_name = full_name.clone();
        }
        if let Some(email) = &self.email {
            profile.email = email.clone();
        }
        if let Some(role) = &self.role {
            profile.role = role.clone();
        }
        if let Some(status) = self.profile_status {
            profile.profile_status = status;
        }
        if let Some(score) = self.trust_score {
            profile.trust_score = score;
        }
        if let Some(score) = self.fraud_risk_score {
            profile.fraud_risk_score = score;
        }
        if let Some(shortlisted) = self.is_shortlisted {
            profile.is_shortlisted = shortlisted;
        }
        if let Some(updated_at) = self.updated_at {
            profile.updated_at = updated_at;
        }
    }
}

/// Workflow fields to merge; `append_notes` extends the stored note history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkflowPatch {
    pub overall_status: StageStatus,
    pub stages: WorkflowStages,
    pub last_updated_at: DateTime<Utc>,
    pub append_notes: Vec<String>,
}

impl WorkflowPatch {
    pub fn from_workflow(workflow: &VerificationWorkflow, note: Option<String>) -> Self {
        Self {
            overall_status: workflow.overall_status,
            stages: workflow.stages,
            last_updated_at: workflow.last_updated_at,
            append_notes: note.into_iter().collect(),
        }
    }

    pub fn apply(self, workflow: &mut VerificationWorkflow) {
        workflow.overall_status = self.overall_status;
        workflow.stages = self.stages;
        workflow.last_updated_at = self.last_updated_at;
        workflow.system_notes.extend(self.append_notes);
    }
}

/// Error enumeration for store failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("write precondition failed")]
    PreconditionFailed,
    #[error("store unavailable: {0}")]
    Unavailable(String),
}
