//! Merges pipeline results and recruiter decisions into persisted records.
//!
//! Writes after a verification run and manual decisions run as detached tasks. Each returns
//! a [`PendingWrite`] the caller may await to observe the outcome; dropping it leaves the
//! write running and failures are logged.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::domain::{
    AuditAction, AuditLogEntry, AuthenticatedUser, CandidateId, CandidateProfile, HrProfile,
    HrProfileId, ProfileStatus,
};
use super::schema::ScoringOutput;
use super::store::{CandidatePatch, DocumentStore, StoreError, StoreEvent, WorkflowPatch};
use super::workflow::VerificationWorkflow;

/// Handle to a detached store write.
#[must_use = "dropping the handle detaches the write; await it to observe failures"]
pub struct PendingWrite<T> {
    handle: JoinHandle<Result<T, StoreError>>,
}

impl<T: Send + 'static> PendingWrite<T> {
    pub(crate) fn spawn<F>(operation: &'static str, write: F) -> Self
    where
        F: FnOnce() -> Result<T, StoreError> + Send + 'static,
    {
        let handle = tokio::task::spawn_blocking(move || {
            let result = write();
            if let Err(err) = &result {
                warn!(operation, error = %err, "store write failed");
            }
            result
        });
        Self { handle }
    }

    pub async fn wait(self) -> Result<T, StoreError> {
        self.handle
            .await
            .map_err(|err| StoreError::Unavailable(format!("write task failed: {err}")))?
    }

    /// Keep `guard` alive until the write settles, whether or not anyone awaits it.
    pub(crate) fn holding<G: Send + 'static>(self, guard: G) -> Self {
        let handle = tokio::spawn(async move {
            let result = self.wait().await;
            drop(guard);
            result
        });
        Self { handle }
    }

    /// Let the write finish in the background.
    pub fn detach(self) {}
}

/// Details a recruiter supplies when inviting a candidate.
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize)]
pub struct Invitation {
    pub full_name: String,
    pub email: String,
    pub role: String,
}

pub struct RecordBridge<S> {
    store: Arc<S>,
}

impl<S> Clone for RecordBridge<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S> RecordBridge<S>
where
    S: DocumentStore + 'static,
{
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Create the caller's HR profile, or return the existing one.
    pub fn register_hr(
        &self,
        user: &AuthenticatedUser,
        now: DateTime<Utc>,
    ) -> Result<HrProfile, StoreError> {
        let id = user.hr_profile_id();
        if let Some(existing) = self.store.hr_profile(&id)? {
            return Ok(existing);
        }

        let profile = self.store.create_hr_profile(HrProfile {
            id: id.clone(),
            display_name: user.display_name.clone(),
            email: user.email.clone(),
            created_at: now,
        })?;
        self.store.append_audit(AuditLogEntry::new(
            id,
            AuditAction::SystemInitialized,
            format!("HR profile created for {}", user.email),
            now,
        ))?;
        info!(hr_profile = %profile.id, "hr profile registered");
        Ok(profile)
    }

    pub fn invite(
        &self,
        actor: &HrProfileId,
        invitation: Invitation,
        now: DateTime<Utc>,
    ) -> Result<CandidateProfile, StoreError> {
        let profile = self.store.create_candidate(CandidateProfile::pending(
            CandidateId::generate(),
            invitation.full_name.trim(),
            invitation.email.trim(),
            invitation.role.trim(),
            now,
        ))?;
        self.store.append_audit(
            AuditLogEntry::new(
                actor.clone(),
                AuditAction::InvitationSent,
                format!("Invitation sent to {} for {}", profile.email, profile.role),
                now,
            )
            .for_candidate(&profile),
        )?;
        info!(candidate = %profile.id, "candidate invited");
        Ok(profile)
    }

    /// Candidate self-registration, keyed by the identity uid. Idempotent.
    pub fn register_candidate(
        &self,
        user: &AuthenticatedUser,
        role: &str,
        now: DateTime<Utc>,
    ) -> Result<CandidateProfile, StoreError> {
        let id = user.candidate_id();
        if let Some(existing) = self.store.candidate(&id)? {
            return Ok(existing);
        }
        match self.store.create_candidate(CandidateProfile::pending(
            id.clone(),
            user.display_name.as_str(),
            user.email.as_str(),
            role.trim(),
            now,
        )) {
            Err(StoreError::Conflict) => self.store.candidate(&id)?.ok_or(StoreError::NotFound),
            other => other,
        }
    }

    pub fn candidate(&self, id: &CandidateId) -> Result<Option<CandidateProfile>, StoreError> {
        self.store.candidate(id)
    }

    pub fn candidates(&self) -> Result<Vec<CandidateProfile>, StoreError> {
        self.store.candidates()
    }

    pub fn workflow(&self, id: &CandidateId) -> Result<Option<VerificationWorkflow>, StoreError> {
        self.store.workflow(id)
    }

    pub fn audit_log(&self) -> Result<Vec<AuditLogEntry>, StoreError> {
        self.store.audit_log()
    }

    /// Mid-run progress; the note, if any, is appended to the stored history.
    pub fn persist_workflow(
        &self,
        workflow: &VerificationWorkflow,
        note: Option<String>,
    ) -> PendingWrite<VerificationWorkflow> {
        let store = Arc::clone(&self.store);
        let id = workflow.candidate_profile_id.clone();
        let patch = WorkflowPatch::from_workflow(workflow, note);
        PendingWrite::spawn("persist_workflow", move || store.merge_workflow(&id, patch))
    }

    /// Final write of a successful run: workflow first, then scores and status.
    /// A candidate still awaiting documents becomes verified; a manual decision that
    /// lands first is left alone.
    pub fn record_verification(
        &self,
        workflow: &VerificationWorkflow,
        scores: &ScoringOutput,
        now: DateTime<Utc>,
    ) -> PendingWrite<CandidateProfile> {
        let store = Arc::clone(&self.store);
        let id = workflow.candidate_profile_id.clone();
        let workflow_patch =
            WorkflowPatch::from_workflow(workflow, Some(scores.analysis_summary.clone()));
        let trust_score = scores.trust_score;
        let fraud_risk_score = scores.fraud_risk_score;

        PendingWrite::spawn("record_verification", move || {
            store.merge_workflow(&id, workflow_patch)?;
            let scores = CandidatePatch {
                trust_score: Some(trust_score),
                fraud_risk_score: Some(fraud_risk_score),
                updated_at: Some(now),
                ..CandidatePatch::default()
            };
            let verified = CandidatePatch {
                profile_status: Some(ProfileStatus::Verified),
                require_status: Some(ProfileStatus::PendingDocuments),
                ..scores.clone()
            };
            match store.merge_candidate(&id, verified) {
                Err(StoreError::PreconditionFailed) => store.merge_candidate(&id, scores),
                other => other,
            }
        })
    }

    /// Manual approval: verified, shortlisted, and one `VERIFIED` audit entry.
    pub fn approve(
        &self,
        actor: &HrProfileId,
        id: &CandidateId,
        notes: Option<String>,
        now: DateTime<Utc>,
    ) -> PendingWrite<CandidateProfile> {
        let patch = CandidatePatch {
            profile_status: Some(ProfileStatus::Verified),
            is_shortlisted: Some(true),
            updated_at: Some(now),
            ..CandidatePatch::default()
        };
        let notes = notes.unwrap_or_else(|| "Manually verified by recruiter".to_string());
        self.decide("approve", actor, id, patch, AuditAction::Verified, notes, now)
    }

    /// Manual rejection. A shortlist flag set earlier is not reverted.
    pub fn reject(
        &self,
        actor: &HrProfileId,
        id: &CandidateId,
        notes: Option<String>,
        now: DateTime<Utc>,
    ) -> PendingWrite<CandidateProfile> {
        let patch = CandidatePatch {
            profile_status: Some(ProfileStatus::Rejected),
            updated_at: Some(now),
            ..CandidatePatch::default()
        };
        let notes = notes.unwrap_or_else(|| "Manually rejected by recruiter".to_string());
        self.decide("reject", actor, id, patch, AuditAction::Rejected, notes, now)
    }

    #[allow(clippy::too_many_arguments)]
    fn decide(
        &self,
        operation: &'static str,
        actor: &HrProfileId,
        id: &CandidateId,
        patch: CandidatePatch,
        action: AuditAction,
        notes: String,
        now: DateTime<Utc>,
    ) -> PendingWrite<CandidateProfile> {
        let store = Arc::clone(&self.store);
        let actor = actor.clone();
        let id = id.clone();

        PendingWrite::spawn(operation, move || {
            let updated = store.merge_candidate(&id, patch)?;
            store.append_audit(
                AuditLogEntry::new(actor, action, notes, now).for_candidate(&updated),
            )?;
            info!(candidate = %updated.id, status = updated.profile_status.label(), "manual decision recorded");
            Ok(updated)
        })
    }

    /// Live candidate list, re-read whenever a candidate record changes.
    pub fn watch_candidates(&self) -> CandidateFeed<S> {
        CandidateFeed {
            store: Arc::clone(&self.store),
            events: self.store.subscribe(),
        }
    }
}

/// Push-based candidate list subscription.
pub struct CandidateFeed<S> {
    store: Arc<S>,
    events: broadcast::Receiver<StoreEvent>,
}

impl<S> CandidateFeed<S>
where
    S: DocumentStore,
{
    pub fn current(&self) -> Result<Vec<CandidateProfile>, StoreError> {
        self.store.candidates()
    }

    /// Wait for the next candidate change and return the refreshed list.
    /// `None` once the store stops publishing.
    pub async fn next(&mut self) -> Option<Result<Vec<CandidateProfile>, StoreError>> {
        loop {
            match self.events.recv().await {
                Ok(event) if event.touches_candidates() => return Some(self.store.candidates()),
                Ok(_) => continue,
                Err(RecvError::Lagged(_)) => return Some(self.store.candidates()),
                Err(RecvError::Closed) => return None,
            }
        }
    }
}
