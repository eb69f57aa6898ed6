//! Role-checked facade over the verification components, used by the HTTP router and the CLI.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::debug;

use super::auth::{require_hr, AuthorizationError};
use super::bridge::{Invitation, PendingWrite, RecordBridge};
use super::documents::DocumentSubmission;
use super::domain::{AuditLogEntry, AuthenticatedUser, CandidateId, CandidateProfile, HrProfile};
use super::export::{candidates_csv, DashboardSummary, ExportError};
use super::llm::LanguageModel;
use super::pipeline::{CompletedRun, PipelineError, VerificationPipeline};
use super::shortlist::{
    AutoShortlistRule, RuleError, ShortlistEvaluator, ShortlistSettings, ShortlistWatcher,
};
use super::store::{DocumentStore, StoreError};
use super::workflow::VerificationWorkflow;

#[derive(Debug, thiserror::Error)]
pub enum VerificationServiceError {
    #[error(transparent)]
    Authorization(#[from] AuthorizationError),
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Rule(#[from] RuleError),
    #[error(transparent)]
    Export(#[from] ExportError),
    #[error("{0}")]
    Invalid(String),
    #[error("candidate {0} not found")]
    CandidateNotFound(CandidateId),
}

/// Service composing the record bridge, pipeline, and shortlist settings.
pub struct VerificationService<S> {
    bridge: RecordBridge<S>,
    pipeline: VerificationPipeline<S>,
    settings: ShortlistSettings,
}

impl<S> VerificationService<S>
where
    S: DocumentStore + 'static,
{
    pub fn new(
        store: Arc<S>,
        model: Arc<dyn LanguageModel>,
        stage_timeout: Duration,
        rule: AutoShortlistRule,
    ) -> Self {
        let bridge = RecordBridge::new(store);
        let pipeline = VerificationPipeline::new(model, stage_timeout, bridge.clone());
        Self {
            bridge,
            pipeline,
            settings: ShortlistSettings::new(rule),
        }
    }

    pub fn store(&self) -> &Arc<S> {
        self.bridge.store()
    }

    pub fn pipeline(&self) -> &VerificationPipeline<S> {
        &self.pipeline
    }

    pub fn settings(&self) -> &ShortlistSettings {
        &self.settings
    }

    /// Start the reactive auto-shortlist evaluator for this service's store and rule.
    pub fn spawn_shortlist_watcher(&self) -> ShortlistWatcher {
        ShortlistEvaluator::new(Arc::clone(self.bridge.store())).spawn_reactive(&self.settings)
    }

    pub fn register_hr(&self, user: &AuthenticatedUser) -> Result<HrProfile, VerificationServiceError> {
        Ok(self.bridge.register_hr(user, Utc::now())?)
    }

    pub fn invite(
        &self,
        user: &AuthenticatedUser,
        invitation: Invitation,
    ) -> Result<CandidateProfile, VerificationServiceError> {
        let hr = self.authorize_hr(user)?;
        for (field, value) in [
            ("full_name", &invitation.full_name),
            ("email", &invitation.email),
            ("role", &invitation.role),
        ] {
            if value.trim().is_empty() {
                return Err(VerificationServiceError::Invalid(format!("{field} is required")));
            }
        }
        if !invitation.email.contains('@') {
            return Err(VerificationServiceError::Invalid(
                "email must be an address".to_string(),
            ));
        }
        Ok(self.bridge.invite(&hr.id, invitation, Utc::now())?)
    }

    pub fn register_candidate(
        &self,
        user: &AuthenticatedUser,
        role: &str,
    ) -> Result<CandidateProfile, VerificationServiceError> {
        Ok(self.bridge.register_candidate(user, role, Utc::now())?)
    }

    pub fn candidate(
        &self,
        user: &AuthenticatedUser,
        id: &CandidateId,
    ) -> Result<CandidateProfile, VerificationServiceError> {
        self.authorize_candidate_access(user, id)?;
        self.bridge
            .candidate(id)?
            .ok_or_else(|| VerificationServiceError::CandidateNotFound(id.clone()))
    }

    pub fn candidates(
        &self,
        user: &AuthenticatedUser,
    ) -> Result<Vec<CandidateProfile>, VerificationServiceError> {
        self.authorize_hr(user)?;
        Ok(self.bridge.candidates()?)
    }

    pub fn export_csv(&self, user: &AuthenticatedUser) -> Result<String, VerificationServiceError> {
        let candidates = self.candidates(user)?;
        Ok(candidates_csv(&candidates)?)
    }

    pub fn dashboard(
        &self,
        user: &AuthenticatedUser,
    ) -> Result<DashboardSummary, VerificationServiceError> {
        let candidates = self.candidates(user)?;
        Ok(DashboardSummary::from_candidates(&candidates))
    }

    /// Candidates may verify themselves; recruiters may verify anyone.
    pub async fn verify(
        &self,
        user: &AuthenticatedUser,
        id: &CandidateId,
        submission: &DocumentSubmission,
    ) -> Result<CompletedRun, VerificationServiceError> {
        self.authorize_candidate_access(user, id)?;
        Ok(self.pipeline.run(id, submission).await?)
    }

    pub fn workflow(
        &self,
        user: &AuthenticatedUser,
        id: &CandidateId,
    ) -> Result<VerificationWorkflow, VerificationServiceError> {
        self.authorize_candidate_access(user, id)?;
        Ok(self.pipeline.workflow(id)?)
    }

    pub fn approve(
        &self,
        user: &AuthenticatedUser,
        id: &CandidateId,
        notes: Option<String>,
    ) -> Result<PendingWrite<CandidateProfile>, VerificationServiceError> {
        let hr = self.authorize_hr(user)?;
        self.ensure_candidate(id)?;
        Ok(self.bridge.approve(&hr.id, id, notes, Utc::now()))
    }

    pub fn reject(
        &self,
        user: &AuthenticatedUser,
        id: &CandidateId,
        notes: Option<String>,
    ) -> Result<PendingWrite<CandidateProfile>, VerificationServiceError> {
        let hr = self.authorize_hr(user)?;
        self.ensure_candidate(id)?;
        Ok(self.bridge.reject(&hr.id, id, notes, Utc::now()))
    }

    pub fn audit_log(
        &self,
        user: &AuthenticatedUser,
    ) -> Result<Vec<AuditLogEntry>, VerificationServiceError> {
        self.authorize_hr(user)?;
        Ok(self.bridge.audit_log()?)
    }

    pub fn shortlist_rule(
        &self,
        user: &AuthenticatedUser,
    ) -> Result<AutoShortlistRule, VerificationServiceError> {
        self.authorize_hr(user)?;
        Ok(self.settings.rule())
    }

    pub fn set_shortlist_rule(
        &self,
        user: &AuthenticatedUser,
        min_trust_score: u8,
        max_risk_score: u8,
    ) -> Result<AutoShortlistRule, VerificationServiceError> {
        let hr = self.authorize_hr(user)?;
        let rule = AutoShortlistRule::new(min_trust_score, max_risk_score)?;
        Ok(self
            .settings
            .save(self.bridge.store().as_ref(), &hr.id, rule, Utc::now())?)
    }

    fn authorize_hr(&self, user: &AuthenticatedUser) -> Result<HrProfile, AuthorizationError> {
        require_hr(self.bridge.store().as_ref(), user)
    }

    fn authorize_candidate_access(
        &self,
        user: &AuthenticatedUser,
        id: &CandidateId,
    ) -> Result<(), AuthorizationError> {
        if user.candidate_id() == *id {
            return Ok(());
        }
        self.authorize_hr(user).map(|hr| {
            debug!(hr_profile = %hr.id, candidate = %id, "recruiter accessing candidate");
        })
    }

    fn ensure_candidate(&self, id: &CandidateId) -> Result<(), VerificationServiceError> {
        match self.bridge.candidate(id)? {
            Some(_) => Ok(()),
            None => Err(VerificationServiceError::CandidateNotFound(id.clone())),
        }
    }
}
