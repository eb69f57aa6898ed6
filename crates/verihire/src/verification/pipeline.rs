//! Verification run orchestration.
//!
//! A run validates the uploads, then drives extraction and the combined scoring call
//! strictly in sequence. Only one run per candidate may be in flight. Any failure rolls
//! the tracked workflow back to idle and leaves the candidate's scores untouched.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};

use super::bridge::{PendingWrite, RecordBridge};
use super::documents::{CandidateDocuments, DocumentError, DocumentSubmission};
use super::domain::{CandidateId, CandidateProfile};
use super::extraction::ExtractionStage;
use super::llm::LanguageModel;
use super::schema::{ExtractionOutput, ScoringOutput};
use super::scoring::{ScoringInput, ScoringStage};
use super::stage::StageError;
use super::store::{DocumentStore, StoreError};
use super::workflow::{VerificationWorkflow, WorkflowError, WorkflowTracker};

/// Outcome of a successful run, as returned to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationReport {
    pub candidate_id: CandidateId,
    pub extraction: ExtractionOutput,
    pub scoring: ScoringOutput,
    pub workflow: VerificationWorkflow,
}

/// A finished run plus the write that persists its scores.
pub struct CompletedRun {
    pub report: VerificationReport,
    pub persisted: PendingWrite<CandidateProfile>,
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Documents(#[from] DocumentError),
    #[error("candidate {0} not found")]
    CandidateNotFound(CandidateId),
    #[error("a verification run for candidate {0} is already in progress")]
    AlreadyRunning(CandidateId),
    #[error(transparent)]
    Stage(#[from] StageError),
    #[error(transparent)]
    Workflow(#[from] WorkflowError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

pub struct VerificationPipeline<S> {
    extraction: ExtractionStage,
    scoring: ScoringStage,
    bridge: RecordBridge<S>,
    tracker: Arc<WorkflowTracker>,
    in_flight: Arc<Mutex<HashSet<CandidateId>>>,
}

impl<S> VerificationPipeline<S>
where
    S: DocumentStore + 'static,
{
    /// `timeout` bounds each language-model call separately.
    pub fn new(model: Arc<dyn LanguageModel>, timeout: Duration, bridge: RecordBridge<S>) -> Self {
        Self {
            extraction: ExtractionStage::new(Arc::clone(&model), timeout),
            scoring: ScoringStage::new(model, timeout),
            bridge,
            tracker: Arc::new(WorkflowTracker::default()),
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub fn tracker(&self) -> &Arc<WorkflowTracker> {
        &self.tracker
    }

    pub fn is_running(&self, id: &CandidateId) -> bool {
        lock(&self.in_flight).contains(id)
    }

    pub async fn run(
        &self,
        id: &CandidateId,
        submission: &DocumentSubmission,
    ) -> Result<CompletedRun, PipelineError> {
        let documents = CandidateDocuments::from_submission(submission)?;
        let candidate = self
            .bridge
            .candidate(id)?
            .ok_or_else(|| PipelineError::CandidateNotFound(id.clone()))?;
        let claim = RunClaim::acquire(&self.in_flight, id)
            .ok_or_else(|| PipelineError::AlreadyRunning(id.clone()))?;

        if self.tracker.snapshot(id).is_none() {
            if let Some(stored) = self.bridge.workflow(id)? {
                self.tracker.hydrate(stored);
            }
        }

        info!(candidate = %id, id_proof = documents.id_proof.is_some(), "verification run started");
        let workflow = self.tracker.begin(id, Utc::now());
        self.checkpoint(&workflow, None).await;

        match self.execute(&candidate, &documents).await {
            Ok(mut run) => {
                info!(
                    candidate = %id,
                    trust_score = run.report.scoring.trust_score.value(),
                    fraud_risk_score = run.report.scoring.fraud_risk_score.value(),
                    "verification run finished"
                );
                // The claim outlives the final write so a rerun cannot interleave with it.
                run.persisted = run.persisted.holding(claim);
                Ok(run)
            }
            Err(err) => {
                let workflow = self.tracker.abort(id, &err.to_string(), Utc::now());
                let note = workflow.latest_note().map(str::to_string);
                self.checkpoint(&workflow, note).await;
                warn!(candidate = %id, error = %err, "verification run aborted");
                Err(err)
            }
        }
    }

    /// Read model: live tracker state, else the persisted record, else an idle workflow.
    pub fn workflow(&self, id: &CandidateId) -> Result<VerificationWorkflow, PipelineError> {
        if let Some(workflow) = self.tracker.snapshot(id) {
            return Ok(workflow);
        }
        if let Some(workflow) = self.bridge.workflow(id)? {
            return Ok(workflow);
        }
        match self.bridge.candidate(id)? {
            Some(candidate) => Ok(VerificationWorkflow::idle(candidate.id, candidate.created_at)),
            None => Err(PipelineError::CandidateNotFound(id.clone())),
        }
    }

    async fn execute(
        &self,
        candidate: &CandidateProfile,
        documents: &CandidateDocuments,
    ) -> Result<CompletedRun, PipelineError> {
        let id = &candidate.id;

        let extraction = self.extraction.run(documents).await?;
        let workflow = self.tracker.extraction_completed(id, Utc::now())?;
        self.checkpoint(&workflow, None).await;

        let mut input = ScoringInput::from_extraction(&extraction);
        if input.candidate_name.trim().is_empty() {
            input.candidate_name = candidate.full_name.clone();
        }
        let scoring = self.scoring.run(&input).await?;

        let now = Utc::now();
        let workflow = self
            .tracker
            .scoring_completed(id, &scoring.analysis_summary, now)?;
        let persisted = self.bridge.record_verification(&workflow, &scoring, now);

        Ok(CompletedRun {
            report: VerificationReport {
                candidate_id: id.clone(),
                extraction,
                scoring,
                workflow,
            },
            persisted,
        })
    }

    /// Progress writes are awaited so they cannot land after the final write; their
    /// failures are already logged by the write task.
    async fn checkpoint(&self, workflow: &VerificationWorkflow, note: Option<String>) {
        let _ = self.bridge.persist_workflow(workflow, note).wait().await;
    }
}

/// Membership in the in-flight set, released on drop.
struct RunClaim {
    id: CandidateId,
    in_flight: Arc<Mutex<HashSet<CandidateId>>>,
}

impl RunClaim {
    fn acquire(in_flight: &Arc<Mutex<HashSet<CandidateId>>>, id: &CandidateId) -> Option<Self> {
        if !lock(in_flight).insert(id.clone()) {
            return None;
        }
        Some(Self {
            id: id.clone(),
            in_flight: Arc::clone(in_flight),
        })
    }
}

impl Drop for RunClaim {
    fn drop(&mut self) {
        lock(&self.in_flight).remove(&self.id);
    }
}

fn lock(set: &Mutex<HashSet<CandidateId>>) -> MutexGuard<'_, HashSet<CandidateId>> {
    set.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
