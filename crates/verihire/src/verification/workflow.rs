//! Per-candidate verification state machine.
//!
//! Four tracked stages run strictly in order. Extraction is one model call; comparison,
//! fraud, and scoring share the second call and complete together.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::domain::CandidateId;

/// Fixed slot under which the workflow sub-resource is stored.
pub const WORKFLOW_SLOT: &str = "main";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    #[default]
    Idle,
    Processing,
    Completed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Extraction,
    Comparison,
    Fraud,
    Scoring,
}

impl PipelineStage {
    pub const ALL: [PipelineStage; 4] = [
        PipelineStage::Extraction,
        PipelineStage::Comparison,
        PipelineStage::Fraud,
        PipelineStage::Scoring,
    ];

    pub const fn label(self) -> &'static str {
        match self {
            PipelineStage::Extraction => "extraction",
            PipelineStage::Comparison => "comparison",
            PipelineStage::Fraud => "fraud",
            PipelineStage::Scoring => "scoring",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowStages {
    pub extraction: StageStatus,
    pub comparison: StageStatus,
    pub fraud: StageStatus,
    pub scoring: StageStatus,
}

impl WorkflowStages {
    pub fn get(&self, stage: PipelineStage) -> StageStatus {
        match stage {
            PipelineStage::Extraction => self.extraction,
            PipelineStage::Comparison => self.comparison,
            PipelineStage::Fraud => self.fraud,
            PipelineStage::Scoring => self.scoring,
        }
    }

    fn set(&mut self, stage: PipelineStage, status: StageStatus) {
        match stage {
            PipelineStage::Extraction => self.extraction = status,
            PipelineStage::Comparison => self.comparison = status,
            PipelineStage::Fraud => self.fraud = status,
            PipelineStage::Scoring => self.scoring = status,
        }
    }

    /// No stage is active or done while an earlier one is unfinished.
    pub fn is_ordered(&self) -> bool {
        let mut earlier_done = true;
        for stage in PipelineStage::ALL {
            let status = self.get(stage);
            if status != StageStatus::Idle && !earlier_done {
                return false;
            }
            earlier_done = status == StageStatus::Completed;
        }
        true
    }

    pub fn overall(&self) -> StageStatus {
        let statuses = PipelineStage::ALL.map(|stage| self.get(stage));
        if statuses.iter().all(|status| *status == StageStatus::Completed) {
            StageStatus::Completed
        } else if statuses.iter().all(|status| *status == StageStatus::Idle) {
            StageStatus::Idle
        } else {
            StageStatus::Processing
        }
    }
}

/// Workflow record (`candidate_profiles/{id}/verification_workflows/main`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationWorkflow {
    pub candidate_profile_id: CandidateId,
    pub overall_status: StageStatus,
    pub stages: WorkflowStages,
    pub last_updated_at: DateTime<Utc>,
    /// Narrative notes, oldest first.
    pub system_notes: Vec<String>,
}

impl VerificationWorkflow {
    pub fn idle(candidate_profile_id: CandidateId, now: DateTime<Utc>) -> Self {
        Self {
            candidate_profile_id,
            overall_status: StageStatus::Idle,
            stages: WorkflowStages::default(),
            last_updated_at: now,
            system_notes: Vec::new(),
        }
    }

    /// A new run invalidates whatever the previous run left behind.
    pub fn begin_run(&mut self, now: DateTime<Utc>) {
        self.stages = WorkflowStages::default();
        self.stages.set(PipelineStage::Extraction, StageStatus::Processing);
        self.touch(now);
    }

    pub fn complete_extraction(&mut self, now: DateTime<Utc>) -> Result<(), WorkflowError> {
        self.expect(PipelineStage::Extraction, StageStatus::Processing)?;
        self.stages.set(PipelineStage::Extraction, StageStatus::Completed);
        self.stages.set(PipelineStage::Comparison, StageStatus::Processing);
        self.touch(now);
        Ok(())
    }

    /// The combined call covers comparison, fraud, and scoring at once.
    pub fn complete_scoring(
        &mut self,
        summary: &str,
        now: DateTime<Utc>,
    ) -> Result<(), WorkflowError> {
        self.expect(PipelineStage::Extraction, StageStatus::Completed)?;
        self.expect(PipelineStage::Comparison, StageStatus::Processing)?;
        for stage in [
            PipelineStage::Comparison,
            PipelineStage::Fraud,
            PipelineStage::Scoring,
        ] {
            self.stages.set(stage, StageStatus::Completed);
        }
        self.system_notes.push(summary.to_string());
        self.touch(now);
        Ok(())
    }

    /// Roll every stage back to idle; no partial progress survives a failure.
    pub fn abort(&mut self, reason: &str, now: DateTime<Utc>) {
        self.stages = WorkflowStages::default();
        self.system_notes.push(format!("Verification aborted: {reason}"));
        self.touch(now);
    }

    pub fn latest_note(&self) -> Option<&str> {
        self.system_notes.last().map(String::as_str)
    }

    fn expect(&self, stage: PipelineStage, status: StageStatus) -> Result<(), WorkflowError> {
        let found = self.stages.get(stage);
        if found == status {
            Ok(())
        } else {
            Err(WorkflowError::IllegalTransition {
                stage,
                expected: status,
                found,
            })
        }
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        self.overall_status = self.stages.overall();
        self.last_updated_at = now;
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WorkflowError {
    #[error("stage {} expected {expected:?} but was {found:?}", .stage.label())]
    IllegalTransition {
        stage: PipelineStage,
        expected: StageStatus,
        found: StageStatus,
    },
}

/// In-memory read model of every candidate's workflow, shared with the HTTP layer.
#[derive(Debug, Default)]
pub struct WorkflowTracker {
    workflows: Mutex<HashMap<CandidateId, VerificationWorkflow>>,
}

impl WorkflowTracker {
    pub fn snapshot(&self, id: &CandidateId) -> Option<VerificationWorkflow> {
        self.lock().get(id).cloned()
    }

    /// Seed from a persisted record so history notes carry over into the next run.
    pub fn hydrate(&self, workflow: VerificationWorkflow) {
        self.lock()
            .entry(workflow.candidate_profile_id.clone())
            .or_insert(workflow);
    }

    pub fn begin(&self, id: &CandidateId, now: DateTime<Utc>) -> VerificationWorkflow {
        let mut guard = self.lock();
        let workflow = guard
            .entry(id.clone())
            .or_insert_with(|| VerificationWorkflow::idle(id.clone(), now));
        workflow.begin_run(now);
        workflow.clone()
    }

    pub fn extraction_completed(
        &self,
        id: &CandidateId,
        now: DateTime<Utc>,
    ) -> Result<VerificationWorkflow, WorkflowError> {
        self.apply(id, now, |workflow| workflow.complete_extraction(now))
    }

    pub fn scoring_completed(
        &self,
        id: &CandidateId,
        summary: &str,
        now: DateTime<Utc>,
    ) -> Result<VerificationWorkflow, WorkflowError> {
        self.apply(id, now, |workflow| workflow.complete_scoring(summary, now))
    }

    pub fn abort(&self, id: &CandidateId, reason: &str, now: DateTime<Utc>) -> VerificationWorkflow {
        let mut guard = self.lock();
        let workflow = guard
            .entry(id.clone())
            .or_insert_with(|| VerificationWorkflow::idle(id.clone(), now));
        workflow.abort(reason, now);
        workflow.clone()
    }

    fn apply<F>(
        &self,
        id: &CandidateId,
        now: DateTime<Utc>,
        transition: F,
    ) -> Result<VerificationWorkflow, WorkflowError>
    where
        F: FnOnce(&mut VerificationWorkflow) -> Result<(), WorkflowError>,
    {
        let mut guard = self.lock();
        let workflow = guard
            .entry(id.clone())
            .or_insert_with(|| VerificationWorkflow::idle(id.clone(), now));
        transition(workflow)?;
        Ok(workflow.clone())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<CandidateId, VerificationWorkflow>> {
        self.workflows
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
