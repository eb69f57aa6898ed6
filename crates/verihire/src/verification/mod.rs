//! Candidate verification: document intake, the two-call analysis pipeline, workflow
//! tracking, record persistence, and auto-shortlisting.

pub mod auth;
pub mod bridge;
pub mod documents;
pub mod domain;
pub mod export;
pub mod extraction;
pub mod llm;
pub mod pipeline;
pub(crate) mod prompts;
pub mod router;
pub mod schema;
pub mod scoring;
pub mod service;
pub mod shortlist;
pub(crate) mod stage;
pub mod store;
pub mod workflow;

#[cfg(test)]
mod tests;

pub use auth::{AuthContext, AuthorizationError, Role, Session, Subscription};
pub use bridge::{CandidateFeed, Invitation, PendingWrite, RecordBridge};
pub use documents::{
    CandidateDocuments, DocumentError, DocumentKind, DocumentPayload, DocumentSubmission,
};
pub use domain::{
    AuditAction, AuditLogEntry, AuthenticatedUser, CandidateId, CandidateProfile, EmploymentPeriod,
    EndDate, HrProfile, HrProfileId, ProfileStatus, Score,
};
pub use export::{candidates_csv, DashboardSummary, ExportError};
pub use llm::{LanguageModel, LlmError, MediaPart, OpenAiChatModel, PromptRequest};
pub use pipeline::{CompletedRun, PipelineError, VerificationPipeline, VerificationReport};
pub use prompts::{CERTIFICATE_PLACEHOLDER, EXTRACTION_PROMPT_NAME, SCORING_PROMPT_NAME};
pub use router::verification_router;
pub use schema::{ExtractionOutput, SchemaError, ScoringOutput};
pub use service::{VerificationService, VerificationServiceError};
pub use shortlist::{
    AutoShortlistRule, RuleError, RuleState, ShortlistEvaluator, ShortlistSettings,
    ShortlistWatcher,
};
pub use stage::{StageError, StageKind};
pub use store::{DocumentStore, MemoryDocumentStore, StoreError, StoreEvent};
pub use workflow::{
    PipelineStage, StageStatus, VerificationWorkflow, WorkflowError, WorkflowTracker,
};
