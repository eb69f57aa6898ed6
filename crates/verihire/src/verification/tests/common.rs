use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::response::Response;
use chrono::Utc;
use serde_json::{json, Value};
use tokio::sync::{broadcast, Notify};

use crate::verification::domain::{
    AuditLogEntry, AuthenticatedUser, CandidateId, CandidateProfile, HrProfile, HrProfileId,
    ProfileStatus, Score,
};
use crate::verification::documents::DocumentSubmission;
use crate::verification::llm::{LanguageModel, LlmError, PromptRequest};
use crate::verification::prompts::{EXTRACTION_PROMPT_NAME, SCORING_PROMPT_NAME};
use crate::verification::shortlist::AutoShortlistRule;
use crate::verification::store::{
    CandidatePatch, DocumentStore, MemoryDocumentStore, StoreError, StoreEvent, WorkflowPatch,
};
use crate::verification::workflow::{StageStatus, VerificationWorkflow};
use crate::verification::VerificationService;

pub(super) const PDF_URI: &str = "data:application/pdf;base64,JVBERi0xLjQK";
pub(super) const PNG_URI: &str = "data:image/png;base64,iVBORw0KGgo=";

pub(super) enum Reply {
    Json(Value),
    Fail(&'static str),
    /// Never answers within any test timeout.
    Stall,
}

/// Blocks the first model call until released, so a run can be observed mid-flight.
#[derive(Default)]
pub(super) struct RunGate {
    pub(super) entered: Notify,
    pub(super) release: Notify,
}

/// Language model answering from a per-prompt queue of canned replies.
#[derive(Default)]
pub(super) struct ScriptedModel {
    replies: Mutex<HashMap<&'static str, VecDeque<Reply>>>,
    requests: Mutex<Vec<PromptRequest>>,
    gate: Mutex<Option<Arc<RunGate>>>,
}

impl ScriptedModel {
    pub(super) fn new() -> Self {
        Self::default()
    }

    pub(super) fn on_extraction(self, reply: Reply) -> Self {
        self.push(EXTRACTION_PROMPT_NAME, reply)
    }

    pub(super) fn on_scoring(self, reply: Reply) -> Self {
        self.push(SCORING_PROMPT_NAME, reply)
    }

    pub(super) fn gated(self, gate: Arc<RunGate>) -> Self {
        *self.gate.lock().expect("gate mutex poisoned") = Some(gate);
        self
    }

    pub(super) fn requests(&self) -> Vec<PromptRequest> {
        self.requests.lock().expect("request mutex poisoned").clone()
    }

    fn push(self, name: &'static str, reply: Reply) -> Self {
        self.replies
            .lock()
            .expect("reply mutex poisoned")
            .entry(name)
            .or_default()
            .push_back(reply);
        self
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn generate(&self, request: PromptRequest) -> Result<Value, LlmError> {
        let name = request.name;
        self.requests
            .lock()
            .expect("request mutex poisoned")
            .push(request);

        let gate = self.gate.lock().expect("gate mutex poisoned").take();
        if let Some(gate) = gate {
            gate.entered.notify_one();
            gate.release.notified().await;
        }

        let reply = self
            .replies
            .lock()
            .expect("reply mutex poisoned")
            .get_mut(name)
            .and_then(VecDeque::pop_front);
        match reply {
            Some(Reply::Json(value)) => Ok(value),
            Some(Reply::Fail(message)) => Err(LlmError::Transport(message.to_string())),
            Some(Reply::Stall) => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Err(LlmError::EmptyReply)
            }
            None => Err(LlmError::EmptyReply),
        }
    }
}

pub(super) fn period(company: &str, title: Option<&str>, start: &str, end: &str) -> Value {
    let mut row = json!({ "companyName": company, "startDate": start, "endDate": end });
    if let Some(title) = title {
        row["jobTitle"] = json!(title);
    }
    row
}

pub(super) fn extraction_reply(name: &str, id_proof_info: &str) -> Value {
    json!({
        "name": name,
        "resumeExperiences": [period("Acme Corp", Some("Software Engineer"), "2020-01-01", "2022-06-30")],
        "letterExperiences": [period("Acme Corp", None, "2020-01-01", "2022-06-30")],
        "idProofInfo": id_proof_info,
    })
}

pub(super) fn scoring_reply(trust: f64, risk: f64, mismatches: bool) -> Value {
    json!({
        "employmentGapsDetected": false,
        "mismatchesDetected": mismatches,
        "fraudRiskScore": risk,
        "trustScore": trust,
        "analysisSummary": "Resume and experience letter agree on Acme Corp tenure.",
    })
}

pub(super) fn consistent_model() -> ScriptedModel {
    ScriptedModel::new()
        .on_extraction(Reply::Json(extraction_reply(
            "Jordan Blake",
            "Name: Jordan Blake, DOB: 1990-04-12",
        )))
        .on_scoring(Reply::Json(scoring_reply(88.0, 9.0, false)))
}

pub(super) fn submission(with_id_proof: bool) -> DocumentSubmission {
    DocumentSubmission {
        resume: PDF_URI.to_string(),
        experience_letter: PDF_URI.to_string(),
        id_proof: with_id_proof.then(|| PNG_URI.to_string()),
    }
}

pub(super) fn recruiter() -> AuthenticatedUser {
    AuthenticatedUser::new("hr-1", "Morgan Lee", "morgan@example.com")
}

pub(super) fn seed_hr(store: &MemoryDocumentStore) -> AuthenticatedUser {
    let user = recruiter();
    store
        .create_hr_profile(HrProfile {
            id: user.hr_profile_id(),
            display_name: user.display_name.clone(),
            email: user.email.clone(),
            created_at: Utc::now(),
        })
        .expect("hr profile stored");
    user
}

pub(super) fn seed_candidate(
    store: &MemoryDocumentStore,
    id: &str,
    status: ProfileStatus,
    trust: u8,
    risk: u8,
) -> CandidateProfile {
    let mut profile = CandidateProfile::pending(
        CandidateId(id.to_string()),
        "Jordan Blake",
        format!("{id}@example.com"),
        "Backend Engineer",
        Utc::now(),
    );
    profile.profile_status = status;
    profile.trust_score = Score::new(trust).expect("score in range");
    profile.fraud_risk_score = Score::new(risk).expect("score in range");
    store.create_candidate(profile).expect("candidate stored")
}

pub(super) fn build_service(
    model: Arc<dyn LanguageModel>,
    stage_timeout: Duration,
) -> (
    Arc<VerificationService<MemoryDocumentStore>>,
    Arc<MemoryDocumentStore>,
) {
    let store = Arc::new(MemoryDocumentStore::default());
    let service = VerificationService::new(
        Arc::clone(&store),
        model,
        stage_timeout,
        AutoShortlistRule::default(),
    );
    (Arc::new(service), store)
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}

/// Poll until `check` holds; detached writes land on the blocking pool.
pub(super) async fn eventually<F, Fut>(mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..200 {
        if check().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}

/// Store whose every operation fails.
pub(super) struct UnavailableStore {
    events: broadcast::Sender<StoreEvent>,
}

impl Default for UnavailableStore {
    fn default() -> Self {
        let (events, _) = broadcast::channel(1);
        Self { events }
    }
}

fn offline<T>() -> Result<T, StoreError> {
    Err(StoreError::Unavailable("database offline".to_string()))
}

impl DocumentStore for UnavailableStore {
    fn create_candidate(&self, _profile: CandidateProfile) -> Result<CandidateProfile, StoreError> {
        offline()
    }

    fn merge_candidate(
        &self,
        _id: &CandidateId,
        _patch: CandidatePatch,
    ) -> Result<CandidateProfile, StoreError> {
        offline()
    }

    fn candidate(&self, _id: &CandidateId) -> Result<Option<CandidateProfile>, StoreError> {
        offline()
    }

    fn candidates(&self) -> Result<Vec<CandidateProfile>, StoreError> {
        offline()
    }

    fn merge_workflow(
        &self,
        _id: &CandidateId,
        _patch: WorkflowPatch,
    ) -> Result<VerificationWorkflow, StoreError> {
        offline()
    }

    fn workflow(&self, _id: &CandidateId) -> Result<Option<VerificationWorkflow>, StoreError> {
        offline()
    }

    fn append_audit(&self, _entry: AuditLogEntry) -> Result<(), StoreError> {
        offline()
    }

    fn audit_log(&self) -> Result<Vec<AuditLogEntry>, StoreError> {
        offline()
    }

    fn create_hr_profile(&self, _profile: HrProfile) -> Result<HrProfile, StoreError> {
        offline()
    }

    fn hr_profile(&self, _id: &HrProfileId) -> Result<Option<HrProfile>, StoreError> {
        offline()
    }

    fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }
}

type MergeHook = Box<dyn FnOnce(&MemoryDocumentStore) + Send>;

/// In-memory store with hooks for interleaving writes deterministically.
#[derive(Default)]
pub(super) struct InterleavingStore {
    inner: MemoryDocumentStore,
    completed_workflow_delay: Option<Duration>,
    fail_completed_workflow: bool,
    before_merge_candidate: Mutex<Option<MergeHook>>,
}

impl InterleavingStore {
    /// Completed-workflow writes sleep for `delay` before committing.
    pub(super) fn with_slow_completion(delay: Duration) -> Self {
        Self {
            completed_workflow_delay: Some(delay),
            ..Self::default()
        }
    }

    /// Completed-workflow writes fail; progress checkpoints still land.
    pub(super) fn with_failing_completion() -> Self {
        Self {
            fail_completed_workflow: true,
            ..Self::default()
        }
    }

    pub(super) fn inner(&self) -> &MemoryDocumentStore {
        &self.inner
    }

    /// Runs `hook` once, right before the next candidate merge is committed.
    pub(super) fn before_next_merge<F>(&self, hook: F)
    where
        F: FnOnce(&MemoryDocumentStore) + Send + 'static,
    {
        *self.before_merge_candidate.lock().expect("hook mutex") = Some(Box::new(hook));
    }
}

/// Hook body: a recruiter rejection committed straight to the store.
pub(super) fn reject_now(id: CandidateId) -> impl FnOnce(&MemoryDocumentStore) + Send + 'static {
    move |store| {
        store
            .merge_candidate(
                &id,
                CandidatePatch {
                    profile_status: Some(ProfileStatus::Rejected),
                    ..CandidatePatch::default()
                },
            )
            .expect("rejection stored");
    }
}

impl DocumentStore for InterleavingStore {
    fn create_candidate(&self, profile: CandidateProfile) -> Result<CandidateProfile, StoreError> {
        self.inner.create_candidate(profile)
    }

    fn merge_candidate(
        &self,
        id: &CandidateId,
        patch: CandidatePatch,
    ) -> Result<CandidateProfile, StoreError> {
        let hook = self.before_merge_candidate.lock().expect("hook mutex").take();
        if let Some(hook) = hook {
            hook(&self.inner);
        }
        self.inner.merge_candidate(id, patch)
    }

    fn candidate(&self, id: &CandidateId) -> Result<Option<CandidateProfile>, StoreError> {
        self.inner.candidate(id)
    }

    fn candidates(&self) -> Result<Vec<CandidateProfile>, StoreError> {
        self.inner.candidates()
    }

    fn merge_workflow(
        &self,
        id: &CandidateId,
        patch: WorkflowPatch,
    ) -> Result<VerificationWorkflow, StoreError> {
        if patch.overall_status == StageStatus::Completed {
            if self.fail_completed_workflow {
                return offline();
            }
            if let Some(delay) = self.completed_workflow_delay {
                std::thread::sleep(delay);
            }
        }
        self.inner.merge_workflow(id, patch)
    }

    fn workflow(&self, id: &CandidateId) -> Result<Option<VerificationWorkflow>, StoreError> {
        self.inner.workflow(id)
    }

    fn append_audit(&self, entry: AuditLogEntry) -> Result<(), StoreError> {
        self.inner.append_audit(entry)
    }

    fn audit_log(&self) -> Result<Vec<AuditLogEntry>, StoreError> {
        self.inner.audit_log()
    }

    fn create_hr_profile(&self, profile: HrProfile) -> Result<HrProfile, StoreError> {
        self.inner.create_hr_profile(profile)
    }

    fn hr_profile(&self, id: &HrProfileId) -> Result<Option<HrProfile>, StoreError> {
        self.inner.hr_profile(id)
    }

    fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.inner.subscribe()
    }
}
