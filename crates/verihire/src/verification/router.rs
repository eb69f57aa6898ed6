use std::sync::Arc;

use axum::{
    async_trait,
    extract::{FromRequestParts, Path, State},
    http::{header, request::Parts, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use tracing::warn;

use super::auth::AuthorizationError;
use super::bridge::Invitation;
use super::documents::DocumentSubmission;
use super::domain::{AuthenticatedUser, CandidateId};
use super::pipeline::PipelineError;
use super::service::{VerificationService, VerificationServiceError};
use super::store::DocumentStore;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_NAME_HEADER: &str = "x-user-name";
pub const USER_EMAIL_HEADER: &str = "x-user-email";

/// Identity forwarded by the identity provider's gateway.
#[derive(Debug, Clone)]
pub struct Caller(pub AuthenticatedUser);

#[async_trait]
impl<St> FromRequestParts<St> for Caller
where
    St: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, _state: &St) -> Result<Self, Self::Rejection> {
        let uid = header_value(&parts.headers, USER_ID_HEADER)
            .filter(|uid| !uid.is_empty())
            .ok_or_else(|| {
                let payload = json!({ "error": "missing x-user-id header" });
                (StatusCode::UNAUTHORIZED, Json(payload)).into_response()
            })?;
        let display_name = header_value(&parts.headers, USER_NAME_HEADER).unwrap_or_default();
        let email = header_value(&parts.headers, USER_EMAIL_HEADER).unwrap_or_default();
        Ok(Caller(AuthenticatedUser::new(uid, display_name, email)))
    }
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.trim().to_string())
}

#[derive(Debug, Deserialize)]
pub struct RegistrationRequest {
    pub role: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct DecisionRequest {
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleRequest {
    pub min_trust_score: u8,
    pub max_risk_score: u8,
}

/// Router builder exposing recruiter and candidate endpoints.
pub fn verification_router<S>(service: Arc<VerificationService<S>>) -> Router
where
    S: DocumentStore + 'static,
{
    Router::new()
        .route("/api/v1/hr/profile", post(register_hr_handler::<S>))
        .route(
            "/api/v1/candidates",
            post(invite_handler::<S>).get(list_handler::<S>),
        )
        .route("/api/v1/candidates/export", get(export_handler::<S>))
        .route("/api/v1/candidates/register", post(register_candidate_handler::<S>))
        .route("/api/v1/candidates/:candidate_id", get(candidate_handler::<S>))
        .route(
            "/api/v1/candidates/:candidate_id/verification",
            post(verify_handler::<S>).get(workflow_handler::<S>),
        )
        .route(
            "/api/v1/candidates/:candidate_id/approve",
            post(approve_handler::<S>),
        )
        .route(
            "/api/v1/candidates/:candidate_id/reject",
            post(reject_handler::<S>),
        )
        .route("/api/v1/dashboard", get(dashboard_handler::<S>))
        .route("/api/v1/audit-logs", get(audit_log_handler::<S>))
        .route(
            "/api/v1/shortlist-rule",
            get(get_rule_handler::<S>).put(put_rule_handler::<S>),
        )
        .with_state(service)
}

type ServiceState<S> = State<Arc<VerificationService<S>>>;

pub(crate) async fn register_hr_handler<S: DocumentStore + 'static>(
    State(service): ServiceState<S>,
    Caller(user): Caller,
) -> Response {
    match service.register_hr(&user) {
        Ok(profile) => (StatusCode::CREATED, Json(profile)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn invite_handler<S: DocumentStore + 'static>(
    State(service): ServiceState<S>,
    Caller(user): Caller,
    Json(invitation): Json<Invitation>,
) -> Response {
    match service.invite(&user, invitation) {
        Ok(profile) => (StatusCode::CREATED, Json(profile)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn list_handler<S: DocumentStore + 'static>(
    State(service): ServiceState<S>,
    Caller(user): Caller,
) -> Response {
    match service.candidates(&user) {
        Ok(candidates) => (StatusCode::OK, Json(candidates)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn export_handler<S: DocumentStore + 'static>(
    State(service): ServiceState<S>,
    Caller(user): Caller,
) -> Response {
    match service.export_csv(&user) {
        Ok(csv) => (
            StatusCode::OK,
            [
                (header::CONTENT_TYPE, mime::TEXT_CSV.as_ref()),
                (
                    header::CONTENT_DISPOSITION,
                    "attachment; filename=\"candidates.csv\"",
                ),
            ],
            csv,
        )
            .into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn dashboard_handler<S: DocumentStore + 'static>(
    State(service): ServiceState<S>,
    Caller(user): Caller,
) -> Response {
    match service.dashboard(&user) {
        Ok(summary) => (StatusCode::OK, Json(summary)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn register_candidate_handler<S: DocumentStore + 'static>(
    State(service): ServiceState<S>,
    Caller(user): Caller,
    Json(request): Json<RegistrationRequest>,
) -> Response {
    match service.register_candidate(&user, &request.role) {
        Ok(profile) => (StatusCode::CREATED, Json(profile)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn candidate_handler<S: DocumentStore + 'static>(
    State(service): ServiceState<S>,
    Caller(user): Caller,
    Path(candidate_id): Path<String>,
) -> Response {
    match service.candidate(&user, &CandidateId(candidate_id)) {
        Ok(profile) => (StatusCode::OK, Json(profile)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn verify_handler<S: DocumentStore + 'static>(
    State(service): ServiceState<S>,
    Caller(user): Caller,
    Path(candidate_id): Path<String>,
    Json(submission): Json<DocumentSubmission>,
) -> Response {
    let id = CandidateId(candidate_id);
    match service.verify(&user, &id, &submission).await {
        Ok(run) => {
            let payload = match run.persisted.wait().await {
                Ok(candidate) => json!({
                    "report": run.report,
                    "candidate": candidate,
                }),
                Err(err) => {
                    warn!(candidate = %id, error = %err, "verification result was not persisted");
                    json!({
                        "report": run.report,
                        "candidate": null,
                        "persistError": err.to_string(),
                    })
                }
            };
            (StatusCode::OK, Json(payload)).into_response()
        }
        Err(err) => error_response(err),
    }
}

pub(crate) async fn workflow_handler<S: DocumentStore + 'static>(
    State(service): ServiceState<S>,
    Caller(user): Caller,
    Path(candidate_id): Path<String>,
) -> Response {
    match service.workflow(&user, &CandidateId(candidate_id)) {
        Ok(workflow) => (StatusCode::OK, Json(workflow)).into_response(),
        Err(err) => error_response(err),
    }
}

/// Decisions are accepted optimistically; the write finishes in the background.
pub(crate) async fn approve_handler<S: DocumentStore + 'static>(
    State(service): ServiceState<S>,
    Caller(user): Caller,
    Path(candidate_id): Path<String>,
    request: Option<Json<DecisionRequest>>,
) -> Response {
    let id = CandidateId(candidate_id);
    let notes = request.and_then(|Json(request)| request.notes);
    match service.approve(&user, &id, notes) {
        Ok(write) => {
            write.detach();
            let payload = json!({ "candidateId": id, "decision": "approved" });
            (StatusCode::ACCEPTED, Json(payload)).into_response()
        }
        Err(err) => error_response(err),
    }
}

pub(crate) async fn reject_handler<S: DocumentStore + 'static>(
    State(service): ServiceState<S>,
    Caller(user): Caller,
    Path(candidate_id): Path<String>,
    request: Option<Json<DecisionRequest>>,
) -> Response {
    let id = CandidateId(candidate_id);
    let notes = request.and_then(|Json(request)| request.notes);
    match service.reject(&user, &id, notes) {
        Ok(write) => {
            write.detach();
            let payload = json!({ "candidateId": id, "decision": "rejected" });
            (StatusCode::ACCEPTED, Json(payload)).into_response()
        }
        Err(err) => error_response(err),
    }
}

pub(crate) async fn audit_log_handler<S: DocumentStore + 'static>(
    State(service): ServiceState<S>,
    Caller(user): Caller,
) -> Response {
    match service.audit_log(&user) {
        Ok(entries) => (StatusCode::OK, Json(entries)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn get_rule_handler<S: DocumentStore + 'static>(
    State(service): ServiceState<S>,
    Caller(user): Caller,
) -> Response {
    match service.shortlist_rule(&user) {
        Ok(rule) => (StatusCode::OK, Json(rule)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn put_rule_handler<S: DocumentStore + 'static>(
    State(service): ServiceState<S>,
    Caller(user): Caller,
    Json(request): Json<RuleRequest>,
) -> Response {
    match service.set_shortlist_rule(&user, request.min_trust_score, request.max_risk_score) {
        Ok(rule) => (StatusCode::OK, Json(rule)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) fn error_response(err: VerificationServiceError) -> Response {
    let status = match &err {
        VerificationServiceError::Authorization(AuthorizationError::Store(_)) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
        VerificationServiceError::Authorization(_) => {
            let payload = json!({ "error": "access restricted" });
            return (StatusCode::FORBIDDEN, Json(payload)).into_response();
        }
        VerificationServiceError::Pipeline(PipelineError::Stage(stage)) => {
            let payload = json!({
                "error": "analysis failed",
                "detail": stage.to_string(),
            });
            return (StatusCode::BAD_GATEWAY, Json(payload)).into_response();
        }
        VerificationServiceError::Pipeline(PipelineError::Documents(_))
        | VerificationServiceError::Rule(_)
        | VerificationServiceError::Invalid(_) => StatusCode::UNPROCESSABLE_ENTITY,
        VerificationServiceError::Pipeline(PipelineError::CandidateNotFound(_))
        | VerificationServiceError::CandidateNotFound(_) => StatusCode::NOT_FOUND,
        VerificationServiceError::Pipeline(PipelineError::AlreadyRunning(_)) => {
            StatusCode::CONFLICT
        }
        VerificationServiceError::Pipeline(PipelineError::Workflow(_))
        | VerificationServiceError::Pipeline(PipelineError::Store(_))
        | VerificationServiceError::Store(_)
        | VerificationServiceError::Export(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };

    if status.is_server_error() {
        warn!(error = %err, "request failed");
    }
    let payload = json!({ "error": err.to_string() });
    (status, Json(payload)).into_response()
}
