use super::common::*;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use serde_json::{json, Value};
use tower::ServiceExt;

use crate::verification::domain::{AuthenticatedUser, CandidateId, ProfileStatus};
use crate::verification::router::verification_router;
use crate::verification::shortlist::AutoShortlistRule;
use crate::verification::VerificationService;
use crate::verification::store::DocumentStore;

const STAGE_TIMEOUT: Duration = Duration::from_secs(5);

fn request(method: Method, uri: &str, user: Option<&AuthenticatedUser>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(user) = user {
        builder = builder
            .header("x-user-id", user.uid.as_str())
            .header("x-user-name", user.display_name.as_str())
            .header("x-user-email", user.email.as_str());
    }
    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(serde_json::to_vec(&body).expect("serialize body")))
            .expect("request"),
        None => builder.body(Body::empty()).expect("request"),
    }
}

fn outsider() -> AuthenticatedUser {
    AuthenticatedUser::new("someone", "Some One", "someone@example.com")
}

#[tokio::test]
async fn requests_without_identity_are_unauthorized() {
    let (service, _store) = build_service(Arc::new(consistent_model()), STAGE_TIMEOUT);

    let response = verification_router(service)
        .oneshot(request(Method::GET, "/api/v1/candidates", None, None))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn recruiter_routes_restrict_non_hr_users() {
    let (service, _store) = build_service(Arc::new(consistent_model()), STAGE_TIMEOUT);

    let response = verification_router(service)
        .oneshot(request(Method::GET, "/api/v1/audit-logs", Some(&outsider()), None))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(
        read_json_body(response).await,
        json!({ "error": "access restricted" })
    );
}

#[tokio::test]
async fn hr_registration_then_invite() {
    let (service, store) = build_service(Arc::new(consistent_model()), STAGE_TIMEOUT);
    let router = verification_router(service);
    let hr = recruiter();

    let response = router
        .clone()
        .oneshot(request(Method::POST, "/api/v1/hr/profile", Some(&hr), None))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = router
        .oneshot(request(
            Method::POST,
            "/api/v1/candidates",
            Some(&hr),
            Some(json!({
                "full_name": "Casey Kim",
                "email": "casey@example.com",
                "role": "Product Designer"
            })),
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::CREATED);

    let body = read_json_body(response).await;
    assert_eq!(body["profileStatus"], "pending_documents");
    assert_eq!(body["trustScore"], 0);
    assert_eq!(store.candidates().expect("list").len(), 1);
}

#[tokio::test]
async fn invite_rejects_blank_fields() {
    let (service, store) = build_service(Arc::new(consistent_model()), STAGE_TIMEOUT);
    let hr = seed_hr(&store);

    let response = verification_router(service)
        .oneshot(request(
            Method::POST,
            "/api/v1/candidates",
            Some(&hr),
            Some(json!({ "full_name": "Casey Kim", "email": "casey@example.com", "role": " " })),
        ))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn candidate_can_run_own_verification() {
    let (service, store) = build_service(Arc::new(consistent_model()), STAGE_TIMEOUT);
    let candidate_user = AuthenticatedUser::new("cand-1", "Jordan Blake", "jordan@example.com");
    seed_candidate(&store, "cand-1", ProfileStatus::PendingDocuments, 0, 0);

    let response = verification_router(service)
        .oneshot(request(
            Method::POST,
            "/api/v1/candidates/cand-1/verification",
            Some(&candidate_user),
            Some(serde_json::to_value(submission(false)).expect("submission json")),
        ))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json_body(response).await;
    assert_eq!(body["report"]["scoring"]["mismatchesDetected"], false);
    assert_eq!(body["report"]["workflow"]["overallStatus"], "completed");
    assert_eq!(body["candidate"]["profileStatus"], "verified");
}

#[tokio::test]
async fn unpersisted_verification_reports_the_store_error() {
    let store = Arc::new(InterleavingStore::with_failing_completion());
    let service = Arc::new(VerificationService::new(
        Arc::clone(&store),
        Arc::new(consistent_model()),
        STAGE_TIMEOUT,
        AutoShortlistRule::default(),
    ));
    let candidate_user = AuthenticatedUser::new("cand-3", "Jordan Blake", "jordan@example.com");
    seed_candidate(store.inner(), "cand-3", ProfileStatus::PendingDocuments, 0, 0);

    let response = verification_router(service)
        .oneshot(request(
            Method::POST,
            "/api/v1/candidates/cand-3/verification",
            Some(&candidate_user),
            Some(serde_json::to_value(submission(false)).expect("submission json")),
        ))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json_body(response).await;
    assert_eq!(body["report"]["workflow"]["overallStatus"], "completed");
    assert_eq!(body["candidate"], Value::Null);
    assert_eq!(body["persistError"], "store unavailable: database offline");
    let stored = store
        .candidate(&CandidateId("cand-3".to_string()))
        .expect("read")
        .expect("present");
    assert_eq!(stored.profile_status, ProfileStatus::PendingDocuments);
}

#[tokio::test]
async fn verification_of_someone_else_is_restricted() {
    let (service, store) = build_service(Arc::new(consistent_model()), STAGE_TIMEOUT);
    seed_candidate(&store, "cand-1", ProfileStatus::PendingDocuments, 0, 0);

    let response = verification_router(service)
        .oneshot(request(
            Method::POST,
            "/api/v1/candidates/cand-1/verification",
            Some(&outsider()),
            Some(serde_json::to_value(submission(false)).expect("submission json")),
        ))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn analysis_failure_maps_to_bad_gateway() {
    let model = ScriptedModel::new().on_extraction(Reply::Fail("model overloaded"));
    let (service, store) = build_service(Arc::new(model), STAGE_TIMEOUT);
    let hr = seed_hr(&store);
    seed_candidate(&store, "cand-2", ProfileStatus::PendingDocuments, 0, 0);

    let response = verification_router(service)
        .oneshot(request(
            Method::POST,
            "/api/v1/candidates/cand-2/verification",
            Some(&hr),
            Some(serde_json::to_value(submission(true)).expect("submission json")),
        ))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let body = read_json_body(response).await;
    assert_eq!(body["error"], "analysis failed");
    assert!(body["detail"]
        .as_str()
        .is_some_and(|detail| detail.contains("model overloaded")));
}

#[tokio::test]
async fn malformed_documents_are_unprocessable() {
    let (service, store) = build_service(Arc::new(consistent_model()), STAGE_TIMEOUT);
    let hr = seed_hr(&store);
    seed_candidate(&store, "cand-3", ProfileStatus::PendingDocuments, 0, 0);

    let response = verification_router(service)
        .oneshot(request(
            Method::POST,
            "/api/v1/candidates/cand-3/verification",
            Some(&hr),
            Some(json!({ "resume": "https://example.com/cv.pdf", "experience_letter": PDF_URI })),
        ))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn unknown_candidate_is_not_found() {
    let (service, store) = build_service(Arc::new(consistent_model()), STAGE_TIMEOUT);
    let hr = seed_hr(&store);

    let response = verification_router(service)
        .oneshot(request(Method::GET, "/api/v1/candidates/ghost", Some(&hr), None))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn approve_is_accepted_and_lands_in_the_background() {
    let (service, store) = build_service(Arc::new(consistent_model()), STAGE_TIMEOUT);
    let hr = seed_hr(&store);
    seed_candidate(&store, "cand-4", ProfileStatus::PendingDocuments, 55, 35);

    let response = verification_router(service)
        .oneshot(request(
            Method::POST,
            "/api/v1/candidates/cand-4/approve",
            Some(&hr),
            Some(json!({ "notes": "Interview went well" })),
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    let probe = Arc::clone(&store);
    eventually(|| {
        let done = probe
            .candidate(&CandidateId("cand-4".to_string()))
            .ok()
            .flatten()
            .is_some_and(|profile| {
                profile.profile_status == ProfileStatus::Verified && profile.is_shortlisted
            });
        async move { done }
    })
    .await;
}

#[tokio::test]
async fn reject_without_body_is_accepted() {
    let (service, store) = build_service(Arc::new(consistent_model()), STAGE_TIMEOUT);
    let hr = seed_hr(&store);
    seed_candidate(&store, "cand-5", ProfileStatus::PendingDocuments, 0, 0);

    let response = verification_router(service)
        .oneshot(request(Method::POST, "/api/v1/candidates/cand-5/reject", Some(&hr), None))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::ACCEPTED);
}

#[tokio::test]
async fn shortlist_rule_can_be_read_and_updated() {
    let (service, store) = build_service(Arc::new(consistent_model()), STAGE_TIMEOUT);
    let router = verification_router(service);
    let hr = seed_hr(&store);

    let response = router
        .clone()
        .oneshot(request(Method::GET, "/api/v1/shortlist-rule", Some(&hr), None))
        .await
        .expect("response");
    assert_eq!(
        read_json_body(response).await,
        json!({ "minTrustScore": 80, "maxRiskScore": 20 })
    );

    let response = router
        .clone()
        .oneshot(request(
            Method::PUT,
            "/api/v1/shortlist-rule",
            Some(&hr),
            Some(json!({ "minTrustScore": 101, "maxRiskScore": 20 })),
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let response = router
        .oneshot(request(
            Method::PUT,
            "/api/v1/shortlist-rule",
            Some(&hr),
            Some(json!({ "minTrustScore": 75, "maxRiskScore": 25 })),
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        read_json_body(response).await,
        json!({ "minTrustScore": 75, "maxRiskScore": 25 })
    );
}

#[tokio::test]
async fn export_returns_csv() {
    let (service, store) = build_service(Arc::new(consistent_model()), STAGE_TIMEOUT);
    let hr = seed_hr(&store);
    seed_candidate(&store, "cand-6", ProfileStatus::Verified, 90, 5);

    let response = verification_router(service)
        .oneshot(request(Method::GET, "/api/v1/candidates/export", Some(&hr), None))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).map(|v| v.as_bytes()),
        Some("text/csv".as_bytes())
    );
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("body");
    let text = String::from_utf8(body.to_vec()).expect("utf-8");
    assert!(text.starts_with("id,name,email,role,status,trust,risk,shortlisted,created_at\n"));
    assert!(text.contains("cand-6,Jordan Blake,cand-6@example.com,Backend Engineer,verified,90,5,false,"));
}

#[tokio::test]
async fn dashboard_summarizes_candidates() {
    let (service, store) = build_service(Arc::new(consistent_model()), STAGE_TIMEOUT);
    let hr = seed_hr(&store);
    seed_candidate(&store, "a", ProfileStatus::Verified, 90, 5);
    seed_candidate(&store, "b", ProfileStatus::Rejected, 30, 65);
    seed_candidate(&store, "c", ProfileStatus::PendingDocuments, 0, 0);

    let response = verification_router(service)
        .oneshot(request(Method::GET, "/api/v1/dashboard", Some(&hr), None))
        .await
        .expect("response");

    let body = read_json_body(response).await;
    assert_eq!(body["total"], 3);
    assert_eq!(body["highRisk"], 1);
    assert_eq!(body["averageTrustScore"], 60.0);
}

#[tokio::test]
async fn store_outage_is_an_internal_error() {
    let store = Arc::new(UnavailableStore::default());
    let service = Arc::new(crate::verification::VerificationService::new(
        store,
        Arc::new(consistent_model()),
        STAGE_TIMEOUT,
        crate::verification::AutoShortlistRule::default(),
    ));

    let response = verification_router(service)
        .oneshot(request(Method::GET, "/api/v1/candidates", Some(&recruiter()), None))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}
