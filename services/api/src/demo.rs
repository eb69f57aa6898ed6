use async_trait::async_trait;
use clap::Args;
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use verihire::error::AppError;
use verihire::verification::{
    AuthContext, AuthenticatedUser, AutoShortlistRule, CandidateProfile, DashboardSummary,
    DocumentSubmission, Invitation, LanguageModel, LlmError, MemoryDocumentStore, PromptRequest,
    Session, VerificationService, VerificationServiceError, EXTRACTION_PROMPT_NAME,
    SCORING_PROMPT_NAME,
};

const SAMPLE_PDF: &str = "data:application/pdf;base64,JVBERi0xLjQK";

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Minimum trust score for the auto-shortlist rule
    #[arg(long, default_value_t = 80)]
    pub(crate) min_trust: u8,
    /// Maximum fraud risk score for the auto-shortlist rule
    #[arg(long, default_value_t = 20)]
    pub(crate) max_risk: u8,
    /// Print the dashboard and audit log as JSON instead of text
    #[arg(long)]
    pub(crate) json: bool,
}

/// Replays canned replies per prompt, in call order.
struct DemoModel {
    replies: Mutex<HashMap<&'static str, VecDeque<Value>>>,
}

impl DemoModel {
    fn new() -> Self {
        let mut replies = HashMap::new();
        replies.insert(
            EXTRACTION_PROMPT_NAME,
            VecDeque::from([
                json!({
                    "name": "Avery Chen",
                    "resumeExperiences": [
                        {"companyName": "Northwind Labs", "jobTitle": "Backend Engineer", "startDate": "2019-03-01", "endDate": "2023-08-31"},
                        {"companyName": "Contoso", "jobTitle": "Staff Engineer", "startDate": "2023-09-15", "endDate": "Present"}
                    ],
                    "letterExperiences": [
                        {"companyName": "Northwind Labs", "startDate": "2019-03-01", "endDate": "2023-08-31"}
                    ],
                    "idProofInfo": "Name: Avery Chen, DOB: 1991-07-22"
                }),
                json!({
                    "name": "Riley Morgan",
                    "resumeExperiences": [
                        {"companyName": "Globex", "jobTitle": "Engineering Manager", "startDate": "2016-01-01", "endDate": "2022-12-31"}
                    ],
                    "letterExperiences": [
                        {"companyName": "Globex", "jobTitle": "Engineer", "startDate": "2019-06-01", "endDate": "2021-02-28"}
                    ],
                    "idProofInfo": ""
                }),
            ]),
        );
        replies.insert(
            SCORING_PROMPT_NAME,
            VecDeque::from([
                json!({
                    "employmentGapsDetected": false,
                    "mismatchesDetected": false,
                    "fraudRiskScore": 6,
                    "trustScore": 91,
                    "analysisSummary": "Northwind Labs tenure matches the experience letter exactly. ID details are consistent."
                }),
                json!({
                    "employmentGapsDetected": true,
                    "mismatchesDetected": true,
                    "fraudRiskScore": 57,
                    "trustScore": 48,
                    "analysisSummary": "Resume claims Globex from 2016 to 2022 as a manager; the letter confirms 2019 to 2021 as an engineer."
                }),
            ]),
        );
        Self {
            replies: Mutex::new(replies),
        }
    }
}

#[async_trait]
impl LanguageModel for DemoModel {
    async fn generate(&self, request: PromptRequest) -> Result<Value, LlmError> {
        let mut replies = self
            .replies
            .lock()
            .map_err(|_| LlmError::Transport("demo model lock poisoned".to_string()))?;
        replies
            .get_mut(request.name)
            .and_then(VecDeque::pop_front)
            .ok_or(LlmError::EmptyReply)
    }
}

pub(crate) async fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs {
        min_trust,
        max_risk,
        json: as_json,
    } = args;

    let rule = AutoShortlistRule::new(min_trust, max_risk).map_err(VerificationServiceError::from)?;
    let store = Arc::new(MemoryDocumentStore::default());
    let service = VerificationService::new(
        Arc::clone(&store),
        Arc::new(DemoModel::new()),
        Duration::from_secs(5),
        rule,
    );

    let auth = AuthContext::new(Arc::clone(&store));
    let subscription = auth.subscribe(|session: Option<&Session>| match session {
        Some(session) => println!(
            "[session] {} signed in as {}",
            session.user.display_name,
            session.role.label()
        ),
        None => println!("[session] signed out"),
    });

    println!("VeriHire Demo\n===============");
    let recruiter = AuthenticatedUser::new("demo-hr", "Dana Whitfield", "dana@verihire.test");
    auth.sign_in(recruiter.clone())?;
    service.register_hr(&recruiter)?;
    auth.refresh()?;
    auth.require_hr()?;

    let watcher = service.spawn_shortlist_watcher();
    println!("Auto-shortlist rule: {}", rule.describe());

    let avery = service.invite(
        &recruiter,
        Invitation {
            full_name: "Avery Chen".to_string(),
            email: "avery@example.com".to_string(),
            role: "Staff Engineer".to_string(),
        },
    )?;
    let riley = service.invite(
        &recruiter,
        Invitation {
            full_name: "Riley Morgan".to_string(),
            email: "riley@example.com".to_string(),
            role: "Engineering Manager".to_string(),
        },
    )?;

    for (candidate, id_proof) in [(&avery, true), (&riley, false)] {
        let submission = DocumentSubmission {
            resume: SAMPLE_PDF.to_string(),
            experience_letter: SAMPLE_PDF.to_string(),
            id_proof: id_proof.then(|| SAMPLE_PDF.to_string()),
        };
        let run = service.verify(&recruiter, &candidate.id, &submission).await?;
        let profile = run.persisted.wait().await?;
        println!(
            "\nVerified {} -> trust {}, fraud risk {}",
            profile.full_name, profile.trust_score, profile.fraud_risk_score
        );
        println!("  Summary: {}", run.report.scoring.analysis_summary);
        for note in &run.report.workflow.system_notes {
            println!("  - {note}");
        }
    }

    let shortlisted = wait_for_shortlist(&service, &recruiter, &avery).await?;
    println!(
        "\nAuto-shortlist: {} is {}",
        avery.full_name,
        if shortlisted { "shortlisted" } else { "not shortlisted yet" }
    );

    service
        .reject(
            &recruiter,
            &riley.id,
            Some("Employment history does not match the experience letter.".to_string()),
        )?
        .wait()
        .await?;
    println!("Rejected {}", riley.full_name);

    let dashboard = service.dashboard(&recruiter)?;
    let audit_log = service.audit_log(&recruiter)?;
    if as_json {
        let rendered = serde_json::to_string_pretty(&json!({
            "dashboard": dashboard,
            "auditLog": audit_log,
        }))
        .map_err(|err| AppError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, err)))?;
        println!("\n{rendered}");
    } else {
        render_dashboard(&dashboard);
        println!("\nAudit log:");
        for entry in &audit_log {
            println!(
                "  {} {:<16} {:<14} {}",
                entry.timestamp.format("%H:%M:%S"),
                entry.action.as_str(),
                entry.candidate_name.as_deref().unwrap_or("-"),
                entry.notes
            );
        }
    }

    println!("\nCSV export:\n{}", service.export_csv(&recruiter)?);

    watcher.shutdown().await;
    auth.sign_out();
    subscription.cancel();
    Ok(())
}

async fn wait_for_shortlist(
    service: &VerificationService<MemoryDocumentStore>,
    user: &AuthenticatedUser,
    candidate: &CandidateProfile,
) -> Result<bool, AppError> {
    for _ in 0..50 {
        if service.candidate(user, &candidate.id)?.is_shortlisted {
            return Ok(true);
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    Ok(false)
}

fn render_dashboard(summary: &DashboardSummary) {
    println!("\nDashboard");
    println!("  Candidates:   {}", summary.total);
    println!("  Verified:     {}", summary.verified);
    println!("  Rejected:     {}", summary.rejected);
    println!("  Pending:      {}", summary.pending);
    println!("  Shortlisted:  {}", summary.shortlisted);
    println!("  High risk:    {}", summary.high_risk);
    match summary.average_trust_score {
        Some(average) => println!("  Avg trust:    {average:.1}"),
        None => println!("  Avg trust:    n/a"),
    }
}
