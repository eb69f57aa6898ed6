use crate::infra::{build_service, language_model};
use clap::Args;
use std::path::{Path, PathBuf};
use tracing::info;
use verihire::config::AppConfig;
use verihire::error::AppError;
use verihire::telemetry;
use verihire::verification::{
    AuthenticatedUser, DocumentKind, DocumentPayload, DocumentSubmission, Invitation,
    PipelineError,
};

#[derive(Args, Debug)]
pub(crate) struct VerifyArgs {
    /// Resume file (PDF or image)
    #[arg(long)]
    pub(crate) resume: PathBuf,
    /// Experience letter issued by a previous employer
    #[arg(long)]
    pub(crate) experience_letter: PathBuf,
    /// Optional government ID scan
    #[arg(long)]
    pub(crate) id_proof: Option<PathBuf>,
    /// Name recorded on the candidate profile
    #[arg(long, default_value = "Command Line Candidate")]
    pub(crate) name: String,
    /// Email recorded on the candidate profile
    #[arg(long, default_value = "candidate@example.com")]
    pub(crate) email: String,
    /// Role the candidate applied for
    #[arg(long, default_value = "Unspecified")]
    pub(crate) role: String,
}

pub(crate) async fn run_verify(args: VerifyArgs) -> Result<(), AppError> {
    let config = AppConfig::load()?;
    telemetry::init(&config.telemetry)?;

    let submission = DocumentSubmission {
        resume: load_document(DocumentKind::Resume, &args.resume)?,
        experience_letter: load_document(DocumentKind::ExperienceLetter, &args.experience_letter)?,
        id_proof: args
            .id_proof
            .as_deref()
            .map(|path| load_document(DocumentKind::IdProof, path))
            .transpose()?,
    };

    let model = language_model(&config)?;
    let service = build_service(&config, model)?;

    let operator = AuthenticatedUser::new("cli-operator", "Command Line", "cli@localhost");
    service.register_hr(&operator)?;
    let candidate = service.invite(
        &operator,
        Invitation {
            full_name: args.name,
            email: args.email,
            role: args.role,
        },
    )?;
    info!(candidate_id = %candidate.id, "running verification from the command line");

    let run = service.verify(&operator, &candidate.id, &submission).await?;
    let profile = run.persisted.wait().await?;

    print_json(&run.report)?;
    println!(
        "\nStatus: {}  trust {}  fraud risk {}",
        profile.profile_status.label(),
        profile.trust_score,
        profile.fraud_risk_score
    );
    Ok(())
}

fn load_document(kind: DocumentKind, path: &Path) -> Result<String, AppError> {
    let bytes = std::fs::read(path)?;
    let mime = mime_guess::from_path(path).first_or_octet_stream();
    let payload = DocumentPayload::from_bytes(kind, &mime, &bytes).map_err(PipelineError::from)?;
    Ok(payload.data_uri().to_string())
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<(), AppError> {
    let rendered = serde_json::to_string_pretty(value)
        .map_err(|err| AppError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, err)))?;
    println!("{rendered}");
    Ok(())
}
