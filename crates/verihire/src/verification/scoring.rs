use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::info;

use super::domain::EmploymentPeriod;
use super::llm::{LanguageModel, PromptRequest};
use super::prompts::{scoring_prompt, ScoringPromptInput, CERTIFICATE_PLACEHOLDER, SCORING_PROMPT_NAME};
use super::schema::{scoring_output_schema, validate_scoring, ExtractionOutput, ScoringOutput};
use super::stage::{call_model, StageError, StageKind};

/// Input of the combined comparison, fraud, and scoring call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoringInput {
    pub candidate_name: String,
    pub resume_periods: Vec<EmploymentPeriod>,
    pub letter_periods: Vec<EmploymentPeriod>,
    pub id_proof_info: String,
    pub certificate_summary: String,
}

impl ScoringInput {
    pub fn from_extraction(extraction: &ExtractionOutput) -> Self {
        Self {
            candidate_name: extraction.name.clone(),
            resume_periods: extraction.resume_experiences.clone(),
            letter_periods: extraction.letter_experiences.clone(),
            id_proof_info: extraction.id_proof_info.clone(),
            certificate_summary: CERTIFICATE_PLACEHOLDER.to_string(),
        }
    }
}

/// Scores the extracted data. Gap and mismatch detection is left to the model; only the
/// shape and bounds of its answer are enforced.
#[derive(Clone)]
pub struct ScoringStage {
    model: Arc<dyn LanguageModel>,
    timeout: Duration,
}

impl ScoringStage {
    pub fn new(model: Arc<dyn LanguageModel>, timeout: Duration) -> Self {
        Self { model, timeout }
    }

    pub async fn run(&self, input: &ScoringInput) -> Result<ScoringOutput, StageError> {
        let request = PromptRequest {
            name: SCORING_PROMPT_NAME,
            instructions: scoring_prompt(&ScoringPromptInput {
                candidate_name: &input.candidate_name,
                resume_periods: &input.resume_periods,
                letter_periods: &input.letter_periods,
                id_proof_info: &input.id_proof_info,
                certificate_summary: &input.certificate_summary,
            }),
            media: Vec::new(),
            output_schema: scoring_output_schema(),
        };

        let output = call_model(
            &self.model,
            self.timeout,
            StageKind::Scoring,
            request,
            validate_scoring,
        )
        .await?;

        info!(
            trust_score = output.trust_score.value(),
            fraud_risk_score = output.fraud_risk_score.value(),
            gaps = output.employment_gaps_detected,
            mismatches = output.mismatches_detected,
            "candidate scored"
        );
        Ok(output)
    }
}
