use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use super::documents::CandidateDocuments;
use super::llm::{LanguageModel, MediaPart, PromptRequest};
use super::prompts::{extraction_prompt, EXTRACTION_PROMPT_NAME};
use super::schema::{extraction_output_schema, validate_extraction, ExtractionOutput};
use super::stage::{call_model, StageError, StageKind};

/// Turns the uploaded documents into structured employment and identity data.
#[derive(Clone)]
pub struct ExtractionStage {
    model: Arc<dyn LanguageModel>,
    timeout: Duration,
}

impl ExtractionStage {
    pub fn new(model: Arc<dyn LanguageModel>, timeout: Duration) -> Self {
        Self { model, timeout }
    }

    /// One model call. Without an ID document the summary is always empty, whatever the
    /// model says.
    pub async fn run(&self, documents: &CandidateDocuments) -> Result<ExtractionOutput, StageError> {
        let id_proof_provided = documents.id_proof.is_some();

        let mut media = vec![
            MediaPart {
                label: "Resume".to_string(),
                data_uri: documents.resume.data_uri().to_string(),
            },
            MediaPart {
                label: "Experience Letter".to_string(),
                data_uri: documents.experience_letter.data_uri().to_string(),
            },
        ];
        if let Some(id_proof) = &documents.id_proof {
            media.push(MediaPart {
                label: "ID Proof".to_string(),
                data_uri: id_proof.data_uri().to_string(),
            });
        }

        let request = PromptRequest {
            name: EXTRACTION_PROMPT_NAME,
            instructions: extraction_prompt(id_proof_provided),
            media,
            output_schema: extraction_output_schema(),
        };

        let mut output = call_model(
            &self.model,
            self.timeout,
            StageKind::Extraction,
            request,
            validate_extraction,
        )
        .await?;

        if !id_proof_provided {
            output.id_proof_info.clear();
        }

        info!(
            resume_periods = output.resume_experiences.len(),
            letter_periods = output.letter_experiences.len(),
            "documents extracted"
        );
        Ok(output)
    }
}
