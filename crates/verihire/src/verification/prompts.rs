use std::fmt::Write;

use super::domain::EmploymentPeriod;

pub const EXTRACTION_PROMPT_NAME: &str = "extractCandidateDocumentData";
pub const SCORING_PROMPT_NAME: &str = "candidateVerification";

/// Stand-in for certificate data until a certificate extraction stage exists.
pub const CERTIFICATE_PLACEHOLDER: &str =
    "No certificate data provided; certificate extraction is not part of this pipeline.";

pub(crate) fn extraction_prompt(id_proof_provided: bool) -> String {
    let id_proof_line = if id_proof_provided {
        "ID Proof: attached below."
    } else {
        "ID Proof: Not Provided"
    };

    format!(
        "You are an expert document analysis AI. Your task is to extract information from three sources: a Resume, an Experience Letter, and an ID Proof.\n\
\n\
1. **Candidate Name**: Identify the candidate's full name across all documents.\n\
2. **Resume Experiences**: Extract all work experiences listed on the Resume. Ensure dates are in YYYY-MM-DD format; use \"Present\" as the end date for ongoing employment.\n\
3. **Experience Letter Experiences**: Extract all work experiences mentioned in the Experience Letter. Ensure dates are in YYYY-MM-DD format; use \"Present\" as the end date for ongoing employment.\n\
4. **ID Proof Info**: Summarize the key identity details found on the ID proof (Name, Date of Birth, ID Number if visible).\n\
\n\
Resume: attached below.\n\
Experience Letter: attached below.\n\
{id_proof_line}"
    )
}

pub(crate) struct ScoringPromptInput<'a> {
    pub candidate_name: &'a str,
    pub resume_periods: &'a [EmploymentPeriod],
    pub letter_periods: &'a [EmploymentPeriod],
    pub id_proof_info: &'a str,
    pub certificate_summary: &'a str,
}

pub(crate) fn scoring_prompt(input: &ScoringPromptInput<'_>) -> String {
    let mut prompt = String::from(
        "You are an intelligent \"Hiring Intelligence System\" agent specializing in background verification.\n\
Your task is to analyze the provided candidate data, detect discrepancies, employment gaps, calculate risk, and provide trust scores.\n\n",
    );

    let _ = writeln!(prompt, "--- Candidate Data ---");
    let _ = writeln!(prompt, "Candidate Name: {}\n", input.candidate_name);

    let _ = writeln!(prompt, "--- Extracted Resume Employment Periods ---");
    write_periods(
        &mut prompt,
        input.resume_periods,
        "No resume employment periods provided.",
    );

    let _ = writeln!(prompt, "\n--- Extracted Experience Letter Employment Periods ---");
    write_periods(
        &mut prompt,
        input.letter_periods,
        "No experience letter employment periods provided.",
    );

    let _ = writeln!(prompt, "\n--- Extracted ID Proof Data ---");
    let id_proof = if input.id_proof_info.trim().is_empty() {
        "Not Provided"
    } else {
        input.id_proof_info
    };
    let _ = writeln!(prompt, "{id_proof}");

    let _ = writeln!(prompt, "\n--- Extracted Certificate Data ---");
    let _ = writeln!(prompt, "{}", input.certificate_summary);

    prompt.push_str(
        "\n--- Instructions ---\n\
Analyze the provided data thoroughly.\n\
1. Compare the resume employment periods with the experience letter employment periods. Note any mismatches in company names, start dates, or end dates.\n\
2. Identify any significant employment gaps (periods of unemployment between roles) based on the combined employment history. An end date of \"Present\" means the role is ongoing.\n\
3. Based on the findings, determine 'mismatchesDetected' and 'employmentGapsDetected'.\n\
4. Calculate a 'fraudRiskScore' from 0 (no risk) to 100 (very high risk). Mismatches and unexplained gaps should increase this score.\n\
5. Calculate a 'trustScore' from 0 (very low trust) to 100 (very high trust). This score should inversely correlate with the fraud risk and reflect overall credibility.\n\
6. Provide a comprehensive 'analysisSummary' explaining all detections, calculations, and the reasoning behind the scores.\n\
\n\
Ensure the output adheres strictly to the provided JSON schema.",
    );

    prompt
}

fn write_periods(prompt: &mut String, periods: &[EmploymentPeriod], empty_note: &str) {
    if periods.is_empty() {
        let _ = writeln!(prompt, "{empty_note}");
        return;
    }
    for period in periods {
        let _ = writeln!(
            prompt,
            "- Company: {}, Start Date: {}, End Date: {}",
            period.company_name,
            period.start_date.format("%Y-%m-%d"),
            period.end_date
        );
    }
}
