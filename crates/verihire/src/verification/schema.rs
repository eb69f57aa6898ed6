//! Output contracts for the two language-model calls.
//!
//! Model replies are parsed all-or-nothing: any field that is missing, mistyped, or out of
//! bounds rejects the whole reply. Nothing is clamped or repaired.

use serde::Deserialize;
use serde_json::{json, Value};

use super::domain::{parse_calendar_date, EmploymentPeriod, EndDate, Score};

/// Structured result of the extraction call.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionOutput {
    pub name: String,
    pub resume_experiences: Vec<EmploymentPeriod>,
    pub letter_experiences: Vec<EmploymentPeriod>,
    pub id_proof_info: String,
}

/// Structured result of the combined comparison, fraud, and scoring call.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoringOutput {
    pub employment_gaps_detected: bool,
    pub mismatches_detected: bool,
    pub fraud_risk_score: Score,
    pub trust_score: Score,
    pub analysis_summary: String,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchemaError {
    #[error("model output does not match the declared shape: {0}")]
    Shape(String),
    #[error("model output field `{path}` is invalid: {reason}")]
    Field { path: String, reason: String },
}

impl SchemaError {
    fn field(path: impl Into<String>, reason: impl Into<String>) -> Self {
        SchemaError::Field {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawExperience {
    company_name: String,
    #[serde(default)]
    job_title: Option<String>,
    start_date: String,
    end_date: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawExtraction {
    name: String,
    resume_experiences: Vec<RawExperience>,
    letter_experiences: Vec<RawExperience>,
    id_proof_info: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawScoring {
    employment_gaps_detected: bool,
    mismatches_detected: bool,
    fraud_risk_score: f64,
    trust_score: f64,
    analysis_summary: String,
}

pub fn validate_extraction(value: Value) -> Result<ExtractionOutput, SchemaError> {
    let raw: RawExtraction =
        serde_json::from_value(value).map_err(|err| SchemaError::Shape(err.to_string()))?;

    let resume_experiences = raw
        .resume_experiences
        .into_iter()
        .enumerate()
        .map(|(idx, row)| validate_period(row, &format!("resumeExperiences[{idx}]"), true))
        .collect::<Result<Vec<_>, _>>()?;
    let letter_experiences = raw
        .letter_experiences
        .into_iter()
        .enumerate()
        .map(|(idx, row)| validate_period(row, &format!("letterExperiences[{idx}]"), false))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(ExtractionOutput {
        name: raw.name.trim().to_string(),
        resume_experiences,
        letter_experiences,
        id_proof_info: raw.id_proof_info,
    })
}

fn validate_period(
    raw: RawExperience,
    path: &str,
    title_required: bool,
) -> Result<EmploymentPeriod, SchemaError> {
    let company_name = raw.company_name.trim().to_string();
    if company_name.is_empty() {
        return Err(SchemaError::field(format!("{path}.companyName"), "must not be blank"));
    }

    let job_title = raw
        .job_title
        .map(|title| title.trim().to_string())
        .filter(|title| !title.is_empty());
    if title_required && job_title.is_none() {
        return Err(SchemaError::field(format!("{path}.jobTitle"), "required for resume rows"));
    }

    let start_date = parse_calendar_date(raw.start_date.trim()).ok_or_else(|| {
        SchemaError::field(
            format!("{path}.startDate"),
            format!("'{}' is not a YYYY-MM-DD date", raw.start_date),
        )
    })?;

    let end_raw = raw.end_date.trim();
    let end_date = if end_raw == EndDate::PRESENT_LITERAL {
        EndDate::Present
    } else {
        parse_calendar_date(end_raw).map(EndDate::On).ok_or_else(|| {
            SchemaError::field(
                format!("{path}.endDate"),
                format!("'{}' is neither a YYYY-MM-DD date nor \"Present\"", raw.end_date),
            )
        })?
    };

    Ok(EmploymentPeriod {
        company_name,
        job_title,
        start_date,
        end_date,
    })
}

pub fn validate_scoring(value: Value) -> Result<ScoringOutput, SchemaError> {
    let raw: RawScoring =
        serde_json::from_value(value).map_err(|err| SchemaError::Shape(err.to_string()))?;

    Ok(ScoringOutput {
        employment_gaps_detected: raw.employment_gaps_detected,
        mismatches_detected: raw.mismatches_detected,
        fraud_risk_score: bounded_score("fraudRiskScore", raw.fraud_risk_score)?,
        trust_score: bounded_score("trustScore", raw.trust_score)?,
        analysis_summary: raw.analysis_summary,
    })
}

/// Fractional scores inside the range are rounded to the nearest integer.
fn bounded_score(path: &str, raw: f64) -> Result<Score, SchemaError> {
    if !raw.is_finite() || !(0.0..=100.0).contains(&raw) {
        return Err(SchemaError::field(path, format!("{raw} is outside 0..=100")));
    }
    Score::new(raw.round() as u8)
        .ok_or_else(|| SchemaError::field(path, format!("{raw} is outside 0..=100")))
}

fn period_schema(with_title: bool) -> Value {
    let mut properties = json!({
        "companyName": { "type": "string", "description": "The name of the company." },
        "startDate": {
            "type": "string",
            "pattern": "^\\d{4}-\\d{2}-\\d{2}$",
            "description": "The start date of employment in YYYY-MM-DD format."
        },
        "endDate": {
            "type": "string",
            "pattern": "^(\\d{4}-\\d{2}-\\d{2}|Present)$",
            "description": "The end date of employment in YYYY-MM-DD format, or \"Present\" if currently employed."
        }
    });
    let mut required = vec!["companyName", "startDate", "endDate"];
    if with_title {
        properties["jobTitle"] = json!({
            "type": "string",
            "description": "The candidate's job title at the company."
        });
        required.push("jobTitle");
    }
    json!({ "type": "object", "properties": properties, "required": required })
}

/// JSON schema declared to the model for the extraction call.
pub fn extraction_output_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "name": { "type": "string", "description": "The full name of the candidate found in the documents." },
            "resumeExperiences": {
                "type": "array",
                "items": period_schema(true),
                "description": "Experiences extracted specifically from the resume."
            },
            "letterExperiences": {
                "type": "array",
                "items": period_schema(false),
                "description": "Experiences extracted specifically from the experience letter."
            },
            "idProofInfo": {
                "type": "string",
                "description": "Key summary of information found on the ID proof (e.g., name, DOB)."
            }
        },
        "required": ["name", "resumeExperiences", "letterExperiences", "idProofInfo"]
    })
}

/// JSON schema declared to the model for the scoring call.
pub fn scoring_output_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "employmentGapsDetected": {
                "type": "boolean",
                "description": "True if significant employment gaps are detected between employment periods."
            },
            "mismatchesDetected": {
                "type": "boolean",
                "description": "True if there are discrepancies between resume and experience letter data (e.g., dates, companies)."
            },
            "fraudRiskScore": {
                "type": "number", "minimum": 0, "maximum": 100,
                "description": "A score from 0 to 100 representing the likelihood of fraudulent information, where 100 is high risk."
            },
            "trustScore": {
                "type": "number", "minimum": 0, "maximum": 100,
                "description": "A score from 0 to 100 representing the overall credibility of the candidate, where 100 is highly trustworthy."
            },
            "analysisSummary": {
                "type": "string",
                "description": "A detailed summary of the findings, including identified gaps, mismatches, and reasoning behind the scores."
            }
        },
        "required": ["employmentGapsDetected", "mismatchesDetected", "fraudRiskScore", "trustScore", "analysisSummary"]
    })
}
