//! Axum route handlers for the AI API.

use std::future::Future;

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};

use crate::ai::prompts::{self, FILE_MODEL, TEXT_MODEL};
use crate::errors::AppError;
use crate::llm_client::{generate_json, strip_code_fences, GenerateRequest, LlmError, ModelInfo};
use crate::state::AppState;

// ────────────────────────────────────────────────────────────────────────────
// Request / Response types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConvertFileRequest {
    pub base64_data: String,
    pub mime_type: String,
    pub job_description: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StructureTextRequest {
    pub pasted_text: String,
    pub job_description: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImproveRequest {
    pub current_html: String,
    pub instruction: String,
    pub job_description: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReorderRequest {
    pub current_html: String,
    pub job_description: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackRequest {
    pub resume_text: String,
    pub job_description: Option<String>,
}

/// Resume HTML produced from a document or pasted text.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StructuredResume {
    pub candidate_name: String,
    pub html_content: String,
    pub raw_text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HtmlResponse {
    pub html: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AtsFeedback {
    pub score: f64,
    pub improvements: Vec<String>,
    pub suggested_keywords: Vec<String>,
    pub red_flags: Vec<String>,
    pub jd_match_analysis: String,
}

#[derive(Debug, Serialize)]
pub struct ModelListResponse {
    pub models: Vec<ModelInfo>,
}

// ────────────────────────────────────────────────────────────────────────────
// Helpers
// ────────────────────────────────────────────────────────────────────────────

fn require(field: &str, value: &str) -> Result<(), AppError> {
    if value.trim().is_empty() {
        return Err(AppError::Validation(format!("{field} cannot be empty")));
    }
    Ok(())
}

/// Runs an AI call under the configured overall deadline.
/// The executor has no deadline of its own; this bounds retries plus backoff.
async fn run_ai<T>(
    state: &AppState,
    action: &'static str,
    call: impl Future<Output = Result<T, LlmError>>,
) -> Result<T, AppError> {
    match tokio::time::timeout(state.config.ai_request_timeout, call).await {
        Ok(result) => result.map_err(|source| AppError::llm(action, source)),
        Err(_) => Err(AppError::DeadlineExceeded(action)),
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Handlers
// ────────────────────────────────────────────────────────────────────────────

/// POST /api/ai/convert
///
/// Converts an uploaded resume (base64 image or PDF) into structured HTML.
pub async fn handle_convert(
    State(state): State<AppState>,
    Json(request): Json<ConvertFileRequest>,
) -> Result<Json<StructuredResume>, AppError> {
    require("base64Data", &request.base64_data)?;
    require("mimeType", &request.mime_type)?;

    let prompt = prompts::convert_file_prompt(request.job_description.as_deref());
    let generate = GenerateRequest::new(FILE_MODEL)
        .inline_data(request.mime_type, request.base64_data)
        .text(prompt)
        .json_schema(prompts::structured_resume_schema());

    let resume = run_ai(
        &state,
        "Failed to process resume file.",
        generate_json::<StructuredResume>(state.llm.as_ref(), &generate),
    )
    .await?;

    Ok(Json(resume))
}

/// POST /api/ai/text
///
/// Structures pasted resume text into HTML.
pub async fn handle_structure_text(
    State(state): State<AppState>,
    Json(request): Json<StructureTextRequest>,
) -> Result<Json<StructuredResume>, AppError> {
    require("pastedText", &request.pasted_text)?;

    let generate = GenerateRequest::new(TEXT_MODEL)
        .text(prompts::structure_text_prompt(
            &request.pasted_text,
            request.job_description.as_deref(),
        ))
        .json_schema(prompts::structured_resume_schema());

    let resume = run_ai(
        &state,
        "Failed to structure text.",
        generate_json::<StructuredResume>(state.llm.as_ref(), &generate),
    )
    .await?;

    Ok(Json(resume))
}

/// POST /api/ai/improve
///
/// Applies a free-form instruction to the current resume HTML.
pub async fn handle_improve(
    State(state): State<AppState>,
    Json(request): Json<ImproveRequest>,
) -> Result<Json<HtmlResponse>, AppError> {
    require("currentHtml", &request.current_html)?;
    require("instruction", &request.instruction)?;

    let generate = GenerateRequest::new(TEXT_MODEL).text(prompts::improve_prompt(
        &request.current_html,
        &request.instruction,
        request.job_description.as_deref(),
    ));

    let html = run_ai(
        &state,
        "Failed to apply improvement.",
        state.llm.generate(&generate),
    )
    .await?;

    Ok(Json(HtmlResponse {
        html: strip_code_fences(&html).to_string(),
    }))
}

/// POST /api/ai/reorder
///
/// Reorders H2 sections for the target job description; content is unchanged.
pub async fn handle_reorder(
    State(state): State<AppState>,
    Json(request): Json<ReorderRequest>,
) -> Result<Json<HtmlResponse>, AppError> {
    require("currentHtml", &request.current_html)?;
    require("jobDescription", &request.job_description)?;

    let generate = GenerateRequest::new(TEXT_MODEL).text(prompts::reorder_prompt(
        &request.current_html,
        &request.job_description,
    ));

    let html = run_ai(
        &state,
        "Failed to reorder sections.",
        state.llm.generate(&generate),
    )
    .await?;

    Ok(Json(HtmlResponse {
        html: strip_code_fences(&html).to_string(),
    }))
}

/// POST /api/ai/feedback
///
/// Scores resume text for ATS compatibility.
pub async fn handle_feedback(
    State(state): State<AppState>,
    Json(request): Json<FeedbackRequest>,
) -> Result<Json<AtsFeedback>, AppError> {
    require("resumeText", &request.resume_text)?;

    let generate = GenerateRequest::new(TEXT_MODEL)
        .text(prompts::ats_feedback_prompt(
            &request.resume_text,
            request.job_description.as_deref(),
        ))
        .json_schema(prompts::ats_feedback_schema());

    let feedback = run_ai(
        &state,
        "Failed to generate ATS feedback.",
        generate_json::<AtsFeedback>(state.llm.as_ref(), &generate),
    )
    .await?;

    Ok(Json(feedback))
}

/// GET /api/ai/models
///
/// Lists the models available to the configured API key.
pub async fn handle_list_models(
    State(state): State<AppState>,
) -> Result<Json<ModelListResponse>, AppError> {
    let models = run_ai(&state, "Failed to list models.", state.llm.list_models()).await?;
    Ok(Json(ModelListResponse { models }))
}
