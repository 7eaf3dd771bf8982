// Prompt templates and response schemas for the AI endpoints.
// Schemas use the Gemini REST type names (OBJECT, STRING, NUMBER, ARRAY).

use serde_json::{json, Value};

/// Model used for document (image/PDF) conversion.
pub const FILE_MODEL: &str = "gemini-2.5-flash";
/// Model used for every text-only task.
pub const TEXT_MODEL: &str = "gemini-flash-latest";

const RESUME_STRUCTURE_RULES: &str = "\
STRUCTURE RULES:
1. Header: contact details inside
   <div class=\"header-grid\">
     <div class=\"header-left\"><h1>[Name]</h1><p>[Website or portfolio]</p></div>
     <div class=\"header-right\">Email: [Email]<br>Mobile: [Phone]</div>
   </div>
2. Section order: students and recent graduates lead with EDUCATION; career changers
   targeting a technical role lead with SKILLS/PROJECTS; everyone else uses
   SUMMARY, EXPERIENCE, SKILLS, EDUCATION.
3. Each job starts with <h3><span class='job-title'>Title</span> <span class='location'>City, State</span></h3>
   followed by <div class='role-line'><span>Company</span> <span>Dates</span></div>.
4. Section headers are H2 (EXPERIENCE, EDUCATION, PROJECTS, ...).
5. Wrap project and profile URLs in <a href=\"...\">.
6. Bullet points are concise and results-oriented.
7. Use only H1, H2, H3, P, UL, LI, A, STRONG, SPAN.";

fn job_description_block(job_description: Option<&str>) -> String {
    match job_description.map(str::trim).filter(|jd| !jd.is_empty()) {
        Some(jd) => format!("TARGET JOB DESCRIPTION:\n{jd}\n\n"),
        None => String::new(),
    }
}

/// Prompt sent alongside an uploaded resume document.
pub fn convert_file_prompt(job_description: Option<&str>) -> String {
    format!(
        "Convert the attached resume document into structured resume HTML.\n\n{}{RESUME_STRUCTURE_RULES}\n\n\
         Recreate the resume faithfully, ordering sections for the target role.",
        job_description_block(job_description)
    )
}

/// Prompt that turns pasted plain text into resume HTML.
pub fn structure_text_prompt(pasted_text: &str, job_description: Option<&str>) -> String {
    format!(
        "Convert the resume text below into structured resume HTML.\n\n{}{RESUME_STRUCTURE_RULES}\n\n\
         Put the most relevant section first.\n\nRESUME TEXT:\n{pasted_text}",
        job_description_block(job_description)
    )
}

pub fn improve_prompt(current_html: &str, instruction: &str, job_description: Option<&str>) -> String {
    format!(
        "Update the resume HTML below to address: \"{instruction}\".\n\
         Target JD: {}\n\
         Current HTML: {current_html}\n\
         Return ONLY the updated HTML. Keep the header structure and all links.",
        job_description.unwrap_or("None")
    )
}

pub fn reorder_prompt(current_html: &str, job_description: &str) -> String {
    format!(
        "Reorder the H2 sections of the resume HTML below for the target job description.\n\
         Target JD: {job_description}\n\
         Current HTML: {current_html}\n\
         - Entry-level roles: lead with EDUCATION.\n\
         - Technical roles with matching skills: lead with SKILLS.\n\
         - Otherwise lead with EXPERIENCE.\n\
         Keep every block's content identical; only move blocks. Return ONLY the HTML."
    )
}

pub fn ats_feedback_prompt(resume_text: &str, job_description: Option<&str>) -> String {
    format!(
        "Score this resume for ATS compatibility from 0 to 100 and explain.\n\
         Resume: {resume_text}\n\
         JD: {}",
        job_description.unwrap_or("None")
    )
}

/// Schema for `StructuredResume`.
pub fn structured_resume_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "candidateName": { "type": "STRING" },
            "htmlContent": { "type": "STRING" },
            "rawText": { "type": "STRING" },
            "confidence": { "type": "NUMBER" }
        },
        "required": ["candidateName", "htmlContent", "rawText"]
    })
}

/// Schema for `AtsFeedback`.
pub fn ats_feedback_schema() -> Value {
    let string_list = json!({ "type": "ARRAY", "items": { "type": "STRING" } });
    json!({
        "type": "OBJECT",
        "properties": {
            "score": { "type": "NUMBER" },
            "improvements": string_list,
            "suggestedKeywords": string_list,
            "redFlags": string_list,
            "jdMatchAnalysis": { "type": "STRING" }
        },
        "required": ["score", "improvements", "suggestedKeywords", "redFlags", "jdMatchAnalysis"]
    })
}
