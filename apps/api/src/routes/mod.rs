pub mod health;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};

use crate::ai::handlers;
use crate::state::AppState;

/// Resume uploads arrive as base64 JSON, so allow large bodies.
const MAX_BODY_BYTES: usize = 50 * 1024 * 1024;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        .route("/api/ai/convert", post(handlers::handle_convert))
        .route("/api/ai/text", post(handlers::handle_structure_text))
        .route("/api/ai/improve", post(handlers::handle_improve))
        .route("/api/ai/reorder", post(handlers::handle_reorder))
        .route("/api/ai/feedback", post(handlers::handle_feedback))
        .route("/api/ai/models", get(handlers::handle_list_models))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use async_trait::async_trait;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use crate::ai::prompts::{FILE_MODEL, TEXT_MODEL};
    use crate::config::Config;
    use crate::llm_client::{GenerateRequest, GenerativeModel, LlmError, ModelInfo, Part};

    enum Reply {
        Text(&'static str),
        Fail(LlmError),
        Hang,
    }

    /// Answers each generate call with the next scripted reply and records the request.
    struct ScriptedModel {
        replies: Mutex<VecDeque<Reply>>,
        requests: Mutex<Vec<GenerateRequest>>,
    }

    impl ScriptedModel {
        fn new(replies: Vec<Reply>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.into()),
                requests: Mutex::new(Vec::new()),
            })
        }

        fn requests(&self) -> Vec<GenerateRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl GenerativeModel for ScriptedModel {
        async fn generate(&self, request: &GenerateRequest) -> Result<String, LlmError> {
            self.requests.lock().unwrap().push(request.clone());
            let reply = self.replies.lock().unwrap().pop_front();
            match reply {
                Some(Reply::Text(text)) => Ok(text.to_string()),
                Some(Reply::Fail(error)) => Err(error),
                Some(Reply::Hang) => std::future::pending().await,
                None => Err(LlmError::EmptyContent),
            }
        }

        async fn list_models(&self) -> Result<Vec<ModelInfo>, LlmError> {
            Ok(vec![ModelInfo {
                name: "models/gemini-2.5-flash".to_string(),
                supported_generation_methods: vec!["generateContent".to_string()],
            }])
        }
    }

    fn test_config() -> Config {
        Config {
            gemini_api_key: "test-key".to_string(),
            gemini_base_url: "http://localhost:0".to_string(),
            ai_max_attempts: 3,
            ai_request_timeout: Duration::from_secs(5),
            port: 0,
            rust_log: "debug".to_string(),
        }
    }

    fn app(model: &Arc<ScriptedModel>) -> Router {
        build_router(AppState {
            llm: model.clone(),
            config: test_config(),
        })
    }

    fn api_error(status: u16, message: &str) -> LlmError {
        LlmError::Api {
            status,
            message: message.to_string(),
            details: vec![],
        }
    }

    async fn send(app: Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    #[tokio::test]
    async fn test_health() {
        let model = ScriptedModel::new(vec![]);
        let (status, body) = send(app(&model), "GET", "/health", None).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["service"], "resume-api");
    }

    #[tokio::test]
    async fn test_convert_returns_structured_resume() {
        let model = ScriptedModel::new(vec![Reply::Text(
            "```json\n{\"candidateName\":\"Jane Doe\",\"htmlContent\":\"<h1>Jane Doe</h1>\",\"rawText\":\"Jane Doe\",\"confidence\":0.92}\n```",
        )]);

        let (status, body) = send(
            app(&model),
            "POST",
            "/api/ai/convert",
            Some(json!({
                "base64Data": "JVBERi0xLjQ=",
                "mimeType": "application/pdf",
                "jobDescription": "Senior Rust engineer"
            })),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["candidateName"], "Jane Doe");
        assert_eq!(body["htmlContent"], "<h1>Jane Doe</h1>");

        let requests = model.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].model, FILE_MODEL);
        assert!(requests[0].response_schema.is_some());
        match &requests[0].parts[0] {
            Part::InlineData { inline_data } => {
                assert_eq!(inline_data.mime_type, "application/pdf");
                assert_eq!(inline_data.data, "JVBERi0xLjQ=");
            }
            other => panic!("expected inline data first, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_structure_text_rejects_empty_text() {
        let model = ScriptedModel::new(vec![]);
        let (status, body) = send(
            app(&model),
            "POST",
            "/api/ai/text",
            Some(json!({ "pastedText": "   " })),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
        assert!(model.requests().is_empty());
    }

    #[tokio::test]
    async fn test_reorder_requires_job_description_field() {
        let model = ScriptedModel::new(vec![]);
        let (status, _) = send(
            app(&model),
            "POST",
            "/api/ai/reorder",
            Some(json!({ "currentHtml": "<h2>SKILLS</h2>" })),
        )
        .await;

        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn test_improve_strips_fences_from_html() {
        let model = ScriptedModel::new(vec![Reply::Text("```html\n<h2>EXPERIENCE</h2>\n```")]);
        let (status, body) = send(
            app(&model),
            "POST",
            "/api/ai/improve",
            Some(json!({ "currentHtml": "<h2>Experience</h2>", "instruction": "Uppercase headers" })),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["html"], "<h2>EXPERIENCE</h2>");
        assert_eq!(model.requests()[0].model, TEXT_MODEL);
        assert!(model.requests()[0].response_schema.is_none());
    }

    #[tokio::test]
    async fn test_exhausted_retries_map_to_service_unavailable() {
        let model = ScriptedModel::new(vec![Reply::Fail(api_error(503, "The model is overloaded."))]);
        let (status, body) = send(
            app(&model),
            "POST",
            "/api/ai/reorder",
            Some(json!({ "currentHtml": "<h2>SKILLS</h2>", "jobDescription": "Intern" })),
        )
        .await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["error"]["code"], "AI_UNAVAILABLE");
    }

    #[tokio::test]
    async fn test_terminal_failure_maps_to_llm_error() {
        let model = ScriptedModel::new(vec![Reply::Fail(api_error(400, "Request contains an invalid argument."))]);
        let (status, body) = send(
            app(&model),
            "POST",
            "/api/ai/feedback",
            Some(json!({ "resumeText": "Jane Doe" })),
        )
        .await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"]["code"], "LLM_ERROR");
        assert_eq!(body["error"]["message"], "Failed to generate ATS feedback.");
    }

    #[tokio::test]
    async fn test_feedback_returns_scores() {
        let model = ScriptedModel::new(vec![Reply::Text(
            r#"{"score":78,"improvements":["Quantify impact"],"suggestedKeywords":["Tokio"],"redFlags":[],"jdMatchAnalysis":"Good fit"}"#,
        )]);
        let (status, body) = send(
            app(&model),
            "POST",
            "/api/ai/feedback",
            Some(json!({ "resumeText": "Jane Doe", "jobDescription": "Rust" })),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["score"], 78.0);
        assert_eq!(body["suggestedKeywords"][0], "Tokio");
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_call_hits_deadline() {
        let model = ScriptedModel::new(vec![Reply::Hang]);
        let (status, body) = send(
            app(&model),
            "POST",
            "/api/ai/text",
            Some(json!({ "pastedText": "Jane Doe" })),
        )
        .await;

        assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(body["error"]["code"], "DEADLINE_EXCEEDED");
        assert_eq!(body["error"]["message"], "Failed to structure text.");
    }

    #[tokio::test]
    async fn test_list_models() {
        let model = ScriptedModel::new(vec![]);
        let (status, body) = send(app(&model), "GET", "/api/ai/models", None).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["models"][0]["name"], "models/gemini-2.5-flash");
        assert_eq!(body["models"][0]["supportedGenerationMethods"][0], "generateContent");
    }
}
