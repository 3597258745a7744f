//! OpenAI-compatible chat completion adapter.
//!
//! Answers with either the assistant text or, when the model chose one of
//! the offered tools, the first tool call with its parsed arguments.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{upstream_failure, ChatMessage, Completion, CompletionGateway, CompletionRequest};
use crate::error::FunctionError;

pub struct HttpCompletionGateway {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

#[derive(Debug, Serialize)]
struct ApiRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<ApiTool<'a>>,
}

#[derive(Debug, Serialize)]
struct ApiTool<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    function: ApiFunction<'a>,
}

#[derive(Debug, Serialize)]
struct ApiFunction<'a> {
    name: &'a str,
    description: &'a str,
    parameters: &'a serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    choices: Vec<ApiChoice>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiMessage,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<ApiToolCall>,
}

#[derive(Debug, Deserialize)]
struct ApiToolCall {
    function: ApiCalledFunction,
}

#[derive(Debug, Deserialize)]
struct ApiCalledFunction {
    name: String,
    /// JSON-encoded string
    arguments: String,
}

impl HttpCompletionGateway {
    pub fn new(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
        }
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

#[async_trait]
impl CompletionGateway for HttpCompletionGateway {
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, FunctionError> {
        let body = ApiRequest {
            model: &self.model,
            messages: &request.messages,
            tools: request
                .tools
                .iter()
                .map(|t| ApiTool {
                    kind: "function",
                    function: ApiFunction {
                        name: &t.name,
                        description: &t.description,
                        parameters: &t.parameters,
                    },
                })
                .collect(),
        };

        let response = self
            .client
            .post(self.completions_url())
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let (status, message) = upstream_failure("AI gateway", response).await;
            return Err(FunctionError::Upstream { status, message });
        }

        let parsed: ApiResponse = response
            .json()
            .await
            .map_err(|e| FunctionError::Unknown(format!("Failed to parse completion: {e}")))?;
        let message = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message)
            .ok_or_else(|| FunctionError::Unknown("No choices in completion".into()))?;

        if let Some(call) = message.tool_calls.into_iter().next() {
            let arguments = serde_json::from_str(&call.function.arguments).map_err(|e| {
                FunctionError::Unknown(format!("Tool call arguments are not JSON: {e}"))
            })?;
            return Ok(Completion::ToolCall {
                name: call.function.name,
                arguments,
            });
        }

        Ok(Completion::Text {
            text: message.content.unwrap_or_default(),
        })
    }
}
