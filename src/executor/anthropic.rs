//! Anthropic Messages API executor with a tool-use loop.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::config::ExecutorConfig;
use crate::error::ExecutorError;
use crate::executor::retry::RetryPolicy;
use crate::executor::{ExecutionRequest, Executor, Role};

const API_VERSION: &str = "2023-06-01";

/// Executor backed by the Anthropic Messages API.
///
/// Tool calls requested by the model are run against the invoking agent's
/// registry and fed back until the model stops asking, or until
/// `max_tool_rounds` round trips have happened.
pub struct AnthropicExecutor {
    client: Client,
    api_key: SecretString,
    model: String,
    base_url: String,
    max_tokens: u32,
    max_tool_rounds: usize,
    retry: RetryPolicy,
}

impl AnthropicExecutor {
    pub fn new(api_key: SecretString, config: &ExecutorConfig) -> Self {
        Self {
            client: Client::new(),
            api_key,
            model: config.model.clone(),
            base_url: config.base_url.clone(),
            max_tokens: config.max_tokens,
            max_tool_rounds: config.max_tool_rounds,
            retry: RetryPolicy::default().with_max_retries(config.max_retries),
        }
    }

    /// Build from config, or `None` when no API key is configured.
    pub fn from_config(config: &ExecutorConfig) -> Option<Self> {
        config
            .api_key
            .clone()
            .map(|key| Self::new(key, config))
    }

    fn parse_retry_after(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
        headers
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse::<u64>().ok())
            .map(Duration::from_secs)
    }

    async fn send(&self, body: &MessagesRequest<'_>) -> Result<MessagesResponse, ExecutorError> {
        let response = self
            .client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", self.api_key.expose_secret())
            .header("anthropic-version", API_VERSION)
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(|e| ExecutorError::RequestFailed(e.to_string()))?;

        let status = response.status();
        let retry_after = Self::parse_retry_after(response.headers());
        let text = response
            .text()
            .await
            .map_err(|e| ExecutorError::RequestFailed(e.to_string()))?;

        if status.as_u16() == 429 {
            return Err(ExecutorError::RateLimited { retry_after });
        }
        if status.is_server_error() {
            return Err(ExecutorError::RequestFailed(format!("HTTP {status}: {text}")));
        }
        if !status.is_success() {
            let reason = serde_json::from_str::<ApiError>(&text)
                .map(|e| e.error.message)
                .unwrap_or(text);
            return Err(ExecutorError::Failed(format!(
                "Anthropic API error {status}: {reason}"
            )));
        }

        serde_json::from_str(&text)
            .map_err(|e| ExecutorError::InvalidResponse(format!("{e}, body: {text}")))
    }
}

#[async_trait]
impl Executor for AnthropicExecutor {
    fn name(&self) -> &str {
        "anthropic"
    }

    async fn execute(&self, request: ExecutionRequest) -> Result<String, ExecutorError> {
        let mut messages: Vec<Message> = request
            .history
            .iter()
            .map(|turn| Message {
                role: turn.role,
                content: vec![ContentBlock::Text {
                    text: turn.content.clone(),
                }],
            })
            .collect();
        messages.push(Message {
            role: Role::User,
            content: vec![ContentBlock::Text {
                text: request.prompt.clone(),
            }],
        });

        let tools: Vec<ApiTool> = match &request.tools {
            Some(registry) => registry
                .tool_definitions()
                .await
                .into_iter()
                .map(|def| ApiTool {
                    name: def.name,
                    description: def.description,
                    input_schema: def.parameters,
                })
                .collect(),
            None => Vec::new(),
        };

        let mut rounds = 0;
        loop {
            let body = MessagesRequest {
                model: &self.model,
                max_tokens: self.max_tokens,
                system: request.system_prompt.as_deref(),
                messages: &messages,
                tools: &tools,
            };
            let response = self.retry.run(|| self.send(&body)).await?;

            let tool_uses: Vec<(String, String, serde_json::Value)> = response
                .content
                .iter()
                .filter_map(|block| match block {
                    ContentBlock::ToolUse { id, name, input } => {
                        Some((id.clone(), name.clone(), input.clone()))
                    }
                    _ => None,
                })
                .collect();

            if tool_uses.is_empty() || response.stop_reason.as_deref() != Some("tool_use") {
                return Ok(response.text());
            }
            if rounds >= self.max_tool_rounds {
                return Err(ExecutorError::TooManyToolRounds {
                    max: self.max_tool_rounds,
                });
            }
            rounds += 1;

            messages.push(Message {
                role: Role::Assistant,
                content: response
                    .content
                    .into_iter()
                    .filter(|block| !matches!(block, ContentBlock::Unsupported))
                    .collect(),
            });

            let mut results = Vec::with_capacity(tool_uses.len());
            for (id, name, input) in tool_uses {
                tracing::debug!("{} Tool call: {name}", request.context.label());
                let outcome = match &request.tools {
                    Some(registry) => registry.execute(&name, input, &request.context).await,
                    None => Err(crate::tools::ToolError::NotFound(name.clone())),
                };
                results.push(match outcome {
                    Ok(output) => ContentBlock::ToolResult {
                        tool_use_id: id,
                        content: output.as_text(),
                        is_error: false,
                    },
                    Err(e) => ContentBlock::ToolResult {
                        tool_use_id: id,
                        content: format!("Error: {e}"),
                        is_error: true,
                    },
                });
            }
            messages.push(Message {
                role: Role::User,
                content: results,
            });
        }
    }
}

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    messages: &'a [Message],
    #[serde(skip_serializing_if = "no_tools")]
    tools: &'a [ApiTool],
}

fn no_tools(tools: &&[ApiTool]) -> bool {
    tools.is_empty()
}

#[derive(Debug, Serialize)]
struct Message {
    role: Role,
    content: Vec<ContentBlock>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
        #[serde(default, skip_serializing_if = "std::ops::Not::not")]
        is_error: bool,
    },
    #[serde(other)]
    Unsupported,
}

#[derive(Debug, Serialize)]
struct ApiTool {
    name: String,
    description: String,
    input_schema: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
    stop_reason: Option<String>,
}

impl MessagesResponse {
    fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[derive(Debug, Deserialize)]
struct ApiError {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}
