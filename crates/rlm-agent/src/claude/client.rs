//! Claude API client struct, request building, and response parsing.

use crate::{AiError, AiResponse, Message, Role, TokenUsage, ToolCall, ToolDefinition};

use super::config::{AuthMethod, ClaudeConfig};

pub(crate) const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
pub(crate) const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Claude API client.
pub struct ClaudeClient {
    pub(crate) config: ClaudeConfig,
    pub(crate) http: reqwest::Client,
}

impl ClaudeClient {
    pub fn new(config: ClaudeConfig) -> Result<Self, AiError> {
        let http = reqwest::Client::builder()
            .connect_timeout(std::time::Duration::from_secs(10))
            .timeout(std::time::Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| AiError::NetworkError(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { config, http })
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    /// Build auth headers for the configured auth method.
    pub(crate) fn auth_headers(&self) -> Result<reqwest::header::HeaderMap, AiError> {
        let invalid = |e: reqwest::header::InvalidHeaderValue| {
            AiError::ApiError(format!("invalid credential header: {e}"))
        };

        let mut headers = reqwest::header::HeaderMap::new();
        match self.config.auth_method {
            AuthMethod::ApiKey => {
                headers.insert("x-api-key", self.config.token.parse().map_err(invalid)?);
            }
            AuthMethod::OAuth => {
                headers.insert(
                    "Authorization",
                    format!("Bearer {}", self.config.token)
                        .parse()
                        .map_err(invalid)?,
                );
            }
        }
        headers.insert(
            "anthropic-version",
            reqwest::header::HeaderValue::from_static(ANTHROPIC_VERSION),
        );
        Ok(headers)
    }

    /// Build the JSON request body for the Messages API.
    pub(crate) fn build_request_body(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
    ) -> serde_json::Value {
        let mut msgs = Vec::new();
        let mut system: Option<&str> = None;
        for msg in messages {
            let role = match msg.role {
                Role::User => "user",
                Role::Assistant => "assistant",
                Role::System => {
                    // system is separate in Claude API
                    if system.is_none() {
                        system = Some(&msg.content);
                    }
                    continue;
                }
            };
            msgs.push(serde_json::json!({
                "role": role,
                "content": msg.content,
            }));
        }

        let mut body = serde_json::json!({
            "model": self.config.model,
            "max_tokens": self.config.max_tokens,
            "temperature": self.config.temperature,
            "messages": msgs,
        });

        if let Some(system) = system {
            body["system"] = serde_json::json!(system);
        }

        if !tools.is_empty() {
            let tool_defs: Vec<_> = tools.iter().map(to_claude_tool).collect();
            body["tools"] = serde_json::json!(tool_defs);
            body["tool_choice"] = serde_json::json!({ "type": "any" });
        }

        body
    }

    /// Parse a non-streaming response.
    pub(crate) fn parse_response(&self, json: serde_json::Value) -> Result<AiResponse, AiError> {
        let blocks = json["content"]
            .as_array()
            .ok_or_else(|| AiError::ParseError("response has no content array".into()))?;

        let content = blocks
            .iter()
            .filter(|b| b["type"] == "text")
            .filter_map(|b| b["text"].as_str())
            .collect::<Vec<_>>()
            .join("\n");

        let tool_calls = blocks
            .iter()
            .filter(|b| b["type"] == "tool_use")
            .map(|b| ToolCall {
                id: b["id"].as_str().unwrap_or("").to_string(),
                name: b["name"].as_str().unwrap_or("").to_string(),
                arguments: b["input"].clone(),
            })
            .collect();

        let usage = TokenUsage {
            input_tokens: json["usage"]["input_tokens"].as_u64().unwrap_or(0),
            output_tokens: json["usage"]["output_tokens"].as_u64().unwrap_or(0),
        };

        Ok(AiResponse {
            content,
            tool_calls,
            usage,
        })
    }
}

/// Convert a tool definition to the Claude API format.
pub(crate) fn to_claude_tool(tool: &ToolDefinition) -> serde_json::Value {
    serde_json::json!({
        "name": tool.name,
        "description": tool.description,
        "input_schema": tool.parameters,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn client() -> ClaudeClient {
        ClaudeClient::new(ClaudeConfig::new("test-token", AuthMethod::ApiKey)).unwrap()
    }

    #[test]
    fn system_message_is_lifted_out() {
        let body = client().build_request_body(
            &[
                Message::system("be terse"),
                Message::user("hi"),
                Message::assistant("hello"),
            ],
            &[],
        );
        assert_eq!(body["system"], "be terse");
        let msgs = body["messages"].as_array().unwrap();
        assert_eq!(msgs.len(), 2);
        assert_eq!(msgs[0]["role"], "user");
        assert_eq!(msgs[1]["role"], "assistant");
        assert!(body.get("tools").is_none());
    }

    #[test]
    fn tools_force_tool_choice() {
        let tool = ToolDefinition {
            name: "next_step".into(),
            description: "step".into(),
            parameters: json!({"type": "object"}),
        };
        let body = client().build_request_body(&[Message::user("go")], &[tool]);
        assert_eq!(body["tools"][0]["name"], "next_step");
        assert_eq!(body["tools"][0]["input_schema"]["type"], "object");
        assert_eq!(body["tool_choice"]["type"], "any");
    }

    #[test]
    fn parse_response_with_tool_use() {
        let response = client()
            .parse_response(json!({
                "content": [
                    {"type": "text", "text": "thinking"},
                    {"type": "tool_use", "id": "tu_1", "name": "next_step",
                     "input": {"reasoning": "r", "code": "1 + 1"}}
                ],
                "usage": {"input_tokens": 12, "output_tokens": 5}
            }))
            .unwrap();
        assert_eq!(response.content, "thinking");
        assert_eq!(response.tool_calls.len(), 1);
        assert_eq!(response.tool_calls[0].arguments["code"], "1 + 1");
        assert_eq!(response.usage.total_tokens(), 17);
    }

    #[test]
    fn parse_response_without_content_fails() {
        let err = client().parse_response(json!({"error": "x"})).unwrap_err();
        assert!(matches!(err, AiError::ParseError(_)));
    }

    #[test]
    fn auth_headers_by_method() {
        let headers = client().auth_headers().unwrap();
        assert_eq!(headers["x-api-key"], "test-token");
        assert_eq!(headers["anthropic-version"], ANTHROPIC_VERSION);

        let oauth =
            ClaudeClient::new(ClaudeConfig::new("tok", AuthMethod::OAuth)).unwrap();
        let headers = oauth.auth_headers().unwrap();
        assert_eq!(headers["Authorization"], "Bearer tok");
    }
}
