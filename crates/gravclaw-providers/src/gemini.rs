//! Native Gemini `generateContent` adapter.
//!
//! Gemini has its own request shape: a separate `systemInstruction`,
//! `user`/`model`/`function` turns made of typed parts, and tool results
//! keyed by function name instead of call id. It also never returns call ids,
//! so this adapter synthesizes them.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, error};

use gravclaw_core::config::schema::ProviderConfig;
use gravclaw_core::types::{
    Attachment, ContentPart, LlmResponse, Message, MessageContent, ModelTier, ToolCall,
    ToolDefinition, UsageInfo,
};

use crate::error::ProviderError;
use crate::registry::ProviderSpec;
use crate::traits::{LlmProvider, LlmRequestConfig};

// ─────────────────────────────────────────────
// Request wire types
// ─────────────────────────────────────────────

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<ToolDeclarations>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'static str>,
    parts: Vec<Part>,
}

/// One request part. Serialized externally tagged, which is exactly
/// Gemini's `{"text": ...}` / `{"functionCall": {...}}` shape.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
enum Part {
    Text(String),
    InlineData(InlineData),
    FileData(FileData),
    FunctionCall(FunctionCallPart),
    FunctionResponse(FunctionResponsePart),
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FileData {
    file_uri: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct FunctionCallPart {
    name: String,
    #[serde(default)]
    args: Value,
}

#[derive(Debug, Serialize)]
struct FunctionResponsePart {
    name: String,
    response: Value,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ToolDeclarations {
    function_declarations: Vec<Value>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f64,
    max_output_tokens: u32,
}

// ─────────────────────────────────────────────
// Response wire types
// ─────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    usage_metadata: Option<UsageMetadata>,
    #[serde(default)]
    model_version: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

/// Response parts can carry extra keys (`thought`, `thoughtSignature`), so
/// they are read leniently rather than as the tagged request enum.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResponsePart {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    thought: Option<bool>,
    #[serde(default)]
    function_call: Option<FunctionCallPart>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: u32,
    #[serde(default)]
    total_token_count: u32,
}

// ─────────────────────────────────────────────
// Translation
// ─────────────────────────────────────────────

fn user_parts(content: &MessageContent) -> Vec<Part> {
    match content {
        MessageContent::Text(text) => vec![Part::Text(text.clone())],
        MessageContent::Parts(parts) => parts
            .iter()
            .map(|p| match p {
                ContentPart::Text { text } => Part::Text(text.clone()),
                ContentPart::ImageUrl { image_url } => {
                    match Attachment::from_data_uri(&image_url.url) {
                        Some(a) => Part::InlineData(InlineData {
                            mime_type: a.mime_type,
                            data: a.data,
                        }),
                        None => Part::FileData(FileData {
                            file_uri: image_url.url.clone(),
                        }),
                    }
                }
            })
            .collect(),
    }
}

/// Split the shared history into `systemInstruction` and `contents`.
fn format_messages(messages: &[Message]) -> (Option<Content>, Vec<Content>) {
    let mut system_texts: Vec<&str> = Vec::new();
    let mut contents: Vec<Content> = Vec::new();

    for msg in messages {
        let entry = match msg {
            Message::System { content } => {
                system_texts.push(content);
                continue;
            }
            Message::User { content } => Content {
                role: Some("user"),
                parts: user_parts(content),
            },
            Message::Assistant {
                content,
                tool_calls,
            } => {
                let mut parts = Vec::new();
                if let Some(text) = content.as_deref().filter(|t| !t.is_empty()) {
                    parts.push(Part::Text(text.to_string()));
                }
                for tc in tool_calls.iter().flatten() {
                    let args = serde_json::from_str(&tc.function.arguments).unwrap_or_else(|_| json!({}));
                    parts.push(Part::FunctionCall(FunctionCallPart {
                        name: tc.function.name.clone(),
                        args,
                    }));
                }
                if parts.is_empty() {
                    parts.push(Part::Text(String::new()));
                }
                Content {
                    role: Some("model"),
                    parts,
                }
            }
            Message::Tool {
                content,
                tool_call_id,
                name,
            } => Content {
                role: Some("function"),
                parts: vec![Part::FunctionResponse(FunctionResponsePart {
                    name: name.clone().unwrap_or_else(|| tool_call_id.clone()),
                    response: json!({ "result": content }),
                })],
            },
        };

        // Gemini wants alternating turns; fold consecutive same-role
        // entries together. Results of one parallel batch must arrive as a
        // single function turn with one part per call.
        match contents.last_mut() {
            Some(last) if last.role == entry.role => {
                last.parts.extend(entry.parts);
            }
            _ => contents.push(entry),
        }
    }

    let system = if system_texts.is_empty() {
        None
    } else {
        Some(Content {
            role: None,
            parts: vec![Part::Text(system_texts.join("\n\n"))],
        })
    };
    (system, contents)
}

/// Strip schema keywords Gemini rejects.
///
/// Drops `additionalProperties`, `$schema`, `$ref`, empty `required` and
/// empty `properties` (and then the bare `type: object`).
fn sanitize_schema(val: &Value) -> Value {
    match val {
        Value::Object(map) => {
            let mut clean = serde_json::Map::new();
            for (k, v) in map {
                if k == "additionalProperties" || k == "$schema" || k == "$ref" {
                    continue;
                }
                if k == "required" && v.as_array().is_some_and(|a| a.is_empty()) {
                    continue;
                }
                if k == "properties" && v.as_object().is_some_and(|o| o.is_empty()) {
                    continue;
                }
                clean.insert(k.clone(), sanitize_schema(v));
            }
            if clean.get("type").and_then(|v| v.as_str()) == Some("object")
                && !clean.contains_key("properties")
            {
                clean.remove("type");
            }
            Value::Object(clean)
        }
        Value::Array(arr) => Value::Array(arr.iter().map(sanitize_schema).collect()),
        other => other.clone(),
    }
}

fn format_tools(tools: &[ToolDefinition]) -> Vec<ToolDeclarations> {
    if tools.is_empty() {
        return Vec::new();
    }
    let function_declarations = tools
        .iter()
        .map(|t| {
            let mut decl = json!({
                "name": t.function.name,
                "description": t.function.description,
            });
            let params = sanitize_schema(&t.function.parameters);
            if params.as_object().is_some_and(|o| !o.is_empty()) {
                decl["parameters"] = params;
            }
            decl
        })
        .collect();
    vec![ToolDeclarations {
        function_declarations,
    }]
}

fn new_call_id() -> String {
    format!("call_{}", uuid::Uuid::new_v4().simple())
}

impl GenerateContentResponse {
    fn into_response(self, provider: &str, model: &str) -> Result<LlmResponse, ProviderError> {
        let candidate = self
            .candidates
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::Parse("no candidates in response".to_string()))?;

        let mut texts = Vec::new();
        let mut tool_calls = Vec::new();
        for part in candidate.content.map(|c| c.parts).unwrap_or_default() {
            if part.thought.unwrap_or(false) {
                continue;
            }
            if let Some(fc) = part.function_call {
                tool_calls.push(ToolCall::new(new_call_id(), fc.name, fc.args.to_string()));
            } else if let Some(text) = part.text {
                texts.push(text);
            }
        }

        Ok(LlmResponse {
            content: if texts.is_empty() {
                None
            } else {
                Some(texts.concat())
            },
            tool_calls,
            finish_reason: candidate.finish_reason,
            usage: self.usage_metadata.map(|u| UsageInfo {
                prompt_tokens: u.prompt_token_count,
                completion_tokens: u.candidates_token_count,
                total_tokens: u.total_token_count,
            }),
            provider: Some(provider.to_string()),
            model: Some(self.model_version.unwrap_or_else(|| model.to_string())),
            failovers: Vec::new(),
        })
    }
}

// ─────────────────────────────────────────────
// GeminiProvider
// ─────────────────────────────────────────────

pub struct GeminiProvider {
    client: reqwest::Client,
    api_base: String,
    api_key: String,
    model: String,
    high_model: String,
    spec: &'static ProviderSpec,
}

impl std::fmt::Debug for GeminiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiProvider")
            .field("api_base", &self.api_base)
            .field("model", &self.model)
            .field("high_model", &self.high_model)
            .finish()
    }
}

impl GeminiProvider {
    pub fn new(
        config: &ProviderConfig,
        spec: &'static ProviderSpec,
        timeout_secs: u64,
    ) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()?;

        let model = config
            .model
            .clone()
            .unwrap_or_else(|| spec.default_model.to_string());
        let high_model = config
            .high_model
            .clone()
            .or_else(|| spec.high_model.map(String::from))
            .unwrap_or_else(|| model.clone());

        Ok(GeminiProvider {
            client,
            api_base: config
                .api_base
                .clone()
                .unwrap_or_else(|| spec.default_api_base.to_string()),
            api_key: config.api_key.clone(),
            model,
            high_model,
            spec,
        })
    }

    fn model_for(&self, tier: ModelTier) -> &str {
        match tier {
            ModelTier::Efficient => &self.model,
            ModelTier::High => &self.high_model,
        }
    }

    fn generate_url(&self, model: &str) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.api_base.trim_end_matches('/'),
            model
        )
    }
}

#[async_trait]
impl LlmProvider for GeminiProvider {
    async fn chat(
        &self,
        messages: &[Message],
        tools: Option<&[ToolDefinition]>,
        config: &LlmRequestConfig,
    ) -> Result<LlmResponse, ProviderError> {
        let model = self.model_for(config.tier);
        let (system_instruction, contents) = format_messages(messages);

        debug!(
            provider = self.spec.display_name,
            model = model,
            contents = contents.len(),
            tools = tools.map_or(0, |t| t.len()),
            "Calling LLM"
        );

        let body = GenerateContentRequest {
            system_instruction,
            contents,
            tools: format_tools(tools.unwrap_or_default()),
            generation_config: GenerationConfig {
                temperature: config.temperature,
                max_output_tokens: config.max_tokens,
            },
        };

        let response = self
            .client
            .post(self.generate_url(model))
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                error!(provider = self.spec.display_name, error = %e, "HTTP request failed");
                ProviderError::Transport(e)
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error body".to_string());
            error!(provider = self.spec.display_name, status = %status, body = %error_text, "API error");
            return Err(ProviderError::Api {
                status: status.as_u16(),
                message: error_text,
            });
        }

        let parsed = response
            .json::<GenerateContentResponse>()
            .await
            .map_err(|e| ProviderError::Parse(e.to_string()))?;
        let resp = parsed.into_response(self.spec.display_name, model)?;

        debug!(
            provider = self.spec.display_name,
            has_content = resp.content.is_some(),
            tool_calls = resp.tool_calls.len(),
            "LLM response received"
        );
        Ok(resp)
    }

    fn default_model(&self) -> &str {
        &self.model
    }

    fn display_name(&self) -> &str {
        self.spec.display_name
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
