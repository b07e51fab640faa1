use super::api::{
    Candidate, Content, GenerateContentConfig, GenerateContentParameters, GenerateContentResponse,
    GoogleSearch, GroundingMetadata, Part as GooglePart, Tool as GoogleTool, UsageMetadata,
};
use crate::{
    client_utils, opentelemetry, stream_utils, Citation, ContentDelta, LanguageModel,
    LanguageModelError, LanguageModelInput, LanguageModelResult, LanguageModelStream, Message,
    ModelResponse, ModelUsage, Part, PartialModelResponse, ReasoningPart, ResponseFormatOption,
    Tool,
};
use async_stream::try_stream;
use futures::StreamExt;
use reqwest::{
    header::{HeaderMap, HeaderName, HeaderValue},
    Client,
};
use std::collections::HashMap;
use tracing::debug;

const PROVIDER: &str = "google";
const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

pub struct GoogleModel {
    model_id: String,
    api_key: String,
    base_url: String,
    client: Client,
    headers: HashMap<String, String>,
}

#[derive(Clone, Default)]
pub struct GoogleModelOptions {
    pub api_key: String,
    pub base_url: Option<String>,
    pub headers: Option<HashMap<String, String>>,
    pub client: Option<Client>,
}

impl GoogleModel {
    #[must_use]
    pub fn new(model_id: impl Into<String>, options: GoogleModelOptions) -> Self {
        let GoogleModelOptions {
            api_key,
            base_url,
            headers,
            client,
        } = options;

        let base_url = base_url
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
            .trim_end_matches('/')
            .to_string();

        Self {
            model_id: model_id.into(),
            api_key,
            base_url,
            client: client.unwrap_or_default(),
            headers: headers.unwrap_or_default(),
        }
    }

    fn request_headers(&self) -> LanguageModelResult<HeaderMap> {
        let mut headers = HeaderMap::new();

        // The key travels as a header so it never ends up in logged URLs.
        let api_key = HeaderValue::from_str(&self.api_key).map_err(|error| {
            LanguageModelError::InvalidInput(format!("Invalid Google API key: {error}"))
        })?;
        headers.insert(HeaderName::from_static("x-goog-api-key"), api_key);

        for (key, value) in &self.headers {
            let header_name = HeaderName::from_bytes(key.as_bytes()).map_err(|error| {
                LanguageModelError::InvalidInput(format!(
                    "Invalid Google header name '{key}': {error}"
                ))
            })?;
            let header_value = HeaderValue::from_str(value).map_err(|error| {
                LanguageModelError::InvalidInput(format!(
                    "Invalid Google header value for '{key}': {error}"
                ))
            })?;
            headers.insert(header_name, header_value);
        }

        Ok(headers)
    }
}

#[async_trait::async_trait]
impl LanguageModel for GoogleModel {
    fn provider(&self) -> &'static str {
        PROVIDER
    }

    fn model_id(&self) -> String {
        self.model_id.clone()
    }

    async fn generate(&self, input: LanguageModelInput) -> LanguageModelResult<ModelResponse> {
        opentelemetry::trace_generate(PROVIDER, &self.model_id, input, |input| async move {
            let params = convert_to_generate_content_parameters(input);
            let url = format!("{}/models/{}:generateContent", self.base_url, self.model_id);
            debug!(model = %self.model_id, "sending generateContent request");

            let headers = self.request_headers()?;
            let response: GenerateContentResponse =
                client_utils::send_json(&self.client, &url, &params, headers, PROVIDER).await?;

            let usage = response.usage_metadata.as_ref().map(map_google_usage);
            let candidate = first_candidate(response)?;
            let citations = map_grounding_citations(candidate.grounding_metadata.as_ref());

            if candidate.finish_reason.as_deref() == Some("SAFETY") {
                return Err(LanguageModelError::Refusal(
                    "Response was blocked for safety reasons".to_string(),
                ));
            }

            let content = map_google_content(
                candidate
                    .content
                    .and_then(|content| content.parts)
                    .unwrap_or_default(),
            );

            Ok(ModelResponse {
                content,
                citations,
                usage,
            })
        })
        .await
    }

    async fn stream(&self, input: LanguageModelInput) -> LanguageModelResult<LanguageModelStream> {
        opentelemetry::trace_stream(PROVIDER, &self.model_id, input, |input| async move {
            let params = convert_to_generate_content_parameters(input);
            let url = format!(
                "{}/models/{}:streamGenerateContent?alt=sse",
                self.base_url, self.model_id
            );
            debug!(model = %self.model_id, "sending streamGenerateContent request");

            let headers = self.request_headers()?;
            let mut chunk_stream = client_utils::send_sse_stream::<_, GenerateContentResponse>(
                &self.client,
                &url,
                &params,
                headers,
                PROVIDER,
            )
            .await?;

            let stream = try_stream! {
                let mut all_content_deltas: Vec<ContentDelta> = Vec::new();

                while let Some(chunk) = chunk_stream.next().await {
                    let response = chunk?;
                    let usage = response.usage_metadata.as_ref().map(map_google_usage);

                    let candidate = response
                        .candidates
                        .and_then(|candidates| candidates.into_iter().next());

                    if let Some(candidate) = candidate {
                        let citations =
                            map_grounding_citations(candidate.grounding_metadata.as_ref());
                        let parts = candidate
                            .content
                            .and_then(|content| content.parts)
                            .unwrap_or_default();

                        let incoming_deltas =
                            map_google_content_to_delta(parts, &all_content_deltas);
                        all_content_deltas.extend(incoming_deltas.iter().cloned());

                        for delta in incoming_deltas {
                            yield PartialModelResponse {
                                delta: Some(delta),
                                ..Default::default()
                            };
                        }

                        if !citations.is_empty() {
                            yield PartialModelResponse {
                                citations,
                                ..Default::default()
                            };
                        }
                    }

                    if usage.is_some() {
                        yield PartialModelResponse {
                            usage,
                            ..Default::default()
                        };
                    }
                }
            };

            Ok(LanguageModelStream::from_stream(stream))
        })
        .await
    }
}

fn first_candidate(response: GenerateContentResponse) -> LanguageModelResult<Candidate> {
    if let Some(candidate) = response
        .candidates
        .and_then(|candidates| candidates.into_iter().next())
    {
        return Ok(candidate);
    }

    match response
        .prompt_feedback
        .and_then(|feedback| feedback.block_reason_message.or(feedback.block_reason))
    {
        Some(reason) => Err(LanguageModelError::Refusal(reason)),
        None => Err(LanguageModelError::Invariant(
            PROVIDER,
            "No candidate in response".to_string(),
        )),
    }
}

fn convert_to_generate_content_parameters(input: LanguageModelInput) -> GenerateContentParameters {
    let mut params = GenerateContentParameters {
        contents: convert_to_google_contents(input.messages),
        ..Default::default()
    };

    if let Some(system_prompt) = input.system_prompt {
        params.system_instruction = Some(Content {
            role: Some("system".to_string()),
            parts: Some(vec![GooglePart {
                text: Some(system_prompt),
                ..Default::default()
            }]),
        });
    }

    if let Some(tools) = input.tools {
        params.tools = Some(
            tools
                .into_iter()
                .map(|tool| match tool {
                    Tool::GoogleSearch => GoogleTool {
                        google_search: Some(GoogleSearch {}),
                    },
                })
                .collect(),
        );
    }

    let mut config = GenerateContentConfig {
        temperature: input.temperature,
        top_p: input.top_p,
        top_k: input.top_k,
        max_output_tokens: input.max_tokens,
        seed: input.seed,
        ..Default::default()
    };

    if let Some(response_format) = input.response_format {
        match response_format {
            ResponseFormatOption::Text => {
                config.response_mime_type = Some("text/plain".to_string());
            }
            ResponseFormatOption::Json(json_format) => {
                config.response_mime_type = Some("application/json".to_string());
                config.response_json_schema = json_format.schema;
            }
        }
    }

    params.generation_config = Some(config);
    params.extra = input.extra;

    params
}

fn convert_to_google_contents(messages: Vec<Message>) -> Vec<Content> {
    messages
        .into_iter()
        .map(|message| {
            let (role, parts) = match message {
                Message::User(user_message) => ("user", user_message.content),
                Message::Assistant(assistant_message) => ("model", assistant_message.content),
            };
            Content {
                role: Some(role.to_string()),
                parts: Some(parts.into_iter().map(convert_to_google_part).collect()),
            }
        })
        .collect()
}

fn convert_to_google_part(part: Part) -> GooglePart {
    match part {
        Part::Text(text_part) => GooglePart {
            text: Some(text_part.text),
            ..Default::default()
        },
        Part::Reasoning(reasoning_part) => GooglePart {
            text: Some(reasoning_part.text),
            thought: Some(true),
            thought_signature: reasoning_part.signature,
        },
    }
}

fn map_google_content(parts: Vec<GooglePart>) -> Vec<Part> {
    parts
        .into_iter()
        .filter_map(|part| {
            let text = part.text?;
            if part.thought.unwrap_or(false) {
                let mut reasoning_part = ReasoningPart::new(text);
                reasoning_part.signature = part.thought_signature;
                Some(reasoning_part.into())
            } else {
                Some(Part::text(text))
            }
        })
        .collect()
}

fn map_google_content_to_delta(
    parts: Vec<GooglePart>,
    existing_deltas: &[ContentDelta],
) -> Vec<ContentDelta> {
    let mut deltas: Vec<ContentDelta> = Vec::new();

    for part in map_google_content(parts) {
        let part_delta = stream_utils::convert_part_to_part_delta(part);
        let all_content_deltas = existing_deltas
            .iter()
            .chain(deltas.iter())
            .collect::<Vec<_>>();
        let index = stream_utils::guess_delta_index(&part_delta, &all_content_deltas);
        deltas.push(ContentDelta {
            index,
            part: part_delta,
        });
    }

    deltas
}

/// Web grounding chunks in provider order. Chunks without a URI are skipped;
/// filtering of placeholder values is left to callers.
fn map_grounding_citations(metadata: Option<&GroundingMetadata>) -> Vec<Citation> {
    metadata
        .and_then(|metadata| metadata.grounding_chunks.as_ref())
        .map(|chunks| {
            chunks
                .iter()
                .filter_map(|chunk| chunk.web.as_ref())
                .filter_map(|web| {
                    let uri = web.uri.clone()?;
                    Some(Citation {
                        title: web.title.clone().unwrap_or_default(),
                        uri,
                    })
                })
                .collect()
        })
        .unwrap_or_default()
}

fn map_google_usage(usage: &UsageMetadata) -> ModelUsage {
    ModelUsage {
        input_tokens: usage.prompt_token_count.unwrap_or(0),
        output_tokens: usage.candidates_token_count.unwrap_or(0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ResponseFormatJson, UserMessage};
    use serde_json::json;

    #[test]
    fn grounded_json_request_serializes_search_tool_and_schema() {
        let input = LanguageModelInput {
            system_prompt: Some("Be precise".to_string()),
            messages: vec![Message::User(UserMessage {
                content: vec![Part::text("hello")],
            })],
            tools: Some(vec![Tool::GoogleSearch]),
            response_format: Some(ResponseFormatOption::Json(ResponseFormatJson {
                name: "shape".to_string(),
                description: None,
                schema: Some(json!({ "type": "object" })),
            })),
            ..Default::default()
        };

        let body = serde_json::to_value(convert_to_generate_content_parameters(input)).unwrap();

        assert_eq!(body["tools"], json!([{ "googleSearch": {} }]));
        assert_eq!(body["contents"][0]["role"], "user");
        assert_eq!(body["contents"][0]["parts"][0]["text"], "hello");
        assert_eq!(
            body["systemInstruction"]["parts"][0]["text"],
            "Be precise"
        );
        assert_eq!(
            body["generationConfig"]["responseMimeType"],
            "application/json"
        );
        assert_eq!(
            body["generationConfig"]["responseJsonSchema"],
            json!({ "type": "object" })
        );
    }

    #[test]
    fn assistant_messages_use_model_role() {
        let contents = convert_to_google_contents(vec![Message::assistant("hi")]);
        assert_eq!(contents[0].role.as_deref(), Some("model"));
    }

    #[test]
    fn grounding_chunks_map_to_citations() {
        let response: GenerateContentResponse = serde_json::from_value(json!({
            "candidates": [{
                "content": { "role": "model", "parts": [{ "text": "answer" }] },
                "groundingMetadata": {
                    "groundingChunks": [
                        { "web": { "uri": "https://json-schema.org", "title": "JSON Schema" } },
                        { "web": { "title": "no uri" } },
                        { }
                    ]
                }
            }]
        }))
        .unwrap();

        let candidate = first_candidate(response).unwrap();
        let citations = map_grounding_citations(candidate.grounding_metadata.as_ref());

        assert_eq!(
            citations,
            vec![Citation::new("JSON Schema", "https://json-schema.org")]
        );
    }

    #[test]
    fn thought_parts_become_reasoning() {
        let parts = map_google_content(vec![
            GooglePart {
                text: Some("pondering".to_string()),
                thought: Some(true),
                ..Default::default()
            },
            GooglePart {
                text: Some("answer".to_string()),
                ..Default::default()
            },
        ]);

        assert_eq!(
            parts,
            vec![Part::reasoning("pondering"), Part::text("answer")]
        );
    }

    #[test]
    fn blocked_prompt_is_a_refusal() {
        let response: GenerateContentResponse = serde_json::from_value(json!({
            "promptFeedback": { "blockReason": "SAFETY" }
        }))
        .unwrap();

        let error = first_candidate(response).unwrap_err();
        assert!(matches!(error, LanguageModelError::Refusal(reason) if reason == "SAFETY"));
    }
}
