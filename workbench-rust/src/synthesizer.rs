use crate::{
    artifact::{artifact_from_synthesis, sources_from_citations, synthesis_response_schema},
    opentelemetry::{trace_operation, WorkbenchOperation},
    sanitizer::parse_object,
    Artifact, Source, SynthesisError,
};
use forge_sdk::{
    LanguageModel, LanguageModelInput, Message, ResponseFormatJson, ResponseFormatOption, Tool,
};
use std::sync::Arc;
use tracing::{debug, info, warn};

const RESEARCH_SYSTEM_PROMPT: &str = "You are a senior data architect. You research how real \
systems model their data and report field-level facts, citing the documents you used.";

const SYNTHESIS_SYSTEM_PROMPT: &str = "You are a senior data architect. You turn research notes \
into precise, reusable data-shape packages and always answer with a single JSON object.";

fn research_directive(query: &str) -> String {
    format!(
        "Research the data shape of: \"{query}\".\n\
         Use Google Search and prefer authoritative technical sources: official documentation, \
         API references and specifications, schema registries such as schema.org or the JSON \
         Schema Store, and standards bodies.\n\
         Report:\n\
         1. The canonical field names, spelled exactly as the sources spell them.\n\
         2. How the fields nest: objects, arrays and enumerations.\n\
         3. Which fields are required and which are optional, with their data types and formats.\n\
         4. Notable constraints such as value ranges, array cardinality and date formats.\n\
         Be factual and concise."
    )
}

fn synthesis_directive(query: &str, research: &str) -> String {
    format!(
        "Using the research below, produce a reusable data-shape package for \"{query}\".\n\n\
         RESEARCH:\n{research}\n\n\
         Answer with one JSON object with these fields:\n\
         - title: short name of the data shape.\n\
         - description: markdown overview of the shape and where it is used.\n\
         - jsonPrompt: an instruction set that makes a language model emit JSON of this shape. \
         It must enumerate every field name, its data type, any array cardinality constraint, \
         and whether the field is required or optional.\n\
         - exampleJson: a realistic example payload, serialized as a JSON string.\n\
         - tsInterface: TypeScript interface definitions for the shape.\n\
         - jsonSchema: a JSON Schema for the shape, serialized as a JSON string.\n\
         - promptVariations: exactly 3 alternative phrasings of jsonPrompt."
    )
}

/// Output of the research stage.
#[derive(Debug, Clone)]
struct Research {
    text: String,
    sources: Vec<Source>,
}

/// Two-stage artifact builder: a grounded research call, then a
/// schema-constrained synthesis call that reads the research text.
#[derive(Clone)]
pub struct ArtifactSynthesizer {
    research_model: Arc<dyn LanguageModel + Send + Sync>,
    synthesis_model: Arc<dyn LanguageModel + Send + Sync>,
}

impl ArtifactSynthesizer {
    /// Use one model for both stages.
    pub fn new(model: Arc<dyn LanguageModel + Send + Sync>) -> Self {
        Self {
            research_model: Arc::clone(&model),
            synthesis_model: model,
        }
    }

    pub fn with_models(
        research_model: Arc<dyn LanguageModel + Send + Sync>,
        synthesis_model: Arc<dyn LanguageModel + Send + Sync>,
    ) -> Self {
        Self {
            research_model,
            synthesis_model,
        }
    }

    /// Research `query` on the web, then synthesize an artifact from the
    /// findings. Either stage failing fails the whole call; nothing partial is
    /// returned.
    pub async fn synthesize(&self, query: &str) -> Result<Artifact, SynthesisError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(SynthesisError::new("Enter a data shape to research."));
        }

        trace_operation(WorkbenchOperation::Synthesize, query, self.run(query))
            .await
            .inspect_err(|error| warn!(query, error = %error, "artifact synthesis failed"))
    }

    async fn run(&self, query: &str) -> Result<Artifact, SynthesisError> {
        let research = self.research(query).await?;
        info!(
            query,
            sources = research.sources.len(),
            "research stage complete"
        );

        let artifact = self.compose(query, research).await?;
        info!(query, title = %artifact.title, "artifact synthesized");
        Ok(artifact)
    }

    async fn research(&self, query: &str) -> Result<Research, SynthesisError> {
        let response = self
            .research_model
            .generate(LanguageModelInput {
                system_prompt: Some(RESEARCH_SYSTEM_PROMPT.to_string()),
                messages: vec![Message::user(research_directive(query))],
                tools: Some(vec![Tool::GoogleSearch]),
                ..Default::default()
            })
            .await?;

        let text = response.text();
        if text.trim().is_empty() {
            return Err(SynthesisError::new(
                "The research stage returned no findings.",
            ));
        }

        Ok(Research {
            sources: sources_from_citations(&response.citations),
            text,
        })
    }

    async fn compose(&self, query: &str, research: Research) -> Result<Artifact, SynthesisError> {
        let response = self
            .synthesis_model
            .generate(LanguageModelInput {
                system_prompt: Some(SYNTHESIS_SYSTEM_PROMPT.to_string()),
                messages: vec![Message::user(synthesis_directive(query, &research.text))],
                response_format: Some(ResponseFormatOption::Json(ResponseFormatJson {
                    name: "data_shape_package".to_string(),
                    description: Some(
                        "A reusable data-shape package for prompting language models.".to_string(),
                    ),
                    schema: Some(synthesis_response_schema()),
                })),
                ..Default::default()
            })
            .await?;

        let text = response.text();
        let object = parse_object(&text).map_err(|error| {
            debug!(error = %error, raw = %text, "synthesis output is not a JSON object");
            SynthesisError::malformed_output()
        })?;

        let artifact = artifact_from_synthesis(&object, research.sources);
        if artifact.prompt.trim().is_empty() || artifact.example.trim().is_empty() {
            return Err(SynthesisError::new(
                "The synthesized package is missing its prompt or example payload.",
            ));
        }

        Ok(artifact)
    }
}
