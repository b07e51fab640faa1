use crate::{
    opentelemetry::{trace_operation, WorkbenchOperation},
    sanitizer::{parse_object, sanitize},
    Artifact, DerivationError,
};
use forge_sdk::{
    LanguageModel, LanguageModelError, LanguageModelInput, Message, ResponseFormatJson,
    ResponseFormatOption,
};
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};

/// Report used when the model answers with nothing.
pub const EMPTY_REPORT_FALLBACK: &str = "Validation finished, but the model returned no report.";
/// Report used when the validation call itself fails.
pub const VALIDATION_FAILURE_REPORT: &str =
    "Validation could not be completed because the model was unreachable. Please try again.";

const AUDITOR_SYSTEM_PROMPT: &str = "You are a meticulous JSON Schema reviewer.";

fn validation_directive(schema: &str, example: &str) -> String {
    format!(
        "Check whether the JSON payload conforms to the JSON Schema.\n\n\
         SCHEMA:\n{schema}\n\n\
         PAYLOAD:\n{example}\n\n\
         Answer in markdown. Start with a clear verdict: VALID or INVALID. \
         If INVALID, list every error with the JSON path of the offending value. \
         Finish with a short fix suggestion for each error."
    )
}

fn derivation_directive(example: &str) -> String {
    format!(
        "Derive a JSON Schema (draft 2020-12) that the payload below conforms to.\n\
         Infer types, formats and required fields from the values. \
         Answer with the schema only.\n\n\
         PAYLOAD:\n{example}"
    )
}

/// Model-backed schema checks: validate a payload against a schema and derive
/// a schema from a payload.
#[derive(Clone)]
pub struct SchemaAuditor {
    model: Arc<dyn LanguageModel + Send + Sync>,
}

impl SchemaAuditor {
    pub fn new(model: Arc<dyn LanguageModel + Send + Sync>) -> Self {
        Self { model }
    }

    /// Ask the model whether `example` conforms to `schema` and return its
    /// markdown report.
    ///
    /// Never fails: an empty answer becomes [`EMPTY_REPORT_FALLBACK`] and a
    /// failed call becomes [`VALIDATION_FAILURE_REPORT`].
    pub async fn validate(&self, schema: &str, example: &str) -> String {
        let result = trace_operation(
            WorkbenchOperation::Validate,
            "schema",
            self.request_report(schema, example),
        )
        .await;

        match result {
            Ok(report) if report.trim().is_empty() => EMPTY_REPORT_FALLBACK.to_string(),
            Ok(report) => report,
            Err(error) => {
                warn!(error = %error, "schema validation call failed");
                VALIDATION_FAILURE_REPORT.to_string()
            }
        }
    }

    async fn request_report(
        &self,
        schema: &str,
        example: &str,
    ) -> Result<String, LanguageModelError> {
        let response = self
            .model
            .generate(LanguageModelInput {
                system_prompt: Some(AUDITOR_SYSTEM_PROMPT.to_string()),
                messages: vec![Message::user(validation_directive(schema, example))],
                ..Default::default()
            })
            .await?;
        Ok(response.text())
    }

    /// Ask the model for a JSON Schema describing `example`.
    ///
    /// The answer is requested as JSON and comes back trimmed and sanitized.
    /// When it holds a readable object it is pretty-printed.
    pub async fn derive_schema(&self, example: &str) -> Result<String, DerivationError> {
        trace_operation(
            WorkbenchOperation::DeriveSchema,
            "example",
            self.request_schema(example),
        )
        .await
        .inspect_err(|error| warn!(error = %error, "schema derivation failed"))
    }

    async fn request_schema(&self, example: &str) -> Result<String, DerivationError> {
        let response = self
            .model
            .generate(LanguageModelInput {
                system_prompt: Some(AUDITOR_SYSTEM_PROMPT.to_string()),
                messages: vec![Message::user(derivation_directive(example))],
                response_format: Some(ResponseFormatOption::Json(ResponseFormatJson {
                    name: "json_schema".to_string(),
                    description: None,
                    schema: None,
                })),
                ..Default::default()
            })
            .await?;

        let text = response.text();
        let text = text.trim();
        if text.is_empty() {
            return Err(DerivationError::new("The model returned an empty schema."));
        }

        Ok(match parse_object(text) {
            Ok(object) => serde_json::to_string_pretty(&Value::Object(object))
                .unwrap_or_else(|_| sanitize(text)),
            Err(_) => sanitize(text),
        })
    }
}

/// Editing state for one artifact's schema checks.
///
/// The example payload is editable. A derived schema, once produced, replaces
/// the artifact's own schema for later validations.
pub struct AuditWorkbench {
    auditor: SchemaAuditor,
    example: String,
    artifact_schema: String,
    derived_schema: Option<String>,
}

impl AuditWorkbench {
    pub fn new(auditor: SchemaAuditor, artifact: &Artifact) -> Self {
        Self {
            auditor,
            example: artifact.example.clone(),
            artifact_schema: artifact.schema.clone(),
            derived_schema: None,
        }
    }

    pub fn example(&self) -> &str {
        &self.example
    }

    pub fn set_example(&mut self, example: impl Into<String>) {
        self.example = example.into();
    }

    /// Schema later validations run against: the derived one if present,
    /// otherwise the artifact's.
    pub fn active_schema(&self) -> &str {
        self.derived_schema
            .as_deref()
            .unwrap_or(&self.artifact_schema)
    }

    pub fn derived_schema(&self) -> Option<&str> {
        self.derived_schema.as_deref()
    }

    /// Validate the current example against the active schema.
    pub async fn validate(&self) -> String {
        self.auditor
            .validate(self.active_schema(), &self.example)
            .await
    }

    /// Derive a schema from the current example and make it the active one.
    /// A failed derivation leaves the active schema untouched.
    pub async fn derive(&mut self) -> Result<&str, DerivationError> {
        let schema = self.auditor.derive_schema(&self.example).await?;
        info!(bytes = schema.len(), "derived schema is now active");
        Ok(self.derived_schema.insert(schema).as_str())
    }
}
