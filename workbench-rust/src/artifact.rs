use chrono::{DateTime, Utc};
use forge_sdk::{Citation, JSONSchema};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::HashSet;
use uuid::Uuid;

/// Grounding URIs equal to this are stand-ins, not real documents.
pub const PLACEHOLDER_URI: &str = "#";
/// Upper bound on the sources kept per artifact.
pub const MAX_SOURCES: usize = 5;
/// Upper bound on the alternate prompt phrasings kept per artifact.
pub const MAX_VARIATIONS: usize = 3;

/// A web document consulted during the research stage.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Source {
    pub title: String,
    pub uri: String,
}

impl Source {
    pub fn new(title: impl Into<String>, uri: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            uri: uri.into(),
        }
    }

    /// Stand-in source for research that produced no usable citation.
    #[must_use]
    pub fn fallback() -> Self {
        Self::new("Google Search", "https://www.google.com/")
    }
}

impl From<&Citation> for Source {
    fn from(citation: &Citation) -> Self {
        let title = if citation.title.trim().is_empty() {
            citation.uri.clone()
        } else {
            citation.title.clone()
        };
        Self::new(title, citation.uri.clone())
    }
}

/// Turn grounding citations into artifact sources.
///
/// Placeholder and empty URIs are dropped, repeated URIs keep their first
/// occurrence, and at most [`MAX_SOURCES`] survive. An empty result is
/// replaced by the single [`Source::fallback`].
#[must_use]
pub fn sources_from_citations(citations: &[Citation]) -> Vec<Source> {
    let mut seen = HashSet::new();
    let sources: Vec<Source> = citations
        .iter()
        .filter(|citation| {
            let uri = citation.uri.trim();
            !uri.is_empty() && uri != PLACEHOLDER_URI
        })
        .filter(|citation| seen.insert(citation.uri.clone()))
        .take(MAX_SOURCES)
        .map(Source::from)
        .collect();

    if sources.is_empty() {
        vec![Source::fallback()]
    } else {
        sources
    }
}

/// The synthesized data-shape package.
///
/// `example` and `schema` are serialized JSON text, `interface` is
/// TypeScript source. Artifacts are values: editing one means building a new
/// one.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct Artifact {
    pub title: String,
    /// Markdown overview of the shape.
    pub description: String,
    /// Instruction text telling a model to emit JSON of this shape.
    pub prompt: String,
    pub example: String,
    pub schema: String,
    pub interface: String,
    pub variations: Vec<String>,
    pub sources: Vec<Source>,
}

/// An artifact kept by the caller, stamped with an identity and creation time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SavedArtifact {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    #[serde(flatten)]
    pub artifact: Artifact,
}

impl SavedArtifact {
    #[must_use]
    pub fn new(artifact: Artifact) -> Self {
        Self {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            artifact,
        }
    }
}

pub(crate) const SYNTHESIS_FIELDS: [&str; 7] = [
    "title",
    "description",
    "jsonPrompt",
    "exampleJson",
    "tsInterface",
    "jsonSchema",
    "promptVariations",
];

/// JSON schema the synthesis model must answer with. All seven fields are
/// required.
#[must_use]
pub fn synthesis_response_schema() -> JSONSchema {
    json!({
        "type": "object",
        "properties": {
            "title": {
                "type": "string",
                "description": "Short name of the data shape."
            },
            "description": {
                "type": "string",
                "description": "Markdown overview of the data shape and where it is used."
            },
            "jsonPrompt": {
                "type": "string",
                "description": "Instruction text that makes a model emit JSON of this shape."
            },
            "exampleJson": {
                "type": "string",
                "description": "A realistic example payload, serialized as JSON."
            },
            "tsInterface": {
                "type": "string",
                "description": "TypeScript interface definitions for the shape."
            },
            "jsonSchema": {
                "type": "string",
                "description": "A JSON Schema for the shape, serialized as JSON."
            },
            "promptVariations": {
                "type": "array",
                "items": { "type": "string" },
                "description": "Three alternative phrasings of jsonPrompt."
            }
        },
        "required": SYNTHESIS_FIELDS,
    })
}

/// Build an artifact from the synthesis model's JSON object.
///
/// Fields the model skipped become empty. `exampleJson` and `jsonSchema` may
/// come back as nested JSON instead of strings; they are re-serialized.
pub(crate) fn artifact_from_synthesis(
    object: &Map<String, Value>,
    sources: Vec<Source>,
) -> Artifact {
    let text = |key: &str| match object.get(key) {
        Some(Value::String(text)) => text.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string()),
    };

    let variations = match object.get("promptVariations") {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::trim)
            .filter(|variation| !variation.is_empty())
            .take(MAX_VARIATIONS)
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    };

    Artifact {
        title: text("title"),
        description: text("description"),
        prompt: text("jsonPrompt"),
        example: text("exampleJson"),
        schema: text("jsonSchema"),
        interface: text("tsInterface"),
        variations,
        sources,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholder_and_duplicate_citations_are_dropped() {
        let citations = vec![
            Citation::new("Docs", "https://schema.org/Recipe"),
            Citation::new("Placeholder", "#"),
            Citation::new("Docs again", "https://schema.org/Recipe"),
            Citation::new("", ""),
            Citation::new("", "https://developers.google.com/search"),
        ];

        let sources = sources_from_citations(&citations);

        assert_eq!(
            sources,
            vec![
                Source::new("Docs", "https://schema.org/Recipe"),
                Source::new(
                    "https://developers.google.com/search",
                    "https://developers.google.com/search"
                ),
            ]
        );
    }

    #[test]
    fn sources_are_capped() {
        let citations: Vec<Citation> = (0..8)
            .map(|i| Citation::new(format!("Doc {i}"), format!("https://example.org/{i}")))
            .collect();

        let sources = sources_from_citations(&citations);

        assert_eq!(sources.len(), MAX_SOURCES);
        assert_eq!(sources[0].uri, "https://example.org/0");
        assert_eq!(sources[4].uri, "https://example.org/4");
    }

    #[test]
    fn no_usable_citation_yields_fallback() {
        assert_eq!(
            sources_from_citations(&[Citation::new("x", "#")]),
            vec![Source::fallback()]
        );
        assert_eq!(sources_from_citations(&[]), vec![Source::fallback()]);
    }

    #[test]
    fn nested_json_fields_are_serialized() {
        let object = json!({
            "title": "Recipe",
            "exampleJson": { "name": "Pancakes" },
            "jsonSchema": "{\"type\":\"object\"}",
            "promptVariations": ["a", " ", "b", "c", "d", 5]
        });
        let Value::Object(object) = object else {
            unreachable!()
        };

        let artifact = artifact_from_synthesis(&object, vec![Source::fallback()]);

        assert_eq!(artifact.title, "Recipe");
        assert_eq!(artifact.example, "{\n  \"name\": \"Pancakes\"\n}");
        assert_eq!(artifact.schema, "{\"type\":\"object\"}");
        assert_eq!(artifact.variations, vec!["a", "b", "c"]);
        assert_eq!(artifact.prompt, "");
    }

    #[test]
    fn saved_artifact_flattens_fields() {
        let saved = SavedArtifact::new(Artifact {
            title: "Invoice".into(),
            ..Default::default()
        });

        let value = serde_json::to_value(&saved).unwrap();

        assert_eq!(value["title"], "Invoice");
        assert_eq!(value["id"], saved.id.to_string());
        assert!(value.get("createdAt").is_some());
    }
}
