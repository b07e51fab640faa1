use forge_sdk::{
    forge_sdk_test::MockLanguageModel, Citation, LanguageModelError, Message, ModelResponse, Part,
    ResponseFormatOption, Tool,
};
use forge_workbench::{ArtifactSynthesizer, Source};
use serde_json::json;
use std::sync::Arc;

fn text_response(text: impl Into<String>) -> ModelResponse {
    ModelResponse {
        content: vec![Part::text(text)],
        ..Default::default()
    }
}

fn synthesis_payload() -> String {
    json!({
        "title": "Schema.org Recipe",
        "description": "A **recipe** with ingredients and steps.",
        "jsonPrompt": "Return a JSON object with name (string, required) and recipeIngredient (array of strings, at least 1).",
        "exampleJson": "{\"name\":\"Pancakes\",\"recipeIngredient\":[\"flour\",\"milk\"]}",
        "tsInterface": "interface Recipe { name: string; recipeIngredient: string[]; }",
        "jsonSchema": "{\"type\":\"object\",\"required\":[\"name\"]}",
        "promptVariations": ["Variation one", "Variation two", "Variation three"]
    })
    .to_string()
}

#[tokio::test]
async fn synthesizes_artifact_from_grounded_research() {
    let model = Arc::new(MockLanguageModel::new());
    model.enqueue_generate(
        text_response("Recipe uses name, recipeIngredient and recipeInstructions.").with_citations(
            vec![
                Citation::new("Recipe - Schema.org Type", "https://schema.org/Recipe"),
                Citation::new("placeholder", "#"),
                Citation::new("Recipe again", "https://schema.org/Recipe"),
                Citation::new(
                    "Recipe structured data",
                    "https://developers.google.com/search/docs/appearance/structured-data/recipe",
                ),
            ],
        ),
    );
    model.enqueue_generate(text_response(format!(
        "```json\n{}\n```",
        synthesis_payload()
    )));

    let synthesizer = ArtifactSynthesizer::new(model.clone());
    let artifact = synthesizer.synthesize("  recipe  ").await.unwrap();

    assert_eq!(artifact.title, "Schema.org Recipe");
    assert!(artifact.prompt.contains("recipeIngredient"));
    assert_eq!(
        artifact.example,
        "{\"name\":\"Pancakes\",\"recipeIngredient\":[\"flour\",\"milk\"]}"
    );
    assert_eq!(artifact.variations.len(), 3);
    assert_eq!(
        artifact.sources,
        vec![
            Source::new("Recipe - Schema.org Type", "https://schema.org/Recipe"),
            Source::new(
                "Recipe structured data",
                "https://developers.google.com/search/docs/appearance/structured-data/recipe"
            ),
        ]
    );

    let inputs = model.tracked_generate_inputs();
    assert_eq!(inputs.len(), 2);

    let research = &inputs[0];
    assert_eq!(research.tools, Some(vec![Tool::GoogleSearch]));
    assert_eq!(research.response_format, None);

    let synthesis = &inputs[1];
    assert_eq!(synthesis.tools, None);
    let Some(ResponseFormatOption::Json(format)) = &synthesis.response_format else {
        panic!("synthesis must request JSON output");
    };
    let schema = format.schema.as_ref().unwrap();
    assert_eq!(schema["required"].as_array().unwrap().len(), 7);

    let Message::User(message) = &synthesis.messages[0] else {
        panic!("synthesis directive must be a user message");
    };
    let Part::Text(directive) = &message.content[0] else {
        panic!("synthesis directive must be text");
    };
    assert!(directive
        .text
        .contains("Recipe uses name, recipeIngredient and recipeInstructions."));
    assert!(directive.text.contains("\"recipe\""));
}

#[tokio::test]
async fn research_failure_skips_synthesis() {
    let model = Arc::new(MockLanguageModel::new());
    model.enqueue_generate(LanguageModelError::Invariant(
        "google",
        "backend unavailable".into(),
    ));

    let error = ArtifactSynthesizer::new(model.clone())
        .synthesize("invoice")
        .await
        .unwrap_err();

    assert!(error.message().contains("backend unavailable"));
    assert_eq!(model.generate_call_count(), 1);
}

#[tokio::test]
async fn unreadable_synthesis_output_is_malformed() {
    let model = Arc::new(MockLanguageModel::new());
    model.enqueue_generate(text_response("Invoices have a number and line items."));
    model.enqueue_generate(text_response("Sorry, I cannot produce that package."));

    let error = ArtifactSynthesizer::new(model)
        .synthesize("invoice")
        .await
        .unwrap_err();

    assert_eq!(error.message(), "malformed synthesis output");
}

#[tokio::test]
async fn missing_citations_fall_back_to_generic_source() {
    let model = Arc::new(MockLanguageModel::new());
    model.enqueue_generate(
        text_response("Findings.").with_citations(vec![Citation::new("none", "#")]),
    );
    model.enqueue_generate(text_response(synthesis_payload()));

    let artifact = ArtifactSynthesizer::new(model)
        .synthesize("recipe")
        .await
        .unwrap();

    assert_eq!(artifact.sources, vec![Source::fallback()]);
}

#[tokio::test]
async fn blank_query_is_rejected_without_model_calls() {
    let model = Arc::new(MockLanguageModel::new());

    let result = ArtifactSynthesizer::new(model.clone())
        .synthesize("   ")
        .await;

    assert!(result.is_err());
    assert_eq!(model.generate_call_count(), 0);
}

#[tokio::test]
async fn stages_can_use_different_models() {
    let research = Arc::new(MockLanguageModel::new().with_model_id("researcher"));
    let synthesis = Arc::new(MockLanguageModel::new().with_model_id("composer"));
    research.enqueue_generate(text_response("Findings."));
    synthesis.enqueue_generate(text_response(synthesis_payload()));

    ArtifactSynthesizer::with_models(research.clone(), synthesis.clone())
        .synthesize("recipe")
        .await
        .unwrap();

    assert_eq!(research.generate_call_count(), 1);
    assert_eq!(synthesis.generate_call_count(), 1);
}
