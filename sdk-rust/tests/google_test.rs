//! Live checks against the Gemini API. Run with
//! `GOOGLE_API_KEY=... cargo test -p forge-sdk --test google_test -- --ignored`.

use forge_sdk::{
    google::{GoogleModel, GoogleModelOptions},
    LanguageModel, LanguageModelInput, Message, ResponseFormatJson, ResponseFormatOption,
    StreamAccumulator, Tool,
};
use futures::StreamExt;
use serde_json::json;
use std::{env, sync::OnceLock};

fn google_api_key() -> &'static String {
    static KEY: OnceLock<String> = OnceLock::new();

    KEY.get_or_init(|| {
        dotenvy::dotenv().ok();
        env::var("GOOGLE_API_KEY").expect("GOOGLE_API_KEY must be set")
    })
}

fn google_model() -> GoogleModel {
    GoogleModel::new(
        "gemini-2.5-flash",
        GoogleModelOptions {
            api_key: google_api_key().clone(),
            ..Default::default()
        },
    )
}

#[tokio::test]
#[ignore = "requires GOOGLE_API_KEY"]
async fn grounded_generate_returns_citations() {
    let response = google_model()
        .generate(LanguageModelInput {
            messages: vec![Message::user(
                "What is the latest stable version of the JSON Schema specification?",
            )],
            tools: Some(vec![Tool::GoogleSearch]),
            ..Default::default()
        })
        .await
        .expect("grounded generate succeeds");

    assert!(!response.text().is_empty());
    assert!(!response.citations.is_empty());
}

#[tokio::test]
#[ignore = "requires GOOGLE_API_KEY"]
async fn json_generate_follows_schema() {
    let response = google_model()
        .generate(LanguageModelInput {
            messages: vec![Message::user("Give me a color with its hex code.")],
            response_format: Some(ResponseFormatOption::Json(ResponseFormatJson {
                name: "color".to_string(),
                description: None,
                schema: Some(json!({
                    "type": "object",
                    "properties": {
                        "name": { "type": "string" },
                        "hex": { "type": "string" }
                    },
                    "required": ["name", "hex"]
                })),
            })),
            ..Default::default()
        })
        .await
        .expect("json generate succeeds");

    let value: serde_json::Value = serde_json::from_str(&response.text()).unwrap();
    assert!(value["hex"].is_string());
}

#[tokio::test]
#[ignore = "requires GOOGLE_API_KEY"]
async fn stream_text() {
    let mut stream = google_model()
        .stream(LanguageModelInput {
            messages: vec![Message::user("Count from one to five in words.")],
            ..Default::default()
        })
        .await
        .expect("stream starts");

    let mut accumulator = StreamAccumulator::new();
    while let Some(partial) = stream.next().await {
        accumulator.add_partial(partial.unwrap()).unwrap();
    }

    assert!(accumulator.compute_response().text().to_lowercase().contains("three"));
}
