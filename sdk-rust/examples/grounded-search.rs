use dotenvy::dotenv;
use forge_sdk::{LanguageModel, LanguageModelInput, Message, Tool};

mod common;

#[tokio::main]
async fn main() {
    dotenv().ok();

    let response = common::get_model("gemini-2.5-flash")
        .generate(LanguageModelInput {
            messages: vec![Message::user(
                "Which fields does the schema.org Event type require for rich results?",
            )],
            tools: Some(vec![Tool::GoogleSearch]),
            ..Default::default()
        })
        .await
        .expect("model.generate failed");

    println!("{}\n", response.text());
    for citation in &response.citations {
        println!("- {} <{}>", citation.title, citation.uri);
    }
}
