use dotenvy::dotenv;
use forge_sdk::{LanguageModel, LanguageModelInput, Message, StreamAccumulator};
use futures::stream::StreamExt;

mod common;

#[tokio::main]
async fn main() {
    dotenv().ok();

    let mut stream = common::get_model("gemini-2.5-flash")
        .stream(LanguageModelInput {
            system_prompt: Some("You explain data formats briefly.".to_string()),
            messages: vec![Message::user("What is the difference between JSON and NDJSON?")],
            ..Default::default()
        })
        .await
        .expect("failed to start stream");

    let mut accumulator = StreamAccumulator::new();

    while let Some(partial) = stream.next().await {
        let partial = partial.expect("stream error");
        println!("{partial:#?}");
        accumulator
            .add_partial(partial)
            .expect("failed to add partial");
    }

    println!("{:#?}", accumulator.compute_response());
}
