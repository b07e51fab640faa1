use async_stream::try_stream;
use forge_sdk::{
    AssistantMessage, LanguageModel, LanguageModelError, LanguageModelInput, LanguageModelResult,
    Message, PartDelta, StreamAccumulator,
};
use futures::{Stream, StreamExt};
use std::sync::Arc;

/// A multi-turn chat with a fixed system context.
///
/// The history holds only exchanges that streamed to completion. A failed
/// exchange leaves it as it was, so the next message is sent against the last
/// good state.
pub struct ChatSession {
    model: Arc<dyn LanguageModel + Send + Sync>,
    system_context: String,
    history: Vec<Message>,
}

impl ChatSession {
    pub fn new(model: Arc<dyn LanguageModel + Send + Sync>, system_context: String) -> Self {
        Self {
            model,
            system_context,
            history: Vec::new(),
        }
    }

    pub fn system_context(&self) -> &str {
        &self.system_context
    }

    pub fn history(&self) -> &[Message] {
        &self.history
    }

    /// Send `text` and stream back the reply's text fragments in order.
    ///
    /// Reasoning deltas are not yielded. The exchange is appended to the
    /// history once the stream ends without error.
    pub fn send_stream<'a>(
        &'a mut self,
        text: &str,
    ) -> impl Stream<Item = LanguageModelResult<String>> + Send + 'a {
        let user_message = Message::user(text);

        try_stream! {
            let mut messages = self.history.clone();
            messages.push(user_message.clone());

            let mut stream = self
                .model
                .stream(LanguageModelInput {
                    system_prompt: Some(self.system_context.clone()),
                    messages,
                    ..Default::default()
                })
                .await?;

            let mut accumulator = StreamAccumulator::new();
            while let Some(partial) = stream.next().await {
                let partial = partial?;
                let fragment = match partial.delta.as_ref().map(|delta| &delta.part) {
                    Some(PartDelta::Text(delta)) if !delta.text.is_empty() => {
                        Some(delta.text.clone())
                    }
                    _ => None,
                };

                accumulator
                    .add_partial(partial)
                    .map_err(|message| LanguageModelError::Invariant("chat", message))?;

                if let Some(fragment) = fragment {
                    yield fragment;
                }
            }

            let reply = accumulator.compute_response();
            self.history.push(user_message);
            self.history.push(Message::Assistant(AssistantMessage {
                content: reply.content,
            }));
        }
    }
}
