use crate::{LanguageModelInput, LanguageModelResult, ModelResponse, PartialModelResponse};
use futures::{stream::BoxStream, Stream};
use std::{
    pin::Pin,
    task::{Context, Poll},
};

/// A model capable of answering one request, either as a whole or as a
/// stream of partial responses.
#[async_trait::async_trait]
pub trait LanguageModel: Send + Sync {
    fn provider(&self) -> &'static str;
    fn model_id(&self) -> String;
    async fn generate(&self, input: LanguageModelInput) -> LanguageModelResult<ModelResponse>;
    async fn stream(&self, input: LanguageModelInput) -> LanguageModelResult<LanguageModelStream>;
}

/// Partial responses of a single request. The stream is finite and cannot be
/// restarted; every new message needs a new `stream` call.
pub struct LanguageModelStream(BoxStream<'static, LanguageModelResult<PartialModelResponse>>);

impl LanguageModelStream {
    pub fn from_stream<S>(stream: S) -> Self
    where
        S: Stream<Item = LanguageModelResult<PartialModelResponse>> + Send + 'static,
    {
        Self(Box::pin(stream))
    }
}

impl Stream for LanguageModelStream {
    type Item = LanguageModelResult<PartialModelResponse>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.0.as_mut().poll_next(cx)
    }
}
