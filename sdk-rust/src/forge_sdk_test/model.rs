use crate::{
    ContentDelta, LanguageModel, LanguageModelError, LanguageModelInput, LanguageModelResult,
    LanguageModelStream, ModelResponse, PartDelta, PartialModelResponse, TextPartDelta,
};
use futures::{
    channel::{mpsc, oneshot},
    stream,
};
use std::{
    collections::VecDeque,
    sync::{Mutex, MutexGuard},
};

/// Result for a mocked `generate` call.
pub enum MockGenerateResult {
    Response(ModelResponse),
    Error(LanguageModelError),
    /// The call stays pending until the paired [`MockResponder`] answers it.
    Deferred(oneshot::Receiver<LanguageModelResult<ModelResponse>>),
}

impl MockGenerateResult {
    /// Construct a result that yields the provided response.
    pub fn response(response: ModelResponse) -> Self {
        Self::Response(response)
    }

    /// Construct a result that yields the provided error.
    pub fn error(error: LanguageModelError) -> Self {
        Self::Error(error)
    }

    /// Construct a result whose outcome is decided later by the returned
    /// responder. Lets a test control the order in which concurrent calls
    /// complete.
    pub fn deferred() -> (Self, MockResponder) {
        let (sender, receiver) = oneshot::channel();
        (Self::Deferred(receiver), MockResponder(sender))
    }
}

impl From<ModelResponse> for MockGenerateResult {
    fn from(response: ModelResponse) -> Self {
        Self::response(response)
    }
}

impl From<LanguageModelError> for MockGenerateResult {
    fn from(error: LanguageModelError) -> Self {
        Self::error(error)
    }
}

/// Completes a [`MockGenerateResult::Deferred`] call.
pub struct MockResponder(oneshot::Sender<LanguageModelResult<ModelResponse>>);

impl MockResponder {
    /// Resolve the pending call with a response. Does nothing if the caller
    /// already went away.
    pub fn respond(self, response: ModelResponse) {
        let _ = self.0.send(Ok(response));
    }

    /// Resolve the pending call with an error.
    pub fn fail(self, error: LanguageModelError) {
        let _ = self.0.send(Err(error));
    }
}

/// Result for a mocked `stream` call.
pub enum MockStreamResult {
    Partials(Vec<PartialModelResponse>),
    /// Yields the partials, then fails mid-stream with the error.
    Interrupted(Vec<PartialModelResponse>, LanguageModelError),
    /// The `stream` call itself fails.
    Error(LanguageModelError),
    /// Yields whatever the paired [`MockStreamSender`] sends, pending in
    /// between. Ends when the sender is dropped.
    Channel(mpsc::UnboundedReceiver<LanguageModelResult<PartialModelResponse>>),
}

impl MockStreamResult {
    /// Construct a result that yields the provided partial responses.
    pub fn partials(partials: Vec<PartialModelResponse>) -> Self {
        Self::Partials(partials)
    }

    /// Construct a result that yields one text delta per fragment.
    pub fn text_fragments<I, S>(fragments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Partials(fragments.into_iter().map(text_partial).collect())
    }

    /// Construct a result that yields the provided error.
    pub fn error(error: LanguageModelError) -> Self {
        Self::Error(error)
    }

    /// Construct a result fed by the returned sender. Lets a test observe
    /// the consumer between partials.
    pub fn channel() -> (Self, MockStreamSender) {
        let (sender, receiver) = mpsc::unbounded();
        (Self::Channel(receiver), MockStreamSender(sender))
    }
}

/// Feeds a [`MockStreamResult::Channel`] stream.
pub struct MockStreamSender(mpsc::UnboundedSender<LanguageModelResult<PartialModelResponse>>);

impl MockStreamSender {
    /// Send the next partial. Does nothing if the stream was dropped.
    pub fn send(&self, partial: PartialModelResponse) {
        let _ = self.0.unbounded_send(Ok(partial));
    }

    /// Fail the stream with the error.
    pub fn fail(&self, error: LanguageModelError) {
        let _ = self.0.unbounded_send(Err(error));
    }
}

impl From<Vec<PartialModelResponse>> for MockStreamResult {
    fn from(partials: Vec<PartialModelResponse>) -> Self {
        Self::partials(partials)
    }
}

/// A text delta at index 0, the shape Gemini streams plain answers in.
pub fn text_partial(text: impl Into<String>) -> PartialModelResponse {
    PartialModelResponse {
        delta: Some(ContentDelta {
            index: 0,
            part: PartDelta::Text(TextPartDelta { text: text.into() }),
        }),
        ..Default::default()
    }
}

#[derive(Default)]
struct MockLanguageModelState {
    mocked_generate_results: VecDeque<MockGenerateResult>,
    mocked_stream_results: VecDeque<MockStreamResult>,
    tracked_generate_inputs: Vec<LanguageModelInput>,
    tracked_stream_inputs: Vec<LanguageModelInput>,
}

/// A mock language model for testing that tracks inputs and yields predefined
/// outputs in FIFO order.
pub struct MockLanguageModel {
    provider: &'static str,
    model_id: String,
    state: Mutex<MockLanguageModelState>,
}

impl Default for MockLanguageModel {
    fn default() -> Self {
        Self {
            provider: "mock",
            model_id: "mock-model".to_string(),
            state: Mutex::new(MockLanguageModelState::default()),
        }
    }
}

impl MockLanguageModel {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_model_id(mut self, model_id: impl Into<String>) -> Self {
        self.model_id = model_id.into();
        self
    }

    fn state(&self) -> MutexGuard<'_, MockLanguageModelState> {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Enqueue a mocked generate result.
    pub fn enqueue_generate<R>(&self, result: R) -> &Self
    where
        R: Into<MockGenerateResult>,
    {
        self.state().mocked_generate_results.push_back(result.into());
        self
    }

    /// Enqueue a mocked stream result.
    pub fn enqueue_stream<R>(&self, result: R) -> &Self
    where
        R: Into<MockStreamResult>,
    {
        self.state().mocked_stream_results.push_back(result.into());
        self
    }

    /// Inputs of every `generate` call so far.
    pub fn tracked_generate_inputs(&self) -> Vec<LanguageModelInput> {
        self.state().tracked_generate_inputs.clone()
    }

    /// Inputs of every `stream` call so far.
    pub fn tracked_stream_inputs(&self) -> Vec<LanguageModelInput> {
        self.state().tracked_stream_inputs.clone()
    }

    /// Number of `generate` calls so far.
    pub fn generate_call_count(&self) -> usize {
        self.state().tracked_generate_inputs.len()
    }

    /// Clear both tracked inputs and enqueued results.
    pub fn restore(&self) {
        let mut state = self.state();
        state.mocked_generate_results.clear();
        state.mocked_stream_results.clear();
        state.tracked_generate_inputs.clear();
        state.tracked_stream_inputs.clear();
    }
}

#[async_trait::async_trait]
impl LanguageModel for MockLanguageModel {
    fn provider(&self) -> &'static str {
        self.provider
    }

    fn model_id(&self) -> String {
        self.model_id.clone()
    }

    async fn generate(&self, input: LanguageModelInput) -> LanguageModelResult<ModelResponse> {
        let result = {
            let mut state = self.state();
            state.tracked_generate_inputs.push(input);
            state.mocked_generate_results.pop_front()
        };

        match result {
            Some(MockGenerateResult::Response(response)) => Ok(response),
            Some(MockGenerateResult::Error(error)) => Err(error),
            Some(MockGenerateResult::Deferred(receiver)) => receiver.await.unwrap_or_else(|_| {
                Err(LanguageModelError::Invariant(
                    self.provider,
                    "deferred result was dropped".into(),
                ))
            }),
            None => Err(LanguageModelError::Invariant(
                self.provider,
                "no mocked generate results available".into(),
            )),
        }
    }

    async fn stream(&self, input: LanguageModelInput) -> LanguageModelResult<LanguageModelStream> {
        let result = {
            let mut state = self.state();
            state.tracked_stream_inputs.push(input);
            state.mocked_stream_results.pop_front()
        };

        match result {
            Some(MockStreamResult::Partials(partials)) => Ok(LanguageModelStream::from_stream(
                stream::iter(partials.into_iter().map(Ok)),
            )),
            Some(MockStreamResult::Interrupted(partials, error)) => {
                let items = partials
                    .into_iter()
                    .map(Ok)
                    .chain(std::iter::once(Err(error)));
                Ok(LanguageModelStream::from_stream(stream::iter(items)))
            }
            Some(MockStreamResult::Error(error)) => Err(error),
            Some(MockStreamResult::Channel(receiver)) => {
                Ok(LanguageModelStream::from_stream(receiver))
            }
            None => Err(LanguageModelError::Invariant(
                self.provider,
                "no mocked stream results available".into(),
            )),
        }
    }
}
