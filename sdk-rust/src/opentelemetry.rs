use crate::{
    LanguageModelInput, LanguageModelResult, LanguageModelStream, ModelResponse, ModelUsage,
    PartialModelResponse,
};
use futures::StreamExt;
use opentelemetry::trace::Status;
use std::{future::Future, time::Instant};
use tracing::{info_span, Span};
use tracing_futures::Instrument;
use tracing_opentelemetry::OpenTelemetrySpanExt;

/// Span wrapping one model call. Request attributes are recorded up front,
/// response attributes when the call (or the stream) ends.
struct LmSpan {
    span: Span,
    usage: Option<ModelUsage>,
    citation_count: usize,
    start_time: Instant,
    time_to_first_token: Option<f64>,
    ended: bool,
}

impl LmSpan {
    fn new(provider: &str, model_id: &str, method: &str, input: &LanguageModelInput) -> Self {
        let span = if method == "stream" {
            info_span!("forge_sdk.stream")
        } else {
            info_span!("forge_sdk.generate")
        };
        span.set_attribute("gen_ai.operation.name", "generate_content");
        span.set_attribute("gen_ai.provider.name", provider.to_string());
        span.set_attribute("gen_ai.request.model", model_id.to_string());
        span.set_attribute("forge_sdk.method", method.to_string());
        span.set_attribute(
            "forge_sdk.grounded",
            input.tools.as_ref().is_some_and(|tools| !tools.is_empty()),
        );
        if let Some(max_tokens) = input.max_tokens {
            span.set_attribute("gen_ai.request.max_tokens", i64::from(max_tokens));
        }
        if let Some(temperature) = input.temperature {
            span.set_attribute("gen_ai.request.temperature", temperature);
        }

        Self {
            span,
            usage: None,
            citation_count: 0,
            start_time: Instant::now(),
            time_to_first_token: None,
            ended: false,
        }
    }

    fn on_response(&mut self, response: &ModelResponse) {
        self.usage.clone_from(&response.usage);
        self.citation_count = response.citations.len();
    }

    fn on_stream_partial(&mut self, partial: &PartialModelResponse) {
        if let Some(usage) = &partial.usage {
            let total = self.usage.get_or_insert_with(ModelUsage::default);
            total.input_tokens += usage.input_tokens;
            total.output_tokens += usage.output_tokens;
        }
        self.citation_count += partial.citations.len();
        if partial.delta.is_some() && self.time_to_first_token.is_none() {
            self.time_to_first_token = Some(self.start_time.elapsed().as_secs_f64());
        }
    }

    fn on_error(&mut self, error: &(dyn std::error::Error + 'static)) {
        self.span
            .set_attribute("exception.message", error.to_string());
        self.span.set_status(Status::error(error.to_string()));
    }

    fn on_end(&mut self) {
        if self.ended {
            return;
        }
        self.ended = true;

        if let Some(usage) = &self.usage {
            self.span
                .set_attribute("gen_ai.usage.input_tokens", i64::from(usage.input_tokens));
            self.span
                .set_attribute("gen_ai.usage.output_tokens", i64::from(usage.output_tokens));
        }
        self.span.set_attribute(
            "forge_sdk.citations",
            i64::try_from(self.citation_count).unwrap_or(i64::MAX),
        );
        if let Some(time_to_first_token) = self.time_to_first_token {
            self.span
                .set_attribute("gen_ai.server.time_to_first_token", time_to_first_token);
        }
    }
}

impl Drop for LmSpan {
    fn drop(&mut self) {
        self.on_end();
    }
}

pub async fn trace_generate<F, Fut>(
    provider: &str,
    model_id: &str,
    input: LanguageModelInput,
    f: F,
) -> LanguageModelResult<ModelResponse>
where
    F: FnOnce(LanguageModelInput) -> Fut,
    Fut: Future<Output = LanguageModelResult<ModelResponse>>,
{
    let mut span = LmSpan::new(provider, model_id, "generate", &input);
    let result = f(input).instrument(span.span.clone()).await;

    match &result {
        Ok(response) => span.on_response(response),
        Err(error) => span.on_error(error),
    }

    span.on_end();
    result
}

pub async fn trace_stream<F, Fut>(
    provider: &str,
    model_id: &str,
    input: LanguageModelInput,
    f: F,
) -> LanguageModelResult<LanguageModelStream>
where
    F: FnOnce(LanguageModelInput) -> Fut,
    Fut: Future<Output = LanguageModelResult<LanguageModelStream>>,
{
    let mut span = LmSpan::new(provider, model_id, "stream", &input);
    let stream_result = f(input).instrument(span.span.clone()).await;

    match stream_result {
        Ok(mut stream) => {
            let span_handle = span.span.clone();
            let instrumented = async_stream::try_stream! {
                let mut span_state = span;

                while let Some(item) = stream.next().await {
                    match item {
                        Ok(partial) => {
                            span_state.on_stream_partial(&partial);
                            yield partial;
                        }
                        Err(err) => {
                            span_state.on_error(&err);
                            Err(err)?;
                        }
                    }
                }

                span_state.on_end();
            }
            .instrument(span_handle);

            Ok(LanguageModelStream::from_stream(instrumented))
        }
        Err(error) => {
            span.on_error(&error);
            span.on_end();
            Err(error)
        }
    }
}
