use opentelemetry::trace::Status;
use std::{error::Error, future::Future, time::Instant};
use tracing::{info_span, Span};
use tracing_futures::Instrument;
use tracing_opentelemetry::OpenTelemetrySpanExt;

/// A workbench operation that reaches a language model.
#[derive(Clone, Copy, Debug)]
pub enum WorkbenchOperation {
    Synthesize,
    Validate,
    DeriveSchema,
    ChatTurn,
    FeedFetch,
}

impl WorkbenchOperation {
    fn as_str(self) -> &'static str {
        match self {
            Self::Synthesize => "synthesize",
            Self::Validate => "validate",
            Self::DeriveSchema => "derive_schema",
            Self::ChatTurn => "chat_turn",
            Self::FeedFetch => "feed_fetch",
        }
    }
}

pub struct OperationSpan {
    span: Span,
    started: Instant,
    ended: bool,
}

impl OperationSpan {
    pub fn new(operation: WorkbenchOperation, subject: &str) -> Self {
        let span = match operation {
            WorkbenchOperation::Synthesize => info_span!("forge_workbench.synthesize"),
            WorkbenchOperation::Validate => info_span!("forge_workbench.validate"),
            WorkbenchOperation::DeriveSchema => info_span!("forge_workbench.derive_schema"),
            WorkbenchOperation::ChatTurn => info_span!("forge_workbench.chat_turn"),
            WorkbenchOperation::FeedFetch => info_span!("forge_workbench.feed_fetch"),
        };
        span.set_attribute("forge_workbench.operation", operation.as_str());
        span.set_attribute("forge_workbench.subject", subject.to_string());

        Self {
            span,
            started: Instant::now(),
            ended: false,
        }
    }

    pub fn span(&self) -> Span {
        self.span.clone()
    }

    pub fn on_error(&mut self, error: &(dyn Error + 'static)) {
        self.span
            .set_attribute("exception.message", error.to_string());
        self.span.set_status(Status::error(error.to_string()));
    }

    pub fn on_end(&mut self) {
        if self.ended {
            return;
        }
        self.ended = true;
        let elapsed_ms = i64::try_from(self.started.elapsed().as_millis()).unwrap_or(i64::MAX);
        self.span
            .set_attribute("forge_workbench.duration_ms", elapsed_ms);
    }
}

impl Drop for OperationSpan {
    fn drop(&mut self) {
        self.on_end();
    }
}

/// Run `future` inside an operation span, recording failure on the span.
pub async fn trace_operation<T, E, Fut>(
    operation: WorkbenchOperation,
    subject: &str,
    future: Fut,
) -> Result<T, E>
where
    E: Error + 'static,
    Fut: Future<Output = Result<T, E>>,
{
    let mut span = OperationSpan::new(operation, subject);
    let result = future.instrument(span.span()).await;

    if let Err(error) = &result {
        span.on_error(error);
    }

    span.on_end();
    result
}
