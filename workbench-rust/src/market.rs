use crate::{
    opentelemetry::{trace_operation, WorkbenchOperation},
    sanitizer::parse_object,
    PollFetchError,
};
use forge_sdk::{LanguageModel, LanguageModelInput, Message, Tool};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

/// Number of daily closing prices requested per snapshot.
pub const HISTORY_POINTS: usize = 7;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub date: String,
    pub price: f64,
}

/// Latest market data for one ticker symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketSnapshot {
    pub current_price: f64,
    pub change_percent: f64,
    pub history: Vec<PricePoint>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
}

fn fetch_directive(subject: &str) -> String {
    format!(
        "Use Google Search to find the latest market data for the ticker symbol \"{subject}\".\n\
         Answer with only a JSON object, without prose or markdown, of this form:\n\
         {{\"currentPrice\": number, \"changePercent\": number, \
         \"history\": [{{\"date\": \"YYYY-MM-DD\", \"price\": number}}], \"sourceUrl\": string}}\n\
         The history array holds the {HISTORY_POINTS} most recent daily closing prices, \
         oldest first. If there is no data for the symbol, answer {{\"history\": []}}."
    )
}

/// Fetch one snapshot for `subject` with a grounded model call.
///
/// The source URL comes from the first grounding citation, falling back to a
/// `sourceUrl` the model reported itself.
pub async fn fetch_snapshot(
    model: &(dyn LanguageModel + Send + Sync),
    subject: &str,
) -> Result<MarketSnapshot, PollFetchError> {
    trace_operation(
        WorkbenchOperation::FeedFetch,
        subject,
        request_snapshot(model, subject),
    )
    .await
}

async fn request_snapshot(
    model: &(dyn LanguageModel + Send + Sync),
    subject: &str,
) -> Result<MarketSnapshot, PollFetchError> {
    let response = model
        .generate(LanguageModelInput {
            messages: vec![Message::user(fetch_directive(subject))],
            tools: Some(vec![Tool::GoogleSearch]),
            ..Default::default()
        })
        .await?;

    let mut snapshot = parse_snapshot(&response.text())?;
    if let Some(citation) = response
        .citations
        .iter()
        .find(|citation| !citation.uri.trim().is_empty())
    {
        snapshot.source_url = Some(citation.uri.clone());
    }
    debug!(
        subject,
        price = snapshot.current_price,
        points = snapshot.history.len(),
        "feed snapshot fetched"
    );
    Ok(snapshot)
}

/// Read a snapshot out of a model reply.
///
/// A reply that is not a JSON object, lacks a finite `currentPrice`, or has
/// no usable history points is rejected. `changePercent` defaults to zero.
pub fn parse_snapshot(text: &str) -> Result<MarketSnapshot, PollFetchError> {
    let object = parse_object(text).map_err(|error| {
        PollFetchError::new(format!("Malformed feed response, not a JSON object: {error}"))
    })?;

    let history: Vec<PricePoint> = match object.get("history") {
        Some(Value::Array(points)) => points.iter().filter_map(price_point).collect(),
        _ => Vec::new(),
    };
    if history.is_empty() {
        return Err(PollFetchError::new(
            "Empty dataset: the response has no price history",
        ));
    }

    let current_price = finite_number(&object, "currentPrice").ok_or_else(|| {
        PollFetchError::new("Empty dataset: the response has no numeric current price")
    })?;

    Ok(MarketSnapshot {
        current_price,
        change_percent: finite_number(&object, "changePercent").unwrap_or(0.0),
        history,
        source_url: object
            .get("sourceUrl")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .map(str::to_string),
    })
}

fn finite_number(object: &Map<String, Value>, key: &str) -> Option<f64> {
    object
        .get(key)
        .and_then(Value::as_f64)
        .filter(|value| value.is_finite())
}

fn price_point(value: &Value) -> Option<PricePoint> {
    let object = value.as_object()?;
    Some(PricePoint {
        date: object.get("date")?.as_str()?.to_string(),
        price: finite_number(object, "price")?,
    })
}
