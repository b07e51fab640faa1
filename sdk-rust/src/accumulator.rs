use crate::{
    Citation, ContentDelta, ModelResponse, ModelUsage, Part, PartDelta, PartialModelResponse,
    ReasoningPart, ReasoningPartDelta, TextPart,
};
use std::collections::BTreeMap;

/// Internal representation of accumulated reasoning data
#[derive(Debug, Clone)]
struct AccumulatedReasoningData {
    text: String,
    signature: Option<String>,
}

/// Represents accumulated data for different part types
#[derive(Debug, Clone)]
enum AccumulatedData {
    Text(String),
    Reasoning(AccumulatedReasoningData),
}

/// Initializes accumulated data from a delta
fn initialize_accumulated_data(part: PartDelta) -> AccumulatedData {
    match part {
        PartDelta::Text(text_delta) => AccumulatedData::Text(text_delta.text),
        PartDelta::Reasoning(reasoning_delta) => {
            AccumulatedData::Reasoning(AccumulatedReasoningData {
                text: reasoning_delta.text.unwrap_or_default(),
                signature: reasoning_delta.signature,
            })
        }
    }
}

fn merge_reasoning_delta(existing: &mut AccumulatedReasoningData, delta: ReasoningPartDelta) {
    if let Some(text) = delta.text {
        existing.text.push_str(&text);
    }
    if delta.signature.is_some() {
        existing.signature = delta.signature;
    }
}

/// Merges an incoming delta with existing accumulated data
fn merge_delta(existing: &mut AccumulatedData, delta: ContentDelta) -> Result<(), String> {
    match (existing, delta.part) {
        (AccumulatedData::Text(existing_text), PartDelta::Text(text_delta)) => {
            existing_text.push_str(&text_delta.text);
        }
        (AccumulatedData::Reasoning(existing_reasoning), PartDelta::Reasoning(reasoning_delta)) => {
            merge_reasoning_delta(existing_reasoning, reasoning_delta);
        }
        _ => Err(format!(
            "Type mismatch at index {}: existing type doesn't match incoming type",
            delta.index
        ))?,
    }

    Ok(())
}

fn create_part(data: AccumulatedData) -> Part {
    match data {
        AccumulatedData::Text(text) => Part::Text(TextPart { text }),
        AccumulatedData::Reasoning(reasoning) => Part::Reasoning(ReasoningPart {
            text: reasoning.text,
            signature: reasoning.signature,
        }),
    }
}

/// Manages the accumulation and merging of content deltas for streaming
/// responses
#[derive(Default)]
pub struct StreamAccumulator {
    /// Map of index to accumulated data, using `BTreeMap` for automatic sorting
    accumulated_parts: BTreeMap<usize, AccumulatedData>,
    accumulated_citations: Vec<Citation>,
    accumulated_usage: Option<ModelUsage>,
}

impl StreamAccumulator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a chunk of content deltas to the accumulator
    ///
    /// # Errors
    /// Returns an error if delta types mismatch for the same index
    pub fn add_partial(&mut self, partial: PartialModelResponse) -> Result<(), String> {
        if let Some(delta) = partial.delta {
            self.process_delta(delta)?;
        }
        for citation in partial.citations {
            if !self.accumulated_citations.contains(&citation) {
                self.accumulated_citations.push(citation);
            }
        }
        if let Some(usage) = partial.usage {
            let accumulated_usage = self
                .accumulated_usage
                .get_or_insert_with(ModelUsage::default);
            accumulated_usage.input_tokens += usage.input_tokens;
            accumulated_usage.output_tokens += usage.output_tokens;
        }
        Ok(())
    }

    /// Computes the final response from accumulated deltas
    #[must_use]
    pub fn compute_response(self) -> ModelResponse {
        ModelResponse {
            content: self
                .accumulated_parts
                .into_values()
                .map(create_part)
                .collect(),
            citations: self.accumulated_citations,
            usage: self.accumulated_usage,
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.accumulated_parts.is_empty()
    }

    fn process_delta(&mut self, delta: ContentDelta) -> Result<(), String> {
        if let Some(existing) = self.accumulated_parts.get_mut(&delta.index) {
            merge_delta(existing, delta)
        } else {
            self.accumulated_parts
                .insert(delta.index, initialize_accumulated_data(delta.part));
            Ok(())
        }
    }
}
