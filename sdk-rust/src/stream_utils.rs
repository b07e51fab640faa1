use crate::{ContentDelta, Part, PartDelta, ReasoningPartDelta, TextPartDelta};

/// Gemini parts carry no index, so an incoming delta is given the index of the
/// last delta of the same kind, or a fresh index when the kind changes.
pub fn guess_delta_index(part: &PartDelta, all_content_deltas: &[&ContentDelta]) -> usize {
    if let Some(last) = all_content_deltas.last() {
        let same_kind = matches!(
            (&last.part, part),
            (PartDelta::Text(_), PartDelta::Text(_))
                | (PartDelta::Reasoning(_), PartDelta::Reasoning(_))
        );
        if same_kind {
            return last.index;
        }
    }

    all_content_deltas
        .iter()
        .map(|content_delta| content_delta.index + 1)
        .max()
        .unwrap_or(0)
}

pub fn convert_part_to_part_delta(part: Part) -> PartDelta {
    match part {
        Part::Text(text_part) => PartDelta::Text(TextPartDelta {
            text: text_part.text,
        }),
        Part::Reasoning(reasoning_part) => PartDelta::Reasoning(ReasoningPartDelta {
            text: Some(reasoning_part.text),
            signature: reasoning_part.signature,
        }),
    }
}
