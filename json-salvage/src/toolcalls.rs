//! Assembly of streamed tool calls.
//!
//! Providers emit tool calls as per-index fragments: an early frame names
//! the call (`id`, `function.name`), later frames append argument text.
//! Each index slot accumulates independently; on `finish`, slots missing
//! either an id or a name are discarded.

use serde_json::Value;

/// One streamed increment for the tool call at `index`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolCallFragment {
    pub index: usize,
    pub id: Option<String>,
    pub name: Option<String>,
    pub arguments: Option<String>,
}

/// A fully assembled call, ready to execute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssembledToolCall {
    pub id: String,
    pub name: String,
    pub arguments: String,
}

impl AssembledToolCall {
    /// Parsed arguments, tolerating truncated streams.
    pub fn arguments_json(&self) -> Option<Value> {
        crate::parse_partial(&self.arguments)
    }
}

#[derive(Debug, Clone, Default)]
struct Slot {
    id: Option<String>,
    name: Option<String>,
    arguments: String,
}

/// Per-index accumulator for streamed tool-call fragments.
#[derive(Debug, Default)]
pub struct ToolCallAssembler {
    slots: Vec<Slot>,
}

impl ToolCallAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, fragment: ToolCallFragment) {
        if fragment.index >= self.slots.len() {
            self.slots.resize(fragment.index + 1, Slot::default());
        }
        #[allow(clippy::indexing_slicing)]
        let slot = &mut self.slots[fragment.index];
        if let Some(id) = fragment.id {
            slot.id.get_or_insert(id);
        }
        if let Some(name) = fragment.name {
            slot.name.get_or_insert(name);
        }
        if let Some(arguments) = fragment.arguments {
            slot.arguments.push_str(&arguments);
        }
    }

    /// Completed calls in index order. Slots that never received both an
    /// id and a name are dropped.
    pub fn finish(self) -> Vec<AssembledToolCall> {
        self.slots
            .into_iter()
            .filter_map(|slot| match (slot.id, slot.name) {
                (Some(id), Some(name)) => Some(AssembledToolCall {
                    id,
                    name,
                    arguments: slot.arguments,
                }),
                _ => None,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_fragments_concatenate_by_index() {
        let mut assembler = ToolCallAssembler::new();
        assembler.push(ToolCallFragment {
            index: 0,
            id: Some("call_1".into()),
            name: Some("search".into()),
            arguments: Some("{\"query\": \"gra".into()),
        });
        assembler.push(ToolCallFragment {
            index: 0,
            arguments: Some("ph theory\"}".into()),
            ..ToolCallFragment::default()
        });

        let calls = assembler.finish();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].name, "search");
        assert_eq!(
            calls[0].arguments_json().expect("parse"),
            json!({"query": "graph theory"})
        );
    }

    #[test]
    fn test_interleaved_indices_and_incomplete_slots() {
        let mut assembler = ToolCallAssembler::new();
        // index 1 arrives before index 0 is complete
        assembler.push(ToolCallFragment {
            index: 1,
            id: Some("call_b".into()),
            name: Some("lookup".into()),
            arguments: Some("{}".into()),
        });
        assembler.push(ToolCallFragment {
            index: 0,
            arguments: Some("{\"orphan\": true}".into()),
            ..ToolCallFragment::default()
        });

        let calls = assembler.finish();
        // index 0 never got an id/name, so only index 1 survives
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].id, "call_b");
    }

    #[test]
    fn test_truncated_arguments_still_parse() {
        let mut assembler = ToolCallAssembler::new();
        assembler.push(ToolCallFragment {
            index: 0,
            id: Some("call_1".into()),
            name: Some("annotate".into()),
            arguments: Some("{\"note\": \"cut off mid".into()),
        });
        let calls = assembler.finish();
        let parsed = calls[0].arguments_json().expect("partial parse");
        assert_eq!(parsed["note"], json!("cut off mid"));
    }
}
