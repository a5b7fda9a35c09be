//! Conversation-to-prompt formatting.

use crate::models::common::ChatMessage;

/// Flatten an ordered conversation into a single prompt string.
///
/// Each message becomes one role-prefixed line (`System:`, `Human:`,
/// `Assistant:`) and a trailing `Assistant:` cue is always appended so the
/// model continues in the assistant role. Messages with unrecognized roles
/// are dropped silently; this mirrors the behavior the gateway inherited and
/// is not confirmed design intent.
///
/// Deterministic: the same conversation always produces a byte-identical
/// prompt.
pub fn format_conversation(messages: &[ChatMessage]) -> String {
    let mut parts: Vec<String> = Vec::with_capacity(messages.len() + 1);
    for message in messages {
        match message.role.as_str() {
            "system" => parts.push(format!("System: {}", message.content)),
            "user" => parts.push(format!("Human: {}", message.content)),
            "assistant" => parts.push(format!("Assistant: {}", message.content)),
            _ => {}
        }
    }
    parts.push("Assistant:".to_string());
    parts.join("\n")
}

/// Whitespace word count standing in for real tokenizer output.
///
/// Explicitly an estimate; the backend reports no exact token counts, and
/// this must never be presented as token-exact.
pub fn estimate_tokens(text: &str) -> usize {
    text.split_whitespace().count()
}
