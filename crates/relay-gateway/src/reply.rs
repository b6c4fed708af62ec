use crate::types::{Message, Role};

/// Text of the assistant message produced by `run_id`, if any.
///
/// Messages are scanned in list order; the first assistant message tagged
/// with the run that carries a text block wins.
pub fn assistant_reply<'a>(messages: &'a [Message], run_id: &str) -> Option<&'a str> {
    messages
        .iter()
        .filter(|m| m.role == Role::Assistant && m.run_id.as_deref() == Some(run_id))
        .find_map(Message::first_text)
}
