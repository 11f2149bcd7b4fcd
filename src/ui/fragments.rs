//! Partial HTML swapped into the chat page.

use super::escape_html;
use crate::chat::{ChatMessage, Role};

/// Placeholder shown until the health check answers.
pub const HEALTH_LOADING: &str = "Loading...";
pub const HEALTH_UNAVAILABLE: &str = "Health check unavailable";

/// Health-check block as first rendered; it replaces itself once on load.
pub fn health_placeholder() -> String {
    format!(
        r#"<p id="health" hx-get="/api/health-check" hx-trigger="load" hx-swap="outerHTML">{HEALTH_LOADING}</p>"#
    )
}

/// Health-check block after the call settled.
pub fn health_result(message: Option<&str>) -> String {
    match message {
        Some(message) => format!(r#"<p id="health">{}</p>"#, escape_html(message)),
        None => format!(r#"<p id="health" class="muted">{HEALTH_UNAVAILABLE}</p>"#),
    }
}

fn role_label(role: Role) -> &'static str {
    match role {
        Role::User => "User: ",
        Role::Assistant => "AI: ",
    }
}

pub fn message(message: &ChatMessage) -> String {
    format!(
        r#"<div class="message" id="msg-{}">{}{}</div>"#,
        escape_html(&message.id),
        role_label(message.role),
        escape_html(&message.content)
    )
}

pub fn transcript(messages: &[ChatMessage]) -> String {
    messages.iter().map(message).collect()
}

/// Assistant bubble that opens the reply stream and fills itself from it.
pub fn pending_reply() -> String {
    format!(
        r#"<div class="message" hx-ext="sse" sse-connect="/api/chat/stream" sse-close="done">{}<span sse-swap="message.delta" hx-swap="beforeend"></span><span class="error" sse-swap="error" hx-swap="beforeend"></span></div>"#,
        role_label(Role::Assistant)
    )
}

/// Response to a chat submission: the echoed user message plus the reply slot.
pub fn submitted(user_message: &ChatMessage) -> String {
    format!("{}{}", message(user_message), pending_reply())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_are_prefixed_and_escaped() {
        let html = transcript(&[
            ChatMessage::user("<script>"),
            ChatMessage::assistant("fine"),
        ]);
        assert!(html.contains("User: &lt;script&gt;"));
        assert!(html.contains("AI: fine"));
        assert!(!html.contains("<script>"));
    }

    #[test]
    fn test_health_blocks() {
        assert!(health_placeholder().contains("Loading..."));
        assert!(health_placeholder().contains(r#"hx-trigger="load""#));
        assert!(health_result(Some("Hello user with id 1!")).contains("Hello user with id 1!"));
        assert!(health_result(None).contains(HEALTH_UNAVAILABLE));
    }

    #[test]
    fn test_submission_opens_stream() {
        let html = submitted(&ChatMessage::user("hi"));
        assert!(html.contains("User: hi"));
        assert!(html.contains(r#"sse-connect="/api/chat/stream""#));
        assert!(html.contains(r#"sse-close="done""#));
    }
}
