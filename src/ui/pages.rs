//! Full pages.

use super::{escape_html, fragments, html_shell};
use crate::auth::User;
use crate::chat::ChatMessage;

pub fn landing(user: Option<&User>) -> String {
    let action = if user.is_some() {
        r#"<a href="/protected">Open chat</a>"#
    } else {
        r#"<a href="/sign-in">Sign in to start chatting</a>"#
    };
    let content = format!(
        r#"<h1>Session Gateway</h1>
        <p class="muted">Signed-in users can chat with the backend service.</p>
        <p>{action}</p>"#
    );
    html_shell("Home", user, &content)
}

pub fn sign_in(error: Option<&str>, email: &str) -> String {
    let error = error
        .map(|message| format!(r#"<p class="error">{}</p>"#, escape_html(message)))
        .unwrap_or_default();
    let email = escape_html(email);
    let content = format!(
        r#"<h1>Sign in</h1>
        {error}
        <form method="post" action="/sign-in" class="stack">
            <label for="email">Email</label>
            <input id="email" name="email" type="email" value="{email}" required>
            <label for="password">Password</label>
            <input id="password" name="password" type="password" required>
            <button type="submit">Sign in</button>
        </form>"#
    );
    html_shell("Sign in", None, &content)
}

/// Chat page: health check, transcript and composer.
pub fn chat(user: Option<&User>, messages: &[ChatMessage]) -> String {
    let health = fragments::health_placeholder();
    let transcript = fragments::transcript(messages);
    let content = format!(
        r##"<section>
            <h2>Client call backend health check</h2>
            {health}
        </section>
        <section id="transcript" aria-live="polite">{transcript}</section>
        <form class="composer" hx-post="/api/chat" hx-target="#transcript" hx-swap="beforeend"
              hx-on::after-request="if (event.detail.successful) this.reset()">
            <input name="message" placeholder="Say something..." autocomplete="off" required>
        </form>"##
    );
    html_shell("Chat", user, &content)
}
