//! Server-rendered HTML.
//!
//! Pages are plain strings wrapped in a shared shell. Interactivity comes
//! from HTMX attributes and its SSE extension; no client-side state is kept.
//!
//! # Structure
//!
//! - [`pages`]: full pages (landing, sign-in, chat)
//! - [`fragments`]: partial responses swapped into the chat page

pub mod fragments;
pub mod pages;

use crate::auth::User;

const HTMX_SRC: &str = "https://unpkg.com/htmx.org@2.0.4/dist/htmx.min.js";
const HTMX_SSE_SRC: &str = "https://unpkg.com/htmx-ext-sse@2.2.2/sse.js";

/// Escape text for use in element content and quoted attributes.
pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

fn account_nav(user: Option<&User>) -> String {
    match user {
        Some(user) => {
            let label = escape_html(user.email.as_deref().unwrap_or(&user.id));
            format!(
                r#"<span class="who">{label}</span>
                <form method="post" action="/sign-out" class="inline">
                    <button type="submit">Sign out</button>
                </form>"#
            )
        }
        None => r#"<a href="/sign-in">Sign in</a>"#.to_string(),
    }
}

/// Wrap page content in the document shell.
pub fn html_shell(title: &str, user: Option<&User>, content: &str) -> String {
    let title = escape_html(title);
    let nav = account_nav(user);
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="utf-8">
    <meta name="viewport" content="width=device-width, initial-scale=1">
    <title>{title}</title>
    <script src="{HTMX_SRC}"></script>
    <script src="{HTMX_SSE_SRC}"></script>
    <style>
        body {{ font-family: system-ui, sans-serif; margin: 0; background: #fafafa; color: #18181b; }}
        header {{ display: flex; justify-content: space-between; align-items: center; padding: 0.75rem 1.5rem; border-bottom: 1px solid #e4e4e7; }}
        header nav {{ display: flex; gap: 0.75rem; align-items: center; }}
        main {{ max-width: 28rem; margin: 0 auto; padding: 6rem 0; }}
        .inline {{ display: inline; }}
        .message {{ white-space: pre-wrap; margin: 0.25rem 0; }}
        .error {{ color: #b91c1c; }}
        .muted {{ color: #71717a; }}
        .composer input {{ position: fixed; bottom: 0; width: 100%; max-width: 28rem; padding: 0.5rem; margin-bottom: 2rem; border: 1px solid #d4d4d8; border-radius: 0.25rem; }}
        form.stack {{ display: flex; flex-direction: column; gap: 0.5rem; }}
    </style>
</head>
<body>
    <header>
        <a href="/">Home</a>
        <nav>{nav}</nav>
    </header>
    <main id="app">
        {content}
    </main>
</body>
</html>"#
    )
}
