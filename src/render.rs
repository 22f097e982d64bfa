//! Server-rendered HTML pages.
//!
//! DESIGN
//! ======
//! Pages are static templates under `templates/` with `{{KEY}}` slots filled
//! in a single pass, so a value can never introduce a slot of its own. Every
//! value is HTML-escaped before it is inserted except fragments this module
//! built itself. Guide bodies are shown as escaped source; turning MDX into
//! markup is out of scope here.

use std::fmt::Write;

use crate::content::GuideDocument;
use crate::identity::Principal;
use crate::services::gate::GateState;

const LAYOUT_TEMPLATE: &str = include_str!("../templates/layout.html");
const GUIDE_TEMPLATE: &str = include_str!("../templates/guide.html");
const LOCKED_TEMPLATE: &str = include_str!("../templates/locked.html");
const DASHBOARD_TEMPLATE: &str = include_str!("../templates/dashboard.html");
const NOT_FOUND_TEMPLATE: &str = include_str!("../templates/not_found.html");

#[must_use]
pub fn html_escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Replace `{{KEY}}` slots in one left-to-right pass. Unknown slots are kept.
#[must_use]
pub fn fill(template: &str, values: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find("}}") else {
            out.push_str(&rest[start..]);
            return out;
        };
        let key = &after[..end];
        match values.iter().find(|(k, _)| *k == key) {
            Some((_, value)) => out.push_str(value),
            None => out.push_str(&rest[start..start + 2 + end + 2]),
        }
        rest = &after[end + 2..];
    }
    out.push_str(rest);
    out
}

fn page(title: &str, description: &str, main: &str) -> String {
    fill(
        LAYOUT_TEMPLATE,
        &[
            ("PAGE_TITLE", html_escape(title).as_str()),
            ("PAGE_DESCRIPTION", html_escape(description).as_str()),
            ("MAIN", main),
        ],
    )
}

// =============================================================================
// GUIDES
// =============================================================================

/// Inner markup for one gate state.
#[must_use]
pub fn gate_fragment(state: &GateState) -> String {
    match state {
        GateState::Locked { placeholder, sign_in_href } => fill(
            LOCKED_TEMPLATE,
            &[
                ("PLACEHOLDER_TITLE", html_escape(&placeholder.title).as_str()),
                ("PLACEHOLDER_DESCRIPTION", html_escape(&placeholder.description).as_str()),
                ("SIGN_IN_HREF", html_escape(sign_in_href).as_str()),
            ],
        ),
        GateState::Loading => concat!(
            r#"<div class="gate gate-loading">"#,
            r#"<div class="skeleton skeleton-title"></div>"#,
            r#"<div class="skeleton skeleton-sm"></div>"#,
            r#"<div class="skeleton skeleton-lg"></div>"#,
            "</div>"
        )
        .to_owned(),
        GateState::Error { message } => format!(
            r#"<div class="gate gate-error"><p><strong>Error:</strong> {}</p></div>"#,
            html_escape(message)
        ),
        GateState::Loaded(payload) => {
            let mut out = String::from(r#"<article class="gate gate-loaded">"#);
            let _ = write!(out, r#"<pre class="mdx">{}</pre>"#, html_escape(&payload.body));
            for src in &payload.images {
                let src = html_escape(src);
                let _ = write!(out, r#"<figure><img src="{src}" alt="{src}" loading="lazy"></figure>"#);
            }
            out.push_str("</article>");
            out
        }
    }
}

/// Full guide page: header from the document, body from the gate.
///
/// `nav` is the section's documents in display order; the entry matching
/// `doc` is marked active.
#[must_use]
pub fn guide_page(section_title: &str, nav: &[&GuideDocument], doc: &GuideDocument, state: &GateState) -> String {
    let mut links = String::new();
    for item in nav {
        let class = if item.slug == doc.slug { r#" class="active""# } else { "" };
        let _ = write!(
            links,
            r#"<li><a href="/{}"{class}>{}</a></li>"#,
            html_escape(&item.slug),
            html_escape(&item.title)
        );
    }

    let main = fill(
        GUIDE_TEMPLATE,
        &[
            ("SECTION_TITLE", html_escape(section_title).as_str()),
            ("NAV", links.as_str()),
            ("TITLE", html_escape(&doc.title).as_str()),
            ("DESCRIPTION", html_escape(&doc.description).as_str()),
            ("CONTENT", gate_fragment(state).as_str()),
        ],
    );
    page(&doc.title, &doc.description, &main)
}

// =============================================================================
// OTHER PAGES
// =============================================================================

#[must_use]
pub fn dashboard_page(principal: &Principal) -> String {
    let verified = principal
        .email_verified
        .map_or_else(|| "no".to_owned(), |at| at.date().to_string());
    let main = fill(
        DASHBOARD_TEMPLATE,
        &[
            ("EMAIL", html_escape(&principal.email).as_str()),
            ("NAME", html_escape(principal.name.as_deref().unwrap_or("-")).as_str()),
            ("ROLE", principal.role.as_str()),
            ("VERIFIED", verified.as_str()),
        ],
    );
    page("Dashboard", "Your account", &main)
}

#[must_use]
pub fn not_found_page() -> String {
    page("Not found", "Page not found", NOT_FOUND_TEMPLATE)
}

#[cfg(test)]
#[path = "render_test.rs"]
mod tests;
