//! Reduce Doxygen reference pages to clean, CMS-ready HTML fragments.
//!
//! The generator wraps every page in navigation, search boxes, scripts and
//! tracking ids. [`clean_html`] drops that chrome, keeps the first content
//! container, and rewrites generator classes into a small stable vocabulary
//! (`code-block`, `parameter-list`, `member-item`, `section-header`,
//! `api-table`).

mod index;
mod render;

use std::sync::LazyLock;

use scraper::{ElementRef, Html, Selector};
use tracing::{debug, instrument};

use cloudmouse_shared::ComponentSource;

pub use index::{INDEX_FILE, render_index};

use render::Renderer;

// ---------------------------------------------------------------------------
// Selectors
// ---------------------------------------------------------------------------

/// Chrome removed from every page before anything else.
const BLOCKED_SELECTORS: &[&str] = &[
    "#top",
    ".header",
    ".tabs",
    ".navpath",
    "#nav-tree",
    "#splitbar",
    "#side-nav",
    ".footer",
    "#MSearchBox",
    ".directory",
    "script",
    r#"link[rel="stylesheet"]"#,
    "style",
];

/// Content containers, in priority order. `body` is the last resort.
const CONTENT_SELECTORS: &[&str] = &[
    ".contents",
    "#doc-content",
    ".textblock",
    ".memitem",
    ".groupheader",
];

/// Trailing notice listing the source files a page was generated from.
const GENERATED_NOTICES: &[&str] = &[
    "The documentation for this class was generated from the following files:",
    "The documentation for this class was generated from the following file:",
];

static BLOCKED: LazyLock<Vec<Selector>> = LazyLock::new(|| {
    BLOCKED_SELECTORS
        .iter()
        .map(|s| Selector::parse(s).unwrap())
        .collect()
});

static CONTENT: LazyLock<Vec<Selector>> = LazyLock::new(|| {
    CONTENT_SELECTORS
        .iter()
        .map(|s| Selector::parse(s).unwrap())
        .collect()
});

static BODY: LazyLock<Selector> = LazyLock::new(|| Selector::parse("body").unwrap());
static LIST: LazyLock<Selector> = LazyLock::new(|| Selector::parse("ul").unwrap());

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// A sanitized page ready to be written to the clean directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SanitizedPage {
    /// Output file name, e.g. `core.html`.
    pub file_name: String,
    /// Reduced HTML fragment.
    pub html: String,
}

/// Sanitize one generator page for `component`.
///
/// Returns `None` when the page has no usable content.
#[instrument(skip(html, component), fields(source = %component.source))]
pub fn sanitize_page(html: &str, component: &ComponentSource) -> Option<SanitizedPage> {
    let cleaned = clean_html(html)?;
    Some(SanitizedPage {
        file_name: component.output_file(),
        html: cleaned,
    })
}

/// Reduce a full HTML document to its content fragment.
///
/// Returns `None` when neither a content container nor `body` exists, or when
/// nothing visible survives the cleanup.
pub fn clean_html(html: &str) -> Option<String> {
    let doc = Html::parse_document(html);

    let Some(container) = find_container(&doc) else {
        debug!("no content container or body found");
        return None;
    };

    let container_text: String = container.text().collect();
    let has_notice = GENERATED_NOTICES
        .iter()
        .any(|notice| container_text.contains(notice));
    let dropped_list = if has_notice {
        trailing_file_list(container)
    } else {
        None
    };
    let notices: &[&str] = if has_notice { GENERATED_NOTICES } else { &[] };

    let rendered = Renderer::new(&BLOCKED, dropped_list, notices).render(container);
    if !rendered.has_text {
        debug!(container = container.value().name(), "container is empty after cleanup");
        return None;
    }
    Some(rendered.html)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn is_blocked(el: ElementRef<'_>) -> bool {
    BLOCKED.iter().any(|sel| sel.matches(&el))
}

/// True when `el` or any of its ancestors is part of the removed chrome.
fn inside_blocked(el: ElementRef<'_>) -> bool {
    is_blocked(el) || el.ancestors().filter_map(ElementRef::wrap).any(is_blocked)
}

fn find_container(doc: &Html) -> Option<ElementRef<'_>> {
    for selector in CONTENT.iter() {
        if let Some(el) = doc.select(selector).find(|el| !inside_blocked(*el)) {
            return Some(el);
        }
    }
    doc.select(&BODY).next()
}

/// The last list in the container, when it is the generated file listing.
fn trailing_file_list(container: ElementRef<'_>) -> Option<ElementRef<'_>> {
    let last = container
        .select(&LIST)
        .filter(|ul| !inside_blocked(*ul))
        .last()?;
    let text: String = last.text().collect();
    (text.contains(".h") || text.contains(".cpp")).then_some(last)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture_path(name: &str) -> std::path::PathBuf {
        std::path::Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("../../../fixtures/html")
            .join(name)
    }

    fn load_fixture(name: &str) -> String {
        std::fs::read_to_string(fixture_path(name))
            .unwrap_or_else(|e| panic!("failed to read fixture {name}: {e}"))
    }

    fn wrap(body: &str) -> String {
        format!("<html><head><title>t</title></head><body>{body}</body></html>")
    }

    #[test]
    fn fragment_becomes_code_block() {
        let html = wrap(r#"<div class="contents"><div class="fragment">print("hi")</div></div>"#);
        let out = clean_html(&html).unwrap();
        assert_eq!(
            out,
            r#"<div class="contents"><pre class="code-block"><code>print("hi")</code></pre></div>"#
        );
    }

    #[test]
    fn fragment_text_is_reescaped() {
        let html = wrap(r#"<div class="contents"><div class="fragment">if (a &lt; b) {}</div></div>"#);
        let out = clean_html(&html).unwrap();
        assert!(out.contains("<code>if (a &lt; b) {}</code>"));
    }

    #[test]
    fn falls_back_to_body() {
        let html = wrap("<p>Plain page</p>");
        let out = clean_html(&html).unwrap();
        assert_eq!(out, "<body><p>Plain page</p></body>");
    }

    #[test]
    fn empty_container_is_none() {
        let html = wrap(r#"<div class="contents">   <script>x()</script> </div>"#);
        assert!(clean_html(&html).is_none());
    }

    #[test]
    fn container_inside_chrome_is_skipped() {
        let html = wrap(
            r#"<div class="header"><div class="textblock">nav text</div></div>
               <div class="textblock">real text</div>"#,
        );
        let out = clean_html(&html).unwrap();
        assert!(out.contains("real text"));
        assert!(!out.contains("nav text"));
    }

    #[test]
    fn params_are_rewritten() {
        let html = wrap(
            r#"<div class="contents"><dl class="params"><dt>Parameters</dt><dd>value</dd></dl></div>"#,
        );
        let out = clean_html(&html).unwrap();
        assert!(out.contains(r#"<dl class="parameter-list">"#));
        assert!(out.contains(r#"<strong class="param-name">Parameters</strong>"#));
        assert!(out.contains(r#"<div class="param-description">value</div>"#));
    }

    #[test]
    fn memtitle_only_renamed_inside_memitem() {
        let html = wrap(
            r#"<div class="contents">
                 <div class="memtitle">outside</div>
                 <div class="memitem"><div class="memtitle">inside</div><div class="memdoc">doc</div></div>
               </div>"#,
        );
        let out = clean_html(&html).unwrap();
        assert!(out.contains(r#"<div class="memtitle">outside</div>"#));
        assert!(out.contains(r#"<div class="member-item">"#));
        assert!(out.contains(r#"<div class="member-title">inside</div>"#));
        assert!(out.contains(r#"<div class="member-doc">doc</div>"#));
    }

    #[test]
    fn table_classes_filtered() {
        let html = wrap(
            r#"<div class="contents">
                 <table class="memberdecls"><tr><td>a</td></tr></table>
                 <table class="doxtable fieldtable"><tr><td>b</td></tr></table>
                 <table><tr><td>c</td></tr></table>
               </div>"#,
        );
        let out = clean_html(&html).unwrap();
        assert_eq!(out.matches(r#"<table class="api-table">"#).count(), 2);
        assert!(out.contains(r#"<table class="fieldtable">"#));
    }

    #[test]
    fn short_ids_survive_and_generated_ids_drop() {
        let html = wrap(
            r#"<div class="contents"><a id="details">x</a><a id="a0123456789abcdef">y</a></div>"#,
        );
        let out = clean_html(&html).unwrap();
        assert!(out.contains(r#"<a id="details">x</a>"#));
        assert!(out.contains("<a>y</a>"));
    }

    #[test]
    fn comments_and_handlers_are_dropped() {
        let html = wrap(
            r#"<div class="contents"><!-- hidden --><p onclick="go()" style="x" align="left">t</p></div>"#,
        );
        let out = clean_html(&html).unwrap();
        assert_eq!(out, r#"<div class="contents"><p align="left">t</p></div>"#);
    }

    #[test]
    fn generated_notice_and_file_list_removed() {
        let html = wrap(
            r#"<div class="contents"><p>Body</p><ul><li>keep</li></ul>
               The documentation for this class was generated from the following file:<ul><li>Core.h</li></ul></div>"#,
        );
        let out = clean_html(&html).unwrap();
        assert!(!out.contains("generated from"));
        assert!(!out.contains("Core.h"));
        assert!(out.contains("<li>keep</li>"));
    }

    #[test]
    fn trailing_list_kept_without_notice() {
        let html = wrap(r#"<div class="contents"><ul><li>Core.h</li></ul></div>"#);
        let out = clean_html(&html).unwrap();
        assert!(out.contains("Core.h"));
    }

    #[test]
    fn doxygen_fixture_is_reduced() {
        let html = load_fixture("classCloudMouse_1_1Core.html");
        let out = clean_html(&html).unwrap();

        assert!(out.starts_with(r#"<div class="contents">"#));
        assert!(!out.contains("<script"));
        assert!(!out.contains("MSearchBox"));
        assert!(!out.contains("Generated by"));
        assert!(!out.contains("src/core/Core.cpp"));
        assert!(out.contains(r#"<h2 class="section-header">"#));
        assert!(out.contains(r#"<pre class="code-block"><code>"#));
        assert!(out.contains("core.initialize();"));
        assert!(out.contains(r#"<div class="member-item">"#));
        assert!(out.contains(r#"<dl class="parameter-list">"#));
        assert!(out.contains(r#"href="classCloudMouse_1_1EventBus.html""#));
    }

    #[test]
    fn output_is_deterministic() {
        let html = load_fixture("classCloudMouse_1_1Core.html");
        assert_eq!(clean_html(&html), clean_html(&html));
    }

    #[test]
    fn sanitize_page_uses_canonical_name() {
        let component = ComponentSource {
            source: "classCloudMouse_1_1Core.html".into(),
            name: "Core".into(),
        };
        let page = sanitize_page(&load_fixture("classCloudMouse_1_1Core.html"), &component).unwrap();
        assert_eq!(page.file_name, "core.html");
    }
}
