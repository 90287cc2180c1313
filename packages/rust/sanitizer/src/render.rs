//! Serializer that writes the retained subtree back out as HTML, applying the
//! attribute and class rewrites on the way.
//!
//! `scraper` trees are read-only, so instead of mutating the DOM every rule is
//! applied while the fragment is emitted.

use scraper::{ElementRef, Node, Selector};

/// Attributes that are never carried over.
const STRIPPED_ATTRS: &[&str] = &["onclick", "onload", "style"];

/// Table classes starting with these prefixes are generator noise.
const GENERATOR_TABLE_PREFIXES: &[&str] = &["dox", "Dox"];

/// Table classes dropped by exact name.
const GENERATOR_TABLE_CLASSES: &[&str] = &["memberdecls", "memname"];

/// Elements serialized without a closing tag.
const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source",
    "track", "wbr",
];

/// Fixed class assigned to rewritten code fragments.
pub(crate) const CODE_BLOCK_CLASS: &str = "code-block";

/// Output of one render pass.
pub(crate) struct Rendered {
    pub html: String,
    /// Whether any non-whitespace text made it into the output.
    pub has_text: bool,
}

/// Inherited context while walking down the tree.
#[derive(Clone, Copy, Default)]
struct Scope {
    in_member: bool,
    in_params: bool,
}

pub(crate) struct Renderer<'a> {
    blocked: &'a [Selector],
    dropped_list: Option<ElementRef<'a>>,
    notices: &'a [&'a str],
    out: String,
    has_text: bool,
}

impl<'a> Renderer<'a> {
    /// `notices` are removed from every text node; `dropped_list` is skipped
    /// entirely.
    pub(crate) fn new(
        blocked: &'a [Selector],
        dropped_list: Option<ElementRef<'a>>,
        notices: &'a [&'a str],
    ) -> Self {
        Self {
            blocked,
            dropped_list,
            notices,
            out: String::new(),
            has_text: false,
        }
    }

    /// Render `root` with its own attributes untouched; rules apply to its
    /// descendants only.
    pub(crate) fn render(mut self, root: ElementRef<'a>) -> Rendered {
        let name = root.value().name();
        let attrs: Vec<(String, String)> = root
            .value()
            .attrs()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();

        self.open_tag(name, &attrs);
        self.render_children(root, Scope::default());
        self.close_tag(name);

        Rendered {
            html: self.out,
            has_text: self.has_text,
        }
    }

    pub(crate) fn is_blocked(&self, el: ElementRef<'_>) -> bool {
        self.blocked.iter().any(|sel| sel.matches(&el))
    }

    fn render_children(&mut self, el: ElementRef<'a>, scope: Scope) {
        for child in el.children() {
            match child.value() {
                Node::Text(text) => self.push_text(text),
                Node::Element(_) => {
                    if let Some(child_el) = ElementRef::wrap(child) {
                        self.render_element(child_el, scope);
                    }
                }
                // Comments, doctypes and processing instructions are dropped.
                _ => {}
            }
        }
    }

    fn render_element(&mut self, el: ElementRef<'a>, scope: Scope) {
        if self.is_blocked(el) || self.dropped_list == Some(el) {
            return;
        }

        let element = el.value();
        let classes: Vec<&str> = element.classes().collect();
        let has_class = |needle: &str| classes.iter().any(|c| c.contains(needle));

        if element.name() == "div" && has_class("fragment") {
            let code: String = el.text().collect();
            self.out.push_str(&format!(r#"<pre class="{CODE_BLOCK_CLASS}"><code>"#));
            self.push_text(&code);
            self.out.push_str("</code></pre>");
            return;
        }

        let mut tag = element.name();
        let mut class: Option<String> = None;
        let mut child_scope = scope;

        if tag == "dl" && has_class("params") {
            class = Some("parameter-list".into());
            child_scope.in_params = true;
        }
        if scope.in_params {
            match tag {
                "dt" => {
                    tag = "strong";
                    class = Some("param-name".into());
                }
                "dd" => {
                    tag = "div";
                    class = Some("param-description".into());
                }
                _ => {}
            }
        }

        if has_class("memitem") {
            class = Some("member-item".into());
            child_scope.in_member = true;
        } else if scope.in_member {
            if has_class("memtitle") {
                class = Some("member-title".into());
            }
            if has_class("memdoc") {
                class = Some("member-doc".into());
            }
        }

        if has_class("groupheader") {
            class = Some("section-header".into());
        }

        if tag == "table" {
            let current: Vec<String> = match &class {
                Some(c) => c.split_whitespace().map(String::from).collect(),
                None => classes.iter().map(|c| c.to_string()).collect(),
            };
            let kept: Vec<String> = current
                .into_iter()
                .filter(|c| {
                    !GENERATOR_TABLE_PREFIXES.iter().any(|p| c.starts_with(p))
                        && !GENERATOR_TABLE_CLASSES.contains(&c.as_str())
                })
                .collect();
            class = Some(if kept.is_empty() {
                "api-table".into()
            } else {
                kept.join(" ")
            });
        }

        let attrs = rewrite_attrs(element.attrs(), class);
        self.open_tag(tag, &attrs);
        self.render_children(el, child_scope);
        self.close_tag(tag);
    }

    fn open_tag(&mut self, name: &str, attrs: &[(String, String)]) {
        self.out.push('<');
        self.out.push_str(name);
        for (key, value) in attrs {
            self.out.push(' ');
            self.out.push_str(key);
            self.out.push_str("=\"");
            self.out.push_str(&escape_attr(value));
            self.out.push('"');
        }
        self.out.push('>');
    }

    fn close_tag(&mut self, name: &str) {
        if VOID_ELEMENTS.contains(&name) {
            return;
        }
        self.out.push_str("</");
        self.out.push_str(name);
        self.out.push('>');
    }

    fn push_text(&mut self, text: &str) {
        let mut text = text.to_string();
        for notice in self.notices {
            if text.contains(notice) {
                text = text.replace(notice, "");
            }
        }
        if !text.trim().is_empty() {
            self.has_text = true;
        }
        self.out.push_str(&escape_text(&text));
    }
}

/// Apply the attribute rules: strip event handlers and inline styles, drop
/// generated ids, and swap in the normalised class when one was chosen.
fn rewrite_attrs<'b>(
    attrs: impl Iterator<Item = (&'b str, &'b str)>,
    class: Option<String>,
) -> Vec<(String, String)> {
    let mut out = Vec::new();
    let mut class = class;
    let mut saw_class = false;

    for (key, value) in attrs {
        if STRIPPED_ATTRS.contains(&key) {
            continue;
        }
        if key == "id" && is_generated_id(value) {
            continue;
        }
        if key == "class" {
            saw_class = true;
            match class.take() {
                Some(replacement) => out.push((key.to_string(), replacement)),
                None => out.push((key.to_string(), value.to_string())),
            }
            continue;
        }
        out.push((key.to_string(), value.to_string()));
    }

    if !saw_class {
        if let Some(replacement) = class {
            out.push(("class".to_string(), replacement));
        }
    }
    out
}

/// Generator ids are long hashes prefixed with `a`, `g` or `_`
/// (`a1b2c3d4e5f6…`, `gaf00…`, `_details…`). Short ids are real anchors.
pub(crate) fn is_generated_id(id: &str) -> bool {
    id.starts_with(['a', 'g', '_']) && id.chars().count() > 10
}

fn escape_text(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\u{a0}' => out.push_str("&nbsp;"),
            _ => out.push(ch),
        }
    }
    out
}

fn escape_attr(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '\u{a0}' => out.push_str("&nbsp;"),
            _ => out.push(ch),
        }
    }
    out
}
