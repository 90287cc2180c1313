//! Link retargeting and abstract cleanup on stored CMS HTML.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::{Captures, Regex};

use crate::blocks::decode_entities;

static ANCHOR_HREF_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<a\s+[^>]*href=["']([^"']+)["'][^>]*>"#).expect("valid regex")
});

static BR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<br\s*/?>").expect("valid regex"));

static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]+>").expect("valid regex"));

/// Point links into the CMS at the exported Markdown files.
///
/// Only `href`s starting with `service_host` are considered; their last
/// non-empty path segment is looked up in `uri_to_file`. Everything else is
/// left byte-identical.
pub fn retarget_links(html: &str, service_host: &str, uri_to_file: &HashMap<String, String>) -> String {
    if service_host.is_empty() {
        return html.to_string();
    }

    ANCHOR_HREF_RE
        .replace_all(html, |caps: &Captures| {
            let tag = &caps[0];
            let href = &caps[1];

            if !href.starts_with(service_host) {
                return tag.to_string();
            }
            let segment = href.trim_end_matches('/').rsplit('/').next().unwrap_or_default();
            match uri_to_file.get(segment) {
                Some(file) => {
                    // Splice by position so only the href value changes.
                    let (Some(whole), Some(value)) = (caps.get(0), caps.get(1)) else {
                        return tag.to_string();
                    };
                    let start = value.start() - whole.start();
                    let end = value.end() - whole.start();
                    format!("{}{}{}", &tag[..start], file, &tag[end..])
                }
                None => tag.to_string(),
            }
        })
        .into_owned()
}

/// Turn an HTML abstract into plain text: `<br>` variants become newlines,
/// other tags are dropped, entities decoded.
pub fn clean_abstract(html: &str) -> String {
    if html.is_empty() {
        return String::new();
    }
    let text = BR_RE.replace_all(html, "\n");
    let text = TAG_RE.replace_all(&text, "");
    decode_entities(&text.replace("&nbsp;", " ")).trim().to_string()
}
