//! Rewrite generator cross-references to final CMS slugs.
//!
//! Only the `href` value of matching `<a>` tags is touched; every other byte
//! of the stored body is preserved.

use std::sync::LazyLock;

use regex::{Captures, Regex};

use cloudmouse_shared::{Catalog, HTML_EXT};

use super::paths::SlugMap;

static ANCHOR_HREF_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)<a\b[^>]*?\shref\s*=\s*(?:"([^"]*)"|'([^']*)')"#).expect("valid regex")
});

/// Generator namespace segment dropped by the fallback mapping.
const NAMESPACE_SEGMENT: &str = "CloudMouse_1_1";

/// Outcome of rewriting one page body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewrittenBody {
    pub html: String,
    pub rewritten: usize,
    /// `href`s that could not be mapped.
    pub misses: Vec<String>,
}

/// Map a generator file name to a sanitized file name present in `slugs`.
///
/// Tries the catalog first (components, then link aliases), then derives a
/// name from `class…`, `struct…` and `…_8h` patterns. Derived names are only
/// accepted when a page with that name was written in this run.
pub fn map_target(file: &str, catalog: &Catalog, slugs: &SlugMap) -> Option<String> {
    if let Some(canonical) = catalog.canonical_for_source(file) {
        let candidate = format!("{canonical}{HTML_EXT}");
        return slugs.contains(&candidate).then_some(candidate);
    }

    let base = file.strip_suffix(HTML_EXT).unwrap_or(file);
    let derived = if let Some(rest) = base.strip_prefix("class") {
        rest.replace(NAMESPACE_SEGMENT, "").to_lowercase()
    } else if let Some(rest) = base.strip_prefix("struct") {
        rest.replace(NAMESPACE_SEGMENT, "").to_lowercase()
    } else if let Some(rest) = base.strip_suffix("_8h") {
        rest.to_lowercase()
    } else {
        return None;
    };

    let candidate = format!("{derived}{HTML_EXT}");
    slugs.contains(&candidate).then_some(candidate)
}

/// Rewrite every mappable `<a href>` in `html`.
pub fn rewrite_links(html: &str, catalog: &Catalog, slugs: &SlugMap) -> RewrittenBody {
    let mut rewritten = 0;
    let mut misses = Vec::new();

    let out = ANCHOR_HREF_RE.replace_all(html, |caps: &Captures| {
        let whole = &caps[0];
        let Some(value) = caps.get(1).or_else(|| caps.get(2)) else {
            return whole.to_string();
        };
        let href = value.as_str();
        if href.is_empty() || href.starts_with('#') {
            return whole.to_string();
        }

        let (file, fragment) = match href.split_once('#') {
            Some((file, fragment)) => (file, Some(fragment)),
            None => (href, None),
        };

        let target = map_target(file, catalog, slugs).and_then(|f| slugs.get(&f).map(str::to_string));
        let Some(slug) = target else {
            misses.push(href.to_string());
            return whole.to_string();
        };

        let new_href = match fragment {
            Some(fragment) => format!("{slug}#{fragment}"),
            None => slug,
        };
        rewritten += 1;

        let offset = caps.get(0).map(|m| m.start()).unwrap_or_default();
        let start = value.start() - offset;
        let end = value.end() - offset;
        format!("{}{}{}", &whole[..start], new_href, &whole[end..])
    });

    RewrittenBody {
        html: out.into_owned(),
        rewritten,
        misses,
    }
}
