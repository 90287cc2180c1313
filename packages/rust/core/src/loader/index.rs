//! Page titles and abstracts, read back from the sanitized `index.html`.

use std::collections::HashMap;
use std::sync::LazyLock;

use scraper::{ElementRef, Html, Selector};

use cloudmouse_sanitizer::INDEX_FILE;
use cloudmouse_shared::HTML_EXT;

/// Title used when a page has no index entry and no heading.
pub const FALLBACK_TITLE: &str = "Documentation";

/// Title and abstract for one component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentInfo {
    pub title: String,
    pub abstract_text: String,
}

/// Component name (file stem) → info. Later entries win.
pub fn parse_component_info(index_html: &str) -> HashMap<String, ComponentInfo> {
    static LINK: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a[href]").unwrap());

    let doc = Html::parse_document(index_html);
    let mut info = HashMap::new();

    for link in doc.select(&LINK) {
        let Some(href) = link.value().attr("href") else {
            continue;
        };
        if href == INDEX_FILE {
            continue;
        }
        let Some(component) = href.strip_suffix(HTML_EXT) else {
            continue;
        };

        let title = text_of(link);
        let abstract_text = enclosing_li(link)
            .and_then(|li| {
                let full = text_of(li);
                full.split_once(" - ").map(|(_, rest)| rest.trim().to_string())
            })
            .unwrap_or_else(|| title.clone());

        info.insert(component.to_string(), ComponentInfo { title, abstract_text });
    }
    info
}

/// First `h1`, else first `h2`/`h3`/`h4`, else [`FALLBACK_TITLE`].
pub fn extract_title(html: &str) -> String {
    static HEADINGS: LazyLock<Vec<Selector>> = LazyLock::new(|| {
        ["h1", "h2", "h3", "h4"]
            .iter()
            .map(|s| Selector::parse(s).unwrap())
            .collect()
    });

    let doc = Html::parse_fragment(html);
    HEADINGS
        .iter()
        .find_map(|sel| doc.select(sel).next())
        .map(text_of)
        .unwrap_or_else(|| FALLBACK_TITLE.to_string())
}

fn text_of(el: ElementRef<'_>) -> String {
    el.text().collect::<String>().trim().to_string()
}

fn enclosing_li(el: ElementRef<'_>) -> Option<ElementRef<'_>> {
    el.ancestors()
        .filter_map(ElementRef::wrap)
        .find(|a| a.value().name() == "li")
}

#[cfg(test)]
mod tests {
    use super::*;
    use cloudmouse_sanitizer::render_index;
    use cloudmouse_shared::Catalog;

    #[test]
    fn parses_entries_with_blurbs() {
        let html = r#"<ul>
            <li><a href="core.html">Core</a> - Main coordinator</li>
            <li><a href="event.html">Event</a></li>
            <li><a href="index.html">Home</a> - ignored</li>
            <li><a href="https://example.com">External</a> - ignored</li>
        </ul>
        <p><a href="ledmanager.html">LEDManager</a></p>"#;
        let info = parse_component_info(html);

        assert_eq!(
            info["core"],
            ComponentInfo { title: "Core".into(), abstract_text: "Main coordinator".into() }
        );
        assert_eq!(info["event"].abstract_text, "Event");
        assert_eq!(info["ledmanager"].abstract_text, "LEDManager");
        assert!(!info.contains_key("index"));
        assert_eq!(info.len(), 3);
    }

    #[test]
    fn later_entries_win() {
        let html = r#"<ul><li><a href="hardware.html">Hardware</a> - first</li>
                      <li><a href="hardware.html">Hardware</a> - second</li></ul>"#;
        assert_eq!(parse_component_info(html)["hardware"].abstract_text, "second");
    }

    #[test]
    fn default_index_round_trips() {
        let catalog = Catalog::default();
        let info = parse_component_info(&render_index(&catalog.index));
        let core = &info["core"];
        assert_eq!(core.title, "Core");
        assert!(!core.abstract_text.is_empty());
    }

    #[test]
    fn title_fallbacks() {
        assert_eq!(extract_title("<h2>Sub</h2><h1>Main</h1>"), "Main");
        assert_eq!(extract_title("<h3>Third</h3><h2>Second</h2>"), "Second");
        assert_eq!(extract_title("<p>nothing</p>"), FALLBACK_TITLE);
    }
}
