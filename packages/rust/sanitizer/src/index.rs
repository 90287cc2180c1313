//! The generated `index.html` landing page.
//!
//! Built from the catalog, not from the generator output. The loader reads it
//! back to pick up page titles and abstracts, so each entry keeps the
//! `<a href="file">Label</a> - blurb` shape.

use cloudmouse_shared::IndexPage;

/// File name of the generated index.
pub const INDEX_FILE: &str = "index.html";

/// Render the index page fragment.
pub fn render_index(index: &IndexPage) -> String {
    let mut out = String::from("\n");
    out.push_str(&format!("<h1>{}</h1>\n", escape(&index.title)));

    for section in &index.sections {
        out.push_str(&format!("\n<h2>{}</h2>\n<ul>\n", escape(&section.heading)));
        for entry in &section.entries {
            out.push_str(&format!(
                "    <li><a href=\"{}\">{}</a> - {}</li>\n",
                escape(&entry.file),
                escape(&entry.label),
                escape(&entry.blurb)
            ));
        }
        out.push_str("</ul>\n");
    }

    if !index.footer_html.is_empty() {
        out.push('\n');
        out.push_str(index.footer_html.trim());
        out.push('\n');
    }
    out
}

fn escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use cloudmouse_shared::{Catalog, IndexEntry, IndexSection};

    #[test]
    fn renders_sections_and_entries() {
        let index = IndexPage {
            title: "CloudMouse SDK".into(),
            footer_html: "<p>Happy hacking.</p>".into(),
            sections: vec![IndexSection {
                heading: "Core".into(),
                entries: vec![IndexEntry {
                    file: "core.html".into(),
                    label: "Core".into(),
                    blurb: "Runtime coordinator & scheduler".into(),
                }],
            }],
        };

        let html = render_index(&index);
        assert!(html.contains("<h1>CloudMouse SDK</h1>"));
        assert!(html.contains("<h2>Core</h2>"));
        assert!(html.contains(
            r#"<li><a href="core.html">Core</a> - Runtime coordinator &amp; scheduler</li>"#
        ));
        assert!(html.trim_end().ends_with("<p>Happy hacking.</p>"));
    }

    #[test]
    fn layout_is_exact() {
        let index = IndexPage {
            title: "SDK".into(),
            footer_html: String::new(),
            sections: vec![IndexSection {
                heading: "Hardware".into(),
                entries: vec![IndexEntry {
                    file: "hardware.html".into(),
                    label: "Hardware".into(),
                    blurb: "Pins".into(),
                }],
            }],
        };
        assert_eq!(
            render_index(&index),
            "\n<h1>SDK</h1>\n\n<h2>Hardware</h2>\n<ul>\n    <li><a href=\"hardware.html\">Hardware</a> - Pins</li>\n</ul>\n"
        );
    }

    #[test]
    fn default_index_links_only_known_files() {
        let catalog = Catalog::default();
        let html = render_index(&catalog.index);
        for section in &catalog.index.sections {
            for entry in &section.entries {
                assert!(html.contains(&format!(r#"href="{}""#, entry.file)));
            }
        }
        assert!(html.contains(r#"href="hardware.html""#));
    }
}
