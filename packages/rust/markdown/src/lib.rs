//! HTML-to-Markdown conversion for CMS page exports.
//!
//! Code listings and tables are converted by hand (see `blocks`), everything
//! else goes through `htmd`, then a series of cleanup passes normalizes the
//! result.

mod blocks;
mod cleanup;
mod links;

use tracing::{debug, instrument};

use cloudmouse_shared::{CloudMouseError, Result};

pub use links::{clean_abstract, retarget_links};

// ---------------------------------------------------------------------------
// Converter
// ---------------------------------------------------------------------------

/// Convert an HTML fragment or document to Markdown.
///
/// 1. Cuts code listings and tables out into placeholders
/// 2. Converts the rest via `htmd`
/// 3. Puts the hand-converted blocks back
/// 4. Runs the cleanup pipeline (trailing whitespace, blank lines, trim)
#[instrument(skip(html), fields(len = html.len()))]
pub fn html_to_markdown(html: &str) -> Result<String> {
    let protected = blocks::protect(html);

    let converter = htmd::HtmlToMarkdown::builder()
        .skip_tags(vec!["script", "style", "nav", "iframe", "noscript", "svg", "head"])
        .build();

    let raw_markdown = converter
        .convert(&protected.html)
        .map_err(|e| CloudMouseError::Conversion(format!("htmd conversion failed: {e}")))?;

    let restored = protected.restore(&raw_markdown);
    let cleaned = cleanup::run_pipeline(&restored);

    debug!(raw_len = raw_markdown.len(), final_len = cleaned.len(), "conversion complete");
    Ok(cleaned)
}

/// Render one exported page: H1 title, optional H3 abstract, then the body.
pub fn render_page(title: &str, abstract_html: &str, body_html: &str) -> Result<String> {
    let body = html_to_markdown(body_html)?;
    let summary = clean_abstract(abstract_html);

    let mut out = format!("# {title}\n\n");
    if !summary.is_empty() {
        out.push_str(&format!("### {summary}\n\n"));
    }
    out.push_str(&body);
    Ok(out)
}

/// Export file name for a page: zero-padded order, then the uri with dashes
/// turned into underscores (`7`, `getting-started` → `07_getting_started.md`).
pub fn export_file_name(ord: i64, uri: &str) -> String {
    format!("{ord:02}_{}.md", uri.replace('-', "_"))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_names_are_padded() {
        assert_eq!(export_file_name(7, "getting-started"), "07_getting_started.md");
        assert_eq!(export_file_name(12, "api"), "12_api.md");
    }

    #[test]
    fn page_with_abstract() {
        let md = render_page("Title", "Line one<br>Line two", "<p>Body text.</p>").unwrap();
        assert_eq!(md, "# Title\n\n### Line one\nLine two\n\nBody text.");
    }

    #[test]
    fn empty_abstract_is_omitted() {
        let md = render_page("Title", "", "<p>Body</p>").unwrap();
        assert_eq!(md, "# Title\n\nBody");
    }

    #[test]
    fn code_blocks_become_fences() {
        let html = r#"<p>Usage:</p><pre><code class="language-cpp">Core core;
core.initialize(&amp;cfg);</code></pre><p>Done.</p>"#;
        let md = html_to_markdown(html).unwrap();
        assert!(md.contains("```cpp\nCore core;\ncore.initialize(&cfg);\n```"), "{md}");
        assert!(md.starts_with("Usage:"));
        assert!(md.ends_with("Done."));
    }

    #[test]
    fn sanitized_code_block_without_language() {
        let html = r#"<pre class="code-block"><code>led.setColor(255, 0, 0);</code></pre>"#;
        let md = html_to_markdown(html).unwrap();
        assert_eq!(md, "```\nled.setColor(255, 0, 0);\n```");
    }

    #[test]
    fn links_and_images_survive() {
        let html = r#"<p>See <a href="02_hardware.md">hardware</a> <img src="board.png" alt="Board"></p>"#;
        let md = html_to_markdown(html).unwrap();
        assert!(md.contains("[hardware](02_hardware.md)"), "{md}");
        assert!(md.contains("![Board](board.png)"), "{md}");
    }

    #[test]
    fn blank_runs_collapse() {
        let md = html_to_markdown("<p>a</p><br><br><br><br><p>b</p>").unwrap();
        assert!(!md.contains("\n\n\n"));
    }

    #[test]
    fn headings_convert() {
        let md = html_to_markdown("<h2>Setup</h2><p>Plug it in.</p>").unwrap();
        assert_eq!(md, "## Setup\n\nPlug it in.");
    }
}
