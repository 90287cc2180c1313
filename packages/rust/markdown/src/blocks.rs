//! Blocks converted by hand before `htmd` sees the document.
//!
//! Code listings and tables are cut out of the HTML and replaced by inert
//! tokens wrapped in `<p>`. Tokens are delimited by private-use code points
//! that are stripped from the input first, so no page text can collide with
//! one. After `htmd` has converted the rest, the tokens are swapped for the
//! finished Markdown.

use std::sync::LazyLock;

use regex::{Captures, Regex};
use scraper::{Html, Selector};

/// `<pre …><code class="language-X" …>…</code></pre>`
static CODE_WITH_LANG_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?s)<pre(?:\s[^>]*)?>\s*<code\s+class="language-([^"]+)"[^>]*>(.*?)</code>\s*</pre>"#,
    )
    .expect("valid regex")
});

/// `<pre …><code …>…</code></pre>` without a language class.
static CODE_PLAIN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<pre(?:\s[^>]*)?>\s*<code(?:\s[^>]*)?>(.*?)</code>\s*</pre>")
        .expect("valid regex")
});

static TABLE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<table\b.*?</table>").expect("valid regex"));

static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]+>").expect("valid regex"));

const TOKEN_OPEN: char = '\u{E000}';
const TOKEN_CLOSE: char = '\u{E001}';

/// HTML with protected blocks replaced by tokens, plus their Markdown.
pub(crate) struct Protected {
    pub html: String,
    blocks: Vec<String>,
}

impl Protected {
    /// Swap every token in `md` for its block.
    pub fn restore(&self, md: &str) -> String {
        let mut out = md.to_string();
        for (i, block) in self.blocks.iter().enumerate().rev() {
            out = out.replace(&token(i), block);
        }
        out
    }
}

fn token(i: usize) -> String {
    format!("{TOKEN_OPEN}block{i}{TOKEN_CLOSE}")
}

/// Cut code listings and flat tables out of `html`.
pub(crate) fn protect(html: &str) -> Protected {
    let html: String = html.chars().filter(|&c| c != TOKEN_OPEN && c != TOKEN_CLOSE).collect();
    let mut blocks = Vec::new();

    let mut push = |block: String| -> String {
        let placeholder = format!("\n<p>{}</p>\n", token(blocks.len()));
        blocks.push(block);
        placeholder
    };

    let html = CODE_WITH_LANG_RE
        .replace_all(&html, |caps: &Captures| push(code_fence(Some(&caps[1]), &caps[2])))
        .into_owned();
    let html = CODE_PLAIN_RE
        .replace_all(&html, |caps: &Captures| push(code_fence(None, &caps[1])))
        .into_owned();
    let html = TABLE_RE
        .replace_all(&html, |caps: &Captures| {
            let table = &caps[0];
            // Nested tables are left for htmd.
            if table[1..].to_ascii_lowercase().contains("<table") {
                return table.to_string();
            }
            match table_to_markdown(table) {
                Some(md) => push(md),
                None => table.to_string(),
            }
        })
        .into_owned();

    Protected { html, blocks }
}

/// Fenced block with optional language; inner tags stripped, entities decoded.
pub(crate) fn code_fence(language: Option<&str>, inner_html: &str) -> String {
    let code = TAG_RE.replace_all(inner_html, "");
    let code = decode_entities(&code);
    format!("```{}\n{}\n```", language.unwrap_or(""), code.trim())
}

/// Decode the entities generator output and the CMS editor produce.
/// `&amp;` goes last so `&amp;lt;` stays a literal `&lt;`.
pub(crate) fn decode_entities(s: &str) -> String {
    s.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}

/// Render a table without nested tables as a pipe table.
fn table_to_markdown(table_html: &str) -> Option<String> {
    static ROW: LazyLock<Selector> = LazyLock::new(|| Selector::parse("tr").unwrap());
    static CELL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("th, td").unwrap());
    static HEADER_CELL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("th").unwrap());

    let doc = Html::parse_fragment(table_html);
    let mut rows: Vec<Vec<String>> = Vec::new();
    let mut has_header = false;

    for (i, tr) in doc.select(&ROW).enumerate() {
        if i == 0 && tr.select(&HEADER_CELL).next().is_some() {
            has_header = true;
        }
        let cells: Vec<String> = tr
            .select(&CELL)
            .map(|cell| cell_text(&cell.text().collect::<String>()))
            .collect();
        if !cells.is_empty() {
            rows.push(cells);
        }
    }

    let cols = rows.iter().map(Vec::len).max()?;
    if cols == 0 {
        return None;
    }
    for row in &mut rows {
        row.resize(cols, String::new());
    }

    let line = |cells: &[String]| format!("| {} |", cells.join(" | "));
    let separator = line(&vec!["---".to_string(); cols]);

    let mut out = Vec::with_capacity(rows.len() + 2);
    if has_header {
        out.push(line(&rows[0]));
        out.push(separator);
        out.extend(rows[1..].iter().map(|r| line(r)));
    } else {
        // Pipe tables need a header row; use an empty one.
        out.push(line(&vec![String::new(); cols]));
        out.push(separator);
        out.extend(rows.iter().map(|r| line(r)));
    }
    Some(out.join("\n"))
}

fn cell_text(raw: &str) -> String {
    raw.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .replace('|', "\\|")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_fence_with_language() {
        let fence = code_fence(Some("cpp"), "  if (a &lt; b) { run(&quot;x&quot;); }\n");
        assert_eq!(fence, "```cpp\nif (a < b) { run(\"x\"); }\n```");
    }

    #[test]
    fn code_fence_strips_inner_tags() {
        let fence = code_fence(None, r#"<span class="kw">int</span> x = 1;"#);
        assert_eq!(fence, "```\nint x = 1;\n```");
    }

    #[test]
    fn amp_is_decoded_last() {
        assert_eq!(decode_entities("&amp;lt;tag&amp;gt;"), "&lt;tag&gt;");
    }

    #[test]
    fn protect_replaces_both_code_forms() {
        let html = r#"<p>a</p><pre><code class="language-js">x()</code></pre><pre class="code-block"><code>y()</code></pre>"#;
        let protected = protect(html);
        assert!(protected.html.contains(&format!("<p>{}</p>", token(0))));
        assert!(protected.html.contains(&format!("<p>{}</p>", token(1))));
        assert!(!protected.html.contains("<pre"));
        let md = format!("{}\n\n{}", token(0), token(1));
        assert_eq!(protected.restore(&md), "```js\nx()\n```\n\n```\ny()\n```");
    }

    #[test]
    fn restore_handles_double_digit_tokens() {
        let html: String = (0..12).map(|i| format!("<pre><code>c{i}</code></pre>")).collect();
        let protected = protect(&html);
        let restored = protected.restore(&format!("{} {}", token(1), token(11)));
        assert_eq!(restored, "```\nc1\n``` ```\nc11\n```");
    }

    #[test]
    fn literal_token_text_is_untouched() {
        let html = format!(
            "<p>see cmblock0 and {}</p><pre><code>x</code></pre>",
            token(0)
        );
        let protected = protect(&html);
        assert_eq!(protected.blocks.len(), 1);
        assert!(protected.html.starts_with("<p>see cmblock0 and block0</p>"));

        let md = format!("see cmblock0 and block0\n\n{}", token(0));
        assert_eq!(protected.restore(&md), "see cmblock0 and block0\n\n```\nx\n```");
    }

    #[test]
    fn table_becomes_pipe_table() {
        let html = "<table class=\"api-table\"><tr><th>Name</th><th>Pin</th></tr><tr><td>LED</td><td>GPIO 48</td></tr></table>";
        let protected = protect(html);
        assert_eq!(
            protected.restore(&token(0)),
            "| Name | Pin |\n| --- | --- |\n| LED | GPIO 48 |"
        );
    }

    #[test]
    fn headerless_table_gets_empty_header() {
        let md = table_to_markdown("<table><tr><td>a|b</td><td>c</td></tr></table>").unwrap();
        assert_eq!(md, "|  |  |\n| --- | --- |\n| a\\|b | c |");
    }

    #[test]
    fn nested_tables_are_left_alone() {
        let html = "<table><tr><td><table><tr><td>x</td></tr></table></td></tr></table>";
        let protected = protect(html);
        assert!(protected.html.contains("<table>"));
    }
}
