//! Markdown export: CMS pages (or local HTML files) → `.md` files.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tracing::{debug, info, instrument, warn};
use walkdir::WalkDir;

use cloudmouse_markdown::{export_file_name, html_to_markdown, render_page, retarget_links};
use cloudmouse_shared::{CloudMouseError, DEFAULT_SERVICE_HOST, Result};
use cloudmouse_storage::Database;

use crate::progress::ProgressReporter;

/// Category exported when none is given.
pub const DEFAULT_EXPORT_CATEGORY: &str = "Docs";

/// Output directory used when none is given.
pub const DEFAULT_EXPORT_DIR: &str = "markdown_docs";

#[derive(Debug, Clone)]
pub struct ExportOptions {
    pub output_dir: PathBuf,
    pub category: String,
    /// Links starting with this prefix point back into the CMS.
    pub service_host: String,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from(DEFAULT_EXPORT_DIR),
            category: DEFAULT_EXPORT_CATEGORY.to_string(),
            service_host: DEFAULT_SERVICE_HOST.to_string(),
        }
    }
}

/// Files written by an export, in write order.
#[derive(Debug, Default, Clone)]
pub struct ExportReport {
    pub written: Vec<PathBuf>,
}

/// Export every page under `opts.category` to `opts.output_dir`.
///
/// File names are fixed up front so links between exported pages can point
/// at each other's files.
#[instrument(skip_all, fields(category = %opts.category, output = %opts.output_dir.display()))]
pub async fn export_from_db(
    db: &Database,
    opts: &ExportOptions,
    progress: &dyn ProgressReporter,
) -> Result<ExportReport> {
    let pages = db.list_export_pages(&opts.category).await?;
    if pages.is_empty() {
        warn!(category = %opts.category, "no pages found");
    }

    std::fs::create_dir_all(&opts.output_dir)
        .map_err(|e| CloudMouseError::io(&opts.output_dir, e))?;

    let file_names: HashMap<String, String> = pages
        .iter()
        .map(|p| (p.uri.clone(), export_file_name(p.ord, &p.uri)))
        .collect();

    let mut report = ExportReport::default();
    let total = pages.len();
    progress.phase("Exporting pages");

    for (i, page) in pages.iter().enumerate() {
        let body = retarget_links(&page.content, &opts.service_host, &file_names);
        let markdown = render_page(&page.title, &page.abstract_html, &body)?;

        let target = opts.output_dir.join(&file_names[&page.uri]);
        std::fs::write(&target, markdown).map_err(|e| CloudMouseError::io(&target, e))?;
        debug!(uri = %page.uri, file = %target.display(), "exported");

        report.written.push(target);
        progress.item_done(&page.uri, i + 1, total);
    }

    info!(pages = report.written.len(), "export complete");
    progress.done(&format!("{} files written", report.written.len()));
    Ok(report)
}

/// Convert one local HTML file to Markdown.
pub fn convert_file(input: &Path, output: &Path) -> Result<()> {
    let html = std::fs::read_to_string(input).map_err(|e| CloudMouseError::io(input, e))?;
    let markdown = html_to_markdown(&html)?;

    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| CloudMouseError::io(parent, e))?;
    }
    std::fs::write(output, markdown).map_err(|e| CloudMouseError::io(output, e))?;
    debug!(from = %input.display(), to = %output.display(), "converted");
    Ok(())
}

/// Convert every `*.html` under `input` into `output`, mirroring the
/// directory layout with `.md` extensions.
#[instrument(skip(progress), fields(input = %input.display(), output = %output.display()))]
pub fn convert_dir(input: &Path, output: &Path, progress: &dyn ProgressReporter) -> Result<ExportReport> {
    if !input.is_dir() {
        return Err(CloudMouseError::validation(format!(
            "input directory not found: {}",
            input.display()
        )));
    }

    let mut sources = Vec::new();
    for entry in WalkDir::new(input).sort_by_file_name() {
        let entry = entry.map_err(|e| CloudMouseError::Conversion(format!("walk failed: {e}")))?;
        let path = entry.path();
        if entry.file_type().is_file() && path.extension().is_some_and(|ext| ext == "html") {
            sources.push(path.to_path_buf());
        }
    }

    let mut report = ExportReport::default();
    let total = sources.len();
    progress.phase("Converting files");

    for (i, source) in sources.iter().enumerate() {
        let relative = source.strip_prefix(input).unwrap_or(source);
        let target = output.join(relative).with_extension("md");
        convert_file(source, &target)?;
        progress.item_done(&relative.display().to_string(), i + 1, total);
        report.written.push(target);
    }

    info!(files = report.written.len(), "conversion complete");
    progress.done(&format!("{} files converted", report.written.len()));
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::SilentProgress;
    use cloudmouse_storage::{NewPage, PageContent};
    use uuid::Uuid;

    fn temp_path(tag: &str) -> PathBuf {
        std::env::temp_dir().join(format!("cloudmouse_{tag}_{}", Uuid::now_v7()))
    }

    async fn add_page(db: &Database, category_id: i64, uri: &str, title: &str, abstract_html: &str, body: &str) {
        let mut session = db.begin("en").await.unwrap();
        let page_id = session
            .upsert_page(&NewPage { name: uri, category_id, template: "sdk" })
            .await
            .unwrap()
            .id();
        session
            .upsert_page_content(&PageContent {
                page_id,
                title,
                content: body,
                abstract_text: abstract_html,
                uri,
                meta_title: title,
                meta_key: "",
                route_id: None,
            })
            .await
            .unwrap();
        session.commit().await.unwrap();
    }

    #[tokio::test]
    async fn exports_docs_category_in_order() {
        let db = Database::open_sandbox(&temp_path("export").with_extension("db"))
            .await
            .unwrap();
        let docs = db.seed_root_category("Docs", "docs", "en").await.unwrap();
        add_page(
            &db,
            docs,
            "getting-started",
            "Getting Started",
            "Line one<br>Line two",
            r#"<p>Read the <a href="http://localhost/en/docs/hardware">hardware guide</a> or <a href="https://example.com/x">elsewhere</a>.</p>"#,
        )
        .await;
        add_page(&db, docs, "hardware", "Hardware", "", "<h2>Pins</h2><p>GPIO 4.</p>").await;

        let out = temp_path("export_out");
        let opts = ExportOptions {
            output_dir: out.clone(),
            ..Default::default()
        };
        let report = export_from_db(&db, &opts, &SilentProgress).await.unwrap();
        assert_eq!(
            report.written,
            vec![out.join("00_getting_started.md"), out.join("01_hardware.md")]
        );

        let first = std::fs::read_to_string(out.join("00_getting_started.md")).unwrap();
        assert!(first.starts_with("# Getting Started\n\n### Line one\nLine two\n\n"), "{first}");
        assert!(first.contains("[hardware guide](01_hardware.md)"), "{first}");
        assert!(first.contains("(https://example.com/x)"), "{first}");

        let second = std::fs::read_to_string(out.join("01_hardware.md")).unwrap();
        assert_eq!(second, "# Hardware\n\n## Pins\n\nGPIO 4.");
    }

    #[tokio::test]
    async fn unknown_category_exports_nothing() {
        let db = Database::open_sandbox(&temp_path("export_empty").with_extension("db"))
            .await
            .unwrap();
        let opts = ExportOptions {
            output_dir: temp_path("export_empty_out"),
            category: "Nope".into(),
            ..Default::default()
        };
        let report = export_from_db(&db, &opts, &SilentProgress).await.unwrap();
        assert!(report.written.is_empty());
    }

    #[test]
    fn converts_directory_tree() {
        let input = temp_path("convert_in");
        std::fs::create_dir_all(input.join("guides")).unwrap();
        std::fs::write(input.join("intro.html"), "<h1>Intro</h1>").unwrap();
        std::fs::write(input.join("guides/setup.html"), "<p>Plug in.</p>").unwrap();
        std::fs::write(input.join("notes.txt"), "skip").unwrap();

        let output = temp_path("convert_out");
        let report = convert_dir(&input, &output, &SilentProgress).unwrap();

        assert_eq!(report.written.len(), 2);
        assert_eq!(std::fs::read_to_string(output.join("intro.md")).unwrap(), "# Intro");
        assert_eq!(
            std::fs::read_to_string(output.join("guides/setup.md")).unwrap(),
            "Plug in."
        );
        assert!(!output.join("notes.md").exists());
    }

    #[test]
    fn convert_dir_requires_directory() {
        let result = convert_dir(Path::new("/nonexistent/html"), &temp_path("x"), &SilentProgress);
        assert!(matches!(result, Err(CloudMouseError::Validation { .. })));
    }
}
