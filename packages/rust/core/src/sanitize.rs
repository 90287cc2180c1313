//! Sanitize pipeline: generator output directory → clean directory.

use std::collections::HashSet;
use std::path::Path;

use tracing::{debug, info, instrument, warn};

use cloudmouse_sanitizer::{INDEX_FILE, render_index, sanitize_page};
use cloudmouse_shared::{Catalog, CloudMouseError, HTML_EXT, Result};

use crate::progress::ProgressReporter;

/// What a sanitize run did.
#[derive(Debug, Default, Clone)]
pub struct SanitizeReport {
    /// Output files written, index included.
    pub written: Vec<String>,
    /// Catalog entries whose generator file was absent.
    pub missing: Vec<String>,
    /// Generator files that produced no content.
    pub empty: Vec<String>,
    /// `*.html` inputs the catalog does not know.
    pub unmapped: Vec<String>,
}

/// Sanitize every catalog component found in `input_dir` into `output_dir`,
/// then write the index page.
#[instrument(skip_all, fields(input = %input_dir.display(), output = %output_dir.display()))]
pub fn sanitize_dir(
    input_dir: &Path,
    output_dir: &Path,
    catalog: &Catalog,
    progress: &dyn ProgressReporter,
) -> Result<SanitizeReport> {
    if !input_dir.is_dir() {
        return Err(CloudMouseError::validation(format!(
            "input directory not found: {}",
            input_dir.display()
        )));
    }
    std::fs::create_dir_all(output_dir).map_err(|e| CloudMouseError::io(output_dir, e))?;

    let mut report = SanitizeReport::default();
    let total = catalog.components.len();

    progress.phase("Sanitizing reference pages");
    for (i, component) in catalog.components.iter().enumerate() {
        let source = input_dir.join(&component.source);
        if !source.is_file() {
            warn!(file = %component.source, "generator file not found");
            report.missing.push(component.source.clone());
            progress.item_done(&component.source, i + 1, total);
            continue;
        }

        let html = std::fs::read_to_string(&source).map_err(|e| CloudMouseError::io(&source, e))?;
        match sanitize_page(&html, component) {
            Some(page) => {
                let target = output_dir.join(&page.file_name);
                std::fs::write(&target, &page.html).map_err(|e| CloudMouseError::io(&target, e))?;
                debug!(from = %component.source, to = %page.file_name, "sanitized");
                report.written.push(page.file_name);
            }
            None => {
                warn!(file = %component.source, "no content found");
                report.empty.push(component.source.clone());
            }
        }
        progress.item_done(&component.source, i + 1, total);
    }

    report.unmapped = unmapped_files(input_dir, catalog)?;
    if !report.unmapped.is_empty() {
        warn!(count = report.unmapped.len(), "generator files not in the catalog were ignored");
        for file in &report.unmapped {
            debug!(file = %file, "unmapped generator file");
        }
    }

    progress.phase("Writing index");
    let index_path = output_dir.join(INDEX_FILE);
    std::fs::write(&index_path, render_index(&catalog.index))
        .map_err(|e| CloudMouseError::io(&index_path, e))?;
    report.written.push(INDEX_FILE.to_string());

    info!(
        written = report.written.len(),
        missing = report.missing.len(),
        empty = report.empty.len(),
        unmapped = report.unmapped.len(),
        "sanitize complete"
    );
    progress.done(&format!("{} files written", report.written.len()));
    Ok(report)
}

/// `*.html` files in `dir` that are neither components nor link aliases,
/// sorted by name.
fn unmapped_files(dir: &Path, catalog: &Catalog) -> Result<Vec<String>> {
    let known: HashSet<&str> = catalog
        .components
        .iter()
        .map(|c| c.source.as_str())
        .chain(catalog.link_aliases.iter().map(|a| a.source.as_str()))
        .collect();

    let entries = std::fs::read_dir(dir).map_err(|e| CloudMouseError::io(dir, e))?;
    let mut unmapped = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| CloudMouseError::io(dir, e))?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.ends_with(HTML_EXT) && !known.contains(name.as_str()) {
            unmapped.push(name);
        }
    }
    unmapped.sort();
    Ok(unmapped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::SilentProgress;
    use std::path::PathBuf;
    use uuid::Uuid;

    fn fixture_dir() -> PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR")).join("../../../fixtures/html")
    }

    fn temp_dir(tag: &str) -> PathBuf {
        std::env::temp_dir().join(format!("cloudmouse_{tag}_{}", Uuid::now_v7()))
    }

    fn read_all(dir: &Path) -> Vec<(String, String)> {
        let mut files: Vec<(String, String)> = std::fs::read_dir(dir)
            .unwrap()
            .map(|e| {
                let e = e.unwrap();
                (
                    e.file_name().to_string_lossy().into_owned(),
                    std::fs::read_to_string(e.path()).unwrap(),
                )
            })
            .collect();
        files.sort();
        files
    }

    #[test]
    fn sanitizes_fixture_directory() {
        let out = temp_dir("sanitize");
        let catalog = Catalog::default();
        let report = sanitize_dir(&fixture_dir(), &out, &catalog, &SilentProgress).unwrap();

        assert!(report.written.contains(&"core.html".to_string()));
        assert!(report.written.contains(&INDEX_FILE.to_string()));
        assert!(report.missing.contains(&"classCloudMouse_1_1EventBus.html".to_string()));
        assert!(report.unmapped.contains(&"random_page.html".to_string()));
        assert!(!report.unmapped.contains(&"classCloudMouse_1_1Core.html".to_string()));

        let core = std::fs::read_to_string(out.join("core.html")).unwrap();
        assert!(core.starts_with(r#"<div class="contents">"#));
    }

    #[test]
    fn sanitize_is_deterministic() {
        let catalog = Catalog::default();
        let first = temp_dir("det_a");
        let second = temp_dir("det_b");
        sanitize_dir(&fixture_dir(), &first, &catalog, &SilentProgress).unwrap();
        sanitize_dir(&fixture_dir(), &second, &catalog, &SilentProgress).unwrap();
        assert_eq!(read_all(&first), read_all(&second));
    }

    #[test]
    fn missing_input_dir_is_error() {
        let result = sanitize_dir(
            Path::new("/nonexistent/doxygen/html"),
            &temp_dir("missing"),
            &Catalog::default(),
            &SilentProgress,
        );
        assert!(matches!(result, Err(CloudMouseError::Validation { .. })));
    }
}
