//! CMS loader: a sanitized directory becomes categories, pages, routes and
//! rewritten cross-links, all inside one transaction.

mod index;
mod links;
mod paths;

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tracing::{debug, info, instrument, warn};

use cloudmouse_sanitizer::INDEX_FILE;
use cloudmouse_shared::{Catalog, CategorySpec, CloudMouseError, HTML_EXT, Result};
use cloudmouse_storage::{
    CategoryContent, CmsSession, Database, NewCategory, NewPage, PageContent, RouteKind, Upsert,
};

use crate::progress::ProgressReporter;

pub use index::{ComponentInfo, FALLBACK_TITLE, extract_title, parse_component_info};
pub use links::{RewrittenBody, map_target, rewrite_links};
pub use paths::{CategoryPaths, SlugMap, slug};

/// Options for one import run.
#[derive(Debug, Clone)]
pub struct ImportOptions {
    /// Output of the sanitize stage.
    pub clean_dir: PathBuf,
    /// Run everything, then roll back instead of committing.
    pub dry_run: bool,
}

/// Link pass statistics.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct LinkReport {
    pub pages_scanned: usize,
    pub pages_updated: usize,
    pub links_rewritten: usize,
    pub misses: usize,
}

/// What an import run did (or would have done, for a dry run).
#[derive(Debug, Default, Clone)]
pub struct ImportReport {
    pub categories_created: usize,
    pub categories_updated: usize,
    pub pages_created: usize,
    pub pages_updated: usize,
    /// Page files with no category in the catalog.
    pub skipped: Vec<String>,
    /// Entities that failed to write. The run carries on past them.
    pub failures: Vec<String>,
    pub links: LinkReport,
    pub dry_run: bool,
    /// Slug paths of every category written, root included.
    pub category_paths: CategoryPaths,
    /// File name → slug for every page written.
    pub slugs: SlugMap,
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

/// Import every page in `opts.clean_dir` under the catalog's root category.
///
/// Categories are written first (in catalog order), then pages (sorted by
/// file name), then a link pass rewrites cross-references in every page
/// under the root. A failure on one entity is logged and recorded; only
/// setup errors (missing directory, missing root, transaction errors) abort.
#[instrument(skip_all, fields(dir = %opts.clean_dir.display(), dry_run = opts.dry_run))]
pub async fn import_clean_dir(
    db: &Database,
    catalog: &Catalog,
    opts: &ImportOptions,
    progress: &dyn ProgressReporter,
) -> Result<ImportReport> {
    if !opts.clean_dir.is_dir() {
        return Err(CloudMouseError::validation(format!(
            "clean directory not found: {}",
            opts.clean_dir.display()
        )));
    }

    let info = load_component_info(&opts.clean_dir)?;
    let pages = page_files(&opts.clean_dir)?;

    let mut session = db.begin(&catalog.cms.language).await?;
    let root_name = &catalog.cms.root_category;
    let Some(root_id) = session.find_category(root_name).await? else {
        session.rollback().await?;
        return Err(CloudMouseError::validation(format!(
            "root category '{root_name}' not found"
        )));
    };

    let mut root_path = session.category_path_from_db(root_id).await?;
    if root_path.is_empty() {
        root_path.push(root_name.to_lowercase());
    }
    debug!(root_id, path = %root_path.join("/"), "root category");

    let mut loader = Loader {
        session,
        catalog,
        iso: catalog.cms.language.clone(),
        keyword: root_name.to_lowercase(),
        report: ImportReport {
            dry_run: opts.dry_run,
            ..Default::default()
        },
    };
    loader.report.category_paths.insert(root_id, root_path);

    progress.phase("Creating categories");
    let category_ids = loader.write_categories(root_id, progress).await;

    progress.phase("Importing pages");
    loader.write_pages(&pages, &info, &category_ids, progress).await;

    progress.phase("Rewriting links");
    match loader.link_pass(root_id).await {
        Ok(links) => loader.report.links = links,
        Err(e) => {
            warn!(error = %e, "link pass failed");
            loader.report.failures.push(format!("link pass: {e}"));
        }
    }

    let Loader {
        session, report, ..
    } = loader;
    if opts.dry_run {
        session.rollback().await?;
        info!("dry run, changes rolled back");
    } else {
        session.commit().await?;
    }

    info!(
        categories_created = report.categories_created,
        categories_updated = report.categories_updated,
        pages_created = report.pages_created,
        pages_updated = report.pages_updated,
        skipped = report.skipped.len(),
        failures = report.failures.len(),
        links_rewritten = report.links.links_rewritten,
        "import complete"
    );
    progress.done(&format!(
        "{} pages, {} links rewritten",
        report.pages_created + report.pages_updated,
        report.links.links_rewritten
    ));
    Ok(report)
}

/// Titles and abstracts from the clean directory's index page. A missing
/// index is not an error; titles then come from page headings.
fn load_component_info(dir: &Path) -> Result<HashMap<String, ComponentInfo>> {
    let path = dir.join(INDEX_FILE);
    if !path.is_file() {
        warn!(path = %path.display(), "index page not found, titles come from page headings");
        return Ok(HashMap::new());
    }
    let html = std::fs::read_to_string(&path).map_err(|e| CloudMouseError::io(&path, e))?;
    Ok(parse_component_info(&html))
}

/// `*.html` files in `dir` other than the index, sorted by name.
fn page_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = std::fs::read_dir(dir).map_err(|e| CloudMouseError::io(dir, e))?;
    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| CloudMouseError::io(dir, e))?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.ends_with(HTML_EXT) && name != INDEX_FILE && entry.path().is_file() {
            files.push(entry.path());
        }
    }
    files.sort();
    Ok(files)
}

// ---------------------------------------------------------------------------
// Loader state
// ---------------------------------------------------------------------------

struct Loader<'a> {
    session: CmsSession,
    catalog: &'a Catalog,
    iso: String,
    /// First word of every meta keyword list.
    keyword: String,
    report: ImportReport,
}

impl Loader<'_> {
    /// Write every catalog subcategory under the root. Returns name → id for
    /// the ones that made it.
    async fn write_categories(
        &mut self,
        root_id: i64,
        progress: &dyn ProgressReporter,
    ) -> HashMap<String, i64> {
        let catalog = self.catalog;
        let total = catalog.categories.len();
        let mut ids = HashMap::new();

        for (i, category) in catalog.categories.iter().enumerate() {
            match self.write_category(root_id, category).await {
                Ok(id) => {
                    ids.insert(category.name.clone(), id);
                }
                Err(e) => {
                    warn!(category = %category.name, error = %e, "category failed");
                    self.report.failures.push(format!("category {}: {e}", category.name));
                }
            }
            progress.item_done(&category.name, i + 1, total);
        }
        ids
    }

    async fn write_category(&mut self, parent_id: i64, category: &CategorySpec) -> Result<i64> {
        let cms = &self.catalog.cms;
        let upsert = self
            .session
            .upsert_category(&NewCategory {
                name: &category.name,
                parent_id,
                module: &cms.module,
                template: &cms.template,
            })
            .await?;
        let id = upsert.id();

        let path = match self.report.category_paths.insert_child(id, parent_id, &category.uri) {
            Some(path) => path,
            None => {
                let mut path = self.session.category_path_from_db(parent_id).await?;
                path.push(category.uri.clone());
                self.report.category_paths.insert(id, path.clone());
                path
            }
        };

        let route = self
            .session
            .ensure_route(&slug(&self.iso, &path, None), RouteKind::Category, id)
            .await?;

        let meta_title = format!("{} - {}", category.name, self.catalog.product_name);
        let meta_key = format!("{}, {}", self.keyword, category.name.to_lowercase());
        self.session
            .upsert_category_content(&CategoryContent {
                category_id: id,
                name: &category.name,
                description: &category.description,
                uri: &category.uri,
                meta_title: &meta_title,
                meta_descr: &category.description,
                meta_key: &meta_key,
                route_id: Some(route.id()),
            })
            .await?;

        tally(upsert, &mut self.report.categories_created, &mut self.report.categories_updated);
        debug!(category = %category.name, id, created = upsert.created(), "category written");
        Ok(id)
    }

    async fn write_pages(
        &mut self,
        pages: &[PathBuf],
        info: &HashMap<String, ComponentInfo>,
        category_ids: &HashMap<String, i64>,
        progress: &dyn ProgressReporter,
    ) {
        let catalog = self.catalog;
        let total = pages.len();

        for (i, path) in pages.iter().enumerate() {
            let uri = path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();

            let Some(category) = catalog.category_for_component(&uri) else {
                warn!(page = %uri, "no category for page, skipped");
                self.report.skipped.push(uri.clone());
                progress.item_done(&uri, i + 1, total);
                continue;
            };
            let Some(&category_id) = category_ids.get(&category.name) else {
                self.report
                    .failures
                    .push(format!("page {uri}: category '{}' was not written", category.name));
                progress.item_done(&uri, i + 1, total);
                continue;
            };

            if let Err(e) = self.write_page(&uri, category_id, path, info.get(&uri)).await {
                warn!(page = %uri, error = %e, "page failed");
                self.report.failures.push(format!("page {uri}: {e}"));
            }
            progress.item_done(&uri, i + 1, total);
        }
    }

    async fn write_page(
        &mut self,
        uri: &str,
        category_id: i64,
        file: &Path,
        info: Option<&ComponentInfo>,
    ) -> Result<()> {
        let html = std::fs::read_to_string(file).map_err(|e| CloudMouseError::io(file, e))?;
        let (title, abstract_text) = match info {
            Some(info) => (info.title.clone(), info.abstract_text.clone()),
            None => (extract_title(&html), String::new()),
        };

        let upsert = self
            .session
            .upsert_page(&NewPage {
                name: uri,
                category_id,
                template: &self.catalog.cms.template,
            })
            .await?;
        let page_id = upsert.id();

        let path = self.category_path(category_id).await?;
        let route = self
            .session
            .ensure_route(&slug(&self.iso, &path, Some(uri)), RouteKind::Page, page_id)
            .await?;
        // Only routed pages are link targets.
        self.report.slugs.record(uri, &path);

        let meta_title = format!("{title} - {}", self.catalog.product_name);
        let meta_key = format!("{}, {uri}", self.keyword);
        self.session
            .upsert_page_content(&PageContent {
                page_id,
                title: &title,
                content: &html,
                abstract_text: &abstract_text,
                uri,
                meta_title: &meta_title,
                meta_key: &meta_key,
                route_id: Some(route.id()),
            })
            .await?;

        tally(upsert, &mut self.report.pages_created, &mut self.report.pages_updated);
        debug!(page = %uri, id = page_id, created = upsert.created(), "page written");
        Ok(())
    }

    /// Cached path for `category_id`, falling back to the stored chain.
    async fn category_path(&mut self, category_id: i64) -> Result<Vec<String>> {
        if let Some(path) = self.report.category_paths.get(category_id) {
            return Ok(path.to_vec());
        }
        let path = self.session.category_path_from_db(category_id).await?;
        self.report.category_paths.insert(category_id, path.clone());
        Ok(path)
    }

    /// Rewrite cross-links in every page under `root_id`. Bodies without a
    /// mappable link are left untouched.
    async fn link_pass(&mut self, root_id: i64) -> Result<LinkReport> {
        let candidates = self.session.list_link_candidates(root_id).await?;
        let mut links = LinkReport {
            pages_scanned: candidates.len(),
            ..Default::default()
        };

        for candidate in candidates {
            let body = rewrite_links(&candidate.content, self.catalog, &self.report.slugs);
            links.misses += body.misses.len();
            for miss in &body.misses {
                debug!(page = %candidate.uri, href = %miss, "unmapped link");
            }
            if body.rewritten == 0 || body.html == candidate.content {
                continue;
            }

            match self.session.update_page_body(candidate.content_id, &body.html).await {
                Ok(()) => {
                    links.pages_updated += 1;
                    links.links_rewritten += body.rewritten;
                }
                Err(e) => {
                    warn!(page = %candidate.uri, error = %e, "link update failed");
                    self.report
                        .failures
                        .push(format!("links {}: {e}", candidate.uri));
                }
            }
        }

        info!(
            scanned = links.pages_scanned,
            updated = links.pages_updated,
            rewritten = links.links_rewritten,
            misses = links.misses,
            "link pass complete"
        );
        Ok(links)
    }
}

fn tally(upsert: Upsert, created: &mut usize, updated: &mut usize) {
    if upsert.created() {
        *created += 1;
    } else {
        *updated += 1;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
