//! Database access for the CMS loader, the exporter and device registration.
//!
//! Everything goes through `sqlx`'s `Any` driver: production points at the
//! CMS's MySQL server, while the sandbox (and every test) uses a local SQLite
//! file created with [`Database::open_sandbox`].
//!
//! **Write paths:**
//! - CMS import: inside one transaction via [`Database::begin`] / [`CmsSession`]
//! - Device registration: single autocommit insert via [`Database::register_device`]

mod cms;
mod devices;
mod schema;

use std::path::Path;

use cloudmouse_shared::{CloudMouseError, Result};
use sqlx::AnyPool;
use sqlx::any::{AnyPoolOptions, AnyQueryResult};
use sqlx::Row;
use tracing::{debug, info};

pub use cms::{CategoryContent, CmsSession, LinkCandidate, NewCategory, NewPage, PageContent, RouteKind};
pub use devices::{DeviceCounts, NewDevice, Registration};

/// Outcome of an idempotent insert-or-reuse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upsert {
    /// A new row was inserted.
    Created(i64),
    /// An existing row was found (and updated where applicable).
    Existing(i64),
}

impl Upsert {
    pub fn id(self) -> i64 {
        match self {
            Self::Created(id) | Self::Existing(id) => id,
        }
    }

    pub fn created(self) -> bool {
        matches!(self, Self::Created(_))
    }
}

/// One stored page selected for Markdown export.
#[derive(Debug, Clone)]
pub struct ExportPage {
    pub ord: i64,
    pub uri: String,
    pub title: String,
    pub abstract_html: String,
    pub content: String,
}

pub(crate) fn storage_err(e: sqlx::Error) -> CloudMouseError {
    CloudMouseError::Storage(e.to_string())
}

/// Row id of the last insert, required by every insert path.
pub(crate) fn inserted_id(result: &AnyQueryResult, table: &str) -> Result<i64> {
    result
        .last_insert_id()
        .ok_or_else(|| CloudMouseError::Storage(format!("no row id returned for insert into {table}")))
}

/// Pooled database handle.
pub struct Database {
    pool: AnyPool,
}

impl Database {
    /// Connect to `url` (`mysql://…` or `sqlite://…`).
    pub async fn connect(url: &str) -> Result<Self> {
        sqlx::any::install_default_drivers();

        let pool = AnyPoolOptions::new()
            .max_connections(4)
            .connect(url)
            .await
            .map_err(|e| CloudMouseError::Storage(format!("connection failed: {e}")))?;

        debug!(backend = backend_name(url), "database connected");
        Ok(Self { pool })
    }

    /// Open or create a SQLite sandbox at `path` and bring its schema up to date.
    pub async fn open_sandbox(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| CloudMouseError::io(parent, e))?;
            }
        }
        let db = Self::connect(&sqlite_url(path)).await?;
        db.apply_sandbox_schema().await?;
        Ok(db)
    }

    /// Whether `url` points at a SQLite sandbox rather than the CMS server.
    pub fn is_sandbox_url(url: &str) -> bool {
        url.starts_with("sqlite:")
    }

    /// Apply pending sandbox migrations. SQLite only.
    pub async fn apply_sandbox_schema(&self) -> Result<()> {
        let current = self.schema_version().await;

        for migration in schema::all_migrations() {
            if migration.version <= current {
                continue;
            }
            info!(
                version = migration.version,
                description = migration.description,
                "applying sandbox migration"
            );
            let mut tx = self.pool.begin().await.map_err(storage_err)?;
            for statement in schema::statements(migration.sql) {
                sqlx::query(statement)
                    .execute(&mut *tx)
                    .await
                    .map_err(|e| {
                        CloudMouseError::Storage(format!(
                            "migration v{} failed: {e}",
                            migration.version
                        ))
                    })?;
            }
            tx.commit().await.map_err(storage_err)?;
        }
        Ok(())
    }

    /// Current sandbox schema version, or 0 when nothing has been applied.
    async fn schema_version(&self) -> i64 {
        let result = sqlx::query_scalar::<_, Option<i64>>("SELECT MAX(version) FROM schema_migrations")
            .fetch_one(&self.pool)
            .await;

        match result {
            Ok(version) => version.unwrap_or(0),
            Err(_) => 0, // Table doesn't exist yet
        }
    }

    /// Make sure a top-level category `name` exists with a content row for
    /// `iso`. Sandbox setup only; on the CMS the root category pre-exists.
    pub async fn seed_root_category(&self, name: &str, uri: &str, iso: &str) -> Result<i64> {
        let existing = sqlx::query_scalar::<_, i64>(
            "SELECT id FROM categories WHERE name = ? AND parent_id IS NULL ORDER BY id LIMIT 1",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_err)?;

        let id = match existing {
            Some(id) => id,
            None => {
                let result = sqlx::query(
                    "INSERT INTO categories (name, module, template, published, parent_id, ord)
                     VALUES (?, 'pages', 'sdk', 1, NULL, 0)",
                )
                .bind(name)
                .execute(&self.pool)
                .await
                .map_err(storage_err)?;
                inserted_id(&result, "categories")?
            }
        };

        sqlx::query(
            "INSERT INTO category_contents (iso, category_id, name, uri, active)
             SELECT ?, ?, ?, ?, 1
             WHERE NOT EXISTS (SELECT 1 FROM category_contents WHERE category_id = ? AND iso = ?)",
        )
        .bind(iso)
        .bind(id)
        .bind(name)
        .bind(uri)
        .bind(id)
        .bind(iso)
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        debug!(name, id, "sandbox root category ready");
        Ok(id)
    }

    /// Start the import transaction for language `iso`.
    pub async fn begin(&self, iso: &str) -> Result<CmsSession> {
        let tx = self.pool.begin().await.map_err(storage_err)?;
        Ok(CmsSession::new(tx, iso))
    }

    /// Page contents under the category named `category`, ordered by page
    /// order.
    pub async fn list_export_pages(&self, category: &str) -> Result<Vec<ExportPage>> {
        let rows = sqlx::query(
            "SELECT p.ord, pc.uri, pc.title, pc.abstract, pc.content
             FROM page_contents pc
             JOIN pages p ON p.id = pc.page_id
             WHERE p.category_id IN (SELECT id FROM categories WHERE name = ?)
             ORDER BY p.ord ASC, pc.id ASC",
        )
        .bind(category)
        .fetch_all(&self.pool)
        .await
        .map_err(storage_err)?;

        let mut pages = Vec::with_capacity(rows.len());
        for row in rows {
            pages.push(ExportPage {
                ord: row
                    .try_get::<Option<i64>, _>(0)
                    .map_err(storage_err)?
                    .unwrap_or(0),
                uri: row.try_get(1).map_err(storage_err)?,
                title: row.try_get(2).map_err(storage_err)?,
                abstract_html: row
                    .try_get::<Option<String>, _>(3)
                    .map_err(storage_err)?
                    .unwrap_or_default(),
                content: row
                    .try_get::<Option<String>, _>(4)
                    .map_err(storage_err)?
                    .unwrap_or_default(),
            });
        }
        debug!(category, count = pages.len(), "export pages loaded");
        Ok(pages)
    }

    /// Underlying pool, for ad-hoc queries.
    pub fn pool(&self) -> &AnyPool {
        &self.pool
    }

    /// Close every pooled connection.
    pub async fn close(self) {
        self.pool.close().await;
    }
}

/// `sqlite://` URL for a file path, creating the file on first connect.
pub fn sqlite_url(path: &Path) -> String {
    let normalized = path.to_string_lossy().replace('\\', "/");
    let needs_leading_slash = !normalized.starts_with('/') && normalized.contains(':');
    let prefix = if needs_leading_slash { "/" } else { "" };
    format!("sqlite://{prefix}{normalized}?mode=rwc")
}

fn backend_name(url: &str) -> &str {
    url.split_once(':').map(|(scheme, _)| scheme).unwrap_or("unknown")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------


#[cfg(test)]
mod tests {
    use super::test_support::{count, sandbox};
    use super::*;

    #[test]
    fn sqlite_url_shapes() {
        assert_eq!(
            sqlite_url(Path::new("/tmp/cms.db")),
            "sqlite:///tmp/cms.db?mode=rwc"
        );
        assert_eq!(
            sqlite_url(Path::new("C:\\data\\cms.db")),
            "sqlite:///C:/data/cms.db?mode=rwc"
        );
        assert!(Database::is_sandbox_url("sqlite:///tmp/cms.db?mode=rwc"));
        assert!(!Database::is_sandbox_url("mysql://root@localhost/cms"));
    }

    #[tokio::test]
    async fn sandbox_schema_is_reentrant() {
        let db = sandbox().await;
        db.apply_sandbox_schema().await.expect("second apply");
        assert_eq!(db.schema_version().await, 2);
        assert_eq!(count(&db, "schema_migrations").await, 2);
    }

    #[tokio::test]
    async fn seed_root_is_idempotent() {
        let db = sandbox().await;
        let first = db.seed_root_category("SDK", "sdk", "en").await.unwrap();
        let second = db.seed_root_category("SDK", "sdk", "en").await.unwrap();
        assert_eq!(first, second);
        assert_eq!(count(&db, "categories").await, 1);
        assert_eq!(count(&db, "category_contents").await, 1);
    }

    #[tokio::test]
    async fn export_pages_follow_page_order() {
        let db = sandbox().await;
        let root = db.seed_root_category("Docs", "docs", "en").await.unwrap();

        let mut session = db.begin("en").await.unwrap();
        for (name, title) in [("second", "Second"), ("first", "First")] {
            let page = session
                .upsert_page(&NewPage {
                    name,
                    category_id: root,
                    template: "sdk",
                })
                .await
                .unwrap();
            session
                .upsert_page_content(&PageContent {
                    page_id: page.id(),
                    title,
                    content: "<p>body</p>",
                    abstract_text: "",
                    uri: name,
                    meta_title: title,
                    meta_key: name,
                    route_id: None,
                })
                .await
                .unwrap();
        }
        session.commit().await.unwrap();

        let pages = db.list_export_pages("Docs").await.unwrap();
        assert_eq!(pages.len(), 2);
        assert_eq!((pages[0].ord, pages[0].uri.as_str()), (0, "second"));
        assert_eq!((pages[1].ord, pages[1].uri.as_str()), (1, "first"));
        assert!(db.list_export_pages("Nope").await.unwrap().is_empty());
    }
}
