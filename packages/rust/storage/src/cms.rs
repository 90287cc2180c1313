//! Idempotent CMS writes, all inside one transaction.
//!
//! Each entity kind has exactly one upsert operation keyed on its natural
//! identity. Dropping a [`CmsSession`] without [`CmsSession::commit`] rolls the
//! whole import back.

use cloudmouse_shared::Result;
use sqlx::{Any, Transaction};
use tracing::debug;

use crate::{Upsert, inserted_id, storage_err};

/// Upper bound on category ancestry walks, guarding against `parent_id` cycles.
const MAX_CATEGORY_DEPTH: usize = 16;

/// What a route points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteKind {
    Category,
    Page,
}

impl RouteKind {
    fn module(self) -> &'static str {
        match self {
            Self::Category => "categories",
            Self::Page => "pages",
        }
    }

    /// Route value stored for an entity, e.g. `front/pages/show/12`.
    pub fn route_for(self, id: i64) -> String {
        format!("front/{}/show/{id}", self.module())
    }
}

/// Category identity plus the values used on first insert.
#[derive(Debug, Clone)]
pub struct NewCategory<'a> {
    pub name: &'a str,
    pub parent_id: i64,
    pub module: &'a str,
    pub template: &'a str,
}

/// Per-language category content.
#[derive(Debug, Clone)]
pub struct CategoryContent<'a> {
    pub category_id: i64,
    pub name: &'a str,
    pub description: &'a str,
    pub uri: &'a str,
    pub meta_title: &'a str,
    pub meta_descr: &'a str,
    pub meta_key: &'a str,
    pub route_id: Option<i64>,
}

/// Page identity plus the values used on first insert.
#[derive(Debug, Clone)]
pub struct NewPage<'a> {
    pub name: &'a str,
    pub category_id: i64,
    pub template: &'a str,
}

/// Per-language page content.
#[derive(Debug, Clone)]
pub struct PageContent<'a> {
    pub page_id: i64,
    pub title: &'a str,
    pub content: &'a str,
    pub abstract_text: &'a str,
    pub uri: &'a str,
    pub meta_title: &'a str,
    pub meta_key: &'a str,
    pub route_id: Option<i64>,
}

/// A stored page body considered by the link pass.
#[derive(Debug, Clone)]
pub struct LinkCandidate {
    pub content_id: i64,
    pub uri: String,
    pub content: String,
}

/// An open import transaction for one language.
pub struct CmsSession {
    tx: Transaction<'static, Any>,
    iso: String,
}

impl CmsSession {
    pub(crate) fn new(tx: Transaction<'static, Any>, iso: &str) -> Self {
        Self {
            tx,
            iso: iso.to_string(),
        }
    }

    /// Language code all content rows are written for.
    pub fn iso(&self) -> &str {
        &self.iso
    }

    // -----------------------------------------------------------------------
    // Categories
    // -----------------------------------------------------------------------

    /// Id of the category named `name`, if present.
    pub async fn find_category(&mut self, name: &str) -> Result<Option<i64>> {
        sqlx::query_scalar::<_, i64>("SELECT id FROM categories WHERE name = ? ORDER BY id LIMIT 1")
            .bind(name)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(storage_err)
    }

    /// Find the category by (name, parent) or insert it at the end of its
    /// siblings.
    pub async fn upsert_category(&mut self, category: &NewCategory<'_>) -> Result<Upsert> {
        let existing = sqlx::query_scalar::<_, i64>(
            "SELECT id FROM categories WHERE name = ? AND parent_id = ? ORDER BY id LIMIT 1",
        )
        .bind(category.name)
        .bind(category.parent_id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(storage_err)?;

        if let Some(id) = existing {
            return Ok(Upsert::Existing(id));
        }

        let ord = sqlx::query_scalar::<_, i64>(
            "SELECT COALESCE(MAX(ord), -1) + 1 FROM categories WHERE parent_id = ?",
        )
        .bind(category.parent_id)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(storage_err)?;

        let result = sqlx::query(
            "INSERT INTO categories (name, module, template, published, parent_id, ord)
             VALUES (?, ?, ?, 1, ?, ?)",
        )
        .bind(category.name)
        .bind(category.module)
        .bind(category.template)
        .bind(category.parent_id)
        .bind(ord)
        .execute(&mut *self.tx)
        .await
        .map_err(storage_err)?;

        let id = inserted_id(&result, "categories")?;
        debug!(name = category.name, id, ord, "category created");
        Ok(Upsert::Created(id))
    }

    /// Insert or update the category content row for this session's language.
    pub async fn upsert_category_content(&mut self, content: &CategoryContent<'_>) -> Result<Upsert> {
        let existing = sqlx::query_scalar::<_, i64>(
            "SELECT id FROM category_contents WHERE category_id = ? AND iso = ?",
        )
        .bind(content.category_id)
        .bind(&self.iso)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(storage_err)?;

        if let Some(id) = existing {
            sqlx::query(
                "UPDATE category_contents
                 SET name = ?, description = ?, uri = ?, meta_title = ?, meta_descr = ?,
                     meta_key = ?, route_id = ?, active = 1
                 WHERE id = ?",
            )
            .bind(content.name)
            .bind(content.description)
            .bind(content.uri)
            .bind(content.meta_title)
            .bind(content.meta_descr)
            .bind(content.meta_key)
            .bind(content.route_id)
            .bind(id)
            .execute(&mut *self.tx)
            .await
            .map_err(storage_err)?;
            return Ok(Upsert::Existing(id));
        }

        let result = sqlx::query(
            "INSERT INTO category_contents
                 (iso, category_id, name, description, uri, meta_title, meta_descr, meta_key, route_id, active)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, 1)",
        )
        .bind(&self.iso)
        .bind(content.category_id)
        .bind(content.name)
        .bind(content.description)
        .bind(content.uri)
        .bind(content.meta_title)
        .bind(content.meta_descr)
        .bind(content.meta_key)
        .bind(content.route_id)
        .execute(&mut *self.tx)
        .await
        .map_err(storage_err)?;

        Ok(Upsert::Created(inserted_id(&result, "category_contents")?))
    }

    /// Ordered `uri` segments from the top-level category down to
    /// `category_id`, read from stored content rows.
    ///
    /// Stops at the first ancestor without a content row, and after
    /// `MAX_CATEGORY_DEPTH` steps.
    pub async fn category_path_from_db(&mut self, category_id: i64) -> Result<Vec<String>> {
        let mut path = Vec::new();
        let mut current = Some(category_id);
        let mut depth = 0;

        while let Some(id) = current {
            if depth == MAX_CATEGORY_DEPTH {
                tracing::warn!(category_id, "category ancestry deeper than {MAX_CATEGORY_DEPTH}; truncating");
                break;
            }
            depth += 1;

            let row = sqlx::query_as::<_, (Option<String>, Option<i64>)>(
                "SELECT cc.uri, c.parent_id
                 FROM categories c
                 JOIN category_contents cc ON cc.category_id = c.id
                 WHERE c.id = ? AND cc.iso = ?",
            )
            .bind(id)
            .bind(&self.iso)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(storage_err)?;

            let Some((uri, parent_id)) = row else {
                break;
            };
            if let Some(uri) = uri.filter(|u| !u.is_empty()) {
                path.push(uri);
            }
            current = parent_id;
        }

        path.reverse();
        Ok(path)
    }

    // -----------------------------------------------------------------------
    // Routes
    // -----------------------------------------------------------------------

    /// Reuse the route for `slug`, or create one pointing at the entity.
    pub async fn ensure_route(&mut self, slug: &str, kind: RouteKind, entity_id: i64) -> Result<Upsert> {
        let existing = sqlx::query_scalar::<_, i64>("SELECT id FROM routes WHERE slug = ?")
            .bind(slug)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(storage_err)?;

        if let Some(id) = existing {
            debug!(slug, id, "route exists");
            return Ok(Upsert::Existing(id));
        }

        let route = kind.route_for(entity_id);
        let result = sqlx::query("INSERT INTO routes (slug, route) VALUES (?, ?)")
            .bind(slug)
            .bind(&route)
            .execute(&mut *self.tx)
            .await
            .map_err(storage_err)?;

        let id = inserted_id(&result, "routes")?;
        debug!(slug, route = %route, id, "route created");
        Ok(Upsert::Created(id))
    }

    // -----------------------------------------------------------------------
    // Pages
    // -----------------------------------------------------------------------

    /// Find the page by (name, category) or append it to the category.
    pub async fn upsert_page(&mut self, page: &NewPage<'_>) -> Result<Upsert> {
        let existing = sqlx::query_scalar::<_, i64>(
            "SELECT id FROM pages WHERE name = ? AND category_id = ? ORDER BY id LIMIT 1",
        )
        .bind(page.name)
        .bind(page.category_id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(storage_err)?;

        if let Some(id) = existing {
            return Ok(Upsert::Existing(id));
        }

        let ord = sqlx::query_scalar::<_, i64>(
            "SELECT COALESCE(MAX(ord), -1) + 1 FROM pages WHERE category_id = ?",
        )
        .bind(page.category_id)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(storage_err)?;

        let result = sqlx::query(
            "INSERT INTO pages (name, category_id, published, template, ord) VALUES (?, ?, 1, ?, ?)",
        )
        .bind(page.name)
        .bind(page.category_id)
        .bind(page.template)
        .bind(ord)
        .execute(&mut *self.tx)
        .await
        .map_err(storage_err)?;

        let id = inserted_id(&result, "pages")?;
        debug!(name = page.name, id, ord, "page created");
        Ok(Upsert::Created(id))
    }

    /// Insert or update the page content row for this session's language.
    pub async fn upsert_page_content(&mut self, content: &PageContent<'_>) -> Result<Upsert> {
        let existing = sqlx::query_scalar::<_, i64>(
            "SELECT id FROM page_contents WHERE page_id = ? AND iso = ?",
        )
        .bind(content.page_id)
        .bind(&self.iso)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(storage_err)?;

        if let Some(id) = existing {
            sqlx::query(
                "UPDATE page_contents
                 SET title = ?, content = ?, abstract = ?, uri = ?, meta_title = ?, meta_key = ?,
                     route_id = ?, active = 1
                 WHERE id = ?",
            )
            .bind(content.title)
            .bind(content.content)
            .bind(content.abstract_text)
            .bind(content.uri)
            .bind(content.meta_title)
            .bind(content.meta_key)
            .bind(content.route_id)
            .bind(id)
            .execute(&mut *self.tx)
            .await
            .map_err(storage_err)?;
            return Ok(Upsert::Existing(id));
        }

        let result = sqlx::query(
            "INSERT INTO page_contents
                 (iso, page_id, route_id, title, content, abstract, uri, meta_title, meta_key, active)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, 1)",
        )
        .bind(&self.iso)
        .bind(content.page_id)
        .bind(content.route_id)
        .bind(content.title)
        .bind(content.content)
        .bind(content.abstract_text)
        .bind(content.uri)
        .bind(content.meta_title)
        .bind(content.meta_key)
        .execute(&mut *self.tx)
        .await
        .map_err(storage_err)?;

        Ok(Upsert::Created(inserted_id(&result, "page_contents")?))
    }

    // -----------------------------------------------------------------------
    // Link pass
    // -----------------------------------------------------------------------

    /// Page bodies in this language whose category sits directly under
    /// `parent_category_id`.
    pub async fn list_link_candidates(&mut self, parent_category_id: i64) -> Result<Vec<LinkCandidate>> {
        let rows = sqlx::query_as::<_, (i64, String, Option<String>)>(
            "SELECT pc.id, pc.uri, pc.content
             FROM page_contents pc
             JOIN pages p ON pc.page_id = p.id
             JOIN categories c ON p.category_id = c.id
             WHERE c.parent_id = ? AND pc.iso = ?
             ORDER BY pc.id",
        )
        .bind(parent_category_id)
        .bind(&self.iso)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(storage_err)?;

        Ok(rows
            .into_iter()
            .map(|(content_id, uri, content)| LinkCandidate {
                content_id,
                uri,
                content: content.unwrap_or_default(),
            })
            .collect())
    }

    /// Replace a stored page body.
    pub async fn update_page_body(&mut self, content_id: i64, html: &str) -> Result<()> {
        sqlx::query("UPDATE page_contents SET content = ? WHERE id = ?")
            .bind(html)
            .bind(content_id)
            .execute(&mut *self.tx)
            .await
            .map_err(storage_err)?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Transaction control
    // -----------------------------------------------------------------------

    pub async fn commit(self) -> Result<()> {
        self.tx.commit().await.map_err(storage_err)
    }

    pub async fn rollback(self) -> Result<()> {
        self.tx.rollback().await.map_err(storage_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{count, sandbox};

    fn sub<'a>(name: &'a str, parent_id: i64) -> NewCategory<'a> {
        NewCategory {
            name,
            parent_id,
            module: "pages",
            template: "sdk",
        }
    }

    #[test]
    fn route_values() {
        assert_eq!(RouteKind::Category.route_for(3), "front/categories/show/3");
        assert_eq!(RouteKind::Page.route_for(12), "front/pages/show/12");
    }

    #[tokio::test]
    async fn categories_get_sequential_ord() {
        let db = sandbox().await;
        let root = db.seed_root_category("SDK", "sdk", "en").await.unwrap();

        let mut session = db.begin("en").await.unwrap();
        let a = session.upsert_category(&sub("Core", root)).await.unwrap();
        let b = session.upsert_category(&sub("Network", root)).await.unwrap();
        let again = session.upsert_category(&sub("Core", root)).await.unwrap();
        session.commit().await.unwrap();

        assert!(a.created() && b.created());
        assert_eq!(again, Upsert::Existing(a.id()));

        let ords = sqlx::query_scalar::<_, i64>("SELECT ord FROM categories WHERE parent_id = ? ORDER BY id")
            .bind(root)
            .fetch_all(db.pool())
            .await
            .unwrap();
        assert_eq!(ords, vec![0, 1]);
    }

    #[tokio::test]
    async fn routes_are_reused_by_slug() {
        let db = sandbox().await;
        let mut session = db.begin("en").await.unwrap();
        let first = session.ensure_route("en/sdk/core", RouteKind::Category, 7).await.unwrap();
        let second = session.ensure_route("en/sdk/core", RouteKind::Category, 99).await.unwrap();
        session.commit().await.unwrap();

        assert!(first.created());
        assert_eq!(second, Upsert::Existing(first.id()));
        let route: String = sqlx::query_scalar("SELECT route FROM routes WHERE slug = 'en/sdk/core'")
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(route, "front/categories/show/7");
    }

    #[tokio::test]
    async fn content_upsert_updates_in_place() {
        let db = sandbox().await;
        let root = db.seed_root_category("SDK", "sdk", "en").await.unwrap();
        let mut session = db.begin("en").await.unwrap();
        let page = session
            .upsert_page(&NewPage { name: "core", category_id: root, template: "sdk" })
            .await
            .unwrap();

        let mut content = PageContent {
            page_id: page.id(),
            title: "Core",
            content: "<p>v1</p>",
            abstract_text: "",
            uri: "core",
            meta_title: "Core - CloudMouse SDK",
            meta_key: "sdk, core",
            route_id: None,
        };
        let first = session.upsert_page_content(&content).await.unwrap();
        content.content = "<p>v2</p>";
        let second = session.upsert_page_content(&content).await.unwrap();
        session.commit().await.unwrap();

        assert!(first.created());
        assert_eq!(second, Upsert::Existing(first.id()));
        assert_eq!(count(&db, "page_contents").await, 1);
        let body: String = sqlx::query_scalar("SELECT content FROM page_contents")
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(body, "<p>v2</p>");
    }

    #[tokio::test]
    async fn category_path_walks_parents() {
        let db = sandbox().await;
        let root = db.seed_root_category("SDK", "sdk", "en").await.unwrap();
        let mut session = db.begin("en").await.unwrap();
        let child = session.upsert_category(&sub("Core", root)).await.unwrap().id();
        session
            .upsert_category_content(&CategoryContent {
                category_id: child,
                name: "Core",
                description: "",
                uri: "core-system",
                meta_title: "",
                meta_descr: "",
                meta_key: "",
                route_id: None,
            })
            .await
            .unwrap();

        assert_eq!(
            session.category_path_from_db(child).await.unwrap(),
            vec!["sdk".to_string(), "core-system".to_string()]
        );
        assert_eq!(session.category_path_from_db(root).await.unwrap(), vec!["sdk".to_string()]);
        assert!(session.category_path_from_db(9999).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn rollback_discards_everything() {
        let db = sandbox().await;
        let root = db.seed_root_category("SDK", "sdk", "en").await.unwrap();
        let mut session = db.begin("en").await.unwrap();
        session.upsert_category(&sub("Core", root)).await.unwrap();
        session.ensure_route("en/sdk/core", RouteKind::Category, 2).await.unwrap();
        session.rollback().await.unwrap();

        assert_eq!(count(&db, "categories").await, 1);
        assert_eq!(count(&db, "routes").await, 0);
    }
}
