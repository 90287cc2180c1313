//! SQLite rendition of the CMS and production tables this toolkit touches.
//!
//! Production runs against the CMS's own MySQL schema. The sandbox schema lets
//! the tools (and the tests) run against a local SQLite file.

/// A schema version with the statements that create it.
pub(crate) struct Migration {
    pub version: i64,
    pub description: &'static str,
    pub sql: &'static str,
}

/// All sandbox migrations, in ascending version order.
pub(crate) fn all_migrations() -> Vec<Migration> {
    vec![
        Migration {
            version: 1,
            description: "CMS tables: routes, categories, category_contents, pages, page_contents",
            sql: r#"
CREATE TABLE IF NOT EXISTS schema_migrations (
    version    INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS routes (
    id    INTEGER PRIMARY KEY AUTOINCREMENT,
    slug  TEXT NOT NULL UNIQUE,
    route TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS categories (
    id        INTEGER PRIMARY KEY AUTOINCREMENT,
    name      TEXT NOT NULL,
    module    TEXT,
    template  TEXT,
    published INTEGER NOT NULL DEFAULT 0,
    parent_id INTEGER REFERENCES categories(id),
    ord       INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_categories_parent ON categories(parent_id);

CREATE TABLE IF NOT EXISTS category_contents (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    iso         TEXT NOT NULL,
    category_id INTEGER NOT NULL REFERENCES categories(id),
    name        TEXT NOT NULL,
    description TEXT,
    uri         TEXT,
    meta_title  TEXT,
    meta_descr  TEXT,
    meta_key    TEXT,
    route_id    INTEGER REFERENCES routes(id),
    active      INTEGER NOT NULL DEFAULT 0,
    UNIQUE(category_id, iso)
);

CREATE TABLE IF NOT EXISTS pages (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    name        TEXT NOT NULL,
    category_id INTEGER NOT NULL REFERENCES categories(id),
    published   INTEGER NOT NULL DEFAULT 0,
    template    TEXT,
    ord         INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_pages_category ON pages(category_id);

CREATE TABLE IF NOT EXISTS page_contents (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,
    iso        TEXT NOT NULL,
    page_id    INTEGER NOT NULL REFERENCES pages(id),
    route_id   INTEGER REFERENCES routes(id),
    title      TEXT NOT NULL,
    content    TEXT,
    abstract   TEXT,
    uri        TEXT NOT NULL,
    meta_title TEXT,
    meta_key   TEXT,
    active     INTEGER NOT NULL DEFAULT 0,
    UNIQUE(page_id, iso)
);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
        },
        Migration {
            version: 2,
            description: "Production devices",
            sql: r#"
CREATE TABLE IF NOT EXISTS devices (
    id               INTEGER PRIMARY KEY AUTOINCREMENT,
    uuid             TEXT NOT NULL UNIQUE,
    device_id        TEXT NOT NULL,
    mac_address      TEXT NOT NULL UNIQUE,
    pcb_version      TEXT,
    firmware_version TEXT,
    chip_model       TEXT,
    chip_revision    TEXT,
    production_batch TEXT NOT NULL,
    manufactured_at  TEXT NOT NULL,
    manufactured_by  TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_devices_batch ON devices(production_batch);

INSERT INTO schema_migrations (version) VALUES (2);
"#,
        },
    ]
}

/// Split a migration body into individual statements.
pub(crate) fn statements(sql: &str) -> impl Iterator<Item = &str> {
    sql.split(';').map(str::trim).filter(|s| !s.is_empty())
}
