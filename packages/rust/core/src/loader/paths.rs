//! Process-local state built up while the loader writes the taxonomy.

use std::collections::{BTreeMap, HashMap};

use cloudmouse_shared::HTML_EXT;

/// Category id → slug path segments (`["sdk", "core-system"]`).
///
/// Filled as categories are written so slugs can be computed without reading
/// back uncommitted rows. Always agrees with the stored `uri` chain.
#[derive(Debug, Default, Clone)]
pub struct CategoryPaths {
    paths: HashMap<i64, Vec<String>>,
}

impl CategoryPaths {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, category_id: i64, path: Vec<String>) {
        self.paths.insert(category_id, path);
    }

    pub fn get(&self, category_id: i64) -> Option<&[String]> {
        self.paths.get(&category_id).map(Vec::as_slice)
    }

    /// Record `category_id` as a child of `parent_id` with `uri`. Returns the
    /// new path, or `None` when the parent is unknown.
    pub fn insert_child(&mut self, category_id: i64, parent_id: i64, uri: &str) -> Option<Vec<String>> {
        let mut path = self.paths.get(&parent_id)?.clone();
        path.push(uri.to_string());
        self.paths.insert(category_id, path.clone());
        Some(path)
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (i64, &[String])> {
        self.paths.iter().map(|(id, path)| (*id, path.as_slice()))
    }
}

/// Full slug for an entity: language, ancestor path, own uri.
pub fn slug(iso: &str, path: &[String], uri: Option<&str>) -> String {
    let mut parts: Vec<&str> = Vec::with_capacity(path.len() + 2);
    parts.push(iso);
    parts.extend(path.iter().map(String::as_str));
    if let Some(uri) = uri {
        parts.push(uri);
    }
    parts.join("/")
}

/// Sanitized file name (`core.html`) → site-relative slug
/// (`/sdk/core-system/core`), for every page written in this run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SlugMap {
    entries: BTreeMap<String, String>,
}

impl SlugMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record page `uri` living under category `path`.
    pub fn record(&mut self, uri: &str, path: &[String]) {
        let mut slug = String::new();
        for segment in path {
            slug.push('/');
            slug.push_str(segment);
        }
        slug.push('/');
        slug.push_str(uri);
        self.entries.insert(format!("{uri}{HTML_EXT}"), slug);
    }

    pub fn get(&self, file: &str) -> Option<&str> {
        self.entries.get(file).map(String::as_str)
    }

    pub fn contains(&self, file: &str) -> bool {
        self.entries.contains_key(file)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}
