//! Shared types, error model, and configuration for the CloudMouse tools.
//!
//! This crate is the foundation depended on by all other CloudMouse crates.
//! It provides:
//! - [`CloudMouseError`] — the unified error type
//! - The product [`Catalog`] (component table, taxonomy, index page)
//! - Configuration ([`Credentials`], [`ExportSettings`])
//! - Domain types ([`DeviceInfo`])

pub mod catalog;
pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use catalog::{
    Catalog, CategorySpec, CmsTarget, ComponentSource, HTML_EXT, IndexEntry, IndexPage,
    IndexSection, LinkAlias, load_catalog,
};
pub use config::{
    Credentials, DEFAULT_SERVICE_HOST, ExportSettings, config_dir, credentials_path,
    load_credentials, load_credentials_from,
};
pub use error::{CloudMouseError, Result};
pub use types::DeviceInfo;
