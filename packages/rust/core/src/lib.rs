//! Pipelines for the CloudMouse documentation and provisioning tools.
//!
//! Ties the sanitizer, storage and Markdown crates together into the
//! end-to-end workflows the CLI runs: sanitize, import, export.

pub mod export;
pub mod loader;
pub mod progress;
pub mod sanitize;

pub use export::{ExportOptions, ExportReport, convert_dir, convert_file, export_from_db};
pub use loader::{ImportOptions, ImportReport, LinkReport, import_clean_dir};
pub use progress::{ProgressReporter, SilentProgress};
pub use sanitize::{SanitizeReport, sanitize_dir};
