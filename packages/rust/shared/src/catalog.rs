//! Static product catalog: which generator files exist, what they are called,
//! and where each component lives in the CMS taxonomy.
//!
//! The built-in [`Catalog::default`] describes the CloudMouse SDK. Operators can
//! substitute a TOML file with the same shape via [`load_catalog`].

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{CloudMouseError, Result};

/// Extension used by generator output and sanitized pages.
pub const HTML_EXT: &str = ".html";

/// Top-level catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Catalog {
    /// Product name used in CMS meta titles.
    pub product_name: String,

    /// CMS target settings.
    #[serde(default)]
    pub cms: CmsTarget,

    /// Generator file → component display name, in processing order.
    pub components: Vec<ComponentSource>,

    /// Extra generator files that only appear as link targets.
    #[serde(default)]
    pub link_aliases: Vec<LinkAlias>,

    /// Subcategories created under the root category.
    pub categories: Vec<CategorySpec>,

    /// The generated `index.html`.
    pub index: IndexPage,
}

/// Where pages land in the CMS.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CmsTarget {
    /// Name of the pre-existing root category.
    #[serde(default = "default_root_category")]
    pub root_category: String,
    /// Content language (first slug segment).
    #[serde(default = "default_language")]
    pub language: String,
    /// Template assigned to created categories and pages.
    #[serde(default = "default_template")]
    pub template: String,
    /// Module assigned to created categories.
    #[serde(default = "default_module")]
    pub module: String,
}

impl Default for CmsTarget {
    fn default() -> Self {
        Self {
            root_category: default_root_category(),
            language: default_language(),
            template: default_template(),
            module: default_module(),
        }
    }
}

fn default_root_category() -> String {
    "SDK".into()
}
fn default_language() -> String {
    "en".into()
}
fn default_template() -> String {
    "sdk".into()
}
fn default_module() -> String {
    "pages".into()
}

/// One generator file that becomes a documentation page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentSource {
    /// Generator file name, e.g. `classCloudMouse_1_1Core.html`.
    pub source: String,
    /// Display name, e.g. `Core`.
    pub name: String,
}

impl ComponentSource {
    /// Lowercase identifier used as file stem, page name, and page URI.
    pub fn canonical(&self) -> String {
        self.name.to_lowercase()
    }

    /// Sanitized output file name (`core.html`).
    pub fn output_file(&self) -> String {
        format!("{}{HTML_EXT}", self.canonical())
    }
}

/// A generator file that maps onto an existing component for linking only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkAlias {
    pub source: String,
    pub canonical: String,
}

/// A subcategory of the root category and the components it holds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategorySpec {
    pub name: String,
    pub uri: String,
    pub description: String,
    pub components: Vec<String>,
}

/// The generated index page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexPage {
    pub title: String,
    /// Closing prose, emitted verbatim (HTML).
    #[serde(default)]
    pub footer_html: String,
    pub sections: Vec<IndexSection>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexSection {
    pub heading: String,
    pub entries: Vec<IndexEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexEntry {
    /// Sanitized file the entry links to.
    pub file: String,
    pub label: String,
    pub blurb: String,
}

impl Catalog {
    /// Look up the component produced from a generator file name.
    pub fn component_for_source(&self, file_name: &str) -> Option<&ComponentSource> {
        self.components.iter().find(|c| c.source == file_name)
    }

    /// Exact mapping of a generator file name (with or without `.html`) to its
    /// canonical component name. Aliases are consulted after components.
    pub fn canonical_for_source(&self, file_name: &str) -> Option<String> {
        let base = file_name.strip_suffix(HTML_EXT).unwrap_or(file_name);
        let same = |source: &str| source.strip_suffix(HTML_EXT).unwrap_or(source) == base;

        self.components
            .iter()
            .find(|c| same(&c.source))
            .map(ComponentSource::canonical)
            .or_else(|| {
                self.link_aliases
                    .iter()
                    .find(|a| same(&a.source))
                    .map(|a| a.canonical.to_lowercase())
            })
    }

    /// Find the subcategory listing `component` (case-insensitive).
    pub fn category_for_component(&self, component: &str) -> Option<&CategorySpec> {
        let wanted = component.to_lowercase();
        self.categories
            .iter()
            .find(|cat| cat.components.iter().any(|c| c.to_lowercase() == wanted))
    }
}

/// Load the catalog from a TOML file, or the built-in one when `None`.
pub fn load_catalog(path: Option<&Path>) -> Result<Catalog> {
    let Some(path) = path else {
        return Ok(Catalog::default());
    };

    let content = std::fs::read_to_string(path).map_err(|e| CloudMouseError::io(path, e))?;
    let catalog: Catalog = toml::from_str(&content).map_err(|e| {
        CloudMouseError::config(format!("failed to parse catalog {}: {e}", path.display()))
    })?;

    if catalog.components.is_empty() {
        return Err(CloudMouseError::config(format!(
            "catalog {} lists no components",
            path.display()
        )));
    }

    tracing::info!(
        ?path,
        components = catalog.components.len(),
        categories = catalog.categories.len(),
        "loaded catalog"
    );
    Ok(catalog)
}

// ---------------------------------------------------------------------------
// Built-in CloudMouse SDK catalog
// ---------------------------------------------------------------------------

fn component(source: &str, name: &str) -> ComponentSource {
    ComponentSource {
        source: source.into(),
        name: name.into(),
    }
}

fn category(name: &str, uri: &str, description: &str, components: &[&str]) -> CategorySpec {
    CategorySpec {
        name: name.into(),
        uri: uri.into(),
        description: description.into(),
        components: components.iter().map(|c| c.to_string()).collect(),
    }
}

fn section(heading: &str, entries: &[(&str, &str, &str)]) -> IndexSection {
    IndexSection {
        heading: heading.into(),
        entries: entries
            .iter()
            .map(|(file, label, blurb)| IndexEntry {
                file: file.to_string(),
                label: label.to_string(),
                blurb: blurb.to_string(),
            })
            .collect(),
    }
}

const SDK_FOOTER_HTML: &str = r#"<h2>SDK Information</h2>
<p>CloudMouse SDK provides a comprehensive IoT development platform for ESP32-based devices with professional-grade documentation and hardware abstraction.</p>

<h3>Key Features</h3>
<ul>
    <li>Event-driven architecture with thread-safe communication</li>
    <li>Cross-platform ESP-IDF compatibility (4.4 and 5.x)</li>
    <li>Hardware-accelerated display rendering with PSRAM optimization</li>
    <li>Multi-level encoder input processing (click, long press, ultra-long press)</li>
    <li>Comprehensive WiFi management with captive portal setup</li>
    <li>Professional audio and visual feedback systems</li>
    <li>PCB version compatibility and power management</li>
    <li>Time synchronization and preferences management</li>
    <li>QR code generation for device setup and configuration</li>
    <li>JSON processing utilities for data exchange</li>
</ul>
"#;

impl Default for Catalog {
    fn default() -> Self {
        Self {
            product_name: "CloudMouse SDK".into(),
            cms: CmsTarget::default(),
            components: vec![
                // Core
                component("classCloudMouse_1_1Core.html", "Core"),
                component("classCloudMouse_1_1EventBus.html", "EventBus"),
                component("structCloudMouse_1_1Event.html", "Event"),
                // Hardware
                component("classCloudMouse_1_1Hardware_1_1DisplayManager.html", "DisplayManager"),
                component("classCloudMouse_1_1Hardware_1_1EncoderManager.html", "EncoderManager"),
                component("classCloudMouse_1_1Hardware_1_1LEDManager.html", "LEDManager"),
                component("classCloudMouse_1_1Hardware_1_1SimpleBuzzer.html", "SimpleBuzzer"),
                component("structCloudMouse_1_1Hardware_1_1LEDEvent.html", "LEDEvent"),
                component("classRotaryEncoderPCNT.html", "RotaryEncoderPCNT"),
                component("classLGFX__ILI9488.html", "LGFX_ILI9488"),
                // Network
                component("classCloudMouse_1_1Network_1_1WiFiManager.html", "WiFiManager"),
                component("classCloudMouse_1_1Network_1_1WebServerManager.html", "WebServerManager"),
                // Utils
                component("classCloudMouse_1_1Utils_1_1DeviceID.html", "DeviceID"),
                component("classCloudMouse_1_1Utils_1_1JsonHelper.html", "JsonHelper"),
                component("classCloudMouse_1_1Utils_1_1NTPManager.html", "NTPManager"),
                component("classCloudMouse_1_1Utils_1_1QRCodeManager.html", "QRCodeManager"),
                // Prefs
                component("classCloudMouse_1_1Prefs_1_1PreferencesManager.html", "PreferencesManager"),
                // Config
                component("DeviceConfig_8h.html", "DeviceConfig"),
                // Namespaces
                component("namespaceCloudMouse.html", "CloudMouse"),
                component("namespaceCloudMouse_1_1Hardware.html", "Hardware"),
                component("namespaceCloudMouse_1_1Network.html", "Network"),
                component("namespaceCloudMouse_1_1Utils.html", "Utils"),
                component("namespaceCloudMouse_1_1Prefs.html", "Prefs"),
            ],
            link_aliases: vec![LinkAlias {
                source: "Events_8h.html".into(),
                canonical: "event".into(),
            }],
            categories: vec![
                category(
                    "Core System",
                    "core-system",
                    "Core SDK components and event system",
                    &["core", "eventbus", "event"],
                ),
                category(
                    "Hardware Management",
                    "hardware-management",
                    "Hardware abstraction and device control",
                    &[
                        "displaymanager",
                        "encodermanager",
                        "rotaryencoderpcnt",
                        "ledmanager",
                        "ledevent",
                        "simplebuzzer",
                        "lgfx_ili9488",
                    ],
                ),
                category(
                    "Networking",
                    "networking",
                    "Networking abstraction for connectivity control",
                    &["wifimanager", "webservermanager"],
                ),
                category(
                    "Helpers & Utilities",
                    "helpers-utilities",
                    "Utility classes and helper functions",
                    &["deviceid", "jsonhelper", "ntpmanager", "qrcodemanager"],
                ),
                category(
                    "Preferences",
                    "preferences",
                    "Preferences management",
                    &["preferencesmanager"],
                ),
                category(
                    "Configuration",
                    "configuration",
                    "Device and system configuration",
                    &["deviceconfig"],
                ),
                category(
                    "Namespace",
                    "namespace",
                    "SDK namespace schema",
                    &["cloudmouse", "network", "hardware", "utils", "prefs"],
                ),
            ],
            index: IndexPage {
                title: "CloudMouse SDK API Documentation".into(),
                footer_html: SDK_FOOTER_HTML.into(),
                sections: vec![
                    section(
                        "Namespaces",
                        &[
                            ("cloudmouse.html", "CloudMouse", "Core namespace with global functions and enums"),
                            ("network.html", "Network", "Core namespace with global functions and enums"),
                            ("hardware.html", "Hardware", "Core namespace with global functions and enums"),
                            ("utils.html", "Utils", "Core namespace with global functions and enums"),
                            ("prefs.html", "Prefs", "Core namespace with global functions and enums"),
                        ],
                    ),
                    section(
                        "Core System",
                        &[
                            ("core.html", "Core", "Main SDK initialization and system management"),
                            ("eventbus.html", "EventBus", "Thread-safe inter-task messaging"),
                            ("event.html", "Event", "Type-safe event definitions and data structures"),
                        ],
                    ),
                    section(
                        "Hardware Management",
                        &[
                            ("hardware.html", "Hardware", "Hardware namespace"),
                            ("displaymanager.html", "DisplayManager", "TFT display control and UI rendering"),
                            ("encodermanager.html", "EncoderManager", "Rotary encoder input processing"),
                            ("ledmanager.html", "LEDManager", "LED control and visual feedback"),
                            ("ledevent.html", "LEDEvent", "LED event structure"),
                            ("simplebuzzer.html", "SimpleBuzzer", "Audio feedback and sound patterns"),
                            ("rotaryencoderpcnt.html", "RotaryEncoderPCNT", "Cross-platform PCNT hardware abstraction"),
                            ("lgfx_ili9488.html", "LGFX_ILI9488", "ILI9488 display hardware configuration"),
                        ],
                    ),
                    section(
                        "Network Management",
                        &[
                            ("network.html", "Network", "Network namespace"),
                            ("wifimanager.html", "WiFiManager", "WiFi connection lifecycle management"),
                            ("webservermanager.html", "WebServerManager", "Captive portal for device setup"),
                        ],
                    ),
                    section(
                        "Helpers and Utilities",
                        &[
                            ("utils.html", "Utils", "Utilities namespace"),
                            ("deviceid.html", "DeviceID", "Hardware-based device identification"),
                            ("jsonhelper.html", "JsonHelper", "JSON processing utilities"),
                            ("ntpmanager.html", "NTPManager", "Network time synchronization"),
                            ("qrcodemanager.html", "QRCodeManager", "QR code generation and rendering"),
                        ],
                    ),
                    section(
                        "Preferences",
                        &[
                            ("prefs.html", "Prefs", "Preferences namespace"),
                            ("preferencesmanager.html", "PreferencesManager", "Non-volatile storage management"),
                        ],
                    ),
                    section(
                        "Configuration",
                        &[("deviceconfig.html", "DeviceConfig", "Central device and hardware configuration")],
                    ),
                ],
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_component_has_a_category() {
        let catalog = Catalog::default();
        for c in &catalog.components {
            assert!(
                catalog.category_for_component(&c.canonical()).is_some(),
                "{} has no category",
                c.name
            );
        }
    }

    #[test]
    fn canonical_mapping_is_total_on_table() {
        let catalog = Catalog::default();
        for c in &catalog.components {
            let canonical = catalog.canonical_for_source(&c.source).expect("mapped");
            assert_eq!(canonical, c.name.to_lowercase());
            assert!(canonical.chars().all(|ch| !ch.is_uppercase()));
        }
    }

    #[test]
    fn canonical_mapping_accepts_bare_names_and_aliases() {
        let catalog = Catalog::default();
        assert_eq!(
            catalog.canonical_for_source("classCloudMouse_1_1Core").as_deref(),
            Some("core")
        );
        assert_eq!(catalog.canonical_for_source("Events_8h.html").as_deref(), Some("event"));
        assert_eq!(catalog.canonical_for_source("files.html"), None);
        assert_eq!(catalog.canonical_for_source(""), None);
    }

    #[test]
    fn category_lookup_is_case_insensitive() {
        let catalog = Catalog::default();
        let cat = catalog.category_for_component("DisplayManager").unwrap();
        assert_eq!(cat.uri, "hardware-management");
        assert!(catalog.category_for_component("mystery").is_none());
    }

    #[test]
    fn catalog_toml_roundtrip() {
        let catalog = Catalog::default();
        let toml_str = toml::to_string_pretty(&catalog).expect("serialize catalog");
        let parsed: Catalog = toml::from_str(&toml_str).expect("deserialize catalog");
        assert_eq!(parsed.components.len(), catalog.components.len());
        assert_eq!(parsed.cms.root_category, "SDK");
        assert_eq!(parsed.index.sections.len(), 7);
    }

    #[test]
    fn minimal_catalog_fills_cms_defaults() {
        let toml_str = r#"
product_name = "Widget SDK"

[[components]]
source = "classWidget.html"
name = "Widget"

[[categories]]
name = "Widgets"
uri = "widgets"
description = "All widgets"
components = ["widget"]

[index]
title = "Widget API"
sections = []
"#;
        let catalog: Catalog = toml::from_str(toml_str).expect("parse");
        assert_eq!(catalog.cms.language, "en");
        assert_eq!(catalog.cms.template, "sdk");
        assert!(catalog.link_aliases.is_empty());
        assert_eq!(catalog.components[0].output_file(), "widget.html");
    }
}
