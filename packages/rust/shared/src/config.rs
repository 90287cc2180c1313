//! Runtime configuration for the CloudMouse tools.
//!
//! Database credentials live in a JSON file (default
//! `~/.cloudmouse/config.json`); the exporter reads its settings from the
//! environment instead. CLI flags override both.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{CloudMouseError, Result};

/// Default credentials file name.
const CREDENTIALS_FILE_NAME: &str = "config.json";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".cloudmouse";

// ---------------------------------------------------------------------------
// Credentials file (config.json)
// ---------------------------------------------------------------------------

/// Database credentials and operator identity, deserialized from JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credentials {
    /// Database host name.
    pub db_host: String,

    /// Database port (MySQL default when absent).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub db_port: Option<u16>,

    /// Database (schema) name.
    pub db_name: String,

    /// Database user.
    pub db_user: String,

    /// Database password.
    #[serde(default)]
    pub db_pass: String,

    /// Connection character set.
    #[serde(default = "default_charset")]
    pub db_charset: String,

    /// Connection collation, passed through when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub db_collation: Option<String>,

    /// E-mail of the operator running the provisioning station.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operator_email: Option<String>,
}

fn default_charset() -> String {
    "utf8mb4".into()
}

impl Credentials {
    /// Build a `mysql://` connection URL with percent-encoded credentials.
    pub fn database_url(&self) -> Result<String> {
        let mut url = mysql_url(
            &self.db_host,
            self.db_port,
            &self.db_user,
            &self.db_pass,
            &self.db_name,
        )?;
        url.query_pairs_mut().append_pair("charset", &self.db_charset);
        if let Some(collation) = &self.db_collation {
            url.query_pairs_mut().append_pair("collation", collation);
        }
        Ok(url.to_string())
    }

    /// The operator e-mail, required for device registration.
    pub fn operator(&self) -> Result<&str> {
        match self.operator_email.as_deref() {
            Some(email) if !email.trim().is_empty() => Ok(email),
            _ => Err(CloudMouseError::config(
                "operator_email is missing from the credentials file",
            )),
        }
    }
}

/// Get the path to the config directory (`~/.cloudmouse/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| CloudMouseError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the default credentials path (`~/.cloudmouse/config.json`).
pub fn credentials_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CREDENTIALS_FILE_NAME))
}

/// Load credentials from `path`, or from the default location when `None`.
pub fn load_credentials(path: Option<&Path>) -> Result<Credentials> {
    match path {
        Some(p) => load_credentials_from(p),
        None => load_credentials_from(&credentials_path()?),
    }
}

/// Load credentials from a specific JSON file.
pub fn load_credentials_from(path: &Path) -> Result<Credentials> {
    let content = std::fs::read_to_string(path).map_err(|e| CloudMouseError::io(path, e))?;

    let creds: Credentials = serde_json::from_str(&content).map_err(|e| {
        CloudMouseError::config(format!("failed to parse {}: {e}", path.display()))
    })?;

    tracing::debug!(?path, host = %creds.db_host, db = %creds.db_name, "loaded credentials");
    Ok(creds)
}

// ---------------------------------------------------------------------------
// Exporter settings (environment)
// ---------------------------------------------------------------------------

/// Default CMS host prefix used to recognise internal links.
pub const DEFAULT_SERVICE_HOST: &str = "http://localhost/";

/// Exporter settings, read from `DB_*` and `CMS_SERVICE_HOST` variables.
#[derive(Debug, Clone)]
pub struct ExportSettings {
    pub db_host: String,
    pub db_user: String,
    pub db_pass: String,
    pub db_name: String,
    /// Full connection URL; wins over the `db_*` fields when set.
    pub database_url: Option<String>,
    /// Prefix identifying links that point back into the CMS.
    pub service_host: String,
}

impl ExportSettings {
    /// Read settings from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read settings through an arbitrary lookup function.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());
        Self {
            db_host: get("DB_HOST", "localhost"),
            db_user: get("DB_USER", "root"),
            db_pass: get("DB_PASS", ""),
            db_name: get("DB_NAME", "cloudmouse"),
            database_url: lookup("DATABASE_URL").filter(|v| !v.is_empty()),
            service_host: get("CMS_SERVICE_HOST", DEFAULT_SERVICE_HOST),
        }
    }

    /// Connection URL for the CMS database.
    pub fn database_url(&self) -> Result<String> {
        if let Some(url) = &self.database_url {
            return Ok(url.clone());
        }
        Ok(mysql_url(&self.db_host, None, &self.db_user, &self.db_pass, &self.db_name)?.to_string())
    }

    /// Check that the service host is an absolute URL.
    pub fn validate(&self) -> Result<()> {
        Url::parse(&self.service_host).map_err(|e| {
            CloudMouseError::config(format!(
                "CMS_SERVICE_HOST '{}' is not a valid URL: {e}",
                self.service_host
            ))
        })?;
        Ok(())
    }
}

fn mysql_url(host: &str, port: Option<u16>, user: &str, pass: &str, db: &str) -> Result<Url> {
    let bad = |what: &str| CloudMouseError::config(format!("invalid database {what}"));

    let mut url = Url::parse("mysql://localhost").map_err(|_| bad("url"))?;
    url.set_host(Some(host)).map_err(|_| bad("host"))?;
    url.set_port(port).map_err(|_| bad("port"))?;
    url.set_username(user).map_err(|_| bad("user"))?;
    if !pass.is_empty() {
        url.set_password(Some(pass)).map_err(|_| bad("password"))?;
    }
    url.set_path(&format!("/{db}"));
    Ok(url)
}
