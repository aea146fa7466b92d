// Process configuration: environment variables, the signing key on disk
// and the display-name -> server-id mapping shown in the menu.

use crate::error::{AsmError, Result};
use serde::Deserialize;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub const DEFAULT_KEY_FILE: &str = "asm_private_key.pem";
pub const DEFAULT_BASE_URL: &str = "https://api-school.apple.com/v1";

/// Marker left in the built-in mapping until real server ids are filled in.
pub const PLACEHOLDER_SERVER_ID: &str = "UDID_GOES_HERE";

/// Settings read from the environment once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub key_file: PathBuf,
    pub key_id: Option<String>,
    pub issuer_id: Option<String>,
    pub base_url: String,
}

impl Config {
    /// Read `ASM_KEY_FILE`, `ASM_KEY_ID`, `ASM_ISSUER_ID` and
    /// `ASM_API_BASE_URL`.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as `from_env` but with an arbitrary variable source. Blank values
    /// count as unset.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let key_file = get("ASM_KEY_FILE").unwrap_or_else(|| DEFAULT_KEY_FILE.into());
        let base_url = get("ASM_API_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.into());

        Config {
            key_file: expand_home(&key_file),
            key_id: get("ASM_KEY_ID"),
            issuer_id: get("ASM_ISSUER_ID"),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Check the identifiers, then read the key file.
    pub fn load_credentials(&self) -> Result<Credentials> {
        let key_id = self.key_id.clone().ok_or_else(|| {
            AsmError::Configuration(
                "ASM_KEY_ID environment variable not set\n\
                 Please set it to your Apple School Manager API Key ID"
                    .into(),
            )
        })?;
        let issuer_id = self.issuer_id.clone().ok_or_else(|| {
            AsmError::Configuration(
                "ASM_ISSUER_ID environment variable not set\n\
                 Please set it to your Apple School Manager Issuer ID"
                    .into(),
            )
        })?;

        if !self.key_file.exists() {
            return Err(AsmError::Configuration(format!(
                "Private key file not found at {}\n\
                 Please set the ASM_KEY_FILE environment variable to point to your private key file.",
                self.key_file.display()
            )));
        }
        let key_pem = fs::read(&self.key_file).map_err(|e| {
            AsmError::Configuration(format!("Could not read private key {}: {}", self.key_file.display(), e))
        })?;
        debug!(path = %self.key_file.display(), "loaded signing key");

        Ok(Credentials::new(key_pem, key_id, issuer_id))
    }
}

/// Expand a leading `~/` to the user's home directory.
fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

/// Signing key and identifiers used to mint tokens.
#[derive(Clone)]
pub struct Credentials {
    key_pem: Vec<u8>,
    key_id: String,
    issuer_id: String,
}

impl Credentials {
    pub fn new(key_pem: Vec<u8>, key_id: impl Into<String>, issuer_id: impl Into<String>) -> Self {
        Credentials {
            key_pem,
            key_id: key_id.into(),
            issuer_id: issuer_id.into(),
        }
    }

    pub fn key_pem(&self) -> &[u8] {
        &self.key_pem
    }

    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    pub fn issuer_id(&self) -> &str {
        &self.issuer_id
    }
}

// Never print key material.
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("key_id", &self.key_id)
            .field("issuer_id", &self.issuer_id)
            .finish_non_exhaustive()
    }
}

/// One menu entry: what the operator sees and the id sent to the API.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ServerEntry {
    pub name: String,
    pub id: String,
}

/// Ordered display-name -> server-id mapping. Order is menu order.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ServerMap {
    servers: Vec<ServerEntry>,
}

impl Default for ServerMap {
    fn default() -> Self {
        ServerMap::new(vec![
            ServerEntry {
                name: "Mosyle Macs".into(),
                id: PLACEHOLDER_SERVER_ID.into(),
            },
            ServerEntry {
                name: "Mosyle iPads".into(),
                id: PLACEHOLDER_SERVER_ID.into(),
            },
        ])
    }
}

impl ServerMap {
    pub fn new(servers: Vec<ServerEntry>) -> Self {
        ServerMap { servers }
    }

    /// Parse a TOML mapping file made of `[[servers]]` tables.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            AsmError::Configuration(format!(
                "Error reading server mapping {}: {}",
                path.display(),
                e
            ))
        })?;
        let map: ServerMap = toml::from_str(&content).map_err(|e| {
            AsmError::Configuration(format!(
                "Invalid server mapping {}: {}",
                path.display(),
                e
            ))
        })?;
        if map.is_empty() {
            return Err(AsmError::Configuration(format!(
                "Server mapping {} defines no servers",
                path.display()
            )));
        }
        Ok(map)
    }

    /// Use the file when one is given, otherwise the built-in mapping.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let map = match path {
            Some(p) => ServerMap::from_file(p)?,
            None => ServerMap::default(),
        };
        for entry in map.entries().iter().filter(|e| e.id == PLACEHOLDER_SERVER_ID) {
            warn!(server = %entry.name, "server id is still a placeholder");
        }
        Ok(map)
    }

    pub fn entries(&self) -> &[ServerEntry] {
        &self.servers
    }

    pub fn len(&self) -> usize {
        self.servers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.servers.is_empty()
    }

    /// 1-based lookup matching the numbered menu.
    pub fn choice(&self, number: usize) -> Option<&ServerEntry> {
        number.checked_sub(1).and_then(|i| self.servers.get(i))
    }
}
