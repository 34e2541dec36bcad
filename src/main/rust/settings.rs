//! Process-wide settings.
//!
//! Settings are string properties set in-process with [`set_property`]. A
//! property that was never set falls back to an environment variable named by
//! upper-casing the key and replacing `.` with `_`, so
//! `casterlabs.commons.forcegnu` can also come from
//! `CASTERLABS_COMMONS_FORCEGNU`.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{OnceLock, RwLock};

/// Forces the Linux libc probe to report GNU.
pub const FORCE_GNU: &str = "casterlabs.commons.forcegnu";

/// Root directory of the on-disk resource bundle.
pub const RESOURCES_DIR: &str = "nativewebview.resources";

/// Directory native libraries are extracted into.
pub const EXTRACT_DIR: &str = "nativewebview.extract.dir";

static PROPERTIES: OnceLock<RwLock<HashMap<String, String>>> = OnceLock::new();

fn properties() -> &'static RwLock<HashMap<String, String>> {
    PROPERTIES.get_or_init(|| RwLock::new(HashMap::new()))
}

/// Sets a process-wide property, shadowing any environment variable.
pub fn set_property(key: &str, value: &str) {
    match properties().write() {
        Ok(mut map) => {
            map.insert(key.to_string(), value.to_string());
        }
        Err(_) => tracing::warn!(key, "settings table poisoned, property not set"),
    }
}

/// Removes an in-process property; lookups fall back to the environment again.
pub fn clear_property(key: &str) {
    if let Ok(mut map) = properties().write() {
        map.remove(key);
    }
}

/// Environment variable name a property falls back to.
pub fn env_key(key: &str) -> String {
    key.replace('.', "_").to_ascii_uppercase()
}

/// Looks up a property, then its environment fallback.
pub fn property(key: &str) -> Option<String> {
    if let Ok(map) = properties().read() {
        if let Some(value) = map.get(key) {
            return Some(value.clone());
        }
    }
    std::env::var(env_key(key)).ok()
}

/// `true` only when the property equals `true`, ignoring case.
pub fn flag(key: &str) -> bool {
    property(key).is_some_and(|value| value.trim().eq_ignore_ascii_case("true"))
}

/// Where bundled natives are read from and extracted to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoaderConfig {
    pub resource_root: PathBuf,
    pub extract_dir: PathBuf,
}

impl LoaderConfig {
    /// Resolves the loader configuration from settings.
    ///
    /// Defaults: resources next to the running executable, extraction into
    /// the working directory.
    pub fn from_settings() -> std::io::Result<Self> {
        let resource_root = match property(RESOURCES_DIR) {
            Some(dir) => PathBuf::from(dir),
            None => {
                let exe = std::env::current_exe()?;
                exe.parent().map(PathBuf::from).unwrap_or_default()
            }
        };
        let extract_dir = match property(EXTRACT_DIR) {
            Some(dir) => PathBuf::from(dir),
            None => std::env::current_dir()?,
        };
        Ok(Self {
            resource_root,
            extract_dir,
        })
    }
}
