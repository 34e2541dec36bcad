//! Materializes bundled blobs on disk.

use std::ffi::c_int;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, Once, OnceLock};

use tempfile::NamedTempFile;

use super::bundle::ResourceBundle;
use crate::error::WebViewError;

/// Writes the blob at `internal_path` into `dir`, named after the path's
/// basename, replacing any previous copy. The file is removed at process exit.
///
/// Returns [`WebViewError::ResourceBusy`] when another process holds the
/// target file.
pub fn extract(
    bundle: &dyn ResourceBundle,
    internal_path: &str,
    dir: &Path,
) -> Result<PathBuf, WebViewError> {
    let file_name = internal_path
        .rsplit('/')
        .next()
        .filter(|name| !name.is_empty())
        .ok_or_else(|| WebViewError::ResourceMissing(internal_path.to_string()))?;
    let target = dir.join(file_name);

    if target.exists() {
        if let Err(err) = std::fs::remove_file(&target) {
            tracing::debug!(path = %target.display(), %err, "could not remove stale native");
        }
    }
    delete_on_exit(&target);

    let extract_err = |source: io::Error| {
        if is_busy(&source) {
            WebViewError::ResourceBusy(target.clone())
        } else {
            WebViewError::Extract {
                resource: internal_path.to_string(),
                target: target.clone(),
                source,
            }
        }
    };

    let bytes = bundle
        .open(&internal_path.to_lowercase())
        .map_err(extract_err)?
        .ok_or_else(|| WebViewError::ResourceMissing(internal_path.to_string()))?;

    let mut staged = NamedTempFile::new_in(dir).map_err(extract_err)?;
    staged.write_all(&bytes).map_err(extract_err)?;
    staged.flush().map_err(extract_err)?;
    staged
        .persist(&target)
        .map_err(|err| extract_err(err.error))?;

    tracing::debug!(resource = internal_path, path = %target.display(), "extracted native");
    Ok(target)
}

#[cfg(unix)]
fn is_busy(err: &io::Error) -> bool {
    const ETXTBSY: i32 = 26;
    err.raw_os_error() == Some(ETXTBSY)
}

#[cfg(windows)]
fn is_busy(err: &io::Error) -> bool {
    const ERROR_ACCESS_DENIED: i32 = 5;
    const ERROR_SHARING_VIOLATION: i32 = 32;
    const ERROR_LOCK_VIOLATION: i32 = 33;
    matches!(
        err.raw_os_error(),
        Some(ERROR_ACCESS_DENIED | ERROR_SHARING_VIOLATION | ERROR_LOCK_VIOLATION)
    )
}

#[cfg(not(any(unix, windows)))]
fn is_busy(_err: &io::Error) -> bool {
    false
}

static PENDING_DELETES: OnceLock<Mutex<Vec<PathBuf>>> = OnceLock::new();
static EXIT_HOOK: Once = Once::new();

extern "C" {
    fn atexit(callback: extern "C" fn()) -> c_int;
}

fn pending_deletes() -> &'static Mutex<Vec<PathBuf>> {
    PENDING_DELETES.get_or_init(|| Mutex::new(Vec::new()))
}

/// Registers `path` for removal when the process exits.
pub fn delete_on_exit(path: &Path) {
    EXIT_HOOK.call_once(|| {
        // SAFETY: `remove_pending` is a plain `extern "C"` fn that never unwinds.
        let status = unsafe { atexit(remove_pending) };
        if status != 0 {
            tracing::warn!(status, "failed to install exit cleanup hook");
        }
    });

    if let Ok(mut paths) = pending_deletes().lock() {
        if !paths.iter().any(|known| known == path) {
            paths.push(path.to_path_buf());
        }
    }
}

/// Paths that will be removed at exit.
pub fn pending() -> Vec<PathBuf> {
    pending_deletes()
        .lock()
        .map(|paths| paths.clone())
        .unwrap_or_default()
}

extern "C" fn remove_pending() {
    let paths = match pending_deletes().lock() {
        Ok(mut paths) => std::mem::take(&mut *paths),
        Err(_) => return,
    };
    for path in paths {
        if path.exists() {
            // Loaded libraries may still be mapped; best effort only.
            let _ = std::fs::remove_file(&path);
        }
    }
}
