//! Registry of webviews created through the exported API.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, OnceLock};
use std::thread::ThreadId;

use crate::error::WebViewError;
use crate::webview::{Webview, WebviewRemote};

/// Entry in the registry: the webview, its creating thread and its remote.
pub struct WebViewEntry {
    pub webview: Webview,
    pub thread_id: ThreadId,
    pub remote: WebviewRemote,
}

// `webview` is only cloned, used and dropped on the creating thread (checked
// at runtime); other threads only reach `remote`.
unsafe impl Send for WebViewEntry {}
unsafe impl Sync for WebViewEntry {}

static NEXT_ID: AtomicU64 = AtomicU64::new(1);
static WEBVIEWS: OnceLock<Mutex<HashMap<u64, WebViewEntry>>> = OnceLock::new();

/// Returns the global WebView registry.
pub fn webviews() -> &'static Mutex<HashMap<u64, WebViewEntry>> {
    WEBVIEWS.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Generates a new unique WebView ID.
pub fn next_id() -> u64 {
    NEXT_ID.fetch_add(1, Ordering::Relaxed)
}

fn lock() -> Result<std::sync::MutexGuard<'static, HashMap<u64, WebViewEntry>>, WebViewError> {
    webviews()
        .lock()
        .map_err(|_| WebViewError::Internal("webview registry lock poisoned".to_string()))
}

/// Executes a closure with the WebView on its creating thread.
///
/// The registry lock is released before `f` runs, so `f` may block in the
/// event loop while bound callbacks and dispatched tasks call back in.
pub fn with_webview<F, R>(id: u64, f: F) -> Result<R, WebViewError>
where
    F: FnOnce(&Webview) -> Result<R, WebViewError>,
{
    let webview = {
        let map = lock()?;
        let entry = map.get(&id).ok_or(WebViewError::WebViewNotFound(id))?;
        if entry.thread_id != std::thread::current().id() {
            return Err(WebViewError::WrongThread(id));
        }
        entry.webview.share()
    };
    f(&webview)
}

/// Retrieves the thread-safe remote for a WebView by ID.
pub fn get_remote(id: u64) -> Result<WebviewRemote, WebViewError> {
    let map = lock()?;
    let entry = map.get(&id).ok_or(WebViewError::WebViewNotFound(id))?;
    Ok(entry.remote.clone())
}

/// Registers a new WebView in the global registry.
pub fn register(webview: Webview) -> Result<u64, WebViewError> {
    let id = next_id();
    let entry = WebViewEntry {
        remote: webview.remote(),
        webview,
        thread_id: std::thread::current().id(),
    };

    let mut map = lock()?;
    map.insert(id, entry);
    Ok(id)
}

/// Removes a WebView from the registry and closes it. A running event loop
/// is stopped and releases the webview when it returns.
pub fn unregister(id: u64) -> Result<(), WebViewError> {
    let entry = {
        let mut map = lock()?;

        let Some(entry) = map.get(&id) else {
            return Ok(());
        };

        if entry.thread_id != std::thread::current().id() {
            return Err(WebViewError::WrongThread(id));
        }

        map.remove(&id)
    };

    if let Some(entry) = entry {
        entry.webview.close()?;
    }

    Ok(())
}
