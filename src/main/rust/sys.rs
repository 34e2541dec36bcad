//! Raw bindings to the webview C API.
//!
//! Symbols are resolved at runtime from the extracted library, so the API is
//! a table of function pointers rather than `extern` declarations.

#![allow(non_camel_case_types)]

use std::ffi::{c_char, c_int, c_void};

use libloading::Library;

use crate::error::WebViewError;

pub type webview_t = *mut c_void;
pub type webview_error_t = c_int;
pub type webview_hint_t = c_int;

pub const WEBVIEW_ERROR_MISSING_DEPENDENCY: webview_error_t = -5;
pub const WEBVIEW_ERROR_CANCELED: webview_error_t = -4;
pub const WEBVIEW_ERROR_INVALID_STATE: webview_error_t = -3;
pub const WEBVIEW_ERROR_INVALID_ARGUMENT: webview_error_t = -2;
pub const WEBVIEW_ERROR_UNSPECIFIED: webview_error_t = -1;
pub const WEBVIEW_ERROR_OK: webview_error_t = 0;
pub const WEBVIEW_ERROR_DUPLICATE: webview_error_t = 1;
pub const WEBVIEW_ERROR_NOT_FOUND: webview_error_t = 2;

pub const WEBVIEW_HINT_NONE: webview_hint_t = 0;
pub const WEBVIEW_HINT_MIN: webview_hint_t = 1;
pub const WEBVIEW_HINT_MAX: webview_hint_t = 2;
pub const WEBVIEW_HINT_FIXED: webview_hint_t = 3;

/// `(seq, req, arg)` upcall installed by `webview_bind`.
pub type webview_bind_fn = unsafe extern "C" fn(*const c_char, *const c_char, *mut c_void);
/// Callback run on the UI thread by `webview_dispatch`.
pub type webview_dispatch_fn = unsafe extern "C" fn(webview_t, *mut c_void);

pub type webview_create_fn = unsafe extern "C" fn(c_int, *mut c_void) -> webview_t;
pub type webview_destroy_fn = unsafe extern "C" fn(webview_t) -> webview_error_t;
pub type webview_run_fn = unsafe extern "C" fn(webview_t) -> webview_error_t;
pub type webview_terminate_fn = unsafe extern "C" fn(webview_t) -> webview_error_t;
pub type webview_dispatch_call_fn =
    unsafe extern "C" fn(webview_t, webview_dispatch_fn, *mut c_void) -> webview_error_t;
pub type webview_set_title_fn = unsafe extern "C" fn(webview_t, *const c_char) -> webview_error_t;
pub type webview_set_size_fn =
    unsafe extern "C" fn(webview_t, c_int, c_int, webview_hint_t) -> webview_error_t;
pub type webview_navigate_fn = unsafe extern "C" fn(webview_t, *const c_char) -> webview_error_t;
pub type webview_set_html_fn = unsafe extern "C" fn(webview_t, *const c_char) -> webview_error_t;
pub type webview_init_fn = unsafe extern "C" fn(webview_t, *const c_char) -> webview_error_t;
pub type webview_eval_fn = unsafe extern "C" fn(webview_t, *const c_char) -> webview_error_t;
pub type webview_bind_call_fn = unsafe extern "C" fn(
    webview_t,
    *const c_char,
    webview_bind_fn,
    *mut c_void,
) -> webview_error_t;
pub type webview_unbind_fn = unsafe extern "C" fn(webview_t, *const c_char) -> webview_error_t;
pub type webview_return_fn =
    unsafe extern "C" fn(webview_t, *const c_char, c_int, *const c_char) -> webview_error_t;

#[derive(Clone, Copy)]
pub struct WebviewApi {
    pub webview_create: webview_create_fn,
    pub webview_destroy: webview_destroy_fn,
    pub webview_run: webview_run_fn,
    pub webview_terminate: webview_terminate_fn,
    pub webview_dispatch: webview_dispatch_call_fn,
    pub webview_set_title: webview_set_title_fn,
    pub webview_set_size: webview_set_size_fn,
    pub webview_navigate: webview_navigate_fn,
    pub webview_set_html: webview_set_html_fn,
    pub webview_init: webview_init_fn,
    pub webview_eval: webview_eval_fn,
    pub webview_bind: webview_bind_call_fn,
    pub webview_unbind: webview_unbind_fn,
    pub webview_return: webview_return_fn,
}

impl WebviewApi {
    /// Resolves every webview symbol from `library`.
    ///
    /// # Safety
    ///
    /// `library` must export the webview C API with the signatures above.
    pub unsafe fn load(library: &Library) -> Result<Self, WebViewError> {
        Ok(Self {
            webview_create: load_symbol(library, "webview_create")?,
            webview_destroy: load_symbol(library, "webview_destroy")?,
            webview_run: load_symbol(library, "webview_run")?,
            webview_terminate: load_symbol(library, "webview_terminate")?,
            webview_dispatch: load_symbol(library, "webview_dispatch")?,
            webview_set_title: load_symbol(library, "webview_set_title")?,
            webview_set_size: load_symbol(library, "webview_set_size")?,
            webview_navigate: load_symbol(library, "webview_navigate")?,
            webview_set_html: load_symbol(library, "webview_set_html")?,
            webview_init: load_symbol(library, "webview_init")?,
            webview_eval: load_symbol(library, "webview_eval")?,
            webview_bind: load_symbol(library, "webview_bind")?,
            webview_unbind: load_symbol(library, "webview_unbind")?,
            webview_return: load_symbol(library, "webview_return")?,
        })
    }
}

unsafe fn load_symbol<F: Copy>(library: &Library, symbol: &'static str) -> Result<F, WebViewError> {
    library
        .get::<F>(symbol.as_bytes())
        .map(|sym| *sym)
        .map_err(|source| WebViewError::SymbolMissing { symbol, source })
}

/// Maps a `webview_error_t` to a result.
pub fn check(operation: &'static str, code: webview_error_t) -> Result<(), WebViewError> {
    if code == WEBVIEW_ERROR_OK {
        Ok(())
    } else {
        Err(WebViewError::Native { operation, code })
    }
}

/// Every library extracted for this process, in load order, plus the webview
/// symbol table.
pub struct NativeLibrary {
    _libraries: Vec<Library>,
    pub api: WebviewApi,
}

impl NativeLibrary {
    /// Resolves the webview API from the last library; earlier ones are
    /// dependencies kept loaded alongside it.
    pub fn new(libraries: Vec<Library>) -> Result<Self, WebViewError> {
        let last = libraries.last().ok_or_else(|| {
            WebViewError::UnsupportedPlatform("no native libraries to load".to_string())
        })?;
        // SAFETY: the bundled library is built from the webview C API.
        let api = unsafe { WebviewApi::load(last)? };
        Ok(Self {
            _libraries: libraries,
            api,
        })
    }

    /// Wraps an already-resolved table; used when the API is linked statically
    /// or stubbed.
    pub fn from_api(api: WebviewApi) -> Self {
        Self {
            _libraries: Vec::new(),
            api,
        }
    }
}
