//! Embeds the operating system's webview in an application.
//!
//! The library detects the host platform, extracts the matching bundled
//! native webview library, loads it, and wraps the handle in a [`Webview`]
//! whose bound functions are callable from page scripts. The id-based
//! functions at the crate root expose the same facade through UniFFI for use
//! from Kotlin/Swift.

mod error;
pub mod escape;
pub mod natives;
pub mod platform;
pub mod settings;
mod state;
pub mod sys;
pub mod webview;

#[cfg(test)]
mod testing;

pub use error::WebViewError;
pub use escape::{force_safe_chars, json_escape};
pub use platform::PlatformDescriptor;
pub use webview::{BindResult, SizeHint, WeakWebview, Webview, WebviewRemote, WebviewState};

use state::{get_remote, register, unregister, with_webview};

/// Failure reported by a foreign bound callback.
#[derive(Debug, thiserror::Error, uniffi::Error)]
pub enum CallbackError {
    #[error("{reason}")]
    Failed { reason: String },
}

impl From<uniffi::UnexpectedUniFFICallbackError> for CallbackError {
    fn from(err: uniffi::UnexpectedUniFFICallbackError) -> Self {
        CallbackError::Failed { reason: err.reason }
    }
}

/// A foreign function exposed to page scripts.
///
/// Receives the call arguments as a JSON array and answers with JSON, or
/// `None` for `null`.
#[uniffi::export(callback_interface)]
pub trait BindCallback: Send + Sync {
    fn invoke(&self, request: String) -> Result<Option<String>, CallbackError>;
}

// ============================================================================
// WebView Creation
// ============================================================================

/// Creates a webview owned by the calling thread, which must also call [`run`].
#[uniffi::export]
pub fn create_webview(debug: bool, width: i32, height: i32) -> Result<u64, WebViewError> {
    let webview = Webview::with_size(debug, width, height)?;
    let id = register(webview)?;
    tracing::debug!(id, "create_webview success");
    Ok(id)
}

// ============================================================================
// Window
// ============================================================================

#[uniffi::export]
pub fn set_title(id: u64, title: String) -> Result<(), WebViewError> {
    with_webview(id, |webview| webview.set_title(&title))
}

#[uniffi::export]
pub fn set_size(id: u64, width: i32, height: i32, hint: SizeHint) -> Result<(), WebViewError> {
    with_webview(id, |webview| webview.set_size_hint(width, height, hint))
}

// ============================================================================
// Content
// ============================================================================

#[uniffi::export]
pub fn load_url(id: u64, url: Option<String>) -> Result<(), WebViewError> {
    with_webview(id, |webview| webview.load_url(url.as_deref()))
}

#[uniffi::export]
pub fn set_html(id: u64, html: String) -> Result<(), WebViewError> {
    with_webview(id, |webview| webview.set_html(&html))
}

#[uniffi::export]
pub fn set_init_script(id: u64, script: String, allow_nested: bool) -> Result<(), WebViewError> {
    with_webview(id, |webview| webview.set_init_script(&script, allow_nested))
}

/// Queues `script` on the webview's UI thread. Callable from any thread.
#[uniffi::export]
pub fn eval(id: u64, script: String) -> Result<(), WebViewError> {
    get_remote(id)?.eval(&script)
}

// ============================================================================
// Bindings
// ============================================================================

#[uniffi::export]
pub fn bind(id: u64, name: String, callback: Box<dyn BindCallback>) -> Result<(), WebViewError> {
    with_webview(id, move |webview| {
        webview.bind(&name, move |request| {
            callback
                .invoke(request.to_string())
                .map_err(|err| Box::new(err) as webview::BindError)
        })
    })
}

#[uniffi::export]
pub fn unbind(id: u64, name: String) -> Result<(), WebViewError> {
    with_webview(id, |webview| webview.unbind(&name))
}

// ============================================================================
// Event Loop
// ============================================================================

/// Blocks in the event loop until the window closes or [`terminate`] is called.
/// Bound callbacks may call back into the other functions while it runs.
#[uniffi::export]
pub fn run(id: u64) -> Result<(), WebViewError> {
    with_webview(id, |webview| webview.run())
}

/// Stops the event loop. Callable from any thread.
#[uniffi::export]
pub fn terminate(id: u64) -> Result<(), WebViewError> {
    get_remote(id)?.terminate()
}

// ============================================================================
// Destruction
// ============================================================================

#[uniffi::export]
pub fn destroy_webview(id: u64) -> Result<(), WebViewError> {
    tracing::debug!(id, "destroy_webview");
    unregister(id)
}

// ============================================================================
// Platform
// ============================================================================

/// Target triple component of the host, e.g. `x86_64` or `aarch64`.
#[uniffi::export]
pub fn host_arch_target() -> Result<String, WebViewError> {
    Ok(platform::current()?.arch_target.to_string())
}

/// Library file name for `base_name` on the host, e.g. `libwebview.so`.
#[uniffi::export]
pub fn library_file_name(base_name: String) -> Result<String, WebViewError> {
    Ok(platform::current()?.format_library(&base_name))
}

uniffi::setup_scaffolding!();

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{self, Call};

    fn register_fake() -> u64 {
        let webview = Webview::with_library(testing::library(), false, 800, 600).unwrap();
        testing::take_calls();
        state::register(webview).unwrap()
    }

    struct Shout;

    impl BindCallback for Shout {
        fn invoke(&self, request: String) -> Result<Option<String>, CallbackError> {
            Ok(Some(request.to_uppercase()))
        }
    }

    struct Refuse;

    impl BindCallback for Refuse {
        fn invoke(&self, _request: String) -> Result<Option<String>, CallbackError> {
            Err(CallbackError::Failed {
                reason: "not today".to_string(),
            })
        }
    }

    #[test]
    fn bound_callback_answers_page() {
        let id = register_fake();
        bind(id, "shout".to_string(), Box::new(Shout)).unwrap();
        bind(id, "refuse".to_string(), Box::new(Refuse)).unwrap();
        testing::take_calls();

        assert!(testing::invoke("shout", "1", "[\"hey\"]"));
        assert!(testing::invoke("refuse", "2", "[]"));
        let calls = testing::take_calls();
        assert_eq!(
            calls[0],
            Call::Return {
                seq: "1".to_string(),
                status: sys::WEBVIEW_ERROR_OK,
                response: "[\"HEY\"]".to_string(),
            }
        );
        let Call::Return {
            status, response, ..
        } = &calls[1]
        else {
            panic!("unexpected call: {:?}", calls[1]);
        };
        assert_eq!(*status, sys::WEBVIEW_ERROR_UNSPECIFIED);
        let decoded: String = serde_json::from_str(response).unwrap();
        assert!(decoded.starts_with("not today"));

        unbind(id, "shout".to_string()).unwrap();
        assert!(!testing::invoke("shout", "3", "[]"));
        destroy_webview(id).unwrap();
    }

    #[test]
    fn eval_and_terminate_go_through_remote() {
        let id = register_fake();
        eval(id, "window.ready = true".to_string()).unwrap();
        terminate(id).unwrap();
        assert_eq!(testing::take_calls(), vec![Call::Terminate]);

        assert_eq!(testing::drain(), 1);
        assert_eq!(
            testing::take_calls(),
            vec![Call::Eval(webview::eval_source("window.ready = true"))]
        );
        destroy_webview(id).unwrap();
    }

    #[test]
    fn callback_can_drive_running_webview() {
        let id = register_fake();
        get_remote(id)
            .unwrap()
            .dispatch(move || {
                let _ = set_html(id, "<p>loaded</p>".to_string());
                let _ = set_size(id, 320, 240, SizeHint::Min);
            })
            .unwrap();

        run(id).unwrap();
        assert_eq!(
            testing::take_calls(),
            vec![
                Call::Run,
                Call::SetHtml("<p>loaded</p>".to_string()),
                Call::SetSize(320, 240, sys::WEBVIEW_HINT_MIN),
                Call::Destroy,
            ]
        );
        assert!(matches!(
            set_title(id, "late".to_string()),
            Err(WebViewError::InvalidState(_))
        ));
        destroy_webview(id).unwrap();
    }

    #[test]
    fn destroyed_ids_are_forgotten() {
        let id = register_fake();
        destroy_webview(id).unwrap();
        assert_eq!(testing::take_calls(), vec![Call::Terminate, Call::Destroy]);

        assert!(matches!(
            set_title(id, "gone".to_string()),
            Err(WebViewError::WebViewNotFound(_))
        ));
        assert!(matches!(
            eval(id, "1".to_string()),
            Err(WebViewError::WebViewNotFound(_))
        ));
        assert!(matches!(terminate(id), Err(WebViewError::WebViewNotFound(_))));
    }
}
