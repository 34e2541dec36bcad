//! The webview facade.
//!
//! A [`Webview`] owns one native handle and must stay on the thread that
//! created it, which is also the thread that runs its event loop. The type is
//! `!Send` to enforce that. Its methods take `&self`, so dispatched tasks and
//! bound handlers can keep driving it while the event loop runs.
//! [`WebviewRemote`] is the `Send + Sync` side door for the few operations the
//! native library allows from other threads.

use std::any::Any;
use std::backtrace::Backtrace;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::error::Error;
use std::ffi::{c_char, c_int, c_void, CStr, CString};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::ptr;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::thread::JoinHandle;

use crate::error::WebViewError;
use crate::escape::{error_stack, force_safe_chars, json_escape};
use crate::natives;
use crate::sys::{self, check, webview_t, NativeLibrary, WebviewApi};

pub const DEFAULT_WIDTH: i32 = 800;
pub const DEFAULT_HEIGHT: i32 = 600;

/// How a size update constrains the window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, uniffi::Enum)]
pub enum SizeHint {
    None,
    Min,
    Max,
    Fixed,
}

impl SizeHint {
    fn raw(self) -> sys::webview_hint_t {
        match self {
            SizeHint::None => sys::WEBVIEW_HINT_NONE,
            SizeHint::Min => sys::WEBVIEW_HINT_MIN,
            SizeHint::Max => sys::WEBVIEW_HINT_MAX,
            SizeHint::Fixed => sys::WEBVIEW_HINT_FIXED,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebviewState {
    Created,
    Running,
    Terminated,
}

pub type BindError = Box<dyn Error + Send + Sync>;

/// A bound handler's outcome: a JSON response (`None` is `null`) or an error
/// that rejects the page-side promise.
pub type BindResult = Result<Option<String>, BindError>;

/// Script run at page load, only in the top frame unless `allow_nested`.
/// Errors are logged to the page console with the failing source.
pub fn init_script_source(script: &str, allow_nested: bool) -> String {
    format!(
        "(() => {{\n\
         \x20 try {{\n\
         \x20   if (window.top == window.self || {allow_nested}) {{\n\
         \x20     {script}\n\
         \x20   }}\n\
         \x20 }} catch (e) {{\n\
         \x20   console.error('[Webview]', 'An error occurred whilst evaluating init script:', \"{source}\", e);\n\
         \x20 }}\n\
         }})();\n",
        source = json_escape(script),
    )
}

/// `script` wrapped so a throw is logged to the page console with its source.
pub fn eval_source(script: &str) -> String {
    format!(
        "try {{\n\
         \x20 {script}\n\
         }} catch (e) {{\n\
         \x20 console.error('[Webview]', 'An error occurred whilst evaluating script:', \"{source}\", e);\n\
         }}\n",
        source = json_escape(script),
    )
}

fn marshal(what: &'static str, value: &str) -> Result<CString, WebViewError> {
    CString::new(value).map_err(|_| WebViewError::InteriorNul(what))
}

// ============================================================================
// Dispatch
// ============================================================================

unsafe extern "C" fn run_task<F: FnOnce(webview_t)>(w: webview_t, arg: *mut c_void) {
    let task = Box::from_raw(arg as *mut F);
    if catch_unwind(AssertUnwindSafe(move || task(w))).is_err() {
        tracing::error!("dispatched task panicked");
    }
}

#[derive(Clone, Copy)]
struct HandlePtr(webview_t);

// The handle is only passed to the native functions documented as callable
// from any thread (dispatch, terminate); everything else runs on the UI thread.
unsafe impl Send for HandlePtr {}

struct RemoteInner {
    api: &'static WebviewApi,
    handle: Mutex<Option<HandlePtr>>,
}

/// Thread-safe handle to a webview's event loop.
///
/// Once the webview is destroyed every operation fails with
/// [`WebViewError::InvalidState`].
#[derive(Clone)]
pub struct WebviewRemote {
    inner: Arc<RemoteInner>,
}

impl WebviewRemote {
    fn new(api: &'static WebviewApi, handle: webview_t) -> Self {
        Self {
            inner: Arc::new(RemoteInner {
                api,
                handle: Mutex::new(Some(HandlePtr(handle))),
            }),
        }
    }

    fn with_handle<R>(
        &self,
        f: impl FnOnce(webview_t) -> Result<R, WebViewError>,
    ) -> Result<R, WebViewError> {
        let guard = self
            .inner
            .handle
            .lock()
            .map_err(|_| WebViewError::Internal("remote handle lock poisoned".to_string()))?;
        match *guard {
            Some(HandlePtr(handle)) => f(handle),
            None => Err(WebViewError::terminated()),
        }
    }

    fn invalidate(&self) {
        if let Ok(mut guard) = self.inner.handle.lock() {
            *guard = None;
        }
    }

    pub fn is_alive(&self) -> bool {
        self.inner
            .handle
            .lock()
            .map(|guard| guard.is_some())
            .unwrap_or(false)
    }

    fn schedule<F>(&self, task: F) -> Result<(), WebViewError>
    where
        F: FnOnce(webview_t) + Send + 'static,
    {
        // SAFETY: `F: Send`, so it may run on whichever thread owns the loop.
        unsafe { self.schedule_unchecked(task) }
    }

    /// Queues `task` on the UI thread without requiring it to be `Send`.
    ///
    /// # Safety
    ///
    /// The caller must be on the UI thread of this webview.
    unsafe fn schedule_unchecked<F>(&self, task: F) -> Result<(), WebViewError>
    where
        F: FnOnce(webview_t) + 'static,
    {
        let api = self.inner.api;
        self.with_handle(|handle| {
            let arg = Box::into_raw(Box::new(task));
            // SAFETY: `run_task::<F>` takes back ownership of `arg` exactly once.
            let code = unsafe { (api.webview_dispatch)(handle, run_task::<F>, arg.cast()) };
            if code != sys::WEBVIEW_ERROR_OK {
                // SAFETY: the native side refused the task and never saw `arg`.
                drop(unsafe { Box::from_raw(arg) });
            }
            check("webview_dispatch", code)
        })
    }

    /// Runs `f` on the UI thread during a later event-loop iteration.
    pub fn dispatch(&self, f: impl FnOnce() + Send + 'static) -> Result<(), WebViewError> {
        self.schedule(move |_: webview_t| f())
    }

    /// Evaluates `script` on the UI thread. A throw is logged to the page
    /// console and does not propagate.
    pub fn eval(&self, script: &str) -> Result<(), WebViewError> {
        tracing::debug!(script, "eval");
        let source = marshal("script", &eval_source(script))?;
        let api = self.inner.api;
        self.schedule(move |handle: webview_t| {
            // SAFETY: dispatched tasks run on the UI thread with a live handle.
            let code = unsafe { (api.webview_eval)(handle, source.as_ptr()) };
            if let Err(err) = check("webview_eval", code) {
                tracing::warn!(%err, "eval failed");
            }
        })
    }

    /// Asks the event loop to stop; `run` returns once it has.
    pub fn terminate(&self) -> Result<(), WebViewError> {
        tracing::debug!("terminate");
        let api = self.inner.api;
        self.with_handle(|handle| {
            // SAFETY: terminate is safe to call from any thread.
            check("webview_terminate", unsafe { (api.webview_terminate)(handle) })
        })
    }
}

// ============================================================================
// Bindings
// ============================================================================

struct Binding {
    name: String,
    owner: Weak<Shared>,
    handler: Box<dyn Fn(&str) -> BindResult>,
}

impl Binding {
    /// Runs the handler and produces the status and JSON payload to return.
    fn invoke(&self, request: &str) -> (c_int, String) {
        let request = force_safe_chars(request);
        let outcome = catch_unwind(AssertUnwindSafe(|| (self.handler)(&request)));
        let stack = match outcome {
            Ok(Ok(response)) => {
                let response = response.as_deref().unwrap_or("null");
                return (sys::WEBVIEW_ERROR_OK, force_safe_chars(response));
            }
            Ok(Err(err)) => error_stack(&*err),
            Err(panic) => panic_stack(&*panic),
        };
        tracing::warn!(binding = %self.name, %stack, "bound handler failed");
        (
            sys::WEBVIEW_ERROR_UNSPECIFIED,
            format!("\"{}\"", json_escape(&stack)),
        )
    }
}

fn panic_stack(panic: &(dyn Any + Send)) -> String {
    let message = panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "bound handler panicked".to_string());
    let stack = format!("{message}\n{}", Backtrace::force_capture());
    stack.replace('\r', "").trim_end().to_string()
}

unsafe extern "C" fn bind_upcall(seq: *const c_char, req: *const c_char, arg: *mut c_void) {
    // Hold our own reference so the handler may unbind itself.
    let arg = arg as *const Binding;
    Rc::increment_strong_count(arg);
    let binding = Rc::from_raw(arg);

    let request = if req.is_null() {
        "[]".into()
    } else {
        CStr::from_ptr(req).to_string_lossy()
    };

    let (status, response) = binding.invoke(&request);
    // Both escapers remove NUL, so this only falls back on a broken invariant.
    let response = CString::new(response).unwrap_or_else(|_| c"null".to_owned());

    let Some(owner) = binding.owner.upgrade() else {
        tracing::warn!(binding = %binding.name, "webview dropped before bound call returned");
        return;
    };
    let Ok(handle) = owner.live() else {
        tracing::warn!(binding = %binding.name, "webview destroyed before bound call returned");
        return;
    };
    let code = (owner.api.webview_return)(handle, seq, status, response.as_ptr());
    if let Err(err) = check("webview_return", code) {
        tracing::warn!(binding = %binding.name, %err, "failed to return bound call");
    }
}

// ============================================================================
// Webview
// ============================================================================

struct Shared {
    api: &'static WebviewApi,
    handle: Cell<webview_t>,
    state: Cell<WebviewState>,
    bindings: RefCell<HashMap<String, Rc<Binding>>>,
    remote: WebviewRemote,
}

impl Shared {
    fn live(&self) -> Result<webview_t, WebViewError> {
        let handle = self.handle.get();
        if self.state.get() == WebviewState::Terminated || handle.is_null() {
            return Err(WebViewError::terminated());
        }
        Ok(handle)
    }

    fn destroy(&self) {
        let handle = self.handle.replace(ptr::null_mut());
        if !handle.is_null() {
            self.remote.invalidate();
            let code = unsafe { (self.api.webview_destroy)(handle) };
            if let Err(err) = check("webview_destroy", code) {
                tracing::warn!(%err, "destroy failed");
            }
        }
        self.state.set(WebviewState::Terminated);
        // Upcall contexts must outlive the native handle. Handlers are dropped
        // outside the borrow since they may own the webview.
        let bindings = std::mem::take(&mut *self.bindings.borrow_mut());
        drop(bindings);
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        self.destroy();
    }
}

/// A native webview window.
pub struct Webview {
    shared: Rc<Shared>,
}

/// Non-owning reference to a [`Webview`], for handlers that need to reach
/// the webview they are bound to.
#[derive(Clone)]
pub struct WeakWebview {
    shared: Weak<Shared>,
}

impl WeakWebview {
    /// The webview, unless it has been dropped.
    pub fn upgrade(&self) -> Option<Webview> {
        self.shared.upgrade().map(|shared| Webview { shared })
    }
}

impl Webview {
    /// Creates an 800x600 webview, loading the natives on first use.
    /// `debug` enables the developer tools.
    pub fn new(debug: bool) -> Result<Self, WebViewError> {
        Self::with_size(debug, DEFAULT_WIDTH, DEFAULT_HEIGHT)
    }

    pub fn with_size(debug: bool, width: i32, height: i32) -> Result<Self, WebViewError> {
        Self::with_library(natives::load()?, debug, width, height)
    }

    /// Creates a webview from an already-loaded library, navigated to
    /// `about:blank` and sized to `width` x `height`.
    pub fn with_library(
        library: &'static NativeLibrary,
        debug: bool,
        width: i32,
        height: i32,
    ) -> Result<Self, WebViewError> {
        let dev_tools = debug;
        tracing::debug!(dev_tools, width, height, "create webview");
        let api = &library.api;
        // SAFETY: a null window asks the library to create its own.
        let handle = unsafe { (api.webview_create)(c_int::from(dev_tools), ptr::null_mut()) };
        if handle.is_null() {
            return Err(WebViewError::CreateFailed);
        }

        let webview = Self {
            shared: Rc::new(Shared {
                api,
                handle: Cell::new(handle),
                state: Cell::new(WebviewState::Created),
                bindings: RefCell::new(HashMap::new()),
                remote: WebviewRemote::new(api, handle),
            }),
        };
        webview.load_url(None)?;
        webview.set_size(width, height)?;
        Ok(webview)
    }

    /// Another owner of the same native webview, for the registry.
    pub(crate) fn share(&self) -> Webview {
        Webview {
            shared: Rc::clone(&self.shared),
        }
    }

    pub fn downgrade(&self) -> WeakWebview {
        WeakWebview {
            shared: Rc::downgrade(&self.shared),
        }
    }

    pub fn state(&self) -> WebviewState {
        self.shared.state.get()
    }

    pub fn remote(&self) -> WebviewRemote {
        self.shared.remote.clone()
    }

    fn api(&self) -> &'static WebviewApi {
        self.shared.api
    }

    fn live(&self) -> Result<webview_t, WebViewError> {
        self.shared.live()
    }

    pub fn set_title(&self, title: &str) -> Result<(), WebViewError> {
        tracing::debug!(title, "set_title");
        let handle = self.live()?;
        let title = marshal("title", title)?;
        check("webview_set_title", unsafe {
            (self.api().webview_set_title)(handle, title.as_ptr())
        })
    }

    /// Navigates to `url`, or `about:blank` for `None`.
    pub fn load_url(&self, url: Option<&str>) -> Result<(), WebViewError> {
        let url = url.unwrap_or("about:blank");
        tracing::debug!(url, "load_url");
        let handle = self.live()?;
        let url = marshal("url", url)?;
        check("webview_navigate", unsafe {
            (self.api().webview_navigate)(handle, url.as_ptr())
        })
    }

    /// Replaces the document. Renders once the event loop runs.
    pub fn set_html(&self, html: &str) -> Result<(), WebViewError> {
        tracing::debug!(len = html.len(), "set_html");
        let handle = self.live()?;
        let html = marshal("html", html)?;
        check("webview_set_html", unsafe {
            (self.api().webview_set_html)(handle, html.as_ptr())
        })
    }

    pub fn set_size_hint(&self, width: i32, height: i32, hint: SizeHint) -> Result<(), WebViewError> {
        tracing::debug!(width, height, ?hint, "set_size");
        let handle = self.live()?;
        check("webview_set_size", unsafe {
            (self.api().webview_set_size)(handle, width, height, hint.raw())
        })
    }

    pub fn set_size(&self, width: i32, height: i32) -> Result<(), WebViewError> {
        self.set_size_hint(width, height, SizeHint::None)
    }

    pub fn set_min_size(&self, width: i32, height: i32) -> Result<(), WebViewError> {
        self.set_size_hint(width, height, SizeHint::Min)
    }

    pub fn set_max_size(&self, width: i32, height: i32) -> Result<(), WebViewError> {
        self.set_size_hint(width, height, SizeHint::Max)
    }

    pub fn set_fixed_size(&self, width: i32, height: i32) -> Result<(), WebViewError> {
        self.set_size_hint(width, height, SizeHint::Fixed)
    }

    /// Installs `script` to run on every page load. Nested frames are skipped
    /// unless `allow_nested` is set.
    pub fn set_init_script(&self, script: &str, allow_nested: bool) -> Result<(), WebViewError> {
        tracing::debug!(allow_nested, "set_init_script");
        let handle = self.live()?;
        let source = marshal("script", &init_script_source(script, allow_nested))?;
        check("webview_init", unsafe {
            (self.api().webview_init)(handle, source.as_ptr())
        })
    }

    /// Queues `script` for evaluation on the UI thread.
    pub fn eval(&self, script: &str) -> Result<(), WebViewError> {
        self.live()?;
        self.shared.remote.eval(script)
    }

    /// Queues `f` to run on the UI thread with this webview. Tasks still
    /// queued when the webview is destroyed are dropped without running.
    pub fn dispatch(&self, f: impl FnOnce(&Webview) + 'static) -> Result<(), WebViewError> {
        self.live()?;
        let owner = Rc::downgrade(&self.shared);
        let task = move |_: webview_t| {
            let Some(shared) = owner.upgrade() else {
                return;
            };
            if shared.live().is_ok() {
                f(&Webview { shared });
            }
        };
        // SAFETY: `Webview` is `!Send`, so this thread is its UI thread.
        unsafe { self.shared.remote.schedule_unchecked(task) }
    }

    /// Exposes `handler` to page scripts as `window[name]`, returning a
    /// promise.
    ///
    /// The handler receives the call arguments as a JSON array and answers
    /// with JSON. An `Err` or a panic rejects the promise with the rendered
    /// error stack. Use [`Webview::downgrade`] to reach the webview from
    /// inside the handler.
    pub fn bind<F>(&self, name: &str, handler: F) -> Result<(), WebViewError>
    where
        F: Fn(&str) -> BindResult + 'static,
    {
        tracing::debug!(name, "bind");
        let handle = self.live()?;
        if self.is_bound(name) {
            return Err(WebViewError::DuplicateBinding(name.to_string()));
        }
        let c_name = marshal("binding name", name)?;

        let binding = Rc::new(Binding {
            name: name.to_string(),
            owner: Rc::downgrade(&self.shared),
            handler: Box::new(handler),
        });
        let arg = Rc::as_ptr(&binding) as *mut c_void;

        // SAFETY: `binding` stays in `bindings` until after the native side
        // forgets it (unbind or destroy).
        let code = unsafe { (self.api().webview_bind)(handle, c_name.as_ptr(), bind_upcall, arg) };
        if code == sys::WEBVIEW_ERROR_DUPLICATE {
            return Err(WebViewError::DuplicateBinding(name.to_string()));
        }
        check("webview_bind", code)?;

        self.shared
            .bindings
            .borrow_mut()
            .insert(name.to_string(), binding);
        Ok(())
    }

    /// Removes a binding. Later page calls to `name` fail on the native side.
    pub fn unbind(&self, name: &str) -> Result<(), WebViewError> {
        tracing::debug!(name, "unbind");
        let handle = self.live()?;
        if !self.is_bound(name) {
            return Err(WebViewError::BindingNotFound(name.to_string()));
        }
        let c_name = marshal("binding name", name)?;
        let code = unsafe { (self.api().webview_unbind)(handle, c_name.as_ptr()) };
        let removed = self.shared.bindings.borrow_mut().remove(name);
        drop(removed);
        check("webview_unbind", code)
    }

    pub fn is_bound(&self, name: &str) -> bool {
        self.shared.bindings.borrow().contains_key(name)
    }

    /// Runs the event loop on this thread until the window closes or
    /// [`WebviewRemote::terminate`] is called, then destroys the webview.
    pub fn run(&self) -> Result<(), WebViewError> {
        let handle = self.live()?;
        if self.state() == WebviewState::Running {
            return Err(WebViewError::InvalidState(
                "event loop is already running".to_string(),
            ));
        }

        tracing::debug!("run");
        self.shared.state.set(WebviewState::Running);
        let code = unsafe { (self.api().webview_run)(handle) };
        self.shared.destroy();
        check("webview_run", code)
    }

    /// Runs a webview on a dedicated thread.
    ///
    /// The webview is created on that thread so it stays on its event loop
    /// thread, then `setup` configures it before the loop starts. Returns once
    /// the loop is about to start; join the handle to wait for the window to
    /// close.
    pub fn run_async<F>(
        debug: bool,
        width: i32,
        height: i32,
        setup: F,
    ) -> Result<(JoinHandle<Result<(), WebViewError>>, WebviewRemote), WebViewError>
    where
        F: FnOnce(&Webview) -> Result<(), WebViewError> + Send + 'static,
    {
        spawn_loop(move || Webview::with_size(debug, width, height), setup)
    }

    /// Stops the event loop and releases the native handle and bindings.
    ///
    /// Called while the loop runs, this only stops it and [`Webview::run`]
    /// releases the handle on its way out. Closing a terminated webview is a
    /// no-op.
    pub fn close(&self) -> Result<(), WebViewError> {
        let state = self.state();
        if state == WebviewState::Terminated {
            return Ok(());
        }
        tracing::debug!(?state, "close");
        let code = unsafe { (self.api().webview_terminate)(self.shared.handle.get()) };
        if let Err(err) = check("webview_terminate", code) {
            tracing::debug!(%err, "terminate before destroy");
        }
        if state == WebviewState::Created {
            self.shared.destroy();
        }
        Ok(())
    }
}

static RUN_THREADS: AtomicU64 = AtomicU64::new(1);

pub(crate) fn spawn_loop<C, F>(
    create: C,
    setup: F,
) -> Result<(JoinHandle<Result<(), WebViewError>>, WebviewRemote), WebViewError>
where
    C: FnOnce() -> Result<Webview, WebViewError> + Send + 'static,
    F: FnOnce(&Webview) -> Result<(), WebViewError> + Send + 'static,
{
    let (tx, rx) = mpsc::channel();
    let name = format!(
        "Webview RunAsync Thread - #{}",
        RUN_THREADS.fetch_add(1, Ordering::Relaxed)
    );

    let join = std::thread::Builder::new()
        .name(name)
        .spawn(move || {
            let webview = create()?;
            setup(&webview)?;
            let _ = tx.send(webview.remote());
            webview.run()
        })
        .map_err(|err| WebViewError::Internal(format!("failed to spawn run thread: {err}")))?;

    match rx.recv() {
        Ok(remote) => Ok((join, remote)),
        // The thread exited before starting the loop; surface its error.
        Err(_) => match join.join() {
            Ok(Err(err)) => Err(err),
            Ok(Ok(())) => Err(WebViewError::Internal(
                "run thread exited before starting".to_string(),
            )),
            Err(_) => Err(WebViewError::Internal("run thread panicked".to_string())),
        },
    }
}
