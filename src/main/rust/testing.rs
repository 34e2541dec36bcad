//! In-process stand-in for the native webview library.
//!
//! Every call is recorded per thread. Dispatched tasks queue up and run when
//! the fake event loop starts, like the real library.

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::ffi::{c_char, c_int, c_void, CStr, CString};
use std::ptr::NonNull;
use std::sync::OnceLock;

use crate::sys::*;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Create { debug: bool },
    Destroy,
    Run,
    Terminate,
    SetTitle(String),
    SetSize(i32, i32, webview_hint_t),
    Navigate(String),
    SetHtml(String),
    Init(String),
    Eval(String),
    Bind(String),
    Unbind(String),
    Return {
        seq: String,
        status: i32,
        response: String,
    },
}

thread_local! {
    static CALLS: RefCell<Vec<Call>> = const { RefCell::new(Vec::new()) };
    static BINDINGS: RefCell<HashMap<String, (webview_bind_fn, usize)>> =
        RefCell::new(HashMap::new());
    static QUEUE: RefCell<VecDeque<(webview_dispatch_fn, usize)>> =
        const { RefCell::new(VecDeque::new()) };
}

fn record(call: Call) {
    CALLS.with(|calls| calls.borrow_mut().push(call));
}

unsafe fn text(ptr: *const c_char) -> String {
    CStr::from_ptr(ptr).to_string_lossy().into_owned()
}

/// Calls recorded on this thread, clearing the log.
pub fn take_calls() -> Vec<Call> {
    CALLS.with(|calls| std::mem::take(&mut *calls.borrow_mut()))
}

/// Simulates a page calling the bound function `name`. Returns `false` when
/// the name is unknown to the native side.
pub fn invoke(name: &str, seq: &str, request: &str) -> bool {
    let Some((upcall, arg)) = BINDINGS.with(|b| b.borrow().get(name).copied()) else {
        return false;
    };
    let seq = CString::new(seq).unwrap();
    let request = CString::new(request).unwrap();
    unsafe { upcall(seq.as_ptr(), request.as_ptr(), arg as *mut c_void) };
    true
}

/// Runs queued dispatch tasks, returning how many ran.
pub fn drain() -> usize {
    let mut ran = 0;
    while let Some((task, arg)) = QUEUE.with(|q| q.borrow_mut().pop_front()) {
        unsafe { task(fake_handle(), arg as *mut c_void) };
        ran += 1;
    }
    ran
}

fn fake_handle() -> webview_t {
    NonNull::<u8>::dangling().as_ptr().cast()
}

unsafe extern "C" fn create(debug: c_int, _window: *mut c_void) -> webview_t {
    record(Call::Create { debug: debug != 0 });
    fake_handle()
}

unsafe extern "C" fn destroy(_w: webview_t) -> webview_error_t {
    BINDINGS.with(|b| b.borrow_mut().clear());
    record(Call::Destroy);
    WEBVIEW_ERROR_OK
}

unsafe extern "C" fn run(_w: webview_t) -> webview_error_t {
    record(Call::Run);
    drain();
    WEBVIEW_ERROR_OK
}

unsafe extern "C" fn terminate(_w: webview_t) -> webview_error_t {
    record(Call::Terminate);
    WEBVIEW_ERROR_OK
}

unsafe extern "C" fn dispatch(
    _w: webview_t,
    task: webview_dispatch_fn,
    arg: *mut c_void,
) -> webview_error_t {
    QUEUE.with(|q| q.borrow_mut().push_back((task, arg as usize)));
    WEBVIEW_ERROR_OK
}

unsafe extern "C" fn set_title(_w: webview_t, title: *const c_char) -> webview_error_t {
    record(Call::SetTitle(text(title)));
    WEBVIEW_ERROR_OK
}

unsafe extern "C" fn set_size(
    _w: webview_t,
    width: c_int,
    height: c_int,
    hint: webview_hint_t,
) -> webview_error_t {
    record(Call::SetSize(width, height, hint));
    WEBVIEW_ERROR_OK
}

unsafe extern "C" fn navigate(_w: webview_t, url: *const c_char) -> webview_error_t {
    record(Call::Navigate(text(url)));
    WEBVIEW_ERROR_OK
}

unsafe extern "C" fn set_html(_w: webview_t, html: *const c_char) -> webview_error_t {
    record(Call::SetHtml(text(html)));
    WEBVIEW_ERROR_OK
}

unsafe extern "C" fn init(_w: webview_t, js: *const c_char) -> webview_error_t {
    record(Call::Init(text(js)));
    WEBVIEW_ERROR_OK
}

unsafe extern "C" fn eval(_w: webview_t, js: *const c_char) -> webview_error_t {
    record(Call::Eval(text(js)));
    WEBVIEW_ERROR_OK
}

unsafe extern "C" fn bind(
    _w: webview_t,
    name: *const c_char,
    upcall: webview_bind_fn,
    arg: *mut c_void,
) -> webview_error_t {
    let name = text(name);
    let inserted = BINDINGS.with(|b| {
        let mut b = b.borrow_mut();
        if b.contains_key(&name) {
            return false;
        }
        b.insert(name.clone(), (upcall, arg as usize));
        true
    });
    if !inserted {
        return WEBVIEW_ERROR_DUPLICATE;
    }
    record(Call::Bind(name));
    WEBVIEW_ERROR_OK
}

unsafe extern "C" fn unbind(_w: webview_t, name: *const c_char) -> webview_error_t {
    let name = text(name);
    if BINDINGS.with(|b| b.borrow_mut().remove(&name)).is_none() {
        return WEBVIEW_ERROR_NOT_FOUND;
    }
    record(Call::Unbind(name));
    WEBVIEW_ERROR_OK
}

unsafe extern "C" fn webview_return(
    _w: webview_t,
    seq: *const c_char,
    status: c_int,
    response: *const c_char,
) -> webview_error_t {
    record(Call::Return {
        seq: text(seq),
        status,
        response: text(response),
    });
    WEBVIEW_ERROR_OK
}

/// A library whose symbol table points at the recording fakes above.
pub fn library() -> &'static NativeLibrary {
    static FAKE: OnceLock<NativeLibrary> = OnceLock::new();
    FAKE.get_or_init(|| {
        NativeLibrary::from_api(WebviewApi {
            webview_create: create,
            webview_destroy: destroy,
            webview_run: run,
            webview_terminate: terminate,
            webview_dispatch: dispatch,
            webview_set_title: set_title,
            webview_set_size: set_size,
            webview_navigate: navigate,
            webview_set_html: set_html,
            webview_init: init,
            webview_eval: eval,
            webview_bind: bind,
            webview_unbind: unbind,
            webview_return,
        })
    })
}
