//! Dynamic loading of workload units
//!
//! A workload's entry point is a shared object exporting the C ABI symbol
//!
//! ```c
//! int handler(const char *input_json, char **output);
//! ```
//!
//! A zero return means `*output` holds the JSON encoding of the return value.
//! Any other return is a fault and `*output`, when set, holds its message.
//! `*output` must be allocated with `malloc`; the loader releases it.
//!
//! Every invocation loads the unit afresh and unloads it afterwards, so each
//! traced pass sees the full load cost and starts from clean static state.
//! A handler must not leave threads running once it returns.

use serde_json::Value;
use std::ffi::{c_char, c_int, c_void, CStr, CString};
use std::os::unix::ffi::OsStrExt;
use std::path::Path;
use thiserror::Error;

use crate::registry::InputPayload;

/// Symbol every workload unit must export
pub const HANDLER_SYMBOL: &[u8] = b"handler\0";

type HandlerFn = unsafe extern "C" fn(*const c_char, *mut *mut c_char) -> c_int;

/// A failure to load or run a workload's handler
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct WorkloadFault(pub String);

/// Loads code from a path and invokes its `handler` entry point
pub trait Loader {
    fn load_and_invoke(&self, code_path: &Path, input: &InputPayload)
        -> Result<Value, WorkloadFault>;
}

/// Loader for native shared objects via `dlopen`
#[derive(Debug, Default, Clone, Copy)]
pub struct DylibLoader;

impl Loader for DylibLoader {
    fn load_and_invoke(
        &self,
        code_path: &Path,
        input: &InputPayload,
    ) -> Result<Value, WorkloadFault> {
        let library = Library::open(code_path)?;
        let handler = library.handler()?;
        tracing::debug!(path = %code_path.display(), "invoking workload handler");
        invoke(handler, input)
    }
}

/// An open `dlopen` handle, closed on drop
struct Library {
    handle: *mut c_void,
}

impl Library {
    fn open(path: &Path) -> Result<Self, WorkloadFault> {
        let c_path = CString::new(path.as_os_str().as_bytes())
            .map_err(|_| WorkloadFault(format!("invalid code path: {}", path.display())))?;

        let flags = libc::RTLD_NOW | libc::RTLD_LOCAL;
        let handle = unsafe { libc::dlopen(c_path.as_ptr(), flags) };
        if handle.is_null() {
            return Err(WorkloadFault(format!(
                "failed to load {}: {}",
                path.display(),
                last_dl_error()
            )));
        }

        Ok(Self { handle })
    }

    fn handler(&self) -> Result<HandlerFn, WorkloadFault> {
        let symbol = unsafe { libc::dlsym(self.handle, HANDLER_SYMBOL.as_ptr().cast()) };
        if symbol.is_null() {
            return Err(WorkloadFault(format!(
                "missing handler entry point: {}",
                last_dl_error()
            )));
        }

        // SAFETY: the workload ABI fixes the handler signature
        Ok(unsafe { std::mem::transmute::<*mut c_void, HandlerFn>(symbol) })
    }
}

impl Drop for Library {
    fn drop(&mut self) {
        unsafe {
            libc::dlclose(self.handle);
        }
    }
}

fn last_dl_error() -> String {
    let message = unsafe { libc::dlerror() };
    if message.is_null() {
        "unknown dynamic loader error".to_string()
    } else {
        unsafe { CStr::from_ptr(message) }
            .to_string_lossy()
            .into_owned()
    }
}

fn invoke(handler: HandlerFn, input: &InputPayload) -> Result<Value, WorkloadFault> {
    let input_json = CString::new(input.to_string())
        .map_err(|_| WorkloadFault("input payload contains a NUL byte".to_string()))?;

    let mut output: *mut c_char = std::ptr::null_mut();
    let status = unsafe { handler(input_json.as_ptr(), &mut output) };
    let text = take_output(output);

    if status != 0 {
        return Err(WorkloadFault(
            text.unwrap_or_else(|| format!("handler failed with status {}", status)),
        ));
    }

    let text = text.ok_or_else(|| WorkloadFault("handler returned no output".to_string()))?;
    serde_json::from_str(&text)
        .map_err(|e| WorkloadFault(format!("handler returned invalid JSON: {}", e)))
}

/// Copy out and free a handler-allocated string
fn take_output(output: *mut c_char) -> Option<String> {
    if output.is_null() {
        return None;
    }
    let text = unsafe { CStr::from_ptr(output) }
        .to_string_lossy()
        .into_owned();
    unsafe { libc::free(output.cast()) };
    Some(text)
}
