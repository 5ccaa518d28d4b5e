//! FFI bindings for the blink session engine
//!
//! This module provides C-compatible functions for driving the engine from a
//! host app (e.g. the camera client). All functions use C strings
//! (null-terminated) and return allocated memory that must be freed by the
//! caller using `blink_free_string`.
//!
//! Status codes returned by the submit functions:
//! - `0` accepted
//! - `1` unknown session
//! - `2` session closed
//! - `3` invalid measurement
//! - `4` session already active
//! - `-1` invalid argument (null handle or pointer)

use std::cell::RefCell;
use std::ffi::{CStr, CString};
use std::os::raw::{c_char, c_int};
use std::ptr;

use crate::config::EngineConfig;
use crate::error::BlinkError;
use crate::protocol::handle_line;
use crate::registry::SessionRegistry;
use crate::types::Sample;

// Thread-local storage for the last error message
thread_local! {
    static LAST_ERROR: RefCell<Option<CString>> = const { RefCell::new(None) };
}

fn set_last_error(msg: &str) {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = CString::new(msg).ok();
    });
}

fn clear_last_error() {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = None;
    });
}

/// Helper to convert C string to Rust string
unsafe fn cstr_to_string(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    CStr::from_ptr(ptr).to_str().ok().map(|s| s.to_string())
}

/// Helper to convert Rust string to C string (caller must free)
fn string_to_cstr(s: &str) -> *mut c_char {
    match CString::new(s) {
        Ok(cstr) => cstr.into_raw(),
        Err(_) => ptr::null_mut(),
    }
}

fn status_code(err: &BlinkError) -> c_int {
    match err {
        BlinkError::UnknownSession(_) => 1,
        BlinkError::SessionClosed(_) => 2,
        BlinkError::InvalidMeasurement(_) => 3,
        BlinkError::SessionAlreadyActive(_) => 4,
        BlinkError::InvalidConfig(_) | BlinkError::Json(_) => -1,
    }
}

/// Opaque handle to a SessionRegistry
pub struct BlinkRegistryHandle {
    registry: SessionRegistry,
}

/// Create a registry.
///
/// # Safety
/// - `config_json` may be NULL (defaults are used) or a valid null-terminated
///   C string holding an engine configuration.
/// - Returns a pointer that must be freed with `blink_registry_free`.
/// - Returns NULL on error; call `blink_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn blink_registry_new(config_json: *const c_char) -> *mut BlinkRegistryHandle {
    clear_last_error();

    let config = if config_json.is_null() {
        Ok(EngineConfig::default())
    } else {
        match cstr_to_string(config_json) {
            Some(json) => EngineConfig::from_json(&json),
            None => {
                set_last_error("Invalid config string pointer");
                return ptr::null_mut();
            }
        }
    };

    match config.and_then(SessionRegistry::new) {
        Ok(registry) => Box::into_raw(Box::new(BlinkRegistryHandle { registry })),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

/// Free a registry.
///
/// # Safety
/// - `handle` must be a pointer returned by `blink_registry_new`, or NULL.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn blink_registry_free(handle: *mut BlinkRegistryHandle) {
    if !handle.is_null() {
        drop(Box::from_raw(handle));
    }
}

/// Start a session and return its id.
///
/// # Safety
/// - `handle` must be a valid pointer returned by `blink_registry_new`.
/// - Returns a newly allocated string that must be freed with `blink_free_string`.
/// - Returns NULL on error; call `blink_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn blink_start_session(handle: *mut BlinkRegistryHandle) -> *mut c_char {
    clear_last_error();

    let Some(handle) = handle.as_ref() else {
        set_last_error("Null registry handle");
        return ptr::null_mut();
    };

    match handle.registry.start_session() {
        Ok(id) => string_to_cstr(&id),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

unsafe fn submit_sample(
    handle: *mut BlinkRegistryHandle,
    session_id: *const c_char,
    sample: Sample,
    frame_id: *const c_char,
) -> c_int {
    clear_last_error();

    let Some(handle) = handle.as_ref() else {
        set_last_error("Null registry handle");
        return -1;
    };

    let Some(session_id) = cstr_to_string(session_id) else {
        set_last_error("Invalid session_id string pointer");
        return -1;
    };

    let sample = match cstr_to_string(frame_id) {
        Some(frame_id) => sample.with_frame_id(frame_id),
        None => sample,
    };

    match handle.registry.submit(&session_id, sample) {
        Ok(_) => 0,
        Err(e) => {
            set_last_error(&e.to_string());
            status_code(&e)
        }
    }
}

/// Submit an EAR reading.
///
/// # Safety
/// - `handle` must be a valid pointer returned by `blink_registry_new`.
/// - `session_id` must be a valid null-terminated C string.
/// - `frame_id` may be NULL or a valid null-terminated C string.
#[no_mangle]
pub unsafe extern "C" fn blink_submit_ear(
    handle: *mut BlinkRegistryHandle,
    session_id: *const c_char,
    ear: f64,
    frame_id: *const c_char,
) -> c_int {
    submit_sample(handle, session_id, Sample::ear(ear), frame_id)
}

/// Report a frame in which the detector found no face.
///
/// # Safety
/// Same requirements as `blink_submit_ear`.
#[no_mangle]
pub unsafe extern "C" fn blink_submit_no_face(
    handle: *mut BlinkRegistryHandle,
    session_id: *const c_char,
    frame_id: *const c_char,
) -> c_int {
    submit_sample(handle, session_id, Sample::no_face(), frame_id)
}

/// End a session and return its summary as JSON.
///
/// # Safety
/// - `handle` must be a valid pointer returned by `blink_registry_new`.
/// - `session_id` must be a valid null-terminated C string.
/// - Returns a newly allocated string that must be freed with `blink_free_string`.
/// - Returns NULL on error; call `blink_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn blink_end_session(
    handle: *mut BlinkRegistryHandle,
    session_id: *const c_char,
) -> *mut c_char {
    clear_last_error();

    let Some(handle) = handle.as_ref() else {
        set_last_error("Null registry handle");
        return ptr::null_mut();
    };

    let Some(session_id) = cstr_to_string(session_id) else {
        set_last_error("Invalid session_id string pointer");
        return ptr::null_mut();
    };

    let summary = match handle.registry.end_session(&session_id) {
        Ok(summary) => summary,
        Err(e) => {
            set_last_error(&e.to_string());
            return ptr::null_mut();
        }
    };

    match serde_json::to_string(&summary) {
        Ok(json) => string_to_cstr(&json),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

/// Handle one protocol request (see `protocol`) and return the JSON response.
///
/// Errors are reported inside the response, so this only returns NULL when
/// the arguments themselves are invalid.
///
/// # Safety
/// - `handle` must be a valid pointer returned by `blink_registry_new`.
/// - `request_json` must be a valid null-terminated C string.
/// - Returns a newly allocated string that must be freed with `blink_free_string`.
#[no_mangle]
pub unsafe extern "C" fn blink_handle_request(
    handle: *mut BlinkRegistryHandle,
    request_json: *const c_char,
) -> *mut c_char {
    clear_last_error();

    let Some(handle) = handle.as_ref() else {
        set_last_error("Null registry handle");
        return ptr::null_mut();
    };

    let Some(request) = cstr_to_string(request_json) else {
        set_last_error("Invalid request string pointer");
        return ptr::null_mut();
    };

    string_to_cstr(&handle_line(&handle.registry, &request))
}

/// Run the idle sweep and return the number of sessions closed.
///
/// # Safety
/// - `handle` must be a valid pointer returned by `blink_registry_new`.
#[no_mangle]
pub unsafe extern "C" fn blink_sweep_idle(handle: *mut BlinkRegistryHandle) -> c_int {
    match handle.as_ref() {
        Some(handle) => handle.registry.sweep_idle().len() as c_int,
        None => -1,
    }
}

/// Get the last error message.
///
/// # Safety
/// - Returns a pointer to a static string (do not free).
/// - Returns NULL if no error occurred.
/// - The returned pointer is only valid until the next FFI call on this thread.
#[no_mangle]
pub unsafe extern "C" fn blink_last_error() -> *const c_char {
    LAST_ERROR.with(|e| match &*e.borrow() {
        Some(cstr) => cstr.as_ptr(),
        None => ptr::null(),
    })
}

/// Free a string returned by any blink_* function.
///
/// # Safety
/// - `s` must be a pointer returned by a blink_* function, or NULL.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn blink_free_string(s: *mut c_char) {
    if !s.is_null() {
        drop(CString::from_raw(s));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ffi_session_lifecycle() {
        unsafe {
            let handle = blink_registry_new(ptr::null());
            assert!(!handle.is_null());

            let id_ptr = blink_start_session(handle);
            assert!(!id_ptr.is_null());
            let id = CStr::from_ptr(id_ptr).to_owned();

            let frame = CString::new("1").unwrap();
            assert_eq!(blink_submit_ear(handle, id.as_ptr(), 0.1, frame.as_ptr()), 0);
            assert_eq!(blink_submit_ear(handle, id.as_ptr(), 0.3, ptr::null()), 0);
            assert_eq!(blink_submit_ear(handle, id.as_ptr(), 7.0, ptr::null()), 3);
            assert!(!blink_last_error().is_null());
            assert_eq!(blink_submit_no_face(handle, id.as_ptr(), ptr::null()), 0);

            let summary_ptr = blink_end_session(handle, id.as_ptr());
            assert!(!summary_ptr.is_null());
            let summary: serde_json::Value =
                serde_json::from_str(CStr::from_ptr(summary_ptr).to_str().unwrap()).unwrap();
            assert_eq!(summary["blink_sequence"], "S");

            assert_eq!(blink_submit_ear(handle, id.as_ptr(), 0.3, ptr::null()), 1);

            blink_free_string(summary_ptr);
            blink_free_string(id_ptr);
            blink_registry_free(handle);
        }
    }

    #[test]
    fn test_ffi_request_handler() {
        unsafe {
            let handle = blink_registry_new(ptr::null());
            let request = CString::new(r#"{"op": "health"}"#).unwrap();

            let response_ptr = blink_handle_request(handle, request.as_ptr());
            let response: serde_json::Value =
                serde_json::from_str(CStr::from_ptr(response_ptr).to_str().unwrap()).unwrap();
            assert_eq!(response["status"], "running");

            blink_free_string(response_ptr);
            blink_registry_free(handle);
        }
    }

    #[test]
    fn test_ffi_invalid_config() {
        unsafe {
            let config = CString::new(r#"{"ear_min": 1.0, "ear_max": 0.0}"#).unwrap();
            let handle = blink_registry_new(config.as_ptr());
            assert!(handle.is_null());
            assert!(!blink_last_error().is_null());
        }
    }

    #[test]
    fn test_ffi_null_handle() {
        unsafe {
            assert!(blink_start_session(ptr::null_mut()).is_null());
            assert_eq!(blink_sweep_idle(ptr::null_mut()), -1);
        }
    }
}
