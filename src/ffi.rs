//! FFI bindings for stress-ensemble
//!
//! This module provides C-compatible functions for running inference from other
//! languages. All functions use C strings (null-terminated) and return allocated
//! memory that must be freed by the caller using `stress_free_string`.
//!
//! Samples are passed as JSON objects with the fields `hrv`, `heart_rate`,
//! `systolic`, `diastolic` and `spo2`. Results are returned as
//! `{"label": "Stressed", "probability": 0.87}`.

use std::cell::RefCell;
use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::ptr;

use crate::artifact::Artifact;
use crate::error::Result;
use crate::inference::{infer, InferenceService};
use crate::types::{PredictionResult, VitalSample};

// Thread-local storage for the last error message
thread_local! {
    static LAST_ERROR: RefCell<Option<CString>> = const { RefCell::new(None) };
}

/// Set the last error message
fn set_last_error(msg: &str) {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = CString::new(msg).ok();
    });
}

/// Clear the last error message
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

fn parse_sample(json: &str) -> Result<VitalSample> {
    let sample: VitalSample = serde_json::from_str(json)?;
    sample.validate()?;
    Ok(sample)
}

/// Serialize a prediction, or record the error and return NULL
fn prediction_to_cstr(result: Result<PredictionResult>) -> *mut c_char {
    match result.and_then(|p| serde_json::to_string(&p).map_err(Into::into)) {
        Ok(json) => string_to_cstr(&json),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

// ============================================================================
// Stateless API
// ============================================================================

/// Classify one sample with an artifact given as JSON.
///
/// Parses and validates the artifact on every call; hold a service handle
/// for repeated predictions.
///
/// # Safety
/// - `artifact_json` and `sample_json` must be valid null-terminated C strings.
/// - Returns a newly allocated string that must be freed with `stress_free_string`.
/// - Returns NULL on error; call `stress_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn stress_infer(
    artifact_json: *const c_char,
    sample_json: *const c_char,
) -> *mut c_char {
    clear_last_error();

    let artifact_str = match cstr_to_string(artifact_json) {
        Some(s) => s,
        None => {
            set_last_error("Invalid artifact string pointer");
            return ptr::null_mut();
        }
    };

    let sample_str = match cstr_to_string(sample_json) {
        Some(s) => s,
        None => {
            set_last_error("Invalid sample string pointer");
            return ptr::null_mut();
        }
    };

    prediction_to_cstr(
        Artifact::from_json(&artifact_str)
            .and_then(|artifact| infer(&artifact, &parse_sample(&sample_str)?)),
    )
}

// ============================================================================
// Stateful Service API
// ============================================================================

/// Opaque handle to an InferenceService
pub struct StressServiceHandle {
    service: InferenceService,
}

/// Create a service from artifact JSON.
///
/// # Safety
/// - `artifact_json` must be a valid null-terminated C string.
/// - Returns a pointer that must be freed with `stress_service_free`.
/// - Returns NULL on error; call `stress_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn stress_service_new(artifact_json: *const c_char) -> *mut StressServiceHandle {
    clear_last_error();

    let artifact_str = match cstr_to_string(artifact_json) {
        Some(s) => s,
        None => {
            set_last_error("Invalid artifact string pointer");
            return ptr::null_mut();
        }
    };

    match Artifact::from_json(&artifact_str) {
        Ok(artifact) => Box::into_raw(Box::new(StressServiceHandle {
            service: InferenceService::new(artifact),
        })),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

/// Free a service.
///
/// # Safety
/// - `service` must be a valid pointer returned by `stress_service_new`, or NULL.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn stress_service_free(service: *mut StressServiceHandle) {
    if !service.is_null() {
        drop(Box::from_raw(service));
    }
}

/// Classify one sample with the service's current artifact.
///
/// # Safety
/// - `service` must be a valid pointer returned by `stress_service_new`.
/// - `sample_json` must be a valid null-terminated C string.
/// - Returns a newly allocated string that must be freed with `stress_free_string`.
/// - Returns NULL on error; call `stress_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn stress_service_predict(
    service: *const StressServiceHandle,
    sample_json: *const c_char,
) -> *mut c_char {
    clear_last_error();

    if service.is_null() {
        set_last_error("Null service pointer");
        return ptr::null_mut();
    }

    let handle = &*service;

    let sample_str = match cstr_to_string(sample_json) {
        Some(s) => s,
        None => {
            set_last_error("Invalid sample string pointer");
            return ptr::null_mut();
        }
    };

    prediction_to_cstr(parse_sample(&sample_str).and_then(|s| handle.service.predict(&s)))
}

/// Atomically swap the service's artifact.
///
/// Predictions running on other threads finish with the artifact they
/// started with.
///
/// # Safety
/// - `service` must be a valid pointer returned by `stress_service_new`.
/// - `artifact_json` must be a valid null-terminated C string.
/// - Returns 0 on success, -1 on error (the previous artifact stays active).
#[no_mangle]
pub unsafe extern "C" fn stress_service_replace(
    service: *const StressServiceHandle,
    artifact_json: *const c_char,
) -> i32 {
    clear_last_error();

    if service.is_null() {
        set_last_error("Null service pointer");
        return -1;
    }

    let handle = &*service;

    let artifact_str = match cstr_to_string(artifact_json) {
        Some(s) => s,
        None => {
            set_last_error("Invalid artifact string pointer");
            return -1;
        }
    };

    match Artifact::from_json(&artifact_str) {
        Ok(artifact) => {
            handle.service.replace(artifact);
            0
        }
        Err(e) => {
            set_last_error(&e.to_string());
            -1
        }
    }
}

// ============================================================================
// Memory Management
// ============================================================================

/// Free a string returned by stress functions.
///
/// # Safety
/// - `ptr` must be a valid pointer returned by a stress function, or NULL.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn stress_free_string(ptr: *mut c_char) {
    if !ptr.is_null() {
        drop(CString::from_raw(ptr));
    }
}

// ============================================================================
// Error Handling
// ============================================================================

/// Get the last error message.
///
/// # Safety
/// - Returns a pointer to a thread-local error string.
/// - The returned pointer is valid until the next stress function call on this thread.
/// - Do NOT free the returned pointer.
/// - Returns NULL if no error occurred.
#[no_mangle]
pub unsafe extern "C" fn stress_last_error() -> *const c_char {
    LAST_ERROR.with(|e| match &*e.borrow() {
        Some(cstr) => cstr.as_ptr(),
        None => ptr::null(),
    })
}

// ============================================================================
// Version Information
// ============================================================================

/// Get the library version.
///
/// # Safety
/// - Returns a pointer to a static string. Do NOT free.
#[no_mangle]
pub unsafe extern "C" fn stress_version() -> *const c_char {
    static VERSION: &[u8] = concat!(env!("CARGO_PKG_VERSION"), "\0").as_bytes();
    VERSION.as_ptr() as *const c_char
}
