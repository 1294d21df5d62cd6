//! FFI bindings for the closeness core
//!
//! This module provides C-compatible functions for calling the core from the
//! host app. All functions use C strings (null-terminated) and return allocated
//! memory that must be freed by the caller using `ios_free_string`.

use std::cell::RefCell;
use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::ptr;
use std::sync::Arc;

use chrono::Local;
use serde::Serialize;

use crate::error::CoreError;
use crate::export::{prepare_export, ExportOptions, ExportScope};
use crate::labels::{overlap_label, proximity_description, proximity_label};
use crate::recorder::{CloseSignal, ExitAction, MeasurementRecorder};
use crate::reset::ResetBehavior;
use crate::settings::SettingsStore;
use crate::store::JsonFileStore;
use crate::types::{Modality, Session, SliderPosition};

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

fn modality_from_code(code: i32) -> Option<Modality> {
    match code {
        0 => Some(Modality::BasicIos),
        1 => Some(Modality::AdvancedIos),
        2 => Some(Modality::Proximity),
        _ => None,
    }
}

fn behavior_from_code(code: i32) -> Option<ResetBehavior> {
    match code {
        0 => Some(ResetBehavior::KeepPosition),
        1 => Some(ResetBehavior::ResetToDefault),
        2 => Some(ResetBehavior::RandomPosition),
        _ => None,
    }
}

fn exit_action_from_code(code: i32) -> Option<ExitAction> {
    match code {
        0 => Some(ExitAction::SaveAndExit),
        1 => Some(ExitAction::ExitWithoutSaving),
        2 => Some(ExitAction::Cancel),
        _ => None,
    }
}

// ============================================================================
// Labels
// ============================================================================

/// Overlap label for a value (e.g. "Close").
///
/// # Safety
/// - Returns a newly allocated string that must be freed with `ios_free_string`.
#[no_mangle]
pub unsafe extern "C" fn ios_overlap_label(value: f64) -> *mut c_char {
    clear_last_error();
    string_to_cstr(overlap_label(value))
}

/// Proximity label for a value (e.g. "Very Close").
///
/// # Safety
/// - Returns a newly allocated string that must be freed with `ios_free_string`.
#[no_mangle]
pub unsafe extern "C" fn ios_proximity_label(value: f64) -> *mut c_char {
    clear_last_error();
    string_to_cstr(proximity_label(value))
}

/// Descriptive sentence for a proximity value.
///
/// # Safety
/// - Returns a newly allocated string that must be freed with `ios_free_string`.
#[no_mangle]
pub unsafe extern "C" fn ios_proximity_description(value: f64) -> *mut c_char {
    clear_last_error();
    string_to_cstr(proximity_description(value))
}

// ============================================================================
// Reset Behavior
// ============================================================================

/// Compute the next slider position.
///
/// `modality`: 0 = basic, 1 = advanced, 2 = proximity.
/// `behavior`: 0 = keep, 1 = default, 2 = random.
///
/// # Safety
/// - `last_position_json` may be NULL (no history) or a valid null-terminated
///   C string holding a position object.
/// - Returns a newly allocated JSON string that must be freed with `ios_free_string`.
/// - Returns NULL on error; call `ios_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn ios_next_position(
    modality: i32,
    behavior: i32,
    last_position_json: *const c_char,
) -> *mut c_char {
    clear_last_error();

    let Some(modality) = modality_from_code(modality) else {
        set_last_error("Unknown modality code");
        return ptr::null_mut();
    };
    let Some(behavior) = behavior_from_code(behavior) else {
        set_last_error("Unknown reset behavior code");
        return ptr::null_mut();
    };

    let last: Option<SliderPosition> = if last_position_json.is_null() {
        None
    } else {
        let Some(json) = cstr_to_string(last_position_json) else {
            set_last_error("Invalid position string pointer");
            return ptr::null_mut();
        };
        match serde_json::from_str(&json) {
            Ok(position) => Some(position),
            Err(e) => {
                set_last_error(&e.to_string());
                return ptr::null_mut();
            }
        }
    };

    let next = behavior.next_position(modality, last.as_ref(), &mut rand::thread_rng());
    match serde_json::to_string(&next) {
        Ok(json) => string_to_cstr(&json),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

// ============================================================================
// Export
// ============================================================================

#[derive(Serialize)]
struct ExportResult {
    filename: String,
    content: String,
}

fn export_from_json(sessions_json: &str, options_json: &str) -> Result<String, CoreError> {
    let sessions: Vec<Session> = serde_json::from_str(sessions_json)?;
    let options: ExportOptions = serde_json::from_str(options_json)?;

    let scope = match sessions.as_slice() {
        [only] => ExportScope::Single(only.id),
        _ => ExportScope::All,
    };
    let file = prepare_export(&sessions, scope, &options, Local::now().date_naive())?;

    let result = ExportResult {
        filename: file.filename,
        content: String::from_utf8_lossy(&file.content).into_owned(),
    };
    Ok(serde_json::to_string(&result)?)
}

/// Export sessions and return `{"filename": ..., "content": ...}`.
///
/// # Safety
/// - `sessions_json` (array of sessions) and `options_json` (export options)
///   must be valid null-terminated C strings.
/// - Returns a newly allocated string that must be freed with `ios_free_string`.
/// - Returns NULL on error (including "No data to export"); call `ios_last_error`.
#[no_mangle]
pub unsafe extern "C" fn ios_export(
    sessions_json: *const c_char,
    options_json: *const c_char,
) -> *mut c_char {
    clear_last_error();

    let Some(sessions) = cstr_to_string(sessions_json) else {
        set_last_error("Invalid sessions string pointer");
        return ptr::null_mut();
    };
    let Some(options) = cstr_to_string(options_json) else {
        set_last_error("Invalid options string pointer");
        return ptr::null_mut();
    };

    match export_from_json(&sessions, &options) {
        Ok(result) => string_to_cstr(&result),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

// ============================================================================
// Recorder API
// ============================================================================

/// Opaque handle to a measurement recorder
pub struct RecorderHandle {
    recorder: MeasurementRecorder<JsonFileStore>,
}

/// Open a recorder over a JSON session store and a settings file.
///
/// # Safety
/// - `store_path` and `settings_path` must be valid null-terminated C strings.
/// - Returns a pointer that must be freed with `ios_recorder_free`.
/// - Returns NULL on error; call `ios_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn ios_recorder_open(
    store_path: *const c_char,
    settings_path: *const c_char,
    modality: i32,
) -> *mut RecorderHandle {
    clear_last_error();

    let Some(store_path) = cstr_to_string(store_path) else {
        set_last_error("Invalid store path pointer");
        return ptr::null_mut();
    };
    let Some(settings_path) = cstr_to_string(settings_path) else {
        set_last_error("Invalid settings path pointer");
        return ptr::null_mut();
    };
    let Some(modality) = modality_from_code(modality) else {
        set_last_error("Unknown modality code");
        return ptr::null_mut();
    };

    let store = match JsonFileStore::open(store_path) {
        Ok(store) => store,
        Err(e) => {
            set_last_error(&e.to_string());
            return ptr::null_mut();
        }
    };
    let settings = Arc::new(SettingsStore::new(settings_path));

    let recorder = MeasurementRecorder::open(store, settings, modality);
    Box::into_raw(Box::new(RecorderHandle { recorder }))
}

/// Current pending position as JSON.
///
/// # Safety
/// - `handle` must be a valid pointer returned by `ios_recorder_open`.
/// - Returns a newly allocated string that must be freed with `ios_free_string`.
#[no_mangle]
pub unsafe extern "C" fn ios_recorder_pending(handle: *mut RecorderHandle) -> *mut c_char {
    clear_last_error();

    if handle.is_null() {
        set_last_error("Null recorder pointer");
        return ptr::null_mut();
    }
    let handle = &*handle;

    match serde_json::to_string(&handle.recorder.pending()) {
        Ok(json) => string_to_cstr(&json),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

/// Update the live slider position.
///
/// # Safety
/// - `handle` must be a valid pointer returned by `ios_recorder_open`.
/// - Returns 0 on success, non-zero on error.
#[no_mangle]
pub unsafe extern "C" fn ios_recorder_set_pending(
    handle: *mut RecorderHandle,
    value: f64,
    self_scale: f64,
    other_scale: f64,
) -> i32 {
    clear_last_error();

    if handle.is_null() {
        set_last_error("Null recorder pointer");
        return -1;
    }
    let handle = &mut *handle;

    handle
        .recorder
        .set_pending(SliderPosition::with_scales(value, self_scale, other_scale));
    0
}

/// Update the live slider position from a position JSON object.
///
/// Accepts the same shape `ios_recorder_pending` returns, including the
/// optional `selfPosition`/`otherPosition` figure positions.
///
/// # Safety
/// - `handle` must be a valid pointer returned by `ios_recorder_open`.
/// - `position_json` must be a valid null-terminated C string.
/// - Returns 0 on success, non-zero on error; call `ios_last_error` on error.
#[no_mangle]
pub unsafe extern "C" fn ios_recorder_set_pending_json(
    handle: *mut RecorderHandle,
    position_json: *const c_char,
) -> i32 {
    clear_last_error();

    if handle.is_null() {
        set_last_error("Null recorder pointer");
        return -1;
    }
    let handle = &mut *handle;

    let Some(json) = cstr_to_string(position_json) else {
        set_last_error("Invalid position string pointer");
        return -1;
    };
    match serde_json::from_str::<SliderPosition>(&json) {
        Ok(position) => {
            handle.recorder.set_pending(position);
            0
        }
        Err(e) => {
            set_last_error(&e.to_string());
            -2
        }
    }
}

/// Save the pending position as a measurement.
///
/// # Safety
/// - `handle` must be a valid pointer returned by `ios_recorder_open`.
/// - Returns 0 on success, non-zero on error; call `ios_last_error` on error.
#[no_mangle]
pub unsafe extern "C" fn ios_recorder_save(handle: *mut RecorderHandle) -> i32 {
    clear_last_error();

    if handle.is_null() {
        set_last_error("Null recorder pointer");
        return -1;
    }
    let handle = &mut *handle;

    match handle.recorder.save() {
        Ok(_) => 0,
        Err(e) => {
            set_last_error(&e.to_string());
            -1
        }
    }
}

/// Leave the measurement screen.
///
/// `action`: 0 = save and exit, 1 = exit without saving, 2 = cancel.
///
/// # Safety
/// - `handle` must be a valid pointer returned by `ios_recorder_open`.
/// - Returns 1 if the screen should close, 0 if it should stay open, -1 on error.
#[no_mangle]
pub unsafe extern "C" fn ios_recorder_exit(handle: *mut RecorderHandle, action: i32) -> i32 {
    clear_last_error();

    if handle.is_null() {
        set_last_error("Null recorder pointer");
        return -1;
    }
    let handle = &mut *handle;

    let Some(action) = exit_action_from_code(action) else {
        set_last_error("Unknown exit action code");
        return -1;
    };

    match handle.recorder.exit(action) {
        Ok(CloseSignal::Closed { .. }) => 1,
        Ok(CloseSignal::StayOpen) => 0,
        Err(e) => {
            set_last_error(&e.to_string());
            -1
        }
    }
}

/// Free a recorder.
///
/// # Safety
/// - `handle` must be a valid pointer returned by `ios_recorder_open`.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn ios_recorder_free(handle: *mut RecorderHandle) {
    if !handle.is_null() {
        drop(Box::from_raw(handle));
    }
}

// ============================================================================
// Memory Management
// ============================================================================

/// Free a string returned by core functions.
///
/// # Safety
/// - `ptr` must be a valid pointer returned by a core function, or NULL.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn ios_free_string(ptr: *mut c_char) {
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
/// - The returned pointer is valid until the next core function call on this thread.
/// - Do NOT free the returned pointer.
/// - Returns NULL if no error occurred.
#[no_mangle]
pub unsafe extern "C" fn ios_last_error() -> *const c_char {
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
pub unsafe extern "C" fn ios_version() -> *const c_char {
    static VERSION: &[u8] = concat!(env!("CARGO_PKG_VERSION"), "\0").as_bytes();
    VERSION.as_ptr() as *const c_char
}
