//! C-ABI wrapper around `onthemap-core`.
//!
//! # Overview
//! Exposes login, location listing and location posting through
//! `extern "C"` functions so a native UI shell can drive the client
//! without knowing about Rust's async runtime or serde.
//!
//! # Design
//! - Every `extern "C"` function wraps its body in `catch_unwind` so panics
//!   never cross the FFI boundary.
//! - The handle owns a multi-thread tokio runtime; each entry point blocks
//!   on the matching core operation. Call them off the UI thread.
//! - A single `FfiResult` envelope with `FfiDataTag` + `void* data`
//!   conveys success payloads and errors uniformly.
//! - The C caller owns all returned pointers and must call the matching
//!   `otm_free_*` function to release them.

pub mod types;

use std::ffi::CStr;
use std::os::raw::c_char;
use std::panic::{catch_unwind, AssertUnwindSafe};

use onthemap_core::{ApiError, ClientConfig, LocationDraft, Services};
use tracing::warn;

use types::*;

/// Copy a caller-owned C string. Invalid UTF-8 is replaced, not rejected.
fn read_str(s: *const c_char) -> String {
    unsafe { CStr::from_ptr(s) }.to_string_lossy().into_owned()
}

/// Run `f` against a non-null client, turning null and panics into
/// error results.
fn with_client(
    client: *const FfiClient,
    op: &str,
    f: impl FnOnce(&FfiClient) -> *mut FfiResult,
) -> *mut FfiResult {
    catch_unwind(AssertUnwindSafe(|| {
        if client.is_null() {
            return FfiResult::null_arg("client");
        }
        f(unsafe { &*client })
    }))
    .unwrap_or_else(|_| FfiResult::panic(&format!("panic in {op}")))
}

// ---------------------------------------------------------------------------
// Client lifecycle
// ---------------------------------------------------------------------------

/// Create a client from a JSON configuration.
///
/// `config_json` may be null for the production defaults; any key it omits
/// keeps its default. Returns null if the JSON is invalid, the runtime
/// cannot start, or an internal panic occurs. Free with `otm_client_free`.
#[unsafe(no_mangle)]
pub extern "C" fn otm_client_new(config_json: *const c_char) -> *mut FfiClient {
    catch_unwind(|| {
        let config = if config_json.is_null() {
            ClientConfig::default()
        } else {
            match ClientConfig::from_json(&read_str(config_json)) {
                Ok(config) => config,
                Err(e) => {
                    warn!(error = %e, "rejecting client config");
                    return std::ptr::null_mut();
                }
            }
        };
        let runtime = match tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
        {
            Ok(rt) => rt,
            Err(e) => {
                warn!(error = %e, "failed to start runtime");
                return std::ptr::null_mut();
            }
        };
        let services = Services::with_default_transport(&config);
        Box::into_raw(Box::new(FfiClient { runtime, services }))
    })
    .unwrap_or(std::ptr::null_mut())
}

/// Free a client created by `otm_client_new`. Safe to call with null.
#[unsafe(no_mangle)]
pub extern "C" fn otm_client_free(client: *mut FfiClient) {
    if !client.is_null() {
        let _ = catch_unwind(AssertUnwindSafe(|| {
            drop(unsafe { Box::from_raw(client) });
        }));
    }
}

/// Install a `tracing` subscriber writing to stderr, filtered by
/// `RUST_LOG` (default `info`). Returns false if one was already set.
#[unsafe(no_mangle)]
pub extern "C" fn otm_init_logging() -> bool {
    catch_unwind(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .try_init()
            .is_ok()
    })
    .unwrap_or(false)
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// Log in and load the user's profile.
///
/// Returns a result with `data_tag = Session` on success. A rejected
/// password yields `InvalidCredentials` with `http_status = 403`.
#[unsafe(no_mangle)]
pub extern "C" fn otm_login(
    client: *const FfiClient,
    username: *const c_char,
    password: *const c_char,
) -> *mut FfiResult {
    with_client(client, "otm_login", |client| {
        if username.is_null() {
            return FfiResult::null_arg("username");
        }
        if password.is_null() {
            return FfiResult::null_arg("password");
        }
        let (username, password) = (read_str(username), read_str(password));
        match client
            .runtime
            .block_on(client.services.auth.login(&username, &password))
        {
            Ok(session) => FfiResult::ok_session(&session),
            Err(e) => FfiResult::from_error(e),
        }
    })
}

/// End the session. Local state is cleared even if the server call fails,
/// so this reports success unless an argument is null.
#[unsafe(no_mangle)]
pub extern "C" fn otm_logout(client: *const FfiClient) -> *mut FfiResult {
    with_client(client, "otm_logout", |client| {
        match client.runtime.block_on(client.services.auth.logout()) {
            Ok(()) => FfiResult::ok_empty(),
            Err(e) => FfiResult::from_error(e),
        }
    })
}

/// The current session (`data_tag = Session`), or an empty success when
/// nobody is logged in.
#[unsafe(no_mangle)]
pub extern "C" fn otm_current_session(client: *const FfiClient) -> *mut FfiResult {
    with_client(client, "otm_current_session", |client| {
        match client.services.auth.session() {
            Some(session) => FfiResult::ok_session(&session),
            None => FfiResult::ok_empty(),
        }
    })
}

/// Sign-up page URL for the "create account" link. Free with
/// `otm_free_string`; null if `client` is null.
#[unsafe(no_mangle)]
pub extern "C" fn otm_signup_url(client: *const FfiClient) -> *mut c_char {
    catch_unwind(AssertUnwindSafe(|| {
        if client.is_null() {
            return std::ptr::null_mut();
        }
        c_string(unsafe { &*client }.services.auth.signup_url())
    }))
    .unwrap_or(std::ptr::null_mut())
}

// ---------------------------------------------------------------------------
// Locations
// ---------------------------------------------------------------------------

/// Fetch the most recent locations into the cache and return them
/// (`data_tag = LocationList`). On failure the previous cache is kept.
#[unsafe(no_mangle)]
pub extern "C" fn otm_refresh_locations(client: *const FfiClient) -> *mut FfiResult {
    with_client(client, "otm_refresh_locations", |client| {
        match client.runtime.block_on(client.services.cache.refresh()) {
            Ok(()) => FfiResult::ok_location_list(&client.services.cache.records()),
            Err(e) => FfiResult::from_error(e),
        }
    })
}

/// The cached locations without touching the network. Empty until the
/// first successful refresh.
#[unsafe(no_mangle)]
pub extern "C" fn otm_locations(client: *const FfiClient) -> *mut FfiResult {
    with_client(client, "otm_locations", |client| {
        FfiResult::ok_location_list(&client.services.cache.records())
    })
}

/// Look up the signed-in user's own record id (`data_tag = Text`), or an
/// empty success if they have not posted yet.
#[unsafe(no_mangle)]
pub extern "C" fn otm_resolve_own_record(client: *const FfiClient) -> *mut FfiResult {
    with_client(client, "otm_resolve_own_record", |client| {
        let Some(session) = client.services.auth.session() else {
            return FfiResult::from_error(ApiError::NotAuthenticated);
        };
        match client
            .runtime
            .block_on(client.services.store.resolve_own_record_id(&session.owner_key))
        {
            Ok(id) => FfiResult::ok_text(id.as_deref()),
            Err(e) => FfiResult::from_error(e),
        }
    })
}

/// Post or update the user's location, then refresh the cache.
///
/// On success `data_tag = Text` carries the id of the record that was
/// updated, or the result is empty when a new record was created.
#[unsafe(no_mangle)]
pub extern "C" fn otm_submit_location(
    client: *const FfiClient,
    display_location: *const c_char,
    media_url: *const c_char,
    latitude: f64,
    longitude: f64,
) -> *mut FfiResult {
    with_client(client, "otm_submit_location", |client| {
        if display_location.is_null() {
            return FfiResult::null_arg("display_location");
        }
        if media_url.is_null() {
            return FfiResult::null_arg("media_url");
        }
        let draft = LocationDraft {
            display_location: read_str(display_location),
            media_url: read_str(media_url),
            latitude,
            longitude,
        };
        match client.runtime.block_on(client.services.submit_location(draft)) {
            Ok(updated) => FfiResult::ok_text(updated.as_deref()),
            Err(e) => FfiResult::from_error(e),
        }
    })
}

// ---------------------------------------------------------------------------
// Free functions
// ---------------------------------------------------------------------------

/// Free an `FfiResult` returned by any `otm_*` function.
/// Safe to call with null. Uses `data_tag` to determine what `data` points to.
#[unsafe(no_mangle)]
pub extern "C" fn otm_free_result(result: *mut FfiResult) {
    if result.is_null() {
        return;
    }
    let _ = catch_unwind(AssertUnwindSafe(|| {
        let result = unsafe { Box::from_raw(result) };
        free_c_string(result.error_message);
        if result.data.is_null() {
            return;
        }
        match result.data_tag {
            FfiDataTag::Session => {
                let session = unsafe { Box::from_raw(result.data as *mut FfiSession) };
                free_c_string(session.session_id);
                free_c_string(session.owner_key);
                free_c_string(session.first_name);
                free_c_string(session.last_name);
            }
            FfiDataTag::LocationList => {
                let list = unsafe { Box::from_raw(result.data as *mut FfiLocationList) };
                if !list.items.is_null() && list.len > 0 {
                    let items = unsafe {
                        Box::from_raw(std::ptr::slice_from_raw_parts_mut(
                            list.items,
                            list.len as usize,
                        ))
                    };
                    for item in items.iter() {
                        item.free_fields();
                    }
                }
            }
            FfiDataTag::Text => free_c_string(result.data as *mut c_char),
            FfiDataTag::None => {}
        }
    }));
}

/// Free a C string allocated by this library. Safe to call with null.
#[unsafe(no_mangle)]
pub extern "C" fn otm_free_string(s: *mut c_char) {
    let _ = catch_unwind(|| free_c_string(s));
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
