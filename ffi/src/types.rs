//! `#[repr(C)]` types for the FFI boundary.
//!
//! # Design
//! Each type mirrors a core type with C-compatible representations:
//! `*mut c_char` for strings (null when the core value is absent), raw
//! pointers for lists, and tagged enums with explicit discriminants.
//! Conversions live here so `lib.rs` stays focused on the `extern "C"`
//! surface.

use std::ffi::{c_void, CString};
use std::os::raw::c_char;

use onthemap_core::{ApiError, LocationRecord, Services, Session};

/// Opaque handle. Owns the runtime the blocking entry points drive and the
/// wired-up client services.
pub struct FfiClient {
    pub(crate) runtime: tokio::runtime::Runtime,
    pub(crate) services: Services,
}

/// Heap-allocate `s` as a C string. Interior NULs are dropped rather than
/// failing the whole result.
pub(crate) fn c_string(s: &str) -> *mut c_char {
    CString::new(s.replace('\0', ""))
        .unwrap_or_default()
        .into_raw()
}

fn c_string_opt(s: Option<&str>) -> *mut c_char {
    s.map_or(std::ptr::null_mut(), c_string)
}

/// Release a string produced by `c_string`. Null is ignored.
pub(crate) fn free_c_string(s: *mut c_char) {
    if !s.is_null() {
        drop(unsafe { CString::from_raw(s) });
    }
}

// ---------------------------------------------------------------------------
// Result types
// ---------------------------------------------------------------------------

/// Error codes returned in `FfiResult`.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FfiErrorCode {
    Ok = 0,
    Network = 1,
    Http = 2,
    InvalidCredentials = 3,
    AuthProtocol = 4,
    StoreProtocol = 5,
    Serialization = 6,
    InvalidInput = 7,
    NotAuthenticated = 8,
    Panic = 9,
    NullArg = 10,
}

/// Tag that tells `otm_free_result` what `FfiResult::data` points to.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FfiDataTag {
    None = 0,
    Session = 1,
    LocationList = 2,
    /// `data` is a `char*`, e.g. a record id.
    Text = 3,
}

#[repr(C)]
pub struct FfiSession {
    pub session_id: *mut c_char,
    pub owner_key: *mut c_char,
    pub first_name: *mut c_char,
    pub last_name: *mut c_char,
}

/// One location record. Optional string fields are null when absent.
#[repr(C)]
pub struct FfiLocation {
    pub record_id: *mut c_char,
    pub owner_key: *mut c_char,
    pub display_name: *mut c_char,
    pub display_location: *mut c_char,
    pub media_url: *mut c_char,
    pub latitude: f64,
    pub longitude: f64,
}

impl FfiLocation {
    fn from_core(record: &LocationRecord) -> Self {
        FfiLocation {
            record_id: c_string(&record.record_id),
            owner_key: c_string_opt(record.owner_key.as_deref()),
            display_name: c_string(&record.display_name()),
            display_location: c_string_opt(record.display_location.as_deref()),
            media_url: c_string_opt(record.subtitle()),
            latitude: record.latitude,
            longitude: record.longitude,
        }
    }

    pub(crate) fn free_fields(&self) {
        free_c_string(self.record_id);
        free_c_string(self.owner_key);
        free_c_string(self.display_name);
        free_c_string(self.display_location);
        free_c_string(self.media_url);
    }
}

#[repr(C)]
pub struct FfiLocationList {
    pub items: *mut FfiLocation,
    pub len: u32,
}

/// Result envelope for every fallible entry point.
///
/// On success `error_code` is `Ok`, `error_message` is null, and `data`
/// points to the payload tagged by `data_tag` (null for `None`).
/// On failure `error_code` gives the category, `error_message` is a
/// human-readable C string, and `data` is null. `http_status` is set for
/// `Http` and `InvalidCredentials`, otherwise 0.
#[repr(C)]
pub struct FfiResult {
    pub error_code: FfiErrorCode,
    pub error_message: *mut c_char,
    pub http_status: u16,
    pub data_tag: FfiDataTag,
    pub data: *mut c_void,
}

impl FfiResult {
    fn ok(data_tag: FfiDataTag, data: *mut c_void) -> *mut Self {
        Box::into_raw(Box::new(FfiResult {
            error_code: FfiErrorCode::Ok,
            error_message: std::ptr::null_mut(),
            http_status: 0,
            data_tag,
            data,
        }))
    }

    fn err(error_code: FfiErrorCode, http_status: u16, msg: &str) -> *mut Self {
        Box::into_raw(Box::new(FfiResult {
            error_code,
            error_message: c_string(msg),
            http_status,
            data_tag: FfiDataTag::None,
            data: std::ptr::null_mut(),
        }))
    }

    /// Build a success result with no payload.
    pub(crate) fn ok_empty() -> *mut Self {
        Self::ok(FfiDataTag::None, std::ptr::null_mut())
    }

    pub(crate) fn ok_session(session: &Session) -> *mut Self {
        let ffi_session = Box::new(FfiSession {
            session_id: c_string(&session.session_id),
            owner_key: c_string(&session.owner_key),
            first_name: c_string(&session.first_name),
            last_name: c_string(&session.last_name),
        });
        Self::ok(FfiDataTag::Session, Box::into_raw(ffi_session) as *mut c_void)
    }

    /// `None` maps to an empty success, so "nothing there" is not an error.
    pub(crate) fn ok_text(text: Option<&str>) -> *mut Self {
        match text {
            Some(t) => Self::ok(FfiDataTag::Text, c_string(t) as *mut c_void),
            None => Self::ok_empty(),
        }
    }

    pub(crate) fn ok_location_list(records: &[LocationRecord]) -> *mut Self {
        let len = records.len() as u32;
        let items = if records.is_empty() {
            std::ptr::null_mut()
        } else {
            let boxed: Box<[FfiLocation]> = records.iter().map(FfiLocation::from_core).collect();
            Box::into_raw(boxed) as *mut FfiLocation
        };
        let list = Box::new(FfiLocationList { items, len });
        Self::ok(FfiDataTag::LocationList, Box::into_raw(list) as *mut c_void)
    }

    /// Build an error result from an `ApiError`.
    pub(crate) fn from_error(err: ApiError) -> *mut Self {
        let code = match &err {
            ApiError::Network(_) => FfiErrorCode::Network,
            ApiError::Http { .. } => FfiErrorCode::Http,
            ApiError::InvalidCredentials => FfiErrorCode::InvalidCredentials,
            ApiError::AuthProtocol(_) => FfiErrorCode::AuthProtocol,
            ApiError::StoreProtocol(_) => FfiErrorCode::StoreProtocol,
            ApiError::Serialization(_) => FfiErrorCode::Serialization,
            ApiError::InvalidInput(_) => FfiErrorCode::InvalidInput,
            ApiError::NotAuthenticated => FfiErrorCode::NotAuthenticated,
        };
        Self::err(code, err.status().unwrap_or(0), &err.to_string())
    }

    pub(crate) fn null_arg(name: &str) -> *mut Self {
        Self::err(FfiErrorCode::NullArg, 0, &format!("null argument: {name}"))
    }

    pub(crate) fn panic(msg: &str) -> *mut Self {
        Self::err(FfiErrorCode::Panic, 0, msg)
    }
}
