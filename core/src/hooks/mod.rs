//! Per-role bindings between cache keys, fetchers and mutations.
//!
//! Each role module exposes its cache keys, one constructor per read query,
//! one per write, and a composite (`AdminHooks`, `DoctorHooks`,
//! `PatientHooks`) bundling the common ones with `refresh_*` helpers.
//! Mutations never refresh anything by themselves.

pub mod admin;
pub mod doctor;
pub mod patient;

pub use admin::AdminHooks;
pub use doctor::DoctorHooks;
pub use patient::PatientHooks;

use crate::query::{CacheKey, QueryParams};

/// Cache key for an endpoint with optional flattened params. Params that
/// fail to flatten get a `#invalid:` key carrying the error, which never
/// collides with a valid key; the fetch reports the same error.
pub(crate) fn key_with<P: serde::Serialize>(endpoint: &str, params: Option<&P>) -> CacheKey {
    match params.map(QueryParams::from_serialize).transpose() {
        Ok(params) => CacheKey::new(endpoint, params.as_ref()),
        Err(e) => CacheKey::from(format!("{endpoint}#invalid:{e}").as_str()),
    }
}
