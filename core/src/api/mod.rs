//! Typed endpoint definitions, one module per actor.
//!
//! Each function maps one remote endpoint to a method, a path and a payload
//! shape. Errors from `ApiClient` are returned unchanged.

pub mod admin;
pub mod doctor;
pub mod patient;

pub use admin::{AdminApi, AdminAppointmentsApi, AdminDoctorsApi};
pub use doctor::{DoctorApi, DoctorAppointmentsApi, DoctorAvailabilityApi, DoctorScheduleBlocksApi};
pub use patient::{PatientApi, PatientAppointmentsApi, PatientDoctorsApi};

use crate::error::ApiError;
use crate::query::QueryParams;

/// Flatten an optional params struct into query parameters.
pub(crate) fn params_of<P: serde::Serialize>(
    params: Option<&P>,
) -> Result<Option<QueryParams>, ApiError> {
    params.map(QueryParams::from_serialize).transpose()
}
