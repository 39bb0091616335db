use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use serde::Deserialize;

use crate::error::ServerError;
use crate::model::{
    ApiResponse, Appointment, AvailableSlot, CreateAppointment, Doctor, MessageBody,
    UpdateAppointment,
};
use crate::store::{parse_date, today, AppointmentFilter, Caller};
use crate::Db;

type Reply<T> = Result<Json<ApiResponse<T>>, ServerError>;

/// Default look-ahead for slot listings.
const SLOT_DAYS: u32 = 7;
const MAX_SLOT_DAYS: u32 = 60;

#[derive(Debug, Deserialize)]
pub struct DoctorSearch {
    specialization: Option<String>,
    search: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SlotQuery {
    date: Option<String>,
    days: Option<u32>,
}

pub async fn search_doctors(
    State(db): State<Db>,
    Extension(caller): Extension<Caller>,
    Query(q): Query<DoctorSearch>,
) -> Reply<Vec<Doctor>> {
    caller.patient_id()?;
    let doctors = db
        .read()
        .await
        .search_doctors(q.specialization.as_deref(), q.search.as_deref());
    Ok(Json(ApiResponse::ok(doctors)))
}

pub async fn get_doctor(
    State(db): State<Db>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<String>,
) -> Reply<Doctor> {
    caller.patient_id()?;
    Ok(Json(ApiResponse::ok(db.read().await.active_doctor(&id)?)))
}

pub async fn available_slots(
    State(db): State<Db>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<String>,
    Query(q): Query<SlotQuery>,
) -> Reply<Vec<AvailableSlot>> {
    caller.patient_id()?;
    let from = match q.date.as_deref() {
        Some(date) => parse_date(date)?,
        None => today(),
    };
    let days = q.days.unwrap_or(SLOT_DAYS).clamp(1, MAX_SLOT_DAYS);
    Ok(Json(ApiResponse::ok(db.read().await.available_slots(&id, from, days)?)))
}

pub async fn book(
    State(db): State<Db>,
    Extension(caller): Extension<Caller>,
    Json(req): Json<CreateAppointment>,
) -> Result<(StatusCode, Json<ApiResponse<Appointment>>), ServerError> {
    let appointment = db.write().await.book(caller.patient_id()?, req)?;
    tracing::info!(appointment = %appointment.id, doctor = %appointment.doctor_id, "booked");
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::with_message(appointment, "Cita creada")),
    ))
}

pub async fn list_appointments(
    State(db): State<Db>,
    Extension(caller): Extension<Caller>,
    Query(mut filter): Query<AppointmentFilter>,
) -> Reply<Vec<Appointment>> {
    filter.patient_id = Some(caller.patient_id()?.to_string());
    Ok(Json(ApiResponse::ok(db.read().await.appointments(&filter))))
}

pub async fn get_appointment(
    State(db): State<Db>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<String>,
) -> Reply<Appointment> {
    let scope = AppointmentFilter {
        patient_id: Some(caller.patient_id()?.to_string()),
        ..Default::default()
    };
    Ok(Json(ApiResponse::ok(db.read().await.appointment(&scope, &id)?)))
}

pub async fn reschedule(
    State(db): State<Db>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<String>,
    Json(req): Json<UpdateAppointment>,
) -> Reply<Appointment> {
    let appointment = db.write().await.reschedule(caller.patient_id()?, &id, req)?;
    Ok(Json(ApiResponse::ok(appointment)))
}

pub async fn cancel(
    State(db): State<Db>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<String>,
) -> Reply<MessageBody> {
    db.write().await.cancel(caller.patient_id()?, &id)?;
    tracing::info!(appointment = %id, "cancelled");
    Ok(Json(ApiResponse::ok(MessageBody::new("Cita cancelada"))))
}
