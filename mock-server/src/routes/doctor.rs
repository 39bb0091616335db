use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use serde::Deserialize;

use crate::error::ServerError;
use crate::model::{
    ApiResponse, Appointment, AvailabilitySlot, CreateAvailability, CreateScheduleBlock,
    MessageBody, ScheduleBlock, UpdateAvailability, UpdateScheduleBlock, UpdateStatus,
};
use crate::store::{AppointmentFilter, Caller};
use crate::Db;

type Reply<T> = Result<Json<ApiResponse<T>>, ServerError>;
type Created<T> = Result<(StatusCode, Json<ApiResponse<T>>), ServerError>;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockRange {
    start_date: Option<String>,
    end_date: Option<String>,
}

pub async fn list_availability(
    State(db): State<Db>,
    Extension(caller): Extension<Caller>,
) -> Reply<Vec<AvailabilitySlot>> {
    let doctor = caller.doctor_id()?;
    Ok(Json(ApiResponse::ok(db.read().await.availability(doctor))))
}

pub async fn create_availability(
    State(db): State<Db>,
    Extension(caller): Extension<Caller>,
    Json(req): Json<CreateAvailability>,
) -> Created<AvailabilitySlot> {
    let slot = db.write().await.create_availability(caller.doctor_id()?, req)?;
    Ok((StatusCode::CREATED, Json(ApiResponse::ok(slot))))
}

pub async fn update_availability(
    State(db): State<Db>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<String>,
    Json(req): Json<UpdateAvailability>,
) -> Reply<AvailabilitySlot> {
    let slot = db.write().await.update_availability(caller.doctor_id()?, &id, req)?;
    Ok(Json(ApiResponse::ok(slot)))
}

pub async fn delete_availability(
    State(db): State<Db>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<String>,
) -> Reply<MessageBody> {
    db.write().await.delete_availability(caller.doctor_id()?, &id)?;
    Ok(Json(ApiResponse::ok(MessageBody::new("Disponibilidad eliminada"))))
}

pub async fn list_blocks(
    State(db): State<Db>,
    Extension(caller): Extension<Caller>,
    Query(range): Query<BlockRange>,
) -> Reply<Vec<ScheduleBlock>> {
    let blocks = db.read().await.blocks(
        caller.doctor_id()?,
        range.start_date.as_deref(),
        range.end_date.as_deref(),
    );
    Ok(Json(ApiResponse::ok(blocks)))
}

pub async fn create_block(
    State(db): State<Db>,
    Extension(caller): Extension<Caller>,
    Json(req): Json<CreateScheduleBlock>,
) -> Created<ScheduleBlock> {
    let block = db.write().await.create_block(caller.doctor_id()?, req)?;
    Ok((StatusCode::CREATED, Json(ApiResponse::ok(block))))
}

pub async fn update_block(
    State(db): State<Db>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<String>,
    Json(req): Json<UpdateScheduleBlock>,
) -> Reply<ScheduleBlock> {
    let block = db.write().await.update_block(caller.doctor_id()?, &id, req)?;
    Ok(Json(ApiResponse::ok(block)))
}

pub async fn delete_block(
    State(db): State<Db>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<String>,
) -> Reply<MessageBody> {
    db.write().await.delete_block(caller.doctor_id()?, &id)?;
    Ok(Json(ApiResponse::ok(MessageBody::new("Bloqueo eliminado"))))
}

pub async fn list_appointments(
    State(db): State<Db>,
    Extension(caller): Extension<Caller>,
    Query(mut filter): Query<AppointmentFilter>,
) -> Reply<Vec<Appointment>> {
    filter.doctor_id = Some(caller.doctor_id()?.to_string());
    Ok(Json(ApiResponse::ok(db.read().await.appointments(&filter))))
}

pub async fn get_appointment(
    State(db): State<Db>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<String>,
) -> Reply<Appointment> {
    let scope = AppointmentFilter {
        doctor_id: Some(caller.doctor_id()?.to_string()),
        ..Default::default()
    };
    Ok(Json(ApiResponse::ok(db.read().await.appointment(&scope, &id)?)))
}

pub async fn update_status(
    State(db): State<Db>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<String>,
    Json(req): Json<UpdateStatus>,
) -> Reply<Appointment> {
    let next = req.status;
    let appointment = db.write().await.update_status(caller.doctor_id()?, &id, req)?;
    tracing::info!(appointment = %id, status = next.as_str(), "status changed");
    Ok(Json(ApiResponse::ok(appointment)))
}
