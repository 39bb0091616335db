use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::{Extension, Json};

use crate::error::ServerError;
use crate::model::{ApiResponse, Appointment, CreateDoctor, Doctor, MessageBody, UpdateDoctor};
use crate::store::{AppointmentFilter, Caller};
use crate::Db;

type Reply<T> = Result<Json<ApiResponse<T>>, ServerError>;

pub async fn list_doctors(
    State(db): State<Db>,
    Extension(caller): Extension<Caller>,
) -> Reply<Vec<Doctor>> {
    caller.require_admin()?;
    Ok(Json(ApiResponse::ok(db.read().await.doctors())))
}

pub async fn create_doctor(
    State(db): State<Db>,
    Extension(caller): Extension<Caller>,
    Json(req): Json<CreateDoctor>,
) -> Result<(StatusCode, Json<ApiResponse<Doctor>>), ServerError> {
    caller.require_admin()?;
    let doctor = db.write().await.create_doctor(req)?;
    tracing::info!(doctor = %doctor.id, "doctor created");
    Ok((StatusCode::CREATED, Json(ApiResponse::with_message(doctor, "Doctor creado"))))
}

pub async fn update_doctor(
    State(db): State<Db>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<String>,
    Json(req): Json<UpdateDoctor>,
) -> Reply<Doctor> {
    caller.require_admin()?;
    let doctor = db.write().await.update_doctor(&id, req)?;
    Ok(Json(ApiResponse::ok(doctor)))
}

pub async fn deactivate_doctor(
    State(db): State<Db>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<String>,
) -> Reply<MessageBody> {
    caller.require_admin()?;
    db.write().await.deactivate_doctor(&id)?;
    tracing::info!(doctor = %id, "doctor deactivated");
    Ok(Json(ApiResponse::ok(MessageBody::new("Doctor deactivated"))))
}

pub async fn list_appointments(
    State(db): State<Db>,
    Extension(caller): Extension<Caller>,
) -> Reply<Vec<Appointment>> {
    caller.require_admin()?;
    let all = db.read().await.appointments(&AppointmentFilter::default());
    Ok(Json(ApiResponse::ok(all)))
}

pub async fn appointments_in_range(
    State(db): State<Db>,
    Extension(caller): Extension<Caller>,
    Query(filter): Query<AppointmentFilter>,
) -> Reply<Vec<Appointment>> {
    caller.require_admin()?;
    if filter.start_date.is_none() || filter.end_date.is_none() {
        return Err(ServerError::BadRequest(
            "startDate y endDate son requeridos".to_string(),
        ));
    }
    Ok(Json(ApiResponse::ok(db.read().await.appointments(&filter))))
}
