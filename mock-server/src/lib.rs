//! In-memory implementation of the clinic HTTP API, for integration tests and
//! local development.

use std::sync::Arc;

use axum::routing::{get, post, put};
use axum::{middleware, Router};
use tokio::{net::TcpListener, sync::RwLock};

pub mod error;
pub mod model;
pub mod routes;
pub mod store;

pub use store::Store;

pub type Db = Arc<RwLock<Store>>;

/// Router over a freshly seeded store.
pub fn app() -> Router {
    app_with(Arc::new(RwLock::new(Store::seeded())))
}

pub fn app_with(db: Db) -> Router {
    use routes::{admin, doctor, notes, patient};

    let protected = Router::new()
        .route("/api/admin/doctors", get(admin::list_doctors).post(admin::create_doctor))
        .route(
            "/api/admin/doctors/{id}",
            put(admin::update_doctor).delete(admin::deactivate_doctor),
        )
        .route("/api/admin/appointments", get(admin::list_appointments))
        .route("/api/admin/appointments/range", get(admin::appointments_in_range))
        .route(
            "/api/doctor/availability",
            get(doctor::list_availability).post(doctor::create_availability),
        )
        .route(
            "/api/doctor/availability/{id}",
            put(doctor::update_availability).delete(doctor::delete_availability),
        )
        .route(
            "/api/doctor/schedule-blocks",
            get(doctor::list_blocks).post(doctor::create_block),
        )
        .route(
            "/api/doctor/schedule-blocks/{id}",
            put(doctor::update_block).delete(doctor::delete_block),
        )
        .route("/api/doctor/appointments", get(doctor::list_appointments))
        .route("/api/doctor/appointments/{id}", get(doctor::get_appointment))
        .route("/api/doctor/appointments/{id}/status", put(doctor::update_status))
        .route("/api/patient/doctors", get(patient::search_doctors))
        .route("/api/patient/doctors/{id}", get(patient::get_doctor))
        .route("/api/patient/doctors/{id}/available-slots", get(patient::available_slots))
        .route(
            "/api/patient/appointments",
            get(patient::list_appointments).post(patient::book),
        )
        .route(
            "/api/patient/appointments/{id}",
            get(patient::get_appointment)
                .put(patient::reschedule)
                .delete(patient::cancel),
        )
        .route("/api/notes", get(notes::list).post(notes::create))
        .route("/api/notes/my", get(notes::list_mine))
        .route("/api/notes/with-images", get(notes::list_with_images))
        .route(
            "/api/notes/{id}",
            get(notes::get_one).put(notes::update).delete(notes::remove),
        )
        .route_layer(middleware::from_fn_with_state(db.clone(), routes::auth::require_bearer));

    Router::new()
        .route("/api/auth/signin", post(routes::auth::signin))
        .route("/api/notes/image/{filename}", get(notes::image))
        .merge(protected)
        .with_state(db)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}
