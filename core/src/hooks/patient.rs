//! Doctor directory and booking flows for a patient.

use std::sync::Arc;

use crate::api::patient::{self as endpoints, PatientApi};
use crate::cache::{fetcher, mutator, Mutation, Query, QueryCache};
use crate::error::ApiError;
use crate::query::CacheKey;
use crate::types::{
    Appointment, AvailableSlot, AvailableSlotsParams, CreateAppointmentRequest, Doctor, MessageBody,
    PatientAppointmentsParams, SearchDoctorsParams, UpdateAppointmentRequest,
};

use super::key_with;

pub fn doctors_key(params: Option<&SearchDoctorsParams>) -> CacheKey {
    key_with(endpoints::DOCTORS_PATH, params)
}

pub fn doctor_key(id: &str) -> CacheKey {
    CacheKey::from(endpoints::doctor_path(id).as_str())
}

pub fn available_slots_key(id: &str, params: Option<&AvailableSlotsParams>) -> CacheKey {
    key_with(&endpoints::available_slots_path(id), params)
}

pub fn appointments_key(params: Option<&PatientAppointmentsParams>) -> CacheKey {
    key_with(endpoints::APPOINTMENTS_PATH, params)
}

pub fn appointment_key(id: &str) -> CacheKey {
    CacheKey::from(format!("{}/{id}", endpoints::APPOINTMENTS_PATH).as_str())
}

pub fn doctors_query(
    cache: &QueryCache,
    api: &PatientApi,
    params: Option<SearchDoctorsParams>,
) -> Query<Vec<Doctor>> {
    let key = doctors_key(params.as_ref());
    let api = api.doctors.clone();
    let params = Arc::new(params);
    cache.use_query(
        key,
        fetcher(move || {
            let api = api.clone();
            let params = params.clone();
            async move { Ok::<_, ApiError>(api.get_doctors(params.as_ref().as_ref()).await?.data) }
        }),
    )
}

pub fn doctor_query(cache: &QueryCache, api: &PatientApi, id: &str) -> Query<Doctor> {
    let api = api.doctors.clone();
    let id = id.to_string();
    cache.use_query(
        doctor_key(&id),
        fetcher(move || {
            let api = api.clone();
            let id = id.clone();
            async move { Ok::<_, ApiError>(api.get_doctor(&id).await?.data) }
        }),
    )
}

pub fn available_slots_query(
    cache: &QueryCache,
    api: &PatientApi,
    id: &str,
    params: Option<AvailableSlotsParams>,
) -> Query<Vec<AvailableSlot>> {
    let key = available_slots_key(id, params.as_ref());
    let api = api.doctors.clone();
    let id = id.to_string();
    let params = Arc::new(params);
    cache.use_query(
        key,
        fetcher(move || {
            let api = api.clone();
            let id = id.clone();
            let params = params.clone();
            async move {
                let params = params.as_ref().as_ref();
                Ok::<_, ApiError>(api.get_available_slots(&id, params).await?.data)
            }
        }),
    )
}

pub fn appointments_query(
    cache: &QueryCache,
    api: &PatientApi,
    params: Option<PatientAppointmentsParams>,
) -> Query<Vec<Appointment>> {
    let key = appointments_key(params.as_ref());
    let api = api.appointments.clone();
    let params = Arc::new(params);
    cache.use_query(
        key,
        fetcher(move || {
            let api = api.clone();
            let params = params.clone();
            async move {
                let params = params.as_ref().as_ref();
                Ok::<_, ApiError>(api.get_appointments(params).await?.data)
            }
        }),
    )
}

pub fn appointment_query(cache: &QueryCache, api: &PatientApi, id: &str) -> Query<Appointment> {
    let api = api.appointments.clone();
    let id = id.to_string();
    cache.use_query(
        appointment_key(&id),
        fetcher(move || {
            let api = api.clone();
            let id = id.clone();
            async move { Ok::<_, ApiError>(api.get_appointment(&id).await?.data) }
        }),
    )
}

pub fn create_appointment(api: &PatientApi) -> Mutation<CreateAppointmentRequest, Appointment> {
    let api = api.appointments.clone();
    Mutation::new(mutator(move |req: CreateAppointmentRequest| {
        let api = api.clone();
        async move { Ok::<_, ApiError>(api.create_appointment(&req).await?.data) }
    }))
}

pub fn update_appointment(
    api: &PatientApi,
) -> Mutation<(String, UpdateAppointmentRequest), Appointment> {
    let api = api.appointments.clone();
    Mutation::new(mutator(move |(id, req): (String, UpdateAppointmentRequest)| {
        let api = api.clone();
        async move { Ok::<_, ApiError>(api.update_appointment(&id, &req).await?.data) }
    }))
}

pub fn cancel_appointment(api: &PatientApi) -> Mutation<String, MessageBody> {
    let api = api.appointments.clone();
    Mutation::new(mutator(move |id: String| {
        let api = api.clone();
        async move { Ok::<_, ApiError>(api.cancel_appointment(&id).await?.data) }
    }))
}

pub struct PatientHooks {
    pub doctors: Query<Vec<Doctor>>,
    pub appointments: Query<Vec<Appointment>>,
    pub create_appointment: Mutation<CreateAppointmentRequest, Appointment>,
    pub update_appointment: Mutation<(String, UpdateAppointmentRequest), Appointment>,
    pub cancel_appointment: Mutation<String, MessageBody>,
}

impl PatientHooks {
    pub fn new(cache: &QueryCache, api: &PatientApi) -> Self {
        Self {
            doctors: doctors_query(cache, api, None),
            appointments: appointments_query(cache, api, None),
            create_appointment: create_appointment(api),
            update_appointment: update_appointment(api),
            cancel_appointment: cancel_appointment(api),
        }
    }

    pub async fn refresh_doctors(&self) -> Result<Arc<Vec<Doctor>>, Arc<ApiError>> {
        self.doctors.mutate().await
    }

    pub async fn refresh_appointments(&self) -> Result<Arc<Vec<Appointment>>, Arc<ApiError>> {
        self.appointments.mutate().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ApiClient;
    use crate::test_support::StubTransport;

    const BOOKED: &str = r#"{"id":"a9","doctorId":"1","patientId":"p1","date":"2025-03-03","time":"10:00","status":"pending","createdAt":"c","updatedAt":"u"}"#;

    fn envelope(data: &str) -> String {
        format!(r#"{{"data":{data},"success":true}}"#)
    }

    #[test]
    fn search_and_slot_keys() {
        let search = SearchDoctorsParams {
            specialization: Some("Cardiología".to_string()),
            search: None,
        };
        assert_eq!(
            doctors_key(Some(&search)).as_str(),
            "/api/patient/doctors?specialization=Cardiolog%C3%ADa"
        );
        assert_eq!(doctors_key(None), doctors_key(Some(&SearchDoctorsParams::default())));
        let week = AvailableSlotsParams {
            date: None,
            days: Some(7),
        };
        assert_eq!(
            available_slots_key("7", Some(&week)).as_str(),
            "/api/patient/doctors/7/available-slots?days=7"
        );
        assert_eq!(doctor_key("7").as_str(), "/api/patient/doctors/7");
    }

    #[tokio::test]
    async fn booking_then_refresh_lists_the_appointment() {
        let stub = Arc::new(StubTransport::new());
        stub.respond(200, &envelope("[]"));
        stub.respond(201, &envelope(BOOKED));
        stub.respond(200, &envelope(&format!("[{BOOKED}]")));

        let api = PatientApi::new(ApiClient::with_transport("http://api.test", stub.clone()));
        let cache = QueryCache::new();
        let mine = appointments_query(&cache, &api, None);
        assert!(mine.settled().await.data.unwrap().is_empty());

        let book = create_appointment(&api);
        let created = book
            .trigger(CreateAppointmentRequest {
                doctor_id: "1".to_string(),
                date: "2025-03-03".to_string(),
                time: "10:00".to_string(),
                notes: None,
            })
            .await
            .unwrap();
        assert_eq!(created.id, "a9");
        assert_eq!(book.data().unwrap().id, "a9");
        assert!(mine.data().unwrap().is_empty());

        let refreshed = mine.mutate().await.unwrap();
        assert_eq!(refreshed.len(), 1);
        assert_eq!(refreshed[0].id, "a9");
    }

    #[tokio::test]
    async fn slot_conflict_surfaces_on_the_mutation() {
        let stub = Arc::new(StubTransport::new());
        stub.respond(
            409,
            r#"{"message":"El horario seleccionado no está disponible","code":"SLOT_UNAVAILABLE"}"#,
        );

        let api = PatientApi::new(ApiClient::with_transport("http://api.test", stub.clone()));
        let reschedule = update_appointment(&api);
        let err = reschedule
            .trigger((
                "a9".to_string(),
                UpdateAppointmentRequest {
                    time: Some("11:00".to_string()),
                    ..Default::default()
                },
            ))
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "El horario seleccionado no está disponible");
        assert!(!reschedule.is_mutating());
        assert_eq!(reschedule.error().unwrap().code().as_deref(), Some("SLOT_UNAVAILABLE"));
    }
}
