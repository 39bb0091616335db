//! Back-office queries and mutations.

use std::sync::Arc;

use crate::api::admin::{self as endpoints, AdminApi};
use crate::cache::{fetcher, mutator, Mutation, Query, QueryCache};
use crate::dates::{date_range, DatePeriod};
use crate::error::ApiError;
use crate::query::CacheKey;
use crate::types::{
    Appointment, AppointmentsRangeParams, CreateDoctorRequest, Doctor, MessageBody,
    UpdateDoctorRequest,
};

use super::key_with;

pub fn doctors_key() -> CacheKey {
    CacheKey::from(endpoints::DOCTORS_PATH)
}

pub fn appointments_key() -> CacheKey {
    CacheKey::from(endpoints::APPOINTMENTS_PATH)
}

pub fn appointments_range_key(params: &AppointmentsRangeParams) -> CacheKey {
    key_with(endpoints::APPOINTMENTS_RANGE_PATH, Some(params))
}

pub fn doctors_query(cache: &QueryCache, api: &AdminApi) -> Query<Vec<Doctor>> {
    let api = api.doctors.clone();
    cache.use_query(
        doctors_key(),
        fetcher(move || {
            let api = api.clone();
            async move { Ok::<_, ApiError>(api.get_doctors().await?.data) }
        }),
    )
}

pub fn appointments_query(cache: &QueryCache, api: &AdminApi) -> Query<Vec<Appointment>> {
    let api = api.appointments.clone();
    cache.use_query(
        appointments_key(),
        fetcher(move || {
            let api = api.clone();
            async move { Ok::<_, ApiError>(api.get_appointments().await?.data) }
        }),
    )
}

pub fn appointments_range_query(
    cache: &QueryCache,
    api: &AdminApi,
    params: AppointmentsRangeParams,
) -> Query<Vec<Appointment>> {
    let key = appointments_range_key(&params);
    let api = api.appointments.clone();
    let params = Arc::new(params);
    cache.use_query(
        key,
        fetcher(move || {
            let api = api.clone();
            let params = params.clone();
            async move { Ok::<_, ApiError>(api.get_appointments_by_range(&params).await?.data) }
        }),
    )
}

pub fn create_doctor(api: &AdminApi) -> Mutation<CreateDoctorRequest, Doctor> {
    let api = api.doctors.clone();
    Mutation::new(mutator(move |req: CreateDoctorRequest| {
        let api = api.clone();
        async move { Ok::<_, ApiError>(api.create_doctor(&req).await?.data) }
    }))
}

pub fn update_doctor(api: &AdminApi) -> Mutation<(String, UpdateDoctorRequest), Doctor> {
    let api = api.doctors.clone();
    Mutation::new(mutator(move |(id, req): (String, UpdateDoctorRequest)| {
        let api = api.clone();
        async move { Ok::<_, ApiError>(api.update_doctor(&id, &req).await?.data) }
    }))
}

pub fn deactivate_doctor(api: &AdminApi) -> Mutation<String, MessageBody> {
    let api = api.doctors.clone();
    Mutation::new(mutator(move |id: String| {
        let api = api.clone();
        async move { Ok::<_, ApiError>(api.deactivate_doctor(&id).await?.data) }
    }))
}

/// Everything the back-office dashboard reads and writes.
pub struct AdminHooks {
    cache: QueryCache,
    api: AdminApi,
    pub doctors: Query<Vec<Doctor>>,
    pub appointments: Query<Vec<Appointment>>,
    pub create_doctor: Mutation<CreateDoctorRequest, Doctor>,
    pub update_doctor: Mutation<(String, UpdateDoctorRequest), Doctor>,
    pub deactivate_doctor: Mutation<String, MessageBody>,
}

impl AdminHooks {
    pub fn new(cache: &QueryCache, api: &AdminApi) -> Self {
        Self {
            cache: cache.clone(),
            api: api.clone(),
            doctors: doctors_query(cache, api),
            appointments: appointments_query(cache, api),
            create_doctor: create_doctor(api),
            update_doctor: update_doctor(api),
            deactivate_doctor: deactivate_doctor(api),
        }
    }

    pub async fn refresh_doctors(&self) -> Result<Arc<Vec<Doctor>>, Arc<ApiError>> {
        self.doctors.mutate().await
    }

    pub async fn refresh_appointments(&self) -> Result<Arc<Vec<Appointment>>, Arc<ApiError>> {
        self.appointments.mutate().await
    }

    /// Range query for today, this week or this month, counted from `today`.
    pub fn appointments_in(
        &self,
        period: DatePeriod,
        today: chrono::NaiveDate,
    ) -> Query<Vec<Appointment>> {
        let (start_date, end_date) = date_range(period, today);
        let params = AppointmentsRangeParams {
            start_date,
            end_date,
            ..Default::default()
        };
        appointments_range_query(&self.cache, &self.api, params)
    }
}
