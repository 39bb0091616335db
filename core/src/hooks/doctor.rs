//! Queries and mutations for a doctor's own schedule.

use std::sync::Arc;

use crate::api::doctor::{self as endpoints, DoctorApi};
use crate::cache::{fetcher, mutator, Mutation, Query, QueryCache};
use crate::error::ApiError;
use crate::query::CacheKey;
use crate::types::{
    Appointment, AvailabilitySlot, CreateAvailabilityRequest, CreateScheduleBlockRequest,
    DateRangeParams, DoctorAppointmentsParams, MessageBody, ScheduleBlock,
    UpdateAppointmentStatusRequest, UpdateAvailabilityRequest, UpdateScheduleBlockRequest,
};

use super::key_with;

pub fn availability_key() -> CacheKey {
    CacheKey::from(endpoints::AVAILABILITY_PATH)
}

pub fn schedule_blocks_key(params: Option<&DateRangeParams>) -> CacheKey {
    key_with(endpoints::SCHEDULE_BLOCKS_PATH, params)
}

pub fn appointments_key(params: Option<&DoctorAppointmentsParams>) -> CacheKey {
    key_with(endpoints::APPOINTMENTS_PATH, params)
}

pub fn appointment_key(id: &str) -> CacheKey {
    CacheKey::from(format!("{}/{id}", endpoints::APPOINTMENTS_PATH).as_str())
}

pub fn availability_query(cache: &QueryCache, api: &DoctorApi) -> Query<Vec<AvailabilitySlot>> {
    let api = api.availability.clone();
    cache.use_query(
        availability_key(),
        fetcher(move || {
            let api = api.clone();
            async move { Ok::<_, ApiError>(api.get_availability().await?.data) }
        }),
    )
}

pub fn schedule_blocks_query(
    cache: &QueryCache,
    api: &DoctorApi,
    params: Option<DateRangeParams>,
) -> Query<Vec<ScheduleBlock>> {
    let key = schedule_blocks_key(params.as_ref());
    let api = api.schedule_blocks.clone();
    let params = Arc::new(params);
    cache.use_query(
        key,
        fetcher(move || {
            let api = api.clone();
            let params = params.clone();
            async move {
                let params = params.as_ref().as_ref();
                Ok::<_, ApiError>(api.get_schedule_blocks(params).await?.data)
            }
        }),
    )
}

pub fn appointments_query(
    cache: &QueryCache,
    api: &DoctorApi,
    params: Option<DoctorAppointmentsParams>,
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

pub fn appointment_query(cache: &QueryCache, api: &DoctorApi, id: &str) -> Query<Appointment> {
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

pub fn create_availability(
    api: &DoctorApi,
) -> Mutation<CreateAvailabilityRequest, AvailabilitySlot> {
    let api = api.availability.clone();
    Mutation::new(mutator(move |req: CreateAvailabilityRequest| {
        let api = api.clone();
        async move { Ok::<_, ApiError>(api.create_availability(&req).await?.data) }
    }))
}

pub fn update_availability(
    api: &DoctorApi,
) -> Mutation<(String, UpdateAvailabilityRequest), AvailabilitySlot> {
    let api = api.availability.clone();
    Mutation::new(mutator(move |(id, req): (String, UpdateAvailabilityRequest)| {
        let api = api.clone();
        async move { Ok::<_, ApiError>(api.update_availability(&id, &req).await?.data) }
    }))
}

pub fn delete_availability(api: &DoctorApi) -> Mutation<String, MessageBody> {
    let api = api.availability.clone();
    Mutation::new(mutator(move |id: String| {
        let api = api.clone();
        async move { Ok::<_, ApiError>(api.delete_availability(&id).await?.data) }
    }))
}

pub fn create_schedule_block(
    api: &DoctorApi,
) -> Mutation<CreateScheduleBlockRequest, ScheduleBlock> {
    let api = api.schedule_blocks.clone();
    Mutation::new(mutator(move |req: CreateScheduleBlockRequest| {
        let api = api.clone();
        async move { Ok::<_, ApiError>(api.create_schedule_block(&req).await?.data) }
    }))
}

pub fn update_schedule_block(
    api: &DoctorApi,
) -> Mutation<(String, UpdateScheduleBlockRequest), ScheduleBlock> {
    let api = api.schedule_blocks.clone();
    Mutation::new(mutator(move |(id, req): (String, UpdateScheduleBlockRequest)| {
        let api = api.clone();
        async move { Ok::<_, ApiError>(api.update_schedule_block(&id, &req).await?.data) }
    }))
}

pub fn delete_schedule_block(api: &DoctorApi) -> Mutation<String, MessageBody> {
    let api = api.schedule_blocks.clone();
    Mutation::new(mutator(move |id: String| {
        let api = api.clone();
        async move { Ok::<_, ApiError>(api.delete_schedule_block(&id).await?.data) }
    }))
}

pub fn update_appointment_status(
    api: &DoctorApi,
) -> Mutation<(String, UpdateAppointmentStatusRequest), Appointment> {
    let api = api.appointments.clone();
    Mutation::new(mutator(move |(id, req): (String, UpdateAppointmentStatusRequest)| {
        let api = api.clone();
        async move { Ok::<_, ApiError>(api.update_appointment_status(&id, &req).await?.data) }
    }))
}

/// A doctor's dashboard: weekly template, one-off blocks, agenda.
pub struct DoctorHooks {
    pub availability: Query<Vec<AvailabilitySlot>>,
    pub schedule_blocks: Query<Vec<ScheduleBlock>>,
    pub appointments: Query<Vec<Appointment>>,
    pub create_availability: Mutation<CreateAvailabilityRequest, AvailabilitySlot>,
    pub update_availability: Mutation<(String, UpdateAvailabilityRequest), AvailabilitySlot>,
    pub delete_availability: Mutation<String, MessageBody>,
    pub create_schedule_block: Mutation<CreateScheduleBlockRequest, ScheduleBlock>,
    pub update_schedule_block: Mutation<(String, UpdateScheduleBlockRequest), ScheduleBlock>,
    pub delete_schedule_block: Mutation<String, MessageBody>,
    pub update_appointment_status: Mutation<(String, UpdateAppointmentStatusRequest), Appointment>,
}

impl DoctorHooks {
    pub fn new(cache: &QueryCache, api: &DoctorApi) -> Self {
        Self {
            availability: availability_query(cache, api),
            schedule_blocks: schedule_blocks_query(cache, api, None),
            appointments: appointments_query(cache, api, None),
            create_availability: create_availability(api),
            update_availability: update_availability(api),
            delete_availability: delete_availability(api),
            create_schedule_block: create_schedule_block(api),
            update_schedule_block: update_schedule_block(api),
            delete_schedule_block: delete_schedule_block(api),
            update_appointment_status: update_appointment_status(api),
        }
    }

    pub async fn refresh_availability(&self) -> Result<Arc<Vec<AvailabilitySlot>>, Arc<ApiError>> {
        self.availability.mutate().await
    }

    pub async fn refresh_schedule_blocks(&self) -> Result<Arc<Vec<ScheduleBlock>>, Arc<ApiError>> {
        self.schedule_blocks.mutate().await
    }

    pub async fn refresh_appointments(&self) -> Result<Arc<Vec<Appointment>>, Arc<ApiError>> {
        self.appointments.mutate().await
    }
}
