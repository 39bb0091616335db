//! Endpoints for a patient acting on their own bookings, under `/api/patient`.

use crate::client::ApiClient;
use crate::error::ApiError;
use crate::types::{
    ApiResponse, Appointment, AvailableSlot, AvailableSlotsParams, CreateAppointmentRequest, Doctor,
    MessageBody, PatientAppointmentsParams, SearchDoctorsParams, UpdateAppointmentRequest,
};

use super::params_of;

pub const DOCTORS_PATH: &str = "/api/patient/doctors";
pub const APPOINTMENTS_PATH: &str = "/api/patient/appointments";

pub fn doctor_path(id: &str) -> String {
    format!("{DOCTORS_PATH}/{id}")
}

pub fn available_slots_path(id: &str) -> String {
    format!("{DOCTORS_PATH}/{id}/available-slots")
}

#[derive(Debug, Clone)]
pub struct PatientDoctorsApi {
    client: ApiClient,
}

impl PatientDoctorsApi {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    pub async fn get_doctors(
        &self,
        params: Option<&SearchDoctorsParams>,
    ) -> Result<ApiResponse<Vec<Doctor>>, ApiError> {
        let params = params_of(params)?;
        self.client.get(DOCTORS_PATH, params.as_ref()).await
    }

    pub async fn get_doctor(&self, id: &str) -> Result<ApiResponse<Doctor>, ApiError> {
        self.client.get(&doctor_path(id), None).await
    }

    pub async fn get_available_slots(
        &self,
        id: &str,
        params: Option<&AvailableSlotsParams>,
    ) -> Result<ApiResponse<Vec<AvailableSlot>>, ApiError> {
        let params = params_of(params)?;
        self.client.get(&available_slots_path(id), params.as_ref()).await
    }
}

#[derive(Debug, Clone)]
pub struct PatientAppointmentsApi {
    client: ApiClient,
}

impl PatientAppointmentsApi {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    pub async fn create_appointment(
        &self,
        data: &CreateAppointmentRequest,
    ) -> Result<ApiResponse<Appointment>, ApiError> {
        self.client.post(APPOINTMENTS_PATH, Some(data), None).await
    }

    pub async fn get_appointments(
        &self,
        params: Option<&PatientAppointmentsParams>,
    ) -> Result<ApiResponse<Vec<Appointment>>, ApiError> {
        let params = params_of(params)?;
        self.client.get(APPOINTMENTS_PATH, params.as_ref()).await
    }

    pub async fn get_appointment(&self, id: &str) -> Result<ApiResponse<Appointment>, ApiError> {
        self.client.get(&format!("{APPOINTMENTS_PATH}/{id}"), None).await
    }

    pub async fn cancel_appointment(&self, id: &str) -> Result<ApiResponse<MessageBody>, ApiError> {
        self.client.delete(&format!("{APPOINTMENTS_PATH}/{id}"), None).await
    }

    /// Reschedule: only the fields present in `data` change.
    pub async fn update_appointment(
        &self,
        id: &str,
        data: &UpdateAppointmentRequest,
    ) -> Result<ApiResponse<Appointment>, ApiError> {
        self.client.put(&format!("{APPOINTMENTS_PATH}/{id}"), Some(data), None).await
    }
}

#[derive(Debug, Clone)]
pub struct PatientApi {
    pub doctors: PatientDoctorsApi,
    pub appointments: PatientAppointmentsApi,
}

impl PatientApi {
    pub fn new(client: ApiClient) -> Self {
        Self {
            doctors: PatientDoctorsApi::new(client.clone()),
            appointments: PatientAppointmentsApi::new(client),
        }
    }
}
