//! Back-office endpoints under `/api/admin`.

use crate::client::ApiClient;
use crate::error::ApiError;
use crate::query::QueryParams;
use crate::types::{
    ApiResponse, Appointment, AppointmentsRangeParams, CreateDoctorRequest, Doctor, MessageBody,
    UpdateDoctorRequest,
};

pub const DOCTORS_PATH: &str = "/api/admin/doctors";
pub const APPOINTMENTS_PATH: &str = "/api/admin/appointments";
pub const APPOINTMENTS_RANGE_PATH: &str = "/api/admin/appointments/range";

#[derive(Debug, Clone)]
pub struct AdminDoctorsApi {
    client: ApiClient,
}

impl AdminDoctorsApi {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    pub async fn create_doctor(
        &self,
        data: &CreateDoctorRequest,
    ) -> Result<ApiResponse<Doctor>, ApiError> {
        self.client.post(DOCTORS_PATH, Some(data), None).await
    }

    pub async fn get_doctors(&self) -> Result<ApiResponse<Vec<Doctor>>, ApiError> {
        self.client.get(DOCTORS_PATH, None).await
    }

    pub async fn update_doctor(
        &self,
        id: &str,
        data: &UpdateDoctorRequest,
    ) -> Result<ApiResponse<Doctor>, ApiError> {
        self.client.put(&format!("{DOCTORS_PATH}/{id}"), Some(data), None).await
    }

    /// Soft delete: the doctor stays stored with `isActive: false`.
    pub async fn deactivate_doctor(&self, id: &str) -> Result<ApiResponse<MessageBody>, ApiError> {
        self.client.delete(&format!("{DOCTORS_PATH}/{id}"), None).await
    }
}

#[derive(Debug, Clone)]
pub struct AdminAppointmentsApi {
    client: ApiClient,
}

impl AdminAppointmentsApi {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    pub async fn get_appointments(&self) -> Result<ApiResponse<Vec<Appointment>>, ApiError> {
        self.client.get(APPOINTMENTS_PATH, None).await
    }

    pub async fn get_appointments_by_range(
        &self,
        params: &AppointmentsRangeParams,
    ) -> Result<ApiResponse<Vec<Appointment>>, ApiError> {
        let params = QueryParams::from_serialize(params)?;
        self.client.get(APPOINTMENTS_RANGE_PATH, Some(&params)).await
    }
}

#[derive(Debug, Clone)]
pub struct AdminApi {
    pub doctors: AdminDoctorsApi,
    pub appointments: AdminAppointmentsApi,
}

impl AdminApi {
    pub fn new(client: ApiClient) -> Self {
        Self {
            doctors: AdminDoctorsApi::new(client.clone()),
            appointments: AdminAppointmentsApi::new(client),
        }
    }
}
